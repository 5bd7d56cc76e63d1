// src/main.rs
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]
mod config;
mod drivers;
mod engine;
mod gui;
mod recorder;
mod types;
use std::path::PathBuf;
use eframe::egui;
use crate::config::{AppConfig, SETTINGS_FILE};
fn main() -> eframe::Result<()> {
    env_logger::init();
    let settings_path = PathBuf::from(SETTINGS_FILE);
    let config = AppConfig::load_or_default(&settings_path);
    log::info!("starting with {config:?}");
    let viewport = egui::ViewportBuilder::default()
        .with_inner_size([1280.0, 820.0])
        .with_min_inner_size([960.0, 640.0])
        .with_title("Rythm");
    let options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };
    eframe::run_native(
        "Rythm",
        options,
        Box::new(move |_cc| Box::new(gui::RythmApp::new(config, settings_path))),
    )
}
