// src/gui.rs
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use eframe::egui;
use egui::{Color32, RichText};
use egui_plot::{Legend, Line, Plot, PlotPoints, Points};
use crate::config::{AppConfig, DURATION_RANGE_MIN, INTERVAL_RANGE_S};
use crate::drivers::extractor::DOWNSAMPLE_STRIDE;
use crate::drivers::source::SIM_SAMPLE_RATE_HZ;
use crate::drivers::{
    render_group_png, BandpassExtractor, DisplayRouter, ExtractionDispatcher, PlotId, PlotStyle,
    RythmError, SerialSource, TimeAxis,
};
use crate::engine;
use crate::recorder::{self, SessionRecorder};
use crate::types::*;

const CURVE_COLORS: [Color32; 2] = [
    Color32::from_rgb(0, 255, 255),
    Color32::from_rgb(255, 0, 255),
];
const MAX_LOG_LINES: usize = 200;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Tab {
    Rates,
    Locator,
    Filtered,
}

pub struct RythmApp {
    config: AppConfig,
    settings_path: PathBuf,

    // session state as last reported by the engine
    is_running: bool,
    duration_ms: u64,
    elapsed_ms: u64,
    // interval of the session being displayed, for the rate time axis
    shown_interval_s: u32,
    spill_path: Option<PathBuf>,

    router: DisplayRouter,
    recorder: Arc<Mutex<SessionRecorder>>,
    pending: Arc<AtomicUsize>,
    ports: Vec<String>,

    selected_tab: Tab,
    log_messages: Vec<String>,

    rx: Receiver<PipelineMessage>,
    tx_cmd: Sender<GuiCommand>,
    // taken on shutdown
    engine: Option<JoinHandle<()>>,
}

impl RythmApp {
    pub fn new(config: AppConfig, settings_path: PathBuf) -> Self {
        let (tx, rx) = channel();
        let (tx_cmd, rx_cmd) = channel();
        let recorder = Arc::new(Mutex::new(SessionRecorder::new()));

        // extraction worker publishes straight into the UI channel
        let dispatcher = ExtractionDispatcher::spawn(BandpassExtractor::default(), tx.clone());
        let pending = dispatcher.pending_counter();
        let engine = engine::spawn_thread(tx, rx_cmd, Arc::clone(&recorder), dispatcher);

        let mut router = DisplayRouter::new();
        router.start_session();
        let shown_interval_s = config.interval_s;
        Self {
            config,
            settings_path,
            is_running: false,
            duration_ms: 0,
            elapsed_ms: 0,
            shown_interval_s,
            spill_path: None,
            router,
            recorder,
            pending,
            ports: SerialSource::available_ports(),
            selected_tab: Tab::Rates,
            log_messages: vec!["Rythm ready.".to_owned()],
            rx,
            tx_cmd,
            engine: Some(engine),
        }
    }

    fn log(&mut self, msg: &str) {
        self.log_messages.push(format!("> {}", msg));
        if self.log_messages.len() > MAX_LOG_LINES {
            self.log_messages.remove(0);
        }
    }

    fn drain_messages(&mut self) {
        while let Ok(msg) = self.rx.try_recv() {
            match msg {
                PipelineMessage::Log(s) => self.log(&s),
                PipelineMessage::SessionStarted {
                    duration_ms,
                    spill_path,
                } => {
                    self.is_running = true;
                    self.duration_ms = duration_ms;
                    self.spill_path = spill_path;
                    self.elapsed_ms = 0;
                    self.router.start_session();
                }
                PipelineMessage::SessionFinished => self.is_running = false,
                PipelineMessage::TimeUpdate(ms) => self.elapsed_ms = ms,
                PipelineMessage::Locator(reading) => self.router.on_locator(reading),
                PipelineMessage::Extraction(result) => self.router.on_extraction(&result),
            }
        }
    }

    fn time_axis(&self, id: PlotId) -> TimeAxis {
        let sample_ms = 1000.0 / SIM_SAMPLE_RATE_HZ;
        match id {
            PlotId::HeartRate | PlotId::BreathRate => {
                TimeAxis::new(f64::from(self.shown_interval_s) * 1000.0)
            }
            PlotId::Locator => TimeAxis::new(sample_ms),
            PlotId::HeartFiltered | PlotId::BreathFiltered => {
                TimeAxis::new(sample_ms * DOWNSAMPLE_STRIDE as f64)
            }
        }
    }

    fn start_session(&mut self) {
        self.offer_save(confirm_unsaved, pick_snapshot_path);
        match self.config.session() {
            Ok(session) => {
                self.shown_interval_s = session.interval_s;
                self.tx_cmd.send(GuiCommand::StartSession(session)).ok();
            }
            Err(e) => {
                log::warn!("{e}");
                self.log(&e.to_string());
            }
        }
    }

    /// Offers to save unsaved in-memory data when saving is enabled in the
    /// settings. Declining discards it.
    fn offer_save(
        &mut self,
        confirm: impl FnOnce() -> bool,
        choose_path: impl FnOnce() -> Option<PathBuf>,
    ) {
        if !self.config.save_on_exit {
            return;
        }
        let outcome = recorder::save_if_needed(&self.recorder, confirm, choose_path);
        self.report_save(outcome);
    }

    fn save_now(&mut self) {
        let Some(path) = pick_snapshot_path() else {
            return;
        };
        let outcome = recorder::save_to_file(&self.recorder, &path);
        if matches!(outcome, Ok(None)) {
            self.log("Nothing in memory to save.");
        }
        self.report_save(outcome);
    }

    /// Stops the engine and waits for it, so queued extractions finish and
    /// no more samples arrive. Then offers to save and writes the settings.
    /// Only the first call does anything.
    fn shutdown(
        &mut self,
        confirm: impl FnOnce() -> bool,
        choose_path: impl FnOnce() -> Option<PathBuf>,
    ) {
        let Some(engine) = self.engine.take() else {
            return;
        };
        self.tx_cmd.send(GuiCommand::StopSession).ok();
        // replacing the sender disconnects the engine's command channel
        self.tx_cmd = channel().0;
        if engine.join().is_err() {
            log::error!("engine thread panicked");
        }
        self.drain_messages();
        self.offer_save(confirm, choose_path);
        if let Err(e) = self.config.save(&self.settings_path) {
            log::error!("{e:#}");
        }
    }

    fn report_save(&mut self, outcome: Result<Option<PathBuf>, RythmError>) {
        match outcome {
            Ok(Some(path)) => self.log(&format!("Saved {}", path.display())),
            Ok(None) => {}
            Err(e) => {
                log::error!("{e}");
                self.log(&format!("Save failed: {e}"));
            }
        }
    }

    fn export_png(&mut self, id: PlotId) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("PNG image", &["png"])
            .set_file_name(format!("{}.png", id.title()))
            .save_file()
        else {
            return;
        };
        let rendered = render_group_png(
            self.router.group(id),
            id.title(),
            self.time_axis(id),
            &PlotStyle::default(),
        );
        let written = rendered.map_err(|e| e.to_string()).and_then(|png| {
            std::fs::write(&path, png).map_err(|e| format!("{}: {e}", path.display()))
        });
        match written {
            Ok(()) => self.log(&format!("Exported {}", path.display())),
            Err(e) => {
                log::error!("PNG export failed: {e}");
                self.log(&format!("Export failed: {e}"));
            }
        }
    }

    fn settings_ui(&mut self, ui: &mut egui::Ui) {
        let editable = !self.is_running;
        ui.add_enabled_ui(editable, |ui| {
            ui.horizontal(|ui| {
                ui.selectable_value(&mut self.config.mode, ConnectionMode::Simulation, "SIM");
                ui.selectable_value(&mut self.config.mode, ConnectionMode::Hardware, "RADAR");
            });
            if self.config.mode == ConnectionMode::Hardware {
                ui.horizontal(|ui| {
                    egui::ComboBox::from_label("Port")
                        .selected_text(self.config.port.clone())
                        .show_ui(ui, |ui| {
                            for port in &self.ports {
                                ui.selectable_value(&mut self.config.port, port.clone(), port.as_str());
                            }
                        });
                    if ui.button("⟳").on_hover_text("Refresh ports").clicked() {
                        self.ports = SerialSource::available_ports();
                    }
                });
            }
            egui::Grid::new("session_settings").show(ui, |ui| {
                ui.label("Duration (min)");
                ui.add(
                    egui::DragValue::new(&mut self.config.duration_min)
                        .clamp_range(DURATION_RANGE_MIN.0..=DURATION_RANGE_MIN.1),
                );
                ui.end_row();
                ui.label("Interval (s)");
                ui.add(
                    egui::DragValue::new(&mut self.config.interval_s)
                        .clamp_range(INTERVAL_RANGE_S.0..=INTERVAL_RANGE_S.1),
                );
                ui.end_row();
            });
        });

        let before = self.config.bands;
        ui.label("Filter bands (Hz)");
        egui::Grid::new("filter_bands").show(ui, |ui| {
            let bands = &mut self.config.bands;
            ui.label("Heart");
            ui.add(egui::DragValue::new(&mut bands.low_heart_hz).speed(0.01).clamp_range(0.01..=10.0));
            ui.add(egui::DragValue::new(&mut bands.high_heart_hz).speed(0.01).clamp_range(0.01..=10.0));
            ui.end_row();
            ui.label("Breath");
            ui.add(egui::DragValue::new(&mut bands.low_breath_hz).speed(0.01).clamp_range(0.001..=5.0));
            ui.add(egui::DragValue::new(&mut bands.high_breath_hz).speed(0.01).clamp_range(0.001..=5.0));
            ui.end_row();
        });
        if self.config.bands != before && self.config.bands.validate().is_ok() {
            self.tx_cmd
                .send(GuiCommand::SetFilterBands(self.config.bands))
                .ok();
        }
        ui.checkbox(&mut self.config.save_on_exit, "Offer to save unsaved data");
    }

    fn plot_group(&mut self, ui: &mut egui::Ui, id: PlotId, height: f32) {
        let mut export = false;
        ui.horizontal(|ui| {
            ui.strong(id.title());
            export = ui.small_button("PNG").clicked();
        });
        let axis = self.time_axis(id);
        let group = self.router.group(id);
        Plot::new(id.title())
            .height(height)
            .legend(Legend::default())
            .show(ui, |plot_ui| {
                for (idx, buf) in group.curves().iter().enumerate() {
                    let color = CURVE_COLORS[idx % CURVE_COLORS.len()];
                    let points = axis.points(buf);
                    if points.is_empty() {
                        continue;
                    }
                    plot_ui.line(
                        Line::new(PlotPoints::new(points))
                            .name(format!("Ch{}", idx))
                            .color(color),
                    );
                    let peaks = axis.peak_points(buf);
                    if !peaks.is_empty() {
                        plot_ui.points(
                            Points::new(PlotPoints::new(peaks))
                                .radius(3.0)
                                .color(Color32::YELLOW),
                        );
                    }
                }
            });
        if export {
            self.export_png(id);
        }
    }

    fn locator_toggles(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            for (curve, label) in [(0, "Hide signal"), (1, "Hide quadrature")] {
                let Some(buf) = self.router.group(PlotId::Locator).curve(curve) else {
                    continue;
                };
                let mut hidden = buf.is_hidden();
                if ui.checkbox(&mut hidden, label).changed() {
                    self.router.hide(PlotId::Locator, curve, hidden);
                }
            }
        });
    }
}

fn confirm_unsaved() -> bool {
    rfd::MessageDialog::new()
        .set_level(rfd::MessageLevel::Warning)
        .set_title("Unsaved data")
        .set_description("The last recording has not been saved. Save it now?")
        .set_buttons(rfd::MessageButtons::YesNo)
        .show()
        == rfd::MessageDialogResult::Yes
}

fn pick_snapshot_path() -> Option<PathBuf> {
    rfd::FileDialog::new()
        .add_filter("NumPy archive", &["npz"])
        .set_file_name("session.npz")
        .save_file()
}

fn format_countdown(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

impl eframe::App for RythmApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if ctx.input(|i| i.viewport().close_requested()) {
            self.shutdown(confirm_unsaved, pick_snapshot_path);
            return;
        }
        self.drain_messages();
        let pending = self.pending.load(Ordering::Relaxed);
        if self.is_running || pending > 0 {
            ctx.request_repaint_after(Duration::from_millis(50));
        }

        let mut visuals = egui::Visuals::dark();
        visuals.widgets.noninteractive.bg_fill = Color32::from_rgb(10, 10, 15);
        ctx.set_visuals(visuals);

        egui::SidePanel::left("L").min_width(280.0).show(ctx, |ui| {
            ui.add_space(10.0);
            ui.heading("Rythm");
            ui.label("Radar vital signs");
            ui.separator();

            self.settings_ui(ui);
            ui.separator();

            let (hr, br) = self.router.latest_rates();
            ui.label(RichText::new(format!("HBR  {hr:.0} bpm")).size(22.0).color(CURVE_COLORS[0]));
            ui.label(RichText::new(format!("BR   {br:.0} /min")).size(22.0).color(CURVE_COLORS[1]));
            let remaining = self.duration_ms.saturating_sub(self.elapsed_ms);
            ui.label(format!("Remaining {}", format_countdown(remaining)));
            ui.label(RichText::new(format!("Queued batches: {pending}")).small());
            if let Some(path) = &self.spill_path {
                ui.label(RichText::new(format!("Writing to {}", path.display())).small());
            }

            ui.add_space(10.0);
            ui.horizontal(|ui| {
                let btn_txt = if self.is_running { "⏹ STOP" } else { "▶ START" };
                if ui.button(btn_txt).clicked() {
                    if self.is_running {
                        self.tx_cmd.send(GuiCommand::StopSession).ok();
                    } else {
                        self.start_session();
                    }
                }
                if ui.button("💾 SAVE").clicked() {
                    self.save_now();
                }
            });

            ui.add_space(10.0);
            egui::ScrollArea::vertical()
                .max_height(160.0)
                .stick_to_bottom(true)
                .show(ui, |ui| {
                    for m in &self.log_messages {
                        ui.monospace(m);
                    }
                });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.selectable_value(&mut self.selected_tab, Tab::Rates, "HBR/BR");
                ui.selectable_value(&mut self.selected_tab, Tab::Locator, "Locator signal");
                ui.selectable_value(&mut self.selected_tab, Tab::Filtered, "Filtered data");
            });
            ui.separator();
            let half = (ui.available_height() - 60.0).max(120.0) / 2.0;
            match self.selected_tab {
                Tab::Rates => {
                    self.plot_group(ui, PlotId::HeartRate, half);
                    self.plot_group(ui, PlotId::BreathRate, half);
                }
                Tab::Locator => {
                    self.locator_toggles(ui);
                    self.plot_group(ui, PlotId::Locator, half * 2.0);
                }
                Tab::Filtered => {
                    self.plot_group(ui, PlotId::HeartFiltered, half);
                    self.plot_group(ui, PlotId::BreathFiltered, half);
                }
            }
        });
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::drivers::SampleBatch;

    fn app_with_data(save_on_exit: bool) -> (RythmApp, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            save_on_exit,
            ..AppConfig::default()
        };
        let app = RythmApp::new(config, dir.path().join("settings.json"));
        let batch = SampleBatch {
            ch0: vec![1.0, 2.0],
            ch1: vec![-1.0, -2.0],
            t: vec![0.0, 20.0],
            elapsed_ms: 10_000,
        };
        recorder::lock(&app.recorder).append(&batch).unwrap();
        (app, dir)
    }

    #[test]
    fn shutdown_joins_engine_then_saves_data_and_settings() {
        let (mut app, dir) = app_with_data(true);
        let target = dir.path().join("exit.npz");
        app.shutdown(|| true, || Some(target.clone()));
        assert!(app.engine.is_none());
        assert!(target.exists());
        assert!(!recorder::lock(&app.recorder).has_unsaved());
        assert!(dir.path().join("settings.json").exists());
        app.shutdown(|| panic!("shutdown runs once"), || None);
    }

    #[test]
    fn save_prompt_is_skipped_when_saving_is_disabled() {
        let (mut app, dir) = app_with_data(false);
        app.offer_save(|| panic!("no prompt when saving is off"), || None);
        app.shutdown(|| panic!("no prompt when saving is off"), || None);
        assert!(recorder::lock(&app.recorder).has_unsaved());
        let saved = AppConfig::load(&dir.path().join("settings.json")).unwrap();
        assert!(!saved.save_on_exit);
    }

    #[test]
    fn countdown_formats_minutes_and_seconds() {
        assert_eq!(format_countdown(0), "00:00");
        assert_eq!(format_countdown(59_999), "00:59");
        assert_eq!(format_countdown(30 * 60_000), "30:00");
    }
}
