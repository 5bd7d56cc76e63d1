// src/types.rs
use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use crate::drivers::{ExtractionResult, FilterBands, LocatorReading};

// where samples come from
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub enum ConnectionMode {
    #[default]
    Simulation,
    Hardware,
}

// everything the engine needs to run one session
#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    pub mode: ConnectionMode,
    pub port: String,
    pub duration_min: u32,
    pub interval_s: u32,
    pub bands: FilterBands,
}

// GUI -> engine
#[derive(Clone, Debug)]
pub enum GuiCommand {
    StartSession(SessionConfig),
    StopSession,
    // applies to batches submitted from now on
    SetFilterBands(FilterBands),
}

// engine / extraction worker -> GUI
#[derive(Clone, Debug)]
pub enum PipelineMessage {
    Log(String),
    // spill_path is set when the session streams to a text file
    SessionStarted {
        duration_ms: u64,
        spill_path: Option<PathBuf>,
    },
    SessionFinished,
    // session time in ms, once per second
    TimeUpdate(u64),
    Locator(LocatorReading),
    Extraction(ExtractionResult),
}

impl From<ExtractionResult> for PipelineMessage {
    fn from(result: ExtractionResult) -> Self {
        PipelineMessage::Extraction(result)
    }
}
