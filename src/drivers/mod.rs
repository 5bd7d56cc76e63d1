// src/drivers/mod.rs
// signal-path building blocks, from device source to plotted buffers
pub mod bridge;
pub mod buffer;
pub mod dispatcher;
pub mod error;
pub mod extractor;
pub mod fft;
pub mod filter;
pub mod plot;
pub mod router;
pub mod source;
pub use bridge::{AcquisitionBridge, BridgeEvent};
pub use dispatcher::ExtractionDispatcher;
pub use error::RythmError;
pub use extractor::{BandpassExtractor, ExtractionResult, FilterBands};
pub use plot::{render_group_png, PlotStyle, TimeAxis};
pub use router::{DisplayRouter, PlotId};
pub use source::{LocatorReading, RadarSource, SampleBatch, SerialSource, SimulatedRadar};
