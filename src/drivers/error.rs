use std::path::PathBuf;
use thiserror::Error;
#[derive(Debug, Error)]
pub enum RythmError {
    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),
    #[error("failed to write {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write session snapshot: {0}")]
    Snapshot(#[from] ndarray_npy::WriteNpzError),
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("malformed frame from device: {0}")]
    Frame(String),
    #[error("failed to render plot: {0}")]
    Plot(String),
}
/// Failures raised by an extractor for a single batch. The dispatcher
/// swallows these and publishes a neutral result instead.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("batch too short: {samples} samples, need at least {required}")]
    TooShort { samples: usize, required: usize },
    #[error("channel length mismatch: ch0 has {ch0}, ch1 has {ch1}")]
    ChannelMismatch { ch0: usize, ch1: usize },
    #[error("calculation interval must be positive, got {0}s")]
    InvalidInterval(f64),
    #[error("invalid band {low}..{high} Hz")]
    InvalidBand { low: f64, high: f64 },
    #[error("non-finite sample in input")]
    NonFinite,
}
impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for RythmError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        RythmError::Plot(format!("{value:?}"))
    }
}
impl From<image::ImageError> for RythmError {
    fn from(value: image::ImageError) -> Self {
        RythmError::Plot(value.to_string())
    }
}
