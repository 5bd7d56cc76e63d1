use serde::{Deserialize, Serialize};
use crate::drivers::error::ExtractionError;
use crate::drivers::fft::SpectrumBuilder;
use crate::drivers::filter::{FilterChain, FilterKind};
use crate::drivers::RythmError;
/// Raw ADC counts are divided by this before extraction.
pub const NORMALIZATION: f64 = 8000.0;
/// Filtered signals are thinned to every Nth sample before display.
pub const DOWNSAMPLE_STRIDE: usize = 5;
/// Pass-band cutoffs in Hz. Opaque to the pipeline; handed to the extractor as-is.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterBands {
    pub low_heart_hz: f64,
    pub high_heart_hz: f64,
    pub low_breath_hz: f64,
    pub high_breath_hz: f64,
}
impl Default for FilterBands {
    fn default() -> Self {
        Self {
            low_heart_hz: 0.7,
            high_heart_hz: 2.5,
            low_breath_hz: 0.01,
            high_breath_hz: 0.4,
        }
    }
}
impl FilterBands {
    pub fn validate(&self) -> Result<(), RythmError> {
        let bands = [
            ("heart", self.low_heart_hz, self.high_heart_hz),
            ("breath", self.low_breath_hz, self.high_breath_hz),
        ];
        for (name, low, high) in bands {
            if !(low.is_finite() && high.is_finite()) || low <= 0.0 || low >= high {
                return Err(RythmError::ConfigurationInvalid(format!(
                    "{name} band must satisfy 0 < low < high, got {low}..{high} Hz"
                )));
            }
        }
        Ok(())
    }
}
/// What an extractor hands back, at full sample resolution.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Extraction {
    pub heart_rate: f64,
    pub breath_rate: f64,
    pub heart: [Vec<f64>; 2],
    pub breath: [Vec<f64>; 2],
    pub heart_peaks: [Vec<usize>; 2],
    pub breath_peaks: [Vec<usize>; 2],
}
/// Published result. Signals are downsampled and peak indices are expressed
/// in downsampled units.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExtractionResult {
    pub heart_rate: f64,
    pub breath_rate: f64,
    pub heart: [Vec<f64>; 2],
    pub breath: [Vec<f64>; 2],
    pub heart_peaks: [Vec<f64>; 2],
    pub breath_peaks: [Vec<f64>; 2],
}
impl ExtractionResult {
    /// Zero rates, no signals, no peaks.
    pub fn neutral() -> Self {
        Self::default()
    }
    pub fn is_neutral(&self) -> bool {
        *self == Self::neutral()
    }
}
impl From<Extraction> for ExtractionResult {
    fn from(raw: Extraction) -> Self {
        Self {
            heart_rate: raw.heart_rate,
            breath_rate: raw.breath_rate,
            heart: raw.heart.map(|s| downsample(&s)),
            breath: raw.breath.map(|s| downsample(&s)),
            heart_peaks: raw.heart_peaks.map(|p| rescale_peaks(&p)),
            breath_peaks: raw.breath_peaks.map(|p| rescale_peaks(&p)),
        }
    }
}
pub fn downsample(signal: &[f64]) -> Vec<f64> {
    signal.iter().step_by(DOWNSAMPLE_STRIDE).copied().collect()
}
pub fn rescale_peaks(peaks: &[usize]) -> Vec<f64> {
    peaks
        .iter()
        .map(|&p| p as f64 / DOWNSAMPLE_STRIDE as f64)
        .collect()
}
/// Vital-sign extraction over one normalized batch.
pub trait Extractor: Send {
    fn extract(
        &mut self,
        ch0: &[f64],
        ch1: &[f64],
        interval_secs: f64,
        bands: &FilterBands,
    ) -> Result<Extraction, ExtractionError>;
}
impl<F> Extractor for F
where
    F: FnMut(&[f64], &[f64], f64, &FilterBands) -> Result<Extraction, ExtractionError> + Send,
{
    fn extract(
        &mut self,
        ch0: &[f64],
        ch1: &[f64],
        interval_secs: f64,
        bands: &FilterBands,
    ) -> Result<Extraction, ExtractionError> {
        self(ch0, ch1, interval_secs, bands)
    }
}
/// Band-pass both channels per band, take the rate from the strongest
/// spectral line in the band and mark local maxima as peaks.
#[derive(Clone, Debug)]
pub struct BandpassExtractor {
    pub min_samples: usize,
    pub resolution_hz: f64,
}
impl Default for BandpassExtractor {
    fn default() -> Self {
        Self {
            min_samples: 64,
            resolution_hz: 0.01,
        }
    }
}
impl BandpassExtractor {
    fn band(
        &self,
        ch0: &[f64],
        ch1: &[f64],
        sample_rate_hz: f64,
        low_hz: f64,
        high_hz: f64,
    ) -> (f64, [Vec<f64>; 2], [Vec<usize>; 2]) {
        let chain = FilterChain::from_kinds(sample_rate_hz, &[FilterKind::Band { low_hz, high_hz }]);
        let filtered = [chain.filtfilt(ch0), chain.filtfilt(ch1)];
        let builder = SpectrumBuilder::for_resolution(sample_rate_hz, ch0.len(), self.resolution_hz);
        let spectrum = builder
            .compute(&filtered[0])
            .combine(&builder.compute(&filtered[1]));
        let rate = spectrum
            .dominant_in(low_hz, high_hz)
            .map(|hz| hz * 60.0)
            .unwrap_or(0.0);
        // refractory distance: half the shortest period allowed by the band
        let min_distance = ((sample_rate_hz / high_hz) * 0.5).floor().max(1.0) as usize;
        let peaks = [
            find_peaks(&filtered[0], min_distance),
            find_peaks(&filtered[1], min_distance),
        ];
        (rate, filtered, peaks)
    }
}
impl Extractor for BandpassExtractor {
    fn extract(
        &mut self,
        ch0: &[f64],
        ch1: &[f64],
        interval_secs: f64,
        bands: &FilterBands,
    ) -> Result<Extraction, ExtractionError> {
        if ch0.len() != ch1.len() {
            return Err(ExtractionError::ChannelMismatch {
                ch0: ch0.len(),
                ch1: ch1.len(),
            });
        }
        if ch0.len() < self.min_samples {
            return Err(ExtractionError::TooShort {
                samples: ch0.len(),
                required: self.min_samples,
            });
        }
        if !(interval_secs > 0.0) {
            return Err(ExtractionError::InvalidInterval(interval_secs));
        }
        if ch0.iter().chain(ch1).any(|v| !v.is_finite()) {
            return Err(ExtractionError::NonFinite);
        }
        for (low, high) in [
            (bands.low_heart_hz, bands.high_heart_hz),
            (bands.low_breath_hz, bands.high_breath_hz),
        ] {
            if !(low > 0.0 && low < high) {
                return Err(ExtractionError::InvalidBand { low, high });
            }
        }
        let fs = ch0.len() as f64 / interval_secs;
        let (heart_rate, heart, heart_peaks) =
            self.band(ch0, ch1, fs, bands.low_heart_hz, bands.high_heart_hz);
        let (breath_rate, breath, breath_peaks) =
            self.band(ch0, ch1, fs, bands.low_breath_hz, bands.high_breath_hz);
        Ok(Extraction {
            heart_rate,
            breath_rate,
            heart,
            breath,
            heart_peaks,
            breath_peaks,
        })
    }
}
/// Positive local maxima at least `min_distance` samples apart; the taller
/// one wins when two candidates are closer than that.
pub fn find_peaks(signal: &[f64], min_distance: usize) -> Vec<usize> {
    let mut peaks: Vec<usize> = Vec::new();
    for i in 1..signal.len().saturating_sub(1) {
        let v = signal[i];
        if !(v > 0.0 && v > signal[i - 1] && v >= signal[i + 1]) {
            continue;
        }
        match peaks.last_mut() {
            Some(last) if i - *last < min_distance => {
                if v > signal[*last] {
                    *last = i;
                }
            }
            _ => peaks.push(i),
        }
    }
    peaks
}
