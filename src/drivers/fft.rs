use rustfft::{num_complex::Complex64, FftPlanner};
/// Magnitude spectrum of one real signal.
#[derive(Clone, Debug)]
pub struct FrequencySpectrum {
    pub frequencies_hz: Vec<f64>,
    pub magnitudes: Vec<f64>,
}
impl FrequencySpectrum {
    /// Frequency of the strongest bin inside `low_hz..=high_hz`.
    pub fn dominant_in(&self, low_hz: f64, high_hz: f64) -> Option<f64> {
        self.frequencies_hz
            .iter()
            .zip(&self.magnitudes)
            .filter(|(f, _)| **f >= low_hz && **f <= high_hz)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(f, _)| *f)
    }
    /// Bin-wise sum, used to pool both radar channels before peak search.
    pub fn combine(&self, other: &FrequencySpectrum) -> FrequencySpectrum {
        FrequencySpectrum {
            frequencies_hz: self.frequencies_hz.clone(),
            magnitudes: self
                .magnitudes
                .iter()
                .zip(&other.magnitudes)
                .map(|(a, b)| a + b)
                .collect(),
        }
    }
}
/// Helper that computes zero-padded FFTs at a fixed resolution.
pub struct SpectrumBuilder {
    fft_size: usize,
    sample_rate_hz: f64,
}
impl SpectrumBuilder {
    /// Picks a power-of-two size giving at least `resolution_hz` bin spacing
    /// and never shorter than the signal.
    pub fn for_resolution(sample_rate_hz: f64, signal_len: usize, resolution_hz: f64) -> Self {
        let wanted = (sample_rate_hz / resolution_hz).ceil() as usize;
        let fft_size = wanted.max(signal_len).max(2).next_power_of_two();
        Self {
            fft_size,
            sample_rate_hz,
        }
    }
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }
    pub fn compute(&self, signal: &[f64]) -> FrequencySpectrum {
        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(self.fft_size);
        let frequencies_hz = (0..self.fft_size / 2)
            .map(|k| k as f64 * self.sample_rate_hz / self.fft_size as f64)
            .collect();
        let mut buffer: Vec<Complex64> = signal
            .iter()
            .copied()
            .take(self.fft_size)
            .map(|v| Complex64::new(v, 0.0))
            .collect();
        buffer.resize(self.fft_size, Complex64::new(0.0, 0.0));
        fft.process(&mut buffer);
        let magnitudes = buffer
            .iter()
            .take(self.fft_size / 2)
            .map(|c| c.norm() / self.fft_size as f64)
            .collect();
        FrequencySpectrum {
            frequencies_hz,
            magnitudes,
        }
    }
}
