use std::f64::consts::PI;
use std::io::Read;
use std::time::{Duration, Instant};
use rand::Rng;
use crate::drivers::RythmError;
/// One calculation interval worth of raw two-channel readings.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SampleBatch {
    pub ch0: Vec<f64>,
    pub ch1: Vec<f64>,
    /// Per-sample arrival time, milliseconds since session start.
    pub t: Vec<f64>,
    /// Session time at which the batch was cut.
    pub elapsed_ms: u64,
}
impl SampleBatch {
    pub fn len(&self) -> usize {
        self.ch0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.ch0.is_empty()
    }
}
/// Auxiliary scalar pair shown on the locator plot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocatorReading {
    pub signal: f64,
    pub quadrature: f64,
}
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SourceEvent {
    Sample { ch0: f64, ch1: f64 },
    Locator(LocatorReading),
}
/// Anything that can hand over whatever the device produced since the last poll.
pub trait RadarSource {
    fn poll(&mut self) -> Result<Vec<SourceEvent>, RythmError>;
}
impl<S: RadarSource + ?Sized> RadarSource for Box<S> {
    fn poll(&mut self) -> Result<Vec<SourceEvent>, RythmError> {
        (**self).poll()
    }
}
/// Replays canned polls, one `Vec` per call.
#[cfg(test)]
pub struct ManualSource {
    queue: std::collections::VecDeque<Vec<SourceEvent>>,
}
#[cfg(test)]
impl ManualSource {
    pub fn new(polls: impl IntoIterator<Item = Vec<SourceEvent>>) -> Self {
        Self {
            queue: polls.into_iter().collect(),
        }
    }
}
#[cfg(test)]
impl RadarSource for ManualSource {
    fn poll(&mut self) -> Result<Vec<SourceEvent>, RythmError> {
        Ok(self.queue.pop_front().unwrap_or_default())
    }
}
pub const SIM_SAMPLE_RATE_HZ: f64 = 50.0;
/// Synthetic quadrature radar: chest motion from breathing plus a smaller
/// heartbeat component, with a bit of noise on both channels.
pub struct SimulatedRadar {
    started_at: Instant,
    emitted: u64,
    breath_hz: f64,
    heart_hz: f64,
}
impl SimulatedRadar {
    pub fn new() -> Self {
        Self::with_rates(15.0, 72.0)
    }
    pub fn with_rates(breaths_per_min: f64, beats_per_min: f64) -> Self {
        Self {
            started_at: Instant::now(),
            emitted: 0,
            breath_hz: breaths_per_min / 60.0,
            heart_hz: beats_per_min / 60.0,
        }
    }
    fn sample_at(&self, n: u64, noise: f64) -> (f64, f64) {
        let t = n as f64 / SIM_SAMPLE_RATE_HZ;
        let motion = 1.5 * (2.0 * PI * self.breath_hz * t).sin()
            + 0.12 * (2.0 * PI * self.heart_hz * t).sin();
        let ch0 = 3000.0 * motion.cos() + noise;
        let ch1 = 3000.0 * motion.sin() - noise;
        (ch0, ch1)
    }
}
impl Default for SimulatedRadar {
    fn default() -> Self {
        Self::new()
    }
}
impl RadarSource for SimulatedRadar {
    fn poll(&mut self) -> Result<Vec<SourceEvent>, RythmError> {
        let due = (self.started_at.elapsed().as_secs_f64() * SIM_SAMPLE_RATE_HZ) as u64;
        let mut rng = rand::thread_rng();
        let mut events = Vec::new();
        while self.emitted < due {
            let (ch0, ch1) = self.sample_at(self.emitted, rng.gen_range(-20.0..20.0));
            events.push(SourceEvent::Sample { ch0, ch1 });
            events.push(SourceEvent::Locator(LocatorReading {
                signal: ch0,
                quadrature: ch1,
            }));
            self.emitted += 1;
        }
        Ok(events)
    }
}
/// Line-framed ASCII device link: `"<ch0> <ch1>"` per sample and
/// `"L <signal> <quadrature>"` per locator packet.
pub struct SerialSource {
    port: Box<dyn serialport::SerialPort>,
    pending: String,
}
impl SerialSource {
    pub const BAUD_RATE: u32 = 115_200;
    pub fn open(port_name: &str) -> anyhow::Result<Self> {
        use anyhow::Context;
        let port = serialport::new(port_name, Self::BAUD_RATE)
            .timeout(Duration::from_millis(10))
            .open()
            .with_context(|| format!("failed to open serial port {port_name}"))?;
        Ok(Self {
            port,
            pending: String::new(),
        })
    }
    pub fn available_ports() -> Vec<String> {
        serialport::available_ports()
            .map(|ports| ports.into_iter().map(|p| p.port_name).collect())
            .unwrap_or_default()
    }
}
impl RadarSource for SerialSource {
    fn poll(&mut self) -> Result<Vec<SourceEvent>, RythmError> {
        let mut chunk = [0u8; 1024];
        match self.port.read(&mut chunk) {
            Ok(n) => self.pending.push_str(&String::from_utf8_lossy(&chunk[..n])),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => return Err(RythmError::Serial(e.into())),
        }
        Ok(drain_lines(&mut self.pending))
    }
}
/// Longest partial line kept while waiting for its newline.
pub const MAX_PENDING_BYTES: usize = 4096;
/// Parses every complete line in `pending`, leaving a trailing partial line
/// in place. Malformed lines are logged and skipped. A partial line longer
/// than [`MAX_PENDING_BYTES`] is discarded.
pub fn drain_lines(pending: &mut String) -> Vec<SourceEvent> {
    let Some(last_newline) = pending.rfind('\n') else {
        discard_oversized(pending);
        return Vec::new();
    };
    let complete: String = pending.drain(..=last_newline).collect();
    let events: Vec<SourceEvent> = complete
        .lines()
        .filter_map(|line| match parse_frame(line) {
            Ok(event) => event,
            Err(e) => {
                log::debug!("{e}");
                None
            }
        })
        .collect();
    discard_oversized(pending);
    events
}
fn discard_oversized(pending: &mut String) {
    if pending.len() > MAX_PENDING_BYTES {
        log::warn!("dropping {} bytes of unterminated serial data", pending.len());
        pending.clear();
    }
}
pub fn parse_frame(line: &str) -> Result<Option<SourceEvent>, RythmError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let mut fields = line.split_whitespace();
    let locator = line.starts_with('L');
    if locator {
        fields.next();
    }
    let mut number = || -> Result<f64, RythmError> {
        fields
            .next()
            .and_then(|f| f.parse::<f64>().ok())
            .ok_or_else(|| RythmError::Frame(line.to_owned()))
    };
    let (a, b) = (number()?, number()?);
    Ok(Some(if locator {
        SourceEvent::Locator(LocatorReading {
            signal: a,
            quadrature: b,
        })
    } else {
        SourceEvent::Sample { ch0: a, ch1: b }
    }))
}
