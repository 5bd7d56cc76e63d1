use std::time::Duration;
use crate::drivers::source::{
    LocatorReading, RadarSource, SampleBatch, SourceEvent, SIM_SAMPLE_RATE_HZ,
};
use crate::drivers::RythmError;
#[derive(Clone, Debug, PartialEq)]
pub enum BridgeEvent {
    Batch(SampleBatch),
    Locator(LocatorReading),
    /// Whole-second countdown tick, carries session time in ms.
    Tick(u64),
}
/// Turns the raw device stream into interval-sized batches.
///
/// Locator readings are forwarded as soon as they are polled. Samples are
/// held until the calculation interval elapses and then cut as one batch.
///
/// A poll can return many samples at once, so they are stamped backwards
/// from the poll time at the sample period. When a burst does not fit
/// between the previous stamp and now, it is spread evenly over that gap so
/// `t` stays strictly increasing.
pub struct AcquisitionBridge<S: RadarSource> {
    source: S,
    interval_ms: u64,
    next_cut_ms: u64,
    last_tick_s: u64,
    sample_period_ms: f64,
    last_t: Option<f64>,
    current: SampleBatch,
}
impl<S: RadarSource> AcquisitionBridge<S> {
    pub fn new(source: S, interval: Duration) -> Self {
        let interval_ms = (interval.as_millis() as u64).max(1);
        Self {
            source,
            interval_ms,
            next_cut_ms: interval_ms,
            last_tick_s: 0,
            sample_period_ms: 1000.0 / SIM_SAMPLE_RATE_HZ,
            last_t: None,
            current: SampleBatch::default(),
        }
    }
    /// Samples collected towards the next batch.
    pub fn buffered(&self) -> usize {
        self.current.len()
    }
    pub fn pump(&mut self, elapsed: Duration) -> Result<Vec<BridgeEvent>, RythmError> {
        let elapsed_ms = elapsed.as_millis() as u64;
        let mut out = Vec::new();
        let events = self.source.poll()?;
        let n = events
            .iter()
            .filter(|e| matches!(e, SourceEvent::Sample { .. }))
            .count();
        let now = elapsed_ms as f64;
        let span = match self.last_t {
            Some(last) => (now - last) / n.max(1) as f64,
            None if n > 1 => now / (n - 1) as f64,
            None => self.sample_period_ms,
        };
        let step = self.sample_period_ms.min(span.max(0.0));
        let mut remaining = n;
        for event in events {
            match event {
                SourceEvent::Sample { ch0, ch1 } => {
                    remaining -= 1;
                    let t = now - remaining as f64 * step;
                    self.current.ch0.push(ch0);
                    self.current.ch1.push(ch1);
                    self.current.t.push(t);
                    self.last_t = Some(t);
                }
                SourceEvent::Locator(reading) => out.push(BridgeEvent::Locator(reading)),
            }
        }
        let seconds = elapsed_ms / 1000;
        if seconds > self.last_tick_s {
            self.last_tick_s = seconds;
            out.push(BridgeEvent::Tick(seconds * 1000));
        }
        while elapsed_ms >= self.next_cut_ms {
            let mut batch = std::mem::take(&mut self.current);
            batch.elapsed_ms = self.next_cut_ms;
            self.next_cut_ms += self.interval_ms;
            if batch.is_empty() {
                log::warn!("no samples received during interval ending at {} ms", batch.elapsed_ms);
                continue;
            }
            out.push(BridgeEvent::Batch(batch));
        }
        Ok(out)
    }
}
