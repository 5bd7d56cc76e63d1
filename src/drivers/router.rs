use crate::drivers::buffer::PlotGroup;
use crate::drivers::extractor::ExtractionResult;
use crate::drivers::source::LocatorReading;
pub const RATE_CAPACITY: usize = 30;
pub const LOCATOR_CAPACITY: usize = 300;
pub const FILTERED_CAPACITY: usize = 300;
/// Identifies one of the plots the router feeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlotId {
    HeartRate,
    BreathRate,
    Locator,
    HeartFiltered,
    BreathFiltered,
}
impl PlotId {
    pub const ALL: [PlotId; 5] = [
        PlotId::HeartRate,
        PlotId::BreathRate,
        PlotId::Locator,
        PlotId::HeartFiltered,
        PlotId::BreathFiltered,
    ];
    pub fn title(self) -> &'static str {
        match self {
            PlotId::HeartRate => "Heart rate",
            PlotId::BreathRate => "Breathing rate",
            PlotId::Locator => "Locator signal",
            PlotId::HeartFiltered => "Heart-band filtered",
            PlotId::BreathFiltered => "Breath-band filtered",
        }
    }
}
/// Sole writer of the plotted buffers.
pub struct DisplayRouter {
    heart_rate: PlotGroup,
    breath_rate: PlotGroup,
    locator: PlotGroup,
    heart_filtered: PlotGroup,
    breath_filtered: PlotGroup,
    latest_rates: (f64, f64),
}
impl Default for DisplayRouter {
    fn default() -> Self {
        Self::new()
    }
}
impl DisplayRouter {
    pub fn new() -> Self {
        Self {
            heart_rate: PlotGroup::new(RATE_CAPACITY, 1),
            breath_rate: PlotGroup::new(RATE_CAPACITY, 1),
            locator: PlotGroup::new(LOCATOR_CAPACITY, 2),
            heart_filtered: PlotGroup::new(FILTERED_CAPACITY, 2),
            breath_filtered: PlotGroup::new(FILTERED_CAPACITY, 2),
            latest_rates: (0.0, 0.0),
        }
    }
    pub fn group(&self, id: PlotId) -> &PlotGroup {
        match id {
            PlotId::HeartRate => &self.heart_rate,
            PlotId::BreathRate => &self.breath_rate,
            PlotId::Locator => &self.locator,
            PlotId::HeartFiltered => &self.heart_filtered,
            PlotId::BreathFiltered => &self.breath_filtered,
        }
    }
    fn group_mut(&mut self, id: PlotId) -> &mut PlotGroup {
        match id {
            PlotId::HeartRate => &mut self.heart_rate,
            PlotId::BreathRate => &mut self.breath_rate,
            PlotId::Locator => &mut self.locator,
            PlotId::HeartFiltered => &mut self.heart_filtered,
            PlotId::BreathFiltered => &mut self.breath_filtered,
        }
    }
    /// Last heart and breathing rate received, for the numeric read-out.
    pub fn latest_rates(&self) -> (f64, f64) {
        self.latest_rates
    }
    pub fn on_extraction(&mut self, result: &ExtractionResult) {
        self.latest_rates = (result.heart_rate, result.breath_rate);
        self.heart_rate.append_point(0, result.heart_rate);
        self.breath_rate.append_point(0, result.breath_rate);
        for curve in 0..2 {
            self.heart_filtered
                .append_batch(curve, &result.heart[curve], &result.heart_peaks[curve]);
            self.breath_filtered
                .append_batch(curve, &result.breath[curve], &result.breath_peaks[curve]);
        }
    }
    pub fn on_locator(&mut self, reading: LocatorReading) {
        self.locator.append_point(0, reading.signal);
        self.locator.append_point(1, reading.quadrature);
    }
    pub fn hide(&mut self, id: PlotId, curve: usize, hidden: bool) {
        self.group_mut(id).hide(curve, hidden);
    }
    /// Clears every plot and seeds the rate curves with a zero so the first
    /// real rate draws as a segment.
    pub fn start_session(&mut self) {
        for id in PlotId::ALL {
            self.group_mut(id).reset();
        }
        self.latest_rates = (0.0, 0.0);
        self.heart_rate.append_point(0, 0.0);
        self.breath_rate.append_point(0, 0.0);
    }
}
