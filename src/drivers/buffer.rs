/// Peak annotation in the buffer's logical coordinate space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Peak {
    pub index: u64,
    pub value: f64,
}
/// Fixed-capacity scrolling window for one plotted curve.
///
/// `origin` is the logical index of `samples[0]`. It only grows while the
/// window scrolls, so peak markers keep a stable position no matter how many
/// times old samples have been evicted. Units are left to the renderer.
#[derive(Clone, Debug)]
pub struct ScrollingBuffer {
    capacity: usize,
    samples: Vec<f64>,
    origin: u64,
    peaks: Vec<Peak>,
    hidden: bool,
}
impl ScrollingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: Vec::with_capacity(capacity),
            origin: 0,
            peaks: Vec::new(),
            hidden: false,
        }
    }
    pub fn len(&self) -> usize {
        self.samples.len()
    }
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
    pub fn origin(&self) -> u64 {
        self.origin
    }
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }
    pub fn peaks(&self) -> &[Peak] {
        &self.peaks
    }
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }
    /// What the renderer should draw right now. Empty while hidden.
    pub fn visible(&self) -> &[f64] {
        if self.hidden {
            &[]
        } else {
            &self.samples
        }
    }
    pub fn append_point(&mut self, value: f64) {
        if self.samples.len() < self.capacity {
            self.samples.push(value);
        } else {
            self.samples.copy_within(1.., 0);
            if let Some(last) = self.samples.last_mut() {
                *last = value;
            }
            self.origin += 1;
        }
    }
    /// Appends a block of samples and annotates `peak_indices` (positions
    /// within `data`, possibly fractional) in logical coordinates.
    pub fn append_batch(&mut self, data: &[f64], peak_indices: &[f64]) {
        // a batch wider than the window only contributes its tail
        let skipped = data.len().saturating_sub(self.capacity);
        let incoming = &data[skipped..];
        let overflow = self.capacity as i64 - (incoming.len() + self.samples.len()) as i64;
        if overflow < 0 {
            let drop = (-overflow) as usize;
            self.samples.drain(..drop);
            self.origin += drop as u64;
        }
        self.samples.extend_from_slice(incoming);
        self.origin += skipped as u64;
        self.append_peaks(data, peak_indices);
    }
    fn append_peaks(&mut self, data: &[f64], peak_indices: &[f64]) {
        let origin = self.origin;
        self.peaks.retain(|p| p.index >= origin);
        if data.is_empty() {
            return;
        }
        // logical index of data[0]; may sit below origin when the batch was clipped
        let data_begin = (origin + self.samples.len() as u64).saturating_sub(data.len() as u64);
        let last = data.len() - 1;
        for &raw in peak_indices {
            let rounded = (raw + 0.5).floor().max(0.0) as usize;
            let clamped = rounded.min(last);
            let index = data_begin + clamped as u64;
            if index >= origin {
                self.peaks.push(Peak {
                    index,
                    value: data[clamped],
                });
            }
        }
    }
    pub fn set_hidden(&mut self, hidden: bool) {
        self.hidden = hidden;
    }
    pub fn reset(&mut self) {
        self.samples.clear();
        self.peaks.clear();
        self.origin = 0;
    }
}
/// A plot holding one or more curves that share a capacity.
#[derive(Clone, Debug)]
pub struct PlotGroup {
    curves: Vec<ScrollingBuffer>,
}
impl PlotGroup {
    pub fn new(capacity: usize, curve_count: usize) -> Self {
        Self {
            curves: (0..curve_count.max(1))
                .map(|_| ScrollingBuffer::new(capacity))
                .collect(),
        }
    }
    pub fn curve(&self, index: usize) -> Option<&ScrollingBuffer> {
        self.curves.get(index)
    }
    pub fn curves(&self) -> &[ScrollingBuffer] {
        &self.curves
    }
    pub fn append_point(&mut self, curve: usize, value: f64) {
        if let Some(buf) = self.curves.get_mut(curve) {
            buf.append_point(value);
        }
    }
    pub fn append_batch(&mut self, curve: usize, data: &[f64], peaks: &[f64]) {
        if let Some(buf) = self.curves.get_mut(curve) {
            buf.append_batch(data, peaks);
        }
    }
    pub fn hide(&mut self, curve: usize, hidden: bool) {
        if let Some(buf) = self.curves.get_mut(curve) {
            buf.set_hidden(hidden);
        }
    }
    pub fn reset(&mut self) {
        for buf in &mut self.curves {
            buf.reset();
        }
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn point_appends_hold_capacity_and_advance_origin() {
        let mut buf = ScrollingBuffer::new(10);
        for i in 0..25u64 {
            buf.append_point(i as f64);
            let expected_origin = (i + 1).saturating_sub(10);
            assert!(buf.len() <= 10);
            assert_eq!(buf.origin(), expected_origin);
        }
        assert_eq!(buf.len(), 10);
        assert_eq!(buf.samples().first(), Some(&15.0));
        assert_eq!(buf.samples().last(), Some(&24.0));
    }
    #[test]
    fn three_batches_of_ten_into_capacity_25() {
        let mut buf = ScrollingBuffer::new(25);
        for b in 0..3 {
            let data: Vec<f64> = (0..10).map(|i| (b * 10 + i) as f64).collect();
            buf.append_batch(&data, &[]);
        }
        assert_eq!(buf.len(), 25);
        assert_eq!(buf.origin(), 5);
        assert_eq!(buf.samples()[0], 5.0);
        assert_eq!(buf.samples()[24], 29.0);
    }
    #[test]
    fn peaks_are_logical_and_pruned_on_scroll() {
        let mut buf = ScrollingBuffer::new(20);
        let first: Vec<f64> = (0..10).map(|i| i as f64).collect();
        buf.append_batch(&first, &[2.0, 7.4]);
        assert_eq!(
            buf.peaks(),
            &[
                Peak { index: 2, value: 2.0 },
                Peak { index: 7, value: 7.0 }
            ]
        );
        let second: Vec<f64> = (10..25).map(|i| i as f64).collect();
        buf.append_batch(&second, &[0.6]);
        // 25 appended into 20 slots: origin 5, the peak at 2 scrolled away
        assert_eq!(buf.origin(), 5);
        assert_eq!(
            buf.peaks(),
            &[
                Peak { index: 7, value: 7.0 },
                Peak { index: 11, value: 11.0 }
            ]
        );
        for p in buf.peaks() {
            assert!(p.index >= buf.origin());
            assert!(p.index < buf.origin() + buf.len() as u64);
        }
    }
    #[test]
    fn peak_indices_are_clamped_to_the_batch() {
        let mut buf = ScrollingBuffer::new(50);
        buf.append_batch(&[1.0, 2.0, 3.0], &[]);
        buf.append_batch(&[4.0, 5.0, 6.0], &[9.0, -3.0]);
        assert_eq!(
            buf.peaks(),
            &[
                Peak { index: 5, value: 6.0 },
                Peak { index: 3, value: 4.0 }
            ]
        );
    }
    #[test]
    fn oversized_batch_keeps_tail_and_drops_head_peaks() {
        let mut buf = ScrollingBuffer::new(5);
        buf.append_batch(&[0.0, 1.0], &[1.0]);
        let data: Vec<f64> = (2..10).map(|i| i as f64).collect();
        buf.append_batch(&data, &[0.0, 7.0]);
        assert_eq!(buf.samples(), &[5.0, 6.0, 7.0, 8.0, 9.0]);
        assert_eq!(buf.origin(), 5);
        assert_eq!(buf.peaks(), &[Peak { index: 9, value: 9.0 }]);
    }
    #[test]
    fn empty_batch_adds_no_peaks() {
        let mut buf = ScrollingBuffer::new(5);
        buf.append_batch(&[], &[0.0, 1.0]);
        assert!(buf.is_empty());
        assert!(buf.peaks().is_empty());
    }
    #[test]
    fn hide_never_discards_data() {
        let mut group = PlotGroup::new(300, 2);
        group.hide(0, true);
        for i in 0..5 {
            group.append_point(0, i as f64);
        }
        let curve = group.curve(0).unwrap();
        assert!(curve.visible().is_empty());
        assert_eq!(curve.len(), 5);
        group.hide(0, false);
        let curve = group.curve(0).unwrap();
        assert_eq!(curve.visible(), &[0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(curve.visible(), curve.samples());
    }
    #[test]
    fn reset_clears_every_curve() {
        let mut group = PlotGroup::new(3, 2);
        for i in 0..6 {
            group.append_point(0, i as f64);
        }
        group.append_batch(1, &[1.0, 2.0], &[1.0]);
        group.reset();
        for curve in group.curves() {
            assert!(curve.is_empty());
            assert!(curve.peaks().is_empty());
            assert_eq!(curve.origin(), 0);
        }
    }
}
