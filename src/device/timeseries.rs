/// An append-only, timestamped sample sequence for a single device metric.
use std::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    samples: Vec<(f32, Instant)>,
}

impl TimeSeries {
    pub fn new() -> Self {
        TimeSeries { samples: Vec::new() }
    }

    /// Appends a sample. Timestamps are expected to be monotonic non-decreasing in
    /// insertion order, matching the order frames were observed by the listener.
    pub fn push(&mut self, value: f32, ts: Instant) {
        self.samples.push((value, ts));
    }

    pub fn values(&self) -> impl Iterator<Item = f32> + '_ {
        self.samples.iter().map(|(v, _)| *v)
    }

    pub fn timestamps(&self) -> impl Iterator<Item = Instant> + '_ {
        self.samples.iter().map(|(_, ts)| *ts)
    }

    pub fn latest(&self) -> Option<(f32, Instant)> {
        self.samples.last().copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Expresses every sample's timestamp as milliseconds elapsed since `start`,
    /// the shape a persistence collaborator (e.g. an HDF5 writer) would consume
    /// alongside `values()` under `/TIMESTAMP/<device>/<metric>`.
    pub fn millis_since(&self, start: Instant) -> Vec<u64> {
        self.samples
            .iter()
            .map(|(_, ts)| ts.saturating_duration_since(start).as_millis() as u64)
            .collect()
    }
}

impl Default for TimeSeries {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    #[test]
    fn timestamps_stay_in_insertion_order() {
        let mut ts = TimeSeries::new();
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_millis(10);
        ts.push(1.0, t0);
        ts.push(2.0, t1);
        let stamps: Vec<_> = ts.timestamps().collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(ts.values().collect::<Vec<_>>(), vec![1.0, 2.0]);
    }

    #[test]
    fn latest_returns_last_pushed() {
        let mut ts = TimeSeries::new();
        let t0 = Instant::now();
        ts.push(1.0, t0);
        ts.push(2.0, t0);
        assert_eq!(ts.latest().unwrap().0, 2.0);
    }

    #[test]
    fn millis_since_start_is_monotonic() {
        let mut ts = TimeSeries::new();
        let start = Instant::now();
        ts.push(1.0, start + Duration::from_millis(5));
        ts.push(2.0, start + Duration::from_millis(15));
        assert_eq!(ts.millis_since(start), vec![5, 15]);
    }
}
