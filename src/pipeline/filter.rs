use serde::Serialize;
use std::collections::VecDeque;
use tracing::debug;

use crate::core::record::ClassifiedEvent;
use crate::core::types::EventType;
use crate::pipeline::metrics::RunMetrics;

/// Default number of candidate pairs kept in the duplicate window
pub const DEFAULT_WINDOW_CAPACITY: usize = 100_000;

#[derive(Debug, Clone, Serialize)]
pub struct FilterConfig {
    /// Suppress repeated VALID pairs as PCR duplicates
    pub remove_duplicates: bool,

    /// Two pairs are duplicates when both ends lie within this many bp
    pub duplicate_tolerance: u64,

    /// Upper bound on pairs held in the lookback window
    pub window_capacity: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            remove_duplicates: true,
            duplicate_tolerance: 0,
            window_capacity: DEFAULT_WINDOW_CAPACITY,
        }
    }
}

/// `(chr1, pos1, chr2, pos2)` of a canonical pair
pub type PairKey = (usize, u64, usize, u64);

/// Bounded lookback over recently accepted pairs of a coordinate-sorted stream.
///
/// Entries are kept in arrival order, which is ascending `(chr1, pos1)`. An
/// entry leaves the window once the stream has moved to another `chr1` or more
/// than `tolerance` bp past its `pos1`, since no later pair can match it.
#[derive(Debug)]
pub struct DuplicateWindow {
    tolerance: u64,
    capacity: usize,
    entries: VecDeque<PairKey>,
    overflowed: u64,
}

impl DuplicateWindow {
    pub fn new(tolerance: u64, capacity: usize) -> Self {
        Self {
            tolerance,
            capacity: capacity.max(1),
            entries: VecDeque::new(),
            overflowed: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries dropped because the window was full rather than out of reach
    pub fn overflowed(&self) -> u64 {
        self.overflowed
    }

    /// Returns `true` if `key` duplicates a pair already in the window;
    /// otherwise remembers it and returns `false`.
    pub fn check(&mut self, key: PairKey) -> bool {
        let (c1, p1, c2, p2) = key;
        let tol = self.tolerance;

        while let Some(&(fc1, fp1, _, _)) = self.entries.front() {
            if fc1 != c1 || p1 > fp1.saturating_add(tol) {
                self.entries.pop_front();
            } else {
                break;
            }
        }

        let duplicate = self.entries.iter().any(|&(ec1, ep1, ec2, ep2)| {
            ec1 == c1 && ec2 == c2 && ep1.abs_diff(p1) <= tol && ep2.abs_diff(p2) <= tol
        });
        if duplicate {
            return true;
        }

        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            self.overflowed += 1;
            if self.overflowed == 1 {
                debug!(capacity = self.capacity, "duplicate window full, evicting oldest pairs");
            }
        }
        self.entries.push_back(key);
        false
    }
}

/// Decides which classified events reach the matrix, counting every event it sees
#[derive(Debug)]
pub struct EventFilter {
    config: FilterConfig,
    window: DuplicateWindow,
    metrics: RunMetrics,
}

impl EventFilter {
    pub fn new(config: FilterConfig) -> Self {
        let window = DuplicateWindow::new(config.duplicate_tolerance, config.window_capacity);
        Self {
            config,
            window,
            metrics: RunMetrics::new(),
        }
    }

    /// Count `event` and return whether it should be added to the matrix
    pub fn accept(&mut self, event: &ClassifiedEvent) -> bool {
        match event.event {
            EventType::Valid => {}
            EventType::Uncut
            | EventType::Loop
            | EventType::Religation
            | EventType::SelfCircle
            | EventType::DanglingEnd
            | EventType::ExtraDangling
            | EventType::TooShort
            | EventType::TooClose
            | EventType::Unknown => {
                self.metrics.record(event.event);
                return false;
            }
        }

        if self.config.remove_duplicates && self.window.check(event.pair.sort_key()) {
            self.metrics.record_duplicate();
            return false;
        }

        self.metrics.record_valid(event.is_cis());
        true
    }

    /// Count a record that could not be turned into a pair
    pub fn record_error(&mut self) {
        self.metrics.record_error();
    }

    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }

    pub fn window(&self) -> &DuplicateWindow {
        &self.window
    }

    pub fn into_metrics(self) -> RunMetrics {
        let mut metrics = self.metrics;
        metrics.duplicate_window_overflows = self.window.overflowed();
        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::{AlignedEnd, ReadPair};
    use crate::core::types::Strand;

    fn valid(c1: usize, p1: u64, c2: usize, p2: u64) -> ClassifiedEvent {
        ClassifiedEvent {
            pair: ReadPair::new(
                "r",
                AlignedEnd::mapped(c1, p1, Strand::Forward),
                AlignedEnd::mapped(c2, p2, Strand::Reverse),
            ),
            event: EventType::Valid,
            fragments: Some((0, 1)),
            bins: vec![(0, 1)],
            distance: None,
        }
    }

    #[test]
    fn test_duplicate_counted_once() {
        let mut filter = EventFilter::new(FilterConfig::default());
        assert!(filter.accept(&valid(0, 1000, 1, 2000)));
        assert!(!filter.accept(&valid(0, 1000, 1, 2000)));

        let metrics = filter.metrics();
        assert_eq!(metrics.accepted(), 1);
        assert_eq!(metrics.pcr_duplicates, 1);
        assert_eq!(metrics.valid_trans, 1);
        assert_eq!(metrics.counted(), metrics.total);
    }

    #[test]
    fn test_artifacts_rejected_and_counted() {
        let mut filter = EventFilter::new(FilterConfig::default());
        for event in EventType::ALL {
            let mut e = valid(0, 10, 0, 5000);
            e.event = event;
            assert_eq!(filter.accept(&e), event == EventType::Valid);
        }
        filter.record_error();

        let metrics = filter.into_metrics();
        assert_eq!(metrics.total, 11);
        assert_eq!(metrics.count(EventType::Unknown), 2);
        assert_eq!(metrics.record_errors, 1);
        assert_eq!(metrics.valid_cis, 1);
        assert_eq!(metrics.counted(), 11);
    }

    #[test]
    fn test_duplicates_kept_when_disabled() {
        let config = FilterConfig {
            remove_duplicates: false,
            ..FilterConfig::default()
        };
        let mut filter = EventFilter::new(config);
        assert!(filter.accept(&valid(0, 1000, 1, 2000)));
        assert!(filter.accept(&valid(0, 1000, 1, 2000)));
        assert_eq!(filter.metrics().pcr_duplicates, 0);
    }

    #[test]
    fn test_window_overflow_reaches_metrics() {
        let config = FilterConfig {
            window_capacity: 2,
            ..FilterConfig::default()
        };
        let mut filter = EventFilter::new(config);
        for p2 in [2000, 3000, 4000, 5000] {
            assert!(filter.accept(&valid(0, 1000, 1, p2)));
        }
        // Evicted while still within reach, so no longer recognized
        assert!(filter.accept(&valid(0, 1000, 1, 2000)));

        let metrics = filter.into_metrics();
        assert_eq!(metrics.duplicate_window_overflows, 3);
        assert_eq!(metrics.pcr_duplicates, 0);
    }

    #[test]
    fn test_window_tolerance() {
        let mut window = DuplicateWindow::new(2, 100);
        assert!(!window.check((0, 100, 0, 900)));
        assert!(window.check((0, 101, 0, 902)));
        assert!(!window.check((0, 101, 0, 903)));
        // Moving past tolerance evicts the first entry
        assert!(!window.check((0, 104, 0, 900)));
        assert_eq!(window.len(), 1);
        // A new chromosome clears the window
        assert!(!window.check((1, 0, 1, 10)));
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_window_is_bounded() {
        let mut window = DuplicateWindow::new(0, 3);
        for p2 in 0..10 {
            assert!(!window.check((0, 5, 0, p2)));
        }
        assert_eq!(window.len(), 3);
        assert_eq!(window.overflowed(), 7);
        // The oldest pairs have been forgotten
        assert!(!window.check((0, 5, 0, 0)));
        assert!(window.check((0, 5, 0, 9)));
    }
}
