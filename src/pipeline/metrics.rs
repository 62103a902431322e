use serde::Serialize;
use std::collections::BTreeMap;

use crate::core::types::EventType;

/// Label used for PCR duplicates in reports
pub const PCR_DUPLICATE: &str = "PCR_DUPLICATE";

/// Per-run pair counts.
///
/// Every ingested pair is counted exactly once: either under its event type or,
/// for a repeated VALID pair, as a PCR duplicate. The sum of all counts
/// therefore always equals `total`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunMetrics {
    pub total: u64,

    /// Count per event type; VALID counts only pairs that reached the matrix
    pub events: BTreeMap<EventType, u64>,

    pub pcr_duplicates: u64,

    /// Malformed or out-of-range records, also counted as UNKNOWN
    pub record_errors: u64,

    /// Accepted VALID pairs on one chromosome
    pub valid_cis: u64,

    /// Accepted VALID pairs across chromosomes
    pub valid_trans: u64,

    /// Pairs pushed out of a full duplicate window while still within
    /// tolerance; later duplicates of these go undetected
    pub duplicate_window_overflows: u64,
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self {
            total: 0,
            events: EventType::ALL.iter().map(|&e| (e, 0)).collect(),
            pcr_duplicates: 0,
            record_errors: 0,
            valid_cis: 0,
            valid_trans: 0,
            duplicate_window_overflows: 0,
        }
    }
}

impl RunMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, event: EventType) {
        self.total += 1;
        *self.events.entry(event).or_insert(0) += 1;
    }

    pub(crate) fn record_valid(&mut self, cis: bool) {
        self.record(EventType::Valid);
        if cis {
            self.valid_cis += 1;
        } else {
            self.valid_trans += 1;
        }
    }

    pub(crate) fn record_duplicate(&mut self) {
        self.total += 1;
        self.pcr_duplicates += 1;
    }

    pub(crate) fn record_error(&mut self) {
        self.record(EventType::Unknown);
        self.record_errors += 1;
    }

    pub fn count(&self, event: EventType) -> u64 {
        self.events.get(&event).copied().unwrap_or(0)
    }

    /// Pairs that were added to the contact matrices
    pub fn accepted(&self) -> u64 {
        self.count(EventType::Valid)
    }

    /// Sum over every event type and duplicates
    pub fn counted(&self) -> u64 {
        self.events.values().sum::<u64>() + self.pcr_duplicates
    }

    /// Fraction of ingested pairs retained as VALID
    #[allow(clippy::cast_precision_loss)]
    pub fn valid_fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.accepted() as f64 / self.total as f64
        }
    }

    /// Add the counts of another run, e.g. a shard
    pub fn merge(&mut self, other: &RunMetrics) {
        self.total += other.total;
        for (&event, &n) in &other.events {
            *self.events.entry(event).or_insert(0) += n;
        }
        self.pcr_duplicates += other.pcr_duplicates;
        self.record_errors += other.record_errors;
        self.valid_cis += other.valid_cis;
        self.valid_trans += other.valid_trans;
        self.duplicate_window_overflows += other.duplicate_window_overflows;
    }

    /// `(label, count)` rows in report order, duplicates after VALID
    pub fn rows(&self) -> Vec<(&'static str, u64)> {
        let mut rows = Vec::with_capacity(EventType::ALL.len() + 1);
        for event in EventType::ALL {
            rows.push((event.label(), self.count(event)));
            if event == EventType::Valid {
                rows.push((PCR_DUPLICATE, self.pcr_duplicates));
            }
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_sum_to_total() {
        let mut metrics = RunMetrics::new();
        metrics.record_valid(true);
        metrics.record_valid(false);
        metrics.record_duplicate();
        metrics.record(EventType::SelfCircle);
        metrics.record_error();

        assert_eq!(metrics.total, 5);
        assert_eq!(metrics.counted(), metrics.total);
        assert_eq!(metrics.accepted(), 2);
        assert_eq!(metrics.count(EventType::Unknown), 1);
        assert_eq!(metrics.record_errors, 1);
        assert!((metrics.valid_fraction() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_merge_is_commutative() {
        let mut a = RunMetrics::new();
        a.record_valid(true);
        a.record(EventType::Loop);
        let mut b = RunMetrics::new();
        b.record_duplicate();
        b.record(EventType::Loop);

        let mut ab = a.clone();
        ab.merge(&b);
        let mut ba = b.clone();
        ba.merge(&a);

        assert_eq!(ab, ba);
        assert_eq!(ab.count(EventType::Loop), 2);
        assert_eq!(ab.counted(), 4);
    }

    #[test]
    fn test_rows_include_duplicates() {
        let mut metrics = RunMetrics::new();
        metrics.record_duplicate();
        let rows = metrics.rows();
        assert_eq!(rows.len(), 11);
        assert_eq!(rows[0], ("VALID", 0));
        assert_eq!(rows[1], (PCR_DUPLICATE, 1));
    }

    #[test]
    fn test_serializes_event_labels() {
        let json = serde_json::to_value(RunMetrics::new()).unwrap();
        assert_eq!(json["events"]["DANGLING_END"], 0);
        assert_eq!(json["total"], 0);
        assert_eq!(json["duplicate_window_overflows"], 0);
    }
}
