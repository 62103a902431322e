use std::collections::HashMap;

use crate::core::record::ClassifiedEvent;
use crate::index::{Reference, Resolution};

/// Sparse upper-triangle contact counts at one resolution.
///
/// Only non-zero cells are stored, keyed by `(row, col)` with `row <= col`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactMatrix {
    resolution: Resolution,
    size: u64,
    cells: HashMap<(u64, u64), u64>,
}

impl ContactMatrix {
    pub fn new(resolution: Resolution, size: u64) -> Self {
        Self {
            resolution,
            size,
            cells: HashMap::new(),
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Number of rows (and columns)
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Add one contact between bins `a` and `b`, in either order
    pub fn increment(&mut self, a: u64, b: u64) {
        *self.cells.entry((a.min(b), a.max(b))).or_insert(0) += 1;
    }

    pub fn get(&self, a: u64, b: u64) -> u64 {
        self.cells.get(&(a.min(b), a.max(b))).copied().unwrap_or(0)
    }

    /// Number of non-zero cells
    pub fn nnz(&self) -> usize {
        self.cells.len()
    }

    /// Sum of all cells
    pub fn total(&self) -> u64 {
        self.cells.values().sum()
    }

    /// Sum the cells of another matrix of the same shape into this one
    pub fn merge(&mut self, other: &ContactMatrix) {
        for (&key, &count) in &other.cells {
            *self.cells.entry(key).or_insert(0) += count;
        }
    }

    /// `(row, col, count)` triples sorted by row then column
    pub fn sorted_entries(&self) -> Vec<(u64, u64, u64)> {
        let mut entries: Vec<_> = self
            .cells
            .iter()
            .map(|(&(row, col), &count)| (row, col, count))
            .collect();
        entries.sort_unstable();
        entries
    }
}

/// One contact matrix per configured resolution, fed from the same event stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregator {
    matrices: Vec<ContactMatrix>,
}

impl Aggregator {
    pub fn new(reference: &Reference) -> Self {
        let matrices = reference
            .binnings
            .iter()
            .map(|b| ContactMatrix::new(b.resolution(), b.len(&reference.fragments)))
            .collect();
        Self { matrices }
    }

    /// Count an accepted event at every resolution.
    ///
    /// Must be called at most once per event.
    pub fn add(&mut self, event: &ClassifiedEvent) {
        for (matrix, &(a, b)) in self.matrices.iter_mut().zip(&event.bins) {
            matrix.increment(a, b);
        }
    }

    /// Sum another aggregator built from the same reference into this one
    pub fn merge(&mut self, other: &Aggregator) {
        for (mine, theirs) in self.matrices.iter_mut().zip(&other.matrices) {
            mine.merge(theirs);
        }
    }

    pub fn matrices(&self) -> &[ContactMatrix] {
        &self.matrices
    }

    pub fn into_matrices(self) -> Vec<ContactMatrix> {
        self.matrices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_folds_to_upper_triangle() {
        let mut matrix = ContactMatrix::new(Resolution::Width(1000), 10);
        matrix.increment(5, 2);
        matrix.increment(2, 5);
        matrix.increment(3, 3);

        assert_eq!(matrix.get(2, 5), 2);
        assert_eq!(matrix.get(5, 2), 2);
        assert_eq!(matrix.nnz(), 2);
        assert_eq!(matrix.total(), 3);
        assert_eq!(matrix.sorted_entries(), vec![(2, 5, 2), (3, 3, 1)]);
        assert!(matrix.sorted_entries().iter().all(|&(r, c, _)| r <= c));
    }

    #[test]
    fn test_merge_matches_single_pass() {
        let contacts = [(0, 1), (4, 2), (1, 0), (3, 3), (2, 4), (9, 0)];

        let mut single = ContactMatrix::new(Resolution::Fragment, 10);
        for &(a, b) in &contacts {
            single.increment(a, b);
        }

        let mut left = ContactMatrix::new(Resolution::Fragment, 10);
        let mut right = ContactMatrix::new(Resolution::Fragment, 10);
        for (i, &(a, b)) in contacts.iter().enumerate() {
            if i % 2 == 0 {
                left.increment(a, b);
            } else {
                right.increment(a, b);
            }
        }

        let mut lr = left.clone();
        lr.merge(&right);
        let mut rl = right.clone();
        rl.merge(&left);

        assert_eq!(lr, single);
        assert_eq!(rl, single);
    }
}
