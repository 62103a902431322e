use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

use crate::utils::validation::check_contig_limit;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum GenomeError {
    #[error("Genome has no chromosomes")]
    Empty,

    #[error("Chromosome '{0}' is listed more than once")]
    Duplicate(String),

    #[error("Chromosome '{0}' has zero length")]
    ZeroLength(String),

    #[error("Too many chromosomes: {0} exceeds maximum allowed (100000)")]
    TooMany(usize),
}

/// A single chromosome of the reference genome
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chromosome {
    /// Sequence name as used by the aligner
    pub name: String,

    /// Length in bp
    pub length: u64,

    /// Position in the genome-wide ordering
    pub ordinal: usize,

    /// Circular chromosomes wrap distances around the origin
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub circular: bool,
}

/// Ordered chromosome table. Immutable once built.
#[derive(Debug, Clone)]
pub struct Genome {
    chromosomes: Vec<Chromosome>,
    by_name: HashMap<String, usize>,
}

impl Genome {
    /// Build a genome from `(name, length)` entries in their global order.
    ///
    /// # Errors
    ///
    /// Returns a `GenomeError` if the table is empty, names repeat, a length is
    /// zero, or the chromosome limit is exceeded.
    pub fn new(entries: Vec<(String, u64)>, circular: bool) -> Result<Self, GenomeError> {
        if entries.is_empty() {
            return Err(GenomeError::Empty);
        }

        let mut chromosomes = Vec::with_capacity(entries.len());
        let mut by_name = HashMap::with_capacity(entries.len());

        for (ordinal, (name, length)) in entries.into_iter().enumerate() {
            if check_contig_limit(chromosomes.len()).is_some() {
                return Err(GenomeError::TooMany(chromosomes.len()));
            }
            if length == 0 {
                return Err(GenomeError::ZeroLength(name));
            }
            if by_name.insert(name.clone(), ordinal).is_some() {
                return Err(GenomeError::Duplicate(name));
            }
            chromosomes.push(Chromosome {
                name,
                length,
                ordinal,
                circular,
            });
        }

        Ok(Self {
            chromosomes,
            by_name,
        })
    }

    pub fn len(&self) -> usize {
        self.chromosomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chromosomes.is_empty()
    }

    pub fn chromosomes(&self) -> &[Chromosome] {
        &self.chromosomes
    }

    pub fn get(&self, ordinal: usize) -> Option<&Chromosome> {
        self.chromosomes.get(ordinal)
    }

    pub fn by_name(&self, name: &str) -> Option<&Chromosome> {
        self.by_name.get(name).map(|&i| &self.chromosomes[i])
    }

    pub fn ordinal(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn total_length(&self) -> u64 {
        self.chromosomes.iter().map(|c| c.length).sum()
    }
}

impl Chromosome {
    /// Distance between two positions, taking the short way round on circular chromosomes
    #[must_use]
    pub fn distance(&self, a: u64, b: u64) -> u64 {
        let linear = a.abs_diff(b);
        if self.circular {
            linear.min(self.length.saturating_sub(linear))
        } else {
            linear
        }
    }

    /// Whether the shortest path between two positions crosses the origin
    #[must_use]
    pub fn wraps(&self, a: u64, b: u64) -> bool {
        self.circular && self.length.saturating_sub(a.abs_diff(b)) < a.abs_diff(b)
    }
}
