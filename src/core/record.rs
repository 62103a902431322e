use serde::Serialize;
use thiserror::Error;

use crate::core::types::{EventType, Strand};

/// Problems confined to a single input record. The record is counted as
/// `UNKNOWN` and processing continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("Malformed record on line {line}: {message}")]
    Malformed { line: u64, message: String },

    #[error("Position {position} is beyond the end of '{chrom}' ({length} bp)")]
    OutOfRange {
        chrom: String,
        position: u64,
        length: u64,
    },
}

/// One end of a read pair as reported by the aligner
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlignedEnd {
    /// Chromosome ordinal in the genome; `None` when the end is unmapped
    pub chrom: Option<usize>,

    /// 0-based 5' mapped coordinate
    pub position: u64,

    pub strand: Strand,

    /// Mapping quality; `None` when the source does not report it
    pub mapq: Option<u8>,

    pub supplementary: bool,
}

impl AlignedEnd {
    pub fn mapped(chrom: usize, position: u64, strand: Strand) -> Self {
        Self {
            chrom: Some(chrom),
            position,
            strand,
            mapq: None,
            supplementary: false,
        }
    }

    pub fn unmapped() -> Self {
        Self {
            chrom: None,
            position: 0,
            strand: Strand::Forward,
            mapq: None,
            supplementary: false,
        }
    }

    #[must_use]
    pub fn with_mapq(mut self, mapq: u8) -> Self {
        self.mapq = Some(mapq);
        self
    }

    pub fn is_mapped(&self) -> bool {
        self.chrom.is_some()
    }

    /// Genome-wide ordering key; unmapped ends sort last
    fn order_key(&self) -> (usize, u64) {
        (self.chrom.unwrap_or(usize::MAX), self.position)
    }
}

/// Two aligned ends sharing a read id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadPair {
    pub read_id: String,
    pub end1: AlignedEnd,
    pub end2: AlignedEnd,
}

impl ReadPair {
    pub fn new(read_id: impl Into<String>, end1: AlignedEnd, end2: AlignedEnd) -> Self {
        Self {
            read_id: read_id.into(),
            end1,
            end2,
        }
    }

    /// Order the ends so that `end1` is upstream of `end2` in genome order
    /// (upper triangle). Returns whether the ends were swapped.
    pub fn canonicalize(&mut self) -> bool {
        if self.end2.order_key() < self.end1.order_key() {
            std::mem::swap(&mut self.end1, &mut self.end2);
            true
        } else {
            false
        }
    }

    /// Coordinate sort key of the pair: `(chr1, pos1, chr2, pos2)` with unmapped ends last
    pub fn sort_key(&self) -> (usize, u64, usize, u64) {
        let (c1, p1) = self.end1.order_key();
        let (c2, p2) = self.end2.order_key();
        (c1, p1, c2, p2)
    }
}

/// A read pair with its event type and its attribution to fragments and bins
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedEvent {
    /// The pair, canonicalized so that `end1` is upstream
    pub pair: ReadPair,

    pub event: EventType,

    /// Global fragment indices of `(end1, end2)` when both ends could be located
    pub fragments: Option<(u64, u64)>,

    /// Bin indices of `(end1, end2)`, one entry per configured resolution;
    /// empty when the ends could not be located
    pub bins: Vec<(u64, u64)>,

    /// Genomic distance between the ends for intra-chromosomal pairs
    pub distance: Option<u64>,
}

impl ClassifiedEvent {
    pub fn unknown(pair: ReadPair) -> Self {
        Self {
            pair,
            event: EventType::Unknown,
            fragments: None,
            bins: Vec::new(),
            distance: None,
        }
    }

    pub fn is_cis(&self) -> bool {
        self.pair.end1.chrom.is_some() && self.pair.end1.chrom == self.pair.end2.chrom
    }
}
