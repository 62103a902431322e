//! Fragment and bin indices.
//!
//! Two coordinate systems are maintained side by side:
//!
//! - **Fragment space**: restriction fragments tiling every chromosome, as
//!   produced by digesting the genome ([`FragmentIndex`])
//! - **Bin space**: fixed-width bins per chromosome, one index per configured
//!   resolution ([`BinIndex`])
//!
//! Both are built once at pipeline start and are read-only afterwards, so they
//! can be shared freely between shard workers.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use hicbin::core::genome::Genome;
//! use hicbin::index::{FragmentIndex, BinIndex};
//!
//! let genome = Arc::new(Genome::new(vec![("chr1".to_string(), 200)], false).unwrap());
//! let fragments = FragmentIndex::from_sites(Arc::clone(&genome), &[vec![100]]).unwrap();
//! let bins = BinIndex::new(genome, 50).unwrap();
//!
//! assert_eq!(fragments.locate("chr1", 150).unwrap(), 1);
//! assert_eq!(bins.locate("chr1", 150).unwrap(), 3);
//! ```

pub mod bins;
pub mod digest;
pub mod fragments;

use serde::{Serialize, Serializer};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::core::genome::Genome;

pub use bins::{Bin, BinIndex};
pub use fragments::{Fragment, FragmentIndex};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("Unknown chromosome '{0}'")]
    UnknownChromosome(String),

    #[error("Position {position} is beyond the end of '{chrom}' ({length} bp)")]
    OutOfRange {
        chrom: String,
        position: u64,
        length: u64,
    },

    #[error("Invalid fragment table: {0}")]
    InvalidFragments(String),

    #[error("Invalid bin width: {0}")]
    InvalidBinWidth(u64),

    #[error("Invalid resolution '{0}', expected 'frag' or a width such as 5000, 10kb, 1Mb")]
    InvalidResolution(String),
}

/// Matrix resolution: restriction fragments or fixed-width bins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    Fragment,
    Width(u64),
}

impl Resolution {
    /// Short label used in file names and reports
    #[must_use]
    pub fn label(&self) -> String {
        match *self {
            Self::Fragment => "frag".to_string(),
            Self::Width(w) if w % 1_000_000 == 0 => format!("{}Mb", w / 1_000_000),
            Self::Width(w) if w % 1_000 == 0 => format!("{}kb", w / 1_000),
            Self::Width(w) => format!("{w}bp"),
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

impl Serialize for Resolution {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label())
    }
}

impl FromStr for Resolution {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        if matches!(lower.as_str(), "frag" | "frags" | "fragment" | "fragments") {
            return Ok(Self::Fragment);
        }

        let (digits, multiplier) = if let Some(d) = lower.strip_suffix("mb") {
            (d, 1_000_000)
        } else if let Some(d) = lower.strip_suffix("kb") {
            (d, 1_000)
        } else if let Some(d) = lower.strip_suffix("bp") {
            (d, 1)
        } else {
            (lower.as_str(), 1)
        };

        let width = digits
            .trim()
            .parse::<u64>()
            .ok()
            .and_then(|n| n.checked_mul(multiplier))
            .ok_or_else(|| IndexError::InvalidResolution(s.to_string()))?;
        if width == 0 {
            return Err(IndexError::InvalidResolution(s.to_string()));
        }
        Ok(Self::Width(width))
    }
}

/// How ends are attributed to matrix rows at one resolution
#[derive(Debug, Clone)]
pub enum Binning {
    /// One row per restriction fragment
    Fragments,
    /// One row per fixed-width bin
    Fixed(BinIndex),
}

impl Binning {
    /// # Errors
    ///
    /// Returns `IndexError::InvalidBinWidth` for a zero width.
    pub fn new(genome: &Arc<Genome>, resolution: Resolution) -> Result<Self, IndexError> {
        match resolution {
            Resolution::Fragment => Ok(Self::Fragments),
            Resolution::Width(w) => Ok(Self::Fixed(BinIndex::new(Arc::clone(genome), w)?)),
        }
    }

    pub fn resolution(&self) -> Resolution {
        match self {
            Self::Fragments => Resolution::Fragment,
            Self::Fixed(bins) => Resolution::Width(bins.width()),
        }
    }

    /// Row index of a position whose fragment is already known
    ///
    /// # Errors
    ///
    /// Returns an `IndexError` if the position cannot be located.
    pub fn locate(&self, ordinal: usize, position: u64, fragment: u64) -> Result<u64, IndexError> {
        match self {
            Self::Fragments => Ok(fragment),
            Self::Fixed(bins) => bins.locate_ordinal(ordinal, position),
        }
    }

    /// Number of rows (and columns) of the matrix
    pub fn len(&self, fragments: &FragmentIndex) -> u64 {
        match self {
            Self::Fragments => fragments.len(),
            Self::Fixed(bins) => bins.len(),
        }
    }

    pub fn is_empty(&self, fragments: &FragmentIndex) -> bool {
        self.len(fragments) == 0
    }

    /// Row metadata, in index order
    pub fn table(&self, fragments: &FragmentIndex) -> Vec<Bin> {
        match self {
            Self::Fragments => fragments
                .fragments()
                .map(|f| Bin {
                    chrom: f.chrom,
                    start: f.start,
                    end: f.end,
                    index: f.index,
                })
                .collect(),
            Self::Fixed(bins) => bins.bins().collect(),
        }
    }
}

/// Read-only reference data shared by every shard for the lifetime of a run
#[derive(Debug, Clone)]
pub struct Reference {
    pub genome: Arc<Genome>,
    pub fragments: FragmentIndex,
    pub binnings: Vec<Binning>,
}

impl Reference {
    /// # Errors
    ///
    /// Returns an `IndexError` if a bin index cannot be built.
    pub fn new(fragments: FragmentIndex, resolutions: &[Resolution]) -> Result<Self, IndexError> {
        let genome = Arc::clone(fragments.genome());
        let binnings = resolutions
            .iter()
            .map(|&r| Binning::new(&genome, r))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            genome,
            fragments,
            binnings,
        })
    }

    pub fn resolutions(&self) -> Vec<Resolution> {
        self.binnings.iter().map(Binning::resolution).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resolution() {
        assert_eq!("frag".parse::<Resolution>().unwrap(), Resolution::Fragment);
        assert_eq!("5000".parse::<Resolution>().unwrap(), Resolution::Width(5000));
        assert_eq!("10kb".parse::<Resolution>().unwrap(), Resolution::Width(10_000));
        assert_eq!("1Mb".parse::<Resolution>().unwrap(), Resolution::Width(1_000_000));
        assert_eq!("250bp".parse::<Resolution>().unwrap(), Resolution::Width(250));
        assert!("0".parse::<Resolution>().is_err());
        assert!("ten".parse::<Resolution>().is_err());
    }

    #[test]
    fn test_resolution_label() {
        assert_eq!(Resolution::Fragment.label(), "frag");
        assert_eq!(Resolution::Width(10_000).label(), "10kb");
        assert_eq!(Resolution::Width(2_000_000).label(), "2Mb");
        assert_eq!(Resolution::Width(1500).label(), "1500bp");
    }

    #[test]
    fn test_binning_table_matches_len() {
        let genome = Arc::new(
            Genome::new(
                vec![("chr1".to_string(), 250), ("chr2".to_string(), 100)],
                false,
            )
            .unwrap(),
        );
        let fragments = FragmentIndex::fixed_size(Arc::clone(&genome), 60).unwrap();
        let reference =
            Reference::new(fragments, &[Resolution::Fragment, Resolution::Width(100)]).unwrap();

        for binning in &reference.binnings {
            let table = binning.table(&reference.fragments);
            assert_eq!(table.len() as u64, binning.len(&reference.fragments));
            for (i, bin) in table.iter().enumerate() {
                assert_eq!(bin.index, i as u64);
            }
        }
    }
}
