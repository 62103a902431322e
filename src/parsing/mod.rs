//! Readers for the reference tables and the read-pair inputs.
//!
//! This module provides parsers for:
//!
//! - **Chromosome sizes**: `name<TAB>length` tables, including `.fai` indexes
//! - **Fragment tables**: `fragments_list.txt` or BED intervals tiling the genome
//! - **FASTA**: genome sequence digested into restriction fragments
//! - **`.pairs`**: 4DN pairs files, plain or gzip, or stdin
//! - **SAM/BAM**: name-sorted alignments grouped into read pairs
//!
//! Text inputs ending in `.gz` or `.bgz` are decompressed on the fly, and a
//! path of `-` reads standard input.

pub mod chromsizes;
pub mod fasta;
pub mod fragments;
pub mod pairs;
pub mod sam;

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use thiserror::Error;

use crate::core::genome::GenomeError;
use crate::core::record::RecordError;
use crate::index::digest::DigestError;
use crate::index::IndexError;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("noodles error: {0}")]
    Noodles(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Too many contigs: {0} exceeds maximum allowed (100000)")]
    TooManyContigs(usize),

    /// A single bad record; callers may skip it and continue
    #[error(transparent)]
    Record(#[from] RecordError),

    #[error("Chromosome '{0}' is not in the reference")]
    UnknownChromosome(String),

    #[error("Mates are out of step: '{first}' paired with '{second}', inputs must be name-sorted")]
    MateMismatch { first: String, second: String },

    #[error(transparent)]
    Genome(#[from] GenomeError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Digest(#[from] DigestError),
}

impl ParseError {
    /// Whether processing can continue past this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Record(_))
    }
}

/// Check if the path is a gzipped file
#[allow(clippy::case_sensitive_file_extension_comparisons)] // Already lowercased
pub(crate) fn is_gzipped(path: &Path) -> bool {
    let path_str = path.to_string_lossy().to_lowercase();
    path_str.ends_with(".gz") || path_str.ends_with(".bgz")
}

/// Whether the path means standard input
pub(crate) fn is_stdin(path: &Path) -> bool {
    path.as_os_str() == "-"
}

/// Open a text input, decompressing gzip and mapping `-` to stdin
///
/// # Errors
///
/// Returns `ParseError::Io` if the file cannot be opened.
pub fn open_text(path: &Path) -> Result<Box<dyn BufRead + Send>, ParseError> {
    if is_stdin(path) {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(path)?;
    if is_gzipped(path) {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Parse an unsigned integer field, naming the field in the error
pub(crate) fn parse_u64(field: &str, what: &str, line: u64) -> Result<u64, RecordError> {
    field.trim().parse().map_err(|_| RecordError::Malformed {
        line,
        message: format!("invalid {what} '{field}'"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn test_open_text_gz() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.txt.gz");
        let file = File::create(&path).unwrap();
        let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        encoder.write_all(b"chr1\t100\n").unwrap();
        encoder.finish().unwrap();

        let mut text = String::new();
        open_text(&path).unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "chr1\t100\n");
    }

    #[test]
    fn test_parse_u64() {
        assert_eq!(parse_u64(" 42", "position", 1).unwrap(), 42);
        assert!(matches!(
            parse_u64("x", "position", 3),
            Err(RecordError::Malformed { line: 3, .. })
        ));
    }
}
