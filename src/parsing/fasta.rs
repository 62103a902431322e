//! Genome digestion from FASTA using noodles.
//!
//! Sequences are read one at a time and searched for restriction sites, so only
//! the largest chromosome is ever held in memory. Supports both uncompressed
//! and gzip/bgzip compressed files.
//!
//! Supported extensions:
//! - `.fa`, `.fasta`, `.fna` (uncompressed)
//! - `.fa.gz`, `.fasta.gz`, `.fna.gz`, `.fa.bgz`, ... (compressed)

use std::ffi::OsStr;
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use noodles::fasta;
use tracing::debug;

use crate::core::genome::Genome;
use crate::index::digest::{find_cut_sites, Digestion};
use crate::index::FragmentIndex;
use crate::parsing::{open_text, ParseError};
use crate::utils::validation::check_contig_limit;

/// Check if the path has a FASTA extension
pub fn is_fasta_file(path: &Path) -> bool {
    let path_str = path.to_string_lossy().to_lowercase();
    let stem = path_str
        .strip_suffix(".gz")
        .or_else(|| path_str.strip_suffix(".bgz"))
        .unwrap_or(&path_str);

    matches!(
        Path::new(stem)
            .extension()
            .and_then(OsStr::to_str),
        Some("fa" | "fasta" | "fna")
    )
}

/// Digest a FASTA file into a fragment index
///
/// # Errors
///
/// Returns `ParseError::Io` if the file cannot be read, `ParseError::Noodles` if
/// parsing fails, `ParseError::InvalidFormat` if no sequences are found, or
/// `ParseError::TooManyContigs` if the limit is exceeded.
pub fn digest_fasta_file(
    path: &Path,
    digestion: &Digestion,
    circular: bool,
) -> Result<FragmentIndex, ParseError> {
    let mut reader = fasta::io::Reader::new(open_text(path)?);
    digest_fasta(&mut reader, digestion, circular)
}

/// Digest every record of a noodles FASTA reader
///
/// # Errors
///
/// See [`digest_fasta_file`].
pub fn digest_fasta<R: BufRead>(
    reader: &mut fasta::io::Reader<R>,
    digestion: &Digestion,
    circular: bool,
) -> Result<FragmentIndex, ParseError> {
    let mut chromosomes = Vec::new();
    let mut sites = Vec::new();

    for result in reader.records() {
        let record = result
            .map_err(|e| ParseError::Noodles(format!("Failed to parse FASTA record: {e}")))?;

        if check_contig_limit(chromosomes.len()).is_some() {
            return Err(ParseError::TooManyContigs(chromosomes.len()));
        }

        let name = String::from_utf8_lossy(record.name()).to_string();
        let sequence = record.sequence().as_ref();

        if let Digestion::Enzymes(enzymes) = digestion {
            let cuts = find_cut_sites(sequence, enzymes);
            debug!(chrom = %name, length = sequence.len(), sites = cuts.len(), "digested");
            sites.push(cuts);
        }
        chromosomes.push((name, sequence.len() as u64));
    }

    if chromosomes.is_empty() {
        return Err(ParseError::InvalidFormat(
            "No sequences found in FASTA file".to_string(),
        ));
    }

    let genome = Arc::new(Genome::new(chromosomes, circular)?);
    let index = match digestion {
        Digestion::Enzymes(_) => FragmentIndex::from_sites(genome, &sites)?,
        Digestion::FixedChunk(size) => FragmentIndex::fixed_size(genome, *size)?,
    };
    Ok(index)
}
