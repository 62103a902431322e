//! Digest command - cut a genome into restriction fragments.
//!
//! Writes `fragments_list.txt` and `info_contigs.txt`, which `build` accepts
//! through `--fragments`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use serde::Serialize;
use tracing::{debug, info};

use crate::cli::OutputFormat;
use crate::core::genome::Genome;
use crate::index::digest::Digestion;
use crate::index::{Binning, FragmentIndex};
use crate::output::tables::{write_bin_table, write_contig_table};
use crate::output::{StagedFile, Staging};
use crate::parsing::chromsizes::parse_chrom_sizes_file;
use crate::parsing::fasta::digest_fasta_file;
use crate::utils::validation::check_output_dir;

pub const FRAGMENTS_FILE: &str = "fragments_list.txt";
pub const CONTIGS_FILE: &str = "info_contigs.txt";

#[derive(Args)]
pub struct DigestArgs {
    /// Genome FASTA, plain or gzip
    #[arg(required_unless_present = "chrom_sizes", conflicts_with = "chrom_sizes")]
    pub genome: Option<PathBuf>,

    /// Chromosome sizes table, for fixed-size chunks without a FASTA
    #[arg(long)]
    pub chrom_sizes: Option<PathBuf>,

    /// Restriction enzymes (e.g. DpnII, "DpnII,HinfI", A^AGCTT) or a chunk size in bp
    #[arg(short, long)]
    pub enzyme: Digestion,

    /// Treat every chromosome as circular
    #[arg(long)]
    pub circular: bool,

    /// Merge fragments shorter than this (bp) into their upstream neighbour
    #[arg(long, default_value_t = 0)]
    pub min_size: u64,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    pub outdir: PathBuf,
}

#[derive(Serialize)]
struct DigestSummary {
    enzyme: String,
    min_size: u64,
    chromosomes: usize,
    genome_length: u64,
    fragments: u64,
    files: Vec<PathBuf>,
}

/// Build a fragment index from a FASTA, or from chromosome sizes when the
/// digestion is a fixed chunk size. Fragments shorter than `min_size` are
/// merged into their neighbours.
///
/// # Errors
///
/// Returns an error if the inputs cannot be read, or if restriction enzymes
/// are requested without a genome sequence.
pub(crate) fn digest_reference(
    genome: Option<&Path>,
    chrom_sizes: Option<Vec<(String, u64)>>,
    digestion: &Digestion,
    circular: bool,
    min_size: u64,
) -> anyhow::Result<FragmentIndex> {
    let index = if let Some(path) = genome {
        digest_fasta_file(path, digestion, circular)
            .with_context(|| format!("Failed to digest {}", path.display()))?
    } else {
        let sizes = chrom_sizes
            .ok_or_else(|| anyhow::anyhow!("A genome FASTA or chromosome sizes are required"))?;
        match digestion {
            Digestion::FixedChunk(size) => {
                let genome = Arc::new(Genome::new(sizes, circular)?);
                FragmentIndex::fixed_size(genome, *size)?
            }
            Digestion::Enzymes(_) => anyhow::bail!(
                "Restriction enzymes need the genome sequence; pass a FASTA or use a fixed chunk size"
            ),
        }
    };

    if min_size > 1 {
        let before = index.len();
        let index = index.merge_short(min_size);
        debug!(min_size, before, after = index.len(), "merged short fragments");
        return Ok(index);
    }
    Ok(index)
}

/// Execute the digest command
///
/// # Errors
///
/// Returns an error if the inputs cannot be read or the tables cannot be written.
#[allow(clippy::needless_pass_by_value)] // CLI entry point, values from clap
pub fn run(args: DigestArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    check_output_dir(&args.outdir)?;

    let chrom_sizes = args
        .chrom_sizes
        .as_deref()
        .map(parse_chrom_sizes_file)
        .transpose()?;
    let index = digest_reference(
        args.genome.as_deref(),
        chrom_sizes,
        &args.enzyme,
        args.circular,
        args.min_size,
    )?;
    let genome = index.genome();
    info!(
        chromosomes = genome.len(),
        fragments = index.len(),
        "digested genome with {}",
        args.enzyme
    );

    let table = Binning::Fragments.table(&index);
    let mut staging = Staging::new();

    let mut fragments = StagedFile::create(&args.outdir.join(FRAGMENTS_FILE))?;
    write_bin_table(&mut fragments, genome, &table)?;
    staging.add(fragments);

    let mut contigs = StagedFile::create(&args.outdir.join(CONTIGS_FILE))?;
    write_contig_table(&mut contigs, genome, &table)?;
    staging.add(contigs);

    let files = staging.commit()?;
    let summary = DigestSummary {
        enzyme: args.enzyme.to_string(),
        min_size: args.min_size,
        chromosomes: genome.len(),
        genome_length: genome.total_length(),
        fragments: index.len(),
        files,
    };

    match format {
        OutputFormat::Text => print_text(&summary, verbose, &index),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Tsv => print_tsv(&summary),
    }
    Ok(())
}

fn print_text(summary: &DigestSummary, verbose: bool, index: &FragmentIndex) {
    println!("Digestion: {}", summary.enzyme);
    println!(
        "{} fragments over {} chromosomes ({} bp)",
        summary.fragments, summary.chromosomes, summary.genome_length
    );
    if verbose {
        for chrom in index.genome().chromosomes() {
            println!(
                "  {}\t{} bp\t{} fragments",
                chrom.name,
                chrom.length,
                index.count(chrom.ordinal).unwrap_or(0)
            );
        }
    }
    for file in &summary.files {
        println!("Wrote {}", file.display());
    }
}

fn print_tsv(summary: &DigestSummary) {
    println!("enzyme\tchromosomes\tgenome_length\tfragments");
    println!(
        "{}\t{}\t{}\t{}",
        summary.enzyme, summary.chromosomes, summary.genome_length, summary.fragments
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_chunks_from_sizes() {
        let sizes = vec![("chr1".to_string(), 250), ("chr2".to_string(), 100)];
        let index = digest_reference(None, Some(sizes), &Digestion::FixedChunk(100), false, 0).unwrap();
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn test_min_size_merges_chunk_remainders() {
        let sizes = vec![("chr1".to_string(), 250), ("chr2".to_string(), 100)];
        let index = digest_reference(None, Some(sizes), &Digestion::FixedChunk(100), false, 60).unwrap();
        // chr1's 50 bp tail joins the chunk before it
        assert_eq!(index.count(0), Some(2));
        assert_eq!(index.count(1), Some(1));
        assert_eq!(index.locate("chr1", 249).unwrap(), 1);
    }

    #[test]
    fn test_enzyme_needs_sequence() {
        let sizes = vec![("chr1".to_string(), 250)];
        let digestion: Digestion = "DpnII".parse().unwrap();
        assert!(digest_reference(None, Some(sizes), &digestion, false, 0).is_err());
    }
}
