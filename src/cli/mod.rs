//! Command-line interface for hicbin.
//!
//! This module implements the CLI using clap. Available commands:
//!
//! - **digest**: Cut a genome into restriction fragments and write the fragment tables
//! - **pairs**: Turn name-sorted SAM/BAM alignments into a `.pairs` file
//! - **sort**: Sort a `.pairs` file into coordinate order
//! - **build**: Classify, filter and bin sorted pairs into contact matrices
//!
//! ## Usage
//!
//! ```text
//! # Fragment tables for a DpnII library
//! hicbin digest genome.fa --enzyme DpnII --outdir ref/
//!
//! # Pairs from two single-end alignments, then sort
//! hicbin pairs R1.bam R2.bam -o reads.pairs.gz
//! hicbin sort reads.pairs.gz -o sorted.pairs.gz
//!
//! # Fragment and 10 kb matrices
//! hicbin build sorted.pairs.gz --fragments ref/fragments_list.txt -r frag -r 10kb --outdir out/
//! ```

use std::io::{self, BufWriter, Stdout, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::output::StagedFile;
use crate::parsing::{is_gzipped, is_stdin};

pub mod build;
pub mod digest;
pub mod pairs;
pub mod sort;

#[derive(Parser)]
#[command(name = "hicbin")]
#[command(version)]
#[command(about = "Classify, filter and bin Hi-C read pairs into sparse contact matrices")]
#[command(
    long_about = "hicbin turns aligned Hi-C read pairs into contact matrices.\n\nEach pair is assigned to restriction fragments and classified as a valid contact or as a ligation artifact (dangling end, self circle, religation, ...). PCR duplicates are removed and the surviving contacts are counted at fragment resolution and at any number of fixed bin widths."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format of the summary
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Digest a genome into restriction fragments
    Digest(digest::DigestArgs),

    /// Pair mates from name-sorted SAM/BAM alignments
    Pairs(pairs::PairsArgs),

    /// Sort a .pairs file by coordinates
    Sort(sort::SortArgs),

    /// Build contact matrices from coordinate-sorted pairs
    Build(build::BuildArgs),
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Tsv,
}

/// Destination of a streamed output: stdout for `-`, otherwise a staged
/// file, gzip-compressed when the name ends in `.gz`
pub(crate) enum OutputFile {
    Stdout(BufWriter<Stdout>),
    Plain(StagedFile),
    Gzip(GzEncoder<StagedFile>),
}

impl OutputFile {
    pub(crate) fn create(path: &Path) -> io::Result<Self> {
        if is_stdin(path) {
            return Ok(Self::Stdout(BufWriter::new(io::stdout())));
        }
        let staged = StagedFile::create(path)?;
        if is_gzipped(path) {
            Ok(Self::Gzip(GzEncoder::new(staged, Compression::default())))
        } else {
            Ok(Self::Plain(staged))
        }
    }

    /// Finish the stream and move the file into place
    pub(crate) fn commit(self) -> io::Result<Option<PathBuf>> {
        match self {
            Self::Stdout(mut out) => {
                out.flush()?;
                Ok(None)
            }
            Self::Plain(staged) => staged.commit().map(Some),
            Self::Gzip(encoder) => encoder.finish()?.commit().map(Some),
        }
    }
}

impl Write for OutputFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Stdout(out) => out.write(buf),
            Self::Plain(out) => out.write(buf),
            Self::Gzip(out) => out.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Stdout(out) => out.flush(),
            Self::Plain(out) => out.flush(),
            Self::Gzip(out) => out.flush(),
        }
    }
}
