//! Sort command - external merge sort of a `.pairs` file.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use tracing::info;

use crate::cli::{OutputFile, OutputFormat};
use crate::core::genome::Genome;
use crate::parsing::chromsizes::parse_chrom_sizes_file;
use crate::parsing::open_text;
use crate::utils::external_sort::{sort_pairs, SortConfig, DEFAULT_CHUNK_SIZE};

#[derive(Args)]
pub struct SortArgs {
    /// Input .pairs file, plain or gzip ('-' for stdin)
    #[arg(required = true)]
    pub input: PathBuf,

    /// Output .pairs file ('-' for stdout, '.gz' to compress)
    #[arg(short, long, default_value = "-")]
    pub output: PathBuf,

    /// Chromosome order, when the input has no #chromsize header lines
    #[arg(long)]
    pub chrom_sizes: Option<PathBuf>,

    /// Records sorted in memory before spilling a run to disk
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Directory for temporary run files
    #[arg(long)]
    pub tmpdir: Option<PathBuf>,
}

/// Execute the sort command
///
/// # Errors
///
/// Returns an error if the input cannot be read or sorted, or the output
/// cannot be written.
#[allow(clippy::needless_pass_by_value)] // CLI entry point, values from clap
pub fn run(args: SortArgs, format: OutputFormat, _verbose: bool) -> anyhow::Result<()> {
    let genome = match &args.chrom_sizes {
        Some(path) => Some(Arc::new(Genome::new(parse_chrom_sizes_file(path)?, false)?)),
        None => None,
    };
    let config = SortConfig {
        chunk_size: args.chunk_size,
        temp_dir: args.tmpdir.clone(),
    };

    let input = open_text(&args.input)?;
    let mut output = OutputFile::create(&args.output)?;
    let stats = sort_pairs(input, &mut output, genome, &config)?;
    let written = output.commit()?;
    info!(records = stats.records, runs = stats.runs, "sorted pairs");

    match format {
        OutputFormat::Text => {
            eprintln!(
                "Sorted {} records in {} run(s), {} unparsable",
                stats.records, stats.runs, stats.malformed
            );
            if let Some(path) = written {
                eprintln!("Wrote {}", path.display());
            }
        }
        OutputFormat::Json => eprintln!("{}", serde_json::to_string_pretty(&stats)?),
        OutputFormat::Tsv => {
            eprintln!("records\truns\tmalformed");
            eprintln!("{}\t{}\t{}", stats.records, stats.runs, stats.malformed);
        }
    }
    Ok(())
}
