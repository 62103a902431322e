//! Pairs command - convert name-sorted alignments into a `.pairs` file.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cli::{OutputFile, OutputFormat};
use crate::core::genome::Genome;
use crate::output::PairsWriter;
use crate::parsing::sam::AlignmentPairs;

const MAX_LOGGED_SKIPS: u64 = 5;

#[derive(Args)]
pub struct PairsArgs {
    /// One name-sorted SAM/BAM with both mates, or two single-end files (forward, reverse)
    #[arg(required = true, num_args = 1..=2)]
    pub inputs: Vec<PathBuf>,

    /// Output .pairs file ('-' for stdout, '.gz' to compress)
    #[arg(short, long, default_value = "-")]
    pub output: PathBuf,

    /// Treat every chromosome as circular
    #[arg(long)]
    pub circular: bool,
}

#[derive(Debug, Default, Serialize)]
struct PairsSummary {
    records: u64,
    pairs: u64,
    skipped: u64,
    output: Option<PathBuf>,
}

/// Execute the pairs command
///
/// # Errors
///
/// Returns an error if an input cannot be read, the mates are out of step,
/// or the output cannot be written.
#[allow(clippy::needless_pass_by_value)] // CLI entry point, values from clap
pub fn run(args: PairsArgs, format: OutputFormat, _verbose: bool) -> anyhow::Result<()> {
    let mut alignments = match args.inputs.as_slice() {
        [paired] => AlignmentPairs::paired(paired)?,
        [forward, reverse] => AlignmentPairs::split(forward, reverse)?,
        _ => anyhow::bail!("Expected one paired or two single-end alignment files"),
    };
    let genome = Arc::new(Genome::new(alignments.chromosomes()?, args.circular)?);
    info!(chromosomes = genome.len(), "read alignment header");

    let mut writer = PairsWriter::new(OutputFile::create(&args.output)?, genome, "readID")?;
    let mut summary = PairsSummary::default();

    for item in alignments.by_ref() {
        match item {
            Ok(pair) => writer.write_pair(&pair)?,
            Err(err) if err.is_recoverable() => {
                summary.skipped += 1;
                if summary.skipped <= MAX_LOGGED_SKIPS {
                    warn!("skipping read: {err}");
                } else {
                    debug!("skipping read: {err}");
                }
            }
            Err(err) => return Err(err.into()),
        }
    }

    summary.pairs = writer.written();
    summary.records = alignments.records_read();
    summary.output = writer.finish()?.commit()?;
    info!(pairs = summary.pairs, skipped = summary.skipped, "wrote pairs");

    match format {
        // stdout may carry the pairs themselves, so the text summary goes to stderr
        OutputFormat::Text => {
            eprintln!(
                "{} alignment records, {} pairs written, {} reads skipped",
                summary.records, summary.pairs, summary.skipped
            );
        }
        OutputFormat::Json => eprintln!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Tsv => {
            eprintln!("records\tpairs\tskipped");
            eprintln!("{}\t{}\t{}", summary.records, summary.pairs, summary.skipped);
        }
    }
    Ok(())
}
