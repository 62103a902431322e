//! Build command - classify, filter and bin sorted pairs into contact matrices.
//!
//! For each resolution the command writes `<prefix>.<resolution>.bins.txt`,
//! `<prefix>.<resolution>.contigs.txt` and the sparse matrix. A single
//! `<prefix>.metrics.json` report covers the run. Nothing is written unless
//! the whole input was processed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use tracing::{info, warn};

use crate::cli::digest::digest_reference;
use crate::cli::OutputFormat;
use crate::index::digest::Digestion;
use crate::index::{FragmentIndex, Reference, Resolution};
use crate::output::matrix::write_matrix;
use crate::output::report::MetricsReport;
use crate::output::tables::{write_bin_table, write_contig_table};
use crate::output::{Bedgraph2Writer, GraalWriter, MatrixFormat, StagedFile, Staging};
use crate::parsing::chromsizes::parse_chrom_sizes_file;
use crate::parsing::fragments::parse_fragments_file;
use crate::parsing::pairs::{read_header, PairsHeader, PairsReader};
use crate::parsing::open_text;
use crate::pipeline::classify::DEFAULT_MIN_MAPQ;
use crate::pipeline::filter::DEFAULT_WINDOW_CAPACITY;
use crate::pipeline::{
    run_pipeline, AdjacentInward, ClassifierConfig, FilterConfig, PipelineConfig, PipelineOutput,
    DEFAULT_BATCH_SIZE,
};
use crate::utils::external_sort::COORDINATE_ORDER;
use crate::utils::validation::{check_output_dir, validate_prefix};

#[derive(Args)]
pub struct BuildArgs {
    /// Coordinate-sorted .pairs file, plain or gzip ('-' for stdin)
    #[arg(required = true)]
    pub input: PathBuf,

    /// Restriction fragment table (fragments_list.txt or BED)
    #[arg(long, conflicts_with_all = ["genome", "chrom_sizes"])]
    pub fragments: Option<PathBuf>,

    /// Genome FASTA to digest with --enzyme
    #[arg(long, requires = "enzyme", conflicts_with = "chrom_sizes")]
    pub genome: Option<PathBuf>,

    /// Chromosome sizes table, used with a fixed chunk size as --enzyme
    #[arg(long)]
    pub chrom_sizes: Option<PathBuf>,

    /// Restriction enzymes or a chunk size in bp
    #[arg(short, long)]
    pub enzyme: Option<Digestion>,

    /// Treat every chromosome as circular
    #[arg(long)]
    pub circular: bool,

    /// Merge digested fragments shorter than this (bp) into their upstream neighbour
    #[arg(long, default_value_t = 0, conflicts_with = "fragments")]
    pub min_size: u64,

    /// Matrix resolution: 'frag' or a bin width such as 5000, 10kb, 1Mb (repeatable)
    #[arg(short, long = "resolution", default_value = "frag")]
    pub resolutions: Vec<Resolution>,

    /// Sparse matrix layout
    #[arg(long, value_enum, default_value = "graal")]
    pub matrix_format: MatrixFormat,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    pub outdir: PathBuf,

    /// Prefix of the output file names
    #[arg(long, default_value = "contacts")]
    pub prefix: String,

    /// Worker shards; pairs are split by the chromosome of their upstream end
    #[arg(short, long, default_value_t = 1)]
    pub threads: usize,

    /// Pairs sent to a shard at once
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Minimum mapping quality of both ends
    #[arg(long, default_value_t = DEFAULT_MIN_MAPQ)]
    pub min_mapq: u8,

    /// Intra-chromosomal pairs at or below this distance (bp) are TOO_SHORT/TOO_CLOSE
    #[arg(long)]
    pub min_distance: Option<u64>,

    /// Pairs on non-adjacent fragments at or below this distance (bp) are LOOP
    #[arg(long)]
    pub max_loop_distance: Option<u64>,

    /// Event type of inward pairs on adjacent fragments
    #[arg(long, value_enum, default_value = "uncut")]
    pub adjacent_inward: AdjacentInward,

    /// Positional tolerance (bp) for PCR duplicates
    #[arg(long, default_value_t = 0)]
    pub duplicate_tolerance: u64,

    /// Maximum pairs held in the duplicate lookback window
    #[arg(long, default_value_t = DEFAULT_WINDOW_CAPACITY)]
    pub duplicate_window: usize,

    /// Count PCR duplicates as valid contacts
    #[arg(long)]
    pub keep_duplicates: bool,
}

impl BuildArgs {
    fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            classifier: ClassifierConfig {
                min_mapq: self.min_mapq,
                min_distance: self.min_distance,
                max_loop_distance: self.max_loop_distance,
                adjacent_inward: self.adjacent_inward,
            },
            filter: FilterConfig {
                remove_duplicates: !self.keep_duplicates,
                duplicate_tolerance: self.duplicate_tolerance,
                window_capacity: self.duplicate_window,
            },
            resolutions: self.resolutions.clone(),
            shards: self.threads,
            batch_size: self.batch_size,
        }
    }
}

/// Execute the build command
///
/// # Errors
///
/// Returns an error for an invalid configuration, unreadable or inconsistent
/// reference data, unsorted input, or a failure to write the outputs.
#[allow(clippy::needless_pass_by_value)] // CLI entry point, values from clap
pub fn run(args: BuildArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    check_output_dir(&args.outdir)?;
    let prefix = validate_prefix(&args.prefix)?;
    let config = args.pipeline_config();
    config.validate()?;

    let mut input = open_text(&args.input)
        .with_context(|| format!("Failed to open {}", args.input.display()))?;
    let header = read_header(&mut input)?;
    if let Some(message) = sort_order_warning(&header) {
        warn!("{message}");
    }

    let fragments = load_fragments(&args, &header)?;
    if !header.chromsizes.is_empty() {
        header.check_genome(fragments.genome())?;
    }
    let reference = Reference::new(fragments, &config.resolutions)?;
    info!(
        chromosomes = reference.genome.len(),
        fragments = reference.fragments.len(),
        "reference loaded"
    );
    for binning in &reference.binnings {
        info!(
            resolution = %binning.resolution(),
            bins = binning.len(&reference.fragments),
            "bin index ready"
        );
    }

    let reader = PairsReader::new(input, &header, Arc::clone(&reference.genome))?;
    let output = run_pipeline(&reference, &config, reader)?;

    let report = MetricsReport::new(&args.input.to_string_lossy(), &config, &output);
    let files = write_outputs(&args.outdir, prefix, args.matrix_format, &reference, &output, &report)?;

    match format {
        OutputFormat::Text => print_text(&output, &files, verbose),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Tsv => print_tsv(&output),
    }
    Ok(())
}

/// Warning for a header that does not declare coordinate order
fn sort_order_warning(header: &PairsHeader) -> Option<String> {
    match header.sorted.as_deref() {
        Some(order) if order.starts_with(COORDINATE_ORDER) => None,
        Some(order) => Some(format!(
            "pairs header declares '{order}' order, sortedness is checked while reading"
        )),
        None => Some(
            "pairs header has no #sorted line, sortedness is checked while reading".to_string(),
        ),
    }
}

/// Fragment index from whichever reference input was given
fn load_fragments(args: &BuildArgs, header: &PairsHeader) -> anyhow::Result<FragmentIndex> {
    if let Some(path) = &args.fragments {
        let table = parse_fragments_file(path)
            .with_context(|| format!("Failed to read fragments from {}", path.display()))?;
        return Ok(table.into_index(args.circular)?);
    }

    let digestion = args.enzyme.as_ref().ok_or_else(|| {
        anyhow::anyhow!("A reference is required: --fragments, or --enzyme with --genome or chromosome sizes")
    })?;
    if args.genome.is_some() {
        return digest_reference(args.genome.as_deref(), None, digestion, args.circular, args.min_size);
    }

    let sizes = match &args.chrom_sizes {
        Some(path) => parse_chrom_sizes_file(path)?,
        None if !header.chromsizes.is_empty() => header.chromsizes.clone(),
        None => anyhow::bail!("No chromosome sizes: pass --chrom-sizes or use a pairs file with #chromsize lines"),
    };
    digest_reference(None, Some(sizes), digestion, args.circular, args.min_size)
}

fn write_outputs(
    outdir: &Path,
    prefix: &str,
    matrix_format: MatrixFormat,
    reference: &Reference,
    output: &PipelineOutput,
    report: &MetricsReport,
) -> anyhow::Result<Vec<PathBuf>> {
    let genome = &reference.genome;
    let mut staging = Staging::new();

    for (binning, matrix) in reference.binnings.iter().zip(&output.matrices) {
        let label = binning.resolution().label();
        let table = binning.table(&reference.fragments);

        let mut bins = StagedFile::create(&outdir.join(format!("{prefix}.{label}.bins.txt")))?;
        write_bin_table(&mut bins, genome, &table)?;
        staging.add(bins);

        let mut contigs = StagedFile::create(&outdir.join(format!("{prefix}.{label}.contigs.txt")))?;
        write_contig_table(&mut contigs, genome, &table)?;
        staging.add(contigs);

        let path = outdir.join(format!("{prefix}.{label}.{}", matrix_format.extension()));
        let file = StagedFile::create(&path)?;
        let file = match matrix_format {
            MatrixFormat::Graal => {
                let mut writer = GraalWriter::new(file);
                write_matrix(matrix, &mut writer)?;
                writer.into_inner()
            }
            MatrixFormat::Bg2 => {
                let mut writer = Bedgraph2Writer::new(file, genome, &table);
                write_matrix(matrix, &mut writer)?;
                writer.into_inner()
            }
        };
        staging.add(file);
    }

    let mut metrics = StagedFile::create(&outdir.join(format!("{prefix}.metrics.json")))?;
    report.write_json(&mut metrics)?;
    staging.add(metrics);

    Ok(staging.commit()?)
}

#[allow(clippy::cast_precision_loss)]
fn percent(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 * 100.0 / total as f64
    }
}

fn print_text(output: &PipelineOutput, files: &[PathBuf], verbose: bool) {
    let metrics = &output.metrics;
    println!("Pairs: {}", metrics.total);
    for (label, count) in metrics.rows() {
        println!("  {label:<16}{count:>12}  {:>6.2}%", percent(count, metrics.total));
    }
    println!(
        "Valid contacts: {} ({} cis, {} trans)",
        metrics.accepted(),
        metrics.valid_cis,
        metrics.valid_trans
    );
    if metrics.record_errors > 0 {
        println!("Malformed records: {}", metrics.record_errors);
    }
    if metrics.duplicate_window_overflows > 0 {
        println!(
            "Duplicate window overflows: {} (raise --duplicate-window)",
            metrics.duplicate_window_overflows
        );
    }

    println!();
    for matrix in &output.matrices {
        println!(
            "{}: {} bins, {} non-zero cells, {} contacts",
            matrix.resolution(),
            matrix.size(),
            matrix.nnz(),
            matrix.total()
        );
    }
    if verbose {
        println!();
        for file in files {
            println!("Wrote {}", file.display());
        }
    }
}

fn print_tsv(output: &PipelineOutput) {
    println!("category\tcount");
    println!("TOTAL\t{}", output.metrics.total);
    for (label, count) in output.metrics.rows() {
        println!("{label}\t{count}");
    }
    println!();
    println!("resolution\tbins\tnnz\tcontacts");
    for matrix in &output.matrices {
        println!(
            "{}\t{}\t{}\t{}",
            matrix.resolution(),
            matrix.size(),
            matrix.nnz(),
            matrix.total()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: BuildArgs,
    }

    #[test]
    fn test_flags_map_onto_config() {
        let wrapper = Wrapper::parse_from([
            "build",
            "in.pairs",
            "--fragments",
            "frags.txt",
            "-r",
            "frag",
            "-r",
            "10kb",
            "--min-distance",
            "1000",
            "--adjacent-inward",
            "religation",
            "--keep-duplicates",
            "-t",
            "4",
        ]);
        let config = wrapper.args.pipeline_config();
        assert_eq!(
            config.resolutions,
            vec![Resolution::Fragment, Resolution::Width(10_000)]
        );
        assert_eq!(config.classifier.min_distance, Some(1000));
        assert_eq!(config.classifier.min_mapq, DEFAULT_MIN_MAPQ);
        assert_eq!(config.classifier.adjacent_inward, AdjacentInward::Religation);
        assert!(!config.filter.remove_duplicates);
        assert_eq!(config.shards, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_resolution_is_fragments() {
        let wrapper = Wrapper::parse_from(["build", "in.pairs", "--fragments", "f.txt"]);
        assert_eq!(wrapper.args.resolutions, vec![Resolution::Fragment]);
    }

    #[test]
    fn test_reference_from_header_sizes() {
        let wrapper = Wrapper::parse_from(["build", "in.pairs", "--enzyme", "100"]);
        let header = PairsHeader {
            chromsizes: vec![("chr1".to_string(), 250)],
            ..PairsHeader::default()
        };
        let fragments = load_fragments(&wrapper.args, &header).unwrap();
        assert_eq!(fragments.len(), 3);

        assert!(load_fragments(&wrapper.args, &PairsHeader::default()).is_err());
    }

    #[test]
    fn test_min_size_applies_to_digested_reference() {
        let wrapper = Wrapper::parse_from(["build", "in.pairs", "--enzyme", "100", "--min-size", "60"]);
        let header = PairsHeader {
            chromsizes: vec![("chr1".to_string(), 250)],
            ..PairsHeader::default()
        };
        let fragments = load_fragments(&wrapper.args, &header).unwrap();
        assert_eq!(fragments.len(), 2);
    }

    #[test]
    fn test_sort_order_warning() {
        let sorted = PairsHeader {
            sorted: Some(COORDINATE_ORDER.to_string()),
            ..PairsHeader::default()
        };
        assert_eq!(sort_order_warning(&sorted), None);

        let by_name = PairsHeader {
            sorted: Some("readID".to_string()),
            ..PairsHeader::default()
        };
        assert!(sort_order_warning(&by_name).is_some_and(|m| m.contains("readID")));

        let missing = sort_order_warning(&PairsHeader::default());
        assert!(missing.is_some_and(|m| m.contains("no #sorted line")));
    }
}
