//! Streaming pairs-processing pipeline.
//!
//! Each read pair flows through three stages:
//!
//! 1. [`PairClassifier`] assigns an event type and locates both ends in
//!    fragment and bin space
//! 2. [`EventFilter`] counts every event and lets only first-seen VALID pairs
//!    through
//! 3. [`Aggregator`] adds surviving pairs to one sparse matrix per resolution
//!
//! Input order is checked on the reading side, before pairs are split up.
//! With more than one shard the input is split by the chromosome of the
//! upstream end. A single reader on the calling thread feeds batches to one
//! worker per shard; each worker owns its own filter, metrics and matrices, and
//! the results are summed once every worker has finished. Since all pairs
//! starting on a chromosome go to the same shard, duplicate detection sees the
//! same ordered stream as in a single pass.

pub mod aggregate;
pub mod classify;
pub mod filter;
pub mod metrics;

use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::record::ReadPair;
use crate::index::{IndexError, Reference, Resolution};
use crate::parsing::ParseError;

pub use aggregate::{Aggregator, ContactMatrix};
pub use classify::{AdjacentInward, ClassifierConfig, PairClassifier};
pub use filter::{DuplicateWindow, EventFilter, FilterConfig};
pub use metrics::RunMetrics;

/// Upper bound on worker shards
pub const MAX_SHARDS: usize = 1024;

/// Default number of pairs sent to a worker at once
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Batches buffered per worker before the reader blocks
const CHANNEL_DEPTH: usize = 4;

/// Record errors reported at warn level before switching to debug
const MAX_LOGGED_RECORD_ERRORS: u64 = 5;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Chromosome '{0}' is not in the reference")]
    ReferenceMismatch(String),

    #[error("Input is not coordinate-sorted: read '{read_id}' at {chrom}:{position} follows {previous_chrom}:{previous_position}")]
    UnsortedInput {
        read_id: String,
        chrom: String,
        position: u64,
        previous_chrom: String,
        previous_position: u64,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Parse(ParseError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("Worker failed: {0}")]
    Worker(String),
}

impl From<ParseError> for PipelineError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::UnknownChromosome(name) => Self::ReferenceMismatch(name),
            other => Self::Parse(other),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineConfig {
    pub classifier: ClassifierConfig,
    pub filter: FilterConfig,
    pub resolutions: Vec<Resolution>,
    pub shards: usize,
    pub batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierConfig::default(),
            filter: FilterConfig::default(),
            resolutions: vec![Resolution::Fragment],
            shards: 1,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl PipelineConfig {
    /// # Errors
    ///
    /// Returns `PipelineError::Configuration` describing the first invalid setting.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |msg: String| Err(PipelineError::Configuration(msg));

        if self.resolutions.is_empty() {
            return invalid("at least one resolution is required".to_string());
        }
        let mut seen = HashSet::new();
        for resolution in &self.resolutions {
            if matches!(resolution, Resolution::Width(0)) {
                return invalid("bin width must be greater than zero".to_string());
            }
            if !seen.insert(resolution) {
                return invalid(format!("resolution {resolution} given more than once"));
            }
        }
        if self.shards == 0 || self.shards > MAX_SHARDS {
            return invalid(format!(
                "shard count must be between 1 and {MAX_SHARDS}, got {}",
                self.shards
            ));
        }
        if self.batch_size == 0 {
            return invalid("batch size must be greater than zero".to_string());
        }
        if self.filter.window_capacity == 0 {
            return invalid("duplicate window capacity must be greater than zero".to_string());
        }
        if let (Some(min), Some(max)) = (
            self.classifier.min_distance,
            self.classifier.max_loop_distance,
        ) {
            if max <= min {
                warn!(
                    min_distance = min,
                    max_loop_distance = max,
                    "loop distance does not exceed the minimum distance, no pair will be called LOOP"
                );
            }
        }
        Ok(())
    }
}

/// Counts and matrices of a finished run
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub metrics: RunMetrics,
    /// One matrix per resolution, in configuration order
    pub matrices: Vec<ContactMatrix>,
}

/// Everything one shard produced
#[derive(Debug, Clone)]
struct ShardResult {
    metrics: RunMetrics,
    aggregator: Aggregator,
}

/// Rejects pairs whose upstream end comes before the previous pair's
struct OrderCheck<'a> {
    reference: &'a Reference,
    last: Option<(usize, u64)>,
}

impl<'a> OrderCheck<'a> {
    fn new(reference: &'a Reference) -> Self {
        Self {
            reference,
            last: None,
        }
    }

    /// `pair` must already be canonical
    fn check(&mut self, pair: &ReadPair) -> Result<(), PipelineError> {
        if let Some(chrom) = pair.end1.chrom {
            let key = (chrom, pair.end1.position);
            if let Some(previous) = self.last.filter(|&previous| key < previous) {
                return Err(self.unsorted(pair, previous));
            }
            self.last = Some(key);
        }
        Ok(())
    }

    fn unsorted(&self, pair: &ReadPair, previous: (usize, u64)) -> PipelineError {
        let name = |ordinal: usize| {
            self.reference
                .genome
                .get(ordinal)
                .map_or_else(|| format!("#{ordinal}"), |c| c.name.clone())
        };
        PipelineError::UnsortedInput {
            read_id: pair.read_id.clone(),
            chrom: pair.end1.chrom.map(name).unwrap_or_default(),
            position: pair.end1.position,
            previous_chrom: name(previous.0),
            previous_position: previous.1,
        }
    }
}

/// Classifies, filters and aggregates the pairs routed to one shard
struct ShardRunner<'a> {
    classifier: PairClassifier<'a>,
    filter: EventFilter,
    aggregator: Aggregator,
}

impl<'a> ShardRunner<'a> {
    fn new(reference: &'a Reference, config: &PipelineConfig) -> Self {
        Self {
            classifier: PairClassifier::new(reference, config.classifier.clone()),
            filter: EventFilter::new(config.filter.clone()),
            aggregator: Aggregator::new(reference),
        }
    }

    fn process(&mut self, pair: ReadPair) {
        let event = self.classifier.classify(pair);
        if self.filter.accept(&event) {
            self.aggregator.add(&event);
        }
    }

    fn finish(self) -> ShardResult {
        ShardResult {
            metrics: self.filter.into_metrics(),
            aggregator: self.aggregator,
        }
    }
}

/// Count per-record input problems; anything else stops the run
fn absorb_input_error(err: ParseError, metrics: &mut RunMetrics) -> Result<(), PipelineError> {
    match err {
        ParseError::Record(e) => {
            metrics.record_error();
            if metrics.record_errors <= MAX_LOGGED_RECORD_ERRORS {
                warn!(error = %e, "skipping record");
            } else {
                debug!(error = %e, "skipping record");
            }
            Ok(())
        }
        other => Err(other.into()),
    }
}

/// Run the whole pipeline over a stream of read pairs.
///
/// Per-record errors are counted as UNKNOWN and skipped. Any other error,
/// including a chromosome missing from the reference or out-of-order input,
/// aborts the run and no partial result is returned.
///
/// # Errors
///
/// Returns `PipelineError::Configuration` for an invalid configuration or one
/// that does not match the reference, `PipelineError::ReferenceMismatch`,
/// `PipelineError::UnsortedInput`, or the first fatal input error.
pub fn run_pipeline<I>(
    reference: &Reference,
    config: &PipelineConfig,
    pairs: I,
) -> Result<PipelineOutput, PipelineError>
where
    I: IntoIterator<Item = Result<ReadPair, ParseError>>,
{
    config.validate()?;
    if reference.resolutions() != config.resolutions {
        return Err(PipelineError::Configuration(
            "reference bin indices do not match the configured resolutions".to_string(),
        ));
    }

    let result = if config.shards == 1 {
        run_single(reference, config, pairs)?
    } else {
        run_sharded(reference, config, pairs)?
    };

    if result.metrics.duplicate_window_overflows > 0 {
        warn!(
            evicted = result.metrics.duplicate_window_overflows,
            capacity = config.filter.window_capacity,
            "duplicate window overflowed, some PCR duplicates may have been counted as valid"
        );
    }
    info!(
        pairs = result.metrics.total,
        valid = result.metrics.accepted(),
        duplicates = result.metrics.pcr_duplicates,
        "pipeline finished"
    );

    Ok(PipelineOutput {
        metrics: result.metrics,
        matrices: result.aggregator.into_matrices(),
    })
}

fn run_single<I>(
    reference: &Reference,
    config: &PipelineConfig,
    pairs: I,
) -> Result<ShardResult, PipelineError>
where
    I: IntoIterator<Item = Result<ReadPair, ParseError>>,
{
    let mut input_metrics = RunMetrics::new();
    let mut order = OrderCheck::new(reference);
    let mut runner = ShardRunner::new(reference, config);

    for item in pairs {
        match item {
            Ok(mut pair) => {
                pair.canonicalize();
                order.check(&pair)?;
                runner.process(pair);
            }
            Err(err) => absorb_input_error(err, &mut input_metrics)?,
        }
    }

    let mut result = runner.finish();
    result.metrics.merge(&input_metrics);
    Ok(result)
}

fn run_sharded<I>(
    reference: &Reference,
    config: &PipelineConfig,
    pairs: I,
) -> Result<ShardResult, PipelineError>
where
    I: IntoIterator<Item = Result<ReadPair, ParseError>>,
{
    let shards = config.shards;
    let batch_size = config.batch_size;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(shards)
        .thread_name(|i| format!("hicbin-shard-{i}"))
        .build()
        .map_err(|e| PipelineError::Worker(e.to_string()))?;

    let mut slots: Vec<Option<ShardResult>> = (0..shards).map(|_| None).collect();
    let mut input_metrics = RunMetrics::new();

    let read_result = pool.in_place_scope(|scope| {
        let mut senders = Vec::with_capacity(shards);
        for (shard, slot) in slots.iter_mut().enumerate() {
            let (tx, rx) = crossbeam_channel::bounded::<Vec<ReadPair>>(CHANNEL_DEPTH);
            senders.push(tx);
            scope.spawn(move |_| {
                debug!(shard, "shard started");
                let mut runner = ShardRunner::new(reference, config);
                for batch in rx {
                    for pair in batch {
                        runner.process(pair);
                    }
                }
                *slot = Some(runner.finish());
                debug!(shard, "shard finished");
            });
        }

        let mut order = OrderCheck::new(reference);
        let mut batches: Vec<Vec<ReadPair>> =
            (0..shards).map(|_| Vec::with_capacity(batch_size)).collect();
        for item in pairs {
            let mut pair = match item {
                Ok(pair) => pair,
                Err(err) => {
                    absorb_input_error(err, &mut input_metrics)?;
                    continue;
                }
            };
            pair.canonicalize();
            order.check(&pair)?;
            let shard = pair.end1.chrom.map_or(0, |c| c % shards);
            batches[shard].push(pair);
            if batches[shard].len() >= batch_size {
                let batch = std::mem::replace(&mut batches[shard], Vec::with_capacity(batch_size));
                if senders[shard].send(batch).is_err() {
                    return Err(PipelineError::Worker(format!("shard {shard} stopped early")));
                }
            }
        }
        for (shard, (sender, batch)) in senders.iter().zip(batches).enumerate() {
            if !batch.is_empty() && sender.send(batch).is_err() {
                return Err(PipelineError::Worker(format!("shard {shard} stopped early")));
            }
        }
        Ok::<(), PipelineError>(())
    });

    read_result?;

    let mut merged: Option<ShardResult> = None;
    for (shard, slot) in slots.into_iter().enumerate() {
        let result =
            slot.ok_or_else(|| PipelineError::Worker(format!("shard {shard} produced no result")))?;
        match merged.as_mut() {
            Some(total) => {
                total.metrics.merge(&result.metrics);
                total.aggregator.merge(&result.aggregator);
            }
            None => merged = Some(result),
        }
    }

    let mut result = merged.ok_or_else(|| PipelineError::Worker("no shards ran".to_string()))?;
    result.metrics.merge(&input_metrics);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::genome::Genome;
    use crate::core::record::{AlignedEnd, RecordError};
    use crate::core::types::{EventType, Strand};
    use crate::index::FragmentIndex;
    use std::sync::Arc;

    use Strand::{Forward as F, Reverse as R};

    fn reference(resolutions: &[Resolution]) -> Reference {
        let genome = Arc::new(
            Genome::new(
                vec![
                    ("chr1".to_string(), 20_000),
                    ("chr2".to_string(), 10_000),
                    ("chr3".to_string(), 5_000),
                ],
                false,
            )
            .unwrap(),
        );
        let fragments = FragmentIndex::fixed_size(genome, 100).unwrap();
        Reference::new(fragments, resolutions).unwrap()
    }

    fn config(resolutions: &[Resolution], shards: usize) -> PipelineConfig {
        PipelineConfig {
            resolutions: resolutions.to_vec(),
            shards,
            batch_size: 3,
            ..PipelineConfig::default()
        }
    }

    fn pair(c1: usize, p1: u64, s1: Strand, c2: usize, p2: u64, s2: Strand) -> ReadPair {
        ReadPair::new(
            format!("r{c1}-{p1}-{c2}-{p2}"),
            AlignedEnd::mapped(c1, p1, s1),
            AlignedEnd::mapped(c2, p2, s2),
        )
    }

    fn sorted_input() -> Vec<Result<ReadPair, ParseError>> {
        vec![
            Ok(pair(0, 10, R, 0, 90, F)),
            Ok(pair(0, 50, F, 0, 5050, R)),
            Ok(pair(0, 50, F, 0, 5050, R)),
            Ok(pair(0, 1000, F, 1, 2000, R)),
            Ok(pair(0, 1000, F, 1, 2000, R)),
            Err(ParseError::Record(RecordError::Malformed {
                line: 7,
                message: "bad position".to_string(),
            })),
            Ok(pair(0, 15_000, R, 2, 100, R)),
            Ok(pair(1, 100, F, 1, 9000, F)),
            Ok(pair(1, 200, F, 1, 250, R)),
            Ok(pair(2, 10, F, 2, 4000, R)),
            Ok(ReadPair::new("u", AlignedEnd::unmapped(), AlignedEnd::unmapped())),
        ]
    }

    #[test]
    fn test_single_pass_counts() {
        let resolutions = [Resolution::Width(1000)];
        let reference = reference(&resolutions);
        let output = run_pipeline(&reference, &config(&resolutions, 1), sorted_input()).unwrap();

        let metrics = &output.metrics;
        assert_eq!(metrics.total, 11);
        assert_eq!(metrics.counted(), metrics.total);
        assert_eq!(metrics.count(EventType::SelfCircle), 1);
        assert_eq!(metrics.count(EventType::DanglingEnd), 1);
        assert_eq!(metrics.count(EventType::Unknown), 2);
        assert_eq!(metrics.record_errors, 1);
        assert_eq!(metrics.pcr_duplicates, 2);
        assert_eq!(metrics.accepted(), 5);

        let matrix = &output.matrices[0];
        // chr1 has 20 bins of 1000 bp, chr2 starts at bin 20
        assert_eq!(matrix.get(0, 5), 1);
        assert_eq!(matrix.get(1, 22), 1);
        assert_eq!(matrix.total(), 5);
    }

    #[test]
    fn test_sharded_matches_single_pass() {
        let resolutions = [Resolution::Fragment, Resolution::Width(1000)];
        let reference = reference(&resolutions);
        let single = run_pipeline(&reference, &config(&resolutions, 1), sorted_input()).unwrap();

        for shards in [2, 3, 5] {
            let sharded =
                run_pipeline(&reference, &config(&resolutions, shards), sorted_input()).unwrap();
            assert_eq!(sharded.metrics, single.metrics);
            assert_eq!(sharded.matrices, single.matrices);
        }
    }

    #[test]
    fn test_unsorted_input_is_rejected() {
        let resolutions = [Resolution::Width(1000)];
        let reference = reference(&resolutions);
        for shards in [1, 2] {
            let input = vec![Ok(pair(0, 5000, F, 0, 9000, R)), Ok(pair(0, 100, F, 0, 9000, R))];
            let err = run_pipeline(&reference, &config(&resolutions, shards), input).unwrap_err();
            assert!(matches!(err, PipelineError::UnsortedInput { position: 100, .. }));
        }
    }

    #[test]
    fn test_chromosomes_out_of_order_are_rejected_when_sharded() {
        let resolutions = [Resolution::Width(1000)];
        let reference = reference(&resolutions);
        for shards in [1, 2] {
            let input = vec![Ok(pair(1, 100, F, 1, 9000, R)), Ok(pair(0, 100, F, 0, 9000, R))];
            let err = run_pipeline(&reference, &config(&resolutions, shards), input).unwrap_err();
            assert!(
                matches!(&err, PipelineError::UnsortedInput { chrom, previous_chrom, .. }
                    if chrom == "chr1" && previous_chrom == "chr2"),
                "{shards} shards: {err}"
            );
        }
    }

    #[test]
    fn test_unknown_chromosome_is_fatal() {
        let resolutions = [Resolution::Width(1000)];
        let reference = reference(&resolutions);
        let input = vec![
            Ok(pair(0, 100, F, 0, 9000, R)),
            Err(ParseError::UnknownChromosome("chrUn".to_string())),
        ];
        let err = run_pipeline(&reference, &config(&resolutions, 2), input).unwrap_err();
        assert!(matches!(err, PipelineError::ReferenceMismatch(name) if name == "chrUn"));
    }

    #[test]
    fn test_config_validation() {
        let resolutions = [Resolution::Width(1000)];
        assert!(config(&resolutions, 1).validate().is_ok());

        let mut bad = config(&resolutions, 1);
        bad.shards = 0;
        assert!(matches!(bad.validate(), Err(PipelineError::Configuration(_))));

        let bad = config(&[Resolution::Width(1000), Resolution::Width(1000)], 1);
        assert!(bad.validate().is_err());

        let bad = config(&[], 1);
        assert!(bad.validate().is_err());

        let reference = reference(&[Resolution::Fragment]);
        let err = run_pipeline(&reference, &config(&resolutions, 1), Vec::new()).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn test_empty_input() {
        let resolutions = [Resolution::Width(1000)];
        let reference = reference(&resolutions);
        let output = run_pipeline(&reference, &config(&resolutions, 2), Vec::new()).unwrap();
        assert_eq!(output.metrics.total, 0);
        assert_eq!(output.matrices[0].nnz(), 0);
        assert_eq!(output.matrices[0].size(), 35);
    }
}
