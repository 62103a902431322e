//! # hicbin
//!
//! A library for turning aligned Hi-C read pairs into sparse contact matrices.
//!
//! Each read pair is attributed to restriction fragments, classified as a
//! valid contact or as one of the ligation artifacts of the Hi-C protocol,
//! filtered for PCR duplicates, and counted into one contact matrix per
//! configured resolution.
//!
//! ## Features
//!
//! - **Fragment-level classification**: dangling ends, self circles, uncut and
//!   religated fragments, short loops and too-close pairs
//! - **Duplicate removal**: bounded lookback window over coordinate-sorted input
//! - **Multi-resolution**: fragment-level and any number of fixed bin widths in one pass
//! - **Sharding**: pairs split by chromosome across worker threads, results merged exactly
//! - **Circular genomes**: distances and fragment gaps computed around the origin
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hicbin::core::{AlignedEnd, Genome, ReadPair, Strand};
//! use hicbin::index::{FragmentIndex, Reference, Resolution};
//! use hicbin::pipeline::{run_pipeline, PipelineConfig};
//!
//! let genome = Arc::new(Genome::new(vec![("chr1".to_string(), 10_000)], false).unwrap());
//! let fragments = FragmentIndex::fixed_size(genome, 100).unwrap();
//! let reference = Reference::new(fragments, &[Resolution::Fragment]).unwrap();
//!
//! let pair = ReadPair::new(
//!     "read1",
//!     AlignedEnd::mapped(0, 50, Strand::Forward),
//!     AlignedEnd::mapped(0, 5050, Strand::Reverse),
//! );
//! let output = run_pipeline(&reference, &PipelineConfig::default(), [Ok(pair)]).unwrap();
//! println!("{} valid contacts", output.metrics.accepted());
//! ```
//!
//! ## Modules
//!
//! - [`core`]: Genome, read pair and event types
//! - [`index`]: Fragment and bin indices, restriction digestion
//! - [`pipeline`]: Classifier, filter, aggregator and the sharded runner
//! - [`parsing`]: Readers for chromosome sizes, fragment tables, FASTA, `.pairs` and SAM/BAM
//! - [`output`]: Matrix, table, `.pairs` and report writers
//! - [`utils`]: Validation helpers and the external `.pairs` sort
//! - [`cli`]: Command-line interface implementation

pub mod cli;
pub mod core;
pub mod index;
pub mod output;
pub mod parsing;
pub mod pipeline;
pub mod utils;

// Re-export commonly used types for convenience
pub use core::types::*;
pub use core::{AlignedEnd, ClassifiedEvent, Genome, ReadPair};
pub use index::{FragmentIndex, Reference, Resolution};
pub use pipeline::{run_pipeline, PipelineConfig, PipelineOutput, RunMetrics};
