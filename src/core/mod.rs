//! Core data types for Hi-C pair processing.
//!
//! This module provides the fundamental types used throughout the library:
//!
//! - [`Genome`]: Ordered chromosome table defining the global coordinate order
//! - [`AlignedEnd`], [`ReadPair`]: One aligned read pair as produced by the aligner
//! - [`ClassifiedEvent`]: A read pair with its Hi-C event type and attributions
//! - [`EventType`], [`Strand`], [`Orientation`]: Classification vocabulary
//!
//! ## Coordinates
//!
//! All positions are 0-based internally. The `.pairs` format and SAM use 1-based
//! positions; conversion happens at the parsing boundary.
//!
//! | Orientation | Upstream strand | Downstream strand | Reads point |
//! |-------------|-----------------|-------------------|-------------|
//! | Inward      | +               | -                 | towards each other |
//! | Outward     | -               | +                 | away from each other |
//! | Same        | + / -           | + / -             | the same way |

pub mod genome;
pub mod record;
pub mod types;

pub use genome::{Chromosome, Genome, GenomeError};
pub use record::{AlignedEnd, ClassifiedEvent, ReadPair, RecordError};
pub use types::{EventType, Orientation, Strand};
