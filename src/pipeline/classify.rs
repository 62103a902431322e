use serde::Serialize;

use crate::core::record::{ClassifiedEvent, ReadPair};
use crate::core::types::{EventType, Orientation};
use crate::index::Reference;

/// Default minimum mapping quality, matching common Hi-C pipelines
pub const DEFAULT_MIN_MAPQ: u8 = 30;

/// How inward-facing pairs on adjacent fragments are called
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum AdjacentInward {
    /// Failed digestion: the pair spans an intact restriction site
    #[default]
    Uncut,
    /// Adjacent fragments re-joined after cutting
    Religation,
}

/// Thresholds used by the classifier
#[derive(Debug, Clone, Serialize)]
pub struct ClassifierConfig {
    /// Ends with a reported mapping quality below this are `UNKNOWN`
    pub min_mapq: u8,

    /// Intra-chromosomal pairs at or below this distance are `TOO_SHORT`/`TOO_CLOSE`
    pub min_distance: Option<u64>,

    /// Pairs on distinct, non-adjacent fragments at or below this distance
    /// are `LOOP`, whatever their orientation
    pub max_loop_distance: Option<u64>,

    pub adjacent_inward: AdjacentInward,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_mapq: DEFAULT_MIN_MAPQ,
            min_distance: None,
            max_loop_distance: None,
            adjacent_inward: AdjacentInward::Uncut,
        }
    }
}

/// Assigns a Hi-C event type to each read pair.
///
/// Classification is deterministic and free of side effects: the same pair
/// always yields the same event.
pub struct PairClassifier<'a> {
    reference: &'a Reference,
    config: ClassifierConfig,
}

impl<'a> PairClassifier<'a> {
    pub fn new(reference: &'a Reference, config: ClassifierConfig) -> Self {
        Self { reference, config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn classify(&self, mut pair: ReadPair) -> ClassifiedEvent {
        pair.canonicalize();

        let (Some(c1), Some(c2)) = (pair.end1.chrom, pair.end2.chrom) else {
            return ClassifiedEvent::unknown(pair);
        };
        if !self.passes_quality(&pair) {
            return ClassifiedEvent::unknown(pair);
        }

        let fragments = &self.reference.fragments;
        let (Ok(f1), Ok(f2)) = (
            fragments.locate_ordinal(c1, pair.end1.position),
            fragments.locate_ordinal(c2, pair.end2.position),
        ) else {
            return ClassifiedEvent::unknown(pair);
        };

        let mut bins = Vec::with_capacity(self.reference.binnings.len());
        for binning in &self.reference.binnings {
            match (
                binning.locate(c1, pair.end1.position, f1),
                binning.locate(c2, pair.end2.position, f2),
            ) {
                (Ok(b1), Ok(b2)) => bins.push((b1, b2)),
                _ => return ClassifiedEvent::unknown(pair),
            }
        }

        if c1 != c2 {
            return ClassifiedEvent {
                pair,
                event: EventType::Valid,
                fragments: Some((f1, f2)),
                bins,
                distance: None,
            };
        }

        let Some(chrom) = self.reference.genome.get(c1) else {
            return ClassifiedEvent::unknown(pair);
        };
        let (p1, p2) = (pair.end1.position, pair.end2.position);
        let distance = chrom.distance(p1, p2);
        let gap = fragments.gap(c1, f1, f2);

        // The short path round a circular chromosome crosses the origin, so the
        // higher coordinate is upstream
        let orientation = if chrom.wraps(p1, p2) {
            Orientation::of(pair.end2.strand, pair.end1.strand)
        } else {
            Orientation::of(pair.end1.strand, pair.end2.strand)
        };

        let event = self.intra_event(orientation, gap, distance);

        ClassifiedEvent {
            pair,
            event,
            fragments: Some((f1, f2)),
            bins,
            distance: Some(distance),
        }
    }

    fn passes_quality(&self, pair: &ReadPair) -> bool {
        [&pair.end1, &pair.end2]
            .iter()
            .all(|end| !end.supplementary && end.mapq.map_or(true, |q| q >= self.config.min_mapq))
    }

    /// Event type of an intra-chromosomal pair. Thresholds are inclusive so
    /// that ties fall on the artifact side.
    fn intra_event(&self, orientation: Orientation, gap: u64, distance: u64) -> EventType {
        let event = match (gap, orientation) {
            (0, Orientation::Outward) => EventType::SelfCircle,
            (0, Orientation::Inward) => EventType::DanglingEnd,
            (0, Orientation::Same) => EventType::ExtraDangling,
            (1, Orientation::Inward) => match self.config.adjacent_inward {
                AdjacentInward::Uncut => EventType::Uncut,
                AdjacentInward::Religation => EventType::Religation,
            },
            (1, Orientation::Outward | Orientation::Same) => EventType::Religation,
            _ if self.config.max_loop_distance.is_some_and(|max| distance <= max) => {
                EventType::Loop
            }
            _ => EventType::Valid,
        };

        if self.config.min_distance.is_some_and(|min| distance <= min) {
            if gap <= 1 {
                EventType::TooShort
            } else {
                EventType::TooClose
            }
        } else {
            event
        }
    }
}
