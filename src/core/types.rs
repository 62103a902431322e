use serde::Serialize;
use std::str::FromStr;

/// Strand an alignment maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Strand {
    Forward,
    Reverse,
}

impl Strand {
    #[must_use]
    pub fn as_char(self) -> char {
        match self {
            Self::Forward => '+',
            Self::Reverse => '-',
        }
    }
}

impl std::fmt::Display for Strand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl FromStr for Strand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "+" => Ok(Self::Forward),
            "-" => Ok(Self::Reverse),
            other => Err(format!("invalid strand '{other}', expected '+' or '-'")),
        }
    }
}

/// Relative orientation of two ends once ordered upstream/downstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    /// Upstream on +, downstream on -: reads face each other
    Inward,
    /// Upstream on -, downstream on +: reads face away from each other
    Outward,
    /// Both ends on the same strand
    Same,
}

impl Orientation {
    #[must_use]
    pub fn of(upstream: Strand, downstream: Strand) -> Self {
        match (upstream, downstream) {
            (Strand::Forward, Strand::Reverse) => Self::Inward,
            (Strand::Reverse, Strand::Forward) => Self::Outward,
            _ => Self::Same,
        }
    }
}

/// Hi-C event type assigned to a read pair by the classifier
///
/// The set is closed; every stage that consumes events matches on it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// Informative long-range or inter-chromosomal contact
    Valid,
    /// Inward pair across an undigested restriction site
    Uncut,
    /// Outward pair a short distance apart: circularized multi-fragment product
    Loop,
    /// Pair on adjacent fragments re-joined after cutting
    Religation,
    /// Outward pair on one fragment: the fragment ligated onto itself
    SelfCircle,
    /// Inward pair on one fragment: unligated fragment end
    DanglingEnd,
    /// Same-strand pair on one fragment
    ExtraDangling,
    /// Same or adjacent fragment pair closer than the minimum distance
    TooShort,
    /// Distant-fragment pair closer than the minimum distance
    TooClose,
    /// Unmapped, low quality, out of range or malformed
    Unknown,
}

impl EventType {
    pub const ALL: [EventType; 10] = [
        Self::Valid,
        Self::Uncut,
        Self::Loop,
        Self::Religation,
        Self::SelfCircle,
        Self::DanglingEnd,
        Self::ExtraDangling,
        Self::TooShort,
        Self::TooClose,
        Self::Unknown,
    ];

    /// Whether events of this type are technical artifacts kept out of the matrix
    #[must_use]
    pub fn is_artifact(self) -> bool {
        match self {
            Self::Valid => false,
            Self::Uncut
            | Self::Loop
            | Self::Religation
            | Self::SelfCircle
            | Self::DanglingEnd
            | Self::ExtraDangling
            | Self::TooShort
            | Self::TooClose
            | Self::Unknown => true,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Valid => "VALID",
            Self::Uncut => "UNCUT",
            Self::Loop => "LOOP",
            Self::Religation => "RELIGATION",
            Self::SelfCircle => "SELF_CIRCLE",
            Self::DanglingEnd => "DANGLING_END",
            Self::ExtraDangling => "EXTRA_DANGLING",
            Self::TooShort => "TOO_SHORT",
            Self::TooClose => "TOO_CLOSE",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
