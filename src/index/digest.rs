//! Restriction digestion of a genome sequence.
//!
//! Enzymes are given by name (`DpnII`), by recognition site with an optional
//! caret marking the cut (`A^AGCTT`), or as a comma-separated mix of both. An
//! integer in place of an enzyme selects fixed-size chunks instead.

use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DigestError {
    #[error("Unknown restriction enzyme or invalid site '{0}'")]
    UnknownEnzyme(String),

    #[error("Chunk size must be greater than zero")]
    ZeroChunk,

    #[error("No enzyme given")]
    Empty,
}

/// Recognition sites of common Hi-C enzymes, with `^` marking the cut on the top strand
const ENZYMES: &[(&str, &[&str])] = &[
    ("DpnII", &["^GATC"]),
    ("MboI", &["^GATC"]),
    ("Sau3AI", &["^GATC"]),
    ("HindIII", &["A^AGCTT"]),
    ("EcoRI", &["G^AATTC"]),
    ("NlaIII", &["CATG^"]),
    ("BamHI", &["G^GATCC"]),
    ("NcoI", &["C^CATGG"]),
    ("XhoI", &["C^TCGAG"]),
    ("HinfI", &["G^ANTC"]),
    ("DdeI", &["C^TNAG"]),
    ("MseI", &["T^TAA"]),
    ("CviQI", &["G^TAC"]),
    ("Csp6I", &["G^TAC"]),
    ("Arima", &["^GATC", "G^ANTC"]),
];

/// A recognition site and the offset of the cut within it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestrictionSite {
    pub name: String,
    /// Uppercase site; `N` matches any base
    pub pattern: Vec<u8>,
    /// Cut position relative to the start of the site on the top strand
    pub cut: usize,
}

impl RestrictionSite {
    /// Parse `SITE` or `PRE^POST` notation
    fn from_notation(name: &str, notation: &str) -> Option<Self> {
        let upper = notation.to_ascii_uppercase();
        let cut = upper.find('^').unwrap_or(0);
        let pattern: Vec<u8> = upper.bytes().filter(|&b| b != b'^').collect();
        if pattern.is_empty() || !pattern.iter().all(|b| b"ACGTN".contains(b)) {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            pattern,
            cut,
        })
    }

    /// Sites for one enzyme name or literal site
    ///
    /// # Errors
    ///
    /// Returns `DigestError::UnknownEnzyme` if the name is not a known enzyme
    /// and not a valid site.
    pub fn parse(spec: &str) -> Result<Vec<Self>, DigestError> {
        let spec = spec.trim();
        if let Some((name, sites)) = ENZYMES
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(spec))
        {
            return Ok(sites
                .iter()
                .filter_map(|s| Self::from_notation(name, s))
                .collect());
        }
        Self::from_notation(spec, spec)
            .map(|site| vec![site])
            .ok_or_else(|| DigestError::UnknownEnzyme(spec.to_string()))
    }

    fn reverse_complement(&self) -> Self {
        let pattern = self
            .pattern
            .iter()
            .rev()
            .map(|&b| match b {
                b'A' => b'T',
                b'T' => b'A',
                b'C' => b'G',
                b'G' => b'C',
                other => other,
            })
            .collect();
        Self {
            name: self.name.clone(),
            pattern,
            cut: self.pattern.len() - self.cut,
        }
    }

    fn matches_at(&self, seq: &[u8], at: usize) -> bool {
        self.pattern
            .iter()
            .zip(&seq[at..at + self.pattern.len()])
            .all(|(&p, &b)| p == b'N' || p == b.to_ascii_uppercase())
    }
}

/// How the genome is cut into fragments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Digestion {
    Enzymes(Vec<RestrictionSite>),
    FixedChunk(u64),
}

impl FromStr for Digestion {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DigestError::Empty);
        }
        if let Ok(size) = s.parse::<u64>() {
            if size == 0 {
                return Err(DigestError::ZeroChunk);
            }
            return Ok(Self::FixedChunk(size));
        }

        let mut sites = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            sites.extend(RestrictionSite::parse(part)?);
        }
        if sites.is_empty() {
            return Err(DigestError::Empty);
        }
        Ok(Self::Enzymes(sites))
    }
}

impl std::fmt::Display for Digestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FixedChunk(size) => write!(f, "{size}bp chunks"),
            Self::Enzymes(sites) => {
                let names: Vec<&str> = sites.iter().map(|s| s.name.as_str()).collect();
                write!(f, "{}", names.join(","))
            }
        }
    }
}

/// 0-based cut positions of all sites on both strands of `seq`, sorted and deduplicated
pub fn find_cut_sites(seq: &[u8], sites: &[RestrictionSite]) -> Vec<u64> {
    let mut searched: Vec<RestrictionSite> = Vec::with_capacity(sites.len() * 2);
    for site in sites {
        let rc = site.reverse_complement();
        searched.push(site.clone());
        // palindromic sites are found once on the top strand
        if rc.pattern != site.pattern {
            searched.push(rc);
        }
    }

    let mut cuts = Vec::new();
    for site in &searched {
        let len = site.pattern.len();
        if seq.len() < len {
            continue;
        }
        for at in 0..=seq.len() - len {
            if site.matches_at(seq, at) {
                cuts.push((at + site.cut) as u64);
            }
        }
    }
    cuts.sort_unstable();
    cuts.dedup();
    cuts
}
