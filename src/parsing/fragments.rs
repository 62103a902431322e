//! Restriction fragment tables.
//!
//! Two layouts are recognized:
//!
//! - `fragments_list.txt` with a header line
//!   `id chrom start_pos end_pos size [...]`
//! - BED, `chrom start end [...]`, without header
//!
//! Coordinates are 0-based half-open in both. Chromosome order is the order of
//! first appearance and chromosome lengths are the end of their last fragment.

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use crate::core::genome::Genome;
use crate::index::FragmentIndex;
use crate::parsing::{open_text, ParseError};
use crate::utils::validation::check_contig_limit;

/// Fragment intervals and the chromosome table they imply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentTable {
    pub chromosomes: Vec<(String, u64)>,
    pub fragments: Vec<(String, u64, u64)>,
}

impl FragmentTable {
    /// Build the fragment index over a genome made of this table's chromosomes
    ///
    /// # Errors
    ///
    /// Returns a `ParseError` if the chromosome table is invalid or the
    /// fragments do not tile it.
    pub fn into_index(self, circular: bool) -> Result<FragmentIndex, ParseError> {
        let genome = Arc::new(Genome::new(self.chromosomes, circular)?);
        Ok(FragmentIndex::from_fragments(genome, &self.fragments)?)
    }
}

/// Read a fragment table from a file
///
/// # Errors
///
/// Returns `ParseError::Io` if the file cannot be read, or other parse errors
/// if the content is invalid.
pub fn parse_fragments_file(path: &Path) -> Result<FragmentTable, ParseError> {
    parse_fragments(open_text(path)?)
}

/// Read a fragment table in either layout
///
/// # Errors
///
/// Returns `ParseError::InvalidFormat` for short lines, non-numeric
/// coordinates, fragments of one chromosome that are not contiguous, or an
/// empty table, and `ParseError::TooManyContigs` if the limit is exceeded.
pub fn parse_fragments<R: BufRead>(reader: R) -> Result<FragmentTable, ParseError> {
    let mut chromosomes: Vec<(String, u64)> = Vec::new();
    let mut fragments = Vec::new();
    // Column indices of chrom, start, end
    let mut columns = (0, 1, 2);
    let mut first_data_line = true;

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();

        if first_data_line {
            first_data_line = false;
            if fields.first().is_some_and(|f| f.eq_ignore_ascii_case("id")) {
                columns = (1, 2, 3);
                continue;
            }
        }

        let line_num = i + 1;
        let (ci, si, ei) = columns;
        if fields.len() <= ei {
            return Err(ParseError::InvalidFormat(format!(
                "Line {line_num} has fewer than {} fields",
                ei + 1
            )));
        }
        let coordinate = |idx: usize| {
            fields[idx].parse::<u64>().map_err(|_| {
                ParseError::InvalidFormat(format!(
                    "Invalid coordinate on line {line_num}: '{}'",
                    fields[idx]
                ))
            })
        };
        let chrom = fields[ci];
        let (start, end) = (coordinate(si)?, coordinate(ei)?);

        match chromosomes.last_mut() {
            Some((name, length)) if name == chrom => *length = end,
            _ => {
                if chromosomes.iter().any(|(name, _)| name == chrom) {
                    return Err(ParseError::InvalidFormat(format!(
                        "Fragments of '{chrom}' are not contiguous (line {line_num})"
                    )));
                }
                if check_contig_limit(chromosomes.len()).is_some() {
                    return Err(ParseError::TooManyContigs(chromosomes.len()));
                }
                chromosomes.push((chrom.to_string(), end));
            }
        }
        fragments.push((chrom.to_string(), start, end));
    }

    if fragments.is_empty() {
        return Err(ParseError::InvalidFormat(
            "No fragments found in table".to_string(),
        ));
    }

    Ok(FragmentTable {
        chromosomes,
        fragments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fragments_list() {
        let text = "id\tchrom\tstart_pos\tend_pos\tsize\tgc_content\n\
                    1\tseq1\t0\t100\t100\t0.5\n\
                    2\tseq1\t100\t250\t150\t0.5\n\
                    1\tseq2\t0\t80\t80\t0.5\n";
        let table = parse_fragments(text.as_bytes()).unwrap();
        assert_eq!(
            table.chromosomes,
            vec![("seq1".to_string(), 250), ("seq2".to_string(), 80)]
        );
        assert_eq!(table.fragments.len(), 3);

        let index = table.into_index(false).unwrap();
        assert_eq!(index.locate("seq1", 120).unwrap(), 1);
        assert_eq!(index.locate("seq2", 0).unwrap(), 2);
    }

    #[test]
    fn test_parse_bed() {
        let text = "chrA 0 10\nchrA 10 20 name\n";
        let table = parse_fragments(text.as_bytes()).unwrap();
        assert_eq!(table.chromosomes, vec![("chrA".to_string(), 20)]);
        assert_eq!(table.fragments[1], ("chrA".to_string(), 10, 20));
    }

    #[test]
    fn test_parse_fragments_rejects_interleaved_chromosomes() {
        let text = "chrA 0 10\nchrB 0 10\nchrA 10 20\n";
        assert!(matches!(
            parse_fragments(text.as_bytes()),
            Err(ParseError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_gapped_table_fails_indexing() {
        let text = "chrA 0 10\nchrA 15 20\n";
        let table = parse_fragments(text.as_bytes()).unwrap();
        assert!(matches!(table.into_index(false), Err(ParseError::Index(_))));
    }
}
