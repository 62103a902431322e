//! Chromosome size tables.
//!
//! Accepts `name<TAB>length` files such as UCSC `.chrom.sizes` and FASTA
//! indexes (`.fai`, where the extra columns are ignored). Order of the lines
//! defines the genome order.

use std::io::BufRead;
use std::path::Path;

use crate::parsing::{open_text, ParseError};
use crate::utils::validation::check_contig_limit;

/// Parse a chromosome size file
///
/// # Errors
///
/// Returns `ParseError::Io` if the file cannot be read, or other parse errors
/// if the content is invalid.
pub fn parse_chrom_sizes_file(path: &Path) -> Result<Vec<(String, u64)>, ParseError> {
    parse_chrom_sizes(open_text(path)?)
}

/// Parse `name<TAB>length` lines; blank lines, `#` comments and a leading
/// header line are skipped
///
/// # Errors
///
/// Returns `ParseError::InvalidFormat` if lines have fewer than 2 fields,
/// contain invalid length values, or no chromosomes are found, or
/// `ParseError::TooManyContigs` if the limit is exceeded.
pub fn parse_chrom_sizes<R: BufRead>(reader: R) -> Result<Vec<(String, u64)>, ParseError> {
    let mut sizes = Vec::new();
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
            let first = fields.first().map(|s| s.to_lowercase()).unwrap_or_default();
            if matches!(first.as_str(), "name" | "chrom" | "contig" | "chromosome") {
                continue;
            }
        }

        let line_num = i + 1;
        if fields.len() < 2 {
            return Err(ParseError::InvalidFormat(format!(
                "Line {line_num} has fewer than 2 fields"
            )));
        }

        let length: u64 = fields[1].parse().map_err(|_| {
            ParseError::InvalidFormat(format!(
                "Invalid length on line {line_num}: '{}'",
                fields[1]
            ))
        })?;

        if check_contig_limit(sizes.len()).is_some() {
            return Err(ParseError::TooManyContigs(sizes.len()));
        }

        sizes.push((fields[0].to_string(), length));
    }

    if sizes.is_empty() {
        return Err(ParseError::InvalidFormat(
            "No chromosomes found in size table".to_string(),
        ));
    }

    Ok(sizes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chrom_sizes() {
        let text = "# sizes\nchrom\tlength\nchr1\t1000\nchr2\t500\n";
        let sizes = parse_chrom_sizes(text.as_bytes()).unwrap();
        assert_eq!(
            sizes,
            vec![("chr1".to_string(), 1000), ("chr2".to_string(), 500)]
        );
    }

    #[test]
    fn test_parse_fai_columns() {
        let text = "chrM\t16569\t6\t60\t61\nchr1\t248956422\t16857\t60\t61\n";
        let sizes = parse_chrom_sizes(text.as_bytes()).unwrap();
        assert_eq!(sizes[1], ("chr1".to_string(), 248_956_422));
    }

    #[test]
    fn test_parse_chrom_sizes_errors() {
        assert!(parse_chrom_sizes("".as_bytes()).is_err());
        assert!(parse_chrom_sizes("chr1\n".as_bytes()).is_err());
        assert!(matches!(
            parse_chrom_sizes("chr1\tlong\n".as_bytes()),
            Err(ParseError::InvalidFormat(_))
        ));
    }
}
