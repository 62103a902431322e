//! Reader for 4DN `.pairs` files.
//!
//! Header lines start with `#`. The reader uses two of them:
//!
//! | Line | Use |
//! |------|-----|
//! | `#chromsize: <name> <length>` | chromosome table, in genome order |
//! | `#columns: readID chr1 pos1 ...` | column layout of the data lines |
//!
//! Without a `#columns` line the standard layout
//! `readID chr1 pos1 chr2 pos2 strand1 strand2` is assumed. `mapq1`/`mapq2`
//! columns are used when present. Positions are 1-based in the file and
//! 0-based once parsed; a chromosome of `!` marks an unmapped end.

use std::io::BufRead;
use std::sync::Arc;

use crate::core::genome::Genome;
use crate::core::record::{AlignedEnd, ReadPair, RecordError};
use crate::core::types::Strand;
use crate::parsing::{parse_u64, ParseError};

/// Chromosome name used for unmapped ends
pub const UNMAPPED_CHROM: &str = "!";

/// Standard column layout
pub const DEFAULT_COLUMNS: [&str; 7] = ["readID", "chr1", "pos1", "chr2", "pos2", "strand1", "strand2"];

/// Parsed header of a `.pairs` file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairsHeader {
    /// Every header line, verbatim and in order
    pub lines: Vec<String>,
    pub chromsizes: Vec<(String, u64)>,
    pub columns: Vec<String>,
    pub sorted: Option<String>,
}

impl PairsHeader {
    /// Number of lines the header occupied in the file
    pub fn line_count(&self) -> u64 {
        self.lines.len() as u64
    }

    /// Genome built from the `#chromsize` lines
    ///
    /// # Errors
    ///
    /// Returns `ParseError::InvalidFormat` if the header has no `#chromsize`
    /// lines, or `ParseError::Genome` if they do not form a valid genome.
    pub fn genome(&self, circular: bool) -> Result<Genome, ParseError> {
        if self.chromsizes.is_empty() {
            return Err(ParseError::InvalidFormat(
                "pairs header has no #chromsize lines".to_string(),
            ));
        }
        Ok(Genome::new(self.chromsizes.clone(), circular)?)
    }

    /// Check that chromosomes listed in the header agree with `genome`
    ///
    /// # Errors
    ///
    /// Returns `ParseError::UnknownChromosome` for a chromosome missing from the
    /// genome, or `ParseError::InvalidFormat` if a length differs.
    pub fn check_genome(&self, genome: &Genome) -> Result<(), ParseError> {
        for (name, length) in &self.chromsizes {
            let chrom = genome
                .by_name(name)
                .ok_or_else(|| ParseError::UnknownChromosome(name.clone()))?;
            if chrom.length != *length {
                return Err(ParseError::InvalidFormat(format!(
                    "'{name}' is {length} bp in the pairs header but {} bp in the reference",
                    chrom.length
                )));
            }
        }
        Ok(())
    }
}

/// Read header lines up to the first data line, which is left unread
///
/// # Errors
///
/// Returns `ParseError::Io` on read failure or `ParseError::InvalidFormat` for
/// an unparsable `#chromsize` line.
pub fn read_header<R: BufRead>(reader: &mut R) -> Result<PairsHeader, ParseError> {
    let mut header = PairsHeader::default();

    loop {
        let next = reader.fill_buf()?;
        if next.first() != Some(&b'#') {
            break;
        }
        let mut line = String::new();
        reader.read_line(&mut line)?;
        let line = line.trim_end_matches(['\n', '\r']).to_string();

        if let Some(rest) = line.strip_prefix("#chromsize:") {
            let fields: Vec<&str> = rest.split_whitespace().collect();
            let length = fields.get(1).and_then(|l| l.parse::<u64>().ok());
            match (fields.first(), length) {
                (Some(name), Some(length)) => header.chromsizes.push(((*name).to_string(), length)),
                _ => {
                    return Err(ParseError::InvalidFormat(format!(
                        "invalid chromsize line '{line}'"
                    )))
                }
            }
        } else if let Some(rest) = line.strip_prefix("#columns:") {
            header.columns = rest.split_whitespace().map(String::from).collect();
        } else if let Some(rest) = line.strip_prefix("#sorted:") {
            header.sorted = Some(rest.trim().to_string());
        }
        header.lines.push(line);
    }

    Ok(header)
}

/// Positions of the used columns in a data line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ColumnMap {
    read_id: usize,
    chr1: usize,
    pos1: usize,
    chr2: usize,
    pos2: usize,
    strand1: usize,
    strand2: usize,
    mapq1: Option<usize>,
    mapq2: Option<usize>,
    /// Minimum number of fields in a data line
    width: usize,
}

impl ColumnMap {
    fn new(columns: &[String]) -> Result<Self, ParseError> {
        if columns.is_empty() {
            let defaults: Vec<String> = DEFAULT_COLUMNS.iter().map(|c| (*c).to_string()).collect();
            return Self::new(&defaults);
        }

        let find = |name: &str| columns.iter().position(|c| c == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| {
                ParseError::InvalidFormat(format!("#columns line has no '{name}' column"))
            })
        };

        let mut map = Self {
            read_id: require("readID")?,
            chr1: require("chr1")?,
            pos1: require("pos1")?,
            chr2: require("chr2")?,
            pos2: require("pos2")?,
            strand1: require("strand1")?,
            strand2: require("strand2")?,
            mapq1: find("mapq1"),
            mapq2: find("mapq2"),
            width: 0,
        };
        map.width = [
            Some(map.read_id),
            Some(map.chr1),
            Some(map.pos1),
            Some(map.chr2),
            Some(map.pos2),
            Some(map.strand1),
            Some(map.strand2),
            map.mapq1,
            map.mapq2,
        ]
        .into_iter()
        .flatten()
        .max()
        .map_or(0, |m| m + 1);
        Ok(map)
    }
}

/// Streams read pairs out of a `.pairs` body, resolving chromosome names
/// against a genome
pub struct PairsReader<R> {
    inner: R,
    genome: Arc<Genome>,
    columns: ColumnMap,
    line: u64,
    buf: String,
}

impl<R: BufRead> PairsReader<R> {
    /// `inner` must be positioned just after `header`
    ///
    /// # Errors
    ///
    /// Returns `ParseError::InvalidFormat` if the `#columns` line lacks a
    /// required column.
    pub fn new(inner: R, header: &PairsHeader, genome: Arc<Genome>) -> Result<Self, ParseError> {
        Ok(Self {
            inner,
            genome,
            columns: ColumnMap::new(&header.columns)?,
            line: header.line_count(),
            buf: String::new(),
        })
    }

    pub fn genome(&self) -> &Arc<Genome> {
        &self.genome
    }

    /// Line number of the last line read, 1-based
    pub fn line_number(&self) -> u64 {
        self.line
    }

    /// Next non-blank data line, without its line terminator
    pub fn next_line(&mut self) -> Option<Result<String, ParseError>> {
        loop {
            self.buf.clear();
            match self.inner.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {
                    self.line += 1;
                    let line = self.buf.trim_end_matches(['\n', '\r']);
                    if !line.trim().is_empty() {
                        return Some(Ok(line.to_string()));
                    }
                }
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    /// Parse one data line.
    ///
    /// # Errors
    ///
    /// Returns `ParseError::UnknownChromosome` for a chromosome missing from
    /// the genome, and `ParseError::Record` for any other problem confined to
    /// the line.
    pub fn parse_line(&self, line: &str, line_no: u64) -> Result<ReadPair, ParseError> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let c = &self.columns;
        if fields.len() < c.width {
            return Err(RecordError::Malformed {
                line: line_no,
                message: format!("expected {} columns, found {}", c.width, fields.len()),
            }
            .into());
        }

        let end1 = self.parse_end(
            fields[c.chr1],
            fields[c.pos1],
            fields[c.strand1],
            c.mapq1.map(|i| fields[i]),
            line_no,
        )?;
        let end2 = self.parse_end(
            fields[c.chr2],
            fields[c.pos2],
            fields[c.strand2],
            c.mapq2.map(|i| fields[i]),
            line_no,
        )?;
        Ok(ReadPair::new(fields[c.read_id], end1, end2))
    }

    fn parse_end(
        &self,
        chrom: &str,
        position: &str,
        strand: &str,
        mapq: Option<&str>,
        line: u64,
    ) -> Result<AlignedEnd, ParseError> {
        if chrom == UNMAPPED_CHROM {
            return Ok(AlignedEnd::unmapped());
        }
        let chromosome = self
            .genome
            .by_name(chrom)
            .ok_or_else(|| ParseError::UnknownChromosome(chrom.to_string()))?;

        let position = parse_u64(position, "position", line)?;
        if position == 0 {
            return Err(RecordError::Malformed {
                line,
                message: "position 0 on a mapped end, positions are 1-based".to_string(),
            }
            .into());
        }
        if position > chromosome.length {
            return Err(RecordError::OutOfRange {
                chrom: chromosome.name.clone(),
                position,
                length: chromosome.length,
            }
            .into());
        }
        let strand: Strand = strand
            .parse()
            .map_err(|message| RecordError::Malformed { line, message })?;

        let mut end = AlignedEnd::mapped(chromosome.ordinal, position - 1, strand);
        if let Some(mapq) = mapq {
            let mapq = mapq.parse::<u8>().map_err(|_| RecordError::Malformed {
                line,
                message: format!("invalid mapping quality '{mapq}'"),
            })?;
            end = end.with_mapq(mapq);
        }
        Ok(end)
    }
}

impl<R: BufRead> Iterator for PairsReader<R> {
    type Item = Result<ReadPair, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = match self.next_line()? {
            Ok(line) => line,
            Err(e) => return Some(Err(e)),
        };
        Some(self.parse_line(&line, self.line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;

    const PAIRS: &str = "## pairs format v1.0\n\
        #sorted: chr1-pos1-chr2-pos2\n\
        #chromsize: chr1 1000\n\
        #chromsize: chr2 500\n\
        #columns: readID chr1 pos1 chr2 pos2 strand1 strand2 mapq1 mapq2\n\
        r1\tchr1\t10\tchr1\t500\t+\t-\t60\t42\n\
        \n\
        r2\tchr1\t20\t!\t0\t+\t-\t60\t0\n\
        r3\tchr2\t501\tchr2\t1\t+\t-\t60\t60\n\
        r4\tchrX\t5\tchr2\t1\t+\t-\t60\t60\n\
        r5\tchr1\tten\tchr2\t1\t+\t-\t60\t60\n";

    fn reader() -> PairsReader<BufReader<&'static [u8]>> {
        let mut input = BufReader::new(PAIRS.as_bytes());
        let header = read_header(&mut input).unwrap();
        let genome = Arc::new(header.genome(false).unwrap());
        PairsReader::new(input, &header, genome).unwrap()
    }

    #[test]
    fn test_read_header() {
        let mut input = BufReader::new(PAIRS.as_bytes());
        let header = read_header(&mut input).unwrap();
        assert_eq!(header.lines.len(), 5);
        assert_eq!(header.sorted.as_deref(), Some("chr1-pos1-chr2-pos2"));
        assert_eq!(header.chromsizes[1], ("chr2".to_string(), 500));
        assert_eq!(header.columns.len(), 9);
    }

    #[test]
    fn test_read_pairs() {
        let results: Vec<_> = reader().collect();
        assert_eq!(results.len(), 5);

        let r1 = results[0].as_ref().unwrap();
        assert_eq!(r1.read_id, "r1");
        assert_eq!(r1.end1.position, 9);
        assert_eq!(r1.end2.strand, Strand::Reverse);
        assert_eq!(r1.end2.mapq, Some(42));

        let r2 = results[1].as_ref().unwrap();
        assert!(!r2.end2.is_mapped());

        assert!(matches!(
            results[2],
            Err(ParseError::Record(RecordError::OutOfRange { position: 501, .. }))
        ));
        assert!(matches!(&results[3], Err(ParseError::UnknownChromosome(name)) if name == "chrX"));
        assert!(matches!(
            results[4],
            Err(ParseError::Record(RecordError::Malformed { line: 11, .. }))
        ));
    }

    #[test]
    fn test_default_columns_without_header() {
        let genome = Arc::new(Genome::new(vec![("chr1".to_string(), 100)], false).unwrap());
        let input = BufReader::new("a chr1 1 chr1 100 - +\n".as_bytes());
        let pairs: Vec<_> = PairsReader::new(input, &PairsHeader::default(), genome)
            .unwrap()
            .collect();
        let pair = pairs[0].as_ref().unwrap();
        assert_eq!(pair.end1.position, 0);
        assert_eq!(pair.end2.position, 99);
        assert_eq!(pair.end1.mapq, None);
    }

    #[test]
    fn test_check_genome() {
        let mut input = BufReader::new(PAIRS.as_bytes());
        let header = read_header(&mut input).unwrap();
        let other = Genome::new(vec![("chr1".to_string(), 1000)], false).unwrap();
        assert!(matches!(
            header.check_genome(&other),
            Err(ParseError::UnknownChromosome(_))
        ));
        let resized = Genome::new(
            vec![("chr1".to_string(), 1000), ("chr2".to_string(), 400)],
            false,
        )
        .unwrap();
        assert!(header.check_genome(&resized).is_err());
        assert!(header.check_genome(&header.genome(false).unwrap()).is_ok());
    }
}
