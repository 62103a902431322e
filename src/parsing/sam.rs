//! Read pairs from name-sorted SAM/BAM alignments using noodles.
//!
//! Two layouts are supported:
//!
//! - **Paired**: one file in which both mates of a read are adjacent
//! - **Split**: two single-end files, one per mate, in the same read order
//!
//! Secondary alignments are ignored. Supplementary alignments do not form
//! pairs on their own; they set the `supplementary` flag on the primary end of
//! the same mate. The position of each end is its 5' coordinate: the alignment
//! start on the forward strand and the alignment end on the reverse strand.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use noodles::sam;
use noodles::sam::alignment::record::cigar::op::Kind;
use noodles::sam::alignment::RecordBuf;

use crate::core::record::{AlignedEnd, ReadPair, RecordError};
use crate::core::types::Strand;
use crate::parsing::{is_stdin, ParseError};
use crate::utils::validation::check_contig_limit;

/// Anything that yields alignment records against a header
trait RecordSource: Send {
    fn read(&mut self, header: &sam::Header, record: &mut RecordBuf) -> io::Result<usize>;
}

impl<R: BufRead + Send> RecordSource for sam::io::Reader<R> {
    fn read(&mut self, header: &sam::Header, record: &mut RecordBuf) -> io::Result<usize> {
        self.read_record_buf(header, record)
    }
}

impl<R: Read + Send> RecordSource for noodles::bam::io::Reader<R> {
    fn read(&mut self, header: &sam::Header, record: &mut RecordBuf) -> io::Result<usize> {
        self.read_record_buf(header, record)
    }
}

/// One alignment file with a single record of lookahead
struct AlignmentFile {
    source: Box<dyn RecordSource>,
    header: sam::Header,
    pending: Option<RecordBuf>,
    records: u64,
}

impl AlignmentFile {
    /// Open a SAM or BAM file, chosen by extension. `-` reads SAM from stdin.
    fn open(path: &Path) -> Result<Self, ParseError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        let (source, header): (Box<dyn RecordSource>, sam::Header) = if is_stdin(path) {
            let mut reader = sam::io::Reader::new(BufReader::new(io::stdin()));
            let header = reader
                .read_header()
                .map_err(|e| ParseError::Noodles(e.to_string()))?;
            (Box::new(reader), header)
        } else {
            match extension.as_deref() {
                Some("bam") => {
                    let mut reader = File::open(path).map(noodles::bam::io::Reader::new)?;
                    let header = reader
                        .read_header()
                        .map_err(|e| ParseError::Noodles(e.to_string()))?;
                    (Box::new(reader), header)
                }
                Some("sam") | None => {
                    let mut reader = File::open(path)
                        .map(BufReader::new)
                        .map(sam::io::Reader::new)?;
                    let header = reader
                        .read_header()
                        .map_err(|e| ParseError::Noodles(e.to_string()))?;
                    (Box::new(reader), header)
                }
                Some(ext) => return Err(ParseError::UnsupportedFormat(ext.to_string())),
            }
        };

        Ok(Self {
            source,
            header,
            pending: None,
            records: 0,
        })
    }

    fn from_sam_reader<R: BufRead + Send + 'static>(mut reader: sam::io::Reader<R>) -> Result<Self, ParseError> {
        let header = reader
            .read_header()
            .map_err(|e| ParseError::Noodles(e.to_string()))?;
        Ok(Self {
            source: Box::new(reader),
            header,
            pending: None,
            records: 0,
        })
    }

    fn next_record(&mut self) -> Result<Option<RecordBuf>, ParseError> {
        if let Some(record) = self.pending.take() {
            return Ok(Some(record));
        }
        loop {
            let mut record = RecordBuf::default();
            let n = self
                .source
                .read(&self.header, &mut record)
                .map_err(|e| ParseError::Noodles(e.to_string()))?;
            if n == 0 {
                return Ok(None);
            }
            self.records += 1;
            if !record.flags().is_secondary() {
                return Ok(Some(record));
            }
        }
    }

    /// All consecutive non-secondary records sharing the next read name
    fn next_group(&mut self) -> Result<Option<(String, Vec<RecordBuf>)>, ParseError> {
        let Some(first) = self.next_record()? else {
            return Ok(None);
        };
        let name = record_name(&first);
        let mut group = vec![first];
        while let Some(record) = self.next_record()? {
            if record_name(&record) == name {
                group.push(record);
            } else {
                self.pending = Some(record);
                break;
            }
        }
        Ok(Some((name, group)))
    }
}

fn record_name(record: &RecordBuf) -> String {
    record
        .name()
        .map(|n| String::from_utf8_lossy(n).to_string())
        .unwrap_or_default()
}

/// Build one end from the primary record of a mate and its supplementary records
fn aligned_end(records: &[&RecordBuf]) -> Option<AlignedEnd> {
    let primary = records
        .iter()
        .find(|r| !r.flags().is_supplementary())?;
    let supplementary = records.iter().any(|r| r.flags().is_supplementary());

    let flags = primary.flags();
    let (Some(chrom), Some(start)) = (primary.reference_sequence_id(), primary.alignment_start())
    else {
        return Some(AlignedEnd::unmapped());
    };
    if flags.is_unmapped() {
        return Some(AlignedEnd::unmapped());
    }

    let start = start.get() as u64 - 1;
    let (strand, position) = if flags.is_reverse_complemented() {
        let span: u64 = primary
            .cigar()
            .as_ref()
            .iter()
            .filter(|op| {
                matches!(
                    op.kind(),
                    Kind::Match
                        | Kind::Deletion
                        | Kind::Skip
                        | Kind::SequenceMatch
                        | Kind::SequenceMismatch
                )
            })
            .map(|op| op.len() as u64)
            .sum();
        (Strand::Reverse, start + span.saturating_sub(1))
    } else {
        (Strand::Forward, start)
    };

    let mut end = AlignedEnd::mapped(chrom, position, strand);
    end.mapq = primary.mapping_quality().map(|q| q.get());
    end.supplementary = supplementary;
    Some(end)
}

/// Streams read pairs out of name-sorted alignments.
///
/// Chromosome ordinals of the produced ends are the reference sequence
/// indices of the alignment header, see [`AlignmentPairs::chromosomes`].
pub struct AlignmentPairs {
    first: AlignmentFile,
    second: Option<AlignmentFile>,
    groups: u64,
}

impl AlignmentPairs {
    /// One name-sorted file holding both mates
    ///
    /// # Errors
    ///
    /// Returns a `ParseError` if the file cannot be opened or its header read.
    pub fn paired(path: &Path) -> Result<Self, ParseError> {
        Ok(Self {
            first: AlignmentFile::open(path)?,
            second: None,
            groups: 0,
        })
    }

    /// Two single-end files, one per mate, sorted by the same read names
    ///
    /// # Errors
    ///
    /// Returns a `ParseError` if a file cannot be opened, or
    /// `ParseError::InvalidFormat` if the two headers list different references.
    pub fn split(forward: &Path, reverse: &Path) -> Result<Self, ParseError> {
        let first = AlignmentFile::open(forward)?;
        let second = AlignmentFile::open(reverse)?;
        Self::from_files(first, Some(second))
    }

    /// Paired layout over an in-memory or already-open SAM stream
    ///
    /// # Errors
    ///
    /// Returns a `ParseError` if the header cannot be read.
    pub fn from_sam<R: BufRead + Send + 'static>(reader: R) -> Result<Self, ParseError> {
        Self::from_files(AlignmentFile::from_sam_reader(sam::io::Reader::new(reader))?, None)
    }

    /// Split layout over two SAM streams
    ///
    /// # Errors
    ///
    /// See [`AlignmentPairs::split`].
    pub fn from_sam_split<R1, R2>(forward: R1, reverse: R2) -> Result<Self, ParseError>
    where
        R1: BufRead + Send + 'static,
        R2: BufRead + Send + 'static,
    {
        let first = AlignmentFile::from_sam_reader(sam::io::Reader::new(forward))?;
        let second = AlignmentFile::from_sam_reader(sam::io::Reader::new(reverse))?;
        Self::from_files(first, Some(second))
    }

    fn from_files(first: AlignmentFile, second: Option<AlignmentFile>) -> Result<Self, ParseError> {
        let pairs = Self {
            first,
            second,
            groups: 0,
        };
        if let Some(second) = &pairs.second {
            if chromosomes_of(&second.header)? != pairs.chromosomes()? {
                return Err(ParseError::InvalidFormat(
                    "the two alignment files have different reference sequences".to_string(),
                ));
            }
        }
        Ok(pairs)
    }

    /// `(name, length)` of every reference sequence in the header, in order
    ///
    /// # Errors
    ///
    /// Returns `ParseError::TooManyContigs` if the limit is exceeded.
    pub fn chromosomes(&self) -> Result<Vec<(String, u64)>, ParseError> {
        chromosomes_of(&self.first.header)
    }

    /// Alignment records read so far, secondary ones included
    pub fn records_read(&self) -> u64 {
        self.first.records + self.second.as_ref().map_or(0, |s| s.records)
    }

    fn next_pair(&mut self) -> Result<Option<ReadPair>, ParseError> {
        let Some((name, group)) = self.first.next_group()? else {
            if let Some(second) = self.second.as_mut() {
                if let Some((name, _)) = second.next_group()? {
                    return Err(ParseError::MateMismatch {
                        first: String::new(),
                        second: name,
                    });
                }
            }
            return Ok(None);
        };
        self.groups += 1;

        let other = match self.second.as_mut() {
            Some(second) => {
                let Some((other_name, other_group)) = second.next_group()? else {
                    return Err(ParseError::MateMismatch {
                        first: name,
                        second: String::new(),
                    });
                };
                if other_name != name {
                    return Err(ParseError::MateMismatch {
                        first: name,
                        second: other_name,
                    });
                }
                Some(other_group)
            }
            None => None,
        };

        let (mate1, mate2): (Vec<&RecordBuf>, Vec<&RecordBuf>) = match &other {
            Some(other) => (group.iter().collect(), other.iter().collect()),
            None => group.iter().partition(|r| !r.flags().is_last_segment()),
        };

        match (aligned_end(&mate1), aligned_end(&mate2)) {
            (Some(end1), Some(end2)) => Ok(Some(ReadPair::new(name, end1, end2))),
            _ => Err(RecordError::Malformed {
                line: self.groups,
                message: format!("read '{name}' is missing a mate"),
            }
            .into()),
        }
    }
}

impl Iterator for AlignmentPairs {
    type Item = Result<ReadPair, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_pair().transpose()
    }
}

fn chromosomes_of(header: &sam::Header) -> Result<Vec<(String, u64)>, ParseError> {
    let mut chromosomes = Vec::new();
    for (name, map) in header.reference_sequences() {
        if check_contig_limit(chromosomes.len()).is_some() {
            return Err(ParseError::TooManyContigs(chromosomes.len()));
        }
        chromosomes.push((name.to_string(), map.length().get() as u64));
    }
    Ok(chromosomes)
}
