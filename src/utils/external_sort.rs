//! Bounded-memory coordinate sort of `.pairs` files.
//!
//! Data lines are read in chunks. Each chunk is sorted in parallel and, when
//! the input does not fit in a single chunk, spilled to a temporary run file
//! as bincode records. The runs are then merged with a binary heap. Lines are
//! carried through verbatim; only the sort key is parsed.
//!
//! Sort order is `(chr1, pos1, chr2, pos2, readID)` with chromosomes in genome
//! order and ends taken upstream first. Lines that cannot be parsed sort last.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use rayon::slice::ParallelSliceMut;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::genome::Genome;
use crate::output::pairs::PAIRS_VERSION_LINE;
use crate::parsing::pairs::{read_header, PairsHeader, PairsReader};
use crate::parsing::ParseError;

/// Value of the `#sorted:` header line of sorted output
pub const COORDINATE_ORDER: &str = "chr1-pos1-chr2-pos2";

pub const DEFAULT_CHUNK_SIZE: usize = 1_000_000;

type SortKey = (usize, u64, usize, u64, String);
type Entry = (SortKey, String);

#[derive(Error, Debug)]
pub enum SortError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Run file error: {0}")]
    Run(#[from] bincode::Error),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Chunk size must be greater than zero")]
    InvalidChunkSize,
}

#[derive(Debug, Clone)]
pub struct SortConfig {
    /// Data lines held in memory at once
    pub chunk_size: usize,
    /// Directory for run files; the system temp directory when `None`
    pub temp_dir: Option<PathBuf>,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            temp_dir: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct SortStats {
    pub records: u64,
    pub malformed: u64,
    pub runs: usize,
}

/// Sort a `.pairs` stream into coordinate order.
///
/// The chromosome order comes from `genome` when given, otherwise from the
/// `#chromsize` header lines.
///
/// # Errors
///
/// Returns `SortError::Parse` if no chromosome order is available or a line
/// names an unknown chromosome, and `SortError::Io` or `SortError::Run` if
/// reading, spilling or writing fails.
pub fn sort_pairs<R: BufRead, W: Write>(
    mut input: R,
    mut out: W,
    genome: Option<Arc<Genome>>,
    config: &SortConfig,
) -> Result<SortStats, SortError> {
    if config.chunk_size == 0 {
        return Err(SortError::InvalidChunkSize);
    }

    let header = read_header(&mut input)?;
    let genome = match genome {
        Some(genome) => {
            header.check_genome(&genome)?;
            genome
        }
        None => Arc::new(header.genome(false)?),
    };
    let mut reader = PairsReader::new(input, &header, Arc::clone(&genome))?;

    let temp_dir = match &config.temp_dir {
        Some(dir) => tempfile::tempdir_in(dir)?,
        None => tempfile::tempdir()?,
    };

    let mut stats = SortStats::default();
    let mut runs: Vec<RunReader> = Vec::new();
    let mut chunk: Vec<Entry> = Vec::with_capacity(config.chunk_size.min(DEFAULT_CHUNK_SIZE));

    while let Some(line) = reader.next_line() {
        let line = line?;
        let key = match reader.parse_line(&line, reader.line_number()) {
            Ok(mut pair) => {
                pair.canonicalize();
                let (c1, p1, c2, p2) = pair.sort_key();
                (c1, p1, c2, p2, pair.read_id)
            }
            Err(err) if err.is_recoverable() => {
                if stats.malformed == 0 {
                    warn!(line = reader.line_number(), "unparsable pairs line sorted last: {err}");
                }
                stats.malformed += 1;
                (usize::MAX, u64::MAX, usize::MAX, u64::MAX, line.clone())
            }
            Err(err) => return Err(err.into()),
        };
        chunk.push((key, line));
        stats.records += 1;

        if chunk.len() >= config.chunk_size {
            let path = temp_dir.path().join(format!("run-{}.bin", runs.len()));
            runs.push(spill(&mut chunk, path)?);
        }
    }

    write_header(&mut out, &header, &genome)?;

    if runs.is_empty() {
        chunk.par_sort();
        for (_, line) in &chunk {
            writeln!(out, "{line}")?;
        }
    } else {
        if !chunk.is_empty() {
            let path = temp_dir.path().join(format!("run-{}.bin", runs.len()));
            runs.push(spill(&mut chunk, path)?);
        }
        info!(runs = runs.len(), records = stats.records, "merging sorted runs");
        merge_runs(&mut runs, &mut out)?;
    }
    stats.runs = runs.len().max(1);
    out.flush()?;

    if stats.malformed > 0 {
        warn!(lines = stats.malformed, "unparsable lines were placed at the end");
    }
    Ok(stats)
}

/// Header lines of the sorted output: the input header with its `#sorted`
/// line replaced, or a minimal header when the input had none
fn write_header<W: Write>(out: &mut W, header: &PairsHeader, genome: &Genome) -> std::io::Result<()> {
    let sorted_line = format!("#sorted: {COORDINATE_ORDER}");
    if header.lines.is_empty() {
        writeln!(out, "{PAIRS_VERSION_LINE}")?;
        writeln!(out, "{sorted_line}")?;
        for chrom in genome.chromosomes() {
            writeln!(out, "#chromsize: {} {}", chrom.name, chrom.length)?;
        }
        return Ok(());
    }

    let has_sorted = header.sorted.is_some();
    for (i, line) in header.lines.iter().enumerate() {
        if line.starts_with("#sorted:") {
            writeln!(out, "{sorted_line}")?;
            continue;
        }
        writeln!(out, "{line}")?;
        if i == 0 && !has_sorted {
            writeln!(out, "{sorted_line}")?;
        }
    }
    Ok(())
}

fn spill(chunk: &mut Vec<Entry>, path: PathBuf) -> Result<RunReader, SortError> {
    chunk.par_sort();
    let mut writer = BufWriter::new(File::create(&path)?);
    for entry in chunk.iter() {
        bincode::serialize_into(&mut writer, entry)?;
    }
    writer.flush()?;
    debug!(path = %path.display(), records = chunk.len(), "spilled sorted run");

    let remaining = chunk.len() as u64;
    chunk.clear();
    Ok(RunReader {
        reader: BufReader::new(File::open(&path)?),
        remaining,
    })
}

/// Sequential reader over one spilled run
struct RunReader {
    reader: BufReader<File>,
    remaining: u64,
}

impl RunReader {
    fn next_entry(&mut self) -> Result<Option<Entry>, SortError> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        Ok(Some(bincode::deserialize_from(&mut self.reader)?))
    }
}

fn merge_runs<W: Write>(runs: &mut [RunReader], out: &mut W) -> Result<(), SortError> {
    let mut heap = BinaryHeap::with_capacity(runs.len());
    for (i, run) in runs.iter_mut().enumerate() {
        if let Some((key, line)) = run.next_entry()? {
            heap.push(Reverse((key, i, line)));
        }
    }

    while let Some(Reverse((_, i, line))) = heap.pop() {
        writeln!(out, "{line}")?;
        if let Some((key, line)) = runs[i].next_entry()? {
            heap.push(Reverse((key, i, line)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const INPUT: &str = "## pairs format v1.0\n\
        #sorted: readID\n\
        #chromsize: chr1 1000\n\
        #chromsize: chr2 500\n\
        #columns: readID chr1 pos1 chr2 pos2 strand1 strand2\n\
        r1\tchr2\t10\tchr2\t20\t+\t-\n\
        r2\tchr1\t500\tchr2\t5\t+\t+\n\
        r3\tchr1\t100\tchr1\t900\t-\t+\n\
        r4\tchr2\t5\tchr1\t50\t+\t-\n\
        r5\tchr1\tx\tchr1\t1\t+\t+\n\
        r0\tchr1\t100\tchr1\t900\t+\t+\n";

    fn sort(chunk_size: usize) -> (String, SortStats) {
        let config = SortConfig {
            chunk_size,
            temp_dir: None,
        };
        let mut out = Vec::new();
        let stats = sort_pairs(INPUT.as_bytes(), &mut out, None, &config).unwrap();
        (String::from_utf8(out).unwrap(), stats)
    }

    fn read_ids(text: &str) -> Vec<&str> {
        text.lines()
            .filter(|l| !l.starts_with('#'))
            .filter_map(|l| l.split('\t').next())
            .collect()
    }

    #[test]
    fn test_sort_in_memory() {
        let (text, stats) = sort(100);
        assert_eq!(read_ids(&text), vec!["r4", "r0", "r3", "r2", "r1", "r5"]);
        assert_eq!(stats, SortStats { records: 6, malformed: 1, runs: 1 });

        let header: Vec<&str> = text.lines().take(5).collect();
        assert_eq!(header[1], "#sorted: chr1-pos1-chr2-pos2");
        assert_eq!(header[2], "#chromsize: chr1 1000");
    }

    #[test]
    fn test_spilled_runs_match_in_memory() {
        let (in_memory, _) = sort(100);
        for chunk_size in [1, 2, 4] {
            let (spilled, stats) = sort(chunk_size);
            assert_eq!(spilled, in_memory, "chunk size {chunk_size}");
            assert_eq!(stats.runs, 6_usize.div_ceil(chunk_size));
        }
    }

    #[test]
    fn test_lines_kept_verbatim() {
        let (text, _) = sort(100);
        assert!(text.contains("r4\tchr2\t5\tchr1\t50\t+\t-\n"));
    }

    #[test]
    fn test_unknown_chromosome_is_fatal() {
        let input = "#chromsize: chr1 1000\nr1\tchrX\t1\tchr1\t1\t+\t+\n";
        let err = sort_pairs(input.as_bytes(), Vec::new(), None, &SortConfig::default()).unwrap_err();
        assert!(matches!(err, SortError::Parse(ParseError::UnknownChromosome(_))));
    }

    #[test]
    fn test_headerless_input_with_genome() {
        let genome = Arc::new(Genome::new(vec![("chr1".to_string(), 100)], false).unwrap());
        let input = "b\tchr1\t9\tchr1\t10\t+\t+\na\tchr1\t9\tchr1\t10\t+\t+\n";
        let mut out = Vec::new();
        sort_pairs(input.as_bytes(), &mut out, Some(genome), &SortConfig::default()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("## pairs format v1.0\n#sorted: chr1-pos1-chr2-pos2\n#chromsize: chr1 100\n"));
        assert_eq!(read_ids(&text), vec!["a", "b"]);
    }

    #[test]
    fn test_missing_chromosome_order() {
        let input = "r1\tchr1\t1\tchr1\t1\t+\t+\n";
        let err = sort_pairs(input.as_bytes(), Vec::new(), None, &SortConfig::default()).unwrap_err();
        assert!(matches!(err, SortError::Parse(ParseError::InvalidFormat(_))));
    }

    #[test]
    fn test_zero_chunk_size() {
        let config = SortConfig {
            chunk_size: 0,
            temp_dir: None,
        };
        assert!(matches!(
            sort_pairs(INPUT.as_bytes(), Vec::new(), None, &config),
            Err(SortError::InvalidChunkSize)
        ));
    }
}
