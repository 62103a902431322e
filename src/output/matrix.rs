use std::io::{self, Write};

use crate::core::genome::Genome;
use crate::index::Bin;
use crate::pipeline::ContactMatrix;

/// Sparse matrix file layout
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum MatrixFormat {
    /// `nrows ncols nnz` header, then `row col count` with 0-based indices
    #[default]
    Graal,
    /// `chrom1 start1 end1 chrom2 start2 end2 count`
    Bg2,
}

impl MatrixFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Graal => "tsv",
            Self::Bg2 => "bg2",
        }
    }
}

/// Append-only consumer of sorted `(row, col, count)` triples
pub trait MatrixSink {
    /// Called once before any entry
    ///
    /// # Errors
    ///
    /// Returns an error if the header cannot be written.
    fn begin(&mut self, size: u64, nnz: usize) -> io::Result<()>;

    /// # Errors
    ///
    /// Returns an error if the entry cannot be written.
    fn entry(&mut self, row: u64, col: u64, count: u64) -> io::Result<()>;

    /// # Errors
    ///
    /// Returns an error if buffered output cannot be flushed.
    fn finish(&mut self) -> io::Result<()>;
}

pub struct GraalWriter<W: Write> {
    out: W,
}

impl<W: Write> GraalWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> MatrixSink for GraalWriter<W> {
    fn begin(&mut self, size: u64, nnz: usize) -> io::Result<()> {
        writeln!(self.out, "{size}\t{size}\t{nnz}")
    }

    fn entry(&mut self, row: u64, col: u64, count: u64) -> io::Result<()> {
        writeln!(self.out, "{row}\t{col}\t{count}")
    }

    fn finish(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// Writes entries with the genomic coordinates of their bins
pub struct Bedgraph2Writer<'a, W: Write> {
    out: W,
    genome: &'a Genome,
    bins: &'a [Bin],
}

impl<'a, W: Write> Bedgraph2Writer<'a, W> {
    pub fn new(out: W, genome: &'a Genome, bins: &'a [Bin]) -> Self {
        Self { out, genome, bins }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn locus(&self, index: u64) -> io::Result<(&'a str, u64, u64)> {
        let genome = self.genome;
        let bin = usize::try_from(index)
            .ok()
            .and_then(|i| self.bins.get(i))
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("bin {index} is out of range")))?;
        let chrom = genome
            .get(bin.chrom)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("bin {index} has no chromosome")))?;
        Ok((chrom.name.as_str(), bin.start, bin.end))
    }
}

impl<W: Write> MatrixSink for Bedgraph2Writer<'_, W> {
    fn begin(&mut self, _size: u64, _nnz: usize) -> io::Result<()> {
        Ok(())
    }

    fn entry(&mut self, row: u64, col: u64, count: u64) -> io::Result<()> {
        let (c1, s1, e1) = self.locus(row)?;
        let (c2, s2, e2) = self.locus(col)?;
        writeln!(self.out, "{c1}\t{s1}\t{e1}\t{c2}\t{s2}\t{e2}\t{count}")
    }

    fn finish(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// Stream a matrix into a sink in row-then-column order
///
/// # Errors
///
/// Returns the first error reported by the sink.
pub fn write_matrix(matrix: &ContactMatrix, sink: &mut dyn MatrixSink) -> io::Result<()> {
    let entries = matrix.sorted_entries();
    sink.begin(matrix.size(), entries.len())?;
    for (row, col, count) in entries {
        sink.entry(row, col, count)?;
    }
    sink.finish()
}
