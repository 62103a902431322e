//! Writers for matrices, bin tables, `.pairs` files and run reports.
//!
//! Files are staged through [`StagedFile`]: everything is written to a
//! temporary file next to the destination, and only [`Staging::commit`] moves
//! the files into place. A run that fails before committing leaves no partial
//! output behind.

pub mod matrix;
pub mod pairs;
pub mod report;
pub mod tables;

use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

pub use matrix::{Bedgraph2Writer, GraalWriter, MatrixFormat, MatrixSink};
pub use pairs::PairsWriter;
pub use report::MetricsReport;

/// A file being written under a temporary name
pub struct StagedFile {
    writer: BufWriter<NamedTempFile>,
    destination: PathBuf,
}

impl StagedFile {
    /// # Errors
    ///
    /// Returns an error if the temporary file cannot be created.
    pub fn create(destination: &Path) -> io::Result<Self> {
        let dir = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let file = NamedTempFile::new_in(dir)?;
        Ok(Self {
            writer: BufWriter::new(file),
            destination: destination.to_path_buf(),
        })
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Flush and move the file to its destination
    ///
    /// # Errors
    ///
    /// Returns an error if flushing or renaming fails.
    pub fn commit(self) -> io::Result<PathBuf> {
        let file = self.writer.into_inner().map_err(io::IntoInnerError::into_error)?;
        file.persist(&self.destination).map_err(|e| e.error)?;
        Ok(self.destination)
    }
}

impl Write for StagedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// A set of staged files committed together
#[derive(Default)]
pub struct Staging {
    files: Vec<StagedFile>,
}

impl Staging {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, file: StagedFile) {
        self.files.push(file);
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Move every staged file to its destination
    ///
    /// # Errors
    ///
    /// Returns the first error from flushing or renaming a file.
    pub fn commit(self) -> io::Result<Vec<PathBuf>> {
        self.files.into_iter().map(StagedFile::commit).collect()
    }
}
