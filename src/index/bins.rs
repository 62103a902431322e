use std::sync::Arc;

use crate::core::genome::Genome;
use crate::index::IndexError;

/// A matrix row: half-open `[start, end)` on one chromosome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bin {
    pub chrom: usize,
    pub start: u64,
    pub end: u64,
    /// Global bin index across the genome
    pub index: u64,
}

impl Bin {
    pub fn size(&self) -> u64 {
        self.end - self.start
    }
}

/// Fixed-width bins; the last bin of each chromosome may be shorter
#[derive(Debug, Clone)]
pub struct BinIndex {
    genome: Arc<Genome>,
    width: u64,
    /// Global index of the first bin of each chromosome
    offsets: Vec<u64>,
    total: u64,
}

impl BinIndex {
    /// # Errors
    ///
    /// Returns `IndexError::InvalidBinWidth` if `width` is zero.
    pub fn new(genome: Arc<Genome>, width: u64) -> Result<Self, IndexError> {
        if width == 0 {
            return Err(IndexError::InvalidBinWidth(width));
        }

        let mut offsets = Vec::with_capacity(genome.len());
        let mut total = 0;
        for chrom in genome.chromosomes() {
            offsets.push(total);
            total += chrom.length.div_ceil(width);
        }

        Ok(Self {
            genome,
            width,
            offsets,
            total,
        })
    }

    pub fn width(&self) -> u64 {
        self.width
    }

    pub fn len(&self) -> u64 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Global bin index covering `position` on chromosome `chrom`
    ///
    /// # Errors
    ///
    /// Returns `IndexError::UnknownChromosome` or `IndexError::OutOfRange`.
    pub fn locate(&self, chrom: &str, position: u64) -> Result<u64, IndexError> {
        let ordinal = self
            .genome
            .ordinal(chrom)
            .ok_or_else(|| IndexError::UnknownChromosome(chrom.to_string()))?;
        self.locate_ordinal(ordinal, position)
    }

    /// Same as [`BinIndex::locate`] with the chromosome given by ordinal
    ///
    /// # Errors
    ///
    /// Returns `IndexError::UnknownChromosome` or `IndexError::OutOfRange`.
    pub fn locate_ordinal(&self, ordinal: usize, position: u64) -> Result<u64, IndexError> {
        let chrom = self
            .genome
            .get(ordinal)
            .ok_or_else(|| IndexError::UnknownChromosome(format!("#{ordinal}")))?;
        if position >= chrom.length {
            return Err(IndexError::OutOfRange {
                chrom: chrom.name.clone(),
                position,
                length: chrom.length,
            });
        }
        Ok(self.offsets[ordinal] + position / self.width)
    }

    /// All bins in global index order
    pub fn bins(&self) -> impl Iterator<Item = Bin> + '_ {
        let width = self.width;
        self.genome
            .chromosomes()
            .iter()
            .zip(&self.offsets)
            .flat_map(move |(chrom, &offset)| {
                let length = chrom.length;
                let ordinal = chrom.ordinal;
                (0..length.div_ceil(width)).map(move |i| Bin {
                    chrom: ordinal,
                    start: i * width,
                    end: ((i + 1) * width).min(length),
                    index: offset + i,
                })
            })
    }
}
