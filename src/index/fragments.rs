use std::sync::Arc;

use crate::core::genome::Genome;
use crate::index::IndexError;

/// A restriction fragment: half-open `[start, end)` on one chromosome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment {
    pub chrom: usize,
    pub start: u64,
    pub end: u64,
    /// Global fragment index across the genome
    pub index: u64,
}

impl Fragment {
    pub fn size(&self) -> u64 {
        self.end - self.start
    }
}

#[derive(Debug, Clone)]
struct ChromFragments {
    /// Fragment start positions; `starts[0] == 0`, strictly increasing
    starts: Vec<u64>,
    length: u64,
    /// Global index of the first fragment
    offset: u64,
    /// First and last fragments are two halves of one fragment split by the
    /// origin of a circular chromosome
    split_at_origin: bool,
}

impl ChromFragments {
    fn new(starts: Vec<u64>, length: u64, offset: u64, split_at_origin: bool) -> Self {
        let split_at_origin = split_at_origin && starts.len() > 1;
        Self {
            starts,
            length,
            offset,
            split_at_origin,
        }
    }

    fn count(&self) -> u64 {
        self.starts.len() as u64
    }

    fn end_of(&self, local: usize) -> u64 {
        self.starts.get(local + 1).copied().unwrap_or(self.length)
    }
}

/// Ordered restriction fragments for every chromosome of a genome
#[derive(Debug, Clone)]
pub struct FragmentIndex {
    genome: Arc<Genome>,
    chroms: Vec<ChromFragments>,
    total: u64,
}

impl FragmentIndex {
    /// Build from restriction cut positions, one list per chromosome in genome order.
    ///
    /// Sites need not be sorted; duplicates and sites at 0 or at/after the end
    /// of the chromosome are ignored.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::InvalidFragments` if the number of site lists does
    /// not match the number of chromosomes.
    pub fn from_sites(genome: Arc<Genome>, sites: &[Vec<u64>]) -> Result<Self, IndexError> {
        if sites.len() != genome.len() {
            return Err(IndexError::InvalidFragments(format!(
                "{} site lists for {} chromosomes",
                sites.len(),
                genome.len()
            )));
        }

        let mut chroms = Vec::with_capacity(genome.len());
        let mut offset = 0;
        for (chrom, chrom_sites) in genome.chromosomes().iter().zip(sites) {
            let mut starts = Vec::with_capacity(chrom_sites.len() + 1);
            starts.push(0);
            let mut sorted: Vec<u64> = chrom_sites
                .iter()
                .copied()
                .filter(|&s| s > 0 && s < chrom.length)
                .collect();
            sorted.sort_unstable();
            sorted.dedup();
            let has_cut = !sorted.is_empty();
            starts.extend(sorted);

            let entry = ChromFragments::new(starts, chrom.length, offset, chrom.circular && has_cut);
            offset += entry.count();
            chroms.push(entry);
        }

        Ok(Self {
            genome,
            chroms,
            total: offset,
        })
    }

    /// Fixed-size chunks in place of restriction fragments
    ///
    /// # Errors
    ///
    /// Returns `IndexError::InvalidBinWidth` if `size` is zero.
    pub fn fixed_size(genome: Arc<Genome>, size: u64) -> Result<Self, IndexError> {
        if size == 0 {
            return Err(IndexError::InvalidBinWidth(size));
        }

        let mut chroms = Vec::with_capacity(genome.len());
        let mut offset = 0;
        for chrom in genome.chromosomes() {
            let starts: Vec<u64> = (0..chrom.length).step_by(size as usize).collect();
            let entry = ChromFragments::new(starts, chrom.length, offset, false);
            offset += entry.count();
            chroms.push(entry);
        }

        Ok(Self {
            genome,
            chroms,
            total: offset,
        })
    }

    /// Build from explicit fragment intervals `(chrom name, start, end)`.
    ///
    /// Fragments of each chromosome must tile it exactly: the first starts at
    /// 0, each starts where the previous ended, and the last ends at the
    /// chromosome length. Every chromosome of the genome must be covered.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::UnknownChromosome` for fragments on chromosomes
    /// missing from the genome, or `IndexError::InvalidFragments` if the
    /// fragments do not tile the genome.
    pub fn from_fragments(
        genome: Arc<Genome>,
        fragments: &[(String, u64, u64)],
    ) -> Result<Self, IndexError> {
        let mut starts: Vec<Vec<u64>> = vec![Vec::new(); genome.len()];
        let mut ends: Vec<u64> = vec![0; genome.len()];

        for (name, start, end) in fragments {
            let ordinal = genome
                .ordinal(name)
                .ok_or_else(|| IndexError::UnknownChromosome(name.clone()))?;
            if end <= start {
                return Err(IndexError::InvalidFragments(format!(
                    "empty fragment {name}:{start}-{end}"
                )));
            }
            if *start != ends[ordinal] {
                return Err(IndexError::InvalidFragments(format!(
                    "fragment {name}:{start}-{end} does not start where the previous one ended ({})",
                    ends[ordinal]
                )));
            }
            starts[ordinal].push(*start);
            ends[ordinal] = *end;
        }

        let mut chroms = Vec::with_capacity(genome.len());
        let mut offset = 0;
        for (chrom, (chrom_starts, end)) in genome.chromosomes().iter().zip(starts.into_iter().zip(ends)) {
            if end != chrom.length {
                return Err(IndexError::InvalidFragments(format!(
                    "fragments of '{}' cover {end} bp of {} bp",
                    chrom.name, chrom.length
                )));
            }
            let entry = ChromFragments::new(chrom_starts, chrom.length, offset, chrom.circular);
            offset += entry.count();
            chroms.push(entry);
        }

        Ok(Self {
            genome,
            chroms,
            total: offset,
        })
    }

    /// Merge fragments shorter than `min_size` into their upstream neighbour.
    ///
    /// A short last fragment is merged into the one before it, so the result
    /// still tiles every chromosome. A chromosome shorter than `min_size` is
    /// left as a single fragment.
    #[must_use]
    pub fn merge_short(self, min_size: u64) -> Self {
        if min_size <= 1 {
            return self;
        }

        let mut chroms = Vec::with_capacity(self.chroms.len());
        let mut offset = 0;
        for entry in self.chroms {
            let mut starts = Vec::with_capacity(entry.starts.len());
            starts.push(0);
            for &start in entry.starts.iter().skip(1) {
                if starts.last().is_some_and(|&last| start - last >= min_size) {
                    starts.push(start);
                }
            }
            if starts.len() > 1 && starts.last().is_some_and(|&last| entry.length - last < min_size) {
                starts.pop();
            }

            let merged = ChromFragments::new(starts, entry.length, offset, entry.split_at_origin);
            offset += merged.count();
            chroms.push(merged);
        }

        Self {
            genome: self.genome,
            chroms,
            total: offset,
        }
    }

    pub fn genome(&self) -> &Arc<Genome> {
        &self.genome
    }

    /// Total number of fragments in the genome
    pub fn len(&self) -> u64 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Number of fragments on one chromosome
    pub fn count(&self, ordinal: usize) -> Option<u64> {
        self.chroms.get(ordinal).map(ChromFragments::count)
    }

    /// Global fragment index covering `position` on chromosome `chrom`
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

    /// Same as [`FragmentIndex::locate`] with the chromosome given by ordinal
    ///
    /// # Errors
    ///
    /// Returns `IndexError::UnknownChromosome` or `IndexError::OutOfRange`.
    pub fn locate_ordinal(&self, ordinal: usize, position: u64) -> Result<u64, IndexError> {
        let entry = self
            .chroms
            .get(ordinal)
            .ok_or_else(|| IndexError::UnknownChromosome(format!("#{ordinal}")))?;
        if position >= entry.length {
            return Err(IndexError::OutOfRange {
                chrom: self.genome.chromosomes()[ordinal].name.clone(),
                position,
                length: entry.length,
            });
        }
        // starts[0] == 0 so at least one start is <= position
        let local = entry.starts.partition_point(|&s| s <= position) - 1;
        Ok(entry.offset + local as u64)
    }

    /// Number of restriction sites separating two fragments of one chromosome.
    ///
    /// On circular chromosomes the gap is measured the short way round, and the
    /// two halves of a fragment split by the origin count as one fragment.
    pub fn gap(&self, ordinal: usize, a: u64, b: u64) -> u64 {
        let Some(entry) = self.chroms.get(ordinal) else {
            return a.abs_diff(b);
        };
        let circular = self.genome.get(ordinal).is_some_and(|c| c.circular);
        if !circular {
            return a.abs_diff(b);
        }

        let n = entry.count();
        let (ring, last) = if entry.split_at_origin {
            (n - 1, n - 1)
        } else {
            (n, n)
        };
        let fold = |idx: u64| {
            let local = idx - entry.offset;
            if local == last {
                0
            } else {
                local
            }
        };
        let linear = fold(a).abs_diff(fold(b));
        linear.min(ring - linear)
    }

    /// All fragments in global index order
    pub fn fragments(&self) -> impl Iterator<Item = Fragment> + '_ {
        self.chroms.iter().enumerate().flat_map(|(chrom, entry)| {
            (0..entry.starts.len()).map(move |local| Fragment {
                chrom,
                start: entry.starts[local],
                end: entry.end_of(local),
                index: entry.offset + local as u64,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn genome(circular: bool) -> Arc<Genome> {
        Arc::new(
            Genome::new(
                vec![("chr1".to_string(), 1000), ("chr2".to_string(), 300)],
                circular,
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_locate_from_sites() {
        let index = FragmentIndex::from_sites(genome(false), &[vec![500, 100, 100], vec![]]).unwrap();
        assert_eq!(index.len(), 4);
        assert_eq!(index.count(0), Some(3));
        assert_eq!(index.locate("chr1", 0).unwrap(), 0);
        assert_eq!(index.locate("chr1", 99).unwrap(), 0);
        assert_eq!(index.locate("chr1", 100).unwrap(), 1);
        assert_eq!(index.locate("chr1", 999).unwrap(), 2);
        assert_eq!(index.locate("chr2", 250).unwrap(), 3);
    }

    #[test]
    fn test_locate_errors() {
        let index = FragmentIndex::fixed_size(genome(false), 100).unwrap();
        assert!(matches!(
            index.locate("chr1", 1000),
            Err(IndexError::OutOfRange { position: 1000, .. })
        ));
        assert_eq!(
            index.locate("chrX", 5),
            Err(IndexError::UnknownChromosome("chrX".to_string()))
        );
    }

    #[test]
    fn test_locate_is_monotonic() {
        let index = FragmentIndex::from_sites(genome(false), &[vec![7, 300, 301, 640], vec![150]]).unwrap();
        let mut previous = 0;
        for pos in 0..1000 {
            let idx = index.locate("chr1", pos).unwrap();
            assert!(idx >= previous);
            previous = idx;
        }
    }

    #[test]
    fn test_fragments_tile_genome() {
        let index = FragmentIndex::fixed_size(genome(false), 400).unwrap();
        let frags: Vec<_> = index.fragments().collect();
        assert_eq!(frags.len(), 4);
        assert_eq!(frags[2], Fragment { chrom: 0, start: 800, end: 1000, index: 2 });
        assert_eq!(frags[3], Fragment { chrom: 1, start: 0, end: 300, index: 3 });
        let covered: u64 = frags.iter().map(Fragment::size).sum();
        assert_eq!(covered, 1300);
    }

    #[test]
    fn test_from_fragments_requires_tiling() {
        let ok = vec![
            ("chr1".to_string(), 0, 600),
            ("chr1".to_string(), 600, 1000),
            ("chr2".to_string(), 0, 300),
        ];
        let index = FragmentIndex::from_fragments(genome(false), &ok).unwrap();
        assert_eq!(index.locate("chr1", 600).unwrap(), 1);

        let gap = vec![
            ("chr1".to_string(), 0, 600),
            ("chr1".to_string(), 700, 1000),
            ("chr2".to_string(), 0, 300),
        ];
        assert!(matches!(
            FragmentIndex::from_fragments(genome(false), &gap),
            Err(IndexError::InvalidFragments(_))
        ));

        let short = vec![("chr1".to_string(), 0, 1000)];
        assert!(matches!(
            FragmentIndex::from_fragments(genome(false), &short),
            Err(IndexError::InvalidFragments(_))
        ));

        let unknown = vec![("chrZ".to_string(), 0, 10)];
        assert!(matches!(
            FragmentIndex::from_fragments(genome(false), &unknown),
            Err(IndexError::UnknownChromosome(_))
        ));
    }

    #[test]
    fn test_merge_short_fragments() {
        let index = FragmentIndex::from_sites(genome(false), &[vec![20, 100, 130, 600, 980], vec![50]])
            .unwrap()
            .merge_short(50);

        let frags: Vec<_> = index.fragments().collect();
        let bounds: Vec<_> = frags.iter().map(|f| (f.chrom, f.start, f.end)).collect();
        assert_eq!(
            bounds,
            vec![(0, 0, 100), (0, 100, 600), (0, 600, 1000), (1, 0, 50), (1, 50, 300)]
        );
        assert!(frags.iter().all(|f| f.size() >= 50));
        assert_eq!(frags.iter().map(|f| f.index).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
        assert_eq!(index.locate("chr1", 120).unwrap(), 1);
        assert_eq!(index.locate("chr2", 60).unwrap(), 4);

        // Whole chromosome below the threshold stays one fragment
        let tiny = FragmentIndex::from_sites(genome(false), &[vec![500], vec![100, 200]])
            .unwrap()
            .merge_short(400);
        assert_eq!(tiny.count(0), Some(2));
        assert_eq!(tiny.count(1), Some(1));
        assert_eq!(tiny.len(), 3);
    }

    #[test]
    fn test_gap_linear_and_circular() {
        let linear = FragmentIndex::from_sites(genome(false), &[vec![100, 200, 300, 400], vec![]]).unwrap();
        assert_eq!(linear.gap(0, 0, 4), 4);

        // Circular: fragments 0 and 4 are the two halves of one fragment
        let circular = FragmentIndex::from_sites(genome(true), &[vec![100, 200, 300, 400], vec![]]).unwrap();
        assert_eq!(circular.gap(0, 0, 4), 0);
        assert_eq!(circular.gap(0, 1, 4), 1);
        assert_eq!(circular.gap(0, 1, 3), 2);

        // Fixed chunks are never split by the origin
        let chunks = FragmentIndex::fixed_size(genome(true), 250).unwrap();
        assert_eq!(chunks.gap(0, 0, 3), 1);
    }
}
