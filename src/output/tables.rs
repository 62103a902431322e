//! Row tables that accompany a matrix.
//!
//! The bin table lists every matrix row with a per-chromosome 1-based id.
//! The contig table lists every chromosome with its row count and the number
//! of rows that precede it.

use std::io::{self, Write};

use crate::core::genome::Genome;
use crate::index::Bin;

pub const BIN_TABLE_HEADER: &str = "id\tchrom\tstart_pos\tend_pos\tsize";
pub const CONTIG_TABLE_HEADER: &str = "contig\tlength\tn_frags\tcumul_length";

/// # Errors
///
/// Returns an error if writing fails or a bin names an unknown chromosome.
pub fn write_bin_table<W: Write>(out: &mut W, genome: &Genome, bins: &[Bin]) -> io::Result<()> {
    writeln!(out, "{BIN_TABLE_HEADER}")?;
    let mut current = None;
    let mut local = 0u64;
    for bin in bins {
        if current != Some(bin.chrom) {
            current = Some(bin.chrom);
            local = 0;
        }
        local += 1;
        let chrom = chromosome_name(genome, bin.chrom)?;
        writeln!(
            out,
            "{local}\t{chrom}\t{}\t{}\t{}",
            bin.start,
            bin.end,
            bin.size()
        )?;
    }
    out.flush()
}

/// # Errors
///
/// Returns an error if writing fails.
pub fn write_contig_table<W: Write>(out: &mut W, genome: &Genome, bins: &[Bin]) -> io::Result<()> {
    let mut counts = vec![0u64; genome.len()];
    for bin in bins {
        if let Some(count) = counts.get_mut(bin.chrom) {
            *count += 1;
        }
    }

    writeln!(out, "{CONTIG_TABLE_HEADER}")?;
    let mut cumulative = 0u64;
    for (chrom, count) in genome.chromosomes().iter().zip(counts) {
        writeln!(out, "{}\t{}\t{count}\t{cumulative}", chrom.name, chrom.length)?;
        cumulative += count;
    }
    out.flush()
}

fn chromosome_name(genome: &Genome, ordinal: usize) -> io::Result<&str> {
    genome
        .get(ordinal)
        .map(|c| c.name.as_str())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("no chromosome with ordinal {ordinal}"),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::FragmentIndex;
    use std::sync::Arc;

    fn index() -> FragmentIndex {
        let genome = Arc::new(
            Genome::new(
                vec![("chr1".to_string(), 100), ("chr2".to_string(), 40)],
                false,
            )
            .unwrap(),
        );
        FragmentIndex::from_sites(genome, &[vec![30, 70], vec![]]).unwrap()
    }

    fn bins(index: &FragmentIndex) -> Vec<Bin> {
        index
            .fragments()
            .map(|f| Bin {
                chrom: f.chrom,
                start: f.start,
                end: f.end,
                index: f.index,
            })
            .collect()
    }

    #[test]
    fn test_bin_table_restarts_ids_per_chromosome() {
        let index = index();
        let mut out = Vec::new();
        write_bin_table(&mut out, index.genome(), &bins(&index)).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], BIN_TABLE_HEADER);
        assert_eq!(&lines[1..], [
            "1\tchr1\t0\t30\t30",
            "2\tchr1\t30\t70\t40",
            "3\tchr1\t70\t100\t30",
            "1\tchr2\t0\t40\t40",
        ]);
    }

    #[test]
    fn test_contig_table_cumulative_counts() {
        let index = index();
        let mut out = Vec::new();
        write_contig_table(&mut out, index.genome(), &bins(&index)).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            format!("{CONTIG_TABLE_HEADER}\nchr1\t100\t3\t0\nchr2\t40\t1\t3\n")
        );
    }
}
