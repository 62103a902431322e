use std::io::{self, Write};
use std::sync::Arc;

use crate::core::genome::Genome;
use crate::core::record::{AlignedEnd, ReadPair};
use crate::parsing::pairs::UNMAPPED_CHROM;

pub const PAIRS_VERSION_LINE: &str = "## pairs format v1.0";
pub const PAIRS_COLUMNS: &str = "readID chr1 pos1 chr2 pos2 strand1 strand2 mapq1 mapq2";

/// Mapping quality written for a mapped end that has none
const MISSING_MAPQ: u8 = 255;

/// Writes read pairs as a 4DN `.pairs` file with mapping qualities
pub struct PairsWriter<W: Write> {
    out: W,
    genome: Arc<Genome>,
    written: u64,
}

impl<W: Write> PairsWriter<W> {
    /// Create the writer and emit the header.
    ///
    /// `sorted` is the value of the `#sorted:` line, e.g. `readID` or
    /// `chr1-pos1-chr2-pos2`.
    ///
    /// # Errors
    ///
    /// Returns an error if the header cannot be written.
    pub fn new(mut out: W, genome: Arc<Genome>, sorted: &str) -> io::Result<Self> {
        writeln!(out, "{PAIRS_VERSION_LINE}")?;
        writeln!(out, "#sorted: {sorted}")?;
        writeln!(out, "#shape: upper triangle")?;
        for chrom in genome.chromosomes() {
            writeln!(out, "#chromsize: {} {}", chrom.name, chrom.length)?;
        }
        writeln!(out, "#columns: {PAIRS_COLUMNS}")?;
        Ok(Self {
            out,
            genome,
            written: 0,
        })
    }

    /// Write one pair, upstream end first
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails or an end names a chromosome the
    /// genome does not have.
    pub fn write_pair(&mut self, pair: &ReadPair) -> io::Result<()> {
        let mut pair = pair.clone();
        pair.canonicalize();

        let genome = Arc::clone(&self.genome);
        let (chr1, pos1, strand1, mapq1) = Self::fields(&genome, &pair.end1)?;
        let (chr2, pos2, strand2, mapq2) = Self::fields(&genome, &pair.end2)?;
        writeln!(
            self.out,
            "{}\t{chr1}\t{pos1}\t{chr2}\t{pos2}\t{strand1}\t{strand2}\t{mapq1}\t{mapq2}",
            pair.read_id
        )?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// # Errors
    ///
    /// Returns an error if flushing fails.
    pub fn finish(mut self) -> io::Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }

    fn fields<'g>(genome: &'g Genome, end: &AlignedEnd) -> io::Result<(&'g str, u64, char, u8)> {
        let Some(ordinal) = end.chrom else {
            return Ok((UNMAPPED_CHROM, 0, '-', 0));
        };
        let chrom = genome.get(ordinal).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("no chromosome with ordinal {ordinal}"),
            )
        })?;
        Ok((
            chrom.name.as_str(),
            end.position + 1,
            end.strand.as_char(),
            end.mapq.unwrap_or(MISSING_MAPQ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Strand;
    use crate::parsing::pairs::{read_header, PairsReader};

    fn genome() -> Arc<Genome> {
        Arc::new(
            Genome::new(
                vec![("chr1".to_string(), 1000), ("chr2".to_string(), 500)],
                false,
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_header_and_records() {
        let mut writer = PairsWriter::new(Vec::new(), genome(), "readID").unwrap();
        writer
            .write_pair(&ReadPair::new(
                "r1",
                AlignedEnd::mapped(1, 9, Strand::Reverse).with_mapq(40),
                AlignedEnd::mapped(0, 99, Strand::Forward).with_mapq(60),
            ))
            .unwrap();
        writer
            .write_pair(&ReadPair::new(
                "r2",
                AlignedEnd::unmapped(),
                AlignedEnd::mapped(0, 0, Strand::Forward),
            ))
            .unwrap();
        assert_eq!(writer.written(), 2);

        let text = String::from_utf8(writer.finish().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], PAIRS_VERSION_LINE);
        assert_eq!(lines[1], "#sorted: readID");
        assert_eq!(lines[3], "#chromsize: chr1 1000");
        assert_eq!(lines[5], format!("#columns: {PAIRS_COLUMNS}"));
        assert_eq!(lines[6], "r1\tchr1\t100\tchr2\t10\t+\t-\t60\t40");
        assert_eq!(lines[7], "r2\tchr1\t1\t!\t0\t+\t-\t255\t0");
    }

    #[test]
    fn test_unknown_chromosome_is_an_error() {
        let mut writer = PairsWriter::new(Vec::new(), genome(), "readID").unwrap();
        let err = writer
            .write_pair(&ReadPair::new(
                "r1",
                AlignedEnd::mapped(0, 5, Strand::Forward),
                AlignedEnd::mapped(7, 5, Strand::Forward),
            ))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert_eq!(writer.written(), 0);
    }

    #[test]
    fn test_output_reads_back() {
        let pair = ReadPair::new(
            "r1",
            AlignedEnd::mapped(0, 99, Strand::Forward).with_mapq(60),
            AlignedEnd::mapped(1, 9, Strand::Reverse).with_mapq(40),
        );
        let mut writer = PairsWriter::new(Vec::new(), genome(), "readID").unwrap();
        writer.write_pair(&pair).unwrap();
        let bytes = writer.finish().unwrap();

        let mut input = bytes.as_slice();
        let header = read_header(&mut input).unwrap();
        assert_eq!(header.chromsizes.len(), 2);
        let pairs: Vec<ReadPair> = PairsReader::new(input, &header, genome())
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(pairs, vec![pair]);
    }
}
