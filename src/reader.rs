//! High-level k-mer iteration.
//!
//! A [`KeroReader`] walks every k-mer of a file in order, whatever mix of
//! raw and minimizer sections it holds. Global-variable sections update the
//! working sizes as they stream past; index and hashtable sections are
//! consumed as no-ops.
//!
//! Each block is materialized once into a sequence + data buffer, and three
//! extra copies of the sequence pre-shifted by 1, 2 and 3 nucleotides are
//! kept. Any k-mer then ends on a byte boundary in exactly one of the four
//! alignments, so emitting it is a single copy from the right buffer.

use crate::bitpack::{bit_bytes, rightshift};
use crate::error::Result;
use crate::file::KeroFile;
use crate::section::{BlockReader, SectionGv, SectionHashtable, SectionIndex, SectionType};

/// Iterates all k-mers (with their payloads) of a KERO file.
pub struct KeroReader {
    file: KeroFile,

    current: Option<BlockReader>,
    remaining_blocks: u64,

    /// Current block: packed sequence followed by its data array
    seq_data: Vec<u8>,
    /// The sequence re-shifted right by 1, 2 and 3 nucleotides
    shifts: [Vec<u8>; 3],
    /// Scratch for the emitted k-mer
    current_kmer: Vec<u8>,

    seq_nucl: u64,
    seq_bytes: usize,
    seq_kmers: u64,
    remaining_kmers: u64,

    k: u64,
    max: u64,
    data_size: u64,
}

impl KeroReader {
    /// Opens a file and advances to the first k-mer block.
    pub fn new<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let file = KeroFile::open(path)?;
        let mut reader = Self {
            file,
            current: None,
            remaining_blocks: 0,
            seq_data: Vec::new(),
            shifts: [Vec::new(), Vec::new(), Vec::new()],
            current_kmer: Vec::new(),
            seq_nucl: 0,
            seq_bytes: 0,
            seq_kmers: 0,
            remaining_kmers: 0,
            k: 0,
            max: 0,
            data_size: 0,
        };
        reader.file.complete_header()?;
        reader.ensure_section()?;
        Ok(reader)
    }

    /// Looks up a file-wide variable (including those of sections not yet
    /// reached by the iteration only once their GV section has streamed by).
    #[must_use]
    pub fn get_var(&self, name: &str) -> Option<u64> {
        self.file.var(name)
    }

    /// The per-file nucleotide encoding table `[A, C, G, T]`.
    #[must_use]
    pub fn get_encoding(&self) -> [u8; 4] {
        self.file.encoding()
    }

    /// The underlying file object.
    #[must_use]
    pub fn file(&self) -> &KeroFile {
        &self.file
    }

    /// Whether another k-mer is available.
    pub fn has_next(&mut self) -> Result<bool> {
        if self.remaining_kmers > 0 || self.remaining_blocks > 0 {
            return Ok(true);
        }
        self.ensure_section()?;
        Ok(self.current.is_some() && self.remaining_blocks > 0)
    }

    /// Returns the next k-mer and its payload, or `None` at the end of the
    /// file. The k-mer is 2-bit packed into `ceil(k / 4)` bytes with the
    /// pad bits of byte 0 cleared.
    pub fn next_kmer(&mut self) -> Result<Option<(&[u8], &[u8])>> {
        if !self.has_next()? {
            return Ok(None);
        }
        if self.remaining_kmers == 0 {
            self.read_next_block()?;
            if self.remaining_kmers == 0 {
                return Ok(None);
            }
        }

        let right_shift = ((self.remaining_kmers - 1) % 4) as usize;
        let prefix_offset = (4 - self.seq_nucl % 4) % 4;
        let kmer_idx = self.seq_kmers - self.remaining_kmers;

        // in the chosen alignment the k-mer ends on a byte boundary
        let start_nucl = prefix_offset + right_shift as u64 + kmer_idx;
        let start_byte = (start_nucl / 4) as usize;
        let end_byte = ((start_nucl + self.k - 1) / 4) as usize;
        let nb_bytes = end_byte - start_byte + 1;

        let source: &[u8] = if right_shift == 0 {
            &self.seq_data
        } else {
            &self.shifts[right_shift - 1]
        };
        self.current_kmer[..nb_bytes].copy_from_slice(&source[start_byte..=end_byte]);
        let pad = (start_nucl % 4) as usize;
        if pad > 0 {
            self.current_kmer[0] &= 0xFFu8 >> (2 * pad);
        }

        self.remaining_kmers -= 1;
        if self.remaining_kmers == 0 {
            self.remaining_blocks -= 1;
            if self.remaining_blocks == 0 {
                self.current = None;
            }
        }

        let data_start = self.seq_bytes + (kmer_idx * self.data_size) as usize;
        Ok(Some((
            &self.current_kmer[..nb_bytes],
            &self.seq_data[data_start..data_start + self.data_size as usize],
        )))
    }

    /// Returns the next whole block: k-mer count, packed sequence, data
    /// array. `None` at the end of the file.
    pub fn next_block(&mut self) -> Result<Option<(u64, &[u8], &[u8])>> {
        if !self.has_next()? {
            return Ok(None);
        }
        self.read_next_block()?;

        self.remaining_kmers = 0;
        self.remaining_blocks -= 1;
        if self.remaining_blocks == 0 {
            self.current = None;
        }

        let data_bytes = (self.seq_kmers * self.data_size) as usize;
        Ok(Some((
            self.seq_kmers,
            &self.seq_data[..self.seq_bytes],
            &self.seq_data[self.seq_bytes..self.seq_bytes + data_bytes],
        )))
    }

    /// Advances through the stream until a block section with content is
    /// current, consuming GV, index and hashtable sections on the way.
    fn ensure_section(&mut self) -> Result<()> {
        while self.current.is_none() || self.remaining_blocks == 0 {
            if self.file.tell() >= self.file.end_position() {
                break;
            }
            match self.file.peek_section_type()? {
                SectionType::Gv => {
                    SectionGv::new(&mut self.file)?.close()?;
                    self.update_sizes();
                }
                SectionType::Index => {
                    SectionIndex::new(&mut self.file)?.close()?;
                }
                SectionType::Hashtable => {
                    SectionHashtable::new(&mut self.file)?.close()?;
                }
                SectionType::Raw | SectionType::Minimizer => {
                    let mut block = BlockReader::open(&mut self.file)?;
                    if block.nb_blocks() == 0 {
                        block.close(&mut self.file)?;
                        continue;
                    }
                    self.remaining_blocks = block.nb_blocks();
                    self.current = Some(block);
                }
            }
        }
        Ok(())
    }

    /// Reallocates the working buffers after a GV section changed the
    /// file-wide sizes.
    fn update_sizes(&mut self) {
        self.k = self.file.var("k").unwrap_or(0);
        self.max = self.file.var("max").unwrap_or(0);
        self.data_size = self.file.var("data_size").unwrap_or(0);

        let seq_max_bytes = bit_bytes(2, (self.max + self.k).saturating_sub(1));
        let data_max_bytes = (self.data_size * self.max) as usize;
        self.seq_data = vec![0u8; seq_max_bytes + data_max_bytes];
        for shift in &mut self.shifts {
            *shift = vec![0u8; seq_max_bytes];
        }
        self.current_kmer = vec![0u8; (self.k / 4 + 1) as usize];
    }

    fn read_next_block(&mut self) -> Result<()> {
        let Some(block) = self.current.as_mut() else {
            return Ok(());
        };
        let Some(nb_kmers) = block.read_block_into(&mut self.file, &mut self.seq_data)? else {
            return Ok(());
        };

        self.seq_kmers = nb_kmers;
        self.remaining_kmers = nb_kmers;
        self.seq_nucl = nb_kmers + self.k - 1;
        self.seq_bytes = bit_bytes(2, self.seq_nucl);

        // refresh the shifted copies used for aligned k-mer extraction
        for i in 1..4u64.min(nb_kmers) {
            let i = i as usize;
            self.shifts[i - 1][..self.seq_bytes].copy_from_slice(&self.seq_data[..self.seq_bytes]);
            rightshift(&mut self.shifts[i - 1][..self.seq_bytes], 2 * i);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nuc;
    use crate::section::{SectionMinimizer, SectionRaw};
    use tempfile::tempdir;

    const ENCODING: [u8; 4] = [0, 1, 3, 2];

    fn write_gv(file: &mut KeroFile, vars: &[(&str, u64)]) {
        let mut gv = SectionGv::new(file).unwrap();
        for (name, value) in vars {
            gv.write_var(name, *value);
        }
        gv.close().unwrap();
    }

    fn expected_kmers(seq: &[u8], k: usize) -> Vec<(Vec<u8>, u8)> {
        seq.windows(k)
            .enumerate()
            .map(|(i, window)| (nuc::encode(window, &ENCODING).unwrap(), i as u8))
            .collect()
    }

    #[test]
    fn test_iterate_raw_kmers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("iter_raw.kero");

        let mut file = KeroFile::create(&path).unwrap();
        file.set_encoding(0, 1, 3, 2).unwrap();
        file.write_metadata(&[]).unwrap();
        write_gv(&mut file, &[("k", 3), ("max", 8), ("data_size", 1)]);

        let blocks: [&[u8]; 2] = [b"ACGTA", b"TTG"];
        let mut raw = SectionRaw::new(&mut file).unwrap();
        for ascii in blocks {
            let packed = nuc::encode(ascii, &ENCODING).unwrap();
            let nb_kmers = ascii.len() - 2;
            let data: Vec<u8> = (0..nb_kmers as u8).collect();
            raw.write_compacted_sequence(&packed, ascii.len() as u64, &data)
                .unwrap();
        }
        raw.close().unwrap();
        file.close().unwrap();

        let mut reader = KeroReader::new(&path).unwrap();
        assert_eq!(reader.get_var("k"), Some(3));
        assert_eq!(reader.get_encoding(), ENCODING);

        for ascii in blocks {
            for (expected, expected_data) in expected_kmers(ascii, 3) {
                let (kmer, data) = reader.next_kmer().unwrap().expect("kmer expected");
                assert_eq!(kmer, expected);
                assert_eq!(data, [expected_data]);
            }
        }
        assert!(reader.next_kmer().unwrap().is_none());
        assert!(!reader.has_next().unwrap());
    }

    #[test]
    fn test_iterate_minimizer_kmers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("iter_mini.kero");

        let mut file = KeroFile::create(&path).unwrap();
        file.set_encoding(0, 1, 3, 2).unwrap();
        file.write_metadata(&[]).unwrap();
        write_gv(
            &mut file,
            &[("k", 4), ("m", 2), ("max", 8), ("data_size", 1)],
        );

        let mini = nuc::encode(b"AC", &ENCODING).unwrap();
        let mut section = SectionMinimizer::new(&mut file).unwrap();
        section.write_minimizer(&mini);
        // three k-mers: GACG, ACGT, CGTT
        let skmer = nuc::encode(b"GACGTT", &ENCODING).unwrap();
        section.write_compacted_sequence(&skmer, 6, 1, &[5, 6, 7]);
        section.close().unwrap();
        file.close().unwrap();

        let mut reader = KeroReader::new(&path).unwrap();
        for (expected, expected_data) in [
            (b"GACG", 5u8),
            (b"ACGT", 6),
            (b"CGTT", 7),
        ]
        .map(|(ascii, d)| (nuc::encode(ascii, &ENCODING).unwrap(), d))
        {
            let (kmer, data) = reader.next_kmer().unwrap().expect("kmer expected");
            assert_eq!(kmer, expected);
            assert_eq!(data, [expected_data]);
        }
        assert!(reader.next_kmer().unwrap().is_none());
    }

    #[test]
    fn test_gv_updates_between_sections() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("resize.kero");

        let mut file = KeroFile::create(&path).unwrap();
        file.set_encoding(0, 1, 3, 2).unwrap();
        file.write_metadata(&[]).unwrap();

        write_gv(&mut file, &[("k", 3), ("max", 4), ("data_size", 0)]);
        let mut raw = SectionRaw::new(&mut file).unwrap();
        let packed = nuc::encode(b"AAC", &ENCODING).unwrap();
        raw.write_compacted_sequence(&packed, 3, &[]).unwrap();
        raw.close().unwrap();

        // a later GV enlarges k; the reader must follow
        write_gv(&mut file, &[("k", 5), ("max", 4), ("data_size", 0)]);
        let mut raw = SectionRaw::new(&mut file).unwrap();
        let packed = nuc::encode(b"GGGTT", &ENCODING).unwrap();
        raw.write_compacted_sequence(&packed, 5, &[]).unwrap();
        raw.close().unwrap();
        file.close().unwrap();

        let mut reader = KeroReader::new(&path).unwrap();
        let (kmer, data) = reader.next_kmer().unwrap().unwrap();
        assert_eq!(kmer, nuc::encode(b"AAC", &ENCODING).unwrap());
        assert!(data.is_empty());
        let (kmer, _) = reader.next_kmer().unwrap().unwrap();
        assert_eq!(kmer, nuc::encode(b"GGGTT", &ENCODING).unwrap());
        assert!(reader.next_kmer().unwrap().is_none());
    }

    #[test]
    fn test_next_block() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("blocks.kero");

        let mut file = KeroFile::create(&path).unwrap();
        file.set_encoding(0, 1, 3, 2).unwrap();
        file.write_metadata(&[]).unwrap();
        write_gv(&mut file, &[("k", 3), ("max", 8), ("data_size", 2)]);

        let packed = nuc::encode(b"ACGT", &ENCODING).unwrap();
        let mut raw = SectionRaw::new(&mut file).unwrap();
        raw.write_compacted_sequence(&packed, 4, &[1, 2, 3, 4])
            .unwrap();
        raw.close().unwrap();
        file.close().unwrap();

        let mut reader = KeroReader::new(&path).unwrap();
        let (nb_kmers, seq, data) = reader.next_block().unwrap().expect("block expected");
        assert_eq!(nb_kmers, 2);
        assert_eq!(seq, nuc::encode(b"ACGT", &ENCODING).unwrap());
        assert_eq!(data, [1, 2, 3, 4]);
        assert!(reader.next_block().unwrap().is_none());
    }
}
