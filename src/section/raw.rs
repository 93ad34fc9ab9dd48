//! Raw sequence sections.
//!
//! An `r` section stores blocks of compacted sequences with their per-k-mer
//! data, without any minimizer extraction. Each block holds `nb_kmers`
//! (stored in just enough bytes for the file-wide `max`, omitted entirely
//! when `max == 1`), the packed sequence of `nb_kmers + k - 1` nucleotides,
//! and `data_size * nb_kmers` data bytes.
//!
//! The section requires `k`, `max` and `data_size` in the file-wide
//! variable table. The block count after the tag byte is a placeholder
//! backfilled on close.

use crate::bitpack::{bit_bytes, ceil_log2};
use crate::error::Result;
use crate::file::KeroFile;

use super::expect_tag;

/// Owned state of a raw section, shared between the borrowing manipulator
/// and the sequential reader.
pub(crate) struct RawBlocks {
    pub(crate) k: u64,
    pub(crate) max: u64,
    pub(crate) data_size: u64,

    /// Bytes used by each block's k-mer count; zero when `max == 1`
    nb_kmers_bytes: usize,
    beginning: u64,

    pub(crate) nb_blocks: u64,
    pub(crate) remaining_blocks: u64,
}

impl RawBlocks {
    pub(crate) fn open(file: &mut KeroFile) -> Result<Self> {
        file.prepare_section()?;
        let beginning = file.tell();

        let k = file.require_var("k")?;
        let max = file.require_var("max")?;
        let data_size = file.require_var("data_size")?;
        let nb_kmers_bytes = bit_bytes(ceil_log2(max), 1);

        let mut blocks = Self {
            k,
            max,
            data_size,
            nb_kmers_bytes,
            beginning,
            nb_blocks: 0,
            remaining_blocks: 0,
        };

        if file.is_reader() {
            blocks.read_section_header(file)?;
        }
        if file.is_writer() {
            file.register_position(b'r');
            file.buffer.write_u8(b'r')?;
            file.buffer.write_u64(0)?; // nb_blocks placeholder
        }
        Ok(blocks)
    }

    fn read_section_header(&mut self, file: &mut KeroFile) -> Result<()> {
        expect_tag(file, b'r')?;
        self.nb_blocks = file.buffer.read_u64()?;
        self.remaining_blocks = self.nb_blocks;
        Ok(())
    }

    pub(crate) fn write_block(
        &mut self,
        file: &mut KeroFile,
        seq: &[u8],
        seq_size: u64,
        data: &[u8],
    ) -> Result<()> {
        let nb_kmers = seq_size - self.k + 1;
        if self.nb_kmers_bytes > 0 {
            file.buffer.write_uint(nb_kmers, self.nb_kmers_bytes)?;
        }
        file.buffer.write(&seq[..bit_bytes(2, seq_size)])?;
        file.buffer
            .write(&data[..(self.data_size * nb_kmers) as usize])?;
        self.nb_blocks += 1;
        Ok(())
    }

    fn read_block_size(&mut self, file: &mut KeroFile) -> Result<(u64, usize, usize)> {
        let nb_kmers = if self.nb_kmers_bytes > 0 {
            file.buffer.read_uint(self.nb_kmers_bytes)?
        } else {
            1
        };
        let seq_bytes = bit_bytes(2, nb_kmers + self.k - 1);
        let data_bytes = (self.data_size * nb_kmers) as usize;
        Ok((nb_kmers, seq_bytes, data_bytes))
    }

    pub(crate) fn read_block(
        &mut self,
        file: &mut KeroFile,
        seq: &mut [u8],
        data: &mut [u8],
    ) -> Result<Option<u64>> {
        if self.remaining_blocks == 0 {
            return Ok(None);
        }
        let (nb_kmers, seq_bytes, data_bytes) = self.read_block_size(file)?;
        file.buffer.read(&mut seq[..seq_bytes])?;
        file.buffer.read(&mut data[..data_bytes])?;
        self.remaining_blocks -= 1;
        Ok(Some(nb_kmers))
    }

    /// Reads sequence and data contiguously into one buffer.
    pub(crate) fn read_block_into(
        &mut self,
        file: &mut KeroFile,
        seq_data: &mut [u8],
    ) -> Result<Option<u64>> {
        if self.remaining_blocks == 0 {
            return Ok(None);
        }
        let (nb_kmers, seq_bytes, data_bytes) = self.read_block_size(file)?;
        file.buffer.read(&mut seq_data[..seq_bytes + data_bytes])?;
        self.remaining_blocks -= 1;
        Ok(Some(nb_kmers))
    }

    pub(crate) fn jump_block(&mut self, file: &mut KeroFile) -> Result<()> {
        if self.remaining_blocks == 0 {
            return Ok(());
        }
        let (_, seq_bytes, data_bytes) = self.read_block_size(file)?;
        file.jump((seq_bytes + data_bytes) as i64)?;
        self.remaining_blocks -= 1;
        Ok(())
    }

    pub(crate) fn close(&mut self, file: &mut KeroFile) -> Result<()> {
        if file.is_writer() {
            file.buffer.write_u64_at(self.nb_blocks, self.beginning + 1)?;
        }
        if file.is_reader() {
            while self.remaining_blocks > 0 {
                self.jump_block(file)?;
            }
        }
        Ok(())
    }
}

/// Manipulator for one raw section.
pub struct SectionRaw<'a> {
    file: &'a mut KeroFile,
    blocks: RawBlocks,
}

impl<'a> SectionRaw<'a> {
    /// Opens a raw section. Requires `k`, `max` and `data_size` in the
    /// file-wide variable table.
    pub fn new(file: &'a mut KeroFile) -> Result<Self> {
        let blocks = RawBlocks::open(file)?;
        Ok(Self { file, blocks })
    }

    /// Number of blocks: parsed from the header in reading mode, grown per
    /// write in writing mode.
    #[must_use]
    pub fn nb_blocks(&self) -> u64 {
        self.blocks.nb_blocks
    }

    /// Writes one block holding a compacted sequence of `seq_size`
    /// nucleotides and the data of its `seq_size - k + 1` k-mers.
    pub fn write_compacted_sequence(
        &mut self,
        seq: &[u8],
        seq_size: u64,
        data: &[u8],
    ) -> Result<()> {
        self.blocks.write_block(self.file, seq, seq_size, data)
    }

    /// Reads the next block into caller-allocated buffers, returning its
    /// k-mer count, or `None` when the section is exhausted.
    pub fn read_compacted_sequence(
        &mut self,
        seq: &mut [u8],
        data: &mut [u8],
    ) -> Result<Option<u64>> {
        self.blocks.read_block(self.file, seq, data)
    }

    /// Skips the next block.
    pub fn jump_sequence(&mut self) -> Result<()> {
        self.blocks.jump_block(self.file)
    }

    /// Copies the remaining blocks into a new raw section on another file,
    /// which must already hold the same `k`, `max` and `data_size`.
    pub fn copy(&mut self, dest: &mut KeroFile) -> Result<()> {
        let mut out = RawBlocks::open(dest)?;
        let mut seq = vec![0u8; bit_bytes(2, self.blocks.k + self.blocks.max - 1)];
        let mut data = vec![0u8; (self.blocks.max * self.blocks.data_size) as usize];
        while let Some(nb_kmers) = self.blocks.read_block(self.file, &mut seq, &mut data)? {
            out.write_block(dest, &seq, nb_kmers + self.blocks.k - 1, &data)?;
        }
        out.close(dest)
    }

    /// Closes the section: a writer backfills the block count, a reader
    /// skips any unread blocks.
    pub fn close(mut self) -> Result<()> {
        self.blocks.close(self.file)
    }
}
