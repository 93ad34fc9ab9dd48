//! Minimizer sections.
//!
//! An `M` section stores a group of super-k-mers that share one minimizer
//! of length `m`. The minimizer is kept once in the section header; each
//! stored sequence is the super-k-mer with the minimizer cut out, the
//! prefix and suffix packed back together at the cut. Reading splices the
//! minimizer back in at the recorded position through sub-byte shifts and
//! byte fusion.
//!
//! Block fields are stored column-wise after the header:
//!
//! 1. `n`: per-block k-mer counts, varint-compressed, length-prefixed;
//! 2. `m_idx`: per-block minimizer positions, varint-compressed,
//!    length-prefixed;
//! 3. `data`: concatenated payloads, zstd-compressed, preceded by the raw
//!    and compressed byte counts;
//! 4. `seq`: concatenated packed sequences, raw (each block's byte count
//!    derives from the `n` column).
//!
//! The header stores the four column offsets relative to the section start;
//! they are placeholders until the section closes and backfills them. A
//! reader decodes the three compressed columns into memory on the first
//! block read (or beforehand from a memory map) and streams the `seq`
//! column.

use byteorder::{BigEndian, ByteOrder};

use crate::bitpack::{bit_bytes, fuse, leftshift, mask_minimizer, rightshift};
use crate::codec;
use crate::error::Result;
use crate::file::KeroFile;

use super::expect_tag;

/// Owned state of a minimizer section, shared between the borrowing
/// manipulator and the sequential reader.
pub(crate) struct MinimizerBlocks {
    pub(crate) k: u64,
    pub(crate) m: u64,
    pub(crate) max: u64,
    pub(crate) data_size: u64,

    /// Bytes holding the packed minimizer, `ceil(2m / 8)`
    nb_bytes_mini: usize,
    minimizer: Vec<u8>,

    start_pos: u64,
    pub(crate) nb_blocks: u64,
    pub(crate) remaining_blocks: u64,

    // column buffers: filled by the writer, decoded by the reader
    n_values: Vec<u64>,
    m_idxs: Vec<u64>,
    data_col: Vec<u8>,
    seq_col: Vec<u8>,
    columns_loaded: bool,

    // reading cursors
    cur_block: u64,
    next_data_pos: usize,
    last_seq_pos: u64,

    // absolute column offsets
    n_col_offset: u64,
    m_idx_col_offset: u64,
    data_col_offset: u64,
    seq_col_offset: u64,
}

impl MinimizerBlocks {
    pub(crate) fn open(file: &mut KeroFile) -> Result<Self> {
        file.prepare_section()?;
        let start_pos = file.tell();

        let k = file.require_var("k")?;
        let m = file.require_var("m")?;
        let max = file.require_var("max")?;
        let data_size = file.require_var("data_size")?;
        let nb_bytes_mini = bit_bytes(2, m);

        let mut blocks = Self {
            k,
            m,
            max,
            data_size,
            nb_bytes_mini,
            minimizer: vec![0u8; nb_bytes_mini],
            start_pos,
            nb_blocks: 0,
            remaining_blocks: 0,
            n_values: Vec::new(),
            m_idxs: Vec::new(),
            data_col: Vec::new(),
            seq_col: Vec::new(),
            columns_loaded: false,
            cur_block: 0,
            next_data_pos: 0,
            last_seq_pos: 0,
            n_col_offset: 0,
            m_idx_col_offset: 0,
            data_col_offset: 0,
            seq_col_offset: 0,
        };

        if file.is_reader() {
            blocks.read_section_header(file)?;
        }
        Ok(blocks)
    }

    fn read_section_header(&mut self, file: &mut KeroFile) -> Result<()> {
        expect_tag(file, b'M')?;
        let mut minimizer = std::mem::take(&mut self.minimizer);
        file.buffer.read(&mut minimizer)?;
        self.minimizer = minimizer;

        self.nb_blocks = file.buffer.read_u64()?;
        self.remaining_blocks = self.nb_blocks;

        // offsets are section-relative on disk
        self.n_col_offset = file.buffer.read_u64()? + self.start_pos;
        self.m_idx_col_offset = file.buffer.read_u64()? + self.start_pos;
        self.data_col_offset = file.buffer.read_u64()? + self.start_pos;
        self.seq_col_offset = file.buffer.read_u64()? + self.start_pos;
        Ok(())
    }

    pub(crate) fn minimizer(&self) -> &[u8] {
        &self.minimizer
    }

    /// Stores the minimizer for the section header; nothing reaches the
    /// file until close.
    pub(crate) fn set_minimizer(&mut self, minimizer: &[u8]) {
        let nb = self.nb_bytes_mini;
        self.minimizer[..nb].copy_from_slice(&minimizer[..nb]);
    }

    /// Appends one block whose sequence already lacks the minimizer.
    pub(crate) fn write_block_without_mini(
        &mut self,
        seq: &[u8],
        seq_size: u64,
        mini_pos: u64,
        data: &[u8],
    ) {
        let nb_kmers = seq_size + self.m - self.k + 1;
        self.n_values.push(nb_kmers);
        self.m_idxs.push(mini_pos);
        self.data_col
            .extend_from_slice(&data[..(self.data_size * nb_kmers) as usize]);
        self.seq_col.extend_from_slice(&seq[..bit_bytes(2, seq_size)]);
        self.nb_blocks += 1;
    }

    /// Appends one block from a full super-k-mer, cutting the minimizer out
    /// at `mini_pos` first.
    pub(crate) fn write_block(&mut self, seq: &[u8], seq_size: u64, mini_pos: u64, data: &[u8]) {
        let m = self.m as usize;
        let seq_size_n = seq_size as usize;
        let mini_pos_n = mini_pos as usize;
        let seq_bytes = bit_bytes(2, seq_size);
        let left_offset = (4 - seq_size_n % 4) % 4;

        let mut copy = seq[..seq_bytes].to_vec();

        // move the suffix over the bytes where the minimizer started
        let mini_start_byte = (mini_pos_n + left_offset) / 4;
        let suff_start_byte = (mini_pos_n + m + left_offset) / 4;
        copy.copy_within(suff_start_byte.., mini_start_byte);

        // shift the suffix to the exact position the minimizer vacated
        let mini_offset = (mini_pos_n + left_offset) % 4;
        let suff_offset = (mini_pos_n + m + left_offset) % 4;
        if mini_offset < suff_offset {
            leftshift(&mut copy[mini_start_byte..], (suff_offset - mini_offset) * 2);
        } else {
            rightshift(&mut copy[mini_start_byte..], (mini_offset - suff_offset) * 2);
        }

        // stitch prefix and suffix bits in the shared byte
        copy[mini_start_byte] = fuse(seq[mini_start_byte], copy[mini_start_byte], mini_offset * 2);

        // restore the left padding of the shortened sequence
        leftshift(&mut copy, left_offset * 2);
        rightshift(&mut copy, ((4 - ((seq_size_n - m) % 4)) % 4) * 2);

        self.write_block_without_mini(&copy, seq_size - self.m, mini_pos, data);
    }

    /// Splices the section minimizer back into a stored sequence of
    /// `nb_kmers` k-mers at `mini_pos`. `seq` holds the minimizer-less
    /// packing on entry and the full super-k-mer packing on exit.
    pub(crate) fn add_minimizer(&self, nb_kmers: u64, seq: &mut [u8], mini_pos: u64) {
        let k = self.k as usize;
        let m = self.m as usize;
        let mini_pos = mini_pos as usize;

        let seq_size = nb_kmers as usize + k - 1;
        let seq_bytes = bit_bytes(2, seq_size as u64);
        let seq_left_offset = (4 - seq_size % 4) % 4;
        let no_mini_size = seq_size - m;
        let no_mini_bytes = bit_bytes(2, no_mini_size as u64);
        let no_mini_left_offset = (4 - no_mini_size % 4) % 4;

        // work left-aligned: evict the stored padding
        leftshift(&mut seq[..no_mini_bytes], no_mini_left_offset * 2);

        // lift the suffix out, left-aligned in its own buffer
        let suff_nucl = seq_size - m - mini_pos;
        let suff_src_byte = mini_pos / 4;
        let suff_src_bytes = no_mini_bytes - suff_src_byte;
        let mut suffix = vec![0u8; seq_bytes];
        suffix[..suff_src_bytes].copy_from_slice(&seq[suff_src_byte..no_mini_bytes]);
        leftshift(&mut suffix[..suff_src_bytes], (mini_pos % 4) * 2);

        // the minimizer, left-aligned in its own buffer
        let mut mini = vec![0u8; seq_bytes];
        mini[..self.nb_bytes_mini].copy_from_slice(&self.minimizer);
        leftshift(&mut mini[..self.nb_bytes_mini], ((4 - m % 4) % 4) * 2);

        // merge the minimizer at its recorded position
        let mini_dst_byte = mini_pos / 4;
        let mini_dst_offset = mini_pos % 4;
        let mini_merge_bytes = (m + mini_dst_offset + 3) / 4;
        rightshift(&mut mini, mini_dst_offset * 2);
        seq[mini_dst_byte] = fuse(seq[mini_dst_byte], mini[0], mini_dst_offset * 2);
        seq[mini_dst_byte + 1..mini_dst_byte + mini_merge_bytes]
            .copy_from_slice(&mini[1..mini_merge_bytes]);

        // re-attach the suffix after the minimizer; nothing to merge when
        // the minimizer sits at the very end
        let suff_dst_nucl = mini_pos + m;
        let suff_dst_byte = suff_dst_nucl / 4;
        let suff_dst_offset = suff_dst_nucl % 4;
        let suff_merge_bytes = (suff_nucl + suff_dst_offset + 3) / 4;
        if suff_merge_bytes > 0 {
            rightshift(&mut suffix, suff_dst_offset * 2);
            seq[suff_dst_byte] = fuse(seq[suff_dst_byte], suffix[0], suff_dst_offset * 2);
            seq[suff_dst_byte + 1..suff_dst_byte + suff_merge_bytes]
                .copy_from_slice(&suffix[1..suff_merge_bytes]);
        }

        // restore the padding of the full-length sequence
        rightshift(&mut seq[..seq_bytes], seq_left_offset * 2);
    }

    fn load_columns_from_file(&mut self, file: &mut KeroFile) -> Result<()> {
        file.buffer.jump_to(self.n_col_offset)?;
        let z_len = file.buffer.read_u64()? as usize;
        let mut z = vec![0u8; z_len];
        file.buffer.read(&mut z)?;
        self.n_values = codec::decode_u64s(&z, self.nb_blocks as usize)?;

        file.buffer.jump_to(self.m_idx_col_offset)?;
        let z_len = file.buffer.read_u64()? as usize;
        let mut z = vec![0u8; z_len];
        file.buffer.read(&mut z)?;
        self.m_idxs = codec::decode_u64s(&z, self.nb_blocks as usize)?;

        if self.data_size > 0 {
            file.buffer.jump_to(self.data_col_offset)?;
            let raw_len = file.buffer.read_u64()? as usize;
            let z_len = file.buffer.read_u64()? as usize;
            let mut z = vec![0u8; z_len];
            file.buffer.read(&mut z)?;
            self.data_col = codec::decompress_bytes(&z, raw_len)?;
        }
        self.columns_loaded = true;
        Ok(())
    }

    /// Decodes the three compressed columns from a memory-mapped copy of
    /// the file instead of the stream. A second call is a no-op.
    pub(crate) fn precache_columns(&mut self, mmap: &[u8]) -> Result<()> {
        if self.columns_loaded {
            return Ok(());
        }

        let mut cursor = self.n_col_offset as usize;
        let z_len = BigEndian::read_u64(&mmap[cursor..cursor + 8]) as usize;
        cursor += 8;
        self.n_values = codec::decode_u64s(&mmap[cursor..cursor + z_len], self.nb_blocks as usize)?;

        let mut cursor = self.m_idx_col_offset as usize;
        let z_len = BigEndian::read_u64(&mmap[cursor..cursor + 8]) as usize;
        cursor += 8;
        self.m_idxs = codec::decode_u64s(&mmap[cursor..cursor + z_len], self.nb_blocks as usize)?;

        if self.data_size > 0 {
            let mut cursor = self.data_col_offset as usize;
            let raw_len = BigEndian::read_u64(&mmap[cursor..cursor + 8]) as usize;
            let z_len = BigEndian::read_u64(&mmap[cursor + 8..cursor + 16]) as usize;
            cursor += 16;
            self.data_col = codec::decompress_bytes(&mmap[cursor..cursor + z_len], raw_len)?;
        }
        self.columns_loaded = true;
        Ok(())
    }

    /// Reads the next block as stored: minimizer-less sequence, payload,
    /// and the recorded minimizer position.
    pub(crate) fn read_block_without_mini(
        &mut self,
        file: &mut KeroFile,
        seq: &mut [u8],
        data: &mut [u8],
    ) -> Result<Option<(u64, u64)>> {
        if self.cur_block >= self.nb_blocks {
            return Ok(None);
        }
        if self.cur_block == 0 {
            self.last_seq_pos = self.seq_col_offset;
            self.next_data_pos = 0;
            if !self.columns_loaded {
                self.load_columns_from_file(file)?;
            }
        }

        let idx = self.cur_block as usize;
        let nb_kmers = self.n_values[idx];
        let mini_pos = self.m_idxs[idx];

        if self.data_size > 0 {
            let nb = (self.data_size * nb_kmers) as usize;
            data[..nb].copy_from_slice(&self.data_col[self.next_data_pos..self.next_data_pos + nb]);
            self.next_data_pos += nb;
        }

        let seq_bytes = bit_bytes(2, nb_kmers + self.k - self.m - 1);
        file.buffer.jump_to(self.last_seq_pos)?;
        file.buffer.read(&mut seq[..seq_bytes])?;
        self.last_seq_pos += seq_bytes as u64;

        self.cur_block += 1;
        self.remaining_blocks -= 1;
        Ok(Some((nb_kmers, mini_pos)))
    }

    /// Reads the next block and splices the minimizer back in. `seq` must
    /// hold `ceil((nb_kmers + k - 1) / 4)` bytes.
    pub(crate) fn read_block(
        &mut self,
        file: &mut KeroFile,
        seq: &mut [u8],
        data: &mut [u8],
    ) -> Result<Option<u64>> {
        let Some((nb_kmers, mini_pos)) = self.read_block_without_mini(file, seq, data)? else {
            return Ok(None);
        };
        self.add_minimizer(nb_kmers, seq, mini_pos);
        Ok(Some(nb_kmers))
    }

    /// Reads the next block into one contiguous sequence-then-data buffer,
    /// shifting the payload right to open the hole the minimizer needs.
    pub(crate) fn read_block_into(
        &mut self,
        file: &mut KeroFile,
        seq_data: &mut [u8],
    ) -> Result<Option<u64>> {
        let mut seq = vec![0u8; bit_bytes(2, self.k + self.max - 1)];
        let mut data = vec![0u8; (self.max * self.data_size) as usize];
        let Some((nb_kmers, mini_pos)) = self.read_block_without_mini(file, &mut seq, &mut data)?
        else {
            return Ok(None);
        };

        let no_mini_nucl = nb_kmers + self.k - self.m - 1;
        let no_mini_bytes = bit_bytes(2, no_mini_nucl);
        let data_bytes = (self.data_size * nb_kmers) as usize;
        seq_data[..no_mini_bytes].copy_from_slice(&seq[..no_mini_bytes]);
        seq_data[no_mini_bytes..no_mini_bytes + data_bytes].copy_from_slice(&data[..data_bytes]);

        // open the hole the spliced minimizer will occupy
        let free_nucls = (4 - no_mini_nucl % 4) % 4;
        let hole_bytes = ((self.m + 3 - free_nucls) / 4) as usize;
        if hole_bytes > 0 {
            seq_data.copy_within(
                no_mini_bytes..no_mini_bytes + data_bytes,
                no_mini_bytes + hole_bytes,
            );
            seq_data[no_mini_bytes..no_mini_bytes + hole_bytes].fill(0);
        }

        self.add_minimizer(nb_kmers, seq_data, mini_pos);
        Ok(Some(nb_kmers))
    }

    pub(crate) fn jump_block(&mut self, file: &mut KeroFile) -> Result<()> {
        let mut seq = vec![0u8; bit_bytes(2, self.k + self.max - 1)];
        let mut data = vec![0u8; (self.max * self.data_size) as usize];
        self.read_block_without_mini(file, &mut seq, &mut data)?;
        Ok(())
    }

    fn write_section_header(&self, file: &mut KeroFile) -> Result<()> {
        file.buffer.write_u8(b'M')?;
        file.buffer.write(&self.minimizer)?;
        file.buffer.write_u64(self.nb_blocks)?;
        // column offset placeholders, backfilled after the columns land
        for _ in 0..4 {
            file.buffer.write_u64(0)?;
        }
        Ok(())
    }

    fn write_columns(&mut self, file: &mut KeroFile) -> Result<()> {
        self.n_col_offset = file.tell();
        let z = codec::encode_u64s(&self.n_values);
        file.buffer.write_u64(z.len() as u64)?;
        file.buffer.write(&z)?;

        self.m_idx_col_offset = file.tell();
        let z = codec::encode_u64s(&self.m_idxs);
        file.buffer.write_u64(z.len() as u64)?;
        file.buffer.write(&z)?;

        self.data_col_offset = file.tell();
        file.buffer.write_u64(self.data_col.len() as u64)?;
        let z = codec::compress_bytes(&self.data_col)?;
        file.buffer.write_u64(z.len() as u64)?;
        file.buffer.write(&z)?;

        self.seq_col_offset = file.tell();
        file.buffer.write(&self.seq_col)?;
        Ok(())
    }

    fn backfill_column_offsets(&self, file: &mut KeroFile) -> Result<()> {
        let base = self.start_pos + 1 + self.nb_bytes_mini as u64 + 8;
        file.buffer
            .write_u64_at(self.n_col_offset - self.start_pos, base)?;
        file.buffer
            .write_u64_at(self.m_idx_col_offset - self.start_pos, base + 8)?;
        file.buffer
            .write_u64_at(self.data_col_offset - self.start_pos, base + 16)?;
        file.buffer
            .write_u64_at(self.seq_col_offset - self.start_pos, base + 24)?;
        Ok(())
    }

    pub(crate) fn close(&mut self, file: &mut KeroFile) -> Result<()> {
        if file.is_writer() {
            file.register_minimizer_section(mask_minimizer(&self.minimizer, self.m));
            file.register_position(b'M');
            self.write_section_header(file)?;
            self.write_columns(file)?;
            self.backfill_column_offsets(file)?;
        }
        if file.is_reader() {
            if self.nb_blocks == 0 {
                // the empty columns still occupy bytes; skip to the section end
                file.buffer.jump_to(self.seq_col_offset)?;
            }
            while self.remaining_blocks > 0 {
                self.jump_block(file)?;
            }
        }
        Ok(())
    }
}

/// Manipulator for one minimizer section.
pub struct SectionMinimizer<'a> {
    file: &'a mut KeroFile,
    blocks: MinimizerBlocks,
}

impl<'a> SectionMinimizer<'a> {
    /// Opens a minimizer section. Requires `k`, `m`, `max` and `data_size`
    /// in the file-wide variable table.
    pub fn new(file: &'a mut KeroFile) -> Result<Self> {
        let blocks = MinimizerBlocks::open(file)?;
        Ok(Self { file, blocks })
    }

    #[must_use]
    pub fn nb_blocks(&self) -> u64 {
        self.blocks.nb_blocks
    }

    /// The packed minimizer shared by every block of the section.
    #[must_use]
    pub fn minimizer(&self) -> &[u8] {
        self.blocks.minimizer()
    }

    /// Stores the section minimizer; it is written into the header when the
    /// section closes.
    pub fn write_minimizer(&mut self, minimizer: &[u8]) {
        self.blocks.set_minimizer(minimizer);
    }

    /// Writes one block from a full super-k-mer of `seq_size` nucleotides
    /// containing the minimizer at `mini_pos`; the minimizer is extracted
    /// before storage.
    pub fn write_compacted_sequence(
        &mut self,
        seq: &[u8],
        seq_size: u64,
        mini_pos: u64,
        data: &[u8],
    ) {
        self.blocks.write_block(seq, seq_size, mini_pos, data);
    }

    /// Writes one block whose sequence (of `seq_size` nucleotides) already
    /// lacks the minimizer.
    pub fn write_compacted_sequence_without_mini(
        &mut self,
        seq: &[u8],
        seq_size: u64,
        mini_pos: u64,
        data: &[u8],
    ) {
        self.blocks
            .write_block_without_mini(seq, seq_size, mini_pos, data);
    }

    /// Reads the next block with the minimizer spliced back in, returning
    /// its k-mer count. `seq` must hold the full super-k-mer packing.
    pub fn read_compacted_sequence(
        &mut self,
        seq: &mut [u8],
        data: &mut [u8],
    ) -> Result<Option<u64>> {
        self.blocks.read_block(self.file, seq, data)
    }

    /// Reads the next block as stored, returning its k-mer count and the
    /// recorded minimizer position.
    pub fn read_compacted_sequence_without_mini(
        &mut self,
        seq: &mut [u8],
        data: &mut [u8],
    ) -> Result<Option<(u64, u64)>> {
        self.blocks.read_block_without_mini(self.file, seq, data)
    }

    /// Splices the section minimizer into a minimizer-less packing; the
    /// inverse of the extraction done by
    /// [`Self::write_compacted_sequence`].
    pub fn add_minimizer(&self, nb_kmers: u64, seq: &mut [u8], mini_pos: u64) {
        self.blocks.add_minimizer(nb_kmers, seq, mini_pos);
    }

    /// Decodes the compressed columns from a memory-mapped copy of the
    /// file; a second call is a no-op.
    pub fn precache_columns_from_mmap(&mut self, mmap: &[u8]) -> Result<()> {
        self.blocks.precache_columns(mmap)
    }

    /// Skips the next block.
    pub fn jump_sequence(&mut self) -> Result<()> {
        self.blocks.jump_block(self.file)
    }

    /// Copies the remaining blocks, as stored, into a new minimizer section
    /// on another file, which must already hold the same `k`, `m`, `max`
    /// and `data_size`.
    pub fn copy(&mut self, dest: &mut KeroFile) -> Result<()> {
        let mut out = MinimizerBlocks::open(dest)?;
        out.set_minimizer(self.blocks.minimizer());
        let mut seq = vec![0u8; bit_bytes(2, self.blocks.k + self.blocks.max - 1)];
        let mut data = vec![0u8; (self.blocks.max * self.blocks.data_size) as usize];
        while let Some((nb_kmers, mini_pos)) =
            self.blocks
                .read_block_without_mini(self.file, &mut seq, &mut data)?
        {
            let seq_size = nb_kmers + self.blocks.k - self.blocks.m - 1;
            out.write_block_without_mini(&seq, seq_size, mini_pos, &data);
        }
        out.close(dest)
    }

    /// Closes the section. A writer registers its minimizer with the file,
    /// writes the header and columns, and backfills the column offsets.
    pub fn close(mut self) -> Result<()> {
        self.blocks.close(self.file)
    }
}
