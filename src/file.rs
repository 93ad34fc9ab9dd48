//! The low-level KERO file object.
//!
//! A [`KeroFile`] owns the backing stream (through the hybrid
//! [`buffer`](crate::buffer)), the header state, the file-wide variable
//! table, and the bookkeeping that the closing protocol turns into the
//! hashtable, index and footer sections. Section manipulators borrow the
//! file mutably for their lifetime; only one section may be active at a
//! time.
//!
//! ## Closing protocol
//!
//! Closing a writer with indexing enabled (the default) appends, in order: a
//! hashtable section built over every minimizer registered by the closed
//! minimizer sections, an index section listing the start offset of every
//! section, and a terminal global-variable section (the footer) holding
//! `first_index` and `footer_size`. The trailing `KERO` signature follows.
//!
//! ## Discovery
//!
//! Opening a reader verifies both signatures and the version gate, then
//! looks just before the trailing signature for the footer's `footer_size`
//! variable. When present, the footer locates the first index section and
//! the whole index chain is loaded up front, giving random access by
//! section offset without touching the section bodies.

use std::collections::BTreeMap;
use std::path::Path;

use crate::buffer::FileBuffer;
use crate::error::{HeaderError, Result, SectionError};
use crate::section::hashtable::HashtableData;
use crate::section::index::IndexData;
use crate::section::{
    BlockReader, SectionGv, SectionHashtable, SectionIndex, SectionType,
};
use crate::{DEFAULT_ENCODING, SIGNATURE, VERSION_MAJOR, VERSION_MINOR};

/// Size of the footer GV section: tag + count + two entries of
/// (12-byte NUL-terminated name + u64 value)
const FOOTER_SIZE: u64 = 9 + 2 * (12 + 8);

/// The central manipulator for a KERO file, in either writing or reading
/// mode.
pub struct KeroFile {
    pub(crate) buffer: FileBuffer,

    /// True once the header (including metadata) has been fully written or
    /// skipped and the stream points at the first section
    pub(crate) header_over: bool,
    /// Suppresses the header barrier while the tail of the file is being
    /// probed during discovery
    in_discovery: bool,

    major: u8,
    minor: u8,
    uniqueness: bool,
    canonicity: bool,
    encoding: [u8; 4],
    metadata_size: u32,

    /// Position of the trailing signature; the logical end of section data
    end_position: u64,

    /// File-wide variables accumulated from every GV section seen so far
    pub(crate) global_vars: BTreeMap<String, u64>,

    indexed: bool,
    /// Start offset and type tag of every section written so far
    section_positions: BTreeMap<u64, u8>,
    /// Minimizer keys and section offsets for the hashtable section
    mini_list: Vec<u64>,
    mini_pos: Vec<u64>,

    /// Variables of the footer GV, when one was discovered
    footer: Option<BTreeMap<String, u64>>,
    /// Raw content of every index section in the chain
    index_sections: Vec<IndexData>,
    /// Index entries resolved to absolute offsets
    sections_by_offset: BTreeMap<u64, u8>,
    /// Lazily loaded hashtable section
    hashtable: Option<HashtableData>,
}

impl KeroFile {
    /// Opens a file in writing mode, emitting the signature and the fixed
    /// header fields (default encoding, flags cleared). Indexing is enabled
    /// by default.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = Self::with_buffer(FileBuffer::create(path));
        file.indexed = true;

        let header = [
            SIGNATURE[0],
            SIGNATURE[1],
            SIGNATURE[2],
            SIGNATURE[3],
            VERSION_MAJOR,
            VERSION_MINOR,
            DEFAULT_ENCODING,
            0, // uniqueness
            0, // canonicity
        ];
        file.buffer.write(&header)?;
        Ok(file)
    }

    /// Opens an existing file in reading mode: verifies both signatures and
    /// the version, loads the header, then discovers the footer and the
    /// index chain.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = Self::with_buffer(FileBuffer::open(path)?);

        let mut sig = [0u8; 4];
        file.buffer.read(&mut sig)?;
        if &sig != SIGNATURE {
            return Err(HeaderError::MissingSignature("beginning").into());
        }

        file.major = file.buffer.read_u8()?;
        file.minor = file.buffer.read_u8()?;
        if (file.major, file.minor) > (VERSION_MAJOR, VERSION_MINOR) {
            return Err(HeaderError::UnsupportedVersion {
                major: file.major,
                minor: file.minor,
            }
            .into());
        }

        file.encoding = decode_encoding(file.buffer.read_u8()?)?;
        file.uniqueness = file.buffer.read_u8()? != 0;
        file.canonicity = file.buffer.read_u8()? != 0;
        file.metadata_size = file.buffer.read_u32()?;

        // trailing signature
        let saved = file.buffer.tell();
        file.buffer.jump_to_from_end(4)?;
        file.end_position = file.buffer.tell();
        file.buffer.read(&mut sig)?;
        if &sig != SIGNATURE {
            return Err(HeaderError::MissingSignature("end").into());
        }
        file.buffer.jump_to(saved)?;

        file.footer_discovery()?;
        file.index_discovery()?;
        Ok(file)
    }

    fn with_buffer(buffer: FileBuffer) -> Self {
        Self {
            buffer,
            header_over: false,
            in_discovery: false,
            major: VERSION_MAJOR,
            minor: VERSION_MINOR,
            uniqueness: false,
            canonicity: false,
            encoding: [0, 1, 3, 2], // decoded form of DEFAULT_ENCODING
            metadata_size: 0,
            end_position: 0,
            global_vars: BTreeMap::new(),
            indexed: false,
            section_positions: BTreeMap::new(),
            mini_list: Vec::new(),
            mini_pos: Vec::new(),
            footer: None,
            index_sections: Vec::new(),
            sections_by_offset: BTreeMap::new(),
            hashtable: None,
        }
    }

    // --- header ---

    /// Sets the 2-bit code of each nucleotide. The four codes must be
    /// pairwise distinct; only the two low bits of each argument are used.
    pub fn set_encoding(&mut self, a: u8, c: u8, g: u8, t: u8) -> Result<()> {
        let code = ((a & 0b11) << 6) | ((c & 0b11) << 4) | ((g & 0b11) << 2) | (t & 0b11);
        self.encoding = decode_encoding(code)?;
        self.buffer.write_at(&[code], 6)
    }

    /// Declares that no k-mer occurs twice in the file.
    pub fn set_uniqueness(&mut self, uniqueness: bool) -> Result<()> {
        self.uniqueness = uniqueness;
        self.buffer.write_at(&[u8::from(uniqueness)], 7)
    }

    /// Declares that no k-mer and its reverse complement are both present.
    pub fn set_canonicity(&mut self, canonicity: bool) -> Result<()> {
        self.canonicity = canonicity;
        self.buffer.write_at(&[u8::from(canonicity)], 8)
    }

    /// Writes the free-form metadata block, sealing the header. Must happen
    /// before the first section.
    pub fn write_metadata(&mut self, data: &[u8]) -> Result<()> {
        if self.header_over {
            return Err(HeaderError::MetadataAfterHeader.into());
        }
        self.metadata_size = data.len() as u32;
        self.buffer.write_u32(self.metadata_size)?;
        self.buffer.write(data)?;
        self.header_over = true;
        Ok(())
    }

    /// Reads the metadata block. The stream must still be positioned at the
    /// start of the metadata (right after opening).
    pub fn read_metadata(&mut self) -> Result<Vec<u8>> {
        let mut data = vec![0u8; self.metadata_size as usize];
        self.buffer.read(&mut data)?;
        self.header_over = true;
        Ok(data)
    }

    /// Barrier advancing past the metadata block on either side. Forced
    /// before any section I/O.
    pub fn complete_header(&mut self) -> Result<()> {
        if self.header_over {
            return Ok(());
        }
        if self.buffer.is_reader() {
            self.buffer.jump(i64::from(self.metadata_size))?;
            self.header_over = true;
        } else {
            self.write_metadata(&[])?;
        }
        Ok(())
    }

    /// Called by every section constructor: completes the header unless the
    /// file tail is being probed during discovery.
    pub(crate) fn prepare_section(&mut self) -> Result<()> {
        if !self.header_over && !self.in_discovery {
            self.complete_header()?;
        }
        Ok(())
    }

    // --- accessors ---

    /// The per-file nucleotide encoding table `[A, C, G, T]`.
    #[must_use]
    pub fn encoding(&self) -> [u8; 4] {
        self.encoding
    }

    /// Format version of the file, `(major, minor)`.
    #[must_use]
    pub fn version(&self) -> (u8, u8) {
        (self.major, self.minor)
    }

    #[must_use]
    pub fn uniqueness(&self) -> bool {
        self.uniqueness
    }

    #[must_use]
    pub fn canonicity(&self) -> bool {
        self.canonicity
    }

    #[must_use]
    pub fn metadata_size(&self) -> u32 {
        self.metadata_size
    }

    /// Looks up a file-wide variable declared by some GV section.
    #[must_use]
    pub fn var(&self, name: &str) -> Option<u64> {
        self.global_vars.get(name).copied()
    }

    pub(crate) fn require_var(&self, name: &'static str) -> Result<u64> {
        self.var(name)
            .ok_or_else(|| SectionError::MissingVariable(name).into())
    }

    /// The variables of the footer GV, when the file carries one.
    #[must_use]
    pub fn footer(&self) -> Option<&BTreeMap<String, u64>> {
        self.footer.as_ref()
    }

    /// Index entries resolved to absolute offsets, mapping each section
    /// start to its type tag.
    #[must_use]
    pub fn indexed_sections(&self) -> &BTreeMap<u64, u8> {
        &self.sections_by_offset
    }

    /// Raw content of every index section discovered in the file.
    #[must_use]
    pub fn index_sections(&self) -> &[IndexData] {
        &self.index_sections
    }

    #[must_use]
    pub fn is_writer(&self) -> bool {
        self.buffer.is_writer()
    }

    #[must_use]
    pub fn is_reader(&self) -> bool {
        self.buffer.is_reader()
    }

    /// Current position in the logical file.
    #[must_use]
    pub fn tell(&self) -> u64 {
        self.buffer.tell()
    }

    /// Logical file length, buffered tail included.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.buffer.size()
    }

    /// Position of the trailing signature (reading mode).
    #[must_use]
    pub fn end_position(&self) -> u64 {
        self.end_position
    }

    /// Relative jump; negative deltas move backwards.
    pub fn jump(&mut self, delta: i64) -> Result<()> {
        self.buffer.jump(delta)
    }

    /// Absolute jump. With `from_end`, `position` counts back from the
    /// logical end of the file.
    pub fn jump_to(&mut self, position: u64, from_end: bool) -> Result<()> {
        if from_end {
            self.buffer.jump_to_from_end(position)
        } else {
            self.buffer.jump_to(position)
        }
    }

    /// Releases the OS handle to relieve descriptor pressure; logical state
    /// is kept and the next disk access reopens the file.
    pub fn tmp_close(&mut self) {
        self.buffer.tmp_close();
    }

    /// Restores a handle released by [`Self::tmp_close`].
    pub fn reopen(&mut self) -> Result<()> {
        self.buffer.reopen()
    }

    // --- indexing ---

    /// Enables or disables generation of the hashtable/index/footer trailer.
    /// Only allowed before the first section.
    pub fn set_indexed(&mut self, indexed: bool) -> Result<()> {
        if self.header_over {
            return Err(SectionError::IndexingToggledMidStream.into());
        }
        if self.buffer.is_writer() {
            self.indexed = indexed;
        }
        Ok(())
    }

    #[must_use]
    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    /// Records the current position as the start of a section of the given
    /// type, for the index written on close.
    pub(crate) fn register_position(&mut self, section_type: u8) {
        if self.buffer.is_writer() && self.indexed {
            self.section_positions.insert(self.tell(), section_type);
        }
    }

    /// Records a minimizer key and the current position (the start of its
    /// section), for the hashtable written on close.
    pub(crate) fn register_minimizer_section(&mut self, minimizer: u64) {
        if self.buffer.is_writer() && self.indexed {
            self.mini_list.push(minimizer);
            self.mini_pos.push(self.tell());
        }
    }

    // --- section stream ---

    /// Peeks the type of the section starting at the current position.
    pub fn peek_section_type(&mut self) -> Result<SectionType> {
        self.prepare_section()?;
        SectionType::from_tag(self.buffer.peek_u8()?)
    }

    /// Skips the next section if it is a block section (`r` or `M`).
    /// Returns whether a section was skipped.
    pub fn jump_next_section(&mut self) -> Result<bool> {
        if !self.buffer.is_reader() {
            return Ok(false);
        }
        self.prepare_section()?;
        if self.tell() >= self.end_position {
            return Ok(false);
        }
        match SectionType::from_tag(self.buffer.peek_u8()?) {
            Ok(SectionType::Raw) | Ok(SectionType::Minimizer) => {
                let mut block = BlockReader::open(self)?;
                block.close(self)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    // --- lookup ---

    /// Resolves a minimizer key to the offset of its section through the
    /// embedded hashtable, loading the hashtable section on first use.
    /// Returns `None` when the file has no hashtable or the key was never
    /// registered.
    pub fn lookup_minimizer(&mut self, key: u64) -> Result<Option<u64>> {
        if self.hashtable.is_none() {
            let offset = self
                .sections_by_offset
                .iter()
                .find(|(_, &tag)| tag == b'h')
                .map(|(&offset, _)| offset);
            let Some(offset) = offset else {
                return Ok(None);
            };
            let saved = self.tell();
            self.buffer.jump_to(offset)?;
            let data = SectionHashtable::new(self)?.into_data();
            self.buffer.jump_to(saved)?;
            self.hashtable = Some(data);
        }
        Ok(self.hashtable.as_ref().and_then(|table| table.lookup(key)))
    }

    // --- closing protocol ---

    /// Finalizes the file. A writer appends the hashtable/index/footer
    /// trailer (when indexed) and the trailing signature, then flushes the
    /// buffered tail to disk.
    pub fn close(&mut self) -> Result<()> {
        if self.buffer.is_writer() {
            if self.indexed {
                self.write_footer()?;
            }
            self.buffer.write(SIGNATURE)?;
            self.buffer.flush_tail()?;
        }
        self.buffer.close();
        Ok(())
    }

    /// Closes without flushing; whatever already reached the disk is
    /// removed when the file is dropped.
    pub fn discard(&mut self) {
        self.buffer.delete_on_drop();
        self.buffer.close();
    }

    fn write_footer(&mut self) -> Result<()> {
        // hashtable over every registered minimizer section
        let minimizers = std::mem::take(&mut self.mini_list);
        let positions = std::mem::take(&mut self.mini_pos);
        let mut hashtable = SectionHashtable::new(self)?;
        for (&key, &position) in minimizers.iter().zip(&positions) {
            hashtable.register(key, position);
        }
        hashtable.close()?;

        // index section; entry offsets are relative to its own end
        let section_positions = std::mem::take(&mut self.section_positions);
        let mut index = SectionIndex::new(self)?;
        let first_index = index.beginning();
        let index_end = first_index + 17 + 9 * section_positions.len() as u64;
        for (&position, &tag) in &section_positions {
            index.register_section(tag, position as i64 - index_end as i64);
        }
        index.close()?;

        // footer GV locating the index
        let mut footer = SectionGv::new(self)?;
        footer.write_var("first_index", first_index);
        footer.write_var("footer_size", FOOTER_SIZE);
        footer.close()?;
        Ok(())
    }

    // --- discovery ---

    fn footer_discovery(&mut self) -> Result<()> {
        // name + NUL + value + trailing signature
        let probe = 11 + 1 + 8 + 4;
        if self.size() < probe {
            return Ok(());
        }
        let saved = self.tell();
        self.in_discovery = true;

        self.buffer.jump_to_from_end(probe)?;
        let mut name = [0u8; 11];
        self.buffer.read(&mut name)?;
        if &name != b"footer_size" {
            self.in_discovery = false;
            self.buffer.jump_to(saved)?;
            return Ok(());
        }
        self.buffer.jump(1)?; // NUL terminator
        let footer_size = self.buffer.read_u64()?;

        // the footer GV sits right before the trailing signature
        self.buffer.jump_to_from_end(footer_size + 4)?;
        let footer = SectionGv::new(self)?;
        let vars = footer.vars().clone();
        footer.close()?;
        self.footer = Some(vars);

        self.in_discovery = false;
        self.buffer.jump_to(saved)
    }

    fn index_discovery(&mut self) -> Result<()> {
        let saved = self.tell();
        let header_over = self.header_over;
        self.complete_header()?;

        let first_index = self
            .footer
            .as_ref()
            .and_then(|vars| vars.get("first_index"))
            .copied();
        if let Some(position) = first_index {
            self.indexed = true;
            self.read_index(position)?;
        }

        // no footer: probe the first section for an index
        if !self.indexed && self.tell() < self.end_position {
            if self.buffer.peek_u8()? == b'i' {
                self.indexed = true;
                let position = self.tell();
                self.read_index(position)?;
            }
        }

        self.header_over = header_over;
        self.buffer.jump_to(saved)
    }

    fn read_index(&mut self, mut position: u64) -> Result<()> {
        while position != 0 {
            self.buffer.jump_to(position)?;
            let data = SectionIndex::new(self)?.into_data();
            let end = self.tell();

            for (&relative, &tag) in &data.entries {
                let absolute = end
                    .checked_add_signed(relative)
                    .ok_or(SectionError::CorruptIndexOffset(relative))?;
                self.sections_by_offset.insert(absolute, tag);
            }
            position = match data.next_index {
                0 => 0,
                next => end
                    .checked_add_signed(next)
                    .ok_or(SectionError::CorruptIndexOffset(next))?,
            };
            self.index_sections.push(data);
        }
        Ok(())
    }
}

impl Drop for KeroFile {
    fn drop(&mut self) {
        if self.buffer.is_writer() {
            let _ = self.close();
        }
    }
}

/// Splits an encoding byte into the four 2-bit codes, verifying that they
/// are pairwise distinct.
fn decode_encoding(code: u8) -> Result<[u8; 4]> {
    let encoding = [
        (code >> 6) & 0b11,
        (code >> 4) & 0b11,
        (code >> 2) & 0b11,
        code & 0b11,
    ];
    for i in 0..3 {
        for j in i + 1..4 {
            if encoding[i] == encoding[j] {
                return Err(HeaderError::DegenerateEncoding(code).into());
            }
        }
    }
    Ok(encoding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tempfile::tempdir;

    #[test]
    fn test_empty_file_header_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.kero");

        let mut file = KeroFile::create(&path).unwrap();
        file.set_encoding(0, 1, 3, 2).unwrap();
        file.write_metadata(&[]).unwrap();
        file.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let expected_prefix = [
            b'K', b'E', b'R', b'O', 0x00, 0x01, 0x1E, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        assert_eq!(&bytes[..13], &expected_prefix);
        assert_eq!(&bytes[bytes.len() - 4..], b"KERO");
    }

    #[test]
    fn test_header_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("header.kero");

        let mut file = KeroFile::create(&path).unwrap();
        file.set_encoding(2, 0, 1, 3).unwrap();
        file.set_uniqueness(true).unwrap();
        file.set_canonicity(true).unwrap();
        file.write_metadata(b"sample metadata").unwrap();
        file.close().unwrap();

        let mut file = KeroFile::open(&path).unwrap();
        assert_eq!(file.version(), (0, 1));
        assert_eq!(file.encoding(), [2, 0, 1, 3]);
        assert!(file.uniqueness());
        assert!(file.canonicity());
        assert_eq!(file.read_metadata().unwrap(), b"sample metadata");
    }

    #[test]
    fn test_degenerate_encoding_rejected() {
        let dir = tempdir().unwrap();
        let mut file = KeroFile::create(dir.path().join("bad.kero")).unwrap();
        let result = file.set_encoding(0, 0, 1, 2);
        assert!(matches!(
            result,
            Err(Error::Header(HeaderError::DegenerateEncoding(_)))
        ));
        file.discard();
    }

    #[test]
    fn test_version_gate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("future.kero");

        let mut file = KeroFile::create(&path).unwrap();
        file.write_metadata(&[]).unwrap();
        file.close().unwrap();

        // bump the major version to 99
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[4] = 99;
        std::fs::write(&path, &bytes).unwrap();

        let result = KeroFile::open(&path);
        assert!(matches!(
            result,
            Err(Error::Header(HeaderError::UnsupportedVersion { major: 99, .. }))
        ));
    }

    #[test]
    fn test_trailing_signature_corruption() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corrupt.kero");

        let mut file = KeroFile::create(&path).unwrap();
        file.write_metadata(&[]).unwrap();
        file.close().unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let result = KeroFile::open(&path);
        assert!(matches!(
            result,
            Err(Error::Header(HeaderError::MissingSignature("end")))
        ));
    }

    #[test]
    fn test_leading_signature_corruption() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nosig.kero");
        std::fs::write(&path, b"NOPEnope").unwrap();

        let result = KeroFile::open(&path);
        assert!(matches!(
            result,
            Err(Error::Header(HeaderError::MissingSignature("beginning")))
        ));
    }

    #[test]
    fn test_metadata_after_header_rejected() {
        let dir = tempdir().unwrap();
        let mut file = KeroFile::create(dir.path().join("meta.kero")).unwrap();
        file.write_metadata(b"once").unwrap();
        assert!(file.write_metadata(b"twice").is_err());
        file.discard();
    }

    #[test]
    fn test_set_indexed_after_header_rejected() {
        let dir = tempdir().unwrap();
        let mut file = KeroFile::create(dir.path().join("toggle.kero")).unwrap();
        file.set_indexed(false).unwrap();
        file.set_indexed(true).unwrap();
        file.write_metadata(&[]).unwrap();
        assert!(file.set_indexed(false).is_err());
        file.discard();
    }

    #[test]
    fn test_footer_discovered_on_indexed_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("footer.kero");

        let mut file = KeroFile::create(&path).unwrap();
        file.write_metadata(&[]).unwrap();
        file.close().unwrap();

        let file = KeroFile::open(&path).unwrap();
        let footer = file.footer().expect("footer should be discovered");
        assert!(footer.contains_key("first_index"));
        assert_eq!(footer.get("footer_size"), Some(&FOOTER_SIZE));
    }

    #[test]
    fn test_unindexed_file_has_no_footer() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plain.kero");

        let mut file = KeroFile::create(&path).unwrap();
        file.set_indexed(false).unwrap();
        file.write_metadata(&[]).unwrap();
        file.close().unwrap();

        let file = KeroFile::open(&path).unwrap();
        assert!(file.footer().is_none());
        assert!(file.indexed_sections().is_empty());
    }

    #[test]
    fn test_hashtable_lookup_after_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lookup.kero");

        let mut file = KeroFile::create(&path).unwrap();
        file.write_metadata(&[]).unwrap();
        let mut gv = crate::SectionGv::new(&mut file).unwrap();
        gv.write_var("k", 6);
        gv.write_var("m", 4);
        gv.write_var("max", 8);
        gv.write_var("data_size", 0);
        gv.close().unwrap();

        // three minimizer sections in arbitrary key order
        let mut offsets = BTreeMap::new();
        for minimizer in [0x02u8, 0x01, 0x03] {
            offsets.insert(minimizer, file.tell());
            let mut section = crate::SectionMinimizer::new(&mut file).unwrap();
            section.write_minimizer(&[minimizer]);
            section.write_compacted_sequence_without_mini(&[0b0000_0110], 2, 0, &[]);
            section.close().unwrap();
        }
        file.close().unwrap();

        let mut file = KeroFile::open(&path).unwrap();
        for minimizer in [0x01u8, 0x02, 0x03] {
            assert_eq!(
                file.lookup_minimizer(u64::from(minimizer)).unwrap(),
                Some(offsets[&minimizer]),
            );
        }
    }

    #[test]
    fn test_index_lists_every_section() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("complete.kero");

        let mut file = KeroFile::create(&path).unwrap();
        file.write_metadata(&[]).unwrap();

        let gv_offset = file.tell();
        let mut gv = crate::SectionGv::new(&mut file).unwrap();
        gv.write_var("k", 4);
        gv.write_var("m", 2);
        gv.write_var("max", 4);
        gv.write_var("data_size", 1);
        gv.close().unwrap();

        let raw_offset = file.tell();
        let mut raw = crate::SectionRaw::new(&mut file).unwrap();
        raw.write_compacted_sequence(&[0b0001_1110], 4, &[42]).unwrap();
        raw.close().unwrap();

        let mini_offset = file.tell();
        let mut section = crate::SectionMinimizer::new(&mut file).unwrap();
        section.write_minimizer(&[0b0000_0001]);
        section.write_compacted_sequence_without_mini(&[0b0000_0110], 2, 0, &[7]);
        section.close().unwrap();
        file.close().unwrap();

        let file = KeroFile::open(&path).unwrap();
        let sections = file.indexed_sections();
        assert_eq!(sections.get(&gv_offset), Some(&b'v'));
        assert_eq!(sections.get(&raw_offset), Some(&b'r'));
        assert_eq!(sections.get(&mini_offset), Some(&b'M'));
        // the hashtable section indexes itself as well
        assert_eq!(sections.values().filter(|&&tag| tag == b'h').count(), 1);
        assert_eq!(sections.len(), 4);
    }

    #[test]
    fn test_reader_unaffected_by_writer_spill() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("spilled.kero");

        // metadata large enough to force the tail through its 1 MiB ceiling
        let metadata: Vec<u8> = (0..=255u8).cycle().take(3 * 1024 * 1024).collect();
        let mut file = KeroFile::create(&path).unwrap();
        file.set_encoding(0, 1, 3, 2).unwrap();
        file.write_metadata(&metadata).unwrap();
        let mut gv = crate::SectionGv::new(&mut file).unwrap();
        gv.write_var("k", 17);
        gv.close().unwrap();
        file.close().unwrap();

        let mut file = KeroFile::open(&path).unwrap();
        assert_eq!(file.encoding(), [0, 1, 3, 2]);
        assert_eq!(file.read_metadata().unwrap(), metadata);
        let gv = crate::SectionGv::new(&mut file).unwrap();
        assert_eq!(gv.vars().get("k"), Some(&17));
        gv.close().unwrap();
    }

    #[test]
    fn test_discarded_file_removed_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("discard.kero");
        {
            let mut file = KeroFile::create(&path).unwrap();
            // spill enough that something reaches the disk
            file.write_metadata(&vec![0u8; 2 * 1024 * 1024]).unwrap();
            assert!(path.exists());
            file.discard();
        }
        assert!(!path.exists());
    }
}
