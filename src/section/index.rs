//! Index sections.
//!
//! An `i` section lists the start offset and type tag of the sections
//! written before it. Offsets are stored as signed i64 values relative to
//! the end of the index section itself, so a file can be prepended to
//! without rewriting the entries. Index sections form a forward-linked
//! chain through `next_index` (relative offset of the next index section,
//! 0 when there is none).
//!
//! On-disk layout: `i`, count (u64), count repetitions of (tag byte,
//! offset i64), next_index (i64).

use std::collections::BTreeMap;

use crate::error::{Result, SectionError};
use crate::file::KeroFile;

use super::expect_tag;

/// Parsed content of one index section.
#[derive(Debug, Clone, Default)]
pub struct IndexData {
    /// Relative offset to section-type entries, sorted by offset
    pub entries: BTreeMap<i64, u8>,
    /// Relative offset of the next index section, 0 for the last one
    pub next_index: i64,
}

/// Manipulator for one index section.
pub struct SectionIndex<'a> {
    file: &'a mut KeroFile,
    beginning: u64,
    data: IndexData,
}

impl<'a> SectionIndex<'a> {
    /// Opens an index section. Reading mode parses the whole section,
    /// rejecting duplicate offsets as corruption.
    pub fn new(file: &'a mut KeroFile) -> Result<Self> {
        file.prepare_section()?;
        let beginning = file.tell();
        let mut section = Self {
            file,
            beginning,
            data: IndexData::default(),
        };
        if section.file.is_reader() {
            section.read_section()?;
        }
        Ok(section)
    }

    fn read_section(&mut self) -> Result<()> {
        expect_tag(self.file, b'i')?;
        let count = self.file.buffer.read_u64()?;
        for _ in 0..count {
            let tag = self.file.buffer.read_u8()?;
            let offset = self.file.buffer.read_i64()?;
            if self.data.entries.insert(offset, tag).is_some() {
                return Err(SectionError::DuplicateIndexOffset(offset).into());
            }
        }
        self.data.next_index = self.file.buffer.read_i64()?;
        Ok(())
    }

    /// Registers a section under its offset relative to this index's end.
    pub fn register_section(&mut self, section_type: u8, offset: i64) {
        self.data.entries.insert(offset, section_type);
    }

    /// Links this index to a following one.
    pub fn set_next_index(&mut self, offset: i64) {
        self.data.next_index = offset;
    }

    /// File offset of the section tag.
    #[must_use]
    pub fn beginning(&self) -> u64 {
        self.beginning
    }

    /// The parsed or accumulated entries.
    #[must_use]
    pub fn entries(&self) -> &BTreeMap<i64, u8> {
        &self.data.entries
    }

    #[must_use]
    pub fn next_index(&self) -> i64 {
        self.data.next_index
    }

    /// Releases the borrow on the file, keeping the parsed content.
    #[must_use]
    pub fn into_data(self) -> IndexData {
        self.data
    }

    /// Closes the section. A writer emits the whole section here: tag,
    /// count, sorted entries, forward link.
    pub fn close(self) -> Result<()> {
        if self.file.is_writer() {
            self.file.buffer.write_u8(b'i')?;
            self.file.buffer.write_u64(self.data.entries.len() as u64)?;
            for (&offset, &tag) in &self.data.entries {
                self.file.buffer.write_u8(tag)?;
                self.file.buffer.write_i64(offset)?;
            }
            self.file.buffer.write_i64(self.data.next_index)?;
        }
        Ok(())
    }
}
