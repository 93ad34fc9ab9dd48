//! Hashtable sections.
//!
//! The `h` section embeds a minimal perfect hash function over every
//! minimizer key in the file together with a position table, so a reader
//! can jump straight to the minimizer section holding a given minimizer.
//! It is built on file close from the (key, offset) pairs each minimizer
//! section registered when it closed.
//!
//! On-disk layout: `h`, mphf_len (u64), mphf bytes, table_len (u64),
//! table_len big-endian u64 positions.

use crate::error::Result;
use crate::file::KeroFile;
use crate::mphf::MiniMphf;

use super::expect_tag;

/// The loaded content of a hashtable section: the hash function plus the
/// position table it indexes into.
pub struct HashtableData {
    mphf: Option<MiniMphf>,
    /// Section offsets, indexed by `mphf(key)`
    pub table: Vec<u64>,
}

impl HashtableData {
    /// Resolves a minimizer key to the offset of its section. `None` when
    /// the table is empty or the key falls outside the hash range.
    #[must_use]
    pub fn lookup(&self, key: u64) -> Option<u64> {
        let index = self.mphf.as_ref()?.lookup(key)?;
        self.table.get(index as usize).copied()
    }
}

/// Manipulator for the hashtable section.
pub struct SectionHashtable<'a> {
    file: &'a mut KeroFile,
    beginning: u64,
    minimizers: Vec<u64>,
    positions: Vec<u64>,
    data: HashtableData,
}

impl<'a> SectionHashtable<'a> {
    /// Opens a hashtable section. Reading mode deserializes the MPHF and
    /// loads the position table; writing mode collects registrations until
    /// [`Self::close`].
    pub fn new(file: &'a mut KeroFile) -> Result<Self> {
        file.prepare_section()?;
        let beginning = file.tell();
        let mut section = Self {
            file,
            beginning,
            minimizers: Vec::new(),
            positions: Vec::new(),
            data: HashtableData {
                mphf: None,
                table: Vec::new(),
            },
        };
        if section.file.is_reader() {
            section.read_section()?;
        }
        Ok(section)
    }

    fn read_section(&mut self) -> Result<()> {
        expect_tag(self.file, b'h')?;

        let mphf_len = self.file.buffer.read_u64()? as usize;
        let mut mphf_bytes = vec![0u8; mphf_len];
        self.file.buffer.read(&mut mphf_bytes)?;
        self.data.mphf = Some(MiniMphf::from_bytes(&mphf_bytes)?);

        let table_len = self.file.buffer.read_u64()? as usize;
        self.data.table.reserve(table_len);
        for _ in 0..table_len {
            self.data.table.push(self.file.buffer.read_u64()?);
        }
        Ok(())
    }

    /// Registers a minimizer key and the offset of its section.
    pub fn register(&mut self, minimizer: u64, position: u64) {
        self.minimizers.push(minimizer);
        self.positions.push(position);
    }

    /// Resolves a key against a section loaded in reading mode.
    #[must_use]
    pub fn lookup(&self, key: u64) -> Option<u64> {
        self.data.lookup(key)
    }

    /// File offset of the section tag.
    #[must_use]
    pub fn beginning(&self) -> u64 {
        self.beginning
    }

    /// Releases the borrow on the file, keeping the loaded table.
    #[must_use]
    pub fn into_data(self) -> HashtableData {
        self.data
    }

    /// Closes the section. A writer with at least one registration builds
    /// the MPHF and emits the whole section; an empty writer emits nothing.
    pub fn close(self) -> Result<()> {
        if !self.file.is_writer() || self.minimizers.is_empty() {
            return Ok(());
        }

        let mphf = MiniMphf::build(&self.minimizers);
        let mut table = vec![0u64; self.minimizers.len()];
        for (&key, &position) in self.minimizers.iter().zip(&self.positions) {
            if let Some(index) = mphf.lookup(key) {
                table[index as usize] = position;
            }
        }
        let mphf_bytes = mphf.to_bytes()?;

        self.file.register_position(b'h');
        self.file.buffer.write_u8(b'h')?;
        self.file.buffer.write_u64(mphf_bytes.len() as u64)?;
        self.file.buffer.write(&mphf_bytes)?;
        self.file.buffer.write_u64(table.len() as u64)?;
        for &position in &table {
            self.file.buffer.write_u64(position)?;
        }
        Ok(())
    }
}
