//! Global-variable sections.
//!
//! A `v` section declares named u64 constants. Writes are mirrored into the
//! file-wide variable table so later sections can look up `k`, `m`, `max`
//! and `data_size`; variables accumulate across sections, later definitions
//! overriding earlier ones.
//!
//! On-disk layout: `v`, count (u64), then count repetitions of a
//! NUL-terminated name followed by a big-endian u64 value, in sorted name
//! order.

use std::collections::BTreeMap;

use crate::error::{Result, SectionError};
use crate::file::KeroFile;

use super::expect_tag;

/// Manipulator for one global-variable section.
pub struct SectionGv<'a> {
    file: &'a mut KeroFile,
    beginning: u64,
    vars: BTreeMap<String, u64>,
}

impl<'a> SectionGv<'a> {
    /// Opens a GV section on the file. In reading mode the whole section is
    /// parsed immediately; in writing mode the tag byte is emitted and
    /// variables are collected until [`Self::close`].
    pub fn new(file: &'a mut KeroFile) -> Result<Self> {
        file.prepare_section()?;
        let beginning = file.tell();
        let mut section = Self {
            file,
            beginning,
            vars: BTreeMap::new(),
        };

        if section.file.is_reader() {
            section.read_section()?;
        }
        if section.file.is_writer() {
            section.file.register_position(b'v');
            section.file.buffer.write_u8(b'v')?;
        }
        Ok(section)
    }

    /// Declares a variable, also mirrored into the file-wide table.
    pub fn write_var(&mut self, name: &str, value: u64) {
        self.vars.insert(name.to_string(), value);
        self.file.global_vars.insert(name.to_string(), value);
    }

    /// The variables of this section. In reading mode they are available as
    /// soon as the section is constructed.
    #[must_use]
    pub fn vars(&self) -> &BTreeMap<String, u64> {
        &self.vars
    }

    /// File offset of the section tag.
    #[must_use]
    pub fn beginning(&self) -> u64 {
        self.beginning
    }

    fn read_section(&mut self) -> Result<()> {
        expect_tag(self.file, b'v')?;
        let nb_vars = self.file.buffer.read_u64()?;
        for _ in 0..nb_vars {
            self.read_var()?;
        }
        Ok(())
    }

    fn read_var(&mut self) -> Result<()> {
        if self.file.tell() >= self.file.end_position() {
            return Err(SectionError::TruncatedVariable.into());
        }

        let mut name = Vec::new();
        loop {
            let byte = self.file.buffer.read_u8()?;
            if byte == 0 {
                break;
            }
            name.push(byte);
        }
        let name = String::from_utf8_lossy(&name).into_owned();
        let value = self.file.buffer.read_u64()?;

        self.vars.insert(name.clone(), value);
        self.file.global_vars.insert(name, value);
        Ok(())
    }

    /// Copies this section's variables into a new GV section on another
    /// file. Empty sections are elided.
    pub fn copy(&self, dest: &mut KeroFile) -> Result<()> {
        if self.vars.is_empty() {
            return Ok(());
        }
        let mut copy = SectionGv::new(dest)?;
        for (name, value) in &self.vars {
            copy.write_var(name, *value);
        }
        copy.close()
    }

    /// Closes the section. A writer emits the variable count and the sorted
    /// entries here.
    pub fn close(self) -> Result<()> {
        if self.file.is_writer() {
            self.file.buffer.write_u64(self.vars.len() as u64)?;
            for (name, value) in &self.vars {
                self.file.buffer.write(name.as_bytes())?;
                self.file.buffer.write_u8(0)?;
                self.file.buffer.write_u64(*value)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_gv_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gv.kero");

        let mut file = KeroFile::create(&path).unwrap();
        file.write_metadata(&[]).unwrap();
        let mut gv = SectionGv::new(&mut file).unwrap();
        gv.write_var("k", 31);
        gv.write_var("max", 255);
        gv.write_var("data_size", 2);
        gv.close().unwrap();
        file.close().unwrap();

        let mut file = KeroFile::open(&path).unwrap();
        file.complete_header().unwrap();
        let gv = SectionGv::new(&mut file).unwrap();
        assert_eq!(gv.vars().get("k"), Some(&31));
        assert_eq!(gv.vars().get("max"), Some(&255));
        assert_eq!(gv.vars().get("data_size"), Some(&2));
        gv.close().unwrap();

        assert_eq!(file.var("k"), Some(31));
    }

    #[test]
    fn test_gv_entries_sorted_on_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sorted.kero");

        let mut file = KeroFile::create(&path).unwrap();
        file.set_indexed(false).unwrap();
        file.write_metadata(&[]).unwrap();
        let mut gv = SectionGv::new(&mut file).unwrap();
        gv.write_var("zeta", 1);
        gv.write_var("alpha", 2);
        gv.close().unwrap();
        file.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        // section starts right after the 13-byte header
        assert_eq!(bytes[13], b'v');
        let alpha = 13 + 1 + 8;
        assert_eq!(&bytes[alpha..alpha + 6], b"alpha\0");
        let zeta = alpha + 6 + 8;
        assert_eq!(&bytes[zeta..zeta + 5], b"zeta\0");
    }

    #[test]
    fn test_vars_accumulate_across_sections() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("accumulate.kero");

        let mut file = KeroFile::create(&path).unwrap();
        file.write_metadata(&[]).unwrap();
        let mut gv = SectionGv::new(&mut file).unwrap();
        gv.write_var("k", 21);
        gv.close().unwrap();
        let mut gv = SectionGv::new(&mut file).unwrap();
        gv.write_var("m", 9);
        gv.close().unwrap();
        file.close().unwrap();

        let mut file = KeroFile::open(&path).unwrap();
        file.complete_header().unwrap();
        SectionGv::new(&mut file).unwrap().close().unwrap();
        SectionGv::new(&mut file).unwrap().close().unwrap();
        assert_eq!(file.var("k"), Some(21));
        assert_eq!(file.var("m"), Some(9));
    }

    #[test]
    fn test_wrong_tag() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wrong.kero");

        let mut file = KeroFile::create(&path).unwrap();
        file.set_indexed(false).unwrap();
        file.write_metadata(&[]).unwrap();
        // write a raw-looking tag where a GV is expected
        file.buffer.write(b"r").unwrap();
        file.close().unwrap();

        let mut file = KeroFile::open(&path).unwrap();
        file.complete_header().unwrap();
        assert!(SectionGv::new(&mut file).is_err());
    }
}
