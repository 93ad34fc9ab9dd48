//! Read-only memory-mapped access to a KERO file.
//!
//! Mapping the whole file lets the minimizer section decode its compressed
//! columns straight from the page cache
//! ([`SectionMinimizer::precache_columns_from_mmap`](crate::SectionMinimizer::precache_columns_from_mmap)),
//! which avoids per-section seeking when many sections are opened at once.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::error::Result;

/// A whole-file read-only memory mapping.
pub struct MmapAccessor {
    mmap: Mmap,
}

impl MmapAccessor {
    /// Maps the file at `path` into memory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self { mmap })
    }

    /// The mapped bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.mmap
    }

    /// Size of the mapped file in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_mmap_matches_file_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mapped.bin");
        std::fs::write(&path, b"KERO content for mapping").unwrap();

        let mmap = MmapAccessor::open(&path).unwrap();
        assert_eq!(mmap.len(), 24);
        assert!(!mmap.is_empty());
        assert_eq!(mmap.as_slice(), b"KERO content for mapping");
    }
}
