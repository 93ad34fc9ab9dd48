//! Typed file sections.
//!
//! Every section of a KERO file starts with a one-byte ASCII type tag.
//! Section manipulators borrow the [`KeroFile`](crate::KeroFile) mutably for
//! their lifetime: constructing one in reading mode consumes the section
//! header from the stream, and `close` finalizes a writer (backfilling any
//! placeholder fields) or skips the unread remainder for a reader. Only one
//! section may be active on a file at a time.

/// 'v' sections: file-wide named u64 variables
pub mod gv;

/// 'h' section: MPHF-backed minimizer directory
pub mod hashtable;

/// 'i' sections: offset table over the other sections
pub mod index;

/// 'M' sections: columnar super-k-mer store
pub mod minimizer;

/// 'r' sections: sequence blocks without minimizer extraction
pub mod raw;

pub use gv::SectionGv;
pub use hashtable::SectionHashtable;
pub use index::SectionIndex;
pub use minimizer::SectionMinimizer;
pub use raw::SectionRaw;

use crate::error::{Result, SectionError};
use crate::file::KeroFile;

use minimizer::MinimizerBlocks;
use raw::RawBlocks;

/// The recognized section kinds and their one-byte tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionType {
    /// `v`: global variables
    Gv,
    /// `r`: raw sequence blocks
    Raw,
    /// `M`: minimizer super-k-mer blocks
    Minimizer,
    /// `i`: section offset index
    Index,
    /// `h`: minimizer hashtable
    Hashtable,
}

impl SectionType {
    /// Maps a tag byte to its section kind. Unknown tags are fatal for the
    /// stream being parsed.
    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            b'v' => Ok(Self::Gv),
            b'r' => Ok(Self::Raw),
            b'M' => Ok(Self::Minimizer),
            b'i' => Ok(Self::Index),
            b'h' => Ok(Self::Hashtable),
            other => Err(SectionError::UnknownType(other as char, other).into()),
        }
    }

    /// The on-disk tag byte.
    #[must_use]
    pub fn tag(self) -> u8 {
        match self {
            Self::Gv => b'v',
            Self::Raw => b'r',
            Self::Minimizer => b'M',
            Self::Index => b'i',
            Self::Hashtable => b'h',
        }
    }
}

/// Consumes the section tag from the stream, verifying it matches.
pub(crate) fn expect_tag(file: &mut KeroFile, expected: u8) -> Result<()> {
    let found = file.buffer.read_u8()?;
    if found != expected {
        return Err(SectionError::UnexpectedType {
            expected: expected as char,
            found: found as char,
        }
        .into());
    }
    Ok(())
}

/// Block-section dispatch for sequential readers: the two section kinds that
/// carry k-mer blocks, with their shared operations.
pub(crate) enum BlockReader {
    Raw(RawBlocks),
    Minimizer(MinimizerBlocks),
}

impl BlockReader {
    /// Opens the block section starting at the current position, whichever
    /// kind it is.
    pub(crate) fn open(file: &mut KeroFile) -> Result<Self> {
        match file.peek_section_type()? {
            SectionType::Raw => Ok(Self::Raw(RawBlocks::open(file)?)),
            SectionType::Minimizer => Ok(Self::Minimizer(MinimizerBlocks::open(file)?)),
            other => Err(SectionError::UnexpectedType {
                expected: 'r',
                found: other.tag() as char,
            }
            .into()),
        }
    }

    pub(crate) fn nb_blocks(&self) -> u64 {
        match self {
            Self::Raw(blocks) => blocks.nb_blocks,
            Self::Minimizer(blocks) => blocks.nb_blocks,
        }
    }

    /// Reads the next block as a contiguous packed-sequence + data buffer.
    /// Minimizer blocks come back with the minimizer spliced in.
    pub(crate) fn read_block_into(
        &mut self,
        file: &mut KeroFile,
        seq_data: &mut [u8],
    ) -> Result<Option<u64>> {
        match self {
            Self::Raw(blocks) => blocks.read_block_into(file, seq_data),
            Self::Minimizer(blocks) => blocks.read_block_into(file, seq_data),
        }
    }

    /// Skips every block left in the section, leaving the stream at the
    /// section end.
    pub(crate) fn close(&mut self, file: &mut KeroFile) -> Result<()> {
        match self {
            Self::Raw(blocks) => blocks.close(file),
            Self::Minimizer(blocks) => blocks.close(file),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_roundtrip() {
        for kind in [
            SectionType::Gv,
            SectionType::Raw,
            SectionType::Minimizer,
            SectionType::Index,
            SectionType::Hashtable,
        ] {
            assert_eq!(SectionType::from_tag(kind.tag()).unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_tag() {
        assert!(SectionType::from_tag(b'z').is_err());
        assert!(SectionType::from_tag(b'm').is_err());
    }
}
