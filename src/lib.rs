//! # KERO
//!
//! The `kero` library reads and writes KERO files: a sectioned binary
//! container format for storing large collections of fixed-length DNA
//! subsequences (k-mers) together with per-k-mer payloads.
//!
//! A KERO file is a sequence of typed, self-describing sections bracketed by
//! a four-byte `KERO` signature at both ends:
//!
//! ```text
//! [Signature][Header][Sections...][Hashtable][Index][Footer GV][Signature]
//! ```
//!
//! - **Global-variable sections** (`v`) declare file-wide constants such as
//!   `k`, `m`, `max` and `data_size` that the block sections below depend on.
//! - **Raw sections** (`r`) store blocks of 2-bit packed sequences with their
//!   payloads, no minimizer extraction.
//! - **Minimizer sections** (`M`) store a group of super-k-mers sharing one
//!   minimizer as a run-length-compacted columnar table; the shared minimizer
//!   is stored once in the section header and spliced back into each
//!   sequence on read.
//! - **Index sections** (`i`) list the start offsets of every section so
//!   readers can seek directly to the data they need.
//! - The **hashtable section** (`h`) embeds a minimal perfect hash over all
//!   minimizers in the file, mapping each to the offset of its section.
//!
//! All multi-byte integers are big-endian on the wire.
//!
//! ## Writing
//!
//! ```no_run
//! use kero::{KeroFile, SectionGv, SectionRaw};
//!
//! # fn main() -> kero::Result<()> {
//! let mut file = KeroFile::create("example.kero")?;
//! file.set_encoding(0, 1, 3, 2)?;
//! file.write_metadata(b"produced by example")?;
//!
//! let mut gv = SectionGv::new(&mut file)?;
//! gv.write_var("k", 31);
//! gv.write_var("max", 256);
//! gv.write_var("data_size", 1);
//! gv.close()?;
//!
//! let seq = kero::nuc::encode(b"ACGTACGTACGTACGTACGTACGTACGTACGTA", &[0, 1, 3, 2])?;
//! let mut raw = SectionRaw::new(&mut file)?;
//! raw.write_compacted_sequence(&seq, 33, &[0, 0, 0])?;
//! raw.close()?;
//!
//! file.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Reading
//!
//! ```no_run
//! use kero::KeroReader;
//!
//! # fn main() -> kero::Result<()> {
//! let mut reader = KeroReader::new("example.kero")?;
//! while let Some((kmer, data)) = reader.next_kmer()? {
//!     // kmer is 2-bit packed, ceil(k / 4) bytes
//!     let _ = (kmer, data);
//! }
//! # Ok(())
//! # }
//! ```

/// 2-bit packed byte-array primitives
pub mod bitpack;

/// Opaque integer-column and byte-stream codecs
pub mod codec;

/// Error definitions
pub mod error;

/// The low-level file object: header, footer and index discovery
pub mod file;

/// Memory-mapped file access
pub mod mmap;

/// Minimal perfect hash over u64 minimizer keys
pub mod mphf;

/// Nucleotide packing against a per-file encoding table
pub mod nuc;

/// High-level k-mer iteration
pub mod reader;

/// Section manipulators, one per section type
pub mod section;

/// Hybrid buffered/streamed positional I/O
mod buffer;

pub use error::{Error, Result};
pub use file::KeroFile;
pub use mmap::MmapAccessor;
pub use reader::KeroReader;
pub use section::{
    SectionGv, SectionHashtable, SectionIndex, SectionMinimizer, SectionRaw, SectionType,
};

/// Four-byte signature found at both ends of every KERO file
pub const SIGNATURE: &[u8; 4] = b"KERO";

/// Major version of the format written by this crate
pub const VERSION_MAJOR: u8 = 0;

/// Minor version of the format written by this crate
pub const VERSION_MINOR: u8 = 1;

/// Default nucleotide encoding byte: A=0, C=1, G=3, T=2
pub(crate) const DEFAULT_ENCODING: u8 = 0b0001_1110;
