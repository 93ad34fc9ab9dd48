/// Custom Result type for kero operations, wrapping the custom [`Error`] type
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the kero library, encompassing all possible error
/// cases that can occur while reading or writing KERO files.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Errors related to the file header and the bracketing signatures
    #[error("Error processing header: {0}")]
    Header(#[from] HeaderError),

    /// Errors related to section parsing and construction
    #[error("Error processing section: {0}")]
    Section(#[from] SectionError),

    /// Errors raised by the hybrid file buffer
    #[error("Error in file buffer: {0}")]
    Buffer(#[from] BufferError),

    /// Standard I/O errors
    #[error("Error with IO: {0}")]
    Io(#[from] std::io::Error),

    /// Failures while (de)serializing the embedded minimal perfect hash
    #[error("Error with MPHF serialization: {0}")]
    MphfSerde(#[from] bincode::Error),
}

/// Errors specific to the fixed file header and the leading/trailing signature
#[derive(thiserror::Error, Debug)]
pub enum HeaderError {
    /// One of the two `KERO` signatures is absent or corrupted
    ///
    /// The parameter names the end of the file where the check failed
    #[error("Absent KERO signature at the {0} of the file")]
    MissingSignature(&'static str),

    /// The file was written by a newer version of the format
    #[error("Cannot read files written in format version {major}.{minor}")]
    UnsupportedVersion { major: u8, minor: u8 },

    /// The four 2-bit nucleotide codes of the encoding byte are not pairwise
    /// distinct
    #[error("Degenerate nucleotide encoding: {0:#010b}")]
    DegenerateEncoding(u8),

    /// Metadata must be written before any section content
    #[error("The metadata has to be written prior to other content")]
    MetadataAfterHeader,
}

/// Errors that can occur while reading or constructing sections
#[derive(thiserror::Error, Debug)]
pub enum SectionError {
    /// An unrecognized section type byte was found in the stream
    #[error("Unknown section type {0:?} ({1:#04x})")]
    UnknownType(char, u8),

    /// The stream held a different section type than the one being opened
    #[error("Expected section type {expected:?}, found {found:?}")]
    UnexpectedType { expected: char, found: char },

    /// A block section requires a global variable that no previous
    /// global-variable section declared
    #[error("Missing global variable {0:?} required by the section")]
    MissingVariable(&'static str),

    /// Two index entries point at the same file offset
    #[error("Duplicate offset {0} in index section")]
    DuplicateIndexOffset(i64),

    /// An index entry resolves outside the file
    #[error("Index entry offset {0} resolves outside the file")]
    CorruptIndexOffset(i64),

    /// Indexing can only be toggled before the first section
    #[error("Indexation cannot be toggled once section content exists")]
    IndexingToggledMidStream,

    /// End of file reached in the middle of a global-variable entry
    #[error("EOF reached before the end of the variable section")]
    TruncatedVariable,

    /// A decoded column or payload does not have the advertised size
    #[error("Expected {expected} bytes, found {found}")]
    LengthMismatch { expected: usize, found: usize },

    /// An integer column could not be decoded
    #[error("Corrupt integer column: {0}")]
    Codec(&'static str),

    /// A sequence holds a byte that is not a nucleotide
    #[error("Invalid nucleotide symbol: {0}")]
    InvalidNucleotide(u8),
}

/// Errors raised by the hybrid disk + tail-buffer stream
#[derive(thiserror::Error, Debug)]
pub enum BufferError {
    /// Attempted to write through a file opened for reading
    #[error("Cannot write a file in reading mode")]
    WriteInReadMode,

    /// Attempted to read through a file opened for writing
    #[error("Cannot read a file in writing mode")]
    ReadInWriteMode,

    /// The file was closed and can no longer be used
    #[error("Cannot use a closed file")]
    Closed,

    /// `write_at` may overwrite existing bytes but never extend the file
    #[error("Cannot write at position {position} after the last byte of the file ({end})")]
    WritePastEnd { position: u64, end: u64 },

    /// A read extended past the logical end of the file
    #[error("Read out of the file, byte {0}")]
    OutOfRange(u64),

    /// A jump targeted a position outside the logical file
    #[error("Jump out of the file, byte {0}")]
    JumpOutOfRange(u64),
}
