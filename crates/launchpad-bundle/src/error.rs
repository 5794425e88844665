//! Bundle error types.

use zip::result::ZipError;

/// Fatal failures while locating, opening or assembling the bundle.
///
/// Degraded loads (a native image that fails to map, a missing export) are
/// not errors; they are logged and assembly continues.
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    /// File I/O error (diagnostic fallback archive)
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// Malformed PE headers in the running image
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// The image carries no bundle section and no fallback is configured
    #[error("Bundle section {0:?} not found")]
    SectionNotFound(String),

    /// The bundle bytes are not a readable archive
    #[error("Invalid bundle archive: {0}")]
    Archive(#[source] ZipError),

    /// An entry could not be opened for extraction
    #[error("Failed to extract entry #{index}: {source}")]
    Extract {
        index: usize,
        #[source]
        source: ZipError,
    },

    /// An entry failed to decompress
    #[error("Failed to read entry {name}: {source}")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// An entry decompressed to nothing
    #[error("Entry {0} extracted to an empty buffer")]
    EmptyEntry(String),

    /// An entry is larger than the interpreter's size field can express
    #[error("Entry {0} is too large")]
    EntryTooLarge(String),

    /// A derived name contains an interior NUL
    #[error("Entry name {0:?} contains a NUL byte")]
    InvalidName(String),
}
