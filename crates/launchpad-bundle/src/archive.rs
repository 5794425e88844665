//! In-memory bundle archive
//!
//! The archive is read straight out of the buffer it lives in (a section of
//! the running image). The buffer is borrowed, never owned.

use std::io::{Cursor, Read};

use zip::ZipArchive;

use crate::error::BundleError;

/// Upper bound on the buffer reserved from an entry's declared size. Larger
/// entries grow while being read.
const MAX_PREALLOCATION: usize = 16 << 20;

/// One extracted entry: its archive name and fully decompressed contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub data: Vec<u8>,
}

/// A zip archive parsed from a memory buffer.
pub struct BundleArchive<'a> {
    zip: ZipArchive<Cursor<&'a [u8]>>,
}

impl<'a> BundleArchive<'a> {
    /// Parse the central directory of the archive in `buffer`.
    pub fn open(buffer: &'a [u8]) -> Result<Self, BundleError> {
        let zip = ZipArchive::new(Cursor::new(buffer)).map_err(BundleError::Archive)?;
        Ok(Self { zip })
    }

    /// Number of entries, directories included.
    pub fn count(&self) -> usize {
        self.zip.len()
    }

    /// Decompress entry `index` into a new buffer.
    ///
    /// Directory entries yield `Ok(None)`. An entry that cannot be read or
    /// decompresses to nothing is an error: a missing module would silently
    /// break the application later.
    pub fn extract(&mut self, index: usize) -> Result<Option<ArchiveEntry>, BundleError> {
        let mut file = self
            .zip
            .by_index(index)
            .map_err(|source| BundleError::Extract { index, source })?;

        if file.is_dir() {
            return Ok(None);
        }

        let name = file.name().to_owned();
        let mut data = Vec::with_capacity(initial_capacity(file.size()));
        if let Err(source) = file.read_to_end(&mut data) {
            return Err(BundleError::Read { name, source });
        }
        if data.is_empty() {
            return Err(BundleError::EmptyEntry(name));
        }

        Ok(Some(ArchiveEntry { name, data }))
    }

    /// Release the archive state. The underlying buffer stays with its owner.
    pub fn close(self) {}
}

/// Capacity reserved for an entry whose header claims `declared` bytes.
fn initial_capacity(declared: u64) -> usize {
    usize::try_from(declared).unwrap_or(0).min(MAX_PREALLOCATION)
}
