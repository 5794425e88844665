//! Launchpad bundle assembly
//!
//! Turns the archive embedded in the executable into the lookup tables the
//! interpreter starts from:
//! - **section**: finds the archive inside the running image's PE sections
//! - **archive**: opens the archive from memory and extracts entries
//! - **conventions**: entry classification and name derivation rules
//! - **loader**: contract of the reflective (in-memory) image loader
//! - **records**: owned table records and their sentinel-terminated views
//! - **assembler**: classifies every entry and builds the [`Bundle`]

pub mod archive;
pub mod arguments;
pub mod assembler;
pub mod conventions;
pub mod error;
pub mod loader;
pub mod records;
pub mod section;

pub use archive::{ArchiveEntry, BundleArchive};
pub use arguments::ArgumentVector;
pub use assembler::{Assembler, Bundle};
pub use conventions::{Conventions, EntryKind, ExtensionNames, ModulePath};
pub use error::BundleError;
pub use loader::{ImageHandle, ImageLoader, RawProc};
pub use records::{
    CompiledModule, ExtensionInit, FrozenRecord, FrozenTable, InittabRecord, InittabTable,
    NativeExtension,
};
pub use section::{BundleSource, SectionHeader};
