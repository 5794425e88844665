//! Locating the bundle inside the running image
//!
//! The bundle builder appends the archive to the bootloader as a new, last
//! PE section named `.py`:
//!
//! ```text
//! ┌──────────────────────────┐
//! │  DOS header (e_lfanew)   │
//! ├──────────────────────────┤
//! │  PE\0\0 + file header    │  ← NumberOfSections, SizeOfOptionalHeader
//! ├──────────────────────────┤
//! │  Optional header         │  ← SizeOfImage
//! ├──────────────────────────┤
//! │  Section table           │  ← last entry describes the bundle
//! ├──────────────────────────┤
//! │  .text .rdata .data ...  │
//! ├──────────────────────────┤
//! │  .py (zip archive)       │
//! └──────────────────────────┘
//! ```
//!
//! Offsets are those of the *mapped* image: section data sits at its
//! virtual address, not its file offset.

use std::borrow::Cow;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::error::BundleError;

const DOS_MAGIC: u16 = 0x5A4D; // "MZ"
const PE_SIGNATURE: u32 = 0x0000_4550; // "PE\0\0"
const E_LFANEW_OFFSET: usize = 0x3C;
const FILE_HEADER_SIZE: usize = 20;
const NUMBER_OF_SECTIONS_OFFSET: usize = 2;
const SIZE_OF_OPTIONAL_HEADER_OFFSET: usize = 16;
// Same offset in PE32 and PE32+ optional headers.
const SIZE_OF_IMAGE_OFFSET: usize = 56;
const SECTION_HEADER_SIZE: usize = 40;

/// The fields of a section header the locator needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    pub name: [u8; 8],
    pub virtual_size: u32,
    pub virtual_address: u32,
}

impl SectionHeader {
    /// Section name without NUL padding.
    pub fn name(&self) -> &[u8] {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        &self.name[..end]
    }

    /// Case-insensitive name comparison.
    pub fn is_named(&self, name: &str) -> bool {
        self.name().eq_ignore_ascii_case(name.as_bytes())
    }
}

fn read_u16(image: &[u8], offset: usize) -> Result<u16, BundleError> {
    image
        .get(offset..offset + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or_else(|| BundleError::InvalidImage(format!("header read at {:#x} out of bounds", offset)))
}

fn read_u32(image: &[u8], offset: usize) -> Result<u32, BundleError> {
    image
        .get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| BundleError::InvalidImage(format!("header read at {:#x} out of bounds", offset)))
}

/// Offset of the file header, after validating both signatures.
fn file_header_offset(image: &[u8]) -> Result<usize, BundleError> {
    if read_u16(image, 0)? != DOS_MAGIC {
        return Err(BundleError::InvalidImage("missing MZ signature".into()));
    }
    let nt = read_u32(image, E_LFANEW_OFFSET)? as usize;
    if read_u32(image, nt)? != PE_SIGNATURE {
        return Err(BundleError::InvalidImage("missing PE signature".into()));
    }
    Ok(nt + 4)
}

/// `SizeOfImage` from the optional header. Only the header bytes are needed.
pub fn mapped_image_size(headers: &[u8]) -> Result<usize, BundleError> {
    let optional = file_header_offset(headers)? + FILE_HEADER_SIZE;
    Ok(read_u32(headers, optional + SIZE_OF_IMAGE_OFFSET)? as usize)
}

/// The last entry of the section table.
pub fn last_section(image: &[u8]) -> Result<SectionHeader, BundleError> {
    let file_header = file_header_offset(image)?;
    let count = read_u16(image, file_header + NUMBER_OF_SECTIONS_OFFSET)? as usize;
    let optional_size = read_u16(image, file_header + SIZE_OF_OPTIONAL_HEADER_OFFSET)? as usize;
    if count == 0 {
        return Err(BundleError::InvalidImage("image has no sections".into()));
    }

    let table = file_header + FILE_HEADER_SIZE + optional_size;
    let header = table + (count - 1) * SECTION_HEADER_SIZE;
    let raw = image
        .get(header..header + SECTION_HEADER_SIZE)
        .ok_or_else(|| BundleError::InvalidImage("section table out of bounds".into()))?;

    let mut name = [0u8; 8];
    name.copy_from_slice(&raw[..8]);
    Ok(SectionHeader {
        name,
        virtual_size: read_u32(raw, 8)?,
        virtual_address: read_u32(raw, 12)?,
    })
}

/// Bytes of `section` within the mapped image.
pub fn section_data<'a>(image: &'a [u8], section: &SectionHeader) -> Result<&'a [u8], BundleError> {
    let start = section.virtual_address as usize;
    let end = start + section.virtual_size as usize;
    image
        .get(start..end)
        .ok_or_else(|| BundleError::InvalidImage("bundle section exceeds the mapped image".into()))
}

/// Where the bundle archive is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleSource {
    /// Name of the section carrying the archive.
    pub section_name: &'static str,
    /// External archive used when the image has no bundle section.
    pub fallback_archive: Option<PathBuf>,
}

impl Default for BundleSource {
    /// Diagnostic builds fall back to `test.zip` in the working directory.
    fn default() -> Self {
        Self {
            section_name: ".py",
            fallback_archive: cfg!(debug_assertions).then(|| PathBuf::from("test.zip")),
        }
    }
}

impl BundleSource {
    /// Find the archive bytes for the mapped `image`.
    pub fn locate<'a>(&self, image: &'a [u8]) -> Result<Cow<'a, [u8]>, BundleError> {
        let section = last_section(image)?;
        if section.is_named(self.section_name) {
            debug!(
                size = section.virtual_size,
                rva = section.virtual_address,
                "bundle found in image"
            );
            return section_data(image, &section).map(Cow::Borrowed);
        }

        let Some(path) = &self.fallback_archive else {
            return Err(BundleError::SectionNotFound(self.section_name.to_owned()));
        };
        warn!(
            section = %String::from_utf8_lossy(section.name()),
            path = %path.display(),
            "no bundle section, reading external archive"
        );
        Ok(Cow::Owned(std::fs::read(path)?))
    }
}
