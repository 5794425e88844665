//! Reflective image loader contract
//!
//! Native images from the bundle are mapped straight from memory: nothing is
//! written to disk and the OS loader never learns about them. The loader
//! itself is an external library; this is the surface the bootstrap uses.

use std::ffi::{c_void, CStr};
use std::ptr::NonNull;

/// Untyped exported function, cast to its real signature by the caller.
pub type RawProc = unsafe extern "system" fn() -> isize;

/// A native image mapped by the reflective loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHandle(NonNull<c_void>);

impl ImageHandle {
    pub fn new(raw: *mut c_void) -> Option<Self> {
        NonNull::new(raw).map(Self)
    }

    pub fn as_raw(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

/// In-memory PE loader.
pub trait ImageLoader {
    /// Map `image`, apply relocations, resolve imports and run its entry
    /// point. The buffer may be released once this returns.
    fn map_and_execute(&mut self, image: &[u8]) -> Option<ImageHandle>;

    /// Look up an export of a mapped image by name.
    fn resolve_export(&self, image: ImageHandle, name: &CStr) -> Option<RawProc>;

    /// Bind imports of `module!symbol` in subsequently mapped images to
    /// `replacement` instead of the real export.
    fn register_import_override(&mut self, module: &CStr, symbol: &CStr, replacement: RawProc);
}
