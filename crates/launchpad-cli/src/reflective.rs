//! Binding to the reflective loader library
//!
//! The loader is linked statically from `reflective_ldr` (see build.rs). It
//! maps PE images from memory, resolves their imports (with per-symbol
//! overrides) and runs their entry points.

use std::ffi::{c_char, c_void, CStr};
use std::ptr::NonNull;

use launchpad_bundle::{ImageHandle, ImageLoader, RawProc};
use tracing::debug;

#[repr(C)]
struct RawLoader {
    _private: [u8; 0],
}

extern "C" {
    fn rldr_create() -> *mut RawLoader;
    fn rldr_destroy(ldr: *mut RawLoader);
    fn rldr_map_image_and_execute(ldr: *mut RawLoader, image: *const c_void, size: usize, flags: u32) -> *mut c_void;
    fn rldr_get_proc_address(ldr: *mut RawLoader, module: *mut c_void, name: *const c_char) -> *mut c_void;
    fn rldr_set_import_alternative(
        ldr: *mut RawLoader,
        module: *const c_char,
        symbol: *const c_char,
        replacement: *const c_void,
    );
}

/// Owns a loader instance. Images it mapped stay mapped until it is dropped.
pub struct ReflectiveLoader {
    raw: NonNull<RawLoader>,
}

impl ReflectiveLoader {
    pub fn new() -> Option<Self> {
        NonNull::new(unsafe { rldr_create() }).map(|raw| Self { raw })
    }
}

impl Drop for ReflectiveLoader {
    fn drop(&mut self) {
        unsafe { rldr_destroy(self.raw.as_ptr()) }
    }
}

impl ImageLoader for ReflectiveLoader {
    fn map_and_execute(&mut self, image: &[u8]) -> Option<ImageHandle> {
        let module = unsafe { rldr_map_image_and_execute(self.raw.as_ptr(), image.as_ptr().cast(), image.len(), 0) };
        ImageHandle::new(module)
    }

    fn resolve_export(&self, image: ImageHandle, name: &CStr) -> Option<RawProc> {
        let proc = unsafe { rldr_get_proc_address(self.raw.as_ptr(), image.as_raw(), name.as_ptr()) };
        if proc.is_null() {
            return None;
        }
        // SAFETY: non-null export address; callers cast it to the real signature.
        Some(unsafe { std::mem::transmute::<*mut c_void, RawProc>(proc) })
    }

    fn register_import_override(&mut self, module: &CStr, symbol: &CStr, replacement: RawProc) {
        debug!(module = ?module, symbol = ?symbol, "import override");
        unsafe {
            rldr_set_import_alternative(
                self.raw.as_ptr(),
                module.as_ptr(),
                symbol.as_ptr(),
                replacement as *const c_void,
            )
        }
    }
}
