//! Wiring at the outermost scope
//!
//! Order matters:
//! 1. pin the default activation context
//! 2. create the loader and redirect the legacy kernel32 imports
//! 3. locate, open and assemble the bundle
//! 4. run the interpreter
//! 5. drop the bundle, then the loader, then release the context

use std::ffi::c_void;
use std::{ptr, slice};

use launchpad_bundle::{section, Assembler, BundleArchive, BundleSource, Conventions, ImageLoader, RawProc};
use launchpad_runtime::BootError;
use launchpad_win::{get_final_path_name_by_handle_w, get_tick_count64, ActivationContext, Kernel32ActCtx};

use crate::reflective::ReflectiveLoader;

extern "C" {
    /// Linker-provided base of this executable's mapped image.
    static __ImageBase: u8;
}

const HEADER_PAGE: usize = 0x1000;

/// The mapped image of this executable.
fn current_image() -> Result<&'static [u8], BootError> {
    // SAFETY: the loader maps at least the header page and SizeOfImage bytes
    // from __ImageBase for the lifetime of the process.
    unsafe {
        let base = ptr::addr_of!(__ImageBase);
        let size = section::mapped_image_size(slice::from_raw_parts(base, HEADER_PAGE))?;
        Ok(slice::from_raw_parts(base, size))
    }
}

fn install_legacy_overrides(loader: &mut dyn ImageLoader) {
    // SAFETY: the loader binds these through untyped import slots.
    let (ticks, final_path) = unsafe {
        (
            std::mem::transmute::<*const c_void, RawProc>(get_tick_count64 as *const c_void),
            std::mem::transmute::<*const c_void, RawProc>(get_final_path_name_by_handle_w as *const c_void),
        )
    };
    loader.register_import_override(c"kernel32.dll", c"GetTickCount64", ticks);
    loader.register_import_override(c"kernel32.dll", c"GetFinalPathNameByHandleW", final_path);
}

fn run_bundle(actctx: &ActivationContext) -> Result<i32, BootError> {
    let conventions = Conventions::default();
    let mut loader = ReflectiveLoader::new().ok_or(BootError::LoaderUnavailable)?;
    install_legacy_overrides(&mut loader);

    let image = current_image()?;
    let bytes = BundleSource::default().locate(image)?;
    let mut archive = BundleArchive::open(&bytes)?;
    let bundle = Assembler::new(&conventions, actctx, &mut loader).assemble(&mut archive)?;
    archive.close();

    launchpad_runtime::launch(&loader, &bundle, &conventions)
}

/// Boot the bundled application and return its process status.
pub fn boot() -> Result<i32, BootError> {
    let actctx = ActivationContext::load(Kernel32ActCtx::probe());
    let result = run_bundle(&actctx);
    actctx.unload();
    result
}
