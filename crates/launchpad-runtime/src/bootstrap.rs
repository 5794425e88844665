//! Interpreter start sequence
//!
//! ```text
//! is_initialized? ──yes──► AlreadyInitialized
//!       │no
//! isolate, frozen startup flag
//! decode arguments (native locale)
//! built-in table, frozen table, program name
//! initialize, sys.frozen, sys.argv
//! GIL { import __main__ }
//! finalize ──► status
//! ```
//!
//! The tables and the decoded arguments outlive the interpreter: they are
//! released only after finalization, whichever way the run ended.

use std::ffi::CString;

use launchpad_bundle::{Bundle, Conventions, ImageLoader};
use tracing::{debug, error, info, warn};

use crate::args::Session;
use crate::error::{BootError, EXIT_FAILURE, EXIT_FINALIZE_FAILED};
use crate::interpreter::Interpreter;
use crate::python::PythonApi;

/// Resolve the interpreter API from the bundle's host runtime and run it.
pub fn launch(loader: &dyn ImageLoader, bundle: &Bundle, conventions: &Conventions) -> Result<i32, BootError> {
    let host = bundle.host_runtime().ok_or(BootError::HostRuntimeMissing)?;
    let mut api = PythonApi::resolve(loader, host)?;
    run(&mut api, bundle, conventions)
}

/// Start `interp` from `bundle`, run the entry module and finalize.
///
/// Returns the process status: 0 when the entry module ran, 1 when it
/// raised, 120 when finalization failed.
pub fn run<I: Interpreter + ?Sized>(
    interp: &mut I,
    bundle: &Bundle,
    conventions: &Conventions,
) -> Result<i32, BootError> {
    if interp.is_initialized() {
        return Err(BootError::AlreadyInitialized);
    }
    let entry = CString::new(conventions.entry_module)
        .map_err(|_| BootError::EntryModuleMissing(conventions.entry_module.to_owned()))?;

    let frozen = bundle.frozen_table();
    let mut inittab = bundle.inittab();

    let mut session = Session::new(interp);
    session.isolate();
    session.set_frozen_startup();
    session.decode_arguments(bundle.arguments())?;

    // SAFETY: both tables are sentinel-terminated and dropped after the session.
    let accepted = unsafe { session.extend_inittab(inittab.as_mut_ptr()) };
    if !accepted {
        return Err(BootError::InittabRejected);
    }
    unsafe { session.install_frozen_modules(frozen.as_ptr()) };
    session.install_program_name();

    info!(
        modules = bundle.modules().len(),
        extensions = bundle.extensions().len(),
        argc = session.argc(),
        "starting interpreter"
    );
    session.initialize();
    session.mark_frozen();
    session.install_argv();

    let gil = session.gil_ensure();
    let imported = session.import_frozen_module(&entry);
    session.gil_release(gil);

    let status = match imported {
        0 => None,
        n if n < 0 => {
            debug!(module = conventions.entry_module, "entry module raised");
            Some(EXIT_FAILURE)
        }
        _ => Some(0),
    };

    let finalized = session.finalize();
    drop(session);

    let Some(status) = status else {
        error!(module = conventions.entry_module, "entry module not frozen");
        return Err(BootError::EntryModuleMissing(conventions.entry_module.to_owned()));
    };
    if finalized < 0 {
        warn!(status, "interpreter finalization failed");
        return Ok(EXIT_FINALIZE_FAILED);
    }

    debug!(status, "interpreter finished");
    Ok(status)
}
