//! Interpreter contract
//!
//! The runtime image is mapped reflectively, so nothing in this program links
//! against it. Every call the bootstrap makes goes through this trait; the
//! production implementation ([`crate::PythonApi`]) dispatches to pointers
//! resolved by name from the host runtime image.

use std::ffi::{c_int, CStr};
use std::ptr::NonNull;

use launchpad_bundle::{FrozenRecord, InittabRecord};

/// The interpreter's wide character type.
pub type WideChar = libc::wchar_t;

/// Opaque token returned by [`Interpreter::gil_ensure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GilState(pub c_int);

/// The subset of the embedding API the bootstrap drives, in call order.
pub trait Interpreter {
    /// `Py_IsInitialized`.
    fn is_initialized(&self) -> bool;

    /// Ignore inherited environment configuration, disable the user site
    /// directory and truncate the computed module search path.
    fn isolate(&mut self);

    /// `Py_FrozenFlag = 1`: no warnings while computing paths.
    fn set_frozen_startup(&mut self);

    /// `Py_DecodeLocale`. The result is released with [`Interpreter::raw_free`].
    fn decode_locale(&mut self, arg: &CStr) -> Option<NonNull<WideChar>>;

    /// `PyMem_RawFree`.
    ///
    /// # Safety
    /// `ptr` must come from [`Interpreter::decode_locale`] and not be freed yet.
    unsafe fn raw_free(&mut self, ptr: NonNull<WideChar>);

    /// `PyImport_ExtendInittab`. Returns `false` when the table was refused.
    ///
    /// # Safety
    /// `table` must be sentinel-terminated and outlive the interpreter.
    unsafe fn extend_inittab(&mut self, table: *mut InittabRecord) -> bool;

    /// Store `table` in `PyImport_FrozenModules`.
    ///
    /// # Safety
    /// `table` must be sentinel-terminated and outlive the interpreter.
    unsafe fn install_frozen_modules(&mut self, table: *const FrozenRecord);

    /// `Py_SetProgramName`.
    ///
    /// # Safety
    /// `name` must be NUL-terminated and outlive the interpreter.
    unsafe fn set_program_name(&mut self, name: *const WideChar);

    /// `Py_Initialize` followed by `PyEval_InitThreads`.
    fn initialize(&mut self);

    /// `sys.frozen = True`.
    fn mark_frozen(&mut self);

    /// `PySys_SetArgv`. The interpreter may rewrite the array in place.
    ///
    /// # Safety
    /// Every element must be a NUL-terminated wide string.
    unsafe fn set_argv(&mut self, argv: &mut [*mut WideChar]);

    /// `PyGILState_Ensure`.
    fn gil_ensure(&mut self) -> GilState;

    /// `PyGILState_Release`.
    fn gil_release(&mut self, state: GilState);

    /// `PyImport_ImportFrozenModule`: 1 on success, 0 when the module is not
    /// frozen, -1 when it raised.
    fn import_frozen_module(&mut self, name: &CStr) -> c_int;

    /// `Py_FinalizeEx`: negative on failure.
    fn finalize(&mut self) -> c_int;
}
