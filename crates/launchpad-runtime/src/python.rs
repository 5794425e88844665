//! Interpreter API resolved from the host runtime image
//!
//! The host runtime was mapped by the reflective loader, so its exports are
//! looked up by name and cast to their C signatures. Data exports (the
//! configuration flags and the frozen-module table pointer) resolve to the
//! address of the variable.

use std::ffi::{c_char, c_int, c_long, c_void, CStr};
use std::mem;
use std::ptr::{self, NonNull};

use launchpad_bundle::{FrozenRecord, ImageHandle, ImageLoader, InittabRecord, RawProc};
use tracing::debug;

use crate::error::BootError;
use crate::interpreter::{GilState, Interpreter, WideChar};

type PyObject = c_void;

type IsInitializedFn = unsafe extern "C" fn() -> c_int;
type GetPathFn = unsafe extern "C" fn() -> *mut WideChar;
type InitializeFn = unsafe extern "C" fn();
type FinalizeExFn = unsafe extern "C" fn() -> c_int;
type DecodeLocaleFn = unsafe extern "C" fn(*const c_char, *mut usize) -> *mut WideChar;
type RawFreeFn = unsafe extern "C" fn(*mut c_void);
type SetProgramNameFn = unsafe extern "C" fn(*const WideChar);
type SetArgvFn = unsafe extern "C" fn(c_int, *mut *mut WideChar);
type ImportFrozenModuleFn = unsafe extern "C" fn(*const c_char) -> c_int;
type ExtendInittabFn = unsafe extern "C" fn(*mut InittabRecord) -> c_int;
type SysSetObjectFn = unsafe extern "C" fn(*const c_char, *mut PyObject) -> c_int;
type BoolFromLongFn = unsafe extern "C" fn(c_long) -> *mut PyObject;
type DecRefFn = unsafe extern "C" fn(*mut PyObject);
type InitThreadsFn = unsafe extern "C" fn();
type GilEnsureFn = unsafe extern "C" fn() -> c_int;
type GilReleaseFn = unsafe extern "C" fn(c_int);

struct Resolver<'a> {
    loader: &'a dyn ImageLoader,
    image: ImageHandle,
}

impl Resolver<'_> {
    fn export(&self, name: &CStr) -> Result<RawProc, BootError> {
        self.loader
            .resolve_export(self.image, name)
            .ok_or_else(|| BootError::MissingExport(name.to_string_lossy().into_owned()))
    }

    /// # Safety
    /// `F` must be the function pointer type of the export.
    unsafe fn function<F: Copy>(&self, name: &CStr) -> Result<F, BootError> {
        let proc = self.export(name)?;
        debug_assert_eq!(mem::size_of::<F>(), mem::size_of::<RawProc>());
        Ok(mem::transmute_copy::<RawProc, F>(&proc))
    }

    fn data<T>(&self, name: &CStr) -> Result<NonNull<T>, BootError> {
        let proc = self.export(name)?;
        NonNull::new(proc as *mut T).ok_or_else(|| BootError::MissingExport(name.to_string_lossy().into_owned()))
    }
}

/// The embedding API of a reflectively loaded interpreter.
pub struct PythonApi {
    is_initialized: IsInitializedFn,
    get_path: GetPathFn,
    initialize: InitializeFn,
    finalize_ex: FinalizeExFn,
    decode_locale: DecodeLocaleFn,
    raw_free: RawFreeFn,
    set_program_name: SetProgramNameFn,
    set_argv: SetArgvFn,
    import_frozen_module: ImportFrozenModuleFn,
    extend_inittab: ExtendInittabFn,
    sys_set_object: SysSetObjectFn,
    bool_from_long: BoolFromLongFn,
    dec_ref: DecRefFn,
    init_threads: InitThreadsFn,
    gil_ensure: GilEnsureFn,
    gil_release: GilReleaseFn,

    ignore_environment_flag: NonNull<c_int>,
    no_user_site_directory: NonNull<c_int>,
    frozen_flag: NonNull<c_int>,
    frozen_modules: NonNull<*const FrozenRecord>,
}

impl PythonApi {
    /// Resolve every entry point the bootstrap needs from `image`.
    pub fn resolve(loader: &dyn ImageLoader, image: ImageHandle) -> Result<Self, BootError> {
        let r = Resolver { loader, image };

        // SAFETY: each type alias mirrors the C declaration of its export.
        let api = unsafe {
            Self {
                is_initialized: r.function(c"Py_IsInitialized")?,
                get_path: r.function(c"Py_GetPath")?,
                initialize: r.function(c"Py_Initialize")?,
                finalize_ex: r.function(c"Py_FinalizeEx")?,
                decode_locale: r.function(c"Py_DecodeLocale")?,
                raw_free: r.function(c"PyMem_RawFree")?,
                set_program_name: r.function(c"Py_SetProgramName")?,
                set_argv: r.function(c"PySys_SetArgv")?,
                import_frozen_module: r.function(c"PyImport_ImportFrozenModule")?,
                extend_inittab: r.function(c"PyImport_ExtendInittab")?,
                sys_set_object: r.function(c"PySys_SetObject")?,
                bool_from_long: r.function(c"PyBool_FromLong")?,
                dec_ref: r.function(c"Py_DecRef")?,
                init_threads: r.function(c"PyEval_InitThreads")?,
                gil_ensure: r.function(c"PyGILState_Ensure")?,
                gil_release: r.function(c"PyGILState_Release")?,

                ignore_environment_flag: r.data(c"Py_IgnoreEnvironmentFlag")?,
                no_user_site_directory: r.data(c"Py_NoUserSiteDirectory")?,
                frozen_flag: r.data(c"Py_FrozenFlag")?,
                frozen_modules: r.data(c"PyImport_FrozenModules")?,
            }
        };

        debug!(image = ?image.as_raw(), "resolved interpreter API");
        Ok(api)
    }
}

impl Interpreter for PythonApi {
    fn is_initialized(&self) -> bool {
        unsafe { (self.is_initialized)() != 0 }
    }

    fn isolate(&mut self) {
        unsafe {
            *self.ignore_environment_flag.as_ptr() = 1;
            *self.no_user_site_directory.as_ptr() = 1;
            let path = (self.get_path)();
            if !path.is_null() {
                *path = 0;
            }
        }
    }

    fn set_frozen_startup(&mut self) {
        unsafe { *self.frozen_flag.as_ptr() = 1 }
    }

    fn decode_locale(&mut self, arg: &CStr) -> Option<NonNull<WideChar>> {
        NonNull::new(unsafe { (self.decode_locale)(arg.as_ptr(), ptr::null_mut()) })
    }

    unsafe fn raw_free(&mut self, ptr: NonNull<WideChar>) {
        (self.raw_free)(ptr.as_ptr().cast())
    }

    unsafe fn extend_inittab(&mut self, table: *mut InittabRecord) -> bool {
        (self.extend_inittab)(table) == 0
    }

    unsafe fn install_frozen_modules(&mut self, table: *const FrozenRecord) {
        *self.frozen_modules.as_ptr() = table;
    }

    unsafe fn set_program_name(&mut self, name: *const WideChar) {
        (self.set_program_name)(name)
    }

    fn initialize(&mut self) {
        unsafe {
            (self.initialize)();
            (self.init_threads)();
        }
    }

    fn mark_frozen(&mut self) {
        unsafe {
            let value = (self.bool_from_long)(1);
            (self.sys_set_object)(c"frozen".as_ptr(), value);
            if !value.is_null() {
                (self.dec_ref)(value);
            }
        }
    }

    unsafe fn set_argv(&mut self, argv: &mut [*mut WideChar]) {
        (self.set_argv)(argv.len() as c_int, argv.as_mut_ptr())
    }

    fn gil_ensure(&mut self) -> GilState {
        GilState(unsafe { (self.gil_ensure)() })
    }

    fn gil_release(&mut self, state: GilState) {
        unsafe { (self.gil_release)(state.0) }
    }

    fn import_frozen_module(&mut self, name: &CStr) -> c_int {
        unsafe { (self.import_frozen_module)(name.as_ptr()) }
    }

    fn finalize(&mut self) -> c_int {
        unsafe { (self.finalize_ex)() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    unsafe extern "system" fn placeholder() -> isize {
        0
    }

    /// Exports every symbol except those listed, recording each lookup.
    struct Exports {
        missing: &'static [&'static str],
        lookups: RefCell<Vec<String>>,
    }

    impl ImageLoader for Exports {
        fn map_and_execute(&mut self, _image: &[u8]) -> Option<ImageHandle> {
            None
        }

        fn resolve_export(&self, _image: ImageHandle, name: &CStr) -> Option<RawProc> {
            let name = name.to_string_lossy().into_owned();
            let found = !self.missing.contains(&name.as_str());
            self.lookups.borrow_mut().push(name);
            found.then_some(placeholder as RawProc)
        }

        fn register_import_override(&mut self, _module: &CStr, _symbol: &CStr, _replacement: RawProc) {}
    }

    fn host() -> ImageHandle {
        ImageHandle::new(0x1000 as *mut c_void).unwrap()
    }

    #[test]
    fn test_resolves_complete_api() {
        let exports = Exports {
            missing: &[],
            lookups: RefCell::new(Vec::new()),
        };
        assert!(PythonApi::resolve(&exports, host()).is_ok());

        let lookups = exports.lookups.borrow();
        assert_eq!(lookups.len(), 20);
        assert!(lookups.iter().any(|n| n == "PyImport_FrozenModules"));
        assert!(lookups.iter().any(|n| n == "PyGILState_Ensure"));
    }

    #[test]
    fn test_missing_export_is_named() {
        let exports = Exports {
            missing: &["Py_FinalizeEx"],
            lookups: RefCell::new(Vec::new()),
        };
        match PythonApi::resolve(&exports, host()) {
            Err(BootError::MissingExport(name)) => assert_eq!(name, "Py_FinalizeEx"),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("resolution should fail"),
        }
    }

    #[test]
    fn test_missing_data_export_is_named() {
        let exports = Exports {
            missing: &["Py_FrozenFlag"],
            lookups: RefCell::new(Vec::new()),
        };
        assert!(matches!(
            PythonApi::resolve(&exports, host()),
            Err(BootError::MissingExport(name)) if name == "Py_FrozenFlag"
        ));
    }
}
