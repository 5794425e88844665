//! Argument decoding and interpreter session ownership
//!
//! Decoded arguments are allocated by the interpreter and must go back to it.
//! The interpreter may rewrite the argument array it is given, so two views
//! are kept: the originals, freed when the session ends, and a working copy
//! handed over with `set_argv`.

use std::ffi::{CStr, CString};
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};

use launchpad_bundle::ArgumentVector;
use tracing::{debug, warn};

use crate::error::BootError;
use crate::interpreter::{Interpreter, WideChar};

/// Switches the process to the native locale and restores the previous one
/// on drop.
pub(crate) struct LocaleScope {
    saved: Option<CString>,
}

impl LocaleScope {
    pub(crate) fn native() -> Self {
        // SAFETY: setlocale returns a NUL-terminated string owned by the C
        // runtime; it is copied before the next setlocale call.
        let saved = unsafe {
            let current = libc::setlocale(libc::LC_ALL, ptr::null());
            (!current.is_null()).then(|| CStr::from_ptr(current).to_owned())
        };
        if saved.is_none() {
            warn!("current locale unknown, it will not be restored");
        }
        unsafe {
            libc::setlocale(libc::LC_ALL, c"".as_ptr());
        }
        Self { saved }
    }
}

impl Drop for LocaleScope {
    fn drop(&mut self) {
        if let Some(saved) = &self.saved {
            unsafe {
                libc::setlocale(libc::LC_ALL, saved.as_ptr());
            }
        }
    }
}

/// Exclusive use of the interpreter for one bootstrap, owning every string
/// the interpreter allocated on its behalf.
pub(crate) struct Session<'i, I: Interpreter + ?Sized> {
    interp: &'i mut I,
    decoded: Vec<NonNull<WideChar>>,
    argv: Vec<*mut WideChar>,
}

impl<'i, I: Interpreter + ?Sized> Session<'i, I> {
    pub(crate) fn new(interp: &'i mut I) -> Self {
        Self {
            interp,
            decoded: Vec::new(),
            argv: Vec::new(),
        }
    }

    /// Decode `args` under the native locale.
    ///
    /// Stops at the first argument that fails; the ones decoded before it are
    /// still released with the session.
    pub(crate) fn decode_arguments(&mut self, args: &ArgumentVector) -> Result<(), BootError> {
        let _locale = LocaleScope::native();
        self.decoded.reserve(args.len());

        for (index, arg) in args.iter().enumerate() {
            let Some(wide) = self.interp.decode_locale(arg) else {
                return Err(BootError::ArgumentDecode { position: index + 1 });
            };
            self.decoded.push(wide);
        }

        self.argv = self.decoded.iter().map(|p| p.as_ptr()).collect();
        debug!(count = self.decoded.len(), "decoded arguments");
        Ok(())
    }

    pub(crate) fn argc(&self) -> usize {
        self.decoded.len()
    }

    /// Set the program name from the first decoded argument.
    pub(crate) fn install_program_name(&mut self) {
        if let Some(name) = self.decoded.first() {
            // SAFETY: the string lives until the session ends, after finalize.
            unsafe { self.interp.set_program_name(name.as_ptr()) }
        }
    }

    /// Hand the working argument array to the interpreter.
    pub(crate) fn install_argv(&mut self) {
        // SAFETY: every element is a decoded, NUL-terminated string.
        unsafe { self.interp.set_argv(&mut self.argv) }
    }
}

impl<I: Interpreter + ?Sized> Deref for Session<'_, I> {
    type Target = I;

    fn deref(&self) -> &I {
        &*self.interp
    }
}

impl<I: Interpreter + ?Sized> DerefMut for Session<'_, I> {
    fn deref_mut(&mut self) -> &mut I {
        &mut *self.interp
    }
}

impl<I: Interpreter + ?Sized> Drop for Session<'_, I> {
    fn drop(&mut self) {
        self.argv.clear();
        for ptr in self.decoded.drain(..) {
            // SAFETY: each pointer came from decode_locale and is freed once.
            unsafe { self.interp.raw_free(ptr) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn current_locale() -> Option<CString> {
        unsafe {
            let current = libc::setlocale(libc::LC_ALL, ptr::null());
            (!current.is_null()).then(|| CStr::from_ptr(current).to_owned())
        }
    }

    #[test]
    fn test_locale_is_restored() {
        let before = current_locale();
        {
            let _scope = LocaleScope::native();
        }
        assert_eq!(current_locale(), before);
    }
}
