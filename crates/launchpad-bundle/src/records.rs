//! Interpreter lookup table records
//!
//! Records are owned and length-counted on the Rust side. The interpreter
//! wants contiguous arrays terminated by an all-zero sentinel; those are
//! materialized as borrowed views ([`FrozenTable`], [`InittabTable`]) only at
//! the point where they are handed over.

use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::marker::PhantomData;
use std::ptr;

use crate::error::BundleError;

/// Module initializer exported by a native extension.
pub type ExtensionInit = unsafe extern "C" fn() -> *mut c_void;

/// A compiled module supplied from memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledModule {
    name: CString,
    code: Box<[u8]>,
    is_package: bool,
}

impl CompiledModule {
    pub fn new(name: &str, code: Vec<u8>, is_package: bool) -> Result<Self, BundleError> {
        if c_int::try_from(code.len()).is_err() {
            return Err(BundleError::EntryTooLarge(name.to_owned()));
        }
        let c_name = CString::new(name).map_err(|_| BundleError::InvalidName(name.to_owned()))?;
        Ok(Self {
            name: c_name,
            code: code.into_boxed_slice(),
            is_package,
        })
    }

    pub fn name(&self) -> &CStr {
        &self.name
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn is_package(&self) -> bool {
        self.is_package
    }

    /// Size as the interpreter reads it: negative for packages. The sign is
    /// the only package marker the interpreter looks at.
    pub fn stored_size(&self) -> c_int {
        // Checked against c_int::MAX in `new`.
        let size = self.code.len() as c_int;
        if self.is_package {
            -size
        } else {
            size
        }
    }
}

/// A native extension registered as a built-in module.
#[derive(Debug, Clone)]
pub struct NativeExtension {
    name: CString,
    init: Option<ExtensionInit>,
}

impl NativeExtension {
    pub fn new(name: &str, init: Option<ExtensionInit>) -> Result<Self, BundleError> {
        let c_name = CString::new(name).map_err(|_| BundleError::InvalidName(name.to_owned()))?;
        Ok(Self { name: c_name, init })
    }

    pub fn name(&self) -> &CStr {
        &self.name
    }

    pub fn init(&self) -> Option<ExtensionInit> {
        self.init
    }
}

/// `struct _frozen` as the interpreter reads it.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrozenRecord {
    pub name: *const c_char,
    pub code: *const u8,
    pub size: c_int,
}

impl FrozenRecord {
    pub const SENTINEL: Self = Self {
        name: ptr::null(),
        code: ptr::null(),
        size: 0,
    };

    pub fn is_sentinel(&self) -> bool {
        *self == Self::SENTINEL
    }
}

/// `struct _inittab` as the interpreter reads it.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct InittabRecord {
    pub name: *const c_char,
    pub initfunc: Option<ExtensionInit>,
}

impl InittabRecord {
    pub const SENTINEL: Self = Self {
        name: ptr::null(),
        initfunc: None,
    };

    pub fn is_sentinel(&self) -> bool {
        self.name.is_null() && self.initfunc.is_none()
    }
}

/// Sentinel-terminated frozen-module array borrowing from its modules.
#[derive(Debug)]
pub struct FrozenTable<'a> {
    records: Vec<FrozenRecord>,
    _modules: PhantomData<&'a [CompiledModule]>,
}

impl<'a> FrozenTable<'a> {
    pub fn new(modules: &'a [CompiledModule]) -> Self {
        let mut records = Vec::with_capacity(modules.len() + 1);
        records.extend(modules.iter().map(|m| FrozenRecord {
            name: m.name().as_ptr(),
            code: m.code().as_ptr(),
            size: m.stored_size(),
        }));
        records.push(FrozenRecord::SENTINEL);
        Self {
            records,
            _modules: PhantomData,
        }
    }

    /// All records, sentinel included.
    pub fn records(&self) -> &[FrozenRecord] {
        &self.records
    }

    pub fn as_ptr(&self) -> *const FrozenRecord {
        self.records.as_ptr()
    }
}

/// Sentinel-terminated built-in module array borrowing from its extensions.
#[derive(Debug)]
pub struct InittabTable<'a> {
    records: Vec<InittabRecord>,
    _extensions: PhantomData<&'a [NativeExtension]>,
}

impl<'a> InittabTable<'a> {
    pub fn new(extensions: &'a [NativeExtension]) -> Self {
        let mut records = Vec::with_capacity(extensions.len() + 1);
        records.extend(extensions.iter().map(|e| InittabRecord {
            name: e.name().as_ptr(),
            initfunc: e.init(),
        }));
        records.push(InittabRecord::SENTINEL);
        Self {
            records,
            _extensions: PhantomData,
        }
    }

    /// All records, sentinel included.
    pub fn records(&self) -> &[InittabRecord] {
        &self.records
    }

    pub fn as_mut_ptr(&mut self) -> *mut InittabRecord {
        self.records.as_mut_ptr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe extern "C" fn init_stub() -> *mut c_void {
        ptr::null_mut()
    }

    #[test]
    fn test_package_size_is_negated() {
        let module = CompiledModule::new("pkg.sub", vec![1, 2, 3], true).unwrap();
        assert_eq!(module.stored_size(), -3);

        let module = CompiledModule::new("pkg.sub.mod", vec![1, 2, 3, 4], false).unwrap();
        assert_eq!(module.stored_size(), 4);
    }

    #[test]
    fn test_interior_nul_rejected() {
        assert!(matches!(
            CompiledModule::new("bad\0name", vec![1], false),
            Err(BundleError::InvalidName(_))
        ));
        assert!(matches!(
            NativeExtension::new("bad\0name", None),
            Err(BundleError::InvalidName(_))
        ));
    }

    #[test]
    fn test_frozen_table_is_sentinel_terminated() {
        let modules = vec![
            CompiledModule::new("__main__", b"main".to_vec(), false).unwrap(),
            CompiledModule::new("pkg", b"pk".to_vec(), true).unwrap(),
        ];
        let table = FrozenTable::new(&modules);
        let records = table.records();

        assert_eq!(records.len(), 3);
        assert!(records[2].is_sentinel());
        assert_eq!(records[0].name, modules[0].name().as_ptr());
        assert_eq!(records[0].code, modules[0].code().as_ptr());
        assert_eq!(records[0].size, 4);
        assert_eq!(records[1].size, -2);
        assert_eq!(table.as_ptr(), records.as_ptr());
    }

    #[test]
    fn test_empty_tables_hold_only_sentinel() {
        let frozen = FrozenTable::new(&[]);
        assert_eq!(frozen.records(), &[FrozenRecord::SENTINEL]);

        let inittab = InittabTable::new(&[]);
        assert_eq!(inittab.records().len(), 1);
        assert!(inittab.records()[0].is_sentinel());
    }

    #[test]
    fn test_inittab_keeps_null_initializers() {
        let extensions = vec![
            NativeExtension::new("_ssl", Some(init_stub)).unwrap(),
            NativeExtension::new("_broken", None).unwrap(),
        ];
        let mut table = InittabTable::new(&extensions);
        let records = table.records();

        assert_eq!(records.len(), 3);
        assert!(records[0].initfunc.is_some());
        assert!(records[1].initfunc.is_none());
        assert!(!records[1].is_sentinel());
        assert!(records[2].is_sentinel());
        assert!(!table.as_mut_ptr().is_null());
    }
}
