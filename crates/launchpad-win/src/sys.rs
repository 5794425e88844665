//! kernel32 / psapi declarations used by the backends.

#![allow(non_snake_case)]

use std::ffi::{c_char, c_void, CStr};
use std::ptr::NonNull;

pub type Handle = *mut c_void;
pub type Bool = i32;
pub type Dword = u32;

pub const PAGE_READONLY: Dword = 0x02;
pub const FILE_MAP_READ: Dword = 0x0004;
pub const MAX_PATH: usize = 260;

extern "system" {
    pub fn GetModuleHandleW(name: *const u16) -> Handle;
    pub fn GetProcAddress(module: Handle, name: *const c_char) -> *mut c_void;
    pub fn GetTickCount() -> Dword;
    pub fn GetFileSize(file: Handle, size_high: *mut Dword) -> Dword;
    pub fn CreateFileMappingW(
        file: Handle,
        attributes: *mut c_void,
        protect: Dword,
        max_size_high: Dword,
        max_size_low: Dword,
        name: *const u16,
    ) -> Handle;
    pub fn MapViewOfFile(
        mapping: Handle,
        access: Dword,
        offset_high: Dword,
        offset_low: Dword,
        bytes: usize,
    ) -> *mut c_void;
    pub fn UnmapViewOfFile(base: *const c_void) -> Bool;
    pub fn CloseHandle(handle: Handle) -> Bool;
    pub fn GetCurrentProcess() -> Handle;
    pub fn GetLogicalDriveStringsW(length: Dword, buffer: *mut u16) -> Dword;
    pub fn QueryDosDeviceW(device: *const u16, target: *mut u16, max: Dword) -> Dword;
}

// Lives in psapi.dll on NT 5.x; newer systems forward it from kernel32.
#[link(name = "psapi")]
extern "system" {
    pub fn GetMappedFileNameW(
        process: Handle,
        address: *mut c_void,
        filename: *mut u16,
        size: Dword,
    ) -> Dword;
}

/// NUL-terminated UTF-16 copy of `s`.
pub fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// `GetProcAddress` on an already loaded module.
pub unsafe fn proc_address(module: Handle, name: &CStr) -> Option<NonNull<c_void>> {
    NonNull::new(GetProcAddress(module, name.as_ptr()))
}
