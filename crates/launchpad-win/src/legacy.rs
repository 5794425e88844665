//! Stand-ins for kernel32 exports that only exist from Vista onwards.
//!
//! Interpreter images built for newer systems import `GetTickCount64` and
//! `GetFinalPathNameByHandleW`. The reflective loader binds those imports to
//! the functions here, so the same image runs unmodified on NT 5.x.

/// 64-bit millisecond clock built from successive readings of the wrapping
/// 32-bit `GetTickCount` counter.
#[derive(Debug, Default)]
pub struct TickAccumulator {
    last: u32,
    total: u64,
}

impl TickAccumulator {
    pub const fn new() -> Self {
        Self { last: 0, total: 0 }
    }

    /// Fold a new counter reading into the running total and return it.
    ///
    /// Only correct while readings arrive less than one counter period
    /// (about 49.7 days) apart.
    pub fn advance(&mut self, current: u32) -> u64 {
        self.total += u64::from(current.wrapping_sub(self.last));
        self.last = current;
        self.total
    }
}

/// A drive letter and the NT device behind it (`C` -> `\Device\HarddiskVolume2`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DosDevice {
    pub drive: u16,
    pub device: Vec<u16>,
}

const BACKSLASH: u16 = b'\\' as u16;
const COLON: u16 = b':' as u16;

fn fold_ascii(c: u16) -> u16 {
    if (u16::from(b'A')..=u16::from(b'Z')).contains(&c) {
        c + 32
    } else {
        c
    }
}

/// Rewrite an NT device path (`\Device\HarddiskVolume2\dir\file`) to its DOS
/// form (`C:\dir\file`) using the first device that prefixes it.
///
/// Device names compare case-insensitively and must be followed by `\`.
/// Returns `None` when no device matches.
pub fn device_path_to_dos<I>(path: &[u16], devices: I) -> Option<Vec<u16>>
where
    I: IntoIterator<Item = DosDevice>,
{
    for dos in devices {
        let len = dos.device.len();
        if len == 0 || path.len() <= len || path[len] != BACKSLASH {
            continue;
        }
        let matches = path[..len]
            .iter()
            .zip(&dos.device)
            .all(|(&a, &b)| fold_ascii(a) == fold_ascii(b));
        if !matches {
            continue;
        }

        let mut out = Vec::with_capacity(2 + path.len() - len);
        out.push(dos.drive);
        out.push(COLON);
        out.extend_from_slice(&path[len..]);
        return Some(out);
    }
    None
}

// ============================================================================
// kernel32 replacements
// ============================================================================

#[cfg(windows)]
static TICKS: parking_lot::Mutex<TickAccumulator> = parking_lot::const_mutex(TickAccumulator::new());

/// `GetTickCount64` replacement.
#[cfg(windows)]
pub unsafe extern "system" fn get_tick_count64() -> u64 {
    let now = crate::sys::GetTickCount();
    TICKS.lock().advance(now)
}

/// `GetFinalPathNameByHandleW` replacement.
///
/// Maps one byte of the file, asks for the mapped file name and rewrites the
/// device prefix to a drive letter. Fails (returns 0) for zero-length files
/// and when no drive matches. Otherwise follows the real API: returns the
/// path length on success, or the required capacity (terminator included)
/// when `capacity` is too small. `flags` is ignored.
#[cfg(windows)]
pub unsafe extern "system" fn get_final_path_name_by_handle_w(
    file: *mut std::ffi::c_void,
    buffer: *mut u16,
    capacity: u32,
    _flags: u32,
) -> u32 {
    match mapped_dos_path(file) {
        Some(path) => copy_out(&path, buffer, capacity),
        None => 0,
    }
}

#[cfg(windows)]
struct Mapping(crate::sys::Handle);

#[cfg(windows)]
impl Drop for Mapping {
    fn drop(&mut self) {
        unsafe {
            crate::sys::CloseHandle(self.0);
        }
    }
}

#[cfg(windows)]
struct View(*mut std::ffi::c_void);

#[cfg(windows)]
impl Drop for View {
    fn drop(&mut self) {
        unsafe {
            crate::sys::UnmapViewOfFile(self.0);
        }
    }
}

#[cfg(windows)]
unsafe fn mapped_dos_path(file: crate::sys::Handle) -> Option<Vec<u16>> {
    use crate::sys;

    let mut size_high = 0;
    let size_low = sys::GetFileSize(file, &mut size_high);
    if size_low == 0 && size_high == 0 {
        tracing::debug!("cannot map a file with a length of zero");
        return None;
    }

    let mapping = sys::CreateFileMappingW(
        file,
        std::ptr::null_mut(),
        sys::PAGE_READONLY,
        0,
        1,
        std::ptr::null(),
    );
    if mapping.is_null() {
        return None;
    }
    let mapping = Mapping(mapping);

    let view = sys::MapViewOfFile(mapping.0, sys::FILE_MAP_READ, 0, 0, 1);
    if view.is_null() {
        return None;
    }
    let view = View(view);

    let mut name = vec![0u16; 4 * sys::MAX_PATH];
    let len = sys::GetMappedFileNameW(
        sys::GetCurrentProcess(),
        view.0,
        name.as_mut_ptr(),
        name.len() as u32 - 1,
    ) as usize;
    if len == 0 {
        return None;
    }
    name.truncate(len);

    device_path_to_dos(&name, logical_drive_devices())
}

#[cfg(windows)]
fn logical_drive_devices() -> Vec<DosDevice> {
    use crate::sys;

    let mut drives = [0u16; 512];
    let len = unsafe { sys::GetLogicalDriveStringsW(drives.len() as u32 - 1, drives.as_mut_ptr()) }
        as usize;
    if len == 0 || len >= drives.len() {
        return Vec::new();
    }

    // "C:\\\0D:\\\0\0"
    drives[..len]
        .split(|&c| c == 0)
        .filter(|root| !root.is_empty())
        .filter_map(|root| {
            let name = [root[0], COLON, 0];
            let mut target = [0u16; sys::MAX_PATH];
            let written =
                unsafe { sys::QueryDosDeviceW(name.as_ptr(), target.as_mut_ptr(), target.len() as u32) };
            if written == 0 {
                return None;
            }
            // First string of the returned list is the active mapping.
            let device = target.iter().take_while(|&&c| c != 0).copied().collect();
            Some(DosDevice {
                drive: root[0],
                device,
            })
        })
        .collect()
}

#[cfg(windows)]
unsafe fn copy_out(path: &[u16], buffer: *mut u16, capacity: u32) -> u32 {
    let needed = path.len() + 1;
    if buffer.is_null() || (capacity as usize) < needed {
        return needed as u32;
    }
    std::ptr::copy_nonoverlapping(path.as_ptr(), buffer, path.len());
    *buffer.add(path.len()) = 0;
    path.len() as u32
}
