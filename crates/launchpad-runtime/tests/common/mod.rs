//! Shared fixtures: a scripted interpreter, a scripted image loader and a
//! synthetic bundle builder.

#![allow(dead_code)]

use std::ffi::{c_int, c_void, CStr};
use std::io::{Cursor, Write};
use std::ptr::{self, NonNull};

use launchpad_bundle::{
    Assembler, Bundle, BundleArchive, Conventions, FrozenRecord, ImageHandle, ImageLoader,
    InittabRecord, RawProc,
};
use launchpad_runtime::{GilState, Interpreter, WideChar};
use launchpad_win::ActivationContext;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

unsafe extern "system" fn fake_export() -> isize {
    0
}

pub fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, data) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// Maps every `MZ` image; `MZ:<symbol>` also exports `<symbol>`.
#[derive(Default)]
pub struct MockLoader {
    mapped: Vec<Vec<u8>>,
}

impl ImageLoader for MockLoader {
    fn map_and_execute(&mut self, image: &[u8]) -> Option<ImageHandle> {
        if !image.starts_with(b"MZ") {
            return None;
        }
        self.mapped.push(image.to_vec());
        ImageHandle::new((0x1000 * self.mapped.len()) as *mut c_void)
    }

    fn resolve_export(&self, image: ImageHandle, name: &CStr) -> Option<RawProc> {
        let index = (image.as_raw() as usize / 0x1000).checked_sub(1)?;
        let exported = self.mapped.get(index)?.strip_prefix(b"MZ:")?;
        (exported == name.to_bytes()).then_some(fake_export as RawProc)
    }

    fn register_import_override(&mut self, _module: &CStr, _symbol: &CStr, _replacement: RawProc) {}
}

/// Assemble `archive` with a disabled activation context.
pub fn assemble(archive: &[u8], loader: &mut MockLoader) -> Bundle {
    let actctx = ActivationContext::disabled();
    let conventions = Conventions::default();
    let mut archive = BundleArchive::open(archive).unwrap();
    let bundle = Assembler::new(&conventions, &actctx, loader)
        .assemble(&mut archive)
        .unwrap();
    archive.close();
    bundle
}

unsafe fn read_wide(ptr: *const WideChar) -> String {
    let mut len = 0;
    while *ptr.add(len) != 0 {
        len += 1;
    }
    std::slice::from_raw_parts(ptr, len)
        .iter()
        .filter_map(|&c| char::from_u32(c as u32))
        .collect()
}

/// Interpreter double that reads the tables the way the real one does and
/// owns its decoded strings on the Rust heap.
pub struct MockInterpreter {
    pub already_initialized: bool,
    /// 1-based argument position whose decoding fails.
    pub fail_decode_at: Option<usize>,
    pub refuse_inittab: bool,
    /// Forced import result; by default the frozen table is searched.
    pub import_result: Option<c_int>,
    pub finalize_result: c_int,

    pub calls: Vec<&'static str>,
    pub live_strings: usize,
    pub builtins: Vec<String>,
    pub program_name: Option<String>,
    pub argv: Vec<String>,
    pub imported_under_gil: bool,
    decode_calls: usize,
    frozen: *const FrozenRecord,
    gil_held: bool,
}

impl MockInterpreter {
    pub fn new() -> Self {
        Self {
            already_initialized: false,
            fail_decode_at: None,
            refuse_inittab: false,
            import_result: None,
            finalize_result: 0,
            calls: Vec::new(),
            live_strings: 0,
            builtins: Vec::new(),
            program_name: None,
            argv: Vec::new(),
            imported_under_gil: false,
            decode_calls: 0,
            frozen: ptr::null(),
            gil_held: false,
        }
    }

    fn find_frozen(&self, name: &CStr) -> bool {
        if self.frozen.is_null() {
            return false;
        }
        let mut record = self.frozen;
        unsafe {
            while !(*record).is_sentinel() {
                if CStr::from_ptr((*record).name) == name {
                    return true;
                }
                record = record.add(1);
            }
        }
        false
    }
}

impl Interpreter for MockInterpreter {
    fn is_initialized(&self) -> bool {
        self.already_initialized
    }

    fn isolate(&mut self) {
        self.calls.push("isolate");
    }

    fn set_frozen_startup(&mut self) {
        self.calls.push("set_frozen_startup");
    }

    fn decode_locale(&mut self, arg: &CStr) -> Option<NonNull<WideChar>> {
        self.calls.push("decode_locale");
        self.decode_calls += 1;
        if self.fail_decode_at == Some(self.decode_calls) {
            return None;
        }
        let wide: Box<[WideChar]> = arg
            .to_bytes_with_nul()
            .iter()
            .map(|&b| b as WideChar)
            .collect();
        self.live_strings += 1;
        NonNull::new(Box::into_raw(wide).cast::<WideChar>())
    }

    unsafe fn raw_free(&mut self, ptr: NonNull<WideChar>) {
        self.calls.push("raw_free");
        let mut len = 0;
        while *ptr.as_ptr().add(len) != 0 {
            len += 1;
        }
        drop(Box::from_raw(ptr::slice_from_raw_parts_mut(ptr.as_ptr(), len + 1)));
        self.live_strings -= 1;
    }

    unsafe fn extend_inittab(&mut self, table: *mut InittabRecord) -> bool {
        self.calls.push("extend_inittab");
        let mut record = table;
        while !(*record).is_sentinel() {
            self.builtins.push(CStr::from_ptr((*record).name).to_string_lossy().into_owned());
            record = record.add(1);
        }
        !self.refuse_inittab
    }

    unsafe fn install_frozen_modules(&mut self, table: *const FrozenRecord) {
        self.calls.push("install_frozen_modules");
        self.frozen = table;
    }

    unsafe fn set_program_name(&mut self, name: *const WideChar) {
        self.calls.push("set_program_name");
        self.program_name = Some(read_wide(name));
    }

    fn initialize(&mut self) {
        self.calls.push("initialize");
    }

    fn mark_frozen(&mut self) {
        self.calls.push("mark_frozen");
    }

    unsafe fn set_argv(&mut self, argv: &mut [*mut WideChar]) {
        self.calls.push("set_argv");
        self.argv = argv.iter().map(|&arg| read_wide(arg)).collect();
        // The real interpreter may rewrite its argument array.
        for arg in argv.iter_mut() {
            *arg = ptr::null_mut();
        }
    }

    fn gil_ensure(&mut self) -> GilState {
        self.calls.push("gil_ensure");
        self.gil_held = true;
        GilState(1)
    }

    fn gil_release(&mut self, state: GilState) {
        self.calls.push("gil_release");
        assert_eq!(state, GilState(1));
        self.gil_held = false;
    }

    fn import_frozen_module(&mut self, name: &CStr) -> c_int {
        self.calls.push("import_frozen_module");
        self.imported_under_gil = self.gil_held;
        match self.import_result {
            Some(result) => result,
            None => c_int::from(self.find_frozen(name)),
        }
    }

    fn finalize(&mut self) -> c_int {
        self.calls.push("finalize");
        self.finalize_result
    }
}
