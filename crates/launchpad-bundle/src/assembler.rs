//! Entry classifier and table assembler
//!
//! Walks the archive once, in archive order:
//! 1. Native libraries are mapped in memory; the interpreter image is kept
//!    as the host runtime handle
//! 2. Native extensions are mapped and their initializer resolved
//! 3. The argument manifest becomes the argument vector
//! 4. Everything else is a compiled module
//!
//! Extraction failures abort assembly. Load and export failures only log:
//! a bundle may ship images that are not needed on every OS version.
//!
//! Every buffer is owned by the [`Bundle`] under construction, so an early
//! return releases everything assembled so far.

use std::ffi::CString;

use launchpad_win::ActivationContext;
use tracing::{debug, info, warn};

use crate::archive::{ArchiveEntry, BundleArchive};
use crate::arguments::ArgumentVector;
use crate::conventions::{Conventions, EntryKind};
use crate::error::BundleError;
use crate::loader::{ImageHandle, ImageLoader, RawProc};
use crate::records::{CompiledModule, ExtensionInit, FrozenTable, InittabTable, NativeExtension};

/// Everything the interpreter starts from.
#[derive(Debug)]
pub struct Bundle {
    modules: Vec<CompiledModule>,
    extensions: Vec<NativeExtension>,
    arguments: ArgumentVector,
    host_runtime: Option<ImageHandle>,
    libraries: usize,
}

impl Bundle {
    pub fn modules(&self) -> &[CompiledModule] {
        &self.modules
    }

    pub fn extensions(&self) -> &[NativeExtension] {
        &self.extensions
    }

    pub fn arguments(&self) -> &ArgumentVector {
        &self.arguments
    }

    /// The interpreter's own image, if one was mapped.
    pub fn host_runtime(&self) -> Option<ImageHandle> {
        self.host_runtime
    }

    /// Number of native libraries mapped successfully.
    pub fn libraries(&self) -> usize {
        self.libraries
    }

    /// Sentinel-terminated frozen-module table.
    pub fn frozen_table(&self) -> FrozenTable<'_> {
        FrozenTable::new(&self.modules)
    }

    /// Sentinel-terminated built-in module table.
    pub fn inittab(&self) -> InittabTable<'_> {
        InittabTable::new(&self.extensions)
    }
}

struct PartialBundle {
    modules: Vec<CompiledModule>,
    extensions: Vec<NativeExtension>,
    arguments: Option<ArgumentVector>,
    host_runtime: Option<ImageHandle>,
    libraries: usize,
}

/// Classifies entries and loads native images under activation-context
/// scoping.
pub struct Assembler<'a> {
    conventions: &'a Conventions,
    actctx: &'a ActivationContext,
    loader: &'a mut dyn ImageLoader,
}

impl<'a> Assembler<'a> {
    pub fn new(
        conventions: &'a Conventions,
        actctx: &'a ActivationContext,
        loader: &'a mut dyn ImageLoader,
    ) -> Self {
        Self {
            conventions,
            actctx,
            loader,
        }
    }

    /// Extract and classify every entry of `archive`.
    pub fn assemble(&mut self, archive: &mut BundleArchive<'_>) -> Result<Bundle, BundleError> {
        let mut partial = PartialBundle {
            modules: Vec::new(),
            extensions: Vec::new(),
            arguments: None,
            host_runtime: None,
            libraries: 0,
        };

        for index in 0..archive.count() {
            let Some(entry) = archive.extract(index)? else {
                continue;
            };
            self.process(entry, &mut partial)?;
        }

        let arguments = partial
            .arguments
            .unwrap_or_else(|| ArgumentVector::program_only(self.conventions.program_id));

        let bundle = Bundle {
            modules: partial.modules,
            extensions: partial.extensions,
            arguments,
            host_runtime: partial.host_runtime,
            libraries: partial.libraries,
        };

        info!(
            modules = bundle.modules.len(),
            extensions = bundle.extensions.len(),
            libraries = bundle.libraries,
            arguments = bundle.arguments.len(),
            host_runtime = bundle.host_runtime.is_some(),
            "bundle assembled"
        );
        Ok(bundle)
    }

    fn process(&mut self, entry: ArchiveEntry, partial: &mut PartialBundle) -> Result<(), BundleError> {
        match self.conventions.classify(&entry.name) {
            EntryKind::Library => {
                self.load_library(&entry, partial);
                Ok(())
            }
            EntryKind::Extension => self.load_extension(&entry, partial),
            EntryKind::ArgumentManifest => {
                if partial.arguments.is_some() {
                    warn!(entry = %entry.name, "duplicate argument manifest replaces the previous one");
                }
                partial.arguments = Some(ArgumentVector::from_manifest(
                    self.conventions.program_id,
                    &entry.data,
                ));
                Ok(())
            }
            EntryKind::CompiledModule => self.add_module(entry, partial),
        }
    }

    fn map_scoped(&mut self, image: &[u8]) -> Option<ImageHandle> {
        let _scope = self.actctx.scope();
        self.loader.map_and_execute(image)
    }

    fn load_library(&mut self, entry: &ArchiveEntry, partial: &mut PartialBundle) {
        // The OS loader may still find a failed library on the system path.
        let Some(handle) = self.map_scoped(&entry.data) else {
            warn!(entry = %entry.name, "failed to load native library");
            return;
        };
        debug!(entry = %entry.name, "memory-loaded native library");
        partial.libraries += 1;

        if self.conventions.is_host_runtime(&entry.name) {
            if partial.host_runtime.is_some() {
                debug!(entry = %entry.name, "replacing previously loaded host runtime");
            }
            partial.host_runtime = Some(handle);
        }
    }

    fn load_extension(&mut self, entry: &ArchiveEntry, partial: &mut PartialBundle) -> Result<(), BundleError> {
        let names = self.conventions.extension_names(&entry.name);
        let init_symbol =
            CString::new(names.init_symbol.as_str()).map_err(|_| BundleError::InvalidName(entry.name.clone()))?;

        // The activation spans the load and the initializer lookup.
        let _scope = self.actctx.scope();
        let Some(handle) = self.loader.map_and_execute(&entry.data) else {
            warn!(entry = %entry.name, "failed to load native extension");
            return Ok(());
        };
        debug!(entry = %entry.name, "memory-loaded native extension");

        let init = self.loader.resolve_export(handle, &init_symbol).map(|proc| {
            // SAFETY: the initializer export has the `PyInit_*` signature.
            unsafe { std::mem::transmute::<RawProc, ExtensionInit>(proc) }
        });
        if init.is_none() {
            warn!(entry = %entry.name, symbol = %names.init_symbol, "could not resolve extension initializer");
        }

        partial.extensions.push(NativeExtension::new(&names.table_name, init)?);
        Ok(())
    }

    fn add_module(&mut self, entry: ArchiveEntry, partial: &mut PartialBundle) -> Result<(), BundleError> {
        let Some(path) = self.conventions.compiled_module_path(&entry.name) else {
            warn!(entry = %entry.name, "skipping entry that is not a compiled module");
            return Ok(());
        };
        let module = CompiledModule::new(&path.dotted, entry.data, path.is_package)?;
        partial.modules.push(module);
        Ok(())
    }
}
