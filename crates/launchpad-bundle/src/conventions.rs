//! Entry naming conventions
//!
//! Every marker here is shared with the tool that builds the bundle and with
//! the interpreter-side import hooks. Changing one breaks existing bundles.
//!
//! ```text
//! python38.dll            → Library (host runtime: name starts with "python")
//! lxml.etree.pyd          → Extension  PyInit_etree, __native__lxml__dot__etree
//! argv.txt                → ArgumentManifest
//! pkg/sub/__init__.pyc    → CompiledModule  pkg.sub  (package)
//! pkg/sub/mod.pyc         → CompiledModule  pkg.sub.mod
//! ```

/// Naming conventions of bundle entries and the interpreter tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conventions {
    /// Substring identifying native libraries.
    pub library_marker: &'static str,
    /// Substring identifying native extension modules.
    pub extension_marker: &'static str,
    /// Exact name of the argument manifest.
    pub argument_manifest: &'static str,
    /// File name marking a package directory.
    pub package_marker: &'static str,
    /// Suffix of compiled modules.
    pub compiled_suffix: &'static str,
    /// Replaces `.` in extension table names.
    pub extension_separator: &'static str,
    /// Prepended to extension table names that contain a separator.
    pub redirect_prefix: &'static str,
    /// Prefix of the exported extension initializer.
    pub init_prefix: &'static str,
    /// Name prefix of the interpreter's own image, compared case-insensitively.
    pub host_runtime_prefix: &'static str,
    /// Synthetic argv[0].
    pub program_id: &'static str,
    /// Frozen module executed at startup.
    pub entry_module: &'static str,
}

impl Default for Conventions {
    fn default() -> Self {
        Self {
            library_marker: ".dll",
            extension_marker: ".pyd",
            argument_manifest: "argv.txt",
            package_marker: "__init__.pyc",
            compiled_suffix: ".pyc",
            extension_separator: "__dot__",
            redirect_prefix: "__native__",
            init_prefix: "PyInit_",
            host_runtime_prefix: "python",
            program_id: "__client__",
            entry_module: "__main__",
        }
    }
}

/// What an archive entry is, by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Library,
    Extension,
    ArgumentManifest,
    CompiledModule,
}

/// Canonical dotted module path of a compiled entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModulePath {
    pub dotted: String,
    pub is_package: bool,
}

/// Names derived from an extension entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionNames {
    /// Export looked up in the mapped image (`PyInit_<leaf>`).
    pub init_symbol: String,
    /// Name registered in the built-in module table.
    pub table_name: String,
}

impl Conventions {
    /// Classify an entry. Checked in priority order: library, extension,
    /// argument manifest, compiled module.
    pub fn classify(&self, name: &str) -> EntryKind {
        if name.contains(self.library_marker) {
            EntryKind::Library
        } else if name.contains(self.extension_marker) {
            EntryKind::Extension
        } else if name == self.argument_manifest {
            EntryKind::ArgumentManifest
        } else {
            EntryKind::CompiledModule
        }
    }

    /// Whether a library entry is the interpreter's own image.
    pub fn is_host_runtime(&self, name: &str) -> bool {
        let prefix = self.host_runtime_prefix.as_bytes();
        name.len() >= prefix.len() && name.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix)
    }

    /// Derive the dotted module path of a compiled entry.
    ///
    /// `pkg/sub/__init__.pyc` becomes package `pkg.sub`; `pkg/sub/mod.pyc`
    /// becomes module `pkg.sub.mod`. Returns `None` for names without the
    /// compiled suffix.
    pub fn compiled_module_path(&self, name: &str) -> Option<ModulePath> {
        let (stem, is_package) = match self.package_dir(name) {
            Some(dir) => (dir, true),
            None => (name.strip_suffix(self.compiled_suffix)?, false),
        };

        let dotted = stem
            .chars()
            .map(|c| if c == '/' || c == '\\' { '.' } else { c })
            .collect();

        Some(ModulePath { dotted, is_package })
    }

    /// Directory of a package marker entry. The marker must be a whole path
    /// component: `pkg/my__init__.pyc` is an ordinary module.
    fn package_dir<'n>(&self, name: &'n str) -> Option<&'n str> {
        if name == self.package_marker {
            return Some("");
        }
        name.strip_suffix(self.package_marker)?.strip_suffix(['/', '\\'])
    }

    /// Derive initializer and table names of an extension entry.
    ///
    /// The entry name carries the full package path (`a.b.c.pyd`). Only the
    /// leaf (`c`) determines the exported initializer. Dots in the table name
    /// are replaced with the separator marker so the interpreter does not
    /// parse it as a package path, and such names get the redirect prefix.
    pub fn extension_names(&self, name: &str) -> ExtensionNames {
        let base = name.replace(self.extension_marker, "");
        let leaf = base.rsplit_once('.').map_or(base.as_str(), |(_, leaf)| leaf);
        let init_symbol = format!("{}{}", self.init_prefix, leaf);

        let escaped = base.replace('.', self.extension_separator);
        let table_name = if escaped.contains(self.extension_separator) {
            format!("{}{}", self.redirect_prefix, escaped)
        } else {
            escaped
        };

        ExtensionNames {
            init_symbol,
            table_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_priority() {
        let c = Conventions::default();
        assert_eq!(c.classify("python38.dll"), EntryKind::Library);
        assert_eq!(c.classify("vcruntime140.dll"), EntryKind::Library);
        assert_eq!(c.classify("_ssl.pyd"), EntryKind::Extension);
        assert_eq!(c.classify("argv.txt"), EntryKind::ArgumentManifest);
        assert_eq!(c.classify("pkg/argv.txt"), EntryKind::CompiledModule);
        assert_eq!(c.classify("os.pyc"), EntryKind::CompiledModule);
        // Library marker wins over extension marker.
        assert_eq!(c.classify("odd.pyd.dll"), EntryKind::Library);
    }

    #[test]
    fn test_host_runtime_prefix_is_case_insensitive() {
        let c = Conventions::default();
        assert!(c.is_host_runtime("python38.dll"));
        assert!(c.is_host_runtime("Python3.dll"));
        assert!(!c.is_host_runtime("libpython.dll"));
        assert!(!c.is_host_runtime("py.dll"));
    }

    #[test]
    fn test_package_path() {
        let c = Conventions::default();
        let path = c.compiled_module_path("pkg/sub/__init__.pyc").unwrap();
        assert_eq!(path.dotted, "pkg.sub");
        assert!(path.is_package);

        let path = c.compiled_module_path(r"pkg\sub\__init__.pyc").unwrap();
        assert_eq!(path.dotted, "pkg.sub");
        assert!(path.is_package);
    }

    #[test]
    fn test_marker_must_be_whole_file_name() {
        let c = Conventions::default();
        let path = c.compiled_module_path("pkg/my__init__.pyc").unwrap();
        assert_eq!(path.dotted, "pkg.my__init__");
        assert!(!path.is_package);

        let path = c.compiled_module_path("x__init__.pyc").unwrap();
        assert_eq!(path.dotted, "x__init__");
        assert!(!path.is_package);
    }

    #[test]
    fn test_module_path() {
        let c = Conventions::default();
        let path = c.compiled_module_path("pkg/sub/mod.pyc").unwrap();
        assert_eq!(path.dotted, "pkg.sub.mod");
        assert!(!path.is_package);

        let path = c.compiled_module_path("__main__.pyc").unwrap();
        assert_eq!(path.dotted, "__main__");
    }

    #[test]
    fn test_top_level_init_strips_to_empty_name() {
        let c = Conventions::default();
        let path = c.compiled_module_path("__init__.pyc").unwrap();
        assert_eq!(path.dotted, "");
        assert!(path.is_package);
    }

    #[test]
    fn test_non_compiled_name_has_no_path() {
        // Skipped outright rather than registered with the last four
        // characters cut off.
        let c = Conventions::default();
        assert!(c.compiled_module_path("README").is_none());
        assert!(c.compiled_module_path("data/cert.pem").is_none());
    }

    #[test]
    fn test_nested_extension_names() {
        let c = Conventions::default();
        let names = c.extension_names("a.b.c.pyd");
        assert_eq!(names.init_symbol, "PyInit_c");
        assert_eq!(names.table_name, "__native__a__dot__b__dot__c");
    }

    #[test]
    fn test_top_level_extension_names() {
        let c = Conventions::default();
        let names = c.extension_names("_socket.pyd");
        assert_eq!(names.init_symbol, "PyInit__socket");
        assert_eq!(names.table_name, "_socket");
    }
}
