//! Startup argument vector.

use std::ffi::{CStr, CString};

/// Arguments handed to the interpreter, in the native narrow encoding.
///
/// Element 0 is always the synthetic program identifier; the rest come from
/// the argument manifest, one per non-empty line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentVector {
    args: Vec<CString>,
}

impl ArgumentVector {
    /// Vector holding only the program identifier.
    pub fn program_only(program_id: &str) -> Self {
        Self {
            args: vec![c_string(program_id.as_bytes())],
        }
    }

    /// Parse a newline-delimited manifest.
    ///
    /// Empty lines produce no element and a trailing `\r` is dropped. The
    /// manifest ends at the first NUL byte, as the C-string reader it was
    /// written for would.
    pub fn from_manifest(program_id: &str, manifest: &[u8]) -> Self {
        let mut vector = Self::program_only(program_id);
        let text = manifest.split(|&b| b == 0).next().unwrap_or(&[]);

        for line in text.split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if !line.is_empty() {
                vector.args.push(c_string(line));
            }
        }
        vector
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CStr> {
        self.args.iter().map(CString::as_c_str)
    }

    pub fn get(&self, index: usize) -> Option<&CStr> {
        self.args.get(index).map(CString::as_c_str)
    }
}

fn c_string(bytes: &[u8]) -> CString {
    // Manifest lines never contain NUL: the manifest is cut at the first one.
    CString::new(bytes).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &ArgumentVector) -> Vec<String> {
        v.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_empty_lines_produce_nothing() {
        let v = ArgumentVector::from_manifest("__client__", b"foo\nbar\n\nbaz");
        assert_eq!(strings(&v), ["__client__", "foo", "bar", "baz"]);
    }

    #[test]
    fn test_crlf_lines() {
        let v = ArgumentVector::from_manifest("__client__", b"--host\r\nexample.org\r\n\r\n");
        assert_eq!(strings(&v), ["__client__", "--host", "example.org"]);
    }

    #[test]
    fn test_manifest_ends_at_nul() {
        let v = ArgumentVector::from_manifest("id", b"one\ntwo\0three\n");
        assert_eq!(strings(&v), ["id", "one", "two"]);
    }

    #[test]
    fn test_program_only() {
        let v = ArgumentVector::program_only("id");
        assert_eq!(v.len(), 1);
        assert_eq!(v.get(0).unwrap().to_bytes(), b"id");
        assert!(v.get(1).is_none());
    }
}
