//! File descriptors flowing through transform stages.

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A matched file: relative path, owning base directory and contents.
///
/// Descriptors are never mutated in place; the `with_*` methods consume the
/// descriptor and return a new one, so a stage always hands downstream a fresh
/// value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    /// Path relative to `base` (e.g. `assets/styles/main.scss`)
    relative: PathBuf,

    /// Base directory the relative path is rooted at
    base: PathBuf,

    /// File contents
    contents: Arc<[u8]>,

    /// Whether a source map was requested for this file
    source_mapped: bool,
}

impl FileDescriptor {
    /// Create a descriptor for `relative` under `base`.
    pub fn new(base: impl Into<PathBuf>, relative: impl Into<PathBuf>, contents: Vec<u8>) -> Self {
        Self {
            relative: relative.into(),
            base: base.into(),
            contents: contents.into(),
            source_mapped: false,
        }
    }

    pub fn relative(&self) -> &Path {
        &self.relative
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Absolute (or cwd-relative) source location: `base/relative`.
    pub fn path(&self) -> PathBuf {
        self.base.join(&self.relative)
    }

    pub fn contents(&self) -> &[u8] {
        &self.contents
    }

    /// Contents as UTF-8, or `None` for binary files.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.contents).ok()
    }

    pub fn source_mapped(&self) -> bool {
        self.source_mapped
    }

    /// Lowercased extension of the relative path.
    pub fn extension(&self) -> Option<String> {
        self.relative
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }

    pub fn with_contents(self, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            contents: contents.into().into(),
            ..self
        }
    }

    pub fn with_relative(self, relative: impl Into<PathBuf>) -> Self {
        Self {
            relative: relative.into(),
            ..self
        }
    }

    pub fn with_extension(self, extension: &str) -> Self {
        let relative = self.relative.with_extension(extension);
        Self { relative, ..self }
    }

    pub fn with_source_map(self, source_mapped: bool) -> Self {
        Self {
            source_mapped,
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_new_descriptors() {
        let original = FileDescriptor::new("src", "assets/styles/main.scss", b"a{}".to_vec());
        let compiled = original
            .clone()
            .with_extension("css")
            .with_contents("a{color:red}");

        assert_eq!(original.relative(), Path::new("assets/styles/main.scss"));
        assert_eq!(compiled.relative(), Path::new("assets/styles/main.css"));
        assert_eq!(compiled.text(), Some("a{color:red}"));
        assert_eq!(compiled.path(), PathBuf::from("src/assets/styles/main.css"));
    }

    #[test]
    fn extension_is_lowercased() {
        let file = FileDescriptor::new("src", "images/Logo.PNG", vec![]);
        assert_eq!(file.extension().as_deref(), Some("png"));
    }

    #[test]
    fn binary_contents_have_no_text() {
        let file = FileDescriptor::new("src", "a.bin", vec![0xff, 0xfe, 0x00]);
        assert!(file.text().is_none());
    }
}
