//! Sibling file set: the other files of the component being previewed,
//! needed to resolve relative stylesheet imports.

use crate::error::{PreviewError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use walkdir::WalkDir;

const LOADABLE_EXTENSIONS: [&str; 7] = ["css", "scss", "js", "jsx", "ts", "tsx", "json"];

/// Files keyed by normalized path relative to the previewed source
/// (`styles/card.module.css`, no leading `./`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiblingFiles {
    files: BTreeMap<String, String>,
}

impl SiblingFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: BTreeMap<String, String>) -> Self {
        let mut files = Self::new();
        for (path, contents) in map {
            files.insert(&path, contents);
        }
        files
    }

    /// Load every text file with a known extension below `root`. Hidden
    /// entries and `node_modules` are skipped.
    pub fn from_dir(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let mut files = Self::new();
        let walker = WalkDir::new(root).into_iter().filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            e.depth() == 0 || (!name.starts_with('.') && name != "node_modules")
        });
        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(root).to_path_buf();
                PreviewError::io(path, e.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let loadable = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| LOADABLE_EXTENSIONS.contains(&ext))
                .unwrap_or(false);
            if !loadable {
                continue;
            }
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let contents =
                std::fs::read_to_string(path).map_err(|e| PreviewError::io(path, e))?;
            files.insert(&relative.to_string_lossy(), contents);
        }
        tracing::debug!(root = %root.display(), count = files.len(), "loaded sibling files");
        Ok(files)
    }

    pub fn insert(&mut self, path: &str, contents: impl Into<String>) {
        if let Some(key) = normalize(path) {
            self.files.insert(key, contents.into());
        }
    }

    /// Contents for a relative import specifier (`./a.css`, `../b.css`).
    /// Specifiers escaping the file set resolve to nothing.
    pub fn resolve(&self, specifier: &str) -> Option<&str> {
        normalize(specifier).and_then(|key| self.files.get(&key).map(|s| s.as_str()))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn normalize(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split(|c| c == '/' || c == '\\') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_specifiers() {
        let mut files = SiblingFiles::new();
        files.insert("./styles/card.module.css", ".card{}");
        assert_eq!(files.resolve("./styles/card.module.css"), Some(".card{}"));
        assert_eq!(files.resolve("./other/../styles/card.module.css"), Some(".card{}"));
        assert_eq!(files.resolve("../card.module.css"), None);
        assert_eq!(files.resolve("./missing.css"), None);
    }

    #[test]
    fn test_from_dir_skips_hidden_and_unknown() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("styles")).unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules/x")).unwrap();
        std::fs::write(dir.path().join("styles/a.module.css"), ".a{}").unwrap();
        std::fs::write(dir.path().join("logo.png"), [0u8, 1, 2]).unwrap();
        std::fs::write(dir.path().join(".secret.css"), ".s{}").unwrap();
        std::fs::write(dir.path().join("node_modules/x/index.js"), "x").unwrap();

        let files = SiblingFiles::from_dir(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files.resolve("./styles/a.module.css"), Some(".a{}"));
    }

    #[test]
    fn test_from_dir_missing_root_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SiblingFiles::from_dir(dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, PreviewError::Io { .. }));
    }
}
