//! Byte sources for named resources.

use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Supplies the bytes of a resource by its path.
///
/// A resource that does not exist is reported as [`Error::MissingResource`].
pub trait AssetProvider: Send + Sync {
    fn read(&self, path: &str) -> Result<Vec<u8>>;

    fn read_to_string(&self, path: &str) -> Result<String> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|e| {
            Error::Io(std::io::Error::new(
                ErrorKind::InvalidData,
                format!("{path}: {e}"),
            ))
        })
    }
}

/// Resources below a directory
#[derive(Clone, Debug)]
pub struct DirAssets {
    root: PathBuf,
}

impl DirAssets {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        DirAssets {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl AssetProvider for DirAssets {
    fn read(&self, path: &str) -> Result<Vec<u8>> {
        std::fs::read(self.root.join(path)).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::MissingResource {
                path: path.to_string(),
                source: e,
            },
            _ => Error::Io(e),
        })
    }
}

/// Resources held in memory
#[derive(Debug, Default)]
pub struct MemoryAssets {
    files: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.files.write().insert(path.into(), bytes.into());
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

impl AssetProvider for MemoryAssets {
    fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.files
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::MissingResource {
                path: path.to_string(),
                source: ErrorKind::NotFound.into(),
            })
    }
}
