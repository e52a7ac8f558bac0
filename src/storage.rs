//! Whole-document storage
//!
//! Settings and sites are read and written as complete text blobs. Config
//! output goes through the same trait so the manager can be exercised
//! without touching the filesystem.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Text blob storage addressed by path
pub trait Storage {
    /// Read a whole document; a missing document reads as an empty string
    fn read(&self, path: &Path) -> Result<String>;

    /// Replace a whole document
    fn write(&self, path: &Path, content: &str) -> Result<()>;

    /// Make sure `dir` exists and holds no files
    fn prepare_dir(&self, dir: &Path) -> Result<()>;

    /// Remove `dir` and the files in it, if present
    fn remove_dir(&self, dir: &Path) -> Result<()>;
}

/// Storage on the local filesystem
#[derive(Debug, Clone, Default)]
pub struct FsStorage;

impl FsStorage {
    fn clean_dir(dir: &Path) -> Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

impl Storage for FsStorage {
    fn read(&self, path: &Path) -> Result<String> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    fn prepare_dir(&self, dir: &Path) -> Result<()> {
        if dir.is_dir() {
            Self::clean_dir(dir)
        } else {
            std::fs::create_dir_all(dir)?;
            Ok(())
        }
    }

    fn remove_dir(&self, dir: &Path) -> Result<()> {
        if dir.is_dir() {
            Self::clean_dir(dir)?;
            std::fs::remove_dir(dir)?;
        }
        Ok(())
    }
}

/// In-memory storage, for dry runs and tests
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: RefCell<BTreeMap<PathBuf, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<String> {
        self.files.borrow().get(path.as_ref()).cloned()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.borrow().keys().cloned().collect()
    }

    fn drop_children(&self, dir: &Path) {
        self.files
            .borrow_mut()
            .retain(|path, _| path.parent() != Some(dir));
    }
}

impl Storage for MemoryStorage {
    fn read(&self, path: &Path) -> Result<String> {
        Ok(self.get(path).unwrap_or_default())
    }

    fn write(&self, path: &Path, content: &str) -> Result<()> {
        self.files
            .borrow_mut()
            .insert(path.to_path_buf(), content.to_string());
        Ok(())
    }

    fn prepare_dir(&self, dir: &Path) -> Result<()> {
        self.drop_children(dir);
        Ok(())
    }

    fn remove_dir(&self, dir: &Path) -> Result<()> {
        self.drop_children(dir);
        Ok(())
    }
}
