//! File access for persisted state and generated artifacts
//!
//! The persisted `.env`, generated manifests, and platform config files are
//! all written through a [`Workspace`] so the core never touches the disk
//! directly.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub trait Workspace: Send + Sync {
    /// Read a file; `Ok(None)` when it does not exist.
    fn read(&self, path: &Path) -> io::Result<Option<String>>;

    /// Replace a file's contents, creating parent directories as needed.
    fn write(&self, path: &Path, contents: &str) -> io::Result<()>;

    /// Append to a file, creating it if missing.
    fn append(&self, path: &Path, contents: &str) -> io::Result<()>;

    /// Whether a file or directory exists.
    fn exists(&self, path: &Path) -> bool;

    /// The location external tools should be pointed at for `path`.
    fn locate(&self, path: &Path) -> PathBuf;
}

/// Workspace backed by the real filesystem.
///
/// Relative paths resolve against `root`; absolute paths (e.g. `/etc/pf.conf`)
/// are used as given.
#[derive(Debug, Clone)]
pub struct DiskWorkspace {
    root: PathBuf,
}

impl DiskWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Workspace rooted at the process working directory
    pub fn current_dir() -> io::Result<Self> {
        Ok(Self::new(std::env::current_dir()?))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Workspace for DiskWorkspace {
    fn read(&self, path: &Path) -> io::Result<Option<String>> {
        match std::fs::read_to_string(self.locate(path)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        let full = self.locate(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(full, contents)
    }

    fn append(&self, path: &Path, contents: &str) -> io::Result<()> {
        let full = self.locate(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(full)?;
        file.write_all(contents.as_bytes())
    }

    fn exists(&self, path: &Path) -> bool {
        self.locate(path).exists()
    }

    fn locate(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }
}
