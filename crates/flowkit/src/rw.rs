//! File access used by configuration, key files and contract sources.
//!
//! All file I/O in flowkit goes through [`ReaderWriter`] so tests and
//! embedders can substitute an in-memory implementation.

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// File mode for files holding private keys.
pub const PRIVATE_FILE_MODE: u32 = 0o600;

/// File mode for ordinary project files.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Minimal file access.
pub trait ReaderWriter: Send + Sync {
    /// Read a whole file.
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Create or truncate a file, creating parent directories.
    fn write_file(&self, path: &Path, data: &[u8], mode: u32) -> io::Result<()>;

    /// Check whether a file exists.
    fn exists(&self, path: &Path) -> bool;
}

/// Shared handle to a [`ReaderWriter`].
pub type SharedReaderWriter = Arc<dyn ReaderWriter>;

/// The real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSystem;

impl ReaderWriter for FileSystem {
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn write_file(&self, path: &Path, data: &[u8], mode: u32) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(mode);
        }
        let mut file = options.open(path)?;

        // The creation mode is ignored for existing files and masked by the
        // umask, so set it again before any data lands.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(mode))?;
        }
        #[cfg(not(unix))]
        let _ = mode;

        file.write_all(data)
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// An in-memory file tree.
#[derive(Debug, Default)]
pub struct MemoryFs {
    files: RwLock<HashMap<PathBuf, (Vec<u8>, u32)>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file with the default mode.
    pub fn with_file(self, path: impl Into<PathBuf>, data: impl AsRef<[u8]>) -> Self {
        if let Ok(mut files) = self.files.write() {
            files.insert(path.into(), (data.as_ref().to_vec(), DEFAULT_FILE_MODE));
        }
        self
    }

    /// Mode a file was written with.
    pub fn mode(&self, path: &Path) -> Option<u32> {
        self.files.read().ok()?.get(path).map(|(_, mode)| *mode)
    }

    fn poisoned() -> io::Error {
        io::Error::other("in-memory filesystem lock poisoned")
    }
}

impl ReaderWriter for MemoryFs {
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        let files = self.files.read().map_err(|_| Self::poisoned())?;
        files
            .get(path)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{} does not exist", path.display()),
                )
            })
    }

    fn write_file(&self, path: &Path, data: &[u8], mode: u32) -> io::Result<()> {
        let mut files = self.files.write().map_err(|_| Self::poisoned())?;
        files.insert(path.to_path_buf(), (data.to_vec(), mode));
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files
            .read()
            .map(|files| files.contains_key(path))
            .unwrap_or(false)
    }
}

/// Append `entry` as its own line to an ignore file if not already listed.
///
/// Returns whether the file changed.
pub fn append_ignore_entry(rw: &dyn ReaderWriter, ignore_file: &Path, entry: &str) -> io::Result<bool> {
    let existing = if rw.exists(ignore_file) {
        String::from_utf8_lossy(&rw.read_file(ignore_file)?).into_owned()
    } else {
        String::new()
    };

    if existing.lines().any(|line| line.trim() == entry) {
        return Ok(false);
    }

    let mut updated = existing;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(entry);
    updated.push('\n');
    rw.write_file(ignore_file, updated.as_bytes(), DEFAULT_FILE_MODE)?;
    Ok(true)
}
