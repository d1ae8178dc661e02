use crate::logging;
use anyhow::{Context, Result};
use std::fs::Permissions;
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Abstraction over file system operations for testing
pub trait FileSystem {
    /// Read file contents as a string
    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Read file contents, replacing invalid UTF-8 sequences with U+FFFD
    fn read_lossy(&self, path: &Path) -> Result<String>;

    /// Replace a file's contents atomically
    fn write(&self, path: &Path, contents: &str) -> Result<()>;

    /// Create an empty file if it does not exist yet
    fn touch(&self, path: &Path) -> Result<()>;

    /// Check if a path exists
    fn exists(&self, path: &Path) -> bool;

    /// Check if a path is a file
    fn is_file(&self, path: &Path) -> bool;

    /// Check if a path is a directory
    fn is_dir(&self, path: &Path) -> bool;

    /// Create a directory and all parent directories
    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Direct children (files and directories) of a directory, sorted by name
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// All files below `root` at any depth, skipping dot-prefixed entries.
    /// Results are in depth-first order with siblings sorted by name.
    /// Entries that cannot be read are logged and skipped.
    fn walk_files(&self, root: &Path) -> Result<Vec<PathBuf>>;
}

/// Whether a file or directory name starts with a dot
pub fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.')
}

fn is_hidden_entry(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(is_hidden_name)
            .unwrap_or(false)
}

/// Permissions for a freshly written file: the replaced file's, or rw-r--r--
fn target_permissions(path: &Path) -> Option<Permissions> {
    if let Ok(meta) = std::fs::metadata(path) {
        return Some(meta.permissions());
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        Some(Permissions::from_mode(0o644))
    }
    #[cfg(not(unix))]
    {
        None
    }
}

/// Real file system implementation using std::fs
#[derive(Debug, Default, Clone)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        Ok(std::fs::read_to_string(path)?)
    }

    fn read_lossy(&self, path: &Path) -> Result<String> {
        let bytes = std::fs::read(path)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn write(&self, path: &Path, contents: &str) -> Result<()> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        tmp.write_all(contents.as_bytes())?;
        tmp.flush()?;
        if let Some(permissions) = target_permissions(path) {
            tmp.as_file()
                .set_permissions(permissions)
                .with_context(|| format!("Failed to set permissions for {}", path.display()))?;
        }
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    fn touch(&self, path: &Path) -> Result<()> {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        Ok(std::fs::create_dir_all(path)?)
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let entries: Result<Vec<_>, _> = std::fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect();
        let mut entries = entries?;
        entries.sort();
        Ok(entries)
    }

    fn walk_files(&self, root: &Path) -> Result<Vec<PathBuf>> {
        if !root.is_dir() {
            anyhow::bail!("Not a directory: {}", root.display());
        }
        let mut files = Vec::new();
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_hidden_entry(e));
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().unwrap_or(root);
                    logging::warn(&format!("Skipping {}: {}", path.display(), e));
                    continue;
                }
            };
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }
}
