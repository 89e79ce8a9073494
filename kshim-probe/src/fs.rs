//! Read-only view of the filesystem the probe inspects.
//!
//! Every locator takes a [`Filesystem`] instead of touching `std::fs` directly so the search
//! order and classification rules can be exercised against an in-memory tree.
use std::{
    io,
    path::{Path, PathBuf},
};
use tracing::debug;
use walkdir::WalkDir;

pub trait Filesystem {
    /// `true` if `path` exists and is (or resolves to) a directory
    fn is_dir(&self, path: &Path) -> bool;

    /// `true` if `path` exists and is (or resolves to) a regular file
    fn is_file(&self, path: &Path) -> bool;

    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Every regular file named `file_name` beneath `root`, following symlinks. Order is
    /// unspecified; callers sort when they need a deterministic pick.
    fn find_files(&self, root: &Path, file_name: &str) -> Vec<PathBuf>;
}

/// The machine's real filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct HostFs;

impl Filesystem for HostFs {
    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn find_files(&self, root: &Path, file_name: &str) -> Vec<PathBuf> {
        WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    // Symlink loops and unreadable dirs are common in kernel trees
                    debug!("skipping entry under {}: {}", root.display(), err);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file() && entry.file_name() == file_name)
            .map(|entry| entry.into_path())
            .collect()
    }
}
