//! Header inspection, used when no kernel configuration can be read
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::{fs::Filesystem, kernel::LINUX_INCLUDE_DIR, DetectError};

/// Whether `source` (or its `source/` subdirectory, as in `/lib/modules/*/build`) carries
/// the kernel's `include/linux` headers
pub fn has_linux_headers(fs: &impl Filesystem, source: &Path) -> bool {
    fs.is_dir(&source.join(LINUX_INCLUDE_DIR))
        || fs.is_dir(&source.join("source").join(LINUX_INCLUDE_DIR))
}

/// Locates `file_name` anywhere beneath `source`. With several copies the lexically smallest
/// path wins so repeated runs agree.
pub fn find_header(fs: &impl Filesystem, source: &Path, file_name: &str) -> Option<PathBuf> {
    let mut found = fs.find_files(source, file_name);
    found.sort();
    if found.len() > 1 {
        debug!("{} copies of {} found, using the first", found.len(), file_name);
    }
    found.into_iter().next()
}

/// Whether `marker` appears in `contents` as a whole identifier
pub fn has_marker(contents: &str, marker: &str) -> bool {
    if marker.is_empty() {
        return false;
    }

    let is_ident = |c: char| c.is_ascii_alphanumeric() || c == '_';
    contents.match_indices(marker).any(|(start, _)| {
        let end = start + marker.len();
        let before = contents[..start].chars().next_back();
        let after = contents[end..].chars().next();
        !before.map_or(false, is_ident) && !after.map_or(false, is_ident)
    })
}

/// Reads the header at `path` and scans it for `marker`
pub fn header_has_marker(
    fs: &impl Filesystem,
    path: &Path,
    marker: &str,
) -> Result<bool, DetectError> {
    let contents = fs
        .read_to_string(path)
        .map_err(|source| DetectError::HeaderRead {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(has_marker(&contents, marker))
}
