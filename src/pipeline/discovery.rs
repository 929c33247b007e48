use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

use crate::error::Result;

/// Image files directly under `directory`, sorted by path string.
///
/// Subdirectories are not descended into. Symlinks count when they resolve
/// to a regular file; dangling ones are logged and left out.
/// Extensions are matched case-insensitively.
pub fn discover_images(directory: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();

    for entry in WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() > 0 => {
                warn!(path = ?e.path(), error = %e, "Skipping unreadable entry");
                continue;
            }
            Err(e) => return Err(std::io::Error::from(e).into()),
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if let Some(ext) = path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            if extensions.iter().any(|e| e.to_lowercase() == ext_lower) {
                images.push(path.to_path_buf());
            }
        }
    }

    // Identifiers are compared as strings so row order matches the written path list
    images.sort_by(|a, b| a.to_string_lossy().cmp(&b.to_string_lossy()));

    Ok(images)
}
