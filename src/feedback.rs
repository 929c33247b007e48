//! Like/skip feedback kept in a small JSON file next to the artifacts.
//!
//! Liking adds an index once; skipping a liked meme takes the like back.
//! The latest feedback for an index wins.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{EmbedError, Result};
use crate::store::{read_paths, ArtifactLayout};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feedback {
    Like,
    Skip,
}

/// Persisted likes and skips, as indices into the embedded collection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LikeStore {
    #[serde(default)]
    liked: Vec<usize>,
    #[serde(default)]
    skipped: Vec<usize>,
}

impl LikeStore {
    /// Read `path`; a missing file is an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| EmbedError::Store(format!("{}: {}", path.display(), e)))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut staged = path.as_os_str().to_os_string();
        staged.push(".tmp");
        let staged = PathBuf::from(staged);

        let mut writer = BufWriter::new(File::create(&staged)?);
        serde_json::to_writer_pretty(&mut writer, self)
            .map_err(|e| EmbedError::Store(format!("{}: {}", path.display(), e)))?;
        writer.flush()?;
        drop(writer);

        std::fs::rename(&staged, path)?;
        debug!(path = ?path, liked = self.liked.len(), skipped = self.skipped.len(), "Saved likes");
        Ok(())
    }

    /// Apply one piece of feedback for a collection of `len` memes.
    ///
    /// Returns whether the store changed.
    pub fn record(&mut self, feedback: Feedback, index: i64, len: usize) -> Result<bool> {
        let index = usize::try_from(index)
            .ok()
            .filter(|&i| i < len)
            .ok_or(EmbedError::IndexOutOfRange { index, len })?;

        let (add_to, remove_from) = match feedback {
            Feedback::Like => (&mut self.liked, &mut self.skipped),
            Feedback::Skip => (&mut self.skipped, &mut self.liked),
        };

        let before = remove_from.len();
        remove_from.retain(|&i| i != index);
        let removed = remove_from.len() != before;

        if add_to.contains(&index) {
            return Ok(removed);
        }
        add_to.push(index);
        Ok(true)
    }

    pub fn liked(&self) -> &[usize] {
        &self.liked
    }

    pub fn skipped(&self) -> &[usize] {
        &self.skipped
    }

    /// Liked indices in the form [`compute_preference`](crate::compute_preference) takes
    pub fn liked_indices(&self) -> Vec<i64> {
        self.liked.iter().map(|&i| i as i64).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.liked.is_empty() && self.skipped.is_empty()
    }
}

/// Collection size and feedback counts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Status {
    pub paths_loaded: usize,
    pub liked_count: usize,
    pub skipped_count: usize,
}

/// Summarize what is on disk. Missing files count as empty.
pub fn status(layout: &ArtifactLayout) -> Result<Status> {
    let paths_loaded = if layout.paths.is_file() {
        read_paths(&layout.paths)?.len()
    } else {
        0
    };
    let likes = LikeStore::load(&layout.likes)?;

    Ok(Status {
        paths_loaded,
        liked_count: likes.liked.len(),
        skipped_count: likes.skipped.len(),
    })
}

/// Drop stored feedback when the embedded collection changed.
///
/// Indices refer to rows of the previous run, so they mean nothing once the
/// identifier list differs. Returns whether feedback was discarded.
pub fn forget_if_collection_changed(layout: &ArtifactLayout, identifiers: &[String]) -> Result<bool> {
    if !layout.likes.is_file() {
        return Ok(false);
    }

    let unchanged = layout.paths.is_file() && read_paths(&layout.paths)? == identifiers;
    if unchanged {
        return Ok(false);
    }

    std::fs::remove_file(&layout.likes)?;
    info!(path = ?layout.likes, "Collection changed, cleared stored likes");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::write_paths;
    use tempfile::tempdir;

    fn paths(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = tempdir().unwrap();
        let store = LikeStore::load(&dir.path().join("likes.json")).unwrap();
        assert!(store.is_empty());
        assert!(store.liked_indices().is_empty());
    }

    #[test]
    fn test_like_is_idempotent_and_skip_takes_it_back() {
        let mut store = LikeStore::default();

        assert!(store.record(Feedback::Like, 2, 5).unwrap());
        assert!(!store.record(Feedback::Like, 2, 5).unwrap());
        assert!(store.record(Feedback::Like, 0, 5).unwrap());
        assert_eq!(store.liked(), &[2, 0]);

        assert!(store.record(Feedback::Skip, 2, 5).unwrap());
        assert_eq!(store.liked(), &[0]);
        assert_eq!(store.skipped(), &[2]);

        // Liking again moves it back
        assert!(store.record(Feedback::Like, 2, 5).unwrap());
        assert_eq!(store.liked_indices(), vec![0, 2]);
        assert!(store.skipped().is_empty());
    }

    #[test]
    fn test_out_of_range_feedback_is_rejected() {
        let mut store = LikeStore::default();
        assert!(matches!(
            store.record(Feedback::Like, 5, 5),
            Err(EmbedError::IndexOutOfRange { index: 5, len: 5 })
        ));
        assert!(matches!(
            store.record(Feedback::Skip, -1, 5),
            Err(EmbedError::IndexOutOfRange { index: -1, .. })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_likes_persist_across_loads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("likes.json");

        let mut store = LikeStore::default();
        store.record(Feedback::Like, 3, 10).unwrap();
        store.record(Feedback::Skip, 7, 10).unwrap();
        store.save(&path).unwrap();

        let loaded = LikeStore::load(&path).unwrap();
        assert_eq!(loaded, store);
        assert!(!dir.path().join("nested").join("likes.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_likes_file_is_store_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("likes.json");
        std::fs::write(&path, "{ liked: nope").unwrap();
        assert!(matches!(LikeStore::load(&path), Err(EmbedError::Store(_))));
    }

    #[test]
    fn test_status_counts() {
        let dir = tempdir().unwrap();
        let layout = ArtifactLayout::in_dir(dir.path());

        assert_eq!(
            status(&layout).unwrap(),
            Status { paths_loaded: 0, liked_count: 0, skipped_count: 0 }
        );

        write_paths(&layout.paths, &paths(&["a.png", "b.png", "c.png"])).unwrap();
        let mut store = LikeStore::default();
        store.record(Feedback::Like, 0, 3).unwrap();
        store.record(Feedback::Like, 2, 3).unwrap();
        store.record(Feedback::Skip, 1, 3).unwrap();
        store.save(&layout.likes).unwrap();

        assert_eq!(
            status(&layout).unwrap(),
            Status { paths_loaded: 3, liked_count: 2, skipped_count: 1 }
        );
    }

    #[test]
    fn test_feedback_cleared_only_when_collection_changes() {
        let dir = tempdir().unwrap();
        let layout = ArtifactLayout::in_dir(dir.path());
        let before = paths(&["a.png", "b.png"]);
        write_paths(&layout.paths, &before).unwrap();

        let mut store = LikeStore::default();
        store.record(Feedback::Like, 1, 2).unwrap();
        store.save(&layout.likes).unwrap();

        assert!(!forget_if_collection_changed(&layout, &before).unwrap());
        assert!(layout.likes.is_file());

        assert!(forget_if_collection_changed(&layout, &paths(&["a.png", "c.png"])).unwrap());
        assert!(!layout.likes.exists());
        assert!(!forget_if_collection_changed(&layout, &before).unwrap());
    }
}
