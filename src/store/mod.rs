//! On-disk artifacts for an [`EmbeddingSet`].
//!
//! Three files, all index-aligned:
//! - a `.npy` 2-D `f32` array, one row per image
//! - a headerless CSV with the same rows
//! - a JSON array of identifiers

mod csv_rows;
mod npy;

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::OutputConfig;
use crate::embedding::{EmbeddingSet, ImageEmbedding};
use crate::error::{EmbedError, Result};

pub use csv_rows::{read_csv, write_csv};
pub use npy::{read_npy, write_npy};

/// Which embeddings file to read back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingSource {
    Npy,
    Csv,
}

/// Paths of the three artifacts, plus the feedback file kept beside them
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    pub npy: PathBuf,
    pub csv: PathBuf,
    pub paths: PathBuf,
    pub likes: PathBuf,
}

impl ArtifactLayout {
    pub fn in_dir(dir: &Path) -> Self {
        Self::from_config(&OutputConfig {
            data_dir: dir.to_path_buf(),
            ..OutputConfig::default()
        })
    }

    pub fn from_config(config: &OutputConfig) -> Self {
        Self {
            npy: config.data_dir.join(&config.npy_file),
            csv: config.data_dir.join(&config.csv_file),
            paths: config.data_dir.join(&config.paths_file),
            likes: config.data_dir.join(&config.likes_file),
        }
    }
}

/// Write all three artifacts for `set`.
///
/// Each file is written to a `.tmp` sibling first. The targets are replaced
/// only once all three writes succeed; on failure the staged files are
/// removed and the previous artifacts stay as they were.
pub fn save(set: &EmbeddingSet, layout: &ArtifactLayout) -> Result<()> {
    let targets = [&layout.npy, &layout.csv, &layout.paths];
    for path in targets {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let staged: Vec<PathBuf> = targets.iter().map(|p| staging_path(p)).collect();
    let written = write_npy(&staged[0], set.vectors())
        .and_then(|_| write_csv(&staged[1], set.vectors()))
        .and_then(|_| write_paths(&staged[2], set.identifiers()));

    if let Err(e) = written {
        for path in &staged {
            // Only files this call created; a leftover directory is not ours to remove
            if path.is_file() {
                let _ = std::fs::remove_file(path);
            }
        }
        return Err(e);
    }

    for (from, to) in staged.iter().zip(targets) {
        std::fs::rename(from, to)?;
    }

    info!(
        count = set.len(),
        dim = set.dimension(),
        npy = ?layout.npy,
        csv = ?layout.csv,
        paths = ?layout.paths,
        "Saved embeddings"
    );
    Ok(())
}

/// Read identifiers plus one of the embedding files back into a set
pub fn load(layout: &ArtifactLayout, source: EmbeddingSource) -> Result<EmbeddingSet> {
    let identifiers = read_paths(&layout.paths)?;
    let vectors: Vec<ImageEmbedding> = match source {
        EmbeddingSource::Npy => read_npy(&layout.npy)?,
        EmbeddingSource::Csv => read_csv(&layout.csv)?,
    };

    if identifiers.len() != vectors.len() {
        return Err(EmbedError::Store(format!(
            "{} lists {} paths but embeddings have {} rows",
            layout.paths.display(),
            identifiers.len(),
            vectors.len()
        )));
    }

    info!(count = vectors.len(), ?source, "Loaded embeddings");
    EmbeddingSet::new(identifiers, vectors)
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

pub fn write_paths(path: &Path, identifiers: &[String]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, identifiers)
        .map_err(|e| EmbedError::Store(format!("{}: {}", path.display(), e)))?;
    writer.flush()?;
    Ok(())
}

pub fn read_paths(path: &Path) -> Result<Vec<String>> {
    let reader = BufReader::new(File::open(path)?);
    serde_json::from_reader(reader)
        .map_err(|e| EmbedError::Store(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_set() -> EmbeddingSet {
        EmbeddingSet::new(
            vec!["memes/a.png".into(), "memes/b.jpg".into()],
            vec![vec![1.0, 0.5, -0.25], vec![0.0, 0.125, 3.0]],
        )
        .unwrap()
    }

    #[test]
    fn test_save_then_load_from_either_source() {
        let dir = tempdir().unwrap();
        let layout = ArtifactLayout::in_dir(&dir.path().join("data"));
        let set = sample_set();

        save(&set, &layout).unwrap();

        assert_eq!(load(&layout, EmbeddingSource::Npy).unwrap(), set);
        assert_eq!(load(&layout, EmbeddingSource::Csv).unwrap(), set);
    }

    #[test]
    fn test_paths_file_is_json_array() {
        let dir = tempdir().unwrap();
        let layout = ArtifactLayout::in_dir(dir.path());
        save(&sample_set(), &layout).unwrap();

        let raw = std::fs::read_to_string(&layout.paths).unwrap();
        assert_eq!(raw, r#"["memes/a.png","memes/b.jpg"]"#);
    }

    #[test]
    fn test_row_count_mismatch() {
        let dir = tempdir().unwrap();
        let layout = ArtifactLayout::in_dir(dir.path());
        save(&sample_set(), &layout).unwrap();
        write_paths(&layout.paths, &["only-one.png".to_string()]).unwrap();

        assert!(matches!(
            load(&layout, EmbeddingSource::Csv),
            Err(EmbedError::Store(_))
        ));
    }

    #[test]
    fn test_empty_set_round_trips() {
        let dir = tempdir().unwrap();
        let layout = ArtifactLayout::in_dir(dir.path());
        save(&EmbeddingSet::default(), &layout).unwrap();

        assert!(load(&layout, EmbeddingSource::Npy).unwrap().is_empty());
        assert!(load(&layout, EmbeddingSource::Csv).unwrap().is_empty());
    }

    #[test]
    fn test_failed_save_keeps_previous_artifacts() {
        let dir = tempdir().unwrap();
        let layout = ArtifactLayout::in_dir(dir.path());
        save(&sample_set(), &layout).unwrap();
        let npy_before = std::fs::read(&layout.npy).unwrap();
        let paths_before = std::fs::read_to_string(&layout.paths).unwrap();

        // A directory where the staged CSV would go makes the second write fail
        std::fs::create_dir(staging_path(&layout.csv)).unwrap();

        let bigger = EmbeddingSet::new(
            vec!["x.png".into(), "y.png".into(), "z.png".into()],
            vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0]],
        )
        .unwrap();
        assert!(save(&bigger, &layout).is_err());

        assert_eq!(std::fs::read(&layout.npy).unwrap(), npy_before);
        assert_eq!(std::fs::read_to_string(&layout.paths).unwrap(), paths_before);
        assert!(!staging_path(&layout.npy).exists());
        assert_eq!(load(&layout, EmbeddingSource::Npy).unwrap(), sample_set());
    }

    #[test]
    fn test_save_leaves_no_staging_files() {
        let dir = tempdir().unwrap();
        let layout = ArtifactLayout::in_dir(dir.path());
        save(&sample_set(), &layout).unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert!(names.iter().all(|n| !n.ends_with(".tmp")), "{:?}", names);
        assert_eq!(staging_path(&layout.paths), dir.path().join("meme_paths.json.tmp"));
    }
}
