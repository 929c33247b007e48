//! Embedding pipeline: discover images in a folder and embed them in order.

pub mod discovery;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use tracing::{debug, info, warn};

use crate::clip::{load_image, ImageEncoder};
use crate::config::ScannerConfig;
use crate::embedding::{EmbeddingSet, ImageEmbedding};
use crate::error::{EmbedError, Result};

pub use discovery::discover_images;

/// What to do with a file that has an image extension but does not decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodePolicy {
    /// Abort the whole run with [`EmbedError::ImageDecode`]
    #[default]
    FailFast,
    /// Log a warning, leave the file out and record it in [`EmbedRun::skipped`]
    SkipAndWarn,
}

#[derive(Debug, Clone)]
pub enum EmbedProgress {
    Started { total_files: usize },
    Embedding { current: usize, total: usize, path: String },
    Skipped { path: String, message: String },
    Completed { embedded: usize, skipped: usize },
}

/// Result of one pipeline run
#[derive(Debug, Clone)]
pub struct EmbedRun {
    pub set: EmbeddingSet,
    pub skipped: Vec<PathBuf>,
}

pub struct Pipeline {
    config: ScannerConfig,
}

impl Pipeline {
    pub fn new(config: ScannerConfig) -> Self {
        Self { config }
    }

    /// Embed every image directly under `directory`, in lexicographic order.
    ///
    /// Nothing is cached: each call re-embeds the whole folder.
    pub fn embed_folder<E: ImageEncoder + ?Sized>(
        &self,
        encoder: &E,
        directory: &Path,
        progress_tx: Option<mpsc::Sender<EmbedProgress>>,
    ) -> Result<EmbedRun> {
        let image_paths = discover_images(directory, &self.config.image_extensions)?;

        let total = image_paths.len();
        info!(directory = ?directory, total, policy = ?self.config.decode_policy, "Embedding folder");
        if let Some(ref tx) = progress_tx {
            let _ = tx.send(EmbedProgress::Started { total_files: total });
        }

        let mut identifiers: Vec<String> = Vec::with_capacity(total);
        let mut vectors: Vec<ImageEmbedding> = Vec::with_capacity(total);
        let mut skipped = Vec::new();

        for (index, path) in image_paths.iter().enumerate() {
            let identifier = path.to_string_lossy().to_string();
            if let Some(ref tx) = progress_tx {
                let _ = tx.send(EmbedProgress::Embedding {
                    current: index + 1,
                    total,
                    path: identifier.clone(),
                });
            }

            let image = match load_image(path) {
                Ok(image) => image,
                Err(e @ EmbedError::ImageDecode { .. })
                    if self.config.decode_policy == DecodePolicy::SkipAndWarn =>
                {
                    warn!(path = %identifier, error = %e, "Skipping undecodable image");
                    if let Some(ref tx) = progress_tx {
                        let _ = tx.send(EmbedProgress::Skipped {
                            path: identifier.clone(),
                            message: e.to_string(),
                        });
                    }
                    skipped.push(path.clone());
                    continue;
                }
                Err(e) => return Err(e),
            };

            let embedding = encoder.embed(&image)?;
            if let Some(first) = vectors.first().map(Vec::len) {
                if embedding.len() != first {
                    return Err(EmbedError::DimensionMismatch {
                        expected: first,
                        got: embedding.len(),
                    });
                }
            }

            debug!(path = %identifier, dim = embedding.len(), "Embedded image");
            identifiers.push(identifier);
            vectors.push(embedding);
        }

        if let Some(ref tx) = progress_tx {
            let _ = tx.send(EmbedProgress::Completed {
                embedded: vectors.len(),
                skipped: skipped.len(),
            });
        }

        info!(embedded = vectors.len(), skipped = skipped.len(), "Folder embedded");

        Ok(EmbedRun {
            set: EmbeddingSet::new(identifiers, vectors)?,
            skipped,
        })
    }
}

/// Embed a folder with the default extensions and fail-fast decoding.
pub fn embed_folder<E: ImageEncoder + ?Sized>(encoder: &E, directory: &Path) -> Result<EmbeddingSet> {
    let run = Pipeline::new(ScannerConfig::default()).embed_folder(encoder, directory, None)?;
    Ok(run.set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{l2_norm, normalize_in_place};
    use image::{DynamicImage, Rgb, RgbImage};
    use std::cell::Cell;
    use tempfile::tempdir;

    /// Deterministic stand-in for CLIP: mean color, plus a constant, unit length.
    struct MeanColorEncoder {
        calls: Cell<usize>,
    }

    impl MeanColorEncoder {
        fn new() -> Self {
            Self { calls: Cell::new(0) }
        }
    }

    impl ImageEncoder for MeanColorEncoder {
        fn embed(&self, image: &DynamicImage) -> Result<ImageEmbedding> {
            self.calls.set(self.calls.get() + 1);
            let rgb = image.to_rgb8();
            let mut sums = [0f32; 3];
            for pixel in rgb.pixels() {
                for c in 0..3 {
                    sums[c] += pixel[c] as f32;
                }
            }
            let mut v = vec![sums[0], sums[1], sums[2], 1.0];
            normalize_in_place(&mut v);
            Ok(v)
        }
    }

    fn write_png(dir: &Path, name: &str, color: [u8; 3]) {
        RgbImage::from_pixel(4, 4, Rgb(color))
            .save(dir.join(name))
            .unwrap();
    }

    #[test]
    fn test_embed_folder_order_and_alignment() {
        let dir = tempdir().unwrap();
        write_png(dir.path(), "c.png", [0, 0, 255]);
        write_png(dir.path(), "a.png", [255, 0, 0]);
        write_png(dir.path(), "b.PNG", [0, 255, 0]);
        std::fs::write(dir.path().join("readme.txt"), "not a meme").unwrap();

        let encoder = MeanColorEncoder::new();
        let set = embed_folder(&encoder, dir.path()).unwrap();

        assert_eq!(set.len(), 3);
        assert_eq!(encoder.calls.get(), 3);
        assert!(set.identifiers().windows(2).all(|w| w[0] < w[1]));
        assert!(set.identifiers()[0].ends_with("a.png"));
        assert!(set.vectors().iter().all(|v| v.len() == 4));
        assert!(set
            .vectors()
            .iter()
            .all(|v| (l2_norm(v) - 1.0).abs() < 1e-5));

        // a.png is red, so its strongest component is the first one
        assert!(set.vectors()[0][0] > set.vectors()[0][1]);
    }

    #[test]
    fn test_embed_folder_is_idempotent() {
        let dir = tempdir().unwrap();
        write_png(dir.path(), "one.jpg", [10, 20, 30]);
        write_png(dir.path(), "two.png", [200, 100, 50]);

        let encoder = MeanColorEncoder::new();
        let first = embed_folder(&encoder, dir.path()).unwrap();
        let second = embed_folder(&encoder, dir.path()).unwrap();

        assert_eq!(first, second);
        assert_eq!(encoder.calls.get(), 4);
    }

    #[test]
    fn test_mislabelled_png_is_embedded() {
        let dir = tempdir().unwrap();
        write_png(dir.path(), "a.png", [1, 2, 3]);
        write_png(dir.path(), "saved-as.png", [250, 5, 5]);
        std::fs::rename(dir.path().join("saved-as.png"), dir.path().join("meme.jpg")).unwrap();

        let encoder = MeanColorEncoder::new();
        let set = embed_folder(&encoder, dir.path()).unwrap();

        assert_eq!(set.len(), 2);
        assert!(set.identifiers()[1].ends_with("meme.jpg"));
        assert!(set.vectors()[1][0] > set.vectors()[1][1]);
    }

    #[test]
    fn test_empty_folder() {
        let dir = tempdir().unwrap();
        let set = embed_folder(&MeanColorEncoder::new(), dir.path()).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_fail_fast_on_undecodable_image() {
        let dir = tempdir().unwrap();
        write_png(dir.path(), "a.png", [1, 2, 3]);
        std::fs::write(dir.path().join("b.jpg"), b"garbage").unwrap();
        write_png(dir.path(), "c.png", [4, 5, 6]);

        let encoder = MeanColorEncoder::new();
        match embed_folder(&encoder, dir.path()) {
            Err(EmbedError::ImageDecode { path, .. }) => assert!(path.ends_with("b.jpg")),
            other => panic!("expected decode error, got {:?}", other),
        }
        // Nothing after the bad file was attempted
        assert_eq!(encoder.calls.get(), 1);
    }

    #[test]
    fn test_skip_and_warn_policy() {
        let dir = tempdir().unwrap();
        write_png(dir.path(), "a.png", [1, 2, 3]);
        std::fs::write(dir.path().join("b.jpg"), b"garbage").unwrap();
        write_png(dir.path(), "c.png", [4, 5, 6]);

        let pipeline = Pipeline::new(ScannerConfig {
            decode_policy: DecodePolicy::SkipAndWarn,
            ..ScannerConfig::default()
        });
        let (tx, rx) = mpsc::channel();
        let run = pipeline
            .embed_folder(&MeanColorEncoder::new(), dir.path(), Some(tx))
            .unwrap();

        assert_eq!(run.set.len(), 2);
        assert_eq!(run.skipped.len(), 1);
        assert!(run.skipped[0].ends_with("b.jpg"));
        assert!(run.set.identifiers()[1].ends_with("c.png"));

        let events: Vec<_> = rx.try_iter().collect();
        assert!(matches!(events.first(), Some(EmbedProgress::Started { total_files: 3 })));
        assert!(events
            .iter()
            .any(|e| matches!(e, EmbedProgress::Skipped { path, .. } if path.ends_with("b.jpg"))));
        assert!(matches!(
            events.last(),
            Some(EmbedProgress::Completed { embedded: 2, skipped: 1 })
        ));
    }

    #[test]
    fn test_encoder_errors_are_not_skipped() {
        struct Broken;
        impl ImageEncoder for Broken {
            fn embed(&self, _image: &DynamicImage) -> Result<ImageEmbedding> {
                Err(EmbedError::model_unavailable("CLIP weights", "download them"))
            }
        }

        let dir = tempdir().unwrap();
        write_png(dir.path(), "a.png", [1, 2, 3]);

        let pipeline = Pipeline::new(ScannerConfig {
            decode_policy: DecodePolicy::SkipAndWarn,
            ..ScannerConfig::default()
        });
        let err = pipeline.embed_folder(&Broken, dir.path(), None).unwrap_err();
        assert!(matches!(err, EmbedError::ModelUnavailable { .. }));
    }
}
