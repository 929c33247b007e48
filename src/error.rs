//! Error taxonomy for embedding, aggregation and persistence.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbedError {
    /// A runtime dependency of the model is missing. `hint` says what to install.
    #[error("Model unavailable: {missing} is missing. {hint}")]
    ModelUnavailable { missing: String, hint: String },

    #[error("Failed to decode image {}: {source}", path.display())]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Liked index {index} is out of range for {len} embeddings")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("No embeddings available")]
    EmptyEmbeddings,

    #[error("Invalid embedding dimension: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Storage error: {0}")]
    Store(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EmbedError {
    pub(crate) fn model_unavailable(missing: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::ModelUnavailable {
            missing: missing.into(),
            hint: hint.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EmbedError>;
