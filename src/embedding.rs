//! Embedding types and vector helpers shared by the pipeline, aggregator and recommender.

use std::collections::HashSet;

use crate::error::{EmbedError, Result};

/// CLIP embedding (512-dimensional vector for ViT-B/32)
pub type ImageEmbedding = Vec<f32>;

/// Vector derived from a subset of an [`EmbeddingSet`]
pub type PreferenceVector = Vec<f32>;

/// Ordered, index-aligned identifiers and embeddings.
///
/// Row `i` of `vectors` belongs to `identifiers[i]`, and every row has the
/// same dimension. Both are checked on construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddingSet {
    identifiers: Vec<String>,
    vectors: Vec<ImageEmbedding>,
}

impl EmbeddingSet {
    pub fn new(identifiers: Vec<String>, vectors: Vec<ImageEmbedding>) -> Result<Self> {
        if identifiers.len() != vectors.len() {
            return Err(EmbedError::Store(format!(
                "{} identifiers for {} embeddings",
                identifiers.len(),
                vectors.len()
            )));
        }

        {
            let mut seen = HashSet::with_capacity(identifiers.len());
            if let Some(dup) = identifiers.iter().find(|id| !seen.insert(id.as_str())) {
                return Err(EmbedError::Store(format!("duplicate identifier {dup}")));
            }
        }

        if let Some(first) = vectors.first() {
            let expected = first.len();
            if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
                return Err(EmbedError::DimensionMismatch {
                    expected,
                    got: bad.len(),
                });
            }
        }

        Ok(Self {
            identifiers,
            vectors,
        })
    }

    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    pub fn vectors(&self) -> &[ImageEmbedding] {
        &self.vectors
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Dimension of the stored vectors, 0 for an empty set
    pub fn dimension(&self) -> usize {
        self.vectors.first().map(Vec::len).unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f32])> {
        self.identifiers
            .iter()
            .map(String::as_str)
            .zip(self.vectors.iter().map(Vec::as_slice))
    }
}

/// Compute L2 norm (magnitude) of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale a vector to unit length in place. A zero vector is left unchanged.
pub fn normalize_in_place(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm > 0.0 {
        for x in v {
            *x /= norm;
        }
    }
}

/// Calculate cosine similarity between two embeddings
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);

    if norm_a > 0.0 && norm_b > 0.0 {
        dot / (norm_a * norm_b)
    } else {
        0.0
    }
}
