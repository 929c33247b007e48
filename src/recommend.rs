//! Rank the collection against a preference vector by cosine similarity.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::debug;

use crate::embedding::{cosine_similarity, EmbeddingSet};
use crate::error::Result;
use crate::store::{self, ArtifactLayout, EmbeddingSource};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub index: usize,
    pub path: String,
    pub score: f32,
}

pub struct Recommender {
    set: EmbeddingSet,
}

impl Recommender {
    pub fn new(set: EmbeddingSet) -> Self {
        Self { set }
    }

    pub fn load(layout: &ArtifactLayout, source: EmbeddingSource) -> Result<Self> {
        Ok(Self::new(store::load(layout, source)?))
    }

    pub fn embeddings(&self) -> &EmbeddingSet {
        &self.set
    }

    /// Top `top_k` items by similarity to `user_vec`
    pub fn recommend(&self, user_vec: &[f32], top_k: usize) -> Vec<Recommendation> {
        self.recommend_excluding(user_vec, top_k, &HashSet::new())
    }

    /// Like [`recommend`](Self::recommend), leaving out indices in `exclude`.
    ///
    /// Scores sort descending; equal scores keep ascending index order.
    pub fn recommend_excluding(
        &self,
        user_vec: &[f32],
        top_k: usize,
        exclude: &HashSet<usize>,
    ) -> Vec<Recommendation> {
        let mut scored: Vec<(usize, f32)> = self
            .set
            .vectors()
            .iter()
            .enumerate()
            .filter(|(i, _)| !exclude.contains(i))
            .map(|(i, emb)| (i, cosine_similarity(user_vec, emb)))
            .collect();

        scored.sort_by(rank_order);
        scored.truncate(top_k);

        debug!(candidates = self.set.len(), returned = scored.len(), "Ranked collection");

        scored
            .into_iter()
            .map(|(index, score)| Recommendation {
                index,
                path: self.set.identifiers()[index].clone(),
                score,
            })
            .collect()
    }
}

/// Descending score, then ascending index. NaN scores sort last.
fn rank_order(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    match (a.1.is_nan(), b.1.is_nan()) {
        (false, true) => Ordering::Less,
        (true, false) => Ordering::Greater,
        _ => b.1.total_cmp(&a.1),
    }
    .then(a.0.cmp(&b.0))
}
