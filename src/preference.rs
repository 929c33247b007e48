//! User preference vector: the mean of liked embeddings.

use crate::embedding::{normalize_in_place, ImageEmbedding, PreferenceVector};
use crate::error::{EmbedError, Result};

/// Average the embeddings at `liked_indices`, optionally scaled to unit length.
///
/// * No likes yields the zero vector of `embeddings[0]`'s dimension.
/// * Duplicate indices are counted once per occurrence.
/// * A zero mean is returned as-is when `normalize` is set.
///
/// Indices are signed because they arrive from outside the process; any
/// index below zero or past the end is [`EmbedError::IndexOutOfRange`].
pub fn compute_preference(
    liked_indices: &[i64],
    embeddings: &[ImageEmbedding],
    normalize: bool,
) -> Result<PreferenceVector> {
    let dim = embeddings
        .first()
        .map(Vec::len)
        .ok_or(EmbedError::EmptyEmbeddings)?;

    let rows = liked_indices
        .iter()
        .map(|&index| {
            usize::try_from(index)
                .ok()
                .and_then(|i| embeddings.get(i))
                .ok_or(EmbedError::IndexOutOfRange {
                    index,
                    len: embeddings.len(),
                })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut pref = vec![0.0f32; dim];
    if rows.is_empty() {
        return Ok(pref);
    }

    for row in &rows {
        if row.len() != dim {
            return Err(EmbedError::DimensionMismatch {
                expected: dim,
                got: row.len(),
            });
        }
        for (acc, &val) in pref.iter_mut().zip(row.iter()) {
            *acc += val;
        }
    }

    let count = rows.len() as f32;
    for x in &mut pref {
        *x /= count;
    }

    if normalize {
        normalize_in_place(&mut pref);
    }

    Ok(pref)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::l2_norm;

    fn sample() -> Vec<ImageEmbedding> {
        vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![3.0, 4.0]]
    }

    #[test]
    fn test_no_likes_is_zero_vector() {
        let pref = compute_preference(&[], &sample(), true).unwrap();
        assert_eq!(pref, vec![0.0, 0.0]);
    }

    #[test]
    fn test_exact_mean_without_normalization() {
        let pref = compute_preference(&[0, 1], &sample(), false).unwrap();
        assert_eq!(pref, vec![0.5, 0.5]);
    }

    #[test]
    fn test_single_like_is_normalized_row() {
        let pref = compute_preference(&[2], &sample(), true).unwrap();
        assert!((pref[0] - 0.6).abs() < 1e-6);
        assert!((pref[1] - 0.8).abs() < 1e-6);
        assert!((l2_norm(&pref) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_duplicates_weight_the_mean() {
        let pref = compute_preference(&[0, 0, 1], &sample(), false).unwrap();
        assert!((pref[0] - 2.0 / 3.0).abs() < 1e-6);
        assert!((pref[1] - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_mean_not_divided() {
        let embeddings = vec![vec![1.0, -2.0], vec![-1.0, 2.0]];
        let pref = compute_preference(&[0, 1], &embeddings, true).unwrap();
        assert_eq!(pref, vec![0.0, 0.0]);
        assert!(pref.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_index_out_of_range() {
        for bad in [3, 100, -1] {
            match compute_preference(&[0, bad], &sample(), true) {
                Err(EmbedError::IndexOutOfRange { index, len }) => {
                    assert_eq!(index, bad);
                    assert_eq!(len, 3);
                }
                other => panic!("expected IndexOutOfRange, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_empty_embeddings() {
        assert!(matches!(
            compute_preference(&[], &[], true),
            Err(EmbedError::EmptyEmbeddings)
        ));
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let embeddings = vec![vec![1.0, 0.0], vec![1.0]];
        assert!(matches!(
            compute_preference(&[1], &embeddings, false),
            Err(EmbedError::DimensionMismatch { expected: 2, got: 1 })
        ));
    }
}
