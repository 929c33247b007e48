use ndarray::Array2;
use std::path::Path;

use crate::embedding::ImageEmbedding;
use crate::error::{EmbedError, Result};

/// Stack rows into an `(n, dim)` `f32` array and write it as `.npy`
pub fn write_npy(path: &Path, vectors: &[ImageEmbedding]) -> Result<()> {
    let dim = vectors.first().map(Vec::len).unwrap_or(0);
    let flat: Vec<f32> = vectors.iter().flatten().copied().collect();

    let array = Array2::from_shape_vec((vectors.len(), dim), flat)
        .map_err(|e| EmbedError::Store(format!("{}: {}", path.display(), e)))?;

    ndarray_npy::write_npy(path, &array)
        .map_err(|e| EmbedError::Store(format!("{}: {}", path.display(), e)))
}

pub fn read_npy(path: &Path) -> Result<Vec<ImageEmbedding>> {
    let array: Array2<f32> = ndarray_npy::read_npy(path)
        .map_err(|e| EmbedError::Store(format!("{}: {}", path.display(), e)))?;

    Ok(array.outer_iter().map(|row| row.to_vec()).collect())
}
