//! CLIP (Contrastive Language-Image Pre-training) image embeddings
//!
//! The model is an explicit object: construct one [`ClipModel`], hand it to
//! whatever needs embeddings through the [`ImageEncoder`] trait.

mod device;
mod model;
mod preprocess;

use image::{DynamicImage, ImageError, ImageReader};
use std::path::Path;

use crate::embedding::ImageEmbedding;
use crate::error::{EmbedError, Result};

pub use device::{Device, DevicePreference};
pub use model::ClipModel;
pub use preprocess::{preprocess, INPUT_SIZE};

/// Maps a decoded image to a fixed-length, unit-length feature vector.
pub trait ImageEncoder {
    fn embed(&self, image: &DynamicImage) -> Result<ImageEmbedding>;

    /// Decode `path` and embed it.
    fn embed_file(&self, path: &Path) -> Result<ImageEmbedding> {
        let img = load_image(path)?;
        self.embed(&img)
    }
}

/// Decode an image file into 3-channel RGB.
///
/// The format comes from the file's leading bytes, falling back to the
/// extension, so a PNG named `.jpg` still decodes.
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    let decode_err = |source| EmbedError::ImageDecode {
        path: path.to_path_buf(),
        source,
    };

    let img = ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|e| decode_err(ImageError::IoError(e)))?
        .decode()
        .map_err(decode_err)?;
    Ok(DynamicImage::ImageRgb8(img.to_rgb8()))
}
