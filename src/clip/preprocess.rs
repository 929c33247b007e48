//! CLIP image preprocessing: resize, center crop, normalize, NCHW.

use image::imageops::FilterType;
use image::DynamicImage;

use crate::error::{EmbedError, Result};

/// CLIP input resolution (224x224)
pub const INPUT_SIZE: u32 = 224;

// CLIP normalization constants
const MEAN: [f32; 3] = [0.48145466, 0.4578275, 0.40821073];
const STD: [f32; 3] = [0.26862954, 0.26130258, 0.27577711];

/// Convert an image into a `1x3x224x224` tensor buffer.
///
/// The shorter side is scaled to 224 with bicubic filtering and the center
/// 224x224 square is kept, matching the reference CLIP transform.
pub fn preprocess(img: &DynamicImage) -> Result<Vec<f32>> {
    let (width, height) = (img.width(), img.height());
    if width == 0 || height == 0 {
        return Err(EmbedError::Inference("image has no pixels".to_string()));
    }

    let scale = INPUT_SIZE as f32 / width.min(height) as f32;
    let new_w = ((width as f32 * scale).round() as u32).max(INPUT_SIZE);
    let new_h = ((height as f32 * scale).round() as u32).max(INPUT_SIZE);

    let resized = img.resize_exact(new_w, new_h, FilterType::CatmullRom);
    let left = (new_w - INPUT_SIZE) / 2;
    let top = (new_h - INPUT_SIZE) / 2;
    let rgb = resized.crop_imm(left, top, INPUT_SIZE, INPUT_SIZE).to_rgb8();

    let plane = (INPUT_SIZE * INPUT_SIZE) as usize;
    let mut input_data = vec![0.0f32; 3 * plane];

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let idx = y as usize * INPUT_SIZE as usize + x as usize;
        for c in 0..3 {
            input_data[c * plane + idx] = ((pixel[c] as f32 / 255.0) - MEAN[c]) / STD[c];
        }
    }

    Ok(input_data)
}
