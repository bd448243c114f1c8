use super::ModelError;
use crate::config::TtaMode;
use image::{imageops, imageops::FilterType, DynamicImage, RgbImage};
use std::path::Path;

/// ImageNet channel statistics the network was trained with.
const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Normalized NCHW `[1, 3, size, size]` tensor data.
#[derive(Debug, Clone)]
pub struct ImageTensor {
    pub size: usize,
    pub data: Vec<f32>,
}

impl ImageTensor {
    pub fn shape(&self) -> [usize; 4] {
        [1, 3, self.size, self.size]
    }
}

/// Read an image from disk and build one tensor per test-time view.
pub fn input_fn(
    image_path: &Path,
    image_size: u32,
    tta: TtaMode,
) -> Result<Vec<ImageTensor>, ModelError> {
    let image = image::open(image_path)
        .map_err(|e| ModelError::Input(format!("{}: {}", image_path.display(), e)))?;
    Ok(views(&image, image_size, tta))
}

pub fn views(image: &DynamicImage, image_size: u32, tta: TtaMode) -> Vec<ImageTensor> {
    let resized = imageops::resize(&image.to_rgb8(), image_size, image_size, FilterType::Triangle);

    match tta {
        TtaMode::None => vec![to_tensor(&resized)],
        TtaMode::Flip => {
            let mirrored = imageops::flip_horizontal(&resized);
            vec![to_tensor(&resized), to_tensor(&mirrored)]
        }
    }
}

fn to_tensor(image: &RgbImage) -> ImageTensor {
    let (width, height) = image.dimensions();
    let plane = (width * height) as usize;
    let mut data = vec![0f32; 3 * plane];

    for (x, y, pixel) in image.enumerate_pixels() {
        let offset = (y * width + x) as usize;
        for c in 0..3 {
            data[c * plane + offset] = (pixel[c] as f32 / 255.0 - MEAN[c]) / STD[c];
        }
    }

    ImageTensor {
        size: width as usize,
        data,
    }
}
