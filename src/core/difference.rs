use image::{DynamicImage, GenericImageView};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DifferenceError {
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Size mismatch: {left:?} vs {right:?}")]
    SizeMismatch { left: (u32, u32), right: (u32, u32) },

    #[error("Empty image")]
    Empty,
}

/// Dissimilarity between two photographs in `[0, 1]`.
///
/// Implementations must not fail: a comparison that cannot be made reports
/// `0.0` so one bad file never aborts a batch.
pub trait DifferenceMetric: Sync {
    fn difference(&self, a: &Path, b: &Path) -> f64;
}

/// Mean absolute RGB difference over all pixels.
#[derive(Debug, Default, Clone, Copy)]
pub struct PixelDifference;

impl PixelDifference {
    pub fn new() -> Self {
        Self
    }

    pub fn try_difference(&self, a: &Path, b: &Path) -> Result<f64, DifferenceError> {
        let left = image::open(a)?;
        let right = image::open(b)?;
        image_difference(&left, &right)
    }
}

impl DifferenceMetric for PixelDifference {
    fn difference(&self, a: &Path, b: &Path) -> f64 {
        match self.try_difference(a, b) {
            Ok(d) => d,
            Err(e) => {
                log::warn!(
                    "Comparison of {} and {} failed, treating as identical: {}",
                    a.display(),
                    b.display(),
                    e
                );
                0.0
            }
        }
    }
}

/// Sum of per-channel absolute differences normalized by
/// `width * height * 255 * 3`.
pub fn image_difference(a: &DynamicImage, b: &DynamicImage) -> Result<f64, DifferenceError> {
    if a.dimensions() != b.dimensions() {
        return Err(DifferenceError::SizeMismatch {
            left: a.dimensions(),
            right: b.dimensions(),
        });
    }

    let (width, height) = a.dimensions();
    if width == 0 || height == 0 {
        return Err(DifferenceError::Empty);
    }

    let left = a.to_rgb8();
    let right = b.to_rgb8();
    let total: u64 = left
        .as_raw()
        .iter()
        .zip(right.as_raw())
        .map(|(l, r)| l.abs_diff(*r) as u64)
        .sum();

    let max = width as f64 * height as f64 * 255.0 * 3.0;
    Ok(total as f64 / max)
}

/// Differences between each consecutive pair of `paths`.
pub fn pairwise<M, P>(metric: &M, paths: &[P]) -> Vec<f64>
where
    M: DifferenceMetric + ?Sized,
    P: AsRef<Path>,
{
    paths
        .windows(2)
        .map(|pair| metric.difference(pair[0].as_ref(), pair[1].as_ref()))
        .collect()
}
