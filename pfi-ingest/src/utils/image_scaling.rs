//! Bounded-dimension image downscaling
//!
//! Frames and screenshots are capped on their longest axis before they are
//! held in memory or handed to the recognizer.

use image::imageops::FilterType;
use image::DynamicImage;
use std::borrow::Cow;

/// Target size for an image whose longest axis must not exceed `max_dimension`.
///
/// Returns the input size unchanged when both axes already fit. The aspect
/// ratio is preserved and neither axis is rounded down to zero. A
/// `max_dimension` of 0 is treated as 1.
pub fn fitted_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let max_dimension = max_dimension.max(1);
    if width <= max_dimension && height <= max_dimension {
        return (width, height);
    }

    let scale = max_dimension as f64 / width.max(height) as f64;
    let scaled_width = ((width as f64 * scale).round() as u32).clamp(1, max_dimension);
    let scaled_height = ((height as f64 * scale).round() as u32).clamp(1, max_dimension);
    (scaled_width, scaled_height)
}

/// Downscale `image` so that neither axis exceeds `max_dimension`.
///
/// Images already within bounds are passed through untouched.
pub fn downscale_to_fit(image: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    let (target_width, target_height) = fitted_dimensions(width, height, max_dimension);

    if (target_width, target_height) == (width, height) {
        return image;
    }

    tracing::trace!(
        width,
        height,
        target_width,
        target_height,
        "Downscaling image"
    );
    image.resize_exact(target_width, target_height, FilterType::Triangle)
}

/// Borrowing variant of [`downscale_to_fit`]
///
/// Only allocates when the image actually has to shrink.
pub fn fit_within(image: &DynamicImage, max_dimension: u32) -> Cow<'_, DynamicImage> {
    let (width, height) = (image.width(), image.height());
    let (target_width, target_height) = fitted_dimensions(width, height, max_dimension);

    if (target_width, target_height) == (width, height) {
        Cow::Borrowed(image)
    } else {
        Cow::Owned(image.resize_exact(target_width, target_height, FilterType::Triangle))
    }
}
