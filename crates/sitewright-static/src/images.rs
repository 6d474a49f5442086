//! Image stage: lossless recompression.

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::ImageEncoder;
use sitewright_tasks::{map_each, FileDescriptor, TaskError, Transform, TransformError};

/// Re-encodes PNGs at maximum compression and keeps the result only when it
/// is smaller. Every other format is copied as-is.
#[derive(Debug, Default)]
pub struct OptimizeImages;

fn recompress_png(bytes: &[u8]) -> Result<Vec<u8>, String> {
    let image = image::load_from_memory_with_format(bytes, image::ImageFormat::Png)
        .map_err(|e| format!("Failed to decode PNG: {}", e))?;

    let mut out = Vec::new();
    let encoder =
        PngEncoder::new_with_quality(&mut out, CompressionType::Best, FilterType::Adaptive);
    encoder
        .write_image(image.as_bytes(), image.width(), image.height(), image.color())
        .map_err(|e| format!("Failed to encode PNG: {}", e))?;

    Ok(out)
}

impl Transform for OptimizeImages {
    fn name(&self) -> &str {
        "imagemin"
    }

    fn apply(&self, files: Vec<FileDescriptor>) -> Result<Vec<FileDescriptor>, TaskError> {
        map_each(files, |file| {
            if file.extension().as_deref() != Some("png") {
                return Ok(Some(file));
            }

            let optimized = recompress_png(file.contents())
                .map_err(|e| TransformError::new(file.relative(), e))?;

            if optimized.len() < file.contents().len() {
                tracing::debug!(
                    "imagemin: {} {} -> {} bytes",
                    file.relative().display(),
                    file.contents().len(),
                    optimized.len()
                );
                Ok(Some(file.with_contents(optimized)))
            } else {
                Ok(Some(file))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    /// A flat-colour PNG written with the fastest, least compact settings.
    fn bloated_png() -> Vec<u8> {
        let image = RgbaImage::from_pixel(64, 64, Rgba([40, 120, 200, 255]));
        let mut out = Vec::new();
        PngEncoder::new_with_quality(&mut out, CompressionType::Fast, FilterType::NoFilter)
            .write_image(image.as_raw(), 64, 64, image::ColorType::Rgba8)
            .unwrap();
        out
    }

    #[test]
    fn recompressed_png_is_never_larger() {
        let original = bloated_png();
        let output = OptimizeImages
            .apply(vec![FileDescriptor::new("src", "assets/images/flat.png", original.clone())])
            .unwrap();

        assert!(output[0].contents().len() <= original.len());
        let decoded = image::load_from_memory(output[0].contents()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 64));
    }

    #[test]
    fn other_formats_pass_through() {
        let svg = b"<svg xmlns=\"http://www.w3.org/2000/svg\"/>".to_vec();
        let output = OptimizeImages
            .apply(vec![FileDescriptor::new("src", "logo.svg", svg.clone())])
            .unwrap();

        assert_eq!(output[0].contents(), svg.as_slice());
    }

    #[test]
    fn corrupt_png_is_a_transform_error() {
        let result = OptimizeImages.apply(vec![FileDescriptor::new("src", "bad.png", b"nope".to_vec())]);

        assert!(matches!(result, Err(TaskError::Transform(errors)) if errors.len() == 1));
    }
}
