//! p.file Vault - Thumbnail Deriver
//!
//! Bounded-size JPEG previews for the gallery, stored inline as data URLs.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage, GenericImageView};

use crate::error::{VaultError, VaultResult};

/// Longer edge of a gallery thumbnail, in pixels
pub const DEFAULT_MAX_DIMENSION: u32 = 200;

/// JPEG quality for thumbnails (0.8 on a 0-1 scale)
pub const DEFAULT_QUALITY: u8 = 80;

/// Encoded preview image
#[derive(Debug, Clone)]
pub struct Thumbnail {
    pub width: u32,
    pub height: u32,
    /// JPEG bytes
    pub jpeg: Vec<u8>,
}

impl Thumbnail {
    /// Self-describing inline form (`data:image/jpeg;base64,...`)
    pub fn to_data_url(&self) -> String {
        format!("data:image/jpeg;base64,{}", STANDARD.encode(&self.jpeg))
    }
}

/// Thumbnail Deriver
#[derive(Debug, Clone, Copy)]
pub struct ThumbnailDeriver {
    /// Maximum length of the longer edge
    max_dimension: u32,
    /// JPEG quality, 1-100
    quality: u8,
}

impl Default for ThumbnailDeriver {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DIMENSION, DEFAULT_QUALITY)
    }
}

impl ThumbnailDeriver {
    /// Create new thumbnail deriver
    pub fn new(max_dimension: u32, quality: u8) -> Self {
        Self {
            max_dimension: max_dimension.max(1),
            quality: quality.clamp(1, 100),
        }
    }

    pub fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    /// Decode an encoded image. Anything that is not a decodable image is
    /// rejected with `UnsupportedImage`.
    pub fn decode(image_data: &[u8]) -> VaultResult<DynamicImage> {
        image::load_from_memory(image_data)
            .map_err(|e| VaultError::UnsupportedImage(e.to_string()))
    }

    /// Derive a thumbnail from a decoded image. The source is not modified.
    pub fn derive(&self, img: &DynamicImage) -> VaultResult<Thumbnail> {
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return Err(VaultError::UnsupportedImage("image has no pixels".into()));
        }

        let (new_width, new_height) = fit_within(width, height, self.max_dimension);

        // JPEG has no alpha channel
        let rgb = if (new_width, new_height) == (width, height) {
            img.to_rgb8()
        } else {
            img.resize_exact(new_width, new_height, FilterType::Triangle)
                .to_rgb8()
        };

        let mut output = Vec::new();
        JpegEncoder::new_with_quality(&mut output, self.quality)
            .encode_image(&rgb)
            .map_err(|e| VaultError::UnsupportedImage(e.to_string()))?;

        Ok(Thumbnail {
            width: new_width,
            height: new_height,
            jpeg: output,
        })
    }

    /// Decode then derive
    pub fn derive_from_bytes(&self, image_data: &[u8]) -> VaultResult<Thumbnail> {
        let img = Self::decode(image_data)?;
        self.derive(&img)
    }
}

/// Scale `(width, height)` so the longer edge is at most `max`, keeping the
/// aspect ratio. Never upscales; never returns a zero edge.
pub fn fit_within(width: u32, height: u32, max: u32) -> (u32, u32) {
    if width <= max && height <= max {
        return (width, height);
    }

    let scale = |edge: u32, long: u32| -> u32 {
        ((edge as f64 * max as f64 / long as f64).round() as u32).max(1)
    };

    if width >= height {
        (max, scale(height, width))
    } else {
        (scale(width, height), max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::new_rgba8(width, height);
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)
            .unwrap();
        buffer
    }

    #[test]
    fn test_landscape_bound_and_aspect() {
        let deriver = ThumbnailDeriver::default();
        let thumb = deriver.derive_from_bytes(&png(800, 600)).unwrap();

        assert_eq!((thumb.width, thumb.height), (200, 150));

        let decoded = image::load_from_memory(&thumb.jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (200, 150));
    }

    #[test]
    fn test_portrait_and_odd_ratios() {
        assert_eq!(fit_within(600, 800, 200), (150, 200));
        assert_eq!(fit_within(1000, 333, 200), (200, 67));
        assert_eq!(fit_within(5000, 10, 200), (200, 1));
        assert_eq!(fit_within(400, 400, 200), (200, 200));

        for (w, h) in [(1920, 1080), (3024, 4032), (201, 7), (999, 1000)] {
            let (tw, th) = fit_within(w, h, 200);
            assert!(tw.max(th) <= 200);
            let source = w as f64 / h as f64;
            let derived = tw as f64 / th as f64;
            // one pixel of rounding on the short edge
            let tolerance = source / th.min(tw) as f64 + 0.01;
            assert!((source - derived).abs() <= tolerance, "{}x{} -> {}x{}", w, h, tw, th);
        }
    }

    #[test]
    fn test_small_images_not_upscaled() {
        let deriver = ThumbnailDeriver::default();
        let thumb = deriver.derive_from_bytes(&png(64, 48)).unwrap();
        assert_eq!((thumb.width, thumb.height), (64, 48));
    }

    #[test]
    fn test_source_untouched() {
        let img = DynamicImage::new_rgb8(640, 480);
        let deriver = ThumbnailDeriver::default();
        deriver.derive(&img).unwrap();
        assert_eq!(img.dimensions(), (640, 480));
    }

    #[test]
    fn test_non_image_rejected() {
        let deriver = ThumbnailDeriver::default();
        assert!(matches!(
            deriver.derive_from_bytes(b"%PDF-1.7 this is not an image"),
            Err(VaultError::UnsupportedImage(_))
        ));
    }

    #[test]
    fn test_data_url() {
        let thumb = ThumbnailDeriver::default()
            .derive_from_bytes(&png(10, 10))
            .unwrap();
        let url = thumb.to_data_url();
        assert!(url.starts_with("data:image/jpeg;base64,"));

        let payload = url.trim_start_matches("data:image/jpeg;base64,");
        assert_eq!(STANDARD.decode(payload).unwrap(), thumb.jpeg);
    }
}
