//! Image decoding and normalization for face location

use std::io::Cursor;

use anyhow::{Context, Result};
use image::{DynamicImage, GrayImage, ImageReader, Limits};

use crate::config::DetectionConfig;

/// Resource caps applied while decoding untrusted uploads
#[derive(Debug, Clone, Copy)]
pub struct DecodeLimits {
    pub max_dimension: u32,
    pub max_alloc_bytes: u64,
}

impl DecodeLimits {
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self {
            max_dimension: config.max_image_dimension,
            max_alloc_bytes: config.max_decode_alloc_bytes,
        }
    }

    fn to_image_limits(self) -> Limits {
        let mut limits = Limits::default();
        limits.max_image_width = Some(self.max_dimension);
        limits.max_image_height = Some(self.max_dimension);
        limits.max_alloc = Some(self.max_alloc_bytes);
        limits
    }
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self::from_config(&DetectionConfig::default())
    }
}

/// Decode image from bytes with EXIF orientation handling.
/// The container format is sniffed from the leading bytes.
pub fn decode_image(data: &[u8], limits: &DecodeLimits) -> Result<DynamicImage> {
    let mut reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .context("Failed to read image header")?;

    let format = reader
        .format()
        .context("Unrecognized image format")?;

    reader.limits(limits.to_image_limits());
    let image = reader
        .decode()
        .with_context(|| format!("Failed to decode {:?} image", format))?;

    Ok(apply_exif_orientation(image, read_exif_orientation(data)))
}

/// Decode and convert to 8-bit luminance, the only input the cascade reads
pub fn decode_grayscale(data: &[u8], limits: &DecodeLimits) -> Result<GrayImage> {
    Ok(decode_image(data, limits)?.to_luma8())
}

/// Read the EXIF orientation tag, defaulting to 1 (upright)
fn read_exif_orientation(data: &[u8]) -> u32 {
    match exif::Reader::new().read_from_container(&mut Cursor::new(data)) {
        Ok(exif_data) => exif_data
            .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
            .and_then(|field| field.value.get_uint(0))
            .unwrap_or(1),
        Err(_) => 1,
    }
}

/// Rotate/flip so the pixels match how a viewer displays the image.
/// See https://exiftool.org/TagNames/EXIF.html (Orientation)
fn apply_exif_orientation(image: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => image.fliph(),
        3 => image.rotate180(),
        4 => image.flipv(),
        5 => image.rotate90().fliph(),
        6 => image.rotate90(),
        7 => image.rotate270().fliph(),
        8 => image.rotate270(),
        _ => image,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Luma, Rgb, RgbImage};

    fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, format).unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_decode_sniffs_format_from_bytes() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 6, Rgb([200, 10, 10])));
        for format in [ImageFormat::Png, ImageFormat::Bmp, ImageFormat::Jpeg] {
            let decoded = decode_image(&encode(&image, format), &DecodeLimits::default()).unwrap();
            assert_eq!((decoded.width(), decoded.height()), (8, 6), "{:?}", format);
        }
    }

    #[test]
    fn test_grayscale_uses_luminance() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([255, 255, 255])));
        let gray = decode_grayscale(&encode(&image, ImageFormat::Png), &DecodeLimits::default()).unwrap();
        assert_eq!(gray.dimensions(), (4, 4));
        assert_eq!(*gray.get_pixel(0, 0), Luma([255]));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(decode_image(b"definitely not an image", &DecodeLimits::default()).is_err());
        assert!(decode_image(&[], &DecodeLimits::default()).is_err());
    }

    #[test]
    fn test_truncated_png_is_rejected() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, Rgb([1, 2, 3])));
        let bytes = encode(&image, ImageFormat::Png);
        assert!(decode_image(&bytes[..bytes.len() / 2], &DecodeLimits::default()).is_err());
    }

    #[test]
    fn test_dimension_limit_is_enforced() {
        let image = DynamicImage::new_luma8(64, 16);
        let bytes = encode(&image, ImageFormat::Png);
        let limits = DecodeLimits {
            max_dimension: 32,
            ..DecodeLimits::default()
        };
        assert!(decode_image(&bytes, &limits).is_err());
        assert!(decode_image(&bytes, &DecodeLimits::default()).is_ok());
    }

    #[test]
    fn test_orientation_six_rotates_clockwise() {
        // 2x1: red on the left, blue on the right
        let mut raw = RgbImage::new(2, 1);
        raw.put_pixel(0, 0, Rgb([255, 0, 0]));
        raw.put_pixel(1, 0, Rgb([0, 0, 255]));

        let rotated = apply_exif_orientation(DynamicImage::ImageRgb8(raw), 6).to_rgb8();
        assert_eq!(rotated.dimensions(), (1, 2));
        assert_eq!(*rotated.get_pixel(0, 0), Rgb([255, 0, 0]));
        assert_eq!(*rotated.get_pixel(0, 1), Rgb([0, 0, 255]));
    }

    #[test]
    fn test_orientation_five_transposes() {
        let mut raw = RgbImage::new(3, 2);
        raw.put_pixel(2, 0, Rgb([9, 9, 9]));

        let transposed = apply_exif_orientation(DynamicImage::ImageRgb8(raw), 5).to_rgb8();
        assert_eq!(transposed.dimensions(), (2, 3));
        assert_eq!(*transposed.get_pixel(0, 2), Rgb([9, 9, 9]));
    }

    #[test]
    fn test_unknown_orientation_is_identity() {
        let raw = RgbImage::new(3, 2);
        let image = apply_exif_orientation(DynamicImage::ImageRgb8(raw), 42);
        assert_eq!((image.width(), image.height()), (3, 2));
    }

    #[test]
    fn test_missing_exif_defaults_upright() {
        let image = DynamicImage::new_luma8(4, 4);
        assert_eq!(read_exif_orientation(&encode(&image, ImageFormat::Png)), 1);
    }
}
