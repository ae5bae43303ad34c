//! Pluggable image transcoding.
//!
//! AVIF decode support varies by build environment (the pure-Rust `image`
//! stack does not decode AVIF without a native codec), so the resolver takes
//! a trait object rather than calling `image` directly. The default
//! implementation handles everything `image` can decode; a failed decode is
//! reported as a transcode error and recorded against the item.

use crate::images::errors::ImageError;
use std::io::Cursor;

pub trait ImageTranscoder: Send + Sync {
    /// Re-encode arbitrary image bytes as JPEG.
    fn to_jpeg(&self, bytes: &[u8]) -> Result<Vec<u8>, ImageError>;
}

/// Default transcoder backed by the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct DecodeTranscoder;

impl ImageTranscoder for DecodeTranscoder {
    fn to_jpeg(&self, bytes: &[u8]) -> Result<Vec<u8>, ImageError> {
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| ImageError::Transcode(e.to_string()))?;

        // JPEG has no alpha channel; flatten before encoding.
        let rgb = image::DynamicImage::ImageRgb8(decoded.to_rgb8());

        let mut out = Cursor::new(Vec::new());
        rgb.write_to(&mut out, image::ImageFormat::Jpeg)
            .map_err(|e| ImageError::Transcode(e.to_string()))?;
        Ok(out.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcodes_png_bytes_to_jpeg() {
        // 2x2 white PNG built in memory.
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            2,
            2,
            image::Rgb([255, 255, 255]),
        ));
        let mut png = Cursor::new(Vec::new());
        img.write_to(&mut png, image::ImageFormat::Png).unwrap();

        let jpeg = DecodeTranscoder.to_jpeg(png.get_ref()).unwrap();
        assert_eq!(image::guess_format(&jpeg).unwrap(), image::ImageFormat::Jpeg);
    }

    #[test]
    fn garbage_bytes_are_a_transcode_error() {
        let err = DecodeTranscoder.to_jpeg(b"definitely not an image").unwrap_err();
        assert!(matches!(err, ImageError::Transcode(_)));
    }
}
