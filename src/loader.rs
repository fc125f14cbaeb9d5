use std::path::Path;
use std::time::Instant;

use image::ImageFormat;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::pixel_buffer::PixelBuffer;

pub const ACCEPTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];
pub const ACCEPTED_CONTENT_TYPES: [&str; 2] = ["image/jpeg", "image/png"];

/// Decode an uploaded JPEG or PNG into an `Rgb` buffer, dropping alpha and
/// expanding grayscale so the result always has three channels.
pub fn load_image(bytes: &[u8]) -> Result<PixelBuffer> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyUpload);
    }
    let format = image::guess_format(bytes)?;
    if !matches!(format, ImageFormat::Jpeg | ImageFormat::Png) {
        return Err(PipelineError::UnsupportedFormat(format!("{format:?}")));
    }

    let now = Instant::now();
    let decoded = image::load_from_memory_with_format(bytes, format)?;
    debug!(
        "decoded {:?} {}x{} ({:?}) in {:?}",
        format,
        decoded.width(),
        decoded.height(),
        decoded.color(),
        now.elapsed()
    );
    Ok(PixelBuffer::from_rgb_image(&decoded.into_rgb8()))
}

pub fn check_upload_name(file_name: &str) -> Result<()> {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match extension {
        Some(ext) if ACCEPTED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        Some(ext) => Err(PipelineError::UnsupportedFormat(format!(".{ext} file"))),
        None => Err(PipelineError::UnsupportedFormat(format!("{file_name} has no extension"))),
    }
}

pub fn check_content_type(content_type: &str) -> Result<()> {
    // strip parameters such as "; charset=binary"
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    if ACCEPTED_CONTENT_TYPES
        .iter()
        .any(|accepted| accepted.eq_ignore_ascii_case(essence))
    {
        Ok(())
    } else {
        Err(PipelineError::UnsupportedFormat(essence.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{DynamicImage, GrayAlphaImage, GrayImage, LumaA, Rgb, RgbImage, Rgba, RgbaImage};

    use super::*;
    use crate::pixel_buffer::ChannelOrder;

    fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
        bytes
    }

    #[test]
    fn rgba_png_loses_alpha() {
        let image = RgbaImage::from_pixel(7, 5, Rgba([10, 20, 30, 40]));
        let buffer = load_image(&encode(DynamicImage::ImageRgba8(image), ImageFormat::Png)).unwrap();
        assert_eq!(buffer.shape(), (5, 7, 3));
        assert_eq!(buffer.order(), ChannelOrder::Rgb);
        assert_eq!(buffer.pixel(3, 2), [10, 20, 30]);
    }

    #[test]
    fn grayscale_png_is_expanded() {
        let gray = load_image(&encode(
            DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, image::Luma([90]))),
            ImageFormat::Png,
        ))
        .unwrap();
        assert_eq!(gray.channels(), 3);
        assert_eq!(gray.pixel(0, 0), [90, 90, 90]);

        let gray_alpha = load_image(&encode(
            DynamicImage::ImageLumaA8(GrayAlphaImage::from_pixel(2, 3, LumaA([5, 0]))),
            ImageFormat::Png,
        ))
        .unwrap();
        assert_eq!(gray_alpha.shape(), (3, 2, 3));
    }

    #[test]
    fn jpeg_decodes_to_three_channels() {
        let image = RgbImage::from_pixel(16, 8, Rgb([128, 128, 128]));
        let buffer = load_image(&encode(DynamicImage::ImageRgb8(image), ImageFormat::Jpeg)).unwrap();
        assert_eq!(buffer.shape(), (8, 16, 3));
        let [r, g, b] = buffer.pixel(8, 4);
        assert!(r.abs_diff(128) <= 2 && g.abs_diff(128) <= 2 && b.abs_diff(128) <= 2);
    }

    #[test]
    fn text_is_a_decode_error() {
        let err = load_image(b"definitely not a jpeg, just some notes").unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)), "{err:?}");
        assert!(err.is_client_error());
    }

    #[test]
    fn truncated_png_is_a_decode_error() {
        let bytes = encode(
            DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, Rgb([1, 2, 3]))),
            ImageFormat::Png,
        );
        let err = load_image(&bytes[..bytes.len() / 2]).unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)), "{err:?}");
    }

    #[test]
    fn gif_is_rejected() {
        let err = load_image(b"GIF89a\x01\x00\x01\x00\x00\x00\x00;").unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedFormat(_)), "{err:?}");
    }

    #[test]
    fn empty_upload_is_rejected() {
        assert!(matches!(load_image(&[]), Err(PipelineError::EmptyUpload)));
    }

    #[test]
    fn upload_name_and_type_filters() {
        assert!(check_upload_name("portrait.JPG").is_ok());
        assert!(check_upload_name("dir/face.jpeg").is_ok());
        assert!(check_upload_name("face.png").is_ok());
        assert!(check_upload_name("face.webp").is_err());
        assert!(check_upload_name("face").is_err());

        assert!(check_content_type("image/png").is_ok());
        assert!(check_content_type("IMAGE/JPEG; charset=binary").is_ok());
        assert!(check_content_type("text/plain").is_err());
    }
}
