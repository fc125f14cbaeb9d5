use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};

use crate::color::to_order;
use crate::error::{PipelineError, Result};
use crate::pixel_buffer::{ChannelOrder, PixelBuffer};

/// Encode a buffer as PNG for display, converting to RGB first when needed.
pub fn encode_png(buffer: &PixelBuffer) -> Result<Vec<u8>> {
    let rgb = to_order(buffer.clone(), ChannelOrder::Rgb);
    let (height, width, _) = rgb.shape();
    let raw = rgb.into_pixels().iter().copied().collect::<Vec<_>>();
    let mut png = Vec::new();
    PngEncoder::new(&mut png).write_image(&raw, width as u32, height as u32, ExtendedColorType::Rgb8)
        .map_err(PipelineError::Encode)?;
    Ok(png)
}

pub fn png_data_uri(buffer: &PixelBuffer) -> Result<String> {
    Ok(format!("data:image/png;base64,{}", STANDARD.encode(encode_png(buffer)?)))
}
