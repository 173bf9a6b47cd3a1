//! Fit decoded buffers to a target size
//!
//! Resizing scales the source to cover the target and center-crops the
//! overflow, so the result matches the requested size exactly. A source that
//! already fits inside the target is returned as is; buffers are never
//! upsampled to reach a target that is larger on both sides.

use image::imageops::{self, FilterType};
use log::trace;

use super::buffer::{Dimension, PixelBuffer};
use crate::utils::DecodeError;

/// Resize `buffer` to exactly `target`, unless it already fits inside it
pub fn resize(buffer: PixelBuffer, target: Dimension) -> Result<PixelBuffer, DecodeError> {
    let (src_width, src_height) = (buffer.width(), buffer.height());
    let (width, height) = target.resolve(src_width, src_height);

    trace!(
        "resize: {}x{} => {}x{} (requested {})",
        src_width, src_height, width, height, target
    );

    if width >= src_width && height >= src_height {
        return Ok(buffer);
    }
    extract_thumbnail(&buffer, width, height)
}

/// Scale to cover `width` x `height`, then crop the centered window
fn extract_thumbnail(
    buffer: &PixelBuffer,
    width: u32,
    height: u32,
) -> Result<PixelBuffer, DecodeError> {
    let (src_width, src_height) = (buffer.width() as f64, buffer.height() as f64);
    let scale = (width as f64 / src_width).max(height as f64 / src_height);

    let scaled_width = ((src_width * scale).round() as u32).max(width);
    let scaled_height = ((src_height * scale).round() as u32).max(height);

    let scaled_bytes = (scaled_width as usize)
        .checked_mul(scaled_height as usize)
        .and_then(|px| px.checked_mul(4))
        .filter(|bytes| *bytes <= isize::MAX as usize)
        .ok_or_else(|| {
            DecodeError::MemoryExhausted(format!("{scaled_width}x{scaled_height} intermediate"))
        })?;
    trace!("extract_thumbnail: intermediate {scaled_width}x{scaled_height} ({scaled_bytes} bytes)");

    let source = buffer.to_rgba_image()?;
    let scaled = if (scaled_width, scaled_height) == source.dimensions() {
        source
    } else {
        imageops::resize(&source, scaled_width, scaled_height, FilterType::Triangle)
    };

    let x = (scaled_width - width) / 2;
    let y = (scaled_height - height) / 2;
    PixelBuffer::from_rgba_image(scaled).crop(x, y, width, height)
}
