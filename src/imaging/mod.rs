//! Decoding and resizing
//!
//! Turns fetched bytes into fixed-size pixel buffers:
//! - Header probing and power-of-two downsampling during decode
//! - Cover-and-crop resizing that never upsamples
//! - Allocation failures reported as recoverable errors

pub mod buffer;
pub mod decode;
pub mod resize;

pub use buffer::{
    Dimension, PixelBuffer, PixelFormat, SharedBuffer, error_image, placeholder_image,
};
pub use decode::{
    ImageDecoder, RasterDecoder, Sampling, decode_to_target, highest_power_of_two,
    sample_size_for,
};
pub use resize::resize;

#[cfg(test)]
pub use decode::MockImageDecoder;
