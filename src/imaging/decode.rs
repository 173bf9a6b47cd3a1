//! Image decoding with downsampling
//!
//! Decoding runs in two passes over the same byte buffer: a header probe for
//! the intrinsic size, then a pixel decode at a power-of-two reduced
//! resolution chosen from the target size.
//!
//! JPEG sources are reduced inside the IDCT, so the full-size image is never
//! materialized. Other formats decode at full size and are reduced after.

use std::io::Cursor;

use image::{ImageFormat, ImageReader, Limits, RgbaImage, imageops};
use jpeg_decoder::PixelFormat as JpegPixelFormat;
use log::{debug, trace};

use super::buffer::{Dimension, PixelBuffer};
use super::resize::resize;
use crate::utils::DecodeError;

/// How the decode-time sample size is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sampling {
    /// Always reduce each side by this factor
    Fixed(u32),
    /// Derive the largest power-of-two factor that keeps the image at or
    /// above the target size
    AutoFit,
}

impl Default for Sampling {
    fn default() -> Self {
        Self::AutoFit
    }
}

/// Turns encoded bytes into pixels
#[cfg_attr(test, mockall::automock)]
pub trait ImageDecoder: Send + Sync {
    /// Intrinsic `(width, height)` read from headers, without decoding pixels
    fn probe(&self, bytes: &[u8]) -> Result<(u32, u32), DecodeError>;

    /// Decode pixels, each side reduced by `sample_size`
    fn decode(&self, bytes: &[u8], sample_size: u32) -> Result<PixelBuffer, DecodeError>;
}

/// Largest power of two that is `<= n`, or 0 for 0
pub fn highest_power_of_two(n: u32) -> u32 {
    if n == 0 { 0 } else { 1 << (31 - n.leading_zeros()) }
}

/// Sample size that downsamples `intrinsic` as far as possible without
/// dropping below `target`
pub fn sample_size_for(intrinsic: (u32, u32), target: Dimension) -> u32 {
    let (width, height) = intrinsic;
    let ratio = if target.height > 0 {
        height / target.height as u32
    } else if target.width > 0 {
        width / target.width as u32
    } else {
        1
    };
    highest_power_of_two(ratio).max(1)
}

/// Decode `bytes` and fit the result to `target`
pub fn decode_to_target(
    decoder: &dyn ImageDecoder,
    bytes: &[u8],
    sampling: Sampling,
    target: Option<Dimension>,
) -> Result<PixelBuffer, DecodeError> {
    let target = target.filter(Dimension::is_specified);

    let sample_size = match (sampling, target) {
        (Sampling::Fixed(n), _) => n.max(1),
        (Sampling::AutoFit, Some(target)) => {
            let intrinsic = decoder.probe(bytes)?;
            let sample_size = sample_size_for(intrinsic, target);
            debug!(
                "Decoding {}x{} for {} with a sample size of {}",
                intrinsic.0, intrinsic.1, target, sample_size
            );
            sample_size
        }
        (Sampling::AutoFit, None) => 1,
    };

    let buffer = decoder.decode(bytes, sample_size)?;
    match target {
        Some(target) => resize(buffer, target),
        None => Ok(buffer),
    }
}

/// Decoder backed by the `image` crate
#[derive(Debug, Clone)]
pub struct RasterDecoder {
    alloc_limit: u64,
}

impl RasterDecoder {
    pub fn new() -> Self {
        Self {
            alloc_limit: 256 * 1024 * 1024,
        }
    }

    /// Refuse decodes that would allocate more than `bytes`
    pub fn with_alloc_limit(bytes: u64) -> Self {
        Self { alloc_limit: bytes }
    }

    fn reader<'a>(
        &self,
        bytes: &'a [u8],
        max_alloc: u64,
    ) -> Result<ImageReader<Cursor<&'a [u8]>>, DecodeError> {
        let mut reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| DecodeError::Malformed(e.to_string()))?;

        let mut limits = Limits::default();
        limits.max_alloc = Some(max_alloc);
        reader.limits(limits);
        Ok(reader)
    }

    /// Decode a JPEG with the IDCT scaled down by up to 8x
    ///
    /// Returns `None` for pixel formats that only the generic path converts.
    fn decode_jpeg_scaled(
        &self,
        bytes: &[u8],
        sample_size: u32,
    ) -> Result<Option<PixelBuffer>, DecodeError> {
        let mut decoder = jpeg_decoder::Decoder::new(bytes);
        decoder.read_info()?;
        let info = decoder
            .info()
            .ok_or_else(|| DecodeError::Malformed("jpeg without a frame header".into()))?;

        let width = (u32::from(info.width) / sample_size).max(1);
        let height = (u32::from(info.height) / sample_size).max(1);
        let (scaled_width, scaled_height) = decoder.scale(width as u16, height as u16)?;
        let (scaled_width, scaled_height) = (u32::from(scaled_width), u32::from(scaled_height));

        let needed = u64::from(scaled_width) * u64::from(scaled_height) * 4;
        if needed > self.alloc_limit {
            return Err(DecodeError::MemoryExhausted(format!(
                "{scaled_width}x{scaled_height} needs {needed} bytes, limit is {}",
                self.alloc_limit
            )));
        }
        decoder.set_max_decoding_buffer_size(usize::try_from(self.alloc_limit).unwrap_or(usize::MAX));

        let pixels = decoder.decode()?;
        let rgba: Vec<u8> = match info.pixel_format {
            JpegPixelFormat::RGB24 => pixels
                .chunks_exact(3)
                .flat_map(|p| [p[0], p[1], p[2], 255])
                .collect(),
            JpegPixelFormat::L8 => pixels.iter().flat_map(|&g| [g, g, g, 255]).collect(),
            _ => return Ok(None),
        };
        let image = RgbaImage::from_raw(scaled_width, scaled_height, rgba)
            .ok_or_else(|| DecodeError::Malformed("jpeg pixel count mismatch".into()))?;

        trace!(
            "decode: jpeg {}x{} scaled to {}x{}, sampling to {}x{}",
            info.width, info.height, scaled_width, scaled_height, width, height
        );
        let image = if (scaled_width, scaled_height) == (width, height) {
            image
        } else {
            imageops::thumbnail(&image, width, height)
        };
        Ok(Some(PixelBuffer::from_rgba_image(image)))
    }
}

impl Default for RasterDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageDecoder for RasterDecoder {
    fn probe(&self, bytes: &[u8]) -> Result<(u32, u32), DecodeError> {
        Ok(self.reader(bytes, self.alloc_limit)?.into_dimensions()?)
    }

    fn decode(&self, bytes: &[u8], sample_size: u32) -> Result<PixelBuffer, DecodeError> {
        let sample_size = sample_size.max(1);
        if sample_size > 1 && image::guess_format(bytes).ok() == Some(ImageFormat::Jpeg) {
            if let Some(buffer) = self.decode_jpeg_scaled(bytes, sample_size)? {
                return Ok(buffer);
            }
        }

        // The limit bounds what is kept after sampling, not the transient decode.
        let max_alloc = self
            .alloc_limit
            .saturating_mul(u64::from(sample_size).saturating_pow(2));
        let mut image = self.reader(bytes, max_alloc)?.decode()?;

        if sample_size > 1 {
            let width = (image.width() / sample_size).max(1);
            let height = (image.height() / sample_size).max(1);
            trace!(
                "decode: sampling {}x{} down to {}x{}",
                image.width(),
                image.height(),
                width,
                height
            );
            image = image.thumbnail_exact(width, height);
        }

        Ok(PixelBuffer::from_rgba_image(image.into_rgba8()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::buffer::PixelFormat;
    use mockall::predicate::*;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = image::RgbaImage::from_pixel(width, height, image::Rgba([9, 8, 7, 255]));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_highest_power_of_two() {
        assert_eq!(highest_power_of_two(0), 0);
        assert_eq!(highest_power_of_two(1), 1);
        assert_eq!(highest_power_of_two(7), 4);
        assert_eq!(highest_power_of_two(8), 8);
        assert_eq!(highest_power_of_two(1000), 512);
    }

    #[test]
    fn test_sample_size_for() {
        assert_eq!(sample_size_for((800, 800), Dimension::new(100, 100)), 8);
        assert_eq!(sample_size_for((800, 700), Dimension::new(100, 100)), 4);
        assert_eq!(sample_size_for((50, 50), Dimension::new(100, 100)), 1);
        assert_eq!(sample_size_for((1600, 900), Dimension::width_only(400)), 4);
    }

    #[test]
    fn test_raster_probe_and_decode() {
        let bytes = png(64, 32);
        let decoder = RasterDecoder::new();
        assert_eq!(decoder.probe(&bytes).unwrap(), (64, 32));

        let full = decoder.decode(&bytes, 1).unwrap();
        assert_eq!((full.width(), full.height()), (64, 32));
        assert_eq!(full.format(), PixelFormat::Rgba8);
        assert_eq!(full.pixel(0, 0), &[9, 8, 7, 255]);

        let quarter = decoder.decode(&bytes, 4).unwrap();
        assert_eq!((quarter.width(), quarter.height()), (16, 8));
    }

    #[test]
    fn test_malformed_bytes() {
        let decoder = RasterDecoder::new();
        let err = decoder.decode(b"definitely not an image", 1).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_alloc_limit_reports_memory_exhausted() {
        let bytes = png(256, 256);
        let decoder = RasterDecoder::with_alloc_limit(1024);
        let err = decoder.decode(&bytes, 1).unwrap_err();
        assert!(matches!(err, DecodeError::MemoryExhausted(_)));
    }

    fn jpeg(width: u32, height: u32) -> Vec<u8> {
        let image = image::RgbImage::from_pixel(width, height, image::Rgb([200, 100, 50]));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, image::ImageFormat::Jpeg).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_jpeg_decodes_at_reduced_resolution() {
        let bytes = jpeg(2000, 2000);
        let decoder = RasterDecoder::with_alloc_limit(4 * 1024 * 1024);

        assert!(matches!(
            decoder.decode(&bytes, 1),
            Err(DecodeError::MemoryExhausted(_))
        ));

        let sampled = decoder.decode(&bytes, 16).unwrap();
        assert_eq!((sampled.width(), sampled.height()), (125, 125));
        let [r, g, b, a] = <[u8; 4]>::try_from(sampled.pixel(60, 60)).unwrap();
        assert!(r.abs_diff(200) < 8 && g.abs_diff(100) < 8 && b.abs_diff(50) < 8);
        assert_eq!(a, 255);
    }

    #[test]
    fn test_auto_fit_keeps_large_jpeg_under_alloc_limit() {
        let bytes = jpeg(2000, 2000);
        let decoder = RasterDecoder::with_alloc_limit(4 * 1024 * 1024);

        let out = decode_to_target(
            &decoder,
            &bytes,
            Sampling::AutoFit,
            Some(Dimension::new(100, 100)),
        )
        .unwrap();
        assert_eq!((out.width(), out.height()), (100, 100));
    }

    #[test]
    fn test_sampled_png_is_checked_against_sampled_size() {
        let bytes = png(256, 256);
        let decoder = RasterDecoder::with_alloc_limit(256 * 256);

        assert!(matches!(
            decoder.decode(&bytes, 1),
            Err(DecodeError::MemoryExhausted(_))
        ));
        let quarter = decoder.decode(&bytes, 4).unwrap();
        assert_eq!((quarter.width(), quarter.height()), (64, 64));
    }

    #[test]
    fn test_auto_fit_probes_then_decodes_with_factor() {
        let mut decoder = MockImageDecoder::new();
        decoder.expect_probe().times(1).returning(|_| Ok((800, 800)));
        decoder
            .expect_decode()
            .with(always(), eq(8))
            .times(1)
            .returning(|_, _| Ok(PixelBuffer::solid(100, 100, [0, 0, 0, 255])));

        let out =
            decode_to_target(&decoder, b"img", Sampling::AutoFit, Some(Dimension::new(100, 100)))
                .unwrap();
        assert_eq!((out.width(), out.height()), (100, 100));
    }

    #[test]
    fn test_fixed_sampling_skips_probe() {
        let mut decoder = MockImageDecoder::new();
        decoder.expect_probe().never();
        decoder
            .expect_decode()
            .with(always(), eq(2))
            .times(1)
            .returning(|_, _| Ok(PixelBuffer::solid(10, 10, [0, 0, 0, 255])));

        decode_to_target(&decoder, b"img", Sampling::Fixed(2), None).unwrap();
    }

    #[test]
    fn test_decode_to_target_end_to_end() {
        let bytes = png(800, 600);
        let out = decode_to_target(
            &RasterDecoder::new(),
            &bytes,
            Sampling::AutoFit,
            Some(Dimension::new(100, 100)),
        )
        .unwrap();
        assert_eq!((out.width(), out.height()), (100, 100));
    }
}
