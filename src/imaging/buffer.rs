//! Decoded pixel buffers
//!
//! Buffers are immutable once built and shared as [`SharedBuffer`]. Rows are
//! padded to [`ROW_ALIGNMENT`] bytes, so `row_bytes` is not always
//! `width * bytes_per_pixel`; byte accounting uses the real stride.

use std::fmt;
use std::sync::Arc;

use image::RgbaImage;

use crate::utils::DecodeError;

/// Rows start on this byte boundary
pub const ROW_ALIGNMENT: usize = 4;

/// Buffer shared between the cache, workers and slots
pub type SharedBuffer = Arc<PixelBuffer>;

/// Pixel layout of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 8-bit red, green, blue, alpha
    Rgba8,
    /// 8-bit red, green, blue
    Rgb8,
    /// 8-bit luminance
    Gray8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba8 => 4,
            Self::Rgb8 => 3,
            Self::Gray8 => 1,
        }
    }

    /// Stride of a row of `width` pixels, padded to [`ROW_ALIGNMENT`]
    pub fn row_bytes(self, width: u32) -> usize {
        let packed = width as usize * self.bytes_per_pixel();
        packed.div_ceil(ROW_ALIGNMENT) * ROW_ALIGNMENT
    }
}

/// Requested output size
///
/// A side that is zero or negative is unset and derived from the other side
/// so the source aspect ratio is preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dimension {
    pub width: i32,
    pub height: i32,
}

impl Dimension {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub const fn width_only(width: i32) -> Self {
        Self { width, height: 0 }
    }

    pub const fn height_only(height: i32) -> Self {
        Self { width: 0, height }
    }

    /// At least one side is set
    pub fn is_specified(&self) -> bool {
        self.width > 0 || self.height > 0
    }

    /// Concrete output size for a source of `src_width` x `src_height`
    ///
    /// Returns the source size unchanged when neither side is set.
    pub fn resolve(&self, src_width: u32, src_height: u32) -> (u32, u32) {
        let (sw, sh) = (src_width.max(1) as f64, src_height.max(1) as f64);
        match (self.width > 0, self.height > 0) {
            (true, true) => (self.width as u32, self.height as u32),
            (true, false) => {
                let height = (self.width as f64 * sh / sw).round().max(1.0);
                (self.width as u32, height as u32)
            }
            (false, true) => {
                let width = (self.height as f64 * sw / sh).round().max(1.0);
                (width as u32, self.height as u32)
            }
            (false, false) => (src_width, src_height),
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Owned, immutable 2D pixel grid with an explicit stride
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    row_bytes: usize,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap strided pixel data; `data` must be exactly `row_bytes * height` long
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self, DecodeError> {
        let row_bytes = format.row_bytes(width);
        let expected = row_bytes * height as usize;
        if data.len() != expected {
            return Err(DecodeError::Malformed(format!(
                "pixel data is {} bytes, {}x{} {:?} needs {}",
                data.len(),
                width,
                height,
                format,
                expected
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            row_bytes,
            data,
        })
    }

    /// Zeroed buffer, failing with `MemoryExhausted` instead of aborting
    pub fn allocate(width: u32, height: u32, format: PixelFormat) -> Result<Self, DecodeError> {
        let row_bytes = format.row_bytes(width);
        let size = row_bytes
            .checked_mul(height as usize)
            .ok_or_else(|| DecodeError::MemoryExhausted(format!("{width}x{height} overflows")))?;

        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|e| DecodeError::MemoryExhausted(format!("{size} bytes: {e}")))?;
        data.resize(size, 0);

        Ok(Self {
            width,
            height,
            format,
            row_bytes,
            data,
        })
    }

    /// Take ownership of a decoded RGBA image (already 4-byte aligned)
    pub fn from_rgba_image(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            format: PixelFormat::Rgba8,
            row_bytes: PixelFormat::Rgba8.row_bytes(width),
            data: image.into_raw(),
        }
    }

    /// Single-color RGBA buffer, used for placeholders and fallbacks
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let data = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self {
            width,
            height,
            format: PixelFormat::Rgba8,
            row_bytes: PixelFormat::Rgba8.row_bytes(width),
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Bytes per row including padding
    pub fn row_bytes(&self) -> usize {
        self.row_bytes
    }

    /// Memory held by the pixels, `row_bytes * height`
    pub fn byte_size(&self) -> usize {
        self.row_bytes * self.height as usize
    }

    /// Raw strided bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Pixel bytes of row `y`, without padding
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.row_bytes;
        &self.data[start..start + self.width as usize * self.format.bytes_per_pixel()]
    }

    /// Bytes of the pixel at (`x`, `y`)
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let bpp = self.format.bytes_per_pixel();
        let start = x as usize * bpp;
        &self.row(y)[start..start + bpp]
    }

    fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.row_bytes;
        let len = self.width as usize * self.format.bytes_per_pixel();
        &mut self.data[start..start + len]
    }

    /// Expand into a packed RGBA image for resampling
    pub fn to_rgba_image(&self) -> Result<RgbaImage, DecodeError> {
        let size = self.width as usize * self.height as usize * 4;
        let mut packed = Vec::new();
        packed
            .try_reserve_exact(size)
            .map_err(|e| DecodeError::MemoryExhausted(format!("{size} bytes: {e}")))?;

        for y in 0..self.height {
            let row = self.row(y);
            match self.format {
                PixelFormat::Rgba8 => packed.extend_from_slice(row),
                PixelFormat::Rgb8 => {
                    for px in row.chunks_exact(3) {
                        packed.extend_from_slice(&[px[0], px[1], px[2], 255]);
                    }
                }
                PixelFormat::Gray8 => {
                    for &g in row {
                        packed.extend_from_slice(&[g, g, g, 255]);
                    }
                }
            }
        }

        RgbaImage::from_raw(self.width, self.height, packed)
            .ok_or_else(|| DecodeError::Malformed("rgba conversion size mismatch".into()))
    }

    /// Copy a `width` x `height` window starting at (`x`, `y`) into a new buffer
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Result<Self, DecodeError> {
        let right = x.checked_add(width);
        let bottom = y.checked_add(height);
        let inside = matches!((right, bottom), (Some(r), Some(b)) if r <= self.width && b <= self.height);
        if !inside {
            return Err(DecodeError::Malformed(format!(
                "crop {width}x{height}+{x}+{y} outside {}x{}",
                self.width, self.height
            )));
        }

        let bpp = self.format.bytes_per_pixel();
        let mut out = Self::allocate(width, height, self.format)?;
        for row in 0..height {
            let src = &self.row(y + row)[x as usize * bpp..(x + width) as usize * bpp];
            out.row_mut(row).copy_from_slice(src);
        }
        Ok(out)
    }
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("row_bytes", &self.row_bytes)
            .finish()
    }
}

/// Neutral gray placeholder shown while loading
pub fn placeholder_image(width: u32, height: u32) -> PixelBuffer {
    PixelBuffer::solid(width, height, [200, 200, 200, 255])
}

/// Red-ish image shown when a load fails
pub fn error_image(width: u32, height: u32) -> PixelBuffer {
    PixelBuffer::solid(width, height, [255, 200, 200, 255])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_bytes_are_aligned() {
        assert_eq!(PixelFormat::Rgba8.row_bytes(3), 12);
        assert_eq!(PixelFormat::Rgb8.row_bytes(3), 12); // 9 padded to 12
        assert_eq!(PixelFormat::Gray8.row_bytes(5), 8);
    }

    #[test]
    fn test_byte_size_uses_stride() {
        let buffer = PixelBuffer::allocate(3, 2, PixelFormat::Rgb8).unwrap();
        assert_eq!(buffer.row_bytes(), 12);
        assert_eq!(buffer.byte_size(), 24);
        assert_eq!(buffer.row(1).len(), 9);
    }

    #[test]
    fn test_new_rejects_wrong_length() {
        let err = PixelBuffer::new(2, 2, PixelFormat::Rgb8, vec![0; 12]).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
        assert!(PixelBuffer::new(2, 2, PixelFormat::Rgb8, vec![0; 16]).is_ok());
    }

    #[test]
    fn test_solid_and_pixel_access() {
        let buffer = placeholder_image(4, 3);
        assert_eq!(buffer.byte_size(), 48);
        assert_eq!(buffer.pixel(3, 2), &[200, 200, 200, 255]);
    }

    #[test]
    fn test_to_rgba_expands_gray_and_skips_padding() {
        let data = vec![10, 20, 30, 0, 40, 50, 60, 0];
        let buffer = PixelBuffer::new(3, 2, PixelFormat::Gray8, data).unwrap();
        let rgba = buffer.to_rgba_image().unwrap();
        assert_eq!(rgba.dimensions(), (3, 2));
        assert_eq!(rgba.get_pixel(2, 1).0, [60, 60, 60, 255]);
    }

    #[test]
    fn test_crop() {
        let mut image = RgbaImage::new(4, 4);
        image.put_pixel(2, 1, image::Rgba([1, 2, 3, 4]));
        let buffer = PixelBuffer::from_rgba_image(image);

        let cropped = buffer.crop(1, 1, 2, 2).unwrap();
        assert_eq!((cropped.width(), cropped.height()), (2, 2));
        assert_eq!(cropped.pixel(1, 0), &[1, 2, 3, 4]);
        assert!(buffer.crop(3, 3, 2, 2).is_err());
    }

    #[test]
    fn test_crop_rejects_overflowing_window() {
        let buffer = PixelBuffer::solid(4, 4, [0, 0, 0, 255]);
        assert!(matches!(
            buffer.crop(u32::MAX, 0, 2, 2),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            buffer.crop(0, 1, 1, u32::MAX),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn test_dimension_resolve() {
        assert_eq!(Dimension::width_only(100).resolve(400, 300), (100, 75));
        assert_eq!(Dimension::height_only(75).resolve(400, 300), (100, 75));
        assert_eq!(Dimension::new(0, 0).resolve(400, 300), (400, 300));
        assert_eq!(Dimension::new(50, 60).resolve(400, 300), (50, 60));
        assert_eq!(Dimension::new(100, 100).to_string(), "100x100");
    }
}
