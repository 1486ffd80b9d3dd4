//! Greyscale intensity grid backing a loaded frame.
//!
//! Intensities are stored as `f64` in an `Array2` with shape (height, width),
//! row-major with the origin at the top-left. Colour input is reduced to the
//! mean of its channels.

use image::DynamicImage;
use ndarray::Array2;

use crate::error::{AstrometerError, Result};

/// Pixel intensity data for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    data: Array2<f64>,
}

impl PixelBuffer {
    /// Wrap an existing intensity array (rows = height).
    pub fn from_array(data: Array2<f64>) -> Self {
        Self { data }
    }

    /// Build from interleaved RGBA bytes, as produced by a 2D canvas readback.
    ///
    /// Alpha is ignored; intensity is the mean of R, G and B.
    pub fn from_rgba(width: usize, height: usize, rgba: &[u8]) -> Result<Self> {
        let expected = width * height * 4;
        if rgba.len() != expected {
            return Err(AstrometerError::BufferSize {
                expected,
                actual: rgba.len(),
            });
        }
        let data = Array2::from_shape_fn((height, width), |(row, col)| {
            let i = (row * width + col) * 4;
            (rgba[i] as f64 + rgba[i + 1] as f64 + rgba[i + 2] as f64) / 3.0
        });
        Ok(Self { data })
    }

    /// Build from 8-bit greyscale bytes.
    pub fn from_grey(width: usize, height: usize, grey: &[u8]) -> Result<Self> {
        let expected = width * height;
        if grey.len() != expected {
            return Err(AstrometerError::BufferSize {
                expected,
                actual: grey.len(),
            });
        }
        let data = Array2::from_shape_fn((height, width), |(row, col)| {
            grey[row * width + col] as f64
        });
        Ok(Self { data })
    }

    /// Build from a decoded image of any colour type.
    pub fn from_image(img: &DynamicImage) -> Self {
        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();
        let data = Array2::from_shape_fn((height as usize, width as usize), |(row, col)| {
            let p = rgb.get_pixel(col as u32, row as u32);
            (p[0] as f64 + p[1] as f64 + p[2] as f64) / 3.0
        });
        Self { data }
    }

    /// Decode an image file from disk.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let img = image::open(path)?;
        Ok(Self::from_image(&img))
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    /// Intensity at column `x`, row `y`, or `None` outside the image.
    pub fn intensity(&self, x: i64, y: i64) -> Option<f64> {
        if x < 0 || y < 0 {
            return None;
        }
        self.data.get((y as usize, x as usize)).copied()
    }

    pub fn as_array(&self) -> &Array2<f64> {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    #[test]
    fn test_rgba_mean_of_channels() {
        // 2x1: (30, 60, 90) and white, alpha ignored
        let rgba = [30, 60, 90, 0, 255, 255, 255, 17];
        let buf = PixelBuffer::from_rgba(2, 1, &rgba).unwrap();
        assert_eq!(buf.width(), 2);
        assert_eq!(buf.height(), 1);
        assert_eq!(buf.intensity(0, 0), Some(60.0));
        assert_eq!(buf.intensity(1, 0), Some(255.0));
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let err = PixelBuffer::from_rgba(4, 4, &[0u8; 10]).unwrap_err();
        assert!(matches!(
            err,
            AstrometerError::BufferSize {
                expected: 64,
                actual: 10
            }
        ));
        assert!(PixelBuffer::from_grey(3, 3, &[0u8; 8]).is_err());
    }

    #[test]
    fn test_out_of_bounds_is_none() {
        let buf = PixelBuffer::from_grey(3, 2, &[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(buf.intensity(2, 1), Some(6.0));
        assert_eq!(buf.intensity(3, 0), None);
        assert_eq!(buf.intensity(0, 2), None);
        assert_eq!(buf.intensity(-1, 0), None);
    }

    #[test]
    fn test_from_image_rows_are_y() {
        let mut img = ImageBuffer::from_pixel(4, 3, Rgb([0u8, 0, 0]));
        img.put_pixel(1, 2, Rgb([90, 90, 90]));
        let buf = PixelBuffer::from_image(&DynamicImage::ImageRgb8(img));
        assert_eq!(buf.width(), 4);
        assert_eq!(buf.height(), 3);
        assert_eq!(buf.intensity(1, 2), Some(90.0));
        assert_eq!(buf.intensity(2, 1), Some(0.0));
    }
}
