//! Coordinate conversions between image, display and inset space.
//!
//! Three spaces are involved when annotating a frame:
//!
//! - **Image space**: native pixels of the frame. Positions exchanged with the
//!   frame source and the submission flow use the FITS convention (origin at
//!   the bottom-left, y up); pixel buffers are indexed top-left (row = y).
//! - **Display space**: the frame scaled down to fit the canvas, origin at the
//!   top-left. Markers live here.
//! - **Inset space**: display space magnified by the zoom factor and shifted
//!   by the pan offset, used while a marker is being dragged.
//!
//! Every conversion that touches image space takes an explicit [`Orientation`]
//! so the flip is never implied.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AstrometerError, Result};

/// A 2D position or offset.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Translate by an offset.
    pub fn offset(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Component-wise difference `self - other`.
    pub fn delta_from(&self, other: &Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }

    /// Euclidean distance to another point.
    pub fn distance_to(&self, other: &Point) -> f64 {
        let d = self.delta_from(other);
        (d.x * d.x + d.y * d.y).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<(f64, f64)> for Point {
    fn from(xy: (f64, f64)) -> Self {
        Self::new(xy.0, xy.1)
    }
}

impl From<Point> for (f64, f64) {
    fn from(p: Point) -> Self {
        (p.x, p.y)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({:.2}, {:.2})", self.x, self.y)
    }
}

/// Width and height of a drawing area in display pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Clamp a point into `[0, width] x [0, height]`.
    pub fn clamp(&self, p: Point) -> Point {
        Point::new(p.x.clamp(0.0, self.width), p.y.clamp(0.0, self.height))
    }

    /// Express a point as a fraction of the area (0..1 on each axis).
    pub fn normalize(&self, p: Point) -> Point {
        let nx = if self.width > 0.0 { p.x / self.width } else { 0.0 };
        let ny = if self.height > 0.0 { p.y / self.height } else { 0.0 };
        Point::new(nx, ny)
    }

    /// Centre of the area.
    pub fn center(&self) -> Point {
        Point::new(self.width / 2.0, self.height / 2.0)
    }
}

/// Vertical origin convention of an image-space coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// Origin at the bottom-left, y increasing upward.
    Fits,
    /// Origin at the top-left, y increasing downward.
    Display,
}

/// Converts between image pixels and display pixels.
///
/// The scale is fixed for the lifetime of one loaded image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    scale: f64,
    image_width: f64,
    image_height: f64,
}

impl CoordinateMapper {
    /// Create a mapper from an explicit scale (image pixels per display pixel).
    pub fn new(scale: f64, image_width: f64, image_height: f64) -> Result<Self> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(AstrometerError::InvalidConfig(format!(
                "scale must be positive, got {scale}"
            )));
        }
        if image_width <= 0.0 || image_height <= 0.0 {
            return Err(AstrometerError::InvalidConfig(format!(
                "image dimensions must be positive, got {image_width}x{image_height}"
            )));
        }
        Ok(Self {
            scale,
            image_width,
            image_height,
        })
    }

    /// Create a mapper that fits a native image into the requested display width.
    ///
    /// The scale is `ceil(native_width / display_width)` and never below 1, so
    /// the image is only ever reduced by whole factors.
    pub fn fit_width(native_width: u32, native_height: u32, display_width: f64) -> Result<Self> {
        if !(display_width.is_finite() && display_width > 0.0) {
            return Err(AstrometerError::InvalidConfig(format!(
                "display width must be positive, got {display_width}"
            )));
        }
        let scale = (native_width as f64 / display_width).ceil().max(1.0);
        Self::new(scale, native_width as f64, native_height as f64)
    }

    /// Create a mapper that fits a native image into the requested display height.
    pub fn fit_height(native_width: u32, native_height: u32, display_height: f64) -> Result<Self> {
        if !(display_height.is_finite() && display_height > 0.0) {
            return Err(AstrometerError::InvalidConfig(format!(
                "display height must be positive, got {display_height}"
            )));
        }
        let scale = (native_height as f64 / display_height).ceil().max(1.0);
        Self::new(scale, native_width as f64, native_height as f64)
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn image_height(&self) -> f64 {
        self.image_height
    }

    pub fn image_width(&self) -> f64 {
        self.image_width
    }

    /// Size of the display canvas this mapper projects onto.
    pub fn display_size(&self) -> Size {
        Size::new(
            self.image_width / self.scale,
            self.image_height / self.scale,
        )
    }

    /// Image pixels to display pixels.
    pub fn to_display(&self, img: Point, orientation: Orientation) -> Point {
        let y = match orientation {
            Orientation::Fits => self.image_height - img.y,
            Orientation::Display => img.y,
        };
        Point::new(img.x / self.scale, y / self.scale)
    }

    /// Display pixels to image pixels.
    pub fn to_image(&self, display: Point, orientation: Orientation) -> Point {
        let x = display.x * self.scale;
        let y = display.y * self.scale;
        match orientation {
            Orientation::Fits => Point::new(x, self.image_height - y),
            Orientation::Display => Point::new(x, y),
        }
    }

    /// Image-pixel length (e.g. a radius) to display pixels.
    pub fn length_to_display(&self, length: f64) -> f64 {
        length / self.scale
    }

    /// Display-pixel length to image pixels.
    pub fn length_to_image(&self, length: f64) -> f64 {
        length * self.scale
    }
}

/// Magnification state of a canvas inset.
///
/// Shared read-only by every marker on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomState {
    /// Magnification factor, never below 1.
    pub factor: f64,
    /// Horizontal inset offset in display pixels.
    pub pan_left: f64,
    /// Vertical inset offset in display pixels.
    pub pan_top: f64,
    /// Whether the inset is currently shown.
    pub zoomed: bool,
}

impl Default for ZoomState {
    fn default() -> Self {
        Self {
            factor: 1.0,
            pan_left: 0.0,
            pan_top: 0.0,
            zoomed: false,
        }
    }
}

impl ZoomState {
    pub fn new(factor: f64, pan_left: f64, pan_top: f64) -> Self {
        let factor = if factor.is_finite() { factor.max(1.0) } else { 1.0 };
        Self {
            factor,
            pan_left,
            pan_top,
            zoomed: factor > 1.0,
        }
    }

    /// Zoom state that keeps `anchor` at the same on-screen position once
    /// magnified by `factor`.
    pub fn centered_on(anchor: Point, factor: f64) -> Self {
        let factor = if factor.is_finite() { factor.max(1.0) } else { 1.0 };
        Self::new(
            factor,
            anchor.x - anchor.x * factor,
            anchor.y - anchor.y * factor,
        )
    }

    /// Whether the pan offset takes part in the transform.
    fn pan_active(&self) -> bool {
        self.factor != 1.0
    }
}

/// Display pixels to inset pixels.
///
/// The pan offset only applies while magnified; at factor 1 the inset is
/// hidden and the transform is the identity.
pub fn to_zoomed(p: Point, zoom: &ZoomState) -> Point {
    if zoom.pan_active() {
        Point::new(
            p.x * zoom.factor + zoom.pan_left,
            p.y * zoom.factor + zoom.pan_top,
        )
    } else {
        p
    }
}

/// Inset pixels back to display pixels.
pub fn from_zoomed(p: Point, zoom: &ZoomState) -> Point {
    if zoom.pan_active() {
        Point::new(
            (p.x - zoom.pan_left) / zoom.factor,
            (p.y - zoom.pan_top) / zoom.factor,
        )
    } else {
        p
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn mapper() -> CoordinateMapper {
        CoordinateMapper::fit_width(2048, 2048, 700.0).unwrap()
    }

    #[test]
    fn test_scale_is_ceiled() {
        let m = mapper();
        assert_eq!(m.scale(), 3.0);
        assert_relative_eq!(m.display_size().width, 2048.0 / 3.0);

        let exact = CoordinateMapper::fit_width(1000, 800, 1000.0).unwrap();
        assert_eq!(exact.scale(), 1.0);

        // Larger display than image never magnifies
        let small = CoordinateMapper::fit_width(300, 200, 1000.0).unwrap();
        assert_eq!(small.scale(), 1.0);
    }

    #[test]
    fn test_fits_flip() {
        let m = CoordinateMapper::new(2.0, 1000.0, 800.0).unwrap();
        let d = m.to_display(Point::new(100.0, 0.0), Orientation::Fits);
        assert_relative_eq!(d.x, 50.0);
        assert_relative_eq!(d.y, 400.0);

        let top = m.to_display(Point::new(100.0, 800.0), Orientation::Fits);
        assert_relative_eq!(top.y, 0.0);

        let plain = m.to_display(Point::new(100.0, 0.0), Orientation::Display);
        assert_relative_eq!(plain.y, 0.0);
    }

    #[test]
    fn test_round_trip_both_orientations() {
        let m = mapper();
        for &(x, y) in &[(0.0, 0.0), (12.5, 1999.0), (1024.0, 512.25), (2048.0, 2048.0)] {
            for orientation in [Orientation::Fits, Orientation::Display] {
                let p = Point::new(x, y);
                let back = m.to_image(m.to_display(p, orientation), orientation);
                assert_relative_eq!(back.x, x, epsilon = 1e-9);
                assert_relative_eq!(back.y, y, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_to_display_is_linear_without_flip() {
        let m = mapper();
        let p = Point::new(123.0, 456.0);
        let single = m.to_display(p, Orientation::Display);
        let double = m.to_display(Point::new(246.0, 912.0), Orientation::Display);
        assert_relative_eq!(double.x, 2.0 * single.x, epsilon = 1e-12);
        assert_relative_eq!(double.y, 2.0 * single.y, epsilon = 1e-12);
    }

    #[test]
    fn test_zoomed_transform() {
        let zoom = ZoomState::new(3.0, 20.0, 10.0);
        let z = to_zoomed(Point::new(100.0, 80.0), &zoom);
        assert_eq!(z, Point::new(320.0, 250.0));
        assert_eq!(from_zoomed(z, &zoom), Point::new(100.0, 80.0));
    }

    #[test]
    fn test_unzoomed_ignores_pan() {
        let zoom = ZoomState::new(1.0, 20.0, 10.0);
        assert!(!zoom.zoomed);
        assert_eq!(to_zoomed(Point::new(5.0, 6.0), &zoom), Point::new(5.0, 6.0));
    }

    #[test]
    fn test_centered_on_keeps_anchor_in_place() {
        let anchor = Point::new(140.0, 60.0);
        let zoom = ZoomState::centered_on(anchor, 4.0);
        let on_screen = to_zoomed(anchor, &zoom);
        assert_relative_eq!(on_screen.x, anchor.x);
        assert_relative_eq!(on_screen.y, anchor.y);
    }

    #[test]
    fn test_factor_below_one_is_clamped() {
        let zoom = ZoomState::new(0.25, 0.0, 0.0);
        assert_eq!(zoom.factor, 1.0);
        assert!(!zoom.zoomed);
    }

    #[test]
    fn test_invalid_mapper_rejected() {
        assert!(CoordinateMapper::new(0.0, 10.0, 10.0).is_err());
        assert!(CoordinateMapper::fit_width(100, 100, 0.0).is_err());
        assert!(CoordinateMapper::fit_height(100, 100, f64::NAN).is_err());
    }
}
