//! Draggable, resizable annotation marker.
//!
//! A marker lives in display space. While it is dragged the canvas may show a
//! magnified inset, so the drag gesture itself is tracked in screen (inset)
//! space and projected back through [`from_zoomed`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::coords::{from_zoomed, to_zoomed, Point, Size, ZoomState};
use crate::frame::CandidateId;

/// Default upper bound on a marker radius, in display pixels.
pub const DEFAULT_MAX_RADIUS: f64 = 70.0;

/// Default label angle in degrees, counter-clockwise from the +x axis.
pub const DEFAULT_LABEL_ANGLE: f64 = -30.0;

/// Rough width of one caption character in display pixels.
const LABEL_CHAR_WIDTH: f64 = 10.0;

/// Identifier of a marker within one canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MarkerId(pub u64);

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "marker#{}", self.0)
    }
}

/// What a marker annotates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerRole {
    /// Background sky aperture.
    Sky,
    /// Target source aperture.
    Source,
    /// Numbered comparison star, 1-based.
    Calibrator(u32),
    /// Detection candidate from the frame source.
    Candidate(CandidateId),
}

impl MarkerRole {
    /// Default caption for this role.
    pub fn caption(&self) -> String {
        match self {
            MarkerRole::Sky => "Sky".to_string(),
            MarkerRole::Source => "Source".to_string(),
            MarkerRole::Calibrator(n) => format!("Calibrator {n}"),
            MarkerRole::Candidate(id) => id.to_string(),
        }
    }
}

/// Motion state of a marker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionState {
    Idle,
    Dragging(DragOrigin),
    Resizing,
}

/// Snapshot taken when a drag starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragOrigin {
    /// Marker position on screen (inset space) when the drag started.
    pub screen: Point,
    /// Marker position in display space when the drag started.
    pub display: Point,
}

/// Colours used to render a marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerStyle {
    pub stroke: String,
    pub text: String,
    pub stroke_width: f64,
}

impl Default for MarkerStyle {
    fn default() -> Self {
        Self {
            stroke: "rgb(255,255,255)".to_string(),
            text: "rgb(0,0,0)".to_string(),
            stroke_width: 2.0,
        }
    }
}

/// One annotatable point on a canvas.
#[derive(Debug, Clone)]
pub struct Marker {
    id: MarkerId,
    role: MarkerRole,
    position: Point,
    radius: f64,
    max_radius: f64,
    caption: String,
    visible: bool,
    label_angle: f64,
    motion: MotionState,
    twins: Vec<MarkerId>,
    style: MarkerStyle,
}

impl Marker {
    /// Create a visible, idle marker. The radius is clamped to `[1, max_radius]`.
    pub fn new(id: MarkerId, role: MarkerRole, position: Point, radius: f64, max_radius: f64) -> Self {
        let max_radius = if max_radius.is_finite() { max_radius.max(1.0) } else { DEFAULT_MAX_RADIUS };
        let caption = role.caption();
        Self {
            id,
            role,
            position,
            radius: clamp_radius(radius, max_radius),
            max_radius,
            caption,
            visible: true,
            label_angle: normalize_angle(DEFAULT_LABEL_ANGLE),
            motion: MotionState::Idle,
            twins: Vec::new(),
            style: MarkerStyle::default(),
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = caption.into();
        self
    }

    pub fn with_style(mut self, style: MarkerStyle) -> Self {
        self.style = style;
        self
    }

    pub fn id(&self) -> MarkerId {
        self.id
    }

    pub fn role(&self) -> &MarkerRole {
        &self.role
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn max_radius(&self) -> f64 {
        self.max_radius
    }

    pub fn caption(&self) -> &str {
        &self.caption
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn label_angle(&self) -> f64 {
        self.label_angle
    }

    pub fn motion(&self) -> MotionState {
        self.motion
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.motion, MotionState::Dragging(_))
    }

    pub fn style(&self) -> &MarkerStyle {
        &self.style
    }

    /// Other members of this marker's twin group.
    pub fn twins(&self) -> &[MarkerId] {
        &self.twins
    }

    pub(crate) fn set_twins(&mut self, twins: Vec<MarkerId>) {
        self.twins = twins;
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }

    pub fn show(&mut self) {
        self.visible = true;
    }

    /// Move to a display position, clamped to the canvas.
    pub fn move_to(&mut self, position: Point, bounds: Size) {
        self.position = bounds.clamp(position);
    }

    /// Move by a display-space offset, clamped to the canvas.
    pub fn shift_by(&mut self, dx: f64, dy: f64, bounds: Size) {
        self.move_to(self.position.offset(dx, dy), bounds);
    }

    /// Set the radius directly, clamped to `[1, max_radius]`.
    pub fn set_radius(&mut self, radius: f64) -> f64 {
        self.radius = clamp_radius(radius, self.max_radius);
        self.radius
    }

    /// Begin a drag. Hidden or already moving markers refuse.
    ///
    /// `zoom` must already reflect the inset state the gesture runs under.
    pub fn start_drag(&mut self, zoom: &ZoomState) -> bool {
        if !self.visible || self.motion != MotionState::Idle {
            return false;
        }
        self.motion = MotionState::Dragging(DragOrigin {
            screen: to_zoomed(self.position, zoom),
            display: self.position,
        });
        true
    }

    /// Apply a screen-space drag offset relative to the drag origin.
    ///
    /// Returns the new display position, or `None` when not dragging.
    pub fn drag_by(&mut self, dx: f64, dy: f64, zoom: &ZoomState, bounds: Size) -> Option<Point> {
        let origin = match self.motion {
            MotionState::Dragging(origin) => origin,
            _ => return None,
        };
        if !self.visible {
            return None;
        }
        let screen = bounds.clamp(origin.screen.offset(dx, dy));
        self.position = bounds.clamp(from_zoomed(screen, zoom));
        Some(self.position)
    }

    /// Display-space offset accumulated since the drag started.
    pub fn drag_delta(&self) -> Option<Point> {
        match self.motion {
            MotionState::Dragging(origin) => Some(self.position.delta_from(&origin.display)),
            _ => None,
        }
    }

    /// Finish a drag, committing the current position and re-placing the label.
    pub fn end_drag(&mut self, bounds: Size) -> Option<Point> {
        if !self.is_dragging() {
            return None;
        }
        self.motion = MotionState::Idle;
        self.place_label(bounds);
        Some(self.position)
    }

    /// Begin resizing from the handle.
    pub fn start_resize(&mut self) -> bool {
        if !self.visible || self.motion != MotionState::Idle {
            return false;
        }
        self.motion = MotionState::Resizing;
        true
    }

    /// Set the radius from the pointer's display-space position.
    pub fn resize_to(&mut self, pointer: Point) -> Option<f64> {
        if self.motion != MotionState::Resizing || !self.visible {
            return None;
        }
        Some(self.set_radius(pointer.distance_to(&self.position)))
    }

    pub fn end_resize(&mut self) -> bool {
        if self.motion != MotionState::Resizing {
            return false;
        }
        self.motion = MotionState::Idle;
        true
    }

    /// Pick a label angle near `requested` that keeps the caption on the canvas.
    ///
    /// Near the left or right edge the angle is mirrored as `180 - a`; near
    /// the top or bottom edge as `360 - a`. The result is in `[0, 360)`.
    pub fn good_angle(&self, requested: f64, bounds: Size) -> f64 {
        let mut a = normalize_angle(requested);
        let wide = LABEL_CHAR_WIDTH * self.caption.chars().count() as f64;
        let reach = self.radius + wide;
        let near_left = self.position.x < reach;
        let near_right = self.position.x > bounds.width - reach;
        let near_top = self.position.y < reach;
        let near_bottom = self.position.y > bounds.height - reach;

        if near_right && (a > 270.0 || a < 90.0) {
            a = 180.0 - a;
        }
        if near_left && a > 90.0 && a < 270.0 {
            a = 180.0 - a;
        }
        a = normalize_angle(a);
        // Screen y grows downward, so angles in (180, 360) point down
        if (near_bottom && a > 180.0) || (near_top && a > 0.0 && a < 180.0) {
            a = 360.0 - a;
        }
        normalize_angle(a)
    }

    /// Re-place the label using the current angle as the request.
    pub fn place_label(&mut self, bounds: Size) {
        self.label_angle = self.good_angle(self.label_angle, bounds);
    }

    /// Request a new label angle, adjusted to stay on the canvas.
    pub fn set_label_angle(&mut self, requested: f64, bounds: Size) {
        self.label_angle = self.good_angle(requested, bounds);
    }

    /// Point on the circle where the label is attached.
    pub fn label_anchor(&self) -> Point {
        let rad = self.label_angle.to_radians();
        Point::new(
            self.position.x + self.radius * rad.cos(),
            self.position.y - self.radius * rad.sin(),
        )
    }
}

fn clamp_radius(radius: f64, max_radius: f64) -> f64 {
    if radius.is_nan() {
        return 1.0;
    }
    radius.clamp(1.0, max_radius)
}

fn normalize_angle(a: f64) -> f64 {
    let a = a.rem_euclid(360.0);
    if a >= 360.0 {
        0.0
    } else {
        a
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn bounds() -> Size {
        Size::new(400.0, 300.0)
    }

    fn marker_at(x: f64, y: f64) -> Marker {
        Marker::new(MarkerId(1), MarkerRole::Source, Point::new(x, y), 10.0, DEFAULT_MAX_RADIUS)
    }

    #[test]
    fn test_new_clamps_radius() {
        let m = Marker::new(MarkerId(0), MarkerRole::Sky, Point::new(0.0, 0.0), 500.0, 70.0);
        assert_eq!(m.radius(), 70.0);
        let m = Marker::new(MarkerId(0), MarkerRole::Sky, Point::new(0.0, 0.0), 0.1, 70.0);
        assert_eq!(m.radius(), 1.0);
        assert_eq!(m.caption(), "Sky");
    }

    #[test]
    fn test_drag_unzoomed_is_plain_offset() {
        let zoom = ZoomState::default();
        let mut m = marker_at(100.0, 100.0);
        assert!(m.start_drag(&zoom));
        assert_eq!(m.drag_by(10.0, -5.0, &zoom, bounds()), Some(Point::new(110.0, 95.0)));
        // Offsets are relative to the origin, not cumulative
        assert_eq!(m.drag_by(20.0, 0.0, &zoom, bounds()), Some(Point::new(120.0, 100.0)));
        assert_eq!(m.drag_delta(), Some(Point::new(20.0, 0.0)));
        assert_eq!(m.end_drag(bounds()), Some(Point::new(120.0, 100.0)));
        assert_eq!(m.motion(), MotionState::Idle);
    }

    #[test]
    fn test_drag_zoomed_scales_offset() {
        let mut m = marker_at(100.0, 80.0);
        let zoom = ZoomState::centered_on(m.position(), 4.0);
        assert!(m.start_drag(&zoom));
        let p = m.drag_by(8.0, -4.0, &zoom, bounds()).unwrap();
        assert_relative_eq!(p.x, 102.0);
        assert_relative_eq!(p.y, 79.0);
    }

    #[test]
    fn test_drag_is_clamped() {
        let zoom = ZoomState::default();
        let mut m = marker_at(390.0, 5.0);
        m.start_drag(&zoom);
        assert_eq!(m.drag_by(50.0, -50.0, &zoom, bounds()), Some(Point::new(400.0, 0.0)));
    }

    #[test]
    fn test_hidden_marker_ignores_gestures() {
        let zoom = ZoomState::default();
        let mut m = marker_at(50.0, 50.0);
        m.hide();
        assert!(!m.start_drag(&zoom));
        assert_eq!(m.drag_by(5.0, 5.0, &zoom, bounds()), None);
        assert!(!m.start_resize());
        assert_eq!(m.resize_to(Point::new(80.0, 50.0)), None);
        assert_eq!(m.position(), Point::new(50.0, 50.0));
        m.show();
        assert!(m.start_resize());
    }

    #[test]
    fn test_resize_uses_pointer_distance() {
        let mut m = marker_at(50.0, 50.0);
        assert!(m.start_resize());
        assert_relative_eq!(m.resize_to(Point::new(53.0, 54.0)).unwrap(), 5.0);
        assert_eq!(m.resize_to(Point::new(50.0, 50.0)), Some(1.0));
        assert_eq!(m.resize_to(Point::new(350.0, 50.0)), Some(70.0));
        assert!(m.end_resize());
        assert!(!m.end_resize());
    }

    #[test]
    fn test_radius_invariant_under_random_resizes() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut m = marker_at(200.0, 150.0);
        for _ in 0..500 {
            if rng.random_bool(0.5) {
                m.set_radius(rng.random_range(-100.0..200.0));
            } else {
                m.start_resize();
                m.resize_to(Point::new(rng.random_range(-500.0..500.0), rng.random_range(-500.0..500.0)));
                m.end_resize();
            }
            assert!(m.radius() >= 1.0 && m.radius() <= m.max_radius());
        }
    }

    #[test]
    fn test_good_angle_away_from_edges() {
        let m = marker_at(200.0, 150.0).with_caption("A");
        assert_relative_eq!(m.good_angle(-30.0, bounds()), 330.0);
    }

    #[test]
    fn test_good_angle_mirrors_near_right_edge() {
        let m = marker_at(395.0, 150.0).with_caption("Source");
        // 330 points right and down; mirrored to 210 (left and down)
        assert_relative_eq!(m.good_angle(-30.0, bounds()), 210.0);
    }

    #[test]
    fn test_good_angle_mirrors_near_bottom_edge() {
        let m = marker_at(200.0, 295.0).with_caption("Sky");
        assert_relative_eq!(m.good_angle(-30.0, bounds()), 30.0);
    }

    #[test]
    fn test_good_angle_corner() {
        let m = marker_at(395.0, 295.0).with_caption("Sky");
        assert_relative_eq!(m.good_angle(-30.0, bounds()), 150.0);
    }

    #[test]
    fn test_end_drag_places_label() {
        let zoom = ZoomState::default();
        let mut m = marker_at(200.0, 150.0).with_caption("Source");
        m.start_drag(&zoom);
        m.drag_by(195.0, 0.0, &zoom, bounds());
        m.end_drag(bounds());
        assert_relative_eq!(m.label_angle(), 210.0);
        let anchor = m.label_anchor();
        assert!(anchor.x < m.position().x);
        assert!(anchor.y > m.position().y);
    }
}
