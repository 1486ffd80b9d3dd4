use crate::coords::{Point, Size};
use crate::marker::MarkerStyle;

/// Loading indicator state of a canvas.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadStatus {
    /// Nothing requested yet.
    Idle,
    Loading { frame: usize },
    Ready { frame: usize },
    /// The last load failed; the previous frame's markers are still shown.
    Failed { frame: usize, reason: String },
}

impl LoadStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, LoadStatus::Ready { .. })
    }
}

/// How the frame image is placed on the canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FramePlacement {
    /// Magnification relative to the display size.
    pub factor: f64,
    /// Offset of the image's top-left corner in canvas pixels.
    pub left: f64,
    pub top: f64,
}

/// Stroke and fill of a plain circle.
#[derive(Debug, Clone, PartialEq)]
pub struct CircleStyle {
    pub stroke: Option<String>,
    pub fill: Option<String>,
    pub line_width: f64,
    pub opacity: f64,
}

/// Rendering backend for an [`ImageCanvas`](super::ImageCanvas).
///
/// Implemented over a 2D canvas context in the web frontend and by
/// [`RecordingSurface`] in tests.
pub trait DrawingSurface {
    /// Clear the whole drawing area.
    fn clear(&mut self, size: Size);

    /// Draw the image of `frame` scaled to `size * placement.factor`.
    fn draw_frame(&mut self, frame: usize, size: Size, placement: FramePlacement);

    fn draw_circle(&mut self, centre: Point, radius: f64, style: &CircleStyle);

    /// Draw the crosshair shown while a marker is dragged.
    fn draw_reticle(&mut self, centre: Point, radius: f64, style: &MarkerStyle);

    /// Draw a caption attached at `anchor`, pointing outward at `angle` degrees.
    fn draw_label(&mut self, anchor: Point, angle: f64, text: &str, style: &MarkerStyle);

    /// Show or clear the loading indicator.
    fn show_status(&mut self, status: &LoadStatus);
}

/// One recorded drawing call.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Clear(Size),
    Frame {
        frame: usize,
        placement: FramePlacement,
    },
    Circle {
        centre: Point,
        radius: f64,
        style: CircleStyle,
    },
    Reticle {
        centre: Point,
        radius: f64,
    },
    Label {
        anchor: Point,
        angle: f64,
        text: String,
    },
    Status(LoadStatus),
}

/// Surface that records every call, for tests and headless use.
#[derive(Debug, Default, Clone)]
pub struct RecordingSurface {
    pub commands: Vec<DrawCommand>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands since the most recent clear.
    pub fn last_frame(&self) -> &[DrawCommand] {
        let start = self
            .commands
            .iter()
            .rposition(|c| matches!(c, DrawCommand::Clear(_)))
            .unwrap_or(0);
        &self.commands[start..]
    }
}

impl DrawingSurface for RecordingSurface {
    fn clear(&mut self, size: Size) {
        self.commands.push(DrawCommand::Clear(size));
    }

    fn draw_frame(&mut self, frame: usize, _size: Size, placement: FramePlacement) {
        self.commands.push(DrawCommand::Frame { frame, placement });
    }

    fn draw_circle(&mut self, centre: Point, radius: f64, style: &CircleStyle) {
        self.commands.push(DrawCommand::Circle {
            centre,
            radius,
            style: style.clone(),
        });
    }

    fn draw_reticle(&mut self, centre: Point, radius: f64, _style: &MarkerStyle) {
        self.commands.push(DrawCommand::Reticle { centre, radius });
    }

    fn draw_label(&mut self, anchor: Point, angle: f64, text: &str, _style: &MarkerStyle) {
        self.commands.push(DrawCommand::Label {
            anchor,
            angle,
            text: text.to_string(),
        });
    }

    fn show_status(&mut self, status: &LoadStatus) {
        self.commands.push(DrawCommand::Status(status.clone()));
    }
}
