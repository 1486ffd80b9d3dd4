//! 2D canvas implementation of the astrometer drawing surface.

use std::collections::HashMap;
use std::f64::consts::TAU;

use anyhow::anyhow;
use astrometer::canvas::{CircleStyle, DrawingSurface, FramePlacement, LoadStatus};
use astrometer::marker::MarkerStyle;
use astrometer::{PixelBuffer, Point, Size};
use wasm_bindgen::JsCast;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, HtmlImageElement};

const LABEL_FONT: &str = "14px sans-serif";
const STATUS_FONT: &str = "20px sans-serif";

/// Get the 2D context of a canvas element.
pub fn context_2d(canvas: &HtmlCanvasElement) -> anyhow::Result<CanvasRenderingContext2d> {
    canvas
        .get_context("2d")
        .map_err(|e| anyhow!("get_context failed: {e:?}"))?
        .ok_or_else(|| anyhow!("canvas has no 2d context"))?
        .dyn_into::<CanvasRenderingContext2d>()
        .map_err(|_| anyhow!("context is not a CanvasRenderingContext2d"))
}

/// Read the pixels of a loaded image through an off-screen canvas.
///
/// Fails for cross-origin images served without CORS headers.
pub fn image_pixels(image: &HtmlImageElement) -> anyhow::Result<PixelBuffer> {
    let width = image.natural_width();
    let height = image.natural_height();
    if width == 0 || height == 0 {
        return Err(anyhow!("image has no pixels"));
    }
    let document = web_sys::window()
        .and_then(|w| w.document())
        .ok_or_else(|| anyhow!("no document"))?;
    let scratch = document
        .create_element("canvas")
        .map_err(|e| anyhow!("create canvas: {e:?}"))?
        .dyn_into::<HtmlCanvasElement>()
        .map_err(|_| anyhow!("not a canvas element"))?;
    scratch.set_width(width);
    scratch.set_height(height);
    let ctx = context_2d(&scratch)?;
    ctx.draw_image_with_html_image_element(image, 0.0, 0.0)
        .map_err(|e| anyhow!("draw_image: {e:?}"))?;
    let data = ctx
        .get_image_data(0.0, 0.0, width as f64, height as f64)
        .map_err(|e| anyhow!("get_image_data: {e:?}"))?;
    Ok(PixelBuffer::from_rgba(
        width as usize,
        height as usize,
        &data.data().0,
    )?)
}

/// Draws onto an on-page canvas element.
pub struct WebSurface {
    canvas: HtmlCanvasElement,
    ctx: CanvasRenderingContext2d,
    images: HashMap<usize, HtmlImageElement>,
}

impl WebSurface {
    pub fn new(canvas: HtmlCanvasElement) -> anyhow::Result<Self> {
        let ctx = context_2d(&canvas)?;
        Ok(Self {
            canvas,
            ctx,
            images: HashMap::new(),
        })
    }

    /// Register the decoded image of a frame.
    pub fn insert_image(&mut self, frame: usize, image: HtmlImageElement) {
        self.images.insert(frame, image);
    }

    fn size(&self) -> (f64, f64) {
        (self.canvas.width() as f64, self.canvas.height() as f64)
    }
}

impl DrawingSurface for WebSurface {
    fn clear(&mut self, size: Size) {
        let width = size.width.ceil() as u32;
        let height = size.height.ceil() as u32;
        if self.canvas.width() != width || self.canvas.height() != height {
            self.canvas.set_width(width);
            self.canvas.set_height(height);
        }
        self.ctx.set_fill_style_str("#000000");
        self.ctx.fill_rect(0.0, 0.0, size.width, size.height);
    }

    fn draw_frame(&mut self, frame: usize, size: Size, placement: FramePlacement) {
        let Some(image) = self.images.get(&frame) else {
            return;
        };
        let _ = self.ctx.draw_image_with_html_image_element_and_dw_and_dh(
            image,
            placement.left,
            placement.top,
            size.width * placement.factor,
            size.height * placement.factor,
        );
    }

    fn draw_circle(&mut self, centre: Point, radius: f64, style: &CircleStyle) {
        self.ctx.set_global_alpha(style.opacity);
        self.ctx.begin_path();
        let _ = self.ctx.arc(centre.x, centre.y, radius.max(0.0), 0.0, TAU);
        if let Some(fill) = &style.fill {
            self.ctx.set_fill_style_str(fill);
            self.ctx.fill();
        }
        if let Some(stroke) = &style.stroke {
            self.ctx.set_stroke_style_str(stroke);
            self.ctx.set_line_width(style.line_width);
            self.ctx.stroke();
        }
        self.ctx.set_global_alpha(1.0);
    }

    fn draw_reticle(&mut self, centre: Point, radius: f64, style: &MarkerStyle) {
        self.ctx.set_stroke_style_str(&style.stroke);
        self.ctx.set_line_width(1.0);
        self.ctx.begin_path();
        self.ctx.move_to(centre.x - radius, centre.y);
        self.ctx.line_to(centre.x + radius, centre.y);
        self.ctx.move_to(centre.x, centre.y - radius);
        self.ctx.line_to(centre.x, centre.y + radius);
        self.ctx.stroke();
    }

    fn draw_label(&mut self, anchor: Point, angle: f64, text: &str, style: &MarkerStyle) {
        let a = angle.rem_euclid(360.0);
        self.ctx
            .set_text_align(if a > 90.0 && a < 270.0 { "right" } else { "left" });
        self.ctx
            .set_text_baseline(if a > 180.0 { "top" } else { "bottom" });
        self.ctx.set_font(LABEL_FONT);
        self.ctx.set_line_width(3.0);
        self.ctx.set_stroke_style_str(&style.text);
        let _ = self.ctx.stroke_text(text, anchor.x, anchor.y);
        self.ctx.set_fill_style_str(&style.stroke);
        let _ = self.ctx.fill_text(text, anchor.x, anchor.y);
    }

    fn show_status(&mut self, status: &LoadStatus) {
        let (message, colour) = match status {
            LoadStatus::Idle | LoadStatus::Ready { .. } => return,
            LoadStatus::Loading { frame } => (format!("Loading frame {}...", frame + 1), "#ffffff"),
            LoadStatus::Failed { frame, reason } => {
                (format!("Frame {} failed: {reason}", frame + 1), "#ff4040")
            }
        };
        let (width, height) = self.size();
        self.ctx.set_text_align("center");
        self.ctx.set_text_baseline("middle");
        self.ctx.set_font(STATUS_FONT);
        self.ctx.set_fill_style_str(colour);
        let _ = self.ctx.fill_text(&message, width / 2.0, height / 2.0);
    }
}
