//! Frame metadata and per-frame candidate observations.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::coords::Point;
use crate::pixels::PixelBuffer;

/// Stable identifier of a candidate across frames.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(pub String);

impl CandidateId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CandidateId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One tracked point within one frame.
///
/// Coordinates are image pixels in the FITS convention (origin bottom-left).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateObservation {
    pub id: CandidateId,
    pub x: f64,
    pub y: f64,
    /// Radius override in image pixels.
    #[serde(default, rename = "r", skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
}

impl CandidateObservation {
    pub fn new(id: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            id: CandidateId::new(id),
            x,
            y,
            radius: None,
        }
    }

    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = Some(radius);
        self
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// Metadata for one frame as delivered by the frame source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameInfo {
    /// Identifier understood by the thumbnail service.
    pub frame_id: String,
    /// Direct image URL, if already resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub candidates: Vec<CandidateObservation>,
}

/// One observation image in the sequence.
#[derive(Debug, Clone)]
pub struct Frame {
    index: usize,
    info: FrameInfo,
    buffer: Option<PixelBuffer>,
}

impl Frame {
    pub fn new(index: usize, info: FrameInfo) -> Self {
        Self {
            index,
            info,
            buffer: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn frame_id(&self) -> &str {
        &self.info.frame_id
    }

    pub fn url(&self) -> Option<&str> {
        self.info.url.as_deref()
    }

    pub fn set_url(&mut self, url: impl Into<String>) {
        self.info.url = Some(url.into());
    }

    /// Native (width, height) in image pixels. Zero until known.
    pub fn native_size(&self) -> (u32, u32) {
        (self.info.width, self.info.height)
    }

    /// Record the native size once the image has been decoded.
    pub fn set_native_size(&mut self, width: u32, height: u32) {
        self.info.width = width;
        self.info.height = height;
    }

    pub fn candidates(&self) -> &[CandidateObservation] {
        &self.info.candidates
    }

    pub fn candidate(&self, id: &CandidateId) -> Option<&CandidateObservation> {
        self.info.candidates.iter().find(|c| &c.id == id)
    }

    /// Write back a refined FITS position (and optionally radius) for a candidate.
    ///
    /// Returns `false` when the candidate is not part of this frame.
    pub fn update_candidate(&mut self, id: &CandidateId, fits: Point, radius: Option<f64>) -> bool {
        match self.info.candidates.iter_mut().find(|c| &c.id == id) {
            Some(c) => {
                c.x = fits.x;
                c.y = fits.y;
                if radius.is_some() {
                    c.radius = radius;
                }
                true
            }
            None => false,
        }
    }

    pub fn buffer(&self) -> Option<&PixelBuffer> {
        self.buffer.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.buffer.is_some()
    }

    /// Attach the pixel buffer. Only the first attachment is kept.
    pub fn attach_buffer(&mut self, buffer: PixelBuffer) -> bool {
        if self.buffer.is_some() {
            log::debug!("frame {} already holds a buffer", self.index);
            return false;
        }
        self.buffer = Some(buffer);
        true
    }
}
