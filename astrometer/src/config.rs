//! Annotator configuration.
//!
//! One JSON record describes a viewing session: where frames come from, how
//! large the display is, and the marker defaults. Unknown keys are rejected so
//! a misspelt option fails loudly instead of silently falling back to a
//! default.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::canvas::CanvasOptions;
use crate::centroid::RefinerConfig;
use crate::error::{AstrometerError, Result};
use crate::frame::{CandidateObservation, Frame, FrameInfo};
use crate::marker::{DEFAULT_LABEL_ANGLE, DEFAULT_MAX_RADIUS};

/// Configuration of one annotator instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct AnnotatorConfig {
    /// Identifier of the host element / session.
    pub id: String,
    /// Image URL for single-frame use.
    pub source: Option<String>,
    /// Display width in pixels.
    pub width: f64,
    /// Optional display height limit in pixels.
    pub height: Option<f64>,
    /// Inset magnification while dragging; defaults to the image scale.
    pub zoom_factor: Option<f64>,
    /// Candidate marker radius in image pixels.
    pub calibrator_radius: f64,
    /// Caption prefix for candidate markers.
    pub calibrator_label: String,
    /// Candidates for single-frame use (FITS image pixels).
    pub candidate_list: Vec<CandidateObservation>,
    /// Frame sequence for blinking.
    pub frame_stack: Vec<FrameInfo>,
    /// Upper bound on marker radius in display pixels.
    pub max_radius: f64,
    /// Requested label angle in degrees.
    pub label_angle: f64,
    pub blink_interval_ms: u64,
    /// Drag twins with every marker without holding the modifier.
    pub group_move: bool,
    pub refiner: RefinerConfig,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            id: "annotator".to_string(),
            source: None,
            width: 700.0,
            height: None,
            zoom_factor: None,
            calibrator_radius: 20.0,
            calibrator_label: "Candidate".to_string(),
            candidate_list: Vec::new(),
            frame_stack: Vec::new(),
            max_radius: DEFAULT_MAX_RADIUS,
            label_angle: DEFAULT_LABEL_ANGLE,
            blink_interval_ms: 500,
            group_move: false,
            refiner: RefinerConfig::default(),
        }
    }
}

fn invalid(msg: impl Into<String>) -> AstrometerError {
    AstrometerError::InvalidConfig(msg.into())
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be positive, got {value}")))
    }
}

fn check_candidates(context: &str, candidates: &[CandidateObservation]) -> Result<()> {
    let mut seen = HashSet::new();
    for c in candidates {
        if !seen.insert(&c.id) {
            return Err(invalid(format!("{context}: duplicate candidate id {}", c.id)));
        }
        if !(c.x.is_finite() && c.y.is_finite()) {
            return Err(invalid(format!("{context}: candidate {} has a non-finite position", c.id)));
        }
        if let Some(r) = c.radius {
            positive(&format!("{context}: radius of {}", c.id), r)?;
        }
    }
    Ok(())
}

impl AnnotatorConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        log::info!("loading annotator config from {}", path.as_ref().display());
        Self::from_json_str(&contents)
    }

    /// Write the configuration as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(invalid("id must not be empty"));
        }
        positive("width", self.width)?;
        if let Some(h) = self.height {
            positive("height", h)?;
        }
        if let Some(z) = self.zoom_factor {
            if !(z.is_finite() && z >= 1.0) {
                return Err(invalid(format!("zoomFactor must be at least 1, got {z}")));
            }
        }
        positive("calibratorRadius", self.calibrator_radius)?;
        if !(self.max_radius.is_finite() && self.max_radius >= 1.0) {
            return Err(invalid(format!("maxRadius must be at least 1, got {}", self.max_radius)));
        }
        if !self.label_angle.is_finite() {
            return Err(invalid("labelAngle must be finite"));
        }
        if self.blink_interval_ms == 0 {
            return Err(invalid("blinkIntervalMs must be positive"));
        }
        if self.refiner.window < 3 || self.refiner.max_iterations == 0 {
            return Err(invalid("refiner window must be at least 3 with at least one iteration"));
        }
        if self.frame_stack.is_empty() && self.source.is_none() {
            return Err(invalid("either source or frameStack is required"));
        }
        if !self.frame_stack.is_empty() && !self.candidate_list.is_empty() {
            return Err(invalid("candidateList only applies without a frameStack"));
        }
        check_candidates("candidateList", &self.candidate_list)?;
        for (i, info) in self.frame_stack.iter().enumerate() {
            if info.frame_id.trim().is_empty() {
                return Err(invalid(format!("frameStack[{i}]: frameId must not be empty")));
            }
            check_candidates(&format!("frameStack[{i}]"), &info.candidates)?;
        }
        Ok(())
    }

    /// Canvas settings derived from this configuration.
    pub fn canvas_options(&self) -> CanvasOptions {
        CanvasOptions {
            display_width: self.width,
            display_height: self.height,
            inset_factor: self.zoom_factor,
            max_radius: self.max_radius,
            label_angle: self.label_angle,
            candidate_radius: self.calibrator_radius,
            candidate_label: self.calibrator_label.clone(),
            group_move: self.group_move,
        }
    }

    /// Frames in sequence order. Without a frame stack the single `source`
    /// image becomes frame 0 with `candidateList`.
    pub fn frames(&self) -> Vec<Frame> {
        if self.frame_stack.is_empty() {
            let info = FrameInfo {
                frame_id: self.id.clone(),
                url: self.source.clone(),
                width: 0,
                height: 0,
                candidates: self.candidate_list.clone(),
            };
            return vec![Frame::new(0, info)];
        }
        self.frame_stack
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, info)| Frame::new(i, info))
            .collect()
    }

    pub fn blink_interval(&self) -> Duration {
        Duration::from_millis(self.blink_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const STACK: &str = r#"{
        "id": "analyser",
        "width": 600,
        "zoomFactor": 3,
        "frameStack": [
            {"frameId": "101", "width": 2048, "height": 2048,
             "candidates": [{"id": "N00abc", "x": 100.0, "y": 200.0}]},
            {"frameId": "102", "url": "https://example.org/102.jpg", "width": 2048, "height": 2048,
             "candidates": [{"id": "N00abc", "x": 104.0, "y": 198.0, "r": 12.0}]}
        ]
    }"#;

    #[test]
    fn test_parse_frame_stack() {
        let config = AnnotatorConfig::from_json_str(STACK).unwrap();
        assert_eq!(config.id, "analyser");
        assert_eq!(config.zoom_factor, Some(3.0));
        assert_eq!(config.calibrator_radius, 20.0);
        assert_eq!(config.blink_interval(), Duration::from_millis(500));

        let frames = config.frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].index(), 1);
        assert_eq!(frames[1].url(), Some("https://example.org/102.jpg"));

        let options = config.canvas_options();
        assert_eq!(options.display_width, 600.0);
        assert_eq!(options.inset_factor, Some(3.0));
        assert_eq!(options.candidate_label, "Candidate");
    }

    #[test]
    fn test_single_source() {
        let json = r#"{"source": "img.png", "candidateList": [{"id": "a", "x": 1, "y": 2}]}"#;
        let config = AnnotatorConfig::from_json_str(json).unwrap();
        let frames = config.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].url(), Some("img.png"));
        assert_eq!(frames[0].candidates().len(), 1);
        assert_eq!(frames[0].native_size(), (0, 0));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let json = r#"{"source": "img.png", "zoom": 2}"#;
        assert!(matches!(
            AnnotatorConfig::from_json_str(json),
            Err(AstrometerError::Parse(_))
        ));
    }

    #[test]
    fn test_validation_errors() {
        let base = AnnotatorConfig {
            source: Some("img.png".into()),
            ..Default::default()
        };
        assert!(base.validate().is_ok());

        let cases = [
            AnnotatorConfig { width: 0.0, ..base.clone() },
            AnnotatorConfig { zoom_factor: Some(0.5), ..base.clone() },
            AnnotatorConfig { calibrator_radius: -1.0, ..base.clone() },
            AnnotatorConfig { blink_interval_ms: 0, ..base.clone() },
            AnnotatorConfig { source: None, ..base.clone() },
            AnnotatorConfig {
                candidate_list: vec![
                    CandidateObservation::new("dup", 1.0, 1.0),
                    CandidateObservation::new("dup", 2.0, 2.0),
                ],
                ..base.clone()
            },
        ];
        for config in cases {
            assert!(
                matches!(config.validate(), Err(AstrometerError::InvalidConfig(_))),
                "expected rejection of {config:?}"
            );
        }
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("annotator.json");
        let config = AnnotatorConfig::from_json_str(STACK).unwrap();
        config.save(&path).unwrap();
        assert_eq!(AnnotatorConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            AnnotatorConfig::from_file(dir.path().join("missing.json")),
            Err(AstrometerError::Io(_))
        ));
    }
}
