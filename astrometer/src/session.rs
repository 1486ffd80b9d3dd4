//! Viewing session: the state of one annotation page.
//!
//! Owns the frame sequence, the canvas and the observer's accept/reject
//! decisions, and wires them together: switching frames, blinking, fine
//! tuning markers against pixel data and reading back what will be
//! submitted.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::canvas::{DrawingSurface, ImageCanvas, LoadTicket};
use crate::centroid::{CentroidRefiner, CentroidSearchResult};
use crate::config::AnnotatorConfig;
use crate::coords::{Orientation, Point};
use crate::error::{AstrometerError, Result};
use crate::frame::CandidateId;
use crate::marker::{MarkerId, MarkerRole};
use crate::pixels::PixelBuffer;
use crate::sequencer::{BlinkToken, FrameSequencer};

/// Accepted and rejected candidates. A candidate is in at most one set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateDecisions {
    accepted: BTreeSet<CandidateId>,
    rejected: BTreeSet<CandidateId>,
}

impl CandidateDecisions {
    pub fn accept(&mut self, id: CandidateId) {
        self.rejected.remove(&id);
        self.accepted.insert(id);
    }

    pub fn reject(&mut self, id: CandidateId) {
        self.accepted.remove(&id);
        self.rejected.insert(id);
    }

    /// Forget any decision about `id`.
    pub fn clear(&mut self, id: &CandidateId) -> bool {
        self.accepted.remove(id) | self.rejected.remove(id)
    }

    pub fn is_accepted(&self, id: &CandidateId) -> bool {
        self.accepted.contains(id)
    }

    pub fn is_rejected(&self, id: &CandidateId) -> bool {
        self.rejected.contains(id)
    }

    pub fn accepted(&self) -> impl Iterator<Item = &CandidateId> {
        self.accepted.iter()
    }

    pub fn rejected(&self) -> impl Iterator<Item = &CandidateId> {
        self.rejected.iter()
    }
}

/// What happened when a frame was asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowOutcome {
    /// The frame already had pixels and is on the canvas.
    Displayed,
    /// The host must fetch the image and call
    /// [`ViewingSession::complete_frame_load`] with this ticket.
    Loading(LoadTicket),
    OutOfRange,
}

/// One accepted candidate as handed to the submission flow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionEntry {
    pub id: CandidateId,
    /// FITS x in image pixels.
    pub x: f64,
    /// FITS y in image pixels.
    pub y: f64,
    /// Radius in image pixels.
    pub radius: f64,
}

/// State of one annotation page.
pub struct ViewingSession<S: DrawingSurface> {
    config: AnnotatorConfig,
    sequencer: FrameSequencer,
    canvas: ImageCanvas<S>,
    refiner: CentroidRefiner,
    decisions: CandidateDecisions,
}

impl<S: DrawingSurface> ViewingSession<S> {
    /// Validate `config` and build a session drawing onto `surface`.
    pub fn new(config: AnnotatorConfig, surface: S) -> Result<Self> {
        config.validate()?;
        let sequencer = FrameSequencer::new(config.frames());
        let canvas = ImageCanvas::new(surface, config.canvas_options());
        let refiner = CentroidRefiner::new(config.refiner.clone());
        log::info!(
            "session {} with {} frames",
            config.id,
            sequencer.len()
        );
        Ok(Self {
            config,
            sequencer,
            canvas,
            refiner,
            decisions: CandidateDecisions::default(),
        })
    }

    pub fn config(&self) -> &AnnotatorConfig {
        &self.config
    }

    pub fn sequencer(&self) -> &FrameSequencer {
        &self.sequencer
    }

    pub fn canvas(&self) -> &ImageCanvas<S> {
        &self.canvas
    }

    pub fn canvas_mut(&mut self) -> &mut ImageCanvas<S> {
        &mut self.canvas
    }

    pub fn decisions(&self) -> &CandidateDecisions {
        &self.decisions
    }

    /// Select a frame and put it on the canvas, loading it if needed.
    pub fn show_frame(&mut self, index: usize) -> ShowOutcome {
        if !self.sequencer.select(index) {
            return ShowOutcome::OutOfRange;
        }
        self.display_current()
    }

    fn display_current(&mut self) -> ShowOutcome {
        let index = self.sequencer.current_index();
        let Some(frame) = self.sequencer.current() else {
            return ShowOutcome::OutOfRange;
        };
        if frame.is_loaded() {
            self.canvas.load_frame(frame);
            ShowOutcome::Displayed
        } else {
            ShowOutcome::Loading(self.canvas.begin_load(index))
        }
    }

    /// Deliver the pixels (or the failure) for a pending load.
    ///
    /// The buffer is attached to its frame even when the ticket has gone
    /// stale, so the next visit to that frame displays immediately. Returns
    /// whether the canvas applied the result.
    pub fn complete_frame_load(&mut self, ticket: LoadTicket, result: Result<PixelBuffer>) -> bool {
        let buffer = match result {
            Ok(buffer) => buffer,
            Err(e) => return self.canvas.complete_load(ticket, Err(e)),
        };
        let Some(frame) = self.sequencer.frame_mut(ticket.frame()) else {
            return self.canvas.complete_load(
                ticket,
                Err(AstrometerError::load_failure(ticket.frame(), "no such frame")),
            );
        };
        if frame.native_size() == (0, 0) {
            frame.set_native_size(buffer.width() as u32, buffer.height() as u32);
        }
        frame.attach_buffer(buffer);
        self.canvas.complete_load(ticket, Ok(&*frame))
    }

    /// Record a late-resolved image URL for a frame.
    pub fn set_frame_url(&mut self, index: usize, url: impl Into<String>) -> bool {
        match self.sequencer.frame_mut(index) {
            Some(frame) => {
                frame.set_url(url);
                true
            }
            None => false,
        }
    }

    /// Show only candidate `id` (or every candidate for `None`) on this and
    /// later frames, zoomed onto it. Returns whether the current frame has it.
    pub fn focus_candidate(&mut self, id: Option<CandidateId>) -> bool {
        self.canvas.focus_candidate(id)
    }

    /// Start blinking at the configured interval.
    pub fn blink_start(&mut self) -> BlinkToken {
        self.sequencer.blink_start(self.config.blink_interval())
    }

    /// Handle a blink timer tick. `None` when the token is no longer live.
    pub fn blink_tick(&mut self, token: BlinkToken) -> Option<ShowOutcome> {
        self.sequencer.blink_tick(token)?;
        Some(self.display_current())
    }

    pub fn blink_stop(&mut self) -> bool {
        self.sequencer.blink_stop()
    }

    pub fn accept(&mut self, id: CandidateId) {
        log::info!("accepted candidate {id}");
        self.decisions.accept(id);
    }

    pub fn reject(&mut self, id: CandidateId) {
        log::info!("rejected candidate {id}");
        self.decisions.reject(id);
    }

    pub fn is_accepted(&self, id: &CandidateId) -> bool {
        self.decisions.is_accepted(id)
    }

    pub fn accepted(&self) -> Vec<CandidateId> {
        self.decisions.accepted().cloned().collect()
    }

    /// Move every visible marker onto the nearest centroid in the current
    /// frame's pixels, then write the positions back to the frame.
    ///
    /// The decoded image may be smaller than the frame's declared size (a
    /// thumbnail, say). Seeds are scaled into buffer pixels for the search and
    /// the result is scaled back. Offsets are reported in buffer pixels.
    pub fn fine_tune(&mut self) -> Vec<(MarkerId, CentroidSearchResult)> {
        let Some(index) = self.canvas.current_frame() else {
            return Vec::new();
        };
        let Some(mapper) = self.canvas.mapper().copied() else {
            return Vec::new();
        };
        let Some(buffer) = self.sequencer.frame(index).and_then(|f| f.buffer()) else {
            log::debug!("fine_tune: frame {index} has no pixels");
            return Vec::new();
        };

        let to_buffer = (
            buffer.width() as f64 / mapper.image_width(),
            buffer.height() as f64 / mapper.image_height(),
        );
        if to_buffer != (1.0, 1.0) {
            log::debug!(
                "fine_tune: {}x{} pixels for a {}x{} frame",
                buffer.width(),
                buffer.height(),
                mapper.image_width(),
                mapper.image_height()
            );
        }

        let seeds: Vec<(MarkerId, _)> = self
            .canvas
            .markers()
            .iter()
            .filter(|m| m.is_visible())
            .map(|m| (m.id(), m.position()))
            .collect();

        let mut results = Vec::with_capacity(seeds.len());
        for (id, display) in seeds {
            let image = mapper.to_image(display, Orientation::Display);
            let seed = Point::new(image.x * to_buffer.0, image.y * to_buffer.1);
            let result = self.refiner.refine(buffer, seed);
            if result.offset.x != 0.0 || result.offset.y != 0.0 {
                let refined = result.refined(seed);
                let image = Point::new(refined.x / to_buffer.0, refined.y / to_buffer.1);
                self.canvas
                    .move_marker(id, mapper.to_display(image, Orientation::Display));
            }
            log::debug!(
                "fine_tune {id}: offset {} after {} iterations (converged: {})",
                result.offset,
                result.iterations,
                result.converged
            );
            results.push((id, result));
        }
        self.sync_positions();
        results
    }

    /// Write candidate marker positions and radii back to the current frame.
    ///
    /// Returns the number of candidates updated.
    pub fn sync_positions(&mut self) -> usize {
        let Some(index) = self.canvas.current_frame() else {
            return 0;
        };
        let Some(mapper) = self.canvas.mapper().copied() else {
            return 0;
        };
        let Some(frame) = self.sequencer.frame_mut(index) else {
            return 0;
        };
        let mut updated = 0;
        for marker in self.canvas.markers() {
            if let MarkerRole::Candidate(id) = marker.role() {
                let fits = mapper.to_image(marker.position(), Orientation::Fits);
                let radius = mapper.length_to_image(marker.radius());
                if frame.update_candidate(id, fits, Some(radius)) {
                    updated += 1;
                }
            }
        }
        updated
    }

    /// Accepted candidates with their current FITS position and radius.
    ///
    /// Positions come from the canvas markers; candidates not on the canvas
    /// fall back to the current frame's record.
    pub fn submission(&self) -> Vec<SubmissionEntry> {
        let readings = self.canvas.readings(Orientation::Fits);
        let frame = self
            .canvas
            .current_frame()
            .and_then(|i| self.sequencer.frame(i));
        self.decisions
            .accepted()
            .filter_map(|id| {
                let role = MarkerRole::Candidate(id.clone());
                if let Some(r) = readings.iter().find(|r| r.role == role) {
                    return Some(SubmissionEntry {
                        id: id.clone(),
                        x: r.x,
                        y: r.y,
                        radius: r.radius,
                    });
                }
                let c = frame?.candidate(id)?;
                Some(SubmissionEntry {
                    id: id.clone(),
                    x: c.x,
                    y: c.y,
                    radius: c.radius.unwrap_or(self.config.calibrator_radius),
                })
            })
            .collect()
    }
}
