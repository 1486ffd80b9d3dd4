//! Marker and canvas engine for annotating telescope frames.
//!
//! Candidate detections are shown as draggable, resizable markers over a
//! scaled-down frame, with a magnified inset while a marker is dragged.
//! Markers can be linked as twins so they move and resize together, and can
//! be nudged onto the centroid of the underlying source.
//!
//! Image positions exchanged with callers use an explicit [`Orientation`]:
//! FITS (origin bottom-left) or display (origin top-left).

pub mod canvas;
pub mod centroid;
pub mod config;
pub mod coords;
pub mod error;
pub mod frame;
pub mod marker;
pub mod pixels;
pub mod sequencer;
pub mod session;
pub mod twins;

pub use canvas::{
    Aperture, CanvasEvent, CanvasOptions, DrawingSurface, EventKind, ImageCanvas, LoadStatus,
    LoadTicket, Overlay, RecordingSurface,
};
pub use centroid::{CentroidRefiner, CentroidSearchResult, RefinerConfig};
pub use config::AnnotatorConfig;
pub use coords::{from_zoomed, to_zoomed, CoordinateMapper, Orientation, Point, Size, ZoomState};
pub use error::{AstrometerError, Result};
pub use frame::{CandidateId, CandidateObservation, Frame, FrameInfo};
pub use marker::{Marker, MarkerId, MarkerRole, MotionState};
pub use pixels::PixelBuffer;
pub use sequencer::{BlinkToken, FrameSequencer};
pub use session::{CandidateDecisions, ShowOutcome, SubmissionEntry, ViewingSession};
