//! Image canvas: one frame, its inset view and the markers drawn over it.
//!
//! The canvas owns the marker set and the zoom state, turns pointer gestures
//! into marker updates and notifies listeners. Rendering goes through an
//! injected [`DrawingSurface`].
//!
//! Loading is split in two so the host can fetch pixels asynchronously:
//! [`ImageCanvas::begin_load`] hands out a [`LoadTicket`] and
//! [`ImageCanvas::complete_load`] applies the result only if that ticket is
//! still the most recent one.

mod events;
mod surface;

pub use events::{CanvasEvent, CanvasListener, EventKind, ListenerId, Listeners};
pub use surface::{
    CircleStyle, DrawCommand, DrawingSurface, FramePlacement, LoadStatus, RecordingSurface,
};

use serde::{Deserialize, Serialize};

use crate::coords::{from_zoomed, to_zoomed, CoordinateMapper, Orientation, Point, Size, ZoomState};
use crate::error::Result;
use crate::frame::{CandidateId, Frame};
use crate::marker::{Marker, MarkerId, MarkerRole, DEFAULT_LABEL_ANGLE, DEFAULT_MAX_RADIUS};
use crate::twins;

/// Markers that must stay on a canvas (conventionally sky and source).
pub const MIN_MARKERS: usize = 2;

/// Distance from the ring, in canvas pixels, that grabs the resize handle.
/// Never more than half the on-screen radius, so small markers keep a body.
const RESIZE_HANDLE_WIDTH: f64 = 4.0;

/// Opacity of background source overlays.
const OVERLAY_OPACITY: f64 = 0.3;

/// Behaviour settings for an [`ImageCanvas`].
#[derive(Debug, Clone, PartialEq)]
pub struct CanvasOptions {
    /// Target width of the display canvas in pixels.
    pub display_width: f64,
    /// Optional height limit; the coarser of the two fits wins.
    pub display_height: Option<f64>,
    /// Inset magnification while dragging. `None` uses the image scale.
    pub inset_factor: Option<f64>,
    pub max_radius: f64,
    /// Requested label angle in degrees.
    pub label_angle: f64,
    /// Radius of candidate markers in image pixels.
    pub candidate_radius: f64,
    /// Caption prefix for candidate markers.
    pub candidate_label: String,
    /// Drag twins along with every marker.
    pub group_move: bool,
}

impl Default for CanvasOptions {
    fn default() -> Self {
        Self {
            display_width: 700.0,
            display_height: None,
            inset_factor: None,
            max_radius: DEFAULT_MAX_RADIUS,
            label_angle: DEFAULT_LABEL_ANGLE,
            candidate_radius: 20.0,
            candidate_label: "Candidate".to_string(),
            group_move: false,
        }
    }
}

/// Handle for one pending load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
    frame: usize,
}

impl LoadTicket {
    pub fn frame(&self) -> usize {
        self.frame
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Non-interactive background source, drawn translucent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overlay {
    /// FITS x in image pixels.
    pub x: f64,
    /// FITS y in image pixels.
    pub y: f64,
    /// Radius in image pixels.
    #[serde(rename = "r")]
    pub radius: f64,
    #[serde(default = "default_overlay_fill")]
    pub fill: String,
}

fn default_overlay_fill() -> String {
    "rgb(255,0,0)".to_string()
}

/// Aperture in image pixels, FITS convention.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aperture {
    pub x: f64,
    pub y: f64,
    #[serde(rename = "r")]
    pub radius: f64,
}

/// Marker state read back in image pixels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerReading {
    pub id: MarkerId,
    pub role: MarkerRole,
    pub x: f64,
    pub y: f64,
    pub radius: f64,
}

/// Part of a marker under the pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitTarget {
    /// Inside the circle: dragging moves the marker.
    Body(MarkerId),
    /// On the ring: dragging resizes the marker.
    Ring(MarkerId),
}

#[derive(Debug, Clone)]
enum Gesture {
    Drag {
        leader: MarkerId,
        group: bool,
        twin_origins: Vec<(MarkerId, Point)>,
    },
    Resize {
        marker: MarkerId,
    },
}

/// One frame, its inset and the markers over it.
pub struct ImageCanvas<S: DrawingSurface> {
    surface: S,
    options: CanvasOptions,
    mapper: Option<CoordinateMapper>,
    zoom: ZoomState,
    markers: Vec<Marker>,
    overlays: Vec<Overlay>,
    listeners: Listeners,
    status: LoadStatus,
    generation: u64,
    pending: Option<u64>,
    frame: Option<usize>,
    next_marker: u64,
    gesture: Option<Gesture>,
    /// Candidate shown alone, kept across frame loads.
    focus: Option<CandidateId>,
}

impl<S: DrawingSurface> ImageCanvas<S> {
    pub fn new(surface: S, options: CanvasOptions) -> Self {
        Self {
            surface,
            options,
            mapper: None,
            zoom: ZoomState::default(),
            markers: Vec::new(),
            overlays: Vec::new(),
            listeners: Listeners::default(),
            status: LoadStatus::Idle,
            generation: 0,
            pending: None,
            frame: None,
            next_marker: 0,
            gesture: None,
            focus: None,
        }
    }

    pub fn options(&self) -> &CanvasOptions {
        &self.options
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn mapper(&self) -> Option<&CoordinateMapper> {
        self.mapper.as_ref()
    }

    pub fn zoom(&self) -> &ZoomState {
        &self.zoom
    }

    pub fn status(&self) -> &LoadStatus {
        &self.status
    }

    /// Index of the frame the markers belong to.
    pub fn current_frame(&self) -> Option<usize> {
        self.frame
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn marker(&self, id: MarkerId) -> Option<&Marker> {
        self.markers.iter().find(|m| m.id() == id)
    }

    fn marker_mut(&mut self, id: MarkerId) -> Option<&mut Marker> {
        self.markers.iter_mut().find(|m| m.id() == id)
    }

    pub fn marker_by_role(&self, role: &MarkerRole) -> Option<&Marker> {
        self.markers.iter().find(|m| m.role() == role)
    }

    /// Display canvas size; zero until an image size is known.
    pub fn display_size(&self) -> Size {
        self.mapper
            .map(|m| m.display_size())
            .unwrap_or_default()
    }

    /// Magnification used for the inset while dragging.
    pub fn inset_factor(&self) -> f64 {
        let scale = self.mapper.map(|m| m.scale()).unwrap_or(1.0);
        let factor = self.options.inset_factor.unwrap_or(scale);
        if factor.is_finite() {
            factor.max(1.0)
        } else {
            1.0
        }
    }

    pub fn group_move(&self) -> bool {
        self.options.group_move
    }

    pub fn set_group_move(&mut self, enabled: bool) {
        self.options.group_move = enabled;
    }

    pub fn bind(&mut self, kind: EventKind, listener: CanvasListener) -> ListenerId {
        self.listeners.bind(kind, listener)
    }

    pub fn unbind(&mut self, id: ListenerId) -> bool {
        self.listeners.unbind(id)
    }

    fn emit(&mut self, event: CanvasEvent) {
        log::trace!("canvas event {event:?}");
        self.listeners.dispatch(&event);
    }

    fn allocate_id(&mut self) -> MarkerId {
        let id = MarkerId(self.next_marker);
        self.next_marker += 1;
        id
    }

    /// Set up the mapper for an image of the given native size.
    ///
    /// The scale is kept when the native size is unchanged.
    pub fn set_native_size(&mut self, width: u32, height: u32) -> Result<()> {
        if let Some(m) = &self.mapper {
            if m.image_width() == width as f64 && m.image_height() == height as f64 {
                return Ok(());
            }
        }
        let mut mapper = CoordinateMapper::fit_width(width, height, self.options.display_width)?;
        if let Some(limit) = self.options.display_height {
            let by_height = CoordinateMapper::fit_height(width, height, limit)?;
            if by_height.scale() > mapper.scale() {
                mapper = by_height;
            }
        }
        log::info!(
            "image {width}x{height} shown at 1/{} scale ({:.0}x{:.0})",
            mapper.scale(),
            mapper.display_size().width,
            mapper.display_size().height
        );
        self.mapper = Some(mapper);
        Ok(())
    }

    /// Start loading `frame`. Any earlier pending load becomes stale.
    pub fn begin_load(&mut self, frame: usize) -> LoadTicket {
        self.generation += 1;
        self.pending = Some(self.generation);
        self.status = LoadStatus::Loading { frame };
        self.surface.show_status(&self.status);
        LoadTicket {
            generation: self.generation,
            frame,
        }
    }

    /// Apply the outcome of a load.
    ///
    /// Returns `false` when the ticket is stale and the outcome was dropped.
    /// A failure is recorded in [`ImageCanvas::status`]; the previous markers
    /// stay in place.
    pub fn complete_load(&mut self, ticket: LoadTicket, outcome: Result<&Frame>) -> bool {
        if self.pending != Some(ticket.generation) {
            log::debug!(
                "dropping stale load of frame {} (generation {})",
                ticket.frame,
                ticket.generation
            );
            return false;
        }
        self.pending = None;

        let result = outcome.and_then(|frame| {
            let (width, height) = frame.native_size();
            self.set_native_size(width, height)?;
            Ok(frame)
        });
        match result {
            Ok(frame) => {
                self.gesture = None;
                self.build_candidate_markers(frame);
                self.apply_focus();
                self.frame = Some(ticket.frame);
                self.status = LoadStatus::Ready { frame: ticket.frame };
                log::info!(
                    "frame {} ready with {} candidates",
                    ticket.frame,
                    self.markers.len()
                );
                self.redraw();
                self.emit(CanvasEvent::Ready { frame: ticket.frame });
            }
            Err(e) => {
                log::warn!("frame {} failed to load: {e}", ticket.frame);
                self.status = LoadStatus::Failed {
                    frame: ticket.frame,
                    reason: e.to_string(),
                };
                self.redraw();
            }
        }
        true
    }

    /// Load a frame whose image is already available.
    pub fn load_frame(&mut self, frame: &Frame) -> bool {
        let ticket = self.begin_load(frame.index());
        self.complete_load(ticket, Ok(frame))
    }

    fn build_candidate_markers(&mut self, frame: &Frame) {
        let Some(mapper) = self.mapper else {
            return;
        };
        let bounds = mapper.display_size();
        let mut markers = Vec::with_capacity(frame.candidates().len());
        for (i, candidate) in frame.candidates().iter().enumerate() {
            let id = self.allocate_id();
            let position = bounds.clamp(mapper.to_display(candidate.position(), Orientation::Fits));
            let radius = mapper
                .length_to_display(candidate.radius.unwrap_or(self.options.candidate_radius));
            let mut marker = Marker::new(
                id,
                MarkerRole::Candidate(candidate.id.clone()),
                position,
                radius,
                self.options.max_radius,
            )
            .with_caption(format!("{} {}", self.options.candidate_label, i + 1));
            marker.set_label_angle(self.options.label_angle, bounds);
            markers.push(marker);
        }
        self.markers = markers;
        self.link_all();
    }

    fn link_all(&mut self) {
        let ids: Vec<MarkerId> = self.markers.iter().map(|m| m.id()).collect();
        if let Some((&first, rest)) = ids.split_first() {
            twins::is_twin_of(&mut self.markers, first, rest);
        }
    }

    /// Replace the markers with the photometry set: sky, source and numbered
    /// calibrators, all twinned. Positions are FITS image pixels.
    pub fn photometry_layout(
        &mut self,
        sky: Aperture,
        source: Aperture,
        calibrators: &[Aperture],
    ) -> Option<Vec<MarkerId>> {
        let Some(mapper) = self.mapper else {
            log::debug!("photometry_layout before an image size is known");
            return None;
        };
        let bounds = mapper.display_size();
        let roles = [(MarkerRole::Sky, sky), (MarkerRole::Source, source)]
            .into_iter()
            .chain(
                calibrators
                    .iter()
                    .enumerate()
                    .map(|(i, a)| (MarkerRole::Calibrator(i as u32 + 1), *a)),
            );

        let mut markers = Vec::new();
        for (role, aperture) in roles {
            let id = self.allocate_id();
            let position =
                bounds.clamp(mapper.to_display(Point::new(aperture.x, aperture.y), Orientation::Fits));
            let mut marker = Marker::new(
                id,
                role,
                position,
                mapper.length_to_display(aperture.radius),
                self.options.max_radius,
            );
            marker.set_label_angle(self.options.label_angle, bounds);
            markers.push(marker);
        }
        self.gesture = None;
        self.markers = markers;
        self.link_all();
        self.redraw();
        Some(self.markers.iter().map(|m| m.id()).collect())
    }

    /// Add a marker at a display position.
    ///
    /// The new marker copies the radius of the last marker and joins the
    /// group of every existing marker.
    pub fn add_marker(&mut self, role: MarkerRole, position: Point) -> Option<MarkerId> {
        let Some(mapper) = self.mapper else {
            log::debug!("add_marker before an image size is known");
            return None;
        };
        let bounds = mapper.display_size();
        let radius = self
            .markers
            .last()
            .map(|m| m.radius())
            .unwrap_or_else(|| mapper.length_to_display(self.options.candidate_radius));
        let id = self.allocate_id();
        let mut marker = Marker::new(id, role, bounds.clamp(position), radius, self.options.max_radius);
        marker.set_label_angle(self.options.label_angle, bounds);
        self.markers.push(marker);

        let others: Vec<MarkerId> = self
            .markers
            .iter()
            .map(|m| m.id())
            .filter(|&other| other != id)
            .collect();
        twins::is_twin_of(&mut self.markers, id, &others);
        self.redraw();
        Some(id)
    }

    /// Add a marker at a FITS image position.
    pub fn add_marker_fits(&mut self, role: MarkerRole, fits: Point) -> Option<MarkerId> {
        let display = self.mapper?.to_display(fits, Orientation::Fits);
        self.add_marker(role, display)
    }

    /// Remove a marker. Refused when it would leave fewer than
    /// [`MIN_MARKERS`], when the id is unknown, or while the marker is in a
    /// gesture.
    pub fn remove_marker(&mut self, id: MarkerId) -> bool {
        if self.markers.len() <= MIN_MARKERS {
            log::debug!("remove_marker: keeping the last {MIN_MARKERS} markers");
            return false;
        }
        if self.marker(id).is_none() {
            log::debug!("remove_marker: unknown {id}");
            return false;
        }
        if self.gesture_involves(id) {
            log::debug!("remove_marker: {id} is being manipulated");
            return false;
        }
        twins::dissolve(&mut self.markers, id);
        self.markers.retain(|m| m.id() != id);
        self.redraw();
        true
    }

    fn gesture_involves(&self, id: MarkerId) -> bool {
        match &self.gesture {
            Some(Gesture::Drag {
                leader,
                group,
                twin_origins,
            }) => *leader == id || (*group && twin_origins.iter().any(|(t, _)| *t == id)),
            Some(Gesture::Resize { marker }) => *marker == id,
            None => false,
        }
    }

    /// Link `id` with `others`; see [`twins::is_twin_of`].
    pub fn is_twin_of(&mut self, id: MarkerId, others: &[MarkerId]) -> bool {
        twins::is_twin_of(&mut self.markers, id, others)
    }

    /// Unlink `other` from `id`'s group; see [`twins::remove_twin`].
    pub fn remove_twin(&mut self, id: MarkerId, other: MarkerId) -> bool {
        twins::remove_twin(&mut self.markers, id, other)
    }

    pub fn hide_marker(&mut self, id: MarkerId) -> bool {
        let changed = match self.marker_mut(id) {
            Some(m) => {
                m.hide();
                true
            }
            None => false,
        };
        if changed {
            self.redraw();
        }
        changed
    }

    pub fn show_marker(&mut self, id: MarkerId) -> bool {
        let changed = match self.marker_mut(id) {
            Some(m) => {
                m.show();
                true
            }
            None => false,
        };
        if changed {
            self.redraw();
        }
        changed
    }

    /// Move a marker programmatically, without the inset.
    ///
    /// Fires a move event with the new normalized position.
    pub fn move_marker(&mut self, id: MarkerId, position: Point) -> bool {
        let bounds = self.display_size();
        let moved = match self.marker_mut(id) {
            Some(m) if m.is_visible() => {
                m.move_to(position, bounds);
                m.place_label(bounds);
                Some(m.position())
            }
            _ => None,
        };
        match moved {
            Some(p) => {
                self.redraw();
                self.emit(CanvasEvent::Move {
                    marker: id,
                    normalized: bounds.normalize(p),
                });
                true
            }
            None => {
                log::debug!("move_marker: {id} unknown or hidden");
                false
            }
        }
    }

    pub fn focused(&self) -> Option<&CandidateId> {
        self.focus.as_ref()
    }

    /// Show only the marker of candidate `id`, with the inset centred on it.
    /// `None` shows every marker again at the unzoomed view.
    ///
    /// The focus carries over to later frames; a frame without the candidate
    /// shows all of its markers. Returns whether the candidate is on the
    /// current frame. Refused while a gesture is running.
    pub fn focus_candidate(&mut self, id: Option<CandidateId>) -> bool {
        if self.gesture.is_some() {
            log::debug!("focus_candidate: a gesture is running");
            return false;
        }
        log::debug!("candidate focus {id:?}");
        self.focus = id;
        let found = self.apply_focus();
        self.redraw();
        self.emit(CanvasEvent::Zoom {
            factor: self.zoom.factor,
            inset_visible: self.zoom.zoomed,
        });
        found || self.focus.is_none()
    }

    /// Hide the candidates other than the focused one and set the resting
    /// zoom. Returns whether the focused candidate has a marker.
    fn apply_focus(&mut self) -> bool {
        let target = self.focus.as_ref().and_then(|id| {
            self.marker_by_role(&MarkerRole::Candidate(id.clone()))
                .map(|m| (m.id(), m.position()))
        });
        for m in &mut self.markers {
            if !matches!(m.role(), MarkerRole::Candidate(_)) {
                continue;
            }
            match target {
                Some((id, _)) if m.id() != id => m.hide(),
                _ => m.show(),
            }
        }
        self.zoom = self.resting_zoom();
        target.is_some()
    }

    /// Zoom outside gestures: centred on the focused candidate, or none.
    fn resting_zoom(&self) -> ZoomState {
        self.focus
            .as_ref()
            .and_then(|id| self.marker_by_role(&MarkerRole::Candidate(id.clone())))
            .map(|m| ZoomState::centered_on(m.position(), self.inset_factor()))
            .unwrap_or_default()
    }

    /// Change the zoom factor. The inset pan is kept if already zoomed,
    /// otherwise the inset is centred on the canvas.
    pub fn set_zoom(&mut self, factor: f64) {
        let anchor = if self.zoom.zoomed {
            None
        } else {
            Some(self.display_size().center())
        };
        self.apply_zoom(factor, anchor);
    }

    /// Change the zoom factor keeping `anchor` (display space) in place.
    pub fn set_zoom_at(&mut self, factor: f64, anchor: Point) {
        self.apply_zoom(factor, Some(anchor));
    }

    fn apply_zoom(&mut self, factor: f64, anchor: Option<Point>) {
        let was_zoomed = self.zoom.zoomed;
        self.zoom = match anchor {
            Some(anchor) => ZoomState::centered_on(anchor, factor),
            None => ZoomState::new(factor, self.zoom.pan_left, self.zoom.pan_top),
        };
        if self.zoom.zoomed != was_zoomed {
            log::debug!(
                "inset {} at factor {}",
                if self.zoom.zoomed { "shown" } else { "hidden" },
                self.zoom.factor
            );
        }
        self.redraw();
        self.emit(CanvasEvent::Zoom {
            factor: self.zoom.factor,
            inset_visible: self.zoom.zoomed,
        });
    }

    /// Visible window of the inset as normalized `[left, top, width, height]`.
    pub fn view(&self) -> [f64; 4] {
        if !self.zoom.zoomed {
            return [0.0, 0.0, 1.0, 1.0];
        }
        let size = self.display_size();
        let f = self.zoom.factor;
        let full_w = size.width * f;
        let full_h = size.height * f;
        if full_w <= 0.0 || full_h <= 0.0 {
            return [0.0, 0.0, 1.0, 1.0];
        }
        [
            -self.zoom.pan_left / full_w,
            -self.zoom.pan_top / full_h,
            1.0 / f,
            1.0 / f,
        ]
    }

    /// Find what the pointer (canvas pixels) is over, topmost marker first.
    pub fn hit_test(&self, pointer: Point) -> Option<HitTarget> {
        self.markers.iter().rev().filter(|m| m.is_visible()).find_map(|m| {
            let centre = to_zoomed(m.position(), &self.zoom);
            let radius = m.radius() * self.zoom.factor;
            let d = pointer.distance_to(&centre);
            let handle = RESIZE_HANDLE_WIDTH.min(radius / 2.0);
            if (d - radius).abs() <= handle {
                Some(HitTarget::Ring(m.id()))
            } else if d < radius {
                Some(HitTarget::Body(m.id()))
            } else {
                None
            }
        })
    }

    /// Begin dragging a marker.
    ///
    /// Shows the inset centred on the marker when the inset factor is above
    /// 1. `modifier` is the state of the group-move key at the time of the
    /// grab; together with [`CanvasOptions::group_move`] it decides whether
    /// twins follow for the whole gesture.
    pub fn drag_start(&mut self, id: MarkerId, modifier: bool) -> bool {
        if self.gesture.is_some() {
            log::debug!("drag_start: a gesture is already running");
            return false;
        }
        let Some(position) = self
            .marker(id)
            .filter(|m| m.is_visible())
            .map(|m| m.position())
        else {
            log::debug!("drag_start: {id} unknown or hidden");
            return false;
        };

        let inset = self.inset_factor();
        let zoom_changed = inset > 1.0;
        if zoom_changed {
            self.zoom = ZoomState::centered_on(position, inset);
        }
        let zoom = self.zoom;
        let group = self.options.group_move || modifier;
        let Some(leader) = self.marker_mut(id) else {
            return false;
        };
        if !leader.start_drag(&zoom) {
            return false;
        }
        let twin_origins = leader
            .twins()
            .to_vec()
            .into_iter()
            .filter_map(|t| self.marker(t).map(|m| (t, m.position())))
            .collect();
        self.gesture = Some(Gesture::Drag {
            leader: id,
            group,
            twin_origins,
        });

        self.redraw();
        if zoom_changed {
            self.emit(CanvasEvent::Zoom {
                factor: self.zoom.factor,
                inset_visible: self.zoom.zoomed,
            });
        }
        self.emit(CanvasEvent::Click { marker: id });
        let normalized = self.display_size().normalize(position);
        self.emit(CanvasEvent::Move {
            marker: id,
            normalized,
        });
        true
    }

    /// Continue the running drag with a screen-space offset from the grab point.
    pub fn drag_move(&mut self, dx: f64, dy: f64) -> Option<Point> {
        let Some(Gesture::Drag {
            leader,
            group,
            twin_origins,
        }) = self.gesture.clone()
        else {
            return None;
        };
        let bounds = self.display_size();
        let zoom = self.zoom;
        let marker = self.marker_mut(leader)?;
        let position = marker.drag_by(dx, dy, &zoom, bounds)?;
        let delta = marker.drag_delta().unwrap_or_default();

        if group {
            for (twin, origin) in &twin_origins {
                if let Some(m) = self.marker_mut(*twin) {
                    m.move_to(origin.offset(delta.x, delta.y), bounds);
                }
            }
        }

        self.redraw();
        self.emit(CanvasEvent::Move {
            marker: leader,
            normalized: bounds.normalize(position),
        });
        Some(position)
    }

    /// Release the running drag: commit, restore the unzoomed view, fire the
    /// zoom restore and then the single drop event.
    pub fn drag_end(&mut self) -> Option<Point> {
        let Some(Gesture::Drag {
            leader,
            group,
            twin_origins,
        }) = self.gesture.take()
        else {
            return None;
        };
        let bounds = self.display_size();
        let position = self.marker_mut(leader)?.end_drag(bounds)?;
        if group {
            for (twin, _) in &twin_origins {
                if let Some(m) = self.marker_mut(*twin) {
                    m.place_label(bounds);
                }
            }
        }

        self.zoom = self.resting_zoom();
        self.redraw();
        self.emit(CanvasEvent::Zoom {
            factor: self.zoom.factor,
            inset_visible: self.zoom.zoomed,
        });
        self.emit(CanvasEvent::Drop {
            marker: leader,
            position,
        });
        Some(position)
    }

    /// Begin resizing a marker from its ring.
    pub fn resize_start(&mut self, id: MarkerId) -> bool {
        if self.gesture.is_some() {
            return false;
        }
        let started = self.marker_mut(id).is_some_and(|m| m.start_resize());
        if started {
            self.gesture = Some(Gesture::Resize { marker: id });
        } else {
            log::debug!("resize_start: {id} unknown, hidden or busy");
        }
        started
    }

    /// Resize to the pointer (canvas pixels). Twins take the same radius,
    /// each clamped to its own maximum.
    pub fn resize_to(&mut self, pointer: Point) -> Option<f64> {
        let Some(Gesture::Resize { marker }) = self.gesture else {
            return None;
        };
        let display = from_zoomed(pointer, &self.zoom);
        let m = self.marker_mut(marker)?;
        let radius = m.resize_to(display)?;
        let twins = m.twins().to_vec();
        for twin in twins {
            if let Some(t) = self.marker_mut(twin) {
                t.set_radius(radius);
            }
        }
        self.redraw();
        Some(radius)
    }

    pub fn resize_end(&mut self) -> bool {
        let Some(Gesture::Resize { marker }) = self.gesture else {
            return false;
        };
        self.gesture = None;
        let bounds = self.display_size();
        let ended = match self.marker_mut(marker) {
            Some(m) => {
                m.end_resize();
                m.place_label(bounds);
                true
            }
            None => false,
        };
        if ended {
            self.redraw();
        }
        ended
    }

    /// Install the background sources drawn under the markers.
    pub fn set_overlays(&mut self, overlays: Vec<Overlay>) {
        self.overlays = overlays;
        self.redraw();
    }

    pub fn overlays(&self) -> &[Overlay] {
        &self.overlays
    }

    /// Image-pixel x of the marker with `role`.
    pub fn x(&self, role: &MarkerRole) -> Option<f64> {
        let mapper = self.mapper?;
        let m = self.marker_by_role(role)?;
        Some(mapper.to_image(m.position(), Orientation::Display).x)
    }

    /// Image-pixel y of the marker with `role` in the requested orientation.
    pub fn y(&self, role: &MarkerRole, orientation: Orientation) -> Option<f64> {
        let mapper = self.mapper?;
        let m = self.marker_by_role(role)?;
        Some(mapper.to_image(m.position(), orientation).y)
    }

    /// Image-pixel radius of the marker with `role`.
    pub fn radius(&self, role: &MarkerRole) -> Option<f64> {
        let mapper = self.mapper?;
        let m = self.marker_by_role(role)?;
        Some(mapper.length_to_image(m.radius()))
    }

    /// Every marker in image pixels, in creation order.
    pub fn readings(&self, orientation: Orientation) -> Vec<MarkerReading> {
        let Some(mapper) = self.mapper else {
            return Vec::new();
        };
        self.markers
            .iter()
            .map(|m| {
                let p = mapper.to_image(m.position(), orientation);
                MarkerReading {
                    id: m.id(),
                    role: m.role().clone(),
                    x: p.x,
                    y: p.y,
                    radius: mapper.length_to_image(m.radius()),
                }
            })
            .collect()
    }

    /// Render the current state to the surface.
    pub fn redraw(&mut self) {
        let Some(mapper) = self.mapper else {
            self.surface.show_status(&self.status);
            return;
        };
        let size = mapper.display_size();
        let zoom = self.zoom;
        self.surface.clear(size);

        if let Some(frame) = self.frame {
            let placement = if zoom.zoomed {
                FramePlacement {
                    factor: zoom.factor,
                    left: zoom.pan_left,
                    top: zoom.pan_top,
                }
            } else {
                FramePlacement {
                    factor: 1.0,
                    left: 0.0,
                    top: 0.0,
                }
            };
            self.surface.draw_frame(frame, size, placement);
        }

        for overlay in &self.overlays {
            let display = mapper.to_display(Point::new(overlay.x, overlay.y), Orientation::Fits);
            let centre = to_zoomed(display, &zoom);
            let radius = mapper.length_to_display(overlay.radius) * zoom.factor;
            let style = CircleStyle {
                stroke: None,
                fill: Some(overlay.fill.clone()),
                line_width: 0.0,
                opacity: OVERLAY_OPACITY,
            };
            self.surface.draw_circle(centre, radius, &style);
        }

        for marker in self.markers.iter().filter(|m| m.is_visible()) {
            let centre = to_zoomed(marker.position(), &zoom);
            let radius = marker.radius() * zoom.factor;
            let style = marker.style();
            let circle = CircleStyle {
                stroke: Some(style.stroke.clone()),
                fill: None,
                line_width: style.stroke_width,
                opacity: 1.0,
            };
            self.surface.draw_circle(centre, radius, &circle);
            if marker.is_dragging() {
                self.surface.draw_reticle(centre, radius, style);
            }
            let angle = marker.label_angle();
            let anchor = Point::new(
                centre.x + radius * angle.to_radians().cos(),
                centre.y - radius * angle.to_radians().sin(),
            );
            self.surface.draw_label(anchor, angle, marker.caption(), style);
        }

        self.surface.show_status(&self.status);
    }
}
