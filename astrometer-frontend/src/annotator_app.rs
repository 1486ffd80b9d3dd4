use astrometer::canvas::{HitTarget, LoadStatus};
use astrometer::{
    AnnotatorConfig, AstrometerError, BlinkToken, CandidateId, LoadTicket, PixelBuffer, Point,
    ShowOutcome, ViewingSession,
};
use astrometer_client::{ThumbnailClient, ThumbnailOptions};
use gloo_timers::callback::Interval;
use std::collections::HashSet;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;
use web_sys::{HtmlCanvasElement, HtmlImageElement};
use yew::prelude::*;

use crate::web_surface::{image_pixels, WebSurface};

#[derive(Properties, PartialEq)]
pub struct AnnotatorFrontendProps {
    /// Annotator configuration as JSON.
    pub config: String,
    /// Archive token for the thumbnail service.
    #[prop_or_default]
    pub token: Option<String>,
}

/// Pointer gesture in progress on the canvas.
enum Pointer {
    Idle,
    Dragging { origin: Point },
    Resizing,
}

pub struct AnnotatorFrontend {
    canvas_ref: NodeRef,
    session: Option<ViewingSession<WebSurface>>,
    /// Configuration waiting for the canvas element to mount.
    pending: Option<AnnotatorConfig>,
    error: Option<String>,
    pointer: Pointer,
    blink_handle: Option<Interval>,
    /// Frames whose thumbnail URL is being looked up again.
    resolving: HashSet<usize>,
}

pub enum Msg {
    Configured(Box<AnnotatorConfig>),
    ConfigFailed(String),
    ShowFrame(usize),
    Step(isize),
    UrlResolved {
        ticket: LoadTicket,
        result: Result<String, String>,
    },
    PixelsLoaded {
        ticket: LoadTicket,
        image: HtmlImageElement,
        result: Result<PixelBuffer, String>,
    },
    Focus(Option<CandidateId>),
    ToggleBlink,
    BlinkTick(BlinkToken),
    FineTune,
    Accept(CandidateId),
    Reject(CandidateId),
    PointerDown { x: f64, y: f64, modifier: bool },
    PointerMove { x: f64, y: f64 },
    PointerUp,
}

impl Component for AnnotatorFrontend {
    type Message = Msg;
    type Properties = AnnotatorFrontendProps;

    fn create(ctx: &Context<Self>) -> Self {
        let props = ctx.props();
        match AnnotatorConfig::from_json_str(&props.config) {
            Ok(config) => {
                let link = ctx.link().clone();
                let token = props.token.clone();
                wasm_bindgen_futures::spawn_local(async move {
                    let config = resolve_urls(config, token).await;
                    link.send_message(Msg::Configured(Box::new(config)));
                });
            }
            Err(e) => ctx.link().send_message(Msg::ConfigFailed(e.to_string())),
        }

        Self {
            canvas_ref: NodeRef::default(),
            session: None,
            pending: None,
            error: None,
            pointer: Pointer::Idle,
            blink_handle: None,
            resolving: HashSet::new(),
        }
    }

    fn update(&mut self, ctx: &Context<Self>, msg: Self::Message) -> bool {
        match msg {
            Msg::Configured(config) => {
                self.pending = Some(*config);
                self.start_session(ctx);
                true
            }
            Msg::ConfigFailed(e) => {
                self.error = Some(e);
                true
            }
            Msg::ShowFrame(index) => {
                let Some(session) = self.session.as_mut() else {
                    return false;
                };
                let outcome = session.show_frame(index);
                self.handle_outcome(ctx, outcome);
                true
            }
            Msg::Step(step) => {
                let Some(session) = self.session.as_ref() else {
                    return false;
                };
                let len = session.sequencer().len() as isize;
                if len == 0 {
                    return false;
                }
                let current = session.sequencer().current_index() as isize;
                let next = (current + step).rem_euclid(len) as usize;
                ctx.link().send_message(Msg::ShowFrame(next));
                false
            }
            Msg::UrlResolved { ticket, result } => {
                let frame = ticket.frame();
                self.resolving.remove(&frame);
                let Some(session) = self.session.as_mut() else {
                    return false;
                };
                match result {
                    Ok(url) => {
                        session.set_frame_url(frame, url.clone());
                        load_image(ctx.link().clone(), ticket, &url);
                    }
                    // Left in the loading state; the next visit asks again.
                    Err(e) => web_sys::console::log_1(
                        &format!("Thumbnail for frame {frame} still unavailable: {e}").into(),
                    ),
                }
                false
            }
            Msg::Focus(id) => {
                let Some(session) = self.session.as_mut() else {
                    return false;
                };
                session.focus_candidate(id);
                true
            }
            Msg::PixelsLoaded {
                ticket,
                image,
                result,
            } => {
                let Some(session) = self.session.as_mut() else {
                    return false;
                };
                let frame = ticket.frame();
                if result.is_ok() {
                    session.canvas_mut().surface_mut().insert_image(frame, image);
                }
                let result = result.map_err(|reason| AstrometerError::load_failure(frame, reason));
                session.complete_frame_load(ticket, result);
                true
            }
            Msg::ToggleBlink => {
                let Some(session) = self.session.as_mut() else {
                    return false;
                };
                if self.blink_handle.take().is_some() {
                    session.blink_stop();
                } else {
                    let token = session.blink_start();
                    let millis = session.config().blink_interval_ms.min(u32::MAX as u64) as u32;
                    let link = ctx.link().clone();
                    self.blink_handle = Some(Interval::new(millis, move || {
                        link.send_message(Msg::BlinkTick(token));
                    }));
                }
                true
            }
            Msg::BlinkTick(token) => {
                let Some(session) = self.session.as_mut() else {
                    return false;
                };
                match session.blink_tick(token) {
                    Some(outcome) => {
                        self.handle_outcome(ctx, outcome);
                        true
                    }
                    None => {
                        self.blink_handle = None;
                        false
                    }
                }
            }
            Msg::FineTune => {
                if let Some(session) = self.session.as_mut() {
                    session.fine_tune();
                }
                true
            }
            Msg::Accept(id) => {
                if let Some(session) = self.session.as_mut() {
                    session.accept(id);
                }
                true
            }
            Msg::Reject(id) => {
                if let Some(session) = self.session.as_mut() {
                    session.reject(id);
                }
                true
            }
            Msg::PointerDown { x, y, modifier } => {
                let Some(session) = self.session.as_mut() else {
                    return false;
                };
                let origin = Point::new(x, y);
                let canvas = session.canvas_mut();
                let started = match canvas.hit_test(origin) {
                    Some(HitTarget::Ring(id)) => canvas.resize_start(id).then_some(Pointer::Resizing),
                    Some(HitTarget::Body(id)) => canvas
                        .drag_start(id, modifier)
                        .then_some(Pointer::Dragging { origin }),
                    None => None,
                };
                self.pointer = started.unwrap_or(Pointer::Idle);
                false
            }
            Msg::PointerMove { x, y } => {
                let Some(session) = self.session.as_mut() else {
                    return false;
                };
                match self.pointer {
                    Pointer::Dragging { origin } => {
                        session.canvas_mut().drag_move(x - origin.x, y - origin.y);
                    }
                    Pointer::Resizing => {
                        session.canvas_mut().resize_to(Point::new(x, y));
                    }
                    Pointer::Idle => {}
                }
                false
            }
            Msg::PointerUp => {
                let Some(session) = self.session.as_mut() else {
                    return false;
                };
                match std::mem::replace(&mut self.pointer, Pointer::Idle) {
                    Pointer::Dragging { .. } => {
                        session.canvas_mut().drag_end();
                        session.sync_positions();
                        true
                    }
                    Pointer::Resizing => {
                        session.canvas_mut().resize_end();
                        session.sync_positions();
                        true
                    }
                    Pointer::Idle => false,
                }
            }
        }
    }

    fn rendered(&mut self, ctx: &Context<Self>, first_render: bool) {
        if first_render {
            self.start_session(ctx);
        }
    }

    fn view(&self, ctx: &Context<Self>) -> Html {
        let link = ctx.link();
        let onmousedown = link.callback(|e: MouseEvent| {
            let (x, y) = offset(&e);
            Msg::PointerDown {
                x,
                y,
                modifier: e.shift_key(),
            }
        });
        let onmousemove = link.callback(|e: MouseEvent| {
            let (x, y) = offset(&e);
            Msg::PointerMove { x, y }
        });
        let onmouseup = link.callback(|_: MouseEvent| Msg::PointerUp);
        let onmouseleave = link.callback(|_: MouseEvent| Msg::PointerUp);

        html! {
            <>
                <div class="column center-panel">
                    <canvas
                        ref={self.canvas_ref.clone()}
                        class="image-frame"
                        style="cursor: crosshair; display: block;"
                        {onmousedown}
                        {onmousemove}
                        {onmouseup}
                        {onmouseleave}
                    />
                    if let Some(error) = &self.error {
                        <div class="error">{error}</div>
                    }
                </div>
                <div class="column right-panel">
                    { self.view_controls(ctx) }
                    { self.view_candidates(ctx) }
                    { self.view_submission() }
                </div>
            </>
        }
    }
}

impl AnnotatorFrontend {
    /// Build the session once both the configuration and the canvas exist.
    fn start_session(&mut self, ctx: &Context<Self>) {
        let Some(canvas) = self.canvas_ref.cast::<HtmlCanvasElement>() else {
            return;
        };
        let Some(config) = self.pending.take() else {
            return;
        };
        let session = WebSurface::new(canvas)
            .map_err(|e| e.to_string())
            .and_then(|surface| ViewingSession::new(config, surface).map_err(|e| e.to_string()));
        match session {
            Ok(session) => {
                self.session = Some(session);
                ctx.link().send_message(Msg::ShowFrame(0));
            }
            Err(e) => self.error = Some(e),
        }
    }

    fn handle_outcome(&mut self, ctx: &Context<Self>, outcome: ShowOutcome) {
        let ShowOutcome::Loading(ticket) = outcome else {
            return;
        };
        let Some(frame) = self
            .session
            .as_ref()
            .and_then(|s| s.sequencer().frame(ticket.frame()))
        else {
            return;
        };
        if let Some(url) = frame.url() {
            load_image(ctx.link().clone(), ticket, url);
            return;
        }
        // No thumbnail yet: the canvas keeps showing the loading state while
        // the lookup is retried.
        if !self.resolving.insert(ticket.frame()) {
            return;
        }
        let frame_id = frame.frame_id().to_string();
        let client = thumbnail_client(ctx.props().token.clone());
        let link = ctx.link().clone();
        wasm_bindgen_futures::spawn_local(async move {
            let result = client
                .fetch_url(&frame_id, &ThumbnailOptions::default())
                .await
                .map_err(|e| e.to_string());
            link.send_message(Msg::UrlResolved { ticket, result });
        });
    }

    fn view_controls(&self, ctx: &Context<Self>) -> Html {
        let Some(session) = &self.session else {
            return html! { <p>{"Loading frames..."}</p> };
        };
        let link = ctx.link();
        let sequencer = session.sequencer();
        let status = session.canvas().status();
        html! {
            <div class="control-group">
                <h2>{format!("Frame {} of {}", sequencer.current_index() + 1, sequencer.len())}</h2>
                if !status.is_ready() {
                    <p id="image-loading">{ match status {
                        LoadStatus::Failed { reason, .. } => format!("Image failed: {reason}"),
                        _ => "Loading image...".to_string(),
                    } }</p>
                }
                <button onclick={link.callback(|_| Msg::Step(-1))}>{"Previous"}</button>
                <button onclick={link.callback(|_| Msg::ToggleBlink)}>
                    { if sequencer.is_blinking() { "Stop" } else { "Blink" } }
                </button>
                <button onclick={link.callback(|_| Msg::Step(1))}>{"Next"}</button>
                <button onclick={link.callback(|_| Msg::FineTune)}>{"Fine tune"}</button>
                if session.canvas().focused().is_some() {
                    <button onclick={link.callback(|_| Msg::Focus(None))}>{"Show all"}</button>
                }
            </div>
        }
    }

    fn view_candidates(&self, ctx: &Context<Self>) -> Html {
        let Some(session) = &self.session else {
            return html! {};
        };
        let Some(frame) = session.sequencer().current() else {
            return html! {};
        };
        html! {
            <table class="candidates">
                { for frame.candidates().iter().map(|c| {
                    let accept = c.id.clone();
                    let reject = c.id.clone();
                    let focus = c.id.clone();
                    let status = if session.is_accepted(&c.id) {
                        "accepted"
                    } else if session.decisions().is_rejected(&c.id) {
                        "rejected"
                    } else {
                        ""
                    };
                    html! {
                        <tr class={status}>
                            <td>{c.id.to_string()}</td>
                            <td>{format!("{:.1}, {:.1}", c.x, c.y)}</td>
                            <td><button onclick={ctx.link().callback(move |_| Msg::Accept(accept.clone()))}>{"Yes"}</button></td>
                            <td><button onclick={ctx.link().callback(move |_| Msg::Reject(reject.clone()))}>{"No"}</button></td>
                            <td><button onclick={ctx.link().callback(move |_| Msg::Focus(Some(focus.clone())))}>{"Focus"}</button></td>
                        </tr>
                    }
                }) }
            </table>
        }
    }

    fn view_submission(&self) -> Html {
        let Some(session) = &self.session else {
            return html! {};
        };
        let entries = session.submission();
        if entries.is_empty() {
            return html! {};
        }
        let json = serde_json::to_string_pretty(&entries).unwrap_or_default();
        html! { <pre class="submission">{json}</pre> }
    }
}

fn offset(e: &MouseEvent) -> (f64, f64) {
    (e.offset_x() as f64, e.offset_y() as f64)
}

/// Fill in missing frame URLs from the thumbnail service.
async fn resolve_urls(mut config: AnnotatorConfig, token: Option<String>) -> AnnotatorConfig {
    if config.frame_stack.iter().all(|f| f.url.is_some()) {
        return config;
    }
    let client = thumbnail_client(token);
    let failures = client
        .resolve_all(&mut config.frame_stack, &ThumbnailOptions::default())
        .await;
    for (index, e) in failures {
        web_sys::console::log_1(&format!("Thumbnail for frame {index} failed: {e}").into());
    }
    config
}

fn thumbnail_client(token: Option<String>) -> ThumbnailClient {
    match token {
        Some(token) => ThumbnailClient::default().with_token(token),
        None => ThumbnailClient::default(),
    }
}

/// Fetch and decode a frame image, then report its pixels back.
fn load_image(link: html::Scope<AnnotatorFrontend>, ticket: LoadTicket, url: &str) {
    let image = match HtmlImageElement::new() {
        Ok(image) => image,
        Err(e) => {
            web_sys::console::log_1(&format!("Failed to create image: {e:?}").into());
            return;
        }
    };
    image.set_cross_origin(Some("anonymous"));

    let loaded = image.clone();
    let onload_link = link.clone();
    let onload = Closure::<dyn FnMut()>::new(move || {
        let result = image_pixels(&loaded).map_err(|e| e.to_string());
        onload_link.send_message(Msg::PixelsLoaded {
            ticket,
            image: loaded.clone(),
            result,
        });
    });

    let failed = image.clone();
    let source = url.to_string();
    let onerror = Closure::<dyn FnMut()>::new(move || {
        link.send_message(Msg::PixelsLoaded {
            ticket,
            image: failed.clone(),
            result: Err(format!("could not load {source}")),
        });
    });

    image.set_onload(Some(onload.as_ref().unchecked_ref()));
    image.set_onerror(Some(onerror.as_ref().unchecked_ref()));
    onload.forget();
    onerror.forget();
    image.set_src(url);
}
