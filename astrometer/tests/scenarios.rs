//! End-to-end behaviour of the canvas, refiner and sequencer.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use approx::assert_relative_eq;
use astrometer::{
    to_zoomed, AnnotatorConfig, CanvasEvent, CanvasOptions, CentroidRefiner, EventKind, Frame,
    FrameInfo, FrameSequencer, ImageCanvas, MarkerRole, PixelBuffer, Point, RecordingSurface,
    RefinerConfig, ShowOutcome, ViewingSession, ZoomState,
};
use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Noisy background with a flat bright disk.
fn disk_field(width: usize, height: usize, cx: f64, cy: f64, radius: f64, seed: u64) -> PixelBuffer {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut data = Array2::<f64>::zeros((height, width));
    for ((y, x), v) in data.indexed_iter_mut() {
        let dx = x as f64 - cx;
        let dy = y as f64 - cy;
        *v = if dx * dx + dy * dy <= radius * radius {
            255.0
        } else {
            rng.random_range(0.0..40.0)
        };
    }
    PixelBuffer::from_array(data)
}

fn canvas_at_unit_scale(group_move: bool) -> ImageCanvas<RecordingSurface> {
    let options = CanvasOptions {
        display_width: 700.0,
        inset_factor: Some(1.0),
        group_move,
        ..Default::default()
    };
    let mut canvas = ImageCanvas::new(RecordingSurface::new(), options);
    canvas.set_native_size(700, 500).unwrap();
    canvas
}

#[test]
fn test_refiner_finds_bright_disk() {
    init_logging();
    let buffer = disk_field(1000, 1000, 512.0, 488.0, 5.0, 7);
    let refiner = CentroidRefiner::new(RefinerConfig::default());
    let seed = Point::new(500.0, 500.0);

    let result = refiner.refine(&buffer, seed);
    let refined = result.refined(seed);

    assert!(result.converged, "refiner did not converge: {result:?}");
    assert!(result.iterations <= 8);
    assert!(
        refined.distance_to(&Point::new(512.0, 488.0)) <= 1.0,
        "refined to {refined}"
    );
}

#[test]
fn test_refining_a_converged_position_is_stable() {
    init_logging();
    let refiner = CentroidRefiner::new(RefinerConfig::default());
    let mut rng = ChaCha8Rng::seed_from_u64(99);
    for trial in 0..5 {
        let cx = rng.random_range(100.0..400.0_f64).round();
        let cy = rng.random_range(100.0..400.0_f64).round();
        let buffer = disk_field(500, 500, cx, cy, 4.0, trial);
        let seed = Point::new(cx + 3.0, cy - 2.0);

        let first = refiner.refine(&buffer, seed).refined(seed);
        let again = refiner.refine(&buffer, first);
        assert!(
            again.offset.x.abs() < 0.3 && again.offset.y.abs() < 0.3,
            "trial {trial}: {first} moved again by {}",
            again.offset
        );
    }
}

#[test]
fn test_group_drag_moves_all_twins() {
    init_logging();
    let mut canvas = canvas_at_unit_scale(true);
    let a = canvas.add_marker(MarkerRole::Sky, Point::new(100.0, 100.0)).unwrap();
    let b = canvas.add_marker(MarkerRole::Source, Point::new(300.0, 200.0)).unwrap();
    let c = canvas
        .add_marker(MarkerRole::Calibrator(1), Point::new(500.0, 400.0))
        .unwrap();
    assert_eq!(canvas.marker(a).unwrap().twins().len(), 2);

    let drops = Rc::new(RefCell::new(Vec::new()));
    let d = drops.clone();
    canvas.bind(
        EventKind::Drop,
        Box::new(move |e| d.borrow_mut().push(e.clone())),
    );

    assert!(canvas.drag_start(b, false));
    canvas.drag_move(4.0, -2.0).unwrap();
    canvas.drag_move(10.0, -5.0).unwrap();
    let end = canvas.drag_end().unwrap();

    assert_eq!(end, Point::new(310.0, 195.0));
    assert_eq!(canvas.marker(a).unwrap().position(), Point::new(110.0, 95.0));
    assert_eq!(canvas.marker(c).unwrap().position(), Point::new(510.0, 395.0));
    assert_eq!(
        *drops.borrow(),
        vec![CanvasEvent::Drop {
            marker: b,
            position: end
        }]
    );
}

#[test]
fn test_group_drag_clamps_at_edges() {
    let mut canvas = canvas_at_unit_scale(true);
    let a = canvas.add_marker(MarkerRole::Sky, Point::new(5.0, 100.0)).unwrap();
    let b = canvas.add_marker(MarkerRole::Source, Point::new(300.0, 2.0)).unwrap();
    let c = canvas
        .add_marker(MarkerRole::Calibrator(1), Point::new(695.0, 498.0))
        .unwrap();

    assert!(canvas.drag_start(a, false));
    canvas.drag_move(10.0, -5.0);
    canvas.drag_end();

    assert_eq!(canvas.marker(a).unwrap().position(), Point::new(15.0, 95.0));
    assert_eq!(canvas.marker(b).unwrap().position(), Point::new(310.0, 0.0));
    assert_eq!(canvas.marker(c).unwrap().position(), Point::new(700.0, 493.0));
}

#[test]
fn test_blink_cycles_and_stops() {
    init_logging();
    let frames = (0..4)
        .map(|i| {
            Frame::new(
                i,
                FrameInfo {
                    frame_id: format!("{}", 1000 + i),
                    url: None,
                    width: 64,
                    height: 64,
                    candidates: Vec::new(),
                },
            )
        })
        .collect();
    let mut sequencer = FrameSequencer::new(frames);

    let token = sequencer.blink_start(Duration::from_millis(500));
    for _ in 0..3 {
        sequencer.blink_tick(token).unwrap();
    }
    assert_eq!(sequencer.current_index(), 3 % 4);

    assert!(sequencer.blink_stop());
    assert_eq!(sequencer.blink_tick(token), None);
    assert_eq!(sequencer.current_index(), 3);
}

#[test]
fn test_marker_floor_is_enforced() {
    let mut canvas = canvas_at_unit_scale(false);
    let a = canvas.add_marker(MarkerRole::Sky, Point::new(10.0, 10.0)).unwrap();
    let b = canvas.add_marker(MarkerRole::Source, Point::new(20.0, 20.0)).unwrap();

    assert!(!canvas.remove_marker(b));
    assert_eq!(canvas.markers().len(), 2);

    let c = canvas
        .add_marker(MarkerRole::Calibrator(1), Point::new(30.0, 30.0))
        .unwrap();
    assert!(canvas.remove_marker(c));
    assert!(!canvas.remove_marker(a));
    assert_eq!(canvas.markers().len(), 2);
    assert_eq!(canvas.marker(a).unwrap().twins(), &[b]);
}

#[test]
fn test_zoom_transition_mapping() {
    let zoom = ZoomState::new(3.0, 20.0, 10.0);
    let zoomed = to_zoomed(Point::new(100.0, 80.0), &zoom);
    assert_relative_eq!(zoomed.x, 320.0);
    assert_relative_eq!(zoomed.y, 250.0);
}

#[test]
fn test_session_blink_then_fine_tune() {
    init_logging();
    let json = r#"{
        "id": "blinker",
        "width": 250,
        "blinkIntervalMs": 250,
        "frameStack": [
            {"frameId": "a", "width": 500, "height": 500,
             "candidates": [{"id": "N7", "x": 200.0, "y": 300.0}]},
            {"frameId": "b", "width": 500, "height": 500,
             "candidates": [{"id": "N7", "x": 206.0, "y": 298.0}]}
        ]
    }"#;
    let config = AnnotatorConfig::from_json_str(json).unwrap();
    let mut session = ViewingSession::new(config, RecordingSurface::new()).unwrap();

    let ShowOutcome::Loading(first) = session.show_frame(0) else {
        panic!("expected frame 0 to load");
    };
    // FITS (200, 300) is top-left (200, 200); the source sits 3 px right of it.
    assert!(session.complete_frame_load(first, Ok(disk_field(500, 500, 203.0, 200.0, 4.0, 1))));
    assert_eq!(session.canvas().markers().len(), 1);

    let token = session.blink_start();
    let Some(ShowOutcome::Loading(second)) = session.blink_tick(token) else {
        panic!("expected frame 1 to load");
    };
    assert!(session.complete_frame_load(second, Ok(disk_field(500, 500, 206.0, 202.0, 4.0, 2))));
    assert!(matches!(session.blink_tick(token), Some(ShowOutcome::Displayed)));
    assert_eq!(session.sequencer().current_index(), 0);
    assert!(session.blink_stop());

    let results = session.fine_tune();
    assert_eq!(results.len(), 1);
    assert!(results[0].1.converged);

    session.accept("N7".into());
    let entries = session.submission();
    assert_eq!(entries.len(), 1);
    assert!((entries[0].x - 203.0).abs() <= 1.0, "x = {}", entries[0].x);
    assert!((entries[0].y - 300.0).abs() <= 1.0, "y = {}", entries[0].y);
}
