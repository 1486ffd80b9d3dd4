//! Refine source positions on an image file
//!
//! Runs the centroid refiner over one or more seed positions and prints the
//! refined coordinates.
//!
//! # Usage
//!
//! ```bash
//! # Seeds in FITS pixel coordinates (origin bottom-left)
//! cargo run --release --bin astrometer_refine -- frame.png -s 512,488 -s 100.5,80
//!
//! # Seeds in top-left coordinates, JSON output
//! cargo run --release --bin astrometer_refine -- frame.png -s 10,20 --top-left --json
//! ```

use astrometer::{CentroidRefiner, Orientation, PixelBuffer, Point, RefinerConfig};
use clap::Parser;
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Image file to refine against
    image: std::path::PathBuf,

    /// Seed position as x,y (repeatable)
    #[arg(short, long = "seed", value_parser = parse_point, required = true)]
    seeds: Vec<Point>,

    /// Seeds and output use top-left origin instead of FITS
    #[arg(long)]
    top_left: bool,

    /// Maximum refinement iterations
    #[arg(short = 'n', long, default_value_t = 8)]
    max_iterations: usize,

    /// Sampling window side in pixels
    #[arg(short, long, default_value_t = 23)]
    window: usize,

    /// Initial intensity threshold (0-255)
    #[arg(short, long, default_value_t = 235.0)]
    threshold: f64,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Refined {
    seed_x: f64,
    seed_y: f64,
    x: f64,
    y: f64,
    iterations: usize,
    converged: bool,
    lit_pixels: usize,
}

fn parse_point(s: &str) -> Result<Point, String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected x,y but got '{s}'"))?;
    let x: f64 = x.trim().parse().map_err(|e| format!("bad x '{x}': {e}"))?;
    let y: f64 = y.trim().parse().map_err(|e| format!("bad y '{y}': {e}"))?;
    Ok(Point::new(x, y))
}

/// Convert between FITS and top-left rows for an image of `height` rows.
fn flip(p: Point, height: f64, orientation: Orientation) -> Point {
    match orientation {
        Orientation::Fits => Point::new(p.x, height - p.y),
        Orientation::Display => p,
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let buffer = PixelBuffer::open(&args.image)?;
    log::info!(
        "loaded {} ({}x{})",
        args.image.display(),
        buffer.width(),
        buffer.height()
    );

    let refiner = CentroidRefiner::new(RefinerConfig {
        window: args.window,
        initial_threshold: args.threshold,
        max_iterations: args.max_iterations.max(1),
        ..Default::default()
    });
    let orientation = if args.top_left {
        Orientation::Display
    } else {
        Orientation::Fits
    };
    let height = buffer.height() as f64;

    let mut results = Vec::with_capacity(args.seeds.len());
    for seed in &args.seeds {
        let start = flip(*seed, height, orientation);
        let result = refiner.refine(&buffer, start);
        let refined = flip(result.refined(start), height, orientation);
        results.push(Refined {
            seed_x: seed.x,
            seed_y: seed.y,
            x: refined.x,
            y: refined.y,
            iterations: result.iterations,
            converged: result.converged,
            lit_pixels: result.lit_pixels,
        });
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        println!(
            "{:>10} {:>10} {:>10} {:>10} {:>5} {:>9}",
            "seed_x", "seed_y", "x", "y", "iter", "converged"
        );
        for r in &results {
            println!(
                "{:>10.2} {:>10.2} {:>10.3} {:>10.3} {:>5} {:>9}",
                r.seed_x, r.seed_y, r.x, r.y, r.iterations, r.converged
            );
        }
    }
    Ok(())
}
