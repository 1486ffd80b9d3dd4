//! Thresholded centre-of-mass peak finder.
//!
//! Nudges an approximate position onto the centroid of a nearby point source.
//! Seeds come from a prior detection and are assumed to be within a few pixels
//! of the source, so a coarse binarized centre of mass is enough; no PSF model
//! is fitted.
//!
//! # Algorithm
//!
//! 1. Sample a square window centred on the rounded current position.
//! 2. Pick a threshold once per search: start at `initial_threshold` and, if
//!    fewer than `min_hits` pixels inside the window's inscribed circle exceed
//!    it, relax it by `relaxation`. The threshold is then held for every
//!    iteration.
//! 3. Each iteration binarizes the window, down-weights pixels outside the
//!    inscribed circle, fills single-pixel holes and takes the weighted
//!    centroid of the lit pixels. A hole is filled when it is flanked
//!    horizontally inside the central column band, or vertically inside the
//!    central row band. The centre moves by the resulting delta.
//! 4. The search stops when both delta components drop under `tolerance`, when
//!    the lit pixel count falls outside `(min_hits, area / 3)`, or after
//!    `max_iterations`.
//!
//! Positions are image pixels with the origin at the top-left (buffer row = y).
//! Window samples outside the image are skipped.

use serde::{Deserialize, Serialize};

use crate::coords::Point;
use crate::pixels::PixelBuffer;

/// Value assigned to lit pixels when binarizing.
const LIT: f64 = 255.0;

/// Tunables for [`CentroidRefiner`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinerConfig {
    /// Side of the square sampling window in pixels. Forced odd.
    pub window: usize,
    /// Starting intensity threshold (0-255 scale).
    pub initial_threshold: f64,
    /// Factor applied once when too few pixels exceed the initial threshold.
    pub relaxation: f64,
    /// Minimum number of lit pixels for a usable sample.
    pub min_hits: usize,
    /// Weight of lit pixels outside the inscribed circle.
    pub outside_weight: f64,
    /// Per-axis delta below which the search has converged.
    pub tolerance: f64,
    /// Iteration cap.
    pub max_iterations: usize,
}

impl Default for RefinerConfig {
    fn default() -> Self {
        Self {
            window: 23,
            initial_threshold: 235.0,
            relaxation: 0.8,
            min_hits: 10,
            outside_weight: 1.0 / 3.0,
            tolerance: 0.3,
            max_iterations: 8,
        }
    }
}

/// Outcome of one centroid search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CentroidSearchResult {
    /// Accumulated offset from the seed.
    pub offset: Point,
    /// Iterations run.
    pub iterations: usize,
    /// Whether the last delta was under tolerance.
    pub converged: bool,
    /// Unweighted lit pixel count of the last iteration.
    pub lit_pixels: usize,
    /// Lit pixel count of the last iteration with outside pixels down-weighted.
    pub lit_weight: f64,
    /// Threshold used for the search.
    pub threshold: f64,
}

impl CentroidSearchResult {
    /// Seed moved by the accumulated offset.
    pub fn refined(&self, seed: Point) -> Point {
        seed.offset(self.offset.x, self.offset.y)
    }
}

/// Iterative centroid-of-mass search over a [`PixelBuffer`].
#[derive(Debug, Clone, Default)]
pub struct CentroidRefiner {
    config: RefinerConfig,
}

/// Binarized window around one integer centre.
struct Window {
    half: i64,
    /// `None` for samples outside the image.
    cells: Vec<Option<f64>>,
}

impl Window {
    fn sample(buffer: &PixelBuffer, cx: i64, cy: i64, half: i64) -> Self {
        let side = (2 * half + 1) as usize;
        let mut cells = Vec::with_capacity(side * side);
        for l in -half..=half {
            for k in -half..=half {
                cells.push(buffer.intensity(cx + k, cy + l));
            }
        }
        Self { half, cells }
    }

    fn index(&self, k: i64, l: i64) -> usize {
        let side = 2 * self.half + 1;
        ((l + self.half) * side + (k + self.half)) as usize
    }

    fn get(&self, k: i64, l: i64) -> Option<f64> {
        if k.abs() > self.half || l.abs() > self.half {
            return None;
        }
        self.cells[self.index(k, l)]
    }

    fn binarize(&self, threshold: f64) -> Self {
        Self {
            half: self.half,
            cells: self
                .cells
                .iter()
                .map(|c| c.map(|v| if v > threshold { LIT } else { 0.0 }))
                .collect(),
        }
    }

    /// Light zero pixels between two full-weight lit neighbours: left and
    /// right when the column is in the central third, above and below when
    /// the row is.
    fn fill_holes(&mut self, inside: impl Fn(i64, i64) -> bool) {
        let half = self.half;
        let inner = half / 3;
        let source = self.cells.clone();
        let lit = |k: i64, l: i64| {
            let side = 2 * half + 1;
            if k.abs() > half || l.abs() > half || !inside(k, l) {
                return false;
            }
            source[((l + half) * side + (k + half)) as usize] == Some(LIT)
        };
        for l in -half..=half {
            for k in -half..=half {
                let i = self.index(k, l);
                if self.cells[i] != Some(0.0) {
                    continue;
                }
                let across = k.abs() <= inner && lit(k - 1, l) && lit(k + 1, l);
                let down = l.abs() <= inner && lit(k, l - 1) && lit(k, l + 1);
                if across || down {
                    self.cells[i] = Some(LIT);
                }
            }
        }
    }
}

impl CentroidRefiner {
    pub fn new(config: RefinerConfig) -> Self {
        let mut config = config;
        if config.window % 2 == 0 {
            config.window += 1;
        }
        config.window = config.window.max(3);
        Self { config }
    }

    pub fn config(&self) -> &RefinerConfig {
        &self.config
    }

    fn half(&self) -> i64 {
        (self.config.window / 2) as i64
    }

    /// Radius of the circle inscribed in the window.
    fn circle_radius(&self) -> f64 {
        self.config.window as f64 / 2.0
    }

    fn inside_circle(&self, k: i64, l: i64) -> bool {
        let r = self.circle_radius();
        ((k * k + l * l) as f64) <= r * r
    }

    /// Threshold for a search starting at `(cx, cy)`.
    fn pick_threshold(&self, buffer: &PixelBuffer, cx: i64, cy: i64) -> f64 {
        let threshold = self.config.initial_threshold;
        let window = Window::sample(buffer, cx, cy, self.half());
        let half = self.half();
        let mut hits = 0;
        for l in -half..=half {
            for k in -half..=half {
                if self.inside_circle(k, l) && window.get(k, l).is_some_and(|v| v > threshold) {
                    hits += 1;
                }
            }
        }
        if hits < self.config.min_hits {
            log::debug!(
                "only {hits} pixels above {threshold}, relaxing threshold by {}",
                self.config.relaxation
            );
            threshold * self.config.relaxation
        } else {
            threshold
        }
    }

    /// Refine with the configured iteration cap.
    pub fn refine(&self, buffer: &PixelBuffer, seed: Point) -> CentroidSearchResult {
        self.refine_with(buffer, seed, self.config.max_iterations)
    }

    /// Refine with an explicit iteration cap. A cap of 0 uses the configured one.
    pub fn refine_with(
        &self,
        buffer: &PixelBuffer,
        seed: Point,
        max_iterations: usize,
    ) -> CentroidSearchResult {
        let max_iterations = if max_iterations == 0 {
            self.config.max_iterations.max(1)
        } else {
            max_iterations
        };
        let mut result = CentroidSearchResult {
            offset: Point::default(),
            iterations: 0,
            converged: false,
            lit_pixels: 0,
            lit_weight: 0.0,
            threshold: self.config.initial_threshold,
        };
        if !seed.is_finite() {
            log::debug!("refusing to refine non-finite seed {seed}");
            return result;
        }

        let half = self.half();
        let area = (self.config.window * self.config.window) as f64;
        let max_lit = area / 3.0;
        let threshold = self.pick_threshold(buffer, seed.x.round() as i64, seed.y.round() as i64);
        result.threshold = threshold;

        let mut centre = seed;
        for iteration in 1..=max_iterations {
            result.iterations = iteration;
            let bx = centre.x.round() as i64;
            let by = centre.y.round() as i64;

            let mut window = Window::sample(buffer, bx, by, half).binarize(threshold);
            window.fill_holes(|k, l| self.inside_circle(k, l));

            let mut lit = 0usize;
            let mut weight_sum = 0.0;
            let mut sum_k = 0.0;
            let mut sum_l = 0.0;
            for l in -half..=half {
                for k in -half..=half {
                    if window.get(k, l) != Some(LIT) {
                        continue;
                    }
                    lit += 1;
                    let w = if self.inside_circle(k, l) {
                        1.0
                    } else {
                        self.config.outside_weight
                    };
                    weight_sum += w;
                    sum_k += w * k as f64;
                    sum_l += w * l as f64;
                }
            }
            result.lit_pixels = lit;
            result.lit_weight = weight_sum;

            if lit <= self.config.min_hits || lit as f64 >= max_lit || weight_sum <= 0.0 {
                log::debug!(
                    "centroid search at {centre}: {lit} lit pixels (weight {weight_sum:.1}), no correction"
                );
                break;
            }

            let target = Point::new(bx as f64 + sum_k / weight_sum, by as f64 + sum_l / weight_sum);
            let delta = target.delta_from(&centre);
            centre = target;
            result.offset = centre.delta_from(&seed);

            if delta.x.abs() < self.config.tolerance && delta.y.abs() < self.config.tolerance {
                result.converged = true;
                break;
            }
        }
        result
    }
}
