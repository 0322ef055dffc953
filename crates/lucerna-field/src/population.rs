//! Synthetic neuron populations
//!
//! Each neuron is a random cubic Bézier curve: the first control point is
//! drawn from a box around the origin and each following one is a normal
//! step from the previous. The sampled curve is rescaled to a random target
//! length and moved to a random spot in the placement area.

use nalgebra::Vector3;
use rand::prelude::*;
use rand_distr::{Normal, Uniform};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::FieldError;
use crate::geometry::{CurvePath, Point3};

/// Placement and shape parameters for a population
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationConfig {
    pub n_paths: usize,
    /// Placement area `[xmin, xmax, ymin, ymax]`
    pub area: [f64; 4],
    /// Depth offset range `[zmin, zmax]`
    pub z_range: [f64; 2],
    /// Target arc length is drawn from `[0.5, 1.5] * mean_length`
    pub mean_length: f64,
    pub points_per_path: usize,
    /// Std dev of the normal step between Bézier control points
    pub control_spread: f64,
    pub seed: u64,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            n_paths: 100,
            area: [0.0, 1.0, 0.0, 1.0],
            z_range: [0.0, 0.2],
            mean_length: 0.5,
            points_per_path: 200,
            control_spread: 0.2,
            seed: 0,
        }
    }
}

fn uniform(lo: f64, hi: f64) -> Uniform<f64> {
    Uniform::new_inclusive(lo.min(hi), lo.max(hi))
}

fn bezier(p: &[Vector3<f64>; 4], t: f64) -> Vector3<f64> {
    let u = 1.0 - t;
    p[0] * (u * u * u) + p[1] * (3.0 * u * u * t) + p[2] * (3.0 * u * t * t) + p[3] * (t * t * t)
}

/// Sample one curve of `n_points` points, scaled to arc length `length`
fn sample_curve<R: Rng>(
    length: f64,
    n_points: usize,
    step: &Normal<f64>,
    rng: &mut R,
) -> Vec<Vector3<f64>> {
    let start = Vector3::new(
        rng.sample(uniform(-0.5, 0.5)),
        rng.sample(uniform(-0.5, 0.5)),
        rng.sample(uniform(0.0, 0.5)),
    );

    let mut control = [start; 4];
    for i in 1..4 {
        let jitter = Vector3::new(rng.sample(step), rng.sample(step), rng.sample(step));
        control[i] = control[i - 1] + jitter;
    }

    let denom = n_points.saturating_sub(1).max(1) as f64;
    let mut pts: Vec<Vector3<f64>> = (0..n_points)
        .map(|i| bezier(&control, i as f64 / denom))
        .collect();

    let current: f64 = pts.windows(2).map(|w| (w[1] - w[0]).norm()).sum();
    if current > 0.0 {
        let scale = length / current;
        for p in &mut pts {
            *p *= scale;
        }
    }

    pts
}

fn check_range(name: &str, lo: f64, hi: f64) -> Result<(), FieldError> {
    // Uniform sampling rescales the span, so it must sit well inside f64 range
    let span = (hi - lo).abs();
    if !(lo.is_finite() && hi.is_finite() && span <= f64::MAX / 2.0) {
        return Err(FieldError::InvalidPopulation(format!(
            "{} range [{}, {}] is not finite",
            name, lo, hi
        )));
    }
    Ok(())
}

/// Generate a reproducible population of neuron curves
pub fn generate_population(config: &PopulationConfig) -> Result<Vec<CurvePath>, FieldError> {
    if !(config.control_spread.is_finite() && config.control_spread >= 0.0) {
        return Err(FieldError::InvalidPopulation(format!(
            "control_spread must be a non-negative number, got {}",
            config.control_spread
        )));
    }
    let step = Normal::new(0.0, config.control_spread)
        .map_err(|e| FieldError::InvalidPopulation(format!("control_spread: {}", e)))?;
    if !(config.mean_length.is_finite() && config.mean_length >= 0.0) {
        return Err(FieldError::InvalidPopulation(format!(
            "mean_length must be a non-negative number, got {}",
            config.mean_length
        )));
    }

    let [xmin, xmax, ymin, ymax] = config.area;
    let [zmin, zmax] = config.z_range;
    check_range("area x", xmin, xmax)?;
    check_range("area y", ymin, ymax)?;
    check_range("z_range", zmin, zmax)?;
    check_range("length", config.mean_length * 0.5, config.mean_length * 1.5)?;

    let mut rng = StdRng::seed_from_u64(config.seed);

    let mut paths = Vec::with_capacity(config.n_paths);
    for _ in 0..config.n_paths {
        let origin = Vector3::new(
            rng.sample(uniform(xmin, xmax)),
            rng.sample(uniform(ymin, ymax)),
            rng.sample(uniform(zmin, zmax)),
        );
        let length = rng.sample(uniform(config.mean_length * 0.5, config.mean_length * 1.5));

        let path: CurvePath = sample_curve(length, config.points_per_path, &step, &mut rng)
            .into_iter()
            .map(|p| Point3::from(p + origin))
            .collect();
        paths.push(path);
    }

    debug!(
        "Generated {} paths x {} points (seed {})",
        paths.len(),
        config.points_per_path,
        config.seed
    );
    Ok(paths)
}
