//! Magnetic field magnitude over a sensor grid using a discretized Biot-Savart sum
//!
//! Each curve path carries a Gaussian excitation pulse travelling along its
//! normalized arc-length parameter. A segment's current is the pulse weight
//! at the segment, and the field at a sensor is the superposition of every
//! weighted segment of every path.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::FieldError;
use crate::geometry::{validate_paths, CurvePath, SensorGrid};
use crate::EvaluatorConfig;

/// One computed grid, row-major with y outer and x inner.
///
/// Holds |B| for [`FieldEvaluator::compute`] and a signed component for
/// [`FieldEvaluator::compute_component`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldFrame {
    time: f64,
    width: usize,
    height: usize,
    grid: Vec<f32>,
}

impl FieldFrame {
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn values(&self) -> &[f32] {
        &self.grid
    }

    pub fn into_values(self) -> Vec<f32> {
        self.grid
    }

    /// Magnitude at sensor `(xi, yi)`
    pub fn get(&self, xi: usize, yi: usize) -> Option<f32> {
        if xi >= self.width || yi >= self.height {
            return None;
        }
        self.grid.get(yi * self.width + xi).copied()
    }

    /// Same time and dimensions with new values
    pub(crate) fn with_values(&self, grid: Vec<f32>) -> Self {
        Self {
            time: self.time,
            width: self.width,
            height: self.height,
            grid,
        }
    }

    /// Largest value in the frame, 0 for an empty or all-negative frame
    pub fn max(&self) -> f32 {
        self.grid.iter().cloned().fold(0.0f32, f32::max)
    }

    /// Fails when this frame was computed against a different grid than `(width, height)`
    pub fn ensure_dimensions(&self, width: usize, height: usize) -> Result<(), FieldError> {
        if self.dimensions() != (width, height) || self.grid.len() != width * height {
            return Err(FieldError::DimensionMismatch {
                expected: (width, height),
                actual: self.dimensions(),
            });
        }
        Ok(())
    }

    pub fn to_binary(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(24 + self.grid.len() * 4);

        // Header: type marker
        data.extend_from_slice(b"FRAME\0\0\0");

        data.extend_from_slice(&(self.width as u32).to_le_bytes());
        data.extend_from_slice(&(self.height as u32).to_le_bytes());
        data.extend_from_slice(&self.time.to_le_bytes());

        for &v in &self.grid {
            data.extend_from_slice(&v.to_le_bytes());
        }

        data
    }
}

/// Excitation velocity of the path at `index`, in arc-length units per time unit
pub fn path_velocity(index: usize, config: &EvaluatorConfig) -> f64 {
    config.base_velocity + config.velocity_step * index as f64
}

/// Pulse center in `[0, 1)`, wrapping once every `1 / velocity` time units
pub fn pulse_center(time: f64, velocity: f64) -> f64 {
    (time * velocity).rem_euclid(1.0)
}

/// Gaussian pulse intensity at arc-length parameter `s`
pub fn pulse_weight(s: f64, center: f64, sigma: f64) -> f64 {
    let u = (s - center) / sigma;
    (-0.5 * u * u).exp()
}

/// Contribution of one current element at `midpoint` with length vector `dl`
/// to the field at `sensor`: (dl × r) μI / (|r|² + ε)^1.5
pub fn segment_field(
    midpoint: &Vector3<f64>,
    dl: &Vector3<f64>,
    sensor: &Vector3<f64>,
    current: f64,
    config: &EvaluatorConfig,
) -> Vector3<f64> {
    let r = sensor - midpoint;
    let r2 = r.norm_squared() + config.epsilon;
    dl.cross(&r) * (config.mu * current / r2.powf(1.5))
}

struct Segment {
    midpoint: Vector3<f64>,
    dl: Vector3<f64>,
    // Normalized arc-length parameter, i / (L - 1)
    s: f64,
}

struct PreparedPath {
    velocity: f64,
    segments: Vec<Segment>,
}

impl PreparedPath {
    fn new(index: usize, path: &CurvePath, config: &EvaluatorConfig) -> Self {
        let points = path.points();
        let last = points.len().saturating_sub(1).max(1) as f64;

        let segments = points
            .windows(2)
            .enumerate()
            .map(|(i, w)| {
                let p0 = w[0].to_vector();
                let p1 = w[1].to_vector();
                Segment {
                    midpoint: (p0 + p1) * 0.5,
                    dl: p1 - p0,
                    s: i as f64 / last,
                }
            })
            .collect();

        Self {
            velocity: path_velocity(index, config),
            segments,
        }
    }
}

struct Scene {
    paths: Vec<PreparedPath>,
    grid: SensorGrid,
}

/// Owns one scene and evaluates field frames for it.
///
/// Nothing is shared between instances; a worker thread or a test can each
/// hold their own.
pub struct FieldEvaluator {
    config: EvaluatorConfig,
    scene: Option<Scene>,
}

impl Default for FieldEvaluator {
    fn default() -> Self {
        Self::new(EvaluatorConfig::default())
    }
}

impl FieldEvaluator {
    pub fn new(config: EvaluatorConfig) -> Self {
        Self { config, scene: None }
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.scene.is_some()
    }

    /// Sensor grid of the current scene
    pub fn grid(&self) -> Option<&SensorGrid> {
        self.scene.as_ref().map(|s| &s.grid)
    }

    /// Total number of segments across all paths of the current scene
    pub fn segment_count(&self) -> usize {
        self.scene
            .as_ref()
            .map(|s| s.paths.iter().map(|p| p.segments.len()).sum())
            .unwrap_or(0)
    }

    /// Replace the scene. On error the previous scene stays active.
    pub fn initialize(&mut self, paths: &[CurvePath], grid: SensorGrid) -> Result<(), FieldError> {
        self.config.validate()?;
        validate_paths(paths)?;
        grid.validate()?;

        let prepared: Vec<PreparedPath> = paths
            .iter()
            .enumerate()
            .map(|(i, p)| PreparedPath::new(i, p, &self.config))
            .collect();

        self.scene = Some(Scene {
            paths: prepared,
            grid,
        });

        debug!(
            "Scene initialized: {} paths, {} segments, {}x{} sensors",
            paths.len(),
            self.segment_count(),
            self.grid().map(|g| g.width()).unwrap_or(0),
            self.grid().map(|g| g.height()).unwrap_or(0),
        );
        Ok(())
    }

    /// Compute the magnitude grid at `time`
    pub fn compute(&self, time: f64) -> Result<FieldFrame, FieldError> {
        self.sample(time, |b| b.norm())
    }

    /// Compute one signed field component (0 = x, 1 = y, 2 = z) at `time`
    pub fn compute_component(&self, time: f64, axis: usize) -> Result<FieldFrame, FieldError> {
        if axis > 2 {
            return Err(FieldError::InvalidConfig(format!(
                "projection axis must be 0, 1 or 2, got {}",
                axis
            )));
        }
        self.sample(time, |b| b[axis])
    }

    fn sample(
        &self,
        time: f64,
        project: impl Fn(&Vector3<f64>) -> f64,
    ) -> Result<FieldFrame, FieldError> {
        let scene = self.scene.as_ref().ok_or(FieldError::NotInitialized)?;
        if !time.is_finite() {
            return Err(FieldError::InvalidTime(time));
        }

        let config = &self.config;

        // Pulse weights depend only on time, so resolve them once per frame
        // and drop segments whose weight underflowed to zero.
        let mut active: Vec<(&Segment, f64)> = Vec::new();
        for path in &scene.paths {
            // time * velocity must not overflow, or the wrapped center is NaN
            if !(time * path.velocity).is_finite() {
                return Err(FieldError::InvalidTime(time));
            }
            let center = pulse_center(time, path.velocity);
            for segment in &path.segments {
                let weight = pulse_weight(segment.s, center, config.sigma);
                if weight != 0.0 {
                    active.push((segment, weight));
                }
            }
        }

        let grid = &scene.grid;
        let mut values = Vec::with_capacity(grid.len());

        for &py in grid.ys() {
            for &px in grid.xs() {
                let sensor = Vector3::new(px, py, config.sensor_depth);
                let mut b = Vector3::zeros();

                for &(segment, weight) in &active {
                    b += segment_field(&segment.midpoint, &segment.dl, &sensor, weight, config);
                }

                values.push(project(&b) as f32);
            }
        }

        Ok(FieldFrame {
            time,
            width: grid.width(),
            height: grid.height(),
            grid: values,
        })
    }
}
