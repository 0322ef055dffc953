//! Curve paths and sensor grids
//!
//! Points serialize as `{x, y, z}` objects, the same shape the browser
//! renderer posts to its field worker, so scenes round-trip through JSON.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::FieldError;

/// A point in scene units
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn to_vector(self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<[f64; 3]> for Point3 {
    fn from(p: [f64; 3]) -> Self {
        Self::new(p[0], p[1], p[2])
    }
}

impl From<Vector3<f64>> for Point3 {
    fn from(v: Vector3<f64>) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

/// One simulated current-carrying filament, as an ordered polyline.
///
/// Its position in the list handed to the evaluator decides the velocity of
/// the excitation pulse travelling along it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CurvePath {
    points: Vec<Point3>,
}

impl CurvePath {
    pub fn new(points: Vec<Point3>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of straight segments between consecutive points
    pub fn segment_count(&self) -> usize {
        self.points.len().saturating_sub(1)
    }

    /// Total polyline length
    pub fn arc_length(&self) -> f64 {
        self.points
            .windows(2)
            .map(|w| (w[1].to_vector() - w[0].to_vector()).norm())
            .sum()
    }

    /// Copy of this path shifted by `offset`
    pub fn translated(&self, offset: Point3) -> Self {
        let d = offset.to_vector();
        self.points
            .iter()
            .map(|p| Point3::from(p.to_vector() + d))
            .collect()
    }
}

impl FromIterator<Point3> for CurvePath {
    fn from_iter<I: IntoIterator<Item = Point3>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Axis-aligned sampling lattice in the sensing plane
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SensorGrid {
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl SensorGrid {
    pub fn new(xs: Vec<f64>, ys: Vec<f64>) -> Self {
        Self { xs, ys }
    }

    /// Evenly spaced square lattice over `[xmin, xmax, ymin, ymax]`, endpoints included
    pub fn uniform(bounds: [f64; 4], resolution: usize) -> Self {
        Self {
            xs: linspace(bounds[0], bounds[1], resolution),
            ys: linspace(bounds[2], bounds[3], resolution),
        }
    }

    pub fn xs(&self) -> &[f64] {
        &self.xs
    }

    pub fn ys(&self) -> &[f64] {
        &self.ys
    }

    pub fn width(&self) -> usize {
        self.xs.len()
    }

    pub fn height(&self) -> usize {
        self.ys.len()
    }

    /// Number of sensors, `width * height`
    pub fn len(&self) -> usize {
        self.xs.len() * self.ys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width(), self.height())
    }

    /// Row-major offset of sensor `(xi, yi)`: y outer, x inner
    pub fn index(&self, xi: usize, yi: usize) -> usize {
        yi * self.xs.len() + xi
    }

    pub(crate) fn validate(&self) -> Result<(), FieldError> {
        for (axis, values) in [("x", &self.xs), ("y", &self.ys)] {
            if let Some(i) = values.iter().position(|v| !v.is_finite()) {
                return Err(FieldError::NonFiniteCoordinate {
                    what: format!("sensor {} sample {}", axis, i),
                });
            }
        }
        Ok(())
    }
}

pub(crate) fn validate_paths(paths: &[CurvePath]) -> Result<(), FieldError> {
    for (pi, path) in paths.iter().enumerate() {
        if let Some(i) = path.points.iter().position(|p| !p.is_finite()) {
            return Err(FieldError::NonFiniteCoordinate {
                what: format!("path {} point {}", pi, i),
            });
        }
    }
    Ok(())
}

/// `n` evenly spaced samples from `start` to `end` inclusive
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let last = (n - 1) as f64;
            (0..n)
                .map(|i| start + (end - start) * (i as f64 / last))
                .collect()
        }
    }
}
