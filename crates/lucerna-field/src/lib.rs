//! lucerna-field: background field evaluation for Lucerna sensor heatmaps
//!
//! This crate provides:
//! - A discretized Biot-Savart evaluator for travelling-pulse current paths
//! - A typed `init` / `compute` message protocol
//! - A worker that runs the evaluator on its own thread
//! - Seeded synthetic neuron populations and time-series export
//!
//! Units are arbitrary scene units. The field is a stylized visual
//! approximation, not a calibrated sensor model.

pub mod error;
pub mod evaluator;
pub mod geometry;
pub mod odmr;
pub mod population;
pub mod protocol;
pub mod series;
pub mod worker;

pub use error::FieldError;
pub use evaluator::{FieldEvaluator, FieldFrame};
pub use geometry::{linspace, CurvePath, Point3, SensorGrid};
pub use odmr::{simulate_odmr, NoiseConfig, OdmrConfig, OdmrOutput};
pub use population::{generate_population, PopulationConfig};
pub use protocol::{Command, Response};
pub use series::{simulate, SimulationConfig, SimulationOutput};
pub use worker::FieldWorker;

use serde::{Deserialize, Serialize};

/// Constants of the field model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Added to |r|² so a sensor on a segment midpoint stays finite
    pub epsilon: f64,
    /// Permeability scale
    pub mu: f64,
    /// Pulse width in normalized arc length
    pub sigma: f64,
    /// Z of the sensing plane
    pub sensor_depth: f64,
    /// Pulse velocity of the first path
    pub base_velocity: f64,
    /// Velocity added per path index
    pub velocity_step: f64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            epsilon: 1e-6,
            mu: 1.0,
            sigma: 0.08,
            sensor_depth: 0.5,
            base_velocity: 0.5,
            velocity_step: 0.1,
        }
    }
}

impl EvaluatorConfig {
    /// Reject constants that would turn frames into NaN
    pub fn validate(&self) -> Result<(), FieldError> {
        let positive = [("epsilon", self.epsilon), ("sigma", self.sigma)];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(FieldError::InvalidConfig(format!(
                    "{} must be a positive number, got {}",
                    name, value
                )));
            }
        }

        let finite = [
            ("mu", self.mu),
            ("sensor_depth", self.sensor_depth),
            ("base_velocity", self.base_velocity),
            ("velocity_step", self.velocity_step),
        ];
        for (name, value) in finite {
            if !value.is_finite() {
                return Err(FieldError::InvalidConfig(format!(
                    "{} must be finite, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}
