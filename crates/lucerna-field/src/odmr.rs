//! ODMR readout proxy
//!
//! A sensor reading is modeled as the field component along one axis times
//! a signal scale, standing in for the NV frequency shift. Seeded noise is
//! layered on top: relative Gaussian noise, optional shot noise, thermal
//! noise and a linear drift per sensor.

use rand::prelude::*;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::FieldError;
use crate::evaluator::{FieldEvaluator, FieldFrame};
use crate::geometry::linspace;
use crate::population::generate_population;
use crate::series::SimulationConfig;

/// Noise layered on top of the clean readout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    /// Gaussian std as a fraction of `max(1, max |df|)`
    pub noise_level: f64,
    /// Adds noise scaling with the square root of the signal
    pub shot_noise: bool,
    /// Absolute Gaussian std
    pub thermal_std: f64,
    /// Std of each sensor's drift, ramped linearly over the time samples
    pub drift_std: f64,
    pub seed: u64,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            noise_level: 0.1,
            shot_noise: false,
            thermal_std: 0.0,
            drift_std: 0.0,
            seed: 0,
        }
    }
}

impl NoiseConfig {
    fn validate(&self) -> Result<(), FieldError> {
        let stds = [
            ("noise_level", self.noise_level),
            ("thermal_std", self.thermal_std),
            ("drift_std", self.drift_std),
        ];
        for (name, value) in stds {
            if !(value.is_finite() && value >= 0.0) {
                return Err(FieldError::InvalidConfig(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Parameters for an ODMR run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OdmrConfig {
    pub simulation: SimulationConfig,
    pub signal_scale: f64,
    /// Field component read by the sensor, 0 = x, 1 = y, 2 = z
    pub projection_axis: usize,
    pub noise: NoiseConfig,
}

impl Default for OdmrConfig {
    fn default() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            signal_scale: 1.0,
            projection_axis: 2,
            noise: NoiseConfig::default(),
        }
    }
}

/// Clean and noisy readouts, one frame per time sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OdmrOutput {
    pub generated_at: String,
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
    pub times: Vec<f64>,
    pub df_clean: Vec<FieldFrame>,
    pub df_noisy: Vec<FieldFrame>,
}

/// Scale a field component frame into a frequency shift frame
pub fn frequency_shift(component: &FieldFrame, signal_scale: f64) -> FieldFrame {
    let values = component
        .values()
        .iter()
        .map(|&b| (signal_scale * b as f64) as f32)
        .collect();
    component.with_values(values)
}

fn normal(std: f64) -> Result<Normal<f64>, FieldError> {
    Normal::new(0.0, std).map_err(|e| FieldError::InvalidConfig(format!("noise std: {}", e)))
}

/// Add seeded noise to a time series of readouts.
///
/// All frames must share one grid; the drift of sensor `i` grows linearly
/// from 0 at the first frame to its full value at the last.
pub fn add_noise<R: Rng>(
    frames: &[FieldFrame],
    config: &NoiseConfig,
    rng: &mut R,
) -> Result<Vec<FieldFrame>, FieldError> {
    config.validate()?;
    let Some(first) = frames.first() else {
        return Ok(Vec::new());
    };
    let (width, height) = first.dimensions();
    for frame in frames {
        frame.ensure_dimensions(width, height)?;
    }

    let clean: Vec<Vec<f64>> = frames
        .iter()
        .map(|f| f.values().iter().map(|&v| v as f64).collect())
        .collect();
    let mut noisy = clean.clone();

    let peak = clean
        .iter()
        .flatten()
        .fold(1.0f64, |acc, v| acc.max(v.abs()));
    let gauss = normal(config.noise_level * peak)?;
    for v in noisy.iter_mut().flatten() {
        *v += rng.sample(gauss);
    }

    if config.shot_noise {
        for (row, clean_row) in noisy.iter_mut().zip(&clean) {
            for (v, c) in row.iter_mut().zip(clean_row) {
                let shot = normal((c.abs() + 1e-6).sqrt())?;
                *v += rng.sample(shot) * config.noise_level * 0.5;
            }
        }
    }

    if config.thermal_std > 0.0 {
        let thermal = normal(config.thermal_std)?;
        for v in noisy.iter_mut().flatten() {
            *v += rng.sample(thermal);
        }
    }

    if config.drift_std > 0.0 {
        let drift_dist = normal(config.drift_std)?;
        let drift: Vec<f64> = (0..width * height).map(|_| rng.sample(drift_dist)).collect();
        let ramp = linspace(0.0, 1.0, noisy.len());
        for (row, r) in noisy.iter_mut().zip(ramp) {
            for (v, d) in row.iter_mut().zip(&drift) {
                *v += d * r;
            }
        }
    }

    Ok(frames
        .iter()
        .zip(noisy)
        .map(|(frame, row)| frame.with_values(row.into_iter().map(|v| v as f32).collect()))
        .collect())
}

/// Simulate the population described by `config` and read it out through
/// the ODMR proxy at every sample time
pub fn simulate_odmr(config: &OdmrConfig) -> Result<OdmrOutput, FieldError> {
    if !config.signal_scale.is_finite() {
        return Err(FieldError::InvalidConfig(format!(
            "signal_scale must be finite, got {}",
            config.signal_scale
        )));
    }
    config.noise.validate()?;

    let sim = &config.simulation;
    let paths = generate_population(&sim.population)?;
    let grid = sim.grid();

    let mut evaluator = FieldEvaluator::new(sim.evaluator);
    evaluator.initialize(&paths, grid.clone())?;

    let times = linspace(0.0, sim.t_max, sim.n_time);
    let df_clean = times
        .iter()
        .map(|&t| {
            evaluator
                .compute_component(t, config.projection_axis)
                .map(|b| frequency_shift(&b, config.signal_scale))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut rng = StdRng::seed_from_u64(config.noise.seed);
    let df_noisy = add_noise(&df_clean, &config.noise, &mut rng)?;

    info!(
        "ODMR readout: {} paths over {} times on a {}x{} grid (axis {})",
        paths.len(),
        times.len(),
        grid.width(),
        grid.height(),
        config.projection_axis
    );

    Ok(OdmrOutput {
        generated_at: chrono::Utc::now().to_rfc3339(),
        xs: grid.xs().to_vec(),
        ys: grid.ys().to_vec(),
        times,
        df_clean,
        df_noisy,
    })
}
