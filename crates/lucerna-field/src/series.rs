//! Batch evaluation of a scene over evenly spaced times
//!
//! Produces the full `xs`, `ys`, `times` and per-time frames in one
//! document, for offline plotting or for clients that want a whole sweep
//! instead of streaming frames one at a time.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::FieldError;
use crate::evaluator::{FieldEvaluator, FieldFrame};
use crate::geometry::{linspace, SensorGrid};
use crate::population::{generate_population, PopulationConfig};
use crate::EvaluatorConfig;

/// Parameters for a batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub population: PopulationConfig,
    /// Sensor bounds `[xmin, xmax, ymin, ymax]`, the population area when absent
    pub grid_bounds: Option<[f64; 4]>,
    /// Samples per sensor axis
    pub sensor_res: usize,
    pub n_time: usize,
    pub t_max: f64,
    pub evaluator: EvaluatorConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            population: PopulationConfig::default(),
            grid_bounds: None,
            sensor_res: 32,
            n_time: 40,
            t_max: 2.0,
            evaluator: EvaluatorConfig::default(),
        }
    }
}

impl SimulationConfig {
    pub fn grid(&self) -> SensorGrid {
        let bounds = self.grid_bounds.unwrap_or(self.population.area);
        SensorGrid::uniform(bounds, self.sensor_res)
    }
}

/// Result of a batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationOutput {
    pub generated_at: String,
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
    pub times: Vec<f64>,
    pub frames: Vec<FieldFrame>,
}

impl SimulationOutput {
    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;

        info!(
            "Exported {} frames ({} sensors each) to {:?}",
            self.frames.len(),
            self.xs.len() * self.ys.len(),
            path
        );
        Ok(())
    }
}

/// Generate the population described by `config` and evaluate it at every sample time
pub fn simulate(config: &SimulationConfig) -> Result<SimulationOutput, FieldError> {
    let paths = generate_population(&config.population)?;
    let grid = config.grid();

    let mut evaluator = FieldEvaluator::new(config.evaluator);
    evaluator.initialize(&paths, grid.clone())?;

    let times = linspace(0.0, config.t_max, config.n_time);
    let frames = times
        .iter()
        .map(|&t| evaluator.compute(t))
        .collect::<Result<Vec<_>, _>>()?;

    info!(
        "Simulated {} paths ({} segments) over {} times on a {}x{} grid",
        paths.len(),
        evaluator.segment_count(),
        times.len(),
        grid.width(),
        grid.height()
    );

    Ok(SimulationOutput {
        generated_at: chrono::Utc::now().to_rfc3339(),
        xs: grid.xs().to_vec(),
        ys: grid.ys().to_vec(),
        times,
        frames,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn small() -> SimulationConfig {
        SimulationConfig {
            population: PopulationConfig {
                n_paths: 3,
                points_per_path: 20,
                ..Default::default()
            },
            sensor_res: 6,
            n_time: 4,
            t_max: 1.5,
            ..Default::default()
        }
    }

    #[test]
    fn test_simulate_shapes() {
        let output = simulate(&small()).unwrap();

        assert_eq!(output.xs.len(), 6);
        assert_eq!(output.ys.len(), 6);
        let expected = [0.0, 0.5, 1.0, 1.5];
        assert_eq!(output.times.len(), expected.len());
        for (t, e) in output.times.iter().zip(expected) {
            assert!((t - e).abs() < 1e-12);
        }
        assert_eq!(output.frames.len(), 4);
        for (frame, t) in output.frames.iter().zip(&output.times) {
            assert_eq!(frame.dimensions(), (6, 6));
            assert_eq!(frame.time(), *t);
            assert!(frame.values().iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn test_simulate_is_reproducible() {
        let a = simulate(&small()).unwrap();
        let b = simulate(&small()).unwrap();
        assert_eq!(a.frames, b.frames);
    }

    #[test]
    fn test_grid_bounds_override() {
        let config = SimulationConfig {
            grid_bounds: Some([-2.0, 2.0, -1.0, 1.0]),
            ..small()
        };
        let grid = config.grid();
        assert_eq!(grid.xs().first(), Some(&-2.0));
        assert_eq!(grid.ys().first(), Some(&-1.0));
        assert!((grid.xs()[5] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_write_json() {
        let output = simulate(&small()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("series.json");

        output.write_json(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: SimulationOutput = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.times, output.times);
        assert_eq!(parsed.frames.len(), 4);
        assert_eq!(parsed.frames[2].dimensions(), (6, 6));
    }

    #[test]
    fn test_invalid_evaluator_config_rejected() {
        let config = SimulationConfig {
            evaluator: EvaluatorConfig {
                sigma: 0.0,
                ..Default::default()
            },
            ..small()
        };
        assert!(matches!(simulate(&config), Err(FieldError::InvalidConfig(_))));
    }
}
