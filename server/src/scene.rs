//! Scene served to new sessions
//!
//! A scene file is JSON. It either lists the paths and sensor axes outright
//! or describes a population to generate plus the grid to sample it on:
//!
//! ```json
//! { "paths": [[{"x":0,"y":0,"z":0},{"x":1,"y":0,"z":0}]], "sensor_xs": [0,1], "sensor_ys": [0,1] }
//! { "population": { "n_paths": 30, "seed": 4 }, "grid_bounds": [0,1,0,1], "sensor_res": 48 }
//! ```

use anyhow::{Context, Result};
use lucerna_field::{generate_population, CurvePath, PopulationConfig, SensorGrid};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SceneFile {
    pub paths: Option<Vec<CurvePath>>,
    pub sensor_xs: Option<Vec<f64>>,
    pub sensor_ys: Option<Vec<f64>>,
    pub population: Option<PopulationConfig>,
    pub grid_bounds: Option<[f64; 4]>,
    pub sensor_res: Option<usize>,
}

/// Paths and grid a session evaluator is initialized with
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub paths: Vec<CurvePath>,
    pub grid: SensorGrid,
}

impl Scene {
    /// Generated population on a square grid over its placement area
    pub fn generated(population: &PopulationConfig, sensor_res: usize) -> Result<Self> {
        let paths = generate_population(population).context("Population generation failed")?;
        let grid = SensorGrid::uniform(population.area, sensor_res);
        Ok(Self { paths, grid })
    }

    /// Build from a parsed scene file; anything it leaves out comes from
    /// `population` and `sensor_res`
    pub fn from_file(
        file: SceneFile,
        population: &PopulationConfig,
        sensor_res: usize,
    ) -> Result<Self> {
        let population = file.population.unwrap_or_else(|| population.clone());

        let paths = match file.paths {
            Some(paths) => paths,
            None => generate_population(&population).context("Population generation failed")?,
        };

        let grid = match (file.sensor_xs, file.sensor_ys) {
            (Some(xs), Some(ys)) => SensorGrid::new(xs, ys),
            (None, None) => SensorGrid::uniform(
                file.grid_bounds.unwrap_or(population.area),
                file.sensor_res.unwrap_or(sensor_res),
            ),
            _ => anyhow::bail!("Scene must give both sensor_xs and sensor_ys, or neither"),
        };

        Ok(Self { paths, grid })
    }

    pub fn load(path: &Path, population: &PopulationConfig, sensor_res: usize) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scene file: {:?}", path))?;
        let file: SceneFile = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse scene file: {:?}", path))?;
        Self::from_file(file, population, sensor_res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lucerna_field::Point3;

    fn defaults() -> PopulationConfig {
        PopulationConfig {
            n_paths: 4,
            points_per_path: 16,
            ..Default::default()
        }
    }

    #[test]
    fn test_explicit_scene() {
        let json = r#"{
            "paths": [[{"x":0,"y":0,"z":0},{"x":1,"y":0,"z":0}]],
            "sensor_xs": [0, 1],
            "sensor_ys": [0, 1, 2]
        }"#;
        let file: SceneFile = serde_json::from_str(json).unwrap();
        let scene = Scene::from_file(file, &defaults(), 32).unwrap();

        assert_eq!(scene.paths.len(), 1);
        assert_eq!(scene.paths[0].points()[1], Point3::new(1.0, 0.0, 0.0));
        assert_eq!(scene.grid.dimensions(), (2, 3));
    }

    #[test]
    fn test_generated_scene_file() {
        let json = r#"{ "population": { "n_paths": 3, "points_per_path": 10, "seed": 9 }, "sensor_res": 5 }"#;
        let file: SceneFile = serde_json::from_str(json).unwrap();
        let scene = Scene::from_file(file, &defaults(), 32).unwrap();

        assert_eq!(scene.paths.len(), 3);
        assert_eq!(scene.grid.dimensions(), (5, 5));
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let scene = Scene::from_file(SceneFile::default(), &defaults(), 8).unwrap();
        assert_eq!(scene, Scene::generated(&defaults(), 8).unwrap());
    }

    #[test]
    fn test_half_grid_rejected() {
        let file = SceneFile {
            sensor_xs: Some(vec![0.0]),
            ..Default::default()
        };
        assert!(Scene::from_file(file, &defaults(), 8).is_err());
    }
}
