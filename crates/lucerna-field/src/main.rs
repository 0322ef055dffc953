//! lucerna-field: evaluate a synthetic neuron population over time and export the frames

use anyhow::{Context, Result};
use clap::Parser;
use lucerna_field::{simulate, EvaluatorConfig, PopulationConfig, SimulationConfig};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "lucerna-field")]
#[command(about = "Compute travelling-pulse field frames over a sensor grid")]
#[command(version)]
struct Args {
    /// Output JSON file
    #[arg(short, long, required_unless_present = "stdout")]
    output: Option<PathBuf>,

    /// Number of neuron paths
    #[arg(long, default_value = "100")]
    paths: usize,

    /// Points sampled along each path
    #[arg(long, default_value = "200")]
    points_per_path: usize,

    /// Mean path arc length
    #[arg(long, default_value = "0.5")]
    mean_length: f64,

    /// Sensor samples per axis
    #[arg(long, default_value = "32")]
    sensor_res: usize,

    /// Number of time samples
    #[arg(long, default_value = "40")]
    frames: usize,

    /// Last time sample
    #[arg(long, default_value = "2.0")]
    t_max: f64,

    /// Population seed
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Excitation pulse width in normalized arc length
    #[arg(long, default_value = "0.08")]
    sigma: f64,

    /// Print the JSON to stdout instead of writing a file
    #[arg(long)]
    stdout: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let args = Args::parse();

    let config = SimulationConfig {
        population: PopulationConfig {
            n_paths: args.paths,
            points_per_path: args.points_per_path,
            mean_length: args.mean_length,
            seed: args.seed,
            ..Default::default()
        },
        sensor_res: args.sensor_res,
        n_time: args.frames,
        t_max: args.t_max,
        evaluator: EvaluatorConfig {
            sigma: args.sigma,
            ..Default::default()
        },
        ..Default::default()
    };

    let output = simulate(&config).context("Simulation failed")?;

    match (args.stdout, args.output) {
        (false, Some(path)) => output
            .write_json(&path)
            .with_context(|| format!("Failed to write output file: {:?}", path))?,
        _ => println!("{}", serde_json::to_string(&output)?),
    }

    Ok(())
}
