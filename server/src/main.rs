//! Lucerna field server
//! - Per-client background field evaluators over WebSocket
//! - Batch time-series simulation and ODMR readouts over HTTP
//! - Scene file watching

use anyhow::{Context, Result};
use axum::{
    extract::{ws::WebSocketUpgrade, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use lucerna_field::{
    EvaluatorConfig, OdmrConfig, OdmrOutput, PopulationConfig, SimulationConfig, SimulationOutput,
};
use notify_debouncer_mini::{new_debouncer, notify::RecursiveMode, DebounceEventResult};
use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tokio::sync::{broadcast, mpsc, RwLock};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

mod scene;
mod session;

use scene::Scene;

// Upper bounds for a single /simulate or /odmr request
const MAX_PATHS: usize = 2000;
const MAX_POINTS_PER_PATH: usize = 2000;
const MAX_SENSOR_RES: usize = 256;
const MAX_TIME_SAMPLES: usize = 1000;

#[derive(Parser, Debug)]
#[command(name = "lucerna-server")]
#[command(about = "Stream Lucerna field frames to renderers")]
#[command(version)]
struct Args {
    /// Scene JSON file to serve and watch for changes
    #[arg(long)]
    scene: Option<PathBuf>,

    /// Listen port
    #[arg(long, default_value = "3001")]
    port: u16,

    /// Sensor samples per axis for generated scenes
    #[arg(long, default_value = "32")]
    sensor_res: usize,

    /// Neuron paths in generated scenes
    #[arg(long, default_value = "20")]
    paths: usize,

    /// Population seed for generated scenes
    #[arg(long, default_value = "0")]
    seed: u64,
}

pub struct AppState {
    pub evaluator: EvaluatorConfig,
    pub scene_tx: broadcast::Sender<Arc<Scene>>,
    pub current_scene: RwLock<Arc<Scene>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let population = PopulationConfig {
        n_paths: args.paths,
        seed: args.seed,
        ..Default::default()
    };

    let initial = match &args.scene {
        Some(path) if path.exists() => Scene::load(path, &population, args.sensor_res)?,
        _ => Scene::generated(&population, args.sensor_res)?,
    };
    info!(
        "Scene: {} paths, {}x{} sensors",
        initial.paths.len(),
        initial.grid.width(),
        initial.grid.height()
    );

    let (scene_tx, _) = broadcast::channel::<Arc<Scene>>(16);

    let state = Arc::new(AppState {
        evaluator: EvaluatorConfig::default(),
        scene_tx,
        current_scene: RwLock::new(Arc::new(initial)),
    });

    if let Some(path) = args.scene.clone() {
        info!("Watching: {:?}", path);
        let (reload_tx, mut reload_rx) = mpsc::unbounded_channel::<()>();

        let watch_path = path.clone();
        tokio::spawn(async move {
            if let Err(e) = watch_file(watch_path, reload_tx).await {
                error!("Scene watcher stopped: {:#}", e);
            }
        });

        // Reload the scene on every debounced change
        let state_clone = state.clone();
        let sensor_res = args.sensor_res;
        tokio::spawn(async move {
            while reload_rx.recv().await.is_some() {
                let path = path.clone();
                let population = population.clone();
                let loaded = tokio::task::spawn_blocking(move || {
                    Scene::load(&path, &population, sensor_res)
                })
                .await;

                match loaded {
                    Ok(Ok(scene)) => {
                        info!(
                            "Scene reloaded: {} paths, {}x{} sensors",
                            scene.paths.len(),
                            scene.grid.width(),
                            scene.grid.height()
                        );
                        let scene = Arc::new(scene);
                        *state_clone.current_scene.write().await = scene.clone();
                        let _ = state_clone.scene_tx.send(scene);
                    }
                    Ok(Err(e)) => warn!("Scene reload failed, keeping previous scene: {:#}", e),
                    Err(e) => error!("Scene reload task failed: {}", e),
                }
            }
        });
    }

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/simulate", post(simulate_handler))
        .route("/odmr", post(odmr_handler))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!("Server: http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn watch_file(path: PathBuf, tx: mpsc::UnboundedSender<()>) -> Result<()> {
    let (notify_tx, mut notify_rx) = mpsc::channel::<PathBuf>(10);

    let mut debouncer = new_debouncer(Duration::from_millis(200), move |res: DebounceEventResult| {
        if let Ok(events) = res {
            for event in events {
                let _ = notify_tx.blocking_send(event.path);
            }
        }
    })
    .context("Failed to create file watcher")?;

    let watch_dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    debouncer
        .watcher()
        .watch(&watch_dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch {:?}", watch_dir))?;

    info!("Watching directory: {:?}", watch_dir);

    while let Some(changed) = notify_rx.recv().await {
        if changed == path || changed.file_name() == path.file_name() {
            info!("Scene file changed, reloading...");
            if tx.send(()).is_err() {
                break;
            }
        }
    }

    Ok(())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| session::handle_socket(socket, state))
}

fn check_limits(config: &SimulationConfig) -> Result<(), String> {
    let p = &config.population;
    if p.n_paths > MAX_PATHS {
        return Err(format!("population.n_paths exceeds {}", MAX_PATHS));
    }
    if p.points_per_path > MAX_POINTS_PER_PATH {
        return Err(format!("population.points_per_path exceeds {}", MAX_POINTS_PER_PATH));
    }
    if config.sensor_res > MAX_SENSOR_RES {
        return Err(format!("sensor_res exceeds {}", MAX_SENSOR_RES));
    }
    if config.n_time > MAX_TIME_SAMPLES {
        return Err(format!("n_time exceeds {}", MAX_TIME_SAMPLES));
    }
    Ok(())
}

async fn simulate_handler(
    Json(config): Json<SimulationConfig>,
) -> Result<Json<SimulationOutput>, (StatusCode, String)> {
    check_limits(&config).map_err(|e| (StatusCode::BAD_REQUEST, e))?;

    let output = tokio::task::spawn_blocking(move || lucerna_field::simulate(&config))
        .await
        .map_err(|e| {
            error!("Simulation task failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "simulation failed".to_string())
        })?
        .map_err(|e| {
            warn!("Simulation rejected: {}", e);
            (StatusCode::BAD_REQUEST, e.to_string())
        })?;

    info!("Simulated {} frames for /simulate", output.frames.len());
    Ok(Json(output))
}

async fn odmr_handler(
    Json(config): Json<OdmrConfig>,
) -> Result<Json<OdmrOutput>, (StatusCode, String)> {
    check_limits(&config.simulation).map_err(|e| (StatusCode::BAD_REQUEST, e))?;

    let output = tokio::task::spawn_blocking(move || lucerna_field::simulate_odmr(&config))
        .await
        .map_err(|e| {
            error!("ODMR task failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "odmr processing failed".to_string())
        })?
        .map_err(|e| {
            warn!("ODMR request rejected: {}", e);
            (StatusCode::BAD_REQUEST, e.to_string())
        })?;

    info!("Produced {} readout frames for /odmr", output.df_noisy.len());
    Ok(Json(output))
}
