//! One WebSocket client and its private evaluator worker
//!
//! Text frames carry protocol commands. Acks and errors go back as JSON
//! text; computed frames go back as binary (`FRAME` header).

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use lucerna_field::{Command, FieldError, FieldWorker, Response, SensorGrid};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::scene::Scene;
use crate::AppState;

/// Reply to one client message
#[derive(Debug)]
pub enum Outgoing {
    Text(String),
    Binary(Vec<u8>),
}

impl From<Outgoing> for Message {
    fn from(out: Outgoing) -> Self {
        match out {
            Outgoing::Text(text) => Message::Text(text.into()),
            Outgoing::Binary(data) => Message::Binary(data.into()),
        }
    }
}

fn json_reply(response: &Response) -> Outgoing {
    match serde_json::to_string(response) {
        Ok(text) => Outgoing::Text(text),
        Err(e) => {
            error!("Failed to encode response: {}", e);
            Outgoing::Text(r#"{"type":"error","message":"encoding failed"}"#.into())
        }
    }
}

fn error_reply(err: impl std::fmt::Display) -> Outgoing {
    json_reply(&Response::Error {
        message: err.to_string(),
    })
}

fn init_reply(result: Result<(), FieldError>) -> Outgoing {
    match result {
        Ok(()) => json_reply(&Response::InitAck),
        Err(e) => {
            warn!("Session init rejected: {}", e);
            error_reply(e)
        }
    }
}

pub async fn initialize_scene(worker: &mut FieldWorker, scene: &Scene) -> Outgoing {
    init_reply(worker.initialize(scene.paths.clone(), scene.grid.clone()).await)
}

/// Run one client message through the worker
pub async fn handle_text(worker: &mut FieldWorker, text: &str) -> Outgoing {
    let command: Command = match serde_json::from_str(text) {
        Ok(command) => command,
        Err(e) => {
            warn!("Malformed message: {}", e);
            return error_reply(format!("malformed message: {}", e));
        }
    };

    match command {
        Command::Init {
            paths,
            sensor_xs,
            sensor_ys,
        } => {
            debug!(
                "Client init: {} paths, {}x{} sensors",
                paths.len(),
                sensor_xs.len(),
                sensor_ys.len()
            );
            init_reply(
                worker
                    .initialize(paths, SensorGrid::new(sensor_xs, sensor_ys))
                    .await,
            )
        }
        Command::Compute { time } => match worker.compute(time).await {
            Ok(frame) => Outgoing::Binary(frame.to_binary()),
            Err(e) => error_reply(e),
        },
    }
}

#[derive(Debug, PartialEq)]
enum Incoming {
    Text(String),
    Skip,
    Closed,
}

/// Classify the next item of the client stream; an ended stream closes the session
fn incoming<E>(msg: Option<Result<Message, E>>) -> Incoming {
    match msg {
        Some(Ok(Message::Text(text))) => Incoming::Text(text.to_string()),
        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => Incoming::Closed,
        Some(Ok(_)) => Incoming::Skip,
    }
}

pub async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut scenes = state.scene_tx.subscribe();

    let mut worker = match FieldWorker::spawn(state.evaluator) {
        Ok(worker) => worker,
        Err(e) => {
            error!("Could not start session worker: {}", e);
            return;
        }
    };
    info!("Session opened");

    // Start from the current scene so the client can compute right away
    let scene = state.current_scene.read().await.clone();
    let ack = initialize_scene(&mut worker, &scene).await;

    if sender.send(ack.into()).await.is_ok() {
        loop {
            tokio::select! {
                Ok(scene) = scenes.recv() => {
                    let ack = initialize_scene(&mut worker, &scene).await;
                    if sender.send(ack.into()).await.is_err() {
                        break;
                    }
                }
                msg = receiver.next() => {
                    let text = match incoming(msg) {
                        Incoming::Text(text) => text,
                        Incoming::Skip => continue,
                        Incoming::Closed => break,
                    };
                    let reply = handle_text(&mut worker, &text).await;
                    if sender.send(reply.into()).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    // Joining waits for an in-flight frame, keep it off the executor
    let _ = tokio::task::spawn_blocking(move || worker.shutdown()).await;
    info!("Session closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use lucerna_field::{CurvePath, EvaluatorConfig, Point3};

    fn expect_text(out: Outgoing) -> serde_json::Value {
        match out {
            Outgoing::Text(text) => serde_json::from_str(&text).unwrap(),
            Outgoing::Binary(_) => panic!("expected a text reply"),
        }
    }

    #[tokio::test]
    async fn test_init_then_compute() {
        let mut worker = FieldWorker::spawn(EvaluatorConfig::default()).unwrap();

        let init = r#"{"type":"init","neuronPoints":[[{"x":0,"y":0,"z":0},{"x":1,"y":0,"z":0}]],"sensorXs":[0,1],"sensorYs":[0,1]}"#;
        let ack = expect_text(handle_text(&mut worker, init).await);
        assert_eq!(ack["type"], "init:ack");

        match handle_text(&mut worker, r#"{"type":"compute","time":0}"#).await {
            Outgoing::Binary(data) => {
                assert_eq!(&data[0..8], b"FRAME\0\0\0");
                assert_eq!(data.len(), 24 + 4 * 4);
            }
            other => panic!("expected a binary frame, got {:?}", other),
        }
        worker.shutdown();
    }

    #[tokio::test]
    async fn test_compute_before_init_reports_error() {
        let mut worker = FieldWorker::spawn(EvaluatorConfig::default()).unwrap();
        let reply = expect_text(handle_text(&mut worker, r#"{"type":"compute"}"#).await);
        assert_eq!(reply["type"], "error");
        worker.shutdown();
    }

    #[tokio::test]
    async fn test_malformed_message_reports_error() {
        let mut worker = FieldWorker::spawn(EvaluatorConfig::default()).unwrap();

        let reply = expect_text(handle_text(&mut worker, "not json").await);
        assert_eq!(reply["type"], "error");

        // init without sensor arrays
        let reply = expect_text(handle_text(&mut worker, r#"{"type":"init"}"#).await);
        assert_eq!(reply["type"], "error");
        worker.shutdown();
    }

    #[tokio::test]
    async fn test_initialize_scene() {
        let mut worker = FieldWorker::spawn(EvaluatorConfig::default()).unwrap();
        let scene = Scene {
            paths: vec![CurvePath::new(vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ])],
            grid: SensorGrid::uniform([0.0, 1.0, 0.0, 1.0], 4),
        };

        let ack = expect_text(initialize_scene(&mut worker, &scene).await);
        assert_eq!(ack["type"], "init:ack");
        assert_eq!(worker.dimensions(), Some((4, 4)));
        worker.shutdown();
    }

    #[test]
    fn test_ended_stream_closes_session() {
        assert_eq!(incoming::<axum::Error>(None), Incoming::Closed);
        assert_eq!(
            incoming::<axum::Error>(Some(Ok(Message::Close(None)))),
            Incoming::Closed
        );
        assert_eq!(
            incoming::<axum::Error>(Some(Ok(Message::Text("{}".into())))),
            Incoming::Text("{}".to_string())
        );
        assert_eq!(
            incoming::<axum::Error>(Some(Ok(Message::Ping(vec![0u8].into())))),
            Incoming::Skip
        );
    }
}
