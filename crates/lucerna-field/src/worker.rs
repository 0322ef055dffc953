//! Evaluator running on a dedicated thread
//!
//! Frames are O(sensors × segments) to compute, so the evaluator lives on its
//! own OS thread and never blocks a render loop or an async executor. Jobs
//! travel over an unbounded queue and are answered in arrival order; each job
//! carries its own reply channel, and the finished frame moves to the caller
//! through it.

use std::thread::{self, JoinHandle};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::error::FieldError;
use crate::evaluator::{FieldEvaluator, FieldFrame};
use crate::geometry::{CurvePath, SensorGrid};
use crate::protocol::{Command, Response};
use crate::EvaluatorConfig;

struct Job {
    command: Command,
    reply: oneshot::Sender<Response>,
}

/// Handle to an evaluator thread
pub struct FieldWorker {
    jobs: mpsc::UnboundedSender<Job>,
    thread: JoinHandle<()>,
    // Grid dimensions acknowledged by the last init sent through this handle
    dimensions: Option<(usize, usize)>,
}

impl FieldWorker {
    pub fn spawn(config: EvaluatorConfig) -> Result<Self, FieldError> {
        config.validate()?;
        let (jobs, rx) = mpsc::unbounded_channel::<Job>();

        let thread = thread::Builder::new()
            .name("field-evaluator".into())
            .spawn(move || run_evaluator(rx, config))?;

        Ok(Self {
            jobs,
            thread,
            dimensions: None,
        })
    }

    /// Queue a raw command now and return the receiver for its response.
    ///
    /// Does not track grid dimensions; prefer [`initialize`](Self::initialize)
    /// and [`compute`](Self::compute).
    pub fn submit(&self, command: Command) -> Result<oneshot::Receiver<Response>, FieldError> {
        let (reply, response) = oneshot::channel();
        self.jobs
            .send(Job { command, reply })
            .map_err(|_| FieldError::WorkerClosed)?;
        Ok(response)
    }

    /// Send a raw command and wait for its response
    pub async fn request(&self, command: Command) -> Result<Response, FieldError> {
        self.submit(command)?
            .await
            .map_err(|_| FieldError::WorkerClosed)
    }

    pub async fn initialize(
        &mut self,
        paths: Vec<CurvePath>,
        grid: SensorGrid,
    ) -> Result<(), FieldError> {
        let dimensions = grid.dimensions();
        match self.request(Command::init(paths, grid)).await? {
            Response::InitAck => {
                self.dimensions = Some(dimensions);
                Ok(())
            }
            Response::Error { message } => Err(FieldError::Rejected(message)),
            Response::Result(_) => Err(FieldError::Rejected(
                "unexpected result in reply to init".into(),
            )),
        }
    }

    /// Compute a frame and check it against the grid this handle initialized
    pub async fn compute(&mut self, time: f64) -> Result<FieldFrame, FieldError> {
        let (width, height) = self.dimensions.ok_or(FieldError::NotInitialized)?;
        match self.request(Command::compute(time)).await? {
            Response::Result(frame) => {
                frame.ensure_dimensions(width, height)?;
                Ok(frame)
            }
            Response::Error { message } => Err(FieldError::Rejected(message)),
            Response::InitAck => Err(FieldError::Rejected(
                "unexpected init:ack in reply to compute".into(),
            )),
        }
    }

    pub fn dimensions(&self) -> Option<(usize, usize)> {
        self.dimensions
    }

    /// Close the queue and wait for the thread to finish its current job
    pub fn shutdown(self) {
        let FieldWorker { jobs, thread, .. } = self;
        drop(jobs);
        if thread.join().is_err() {
            error!("Field evaluator thread panicked");
        }
    }
}

fn run_evaluator(mut rx: mpsc::UnboundedReceiver<Job>, config: EvaluatorConfig) {
    let mut evaluator = FieldEvaluator::new(config);
    info!("Field evaluator started");

    while let Some(Job { command, reply }) = rx.blocking_recv() {
        let response = command.apply(&mut evaluator);
        if let Response::Result(frame) = &response {
            debug!(
                "Computed frame t={:.3}: {}x{}, max |B|={:.3e}",
                frame.time(),
                frame.width(),
                frame.height(),
                frame.max()
            );
        }
        // Caller may have gone away; nothing to do with the frame then
        let _ = reply.send(response);
    }

    info!("Field evaluator stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point3;

    fn unit_path() -> CurvePath {
        CurvePath::new(vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)])
    }

    #[tokio::test]
    async fn test_worker_matches_inline_evaluator() {
        let grid = SensorGrid::new(vec![0.0, 0.5, 1.0], vec![0.0, 1.0]);

        let mut inline = FieldEvaluator::default();
        inline.initialize(&[unit_path()], grid.clone()).unwrap();

        let mut worker = FieldWorker::spawn(EvaluatorConfig::default()).unwrap();
        worker.initialize(vec![unit_path()], grid).await.unwrap();

        let frame = worker.compute(0.3).await.unwrap();
        assert_eq!(frame, inline.compute(0.3).unwrap());
        worker.shutdown();
    }

    #[test]
    fn test_spawn_rejects_invalid_config() {
        let config = EvaluatorConfig {
            epsilon: -1.0,
            ..Default::default()
        };
        assert!(matches!(FieldWorker::spawn(config), Err(FieldError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_compute_before_init() {
        let mut worker = FieldWorker::spawn(EvaluatorConfig::default()).unwrap();
        assert!(matches!(worker.compute(0.0).await, Err(FieldError::NotInitialized)));

        // The raw path reaches the evaluator, which answers with an error
        let response = worker.request(Command::compute(0.0)).await.unwrap();
        assert!(matches!(response, Response::Error { .. }));
        worker.shutdown();
    }

    #[tokio::test]
    async fn test_results_follow_request_order() {
        let mut worker = FieldWorker::spawn(EvaluatorConfig::default()).unwrap();
        worker
            .initialize(vec![unit_path()], SensorGrid::new(vec![0.0], vec![0.0]))
            .await
            .unwrap();

        let times = [0.0, 0.1, 0.2, 0.3, 0.4];
        let pending: Vec<_> = times
            .iter()
            .map(|&t| worker.submit(Command::compute(t)).unwrap())
            .collect();

        for (t, response) in times.iter().zip(pending) {
            match response.await.unwrap() {
                Response::Result(frame) => assert_eq!(frame.time(), *t),
                other => panic!("unexpected response: {:?}", other),
            }
        }
        worker.shutdown();
    }

    #[tokio::test]
    async fn test_reinit_changes_dimensions() {
        let mut worker = FieldWorker::spawn(EvaluatorConfig::default()).unwrap();
        worker
            .initialize(vec![unit_path()], SensorGrid::new(vec![0.0, 1.0], vec![0.0, 1.0]))
            .await
            .unwrap();
        assert_eq!(worker.compute(0.0).await.unwrap().values().len(), 4);

        worker
            .initialize(vec![unit_path()], SensorGrid::uniform([0.0, 1.0, 0.0, 1.0], 8))
            .await
            .unwrap();
        assert_eq!(worker.dimensions(), Some((8, 8)));
        assert_eq!(worker.compute(0.0).await.unwrap().values().len(), 64);
        worker.shutdown();
    }

    #[tokio::test]
    async fn test_stale_grid_is_detected() {
        let mut worker = FieldWorker::spawn(EvaluatorConfig::default()).unwrap();
        worker
            .initialize(vec![unit_path()], SensorGrid::new(vec![0.0, 1.0], vec![0.0]))
            .await
            .unwrap();

        // Re-init behind the handle's back leaves it expecting the old grid
        let ack = worker
            .request(Command::init(
                vec![unit_path()],
                SensorGrid::new(vec![0.0, 1.0, 2.0], vec![0.0]),
            ))
            .await
            .unwrap();
        assert_eq!(ack, Response::InitAck);

        assert!(matches!(
            worker.compute(0.0).await,
            Err(FieldError::DimensionMismatch {
                expected: (2, 1),
                actual: (3, 1)
            })
        ));
        worker.shutdown();
    }

    #[tokio::test]
    async fn test_rejected_init_keeps_dimensions() {
        let mut worker = FieldWorker::spawn(EvaluatorConfig::default()).unwrap();
        worker
            .initialize(vec![unit_path()], SensorGrid::new(vec![0.0], vec![0.0]))
            .await
            .unwrap();

        let bad = SensorGrid::new(vec![f64::INFINITY, 0.0], vec![0.0]);
        assert!(matches!(
            worker.initialize(vec![], bad).await,
            Err(FieldError::Rejected(_))
        ));
        assert_eq!(worker.dimensions(), Some((1, 1)));
        assert_eq!(worker.compute(0.0).await.unwrap().dimensions(), (1, 1));
        worker.shutdown();
    }
}
