//! Errors raised by the field evaluator and its worker

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FieldError {
    #[error("Evaluator not initialized: send an init before computing")]
    NotInitialized,

    #[error("Invalid time value: {0}")]
    InvalidTime(f64),

    #[error("Non-finite coordinate in {what}")]
    NonFiniteCoordinate { what: String },

    #[error("Frame dimensions {actual:?} do not match sensor grid {expected:?}")]
    DimensionMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Invalid evaluator config: {0}")]
    InvalidConfig(String),

    #[error("Invalid population config: {0}")]
    InvalidPopulation(String),

    #[error("Evaluator worker has shut down")]
    WorkerClosed,

    #[error("Failed to start evaluator worker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Evaluator rejected request: {0}")]
    Rejected(String),
}
