//! Messages exchanged with an evaluator
//!
//! JSON is internally tagged by `type`, matching what the browser renderer
//! already sends: `{"type":"init","neuronPoints":[...],"sensorXs":[...],"sensorYs":[...]}`
//! and `{"type":"compute","time":1.25}`.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::evaluator::{FieldEvaluator, FieldFrame};
use crate::geometry::{CurvePath, SensorGrid};

/// Request to an evaluator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    #[serde(rename = "init")]
    Init {
        #[serde(rename = "neuronPoints", alias = "paths", default)]
        paths: Vec<CurvePath>,
        #[serde(rename = "sensorXs")]
        sensor_xs: Vec<f64>,
        #[serde(rename = "sensorYs")]
        sensor_ys: Vec<f64>,
    },
    #[serde(rename = "compute")]
    Compute {
        #[serde(default)]
        time: f64,
    },
}

impl Command {
    pub fn init(paths: Vec<CurvePath>, grid: SensorGrid) -> Self {
        Command::Init {
            paths,
            sensor_xs: grid.xs().to_vec(),
            sensor_ys: grid.ys().to_vec(),
        }
    }

    pub fn compute(time: f64) -> Self {
        Command::Compute { time }
    }

    /// Run this command against `evaluator`, converting failures into an error response
    pub fn apply(self, evaluator: &mut FieldEvaluator) -> Response {
        let outcome = match self {
            Command::Init {
                paths,
                sensor_xs,
                sensor_ys,
            } => evaluator
                .initialize(&paths, SensorGrid::new(sensor_xs, sensor_ys))
                .map(|_| Response::InitAck),
            Command::Compute { time } => evaluator.compute(time).map(Response::Result),
        };

        outcome.unwrap_or_else(|e| {
            warn!("Evaluator request failed: {}", e);
            Response::Error {
                message: e.to_string(),
            }
        })
    }
}

/// Reply from an evaluator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    #[serde(rename = "init:ack")]
    InitAck,
    #[serde(rename = "result")]
    Result(FieldFrame),
    #[serde(rename = "error")]
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point3;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_worker_init_message() {
        let json = r#"{
            "type": "init",
            "neuronPoints": [[{"x":0,"y":0,"z":0},{"x":1,"y":0,"z":0}]],
            "sensorXs": [0, 1],
            "sensorYs": [0, 1]
        }"#;
        let command: Command = serde_json::from_str(json).unwrap();

        let expected = Command::Init {
            paths: vec![CurvePath::new(vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
            ])],
            sensor_xs: vec![0.0, 1.0],
            sensor_ys: vec![0.0, 1.0],
        };
        assert_eq!(command, expected);
    }

    #[test]
    fn test_init_without_paths_defaults_to_empty() {
        let json = r#"{"type":"init","sensorXs":[0.5],"sensorYs":[0.5]}"#;
        let command: Command = serde_json::from_str(json).unwrap();
        assert!(matches!(command, Command::Init { ref paths, .. } if paths.is_empty()));
    }

    #[test]
    fn test_init_without_sensors_is_malformed() {
        let json = r#"{"type":"init","neuronPoints":[]}"#;
        assert!(serde_json::from_str::<Command>(json).is_err());
    }

    #[test]
    fn test_compute_time_defaults_to_zero() {
        let command: Command = serde_json::from_str(r#"{"type":"compute"}"#).unwrap();
        assert_eq!(command, Command::Compute { time: 0.0 });
    }

    #[test]
    fn test_apply_sequence() {
        let mut evaluator = FieldEvaluator::default();

        let early = Command::compute(0.0).apply(&mut evaluator);
        assert!(matches!(early, Response::Error { .. }));

        let grid = SensorGrid::new(vec![0.0, 1.0], vec![0.0]);
        let ack = Command::init(Vec::new(), grid).apply(&mut evaluator);
        assert_eq!(ack, Response::InitAck);

        match Command::compute(0.5).apply(&mut evaluator) {
            Response::Result(frame) => assert_eq!(frame.dimensions(), (2, 1)),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_response_json_tags() {
        let ack = serde_json::to_value(&Response::InitAck).unwrap();
        assert_eq!(ack, serde_json::json!({"type": "init:ack"}));

        let err = serde_json::to_value(&Response::Error {
            message: "boom".into(),
        })
        .unwrap();
        assert_eq!(err, serde_json::json!({"type": "error", "message": "boom"}));
    }
}
