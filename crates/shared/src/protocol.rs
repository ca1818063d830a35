use serde::{Deserialize, Serialize};

use crate::domain::{GazeSample, NormalizedPoint};

/// Commands sent to the backend collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ClientCommand {
    LoadModel,
    StartCalibration,
    StartTune,
    CalibrationFrame { frame: String },
    TrackGaze { frame: String },
    Stop,
}

impl ClientCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::LoadModel => "load_model",
            ClientCommand::StartCalibration => "start_calibration",
            ClientCommand::StartTune => "start_tune",
            ClientCommand::CalibrationFrame { .. } => "calibration_frame",
            ClientCommand::TrackGaze { .. } => "track_gaze",
            ClientCommand::Stop => "stop",
        }
    }

    pub fn is_frame(&self) -> bool {
        matches!(
            self,
            ClientCommand::CalibrationFrame { .. } | ClientCommand::TrackGaze { .. }
        )
    }
}

/// Events emitted by the backend collaborator, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendEvent {
    CalibrationStarted {
        points: Vec<NormalizedPoint>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default)]
        is_tune: bool,
    },
    CalibrationFaceCountdown {
        progress: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    CalibrationPointStart {
        index: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total: Option<usize>,
    },
    CalibrationPulse {
        progress: f64,
    },
    CalibrationCapture {
        progress: f64,
    },
    CalibrationComplete {
        success: bool,
        #[serde(default)]
        samples: u32,
        #[serde(default)]
        is_tune: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    ModelLoaded {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    GazeUpdate {
        x: Option<f64>,
        y: Option<f64>,
        #[serde(default)]
        blink: bool,
        #[serde(default)]
        double_blink: bool,
    },
    Stopped {
        #[serde(default)]
        success: bool,
    },
    Error {
        message: String,
    },
}

impl BackendEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            BackendEvent::CalibrationStarted { .. } => "calibration_started",
            BackendEvent::CalibrationFaceCountdown { .. } => "calibration_face_countdown",
            BackendEvent::CalibrationPointStart { .. } => "calibration_point_start",
            BackendEvent::CalibrationPulse { .. } => "calibration_pulse",
            BackendEvent::CalibrationCapture { .. } => "calibration_capture",
            BackendEvent::CalibrationComplete { .. } => "calibration_complete",
            BackendEvent::ModelLoaded { .. } => "model_loaded",
            BackendEvent::GazeUpdate { .. } => "gaze_update",
            BackendEvent::Stopped { .. } => "stopped",
            BackendEvent::Error { .. } => "error",
        }
    }

    pub fn gaze_sample(&self) -> Option<GazeSample> {
        match self {
            BackendEvent::GazeUpdate {
                x, y, double_blink, ..
            } => Some(GazeSample {
                x: *x,
                y: *y,
                double_blink: *double_blink,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_serialize_with_command_tag() {
        let json = serde_json::to_value(ClientCommand::StartTune).expect("serialize");
        assert_eq!(json, serde_json::json!({ "command": "start_tune" }));

        let json = serde_json::to_value(ClientCommand::TrackGaze {
            frame: "data:image/jpeg;base64,AAAA".into(),
        })
        .expect("serialize");
        assert_eq!(json["command"], "track_gaze");
        assert_eq!(json["frame"], "data:image/jpeg;base64,AAAA");
    }

    #[test]
    fn failed_completion_without_samples_parses() {
        let raw = r#"{"type":"calibration_complete","success":false,"error":"Not enough calibration data"}"#;
        let event: BackendEvent = serde_json::from_str(raw).expect("parse");
        assert_eq!(
            event,
            BackendEvent::CalibrationComplete {
                success: false,
                samples: 0,
                is_tune: false,
                error: Some("Not enough calibration data".into()),
            }
        );
    }

    #[test]
    fn gaze_update_with_null_coordinates_yields_empty_sample() {
        let raw = r#"{"type":"gaze_update","x":null,"y":null,"blink":true,"double_blink":true}"#;
        let event: BackendEvent = serde_json::from_str(raw).expect("parse");
        let sample = event.gaze_sample().expect("gaze sample");
        assert!(sample.point().is_none());
        assert!(sample.double_blink);
    }

    #[test]
    fn calibration_started_carries_points() {
        let raw = r#"{"type":"calibration_started","points":[{"x":0.5,"y":0.5},{"x":0.1,"y":0.1}],"message":"Waiting for face detection...","is_tune":false}"#;
        let event: BackendEvent = serde_json::from_str(raw).expect("parse");
        match event {
            BackendEvent::CalibrationStarted { points, is_tune, .. } => {
                assert_eq!(points.len(), 2);
                assert!(!is_tune);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
