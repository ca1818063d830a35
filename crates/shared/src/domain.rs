use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! handle_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub u64);
    };
}

handle_newtype!(ElementHandle);

/// Stable per-installation identifier; addresses the backend-held session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    pub fn generate() -> Self {
        Self(format!("client_{}", Uuid::new_v4().simple()))
    }

    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A screen location expressed as viewport fractions in `[0,1]×[0,1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub x: f64,
    pub y: f64,
}

impl NormalizedPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_in_unit_square(&self) -> bool {
        (0.0..=1.0).contains(&self.x) && (0.0..=1.0).contains(&self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GazeSample {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub double_blink: bool,
}

impl GazeSample {
    pub fn point(&self) -> Option<NormalizedPoint> {
        match (self.x, self.y) {
            (Some(x), Some(y)) => Some(NormalizedPoint { x, y }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Inactive,
    Connecting,
    AwaitingModel,
    Calibrating,
    Tuning,
    Tracking,
}

impl Mode {
    pub fn streams_calibration_frames(self) -> bool {
        matches!(self, Mode::Calibrating | Mode::Tuning)
    }

    pub fn streams_tracking_frames(self) -> bool {
        self == Mode::Tracking
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Inactive => "inactive",
            Mode::Connecting => "connecting",
            Mode::AwaitingModel => "awaiting_model",
            Mode::Calibrating => "calibrating",
            Mode::Tuning => "tuning",
            Mode::Tracking => "tracking",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationKind {
    Calibration,
    Tune,
}

impl CalibrationKind {
    pub fn expected_points(self) -> usize {
        match self {
            CalibrationKind::Calibration => 5,
            CalibrationKind::Tune => 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub active: bool,
    pub calibrated: bool,
    pub client_id: ClientId,
}

impl Session {
    pub fn new(client_id: ClientId, active: bool) -> Self {
        Self {
            active,
            calibrated: false,
            client_id,
        }
    }
}
