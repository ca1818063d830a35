//! Multi-phase calibration and tuning sequence driven by backend events.
//!
//! Calibration (5 fixed points) and tuning (10 backend-chosen points) share one
//! state graph:
//!
//! ```text
//! Idle --begin--> AwaitingFaceLock --calibration_started--> Running(point 0, pulse)
//! Running: point_start(i) -> pulse(i) -> capture(i) -> ... -> complete -> Idle
//! ```
//!
//! Face countdown events are honoured until the first point starts pulsing,
//! since the backend announces the plan before it gates on face lock.

use std::f64::consts::TAU;

use shared::{
    domain::{CalibrationKind, NormalizedPoint},
    error::ControllerError,
    protocol::{BackendEvent, ClientCommand},
};
use tracing::{debug, info, warn};

const PULSE_BASE_RADIUS: f64 = 18.0;
const PULSE_AMPLITUDE: f64 = 6.0;
const PULSE_CYCLES: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointPhase {
    Countdown { progress: f64 },
    Pulse { progress: f64 },
    Capture { progress: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationPlan {
    pub kind: CalibrationKind,
    pub points: Vec<NormalizedPoint>,
    pub index: usize,
    pub phase: PointPhase,
    pub message: Option<String>,
    pulse_started: bool,
}

impl CalibrationPlan {
    pub fn current_point(&self) -> Option<NormalizedPoint> {
        self.points.get(self.index).copied()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationState {
    Idle,
    AwaitingFaceLock {
        kind: CalibrationKind,
        progress: f64,
        message: Option<String>,
    },
    Running(CalibrationPlan),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    Reported(String),
    Unspecified,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalibrationOutcome {
    Completed {
        kind: CalibrationKind,
        samples: u32,
    },
    Aborted {
        kind: CalibrationKind,
        reason: AbortReason,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Continue,
    Ignored,
    Finished(CalibrationOutcome),
}

/// What the calibration overlay should draw this frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationOverlay {
    pub kind: CalibrationKind,
    pub point: Option<NormalizedPoint>,
    pub index: usize,
    pub total: usize,
    pub visual: OverlayVisual,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OverlayVisual {
    FaceCountdown {
        progress: f64,
        message: Option<String>,
    },
    Pulse {
        radius: f64,
    },
    CaptureRing {
        remaining: f64,
    },
}

pub fn pulse_radius(progress: f64) -> f64 {
    PULSE_BASE_RADIUS + PULSE_AMPLITUDE * (progress * PULSE_CYCLES * TAU).sin()
}

#[derive(Debug)]
pub struct CalibrationMachine {
    state: CalibrationState,
}

impl Default for CalibrationMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl CalibrationMachine {
    pub fn new() -> Self {
        Self {
            state: CalibrationState::Idle,
        }
    }

    pub fn state(&self) -> &CalibrationState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == CalibrationState::Idle
    }

    pub fn kind(&self) -> Option<CalibrationKind> {
        match &self.state {
            CalibrationState::Idle => None,
            CalibrationState::AwaitingFaceLock { kind, .. } => Some(*kind),
            CalibrationState::Running(plan) => Some(plan.kind),
        }
    }

    /// Local start command. Tuning is refused before any successful calibration,
    /// in which case nothing changes and no command is produced.
    pub fn begin(
        &mut self,
        kind: CalibrationKind,
        calibrated: bool,
    ) -> Result<ClientCommand, ControllerError> {
        if kind == CalibrationKind::Tune && !calibrated {
            return Err(ControllerError::NotCalibrated);
        }
        if let Some(previous) = self.kind() {
            info!(?previous, ?kind, "calibration: restarting sequence");
        }
        self.state = CalibrationState::AwaitingFaceLock {
            kind,
            progress: 0.0,
            message: None,
        };
        Ok(match kind {
            CalibrationKind::Calibration => ClientCommand::StartCalibration,
            CalibrationKind::Tune => ClientCommand::StartTune,
        })
    }

    pub fn abandon(&mut self) {
        if !self.is_idle() {
            debug!("calibration: abandoned");
        }
        self.state = CalibrationState::Idle;
    }

    pub fn apply(&mut self, event: &BackendEvent) -> Step {
        match event {
            BackendEvent::CalibrationStarted {
                points,
                message,
                is_tune,
            } => self.on_started(points, message.clone(), *is_tune),
            BackendEvent::CalibrationFaceCountdown { progress, message } => {
                self.on_face_countdown(clamp_progress(*progress), message.clone())
            }
            BackendEvent::CalibrationPointStart { index, .. } => self.on_point_start(*index),
            BackendEvent::CalibrationPulse { progress } => self.on_pulse(clamp_progress(*progress)),
            BackendEvent::CalibrationCapture { progress } => {
                self.on_capture(clamp_progress(*progress))
            }
            BackendEvent::CalibrationComplete {
                success,
                samples,
                error,
                ..
            } => self.on_complete(*success, *samples, error.clone()),
            _ => Step::Ignored,
        }
    }

    fn on_started(
        &mut self,
        points: &[NormalizedPoint],
        message: Option<String>,
        is_tune: bool,
    ) -> Step {
        let CalibrationState::AwaitingFaceLock { kind, .. } = self.state else {
            debug!("calibration: ignoring calibration_started outside face lock");
            return Step::Ignored;
        };
        if is_tune != (kind == CalibrationKind::Tune) {
            warn!(?kind, is_tune, "calibration: backend plan kind differs from request");
        }
        if points.is_empty() {
            self.state = CalibrationState::Idle;
            return Step::Finished(CalibrationOutcome::Aborted {
                kind,
                reason: AbortReason::Reported("backend sent an empty calibration plan".into()),
            });
        }
        if points.len() != kind.expected_points() {
            debug!(
                ?kind,
                points = points.len(),
                "calibration: unexpected point count"
            );
        }
        if let Some(outside) = points.iter().find(|point| !point.is_in_unit_square()) {
            warn!(?outside, "calibration: point outside the viewport");
        }
        info!(?kind, points = points.len(), "calibration: plan received");
        self.state = CalibrationState::Running(CalibrationPlan {
            kind,
            points: points.to_vec(),
            index: 0,
            phase: PointPhase::Pulse { progress: 0.0 },
            message,
            pulse_started: false,
        });
        Step::Continue
    }

    fn on_face_countdown(&mut self, progress: f64, message: Option<String>) -> Step {
        match &mut self.state {
            CalibrationState::AwaitingFaceLock {
                progress: current,
                message: current_message,
                ..
            } => {
                *current = progress;
                *current_message = message;
                Step::Continue
            }
            CalibrationState::Running(plan) if plan.index == 0 && !plan.pulse_started => {
                plan.phase = PointPhase::Countdown { progress };
                plan.message = message;
                Step::Continue
            }
            _ => Step::Ignored,
        }
    }

    fn on_point_start(&mut self, index: usize) -> Step {
        let CalibrationState::Running(plan) = &mut self.state else {
            return Step::Ignored;
        };
        if index >= plan.points.len() {
            warn!(
                index,
                total = plan.points.len(),
                "calibration: point index out of range"
            );
            return Step::Ignored;
        }
        debug!(index, total = plan.points.len(), "calibration: point start");
        plan.index = index;
        plan.phase = PointPhase::Pulse { progress: 0.0 };
        plan.pulse_started = true;
        plan.message = None;
        Step::Continue
    }

    fn on_pulse(&mut self, progress: f64) -> Step {
        let CalibrationState::Running(plan) = &mut self.state else {
            return Step::Ignored;
        };
        match plan.phase {
            PointPhase::Countdown { .. } | PointPhase::Pulse { .. } => {
                plan.phase = PointPhase::Pulse { progress };
                plan.pulse_started = true;
                Step::Continue
            }
            PointPhase::Capture { .. } => Step::Ignored,
        }
    }

    fn on_capture(&mut self, progress: f64) -> Step {
        let CalibrationState::Running(plan) = &mut self.state else {
            return Step::Ignored;
        };
        match plan.phase {
            PointPhase::Pulse { .. } | PointPhase::Capture { .. } => {
                plan.phase = PointPhase::Capture { progress };
                plan.pulse_started = true;
                Step::Continue
            }
            PointPhase::Countdown { .. } => Step::Ignored,
        }
    }

    fn on_complete(&mut self, success: bool, samples: u32, error: Option<String>) -> Step {
        let Some(kind) = self.kind() else {
            debug!("calibration: ignoring completion while idle");
            return Step::Ignored;
        };
        self.state = CalibrationState::Idle;
        let outcome = if success {
            CalibrationOutcome::Completed { kind, samples }
        } else {
            CalibrationOutcome::Aborted {
                kind,
                reason: error
                    .map(AbortReason::Reported)
                    .unwrap_or(AbortReason::Unspecified),
            }
        };
        Step::Finished(outcome)
    }

    pub fn overlay(&self) -> Option<CalibrationOverlay> {
        match &self.state {
            CalibrationState::Idle => None,
            CalibrationState::AwaitingFaceLock {
                kind,
                progress,
                message,
            } => Some(CalibrationOverlay {
                kind: *kind,
                point: None,
                index: 0,
                total: kind.expected_points(),
                visual: OverlayVisual::FaceCountdown {
                    progress: *progress,
                    message: message.clone(),
                },
            }),
            CalibrationState::Running(plan) => Some(CalibrationOverlay {
                kind: plan.kind,
                point: plan.current_point(),
                index: plan.index,
                total: plan.points.len(),
                visual: match plan.phase {
                    PointPhase::Countdown { progress } => OverlayVisual::FaceCountdown {
                        progress,
                        message: plan.message.clone(),
                    },
                    PointPhase::Pulse { progress } => OverlayVisual::Pulse {
                        radius: pulse_radius(progress),
                    },
                    PointPhase::Capture { progress } => OverlayVisual::CaptureRing {
                        remaining: 1.0 - progress,
                    },
                },
            }),
        }
    }
}

fn clamp_progress(progress: f64) -> f64 {
    if progress.is_nan() {
        0.0
    } else {
        progress.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
#[path = "tests/calibration_tests.rs"]
mod tests;
