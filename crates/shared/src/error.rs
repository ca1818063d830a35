use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Connection,
    Permission,
    NotCalibrated,
    Backend,
    Inactive,
    Transport,
    Storage,
    Encode,
}

/// Failure taxonomy for the interaction controller. Every variant is non-fatal:
/// the controller reports it as transient feedback and settles in a defined mode.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControllerError {
    #[error("failed to connect to gaze backend: {0}")]
    Connection(String),
    #[error("camera access denied: {0}")]
    Permission(String),
    #[error("tuning requires a completed calibration")]
    NotCalibrated,
    #[error("backend reported an error: {0}")]
    Backend(String),
    #[error("controller is not active")]
    Inactive,
    #[error("channel transport failure: {0}")]
    Transport(String),
    #[error("session store failure: {0}")]
    Storage(String),
    #[error("frame encoding failed: {0}")]
    Encode(String),
}

impl ControllerError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ControllerError::Connection(_) => ErrorCode::Connection,
            ControllerError::Permission(_) => ErrorCode::Permission,
            ControllerError::NotCalibrated => ErrorCode::NotCalibrated,
            ControllerError::Backend(_) => ErrorCode::Backend,
            ControllerError::Inactive => ErrorCode::Inactive,
            ControllerError::Transport(_) => ErrorCode::Transport,
            ControllerError::Storage(_) => ErrorCode::Storage,
            ControllerError::Encode(_) => ErrorCode::Encode,
        }
    }

    /// Short status text safe to show the user. Backend detail is never echoed.
    pub fn user_message(&self) -> &'static str {
        match self {
            ControllerError::Connection(_) => {
                "Could not reach the gaze server; check that it is running and retry."
            }
            ControllerError::Permission(_) => "Camera access is required to activate.",
            ControllerError::NotCalibrated => "Please calibrate before tuning.",
            ControllerError::Backend(_) => "The gaze server reported a problem.",
            ControllerError::Inactive => "Activate first.",
            ControllerError::Transport(_) => "Lost connection to the gaze server.",
            ControllerError::Storage(_) => "Could not save session state.",
            ControllerError::Encode(_) => "Could not read a camera frame.",
        }
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        ControllerError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_detail_is_not_part_of_user_message() {
        let err = ControllerError::Backend("Traceback: model.pkl missing".into());
        assert_eq!(err.code(), ErrorCode::Backend);
        assert!(!err.user_message().contains("model.pkl"));
        assert!(err.to_string().contains("model.pkl"));
    }
}
