//! Camera capture and mode-tagged frame streaming, paced by the display refresh.

use std::{io::Cursor, path::PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{codecs::jpeg::JpegEncoder, RgbImage};
use shared::{domain::Mode, error::ControllerError, protocol::ClientCommand};
use tracing::{debug, info};

pub trait FrameSource: Send {
    /// Current camera frame, or `None` when no new frame is ready yet.
    fn capture(&mut self) -> anyhow::Result<Option<RgbImage>>;
}

#[async_trait]
pub trait Camera: Send + Sync {
    /// Acquires the capture device; denial maps to `ControllerError::Permission`.
    async fn acquire(&self) -> Result<Box<dyn FrameSource>, ControllerError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStream {
    Calibration,
    Tracking,
}

/// Snapshot of the flags each stream re-checks on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamGate {
    pub active: bool,
    pub calibrated: bool,
    pub mode: Mode,
    pub calibration_running: bool,
}

impl FrameStream {
    pub fn may_continue(self, gate: &StreamGate) -> bool {
        match self {
            FrameStream::Calibration => {
                gate.active && gate.calibration_running && gate.mode.streams_calibration_frames()
            }
            FrameStream::Tracking => {
                gate.active && gate.calibrated && gate.mode.streams_tracking_frames()
            }
        }
    }

    fn command(self, frame: String) -> ClientCommand {
        match self {
            FrameStream::Calibration => ClientCommand::CalibrationFrame { frame },
            FrameStream::Tracking => ClientCommand::TrackGaze { frame },
        }
    }
}

pub struct FramePipeline {
    source: Option<Box<dyn FrameSource>>,
    stream: Option<FrameStream>,
    quality: u8,
}

impl FramePipeline {
    pub fn new(quality: u8) -> Self {
        Self {
            source: None,
            stream: None,
            quality: quality.clamp(1, 100),
        }
    }

    pub fn attach_source(&mut self, source: Box<dyn FrameSource>) {
        self.source = Some(source);
    }

    pub fn release_source(&mut self) {
        self.stream = None;
        if self.source.take().is_some() {
            debug!("frames: capture device released");
        }
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn active_stream(&self) -> Option<FrameStream> {
        self.stream
    }

    pub fn start_calibration_stream(&mut self) {
        self.start(FrameStream::Calibration);
    }

    pub fn start_tracking_stream(&mut self) {
        self.start(FrameStream::Tracking);
    }

    /// Replaces whichever stream was running; only one exists at a time.
    fn start(&mut self, stream: FrameStream) {
        if self.stream != Some(stream) {
            info!(?stream, previous = ?self.stream, "frames: stream started");
        }
        self.stream = Some(stream);
    }

    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            debug!(?stream, "frames: stream stopped");
        }
    }

    /// One display tick. A stream whose gate has closed terminates itself here.
    pub fn next_frame(&mut self, gate: &StreamGate) -> Result<Option<ClientCommand>, ControllerError> {
        let Some(stream) = self.stream else {
            return Ok(None);
        };
        if !stream.may_continue(gate) {
            debug!(?stream, mode = %gate.mode, "frames: stream gate closed");
            self.stream = None;
            return Ok(None);
        }
        let Some(source) = self.source.as_mut() else {
            self.stream = None;
            return Ok(None);
        };
        let Some(frame) = source
            .capture()
            .map_err(|err| ControllerError::Encode(err.to_string()))?
        else {
            return Ok(None);
        };
        let encoded = encode_frame(&frame, self.quality)?;
        Ok(Some(stream.command(encoded)))
    }
}

/// JPEG still as a `data:` URL.
pub fn encode_frame(frame: &RgbImage, quality: u8) -> Result<String, ControllerError> {
    let mut buffer = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .encode_image(frame)
        .map_err(|err| ControllerError::Encode(err.to_string()))?;
    Ok(format!(
        "data:image/jpeg;base64,{}",
        STANDARD.encode(buffer.into_inner())
    ))
}

/// Camera backed by a still image on disk; every capture yields the same frame.
pub struct StillImageCamera {
    path: PathBuf,
}

impl StillImageCamera {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Camera for StillImageCamera {
    async fn acquire(&self) -> Result<Box<dyn FrameSource>, ControllerError> {
        let frame = image::open(&self.path)
            .with_context(|| format!("failed to open frame image '{}'", self.path.display()))
            .map_err(|err| ControllerError::Permission(format!("{err:#}")))?
            .to_rgb8();
        Ok(Box::new(StillFrameSource { frame }))
    }
}

pub struct StillFrameSource {
    frame: RgbImage,
}

impl StillFrameSource {
    pub fn new(frame: RgbImage) -> Self {
        Self { frame }
    }
}

impl FrameSource for StillFrameSource {
    fn capture(&mut self) -> anyhow::Result<Option<RgbImage>> {
        Ok(Some(self.frame.clone()))
    }
}

#[cfg(test)]
#[path = "tests/frames_tests.rs"]
mod tests;
