//! Per-page interaction controller: session lifecycle, mode transitions, and
//! dispatch of inbound backend events.

use std::{future::Future, sync::Arc, time::Instant};

use shared::{
    domain::{CalibrationKind, ElementHandle, Mode, Session},
    error::ControllerError,
    protocol::{BackendEvent, ClientCommand},
};
use storage::SessionStore;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::{
    calibration::{CalibrationMachine, CalibrationOutcome, CalibrationOverlay, Step},
    channel::{channel_closed, ChannelConnector, ChannelManager},
    commands::ControllerAction,
    config::Settings,
    document::HostDocument,
    frames::{Camera, FramePipeline, FrameStream, StreamGate},
    targeting::{SnapTarget, TargetingEngine},
};

#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    ModeChanged(Mode),
    Status(String),
    CalibrationOverlay(Option<CalibrationOverlay>),
    Activated(ElementHandle),
}

pub struct ControllerDeps {
    pub store: Arc<dyn SessionStore>,
    pub connector: Arc<dyn ChannelConnector>,
    pub camera: Arc<dyn Camera>,
    pub document: Arc<dyn HostDocument>,
}

pub struct Controller {
    settings: Settings,
    store: Arc<dyn SessionStore>,
    camera: Arc<dyn Camera>,
    document: Arc<dyn HostDocument>,
    channels: ChannelManager,
    session: Session,
    mode: Mode,
    calibration: CalibrationMachine,
    frames: FramePipeline,
    targeting: TargetingEngine,
    events: broadcast::Sender<ControllerEvent>,
}

impl Controller {
    /// One controller per page context. The in-memory session starts inactive;
    /// the persisted flag is only consulted by [`Controller::on_page_load`].
    pub async fn new(settings: Settings, deps: ControllerDeps) -> Result<Self, ControllerError> {
        let client_id = deps
            .store
            .client_id()
            .await
            .map_err(ControllerError::storage)?;
        let (events, _) = broadcast::channel(256);
        Ok(Self {
            channels: ChannelManager::new(deps.connector, settings.stop_grace),
            frames: FramePipeline::new(settings.frame_quality),
            targeting: TargetingEngine::new(settings.ack_tint),
            calibration: CalibrationMachine::new(),
            session: Session::new(client_id, false),
            mode: Mode::Inactive,
            store: deps.store,
            camera: deps.camera,
            document: deps.document,
            settings,
            events,
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn active_stream(&self) -> Option<FrameStream> {
        self.frames.active_stream()
    }

    pub fn snap_target(&self) -> Option<SnapTarget> {
        self.targeting.target()
    }

    pub fn calibration(&self) -> &CalibrationMachine {
        &self.calibration
    }

    pub fn is_connected(&self) -> bool {
        self.channels.is_open()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    pub async fn perform(&mut self, action: ControllerAction) -> Result<(), ControllerError> {
        debug!(action = action.name(), "controller: action");
        match action {
            ControllerAction::Activate => self.activate().await,
            ControllerAction::Deactivate => self.deactivate().await,
            ControllerAction::Toggle => self.toggle().await,
            ControllerAction::Recalibrate => self.start_calibration().await,
            ControllerAction::Tune => self.tune().await,
        }
    }

    pub async fn toggle(&mut self) -> Result<(), ControllerError> {
        if self.session.active {
            self.deactivate().await
        } else {
            self.activate().await
        }
    }

    pub async fn activate(&mut self) -> Result<(), ControllerError> {
        if self.session.active && self.channels.is_open() {
            debug!("controller: already active");
            return Ok(());
        }
        self.set_mode(Mode::Connecting);

        let source = match self.camera.acquire().await {
            Ok(source) => source,
            Err(err) => return self.abort_activation(err).await,
        };
        self.frames.attach_source(source);

        if let Err(err) = self.channels.connect(&self.session.client_id).await {
            return self.abort_activation(err).await;
        }
        if let Err(err) = self.channels.send(ClientCommand::LoadModel).await {
            return self.abort_activation(err).await;
        }

        self.session.active = true;
        self.persist_active(true).await;
        info!(client_id = %self.session.client_id, "controller: activated");
        self.status("EyeMouse active");
        self.set_mode(Mode::AwaitingModel);
        Ok(())
    }

    async fn abort_activation(&mut self, err: ControllerError) -> Result<(), ControllerError> {
        warn!(error = %err, "controller: activation failed");
        self.channels.soft_close().await;
        self.frames.release_source();
        self.session.active = false;
        self.session.calibrated = false;
        self.persist_active(false).await;
        self.set_mode(Mode::Inactive);
        self.report(&err);
        Err(err)
    }

    /// Explicit user deactivation: the backend is told to release the session.
    pub async fn deactivate(&mut self) -> Result<(), ControllerError> {
        self.halt_local_activity();
        self.channels.hard_close().await;
        self.frames.release_source();
        self.session.active = false;
        self.session.calibrated = false;
        self.persist_active(false).await;
        if self.mode != Mode::Inactive {
            info!(client_id = %self.session.client_id, "controller: deactivated");
            self.status("EyeMouse deactivated");
        }
        self.set_mode(Mode::Inactive);
        Ok(())
    }

    /// Fresh 5-point calibration; discards any existing model on the backend.
    pub async fn start_calibration(&mut self) -> Result<(), ControllerError> {
        self.begin_calibration(CalibrationKind::Calibration).await
    }

    pub async fn tune(&mut self) -> Result<(), ControllerError> {
        self.begin_calibration(CalibrationKind::Tune).await
    }

    async fn begin_calibration(&mut self, kind: CalibrationKind) -> Result<(), ControllerError> {
        if !self.channels.is_open() {
            let err = ControllerError::Inactive;
            self.report(&err);
            return Err(err);
        }
        let command = match self.calibration.begin(kind, self.session.calibrated) {
            Ok(command) => command,
            Err(err) => {
                self.report(&err);
                return Err(err);
            }
        };

        if kind == CalibrationKind::Calibration {
            self.session.calibrated = false;
        }
        self.targeting.reset(self.document.as_ref());
        self.frames.start_calibration_stream();
        self.set_mode(match kind {
            CalibrationKind::Calibration => Mode::Calibrating,
            CalibrationKind::Tune => Mode::Tuning,
        });
        self.emit_overlay();

        if let Err(err) = self.channels.send(command).await {
            self.on_transport_lost(err).await;
            return Err(ControllerError::Inactive);
        }
        info!(?kind, "controller: calibration requested");
        Ok(())
    }

    /// Resumes activation after navigation when the persisted flag says so.
    pub async fn on_page_load(&mut self) -> Result<bool, ControllerError> {
        let persisted = self
            .store
            .is_active()
            .await
            .map_err(ControllerError::storage)?;
        if !persisted {
            return Ok(false);
        }
        tokio::time::sleep(self.settings.resume_delay).await;
        info!(client_id = %self.session.client_id, "controller: resuming after navigation");
        self.activate().await?;
        Ok(true)
    }

    /// Page teardown: soft close keeps the backend session and persisted flag.
    pub async fn on_navigate_away(&mut self) {
        self.halt_local_activity();
        self.channels.soft_close().await;
        self.frames.release_source();
        self.session.calibrated = false;
        self.set_mode(Mode::Inactive);
    }

    async fn on_transport_lost(&mut self, err: ControllerError) {
        warn!(error = %err, "controller: channel lost");
        self.halt_local_activity();
        self.channels.soft_close().await;
        self.frames.release_source();
        self.session.active = false;
        self.session.calibrated = false;
        self.set_mode(Mode::Inactive);
        self.report(&err);
    }

    fn halt_local_activity(&mut self) {
        self.frames.stop();
        if !self.calibration.is_idle() {
            self.calibration.abandon();
            self.emit_overlay();
        }
        self.targeting.reset(self.document.as_ref());
    }

    pub async fn dispatch(&mut self, event: BackendEvent) {
        match event {
            BackendEvent::GazeUpdate { .. } => {
                if self.mode != Mode::Tracking {
                    debug!(mode = %self.mode, "controller: gaze update outside tracking");
                    return;
                }
                let Some(sample) = event.gaze_sample() else {
                    return;
                };
                if let Some(element) =
                    self.targeting
                        .on_gaze_sample(self.document.as_ref(), sample, Instant::now())
                {
                    info!(element = element.0, "controller: element activated");
                    let _ = self.events.send(ControllerEvent::Activated(element));
                }
            }
            BackendEvent::ModelLoaded { success, error } => {
                if self.mode != Mode::AwaitingModel {
                    debug!(mode = %self.mode, "controller: stale model_loaded");
                    return;
                }
                if success {
                    info!("controller: resumed persisted model");
                    self.session.calibrated = true;
                    self.enter_tracking();
                } else {
                    info!(reason = ?error, "controller: no persisted model, calibrating");
                    let _ = self.start_calibration().await;
                }
            }
            BackendEvent::Error { message } => {
                warn!(%message, mode = %self.mode, "controller: backend error");
                self.report(&ControllerError::Backend(message));
            }
            BackendEvent::Stopped { success } => {
                debug!(success, "controller: backend released session");
            }
            calibration_event => match self.calibration.apply(&calibration_event) {
                Step::Continue => self.emit_overlay(),
                Step::Ignored => {
                    debug!(event = calibration_event.kind(), "controller: ignored calibration event");
                }
                Step::Finished(outcome) => self.finish_calibration(outcome),
            },
        }
    }

    fn finish_calibration(&mut self, outcome: CalibrationOutcome) {
        self.emit_overlay();
        match outcome {
            CalibrationOutcome::Completed { kind, samples } => {
                info!(?kind, samples, "controller: calibration complete");
                self.session.calibrated = true;
                self.status(match kind {
                    CalibrationKind::Calibration => "Calibration complete",
                    CalibrationKind::Tune => "Tuning complete",
                });
                self.enter_tracking();
            }
            CalibrationOutcome::Aborted {
                kind: CalibrationKind::Tune,
                reason,
            } => {
                info!(?reason, "controller: tuning aborted, keeping existing model");
                self.session.calibrated = true;
                self.enter_tracking();
            }
            CalibrationOutcome::Aborted { kind, reason } => {
                info!(?kind, ?reason, "controller: calibration aborted");
                self.session.calibrated = false;
                self.frames.stop();
                self.set_mode(Mode::AwaitingModel);
            }
        }
    }

    fn enter_tracking(&mut self) {
        self.set_mode(Mode::Tracking);
        self.frames.start_tracking_stream();
    }

    /// One display refresh: revert expired acknowledgements, send at most one frame.
    pub async fn on_display_frame(&mut self) {
        self.targeting.poll(self.document.as_ref(), Instant::now());

        let gate = self.stream_gate();
        match self.frames.next_frame(&gate) {
            Ok(Some(command)) => {
                if let Err(err) = self.channels.send(command).await {
                    self.on_transport_lost(err).await;
                }
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "controller: dropped frame"),
        }
    }

    /// Dispatches every event already buffered on the channel.
    pub async fn pump(&mut self) {
        loop {
            match self.channels.try_recv() {
                Ok(Some(event)) => self.dispatch(event).await,
                Ok(None) => break,
                Err(err) => {
                    self.on_transport_lost(err).await;
                    break;
                }
            }
        }
    }

    /// Cooperative loop: display ticks, inbound events, and external actions
    /// interleave on one task until `shutdown` resolves.
    pub async fn run(
        &mut self,
        mut actions: mpsc::Receiver<ControllerAction>,
        shutdown: impl Future<Output = ()>,
    ) {
        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(self.settings.refresh_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut actions_open = true;

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => self.on_display_frame().await,
                event = self.channels.recv() => match event {
                    Some(event) => self.dispatch(event).await,
                    None => self.on_transport_lost(channel_closed()).await,
                },
                action = actions.recv(), if actions_open => match action {
                    Some(action) => {
                        let _ = self.perform(action).await;
                    }
                    None => actions_open = false,
                },
            }
        }
    }

    fn stream_gate(&self) -> StreamGate {
        StreamGate {
            active: self.session.active,
            calibrated: self.session.calibrated,
            mode: self.mode,
            calibration_running: !self.calibration.is_idle(),
        }
    }

    fn set_mode(&mut self, mode: Mode) {
        if self.mode == mode {
            return;
        }
        debug!(from = %self.mode, to = %mode, "controller: mode change");
        self.mode = mode;
        let _ = self.events.send(ControllerEvent::ModeChanged(mode));
    }

    fn emit_overlay(&self) {
        let _ = self
            .events
            .send(ControllerEvent::CalibrationOverlay(self.calibration.overlay()));
    }

    fn status(&self, message: &str) {
        let _ = self.events.send(ControllerEvent::Status(message.to_string()));
    }

    fn report(&self, err: &ControllerError) {
        debug!(code = ?err.code(), "controller: surfacing error");
        self.status(err.user_message());
    }

    async fn persist_active(&self, active: bool) {
        if let Err(err) = self.store.set_active(active).await {
            let err = ControllerError::storage(format!("{err:#}"));
            warn!(error = %err, "controller: failed to persist active flag");
            self.report(&err);
        }
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
