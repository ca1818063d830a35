//! In-process fakes for the controller's collaborators.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex, MutexGuard,
};

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use shared::{
    domain::ClientId,
    error::ControllerError,
    protocol::{BackendEvent, ClientCommand},
};
use tokio::sync::mpsc;

use crate::{
    channel::{poll_queue, Channel, ChannelConnector},
    frames::{Camera, FrameSource, StillFrameSource},
};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Wire {
    Connected(ClientId),
    Sent(ClientCommand),
    Closed,
}

#[derive(Default)]
pub(crate) struct FakeBackend {
    wire: Mutex<Vec<Wire>>,
    greeting: Mutex<Vec<BackendEvent>>,
    inbound: Mutex<Option<mpsc::UnboundedSender<BackendEvent>>>,
    refuse_connections: AtomicBool,
    fail_sends: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl FakeBackend {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn refusing() -> Arc<Self> {
        let backend = Self::default();
        backend.refuse_connections.store(true, Ordering::SeqCst);
        Arc::new(backend)
    }

    /// Events delivered right after the next connection opens.
    pub(crate) fn greet_with(&self, events: Vec<BackendEvent>) {
        *lock(&self.greeting) = events;
    }

    pub(crate) fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    pub(crate) fn push(&self, event: BackendEvent) {
        if let Some(inbound) = lock(&self.inbound).as_ref() {
            let _ = inbound.send(event);
        }
    }

    /// Backend side hangs up; already queued events stay readable.
    pub(crate) fn disconnect(&self) {
        lock(&self.inbound).take();
    }

    pub(crate) fn wire(&self) -> Vec<Wire> {
        lock(&self.wire).clone()
    }

    pub(crate) fn sent(&self) -> Vec<ClientCommand> {
        self.wire()
            .into_iter()
            .filter_map(|entry| match entry {
                Wire::Sent(command) => Some(command),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn count(&self, name: &str) -> usize {
        self.sent()
            .iter()
            .filter(|command| command.name() == name)
            .count()
    }

    pub(crate) fn frames_sent(&self) -> usize {
        self.sent().iter().filter(|command| command.is_frame()).count()
    }

    pub(crate) fn connections(&self) -> usize {
        self.wire()
            .iter()
            .filter(|entry| matches!(entry, Wire::Connected(_)))
            .count()
    }
}

pub(crate) struct FakeConnector(pub(crate) Arc<FakeBackend>);

#[async_trait]
impl ChannelConnector for FakeConnector {
    async fn connect(&self, client_id: &ClientId) -> Result<Box<dyn Channel>, ControllerError> {
        let backend = Arc::clone(&self.0);
        if backend.refuse_connections.load(Ordering::SeqCst) {
            return Err(ControllerError::Connection("connection refused".into()));
        }
        lock(&backend.wire).push(Wire::Connected(client_id.clone()));

        let (tx, rx) = mpsc::unbounded_channel();
        for event in lock(&backend.greeting).drain(..) {
            let _ = tx.send(event);
        }
        *lock(&backend.inbound) = Some(tx);
        Ok(Box::new(FakeChannel {
            backend,
            events: rx,
        }))
    }
}

struct FakeChannel {
    backend: Arc<FakeBackend>,
    events: mpsc::UnboundedReceiver<BackendEvent>,
}

#[async_trait]
impl Channel for FakeChannel {
    async fn send(&mut self, command: &ClientCommand) -> Result<(), ControllerError> {
        if self.backend.fail_sends.load(Ordering::SeqCst) {
            return Err(ControllerError::Transport("broken pipe".into()));
        }
        lock(&self.backend.wire).push(Wire::Sent(command.clone()));
        Ok(())
    }

    async fn recv(&mut self) -> Option<BackendEvent> {
        self.events.recv().await
    }

    fn try_recv(&mut self) -> Result<Option<BackendEvent>, ControllerError> {
        poll_queue(&mut self.events)
    }

    async fn close(&mut self) {
        lock(&self.backend.wire).push(Wire::Closed);
        lock(&self.backend.inbound).take();
    }
}

#[derive(Default)]
pub(crate) struct FakeCamera {
    deny: bool,
    acquisitions: AtomicUsize,
}

impl FakeCamera {
    pub(crate) fn granting() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn denying() -> Arc<Self> {
        Arc::new(Self {
            deny: true,
            acquisitions: AtomicUsize::new(0),
        })
    }

    pub(crate) fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Camera for FakeCamera {
    async fn acquire(&self) -> Result<Box<dyn FrameSource>, ControllerError> {
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        if self.deny {
            return Err(ControllerError::Permission("NotAllowedError".into()));
        }
        Ok(Box::new(StillFrameSource::new(RgbImage::from_pixel(
            8,
            8,
            Rgb([200, 180, 160]),
        ))))
    }
}
