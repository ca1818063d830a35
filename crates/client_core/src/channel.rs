//! The single persistent, ordered message channel to the gaze backend.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::{stream::SplitSink, SinkExt, StreamExt};
use shared::{
    domain::ClientId,
    error::ControllerError,
    protocol::{BackendEvent, ClientCommand},
};
use tokio::{
    net::TcpStream,
    sync::mpsc::{self, error::TryRecvError},
    task::JoinHandle,
};
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::config::channel_url;

#[async_trait]
pub trait Channel: Send {
    async fn send(&mut self, command: &ClientCommand) -> Result<(), ControllerError>;
    /// Next inbound event in emission order; `None` once the transport has ended.
    async fn recv(&mut self) -> Option<BackendEvent>;
    /// `Ok(None)` when nothing is buffered; an error once the transport has ended.
    fn try_recv(&mut self) -> Result<Option<BackendEvent>, ControllerError>;
    async fn close(&mut self);
}

#[async_trait]
pub trait ChannelConnector: Send + Sync {
    /// Single connection attempt; no retry.
    async fn connect(&self, client_id: &ClientId) -> Result<Box<dyn Channel>, ControllerError>;
}

pub struct WsChannelConnector {
    server_url: String,
}

impl WsChannelConnector {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
        }
    }
}

#[async_trait]
impl ChannelConnector for WsChannelConnector {
    async fn connect(&self, client_id: &ClientId) -> Result<Box<dyn Channel>, ControllerError> {
        let url = channel_url(&self.server_url, client_id)
            .map_err(|err| ControllerError::Connection(err.to_string()))?;
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|err| ControllerError::Connection(format!("{url}: {err}")))?;
        info!(client_id = %client_id, %url, "channel: connected");

        let (writer, mut reader) = ws_stream.split();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let reader_client_id = client_id.clone();
        let reader_task = tokio::spawn(async move {
            while let Some(msg) = reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => match serde_json::from_str::<BackendEvent>(&text) {
                        Ok(event) => {
                            if event_tx.send(event).is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            warn!(client_id = %reader_client_id, "channel: skipping invalid backend event: {err}");
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        error!(client_id = %reader_client_id, "channel: receive failed: {err}");
                        break;
                    }
                }
            }
            debug!(client_id = %reader_client_id, "channel: reader finished");
        });

        Ok(Box::new(WsChannel {
            writer,
            events: event_rx,
            reader_task,
        }))
    }
}

pub(crate) fn channel_closed() -> ControllerError {
    ControllerError::Transport("backend closed the channel".into())
}

/// Non-blocking read of an inbound queue fed by a reader task.
pub(crate) fn poll_queue(
    events: &mut mpsc::UnboundedReceiver<BackendEvent>,
) -> Result<Option<BackendEvent>, ControllerError> {
    match events.try_recv() {
        Ok(event) => Ok(Some(event)),
        Err(TryRecvError::Empty) => Ok(None),
        Err(TryRecvError::Disconnected) => Err(channel_closed()),
    }
}

type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

pub struct WsChannel {
    writer: WsWriter,
    events: mpsc::UnboundedReceiver<BackendEvent>,
    reader_task: JoinHandle<()>,
}

#[async_trait]
impl Channel for WsChannel {
    async fn send(&mut self, command: &ClientCommand) -> Result<(), ControllerError> {
        let json = serde_json::to_string(command)
            .map_err(|err| ControllerError::Transport(err.to_string()))?;
        self.writer
            .send(Message::Text(json))
            .await
            .map_err(|err| ControllerError::Transport(format!("{}: {err}", command.name())))
    }

    async fn recv(&mut self) -> Option<BackendEvent> {
        self.events.recv().await
    }

    fn try_recv(&mut self) -> Result<Option<BackendEvent>, ControllerError> {
        poll_queue(&mut self.events)
    }

    async fn close(&mut self) {
        if let Err(err) = self.writer.close().await {
            debug!("channel: close handshake failed: {err}");
        }
        self.reader_task.abort();
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

/// Owns at most one open channel and the two close disciplines.
pub struct ChannelManager {
    connector: Arc<dyn ChannelConnector>,
    channel: Option<Box<dyn Channel>>,
    stop_grace: Duration,
}

impl ChannelManager {
    pub fn new(connector: Arc<dyn ChannelConnector>, stop_grace: Duration) -> Self {
        Self {
            connector,
            channel: None,
            stop_grace,
        }
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_some()
    }

    pub async fn connect(&mut self, client_id: &ClientId) -> Result<(), ControllerError> {
        if self.channel.is_some() {
            self.soft_close().await;
        }
        let channel = self.connector.connect(client_id).await?;
        self.channel = Some(channel);
        Ok(())
    }

    pub async fn send(&mut self, command: ClientCommand) -> Result<(), ControllerError> {
        let Some(channel) = self.channel.as_mut() else {
            return Err(ControllerError::Inactive);
        };
        channel.send(&command).await
    }

    /// Pending forever while no channel is open, so it can sit in a `select!`.
    pub async fn recv(&mut self) -> Option<BackendEvent> {
        let Some(channel) = self.channel.as_mut() else {
            return futures::future::pending().await;
        };
        let event = channel.recv().await;
        if event.is_none() {
            self.channel = None;
        }
        event
    }

    pub fn try_recv(&mut self) -> Result<Option<BackendEvent>, ControllerError> {
        let Some(channel) = self.channel.as_mut() else {
            return Ok(None);
        };
        let polled = channel.try_recv();
        if polled.is_err() {
            self.channel = None;
        }
        polled
    }

    /// Page navigation: drop the transport, leave backend session state for reuse.
    pub async fn soft_close(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close().await;
            debug!("channel: soft closed");
        }
    }

    /// Explicit deactivation: `stop`, let it flush, then close.
    pub async fn hard_close(&mut self) {
        let Some(mut channel) = self.channel.take() else {
            return;
        };
        if let Err(err) = channel.send(&ClientCommand::Stop).await {
            warn!("channel: failed to send stop before close: {err}");
        }
        tokio::time::sleep(self.stop_grace).await;
        channel.close().await;
        debug!("channel: hard closed");
    }
}

#[cfg(test)]
#[path = "tests/channel_tests.rs"]
mod tests;
