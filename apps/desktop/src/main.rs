use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{
    action_for_phrase, load_settings, Controller, ControllerAction, ControllerDeps,
    ControllerEvent, LayoutDocument, StillImageCamera, WsChannelConnector,
};
use storage::Storage;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Headless gaze-interaction runner: a still image stands in for the camera
/// and a JSON layout stands in for the page.
#[derive(Parser, Debug)]
#[command(name = "eyemouse")]
struct Args {
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    session_db: Option<String>,
    /// Image used as every camera frame.
    #[arg(long)]
    frame: PathBuf,
    /// Page layout JSON; an empty 1280x800 page when omitted.
    #[arg(long)]
    layout: Option<PathBuf>,
    /// Spoken phrases to replay after startup, in order.
    #[arg(long = "voice")]
    voice: Vec<String>,
    /// Menu actions to replay after the voice phrases.
    #[arg(long = "action")]
    actions: Vec<ControllerAction>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }
    if let Some(session_db) = args.session_db {
        settings.session_db_url = session_db;
    }

    let store = Storage::new(&settings.session_db_url)
        .await
        .with_context(|| format!("failed to open session store {}", settings.session_db_url))?;
    let document = match &args.layout {
        Some(path) => LayoutDocument::from_json_file(path)?,
        None => LayoutDocument::empty(1280.0, 800.0),
    };

    let deps = ControllerDeps {
        store: Arc::new(store),
        connector: Arc::new(WsChannelConnector::new(settings.server_url.clone())),
        camera: Arc::new(StillImageCamera::new(args.frame)),
        document: Arc::new(document),
    };
    info!(server_url = %settings.server_url, "eyemouse: starting");
    let mut controller = Controller::new(settings, deps).await?;
    tokio::spawn(log_events(controller.subscribe_events()));

    let resumed = match controller.on_page_load().await {
        Ok(resumed) => resumed,
        Err(err) => {
            warn!(error = %err, "eyemouse: could not resume session");
            false
        }
    };
    info!(resumed, client_id = %controller.session().client_id, "eyemouse: page loaded");

    let scripted: Vec<ControllerAction> = args
        .voice
        .iter()
        .filter_map(|phrase| {
            let action = action_for_phrase(phrase);
            if action.is_none() {
                warn!(%phrase, "eyemouse: unrecognised voice command");
            }
            action
        })
        .chain(args.actions)
        .collect();
    let (actions_tx, actions_rx) = mpsc::channel(scripted.len().max(1));
    for action in scripted {
        actions_tx.send(action).await?;
    }
    drop(actions_tx);

    controller
        .run(actions_rx, async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "eyemouse: failed to listen for ctrl-c");
            }
        })
        .await;

    info!("eyemouse: shutting down");
    controller.on_navigate_away().await;
    Ok(())
}

async fn log_events(mut events: broadcast::Receiver<ControllerEvent>) {
    loop {
        match events.recv().await {
            Ok(ControllerEvent::ModeChanged(mode)) => info!(%mode, "mode"),
            Ok(ControllerEvent::Status(message)) => info!(%message, "status"),
            Ok(ControllerEvent::Activated(element)) => info!(element = element.0, "activated"),
            Ok(ControllerEvent::CalibrationOverlay(Some(overlay))) => {
                info!(index = overlay.index, total = overlay.total, visual = ?overlay.visual, "calibration")
            }
            Ok(ControllerEvent::CalibrationOverlay(None)) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event log lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
