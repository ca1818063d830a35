pub mod calibration;
pub mod channel;
pub mod commands;
pub mod config;
pub mod controller;
pub mod document;
pub mod frames;
pub mod targeting;

#[cfg(test)]
mod testing;

pub use channel::{Channel, ChannelConnector, WsChannelConnector};
pub use commands::{action_for_phrase, action_for_shortcut, ControllerAction, KeyChord};
pub use config::{load_settings, load_settings_from, Settings};
pub use controller::{Controller, ControllerDeps, ControllerEvent};
pub use document::{HostDocument, LayoutDocument};
pub use frames::{Camera, FrameSource, StillImageCamera};
