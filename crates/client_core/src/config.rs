use std::{collections::HashMap, fs, path::Path, time::Duration};

use anyhow::{anyhow, Context, Result};
use url::Url;

use shared::domain::ClientId;

pub const SETTINGS_FILE: &str = "eyemouse.toml";

#[derive(Debug, Clone)]
pub struct Settings {
    pub server_url: String,
    pub session_db_url: String,
    pub stop_grace: Duration,
    pub ack_tint: Duration,
    pub resume_delay: Duration,
    pub frame_quality: u8,
    pub refresh_hz: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:8000".into(),
            session_db_url: "sqlite://./data/eyemouse.db".into(),
            stop_grace: Duration::from_millis(100),
            ack_tint: Duration::from_millis(250),
            resume_delay: Duration::from_millis(500),
            frame_quality: 80,
            refresh_hz: 60,
        }
    }
}

impl Settings {
    /// Channel endpoint for one client: `{server}/ws/{client_id}`.
    pub fn channel_url(&self, client_id: &ClientId) -> Result<Url> {
        channel_url(&self.server_url, client_id)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.refresh_hz.max(1)))
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(SETTINGS_FILE) {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, toml::Value>>(&raw) {
            apply_file_overrides(&mut settings, &file_cfg);
        }
    }

    if let Ok(v) = std::env::var("EYEMOUSE_SERVER_URL") {
        settings.server_url = v;
    }
    if let Ok(v) = std::env::var("APP__SERVER_URL") {
        settings.server_url = v;
    }
    if let Ok(v) = std::env::var("APP__SESSION_DB_URL") {
        settings.session_db_url = v;
    }
    if let Some(ms) = env_millis("APP__STOP_GRACE_MS") {
        settings.stop_grace = ms;
    }
    if let Some(ms) = env_millis("APP__ACK_TINT_MS") {
        settings.ack_tint = ms;
    }
    if let Some(ms) = env_millis("APP__RESUME_DELAY_MS") {
        settings.resume_delay = ms;
    }
    if let Ok(v) = std::env::var("APP__FRAME_QUALITY") {
        if let Ok(parsed) = v.parse::<u8>() {
            settings.frame_quality = parsed.clamp(1, 100);
        }
    }
    if let Ok(v) = std::env::var("APP__REFRESH_HZ") {
        if let Ok(parsed) = v.parse::<u32>() {
            settings.refresh_hz = parsed.max(1);
        }
    }

    settings
}

pub fn load_settings_from(path: &Path) -> Result<Settings> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings file '{}'", path.display()))?;
    let file_cfg = toml::from_str::<HashMap<String, toml::Value>>(&raw)
        .with_context(|| format!("invalid settings file '{}'", path.display()))?;
    let mut settings = Settings::default();
    apply_file_overrides(&mut settings, &file_cfg);
    Ok(settings)
}

fn apply_file_overrides(settings: &mut Settings, file_cfg: &HashMap<String, toml::Value>) {
    if let Some(v) = file_cfg.get("server_url").and_then(toml::Value::as_str) {
        settings.server_url = v.to_string();
    }
    if let Some(v) = file_cfg.get("session_db_url").and_then(toml::Value::as_str) {
        settings.session_db_url = v.to_string();
    }
    if let Some(ms) = file_millis(file_cfg, "stop_grace_ms") {
        settings.stop_grace = ms;
    }
    if let Some(ms) = file_millis(file_cfg, "ack_tint_ms") {
        settings.ack_tint = ms;
    }
    if let Some(ms) = file_millis(file_cfg, "resume_delay_ms") {
        settings.resume_delay = ms;
    }
    if let Some(v) = file_cfg.get("frame_quality").and_then(toml::Value::as_integer) {
        settings.frame_quality = v.clamp(1, 100) as u8;
    }
    if let Some(v) = file_cfg.get("refresh_hz").and_then(toml::Value::as_integer) {
        settings.refresh_hz = v.max(1) as u32;
    }
}

fn file_millis(file_cfg: &HashMap<String, toml::Value>, key: &str) -> Option<Duration> {
    file_cfg
        .get(key)
        .and_then(toml::Value::as_integer)
        .filter(|v| *v >= 0)
        .map(|v| Duration::from_millis(v as u64))
}

fn env_millis(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
}

pub fn channel_url(server_url: &str, client_id: &ClientId) -> Result<Url> {
    let server_url = server_url.trim().trim_end_matches('/');
    let ws_url = if let Some(rest) = server_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = server_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if server_url.starts_with("ws://") || server_url.starts_with("wss://") {
        server_url.to_string()
    } else {
        return Err(anyhow!(
            "server_url must start with ws://, wss://, http:// or https://"
        ));
    };

    Url::parse(&format!("{ws_url}/ws/{}", client_id.as_str()))
        .with_context(|| format!("invalid channel url for server '{server_url}'"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
