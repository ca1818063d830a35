use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tokio::sync::Mutex;
use tracing::info;

use shared::domain::ClientId;

const KEY_ACTIVE: &str = "active";
const KEY_CLIENT_ID: &str = "client_id";

/// Installation-scoped state that outlives any single page or channel.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the stable client identifier, generating it on first use.
    async fn client_id(&self) -> Result<ClientId>;
    async fn is_active(&self) -> Result<bool>;
    async fn set_active(&self, active: bool) -> Result<()>;
}

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid session database url '{database_url}'"))?
            .create_if_missing(true);
        // Every pooled connection to an in-memory database sees its own empty schema.
        let pool_options = if is_memory_url(database_url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(2)
        };
        let pool = pool_options.connect_with(connect_options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>> {
        sqlx::query_scalar("SELECT value FROM session_state WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to read session key '{key}'"))
    }

    async fn put_value(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO session_state (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to write session key '{key}'"))?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for Storage {
    async fn client_id(&self) -> Result<ClientId> {
        let candidate = ClientId::generate();
        let inserted = sqlx::query("INSERT OR IGNORE INTO session_state (key, value) VALUES (?, ?)")
            .bind(KEY_CLIENT_ID)
            .bind(candidate.as_str())
            .execute(&self.pool)
            .await
            .context("failed to initialize client id")?
            .rows_affected();
        if inserted > 0 {
            info!(client_id = %candidate, "session: generated installation client id");
        }

        let stored = self
            .get_value(KEY_CLIENT_ID)
            .await?
            .context("client id missing after initialization")?;
        Ok(ClientId::new(stored))
    }

    async fn is_active(&self) -> Result<bool> {
        Ok(self
            .get_value(KEY_ACTIVE)
            .await?
            .map(|value| value == "true")
            .unwrap_or(false))
    }

    async fn set_active(&self, active: bool) -> Result<()> {
        self.put_value(KEY_ACTIVE, if active { "true" } else { "false" })
            .await
    }
}

/// Process-local store for hosts without durable storage.
#[derive(Default)]
pub struct MemorySessionStore {
    inner: Mutex<MemorySessionState>,
}

#[derive(Default)]
struct MemorySessionState {
    client_id: Option<ClientId>,
    active: bool,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(client_id: ClientId, active: bool) -> Self {
        Self {
            inner: Mutex::new(MemorySessionState {
                client_id: Some(client_id),
                active,
            }),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn client_id(&self) -> Result<ClientId> {
        let mut guard = self.inner.lock().await;
        Ok(guard.client_id.get_or_insert_with(ClientId::generate).clone())
    }

    async fn is_active(&self) -> Result<bool> {
        Ok(self.inner.lock().await.active)
    }

    async fn set_active(&self, active: bool) -> Result<()> {
        self.inner.lock().await.active = active;
        Ok(())
    }
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.starts_with("sqlite::memory:") || database_url.contains("mode=memory")
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if is_memory_url(database_url) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
