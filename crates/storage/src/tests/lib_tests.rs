use super::*;

fn temp_database_url(label: &str) -> (PathBuf, String) {
    let suffix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let temp_root = std::env::temp_dir().join(format!("eyemouse_storage_{label}_{suffix}"));
    let db_path = temp_root.join("nested").join("session.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));
    (temp_root, database_url)
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn fresh_store_is_inactive() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    assert!(!storage.is_active().await.expect("active"));
}

#[tokio::test]
async fn client_id_is_generated_once_and_stays_stable() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let first = storage.client_id().await.expect("client id");
    let second = storage.client_id().await.expect("client id");
    assert_eq!(first, second);
    assert!(first.as_str().starts_with("client_"));
}

#[tokio::test]
async fn active_flag_toggles() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.set_active(true).await.expect("set");
    assert!(storage.is_active().await.expect("active"));
    storage.set_active(false).await.expect("set");
    assert!(!storage.is_active().await.expect("active"));
}

#[tokio::test]
async fn state_survives_reopening_the_database() {
    let (temp_root, database_url) = temp_database_url("reopen");

    let storage = Storage::new(&database_url).await.expect("db");
    let client_id = storage.client_id().await.expect("client id");
    storage.set_active(true).await.expect("set active");
    storage.pool().close().await;
    drop(storage);

    let reopened = Storage::new(&database_url).await.expect("reopen");
    assert_eq!(reopened.client_id().await.expect("client id"), client_id);
    assert!(reopened.is_active().await.expect("active"));
    reopened.pool().close().await;

    std::fs::remove_dir_all(temp_root).expect("cleanup");
}

#[tokio::test]
async fn memory_store_keeps_seeded_identity() {
    let store = MemorySessionStore::with_state(ClientId::new("client_fixed"), true);
    assert_eq!(
        store.client_id().await.expect("client id").as_str(),
        "client_fixed"
    );
    assert!(store.is_active().await.expect("active"));
}

#[test]
fn sqlite_path_ignores_memory_urls() {
    assert!(sqlite_path("sqlite::memory:").is_none());
    assert_eq!(
        sqlite_path("sqlite://./data/eyemouse.db?mode=rwc"),
        Some(PathBuf::from("./data/eyemouse.db"))
    );
}
