use namedmaps::config::ServiceConfig;
use namedmaps::constants::CONFIG_PATH_ENV;
use namedmaps::sql::MissingMetadataPolicy;
use serial_test::serial;
use tempfile::TempDir;

/// Restores the config override variable when dropped.
struct EnvGuard {
    previous: Option<std::ffi::OsString>,
}

impl EnvGuard {
    fn set(value: &std::path::Path) -> Self {
        let previous = std::env::var_os(CONFIG_PATH_ENV);
        // SAFETY: tests touching the environment are serialized.
        unsafe { std::env::set_var(CONFIG_PATH_ENV, value) };
        Self {
            previous,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        // SAFETY: see `EnvGuard::set`.
        unsafe {
            match &self.previous {
                Some(value) => std::env::set_var(CONFIG_PATH_ENV, value),
                None => std::env::remove_var(CONFIG_PATH_ENV),
            }
        }
    }
}

#[tokio::test]
#[serial]
async fn test_env_override_is_loaded() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("service.toml");
    tokio::fs::write(
        &path,
        r#"
[database]
url_template = "postgres://{user}@localhost/{user}_db"
max_connections = 4

[freshness]
missing_metadata = "unknown"

[instantiation]
deadline_ms = 1500
"#,
    )
    .await
    .unwrap();
    let _guard = EnvGuard::set(&path);

    assert_eq!(ServiceConfig::resolve_path().unwrap(), path);

    let config = ServiceConfig::load().await.unwrap();
    assert_eq!(config.database.max_connections, 4);
    assert_eq!(config.database.acquire_timeout_secs, 30);
    assert_eq!(
        config.database.url_for("alice").as_deref(),
        Some("postgres://alice@localhost/alice_db")
    );
    assert_eq!(config.freshness.missing_metadata, MissingMetadataPolicy::Unknown);
    assert!(config.instantiation.request_context().deadline().is_some());
}

#[tokio::test]
#[serial]
async fn test_env_override_to_missing_file_gives_defaults() {
    let temp = TempDir::new().unwrap();
    let _guard = EnvGuard::set(&temp.path().join("nowhere.toml"));

    let config = ServiceConfig::load().await.unwrap();
    assert_eq!(config, ServiceConfig::default());
}

#[tokio::test]
#[serial]
async fn test_explicit_path_wins_over_env() {
    let temp = TempDir::new().unwrap();
    let env_path = temp.path().join("env.toml");
    let explicit = temp.path().join("explicit.toml");
    tokio::fs::write(&env_path, "[instantiation]\ndeadline_ms = 1\n").await.unwrap();
    tokio::fs::write(&explicit, "[instantiation]\ndeadline_ms = 2\n").await.unwrap();
    let _guard = EnvGuard::set(&env_path);

    let config = ServiceConfig::load_with_optional(Some(explicit)).await.unwrap();
    assert_eq!(config.instantiation.deadline_ms, Some(2));
}

#[tokio::test]
#[serial]
async fn test_unknown_section_is_rejected() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("bad.toml");
    tokio::fs::write(&path, "[renderer]\nhost = \"localhost\"\n").await.unwrap();
    let _guard = EnvGuard::set(&path);

    let err = ServiceConfig::load().await.unwrap_err();
    assert!(format!("{err:#}").contains("Failed to parse config"));
}
