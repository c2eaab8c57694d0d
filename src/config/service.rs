//! Service configuration file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::constants::CONFIG_PATH_ENV;
use crate::core::RequestContext;
use crate::sql::MissingMetadataPolicy;

const fn default_max_connections() -> u32 {
    10
}

const fn default_acquire_timeout_secs() -> u64 {
    30
}

/// Top-level configuration.
///
/// # Examples
///
/// ```rust,no_run
/// use namedmaps::config::ServiceConfig;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = ServiceConfig::load().await?;
/// println!("freshness policy: {:?}", config.freshness.missing_metadata);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// User database connections
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Affected-tables freshness
    #[serde(default)]
    pub freshness: FreshnessConfig,
    /// Named map instantiation
    #[serde(default)]
    pub instantiation: InstantiationConfig,
}

/// `[database]` section.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Connection URL with `{user}` standing for the database user.
    #[serde(default)]
    pub url_template: Option<String>,
    /// Pool size per user.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Seconds to wait for a pooled connection.
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url_template: None,
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

// The URL template usually carries a password.
impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url_template", &self.url_template.as_ref().map(|_| "<redacted>"))
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .finish()
    }
}

impl DatabaseConfig {
    /// Connection URL for `user`, if a template is configured.
    #[must_use]
    pub fn url_for(&self, user: &str) -> Option<String> {
        self.url_template.as_ref().map(|template| template.replace("{user}", user))
    }

    /// Pool acquire timeout.
    #[must_use]
    pub const fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

/// `[freshness]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FreshnessConfig {
    /// How tables without a metadata row affect the last-updated time.
    #[serde(default)]
    pub missing_metadata: MissingMetadataPolicy,
}

/// `[instantiation]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstantiationConfig {
    /// Deadline for a whole instantiation, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,
    /// Directory relative template paths are resolved against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates_dir: Option<PathBuf>,
}

impl InstantiationConfig {
    /// Fresh request context carrying the configured deadline, if any.
    #[must_use]
    pub fn request_context(&self) -> RequestContext {
        match self.deadline_ms {
            Some(ms) => RequestContext::new().with_timeout(Duration::from_millis(ms)),
            None => RequestContext::new(),
        }
    }

    /// Resolve a template path given on the command line.
    ///
    /// Paths that exist as given, absolute paths, and paths with no
    /// configured templates directory are returned unchanged.
    #[must_use]
    pub fn resolve_template_path(&self, path: &Path) -> PathBuf {
        match &self.templates_dir {
            Some(dir) if path.is_relative() && !path.exists() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl ServiceConfig {
    /// Load from the environment override or the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined, or if
    /// the file exists but cannot be read or parsed.
    pub async fn load() -> Result<Self> {
        Self::load_with_optional(None).await
    }

    /// Load from `path` when given, otherwise as [`ServiceConfig::load`].
    ///
    /// A file that does not exist yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => Self::resolve_path()?,
        };
        if path.exists() {
            Self::load_from(&path).await
        } else {
            tracing::debug!("No config file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML, or
    /// contains unknown keys.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// The config path from `NAMEDMAPS_CONFIG_PATH`, else the default.
    ///
    /// # Errors
    ///
    /// Returns an error if the default path is needed and the home directory
    /// cannot be determined.
    pub fn resolve_path() -> Result<PathBuf> {
        match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
            _ => Self::default_path(),
        }
    }

    /// Platform default config location.
    ///
    /// - **Windows**: `%LOCALAPPDATA%\namedmaps\config.toml`
    /// - **Unix/macOS**: `~/.namedmaps/config.toml`
    ///
    /// # Errors
    ///
    /// Returns an error if the home (or local data) directory cannot be
    /// determined.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
                .join("namedmaps")
        } else {
            dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
                .join(".namedmaps")
        };

        Ok(config_dir.join("config.toml"))
    }
}
