//! Command-line interface for namedmaps.
//!
//! The CLI exposes the library's offline operations for inspecting and
//! debugging templates and layer SQL, plus the affected-tables resolver
//! when built with the `database` feature.
//!
//! # Available Commands
//!
//! - `sanitize` - Neutralize renderer tokens in SQL
//! - `fingerprint` - Print a template's content digest
//! - `validate` - Check a template file
//! - `instantiate` - Dry-run an instantiation without a renderer
//! - `affected-tables` - Resolve the tables a query reads (needs `database`)
//!
//! # Examples
//!
//! ```bash
//! namedmaps sanitize 'SELECT * FROM roads WHERE the_geom && !bbox!'
//! namedmaps validate templates/parcels.json
//! namedmaps instantiate templates/parcels.json --owner alice --params '{"color":"blue"}'
//! echo 'SELECT * FROM roads' | namedmaps affected-tables --user alice --last-updated
//! ```
//!
//! Each command lives in its own module with an `execute` method that
//! receives the loaded [`ServiceConfig`].

mod affected_tables;
mod fingerprint;
mod instantiate;
mod sanitize;
mod validate;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;

use crate::config::ServiceConfig;
use crate::template::Template;

/// Runtime settings derived from the global flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliConfig {
    /// Log filter directive; `None` disables logging.
    pub log_level: Option<String>,
    /// Explicit configuration file.
    pub config_path: Option<PathBuf>,
}

impl CliConfig {
    /// Install the `tracing` subscriber for this run.
    ///
    /// `RUST_LOG` is honored unless a level was forced by `--verbose`.
    /// Logs go to stderr so command output stays machine-readable.
    pub fn init_logging(&self) {
        let Some(level) = &self.log_level else {
            return;
        };

        let filter = match std::env::var("RUST_LOG") {
            Ok(_) if level != "debug" => EnvFilter::from_default_env(),
            _ => EnvFilter::new(level),
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    }
}

/// Named map template and layer SQL tooling.
#[derive(Parser, Debug)]
#[command(
    name = "namedmaps",
    about = "Named map templates and affected-tables tooling",
    version,
    long_about = "Validate, fingerprint, and dry-run named map templates, and resolve \
                  the tables (and freshness) behind layer SQL."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Disable logging entirely.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the configuration file (default: ~/.namedmaps/config.toml).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replace renderer tokens (!bbox!, !scale_denominator!, ...) with inert SQL.
    Sanitize(sanitize::SanitizeCommand),

    /// Print a template's content fingerprint.
    Fingerprint(fingerprint::FingerprintCommand),

    /// Validate a template file.
    Validate(validate::ValidateCommand),

    /// Instantiate a template locally and print the resulting layergroup.
    Instantiate(instantiate::InstantiateCommand),

    /// Resolve the tables a query depends on.
    AffectedTables(affected_tables::AffectedTablesCommand),
}

impl Cli {
    /// Execute the parsed command line.
    ///
    /// # Errors
    ///
    /// Returns whatever the command failed with; `main` renders it through
    /// [`user_friendly_error`](crate::core::user_friendly_error).
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        config.init_logging();
        self.execute_with_config(config).await
    }

    /// Translate the global flags into a [`CliConfig`].
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            None
        } else {
            Some("warn".to_string())
        };

        CliConfig {
            log_level,
            config_path: self.config.clone(),
        }
    }

    /// Execute with an explicit [`CliConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded or the command
    /// fails.
    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        let settings = ServiceConfig::load_with_optional(config.config_path).await?;
        tracing::debug!(?settings, "Loaded configuration");

        match self.command {
            Commands::Sanitize(cmd) => cmd.execute().await,
            Commands::Fingerprint(cmd) => cmd.execute(&settings).await,
            Commands::Validate(cmd) => cmd.execute(&settings).await,
            Commands::Instantiate(cmd) => cmd.execute(&settings).await,
            Commands::AffectedTables(cmd) => cmd.execute(&settings).await,
        }
    }
}

/// `arg`, or all of stdin when absent.
async fn arg_or_stdin(arg: Option<String>) -> Result<String> {
    match arg {
        Some(value) => Ok(value),
        None => {
            let mut buffer = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buffer)
                .await
                .context("Failed to read SQL from stdin")?;
            Ok(buffer.trim_end().to_string())
        }
    }
}

/// Read and parse a template file, resolving relative paths against the
/// configured templates directory.
async fn read_template(settings: &ServiceConfig, path: &Path) -> Result<Template> {
    let path = settings.instantiation.resolve_template_path(path);
    let text = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read template from {}", path.display()))?;
    Ok(Template::from_json(&text)?)
}
