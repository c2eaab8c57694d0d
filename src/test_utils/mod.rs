//! Test utilities for namedmaps
//!
//! This module provides in-memory doubles for every external collaborator
//! the core talks to, plus template fixtures and a logging helper.
//!
//! # Doubles
//!
//! - [`MemoryTemplateStore`] - templates keyed by owner and name
//! - [`StaticMapKeys`] - the same API key for every user
//! - [`FakeRenderer`] - records layergroups, answers with a fixed id or error
//! - [`RecordingSurrogateKeys`] - records every tag call
//! - [`FakeQueryRunner`] - records queries, replays scripted rows or errors
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use namedmaps::named_maps::NamedMapsService;
//! use namedmaps::test_utils::{
//!     FakeRenderer, MemoryTemplateStore, RecordingSurrogateKeys, StaticMapKeys, fixtures,
//! };
//!
//! let store = Arc::new(MemoryTemplateStore::new());
//! store.insert("alice", fixtures::open_template("t1"));
//!
//! let service = NamedMapsService::new(
//!     store,
//!     Arc::new(StaticMapKeys::new("key")),
//!     Arc::new(FakeRenderer::new("r1")),
//!     Arc::new(RecordingSurrogateKeys::new()),
//! );
//! ```

pub mod fakes;
pub mod fixtures;

pub use fakes::{
    FakeQueryRunner, FakeRenderer, MemoryTemplateStore, RecordingSurrogateKeys, StaticMapKeys,
};

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has any effect. Uses `level` when given, otherwise
/// `RUST_LOG` if it is set, otherwise leaves logging off.
///
/// ```bash
/// RUST_LOG=namedmaps=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}
