//! namedmaps - Named map templates and affected-tables resolution
//!
//! The core of a map tile server's named map support: stored, parameterized
//! layergroup templates that callers instantiate by name, and the
//! dependency analysis that tells a caching layer which tables a layer's
//! SQL reads and when they last changed.
//!
//! # Architecture Overview
//!
//! ```text
//! request ──► NamedMapsService
//!               1. TemplateStore::get_template      (404 if absent)
//!               2. authorize                        (403 if rejected)
//!               3. instantiate + fingerprint        (400 on bad params)
//!               4. MapKeyLookup + LayergroupRenderer
//!               5. public id + SurrogateKeys::tag
//!
//! layer SQL ──► sanitize ──► QueryTablesApi ──► QueryRunner (user DB)
//!                              tables, lastUpdatedTime
//! ```
//!
//! Everything that talks to the outside world (template storage, rendering,
//! API keys, cache tagging, SQL execution) is an `async` trait the embedding
//! server implements. The crate itself holds no state between requests.
//!
//! # Core Modules
//!
//! - [`sql`] - Renderer-token sanitizer and the affected-tables resolver
//! - [`template`] - Template model, access policy, instantiation, fingerprints
//! - [`named_maps`] - The instantiation pipeline and its collaborator traits
//! - [`api`] - HTTP request parsing and response shaping, framework-agnostic
//! - [`core`] - Error taxonomy and request context (cancellation, deadlines)
//!
//! ## Supporting Modules
//! - [`config`] - TOML configuration (`~/.namedmaps/config.toml`)
//! - [`cli`] - The `namedmaps` command-line tool
//! - `database` - `sqlx` Postgres [`sql::QueryRunner`] (feature `database`)
//!
//! # Public Layergroup Ids
//!
//! An instantiated named map is identified as
//! `{owner}@{fingerprint[..8]}@{renderer id}`. The fingerprint is the
//! SHA-256 of the template's canonical JSON, so editing a template changes
//! the ids minted from it and stale cache entries are never reused.
//!
//! # Command-Line Usage
//!
//! ```bash
//! namedmaps validate parcels.json
//! namedmaps fingerprint parcels.json
//! namedmaps instantiate parcels.json --owner alice --params '{"color":"#f00"}'
//! namedmaps sanitize 'SELECT * FROM roads WHERE the_geom && !bbox!'
//! namedmaps affected-tables --user alice --sql 'SELECT * FROM roads' --last-updated
//! ```

// Core functionality modules
pub mod core;
pub mod named_maps;
pub mod sql;
pub mod template;

// Outer surfaces
pub mod api;
pub mod cli;
pub mod config;

// Supporting modules
pub mod constants;

#[cfg(feature = "database")]
pub mod database;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
