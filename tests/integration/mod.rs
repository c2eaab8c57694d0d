//! Integration test suite for namedmaps
//!
//! End-to-end tests that drive the public API and the `namedmaps` binary
//! with in-memory collaborators from `namedmaps::test_utils`.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! RUST_LOG=namedmaps=debug cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **named_maps**: The instantiation pipeline, including cancellation
//! - **affected_tables**: Table and freshness resolution over a scripted runner
//! - **api**: Request parsing and response shaping around real instantiations
//! - **cli**: The `namedmaps` binary
//! - **config**: Configuration file discovery and loading

mod affected_tables;
mod api;
mod cli;
mod config;
mod named_maps;
