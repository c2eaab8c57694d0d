//! Core types shared across namedmaps
//!
//! This module forms the foundation of the crate: the error taxonomy every
//! operation reports through, and the request context every delegated call
//! observes.
//!
//! # Modules
//!
//! ## `error` - Error Taxonomy
//!
//! - [`MapsError`] - Closed set of tagged errors, each with an HTTP status
//! - [`ErrorContext`] - User-friendly error wrapper with suggestions and details
//! - [`user_friendly_error`] - Convert any error to user-friendly format
//!
//! ## `request_context` - Request Scope
//!
//! - [`RequestContext`] - Cancellation token, optional deadline, and stage profiler
//! - [`StageTiming`] - One recorded stage duration
//!
//! # Examples
//!
//! ```rust,no_run
//! use namedmaps::core::{MapsError, user_friendly_error};
//!
//! fn run() -> anyhow::Result<()> {
//!     Err(MapsError::validation("template POST data must be of type application/json").into())
//! }
//!
//! if let Err(e) = run() {
//!     user_friendly_error(e).display();
//! }
//! ```

pub mod error;
pub mod request_context;

pub use error::{ErrorContext, MapsError, Result, user_friendly_error};
pub use request_context::{RequestContext, StageTiming};
