//! Error handling for namedmaps
//!
//! This module provides the error taxonomy shared by the instantiation
//! orchestrator, the affected-tables resolver, and the HTTP contract helpers.
//! The error system is designed around two core principles:
//! 1. **Closed, tagged errors** where every variant declares its HTTP status
//! 2. **User-friendly messages** with actionable suggestions for CLI users
//!
//! # Architecture
//!
//! - [`MapsError`] - Enumerated error types for every failure the core can surface
//! - [`ErrorContext`] - Wrapper that adds user-friendly messages and suggestions
//!
//! # Status Mapping
//!
//! | Variant | Status |
//! |---------|--------|
//! | [`MapsError::NotFound`] | 404 |
//! | [`MapsError::Forbidden`], [`MapsError::MalformedToken`] | 403 |
//! | [`MapsError::Validation`], [`MapsError::MissingParameter`], [`MapsError::InvalidParameter`] | 400 |
//! | [`MapsError::AffectedTables`] | 400 |
//! | [`MapsError::Renderer`] | declared status, else 400 |
//! | [`MapsError::Collaborator`] | declared status, else 500 |
//! | [`MapsError::Cancelled`] | 499 |
//! | [`MapsError::DeadlineExceeded`] | 504 |
//!
//! # Examples
//!
//! ```rust,no_run
//! use namedmaps::core::MapsError;
//!
//! let error = MapsError::NotFound {
//!     owner: "bob".to_string(),
//!     template: "missing".to_string(),
//! };
//! assert_eq!(error.status_code(), 404);
//! assert_eq!(error.to_string(), "Template 'missing' of user 'bob' not found");
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

use crate::constants::{
    CLIENT_CLOSED_REQUEST_STATUS, DEADLINE_EXCEEDED_STATUS, DEFAULT_COLLABORATOR_STATUS,
    DEFAULT_ERROR_STATUS,
};

/// Convenience alias used across the crate.
pub type Result<T, E = MapsError> = std::result::Result<T, E>;

/// The main error type for namedmaps operations
///
/// Each variant represents one failure mode of the instantiation protocol or
/// the affected-tables resolver and maps to exactly one HTTP status through
/// [`MapsError::status_code`]. Errors raised by external collaborators are
/// carried through unchanged in [`MapsError::Renderer`] and
/// [`MapsError::Collaborator`] together with whatever status they declared.
///
/// # Examples
///
/// ```rust,no_run
/// use namedmaps::core::MapsError;
///
/// fn describe(error: &MapsError) -> String {
///     match error {
///         MapsError::Forbidden { .. } | MapsError::MalformedToken { .. } => {
///             "credential rejected".to_string()
///         }
///         MapsError::MissingParameter { name } => format!("fill in '{name}'"),
///         other => other.to_string(),
///     }
/// }
/// ```
#[derive(Error, Debug, Clone)]
pub enum MapsError {
    /// Template absent for the requested owner and name
    #[error("Template '{template}' of user '{owner}' not found")]
    NotFound {
        /// Owner namespace that was searched
        owner: String,
        /// Template name that could not be found
        template: String,
    },

    /// Authorization denied
    ///
    /// Raised when the supplied credential does not satisfy the template's
    /// access policy, including when no credential was supplied for a
    /// token-protected template.
    #[error("{reason}")]
    Forbidden {
        /// Human readable denial reason
        reason: String,
    },

    /// Supplied credential is structurally invalid
    ///
    /// Distinct from [`MapsError::Forbidden`] so callers can report the two
    /// cases differently, although both map to 403.
    #[error("Malformed auth token: {reason}")]
    MalformedToken {
        /// Why the token was rejected
        reason: String,
    },

    /// Generic request or template validation failure
    #[error("{message}")]
    Validation {
        /// Description of the validation failure
        message: String,
    },

    /// Placeholder with neither a supplied value nor a default
    #[error("Missing parameter '{name}': no value supplied and template declares no default")]
    MissingParameter {
        /// Placeholder name
        name: String,
    },

    /// Supplied or default value does not satisfy the placeholder type
    #[error("Invalid value for parameter '{name}': {reason}")]
    InvalidParameter {
        /// Placeholder name
        name: String,
        /// Why the value was rejected
        reason: String,
    },

    /// Request body declared a content type other than JSON
    #[error("{message}")]
    InvalidContentType {
        /// Description of the expected content type
        message: String,
    },

    /// Dependency resolution against the database failed or returned nothing
    #[error("{context}: {reason}")]
    AffectedTables {
        /// Which resolution was attempted
        context: String,
        /// Underlying cause message
        reason: String,
    },

    /// Opaque failure reported by the external renderer
    #[error("{message}")]
    Renderer {
        /// Message reported by the renderer
        message: String,
        /// Status declared by the renderer, if any
        status: Option<u16>,
    },

    /// Failure reported by another external collaborator
    ///
    /// Covers the template store, the map-key lookup, and surrogate-key
    /// tagging.
    #[error("{collaborator} failed: {message}")]
    Collaborator {
        /// Collaborator that failed (e.g. "template store")
        collaborator: String,
        /// Message reported by the collaborator
        message: String,
        /// Status declared by the collaborator, if any
        status: Option<u16>,
    },

    /// Caller cancelled the request before completion
    #[error("Request cancelled during {stage}")]
    Cancelled {
        /// Stage that was interrupted
        stage: String,
    },

    /// Request ran past its deadline
    #[error("Request deadline exceeded during {stage}")]
    DeadlineExceeded {
        /// Stage that was interrupted
        stage: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error
        message: String,
    },

    /// JSON (de)serialization error
    #[error("Invalid JSON: {message}")]
    Json {
        /// Message reported by `serde_json`
        message: String,
    },
}

impl MapsError {
    /// HTTP status equivalent for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound {
                ..
            } => 404,
            Self::Forbidden {
                ..
            }
            | Self::MalformedToken {
                ..
            } => 403,
            Self::Renderer {
                status,
                ..
            } => status.unwrap_or(DEFAULT_ERROR_STATUS),
            Self::Collaborator {
                status,
                ..
            } => status.unwrap_or(DEFAULT_COLLABORATOR_STATUS),
            Self::Cancelled {
                ..
            } => CLIENT_CLOSED_REQUEST_STATUS,
            Self::DeadlineExceeded {
                ..
            } => DEADLINE_EXCEEDED_STATUS,
            Self::Config {
                ..
            } => 500,
            Self::Validation {
                ..
            }
            | Self::MissingParameter {
                ..
            }
            | Self::InvalidParameter {
                ..
            }
            | Self::InvalidContentType {
                ..
            }
            | Self::AffectedTables {
                ..
            }
            | Self::Json {
                ..
            } => DEFAULT_ERROR_STATUS,
        }
    }

    /// Shorthand for a [`MapsError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Shorthand for a [`MapsError::Collaborator`] without a declared status.
    pub fn collaborator(collaborator: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Collaborator {
            collaborator: collaborator.into(),
            message: message.to_string(),
            status: None,
        }
    }

    /// Whether the error came from an authorization decision.
    #[must_use]
    pub const fn is_authorization(&self) -> bool {
        matches!(
            self,
            Self::Forbidden {
                ..
            } | Self::MalformedToken {
                ..
            }
        )
    }
}

impl From<serde_json::Error> for MapsError {
    fn from(error: serde_json::Error) -> Self {
        Self::Json {
            message: error.to_string(),
        }
    }
}

/// Error context wrapper that provides user-friendly error information
///
/// Used by the CLI to print an error together with optional details and a
/// suggestion.
///
/// # Examples
///
/// ```rust,no_run
/// use namedmaps::core::{ErrorContext, MapsError};
///
/// let context = ErrorContext::new(MapsError::MissingParameter { name: "color".into() })
///     .with_suggestion("Pass --params '{\"color\": \"red\"}'")
///     .with_details("The template declares no default for this placeholder");
///
/// context.display();
/// ```
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: MapsError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context with no suggestion or details.
    #[must_use]
    pub const fn new(error: MapsError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Display the error context to stderr with terminal colors
    ///
    /// - Error message: Red and bold
    /// - Details: Yellow
    /// - Suggestion: Green
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error to a user-friendly [`ErrorContext`] with actionable suggestions
///
/// Recognizes [`MapsError`], [`std::io::Error`], and [`serde_json::Error`];
/// anything else is wrapped as a generic validation message carrying the
/// full `anyhow` context chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(maps_error) = error.downcast_ref::<MapsError>() {
        return create_error_context(maps_error.clone());
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        let context = ErrorContext::new(MapsError::Config {
            message: io_error.to_string(),
        });
        return match io_error.kind() {
            std::io::ErrorKind::NotFound => context
                .with_suggestion("Check that the file exists and the path is correct"),
            std::io::ErrorKind::PermissionDenied => {
                context.with_suggestion("Check the file permissions and ownership")
            }
            _ => context,
        };
    }

    if let Some(json_error) = error.downcast_ref::<serde_json::Error>() {
        return ErrorContext::new(MapsError::Json {
            message: json_error.to_string(),
        })
        .with_suggestion("Check the JSON syntax of the input");
    }

    ErrorContext::new(MapsError::Validation {
        message: format!("{error:#}"),
    })
}

fn create_error_context(error: MapsError) -> ErrorContext {
    match &error {
        MapsError::NotFound {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Check the template name and owner (format: [owner@]name)"),
        MapsError::Forbidden {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Supply one of the template's valid tokens with --token"),
        MapsError::MalformedToken {
            ..
        } => ErrorContext::new(error)
            .with_details("Tokens must be non-blank printable text without whitespace"),
        MapsError::MissingParameter {
            name,
        } => {
            let suggestion = format!("Pass a value with --params '{{\"{name}\": ...}}'");
            ErrorContext::new(error).with_suggestion(suggestion)
        }
        MapsError::AffectedTables {
            ..
        } => ErrorContext::new(error)
            .with_details("The query is analyzed with CDB_QueryTables in the user database")
            .with_suggestion("Check that the SQL is valid and the database is reachable"),
        MapsError::Config {
            ..
        } => ErrorContext::new(error).with_suggestion(format!(
            "Check the configuration file or set {}",
            crate::constants::CONFIG_PATH_ENV
        )),
        _ => ErrorContext::new(error),
    }
}
