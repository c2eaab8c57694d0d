//! Named map templates.
//!
//! A named map template is a stored, parameterizable layergroup definition
//! owned by one user. Callers instantiate it by name, optionally supplying
//! an auth token and parameter values; the result is a concrete layergroup
//! configuration ready for the renderer.
//!
//! # Template Format
//!
//! ```json
//! {
//!   "version": "0.0.1",
//!   "name": "parcels_by_color",
//!   "auth": { "method": "token", "valid_tokens": ["s3cret"] },
//!   "placeholders": {
//!     "color": { "type": "css_color", "default": "red" },
//!     "min_area": { "type": "number", "default": 100 }
//!   },
//!   "layergroup": {
//!     "version": "1.0.1",
//!     "layers": [{
//!       "type": "cartodb",
//!       "options": {
//!         "sql": "SELECT * FROM parcels WHERE area > <%= min_area %>",
//!         "cartocss": "#layer { polygon-fill: <%= color %>; }",
//!         "cartocss_version": "2.0.1"
//!       }
//!     }]
//!   }
//! }
//! ```
//!
//! The owner is not part of the template content: it is the namespace the
//! template store files the template under, and it is supplied alongside
//! the template wherever one is needed.
//!
//! # Modules
//!
//! - `auth` - Access policy evaluation ([`authorize`])
//! - `instance` - Parameter substitution ([`instantiate`])
//! - `fingerprint` - Content digests ([`fingerprint`], [`fingerprint_prefix`])
//! - `name` - `[owner@]name` references ([`TemplateRef`])

pub mod auth;
pub mod fingerprint;
pub mod instance;
pub mod name;

pub use auth::authorize;
pub use fingerprint::{fingerprint, fingerprint_prefix};
pub use instance::{Params, instantiate};
pub use name::{TemplateRef, is_valid_template_name};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::TEMPLATE_VERSION;
use crate::core::{MapsError, Result};

/// A stored named map template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    /// Template format version; only `0.0.1` is accepted.
    pub version: String,
    /// Template name, unique within the owner's namespace.
    pub name: String,
    /// Who may instantiate the template.
    pub auth: AuthPolicy,
    /// Declared placeholders, by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub placeholders: BTreeMap<String, Placeholder>,
    /// Layergroup configuration, possibly containing `<%= name %>` references.
    pub layergroup: Value,
    /// Optional preview/view settings, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<Value>,
}

/// How instantiation requests are authorized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum AuthPolicy {
    /// Anyone may instantiate, with or without a token.
    Open,
    /// The caller must present one of `valid_tokens`.
    Token {
        /// Secrets bound to the template
        #[serde(default)]
        valid_tokens: Vec<String>,
    },
}

/// A declared placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placeholder {
    /// How supplied values are checked and escaped.
    #[serde(rename = "type")]
    pub kind: PlaceholderType,
    /// Value used when the caller supplies none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// Placeholder value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderType {
    /// Text embedded inside a single-quoted SQL literal.
    SqlLiteral,
    /// Text embedded inside a double-quoted SQL identifier.
    SqlIdent,
    /// A finite number.
    Number,
    /// A CartoCSS color: a name or `#` hex code.
    CssColor,
}

impl Template {
    /// Parse a template from JSON text.
    ///
    /// # Errors
    ///
    /// [`MapsError::Json`] when the text is not a well-formed template.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Check the structural rules a stored template must satisfy.
    ///
    /// # Errors
    ///
    /// [`MapsError::Validation`] describing the first violated rule, or
    /// [`MapsError::InvalidParameter`] when a declared default does not fit
    /// its placeholder type.
    pub fn validate(&self) -> Result<()> {
        if self.version != TEMPLATE_VERSION {
            return Err(MapsError::validation(format!(
                "Unsupported template version '{}' (expected {TEMPLATE_VERSION})",
                self.version
            )));
        }

        if !is_valid_template_name(&self.name) {
            return Err(MapsError::validation(format!(
                "Invalid template name '{}': must start with a letter and contain only \
                 letters, digits, '_' or '-'",
                self.name
            )));
        }

        if let AuthPolicy::Token {
            valid_tokens,
        } = &self.auth
            && valid_tokens.is_empty()
        {
            return Err(MapsError::validation(format!(
                "Template '{}' uses token authorization but declares no valid tokens",
                self.name
            )));
        }

        for (name, placeholder) in &self.placeholders {
            if !is_valid_placeholder_name(name) {
                return Err(MapsError::validation(format!(
                    "Invalid placeholder name '{name}': must start with a letter or '_' and \
                     contain only letters, digits or '_'"
                )));
            }
            if let Some(default) = &placeholder.default {
                placeholder.kind.coerce(name, default)?;
            }
        }

        if !self.layergroup.is_object() {
            return Err(MapsError::validation(format!(
                "Template '{}' layergroup must be a JSON object",
                self.name
            )));
        }

        Ok(())
    }
}

impl PlaceholderType {
    /// Check `value` against this type and render it for substitution.
    ///
    /// # Errors
    ///
    /// [`MapsError::InvalidParameter`] naming `name` when the value does not
    /// fit the type.
    pub fn coerce(self, name: &str, value: &Value) -> Result<String> {
        let invalid = |reason: String| MapsError::InvalidParameter {
            name: name.to_string(),
            reason,
        };

        let text = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null | Value::Array(_) | Value::Object(_) => {
                return Err(invalid(format!("expected a scalar value, got {value}")));
            }
        };

        match self {
            Self::SqlLiteral => Ok(text.replace('\'', "''")),
            Self::SqlIdent => Ok(text.replace('"', "\"\"")),
            Self::Number => {
                let number: f64 = text
                    .trim()
                    .parse()
                    .map_err(|_| invalid(format!("'{text}' is not a number")))?;
                if number.is_finite() {
                    Ok(number.to_string())
                } else {
                    Err(invalid(format!("'{text}' is not a finite number")))
                }
            }
            Self::CssColor => {
                if !text.is_empty() && text.chars().all(|c| c == '#' || c.is_ascii_alphanumeric())
                {
                    Ok(text)
                } else {
                    Err(invalid(format!("'{text}' is not a valid css color")))
                }
            }
        }
    }
}

/// Placeholder names: a letter or `_`, then letters, digits, or `_`.
#[must_use]
pub fn is_valid_placeholder_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
