//! Template access policy.
//!
//! Decides whether a caller may instantiate a template. A wrong or missing
//! credential is an ordinary `Ok(false)`; a credential that is structurally
//! invalid is an error, so callers can report the two cases differently.
//! Token comparison is constant-time.

use subtle::ConstantTimeEq;

use super::{AuthPolicy, Template};
use crate::constants::MAX_AUTH_TOKEN_LEN;
use crate::core::{MapsError, Result};

/// Whether `supplied` permits instantiating `template`.
///
/// - `open` templates authorize any caller, with or without a token.
/// - `token` templates authorize only an exact match with one of their
///   valid tokens. A missing or empty token is unauthorized, not an error.
///
/// # Errors
///
/// [`MapsError::MalformedToken`] when a token-protected template is given a
/// token that is too long or contains whitespace or control characters.
///
/// # Examples
///
/// ```rust
/// use namedmaps::template::{Template, authorize};
///
/// let template = Template::from_json(
///     r#"{"version":"0.0.1","name":"t","auth":{"method":"token","valid_tokens":["S"]},"layergroup":{}}"#,
/// ).unwrap();
///
/// assert!(authorize(&template, Some("S")).unwrap());
/// assert!(!authorize(&template, Some("T")).unwrap());
/// assert!(!authorize(&template, None).unwrap());
/// ```
pub fn authorize(template: &Template, supplied: Option<&str>) -> Result<bool> {
    template.auth.authorize(supplied)
}

impl AuthPolicy {
    /// Evaluate this policy against a supplied token.
    ///
    /// # Errors
    ///
    /// See [`authorize`].
    pub fn authorize(&self, supplied: Option<&str>) -> Result<bool> {
        match self {
            Self::Open => Ok(true),
            Self::Token {
                valid_tokens,
            } => {
                let token = match supplied {
                    None | Some("") => return Ok(false),
                    Some(token) => token,
                };
                check_token_format(token)?;

                // Visit every candidate so timing does not reveal which one matched.
                let matched = valid_tokens.iter().fold(false, |matched, valid| {
                    matched | bool::from(valid.as_bytes().ct_eq(token.as_bytes()))
                });
                Ok(matched)
            }
        }
    }
}

fn check_token_format(token: &str) -> Result<()> {
    if token.len() > MAX_AUTH_TOKEN_LEN {
        return Err(MapsError::MalformedToken {
            reason: format!("longer than {MAX_AUTH_TOKEN_LEN} bytes"),
        });
    }
    if token.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(MapsError::MalformedToken {
            reason: "contains whitespace or control characters".to_string(),
        });
    }
    Ok(())
}
