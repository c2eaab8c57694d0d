//! `[owner@]name` template references.

use std::fmt;

use crate::constants::LAYERGROUP_ID_SEPARATOR;
use crate::core::{MapsError, Result};

/// A template reference as it appears in a request path.
///
/// # Examples
///
/// ```rust
/// use namedmaps::template::TemplateRef;
///
/// let reference = TemplateRef::parse("alice@parcels").unwrap();
/// assert_eq!(reference.owner_or("bob"), "alice");
///
/// let reference = TemplateRef::parse("parcels").unwrap();
/// assert_eq!(reference.owner_or("bob"), "bob");
/// assert_eq!(reference.name, "parcels");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRef {
    /// Explicit owner, when one was given.
    pub owner: Option<String>,
    /// Template name.
    pub name: String,
}

impl TemplateRef {
    /// Parse `[owner@]name`. A blank owner (`@name`) is treated as absent.
    ///
    /// # Errors
    ///
    /// [`MapsError::Validation`] when the name is empty or the reference
    /// contains more than one `@`.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut parts = raw.split(LAYERGROUP_ID_SEPARATOR);
        let (owner, name) = match (parts.next(), parts.next(), parts.next()) {
            (Some(name), None, None) => (None, name),
            (Some(owner), Some(name), None) => {
                let owner = (!owner.is_empty()).then(|| owner.to_string());
                (owner, name)
            }
            _ => {
                return Err(MapsError::validation(format!(
                    "Invalid template reference '{raw}': expected [owner@]name"
                )));
            }
        };

        if name.is_empty() {
            return Err(MapsError::validation(format!(
                "Invalid template reference '{raw}': template name is empty"
            )));
        }

        Ok(Self {
            owner,
            name: name.to_string(),
        })
    }

    /// The explicit owner, or `user` when none was given.
    #[must_use]
    pub fn owner_or<'a>(&'a self, user: &'a str) -> &'a str {
        self.owner.as_deref().unwrap_or(user)
    }
}

impl fmt::Display for TemplateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.owner {
            Some(owner) => write!(f, "{owner}{LAYERGROUP_ID_SEPARATOR}{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Template names: a letter, then letters, digits, `_`, or `-`.
#[must_use]
pub fn is_valid_template_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
