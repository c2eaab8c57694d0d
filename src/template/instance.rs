//! Placeholder substitution.
//!
//! Produces the concrete layergroup for one instantiation request. Every
//! `<%= name %>` reference inside a string value of the template's
//! layergroup is replaced by the coerced value of `name`. Object keys are
//! never rewritten, and substituted text is not scanned again, so a value
//! that itself looks like a reference is inserted literally.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::{PlaceholderType, Template};
use crate::core::{MapsError, Result};

/// Caller-supplied parameter values, by placeholder name.
pub type Params = BTreeMap<String, Value>;

static PLACEHOLDER_PATTERN: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"<%=\s*([A-Za-z_][0-9A-Za-z_]*)\s*%>"));

/// Instantiate `template` with `params`.
///
/// Declared placeholders take the supplied value, else their default; a
/// declared placeholder with neither is an error even if the layergroup
/// never references it. References to undeclared names are resolved from
/// `params` and escaped as SQL literals. Supplied parameters that nothing
/// references are ignored.
///
/// # Errors
///
/// - [`MapsError::MissingParameter`] when a needed value has no source
/// - [`MapsError::InvalidParameter`] when a value does not fit its type
///
/// # Examples
///
/// ```rust
/// use namedmaps::template::{Params, Template, instantiate};
/// use serde_json::json;
///
/// let template: Template = serde_json::from_value(json!({
///     "version": "0.0.1",
///     "name": "colored",
///     "auth": { "method": "open" },
///     "placeholders": { "color": { "type": "css_color", "default": "red" } },
///     "layergroup": { "layers": [{ "options": { "cartocss": "#l { fill: <%= color %>; }" } }] }
/// })).unwrap();
///
/// let mut params = Params::new();
/// params.insert("color".to_string(), json!("#00ff00"));
///
/// let layergroup = instantiate(&template, &params).unwrap();
/// assert_eq!(layergroup["layers"][0]["options"]["cartocss"], "#l { fill: #00ff00; }");
/// ```
pub fn instantiate(template: &Template, params: &Params) -> Result<Value> {
    let pattern = PLACEHOLDER_PATTERN.as_ref().map_err(|e| MapsError::validation(e.to_string()))?;

    let mut resolved = HashMap::with_capacity(template.placeholders.len());
    for (name, placeholder) in &template.placeholders {
        let value = params
            .get(name)
            .or(placeholder.default.as_ref())
            .ok_or_else(|| MapsError::MissingParameter {
                name: name.clone(),
            })?;
        resolved.insert(name.as_str(), placeholder.kind.coerce(name, value)?);
    }

    let substitution = Substitution {
        pattern,
        resolved,
        params,
    };
    substitution.apply(&template.layergroup)
}

struct Substitution<'a> {
    pattern: &'a Regex,
    resolved: HashMap<&'a str, String>,
    params: &'a Params,
}

impl Substitution<'_> {
    fn apply(&self, value: &Value) -> Result<Value> {
        Ok(match value {
            Value::String(s) => Value::String(self.replace(s)?.into_owned()),
            Value::Array(items) => {
                Value::Array(items.iter().map(|item| self.apply(item)).collect::<Result<_>>()?)
            }
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, item)| Ok::<_, MapsError>((key.clone(), self.apply(item)?)))
                    .collect::<Result<_>>()?,
            ),
            other => other.clone(),
        })
    }

    fn replace<'s>(&self, text: &'s str) -> Result<Cow<'s, str>> {
        if !text.contains("<%") {
            return Ok(Cow::Borrowed(text));
        }

        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for captures in self.pattern.captures_iter(text) {
            let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            out.push_str(&text[last..whole.start()]);
            out.push_str(&self.value_of(name.as_str())?);
            last = whole.end();
        }
        out.push_str(&text[last..]);
        Ok(Cow::Owned(out))
    }

    fn value_of(&self, name: &str) -> Result<Cow<'_, str>> {
        if let Some(value) = self.resolved.get(name) {
            return Ok(Cow::Borrowed(value.as_str()));
        }
        let value = self.params.get(name).ok_or_else(|| MapsError::MissingParameter {
            name: name.to_string(),
        })?;
        PlaceholderType::SqlLiteral.coerce(name, value).map(Cow::Owned)
    }
}
