//! HTTP contract helpers.
//!
//! Maps core inputs and outputs to the shapes the HTTP layer sends and
//! receives, without tying the crate to any web framework. Routing,
//! user-scope resolution, and CORS stay in the HTTP layer.
//!
//! # Responses
//!
//! | operation | status | body |
//! |-----------|--------|------|
//! | instantiation | 200 | layergroup with the public `layergroupid` |
//! | failure | [`MapsError::status_code`] | `{"errors": ["<message>"]}` |
//! | affected tables | 200 | `["schema.table", ...]` |
//! | freshness | 200 | `{"affectedTables": [...], "lastUpdatedTime": <millis>}` |
//!
//! Successful instantiations also carry `X-Layergroup-Id` and
//! `Surrogate-Key` headers.

use serde_json::{Value, json};

use crate::constants::{LAYERGROUP_ID_HEADER, SURROGATE_KEY_HEADER};
use crate::core::{MapsError, Result};
use crate::named_maps::InstantiationResult;
use crate::sql::AffectedTables;
use crate::template::Params;

/// `Content-Type` of JSON responses.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// `Content-Type` of JSONP responses.
pub const JSONP_CONTENT_TYPE: &str = "text/javascript; charset=utf-8";

const CONTENT_TYPE_MESSAGE: &str = "template POST data must be of type application/json";
const MISSING_CALLBACK_MESSAGE: &str = "callback parameter should be present and be a function name";
const BAD_CONFIG_MESSAGE: &str = "badformed config parameter, should be a valid JSON";

/// Response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiBody {
    /// JSON document
    Json(Value),
    /// Pre-rendered text (JSONP)
    Text(String),
}

impl ApiBody {
    /// Body as it goes on the wire.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Json(value) => value.to_string(),
            Self::Text(text) => text.clone(),
        }
    }
}

/// A framework-agnostic HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: u16,
    /// Headers in insertion order
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: ApiBody,
}

impl ApiResponse {
    /// JSON response with `status` and `body`.
    #[must_use]
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".to_string(), JSON_CONTENT_TYPE.to_string())],
            body: ApiBody::Json(body),
        }
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First value of header `name`, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The JSON body, if this is a JSON response.
    #[must_use]
    pub const fn json_body(&self) -> Option<&Value> {
        match &self.body {
            ApiBody::Json(value) => Some(value),
            ApiBody::Text(_) => None,
        }
    }

    fn set_header(&mut self, name: &str, value: &str) {
        match self.headers.iter_mut().find(|(key, _)| key.eq_ignore_ascii_case(name)) {
            Some((_, existing)) => *existing = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
    }
}

/// Response for a successful instantiation.
///
/// # Errors
///
/// [`MapsError::Json`] if the layergroup cannot be serialized.
pub fn instantiation_response(result: &InstantiationResult) -> Result<ApiResponse> {
    let body = serde_json::to_value(&result.layergroup)?;
    Ok(ApiResponse::json(200, body)
        .with_header(LAYERGROUP_ID_HEADER, &result.public_layergroup_id)
        .with_header(SURROGATE_KEY_HEADER, result.cache_entry.key()))
}

/// Response for a failure: `{"errors": [message]}` with the error's status.
#[must_use]
pub fn error_response(error: &MapsError) -> ApiResponse {
    ApiResponse::json(error.status_code(), json!({ "errors": [error.to_string()] }))
}

/// Response for the outcome of an instantiation, successful or not.
#[must_use]
pub fn finish_instantiation(outcome: Result<InstantiationResult>) -> ApiResponse {
    match outcome.and_then(|result| instantiation_response(&result)) {
        Ok(response) => response,
        Err(error) => {
            tracing::debug!(status = error.status_code(), "instantiation failed: {error}");
            error_response(&error)
        }
    }
}

/// Parse a POSTed instantiation body into parameters.
///
/// The content type must be `application/json` (parameters such as
/// `charset` are allowed). An empty body means no parameters.
///
/// # Errors
///
/// - [`MapsError::InvalidContentType`] for any other content type
/// - [`MapsError::Json`] when the body is not JSON
/// - [`MapsError::Validation`] when the body is not a JSON object
pub fn parse_instantiation_body(content_type: Option<&str>, body: &[u8]) -> Result<Params> {
    let is_json = content_type
        .and_then(|value| value.split(';').next())
        .is_some_and(|media| media.trim().eq_ignore_ascii_case("application/json"));
    if !is_json {
        return Err(MapsError::InvalidContentType {
            message: CONTENT_TYPE_MESSAGE.to_string(),
        });
    }

    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Params::new());
    }

    match serde_json::from_slice::<Value>(body)? {
        Value::Object(map) => Ok(map.into_iter().collect()),
        _ => Err(MapsError::validation("template parameters must be a JSON object")),
    }
}

/// A parsed JSONP instantiation request.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonpRequest {
    /// Name of the JavaScript function wrapping the response
    pub callback: String,
    /// Parameters decoded from the `config` query argument
    pub params: Params,
}

/// Parse the `callback` and `config` query arguments of a JSONP request.
///
/// # Errors
///
/// [`MapsError::Validation`] when the callback is missing or empty, or when
/// `config` is not a JSON object.
pub fn parse_jsonp_request(callback: Option<&str>, config: Option<&str>) -> Result<JsonpRequest> {
    let callback = callback
        .filter(|c| !c.is_empty())
        .ok_or_else(|| MapsError::validation(MISSING_CALLBACK_MESSAGE))?;

    let params = match config.filter(|c| !c.is_empty()) {
        None => Params::new(),
        Some(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => map.into_iter().collect(),
            _ => return Err(MapsError::validation(BAD_CONFIG_MESSAGE)),
        },
    };

    Ok(JsonpRequest {
        callback: callback.to_string(),
        params,
    })
}

/// Wrap a JSON response in a call to `callback`.
///
/// Characters other than word characters, `$`, `.`, `[` and `]` are
/// stripped from the callback name. The status and headers are kept.
#[must_use]
pub fn jsonp_wrap(callback: &str, mut response: ApiResponse) -> ApiResponse {
    let callback: String = callback
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.' | '[' | ']'))
        .collect();

    // U+2028/U+2029 are valid in JSON but terminate lines in JavaScript.
    let payload = response.body.render().replace('\u{2028}', "\\u2028").replace('\u{2029}', "\\u2029");

    response.body =
        ApiBody::Text(format!("/**/ typeof {callback} === 'function' && {callback}({payload});"));
    response.set_header("Content-Type", JSONP_CONTENT_TYPE);
    response
}

/// Response listing the tables a query depends on.
#[must_use]
pub fn tables_response(tables: &[String]) -> ApiResponse {
    ApiResponse::json(200, json!(tables))
}

/// Response carrying tables and their last update time.
///
/// # Errors
///
/// [`MapsError::Json`] if the result cannot be serialized.
pub fn freshness_response(affected: &AffectedTables) -> Result<ApiResponse> {
    Ok(ApiResponse::json(200, serde_json::to_value(affected)?))
}
