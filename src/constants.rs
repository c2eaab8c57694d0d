//! Global constants used throughout the namedmaps codebase.
//!
//! Identifier formats, header names, and wire-level markers that are shared
//! between the orchestrator, the resolver, and the HTTP contract helpers
//! live here so they stay in one discoverable place.

/// Number of fingerprint characters embedded in a public layergroup id.
pub const FINGERPRINT_PREFIX_LEN: usize = 8;

/// Separator between the owner, fingerprint prefix, and renderer id.
pub const LAYERGROUP_ID_SEPARATOR: char = '@';

/// Response header carrying the public layergroup id.
pub const LAYERGROUP_ID_HEADER: &str = "X-Layergroup-Id";

/// Response header carrying surrogate keys for edge cache invalidation.
pub const SURROGATE_KEY_HEADER: &str = "Surrogate-Key";

/// Namespace prefix for named map surrogate keys.
pub const NAMED_MAPS_CACHE_NAMESPACE: &str = "n";

/// Only template format version currently accepted.
pub const TEMPLATE_VERSION: &str = "0.0.1";

/// Maximum accepted length of an instantiation auth token, in bytes.
pub const MAX_AUTH_TOKEN_LEN: usize = 256;

/// Base dollar-quote tag used to embed user SQL in resolver queries.
pub const DOLLAR_QUOTE_TAG: &str = "windshaft";

/// Status returned when an error does not declare one.
pub const DEFAULT_ERROR_STATUS: u16 = 400;

/// Status returned when a collaborator fails without declaring one.
pub const DEFAULT_COLLABORATOR_STATUS: u16 = 500;

/// Status for requests whose caller went away before completion.
pub const CLIENT_CLOSED_REQUEST_STATUS: u16 = 499;

/// Status for requests that ran past their deadline.
pub const DEADLINE_EXCEEDED_STATUS: u16 = 504;

/// Environment variable overriding the configuration file location.
pub const CONFIG_PATH_ENV: &str = "NAMEDMAPS_CONFIG_PATH";
