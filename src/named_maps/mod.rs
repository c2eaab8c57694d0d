//! Named map instantiation.
//!
//! [`NamedMapsService`] turns an [`InstantiationRequest`] into a rendered
//! layergroup with a public identifier. It runs five stages in strict
//! sequence and stops at the first failure:
//!
//! 1. **Fetch** the template from the [`TemplateStore`]
//! 2. **Authorize** the caller's token against the template's access policy
//! 3. **Instantiate** the template with the caller's parameters
//! 4. **Render** through the [`LayergroupRenderer`], using the owner's API
//!    key from the [`MapKeyLookup`]
//! 5. **Finalize** the public id and tag it through [`SurrogateKeys`]
//!
//! Every delegated call is raced against the request's cancellation token
//! and deadline (see [`RequestContext`]). Nothing is retried here; retries
//! belong to the collaborators.
//!
//! # Example
//!
//! ```rust,ignore
//! let service = NamedMapsService::new(store, keys, renderer, surrogate_keys);
//! let request = InstantiationRequest::for_path("alice", "parcels")?
//!     .with_auth_token("s3cret")
//!     .with_params(params);
//!
//! let result = service.instantiate(request, &RequestContext::new()).await?;
//! println!("{}", result.public_layergroup_id);
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::constants::{LAYERGROUP_ID_SEPARATOR, NAMED_MAPS_CACHE_NAMESPACE};
use crate::core::{MapsError, RequestContext, Result, StageTiming};
use crate::template::{Params, Template, TemplateRef, authorize, fingerprint_prefix, instantiate};

const UNAUTHORIZED_MESSAGE: &str = "Unauthorized template instantiation";

/// Read access to stored templates, keyed by owner and name.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Load a template, or `None` when the owner has no template by that name.
    async fn get_template(&self, owner: &str, name: &str) -> Result<Option<Template>>;
}

/// Resolves the API key a user's maps are rendered with.
#[async_trait]
pub trait MapKeyLookup: Send + Sync {
    /// API key for `user`. Never logged.
    async fn user_map_key(&self, user: &str) -> Result<String>;
}

/// The external layergroup renderer.
#[async_trait]
pub trait LayergroupRenderer: Send + Sync {
    /// Create a layergroup from a concrete configuration.
    ///
    /// Failures should be reported as [`MapsError::Renderer`] carrying the
    /// renderer's own status, if it has one.
    async fn create_layergroup(&self, layergroup: Value, ctx: &RenderContext) -> Result<Layergroup>;
}

/// Associates public layergroup ids with cache entries for later purging.
#[async_trait]
pub trait SurrogateKeys: Send + Sync {
    /// Tag `public_id` with `entry`.
    async fn tag(&self, public_id: &str, entry: &NamedMapsCacheEntry) -> Result<()>;
}

/// Identity the renderer acts on behalf of.
#[derive(Clone, PartialEq, Eq)]
pub struct RenderContext {
    /// Owner of the template being rendered
    pub user: String,
    /// The owner's map API key
    pub api_key: String,
}

impl fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext")
            .field("user", &self.user)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// A layergroup as returned by the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layergroup {
    /// Layergroup identifier
    pub layergroupid: String,
    /// Everything else the renderer reported (metadata, tile URLs, ...)
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

/// Cache entry identifying one named map, used to purge everything derived
/// from it when the template changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct NamedMapsCacheEntry {
    /// Template owner
    pub owner: String,
    /// Template name
    pub template_name: String,
}

impl NamedMapsCacheEntry {
    /// Create an entry for `owner`'s template `template_name`.
    pub fn new(owner: impl Into<String>, template_name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            template_name: template_name.into(),
        }
    }

    /// Surrogate key: the namespace plus a short digest of `owner:name`.
    #[must_use]
    pub fn key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.owner.as_bytes());
        hasher.update(b":");
        hasher.update(self.template_name.as_bytes());
        let digest = hex::encode(hasher.finalize());
        format!("{NAMED_MAPS_CACHE_NAMESPACE}:{}", &digest[..8])
    }
}

/// One request to instantiate a named map.
#[derive(Clone, Default, PartialEq)]
pub struct InstantiationRequest {
    /// Template owner
    pub owner: String,
    /// Template name
    pub template_id: String,
    /// Caller's auth token, if any
    pub auth_token: Option<String>,
    /// Parameter values by placeholder name
    pub params: Params,
}

impl fmt::Debug for InstantiationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstantiationRequest")
            .field("owner", &self.owner)
            .field("template_id", &self.template_id)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("params", &self.params)
            .finish()
    }
}

impl InstantiationRequest {
    /// Request for `owner`'s template `template_id` with no token or params.
    pub fn new(owner: impl Into<String>, template_id: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            template_id: template_id.into(),
            ..Self::default()
        }
    }

    /// Request decoded from an `[owner@]name` path segment; a blank owner
    /// means the requesting `user`.
    ///
    /// # Errors
    ///
    /// [`MapsError::Validation`] when the segment is malformed.
    pub fn for_path(user: &str, segment: &str) -> Result<Self> {
        let reference = TemplateRef::parse(segment)?;
        let owner = reference.owner_or(user).to_string();
        Ok(Self::new(owner, reference.name))
    }

    /// Attach the caller's auth token.
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Attach parameter values.
    #[must_use]
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }
}

/// Outcome of a successful instantiation.
#[derive(Debug, Clone, Serialize)]
pub struct InstantiationResult {
    /// `{owner}@{fingerprint prefix}@{renderer id}`
    pub public_layergroup_id: String,
    /// Identifier the renderer assigned
    pub render_layergroup_id: String,
    /// The renderer's layergroup with `layergroupid` rewritten to the public id
    pub layergroup: Layergroup,
    /// Cache entry the public id was tagged with
    pub cache_entry: NamedMapsCacheEntry,
    /// Time spent in each stage
    pub timings: Vec<StageTiming>,
}

/// Compose the public layergroup id.
#[must_use]
pub fn public_layergroup_id(owner: &str, fingerprint_prefix: &str, render_id: &str) -> String {
    format!(
        "{owner}{sep}{fingerprint_prefix}{sep}{render_id}",
        sep = LAYERGROUP_ID_SEPARATOR
    )
}

/// Orchestrates named map instantiation over the external collaborators.
///
/// Cheap to share: hold it in an [`Arc`] and call it from any number of
/// concurrent requests.
#[derive(Clone)]
pub struct NamedMapsService {
    store: Arc<dyn TemplateStore>,
    keys: Arc<dyn MapKeyLookup>,
    renderer: Arc<dyn LayergroupRenderer>,
    surrogate_keys: Arc<dyn SurrogateKeys>,
}

impl fmt::Debug for NamedMapsService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedMapsService").finish_non_exhaustive()
    }
}

impl NamedMapsService {
    /// Create a service over the given collaborators.
    pub fn new(
        store: Arc<dyn TemplateStore>,
        keys: Arc<dyn MapKeyLookup>,
        renderer: Arc<dyn LayergroupRenderer>,
        surrogate_keys: Arc<dyn SurrogateKeys>,
    ) -> Self {
        Self {
            store,
            keys,
            renderer,
            surrogate_keys,
        }
    }

    /// Instantiate a named map.
    ///
    /// # Errors
    ///
    /// - [`MapsError::NotFound`] when the owner has no such template
    /// - [`MapsError::Forbidden`] or [`MapsError::MalformedToken`] when the
    ///   token is rejected
    /// - [`MapsError::MissingParameter`] or [`MapsError::InvalidParameter`]
    ///   from instantiation
    /// - Whatever the collaborators report, unchanged
    /// - [`MapsError::Cancelled`] or [`MapsError::DeadlineExceeded`] when the
    ///   request is interrupted
    #[tracing::instrument(skip_all, fields(owner = %request.owner, template = %request.template_id))]
    pub async fn instantiate(
        &self,
        request: InstantiationRequest,
        ctx: &RequestContext,
    ) -> Result<InstantiationResult> {
        let InstantiationRequest {
            owner,
            template_id,
            auth_token,
            params,
        } = request;

        tracing::debug!("fetching template");
        let template = ctx
            .run("getTemplate", self.store.get_template(&owner, &template_id))
            .await?
            .ok_or_else(|| MapsError::NotFound {
                owner: owner.clone(),
                template: template_id.clone(),
            })?;

        tracing::debug!("authorizing");
        let authorized = ctx
            .run("authorize", async { authorize(&template, auth_token.as_deref()) })
            .await
            .map_err(|error| match error {
                error if error.is_authorization() => error,
                error @ (MapsError::Cancelled { .. } | MapsError::DeadlineExceeded { .. }) => {
                    error
                }
                other => MapsError::Forbidden {
                    reason: other.to_string(),
                },
            })
            .inspect_err(|error| tracing::warn!("authorization failed: {error}"))?;
        if !authorized {
            tracing::warn!("unauthorized instantiation attempt");
            return Err(MapsError::Forbidden {
                reason: UNAUTHORIZED_MESSAGE.to_string(),
            });
        }

        tracing::debug!("instantiating");
        let (layergroup, prefix) = ctx
            .run("instance", async {
                Ok((instantiate(&template, &params)?, fingerprint_prefix(&template)?))
            })
            .await?;

        tracing::debug!("resolving map key");
        let api_key = ctx.run("getUserMapKey", self.keys.user_map_key(&owner)).await?;
        let render_ctx = RenderContext {
            user: owner.clone(),
            api_key,
        };

        tracing::debug!("creating layergroup");
        let mut rendered = ctx
            .run("createLayergroup", self.renderer.create_layergroup(layergroup, &render_ctx))
            .await?;

        let render_layergroup_id = std::mem::take(&mut rendered.layergroupid);
        let public_id = public_layergroup_id(&owner, &prefix, &render_layergroup_id);
        rendered.layergroupid.clone_from(&public_id);

        let cache_entry = NamedMapsCacheEntry::new(owner, template.name);
        tracing::debug!(surrogate_key = %cache_entry.key(), "tagging cache");
        ctx.run("tagCache", self.surrogate_keys.tag(&public_id, &cache_entry)).await?;

        tracing::info!(layergroup = %public_id, "named map instantiated");
        Ok(InstantiationResult {
            public_layergroup_id: public_id,
            render_layergroup_id,
            layergroup: rendered,
            cache_entry,
            timings: ctx.timings(),
        })
    }
}
