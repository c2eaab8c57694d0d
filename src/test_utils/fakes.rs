//! In-memory collaborator doubles.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value, json};

use crate::core::{MapsError, Result};
use crate::named_maps::{
    Layergroup, LayergroupRenderer, MapKeyLookup, NamedMapsCacheEntry, RenderContext,
    SurrogateKeys, TemplateStore,
};
use crate::sql::{QueryRunner, Row};
use crate::template::Template;

/// Template store backed by a [`DashMap`] keyed by `(owner, name)`.
#[derive(Debug, Default)]
pub struct MemoryTemplateStore {
    templates: DashMap<(String, String), Template>,
    failure: Mutex<Option<MapsError>>,
}

impl MemoryTemplateStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `template` under `owner`, replacing any template of that name.
    pub fn insert(&self, owner: &str, template: Template) {
        self.templates.insert((owner.to_string(), template.name.clone()), template);
    }

    /// Make every subsequent lookup fail with `error`.
    pub fn fail_with(&self, error: MapsError) {
        *self.failure.lock().unwrap() = Some(error);
    }
}

#[async_trait]
impl TemplateStore for MemoryTemplateStore {
    async fn get_template(&self, owner: &str, name: &str) -> Result<Option<Template>> {
        if let Some(error) = self.failure.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(self
            .templates
            .get(&(owner.to_string(), name.to_string()))
            .map(|entry| entry.value().clone()))
    }
}

/// Answers every lookup with the same key.
#[derive(Debug, Clone)]
pub struct StaticMapKeys {
    key: String,
}

impl StaticMapKeys {
    /// Lookup returning `key` for every user.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
        }
    }
}

#[async_trait]
impl MapKeyLookup for StaticMapKeys {
    async fn user_map_key(&self, _user: &str) -> Result<String> {
        Ok(self.key.clone())
    }
}

/// Renderer double that records what it was asked to render.
#[derive(Debug)]
pub struct FakeRenderer {
    layergroup_id: String,
    calls: Mutex<Vec<(Value, RenderContext)>>,
    failure: Mutex<Option<MapsError>>,
    delay: Mutex<Option<std::time::Duration>>,
}

impl FakeRenderer {
    /// Renderer answering with `layergroup_id`.
    pub fn new(layergroup_id: impl Into<String>) -> Self {
        Self {
            layergroup_id: layergroup_id.into(),
            calls: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            delay: Mutex::new(None),
        }
    }

    /// Fail every subsequent call with `error`.
    pub fn fail_with(&self, error: MapsError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    /// Sleep for `delay` before answering.
    pub fn delay_by(&self, delay: std::time::Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Every layergroup and context received, in order.
    pub fn calls(&self) -> Vec<(Value, RenderContext)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LayergroupRenderer for FakeRenderer {
    async fn create_layergroup(&self, layergroup: Value, ctx: &RenderContext) -> Result<Layergroup> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.calls.lock().unwrap().push((layergroup, ctx.clone()));
        if let Some(error) = self.failure.lock().unwrap().clone() {
            return Err(error);
        }

        let mut metadata = Map::new();
        metadata.insert("metadata".to_string(), json!({ "layers": [] }));
        Ok(Layergroup {
            layergroupid: self.layergroup_id.clone(),
            metadata,
        })
    }
}

/// Surrogate-key double that records every tag.
#[derive(Debug, Default)]
pub struct RecordingSurrogateKeys {
    tags: Mutex<Vec<(String, NamedMapsCacheEntry)>>,
}

impl RecordingSurrogateKeys {
    /// No tags recorded yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(public id, entry)` tagged, in order.
    pub fn tags(&self) -> Vec<(String, NamedMapsCacheEntry)> {
        self.tags.lock().unwrap().clone()
    }
}

#[async_trait]
impl SurrogateKeys for RecordingSurrogateKeys {
    async fn tag(&self, public_id: &str, entry: &NamedMapsCacheEntry) -> Result<()> {
        self.tags.lock().unwrap().push((public_id.to_string(), entry.clone()));
        Ok(())
    }
}

/// Query runner replaying scripted responses in order.
///
/// Once the script runs out, every query returns no rows.
#[derive(Debug, Default)]
pub struct FakeQueryRunner {
    script: Mutex<VecDeque<Result<Vec<Row>>>>,
    queries: Mutex<Vec<(String, String)>>,
    delay: Mutex<Option<std::time::Duration>>,
}

impl FakeQueryRunner {
    /// Runner with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response.
    #[must_use]
    pub fn with_rows(self, rows: Vec<Row>) -> Self {
        self.script.lock().unwrap().push_back(Ok(rows));
        self
    }

    /// Queue a failure.
    #[must_use]
    pub fn with_error(self, error: MapsError) -> Self {
        self.script.lock().unwrap().push_back(Err(error));
        self
    }

    /// Sleep for `delay` before answering each query.
    #[must_use]
    pub fn with_delay(self, delay: std::time::Duration) -> Self {
        *self.delay.lock().unwrap() = Some(delay);
        self
    }

    /// Every `(user, query)` run, in order.
    pub fn queries(&self) -> Vec<(String, String)> {
        self.queries.lock().unwrap().clone()
    }

    /// Build a row from `(column, value)` pairs.
    pub fn row(pairs: &[(&str, Option<&str>)]) -> Row {
        pairs.iter().map(|(k, v)| ((*k).to_string(), v.map(str::to_string))).collect()
    }
}

#[async_trait]
impl QueryRunner for FakeQueryRunner {
    async fn run(&self, user: &str, query: &str) -> Result<Vec<Row>> {
        self.queries.lock().unwrap().push((user.to_string(), query.to_string()));
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.script.lock().unwrap().pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}
