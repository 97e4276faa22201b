//! Language models offered by the assistant server.
//!
//! The catalog itself lives on the server; [`ModelCatalog`] is the query
//! side and [`ModelSelection`] the client's view of it.

use crate::error::{Result, VoxturnError};
use crate::transport::OutboundCommand;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Source of the model list and of the server's current model.
#[async_trait]
pub trait ModelCatalog: Send + Sync {
    /// Model id to display name.
    async fn available_models(&self) -> Result<BTreeMap<String, String>>;

    async fn current_model(&self) -> Result<Option<String>>;
}

/// Fixed catalog, for configuration-driven setups and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    models: BTreeMap<String, String>,
    current: Option<String>,
}

impl StaticCatalog {
    pub fn new(models: BTreeMap<String, String>, current: Option<String>) -> Self {
        Self { models, current }
    }

    pub fn with_model(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.models.insert(id.into(), name.into());
        self
    }

    pub fn with_current(mut self, id: impl Into<String>) -> Self {
        self.current = Some(id.into());
        self
    }
}

#[async_trait]
impl ModelCatalog for StaticCatalog {
    async fn available_models(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.models.clone())
    }

    async fn current_model(&self) -> Result<Option<String>> {
        Ok(self.current.clone())
    }
}

/// Known models and the selected one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelSelection {
    models: BTreeMap<String, String>,
    current: Option<String>,
}

impl ModelSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reload from `catalog`; the current model is asked for first.
    pub async fn refresh(&mut self, catalog: &dyn ModelCatalog) -> Result<()> {
        let current = catalog.current_model().await?;
        let models = catalog.available_models().await?;
        tracing::debug!("{} models available, current {:?}", models.len(), current);
        self.models = models;
        self.current = current;
        Ok(())
    }

    /// Select `id` and build the command announcing it.
    ///
    /// With an empty catalog any id is accepted; the server decides.
    pub fn select(&mut self, id: &str) -> Result<OutboundCommand> {
        if !self.models.is_empty() && !self.models.contains_key(id) {
            return Err(VoxturnError::UnknownModel {
                model: id.to_string(),
            });
        }
        self.current = Some(id.to_string());
        Ok(OutboundCommand::ChangeModel {
            model: id.to_string(),
        })
    }

    pub fn models(&self) -> &BTreeMap<String, String> {
        &self.models
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Display name of `id`, falling back to the id itself.
    pub fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.models.get(id).map(String::as_str).unwrap_or(id)
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
