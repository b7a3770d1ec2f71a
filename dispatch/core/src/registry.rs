//! In-Memory Model Registry
//!
//! Holds registered models in registration order together with an active
//! flag. Inactive models stay registered but are never offered for routing.

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::collaborators::ModelRegistry;
use crate::error::CollaboratorError;
use crate::models::{Model, RequestType};

#[derive(Clone, Debug)]
struct RegisteredModel {
    model: Model,
    active: bool,
}

/// Thread-safe registry backed by a vector
#[derive(Debug, Default)]
pub struct InMemoryModelRegistry {
    models: RwLock<Vec<RegisteredModel>>,
}

impl InMemoryModelRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with every model active
    #[must_use]
    pub fn with_models(models: impl IntoIterator<Item = Model>) -> Self {
        let registry = Self::new();
        for model in models {
            registry.register(model);
        }
        registry
    }

    /// Register a model as active, replacing any model with the same ID
    ///
    /// A replaced model keeps its position in registration order.
    pub fn register(&self, model: Model) {
        let mut models = self.models.write();
        if let Some(existing) = models.iter_mut().find(|m| m.model.id == model.id) {
            existing.model = model;
            existing.active = true;
        } else {
            tracing::debug!(model = %model.id, provider = %model.provider, "Registered model");
            models.push(RegisteredModel { model, active: true });
        }
    }

    /// Remove a model; returns whether it was registered
    pub fn unregister(&self, model_id: &str) -> bool {
        let mut models = self.models.write();
        let before = models.len();
        models.retain(|m| m.model.id != model_id);
        models.len() != before
    }

    /// Take a model in or out of rotation; returns whether it was found
    pub fn set_active(&self, model_id: &str, active: bool) -> bool {
        let mut models = self.models.write();
        match models.iter_mut().find(|m| m.model.id == model_id) {
            Some(entry) => {
                entry.active = active;
                tracing::info!(model = %model_id, active, "Model rotation changed");
                true
            }
            None => false,
        }
    }

    /// Look up a registered model regardless of its active flag
    #[must_use]
    pub fn get(&self, model_id: &str) -> Option<Model> {
        self.models
            .read()
            .iter()
            .find(|m| m.model.id == model_id)
            .map(|m| m.model.clone())
    }

    /// Number of registered models
    #[must_use]
    pub fn len(&self) -> usize {
        self.models.read().len()
    }

    /// Whether no models are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.read().is_empty()
    }
}

#[async_trait]
impl ModelRegistry for InMemoryModelRegistry {
    async fn models_for_type(
        &self,
        request_type: RequestType,
    ) -> Result<Vec<Model>, CollaboratorError> {
        Ok(self
            .models
            .read()
            .iter()
            .filter(|m| m.active && m.model.supports(request_type))
            .map(|m| m.model.clone())
            .collect())
    }

    async fn active_models(&self) -> Result<Vec<Model>, CollaboratorError> {
        Ok(self
            .models
            .read()
            .iter()
            .filter(|m| m.active)
            .map(|m| m.model.clone())
            .collect())
    }
}
