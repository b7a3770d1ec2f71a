//! Collaborator Traits
//!
//! Seams between the routing engine and the systems it depends on. The
//! engine never talks to a concrete registry, monitor or network client;
//! it is handed trait objects at construction.
//!
//! # Design Philosophy
//!
//! - The analyzer is a pure function of the request and context
//! - Registry and monitor reads may do I/O, so they are async
//! - Recording a metric is fire-and-forget and cannot fail the request
//! - The model API client owns the network protocol; payloads are opaque

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{CollaboratorError, ModelCallError};
use crate::models::{
    MetricSample, Model, ModelRequest, ModelResult, PerformanceStats, RequestAnalysis, RequestType,
    RoutingContext,
};

/// Turns a raw request into structured requirements
pub trait RequestAnalyzer: Send + Sync {
    /// Analyze a request in the caller's context
    fn analyze(&self, request: &ModelRequest, context: &RoutingContext) -> RequestAnalysis;
}

/// Source of known models
#[async_trait]
pub trait ModelRegistry: Send + Sync {
    /// Models advertising a capability for `request_type`, in registry order
    async fn models_for_type(
        &self,
        request_type: RequestType,
    ) -> Result<Vec<Model>, CollaboratorError>;

    /// Every model currently taking traffic
    async fn active_models(&self) -> Result<Vec<Model>, CollaboratorError>;
}

/// Rolling per-model performance figures
#[async_trait]
pub trait PerformanceMonitor: Send + Sync {
    /// Figures for `model_id` over the trailing `window`
    ///
    /// A result with `sample_count == 0` means nothing was observed.
    async fn model_performance(
        &self,
        model_id: &str,
        window: Duration,
    ) -> Result<PerformanceStats, CollaboratorError>;

    /// Record the outcome of one attempt
    async fn record_metric(&self, sample: MetricSample);
}

/// Network call to a model backend
#[async_trait]
pub trait ModelApiClient: Send + Sync {
    /// Send `request` to `model`
    async fn call(
        &self,
        model: &Model,
        request: &ModelRequest,
        context: &RoutingContext,
    ) -> Result<ModelResult, ModelCallError>;
}

/// Everything the engine consumes, bundled for construction
#[derive(Clone)]
pub struct Collaborators {
    /// Request analyzer
    pub analyzer: Arc<dyn RequestAnalyzer>,
    /// Model registry
    pub registry: Arc<dyn ModelRegistry>,
    /// Performance monitor
    pub monitor: Arc<dyn PerformanceMonitor>,
    /// Model API client
    pub client: Arc<dyn ModelApiClient>,
}

impl Collaborators {
    /// Bundle collaborators
    pub fn new(
        analyzer: Arc<dyn RequestAnalyzer>,
        registry: Arc<dyn ModelRegistry>,
        monitor: Arc<dyn PerformanceMonitor>,
        client: Arc<dyn ModelApiClient>,
    ) -> Self {
        Self {
            analyzer,
            registry,
            monitor,
            client,
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
