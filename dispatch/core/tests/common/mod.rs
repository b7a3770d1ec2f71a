//! Shared fixtures for the dispatch-core integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Once};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use dispatch_core::{
    Collaborators, EngineConfig, HeuristicAnalyzer, InMemoryModelRegistry, Model, ModelApiClient,
    ModelCallError, ModelCapability, ModelRequest, ModelResult, PerformanceStats, Pricing,
    RequestType, RollingPerformanceMonitor, RoutingContext, RoutingEngine, TokenUsage,
};

static TRACING: Once = Once::new();

/// Route engine logs to the test writer, filtered by `RUST_LOG`
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

// =============================================================================
// Backend Behavior
// =============================================================================

/// How the fake backend answers calls for one model
#[derive(Clone, Debug)]
pub enum Behavior {
    Succeed,
    Fail(ModelCallError),
    /// Answer successfully after the given delay
    Slow(Duration),
}

/// Fake model API that answers per model and logs every call
#[derive(Default)]
pub struct FakeBackend {
    behaviors: Mutex<HashMap<String, Behavior>>,
    calls: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, model_id: &str, behavior: Behavior) {
        self.behaviors.lock().insert(model_id.to_string(), behavior);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, model_id: &str) -> usize {
        self.calls.lock().iter().filter(|m| *m == model_id).count()
    }
}

#[async_trait]
impl ModelApiClient for FakeBackend {
    async fn call(
        &self,
        model: &Model,
        request: &ModelRequest,
        _context: &RoutingContext,
    ) -> Result<ModelResult, ModelCallError> {
        self.calls.lock().push(model.id.clone());
        let behavior = self
            .behaviors
            .lock()
            .get(&model.id)
            .cloned()
            .unwrap_or(Behavior::Fail(ModelCallError::Backend {
                status: 404,
                message: "unknown model".to_string(),
            }));

        let reply = || {
            ModelResult::new(model.id.clone(), request.payload.clone()).with_usage(TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            })
        };
        match behavior {
            Behavior::Succeed => Ok(reply()),
            Behavior::Fail(error) => Err(error),
            Behavior::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(reply())
            }
        }
    }
}

// =============================================================================
// Engine Harness
// =============================================================================

/// Engine wired to an in-memory registry, a rolling monitor and a fake backend
pub struct Harness {
    pub engine: Arc<RoutingEngine>,
    pub registry: Arc<InMemoryModelRegistry>,
    pub monitor: Arc<RollingPerformanceMonitor>,
    pub backend: Arc<FakeBackend>,
}

impl Harness {
    pub fn new(models: Vec<Model>, config: EngineConfig) -> Self {
        init_tracing();
        let registry = Arc::new(InMemoryModelRegistry::with_models(models));
        let monitor = Arc::new(RollingPerformanceMonitor::default());
        let backend = FakeBackend::new();
        let collaborators = Collaborators::new(
            Arc::new(HeuristicAnalyzer::new()),
            registry.clone(),
            monitor.clone(),
            backend.clone(),
        );
        let engine = RoutingEngine::new(collaborators, config).expect("valid engine config");
        Self {
            engine: Arc::new(engine),
            registry,
            monitor,
            backend,
        }
    }
}

/// Text generation model with a static performance snapshot
pub fn model(id: &str, priority: u8, latency_ms: u64, error_rate: f64) -> Model {
    Model::new(id, "fake")
        .with_name(format!("Model {id}"))
        .with_priority(priority)
        .with_pricing(Pricing::new(0.001, 0.002))
        .with_capability(RequestType::TextGeneration, ModelCapability::new(8192, 0.85))
        .with_performance(PerformanceStats {
            average_latency: Duration::from_millis(latency_ms),
            throughput: 5.0,
            error_rate,
            availability: 1.0 - error_rate,
            sample_count: 500,
        })
}

pub fn text_request(latency_ms: u64) -> ModelRequest {
    ModelRequest::new(RequestType::TextGeneration, "Summarize the quarterly report")
        .with_max_latency(Duration::from_millis(latency_ms))
}
