//! Routing Test Utilities
//!
//! Fakes and fixtures for exercising the engine without real backends:
//! a scripted model API client that records every call, a monitor that
//! serves fixed figures, and builders for models and decisions.
//!
//! # Usage
//!
//! ```ignore
//! let client = ScriptedClient::new();
//! client.fail("model-a", ModelCallError::RateLimited);
//! client.succeed("model-b");
//!
//! // ... run the engine ...
//!
//! assert_eq!(client.calls(), vec!["model-a", "model-b"]);
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::analyzer::HeuristicAnalyzer;
use crate::collaborators::{Collaborators, ModelApiClient, ModelRegistry, PerformanceMonitor};
use crate::error::{CollaboratorError, ModelCallError};
use crate::models::{
    MetricSample, Model, ModelCapability, ModelRequest, ModelResult, PerformanceStats, Pricing,
    RequestType, RoutingContext,
};
use crate::registry::InMemoryModelRegistry;

use super::decision::{FallbackStrategy, RoutingDecision};

// ============================================================================
// Fixtures
// ============================================================================

/// Text generation model with 4096 tokens, quality 0.8 and cheap pricing
pub fn test_model(id: &str) -> Model {
    Model::new(id, "test-provider")
        .with_pricing(Pricing::new(0.001, 0.002))
        .with_capability(RequestType::TextGeneration, ModelCapability::new(4096, 0.8))
}

/// Decision selecting `selected` with `alternatives` in order
pub fn decision_for(
    selected: &str,
    alternatives: &[&str],
    strategy: FallbackStrategy,
) -> RoutingDecision {
    RoutingDecision {
        request_id: "test-request".to_string(),
        request_type: RequestType::TextGeneration,
        selected_model: test_model(selected),
        alternative_models: alternatives.iter().map(|id| test_model(id)).collect(),
        confidence: 0.9,
        reasoning: Vec::new(),
        estimated_latency: Duration::from_millis(100),
        estimated_cost: 0.0,
        estimated_tokens: 100,
        fallback_strategy: strategy,
        score: 0.9,
        decision_time: Duration::ZERO,
        substituted_for: None,
    }
}

/// Performance figures with the given latency and error rate
pub fn stats(latency_ms: u64, error_rate: f64) -> PerformanceStats {
    PerformanceStats {
        average_latency: Duration::from_millis(latency_ms),
        throughput: 1.0,
        error_rate,
        availability: 1.0 - error_rate,
        sample_count: 100,
    }
}

/// Wire fakes into a collaborator bundle around an in-memory registry
pub fn collaborators(
    registry: Arc<InMemoryModelRegistry>,
    monitor: Arc<dyn PerformanceMonitor>,
    client: Arc<ScriptedClient>,
) -> Collaborators {
    Collaborators::new(Arc::new(HeuristicAnalyzer::new()), registry, monitor, client)
}

// ============================================================================
// Scripted Client
// ============================================================================

#[derive(Default)]
struct Script {
    queued: VecDeque<Result<ModelResult, ModelCallError>>,
    sticky: Option<Result<ModelResult, ModelCallError>>,
    delay: Duration,
}

/// Model API client whose answers are scripted per model
#[derive(Default)]
pub struct ScriptedClient {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call to `model_id` succeeds
    pub fn succeed(&self, model_id: &str) {
        self.succeed_with(model_id, ModelResult::new(model_id, b"ok".to_vec()));
    }

    /// Every call to `model_id` returns `result`
    pub fn succeed_with(&self, model_id: &str, result: ModelResult) {
        self.scripts.lock().entry(model_id.to_string()).or_default().sticky = Some(Ok(result));
    }

    /// Every call to `model_id` fails with `error`
    pub fn fail(&self, model_id: &str, error: ModelCallError) {
        self.scripts.lock().entry(model_id.to_string()).or_default().sticky = Some(Err(error));
    }

    /// The next `times` calls to `model_id` fail before the sticky answer applies
    pub fn fail_times(&self, model_id: &str, times: usize, error: ModelCallError) {
        let mut scripts = self.scripts.lock();
        let script = scripts.entry(model_id.to_string()).or_default();
        for _ in 0..times {
            script.queued.push_back(Err(error.clone()));
        }
    }

    /// Every call to `model_id` takes `delay` before answering
    pub fn delay(&self, model_id: &str, delay: Duration) {
        self.scripts.lock().entry(model_id.to_string()).or_default().delay = delay;
    }

    /// Model IDs in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, model_id: &str) -> usize {
        self.calls.lock().iter().filter(|m| *m == model_id).count()
    }
}

#[async_trait]
impl ModelApiClient for ScriptedClient {
    async fn call(
        &self,
        model: &Model,
        _request: &ModelRequest,
        _context: &RoutingContext,
    ) -> Result<ModelResult, ModelCallError> {
        self.calls.lock().push(model.id.clone());

        let (delay, outcome) = {
            let mut scripts = self.scripts.lock();
            match scripts.get_mut(&model.id) {
                Some(script) => {
                    let outcome = script
                        .queued
                        .pop_front()
                        .or_else(|| script.sticky.clone())
                        .unwrap_or_else(|| {
                            Err(ModelCallError::Transport("unscripted model".into()))
                        });
                    (script.delay, outcome)
                }
                None => (
                    Duration::ZERO,
                    Err(ModelCallError::Transport("unscripted model".into())),
                ),
            }
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        outcome
    }
}

// ============================================================================
// Static Monitor
// ============================================================================

/// Monitor serving fixed figures and collecting recorded samples
#[derive(Default)]
pub struct StaticMonitor {
    stats: Mutex<HashMap<String, PerformanceStats>>,
    failing: Mutex<bool>,
    recorded: Mutex<Vec<MetricSample>>,
}

impl StaticMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, model_id: &str, stats: PerformanceStats) {
        self.stats.lock().insert(model_id.to_string(), stats);
    }

    /// Make every lookup fail
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    pub fn recorded(&self) -> Vec<MetricSample> {
        self.recorded.lock().clone()
    }
}

#[async_trait]
impl PerformanceMonitor for StaticMonitor {
    async fn model_performance(
        &self,
        model_id: &str,
        _window: Duration,
    ) -> Result<PerformanceStats, CollaboratorError> {
        if *self.failing.lock() {
            return Err(CollaboratorError::Unavailable {
                component: "monitor",
                message: "scripted outage".to_string(),
            });
        }
        Ok(self.stats.lock().get(model_id).copied().unwrap_or(PerformanceStats {
            sample_count: 0,
            ..PerformanceStats::default()
        }))
    }

    async fn record_metric(&self, sample: MetricSample) {
        self.recorded.lock().push(sample);
    }
}

// ============================================================================
// Failing Registry
// ============================================================================

/// Registry that is always down
#[derive(Default)]
pub struct UnavailableRegistry;

#[async_trait]
impl ModelRegistry for UnavailableRegistry {
    async fn models_for_type(
        &self,
        _request_type: RequestType,
    ) -> Result<Vec<Model>, CollaboratorError> {
        Err(CollaboratorError::Unavailable {
            component: "registry",
            message: "scripted outage".to_string(),
        })
    }

    async fn active_models(&self) -> Result<Vec<Model>, CollaboratorError> {
        Err(CollaboratorError::Unavailable {
            component: "registry",
            message: "scripted outage".to_string(),
        })
    }
}
