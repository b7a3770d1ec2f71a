//! Routing Engine
//!
//! The main entry point. Coordinates candidate filtering, scoring, decision
//! construction and execution, and owns the breakers and metrics they share.
//!
//! # Usage
//!
//! ```ignore
//! let engine = Arc::new(RoutingEngine::new(collaborators, EngineConfig::default())?);
//!
//! let decision = engine.route(&request, &context).await?;
//! let result = engine.execute_request(&request, &decision, &context).await?;
//! ```

use parking_lot::RwLock;
use tokio::time::Instant;

use crate::collaborators::Collaborators;
use crate::config::{ConfigError, ConfigUpdate, EngineConfig};
use crate::error::RoutingError;
use crate::models::{ModelRequest, ModelResult, RoutingContext};

use super::circuit_breaker::{CircuitBreakerRegistry, CircuitBreakerState};
use super::decision::{build_decision, RoutingDecision};
use super::executor::Executor;
use super::filter::{filter_candidates, FilterOptions};
use super::metrics::{
    ExecutionMetrics, HealthStatus, HistogramSnapshot, MetricsCollector, RoutingMetrics,
};
use super::scoring::{score_candidates, ScoringContext};

/// Adaptive routing engine, shared through `Arc`
pub struct RoutingEngine {
    collaborators: Collaborators,
    /// Cloned once per operation so a hot swap never tears a request
    config: RwLock<EngineConfig>,
    breakers: CircuitBreakerRegistry,
    metrics: MetricsCollector,
}

impl RoutingEngine {
    /// Create an engine
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if `config` is invalid.
    pub fn new(collaborators: Collaborators, config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        tracing::info!(
            max_retries = config.max_retries,
            load_balancing = config.enable_load_balancing,
            failover = config.enable_failover,
            failure_threshold = config.breaker.failure_threshold,
            "Routing engine initialized"
        );
        Ok(Self {
            breakers: CircuitBreakerRegistry::new(config.breaker),
            config: RwLock::new(config),
            metrics: MetricsCollector::new(),
            collaborators,
        })
    }

    /// Current configuration
    pub fn config(&self) -> EngineConfig {
        self.config.read().clone()
    }

    /// Choose a model for `request`
    ///
    /// # Errors
    ///
    /// `NoAvailableModels`, `AllCircuitBreakersOpen`, or `Collaborator` if
    /// the registry fails.
    pub async fn route(
        &self,
        request: &ModelRequest,
        context: &RoutingContext,
    ) -> Result<RoutingDecision, RoutingError> {
        let started = Instant::now();
        let outcome = self.decide(request, context).await;
        let decision_time = started.elapsed();

        match outcome {
            Ok(mut decision) => {
                decision.decision_time = decision_time;
                self.metrics
                    .record_route_success(decision.model_id(), decision_time);
                if let Some(ref tripped) = decision.substituted_for {
                    self.metrics.record_fallback(tripped, decision.model_id());
                }
                tracing::debug!(
                    request_id = %request.request_id,
                    model = %decision.model_id(),
                    score = decision.score,
                    confidence = decision.confidence,
                    strategy = %decision.fallback_strategy,
                    alternatives = ?decision.alternative_ids(),
                    "Routing decision made"
                );
                Ok(decision)
            }
            Err(e) => {
                self.metrics.record_route_failure(decision_time);
                tracing::warn!(
                    request_id = %request.request_id,
                    request_type = %request.request_type,
                    error = %e,
                    "Routing failed"
                );
                Err(e)
            }
        }
    }

    async fn decide(
        &self,
        request: &ModelRequest,
        context: &RoutingContext,
    ) -> Result<RoutingDecision, RoutingError> {
        let config = self.config();
        let analysis = self.collaborators.analyzer.analyze(request, context);
        let usage = self.metrics.usage();

        let candidates = filter_candidates(
            self.collaborators.registry.as_ref(),
            &self.breakers,
            request.request_type,
            &analysis,
            FilterOptions {
                load_balancing: config.enable_load_balancing,
                usage: &usage,
            },
        )
        .await?;

        let ctx = ScoringContext {
            request_type: request.request_type,
            analysis: &analysis,
            context,
            config: &config,
        };
        let ranked =
            score_candidates(self.collaborators.monitor.as_ref(), candidates, &ctx, &usage).await;
        build_decision(&request.request_id, ranked, &ctx, &self.breakers)
    }

    /// Run `decision` with retries and failover
    ///
    /// # Errors
    ///
    /// `RequestFailedAfterRetries` when the retry budget is spent, or
    /// `Cancelled` when the caller's token fires or its deadline passes.
    pub async fn execute_request(
        &self,
        request: &ModelRequest,
        decision: &RoutingDecision,
        context: &RoutingContext,
    ) -> Result<ModelResult, RoutingError> {
        let config = self.config();
        let executor = Executor {
            client: self.collaborators.client.as_ref(),
            monitor: self.collaborators.monitor.as_ref(),
            breakers: &self.breakers,
            metrics: &self.metrics,
            config: &config,
        };
        executor.execute(request, decision, context).await
    }

    /// Route and execute in one call
    ///
    /// # Errors
    ///
    /// Any error from [`route`](Self::route) or
    /// [`execute_request`](Self::execute_request).
    pub async fn dispatch(
        &self,
        request: &ModelRequest,
        context: &RoutingContext,
    ) -> Result<ModelResult, RoutingError> {
        let decision = self.route(request, context).await?;
        self.execute_request(request, &decision, context).await
    }

    /// Snapshot of routing counters
    pub fn metrics(&self) -> RoutingMetrics {
        self.metrics.snapshot()
    }

    /// Snapshot of execution counters
    pub fn execution_metrics(&self) -> ExecutionMetrics {
        self.metrics.execution()
    }

    pub fn decision_time_histogram(&self) -> HistogramSnapshot {
        self.metrics.decision_time_histogram()
    }

    /// Validate and apply a partial configuration change
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` and leaves the configuration unchanged if
    /// the result would be invalid.
    pub fn update_config(&self, update: ConfigUpdate) -> Result<(), ConfigError> {
        let mut config = self.config.write();
        config.apply_update(&update)?;
        tracing::info!(
            max_retries = config.max_retries,
            load_balancing = config.enable_load_balancing,
            failover = config.enable_failover,
            cost_optimization = config.cost_optimization,
            "Routing configuration updated"
        );
        Ok(())
    }

    /// Engine health
    ///
    /// A registry failure reports zero active models.
    pub async fn health_status(&self) -> HealthStatus {
        let active_models = match self.collaborators.registry.active_models().await {
            Ok(models) => models.len(),
            Err(e) => {
                tracing::warn!(error = %e, "Registry unavailable during health check");
                0
            }
        };
        HealthStatus::evaluate(active_models, self.breakers.open_count(), &self.metrics.snapshot())
    }

    /// Breaker snapshot for one model, if the engine has seen it
    pub fn breaker_state(&self, model_id: &str) -> Option<CircuitBreakerState> {
        self.breakers.get(model_id).map(|b| b.snapshot())
    }

    /// Breaker snapshots for every model the engine has seen
    pub fn breaker_states(&self) -> Vec<CircuitBreakerState> {
        self.breakers.snapshots()
    }

    /// Prometheus text exposition
    pub fn prometheus_metrics(&self) -> String {
        self.metrics.to_prometheus(&self.breakers.snapshots())
    }
}

impl std::fmt::Debug for RoutingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingEngine")
            .field("config", &*self.config.read())
            .field("breakers", &self.breakers.snapshots().len())
            .finish_non_exhaustive()
    }
}
