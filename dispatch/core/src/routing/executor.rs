//! Retry and Failover Execution
//!
//! Issues the model call for a routing decision, retrying and failing over
//! according to the decision's fallback strategy. Every attempt is bounded
//! by the attempt timeout and raced against the caller's cancellation token
//! and deadline. Backoff between attempts is linear and is the only place
//! the engine sleeps.

use std::time::Duration;

use tokio::time::Instant;

use crate::collaborators::{ModelApiClient, PerformanceMonitor};
use crate::config::EngineConfig;
use crate::error::{AttemptFailure, CancelReason, ModelCallError, RoutingError};
use crate::models::{MetricSample, Model, ModelRequest, ModelResult, RoutingContext};

use super::circuit_breaker::CircuitBreakerRegistry;
use super::decision::{FallbackStrategy, RoutingDecision};
use super::metrics::MetricsCollector;

/// Borrowed engine state needed for one execution
#[derive(Clone, Copy)]
pub struct Executor<'a> {
    pub client: &'a dyn ModelApiClient,
    pub monitor: &'a dyn PerformanceMonitor,
    pub breakers: &'a CircuitBreakerRegistry,
    pub metrics: &'a MetricsCollector,
    pub config: &'a EngineConfig,
}

enum CallOutcome {
    Completed(Result<ModelResult, ModelCallError>),
    Stopped(CancelReason),
}

/// Model targeted by zero-based `attempt`
///
/// `Retry` gives the selected model one extra attempt before walking the
/// alternatives; `Alternative` walks them immediately. Once the
/// alternatives run out the last one is reused.
#[must_use]
pub fn planned_model(
    decision: &RoutingDecision,
    attempt: u32,
    enable_failover: bool,
) -> &Model {
    let alternatives = &decision.alternative_models;
    if !enable_failover || alternatives.is_empty() {
        return &decision.selected_model;
    }

    let same_model_attempts = match decision.fallback_strategy {
        FallbackStrategy::Alternative => 1,
        FallbackStrategy::Retry => 2,
    };
    if attempt < same_model_attempts {
        return &decision.selected_model;
    }

    let index = usize::try_from(attempt - same_model_attempts).unwrap_or(usize::MAX);
    let last = alternatives.len() - 1;
    alternatives
        .get(index.min(last))
        .unwrap_or(&decision.selected_model)
}

fn stop_reason(context: &RoutingContext) -> Option<CancelReason> {
    if context.cancellation.is_cancelled() {
        Some(CancelReason::Cancelled)
    } else if context.deadline.is_some_and(|d| Instant::now() >= d) {
        Some(CancelReason::DeadlineExceeded)
    } else {
        None
    }
}

async fn deadline_reached(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

impl Executor<'_> {
    /// Run the attempt loop until success, exhaustion or cancellation
    ///
    /// # Errors
    ///
    /// - `RequestFailedAfterRetries` once `max_retries` attempts have failed
    /// - `Cancelled` if the caller cancels or the deadline passes
    /// - `AllCircuitBreakersOpen` if no model of the decision admits a call
    pub async fn execute(
        &self,
        request: &ModelRequest,
        decision: &RoutingDecision,
        context: &RoutingContext,
    ) -> Result<ModelResult, RoutingError> {
        let max_attempts = self.config.max_retries.max(1);
        let mut attempt: u32 = 0;
        let mut models_tried: Vec<String> = Vec::new();
        let mut previous: Option<String> = None;

        loop {
            if let Some(reason) = stop_reason(context) {
                return Err(self.cancelled(request, attempt, models_tried, reason));
            }

            let Some(model) = self.admitted_model(request, decision, attempt) else {
                return Err(self.all_breakers_open(request, decision));
            };
            if let Some(ref prev) = previous {
                if prev != &model.id {
                    self.metrics.record_fallback(prev, &model.id);
                }
            }
            if !models_tried.contains(&model.id) {
                models_tried.push(model.id.clone());
            }
            previous = Some(model.id.clone());

            tracing::debug!(
                request_id = %request.request_id,
                model = %model.id,
                attempt,
                "Dispatching attempt"
            );
            self.metrics.record_attempt();
            let breaker = self.breakers.breaker(&model.id);
            let started = Instant::now();

            let error = match self.call_once(model, request, context).await {
                CallOutcome::Completed(Ok(result)) => {
                    let latency = started.elapsed();
                    self.record_success(model, decision, &result, latency).await;
                    breaker.record_success();
                    self.metrics.record_execution_success();
                    tracing::debug!(
                        request_id = %request.request_id,
                        model = %model.id,
                        attempt,
                        latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        "Attempt succeeded"
                    );
                    return Ok(result);
                }
                CallOutcome::Completed(Err(error)) => error,
                CallOutcome::Stopped(reason) => {
                    return Err(self.cancelled(request, attempt + 1, models_tried, reason));
                }
            };

            let failure = AttemptFailure {
                model_id: model.id.clone(),
                attempt,
                elapsed: started.elapsed(),
                error,
            };
            tracing::warn!(
                request_id = %request.request_id,
                model = %model.id,
                attempt,
                error = %failure.error,
                "Attempt failed"
            );
            self.monitor
                .record_metric(MetricSample::failure(
                    &model.id,
                    failure.elapsed,
                    failure.error.error_type(),
                ))
                .await;
            breaker.record_failure();
            attempt += 1;

            if attempt >= max_attempts {
                self.metrics.record_execution_failure();
                return Err(RoutingError::RequestFailedAfterRetries {
                    attempts: attempt,
                    models_tried,
                    last_error: failure,
                });
            }

            let delay = self.config.retry_delay * attempt;
            if let Some(reason) = Self::backoff(delay, context).await {
                return Err(self.cancelled(request, attempt, models_tried, reason));
            }
        }
    }

    /// Planned model for `attempt`, or the first other decision model whose
    /// breaker admits the call
    ///
    /// Admission is claimed here, right before the call, so a due half-open
    /// probe goes to a request that actually calls the model. Only the
    /// returned model's breaker is claimed.
    fn admitted_model<'d>(
        &self,
        request: &ModelRequest,
        decision: &'d RoutingDecision,
        attempt: u32,
    ) -> Option<&'d Model> {
        let planned = planned_model(decision, attempt, self.config.enable_failover);
        if !self.breakers.breaker(&planned.id).is_open() {
            return Some(planned);
        }
        if !self.config.enable_failover {
            return None;
        }

        let replacement = std::iter::once(&decision.selected_model)
            .chain(&decision.alternative_models)
            .filter(|m| m.id != planned.id)
            .find(|m| !self.breakers.breaker(&m.id).is_open())?;
        tracing::debug!(
            request_id = %request.request_id,
            refused = %planned.id,
            model = %replacement.id,
            attempt,
            "Planned model refused by its breaker, trying next"
        );
        Some(replacement)
    }

    fn all_breakers_open(
        &self,
        request: &ModelRequest,
        decision: &RoutingDecision,
    ) -> RoutingError {
        let candidates: Vec<String> = std::iter::once(&decision.selected_model)
            .chain(&decision.alternative_models)
            .map(|m| m.id.clone())
            .collect();
        self.metrics.record_execution_failure();
        tracing::warn!(
            request_id = %request.request_id,
            candidates = ?candidates,
            "Every model of the decision has an open circuit breaker"
        );
        RoutingError::AllCircuitBreakersOpen {
            request_type: decision.request_type,
            candidates,
        }
    }

    async fn call_once(
        &self,
        model: &Model,
        request: &ModelRequest,
        context: &RoutingContext,
    ) -> CallOutcome {
        let timeout = self.config.attempt_timeout;
        let call = tokio::time::timeout(timeout, self.client.call(model, request, context));

        tokio::select! {
            biased;
            () = context.cancellation.cancelled() => CallOutcome::Stopped(CancelReason::Cancelled),
            () = deadline_reached(context.deadline) => {
                CallOutcome::Stopped(CancelReason::DeadlineExceeded)
            }
            result = call => CallOutcome::Completed(
                result.unwrap_or(Err(ModelCallError::Timeout(timeout)))
            ),
        }
    }

    /// Linear backoff; returns why it was cut short, if it was
    async fn backoff(delay: Duration, context: &RoutingContext) -> Option<CancelReason> {
        if delay.is_zero() {
            return None;
        }
        tokio::select! {
            biased;
            () = context.cancellation.cancelled() => Some(CancelReason::Cancelled),
            () = deadline_reached(context.deadline) => Some(CancelReason::DeadlineExceeded),
            () = tokio::time::sleep(delay) => None,
        }
    }

    async fn record_success(
        &self,
        model: &Model,
        decision: &RoutingDecision,
        result: &ModelResult,
        latency: Duration,
    ) {
        let cost = result.usage.map_or_else(
            || model.pricing.estimate(decision.estimated_tokens),
            |usage| model.pricing.cost_of(usage),
        );
        let accuracy = result
            .estimated_accuracy
            .or_else(|| model.capability(decision.request_type).map(|c| c.quality_score));

        self.monitor
            .record_metric(MetricSample::success(&model.id, latency, cost, accuracy))
            .await;
    }

    fn cancelled(
        &self,
        request: &ModelRequest,
        attempts: u32,
        models_tried: Vec<String>,
        reason: CancelReason,
    ) -> RoutingError {
        self.metrics.record_execution_cancelled();
        tracing::info!(
            request_id = %request.request_id,
            attempts,
            reason = %reason,
            "Request stopped before completion"
        );
        RoutingError::Cancelled {
            attempts,
            models_tried,
            reason,
        }
    }
}
