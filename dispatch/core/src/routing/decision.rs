//! Routing Decision Construction
//!
//! Turns a ranked candidate list into a [`RoutingDecision`]: the selected
//! model, up to three alternatives, a confidence estimate, human-readable
//! reasoning and the fallback strategy the executor follows.

use std::time::Duration;

use crate::error::RoutingError;
use crate::models::{Complexity, Model, RequestType, Urgency};

use super::circuit_breaker::CircuitBreakerRegistry;
use super::scoring::{ScoredCandidate, ScoringContext};

/// Alternatives carried by a decision
pub const MAX_ALTERNATIVES: usize = 3;

/// How the executor reacts to a failed attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FallbackStrategy {
    /// Retry the selected model once before switching
    Retry,
    /// Switch to an alternative immediately
    Alternative,
}

impl FallbackStrategy {
    /// Retry only for routine requests nobody is waiting on
    #[must_use]
    pub fn for_request(urgency: Urgency, complexity: Complexity) -> Self {
        if urgency != Urgency::High && complexity == Complexity::Low {
            Self::Retry
        } else {
            Self::Alternative
        }
    }
}

impl std::fmt::Display for FallbackStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Retry => write!(f, "retry"),
            Self::Alternative => write!(f, "alternative"),
        }
    }
}

/// The engine's choice for one request
#[derive(Clone, Debug)]
pub struct RoutingDecision {
    pub request_id: String,
    pub request_type: RequestType,
    pub selected_model: Model,
    /// Score-descending, never contains the selected model
    pub alternative_models: Vec<Model>,
    pub confidence: f64,
    pub reasoning: Vec<String>,
    pub estimated_latency: Duration,
    pub estimated_cost: f64,
    pub estimated_tokens: u32,
    pub fallback_strategy: FallbackStrategy,
    /// Final score of the selected model
    pub score: f64,
    /// Time spent routing; filled in by the engine
    pub decision_time: Duration,
    /// Top-ranked model that was skipped because its breaker opened
    pub substituted_for: Option<String>,
}

impl RoutingDecision {
    /// Selected model ID
    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.selected_model.id
    }

    /// Alternative model IDs in order
    #[must_use]
    pub fn alternative_ids(&self) -> Vec<&str> {
        self.alternative_models.iter().map(|m| m.id.as_str()).collect()
    }
}

/// Confidence in a candidate, in [0, 1]
#[must_use]
pub fn confidence(candidate: &ScoredCandidate, ctx: &ScoringContext<'_>) -> f64 {
    let mut confidence = 0.5;
    if let Some(capability) = candidate.model.capability(ctx.request_type) {
        confidence += 0.3 * capability.quality_score;
    }
    if candidate.stats.availability > 0.95 {
        confidence += 0.2;
    }
    if candidate.stats.error_rate < 0.05 {
        confidence += 0.2;
    }
    confidence += f64::from(candidate.model.priority) / 100.0 * 0.1;
    confidence.clamp(0.0, 1.0)
}

fn reasoning(candidate: &ScoredCandidate, ctx: &ScoringContext<'_>) -> Vec<String> {
    let model = &candidate.model;
    let analysis = ctx.analysis;
    let mut lines = vec![
        format!(
            "Selected {} ({}) with score {:.3}",
            model.name, model.provider, candidate.score
        ),
        format!("Request complexity: {}", analysis.complexity),
        format!("Estimated tokens: {}", analysis.estimated_tokens),
        format!("Model priority: {}", model.priority),
        format!("Expected latency: {}ms", analysis.expected_latency.as_millis()),
    ];

    if analysis.urgency == Urgency::High {
        lines.push("High urgency request, favoring fast response".to_string());
    }
    if candidate.preference_boost > 0.0 {
        lines.push("Preferred by caller".to_string());
    }
    if ctx.config.cost_optimization {
        lines.push(format!(
            "Cost optimization enabled (estimated ${:.4})",
            candidate.estimated_cost
        ));
    }
    if ctx.config.latency_optimization {
        lines.push("Latency optimization enabled".to_string());
    }
    if ctx.config.quality_optimization {
        lines.push(format!(
            "Quality optimization enabled (target accuracy {:.2})",
            analysis.quality_requirements.accuracy
        ));
    }
    lines
}

/// Build the decision from best-first candidates
///
/// The top candidate's breaker is re-checked without claiming a probe; if
/// it opened since filtering, the first closed runner-up takes its place.
///
/// # Errors
///
/// - `NoAvailableModels` if `ranked` is empty
/// - `AllCircuitBreakersOpen` if the top candidate and every runner-up are
///   tripped
pub fn build_decision(
    request_id: &str,
    ranked: Vec<ScoredCandidate>,
    ctx: &ScoringContext<'_>,
    breakers: &CircuitBreakerRegistry,
) -> Result<RoutingDecision, RoutingError> {
    if ranked.is_empty() {
        return Err(RoutingError::NoAvailableModels {
            request_type: ctx.request_type,
        });
    }

    let mut ranked = ranked;
    let mut substituted_for = None;

    if breakers.peek_open(&ranked[0].model.id) {
        let tripped_id = ranked[0].model.id.clone();
        let runner_up = ranked
            .iter()
            .skip(1)
            .take(MAX_ALTERNATIVES)
            .position(|c| !breakers.peek_open(&c.model.id));

        match runner_up {
            Some(offset) => {
                let replacement = ranked.remove(offset + 1);
                ranked.remove(0);
                tracing::warn!(
                    request_id = %request_id,
                    tripped = %tripped_id,
                    model = %replacement.model.id,
                    "Top candidate breaker opened after filtering, substituting runner-up"
                );
                ranked.insert(0, replacement);
                substituted_for = Some(tripped_id);
            }
            None => {
                let candidates = ranked
                    .iter()
                    .take(MAX_ALTERNATIVES + 1)
                    .map(|c| c.model.id.clone())
                    .collect();
                return Err(RoutingError::AllCircuitBreakersOpen {
                    request_type: ctx.request_type,
                    candidates,
                });
            }
        }
    }

    let mut candidates = ranked.into_iter();
    let Some(selected) = candidates.next() else {
        return Err(RoutingError::NoAvailableModels {
            request_type: ctx.request_type,
        });
    };

    let mut lines = reasoning(&selected, ctx);
    if let Some(ref tripped) = substituted_for {
        lines.push(format!(
            "Substituted for {tripped}: circuit breaker opened after filtering"
        ));
    }

    Ok(RoutingDecision {
        request_id: request_id.to_string(),
        request_type: ctx.request_type,
        confidence: confidence(&selected, ctx),
        reasoning: lines,
        estimated_latency: selected.stats.average_latency,
        estimated_cost: selected.estimated_cost,
        estimated_tokens: ctx.analysis.estimated_tokens,
        fallback_strategy: FallbackStrategy::for_request(
            ctx.analysis.urgency,
            ctx.analysis.complexity,
        ),
        score: selected.score,
        decision_time: Duration::ZERO,
        alternative_models: candidates.take(MAX_ALTERNATIVES).map(|c| c.model).collect(),
        selected_model: selected.model,
        substituted_for,
    })
}
