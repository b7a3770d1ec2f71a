//! Multi-Objective Scoring
//!
//! Every candidate gets four component scores in [0, 1] which are combined
//! with the configured weights. Ranking is fully deterministic: score, then
//! priority, then usage (with load balancing), then model ID.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Duration;

use futures::future::join_all;

use crate::collaborators::PerformanceMonitor;
use crate::config::EngineConfig;
use crate::models::{Model, PerformanceStats, RequestAnalysis, RequestType, RoutingContext};

/// Estimated cost at which the cost score bottoms out
pub const COST_CEILING: f64 = 0.10;

/// Added to the final score of caller-preferred models
pub const PREFERENCE_BOOST: f64 = 0.1;

/// Latency ratio at which the latency term bottoms out
const LATENCY_RATIO_CAP: f64 = 2.0;

// ============================================================================
// Scored Candidate
// ============================================================================

/// A candidate with its score breakdown
#[derive(Clone, Debug, PartialEq)]
pub struct ScoredCandidate {
    pub model: Model,
    /// Figures the performance and availability scores were computed from
    pub stats: PerformanceStats,
    pub performance: f64,
    pub cost: f64,
    pub quality: f64,
    pub availability: f64,
    pub preference_boost: f64,
    /// Weighted total, clamped
    pub score: f64,
    pub estimated_cost: f64,
}

/// Shared inputs for scoring one request
#[derive(Clone, Copy, Debug)]
pub struct ScoringContext<'a> {
    pub request_type: RequestType,
    pub analysis: &'a RequestAnalysis,
    pub context: &'a RoutingContext,
    pub config: &'a EngineConfig,
}

// ============================================================================
// Component Scores
// ============================================================================

#[must_use]
pub fn performance_score(stats: &PerformanceStats, expected_latency: Duration) -> f64 {
    let ratio = if expected_latency.is_zero() {
        LATENCY_RATIO_CAP
    } else {
        let raw = stats.average_latency.as_secs_f64() / expected_latency.as_secs_f64();
        raw.min(LATENCY_RATIO_CAP)
    };

    let latency_term = 0.4 * (1.0 - ratio).max(0.0);
    let throughput_term = 0.3 * (stats.throughput / 10.0).min(1.0);
    let reliability_term = 0.3 * (1.0 - stats.error_rate).max(0.0);

    clamp_unit(0.5 + latency_term + throughput_term + reliability_term)
}

#[must_use]
pub fn cost_score(estimated_cost: f64, cost_optimization: bool) -> f64 {
    if !cost_optimization {
        return 0.5;
    }
    clamp_unit(1.0 - (estimated_cost / COST_CEILING).min(1.0))
}

/// Declared quality adjusted for distance from the accuracy target and for
/// model priority
#[must_use]
pub fn quality_score(model: &Model, request_type: RequestType, accuracy: f64) -> f64 {
    let declared = model
        .capability(request_type)
        .map_or(0.0, |c| c.quality_score);
    let priority = f64::from(model.priority) / 100.0;
    clamp_unit(declared - 0.2 * (declared - accuracy).abs() + 0.1 * priority)
}

#[must_use]
pub fn availability_score(stats: &PerformanceStats) -> f64 {
    clamp_unit(stats.availability)
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

// ============================================================================
// Scoring and Ranking
// ============================================================================

/// Score one candidate against the request
#[must_use]
pub fn score_candidate(
    model: Model,
    stats: PerformanceStats,
    ctx: &ScoringContext<'_>,
) -> ScoredCandidate {
    let weights = ctx.config.weights;
    let estimated_cost = model.pricing.estimate(ctx.analysis.estimated_tokens);

    let performance = performance_score(&stats, ctx.analysis.expected_latency);
    let cost = cost_score(estimated_cost, ctx.config.cost_optimization);
    let quality = quality_score(
        &model,
        ctx.request_type,
        ctx.analysis.quality_requirements.accuracy,
    );
    let availability = availability_score(&stats);
    let preference_boost = if ctx.context.prefers(&model.id) {
        PREFERENCE_BOOST
    } else {
        0.0
    };

    let weighted = weights.performance * performance
        + weights.cost * cost
        + weights.quality * quality
        + weights.availability * availability;

    ScoredCandidate {
        model,
        stats,
        performance,
        cost,
        quality,
        availability,
        preference_boost,
        score: clamp_unit(weighted + preference_boost),
        estimated_cost,
    }
}

/// Look up live figures for every candidate concurrently
///
/// Falls back to the model's static snapshot when the monitor has no
/// samples or fails.
pub async fn resolve_stats(
    monitor: &dyn PerformanceMonitor,
    models: &[Model],
    window: Duration,
) -> Vec<PerformanceStats> {
    let lookups = models
        .iter()
        .map(|model| monitor.model_performance(&model.id, window));
    let results = join_all(lookups).await;

    models
        .iter()
        .zip(results)
        .map(|(model, result)| match result {
            Ok(stats) if stats.has_samples() => stats,
            Ok(_) => model.performance,
            Err(e) => {
                tracing::warn!(
                    model = %model.id,
                    error = %e,
                    "Performance lookup failed, using static snapshot"
                );
                model.performance
            }
        })
        .collect()
}

/// Score every candidate and sort best-first
pub async fn score_candidates(
    monitor: &dyn PerformanceMonitor,
    candidates: Vec<Model>,
    ctx: &ScoringContext<'_>,
    usage: &HashMap<String, u64>,
) -> Vec<ScoredCandidate> {
    let stats = resolve_stats(monitor, &candidates, ctx.config.performance_window).await;
    let scored = candidates
        .into_iter()
        .zip(stats)
        .map(|(model, stats)| score_candidate(model, stats, ctx))
        .collect();
    rank(scored, ctx.config.enable_load_balancing, usage)
}

/// Deterministic best-first ordering
#[must_use]
pub fn rank(
    mut scored: Vec<ScoredCandidate>,
    load_balancing: bool,
    usage: &HashMap<String, u64>,
) -> Vec<ScoredCandidate> {
    let usage_of = |c: &ScoredCandidate| usage.get(&c.model.id).copied().unwrap_or(0);
    scored.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.model.priority.cmp(&a.model.priority))
            .then_with(|| {
                if load_balancing {
                    usage_of(a).cmp(&usage_of(b))
                } else {
                    Ordering::Equal
                }
            })
            .then_with(|| a.model.id.cmp(&b.model.id))
    });
    scored
}
