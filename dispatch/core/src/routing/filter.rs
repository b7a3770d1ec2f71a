//! Candidate Filtering
//!
//! Narrows the registry's models for a request type down to the ones that
//! can actually take the request right now.

use std::collections::HashMap;

use crate::collaborators::ModelRegistry;
use crate::error::RoutingError;
use crate::models::{Model, RequestAnalysis, RequestType};

use super::circuit_breaker::CircuitBreakerRegistry;

/// Inputs that shape filtering besides the model list
#[derive(Clone, Copy, Debug)]
pub struct FilterOptions<'a> {
    pub load_balancing: bool,
    /// Committed routes per model
    pub usage: &'a HashMap<String, u64>,
}

/// Fetch and filter candidates for one request
///
/// # Errors
///
/// - `Collaborator` if the registry fails
/// - `NoAvailableModels` if no model has the capability and token budget
/// - `AllCircuitBreakersOpen` if capable models exist but all are tripped
///
/// Breakers are only peeked here; a due half-open probe is claimed by the
/// executor when it actually calls the model.
pub async fn filter_candidates(
    registry: &dyn ModelRegistry,
    breakers: &CircuitBreakerRegistry,
    request_type: RequestType,
    analysis: &RequestAnalysis,
    options: FilterOptions<'_>,
) -> Result<Vec<Model>, RoutingError> {
    let models = registry.models_for_type(request_type).await?;
    let capable = capable_models(models, request_type, analysis);

    if capable.is_empty() {
        return Err(RoutingError::NoAvailableModels { request_type });
    }

    let capable_ids: Vec<String> = capable.iter().map(|m| m.id.clone()).collect();
    let mut admitted: Vec<Model> = capable
        .into_iter()
        .filter(|m| !breakers.peek_open(&m.id))
        .collect();

    if admitted.is_empty() {
        tracing::warn!(
            request_type = %request_type,
            candidates = ?capable_ids,
            "Every capable model has an open circuit breaker"
        );
        return Err(RoutingError::AllCircuitBreakersOpen {
            request_type,
            candidates: capable_ids,
        });
    }

    if options.load_balancing {
        // Stable, so equal usage keeps registry order
        admitted.sort_by_key(|m| options.usage.get(&m.id).copied().unwrap_or(0));
    }

    Ok(admitted)
}

/// Models that support the type, cover every required tag and fit the
/// estimated token count
pub fn capable_models(
    models: Vec<Model>,
    request_type: RequestType,
    analysis: &RequestAnalysis,
) -> Vec<Model> {
    models
        .into_iter()
        .filter(|model| {
            let Some(capability) = model.capability(request_type) else {
                return false;
            };
            let covers_tags = analysis
                .required_capabilities
                .iter()
                .all(|tag| capability.supports_tag(tag, request_type));
            covers_tags && capability.max_tokens >= analysis.estimated_tokens
        })
        .collect()
}
