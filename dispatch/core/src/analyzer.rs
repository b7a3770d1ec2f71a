//! Heuristic Request Analyzer
//!
//! Derives a [`RequestAnalysis`] from the request bytes alone, without
//! calling any model. Payloads that are not UTF-8 are analyzed by size only.

use crate::collaborators::RequestAnalyzer;
use crate::models::{
    Complexity, ModelRequest, QualityRequirements, RequestAnalysis, RoutingContext, Urgency,
};

/// Bytes per token used for size estimates
pub const BYTES_PER_TOKEN: usize = 4;

/// Phrases that usually indicate multi-step reasoning
const REASONING_MARKERS: &[&str] = &[
    "explain",
    "analyze",
    "analyse",
    "compare",
    "step by step",
    "prove",
    "derive",
    "why",
];

/// Size and keyword based analyzer
#[derive(Clone, Debug)]
pub struct HeuristicAnalyzer {
    /// Token count above which a request is at least medium complexity
    pub medium_token_threshold: u32,
    /// Token count above which a request is high complexity
    pub high_token_threshold: u32,
}

impl Default for HeuristicAnalyzer {
    fn default() -> Self {
        Self {
            medium_token_threshold: 500,
            high_token_threshold: 2000,
        }
    }
}

impl HeuristicAnalyzer {
    /// Create an analyzer with default thresholds
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Estimate tokens from payload size
    #[must_use]
    pub fn estimate_tokens(payload: &[u8]) -> u32 {
        u32::try_from(payload.len().div_ceil(BYTES_PER_TOKEN)).unwrap_or(u32::MAX)
    }

    fn reasoning_markers(payload: &[u8]) -> usize {
        let Ok(text) = std::str::from_utf8(payload) else {
            return 0;
        };
        let text = text.to_lowercase();
        REASONING_MARKERS
            .iter()
            .filter(|marker| text.contains(*marker))
            .count()
    }

    fn complexity(&self, tokens: u32, markers: usize) -> Complexity {
        if tokens > self.high_token_threshold || markers >= 2 {
            Complexity::High
        } else if tokens > self.medium_token_threshold || markers == 1 {
            Complexity::Medium
        } else {
            Complexity::Low
        }
    }
}

impl RequestAnalyzer for HeuristicAnalyzer {
    fn analyze(&self, request: &ModelRequest, context: &RoutingContext) -> RequestAnalysis {
        let estimated_tokens = Self::estimate_tokens(&request.payload);
        let markers = Self::reasoning_markers(&request.payload);
        let complexity = self.complexity(estimated_tokens, markers);
        let urgency = context.urgency.unwrap_or_default();

        let accuracy = request.quality_target.unwrap_or(match complexity {
            Complexity::Low => 0.7,
            Complexity::Medium => 0.8,
            Complexity::High => 0.9,
        });

        let expected_latency = request.max_latency.unwrap_or_else(|| {
            let budget = request.request_type.default_latency();
            if urgency == Urgency::High {
                budget / 2
            } else {
                budget
            }
        });

        RequestAnalysis {
            estimated_tokens,
            complexity,
            urgency,
            required_capabilities: request.required_capabilities.clone(),
            quality_requirements: QualityRequirements { accuracy },
            expected_latency,
        }
    }
}
