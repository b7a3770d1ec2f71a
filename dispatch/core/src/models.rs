//! Routing Data Model
//!
//! Value types exchanged between the engine and its collaborators: models
//! and their capabilities, request analyses, requests, results and metric
//! samples. Everything here is plain data; behavior lives in `routing`.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Assumed ratio of output tokens to input tokens when estimating cost.
///
/// Cost estimation has no visibility into the response size, so every
/// estimate assumes the response is 30% of the request.
pub const OUTPUT_TOKEN_RATIO: f64 = 0.3;

// ============================================================================
// Request Types
// ============================================================================

/// Kind of capability a request needs from a backend
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    /// Free-form text generation (chat, completion)
    TextGeneration,
    /// Vector embeddings for retrieval
    Embedding,
    /// Relevance ranking of search results
    SearchRanking,
    /// Label assignment
    Classification,
    /// Condensing long inputs
    Summarization,
}

impl RequestType {
    /// Stable tag used for capability matching
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TextGeneration => "text_generation",
            Self::Embedding => "embedding",
            Self::SearchRanking => "search_ranking",
            Self::Classification => "classification",
            Self::Summarization => "summarization",
        }
    }

    /// Latency budget used when a request carries no explicit bound
    #[must_use]
    pub fn default_latency(&self) -> Duration {
        match self {
            Self::TextGeneration => Duration::from_millis(2_000),
            Self::Embedding => Duration::from_millis(200),
            Self::SearchRanking => Duration::from_millis(300),
            Self::Classification => Duration::from_millis(500),
            Self::Summarization => Duration::from_millis(3_000),
        }
    }
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Estimated difficulty of a request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    /// Short, routine requests
    #[default]
    Low,
    /// Moderate size or reasoning
    Medium,
    /// Long inputs or multi-step reasoning
    High,
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// How quickly the caller needs an answer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    /// Background work
    Low,
    /// Interactive but tolerant
    #[default]
    Normal,
    /// User is waiting
    High,
}

impl std::fmt::Display for Urgency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Normal => write!(f, "normal"),
            Self::High => write!(f, "high"),
        }
    }
}

// ============================================================================
// Models
// ============================================================================

/// What a model offers for one request type
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelCapability {
    /// Largest request (in tokens) the model accepts
    pub max_tokens: u32,
    /// Declared quality (0.0 - 1.0)
    pub quality_score: f64,
    /// Capability tags, e.g. `"code"`, `"multilingual"`
    pub specializations: Vec<String>,
}

impl ModelCapability {
    /// Create a capability without specializations
    #[must_use]
    pub fn new(max_tokens: u32, quality_score: f64) -> Self {
        Self {
            max_tokens,
            quality_score,
            specializations: Vec::new(),
        }
    }

    /// Add specialization tags
    #[must_use]
    pub fn with_specializations<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.specializations.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Check whether a capability tag is satisfied for `request_type`.
    ///
    /// The request type tag itself always matches.
    #[must_use]
    pub fn supports_tag(&self, tag: &str, request_type: RequestType) -> bool {
        tag == request_type.as_str() || self.specializations.iter().any(|s| s == tag)
    }
}

/// Token pricing in dollars per 1000 tokens
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    /// Cost per 1000 input tokens
    pub input_token_cost: f64,
    /// Cost per 1000 output tokens
    pub output_token_cost: f64,
}

impl Pricing {
    /// Create pricing from per-1000-token costs
    #[must_use]
    pub fn new(input_token_cost: f64, output_token_cost: f64) -> Self {
        Self {
            input_token_cost,
            output_token_cost,
        }
    }

    /// Cost of a request of `estimated_tokens`, assuming [`OUTPUT_TOKEN_RATIO`]
    #[must_use]
    pub fn estimate(&self, estimated_tokens: u32) -> f64 {
        let input = f64::from(estimated_tokens);
        let output = input * OUTPUT_TOKEN_RATIO;
        (input / 1000.0) * self.input_token_cost + (output / 1000.0) * self.output_token_cost
    }

    /// Cost of an actual exchange
    #[must_use]
    pub fn cost_of(&self, usage: TokenUsage) -> f64 {
        (f64::from(usage.input_tokens) / 1000.0) * self.input_token_cost
            + (f64::from(usage.output_tokens) / 1000.0) * self.output_token_cost
    }
}

/// Rolling performance figures for one model
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    /// Mean latency over the window
    pub average_latency: Duration,
    /// Requests per second
    pub throughput: f64,
    /// Failed fraction (0.0 - 1.0)
    pub error_rate: f64,
    /// Successful fraction (0.0 - 1.0)
    pub availability: f64,
    /// Number of samples the figures were computed from
    pub sample_count: u64,
}

impl Default for PerformanceStats {
    fn default() -> Self {
        Self {
            average_latency: Duration::from_millis(1000),
            throughput: 1.0,
            error_rate: 0.0,
            availability: 1.0,
            sample_count: 0,
        }
    }
}

impl PerformanceStats {
    /// Whether these figures came from observed traffic
    #[must_use]
    pub fn has_samples(&self) -> bool {
        self.sample_count > 0
    }
}

/// A backend model capable of serving one or more request types
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Unique model identifier
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Provider hosting the model
    pub provider: String,
    /// Capability per supported request type
    pub capabilities: HashMap<RequestType, ModelCapability>,
    /// Static priority (0 - 100)
    pub priority: u8,
    /// Token pricing
    pub pricing: Pricing,
    /// Static performance snapshot, used until live samples exist
    pub performance: PerformanceStats,
}

impl Model {
    /// Create a model with no capabilities and default priority
    pub fn new(id: impl Into<String>, provider: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            provider: provider.into(),
            capabilities: HashMap::new(),
            priority: 50,
            pricing: Pricing::default(),
            performance: PerformanceStats::default(),
        }
    }

    /// Set the display name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the priority, clamped to 0 - 100
    #[must_use]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.min(100);
        self
    }

    /// Set pricing
    #[must_use]
    pub fn with_pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = pricing;
        self
    }

    /// Set the static performance snapshot
    #[must_use]
    pub fn with_performance(mut self, performance: PerformanceStats) -> Self {
        self.performance = performance;
        self
    }

    /// Advertise a capability
    #[must_use]
    pub fn with_capability(
        mut self,
        request_type: RequestType,
        capability: ModelCapability,
    ) -> Self {
        self.capabilities.insert(request_type, capability);
        self
    }

    /// Capability for a request type, if advertised
    #[must_use]
    pub fn capability(&self, request_type: RequestType) -> Option<&ModelCapability> {
        self.capabilities.get(&request_type)
    }

    /// Whether the model advertises a request type
    #[must_use]
    pub fn supports(&self, request_type: RequestType) -> bool {
        self.capabilities.contains_key(&request_type)
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Accuracy targets derived from a request
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct QualityRequirements {
    /// Desired accuracy (0.0 - 1.0)
    pub accuracy: f64,
}

impl Default for QualityRequirements {
    fn default() -> Self {
        Self { accuracy: 0.8 }
    }
}

/// Structured requirements of one request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestAnalysis {
    /// Estimated request size in tokens
    pub estimated_tokens: u32,
    /// Estimated difficulty
    pub complexity: Complexity,
    /// How quickly an answer is needed
    pub urgency: Urgency,
    /// Capability tags every candidate must cover
    pub required_capabilities: Vec<String>,
    /// Quality targets
    pub quality_requirements: QualityRequirements,
    /// Latency the caller expects
    pub expected_latency: Duration,
}

impl Default for RequestAnalysis {
    fn default() -> Self {
        Self {
            estimated_tokens: 0,
            complexity: Complexity::Low,
            urgency: Urgency::Normal,
            required_capabilities: Vec::new(),
            quality_requirements: QualityRequirements::default(),
            expected_latency: Duration::from_millis(1000),
        }
    }
}

/// A request to dispatch; the payload is opaque to the engine
#[derive(Clone, Debug)]
pub struct ModelRequest {
    /// Unique request ID
    pub request_id: String,
    /// Capability needed
    pub request_type: RequestType,
    /// Opaque request body forwarded to the model API
    pub payload: Vec<u8>,
    /// Capability tags the serving model must offer
    pub required_capabilities: Vec<String>,
    /// Explicit latency bound
    pub max_latency: Option<Duration>,
    /// Explicit accuracy target (0.0 - 1.0)
    pub quality_target: Option<f64>,
}

impl ModelRequest {
    /// Create a request with a fresh ID
    pub fn new(request_type: RequestType, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            request_type,
            payload: payload.into(),
            required_capabilities: Vec::new(),
            max_latency: None,
            quality_target: None,
        }
    }

    /// Require a capability tag
    #[must_use]
    pub fn with_capability(mut self, tag: impl Into<String>) -> Self {
        self.required_capabilities.push(tag.into());
        self
    }

    /// Bound the expected latency
    #[must_use]
    pub fn with_max_latency(mut self, latency: Duration) -> Self {
        self.max_latency = Some(latency);
        self
    }

    /// Set an accuracy target
    #[must_use]
    pub fn with_quality_target(mut self, accuracy: f64) -> Self {
        self.quality_target = Some(accuracy.clamp(0.0, 1.0));
        self
    }
}

/// Caller-side context for one request
#[derive(Clone, Debug, Default)]
pub struct RoutingContext {
    /// Models the caller prefers
    pub preferred_models: Vec<String>,
    /// Overrides the analyzer's urgency
    pub urgency: Option<Urgency>,
    /// Cancelled when the caller abandons the request
    pub cancellation: CancellationToken,
    /// Hard deadline for the whole request including retries
    pub deadline: Option<tokio::time::Instant>,
}

impl RoutingContext {
    /// Create an empty context
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefer a model
    #[must_use]
    pub fn with_preferred_model(mut self, model_id: impl Into<String>) -> Self {
        self.preferred_models.push(model_id.into());
        self
    }

    /// Override urgency
    #[must_use]
    pub fn with_urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = Some(urgency);
        self
    }

    /// Use a caller-owned cancellation token
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Set a deadline relative to now
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(tokio::time::Instant::now() + timeout);
        self
    }

    /// Whether the caller prefers `model_id`
    #[must_use]
    pub fn prefers(&self, model_id: &str) -> bool {
        self.preferred_models.iter().any(|m| m == model_id)
    }
}

// ============================================================================
// Results and Samples
// ============================================================================

/// Token counts reported by a backend
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the request
    pub input_tokens: u32,
    /// Tokens produced by the model
    pub output_tokens: u32,
}

/// Successful response from a model call
#[derive(Clone, Debug, PartialEq)]
pub struct ModelResult {
    /// Model that produced the response
    pub model_id: String,
    /// Opaque response body
    pub payload: Vec<u8>,
    /// Reported token usage
    pub usage: Option<TokenUsage>,
    /// Backend's own accuracy estimate (0.0 - 1.0)
    pub estimated_accuracy: Option<f64>,
}

impl ModelResult {
    /// Create a result with no usage information
    pub fn new(model_id: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            model_id: model_id.into(),
            payload: payload.into(),
            usage: None,
            estimated_accuracy: None,
        }
    }

    /// Attach token usage
    #[must_use]
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// One outcome reported to the performance monitor
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Model that served the attempt
    pub model_id: String,
    /// When the attempt finished
    pub timestamp: DateTime<Utc>,
    /// Time spent on the attempt
    pub latency: Duration,
    /// Whether the attempt succeeded
    pub success: bool,
    /// Stable error tag for failures
    pub error_type: Option<String>,
    /// Dollar cost of the attempt
    pub cost: f64,
    /// Estimated accuracy of the response
    pub estimated_accuracy: Option<f64>,
}

impl MetricSample {
    /// Sample for a successful attempt
    pub fn success(
        model_id: impl Into<String>,
        latency: Duration,
        cost: f64,
        estimated_accuracy: Option<f64>,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            timestamp: Utc::now(),
            latency,
            success: true,
            error_type: None,
            cost,
            estimated_accuracy,
        }
    }

    /// Sample for a failed attempt; failures cost nothing
    pub fn failure(
        model_id: impl Into<String>,
        latency: Duration,
        error_type: impl Into<String>,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            timestamp: Utc::now(),
            latency,
            success: false,
            error_type: Some(error_type.into()),
            cost: 0.0,
            estimated_accuracy: None,
        }
    }
}
