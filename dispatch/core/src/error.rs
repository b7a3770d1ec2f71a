//! Routing Errors
//!
//! Every failure the engine surfaces to callers. Decision-time errors
//! (`NoAvailableModels`, `AllCircuitBreakersOpen`) are never retried;
//! execution-time errors carry the attempt history.

use std::time::Duration;

use thiserror::Error;

use crate::models::RequestType;

// ============================================================================
// Model Call Errors
// ============================================================================

/// Failure of a single call to a model API
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ModelCallError {
    /// The call did not finish within the per-attempt timeout
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// The connection failed before a response arrived
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with an error status
    #[error("backend returned status {status}: {message}")]
    Backend {
        /// Status code reported by the backend
        status: u16,
        /// Backend-supplied message
        message: String,
    },

    /// The backend refused the call because of rate limits
    #[error("rate limited by backend")]
    RateLimited,
}

impl ModelCallError {
    /// Stable tag recorded in failure metric samples
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Transport(_) => "transport",
            Self::Backend { .. } => "backend",
            Self::RateLimited => "rate_limited",
        }
    }
}

/// One failed attempt within the execution loop
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("attempt {attempt} on {model_id} failed after {elapsed:?}: {error}")]
pub struct AttemptFailure {
    /// Model the attempt targeted
    pub model_id: String,
    /// Zero-based attempt index
    pub attempt: u32,
    /// Time spent before the failure was observed
    pub elapsed: Duration,
    /// Underlying call failure
    pub error: ModelCallError,
}

// ============================================================================
// Collaborator Errors
// ============================================================================

/// Failure reported by a registry or monitor
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    /// The collaborator could not be reached
    #[error("{component} unavailable: {message}")]
    Unavailable {
        /// Which collaborator failed
        component: &'static str,
        /// Failure detail
        message: String,
    },

    /// The collaborator returned data the engine cannot use
    #[error("{component} returned invalid data: {message}")]
    InvalidData {
        /// Which collaborator failed
        component: &'static str,
        /// Failure detail
        message: String,
    },
}

// ============================================================================
// Routing Errors
// ============================================================================

/// Why an in-flight request stopped early
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelReason {
    /// The caller cancelled the request
    Cancelled,
    /// The caller's deadline passed
    DeadlineExceeded,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "cancelled by caller"),
            Self::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

/// Errors returned by routing and execution
#[derive(Debug, Error)]
pub enum RoutingError {
    /// No registered model can serve the request
    #[error("no available models for request type {request_type}")]
    NoAvailableModels {
        /// Type of the rejected request
        request_type: RequestType,
    },

    /// Capable models exist but every one has an open circuit breaker
    #[error(
        "all circuit breakers open for request type {request_type} (candidates: {})",
        candidates.join(", ")
    )]
    AllCircuitBreakersOpen {
        /// Type of the rejected request
        request_type: RequestType,
        /// Capable models that were rejected by their breakers
        candidates: Vec<String>,
    },

    /// Every attempt allowed by the retry budget failed
    #[error(
        "request failed after {attempts} attempts (models tried: {}): {last_error}",
        models_tried.join(", ")
    )]
    RequestFailedAfterRetries {
        /// Attempts made, equal to the retry budget
        attempts: u32,
        /// Distinct models attempted, in order
        models_tried: Vec<String>,
        /// The final failure
        last_error: AttemptFailure,
    },

    /// The caller stopped the request
    #[error(
        "request {reason} after {attempts} attempts (models tried: {})",
        models_tried.join(", ")
    )]
    Cancelled {
        /// Attempts started before stopping
        attempts: u32,
        /// Distinct models attempted, in order
        models_tried: Vec<String>,
        /// Cancellation or deadline
        reason: CancelReason,
    },

    /// A collaborator failed while routing
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

impl RoutingError {
    /// Whether the error rejects the request for lack of an admissible model
    /// or a collaborator, rather than reporting failed or stopped calls
    #[must_use]
    pub fn is_decision_error(&self) -> bool {
        matches!(
            self,
            Self::NoAvailableModels { .. }
                | Self::AllCircuitBreakersOpen { .. }
                | Self::Collaborator(_)
        )
    }
}
