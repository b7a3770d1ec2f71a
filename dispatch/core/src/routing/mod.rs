#![allow(missing_docs)]
//! Adaptive Model Routing
//!
//! Picks a backend model for every request and drives the call to it,
//! retrying and failing over when the backend misbehaves.
//!
//! # Architecture
//!
//! ```text
//! +------------------+
//! |  RoutingEngine   |  <-- Entry point: route, execute, dispatch
//! +--------+---------+
//!          |
//!          v
//! +------------------+
//! |     filter       |  <-- Capable models minus open breakers
//! +--------+---------+
//!          |
//!          v
//! +------------------+
//! |     scoring      |  <-- Weighted performance/cost/quality/availability
//! +--------+---------+
//!          |
//!          v
//! +------------------+
//! |     decision     |  <-- Selected model, alternatives, strategy
//! +--------+---------+
//!          |
//!          v
//! +------------------+
//! |     executor     |  <-- Retry/failover loop with cancellation
//! +------------------+
//! ```
//!
//! Circuit breakers and metrics are shared by every stage.

pub mod circuit_breaker;
pub mod decision;
pub mod engine;
pub mod executor;
pub mod filter;
pub mod metrics;
pub mod scoring;

#[cfg(test)]
pub mod test_utils;

pub use circuit_breaker::*;
pub use decision::*;
pub use engine::*;
pub use metrics::*;
