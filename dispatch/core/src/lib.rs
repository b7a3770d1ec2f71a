//! Dispatch Core - Adaptive Model Routing
//!
//! Dispatches AI requests (text generation, embeddings, search ranking and
//! friends) to one of several interchangeable backend models. Each backend
//! has its own latency, cost, quality and reliability, and those figures
//! drift constantly, so every request is routed on live data.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        RoutingEngine                             │
//! │                                                                  │
//! │  ModelRequest ──► RequestAnalyzer ──► filter ──► scoring         │
//! │                                         │           │            │
//! │                          ModelRegistry ─┘           │            │
//! │                     PerformanceMonitor ─────────────┤            │
//! │                                                     ▼            │
//! │            CircuitBreakers ◄──────────────────── decision        │
//! │                   ▲                                 │            │
//! │                   │                                 ▼            │
//! │                   └─────────────────────────── executor          │
//! │                                                     │            │
//! │                                                     ▼            │
//! │                                              ModelApiClient      │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`RoutingEngine`]: Routes and executes requests
//! - [`RoutingDecision`]: The chosen model, its alternatives and the retry plan
//! - [`EngineConfig`]: Weights, retry budget and breaker tuning
//! - [`Collaborators`]: The analyzer, registry, monitor and client the engine calls out to
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use dispatch_core::{
//!     Collaborators, EngineConfig, HeuristicAnalyzer, InMemoryModelRegistry,
//!     ModelRequest, RequestType, RollingPerformanceMonitor, RoutingContext, RoutingEngine,
//! };
//!
//! let collaborators = Collaborators::new(
//!     Arc::new(HeuristicAnalyzer::new()),
//!     Arc::new(InMemoryModelRegistry::with_models(models)),
//!     Arc::new(RollingPerformanceMonitor::default()),
//!     Arc::new(my_client),
//! );
//! let engine = RoutingEngine::new(collaborators, dispatch_core::load_config()?.config)?;
//!
//! let request = ModelRequest::new(RequestType::TextGeneration, prompt);
//! let result = engine.dispatch(&request, &RoutingContext::new()).await?;
//! ```
//!
//! # Module Overview
//!
//! - [`models`]: Models, requests, results and metric samples
//! - [`collaborators`]: Traits for the services the engine depends on
//! - [`analyzer`]: Heuristic request analysis
//! - [`registry`]: In-memory model registry
//! - [`monitor`]: Rolling-window performance monitor
//! - [`config`]: Engine configuration, TOML file and environment loading
//! - [`error`]: Routing, collaborator and model call errors
//! - [`routing`]: Filtering, scoring, circuit breaking, decisions and execution

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod analyzer;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod models;
pub mod monitor;
pub mod registry;
pub mod routing;

pub use analyzer::HeuristicAnalyzer;
pub use collaborators::{
    Collaborators, ModelApiClient, ModelRegistry, PerformanceMonitor, RequestAnalyzer,
};
pub use config::{
    load_config, load_config_from_path, BreakerConfig, ConfigError, ConfigSource, ConfigUpdate,
    EngineConfig, LoadedConfig, ScoringWeights,
};
pub use error::{AttemptFailure, CancelReason, CollaboratorError, ModelCallError, RoutingError};
pub use models::{
    Complexity, MetricSample, Model, ModelCapability, ModelRequest, ModelResult, PerformanceStats,
    Pricing, RequestAnalysis, RequestType, RoutingContext, TokenUsage, Urgency,
};
pub use monitor::RollingPerformanceMonitor;
pub use registry::InMemoryModelRegistry;
pub use routing::{
    BreakerState, CircuitBreakerState, ExecutionMetrics, FallbackStrategy, HealthStatus,
    RoutingDecision, RoutingEngine, RoutingMetrics,
};
