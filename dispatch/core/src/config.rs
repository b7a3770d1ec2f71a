//! Engine Configuration
//!
//! Typed configuration for the routing engine with TOML file support at
//! `~/.config/dispatch/router.toml`.
//!
//! # Configuration Priority
//!
//! Values are resolved with the following priority (highest first):
//! 1. Runtime updates via [`ConfigUpdate`]
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [routing]
//! enable_load_balancing = true
//! enable_failover = true
//! max_retries = 3
//! retry_delay_ms = 1000
//! attempt_timeout_ms = 30000
//! performance_window_secs = 900
//!
//! [optimization]
//! cost = true
//! latency = true
//! quality = true
//!
//! [weights]
//! performance = 0.4
//! cost = 0.2
//! quality = 0.3
//! availability = 0.1
//!
//! [circuit_breaker]
//! failure_threshold = 5
//! timeout_secs = 60
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tolerance when checking that scoring weights sum to one
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading or updating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Tracks where the effective configuration came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// Engine Configuration
// =============================================================================

/// Relative weight of each scoring component
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Weight of the performance score
    pub performance: f64,
    /// Weight of the cost score
    pub cost: f64,
    /// Weight of the quality score
    pub quality: f64,
    /// Weight of the availability score
    pub availability: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            performance: 0.4,
            cost: 0.2,
            quality: 0.3,
            availability: 0.1,
        }
    }
}

impl ScoringWeights {
    /// Sum of all weights
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.performance + self.cost + self.quality + self.availability
    }

    /// Check that weights are non-negative and sum to one
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` naming the offending weight or the sum.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let named = [
            ("performance", self.performance),
            ("cost", self.cost),
            ("quality", self.quality),
            ("availability", self.availability),
        ];
        for (name, value) in named {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "weight '{name}' must be a non-negative number, got {value}"
                )));
            }
        }
        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::ValidationError(format!(
                "scoring weights must sum to 1.0, got {sum}"
            )));
        }
        Ok(())
    }
}

/// Circuit breaker parameters, fixed at engine construction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens
    pub failure_threshold: u32,
    /// How long an open breaker rejects traffic before probing
    pub timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Routing engine configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Pre-sort candidates by usage so lightly used models are preferred
    pub enable_load_balancing: bool,
    /// Allow switching to alternative models during execution
    pub enable_failover: bool,
    /// Total attempts per request (>= 1)
    pub max_retries: u32,
    /// Base delay for linear backoff between attempts
    pub retry_delay: Duration,
    /// Upper bound on a single model call
    pub attempt_timeout: Duration,
    /// Score candidates by estimated cost
    pub cost_optimization: bool,
    /// Note latency optimization in decision reasoning
    pub latency_optimization: bool,
    /// Note quality optimization in decision reasoning
    pub quality_optimization: bool,
    /// Scoring weights
    pub weights: ScoringWeights,
    /// Window passed to the performance monitor
    pub performance_window: Duration,
    /// Circuit breaker parameters
    pub breaker: BreakerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enable_load_balancing: true,
            enable_failover: true,
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            attempt_timeout: Duration::from_secs(30),
            cost_optimization: true,
            latency_optimization: true,
            quality_optimization: true,
            weights: ScoringWeights::default(),
            performance_window: Duration::from_secs(15 * 60),
            breaker: BreakerConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Create default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set total attempts per request
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the backoff base delay
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the per-attempt timeout
    #[must_use]
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Enable or disable load balancing
    #[must_use]
    pub fn with_load_balancing(mut self, enabled: bool) -> Self {
        self.enable_load_balancing = enabled;
        self
    }

    /// Enable or disable failover
    #[must_use]
    pub fn with_failover(mut self, enabled: bool) -> Self {
        self.enable_failover = enabled;
        self
    }

    /// Enable or disable cost scoring
    #[must_use]
    pub fn with_cost_optimization(mut self, enabled: bool) -> Self {
        self.cost_optimization = enabled;
        self
    }

    /// Set scoring weights
    #[must_use]
    pub fn with_weights(mut self, weights: ScoringWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Set circuit breaker parameters
    #[must_use]
    pub fn with_breaker(mut self, breaker: BreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    /// Check every constraint on the configuration
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for zero retries, invalid weights or a
    /// zero breaker threshold.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries == 0 {
            return Err(ConfigError::ValidationError(
                "max_retries must be at least 1".to_string(),
            ));
        }
        if self.breaker.failure_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "circuit breaker failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.attempt_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "attempt_timeout must be greater than zero".to_string(),
            ));
        }
        self.weights.validate()
    }

    /// Apply a partial update, validating the result before committing
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the updated configuration is invalid;
    /// `self` is left unchanged in that case.
    pub fn apply_update(&mut self, update: &ConfigUpdate) -> Result<(), ConfigError> {
        let mut next = self.clone();
        if let Some(enabled) = update.enable_load_balancing {
            next.enable_load_balancing = enabled;
        }
        if let Some(enabled) = update.enable_failover {
            next.enable_failover = enabled;
        }
        if let Some(max_retries) = update.max_retries {
            next.max_retries = max_retries;
        }
        if let Some(delay) = update.retry_delay {
            next.retry_delay = delay;
        }
        if let Some(timeout) = update.attempt_timeout {
            next.attempt_timeout = timeout;
        }
        if let Some(enabled) = update.cost_optimization {
            next.cost_optimization = enabled;
        }
        if let Some(enabled) = update.latency_optimization {
            next.latency_optimization = enabled;
        }
        if let Some(enabled) = update.quality_optimization {
            next.quality_optimization = enabled;
        }
        if let Some(weights) = update.weights {
            next.weights = weights;
        }
        if let Some(window) = update.performance_window {
            next.performance_window = window;
        }
        next.validate()?;
        *self = next;
        Ok(())
    }
}

/// Partial configuration applied at runtime
///
/// Breaker parameters are construction-time only and cannot be updated.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConfigUpdate {
    /// Load balancing toggle
    pub enable_load_balancing: Option<bool>,
    /// Failover toggle
    pub enable_failover: Option<bool>,
    /// Total attempts per request
    pub max_retries: Option<u32>,
    /// Backoff base delay
    pub retry_delay: Option<Duration>,
    /// Per-attempt timeout
    pub attempt_timeout: Option<Duration>,
    /// Cost scoring toggle
    pub cost_optimization: Option<bool>,
    /// Latency reasoning toggle
    pub latency_optimization: Option<bool>,
    /// Quality reasoning toggle
    pub quality_optimization: Option<bool>,
    /// Replacement weights
    pub weights: Option<ScoringWeights>,
    /// Monitor window
    pub performance_window: Option<Duration>,
}

impl ConfigUpdate {
    /// Create an empty update
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Update scoring weights
    #[must_use]
    pub fn with_weights(mut self, weights: ScoringWeights) -> Self {
        self.weights = Some(weights);
        self
    }

    /// Update total attempts per request
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Update the load balancing toggle
    #[must_use]
    pub fn with_load_balancing(mut self, enabled: bool) -> Self {
        self.enable_load_balancing = Some(enabled);
        self
    }

    /// Update the failover toggle
    #[must_use]
    pub fn with_failover(mut self, enabled: bool) -> Self {
        self.enable_failover = Some(enabled);
        self
    }

    /// Update the cost scoring toggle
    #[must_use]
    pub fn with_cost_optimization(mut self, enabled: bool) -> Self {
        self.cost_optimization = Some(enabled);
        self
    }

    /// Update the backoff base delay
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Routing section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingToml {
    /// Usage-based candidate ordering
    pub enable_load_balancing: Option<bool>,
    /// Alternative model substitution
    pub enable_failover: Option<bool>,
    /// Total attempts per request
    pub max_retries: Option<u32>,
    /// Backoff base delay in milliseconds
    pub retry_delay_ms: Option<u64>,
    /// Per-attempt timeout in milliseconds
    pub attempt_timeout_ms: Option<u64>,
    /// Monitor window in seconds
    pub performance_window_secs: Option<u64>,
}

/// Optimization section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationToml {
    /// Cost scoring
    pub cost: Option<bool>,
    /// Latency reasoning
    pub latency: Option<bool>,
    /// Quality reasoning
    pub quality: Option<bool>,
}

/// Weights section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightsToml {
    /// Performance weight
    pub performance: Option<f64>,
    /// Cost weight
    pub cost: Option<f64>,
    /// Quality weight
    pub quality: Option<f64>,
    /// Availability weight
    pub availability: Option<f64>,
}

/// Circuit breaker section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerToml {
    /// Consecutive failures before opening
    pub failure_threshold: Option<u32>,
    /// Open duration in seconds
    pub timeout_secs: Option<u64>,
}

/// Root TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterToml {
    /// Routing settings
    pub routing: RoutingToml,
    /// Optimization toggles
    pub optimization: OptimizationToml,
    /// Scoring weights
    pub weights: WeightsToml,
    /// Circuit breaker settings
    pub circuit_breaker: CircuitBreakerToml,
}

/// Configuration together with its provenance
#[derive(Clone, Debug)]
pub struct LoadedConfig {
    /// Effective configuration
    pub config: EngineConfig,
    /// Highest-priority source that contributed a value
    pub source: ConfigSource,
    /// File the configuration was read from, if any
    pub config_file_path: Option<PathBuf>,
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/dispatch/router.toml` or
/// `~/.config/dispatch/router.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("dispatch").join("router.toml"))
}

/// Load configuration from the default path and the process environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if
/// the merged configuration is invalid. A missing file is not an error.
pub fn load_config() -> Result<LoadedConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path and the process environment
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if the merged
/// configuration is invalid.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<LoadedConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration with an explicit environment lookup
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if the merged
/// configuration is invalid.
pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<LoadedConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut loaded = LoadedConfig {
        config: EngineConfig::default(),
        source: ConfigSource::Default,
        config_file_path: None,
    };

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: RouterToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut loaded.config, &toml_config);
            loaded.config_file_path = Some(config_path.clone());
            loaded.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded routing configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    if apply_env_config(&mut loaded.config, env) {
        loaded.source = ConfigSource::Env;
    }

    loaded.config.validate()?;
    Ok(loaded)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut EngineConfig, toml: &RouterToml) {
    if let Some(enabled) = toml.routing.enable_load_balancing {
        config.enable_load_balancing = enabled;
    }
    if let Some(enabled) = toml.routing.enable_failover {
        config.enable_failover = enabled;
    }
    if let Some(max_retries) = toml.routing.max_retries {
        config.max_retries = max_retries;
    }
    if let Some(ms) = toml.routing.retry_delay_ms {
        config.retry_delay = Duration::from_millis(ms);
    }
    if let Some(ms) = toml.routing.attempt_timeout_ms {
        config.attempt_timeout = Duration::from_millis(ms);
    }
    if let Some(secs) = toml.routing.performance_window_secs {
        config.performance_window = Duration::from_secs(secs);
    }

    if let Some(enabled) = toml.optimization.cost {
        config.cost_optimization = enabled;
    }
    if let Some(enabled) = toml.optimization.latency {
        config.latency_optimization = enabled;
    }
    if let Some(enabled) = toml.optimization.quality {
        config.quality_optimization = enabled;
    }

    if let Some(weight) = toml.weights.performance {
        config.weights.performance = weight;
    }
    if let Some(weight) = toml.weights.cost {
        config.weights.cost = weight;
    }
    if let Some(weight) = toml.weights.quality {
        config.weights.quality = weight;
    }
    if let Some(weight) = toml.weights.availability {
        config.weights.availability = weight;
    }

    if let Some(threshold) = toml.circuit_breaker.failure_threshold {
        config.breaker.failure_threshold = threshold;
    }
    if let Some(secs) = toml.circuit_breaker.timeout_secs {
        config.breaker.timeout = Duration::from_secs(secs);
    }
}

/// Apply environment overrides; returns whether any variable was used
fn apply_env_config<F>(config: &mut EngineConfig, env: F) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    let mut applied = false;

    if let Some(retries) = env("DISPATCH_MAX_RETRIES") {
        if let Ok(n) = retries.parse::<u32>() {
            config.max_retries = n;
            applied = true;
        }
    }
    if let Some(delay) = env("DISPATCH_RETRY_DELAY_MS") {
        if let Ok(ms) = delay.parse::<u64>() {
            config.retry_delay = Duration::from_millis(ms);
            applied = true;
        }
    }
    if let Some(timeout) = env("DISPATCH_ATTEMPT_TIMEOUT_MS") {
        if let Ok(ms) = timeout.parse::<u64>() {
            config.attempt_timeout = Duration::from_millis(ms);
            applied = true;
        }
    }
    if let Some(enabled) = env("DISPATCH_LOAD_BALANCING") {
        config.enable_load_balancing = parse_flag(&enabled);
        applied = true;
    }
    if let Some(enabled) = env("DISPATCH_FAILOVER") {
        config.enable_failover = parse_flag(&enabled);
        applied = true;
    }
    if let Some(enabled) = env("DISPATCH_COST_OPTIMIZATION") {
        config.cost_optimization = parse_flag(&enabled);
        applied = true;
    }

    applied
}

fn parse_flag(value: &str) -> bool {
    value != "0" && !value.eq_ignore_ascii_case("false")
}
