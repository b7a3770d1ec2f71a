//! Routing Metrics
//!
//! Observability for the routing engine:
//! - Route outcomes and decision latency
//! - Per-model usage distribution (drives load balancing)
//! - Failover usage
//! - Execution attempts
//!
//! Route counters sit behind one engine-wide lock so a snapshot is always
//! internally consistent. The decision-time histogram is lock-free.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

use super::circuit_breaker::{BreakerState, CircuitBreakerState};

/// Success rate at or below which the engine reports unhealthy
pub const HEALTHY_SUCCESS_RATE: f64 = 0.8;

// ============================================================================
// Histogram for Decision Latency
// ============================================================================

/// Fixed-bucket histogram of microsecond values
#[derive(Debug)]
pub struct Histogram {
    /// Upper bucket bounds in microseconds
    buckets: Vec<u64>,
    counts: Vec<AtomicU64>,
    total_count: AtomicU64,
    sum: AtomicU64,
    max: AtomicU64,
}

impl Histogram {
    pub fn new(buckets: Vec<u64>) -> Self {
        let counts = buckets.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            buckets,
            counts,
            total_count: AtomicU64::new(0),
            sum: AtomicU64::new(0),
            max: AtomicU64::new(0),
        }
    }

    /// Buckets from 50us to 1s
    pub fn decision_time_default() -> Self {
        Self::new(vec![
            50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 25_000, 50_000, 100_000, 250_000,
            1_000_000,
        ])
    }

    pub fn record(&self, value: Duration) {
        let micros = u64::try_from(value.as_micros()).unwrap_or(u64::MAX);
        let last = self.buckets.len().saturating_sub(1);
        let idx = self
            .buckets
            .iter()
            .position(|&b| micros <= b)
            .unwrap_or(last);

        if let Some(count) = self.counts.get(idx) {
            count.fetch_add(1, Ordering::Relaxed);
        }
        self.total_count.fetch_add(1, Ordering::Relaxed);
        self.sum.fetch_add(micros, Ordering::Relaxed);
        self.max.fetch_max(micros, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        HistogramSnapshot {
            buckets: self.buckets.clone(),
            counts: self.counts.iter().map(|c| c.load(Ordering::Relaxed)).collect(),
            total: self.total_count.load(Ordering::Relaxed),
            sum: self.sum.load(Ordering::Relaxed),
            max: self.max.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistogramSnapshot {
    pub buckets: Vec<u64>,
    pub counts: Vec<u64>,
    pub total: u64,
    pub sum: u64,
    pub max: u64,
}

impl HistogramSnapshot {
    /// Upper bound of the bucket holding the `p` quantile
    pub fn percentile(&self, p: f64) -> u64 {
        if self.total == 0 {
            return 0;
        }

        let target = ((self.total as f64 * p).ceil() as u64).max(1);
        let mut cumulative = 0u64;

        for (i, &count) in self.counts.iter().enumerate() {
            cumulative += count;
            if cumulative >= target {
                return self.buckets[i];
            }
        }

        self.buckets.last().copied().unwrap_or(0)
    }

    pub fn p50(&self) -> u64 {
        self.percentile(0.5)
    }

    pub fn p99(&self) -> u64 {
        self.percentile(0.99)
    }
}

// ============================================================================
// Snapshots
// ============================================================================

/// Route counters at a point in time
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RoutingMetrics {
    pub total_requests: u64,
    pub successful_routes: u64,
    pub failed_routes: u64,
    /// Running mean over every routed request
    pub average_decision_time_ms: f64,
    /// Committed routes per model
    pub model_usage_distribution: HashMap<String, u64>,
    /// Times a request moved to a model other than the one first chosen
    pub fallback_usage: u64,
}

impl RoutingMetrics {
    /// Fraction of requests routed successfully; 1.0 before any request
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            1.0
        } else {
            self.successful_routes as f64 / self.total_requests as f64
        }
    }
}

/// Engine health summary
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub active_models: usize,
    pub open_circuit_breakers: usize,
    pub average_decision_time_ms: f64,
    pub success_rate: f64,
}

impl HealthStatus {
    /// Healthy iff at least one model is active and routing mostly succeeds
    #[must_use]
    pub fn evaluate(
        active_models: usize,
        open_circuit_breakers: usize,
        metrics: &RoutingMetrics,
    ) -> Self {
        let success_rate = metrics.success_rate();
        Self {
            healthy: active_models > 0 && success_rate > HEALTHY_SUCCESS_RATE,
            active_models,
            open_circuit_breakers,
            average_decision_time_ms: metrics.average_decision_time_ms,
            success_rate,
        }
    }
}

// ============================================================================
// Collector
// ============================================================================

/// Execution outcomes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionMetrics {
    pub attempts: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub cancelled: u64,
}

#[derive(Debug)]
pub struct MetricsCollector {
    routes: Mutex<RoutingMetrics>,
    decision_times: Histogram,
    attempts: AtomicU64,
    executions_succeeded: AtomicU64,
    executions_failed: AtomicU64,
    executions_cancelled: AtomicU64,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(RoutingMetrics::default()),
            decision_times: Histogram::decision_time_default(),
            attempts: AtomicU64::new(0),
            executions_succeeded: AtomicU64::new(0),
            executions_failed: AtomicU64::new(0),
            executions_cancelled: AtomicU64::new(0),
        }
    }

    /// Count a committed route to `model_id`
    pub fn record_route_success(&self, model_id: &str, decision_time: Duration) {
        self.decision_times.record(decision_time);
        let mut routes = self.routes.lock();
        Self::count_request(&mut routes, decision_time);
        routes.successful_routes += 1;
        *routes
            .model_usage_distribution
            .entry(model_id.to_string())
            .or_insert(0) += 1;
    }

    /// Count a request that could not be routed
    pub fn record_route_failure(&self, decision_time: Duration) {
        self.decision_times.record(decision_time);
        let mut routes = self.routes.lock();
        Self::count_request(&mut routes, decision_time);
        routes.failed_routes += 1;
    }

    pub fn record_fallback(&self, from: &str, to: &str) {
        self.routes.lock().fallback_usage += 1;
        tracing::debug!(from = %from, to = %to, "Fallback recorded");
    }

    pub fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_execution_success(&self) {
        self.executions_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_execution_failure(&self) {
        self.executions_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_execution_cancelled(&self) {
        self.executions_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    fn count_request(routes: &mut RoutingMetrics, decision_time: Duration) {
        routes.total_requests += 1;
        let sample_ms = decision_time.as_secs_f64() * 1000.0;
        let n = routes.total_requests as f64;
        routes.average_decision_time_ms += (sample_ms - routes.average_decision_time_ms) / n;
    }

    pub fn snapshot(&self) -> RoutingMetrics {
        self.routes.lock().clone()
    }

    pub fn usage(&self) -> HashMap<String, u64> {
        self.routes.lock().model_usage_distribution.clone()
    }

    pub fn execution(&self) -> ExecutionMetrics {
        ExecutionMetrics {
            attempts: self.attempts.load(Ordering::Relaxed),
            succeeded: self.executions_succeeded.load(Ordering::Relaxed),
            failed: self.executions_failed.load(Ordering::Relaxed),
            cancelled: self.executions_cancelled.load(Ordering::Relaxed),
        }
    }

    pub fn decision_time_histogram(&self) -> HistogramSnapshot {
        self.decision_times.snapshot()
    }

    /// Prometheus text exposition of every metric
    pub fn to_prometheus(&self, breakers: &[CircuitBreakerState]) -> String {
        let routes = self.snapshot();
        let execution = self.execution();
        let histogram = self.decision_time_histogram();
        let mut output = String::new();

        let _ = write!(
            output,
            "# HELP dispatch_requests_total Requests received for routing\n\
             # TYPE dispatch_requests_total counter\n\
             dispatch_requests_total {}\n\n",
            routes.total_requests
        );
        let _ = write!(
            output,
            "# HELP dispatch_routes_total Routing outcomes\n\
             # TYPE dispatch_routes_total counter\n\
             dispatch_routes_total{{outcome=\"success\"}} {}\n\
             dispatch_routes_total{{outcome=\"failure\"}} {}\n\n",
            routes.successful_routes, routes.failed_routes
        );
        let _ = write!(
            output,
            "# HELP dispatch_fallbacks_total Requests moved to another model\n\
             # TYPE dispatch_fallbacks_total counter\n\
             dispatch_fallbacks_total {}\n\n",
            routes.fallback_usage
        );
        let _ = write!(
            output,
            "# HELP dispatch_attempts_total Model calls issued\n\
             # TYPE dispatch_attempts_total counter\n\
             dispatch_attempts_total {}\n\n",
            execution.attempts
        );
        let _ = write!(
            output,
            "# HELP dispatch_executions_total Execution outcomes\n\
             # TYPE dispatch_executions_total counter\n\
             dispatch_executions_total{{outcome=\"success\"}} {}\n\
             dispatch_executions_total{{outcome=\"failure\"}} {}\n\
             dispatch_executions_total{{outcome=\"cancelled\"}} {}\n\n",
            execution.succeeded, execution.failed, execution.cancelled
        );
        let _ = write!(
            output,
            "# HELP dispatch_decision_time_ms Routing decision time\n\
             # TYPE dispatch_decision_time_ms summary\n\
             dispatch_decision_time_ms{{quantile=\"0.5\"}} {:.3}\n\
             dispatch_decision_time_ms{{quantile=\"0.99\"}} {:.3}\n\
             dispatch_decision_time_ms_sum {:.3}\n\
             dispatch_decision_time_ms_count {}\n\n",
            histogram.p50() as f64 / 1000.0,
            histogram.p99() as f64 / 1000.0,
            histogram.sum as f64 / 1000.0,
            histogram.total
        );

        let mut usage: Vec<_> = routes.model_usage_distribution.iter().collect();
        usage.sort();
        if !usage.is_empty() {
            output.push_str(
                "# HELP dispatch_model_routes_total Committed routes per model\n\
                 # TYPE dispatch_model_routes_total counter\n",
            );
            for (model_id, count) in usage {
                let _ = writeln!(
                    output,
                    "dispatch_model_routes_total{{model=\"{model_id}\"}} {count}"
                );
            }
            output.push('\n');
        }

        if !breakers.is_empty() {
            output.push_str(
                "# HELP dispatch_circuit_breaker_state Breaker state per model \
                 (0 closed, 1 open, 2 half-open)\n\
                 # TYPE dispatch_circuit_breaker_state gauge\n",
            );
            for breaker in breakers {
                let state = match breaker.state {
                    BreakerState::Closed => 0,
                    BreakerState::Open => 1,
                    BreakerState::HalfOpen => 2,
                };
                let _ = writeln!(
                    output,
                    "dispatch_circuit_breaker_state{{model=\"{}\"}} {state}",
                    breaker.model_id
                );
            }
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_running_mean_decision_time() {
        let metrics = MetricsCollector::new();
        metrics.record_route_success("a", Duration::from_millis(2));
        metrics.record_route_success("a", Duration::from_millis(4));
        metrics.record_route_failure(Duration::from_millis(6));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, 3);
        assert_eq!(snapshot.successful_routes, 2);
        assert_eq!(snapshot.failed_routes, 1);
        assert!((snapshot.average_decision_time_ms - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_usage_only_counts_committed_routes() {
        let metrics = MetricsCollector::new();
        metrics.record_route_success("a", Duration::ZERO);
        metrics.record_route_success("b", Duration::ZERO);
        metrics.record_route_success("a", Duration::ZERO);
        metrics.record_route_failure(Duration::ZERO);

        assert_eq!(
            metrics.usage(),
            HashMap::from([("a".to_string(), 2), ("b".to_string(), 1)])
        );
    }

    #[test]
    fn test_success_rate_defaults_to_one() {
        assert_eq!(RoutingMetrics::default().success_rate(), 1.0);
    }

    #[test]
    fn test_health_evaluation() {
        let mut metrics = RoutingMetrics {
            total_requests: 10,
            successful_routes: 9,
            ..RoutingMetrics::default()
        };
        assert!(HealthStatus::evaluate(2, 0, &metrics).healthy);
        assert!(!HealthStatus::evaluate(0, 0, &metrics).healthy);

        metrics.successful_routes = 8;
        let status = HealthStatus::evaluate(2, 1, &metrics);
        assert!(!status.healthy);
        assert_eq!(status.open_circuit_breakers, 1);
    }

    #[test]
    fn test_histogram_percentiles() {
        let histogram = Histogram::decision_time_default();
        for _ in 0..99 {
            histogram.record(Duration::from_micros(80));
        }
        histogram.record(Duration::from_millis(40));

        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.total, 100);
        assert_eq!(snapshot.p50(), 100);
        assert_eq!(snapshot.p99(), 100);
        assert_eq!(snapshot.percentile(1.0), 50_000);
        assert_eq!(snapshot.max, 40_000);
    }

    #[test]
    fn test_histogram_overflow_lands_in_last_bucket() {
        let histogram = Histogram::decision_time_default();
        histogram.record(Duration::from_secs(5));
        assert_eq!(histogram.snapshot().counts.last().copied(), Some(1));
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = MetricsCollector::new();
        metrics.record_route_success("model-a", Duration::from_millis(1));
        metrics.record_fallback("model-a", "model-b");
        metrics.record_attempt();

        let breakers = vec![CircuitBreakerState {
            model_id: "model-b".to_string(),
            state: BreakerState::Open,
            consecutive_failures: 5,
            since_last_failure: Some(Duration::from_secs(1)),
        }];
        let output = metrics.to_prometheus(&breakers);

        assert!(output.contains("dispatch_requests_total 1"));
        assert!(output.contains("dispatch_routes_total{outcome=\"success\"} 1"));
        assert!(output.contains("dispatch_fallbacks_total 1"));
        assert!(output.contains("dispatch_attempts_total 1"));
        assert!(output.contains("dispatch_model_routes_total{model=\"model-a\"} 1"));
        assert!(output.contains("dispatch_circuit_breaker_state{model=\"model-b\"} 1"));
    }

    #[test]
    fn test_health_status_serializes_for_health_endpoints() {
        let metrics = MetricsCollector::new();
        metrics.record_route_success("model-a", Duration::from_millis(2));
        let health = HealthStatus::evaluate(3, 1, &metrics.snapshot());

        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["healthy"], serde_json::json!(true));
        assert_eq!(json["active_models"], serde_json::json!(3));
        assert_eq!(json["open_circuit_breakers"], serde_json::json!(1));
        assert_eq!(json["success_rate"], serde_json::json!(1.0));
    }
}
