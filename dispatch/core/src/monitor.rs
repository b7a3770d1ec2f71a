//! Rolling Performance Monitor
//!
//! Keeps a bounded, time-ordered deque of samples per model and computes
//! window statistics on demand. Expired samples are pruned on every write
//! and every read, so memory stays proportional to recent traffic.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::collaborators::PerformanceMonitor;
use crate::error::CollaboratorError;
use crate::models::{MetricSample, PerformanceStats};

/// Default retention for samples
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(15 * 60);

/// Default per-model sample cap
pub const DEFAULT_MAX_SAMPLES: usize = 10_000;

#[derive(Clone, Debug)]
struct TimedSample {
    recorded_at: Instant,
    sample: MetricSample,
}

/// In-memory monitor with a trailing retention window
#[derive(Debug)]
pub struct RollingPerformanceMonitor {
    samples: DashMap<String, VecDeque<TimedSample>>,
    retention: Duration,
    max_samples: usize,
}

impl Default for RollingPerformanceMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}

impl RollingPerformanceMonitor {
    /// Create a monitor that retains samples for `retention`
    #[must_use]
    pub fn new(retention: Duration) -> Self {
        Self {
            samples: DashMap::new(),
            retention,
            max_samples: DEFAULT_MAX_SAMPLES,
        }
    }

    /// Cap the number of samples kept per model
    #[must_use]
    pub fn with_max_samples(mut self, max_samples: usize) -> Self {
        self.max_samples = max_samples.max(1);
        self
    }

    /// Retained samples for a model, oldest first
    #[must_use]
    pub fn samples(&self, model_id: &str) -> Vec<MetricSample> {
        let Some(mut entry) = self.samples.get_mut(model_id) else {
            return Vec::new();
        };
        Self::prune(&mut entry, Instant::now(), self.retention);
        entry.iter().map(|t| t.sample.clone()).collect()
    }

    /// Number of retained failure samples for a model
    #[must_use]
    pub fn failure_count(&self, model_id: &str) -> usize {
        self.samples(model_id).iter().filter(|s| !s.success).count()
    }

    /// Number of retained samples across all models
    #[must_use]
    pub fn total_samples(&self) -> usize {
        let now = Instant::now();
        self.samples
            .iter_mut()
            .map(|mut entry| {
                Self::prune(&mut entry, now, self.retention);
                entry.len()
            })
            .sum()
    }

    /// Total cost of retained successful samples for a model
    #[must_use]
    pub fn total_cost(&self, model_id: &str) -> f64 {
        self.samples(model_id).iter().map(|s| s.cost).sum()
    }

    fn prune(deque: &mut VecDeque<TimedSample>, now: Instant, retention: Duration) {
        while let Some(front) = deque.front() {
            if now.saturating_duration_since(front.recorded_at) > retention {
                deque.pop_front();
            } else {
                break;
            }
        }
    }

    fn stats(deque: &VecDeque<TimedSample>, now: Instant, window: Duration) -> PerformanceStats {
        let in_window: Vec<&TimedSample> = deque
            .iter()
            .filter(|t| now.saturating_duration_since(t.recorded_at) <= window)
            .collect();

        let Some(oldest) = in_window.first() else {
            return PerformanceStats {
                sample_count: 0,
                ..PerformanceStats::default()
            };
        };

        let count = in_window.len() as u64;
        let successes = in_window.iter().filter(|t| t.sample.success).count() as f64;
        let total_latency: Duration = in_window.iter().map(|t| t.sample.latency).sum();
        let span = now
            .saturating_duration_since(oldest.recorded_at)
            .max(Duration::from_secs(1));
        let n = count as f64;

        PerformanceStats {
            average_latency: total_latency / u32::try_from(count).unwrap_or(u32::MAX),
            throughput: n / span.as_secs_f64(),
            error_rate: (n - successes) / n,
            availability: successes / n,
            sample_count: count,
        }
    }
}

#[async_trait]
impl PerformanceMonitor for RollingPerformanceMonitor {
    async fn model_performance(
        &self,
        model_id: &str,
        window: Duration,
    ) -> Result<PerformanceStats, CollaboratorError> {
        let now = Instant::now();
        let window = window.min(self.retention);
        match self.samples.get_mut(model_id) {
            Some(mut entry) => {
                Self::prune(&mut entry, now, self.retention);
                Ok(Self::stats(&entry, now, window))
            }
            None => Ok(PerformanceStats {
                sample_count: 0,
                ..PerformanceStats::default()
            }),
        }
    }

    async fn record_metric(&self, sample: MetricSample) {
        let now = Instant::now();
        let mut entry = self.samples.entry(sample.model_id.clone()).or_default();
        Self::prune(&mut entry, now, self.retention);
        if entry.len() >= self.max_samples {
            entry.pop_front();
        }
        entry.push_back(TimedSample {
            recorded_at: now,
            sample,
        });
    }
}
