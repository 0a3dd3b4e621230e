use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Manager for collecting run metrics across organizations
#[derive(Debug)]
pub struct MetricsManager {
    /// Most recent runs, oldest first
    history: Arc<Mutex<VecDeque<RunMetrics>>>,
    /// Configuration for metrics collection
    config: MetricsConfig,
}

/// Configuration for metrics collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Maximum number of runs kept in history
    pub max_history: usize,
}

/// Metrics for a single run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetrics {
    /// When the run finished
    pub timestamp: DateTime<Utc>,
    /// Task the run belongs to
    pub task_id: u64,
    /// Organization that executed the run
    pub organization_id: u64,
    /// Method name
    pub method: String,
    /// Processing time in milliseconds
    pub duration_ms: f64,
    /// Whether the run returned a result
    pub success: bool,
}

/// Aggregate view over the recorded history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSummary {
    /// Timestamp of the summary
    pub timestamp: DateTime<Utc>,
    /// Runs in history
    pub total_runs: u64,
    /// Runs that returned an error
    pub failed_runs: u64,
    /// Average processing time (ms)
    pub avg_duration_ms: f64,
    /// Runs per method
    pub runs_per_method: BTreeMap<String, u64>,
    /// Runs per organization
    pub runs_per_organization: BTreeMap<u64, u64>,
}

impl MetricsManager {
    pub fn new(config: MetricsConfig) -> Self {
        Self {
            history: Arc::new(Mutex::new(VecDeque::new())),
            config,
        }
    }

    /// Record a finished run, evicting the oldest entries past the history limit
    pub async fn record_run(&self, metrics: RunMetrics) {
        debug!(
            "Run of {} on organization {} took {:.2} ms",
            metrics.method, metrics.organization_id, metrics.duration_ms
        );
        let mut history = self.history.lock().await;
        history.push_back(metrics);
        while history.len() > self.config.max_history {
            history.pop_front();
        }
    }

    /// Most recent runs, newest last
    pub async fn recent(&self, limit: usize) -> Vec<RunMetrics> {
        let history = self.history.lock().await;
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }

    pub async fn summary(&self) -> MetricsSummary {
        let history = self.history.lock().await;

        let mut runs_per_method = BTreeMap::new();
        let mut runs_per_organization = BTreeMap::new();
        let mut failed_runs = 0;
        let mut total_duration = 0.0;

        for run in history.iter() {
            *runs_per_method.entry(run.method.clone()).or_insert(0) += 1;
            *runs_per_organization.entry(run.organization_id).or_insert(0) += 1;
            if !run.success {
                failed_runs += 1;
            }
            total_duration += run.duration_ms;
        }

        MetricsSummary {
            timestamp: Utc::now(),
            total_runs: history.len() as u64,
            failed_runs,
            avg_duration_ms: if history.is_empty() {
                0.0
            } else {
                total_duration / history.len() as f64
            },
            runs_per_method,
            runs_per_organization,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { max_history: 1000 }
    }
}
