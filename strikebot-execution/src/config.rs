use serde::{Deserialize, Serialize};

/// Venue client policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Use the Kalshi demo environment.
    pub demo: bool,
    /// Absolute deadline for each HTTP call, in milliseconds.
    pub timeout_ms: u64,
    /// Maximum attempts per call (first try included) for transient failures.
    pub max_attempts: u32,
    /// First backoff delay; doubled on each retry.
    pub backoff_base_ms: u64,
    /// Cents to improve on the best ask when placing a limit order (0 or 1).
    pub price_improvement_cents: u32,
    /// Paper bankroll used by the dry-run venue, in cents.
    pub paper_bankroll_cents: i64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            demo: false,
            timeout_ms: 10_000,
            max_attempts: 3,
            backoff_base_ms: 500,
            price_improvement_cents: 0,
            paper_bankroll_cents: 10_000,
        }
    }
}

/// Telemetry and latency anomaly policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Rolling latency samples kept per endpoint.
    pub window: usize,
    /// History snapshots used as the anomaly baseline.
    pub baseline_len: usize,
    /// Minimum baseline samples before the statistical check applies.
    pub min_baseline: usize,
    /// Minimum samples in the current profile before an endpoint is assessed.
    pub min_endpoint_samples: usize,
    /// Standard deviations above the baseline mean that flag an anomaly.
    pub sigma: f64,
    pub warning_avg_ms: f64,
    pub critical_avg_ms: f64,
    pub critical_p95_ms: f64,
    /// Minimum calls in the last hour before the error rate is assessed.
    pub min_calls_for_error_rate: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            window: 100,
            baseline_len: 50,
            min_baseline: 10,
            min_endpoint_samples: 5,
            sigma: 2.0,
            warning_avg_ms: 1_000.0,
            critical_avg_ms: 2_000.0,
            critical_p95_ms: 3_000.0,
            min_calls_for_error_rate: 10,
        }
    }
}
