//! Per-endpoint latency profile, HTTP status class counters, skip reason counters and the
//! latency anomaly detector.

use crate::config::TelemetryConfig;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, OrderStatistics, Statistics};
use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    path::Path,
    sync::Arc,
};
use strikebot_data::{DataError, store};
use tracing::debug;

/// How a venue or source call ended.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CallOutcome {
    Status(u16),
    Timeout,
    Connection,
}

impl CallOutcome {
    /// Counter key: `2xx`, `4xx`, `5xx`, `timeout`, `connection`.
    pub fn class(&self) -> String {
        match self {
            CallOutcome::Status(status) => format!("{}xx", status / 100),
            CallOutcome::Timeout => "timeout".to_string(),
            CallOutcome::Connection => "connection".to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        !matches!(self, CallOutcome::Status(status) if (200..400).contains(status))
    }
}

/// Rolling latency statistics for one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointStats {
    pub count: usize,
    pub avg_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    #[serde(default)]
    pub errors: u64,
}

/// Snapshot of the telemetry store, persisted as `kalshi-latency-profile.json` and appended to
/// `latency-history.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyProfile {
    pub timestamp: DateTime<Utc>,
    pub endpoints: BTreeMap<String, EndpointStats>,
    #[serde(default)]
    pub status_classes: BTreeMap<String, u64>,
    #[serde(default)]
    pub skip_reasons: BTreeMap<String, u64>,
}

#[derive(Debug, Default)]
struct TelemetryState {
    samples: HashMap<String, VecDeque<f64>>,
    errors: HashMap<String, u64>,
    status_classes: BTreeMap<String, u64>,
    skip_reasons: BTreeMap<String, u64>,
    calls: VecDeque<(DateTime<Utc>, bool)>,
}

/// Cheaply cloneable handle to the process telemetry store.
#[derive(Debug, Clone)]
pub struct Telemetry {
    config: TelemetryConfig,
    state: Arc<Mutex<TelemetryState>>,
}

impl Telemetry {
    pub fn new(config: TelemetryConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(TelemetryState::default())),
        }
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    pub fn record_call(&self, endpoint: &str, latency_ms: f64, outcome: CallOutcome) {
        self.record_call_at(Utc::now(), endpoint, latency_ms, outcome)
    }

    pub fn record_call_at(
        &self,
        at: DateTime<Utc>,
        endpoint: &str,
        latency_ms: f64,
        outcome: CallOutcome,
    ) {
        debug!(%endpoint, latency_ms, class = %outcome.class(), "api call");
        let mut state = self.state.lock();

        let samples = state.samples.entry(endpoint.to_string()).or_default();
        samples.push_back(latency_ms);
        while samples.len() > self.config.window {
            samples.pop_front();
        }

        *state.status_classes.entry(outcome.class()).or_default() += 1;
        if outcome.is_error() {
            *state.errors.entry(endpoint.to_string()).or_default() += 1;
        }

        state.calls.push_back((at, outcome.is_error()));
        let horizon = at - Duration::hours(1);
        while state.calls.front().is_some_and(|(time, _)| *time < horizon) {
            state.calls.pop_front();
        }
    }

    pub fn record_skip(&self, reason: &str) {
        *self
            .state
            .lock()
            .skip_reasons
            .entry(reason.to_string())
            .or_default() += 1;
    }

    /// Error rate of calls in the hour before `now`; `None` with too few calls to judge.
    pub fn hourly_error_rate(&self, now: DateTime<Utc>) -> Option<f64> {
        let state = self.state.lock();
        let horizon = now - Duration::hours(1);
        let (calls, errors) = state
            .calls
            .iter()
            .filter(|(time, _)| *time >= horizon)
            .fold((0usize, 0usize), |(calls, errors), (_, error)| {
                (calls + 1, errors + usize::from(*error))
            });
        (calls >= self.config.min_calls_for_error_rate).then(|| errors as f64 / calls as f64)
    }

    pub fn profile(&self, now: DateTime<Utc>) -> LatencyProfile {
        let state = self.state.lock();
        let endpoints = state
            .samples
            .iter()
            .filter(|(_, samples)| !samples.is_empty())
            .map(|(endpoint, samples)| {
                let mut data = Data::new(samples.iter().copied().collect::<Vec<_>>());
                let stats = EndpointStats {
                    count: samples.len(),
                    avg_ms: samples.iter().mean(),
                    p50_ms: data.percentile(50),
                    p95_ms: data.percentile(95),
                    p99_ms: data.percentile(99),
                    errors: state.errors.get(endpoint).copied().unwrap_or(0),
                };
                (endpoint.clone(), stats)
            })
            .collect();

        LatencyProfile {
            timestamp: now,
            endpoints,
            status_classes: state.status_classes.clone(),
            skip_reasons: state.skip_reasons.clone(),
        }
    }

    /// Write the current profile and append it to the history used as anomaly baseline.
    pub fn persist(
        &self,
        profile_path: &Path,
        history_path: &Path,
        now: DateTime<Utc>,
    ) -> Result<LatencyProfile, DataError> {
        let profile = self.profile(now);
        if profile.endpoints.is_empty() {
            return Ok(profile);
        }
        store::write_json_atomic(profile_path, &profile)?;
        store::append_jsonl(history_path, &profile)?;
        Ok(profile)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Critical,
}

/// One endpoint whose latency breached the baseline or an absolute threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyAnomaly {
    pub endpoint: String,
    pub severity: Severity,
    pub avg_ms: f64,
    pub p95_ms: f64,
    pub baseline_ms: Option<f64>,
    pub reasons: Vec<String>,
}

impl LatencyAnomaly {
    pub fn alert_tag(&self) -> String {
        latency_alert_tag(&self.endpoint)
    }

    pub fn message(&self) -> String {
        format!(
            "{:?} latency on {}: avg {:.0}ms p95 {:.0}ms ({})",
            self.severity,
            self.endpoint,
            self.avg_ms,
            self.p95_ms,
            self.reasons.join("; ")
        )
    }
}

/// Alert tag of latency anomalies on `endpoint`.
pub fn latency_alert_tag(endpoint: &str) -> String {
    format!("latency_{}", endpoint.replace(['/', ' '], "_"))
}

/// Compare each endpoint of `current` to its baseline in `history` (oldest first) and to the
/// absolute thresholds.
pub fn detect_latency_anomalies(
    current: &LatencyProfile,
    history: &[LatencyProfile],
    config: &TelemetryConfig,
) -> Vec<LatencyAnomaly> {
    current
        .endpoints
        .iter()
        .filter(|(_, stats)| stats.count >= config.min_endpoint_samples)
        .filter_map(|(endpoint, stats)| {
            let baseline = history
                .iter()
                .filter(|snapshot| snapshot.timestamp < current.timestamp)
                .filter_map(|snapshot| snapshot.endpoints.get(endpoint).map(|s| s.avg_ms))
                .collect::<Vec<_>>();
            let baseline = &baseline[baseline.len().saturating_sub(config.baseline_len)..];

            let mut reasons = Vec::new();
            let mut severity = None;

            let baseline_mean = (baseline.len() >= config.min_baseline).then(|| {
                let mean = baseline.iter().mean();
                let limit = mean + config.sigma * baseline.iter().population_std_dev();
                if stats.avg_ms > limit {
                    reasons.push(format!(
                        "avg {:.0}ms above baseline {:.0}ms + {}σ",
                        stats.avg_ms, mean, config.sigma
                    ));
                    severity = Some(Severity::Warning);
                }
                mean
            });

            if stats.avg_ms > config.critical_avg_ms {
                reasons.push(format!("avg > {:.0}ms", config.critical_avg_ms));
                severity = Some(Severity::Critical);
            }
            if stats.p95_ms > config.critical_p95_ms {
                reasons.push(format!("p95 > {:.0}ms", config.critical_p95_ms));
                severity = Some(Severity::Critical);
            }
            if severity.is_none() && stats.avg_ms > config.warning_avg_ms {
                reasons.push(format!("avg > {:.0}ms", config.warning_avg_ms));
                severity = Some(Severity::Warning);
            }

            severity.map(|severity| LatencyAnomaly {
                endpoint: endpoint.clone(),
                severity,
                avg_ms: stats.avg_ms,
                p95_ms: stats.p95_ms,
                baseline_ms: baseline_mean,
                reasons,
            })
        })
        .collect()
}
