use crate::{alert::AlertBook, error::EngineError};
use chrono::{DateTime, Utc};
use strikebot_data::{DataError, PathsConfig, store};
use strikebot_execution::{
    TelemetryConfig,
    telemetry::{
        CallOutcome, LatencyAnomaly, LatencyProfile, detect_latency_anomalies, latency_alert_tag,
    },
};
use tracing::info;

/// Telemetry outcome of a failed data source call.
pub fn data_call_outcome(error: &DataError) -> CallOutcome {
    match error {
        DataError::Timeout { .. } => CallOutcome::Timeout,
        DataError::Connection { .. } => CallOutcome::Connection,
        DataError::Status { status, .. } => CallOutcome::Status(*status),
        DataError::RateLimited { .. } | DataError::CoolingDown { .. } => CallOutcome::Status(429),
        _ => CallOutcome::Status(422),
    }
}

/// Compare the persisted latency profile with its history and raise one alert per anomalous
/// endpoint. Endpoints back within bounds have their alert cleared.
pub fn check_latency(
    paths: &PathsConfig,
    config: &TelemetryConfig,
    alerts: &AlertBook,
    now: DateTime<Utc>,
) -> Result<Vec<LatencyAnomaly>, EngineError> {
    let Some(current) = store::read_json::<LatencyProfile>(paths.latency_profile())? else {
        return Ok(Vec::new());
    };
    let history = store::read_jsonl::<LatencyProfile>(paths.latency_history())?;
    let anomalies = detect_latency_anomalies(&current, &history, config);

    for endpoint in current.endpoints.keys() {
        match anomalies.iter().find(|anomaly| &anomaly.endpoint == endpoint) {
            Some(anomaly) => {
                alerts.raise(&anomaly.alert_tag(), &anomaly.message(), now)?;
            }
            None => {
                alerts.clear(&latency_alert_tag(endpoint))?;
            }
        }
    }

    info!(endpoints = current.endpoints.len(), anomalies = anomalies.len(), "latency check");
    Ok(anomalies)
}
