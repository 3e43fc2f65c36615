//! API reliability probes: one request per price source, appended to `api-reliability.jsonl`.

use crate::{error::DataError, price::PriceSource, store};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{collections::BTreeMap, path::Path, time::Instant};
use strikebot_instrument::Asset;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeRecord {
    pub timestamp: DateTime<Utc>,
    pub source: SmolStr,
    pub asset: Asset,
    pub ok: bool,
    pub latency_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

/// Uptime and latency of one source over the reliability log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReliability {
    pub source: SmolStr,
    pub probes: usize,
    pub uptime_pct: f64,
    pub avg_latency_ms: f64,
    pub failures: BTreeMap<String, usize>,
}

/// Probe every source once for `asset` and append the records.
pub async fn probe_sources(
    sources: &[Box<dyn PriceSource>],
    asset: Asset,
    log: &Path,
) -> Result<Vec<ProbeRecord>, DataError> {
    let mut records = Vec::with_capacity(sources.len());
    for source in sources {
        let started = Instant::now();
        let result = source.quote(asset).await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        let record = ProbeRecord {
            timestamp: Utc::now(),
            source: SmolStr::new(source.name()),
            asset,
            ok: result.is_ok(),
            latency_ms,
            failure: result.as_ref().err().map(|e| e.attribution().to_string()),
            price: result.ok(),
        };
        info!(source = %record.source, %asset, ok = record.ok, latency_ms, "probe");
        store::append_jsonl(log, &record)?;
        records.push(record);
    }
    Ok(records)
}

/// Summarise the reliability log per source, ordered by source name.
pub fn summarise(records: &[ProbeRecord]) -> Vec<SourceReliability> {
    records
        .iter()
        .into_group_map_by(|record| record.source.clone())
        .into_iter()
        .sorted_by(|a, b| a.0.cmp(&b.0))
        .map(|(source, records)| {
            let probes = records.len();
            let ok = records.iter().filter(|record| record.ok).count();
            let avg_latency_ms =
                records.iter().map(|record| record.latency_ms).sum::<f64>() / probes as f64;
            let failures = records
                .iter()
                .filter_map(|record| record.failure.clone())
                .counts()
                .into_iter()
                .collect();
            SourceReliability {
                source,
                probes,
                uptime_pct: ok as f64 / probes as f64 * 100.0,
                avg_latency_ms,
                failures,
            }
        })
        .collect()
}
