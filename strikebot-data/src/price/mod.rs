use crate::error::DataError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{collections::BTreeMap, time::Duration};
use strikebot_instrument::Asset;

/// Binance spot ticker source.
pub mod binance;

/// CoinGecko simple price source.
pub mod coingecko;

/// Coinbase spot price source.
pub mod coinbase;

/// Multi-source consensus and spread anomaly detection.
pub mod oracle;

pub use binance::BinanceSpot;
pub use coinbase::CoinbaseSpot;
pub use coingecko::CoinGeckoSimple;
pub use oracle::PriceOracle;

/// Capability of an external spot price provider.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Stable identifier used in logs, telemetry and per-source price maps.
    fn name(&self) -> &str;

    /// Endpoint path reported in rate-limit and reliability logs.
    fn endpoint(&self, asset: Asset) -> String;

    /// Latest USD spot price of `asset`.
    async fn quote(&self, asset: Asset) -> Result<f64, DataError>;
}

/// How the consensus value of a [`SpotPrice`] was derived.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusMethod {
    /// Median over two or more sources.
    Median,
    /// Only one source answered; the tick is degraded.
    SingleSource,
}

/// Consensus spot price for one asset at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotPrice {
    pub asset: Asset,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub sources: BTreeMap<SmolStr, f64>,
    pub method: ConsensusMethod,
    /// Maximum pairwise relative spread across answering sources.
    pub max_spread: f64,
    /// Per-source failures, keyed by source name, valued by attribution label.
    pub failures: BTreeMap<SmolStr, String>,
}

impl SpotPrice {
    pub fn is_degraded(&self) -> bool {
        self.method == ConsensusMethod::SingleSource
    }
}

/// Construct the configured price sources, in order. Unknown names are ignored with a warning.
pub fn sources_from_names(names: &[String], timeout: Duration) -> Vec<Box<dyn PriceSource>> {
    let client = crate::http::client(timeout);
    names
        .iter()
        .filter_map(|name| -> Option<Box<dyn PriceSource>> {
            match name.as_str() {
                "binance" => Some(Box::new(BinanceSpot::new(client.clone(), timeout))),
                "coingecko" => Some(Box::new(CoinGeckoSimple::new(client.clone(), timeout))),
                "coinbase" => Some(Box::new(CoinbaseSpot::new(client.clone(), timeout))),
                other => {
                    tracing::warn!(source = %other, "unknown price source in configuration");
                    None
                }
            }
        })
        .collect()
}

/// Parse a price that some venues encode as a JSON string.
pub(crate) fn parse_price(source_name: &str, raw: &str) -> Result<f64, DataError> {
    let value: f64 = raw
        .parse()
        .map_err(|e| DataError::parse(source_name, format!("{raw}: {e}")))?;
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(DataError::parse(source_name, format!("non-positive price {raw}")))
    }
}
