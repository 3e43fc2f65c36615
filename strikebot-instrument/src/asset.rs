use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Underlying asset a binary market is written on.
///
/// The set is fixed at compile time; every per-asset table (volatility constants, OHLC cache
/// files, Kalshi series) is keyed by this enum.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Display, Deserialize, Serialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Asset {
    #[display("BTC")]
    Btc,
    #[display("ETH")]
    Eth,
}

impl Asset {
    pub const ALL: [Asset; 2] = [Asset::Btc, Asset::Eth];

    /// Kalshi series ticker for the daily "above strike" markets.
    pub fn kalshi_series(&self) -> &'static str {
        match self {
            Asset::Btc => "KXBTCD",
            Asset::Eth => "KXETHD",
        }
    }

    /// Binance spot symbol quoted in USDT.
    pub fn binance_symbol(&self) -> &'static str {
        match self {
            Asset::Btc => "BTCUSDT",
            Asset::Eth => "ETHUSDT",
        }
    }

    /// CoinGecko coin id.
    pub fn coingecko_id(&self) -> &'static str {
        match self {
            Asset::Btc => "bitcoin",
            Asset::Eth => "ethereum",
        }
    }

    /// Coinbase spot product.
    pub fn coinbase_pair(&self) -> &'static str {
        match self {
            Asset::Btc => "BTC-USD",
            Asset::Eth => "ETH-USD",
        }
    }

    /// Lower-case file stem used by the OHLC cache (eg/ `btc-ohlc.json`).
    pub fn file_stem(&self) -> &'static str {
        match self {
            Asset::Btc => "btc",
            Asset::Eth => "eth",
        }
    }

    /// Resolve the asset a Kalshi ticker or series belongs to (eg/ `KXBTCD-25JAN3117-T99999.99`).
    pub fn from_ticker(ticker: &str) -> Option<Self> {
        let upper = ticker.to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|asset| upper.starts_with(asset.kalshi_series()))
    }
}

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
#[error("unknown asset: {0}")]
pub struct UnknownAsset(pub String);

impl FromStr for Asset {
    type Err = UnknownAsset;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BTC" | "BITCOIN" => Ok(Asset::Btc),
            "ETH" | "ETHEREUM" => Ok(Asset::Eth),
            _ => Err(UnknownAsset(s.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_from_ticker() {
        assert_eq!(Asset::from_ticker("KXBTCD-25JAN3117-T99999.99"), Some(Asset::Btc));
        assert_eq!(Asset::from_ticker("kxethd-25jan3117-t3500"), Some(Asset::Eth));
        assert_eq!(Asset::from_ticker("KXSOLD-25JAN3117"), None);
    }

    #[test]
    fn test_asset_serde_uppercase() {
        assert_eq!(serde_json::to_string(&Asset::Btc).unwrap(), "\"BTC\"");
        let asset: Asset = serde_json::from_str("\"ETH\"").unwrap();
        assert_eq!(asset, Asset::Eth);
        assert_eq!("btc".parse::<Asset>().unwrap(), Asset::Btc);
        assert!("doge".parse::<Asset>().is_err());
    }
}
