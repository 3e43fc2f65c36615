//! Daily trade log and skip log.
//!
//! The trading loop is the only appender. The settlement reconciler rewrites a day file in
//! place, changing outcome fields only, and only when a row actually changed.

use crate::{error::JournalError, regime::Regime};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::BTreeMap;
use strikebot_data::{PathsConfig, store};
use strikebot_instrument::{Asset, Cents, Side, market::is_valid_price};
use tracing::debug;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Display, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    #[display("pending")]
    Pending,
    #[display("executed")]
    Executed,
    #[display("won")]
    Won,
    #[display("lost")]
    Lost,
    #[display("cancelled")]
    Cancelled,
    #[display("error")]
    Error,
}

impl ResultStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ResultStatus::Won | ResultStatus::Lost | ResultStatus::Cancelled | ResultStatus::Error
        )
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, ResultStatus::Won | ResultStatus::Lost)
    }

    pub fn can_transition(&self, to: ResultStatus) -> bool {
        use ResultStatus::*;
        matches!(
            (self, to),
            (Pending, Executed | Cancelled | Error) | (Executed, Won | Lost | Error)
        )
    }
}

fn trade_type() -> String {
    "trade".to_string()
}

/// One line of the daily trade log.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TradeRecord {
    pub id: SmolStr,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type", default = "trade_type")]
    pub record_type: String,
    pub ticker: SmolStr,
    pub asset: Asset,
    pub side: Side,
    pub contracts: u32,
    pub price_cents: u32,
    pub cost_cents: Cents,
    pub edge: f64,
    pub our_prob: f64,
    pub market_prob: f64,
    pub strike: f64,
    pub current_price: f64,
    pub close_time: DateTime<Utc>,
    pub minutes_to_expiry: f64,
    pub regime: Regime,
    pub regime_confidence: f64,
    pub dynamic_min_edge: f64,
    pub momentum_dir: f64,
    pub momentum_str: f64,
    pub full_alignment: bool,
    pub vol_ratio: Option<f64>,
    pub kelly_fraction_used: f64,
    pub size_multiplier_total: f64,
    pub result_status: ResultStatus,
    #[serde(default)]
    pub order_id: Option<SmolStr>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settlement_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profit_cents: Option<Cents>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<DateTime<Utc>>,
}

impl TradeRecord {
    /// Check the row invariants: `0 < price < 100`, `contracts >= 1`, `cost = contracts x price`.
    pub fn validate(&self) -> Result<(), JournalError> {
        let invalid = |reason: String| JournalError::InvalidTrade {
            id: self.id.to_string(),
            reason,
        };
        if !is_valid_price(self.price_cents) {
            return Err(invalid(format!("price {}c outside 1..=99", self.price_cents)));
        }
        if self.contracts == 0 {
            return Err(invalid("zero contracts".to_string()));
        }
        let expected = Cents::from(self.contracts) * Cents::from(self.price_cents);
        if self.cost_cents != expected {
            return Err(invalid(format!(
                "cost {}c != {} x {}c",
                self.cost_cents, self.contracts, self.price_cents
            )));
        }
        Ok(())
    }

    /// Move to `to`, refusing transitions out of terminal states.
    pub fn transition(&mut self, to: ResultStatus) -> Result<(), JournalError> {
        if self.result_status == to {
            return Ok(());
        }
        if !self.result_status.can_transition(to) {
            return Err(JournalError::IllegalTransition {
                id: self.id.to_string(),
                from: self.result_status.to_string(),
                to: to.to_string(),
            });
        }
        self.result_status = to;
        Ok(())
    }

    /// Outcome of a settled trade as 1.0 (won) or 0.0 (lost).
    pub fn outcome(&self) -> Option<f64> {
        match self.result_status {
            ResultStatus::Won => Some(1.0),
            ResultStatus::Lost => Some(0.0),
            _ => None,
        }
    }

    pub fn trade_date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// One line of the daily skip log.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SkipRecord {
    pub timestamp: DateTime<Utc>,
    pub ticker: SmolStr,
    pub asset: Asset,
    pub reason: String,
    pub edge: Option<f64>,
    pub dynamic_min_edge: Option<f64>,
    /// `dynamic_min_edge - edge` for edge skips.
    pub gap: Option<f64>,
    pub regime: Regime,
    #[serde(default)]
    pub side: Option<Side>,
    #[serde(default)]
    pub our_prob: Option<f64>,
    #[serde(default)]
    pub price_cents: Option<u32>,
    #[serde(default)]
    pub minutes_to_expiry: Option<f64>,
}

impl SkipRecord {
    /// Short reason label used for counters (`edge<min`, `too_close_expiry`, ...).
    pub fn reason_key(&self) -> &str {
        self.reason.split_whitespace().next().unwrap_or(&self.reason)
    }
}

/// File-backed trade and skip logs sharded by UTC day.
#[derive(Debug, Clone)]
pub struct TradeJournal {
    paths: PathsConfig,
    dry_run: bool,
}

impl TradeJournal {
    pub fn new(paths: PathsConfig, dry_run: bool) -> Self {
        Self { paths, dry_run }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn trades_path(&self, date: NaiveDate) -> std::path::PathBuf {
        self.paths.trades_log(date, self.dry_run)
    }

    /// Append a validated trade row to the log of its entry day.
    pub fn append(&self, trade: &TradeRecord) -> Result<(), JournalError> {
        trade.validate()?;
        let path = self.trades_path(trade.trade_date());
        store::append_jsonl(&path, trade)?;
        debug!(?path, id = %trade.id, status = %trade.result_status, "trade appended");
        Ok(())
    }

    pub fn read_day(&self, date: NaiveDate) -> Result<Vec<TradeRecord>, JournalError> {
        Ok(store::read_jsonl(self.trades_path(date))?)
    }

    /// Rows of every day in `[from, to]`, keyed by day.
    pub fn read_days(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, Vec<TradeRecord>>, JournalError> {
        from.iter_days()
            .take_while(|date| *date <= to)
            .map(|date| Ok((date, self.read_day(date)?)))
            .filter(|result| !matches!(result, Ok((_, rows)) if rows.is_empty()))
            .collect()
    }

    /// Every trade entered within the last `days` days of `now`, oldest day first.
    pub fn read_recent(&self, now: DateTime<Utc>, days: i64) -> Result<Vec<TradeRecord>, JournalError> {
        let from = (now - Duration::days(days)).date_naive();
        Ok(self
            .read_days(from, now.date_naive())?
            .into_values()
            .flatten()
            .collect())
    }

    /// Replace a day file atomically. Invalid rows are refused.
    pub fn rewrite_day(&self, date: NaiveDate, trades: &[TradeRecord]) -> Result<(), JournalError> {
        trades.iter().try_for_each(TradeRecord::validate)?;
        store::rewrite_jsonl(self.trades_path(date), trades)?;
        Ok(())
    }

    pub fn append_skip(&self, skip: &SkipRecord) -> Result<(), JournalError> {
        store::append_jsonl(self.paths.skips_log(skip.timestamp.date_naive()), skip)?;
        Ok(())
    }

    pub fn read_skips(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<SkipRecord>, JournalError> {
        let mut skips = Vec::new();
        for date in from.iter_days().take_while(|date| *date <= to) {
            skips.extend(store::read_jsonl::<SkipRecord>(self.paths.skips_log(date))?);
        }
        Ok(skips)
    }
}

/// Settled trades ordered by settlement time (entry time when unknown).
pub fn settled_chronologically(trades: &[TradeRecord]) -> Vec<&TradeRecord> {
    let mut settled = trades
        .iter()
        .filter(|trade| trade.result_status.is_settled())
        .collect::<Vec<_>>();
    settled.sort_by_key(|trade| (trade.settled_at.unwrap_or(trade.timestamp), trade.timestamp));
    settled
}
