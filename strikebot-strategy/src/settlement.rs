//! Settlement reconciler and settlement price validator.
//!
//! The reconciler follows pending orders up, resolves matured executed trades against the
//! venue's settlement and rewrites only the day files whose rows changed. Terminal rows are
//! never touched again, so a second run over the same inputs changes no bytes.

use crate::{
    alert::AlertBook,
    config::CalibrationConfig,
    engine::AUTH_FAILURE_TAG,
    error::EngineError,
    journal::{ResultStatus, TradeJournal, TradeRecord},
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};
use strikebot_data::{PathsConfig, history::HistoricalPriceSource, store};
use strikebot_execution::{OrderStatus, Venue, VenueError};
use strikebot_instrument::{Asset, Cents, FailureKind, Market, MarketStatus, Side};
use tracing::{debug, info, warn};

pub const SETTLEMENT_MISMATCH_TAG: &str = "settlement_mismatch";
pub const SETTLEMENT_VALIDATION_TAG: &str = "settlement_validation";

/// Winning side of a determined market: YES iff the settlement price is at or above the
/// strike, else the venue-declared result. `None` while undetermined.
pub fn winning_side(market: &Market, strike: f64) -> Option<(Side, Option<f64>)> {
    match (market.expiration_value, market.result) {
        (Some(price), _) => {
            let side = if price >= strike { Side::Yes } else { Side::No };
            Some((side, Some(price)))
        }
        (None, Some(side)) => Some((side, None)),
        (None, None) => None,
    }
}

/// Profit of a settled position: `contracts x (100 - price)` on a win, `-cost` on a loss.
pub fn settlement_profit(trade: &TradeRecord, won: bool) -> Cents {
    if won {
        Cents::from(trade.contracts) * (100 - Cents::from(trade.price_cents))
    } else {
        -trade.cost_cents
    }
}

/// Per-ticker entry of `kalshi-settlements-v2.json`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SettlementEntry {
    pub asset: Asset,
    pub side: Side,
    pub strike: f64,
    pub close_time: DateTime<Utc>,
    pub trade_ids: Vec<SmolStr>,
    pub contracts: u32,
    pub cost_cents: Cents,
    pub result_status: ResultStatus,
    pub settlement_price: Option<f64>,
    pub profit_cents: Option<Cents>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SettlementSummary {
    pub wins: usize,
    pub losses: usize,
    pub pending: usize,
    pub cancelled: usize,
    pub errors: usize,
    pub total_pnl_cents: Cents,
}

/// Contents of `kalshi-settlements-v2.json`. Carries no run timestamp so identical inputs
/// serialise to identical bytes.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SettlementBook {
    pub trades: BTreeMap<SmolStr, SettlementEntry>,
    pub summary: SettlementSummary,
}

impl SettlementBook {
    pub fn from_trades<'a>(trades: impl IntoIterator<Item = &'a TradeRecord>) -> Self {
        let mut book = SettlementBook::default();
        for trade in trades {
            match trade.result_status {
                ResultStatus::Won => book.summary.wins += 1,
                ResultStatus::Lost => book.summary.losses += 1,
                ResultStatus::Pending | ResultStatus::Executed => book.summary.pending += 1,
                ResultStatus::Cancelled => book.summary.cancelled += 1,
                ResultStatus::Error => book.summary.errors += 1,
            }
            book.summary.total_pnl_cents += trade.profit_cents.unwrap_or_default();

            let entry = book
                .trades
                .entry(trade.ticker.clone())
                .or_insert_with(|| SettlementEntry {
                    asset: trade.asset,
                    side: trade.side,
                    strike: trade.strike,
                    close_time: trade.close_time,
                    trade_ids: Vec::new(),
                    contracts: 0,
                    cost_cents: 0,
                    result_status: trade.result_status,
                    settlement_price: None,
                    profit_cents: None,
                });
            entry.trade_ids.push(trade.id.clone());
            entry.contracts += trade.contracts;
            entry.cost_cents += trade.cost_cents;
            entry.result_status = trade.result_status;
            entry.settlement_price = trade.settlement_price.or(entry.settlement_price);
            if let Some(profit) = trade.profit_cents {
                entry.profit_cents = Some(entry.profit_cents.unwrap_or_default() + profit);
            }
        }
        book
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub filled: usize,
    pub cancelled: usize,
    pub won: usize,
    pub lost: usize,
    pub errors: usize,
    pub rewritten_days: Vec<NaiveDate>,
    pub summary: SettlementSummary,
}

impl ReconcileReport {
    pub fn changed(&self) -> bool {
        !self.rewritten_days.is_empty()
    }
}

pub struct SettlementReconciler {
    venue: Arc<dyn Venue>,
    journal: TradeJournal,
    alerts: AlertBook,
    paths: PathsConfig,
    config: CalibrationConfig,
}

impl std::fmt::Debug for SettlementReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementReconciler")
            .field("venue", &self.venue.name())
            .field("journal", &self.journal)
            .finish()
    }
}

impl SettlementReconciler {
    pub fn new(
        venue: Arc<dyn Venue>,
        journal: TradeJournal,
        alerts: AlertBook,
        paths: PathsConfig,
        config: CalibrationConfig,
    ) -> Self {
        Self {
            venue,
            journal,
            alerts,
            paths,
            config,
        }
    }

    /// Reconcile every open row entered within the lookback window as of `now`.
    pub async fn reconcile(&self, now: DateTime<Utc>) -> Result<ReconcileReport, EngineError> {
        let from = (now - Duration::days(self.config.lookback_days)).date_naive();
        let days = self.journal.read_days(from, now.date_naive())?;
        let mut markets = HashMap::new();
        let mut report = ReconcileReport::default();
        let mut all_rows = Vec::new();

        for (date, rows) in days {
            let mut updated = rows.clone();
            for row in updated.iter_mut() {
                match row.result_status {
                    ResultStatus::Pending => self.follow_up(row, &mut markets, &mut report, now).await?,
                    ResultStatus::Executed if row.close_time <= now => {
                        self.settle(row, &mut markets, &mut report, now).await?
                    }
                    _ => {}
                }
            }
            if updated != rows {
                self.journal.rewrite_day(date, &updated)?;
                info!(%date, "trade log rewritten with settlements");
                report.rewritten_days.push(date);
            }
            all_rows.extend(updated);
        }

        let book = SettlementBook::from_trades(&all_rows);
        store::write_json_atomic(self.paths.settlements(), &book)?;
        report.summary = book.summary;
        info!(
            filled = report.filled,
            cancelled = report.cancelled,
            won = report.won,
            lost = report.lost,
            errors = report.errors,
            total_pnl_cents = report.summary.total_pnl_cents,
            "settlement reconcile complete"
        );
        Ok(report)
    }

    /// Promote or cancel a resting order.
    async fn follow_up(
        &self,
        row: &mut TradeRecord,
        markets: &mut HashMap<SmolStr, Market>,
        report: &mut ReconcileReport,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let ack = match &row.order_id {
            Some(order_id) => match self.venue.order(order_id).await {
                Ok(ack) => Some(ack),
                Err(error) => {
                    self.venue_failure(&row.ticker, error, now)?;
                    return Ok(());
                }
            },
            None => None,
        };

        let fill = ack.as_ref().map(|ack| ack.fill_count).unwrap_or_default();
        if fill > 0 {
            row.transition(ResultStatus::Executed)?;
            if fill < row.contracts {
                row.contracts = fill;
                row.cost_cents = Cents::from(fill) * Cents::from(row.price_cents);
            }
            report.filled += 1;
            info!(ticker = %row.ticker, fill, "pending order filled");
            // A fill after expiry settles in the same run.
            if row.close_time <= now {
                self.settle(row, markets, report, now).await?;
            }
            return Ok(());
        }

        let canceled = ack.is_some_and(|ack| ack.status == OrderStatus::Canceled);
        if canceled || row.close_time <= now {
            row.transition(ResultStatus::Cancelled)?;
            report.cancelled += 1;
            info!(ticker = %row.ticker, canceled, "unfilled order cancelled");
        }
        Ok(())
    }

    /// Resolve a matured executed row to won, lost or error.
    async fn settle(
        &self,
        row: &mut TradeRecord,
        markets: &mut HashMap<SmolStr, Market>,
        report: &mut ReconcileReport,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        if !markets.contains_key(&row.ticker) {
            match self.venue.market(&row.ticker).await {
                Ok(market) => {
                    markets.insert(row.ticker.clone(), market);
                }
                Err(error) => {
                    self.venue_failure(&row.ticker, error, now)?;
                    return Ok(());
                }
            }
        }
        let Some(market) = markets.get(&row.ticker) else {
            return Ok(());
        };

        match winning_side(market, row.strike) {
            Some((winner, settlement_price)) => {
                let won = winner == row.side;
                row.transition(if won { ResultStatus::Won } else { ResultStatus::Lost })?;
                row.settlement_price = settlement_price;
                row.profit_cents = Some(settlement_profit(row, won));
                row.settled_at.get_or_insert(now);
                if won {
                    report.won += 1;
                } else {
                    report.lost += 1;
                }
                info!(
                    ticker = %row.ticker,
                    side = %row.side,
                    settlement_price = ?settlement_price,
                    profit_cents = ?row.profit_cents,
                    status = %row.result_status,
                    "trade settled"
                );
            }
            None if market.status == MarketStatus::Settled => {
                let error = EngineError::SettlementMismatch {
                    ticker: row.ticker.to_string(),
                    reason: "market settled without price or result".to_string(),
                };
                warn!(ticker = %row.ticker, kind = %error.kind(), %error, "settlement undeterminable");
                row.transition(ResultStatus::Error)?;
                row.error = Some(error.to_string());
                row.settled_at.get_or_insert(now);
                report.errors += 1;
                self.alerts.raise(SETTLEMENT_MISMATCH_TAG, &error.to_string(), now)?;
            }
            None => debug!(ticker = %row.ticker, status = ?market.status, "market not yet determined"),
        }
        Ok(())
    }

    /// Venue failures leave the row for the next run; auth failures stop the run.
    fn venue_failure(
        &self,
        ticker: &str,
        error: VenueError,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let error = EngineError::from(error);
        if error.kind() == FailureKind::Auth {
            self.alerts.raise(
                AUTH_FAILURE_TAG,
                &format!("Kalshi rejected our credentials: {error}"),
                now,
            )?;
            return Err(error);
        }
        warn!(%ticker, kind = %error.kind(), disposition = ?error.disposition(), %error, "settlement lookup failed, retrying next run");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ValidationSample {
    pub ticker: SmolStr,
    pub asset: Asset,
    pub close_time: DateTime<Utc>,
    pub venue_price: f64,
    pub reference_price: f64,
    /// `|venue - reference| / reference`.
    pub relative_error: f64,
}

/// Contents of `settlement-validation.json`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SettlementValidation {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub samples: Vec<ValidationSample>,
    pub unmatched: usize,
    pub mean_abs_error: Option<f64>,
    pub tolerance: f64,
    pub breached: bool,
}

/// Cross-check settlement prices of recent trades against `history` at their close time.
///
/// A mean relative error above tolerance over at least `min_validation_samples` raises the
/// settlement validation alert; a clean run clears it.
pub async fn validate_settlements(
    journal: &TradeJournal,
    history: &dyn HistoricalPriceSource,
    alerts: &AlertBook,
    paths: &PathsConfig,
    config: &CalibrationConfig,
    now: DateTime<Utc>,
) -> Result<SettlementValidation, EngineError> {
    let trades = journal.read_recent(now, config.lookback_days)?;
    let mut settled = BTreeMap::new();
    for trade in &trades {
        if let Some(price) = trade.settlement_price {
            settled
                .entry(trade.ticker.clone())
                .or_insert((trade.asset, trade.close_time, price));
        }
    }

    let window = Duration::minutes(config.settlement_window_minutes);
    let mut samples = Vec::new();
    let mut unmatched = 0;
    for (ticker, (asset, close_time, venue_price)) in settled {
        match history.price_at(asset, close_time, window).await {
            Ok(Some(reference_price)) if reference_price > 0.0 => {
                samples.push(ValidationSample {
                    relative_error: (venue_price - reference_price).abs() / reference_price,
                    ticker,
                    asset,
                    close_time,
                    venue_price,
                    reference_price,
                });
            }
            Ok(_) => unmatched += 1,
            Err(error) => {
                warn!(%ticker, source = history.name(), %error, "reference price lookup failed");
                unmatched += 1;
            }
        }
    }

    let mean_abs_error = (!samples.is_empty())
        .then(|| samples.iter().map(|s| s.relative_error).sum::<f64>() / samples.len() as f64);
    let breached = samples.len() >= config.min_validation_samples
        && mean_abs_error.is_some_and(|error| error > config.settlement_tolerance);

    if breached {
        alerts.raise(
            SETTLEMENT_VALIDATION_TAG,
            &format!(
                "settlement prices deviate {:.3}% on average from {} over {} trades (tolerance {:.3}%)",
                mean_abs_error.unwrap_or_default() * 100.0,
                history.name(),
                samples.len(),
                config.settlement_tolerance * 100.0
            ),
            now,
        )?;
    } else {
        alerts.clear(SETTLEMENT_VALIDATION_TAG)?;
    }

    let validation = SettlementValidation {
        timestamp: now,
        source: history.name().to_string(),
        samples,
        unmatched,
        mean_abs_error,
        tolerance: config.settlement_tolerance,
        breached,
    };
    store::write_json_atomic(paths.settlement_validation(), &validation)?;
    info!(
        samples = validation.samples.len(),
        unmatched,
        mean_abs_error = ?mean_abs_error,
        breached,
        "settlement validation"
    );
    Ok(validation)
}
