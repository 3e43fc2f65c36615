//! One trading tick: breakers, consensus price, candle state, market scan, edge gate, sizing
//! and order placement.
//!
//! Every decision produces one structured log line and, for skips and trades, a durable row.
//! A failure on one market or asset never aborts the tick; only breakers, authentication
//! failures and the open-position guard halt it.

use crate::{
    alert::AlertBook,
    breaker::{BreakerReason, BreakerStatus, BreakerTrip, CircuitBreaker},
    config::StrikebotConfig,
    edge::{Candidate, assess_edge, dynamic_min_edge, price_guard, rank_candidates},
    error::{Disposition, EngineError},
    journal::{ResultStatus, SkipRecord, TradeJournal, TradeRecord},
    latency::{check_latency, data_call_outcome},
    momentum::{MomentumState, score_momentum},
    regime::{RegimeState, detect_regime},
    signal::probability_above_strike,
    sizing::{SizingInput, size_position},
    volatility::{VolatilityModel, realized_over_days},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};
use strikebot_data::{CandleWindow, OhlcCache, PriceOracle, SpotPrice, store};
use strikebot_execution::{
    Balance, OrderRequest, OrderStatus, Telemetry, Venue, telemetry::CallOutcome,
};
use strikebot_instrument::{Asset, CandleInterval, Cents, FailureKind, Market, MarketStatus};
use tracing::{error, info, warn};

/// Alert tag raised when the venue rejects our credentials.
pub const AUTH_FAILURE_TAG: &str = "auth_failure";

/// Written every tick to `autotrader-heartbeat.json`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Heartbeat {
    pub timestamp: DateTime<Utc>,
    pub dry_run: bool,
    pub halted: Option<String>,
    pub trades_placed: usize,
    pub skips: usize,
    pub balance_cents: Option<Cents>,
    pub portfolio_value_cents: Option<Cents>,
}

impl Heartbeat {
    pub fn load(paths: &strikebot_data::PathsConfig) -> Result<Option<Self>, EngineError> {
        Ok(store::read_json(paths.heartbeat())?)
    }
}

/// Why a tick stopped before placing orders.
#[derive(Debug, Clone, PartialEq)]
pub enum TickHalt {
    Breaker(BreakerTrip),
    Auth(String),
    Venue(String),
    MaxPositions(usize),
}

impl std::fmt::Display for TickHalt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TickHalt::Breaker(trip) => {
                write!(f, "breaker {}: {}", trip.reason.alert_tag(), trip.detail)
            }
            TickHalt::Auth(message) => write!(f, "auth failure: {message}"),
            TickHalt::Venue(message) => write!(f, "venue unavailable: {message}"),
            TickHalt::MaxPositions(open) => write!(f, "{open} open positions at limit"),
        }
    }
}

/// Outcome of one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub started_at: DateTime<Utc>,
    pub halted: Option<TickHalt>,
    pub trades: Vec<TradeRecord>,
    pub skips: Vec<SkipRecord>,
    pub degraded_assets: Vec<Asset>,
    /// Assets whose markets were not scanned this tick, with the cause.
    pub skipped_assets: Vec<(Asset, String)>,
}

impl TickReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            halted: None,
            trades: Vec::new(),
            skips: Vec::new(),
            degraded_assets: Vec::new(),
            skipped_assets: Vec::new(),
        }
    }

    pub fn placed(&self) -> impl Iterator<Item = &TradeRecord> {
        self.trades
            .iter()
            .filter(|trade| trade.result_status != ResultStatus::Error)
    }
}

/// Per-asset model inputs, computed once per tick.
#[derive(Debug, Clone)]
struct AssetContext {
    spot: SpotPrice,
    regime: RegimeState,
    momentum: MomentumState,
    assumed_sigma: f64,
    realized_sigma: Option<f64>,
}

enum Execution {
    Placed(TradeRecord),
    Failed(TradeRecord, EngineError),
    Skipped(SkipRecord),
}

pub struct TradingEngine {
    config: StrikebotConfig,
    oracle: PriceOracle,
    ohlc: OhlcCache,
    venue: Arc<dyn Venue>,
    telemetry: Telemetry,
    journal: TradeJournal,
    alerts: AlertBook,
    breaker: CircuitBreaker,
}

impl std::fmt::Debug for TradingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradingEngine")
            .field("venue", &self.venue.name())
            .field("oracle", &self.oracle)
            .field("dry_run", &self.journal.is_dry_run())
            .finish()
    }
}

impl TradingEngine {
    pub fn new(
        config: StrikebotConfig,
        oracle: PriceOracle,
        ohlc: OhlcCache,
        venue: Arc<dyn Venue>,
        telemetry: Telemetry,
        journal: TradeJournal,
    ) -> Self {
        let alerts = AlertBook::new(config.paths.clone(), config.alerts.clone());
        let breaker = CircuitBreaker::new(config.paths.clone(), config.breaker.clone());
        Self {
            config,
            oracle,
            ohlc,
            venue,
            telemetry,
            journal,
            alerts,
            breaker,
        }
    }

    pub fn alerts(&self) -> &AlertBook {
        &self.alerts
    }

    pub fn journal(&self) -> &TradeJournal {
        &self.journal
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub async fn tick(&mut self) -> Result<TickReport, EngineError> {
        self.tick_at(Utc::now()).await
    }

    /// Run one tick as of `now`. Errors are returned only for failures of the local durable
    /// stores; venue and data failures are folded into the report.
    pub async fn tick_at(&mut self, now: DateTime<Utc>) -> Result<TickReport, EngineError> {
        let mut report = TickReport::new(now);
        self.oracle.begin_tick();
        self.alerts.expire(now)?;

        let recent = self
            .journal
            .read_recent(now, self.config.calibration.lookback_days)?;
        let error_rate = self.telemetry.hourly_error_rate(now);
        match self.breaker.evaluate(&recent, error_rate, now)? {
            BreakerStatus::Tripped(trip) => {
                self.alerts.raise(trip.reason.alert_tag(), &trip.detail, now)?;
                warn!(reason = trip.reason.alert_tag(), detail = %trip.detail, "tick halted by circuit breaker");
                report.halted = Some(TickHalt::Breaker(trip));
                self.finish(&report, None, now)?;
                return Ok(report);
            }
            BreakerStatus::Armed => {
                for reason in BreakerReason::ALL {
                    self.alerts.clear(reason.alert_tag())?;
                }
            }
        }

        let balance = match self.venue.balance().await {
            Ok(balance) => balance,
            Err(venue_error) => {
                report.halted = Some(self.venue_halt(&EngineError::from(venue_error), now)?);
                self.finish(&report, None, now)?;
                return Ok(report);
            }
        };
        self.alerts.clear(AUTH_FAILURE_TAG)?;

        let positions = match self.venue.positions().await {
            Ok(positions) => positions,
            Err(venue_error) => {
                report.halted = Some(self.venue_halt(&EngineError::from(venue_error), now)?);
                self.finish(&report, Some(balance), now)?;
                return Ok(report);
            }
        };
        let positioned = positions
            .iter()
            .filter(|position| position.contracts != 0 || position.resting_orders > 0)
            .map(|position| position.ticker.clone())
            .collect::<HashSet<SmolStr>>();
        if positioned.len() >= self.config.strategy.max_open_positions {
            warn!(open = positioned.len(), limit = self.config.strategy.max_open_positions, "max open positions reached, skipping scan");
            report.halted = Some(TickHalt::MaxPositions(positioned.len()));
            self.finish(&report, Some(balance), now)?;
            return Ok(report);
        }

        let model = VolatilityModel::load(&self.config.paths, &self.config.volatility)?;
        let mut contexts = BTreeMap::new();
        let mut candidates = Vec::new();
        for asset in self.config.strategy.assets.clone() {
            let context = match self.asset_context(asset, &model, now).await? {
                Ok(context) => context,
                Err(cause) => {
                    report.skipped_assets.push((asset, cause));
                    continue;
                }
            };
            if context.spot.is_degraded() {
                report.degraded_assets.push(asset);
            }

            let markets = match self.venue.markets(asset.kalshi_series()).await {
                Ok(markets) => markets,
                Err(venue_error) => {
                    let error = EngineError::from(venue_error);
                    if error.kind() == FailureKind::Auth {
                        report.halted = Some(self.venue_halt(&error, now)?);
                        self.finish(&report, Some(balance), now)?;
                        return Ok(report);
                    }
                    warn!(%asset, kind = %error.kind(), disposition = ?error.disposition(), %error, "market listing failed, skipping asset");
                    report.skipped_assets.push((asset, error.to_string()));
                    continue;
                }
            };

            for market in markets {
                match self.evaluate_market(&context, market, &positioned, now) {
                    Ok(candidate) => candidates.push(candidate),
                    Err(skip) => {
                        self.record_skip(&skip)?;
                        report.skips.push(skip);
                    }
                }
            }
            contexts.insert(asset, context);
        }

        rank_candidates(&mut candidates);
        let mut bankroll = balance.balance_cents;
        let mut placed = 0;
        for candidate in candidates {
            if placed >= self.config.strategy.max_trades_per_tick {
                break;
            }
            let Some(context) = contexts.get(&candidate.market.asset) else {
                continue;
            };
            match self.execute(&candidate, context, bankroll, now).await? {
                Execution::Placed(trade) => {
                    self.breaker.record_order(false, now)?;
                    bankroll -= trade.cost_cents;
                    placed += 1;
                    report.trades.push(trade);
                }
                Execution::Failed(trade, error) => {
                    self.breaker.record_order(true, now)?;
                    report.trades.push(trade);
                    if error.disposition() == Disposition::Halt {
                        report.halted = Some(self.venue_halt(&error, now)?);
                        break;
                    }
                }
                Execution::Skipped(skip) => {
                    self.record_skip(&skip)?;
                    report.skips.push(skip);
                }
            }
        }

        self.finish(&report, Some(balance), now)?;
        Ok(report)
    }

    /// Consensus price, regime, momentum and volatility for `asset`. The inner `Err` carries
    /// the reason the asset is skipped this tick.
    async fn asset_context(
        &mut self,
        asset: Asset,
        model: &VolatilityModel,
        now: DateTime<Utc>,
    ) -> Result<Result<AssetContext, String>, EngineError> {
        let reading = match self.oracle.consensus(asset).await {
            Ok(reading) => reading,
            Err(data_error) => {
                let error = EngineError::from(data_error);
                warn!(%asset, kind = %error.kind(), disposition = ?error.disposition(), %error, "no consensus price, skipping asset");
                return Ok(Err(error.to_string()));
            }
        };
        for outcome in &reading.outcomes {
            let call = match &outcome.result {
                Ok(_) => CallOutcome::Status(200),
                Err(error) => data_call_outcome(error),
            };
            self.telemetry.record_call_at(
                now,
                &format!("price_{}", outcome.source),
                outcome.latency_ms,
                call,
            );
        }

        if let Some(anomaly) = &reading.anomaly {
            self.alerts.raise(&anomaly.alert_tag(), &anomaly.message(), now)?;
            warn!(%asset, spread = anomaly.spread, kind = %FailureKind::Disagreement, "price sources disagree, not trading asset this tick");
            return Ok(Err(format!("price spread {:.2}%", anomaly.spread * 100.0)));
        }

        let window_4h = self.window(asset, CandleInterval::Hour4, now).await;
        let window_1h = self.window(asset, CandleInterval::Hour1, now).await;
        if window_4h.stale || window_1h.stale {
            warn!(%asset, stale_4h = window_4h.stale, stale_1h = window_1h.stale, "using stale candle history");
        }

        let regime = detect_regime(&window_4h.candles, &self.config.strategy.regime);
        let momentum = score_momentum(&window_1h.closes(), &self.config.strategy);
        let assumed_sigma = model.assumed_hourly_vol(asset);
        let realized_sigma =
            realized_over_days(&window_4h, self.config.volatility.realized_window_days);
        info!(
            %asset,
            spot = reading.price.value,
            regime = %regime.regime,
            regime_confidence = regime.confidence,
            momentum_dir = momentum.direction,
            momentum_str = momentum.strength,
            assumed_sigma,
            realized_sigma = ?realized_sigma,
            "asset context"
        );

        Ok(Ok(AssetContext {
            spot: reading.price,
            regime,
            momentum,
            assumed_sigma,
            realized_sigma,
        }))
    }

    async fn window(&self, asset: Asset, interval: CandleInterval, now: DateTime<Utc>) -> CandleWindow {
        match self.ohlc.refreshed_window(asset, interval, now).await {
            Ok(window) => window,
            Err(error) => {
                error!(%asset, ?interval, %error, "candle cache unreadable");
                CandleWindow {
                    asset,
                    interval,
                    candles: Vec::new(),
                    stale: true,
                }
            }
        }
    }

    /// Filters a market down to a ranked candidate, or the skip explaining why not.
    fn evaluate_market(
        &self,
        context: &AssetContext,
        market: Market,
        positioned: &HashSet<SmolStr>,
        now: DateTime<Utc>,
    ) -> Result<Candidate, SkipRecord> {
        let strategy = &self.config.strategy;
        let regime = context.regime.regime;
        let minutes_to_expiry = market.minutes_to_expiry(now);
        let skip = |reason: String| SkipRecord {
            timestamp: now,
            ticker: market.ticker.clone(),
            asset: market.asset,
            reason,
            edge: None,
            dynamic_min_edge: None,
            gap: None,
            regime,
            side: None,
            our_prob: None,
            price_cents: None,
            minutes_to_expiry: Some(minutes_to_expiry),
        };

        if market.status != MarketStatus::Open {
            return Err(skip("market_not_open".to_string()));
        }
        if positioned.contains(&market.ticker) {
            return Err(skip("already_positioned".to_string()));
        }
        if minutes_to_expiry < strategy.min_minutes_to_expiry {
            return Err(skip("too_close_expiry".to_string()));
        }

        let yes_probability = probability_above_strike(
            context.spot.value,
            market.strike,
            market.hours_to_expiry(now),
            context.assumed_sigma,
        );
        let Some(assessment) = assess_edge(&market, yes_probability) else {
            return Err(skip("no_quote".to_string()));
        };
        if let Some(reason) = price_guard(assessment.price_cents, strategy) {
            return Err(SkipRecord {
                side: Some(assessment.side),
                price_cents: Some(assessment.price_cents),
                our_prob: Some(assessment.our_prob),
                edge: Some(assessment.edge),
                ..skip(reason.to_string())
            });
        }

        let min_edge = dynamic_min_edge(regime, &context.momentum, assessment.side, strategy);
        if assessment.edge < min_edge {
            return Err(SkipRecord {
                edge: Some(assessment.edge),
                dynamic_min_edge: Some(min_edge),
                gap: Some(min_edge - assessment.edge),
                side: Some(assessment.side),
                our_prob: Some(assessment.our_prob),
                price_cents: Some(assessment.price_cents),
                ..skip(format!(
                    "edge<min {:.3} < {:.3} ({regime})",
                    assessment.edge, min_edge
                ))
            });
        }

        Ok(Candidate {
            spot: context.spot.value,
            assessment,
            dynamic_min_edge: min_edge,
            minutes_to_expiry,
            market,
        })
    }

    async fn execute(
        &self,
        candidate: &Candidate,
        context: &AssetContext,
        bankroll: Cents,
        now: DateTime<Utc>,
    ) -> Result<Execution, EngineError> {
        let assessment = &candidate.assessment;
        let regime = context.regime.regime;
        let price_cents = assessment
            .price_cents
            .saturating_sub(self.config.execution.price_improvement_cents)
            .max(1);

        let size = match size_position(
            &SizingInput {
                bankroll_cents: bankroll,
                edge: assessment.edge,
                price_cents,
                regime,
                assumed_hourly_vol: context.assumed_sigma,
                realized_hourly_vol: context.realized_sigma,
            },
            &self.config.strategy,
        ) {
            Ok(size) => size,
            Err(skip) => {
                return Ok(Execution::Skipped(SkipRecord {
                    timestamp: now,
                    ticker: candidate.market.ticker.clone(),
                    asset: candidate.market.asset,
                    reason: skip.reason().to_string(),
                    edge: Some(assessment.edge),
                    dynamic_min_edge: Some(candidate.dynamic_min_edge),
                    gap: None,
                    regime,
                    side: Some(assessment.side),
                    our_prob: Some(assessment.our_prob),
                    price_cents: Some(price_cents),
                    minutes_to_expiry: Some(candidate.minutes_to_expiry),
                }));
            }
        };

        let mut trade = TradeRecord {
            id: SmolStr::new(format!("{}-{}", now.timestamp_millis(), candidate.market.ticker)),
            timestamp: now,
            record_type: "trade".to_string(),
            ticker: candidate.market.ticker.clone(),
            asset: candidate.market.asset,
            side: assessment.side,
            contracts: size.contracts,
            price_cents,
            cost_cents: size.cost_cents,
            edge: assessment.edge,
            our_prob: assessment.our_prob,
            market_prob: assessment.market_prob,
            strike: candidate.market.strike,
            current_price: candidate.spot,
            close_time: candidate.market.close_time,
            minutes_to_expiry: candidate.minutes_to_expiry,
            regime,
            regime_confidence: context.regime.confidence,
            dynamic_min_edge: candidate.dynamic_min_edge,
            momentum_dir: context.momentum.direction,
            momentum_str: context.momentum.strength,
            full_alignment: context.momentum.full_alignment,
            vol_ratio: size.vol_ratio,
            kelly_fraction_used: size.kelly_fraction_used,
            size_multiplier_total: size.size_multiplier_total,
            result_status: ResultStatus::Pending,
            order_id: None,
            dry_run: self.journal.is_dry_run(),
            error: None,
            settlement_price: None,
            profit_cents: None,
            settled_at: None,
        };

        let order = OrderRequest {
            ticker: candidate.market.ticker.clone(),
            side: assessment.side,
            count: size.contracts,
            price_cents,
        };
        let outcome = match self.venue.place_order(&order).await {
            Ok(ack) => {
                trade.order_id = Some(ack.order_id.clone());
                trade.result_status = match ack.status {
                    OrderStatus::Executed if ack.fill_count > 0 => ResultStatus::Executed,
                    OrderStatus::Canceled if ack.fill_count == 0 => ResultStatus::Cancelled,
                    _ => ResultStatus::Pending,
                };
                info!(
                    ticker = %trade.ticker,
                    side = %trade.side,
                    contracts = trade.contracts,
                    price_cents = trade.price_cents,
                    edge = trade.edge,
                    our_prob = trade.our_prob,
                    regime = %regime,
                    status = %trade.result_status,
                    "trade placed"
                );
                Execution::Placed(trade.clone())
            }
            Err(venue_error) => {
                let error = EngineError::from(venue_error);
                error!(ticker = %trade.ticker, kind = %error.kind(), disposition = ?error.disposition(), %error, "order failed");
                trade.result_status = ResultStatus::Error;
                trade.error = Some(error.to_string());
                Execution::Failed(trade.clone(), error)
            }
        };
        self.journal.append(&trade)?;
        Ok(outcome)
    }

    fn record_skip(&self, skip: &SkipRecord) -> Result<(), EngineError> {
        info!(
            ticker = %skip.ticker,
            reason = %skip.reason,
            edge = ?skip.edge,
            dynamic_min_edge = ?skip.dynamic_min_edge,
            regime = %skip.regime,
            "market skipped"
        );
        self.telemetry.record_skip(skip.reason_key());
        self.journal.append_skip(skip)?;
        Ok(())
    }

    /// Map a venue failure that stops the tick to its halt reason, alerting on auth failures.
    fn venue_halt(&self, error: &EngineError, now: DateTime<Utc>) -> Result<TickHalt, EngineError> {
        error!(kind = %error.kind(), disposition = ?error.disposition(), %error, "tick halted by venue failure");
        if error.kind() == FailureKind::Auth {
            self.alerts.raise(
                AUTH_FAILURE_TAG,
                &format!("Kalshi rejected our credentials: {error}"),
                now,
            )?;
            Ok(TickHalt::Auth(error.to_string()))
        } else {
            Ok(TickHalt::Venue(error.to_string()))
        }
    }

    /// Persist telemetry, check latency and write the heartbeat.
    fn finish(
        &self,
        report: &TickReport,
        balance: Option<Balance>,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let paths = &self.config.paths;
        self.telemetry
            .persist(&paths.latency_profile(), &paths.latency_history(), now)?;
        check_latency(paths, &self.config.telemetry, &self.alerts, now)?;

        let heartbeat = Heartbeat {
            timestamp: now,
            dry_run: self.journal.is_dry_run(),
            halted: report.halted.as_ref().map(ToString::to_string),
            trades_placed: report.placed().count(),
            skips: report.skips.len(),
            balance_cents: balance.map(|b| b.balance_cents),
            portfolio_value_cents: balance.map(|b| b.portfolio_value_cents),
        };
        store::write_json_atomic(paths.heartbeat(), &heartbeat)?;
        info!(
            halted = ?heartbeat.halted,
            trades = heartbeat.trades_placed,
            skips = heartbeat.skips,
            degraded = report.degraded_assets.len(),
            "tick complete"
        );
        Ok(())
    }
}
