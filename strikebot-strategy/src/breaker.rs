//! Circuit breakers halting new entries.
//!
//! State survives restarts in `circuit-breaker-state.json`. A trip holds until a manual reset
//! or until `reset_after_hours` elapse; either way the breaker re-arms and only trades settled
//! after re-arming count toward the next trip.
//!
//! Order placement outcomes are persisted alongside the trip, so the consecutive order error
//! counter and the hourly order error rate carry across one-shot `scan` processes.

use crate::{
    config::BreakerConfig,
    error::JournalError,
    journal::{TradeRecord, settled_chronologically},
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strikebot_data::{PathsConfig, store};
use strikebot_instrument::Cents;
use tracing::{info, warn};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerReason {
    ConsecutiveLosses,
    DailyLoss,
    WinRate,
    ErrorRate,
    ConsecutiveErrors,
}

impl BreakerReason {
    pub const ALL: [BreakerReason; 5] = [
        BreakerReason::ConsecutiveLosses,
        BreakerReason::DailyLoss,
        BreakerReason::WinRate,
        BreakerReason::ErrorRate,
        BreakerReason::ConsecutiveErrors,
    ];

    pub fn alert_tag(&self) -> &'static str {
        match self {
            BreakerReason::ConsecutiveLosses => "circuit_breaker",
            BreakerReason::DailyLoss => "daily_loss",
            BreakerReason::WinRate => "win_rate",
            BreakerReason::ErrorRate => "error_rate",
            BreakerReason::ConsecutiveErrors => "order_errors",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BreakerTrip {
    pub reason: BreakerReason,
    pub tripped_at: DateTime<Utc>,
    pub detail: String,
}

/// One order placement attempt.
#[derive(Debug, Copy, Clone, PartialEq, Deserialize, Serialize)]
pub struct OrderAttempt {
    pub at: DateTime<Utc>,
    pub failed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct BreakerState {
    /// Trades settled before this instant no longer count.
    pub armed_since: Option<DateTime<Utc>>,
    pub trip: Option<BreakerTrip>,
    /// Hard order failures since the last successful placement.
    #[serde(default)]
    pub consecutive_errors: u32,
    /// Order attempts of the last hour.
    #[serde(default)]
    pub order_attempts: Vec<OrderAttempt>,
}

impl BreakerState {
    fn rearmed(now: DateTime<Utc>) -> Self {
        Self {
            armed_since: Some(now),
            ..Self::default()
        }
    }

    /// Failed share of the order attempts in the hour before `now`; `None` below `min_attempts`.
    pub fn order_error_rate(&self, now: DateTime<Utc>, min_attempts: usize) -> Option<f64> {
        let horizon = now - Duration::hours(1);
        let recent = self
            .order_attempts
            .iter()
            .filter(|attempt| attempt.at >= horizon && attempt.at <= now)
            .collect::<Vec<_>>();
        if recent.is_empty() || recent.len() < min_attempts {
            return None;
        }
        let failed = recent.iter().filter(|attempt| attempt.failed).count();
        Some(failed as f64 / recent.len() as f64)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BreakerStatus {
    Armed,
    Tripped(BreakerTrip),
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    paths: PathsConfig,
    config: BreakerConfig,
}

impl CircuitBreaker {
    pub fn new(paths: PathsConfig, config: BreakerConfig) -> Self {
        Self { paths, config }
    }

    pub fn state(&self) -> Result<BreakerState, JournalError> {
        Ok(store::read_json(self.paths.breaker_state())?.unwrap_or_default())
    }

    fn save(&self, state: &BreakerState) -> Result<(), JournalError> {
        Ok(store::write_json_atomic(self.paths.breaker_state(), state)?)
    }

    /// Record the outcome of one order placement. Returns the consecutive error count.
    pub fn record_order(&self, failed: bool, now: DateTime<Utc>) -> Result<u32, JournalError> {
        let mut state = self.state()?;
        state.consecutive_errors = if failed { state.consecutive_errors + 1 } else { 0 };
        let horizon = now - Duration::hours(1);
        state.order_attempts.retain(|attempt| attempt.at >= horizon);
        state.order_attempts.push(OrderAttempt { at: now, failed });
        self.save(&state)?;
        if failed {
            warn!(consecutive = state.consecutive_errors, "order placement failed");
        }
        Ok(state.consecutive_errors)
    }

    /// Check every breaker against `trades`, the persisted order outcomes and the venue error
    /// rate of the last hour. The higher of the two error rates is used.
    pub fn evaluate(
        &self,
        trades: &[TradeRecord],
        hourly_error_rate: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<BreakerStatus, JournalError> {
        let mut state = self.state()?;

        if let Some(trip) = &state.trip {
            if now - trip.tripped_at < Duration::hours(self.config.reset_after_hours) {
                return Ok(BreakerStatus::Tripped(trip.clone()));
            }
            info!(reason = ?trip.reason, "circuit breaker time reset");
            state = BreakerState::rearmed(now);
            self.save(&state)?;
        }

        let order_rate = state.order_error_rate(now, self.config.min_orders_for_error_rate);
        let error_rate = match (hourly_error_rate, order_rate) {
            (Some(calls), Some(orders)) => Some(calls.max(orders)),
            (calls, orders) => calls.or(orders),
        };
        let signals = ErrorSignals {
            hourly_error_rate: error_rate,
            consecutive_errors: state.consecutive_errors,
        };
        match check_breakers(trades, signals, state.armed_since, now, &self.config) {
            Some((reason, detail)) => {
                warn!(?reason, %detail, "circuit breaker tripped");
                let trip = BreakerTrip {
                    reason,
                    tripped_at: now,
                    detail,
                };
                state.trip = Some(trip.clone());
                self.save(&state)?;
                Ok(BreakerStatus::Tripped(trip))
            }
            None => Ok(BreakerStatus::Armed),
        }
    }

    /// Manual reset: clear any trip and re-arm from `now`.
    pub fn reset(&self, now: DateTime<Utc>) -> Result<BreakerState, JournalError> {
        let state = BreakerState::rearmed(now);
        self.save(&state)?;
        info!("circuit breaker manually reset");
        Ok(state)
    }
}

/// Venue and order failure inputs of the breakers.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct ErrorSignals {
    pub hourly_error_rate: Option<f64>,
    pub consecutive_errors: u32,
}

/// First breaker condition that holds, evaluated in [`BreakerReason::ALL`] order.
pub fn check_breakers(
    trades: &[TradeRecord],
    signals: ErrorSignals,
    armed_since: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    config: &BreakerConfig,
) -> Option<(BreakerReason, String)> {
    let settled = settled_chronologically(trades)
        .into_iter()
        .filter(|trade| match armed_since {
            Some(armed) => trade.settled_at.unwrap_or(trade.timestamp) >= armed,
            None => true,
        })
        .collect::<Vec<_>>();

    let streak = settled
        .iter()
        .rev()
        .take_while(|trade| trade.outcome() == Some(0.0))
        .count();
    if config.max_consecutive_losses > 0 && streak >= config.max_consecutive_losses {
        return Some((
            BreakerReason::ConsecutiveLosses,
            format!("{streak} consecutive losses (limit {})", config.max_consecutive_losses),
        ));
    }

    let today = now.date_naive();
    let daily_pnl: Cents = settled
        .iter()
        .filter(|trade| trade.settled_at.unwrap_or(trade.timestamp).date_naive() == today)
        .filter_map(|trade| trade.profit_cents)
        .sum();
    let limit = config.daily_loss_limit_cents();
    if limit > 0 && daily_pnl <= -limit {
        return Some((
            BreakerReason::DailyLoss,
            format!("daily PnL {daily_pnl}c breaches -{limit}c"),
        ));
    }

    if config.win_rate_window > 0 && settled.len() >= config.win_rate_window {
        let window = &settled[settled.len() - config.win_rate_window..];
        let wins = window.iter().filter(|trade| trade.outcome() == Some(1.0)).count();
        let win_rate = wins as f64 / window.len() as f64;
        if win_rate < config.min_win_rate {
            return Some((
                BreakerReason::WinRate,
                format!(
                    "win rate {:.1}% over last {} settled (min {:.1}%)",
                    win_rate * 100.0,
                    window.len(),
                    config.min_win_rate * 100.0
                ),
            ));
        }
    }

    if let Some(rate) = signals
        .hourly_error_rate
        .filter(|rate| *rate > config.max_error_rate)
    {
        return Some((
            BreakerReason::ErrorRate,
            format!(
                "hourly error rate {:.1}% above {:.1}%",
                rate * 100.0,
                config.max_error_rate * 100.0
            ),
        ));
    }

    if config.max_consecutive_errors > 0 && signals.consecutive_errors >= config.max_consecutive_errors {
        return Some((
            BreakerReason::ConsecutiveErrors,
            format!(
                "{} consecutive order failures (limit {})",
                signals.consecutive_errors, config.max_consecutive_errors
            ),
        ));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{ResultStatus, test_support::trade};
    use chrono::TimeZone;
    use strikebot_instrument::Side;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 31, 18, 0, 0).unwrap()
    }

    fn settled(index: i64, won: bool) -> TradeRecord {
        let at = now() - Duration::hours(48) + Duration::minutes(index);
        let mut row = trade(&format!("t{index}"), at, Side::Yes, 1, 50);
        row.result_status = if won { ResultStatus::Won } else { ResultStatus::Lost };
        row.profit_cents = Some(if won { 50 } else { -50 });
        row.settled_at = Some(at + Duration::hours(1));
        row
    }

    #[test]
    fn test_consecutive_losses() {
        let config = BreakerConfig::default();
        let mut trades = vec![settled(0, true)];
        trades.extend((1..=4).map(|i| settled(i, false)));
        assert_eq!(check_breakers(&trades, ErrorSignals::default(), None, now(), &config), None);

        trades.push(settled(5, false));
        let (reason, _) = check_breakers(&trades, ErrorSignals::default(), None, now(), &config).unwrap();
        assert_eq!(reason, BreakerReason::ConsecutiveLosses);
        assert_eq!(reason.alert_tag(), "circuit_breaker");

        let armed = now() - Duration::hours(46) + Duration::minutes(3);
        assert_eq!(check_breakers(&trades, ErrorSignals::default(), Some(armed), now(), &config), None);
    }

    #[test]
    fn test_daily_loss() {
        let config = BreakerConfig::default();
        let mut loss = trade("big", now() - Duration::hours(3), Side::No, 10, 55);
        loss.result_status = ResultStatus::Lost;
        loss.profit_cents = Some(-550);
        loss.settled_at = Some(now() - Duration::hours(1));
        let (reason, _) = check_breakers(&[loss], ErrorSignals::default(), None, now(), &config).unwrap();
        assert_eq!(reason, BreakerReason::DailyLoss);
    }

    #[test]
    fn test_win_rate_needs_full_window() {
        let config = BreakerConfig::default();
        // Alternating L L W: a third wins, never four losses in a row.
        let trades = (0..20).map(|i| settled(i, i % 3 == 2)).collect::<Vec<_>>();
        let (reason, detail) = check_breakers(&trades, ErrorSignals::default(), None, now(), &config).unwrap();
        assert_eq!(reason, BreakerReason::WinRate, "{detail}");
        assert_eq!(check_breakers(&trades[..19], ErrorSignals::default(), None, now(), &config), None);
    }

    #[test]
    fn test_error_rate() {
        let config = BreakerConfig::default();
        let rate = |rate| ErrorSignals {
            hourly_error_rate: Some(rate),
            consecutive_errors: 0,
        };
        assert_eq!(check_breakers(&[], rate(0.10), None, now(), &config), None);
        let (reason, _) = check_breakers(&[], rate(0.15), None, now(), &config).unwrap();
        assert_eq!(reason, BreakerReason::ErrorRate);
    }

    #[test]
    fn test_order_errors_persist_across_breakers() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathsConfig::rooted(dir.path());
        let config = BreakerConfig {
            min_orders_for_error_rate: 100,
            ..BreakerConfig::default()
        };

        for i in 0..4 {
            let breaker = CircuitBreaker::new(paths.clone(), config.clone());
            assert_eq!(breaker.record_order(true, now() + Duration::minutes(i)).unwrap(), i as u32 + 1);
        }
        let breaker = CircuitBreaker::new(paths.clone(), config.clone());
        assert_eq!(breaker.evaluate(&[], None, now() + Duration::minutes(5)).unwrap(), BreakerStatus::Armed);
        assert_eq!(breaker.record_order(false, now() + Duration::minutes(6)).unwrap(), 0);

        for i in 0..5 {
            breaker.record_order(true, now() + Duration::minutes(10 + i)).unwrap();
        }
        let BreakerStatus::Tripped(trip) = breaker.evaluate(&[], None, now() + Duration::minutes(20)).unwrap() else {
            panic!("expected order error trip");
        };
        assert_eq!(trip.reason, BreakerReason::ConsecutiveErrors);

        breaker.reset(now() + Duration::minutes(30)).unwrap();
        let state = breaker.state().unwrap();
        assert_eq!(state.consecutive_errors, 0);
        assert!(state.order_attempts.is_empty());
    }

    #[test]
    fn test_persisted_order_error_rate() {
        let dir = tempfile::tempdir().unwrap();
        let breaker = CircuitBreaker::new(PathsConfig::rooted(dir.path()), BreakerConfig::default());
        for i in 0..10 {
            // every third attempt fails, never three in a row
            breaker.record_order(i % 3 == 0, now() + Duration::minutes(i)).unwrap();
        }
        let state = breaker.state().unwrap();
        let rate = state.order_error_rate(now() + Duration::minutes(10), 10).unwrap();
        assert!((rate - 0.4).abs() < 1e-12);
        assert_eq!(state.order_error_rate(now() + Duration::hours(2), 10), None);

        let BreakerStatus::Tripped(trip) = breaker.evaluate(&[], None, now() + Duration::minutes(10)).unwrap() else {
            panic!("expected error rate trip");
        };
        assert_eq!(trip.reason, BreakerReason::ErrorRate);
    }

    #[test]
    fn test_trip_persists_then_time_resets() {
        let dir = tempfile::tempdir().unwrap();
        let breaker = CircuitBreaker::new(PathsConfig::rooted(dir.path()), BreakerConfig::default());
        let trades = (0..5).map(|i| settled(i, false)).collect::<Vec<_>>();

        assert!(matches!(breaker.evaluate(&trades, None, now()).unwrap(), BreakerStatus::Tripped(_)));

        let restarted = CircuitBreaker::new(PathsConfig::rooted(dir.path()), BreakerConfig::default());
        assert!(matches!(
            restarted.evaluate(&[], None, now() + Duration::hours(1)).unwrap(),
            BreakerStatus::Tripped(_)
        ));
        assert_eq!(
            restarted.evaluate(&trades, None, now() + Duration::hours(4)).unwrap(),
            BreakerStatus::Armed
        );
        assert!(restarted.state().unwrap().armed_since.is_some());
    }

    #[test]
    fn test_manual_reset() {
        let dir = tempfile::tempdir().unwrap();
        let breaker = CircuitBreaker::new(PathsConfig::rooted(dir.path()), BreakerConfig::default());
        let trades = (0..5).map(|i| settled(i, false)).collect::<Vec<_>>();
        breaker.evaluate(&trades, None, now()).unwrap();

        breaker.reset(now() + Duration::minutes(5)).unwrap();
        assert_eq!(
            breaker.evaluate(&trades, None, now() + Duration::minutes(6)).unwrap(),
            BreakerStatus::Armed
        );
    }
}
