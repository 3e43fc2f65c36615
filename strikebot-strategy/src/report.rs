//! Hourly status and daily / weekly performance summaries.
//!
//! Reports are written to `data/reports/` as text (for the notifier) and JSON (for the
//! downstream renderer). The hourly report is suppressed while idle and unchanged.

use crate::{
    alert::AlertFile,
    config::ReportConfig,
    engine::Heartbeat,
    error::EngineError,
    journal::{ResultStatus, TradeJournal, TradeRecord},
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use derive_more::Display;
use itertools::Itertools;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{collections::BTreeMap, path::PathBuf};
use strikebot_data::{PathsConfig, store};
use strikebot_instrument::{Asset, Cents, Side};
use tracing::info;

/// Cents rendered as dollars with two decimals.
pub fn dollars(cents: Cents) -> Decimal {
    Decimal::new(cents, 2)
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HourlySummary {
    pub timestamp: DateTime<Utc>,
    pub running: bool,
    pub dry_run: bool,
    pub halted: Option<String>,
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub trades_last_hour: usize,
    pub settled_last_hour: usize,
    pub settled_24h: usize,
    pub wins_24h: usize,
    pub win_rate_24h: Option<f64>,
    pub pnl_24h_cents: Cents,
    pub portfolio_value_cents: Option<Cents>,
    pub alerts: Vec<String>,
}

impl HourlySummary {
    pub fn compute(
        trades: &[TradeRecord],
        heartbeat: Option<&Heartbeat>,
        alerts: &[AlertFile],
        config: &ReportConfig,
        now: DateTime<Utc>,
    ) -> Self {
        let hour_ago = now - Duration::hours(1);
        let day_ago = now - Duration::hours(24);
        let settled_since = |since: DateTime<Utc>| {
            trades
                .iter()
                .filter(move |trade| trade.result_status.is_settled())
                .filter(move |trade| trade.settled_at.unwrap_or(trade.timestamp) >= since)
        };

        let settled_24h = settled_since(day_ago).collect::<Vec<_>>();
        let wins_24h = settled_24h
            .iter()
            .filter(|trade| trade.result_status == ResultStatus::Won)
            .count();
        let running = heartbeat.is_some_and(|heartbeat| {
            now - heartbeat.timestamp <= Duration::minutes(config.heartbeat_stale_minutes)
        });

        Self {
            timestamp: now,
            running,
            dry_run: heartbeat.is_some_and(|heartbeat| heartbeat.dry_run),
            halted: heartbeat.and_then(|heartbeat| heartbeat.halted.clone()),
            heartbeat_at: heartbeat.map(|heartbeat| heartbeat.timestamp),
            trades_last_hour: trades
                .iter()
                .filter(|trade| trade.timestamp >= hour_ago)
                .filter(|trade| trade.result_status != ResultStatus::Error)
                .count(),
            settled_last_hour: settled_since(hour_ago).count(),
            wins_24h,
            win_rate_24h: (!settled_24h.is_empty())
                .then(|| wins_24h as f64 / settled_24h.len() as f64),
            pnl_24h_cents: settled_24h.iter().filter_map(|trade| trade.profit_cents).sum(),
            settled_24h: settled_24h.len(),
            portfolio_value_cents: heartbeat.and_then(|heartbeat| heartbeat.portfolio_value_cents),
            alerts: alerts.iter().map(|alert| alert.tag.clone()).collect(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.trades_last_hour == 0 && self.settled_last_hour == 0
    }

    /// State that must change for an idle report to be sent again.
    pub fn fingerprint(&self) -> String {
        format!(
            "running={} halted={:?} settled_24h={} pnl_24h={} alerts={}",
            self.running,
            self.halted,
            self.settled_24h,
            self.pnl_24h_cents,
            self.alerts.join(",")
        )
    }

    pub fn render(&self) -> String {
        let state = match (&self.halted, self.running) {
            (Some(reason), true) => format!("HALTED ({reason})"),
            (None, true) => "running".to_string(),
            (_, false) => "NOT RUNNING".to_string(),
        };
        let mode = if self.dry_run { " [dry run]" } else { "" };
        let win_rate = self
            .win_rate_24h
            .map(|rate| format!("{:.0}%", rate * 100.0))
            .unwrap_or_else(|| "n/a".to_string());
        let portfolio = self
            .portfolio_value_cents
            .map(|cents| format!("${}", dollars(cents)))
            .unwrap_or_else(|| "n/a".to_string());
        let alerts = if self.alerts.is_empty() {
            "none".to_string()
        } else {
            self.alerts.join(", ")
        };

        format!(
            "Kalshi hourly {}\ntrader: {state}{mode}\ntrades last hour: {}\n24h: {} settled, win rate {win_rate}, PnL ${}\nportfolio: {portfolio}\nalerts: {alerts}\n",
            self.timestamp.format("%Y-%m-%d %H:%M UTC"),
            self.trades_last_hour,
            self.settled_24h,
            dollars(self.pnl_24h_cents),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
struct ReportState {
    fingerprint: Option<String>,
    last_written: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HourlyOutcome {
    Written { path: PathBuf, summary: HourlySummary },
    Suppressed(HourlySummary),
}

/// Build and write the hourly report unless it is idle and unchanged since the last one.
pub fn hourly_report(
    journal: &TradeJournal,
    paths: &PathsConfig,
    alerts: &[AlertFile],
    config: &ReportConfig,
    now: DateTime<Utc>,
) -> Result<HourlyOutcome, EngineError> {
    let trades = journal.read_recent(now, 2)?;
    let heartbeat = Heartbeat::load(paths)?;
    let summary = HourlySummary::compute(&trades, heartbeat.as_ref(), alerts, config, now);

    let state = store::read_json::<ReportState>(paths.report_state())?.unwrap_or_default();
    let fingerprint = summary.fingerprint();
    if config.suppress_idle_hourly
        && summary.is_idle()
        && state.fingerprint.as_deref() == Some(fingerprint.as_str())
    {
        info!(%fingerprint, "hourly report suppressed, nothing changed");
        return Ok(HourlyOutcome::Suppressed(summary));
    }

    let path = paths
        .reports_dir()
        .join(format!("hourly-{}.txt", now.format("%Y-%m-%dT%H")));
    store::write_atomic(&path, summary.render().as_bytes())?;
    store::write_json_atomic(
        paths.report_state(),
        &ReportState {
            fingerprint: Some(fingerprint),
            last_written: Some(now),
        },
    )?;
    info!(?path, running = summary.running, trades = summary.trades_last_hour, "hourly report written");
    Ok(HourlyOutcome::Written { path, summary })
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Display, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportPeriod {
    #[display("daily")]
    Daily,
    #[display("weekly")]
    Weekly,
}

impl ReportPeriod {
    pub fn days(&self) -> i64 {
        match self {
            ReportPeriod::Daily => 1,
            ReportPeriod::Weekly => 7,
        }
    }
}

/// Short description of one trade for best / worst listings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TradeBrief {
    pub ticker: SmolStr,
    pub side: Side,
    pub contracts: u32,
    pub price_cents: u32,
    pub profit_cents: Cents,
}

impl From<&TradeRecord> for TradeBrief {
    fn from(trade: &TradeRecord) -> Self {
        Self {
            ticker: trade.ticker.clone(),
            side: trade.side,
            contracts: trade.contracts,
            price_cents: trade.price_cents,
            profit_cents: trade.profit_cents.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AssetBreakdown {
    pub trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub pnl_cents: Cents,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PeriodSummary {
    pub period: ReportPeriod,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub open: usize,
    pub cancelled: usize,
    pub errors: usize,
    pub win_rate: Option<f64>,
    pub staked_cents: Cents,
    pub pnl_cents: Cents,
    pub best: Option<TradeBrief>,
    pub worst: Option<TradeBrief>,
    pub by_asset: BTreeMap<Asset, AssetBreakdown>,
}

impl PeriodSummary {
    /// Summary of the trades entered in the `period` ending on `to` inclusive.
    pub fn compute(period: ReportPeriod, trades: &[TradeRecord], to: NaiveDate) -> Self {
        let from = to - Duration::days(period.days() - 1);
        let in_period = trades
            .iter()
            .filter(|trade| (from..=to).contains(&trade.trade_date()))
            .collect::<Vec<_>>();
        let counts = in_period.iter().counts_by(|trade| trade.result_status);
        let count = |status: ResultStatus| counts.get(&status).copied().unwrap_or_default();

        let settled = in_period
            .iter()
            .filter(|trade| trade.result_status.is_settled())
            .collect::<Vec<_>>();
        let mut by_asset = BTreeMap::<Asset, AssetBreakdown>::new();
        for trade in &in_period {
            let entry = by_asset.entry(trade.asset).or_default();
            entry.trades += 1;
            match trade.result_status {
                ResultStatus::Won => entry.wins += 1,
                ResultStatus::Lost => entry.losses += 1,
                _ => {}
            }
            entry.pnl_cents += trade.profit_cents.unwrap_or_default();
        }

        let wins = count(ResultStatus::Won);
        let losses = count(ResultStatus::Lost);
        Self {
            period,
            from,
            to,
            trades: in_period.len(),
            wins,
            losses,
            open: count(ResultStatus::Pending) + count(ResultStatus::Executed),
            cancelled: count(ResultStatus::Cancelled),
            errors: count(ResultStatus::Error),
            win_rate: (wins + losses > 0).then(|| wins as f64 / (wins + losses) as f64),
            staked_cents: in_period
                .iter()
                .filter(|trade| {
                    !matches!(trade.result_status, ResultStatus::Cancelled | ResultStatus::Error)
                })
                .map(|trade| trade.cost_cents)
                .sum(),
            pnl_cents: settled.iter().filter_map(|trade| trade.profit_cents).sum(),
            best: settled
                .iter()
                .max_by_key(|trade| (trade.profit_cents, std::cmp::Reverse(trade.timestamp)))
                .map(|trade| TradeBrief::from(**trade)),
            worst: settled
                .iter()
                .min_by_key(|trade| (trade.profit_cents, trade.timestamp))
                .map(|trade| TradeBrief::from(**trade)),
            by_asset,
        }
    }

    pub fn render(&self) -> String {
        let mut text = format!(
            "Kalshi {} report {} .. {}\ntrades: {} ({} won, {} lost, {} open, {} cancelled, {} errors)\n",
            self.period, self.from, self.to, self.trades, self.wins, self.losses, self.open, self.cancelled, self.errors
        );
        let win_rate = self
            .win_rate
            .map(|rate| format!("{:.1}%", rate * 100.0))
            .unwrap_or_else(|| "n/a".to_string());
        text.push_str(&format!(
            "win rate: {win_rate}\nstaked: ${}\nPnL: ${}\n",
            dollars(self.staked_cents),
            dollars(self.pnl_cents)
        ));
        for (label, brief) in [("best", &self.best), ("worst", &self.worst)] {
            if let Some(brief) = brief {
                text.push_str(&format!(
                    "{label}: {} {} x{} @ {}c -> ${}\n",
                    brief.ticker,
                    brief.side,
                    brief.contracts,
                    brief.price_cents,
                    dollars(brief.profit_cents)
                ));
            }
        }
        for (asset, breakdown) in &self.by_asset {
            text.push_str(&format!(
                "{asset}: {} trades, {}W/{}L, ${}\n",
                breakdown.trades,
                breakdown.wins,
                breakdown.losses,
                dollars(breakdown.pnl_cents)
            ));
        }
        text
    }
}

/// Write `reports/{period}-{to}.txt` and `.json`. Returns the text path.
pub fn period_report(
    journal: &TradeJournal,
    paths: &PathsConfig,
    period: ReportPeriod,
    to: NaiveDate,
) -> Result<(PathBuf, PeriodSummary), EngineError> {
    let from = to - Duration::days(period.days() - 1);
    let trades = journal
        .read_days(from, to)?
        .into_values()
        .flatten()
        .collect::<Vec<_>>();
    let summary = PeriodSummary::compute(period, &trades, to);

    let stem = paths.reports_dir().join(format!("{period}-{to}"));
    let text_path = stem.with_extension("txt");
    store::write_atomic(&text_path, summary.render().as_bytes())?;
    store::write_json_atomic(stem.with_extension("json"), &summary)?;
    info!(?text_path, trades = summary.trades, pnl_cents = summary.pnl_cents, "{period} report written");
    Ok((text_path, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::test_support::trade;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 31, 18, 30, 0).unwrap()
    }

    fn settled(id: &str, at: DateTime<Utc>, profit: Cents) -> TradeRecord {
        let mut row = trade(id, at, Side::Yes, 2, 50);
        row.result_status = if profit > 0 { ResultStatus::Won } else { ResultStatus::Lost };
        row.profit_cents = Some(profit);
        row.settled_at = Some(at + Duration::hours(1));
        row
    }

    #[test]
    fn test_dollars() {
        assert_eq!(dollars(150).to_string(), "1.50");
        assert_eq!(dollars(-5).to_string(), "-0.05");
    }

    #[test]
    fn test_hourly_summary() {
        let trades = vec![
            settled("a", now() - Duration::hours(5), 100),
            settled("b", now() - Duration::hours(4), -100),
            settled("c", now() - Duration::hours(30), 100),
            trade("d", now() - Duration::minutes(20), Side::No, 1, 30),
        ];
        let heartbeat = Heartbeat {
            timestamp: now() - Duration::minutes(4),
            dry_run: false,
            halted: None,
            trades_placed: 1,
            skips: 3,
            balance_cents: Some(5_000),
            portfolio_value_cents: Some(7_250),
        };
        let summary = HourlySummary::compute(&trades, Some(&heartbeat), &[], &ReportConfig::default(), now());

        assert!(summary.running);
        assert_eq!(summary.trades_last_hour, 1);
        assert_eq!(summary.settled_24h, 2);
        assert_eq!(summary.win_rate_24h, Some(0.5));
        assert_eq!(summary.pnl_24h_cents, 0);
        assert!(!summary.is_idle());
        assert!(summary.render().contains("portfolio: $72.50"));

        let stale = HourlySummary::compute(&[], Some(&heartbeat), &[], &ReportConfig::default(), now() + Duration::minutes(30));
        assert!(!stale.running);
        assert!(stale.render().contains("NOT RUNNING"));
    }

    #[test]
    fn test_hourly_suppressed_when_idle_and_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathsConfig::rooted(dir.path());
        let journal = TradeJournal::new(paths.clone(), false);
        let config = ReportConfig::default();

        assert!(matches!(
            hourly_report(&journal, &paths, &[], &config, now()).unwrap(),
            HourlyOutcome::Written { .. }
        ));
        assert!(matches!(
            hourly_report(&journal, &paths, &[], &config, now() + Duration::hours(1)).unwrap(),
            HourlyOutcome::Suppressed(_)
        ));

        let alert = AlertFile {
            tag: "circuit_breaker".to_string(),
            timestamp: now(),
            updated_at: now(),
            message: "5 losses".to_string(),
        };
        assert!(matches!(
            hourly_report(&journal, &paths, &[alert], &config, now() + Duration::hours(2)).unwrap(),
            HourlyOutcome::Written { .. }
        ));
    }

    #[test]
    fn test_period_summary_best_and_worst() {
        let day = now().date_naive();
        let trades = vec![
            settled("a", now() - Duration::hours(5), 100),
            settled("b", now() - Duration::hours(4), -100),
            settled("c", now() - Duration::hours(3), 40),
            settled("old", now() - Duration::days(3), 500),
        ];

        let daily = PeriodSummary::compute(ReportPeriod::Daily, &trades, day);
        assert_eq!(daily.trades, 3);
        assert_eq!(daily.pnl_cents, 40);
        assert_eq!(daily.best.as_ref().unwrap().profit_cents, 100);
        assert_eq!(daily.worst.as_ref().unwrap().profit_cents, -100);
        assert_eq!(daily.by_asset[&Asset::Btc].wins, 2);

        let weekly = PeriodSummary::compute(ReportPeriod::Weekly, &trades, day);
        assert_eq!(weekly.trades, 4);
        assert_eq!(weekly.best.unwrap().ticker, trades[3].ticker);
    }
}
