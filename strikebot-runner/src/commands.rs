//! One function per subcommand. Each returns whether a threshold was breached.

use crate::{
    app::App,
    cli::{BacktestArgs, PlaceOrderArgs, RecalibrateArgs, ReportKind},
    error::{Outcome, RunnerError},
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use strikebot_data::{
    probe::{ProbeRecord, probe_sources, summarise},
    store,
};
use strikebot_execution::OrderRequest;
use strikebot_instrument::{Asset, CandleInterval, market::is_valid_price};
use strikebot_strategy::{
    BreakerReason, RecalibrationOutcome, TickHalt, TickReport, VolatilityModel, VolatilityStats,
    backtest::{BacktestParams, DEFAULT_BACKTEST_BANKROLL_CENTS, backtest},
    calibration::{CALIBRATION_TAG, analyse},
    latency::check_latency,
    report::{HourlyOutcome, ReportPeriod, hourly_report, period_report},
    settlement::validate_settlements,
    sweep::sweep,
};
use tracing::{error, info, warn};

fn print_json<T: Serialize>(value: &T) -> Result<(), RunnerError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| RunnerError::Output(e.to_string()))?;
    println!("{json}");
    Ok(())
}

fn print_tick(report: &TickReport) {
    for trade in &report.trades {
        println!(
            "{} {} {} x {} @ {}c edge {:.3} p {:.3} [{}]",
            trade.result_status, trade.ticker, trade.side, trade.contracts, trade.price_cents, trade.edge, trade.our_prob, trade.regime
        );
    }
    for (asset, cause) in &report.skipped_assets {
        println!("{asset} not scanned: {cause}");
    }
    println!(
        "{} trade(s), {} skip(s){}",
        report.placed().count(),
        report.skips.len(),
        report
            .halted
            .as_ref()
            .map(|halt| format!(", halted: {halt}"))
            .unwrap_or_default()
    );
}

fn halt_is_breach(report: &TickReport) -> bool {
    matches!(
        report.halted,
        Some(TickHalt::Breaker(_) | TickHalt::Auth(_) | TickHalt::Venue(_))
    )
}

pub async fn scan(app: &App) -> Result<Outcome, RunnerError> {
    let mut engine = app.engine()?;
    let report = engine.tick().await?;
    print_tick(&report);
    Ok(Outcome::breach_if(halt_is_breach(&report)))
}

/// Tick on the configured interval until Ctrl-C. Local store failures end the loop.
pub async fn run(app: &App) -> Result<Outcome, RunnerError> {
    let mut engine = app.engine()?;
    let period = std::time::Duration::from_secs(app.config.strategy.tick_interval_secs.max(1));
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    info!(interval_secs = period.as_secs(), dry_run = app.dry_run, "trading loop started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match engine.tick().await {
                    Ok(report) => print_tick(&report),
                    Err(error) => {
                        error!(kind = %error.kind(), %error, "tick failed on local state, stopping");
                        return Err(error.into());
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, trading loop stopped");
                return Ok(Outcome::Nominal);
            }
        }
    }
}

pub async fn place_order(app: &App, args: PlaceOrderArgs) -> Result<Outcome, RunnerError> {
    if !is_valid_price(args.price_cents) {
        return Err(RunnerError::Usage(format!("price {}c outside 1..=99", args.price_cents)));
    }
    if args.count == 0 {
        return Err(RunnerError::Usage("count must be at least 1".to_string()));
    }
    let order = OrderRequest {
        ticker: args.ticker.into(),
        side: args.side.into(),
        count: args.count,
        price_cents: args.price_cents,
    };
    let ack = app.venue()?.place_order(&order).await?;
    info!(ticker = %order.ticker, side = %order.side, count = order.count, price_cents = order.price_cents, order_id = %ack.order_id, "manual order placed");
    print_json(&ack)?;
    Ok(Outcome::Nominal)
}

pub async fn positions(app: &App) -> Result<Outcome, RunnerError> {
    print_json(&app.venue()?.positions().await?)?;
    Ok(Outcome::Nominal)
}

pub async fn balance(app: &App) -> Result<Outcome, RunnerError> {
    print_json(&app.venue()?.balance().await?)?;
    Ok(Outcome::Nominal)
}

pub fn report(app: &App, kind: ReportKind, now: DateTime<Utc>) -> Result<Outcome, RunnerError> {
    let (period, date) = match kind {
        ReportKind::Hourly => return hourly(app, now),
        ReportKind::Daily { date } => (ReportPeriod::Daily, date.unwrap_or(yesterday(now))),
        ReportKind::Weekly { date } => (ReportPeriod::Weekly, date.unwrap_or(yesterday(now))),
    };
    let (path, summary) = period_report(&app.journal(), &app.config.paths, period, date)?;
    println!("{}", summary.render());
    info!(?path, %period, "report written");
    Ok(Outcome::Nominal)
}

fn hourly(app: &App, now: DateTime<Utc>) -> Result<Outcome, RunnerError> {
    let alerts = app.alerts().outstanding()?;
    match hourly_report(&app.journal(), &app.config.paths, &alerts, &app.config.report, now)? {
        HourlyOutcome::Written { path, summary } => {
            println!("{}", summary.render());
            info!(?path, "hourly report written");
        }
        HourlyOutcome::Suppressed(_) => println!("no activity since the last report"),
    }
    Ok(Outcome::breach_if(!alerts.is_empty()))
}

/// Refresh the 4h series of every asset and compute realized volatility against the model.
async fn volatility_stats(app: &App, now: DateTime<Utc>) -> Result<VolatilityStats, RunnerError> {
    let ohlc = app.ohlc();
    let mut windows = Vec::new();
    for asset in Asset::ALL {
        let window = ohlc.refreshed_window(asset, CandleInterval::Hour4, now).await?;
        if window.stale {
            warn!(%asset, "volatility computed from stale candles");
        }
        windows.push(window);
    }
    let model = VolatilityModel::load(&app.config.paths, &app.config.volatility)?;
    let stats = VolatilityStats::compute(&model, &windows, now);
    stats.write(&app.config.paths)?;
    Ok(stats)
}

pub async fn vol_stats(app: &App, now: DateTime<Utc>) -> Result<Outcome, RunnerError> {
    print_json(&volatility_stats(app, now).await?)?;
    Ok(Outcome::Nominal)
}

pub async fn recalibrate(app: &App, args: RecalibrateArgs, now: DateTime<Utc>) -> Result<Outcome, RunnerError> {
    let recalibrator = app.recalibrator();
    if args.status {
        let status = recalibrator.status()?;
        print_json(&status.model)?;
        if let Some(backup) = &status.backup {
            println!("backup:");
            print_json(backup)?;
        }
        if let Some(last) = &status.last {
            println!("last of {} history entries:", status.history_len);
            print_json(last)?;
        }
        return Ok(Outcome::Nominal);
    }
    if args.revert {
        return match recalibrator.revert(now)? {
            Some(model) => {
                print_json(&model)?;
                Ok(Outcome::Nominal)
            }
            None => Err(RunnerError::Usage("no volatility model backup to revert to".to_string())),
        };
    }

    let stats = volatility_stats(app, now).await?;
    let outcome = recalibrator.run(&stats, args.apply, now)?;
    for proposal in outcome.proposals() {
        println!("{}", proposal.rationale());
    }
    Ok(match outcome {
        RecalibrationOutcome::NoChange => {
            println!("volatility model within tolerance");
            Outcome::Nominal
        }
        RecalibrationOutcome::Proposed(_) => Outcome::Breach,
        RecalibrationOutcome::Applied(_) => Outcome::Nominal,
    })
}

pub fn run_backtest(app: &App, args: BacktestArgs, now: DateTime<Utc>) -> Result<Outcome, RunnerError> {
    let trades = app.journal().read_recent(now, args.days)?;
    let model = VolatilityModel::load(&app.config.paths, &app.config.volatility)?;
    let params = BacktestParams {
        min_edge: args.min_edge,
        kelly: args.kelly.unwrap_or(app.config.strategy.base_kelly),
        scenario: args.scenario.into(),
        starting_bankroll_cents: DEFAULT_BACKTEST_BANKROLL_CENTS,
    };
    print_json(&backtest(&trades, &model, &params, &app.config.strategy))?;
    Ok(Outcome::Nominal)
}

pub fn run_sweep(app: &App, days: i64, now: DateTime<Utc>) -> Result<Outcome, RunnerError> {
    let journal = app.journal();
    let trades = journal.read_recent(now, days)?;
    let skips = journal.read_skips((now - Duration::days(days)).date_naive(), now.date_naive())?;
    let model = VolatilityModel::load(&app.config.paths, &app.config.volatility)?;
    let report = sweep(&trades, &skips, &model, &app.config.strategy, now);
    report.write(&app.config.paths)?;

    for result in report.results.iter().take(5) {
        println!(
            "min_edge {:?} kelly {:.2} {}: pnl {}c, taken {}, win rate {:?}, max drawdown {}c",
            result.params.min_edge,
            result.params.kelly,
            result.params.scenario,
            result.pnl_cents,
            result.taken,
            result.win_rate,
            result.max_drawdown_cents
        );
    }
    for (reason, count) in &report.skip_reasons {
        println!("skip {reason}: {count}");
    }
    Ok(Outcome::Nominal)
}

pub async fn spread_check(app: &App, now: DateTime<Utc>) -> Result<Outcome, RunnerError> {
    let mut oracle = app.oracle();
    let alerts = app.alerts();
    let mut breached = false;
    for asset in app.config.strategy.assets.iter().copied() {
        let reading = oracle.consensus(asset).await?;
        println!(
            "{asset}: {:.2} from {} source(s), spread {:.3}%",
            reading.price.value,
            reading.price.sources.len(),
            reading.price.max_spread * 100.0
        );
        if let Some(anomaly) = &reading.anomaly {
            alerts.raise(&anomaly.alert_tag(), &anomaly.message(), now)?;
            breached = true;
        }
    }
    Ok(Outcome::breach_if(breached))
}

pub async fn probe(app: &App) -> Result<Outcome, RunnerError> {
    let sources = app.price_sources();
    let log = app.config.paths.reliability_log();
    let mut failed = false;
    for asset in app.config.strategy.assets.iter().copied() {
        let records = probe_sources(&sources, asset, &log).await?;
        failed |= records.iter().any(|record| !record.ok);
    }
    let history = store::read_jsonl::<ProbeRecord>(&log)?;
    print_json(&summarise(&history))?;
    Ok(Outcome::breach_if(failed))
}

pub fn reset_breaker(app: &App, now: DateTime<Utc>) -> Result<Outcome, RunnerError> {
    app.breaker().reset(now)?;
    let alerts = app.alerts();
    for reason in BreakerReason::ALL {
        alerts.clear(reason.alert_tag())?;
    }
    println!("circuit breaker re-armed at {now}");
    Ok(Outcome::Nominal)
}

pub async fn settle(app: &App, validate: bool, now: DateTime<Utc>) -> Result<Outcome, RunnerError> {
    let report = app.reconciler()?.reconcile(now).await?;
    println!(
        "filled {}, cancelled {}, won {}, lost {}, errors {}; total pnl {}c",
        report.filled,
        report.cancelled,
        report.won,
        report.lost,
        report.errors,
        report.summary.total_pnl_cents
    );
    let mut breached = report.errors > 0;

    if validate {
        let validation = validate_settlements(
            &app.journal(),
            &app.history(),
            &app.alerts(),
            &app.config.paths,
            &app.config.calibration,
            now,
        )
        .await?;
        println!(
            "validated {} settlement(s), {} unmatched, mean error {:?}",
            validation.samples.len(),
            validation.unmatched,
            validation.mean_abs_error
        );
        breached |= validation.breached;
    }
    Ok(Outcome::breach_if(breached))
}

pub fn calibration(app: &App, now: DateTime<Utc>) -> Result<Outcome, RunnerError> {
    let trades = app
        .journal()
        .read_recent(now, app.config.calibration.lookback_days)?;
    let report = analyse(&trades, &app.config.calibration, now);
    report.write(&app.config.paths)?;
    print_json(&report)?;

    let alerts = app.alerts();
    match report.alert_message() {
        Some(message) => {
            alerts.raise(CALIBRATION_TAG, &message, now)?;
            Ok(Outcome::Breach)
        }
        None => {
            alerts.clear(CALIBRATION_TAG)?;
            Ok(Outcome::Nominal)
        }
    }
}

pub fn latency_check(app: &App, now: DateTime<Utc>) -> Result<Outcome, RunnerError> {
    let anomalies = check_latency(&app.config.paths, &app.config.telemetry, &app.alerts(), now)?;
    for anomaly in &anomalies {
        println!("{}", anomaly.message());
    }
    Ok(Outcome::breach_if(!anomalies.is_empty()))
}

/// Default date of the daily and weekly reports.
fn yesterday(now: DateTime<Utc>) -> NaiveDate {
    (now - Duration::days(1)).date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_yesterday_is_utc() {
        let now = Utc.with_ymd_and_hms(2025, 2, 1, 0, 30, 0).unwrap();
        assert_eq!(yesterday(now), NaiveDate::from_ymd_opt(2025, 1, 31).unwrap());
    }
}
