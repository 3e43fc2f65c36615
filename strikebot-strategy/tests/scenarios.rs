//! End-to-end scenarios of the trading tick and the batch jobs against in-memory sources and a
//! fake venue, each rooted in its own temporary directory.

mod common;

use chrono::Duration;
use common::*;
use strikebot_data::{SpreadAnomaly, store};
use strikebot_execution::{OrderStatus, VenueError};
use strikebot_instrument::{Asset, CandleInterval, MarketStatus, Side};
use strikebot_strategy::{
    AlertBook, AlertFile, CircuitBreaker, RecalibrationOutcome, Recalibrator, ResultStatus,
    SettlementReconciler, TickHalt, TradeJournal, VolatilityModel, VolatilityStats,
};

// ---------------------------------------------------------------------------------------------
// Trading tick
// ---------------------------------------------------------------------------------------------

#[tokio::test]
async fn test_sideways_market_below_edge_gate_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let venue = FakeVenue::new(
        10_000,
        vec![market("KXBTCD-25JAN3117-T101000", 101_000.0, 6, 8)],
    );
    let mut engine = engine(
        &config,
        prices([100_000.0; 3]),
        flat_candles(),
        venue.clone(),
    );

    let report = engine.tick_at(now()).await.unwrap();

    assert!(report.halted.is_none());
    assert!(report.trades.is_empty());
    assert_eq!(report.skips.len(), 1);
    let skip = &report.skips[0];
    assert_eq!(skip.reason_key(), "edge<min");
    assert!(skip.reason.ends_with("(sideways)"));
    assert!(skip.edge.unwrap() < skip.dynamic_min_edge.unwrap());
    assert!(venue.orders.lock().is_empty());

    let journal = TradeJournal::new(config.paths.clone(), false);
    assert!(journal.read_day(now().date_naive()).unwrap().is_empty());
    assert_eq!(
        journal
            .read_skips(now().date_naive(), now().date_naive())
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_trending_market_with_edge_is_traded() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let venue = FakeVenue::new(
        10_000,
        vec![market("KXBTCD-25JAN3117-T99000", 99_000.0, 68, 70)],
    );
    let mut engine = engine(
        &config,
        prices([100_000.0; 3]),
        rising_candles(),
        venue.clone(),
    );

    let report = engine.tick_at(now()).await.unwrap();

    assert!(report.halted.is_none());
    assert_eq!(report.trades.len(), 1);
    let trade = &report.trades[0];
    assert_eq!(trade.side, Side::Yes);
    assert_eq!(trade.result_status, ResultStatus::Executed);
    assert!(trade.our_prob > 0.8);
    assert!(trade.edge > 0.10);
    assert!(trade.contracts >= 1);
    assert_eq!(trade.cost_cents, i64::from(trade.contracts) * 70);
    assert!(trade.cost_cents <= 1_000);

    let orders = venue.orders.lock();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].price_cents, 70);
    assert_eq!(orders[0].count, trade.contracts);

    let logged = engine.journal().read_day(now().date_naive()).unwrap();
    assert_eq!(logged, vec![trade.clone()]);
}

#[tokio::test]
async fn test_rejected_credentials_journal_error_and_halt() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let venue = FakeVenue::new(
        10_000,
        vec![market("KXBTCD-25JAN3117-T99000", 99_000.0, 68, 70)],
    )
    .failing_with(VenueError::Auth {
        endpoint: "/portfolio/orders".into(),
        status: 401,
    });
    let mut engine = engine(
        &config,
        prices([100_000.0; 3]),
        rising_candles(),
        venue.clone(),
    );

    let report = engine.tick_at(now()).await.unwrap();

    assert!(matches!(report.halted, Some(TickHalt::Auth(_))));
    assert_eq!(venue.orders.lock().len(), 1);
    assert_eq!(report.trades.len(), 1);
    assert_eq!(report.trades[0].result_status, ResultStatus::Error);

    let logged = engine.journal().read_day(now().date_naive()).unwrap();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].result_status, ResultStatus::Error);
    assert!(logged[0].error.as_deref().unwrap().contains("401"));
    assert!(logged[0].order_id.is_none());
    assert!(config.paths.alert_file("auth_failure").exists());

    let breaker = CircuitBreaker::new(config.paths.clone(), config.breaker.clone());
    assert_eq!(breaker.state().unwrap().consecutive_errors, 1);
}

#[tokio::test]
async fn test_consecutive_losses_halt_and_alert_expires_after_cooldown() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let journal = TradeJournal::new(config.paths.clone(), false);
    for index in 0..5 {
        let at = now() - Duration::hours(10) + Duration::hours(index);
        let mut trade = executed_trade(&format!("loss{index}"), at, 5, 70);
        trade.result_status = ResultStatus::Lost;
        trade.profit_cents = Some(-350);
        trade.settled_at = Some(at + Duration::hours(1));
        journal.append(&trade).unwrap();
    }
    let venue = FakeVenue::new(
        10_000,
        vec![market("KXBTCD-25JAN3117-T99000", 99_000.0, 68, 70)],
    );
    let mut engine = engine(
        &config,
        prices([100_000.0; 3]),
        rising_candles(),
        venue.clone(),
    );

    let report = engine.tick_at(now()).await.unwrap();

    assert!(matches!(report.halted, Some(TickHalt::Breaker(_))));
    assert!(report.trades.is_empty());
    assert!(venue.orders.lock().is_empty());
    assert!(config.paths.alert_file("circuit_breaker").exists());

    let alerts = AlertBook::new(config.paths.clone(), config.alerts.clone());
    assert!(alerts.expire(now() + Duration::hours(3)).unwrap().is_empty());
    assert!(config.paths.alert_file("circuit_breaker").exists());
    let expired = alerts.expire(now() + Duration::hours(4)).unwrap();
    assert!(expired.contains(&"circuit_breaker".to_string()));
    assert!(!config.paths.alert_file("circuit_breaker").exists());
}

#[tokio::test]
async fn test_price_spread_skips_asset_and_keeps_alert_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let venue = FakeVenue::new(
        10_000,
        vec![market("KXBTCD-25JAN3117-T99000", 99_000.0, 68, 70)],
    );
    let mut engine = engine(
        &config,
        prices([100_000.0, 100_000.0, 101_500.0]),
        rising_candles(),
        venue.clone(),
    );
    let alert_path = config.paths.alert_file("price_spread_btc");

    let first = engine.tick_at(now()).await.unwrap();
    assert!(first.trades.is_empty());
    assert_eq!(first.skipped_assets.len(), 1);
    assert_eq!(first.skipped_assets[0].0, Asset::Btc);
    let raised = store::read_json::<AlertFile>(&alert_path).unwrap().unwrap();

    let second = engine
        .tick_at(now() + Duration::minutes(10))
        .await
        .unwrap();
    assert!(second.trades.is_empty());
    assert!(venue.orders.lock().is_empty());

    let anomalies = store::read_jsonl::<SpreadAnomaly>(config.paths.spread_anomaly_log()).unwrap();
    assert_eq!(anomalies.len(), 2);
    assert!(anomalies.iter().all(|anomaly| anomaly.spread > 0.01));

    let refreshed = store::read_json::<AlertFile>(&alert_path).unwrap().unwrap();
    assert_eq!(refreshed.timestamp, raised.timestamp);
    assert_eq!(refreshed.updated_at, now() + Duration::minutes(10));
}

// ---------------------------------------------------------------------------------------------
// Batch jobs
// ---------------------------------------------------------------------------------------------

#[tokio::test]
async fn test_settlement_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let journal = TradeJournal::new(config.paths.clone(), false);
    let trade = executed_trade("s1", now() - Duration::hours(2), 5, 70);
    journal.append(&trade).unwrap();

    let mut settled = market(&trade.ticker, 99_000.0, 0, 0);
    settled.close_time = trade.close_time;
    settled.status = MarketStatus::Settled;
    settled.expiration_value = Some(99_500.0);
    let venue = FakeVenue::new(10_000, vec![settled]);
    let reconciler = SettlementReconciler::new(
        venue,
        journal.clone(),
        AlertBook::new(config.paths.clone(), config.alerts.clone()),
        config.paths.clone(),
        config.calibration.clone(),
    );

    let report = reconciler.reconcile(now()).await.unwrap();
    assert_eq!(report.won, 1);
    assert_eq!(report.rewritten_days, vec![trade.trade_date()]);
    assert_eq!(report.summary.total_pnl_cents, 150);

    let rows = journal.read_day(trade.trade_date()).unwrap();
    assert_eq!(rows[0].result_status, ResultStatus::Won);
    assert_eq!(rows[0].profit_cents, Some(150));
    assert_eq!(rows[0].settlement_price, Some(99_500.0));

    let log_path = journal.trades_path(trade.trade_date());
    let log_before = std::fs::read(&log_path).unwrap();
    let book_before = std::fs::read(config.paths.settlements()).unwrap();

    let rerun = reconciler
        .reconcile(now() + Duration::minutes(5))
        .await
        .unwrap();
    assert!(!rerun.changed());
    assert_eq!(rerun.won, 0);
    assert_eq!(std::fs::read(&log_path).unwrap(), log_before);
    assert_eq!(std::fs::read(config.paths.settlements()).unwrap(), book_before);
}

#[test]
fn test_recalibration_proposes_then_applies() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let alerts = AlertBook::new(config.paths.clone(), config.alerts.clone());
    let recalibrator = Recalibrator::new(config.paths.clone(), config.volatility.clone(), alerts);

    // 4h returns of +/-1.6% give an hourly sigma of 0.008 against the 0.005 default.
    let window = zigzag_window(CandleInterval::Hour4, 200, 0.016);
    let model = VolatilityModel::from_defaults(&config.volatility);
    let stats = VolatilityStats::compute(&model, &[window], now());

    let proposed = recalibrator.run(&stats, false, now()).unwrap();
    assert!(matches!(proposed, RecalibrationOutcome::Proposed(_)));
    let alert = store::read_json::<AlertFile>(config.paths.alert_file("recalibration"))
        .unwrap()
        .unwrap();
    assert!(alert.message.contains("strikebot recalibrate --apply"));
    assert!(!config.paths.volatility_model().exists());

    let applied = recalibrator.run(&stats, true, now()).unwrap();
    let RecalibrationOutcome::Applied(proposals) = applied else {
        panic!("expected an applied recalibration");
    };
    assert_eq!(proposals.len(), 1);

    let status = recalibrator.status().unwrap();
    assert!((status.model.assumed_hourly_vol(Asset::Btc) - 0.0088).abs() < 1e-6);
    assert_eq!(status.history_len, 1);
    assert_eq!(status.backup.unwrap().assumed_hourly_vol(Asset::Btc), 0.005);
    assert!(!config.paths.alert_file("recalibration").exists());

    // Against the updated model the deviation falls inside the threshold.
    let again = recalibrator.run(&stats, true, now()).unwrap();
    assert_eq!(again, RecalibrationOutcome::NoChange);
    assert_eq!(recalibrator.status().unwrap().history_len, 1);
}

#[tokio::test]
async fn test_partial_fill_after_expiry_settles_as_loss() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let journal = TradeJournal::new(config.paths.clone(), false);
    let mut trade = executed_trade("p1", now() - Duration::hours(2), 10, 60);
    trade.result_status = ResultStatus::Pending;
    journal.append(&trade).unwrap();

    let venue = FakeVenue::new(10_000, vec![settled_market(&trade, Some(98_500.0))])
        .with_ack(ack("p1", OrderStatus::Canceled, 4, 0));
    let report = reconciler(&config, venue).reconcile(now()).await.unwrap();

    assert_eq!(report.filled, 1);
    assert_eq!(report.lost, 1);
    assert_eq!(report.cancelled, 0);
    assert_eq!(report.summary.total_pnl_cents, -240);

    let rows = journal.read_day(trade.trade_date()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].result_status, ResultStatus::Lost);
    assert_eq!(rows[0].contracts, 4);
    assert_eq!(rows[0].cost_cents, 240);
    assert_eq!(rows[0].profit_cents, Some(-rows[0].cost_cents));
    assert_eq!(rows[0].settlement_price, Some(98_500.0));
}

#[tokio::test]
async fn test_unfilled_orders_cancel_only_after_expiry() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let journal = TradeJournal::new(config.paths.clone(), false);
    let mut expired = executed_trade("c1", now() - Duration::hours(2), 5, 70);
    expired.result_status = ResultStatus::Pending;
    let mut open = executed_trade("c2", now() - Duration::minutes(30), 5, 70);
    open.result_status = ResultStatus::Pending;
    journal.append(&expired).unwrap();
    journal.append(&open).unwrap();

    let venue = FakeVenue::new(10_000, Vec::new())
        .with_ack(ack("c1", OrderStatus::Resting, 0, 5))
        .with_ack(ack("c2", OrderStatus::Resting, 0, 5));
    let report = reconciler(&config, venue).reconcile(now()).await.unwrap();

    assert_eq!(report.cancelled, 1);
    assert_eq!(report.filled, 0);
    let rows = journal.read_day(now().date_naive()).unwrap();
    let status = |id: &str| {
        rows.iter()
            .find(|row| row.id == id)
            .map(|row| row.result_status)
            .unwrap()
    };
    assert_eq!(status("c1"), ResultStatus::Cancelled);
    assert_eq!(status("c2"), ResultStatus::Pending);
    assert!(rows.iter().all(|row| row.profit_cents.is_none()));
}

#[tokio::test]
async fn test_executed_trade_on_losing_side_books_full_cost() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let journal = TradeJournal::new(config.paths.clone(), false);
    let trade = executed_trade("l1", now() - Duration::hours(2), 5, 70);
    journal.append(&trade).unwrap();

    let mut settled = settled_market(&trade, None);
    settled.result = Some(Side::No);
    let venue = FakeVenue::new(10_000, vec![settled]);
    let report = reconciler(&config, venue).reconcile(now()).await.unwrap();

    assert_eq!(report.lost, 1);
    assert_eq!(report.won, 0);
    assert_eq!(report.summary.total_pnl_cents, -350);
    let rows = journal.read_day(trade.trade_date()).unwrap();
    assert_eq!(rows[0].result_status, ResultStatus::Lost);
    assert_eq!(rows[0].profit_cents, Some(-trade.cost_cents));
    assert_eq!(rows[0].settlement_price, None);
    assert_eq!(rows[0].settled_at, Some(now()));
}

#[tokio::test]
async fn test_settled_market_without_outcome_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let journal = TradeJournal::new(config.paths.clone(), false);
    let trade = executed_trade("e1", now() - Duration::hours(2), 5, 70);
    journal.append(&trade).unwrap();

    let venue = FakeVenue::new(10_000, vec![settled_market(&trade, None)]);
    let reconciler = reconciler(&config, venue);
    let report = reconciler.reconcile(now()).await.unwrap();

    assert_eq!(report.errors, 1);
    assert_eq!(report.won + report.lost, 0);
    let rows = journal.read_day(trade.trade_date()).unwrap();
    assert_eq!(rows[0].result_status, ResultStatus::Error);
    assert!(rows[0].error.is_some());
    assert_eq!(rows[0].profit_cents, None);
    assert!(config.paths.alert_file("settlement_mismatch").exists());

    let rerun = reconciler
        .reconcile(now() + Duration::minutes(5))
        .await
        .unwrap();
    assert!(!rerun.changed());
    assert_eq!(rerun.errors, 0);
}
