//! Integration tests for the full decision cycle:
//! observations -> aggregation -> gate -> execution -> persistence

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::HashMap;

use whalebot::engine::{CycleInputs, TradingEngine};
use whalebot::ev::{EvGate, EvGateConfig};
use whalebot::execution::PaperExecutor;
use whalebot::persistence::{CsvLogger, StateStore};
use whalebot::signals::forecast::DisabledForecaster;
use whalebot::signals::{AggregatorConfig, SignalAggregator};
use whalebot::thresholds::{ThresholdConfig, ThresholdController};
use whalebot::types::{
    Coin, MarketCategory, MarketQuote, MarketResolution, MomentumObservation, SignalObservation,
    TradeSide,
};
use whalebot::whales::leadlag::DisabledScorer;
use whalebot::whales::WalletTracker;

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap()
}

fn build_engine(data_dir: &str, paper_balance: f64) -> TradingEngine {
    let tracker = WalletTracker::new(
        &[
            "0xaaa".to_string(),
            "0xbbb".to_string(),
            "0xccc".to_string(),
        ],
        100_000.0,
    );
    let aggregator =
        SignalAggregator::new(AggregatorConfig::default(), Box::new(DisabledForecaster));
    let gate = EvGate::new(EvGateConfig::default());
    let controller = ThresholdController::new(ThresholdConfig::default(), fixed_now());
    let store = StateStore::new(data_dir).unwrap();
    let logger = Some(CsvLogger::new(data_dir).unwrap());

    TradingEngine::new(
        tracker,
        aggregator,
        gate,
        controller,
        Box::new(DisabledScorer),
        Box::new(PaperExecutor::new(paper_balance)),
        store,
        logger,
        1000.0,
        24,
    )
}

fn make_obs(
    wallet: &str,
    market: &str,
    direction: f64,
    hours_ago: i64,
    now: DateTime<Utc>,
) -> SignalObservation {
    SignalObservation {
        wallet_id: wallet.to_string(),
        market_id: market.to_string(),
        market_question: format!("BTC Up or Down - 15 min ({market})"),
        category: MarketCategory::Crypto15Min,
        direction,
        usd_value: direction.abs() * 100.0,
        timestamp: now - Duration::hours(hours_ago),
    }
}

fn make_quote(market: &str, yes: f64, liquidity: f64) -> MarketQuote {
    MarketQuote {
        market_id: market.to_string(),
        market_question: format!("BTC Up or Down - 15 min ({market})"),
        coin: Some(Coin::BTC),
        yes_price: yes,
        no_price: 1.0 - yes,
        liquidity,
        spread: 0.02,
    }
}

/// Bullish whale flow underpriced by the market on one side, an illiquid
/// market on the other: exactly one trade comes out of the cycle.
fn make_inputs(now: DateTime<Utc>) -> CycleInputs {
    let mut observations = HashMap::new();
    observations.insert(
        "cond-good".to_string(),
        vec![
            make_obs("0xaaa", "cond-good", 500.0, 1, now),
            make_obs("0xbbb", "cond-good", 300.0, 2, now),
            make_obs("0xccc", "cond-good", 400.0, 1, now),
        ],
    );
    observations.insert(
        "cond-thin".to_string(),
        vec![
            make_obs("0xaaa", "cond-thin", 200.0, 1, now),
            make_obs("0xbbb", "cond-thin", 100.0, 3, now),
        ],
    );

    let mut momentum = HashMap::new();
    momentum.insert(
        Coin::BTC,
        MomentumObservation {
            signal: 0.4,
            strength: 0.5,
        },
    );

    CycleInputs {
        observations,
        quotes: vec![
            make_quote("cond-good", 0.55, 5000.0),
            make_quote("cond-thin", 0.55, 50.0),
        ],
        momentum,
        resolutions: Vec::new(),
        bankroll: 1000.0,
    }
}

#[tokio::test]
async fn test_cycle_executes_single_best_opportunity() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = build_engine(dir.path().to_str().unwrap(), 1000.0);

    let summary = engine
        .run_cycle(make_inputs(fixed_now()), fixed_now())
        .await
        .unwrap();

    assert_eq!(summary.markets_evaluated, 2);
    assert_eq!(summary.candidates_logged, 2);
    assert!(summary.blocked_reason.is_none());

    let request = summary.executed.expect("one trade should execute");
    assert_eq!(request.market_id, "cond-good");
    assert_eq!(request.side, TradeSide::BuyYes);
    assert!(request.size > 0.0);

    // Both candidates hit the audit trail, only one traded
    let breakdown = engine.logger().unwrap().rejection_breakdown().unwrap();
    assert_eq!(breakdown.total_candidates, 2);
    assert_eq!(breakdown.trades, 1);
    assert_eq!(breakdown.by_reason["LOW_LIQUIDITY"], 1);

    // State files were written
    assert!(dir.path().join("whale_stats.json").exists());
    assert!(dir.path().join("thresholds.json").exists());
}

#[tokio::test]
async fn test_resolution_feeds_tracker_and_session() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = build_engine(dir.path().to_str().unwrap(), 1000.0);

    let now = fixed_now();
    engine.run_cycle(make_inputs(now), now).await.unwrap();

    // The traded market resolves YES: the bullish whales were right
    let later = now + Duration::minutes(15);
    let mut inputs = CycleInputs::default();
    inputs.bankroll = 1000.0;
    inputs.resolutions = vec![MarketResolution {
        market_id: "cond-good".to_string(),
        yes_won: true,
    }];
    engine.run_cycle(inputs, later).await.unwrap();

    let whale = engine.tracker().get("0xaaa").expect("tracked wallet");
    assert_eq!(whale.total_trades, 1);
    assert_eq!(whale.wins, 1);
    assert!(whale.category_accuracy(MarketCategory::Crypto15Min) > 0.5);

    // Our paper position settled at a profit and hit the session counters
    let session = engine.controller().session();
    assert_eq!(session.trades_executed, 1);
    assert_eq!(session.trades_profitable, 1);
    assert!(session.total_pnl > 0.0);
}

#[tokio::test]
async fn test_losing_resolution_marks_whales_wrong() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = build_engine(dir.path().to_str().unwrap(), 1000.0);

    let now = fixed_now();
    engine.run_cycle(make_inputs(now), now).await.unwrap();

    let later = now + Duration::minutes(15);
    let mut inputs = CycleInputs::default();
    inputs.bankroll = 1000.0;
    inputs.resolutions = vec![MarketResolution {
        market_id: "cond-good".to_string(),
        yes_won: false,
    }];
    engine.run_cycle(inputs, later).await.unwrap();

    let whale = engine.tracker().get("0xaaa").expect("tracked wallet");
    assert_eq!(whale.losses, 1);
    assert!(whale.rolling_weight < 1.0);

    let session = engine.controller().session();
    assert_eq!(session.trades_executed, 1);
    assert_eq!(session.trades_profitable, 0);
    assert!(session.total_pnl < 0.0);
}

#[tokio::test]
async fn test_kill_switch_blocks_cycle_but_keeps_audit_trail() {
    let dir = tempfile::tempdir().unwrap();
    // Paper equity 850 against a 1000 starting bankroll: -15% daily loss
    let mut engine = build_engine(dir.path().to_str().unwrap(), 850.0);

    let summary = engine
        .run_cycle(make_inputs(fixed_now()), fixed_now())
        .await
        .unwrap();

    let reason = summary.blocked_reason.expect("kill switch should block");
    assert!(reason.contains("Kill switch"));
    assert!(summary.executed.is_none());

    // Candidates are still evaluated and logged for diagnostics
    assert_eq!(summary.candidates_logged, 2);
}

#[tokio::test]
async fn test_state_survives_engine_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().to_str().unwrap().to_string();

    {
        let mut engine = build_engine(&path, 1000.0);
        let now = fixed_now();
        engine.run_cycle(make_inputs(now), now).await.unwrap();

        let later = now + Duration::minutes(15);
        let mut inputs = CycleInputs::default();
        inputs.bankroll = 1000.0;
        inputs.resolutions = vec![MarketResolution {
            market_id: "cond-good".to_string(),
            yes_won: true,
        }];
        engine.run_cycle(inputs, later).await.unwrap();
    }

    // A fresh engine against the same data dir sees the persisted stats
    let store = StateStore::new(&path).unwrap();
    let stats = store.load_wallet_stats();
    assert_eq!(stats["0xaaa"].wins, 1);

    let snapshot = store.load_controller().expect("controller snapshot");
    assert_eq!(snapshot.session.trades_executed, 1);
}
