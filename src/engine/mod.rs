//! Trading Engine - one decision cycle per invocation
//!
//! Owns the four decision components and wires one cycle at a time:
//! resolutions -> tracker update -> lead-lag scores -> per-market
//! aggregation -> threshold consult -> EV gate -> single best execution ->
//! state save. Every evaluated candidate is written to the diagnostic log,
//! trade or not; only the highest `ev_net x confidence` passing opportunity
//! is forwarded to the executor, and only when the controller allows
//! trading.
//!
//! All state is constructor-injected; nothing global. A failed cycle is
//! abandoned with a warning and retried by the caller on the next tick.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::ev::{EvGate, EvGateConfig, TradeOpportunity};
use crate::execution::{DryRunExecutor, OrderExecutor, PaperExecutor};
use crate::persistence::{CandidateRecord, CsvLogger, StateStore, TradeLogRecord};
use crate::signals::forecast::{DisabledForecaster, GpForecaster, TrajectoryForecaster};
use crate::signals::{AggregatedSignal, AggregatorConfig, SignalAggregator};
use crate::thresholds::{ThresholdConfig, ThresholdController};
use crate::types::{
    Coin, MarketQuote, MarketResolution, MomentumObservation, SignalObservation, TradeRequest,
};
use crate::whales::leadlag::{DisabledScorer, GrangerScorer, LeadLagScorer};
use crate::whales::WalletTracker;

/// Everything one cycle consumes, gathered by the caller from the feeds
#[derive(Debug, Default)]
pub struct CycleInputs {
    /// Whale observations grouped by market id
    pub observations: HashMap<String, Vec<SignalObservation>>,
    /// Quotes for tradable markets
    pub quotes: Vec<MarketQuote>,
    /// Momentum per coin
    pub momentum: HashMap<Coin, MomentumObservation>,
    /// Official outcomes that resolved since the last cycle
    pub resolutions: Vec<MarketResolution>,
    /// Bankroll fallback when the executor does not track one
    pub bankroll: f64,
}

/// What one cycle did, for logging and tests
#[derive(Debug, Default)]
pub struct CycleSummary {
    pub markets_evaluated: usize,
    pub candidates_logged: usize,
    pub passing_candidates: usize,
    pub executed: Option<TradeRequest>,
    /// Set when the threshold controller blocked trading
    pub blocked_reason: Option<String>,
}

/// The decision core orchestrator
pub struct TradingEngine {
    tracker: WalletTracker,
    aggregator: SignalAggregator,
    gate: EvGate,
    controller: ThresholdController,
    leadlag: Box<dyn LeadLagScorer>,
    executor: Box<dyn OrderExecutor>,
    store: StateStore,
    logger: Option<CsvLogger>,
    /// Reference bankroll for the daily loss limit
    starting_bankroll: f64,
    lookback_hours: i64,
    /// Observations seen per market, kept for outcome attribution when the
    /// market later resolves
    observation_cache: HashMap<String, Vec<SignalObservation>>,
}

impl TradingEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tracker: WalletTracker,
        aggregator: SignalAggregator,
        gate: EvGate,
        controller: ThresholdController,
        leadlag: Box<dyn LeadLagScorer>,
        executor: Box<dyn OrderExecutor>,
        store: StateStore,
        logger: Option<CsvLogger>,
        starting_bankroll: f64,
        lookback_hours: i64,
    ) -> Self {
        Self {
            tracker,
            aggregator,
            gate,
            controller,
            leadlag,
            executor,
            store,
            logger,
            starting_bankroll,
            lookback_hours,
            observation_cache: HashMap::new(),
        }
    }

    /// Wire the engine from configuration, restoring persisted state
    pub fn from_config(config: &AppConfig, now: DateTime<Utc>) -> Result<Self> {
        let store = StateStore::new(&config.persistence.data_dir)?;

        let mut tracker =
            WalletTracker::new(&config.whales.tracked, config.whales.default_capital_usd);
        tracker.import(store.load_wallet_stats());

        let forecaster: Box<dyn TrajectoryForecaster> = if config.signals.forecast_enabled {
            Box::new(GpForecaster::new(config.signals.forecast_min_observations))
        } else {
            Box::new(DisabledForecaster)
        };
        let aggregator = SignalAggregator::new(
            AggregatorConfig {
                decay_half_life_hours: config.signals.decay_half_life_hours,
                forecast_horizon_hours: config.signals.forecast_horizon_hours,
                lead_signal_threshold: config.signals.lead_signal_threshold,
            },
            forecaster,
        );

        let gate = EvGate::new(EvGateConfig {
            base_fee_pct: config.ev.base_fee_pct,
            base_slippage_pct: config.ev.base_slippage_pct,
            max_kelly_fraction: config.ev.max_kelly_fraction,
            max_position_pct: config.ev.max_position_pct,
        });

        let mut controller = ThresholdController::new(
            ThresholdConfig {
                base_min_ev_frac: config.thresholds.base_min_ev_frac,
                base_min_confidence: config.thresholds.base_min_confidence,
                target_trades_per_day: config.thresholds.target_trades_per_day,
                max_trades_per_day: config.thresholds.max_trades_per_day,
                max_daily_loss_pct: config.thresholds.max_daily_loss_pct,
            },
            now,
        );
        if let Some(snapshot) = store.load_controller() {
            controller.restore(snapshot);
        }

        let leadlag: Box<dyn LeadLagScorer> = if config.whales.leadlag_enabled {
            Box::new(GrangerScorer::new(config.whales.lookback_hours))
        } else {
            Box::new(DisabledScorer)
        };

        let executor: Box<dyn OrderExecutor> = if config.bot.dry_run {
            Box::new(DryRunExecutor)
        } else {
            Box::new(PaperExecutor::new(config.bot.starting_bankroll))
        };

        let logger = if config.persistence.csv_enabled {
            Some(CsvLogger::new(&config.persistence.data_dir)?)
        } else {
            None
        };

        Ok(Self::new(
            tracker,
            aggregator,
            gate,
            controller,
            leadlag,
            executor,
            store,
            logger,
            config.bot.starting_bankroll,
            config.whales.lookback_hours,
        ))
    }

    pub fn tracker(&self) -> &WalletTracker {
        &self.tracker
    }

    pub fn controller(&self) -> &ThresholdController {
        &self.controller
    }

    pub fn logger(&self) -> Option<&CsvLogger> {
        self.logger.as_ref()
    }

    /// Manual kill-switch reset passthrough
    pub fn reset_kill_switch(&mut self) {
        self.controller.reset_kill_switch();
    }

    /// Apply official outcomes: attribute a win/loss to every whale that
    /// took a net position in the market, and settle our own paper position
    /// if one exists.
    fn apply_resolutions(&mut self, resolutions: &[MarketResolution]) {
        for resolution in resolutions {
            if let Some(observations) = self.observation_cache.remove(&resolution.market_id) {
                let mut net_direction: HashMap<String, f64> = HashMap::new();
                let mut category = None;
                for obs in &observations {
                    *net_direction.entry(obs.wallet_id.clone()).or_insert(0.0) += obs.direction;
                    category.get_or_insert(obs.category);
                }
                let category = category.unwrap_or_default();

                for (wallet, net) in net_direction {
                    if net == 0.0 {
                        continue;
                    }
                    let won = (net > 0.0) == resolution.yes_won;
                    self.tracker.record_outcome(&wallet, won, category);
                }
            }

            if let Some(settled) = self
                .executor
                .settle(&resolution.market_id, resolution.yes_won)
            {
                self.controller.record_settlement(settled.pnl);
            }
        }
    }

    /// Merge fresh observations into the attribution cache and drop markets
    /// whose data has aged out of the lookback window.
    fn refresh_observation_cache(
        &mut self,
        observations: &HashMap<String, Vec<SignalObservation>>,
        now: DateTime<Utc>,
    ) {
        for (market_id, obs) in observations {
            self.observation_cache
                .insert(market_id.clone(), obs.clone());
        }
        let cutoff = now - Duration::hours(self.lookback_hours);
        self.observation_cache.retain(|_, obs| {
            obs.iter().any(|o| o.timestamp >= cutoff)
        });
    }

    /// Per-wallet trade timestamps across all markets, for the lead-lag test
    fn wallet_activity(
        observations: &HashMap<String, Vec<SignalObservation>>,
    ) -> HashMap<String, Vec<DateTime<Utc>>> {
        let mut activity: HashMap<String, Vec<DateTime<Utc>>> = HashMap::new();
        for obs in observations.values().flatten() {
            activity
                .entry(obs.wallet_id.clone())
                .or_default()
                .push(obs.timestamp);
        }
        activity
    }

    /// Run one full decision cycle
    pub async fn run_cycle(
        &mut self,
        inputs: CycleInputs,
        now: DateTime<Utc>,
    ) -> Result<CycleSummary> {
        let mut summary = CycleSummary::default();

        // 1. Resolved markets feed the tracker and the session
        self.apply_resolutions(&inputs.resolutions);
        self.refresh_observation_cache(&inputs.observations, now);

        // 2. Lead-lag scores, applied one-directionally onto the tracker
        let activity = Self::wallet_activity(&inputs.observations);
        let scores = self.leadlag.score(&activity, now);
        self.tracker.apply_lead_scores(&scores);

        // 3. Threshold update and trade permission
        let bankroll = self.executor.bankroll().unwrap_or(inputs.bankroll);
        self.controller
            .update_thresholds(now, bankroll, self.starting_bankroll);
        let (can_trade, block_reason) = self.controller.can_trade(now);
        if !can_trade {
            info!("trading blocked: {}", block_reason);
            summary.blocked_reason = Some(block_reason);
        }
        let thresholds = self.controller.thresholds().clone();

        // 4. Aggregate and gate every quoted market with observations
        let mut evaluated: Vec<(AggregatedSignal, TradeOpportunity)> = Vec::new();
        for quote in &inputs.quotes {
            let observations = match inputs.observations.get(&quote.market_id) {
                Some(obs) if !obs.is_empty() => obs,
                _ => continue,
            };
            let momentum = quote
                .coin
                .and_then(|c| inputs.momentum.get(&c).copied())
                .unwrap_or_default();

            let signal = match self
                .aggregator
                .aggregate(observations, momentum, &self.tracker, now)
            {
                Some(s) => s,
                None => continue,
            };
            summary.markets_evaluated += 1;

            let opportunity = self.gate.evaluate(
                quote,
                signal.posterior,
                signal.confidence,
                bankroll,
                thresholds.min_ev_frac,
                now,
            );

            if let Some(logger) = &self.logger {
                let record = CandidateRecord::from_evaluation(&signal, &opportunity);
                if let Err(e) = logger.save_candidate(record).await {
                    warn!("Failed to log candidate: {e:#}");
                }
            }
            summary.candidates_logged += 1;

            evaluated.push((signal, opportunity));
        }

        // 5. Pick the single best passing candidate
        let best = evaluated
            .iter()
            .filter(|(signal, opp)| opp.passes && signal.confidence >= thresholds.min_confidence)
            .max_by(|a, b| {
                a.1.score()
                    .partial_cmp(&b.1.score())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        summary.passing_candidates = evaluated
            .iter()
            .filter(|(signal, opp)| opp.passes && signal.confidence >= thresholds.min_confidence)
            .count();

        // 6. Forward it when trading is allowed
        if let (true, Some((signal, opportunity))) = (can_trade, best) {
            let request = TradeRequest {
                id: Uuid::new_v4().to_string(),
                market_id: opportunity.market_id.clone(),
                side: opportunity.side,
                size: opportunity.suggested_size,
                price: opportunity.entry_price,
                ts: now,
            };
            info!(
                market = %request.market_id,
                side = %request.side,
                size = request.size,
                ev_net = opportunity.ev_net,
                confidence = signal.confidence,
                "executing best opportunity"
            );

            let report = self.executor.execute(&request).await?;
            if report.filled {
                self.controller.record_execution();
                if let Some(logger) = &self.logger {
                    let record = TradeLogRecord::from_request(
                        &request,
                        signal.confidence,
                        opportunity.ev_net,
                    );
                    if let Err(e) = logger.save_trade(record).await {
                        warn!("Failed to log trade: {e:#}");
                    }
                }
            }
            summary.executed = Some(request);
        }

        // 7. Persist state; failures are warnings, never fatal
        if let Err(e) = self.store.save_wallet_stats(&self.tracker.export()) {
            warn!("Failed to save whale stats: {e:#}");
        }
        if let Err(e) = self.store.save_controller(&self.controller.snapshot()) {
            warn!("Failed to save threshold state: {e:#}");
        }

        info!(
            markets = summary.markets_evaluated,
            passing = summary.passing_candidates,
            executed = summary.executed.is_some(),
            "cycle complete"
        );
        Ok(summary)
    }
}
