//! Signal Aggregator - Combines whale observations into a trading signal
//!
//! Aggregates per-wallet directional observations with:
//! - exponential time decay (half-life weighting)
//! - dynamic wallet weights (capital prior x rolling performance x
//!   category accuracy x lead boost), normalized across the tracked set
//! - dispersion statistics and a 95% confidence interval
//! - Bayesian fusion of the whale prior with price momentum
//! - an optional trajectory forecast feeding the confidence score

pub mod forecast;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::types::{MarketCategory, MomentumObservation, SignalObservation};
use crate::whales::WalletTracker;
use forecast::TrajectoryForecaster;

/// Softening constant for the odds-ratio math
const ODDS_EPS: f64 = 0.01;

/// Combination weight applied to wallets outside the tracked set
const UNTRACKED_WEIGHT: f64 = 0.1;

/// Aggregator tuning
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Observation weight halves every this many hours
    pub decay_half_life_hours: f64,
    /// How far ahead the trajectory forecast looks
    pub forecast_horizon_hours: f64,
    /// Lead score above which a wallet contributes to the lead sub-signal
    pub lead_signal_threshold: f64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            decay_half_life_hours: 6.0,
            forecast_horizon_hours: 1.0,
            lead_signal_threshold: 0.5,
        }
    }
}

/// Aggregated signal for one market, recomputed fresh each cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedSignal {
    pub market_id: String,
    pub market_question: String,
    pub category: MarketCategory,

    /// Ensemble direction normalized to [-1, 1]
    pub direction: f64,
    /// Confidence in [0, 1]
    pub confidence: f64,

    /// Whale-based prior probability of YES
    pub prior: f64,
    /// Momentum converted to probability space
    pub likelihood: f64,
    /// Bayesian-fused probability, clipped to [0.01, 0.99]
    pub posterior: f64,

    /// Raw weighted ensemble mean (unnormalized)
    pub mean: f64,
    /// Unweighted dispersion across per-wallet directions
    pub std: f64,
    /// 95% CI bounds on the mean
    pub lower_ci: f64,
    pub upper_ci: f64,

    /// Number of wallets active in this market
    pub whale_count: usize,
    /// Fraction of wallets on the majority side
    pub whale_agreement: f64,
    /// Direction from high lead-score wallets only, 0 when none qualify
    pub lead_weighted_signal: f64,

    /// Trajectory forecast, when the forecaster had enough data
    pub forecast_mean: Option<f64>,
    pub forecast_std: Option<f64>,

    /// Total USD volume behind the signal
    pub total_volume: f64,
    pub timestamp: DateTime<Utc>,
}

impl AggregatedSignal {
    /// Statistically significant iff the 95% CI excludes zero
    pub fn is_significant(&self) -> bool {
        self.lower_ci > 0.0 || self.upper_ci < 0.0
    }

    /// Signal strength relative to dispersion
    pub fn signal_to_noise(&self) -> f64 {
        if self.std == 0.0 {
            return 0.0;
        }
        self.mean.abs() / self.std
    }
}

/// Bayesian odds update of the whale prior with a momentum observation.
///
/// The momentum strength interpolates in log-odds space between ignoring
/// momentum entirely (s=0) and treating it as a fully informative
/// likelihood (s=1). Output is clipped to [0.01, 0.99].
pub fn bayesian_update(prior: f64, momentum_signal: f64, momentum_strength: f64) -> f64 {
    let momentum_prob = 0.5 + momentum_signal * 0.5;

    let likelihood_ratio = (momentum_prob + ODDS_EPS) / ((1.0 - momentum_prob) + ODDS_EPS);
    let prior_odds = (prior + ODDS_EPS) / ((1.0 - prior) + ODDS_EPS);

    let full_posterior_odds = prior_odds * likelihood_ratio;
    let s = momentum_strength.clamp(0.0, 1.0);
    let weighted_odds = prior_odds.powf(1.0 - s) * full_posterior_odds.powf(s);

    (weighted_odds / (1.0 + weighted_odds)).clamp(0.01, 0.99)
}

/// Aggregates observations for one market into an [`AggregatedSignal`]
pub struct SignalAggregator {
    config: AggregatorConfig,
    forecaster: Box<dyn TrajectoryForecaster>,
}

impl SignalAggregator {
    pub fn new(config: AggregatorConfig, forecaster: Box<dyn TrajectoryForecaster>) -> Self {
        Self { config, forecaster }
    }

    /// Exponential decay weight for an observation of the given age
    fn time_weight(&self, age_hours: f64) -> f64 {
        let lambda = std::f64::consts::LN_2 / self.config.decay_half_life_hours;
        (-lambda * age_hours.max(0.0)).exp()
    }

    /// Dynamic combination weights across ALL tracked wallets, normalized to
    /// sum to 1 when any wallet has nonzero weight.
    pub fn dynamic_weights(
        &self,
        tracker: &WalletTracker,
        category: MarketCategory,
    ) -> HashMap<String, f64> {
        let mut weights: HashMap<String, f64> = HashMap::new();

        for wallet in tracker.iter() {
            let base = tracker.capital_weight(&wallet.id);
            let performance_factor = wallet.rolling_weight;
            // 0.5 .. 1.5
            let category_factor = 0.5 + wallet.category_accuracy(category);
            // Up to 20% boost for wallets that trade first
            let lead_factor = 1.0 + wallet.lead_score * 0.2;

            weights.insert(
                wallet.id.clone(),
                base * performance_factor * category_factor * lead_factor,
            );
        }

        let total: f64 = weights.values().sum();
        if total > 0.0 {
            for v in weights.values_mut() {
                *v /= total;
            }
        }
        weights
    }

    /// Aggregate all observations for one market plus a momentum reading.
    ///
    /// `now` is threaded through explicitly so a fixed clock yields
    /// identical output for identical inputs.
    pub fn aggregate(
        &self,
        observations: &[SignalObservation],
        momentum: MomentumObservation,
        tracker: &WalletTracker,
        now: DateTime<Utc>,
    ) -> Option<AggregatedSignal> {
        if observations.is_empty() {
            return None;
        }

        let market_id = observations[0].market_id.clone();
        let market_question = observations[0].market_question.clone();
        let category = observations[0].category;

        let weights = self.dynamic_weights(tracker, category);

        // ── TIME-WEIGHTED PER-WALLET DIRECTION ──
        let mut wallet_signals: HashMap<String, f64> = HashMap::new();
        let mut wallet_time_weights: HashMap<String, f64> = HashMap::new();
        let mut total_volume = 0.0;

        for obs in observations {
            let wallet = obs.wallet_id.to_lowercase();
            let age_hours = (now - obs.timestamp).num_seconds() as f64 / 3600.0;
            let tw = self.time_weight(age_hours);

            *wallet_signals.entry(wallet.clone()).or_insert(0.0) += obs.direction * tw;
            *wallet_time_weights.entry(wallet).or_insert(0.0) += tw;
            total_volume += obs.usd_value;
        }

        for (wallet, signal) in wallet_signals.iter_mut() {
            let tw = wallet_time_weights[wallet];
            if tw > 0.0 {
                *signal /= tw;
            }
        }

        // ── WEIGHTED ENSEMBLE ──
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        // Stable iteration order keeps float accumulation deterministic
        let mut per_wallet: Vec<(&String, &f64)> = wallet_signals.iter().collect();
        per_wallet.sort_by(|a, b| a.0.cmp(b.0));

        for (wallet, signal) in &per_wallet {
            let w = weights.get(*wallet).copied().unwrap_or(UNTRACKED_WEIGHT);
            weighted_sum += **signal * w;
            weight_total += w;
        }
        if weight_total == 0.0 {
            return None;
        }
        let mean_direction = weighted_sum / weight_total;

        // ── DISPERSION ──
        let signals: Vec<f64> = per_wallet.iter().map(|(_, s)| **s).collect();
        let n = signals.len();
        let (std, ci_margin) = if n > 1 {
            let sample_mean = signals.iter().sum::<f64>() / n as f64;
            let variance =
                signals.iter().map(|s| (s - sample_mean).powi(2)).sum::<f64>() / n as f64;
            let std = variance.sqrt();
            let se = std / (n as f64).sqrt();
            (std, 1.96 * se)
        } else {
            (0.5, 0.5)
        };

        // ── WHALE AGREEMENT ──
        let positive = signals.iter().filter(|s| **s > 0.0).count();
        let negative = signals.iter().filter(|s| **s < 0.0).count();
        let whale_agreement = positive.max(negative) as f64 / n as f64;

        // ── LEAD SUB-SIGNAL ──
        let mut lead_signal = 0.0;
        let mut lead_weight = 0.0;
        for (wallet, signal) in &per_wallet {
            if let Some(perf) = tracker.get(wallet) {
                if perf.lead_score > self.config.lead_signal_threshold {
                    lead_signal += **signal * perf.lead_score;
                    lead_weight += perf.lead_score;
                }
            }
        }
        if lead_weight > 0.0 {
            lead_signal /= lead_weight;
        }

        // ── BAYESIAN FUSION ──
        let prior = (0.5 + mean_direction * 0.3).clamp(0.1, 0.9);
        let posterior = bayesian_update(prior, momentum.signal, momentum.strength);

        // ── TRAJECTORY FORECAST ──
        let samples: Vec<(f64, f64)> = observations
            .iter()
            .map(|obs| {
                let hours_ago = (now - obs.timestamp).num_seconds() as f64 / 3600.0;
                (hours_ago, obs.direction)
            })
            .collect();
        let forecast = self
            .forecaster
            .forecast(&samples, self.config.forecast_horizon_hours);

        // ── CONFIDENCE ──
        let mut confidence = whale_agreement;
        if let Some(f) = &forecast {
            let snr = f.mean.abs() / (f.std + 1e-6);
            let forecast_confidence = (snr / 2.0).min(1.0);
            confidence = 0.7 * confidence + 0.3 * forecast_confidence;
        }
        if lead_signal * mean_direction > 0.0 {
            confidence *= 1.1;
        }
        let confidence = confidence.clamp(0.0, 1.0);

        // ── NORMALIZED DIRECTION ──
        let max_signal = signals
            .iter()
            .fold(1.0_f64, |acc, s| acc.max(s.abs()));
        let direction = (mean_direction / max_signal).clamp(-1.0, 1.0);

        debug!(
            market = %market_id,
            direction,
            posterior,
            confidence,
            whales = n,
            "aggregated market signal"
        );

        Some(AggregatedSignal {
            market_id,
            market_question,
            category,
            direction,
            confidence,
            prior,
            likelihood: 0.5 + momentum.signal * 0.5,
            posterior,
            mean: mean_direction,
            std,
            lower_ci: mean_direction - ci_margin,
            upper_ci: mean_direction + ci_margin,
            whale_count: n,
            whale_agreement,
            lead_weighted_signal: lead_signal,
            forecast_mean: forecast.as_ref().map(|f| f.mean),
            forecast_std: forecast.as_ref().map(|f| f.std),
            total_volume,
            timestamp: now,
        })
    }
}
