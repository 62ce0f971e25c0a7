//! Wallet Performance Tracker
//!
//! Maintains rolling accuracy statistics per tracked whale wallet:
//! - win/loss counters with a bounded window of recent outcomes
//! - per-category accuracy (EMA)
//! - rolling weight (EMA of recent win rate) consumed by the aggregator
//! - lead score written back by the lead-lag scorer each cycle

pub mod leadlag;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

use crate::types::MarketCategory;

/// How many recent outcomes to keep per wallet
const RECENT_OUTCOMES_CAP: usize = 20;

/// EMA smoothing factor for category accuracy
const CATEGORY_ALPHA: f64 = 0.1;

/// Known whale capital scores (realized PnL, USD). Used as the static prior
/// for capital weighting; wallets not listed fall back to the configured
/// default. These should ideally be refreshed from live leaderboard data.
const CAPITAL_SEED: [(&str, f64); 6] = [
    ("0x63ce342161250d705dc0b16df89036c8e5f9ba9a", 558_000.0),
    ("0x9d84ce0306f8551e02efef1680475fc0f1dc1344", 2_600_000.0),
    ("0xd218e474776403a330142299f7796e8ba32eb5c9", 958_000.0),
    ("0x006cc834cc092684f1b56626e23bedb3835c16ea", 1_480_000.0),
    ("0xe74a4446efd66a4de690962938f550d8921e40ee", 434_000.0),
    ("0x492442eab586f242b53bda933fd5de859c8a3782", 1_420_000.0),
];

/// Rolling performance statistics for a single whale wallet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletPerformance {
    /// Wallet address (lowercase)
    pub id: String,
    pub total_trades: u64,
    pub wins: u64,
    pub losses: u64,
    /// Last 20 outcomes, oldest first
    pub recent_outcomes: VecDeque<bool>,
    /// Per-category accuracy, EMA-smoothed. Unseen categories read as 0.5.
    pub category_accuracy: HashMap<MarketCategory, f64>,
    /// EMA of recent win rate, starts at 1.0
    pub rolling_weight: f64,
    /// Lead score in [0, 1] from the lead-lag scorer, 0 when unavailable
    pub lead_score: f64,
}

impl WalletPerformance {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            total_trades: 0,
            wins: 0,
            losses: 0,
            recent_outcomes: VecDeque::with_capacity(RECENT_OUTCOMES_CAP),
            category_accuracy: HashMap::new(),
            rolling_weight: 1.0,
            lead_score: 0.0,
        }
    }

    /// Lifetime win rate; neutral 0.5 for wallets with no resolved trades
    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            return 0.5;
        }
        self.wins as f64 / self.total_trades as f64
    }

    /// Win rate over the recent-outcome window; 0.5 when empty
    pub fn recent_win_rate(&self) -> f64 {
        if self.recent_outcomes.is_empty() {
            return 0.5;
        }
        let wins = self.recent_outcomes.iter().filter(|w| **w).count();
        wins as f64 / self.recent_outcomes.len() as f64
    }

    /// Accuracy for a category, neutral 0.5 if never seen
    pub fn category_accuracy(&self, category: MarketCategory) -> f64 {
        self.category_accuracy.get(&category).copied().unwrap_or(0.5)
    }

    /// Record a resolved trade outcome
    pub fn record_outcome(&mut self, won: bool, category: MarketCategory) {
        self.total_trades += 1;
        if won {
            self.wins += 1;
        } else {
            self.losses += 1;
        }

        self.recent_outcomes.push_back(won);
        while self.recent_outcomes.len() > RECENT_OUTCOMES_CAP {
            self.recent_outcomes.pop_front();
        }

        let old_acc = self.category_accuracy(category);
        let outcome = if won { 1.0 } else { 0.0 };
        self.category_accuracy
            .insert(category, old_acc * (1.0 - CATEGORY_ALPHA) + outcome * CATEGORY_ALPHA);

        self.rolling_weight = 0.9 * self.rolling_weight + 0.1 * self.recent_win_rate();
    }
}

/// Tracker for all whale wallets. Owned by the engine; never destroys a
/// wallet entry, state persists across sessions via the state store.
#[derive(Debug, Default)]
pub struct WalletTracker {
    wallets: HashMap<String, WalletPerformance>,
    /// Static capital prior per wallet (USD)
    capital: HashMap<String, f64>,
    /// Capital assumed for wallets without a seed entry
    default_capital: f64,
}

impl WalletTracker {
    pub fn new(tracked: &[String], default_capital: f64) -> Self {
        let capital: HashMap<String, f64> = CAPITAL_SEED
            .iter()
            .map(|(addr, pnl)| (addr.to_string(), *pnl))
            .collect();

        let mut tracker = Self {
            wallets: HashMap::new(),
            capital,
            default_capital,
        };
        for addr in tracked {
            tracker.ensure_tracked(addr);
        }
        tracker
    }

    /// Add a wallet if not already tracked
    pub fn ensure_tracked(&mut self, wallet_id: &str) {
        let key = wallet_id.to_lowercase();
        self.wallets
            .entry(key.clone())
            .or_insert_with(|| WalletPerformance::new(key));
    }

    pub fn get(&self, wallet_id: &str) -> Option<&WalletPerformance> {
        self.wallets.get(&wallet_id.to_lowercase())
    }

    pub fn wallet_ids(&self) -> Vec<String> {
        self.wallets.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    /// Static capital prior for a wallet, scaled to millions so the base
    /// combination weight lands in a reasonable range
    pub fn capital_weight(&self, wallet_id: &str) -> f64 {
        let pnl = self
            .capital
            .get(&wallet_id.to_lowercase())
            .copied()
            .unwrap_or(self.default_capital);
        pnl / 1e6
    }

    /// Record a resolved outcome for a wallet, creating the entry if needed
    pub fn record_outcome(&mut self, wallet_id: &str, won: bool, category: MarketCategory) {
        let key = wallet_id.to_lowercase();
        let wallet = self
            .wallets
            .entry(key.clone())
            .or_insert_with(|| WalletPerformance::new(key.clone()));
        wallet.record_outcome(won, category);
        debug!(
            wallet = %key,
            won,
            win_rate = wallet.win_rate(),
            rolling_weight = wallet.rolling_weight,
            "recorded whale outcome"
        );
    }

    /// Apply lead scores computed by the lead-lag scorer. One-directional:
    /// the scorer returns a pure mapping, the tracker is the only state
    /// that gets mutated.
    pub fn apply_lead_scores(&mut self, scores: &HashMap<String, f64>) {
        for (wallet_id, score) in scores {
            let key = wallet_id.to_lowercase();
            if let Some(wallet) = self.wallets.get_mut(&key) {
                wallet.lead_score = score.clamp(0.0, 1.0);
            }
        }
    }

    /// Iterate all tracked wallets
    pub fn iter(&self) -> impl Iterator<Item = &WalletPerformance> {
        self.wallets.values()
    }

    /// Export state for persistence
    pub fn export(&self) -> HashMap<String, WalletPerformance> {
        self.wallets.clone()
    }

    /// Restore state from persistence, keeping capital seeds intact
    pub fn import(&mut self, wallets: HashMap<String, WalletPerformance>) {
        for (id, perf) in wallets {
            self.wallets.insert(id.to_lowercase(), perf);
        }
    }
}
