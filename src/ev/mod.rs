//! EV Gate & Position Sizer
//!
//! Replaces a brittle "edge >= X%" rule with a proper net-expected-value
//! calculation:
//!
//!   ev_net = ev_gross * size - fees - slippage
//!
//! An opportunity trades only when ev_net > 0, clears the adaptive
//! `min_ev_frac` floor, and trips none of the other rejection reasons.
//! Sizing is fractional Kelly (half-Kelly) capped by a hard position limit.

pub mod kelly;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::types::{MarketQuote, TradeSide};
use kelly::compute_kelly;

/// Gate tuning
#[derive(Debug, Clone)]
pub struct EvGateConfig {
    /// Base platform fee estimate (fraction of size)
    pub base_fee_pct: f64,
    /// Base slippage estimate (fraction of size)
    pub base_slippage_pct: f64,
    /// Never bet more than this Kelly fraction
    pub max_kelly_fraction: f64,
    /// Hard cap on position size as fraction of bankroll
    pub max_position_pct: f64,
}

impl Default for EvGateConfig {
    fn default() -> Self {
        Self {
            base_fee_pct: 0.02,
            base_slippage_pct: 0.01,
            max_kelly_fraction: 0.25,
            max_position_pct: 0.05,
        }
    }
}

/// Why a candidate was rejected. Reasons are evaluated independently and
/// are deliberately non-exclusive: rejection-rate reporting counts every
/// applicable reason per candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectionReason {
    EvNetNegative,
    EvFracTooLow,
    ExtremePrice,
    SizeTooSmall,
    LowLiquidity,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::EvNetNegative => write!(f, "EV_NET_NEGATIVE"),
            RejectionReason::EvFracTooLow => write!(f, "EV_FRAC_TOO_LOW"),
            RejectionReason::ExtremePrice => write!(f, "EXTREME_PRICE"),
            RejectionReason::SizeTooSmall => write!(f, "SIZE_TOO_SMALL"),
            RejectionReason::LowLiquidity => write!(f, "LOW_LIQUIDITY"),
        }
    }
}

/// Evaluated trade opportunity with the full EV breakdown. One instance per
/// market per cycle; every candidate is written to the diagnostic log
/// whether it trades or not.
#[derive(Debug, Clone, Serialize)]
pub struct TradeOpportunity {
    pub market_id: String,
    pub market_question: String,

    /// Our calibrated probability of YES
    pub p_model: f64,
    /// Market implied probability (= YES price)
    pub p_market: f64,
    /// Signal confidence carried through for selection and logging
    pub confidence: f64,

    pub side: TradeSide,
    /// Token price we would pay
    pub entry_price: f64,

    /// Profit per contract if we win
    pub payout_if_win: f64,
    /// Loss per contract if we lose
    pub cost_if_lose: f64,
    /// EV per unit of currency risked, before costs
    pub ev_gross: f64,
    pub fees_est: f64,
    pub slippage_est: f64,
    /// Net EV of the sized position after costs
    pub ev_net: f64,

    pub kelly_fraction: f64,
    /// Suggested trade size in USD
    pub suggested_size: f64,
    /// Bankroll at evaluation time
    pub bankroll: f64,

    pub passes: bool,
    pub rejection_reasons: Vec<RejectionReason>,
    pub ts: DateTime<Utc>,
}

impl TradeOpportunity {
    /// Edge as a simple probability difference
    pub fn edge(&self) -> f64 {
        (self.p_model - self.p_market).abs()
    }

    /// Net EV as a fraction of bankroll
    pub fn ev_per_bankroll(&self) -> f64 {
        if self.bankroll <= 0.0 {
            return 0.0;
        }
        self.ev_net / self.bankroll
    }

    /// Selection key for picking the best opportunity of a cycle
    pub fn score(&self) -> f64 {
        self.ev_net * self.confidence
    }
}

/// Evaluates market candidates into [`TradeOpportunity`] records
#[derive(Debug, Default)]
pub struct EvGate {
    config: EvGateConfig,
}

impl EvGate {
    pub fn new(config: EvGateConfig) -> Self {
        Self { config }
    }

    /// Estimate trading fees: base platform fee + half the spread
    fn estimate_fees(&self, size: f64, spread: f64) -> f64 {
        size * (self.config.base_fee_pct + spread / 2.0)
    }

    /// Estimate slippage from order size vs available liquidity. The impact
    /// term is capped at 15%; a book with no liquidity data charges a flat
    /// 10% instead of dividing by zero.
    fn estimate_slippage(&self, size: f64, liquidity: f64) -> f64 {
        if liquidity <= 0.0 {
            return size * 0.10;
        }
        let impact_ratio = size / liquidity;
        let slippage_pct = (self.config.base_slippage_pct + impact_ratio * 0.5).min(0.15);
        size * slippage_pct
    }

    /// Evaluate one market candidate.
    ///
    /// `min_ev_frac` comes from the threshold controller each cycle rather
    /// than being fixed at construction.
    pub fn evaluate(
        &self,
        quote: &MarketQuote,
        p_model: f64,
        confidence: f64,
        bankroll: f64,
        min_ev_frac: f64,
        now: DateTime<Utc>,
    ) -> TradeOpportunity {
        let mut rejection_reasons = Vec::new();

        // Market implied probability is the YES price
        let p_market = quote.yes_price;

        // Buy whichever token our model thinks is underpriced
        let (side, entry_price, win_prob) = if p_model > p_market {
            (TradeSide::BuyYes, quote.yes_price, p_model)
        } else {
            (TradeSide::BuyNo, quote.no_price, 1.0 - p_model)
        };

        // Binary token payoff: $1 if right, stake lost if wrong
        let payout_if_win = 1.0 - entry_price;
        let cost_if_lose = entry_price;

        let ev_gross = win_prob * payout_if_win - (1.0 - win_prob) * cost_if_lose;

        let kelly = compute_kelly(
            win_prob,
            payout_if_win,
            cost_if_lose,
            self.config.max_kelly_fraction,
        );

        // Half-Kelly for variance reduction, capped by the hard position limit
        let suggested_size = (bankroll * kelly.f_capped * 0.5)
            .min(bankroll * self.config.max_position_pct)
            .max(0.0);

        let fees = self.estimate_fees(suggested_size, quote.spread);
        let slippage = self.estimate_slippage(suggested_size, quote.liquidity);
        let ev_net = ev_gross * suggested_size - fees - slippage;

        if ev_net <= 0.0 {
            rejection_reasons.push(RejectionReason::EvNetNegative);
        }

        // Only meaningful for positive EV; a negative candidate is already
        // tagged EV_NET_NEGATIVE and must not also read as "too small"
        let ev_frac = if bankroll > 0.0 { ev_net / bankroll } else { 0.0 };
        if ev_net > 0.0 && ev_frac < min_ev_frac {
            rejection_reasons.push(RejectionReason::EvFracTooLow);
        }

        if !(0.05..=0.95).contains(&entry_price) {
            rejection_reasons.push(RejectionReason::ExtremePrice);
        }

        if suggested_size < 1.0 {
            rejection_reasons.push(RejectionReason::SizeTooSmall);
        }

        if quote.liquidity < 100.0 {
            rejection_reasons.push(RejectionReason::LowLiquidity);
        }

        let passes = rejection_reasons.is_empty();
        debug!(
            market = %quote.market_id,
            %side,
            ev_net,
            size = suggested_size,
            passes,
            "evaluated candidate"
        );

        TradeOpportunity {
            market_id: quote.market_id.clone(),
            market_question: quote.market_question.clone(),
            p_model,
            p_market,
            confidence,
            side,
            entry_price,
            payout_if_win,
            cost_if_lose,
            ev_gross,
            fees_est: fees,
            slippage_est: slippage,
            ev_net,
            kelly_fraction: kelly.f_capped,
            suggested_size,
            bankroll,
            passes,
            rejection_reasons,
            ts: now,
        }
    }
}
