//! Adaptive Threshold Controller
//!
//! Tunes the EV gate's strictness from trading cadence, drawdown and
//! time-of-day:
//! - loosens thresholds when under-trading, tightens when over-trading
//! - nighttime (23:00-07:00 UTC) doubles both thresholds
//! - rising drawdown tightens further
//! - a daily loss past the limit latches the kill switch until the UTC day
//!   rolls over or it is manually reset

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Controller tuning
#[derive(Debug, Clone)]
pub struct ThresholdConfig {
    /// Baseline minimum EV as fraction of bankroll
    pub base_min_ev_frac: f64,
    /// Baseline minimum signal confidence
    pub base_min_confidence: f64,
    /// Daily trade target the adjustment factor steers toward
    pub target_trades_per_day: u32,
    /// Hard daily trade cap
    pub max_trades_per_day: u32,
    /// Daily loss fraction that trips the kill switch
    pub max_daily_loss_pct: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            base_min_ev_frac: 0.001,
            base_min_confidence: 0.25,
            target_trades_per_day: 15,
            max_trades_per_day: 25,
            max_daily_loss_pct: 0.10,
        }
    }
}

/// Current threshold configuration consumed by the EV gate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdState {
    pub min_ev_frac: f64,
    pub min_confidence: f64,
    /// Multiplier on the base thresholds from the trade-rate loop
    pub adjustment_factor: f64,
    pub is_nighttime: bool,
}

impl Default for ThresholdState {
    fn default() -> Self {
        Self {
            min_ev_frac: 0.001,
            min_confidence: 0.25,
            adjustment_factor: 1.0,
            is_nighttime: false,
        }
    }
}

/// Daily trading activity, reset at UTC day rollover
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingSession {
    /// UTC date key, YYYY-MM-DD
    pub date: String,
    pub trades_executed: u32,
    pub trades_profitable: u32,
    pub total_pnl: f64,
    pub peak_bankroll: f64,
    pub current_bankroll: f64,
    pub max_drawdown_pct: f64,
}

impl TradingSession {
    pub fn new(date: String) -> Self {
        Self {
            date,
            trades_executed: 0,
            trades_profitable: 0,
            total_pnl: 0.0,
            peak_bankroll: 0.0,
            current_bankroll: 0.0,
            max_drawdown_pct: 0.0,
        }
    }

    pub fn win_rate(&self) -> f64 {
        if self.trades_executed == 0 {
            return 0.0;
        }
        self.trades_profitable as f64 / self.trades_executed as f64
    }
}

/// Persisted controller state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerSnapshot {
    pub state: ThresholdState,
    pub session: TradingSession,
    pub kill_switch_active: bool,
    pub kill_switch_reason: Option<String>,
}

/// Adaptive threshold state machine over a daily session
#[derive(Debug)]
pub struct ThresholdController {
    config: ThresholdConfig,
    state: ThresholdState,
    session: TradingSession,
    kill_switch_active: bool,
    kill_switch_reason: Option<String>,
}

/// UTC date key for session grouping
fn date_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

/// Nighttime window is [23:00, 07:00) UTC
fn is_nighttime(now: DateTime<Utc>) -> bool {
    let hour = now.hour();
    hour >= 23 || hour < 7
}

impl ThresholdController {
    pub fn new(config: ThresholdConfig, now: DateTime<Utc>) -> Self {
        let state = ThresholdState {
            min_ev_frac: config.base_min_ev_frac,
            min_confidence: config.base_min_confidence,
            adjustment_factor: 1.0,
            is_nighttime: is_nighttime(now),
        };
        Self {
            config,
            state,
            session: TradingSession::new(date_key(now)),
            kill_switch_active: false,
            kill_switch_reason: None,
        }
    }

    /// Reset the session on UTC day rollover, clearing the kill switch
    fn roll_session_if_new_day(&mut self, now: DateTime<Utc>) {
        let today = date_key(now);
        if self.session.date != today {
            info!(date = %today, "trading session reset for new day");
            self.session = TradingSession::new(today);
            self.kill_switch_active = false;
            self.kill_switch_reason = None;
        }
    }

    /// Whether trading is currently allowed
    pub fn can_trade(&mut self, now: DateTime<Utc>) -> (bool, String) {
        self.roll_session_if_new_day(now);

        if self.kill_switch_active {
            let reason = self
                .kill_switch_reason
                .clone()
                .unwrap_or_else(|| "unspecified".to_string());
            return (false, format!("Kill switch active: {}", reason));
        }

        if self.session.trades_executed >= self.config.max_trades_per_day {
            return (
                false,
                format!(
                    "Daily trade limit reached ({})",
                    self.config.max_trades_per_day
                ),
            );
        }

        (true, "OK".to_string())
    }

    /// Recompute thresholds from current performance. Called at the start
    /// of each trading cycle.
    pub fn update_thresholds(
        &mut self,
        now: DateTime<Utc>,
        current_bankroll: f64,
        starting_bankroll: f64,
    ) {
        self.roll_session_if_new_day(now);

        // Bankroll trajectory
        self.session.current_bankroll = current_bankroll;
        if current_bankroll > self.session.peak_bankroll {
            self.session.peak_bankroll = current_bankroll;
        }
        if self.session.peak_bankroll > 0.0 {
            let drawdown =
                (self.session.peak_bankroll - current_bankroll) / self.session.peak_bankroll;
            self.session.max_drawdown_pct = self.session.max_drawdown_pct.max(drawdown);
        }

        // Daily loss limit
        let daily_pnl_pct = if starting_bankroll > 0.0 {
            (current_bankroll - starting_bankroll) / starting_bankroll
        } else {
            0.0
        };
        if daily_pnl_pct < -self.config.max_daily_loss_pct {
            let reason = format!("Daily loss limit exceeded ({:.1}%)", daily_pnl_pct * 100.0);
            if !self.kill_switch_active {
                warn!("KILL SWITCH ACTIVATED: {}", reason);
            }
            self.kill_switch_active = true;
            self.kill_switch_reason = Some(reason);
            return;
        }

        // Trade rate against the pro-rated daily target
        let hour_of_day = now.hour();
        let hours_elapsed = hour_of_day.max(1) as f64;
        let expected_trades = hours_elapsed / 24.0 * self.config.target_trades_per_day as f64;
        let trade_rate = if expected_trades > 0.0 {
            self.session.trades_executed as f64 / expected_trades
        } else {
            1.0
        };

        if trade_rate < 0.5 {
            // Under-trading: loosen, capped at 50% looser
            self.state.adjustment_factor = (1.0 - (0.5 - trade_rate)).max(0.5);
        } else if trade_rate > 1.5 {
            // Over-trading: tighten, capped at 2x stricter
            self.state.adjustment_factor = (1.0 + (trade_rate - 1.5)).min(2.0);
        } else {
            // On target: smooth back toward baseline to avoid oscillation
            self.state.adjustment_factor = 0.9 * self.state.adjustment_factor + 0.1;
        }

        self.state.is_nighttime = is_nighttime(now);
        let night_multiplier = if self.state.is_nighttime { 2.0 } else { 1.0 };

        let drawdown_multiplier = if self.session.max_drawdown_pct > 0.05 {
            1.0 + self.session.max_drawdown_pct * 2.0
        } else {
            1.0
        };

        let total = self.state.adjustment_factor * night_multiplier * drawdown_multiplier;
        self.state.min_ev_frac = self.config.base_min_ev_frac * total;
        self.state.min_confidence = (self.config.base_min_confidence * total).min(0.8);
    }

    /// Record an executed trade. PnL is unknown until the market resolves,
    /// so only the cadence counter moves here.
    pub fn record_execution(&mut self) {
        self.session.trades_executed += 1;
    }

    /// Record the settlement of a previously executed trade
    pub fn record_settlement(&mut self, pnl: f64) {
        self.session.total_pnl += pnl;
        if pnl > 0.0 {
            self.session.trades_profitable += 1;
        }
    }

    pub fn thresholds(&self) -> &ThresholdState {
        &self.state
    }

    pub fn session(&self) -> &TradingSession {
        &self.session
    }

    pub fn kill_switch_active(&self) -> bool {
        self.kill_switch_active
    }

    pub fn kill_switch_reason(&self) -> Option<&str> {
        self.kill_switch_reason.as_deref()
    }

    /// Manual kill-switch reset (use with caution)
    pub fn reset_kill_switch(&mut self) {
        self.kill_switch_active = false;
        self.kill_switch_reason = None;
        info!("kill switch manually reset");
    }

    /// Export state for persistence
    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            state: self.state.clone(),
            session: self.session.clone(),
            kill_switch_active: self.kill_switch_active,
            kill_switch_reason: self.kill_switch_reason.clone(),
        }
    }

    /// Restore persisted state. A stale session is cleared on the next
    /// `can_trade`/`update_thresholds` call via the day-rollover check.
    pub fn restore(&mut self, snapshot: ControllerSnapshot) {
        self.state = snapshot.state;
        self.session = snapshot.session;
        self.kill_switch_active = snapshot.kill_switch_active;
        self.kill_switch_reason = snapshot.kill_switch_reason;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap()
    }

    fn late_night() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 23, 30, 0).unwrap()
    }

    fn make_controller(now: DateTime<Utc>) -> ThresholdController {
        ThresholdController::new(ThresholdConfig::default(), now)
    }

    #[test]
    fn test_kill_switch_latches_on_daily_loss() {
        let mut ctl = make_controller(noon());
        // -12% against a 10% limit
        ctl.update_thresholds(noon(), 880.0, 1000.0);
        assert!(ctl.kill_switch_active());

        let (ok, reason) = ctl.can_trade(noon());
        assert!(!ok);
        assert!(reason.contains("Kill switch"));

        // Bankroll recovery within the same day does NOT clear the latch
        ctl.update_thresholds(noon() + Duration::hours(2), 1005.0, 1000.0);
        let (ok, _) = ctl.can_trade(noon() + Duration::hours(2));
        assert!(!ok, "kill switch must stay latched for the rest of the day");
    }

    #[test]
    fn test_kill_switch_clears_on_day_rollover() {
        let mut ctl = make_controller(noon());
        ctl.update_thresholds(noon(), 880.0, 1000.0);
        assert!(ctl.kill_switch_active());

        let tomorrow = noon() + Duration::days(1);
        let (ok, _) = ctl.can_trade(tomorrow);
        assert!(ok);
        assert!(!ctl.kill_switch_active());
        assert_eq!(ctl.session().trades_executed, 0);
    }

    #[test]
    fn test_manual_reset_clears_latch() {
        let mut ctl = make_controller(noon());
        ctl.update_thresholds(noon(), 880.0, 1000.0);
        assert!(ctl.kill_switch_active());
        ctl.reset_kill_switch();
        let (ok, _) = ctl.can_trade(noon());
        assert!(ok);
    }

    #[test]
    fn test_nighttime_doubles_thresholds() {
        let mut day = make_controller(noon());
        let mut night = make_controller(noon());

        day.update_thresholds(noon(), 1000.0, 1000.0);
        night.update_thresholds(late_night(), 1000.0, 1000.0);

        assert!(!day.thresholds().is_nighttime);
        assert!(night.thresholds().is_nighttime);
        assert!(
            (night.thresholds().min_ev_frac - 2.0 * day.thresholds().min_ev_frac).abs() < 1e-12
        );
        assert!(
            (night.thresholds().min_confidence - 2.0 * day.thresholds().min_confidence).abs()
                < 1e-12
        );
    }

    #[test]
    fn test_under_trading_loosens() {
        let mut ctl = make_controller(noon());
        // No trades by noon against a 15/day target
        ctl.update_thresholds(noon(), 1000.0, 1000.0);
        assert!((ctl.thresholds().adjustment_factor - 0.5).abs() < 1e-9);
        assert!(ctl.thresholds().min_ev_frac < 0.001);
    }

    #[test]
    fn test_over_trading_tightens() {
        let mut ctl = make_controller(noon());
        for _ in 0..20 {
            ctl.record_execution();
        }
        // 20 trades by noon vs 7.5 expected: rate ~2.67 -> capped at 2.0
        ctl.update_thresholds(noon(), 1020.0, 1000.0);
        assert!((ctl.thresholds().adjustment_factor - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_on_target_smooths_toward_one() {
        let mut ctl = make_controller(noon());
        // Zero trades by noon forces the factor down to 0.5
        ctl.update_thresholds(noon(), 1000.0, 1000.0);
        assert!((ctl.thresholds().adjustment_factor - 0.5).abs() < 1e-9);

        // Back on target: the factor eases 90/10 toward 1.0
        for _ in 0..8 {
            ctl.record_execution();
        }
        ctl.update_thresholds(noon(), 1000.0, 1000.0);
        let eased = ctl.thresholds().adjustment_factor;
        assert!((eased - 0.55).abs() < 1e-9, "expected 0.55, got {}", eased);
    }

    #[test]
    fn test_drawdown_multiplier_applies_past_five_percent() {
        let mut ctl = make_controller(noon());
        ctl.update_thresholds(noon(), 1100.0, 1000.0);
        let baseline = ctl.thresholds().min_ev_frac;
        // Peak 1100 -> 1000 is a 9.1% drawdown
        ctl.update_thresholds(noon(), 1000.0, 1000.0);
        assert!(ctl.session().max_drawdown_pct > 0.05);
        assert!(ctl.thresholds().min_ev_frac > baseline);
    }

    #[test]
    fn test_daily_trade_cap() {
        let mut ctl = make_controller(noon());
        for _ in 0..25 {
            ctl.record_execution();
        }
        let (ok, reason) = ctl.can_trade(noon());
        assert!(!ok);
        assert!(reason.contains("limit"));
    }

    #[test]
    fn test_min_confidence_capped() {
        let mut ctl = make_controller(late_night());
        // Heavy over-trading at night: 0.25 * 2.0 (adj) * 2.0 (night)
        // would be 1.0, capped at 0.8
        for _ in 0..40 {
            ctl.record_execution();
        }
        ctl.update_thresholds(late_night(), 1100.0, 1000.0);
        assert!((ctl.thresholds().adjustment_factor - 2.0).abs() < 1e-9);
        assert!((ctl.thresholds().min_confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_settlement_updates_pnl_counters() {
        let mut ctl = make_controller(noon());
        ctl.record_execution();
        ctl.record_execution();
        assert_eq!(ctl.session().trades_executed, 2);
        assert_eq!(ctl.session().trades_profitable, 0);

        ctl.record_settlement(5.0);
        ctl.record_settlement(-2.0);
        assert_eq!(ctl.session().trades_executed, 2);
        assert_eq!(ctl.session().trades_profitable, 1);
        assert!((ctl.session().total_pnl - 3.0).abs() < 1e-9);
        assert!((ctl.session().win_rate() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let mut ctl = make_controller(noon());
        ctl.record_execution();
        ctl.record_execution();
        ctl.record_settlement(5.0);
        ctl.record_settlement(-2.0);
        ctl.update_thresholds(noon(), 1003.0, 1000.0);
        let snap = ctl.snapshot();

        let mut restored = make_controller(noon());
        restored.restore(snap);
        assert_eq!(restored.session().trades_executed, 2);
        assert_eq!(restored.session().trades_profitable, 1);
        assert!((restored.session().total_pnl - 3.0).abs() < 1e-9);
    }
}
