//! Persistence Module
//!
//! Two concerns, both file-based:
//! - JSON state store for whale statistics and threshold/session state,
//!   reloaded at startup and rewritten at the end of each cycle
//! - append-only CSV logs: one row per evaluated candidate (the audit trail
//!   rejection-rate reports key off) and one row per executed trade
//!
//! A missing or corrupt state file is never fatal: the engine logs a
//! warning and proceeds with defaults.

use anyhow::{Context, Result};
use chrono::Utc;
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock as AsyncRwLock;
use tracing::{info, warn};

use crate::ev::TradeOpportunity;
use crate::signals::AggregatedSignal;
use crate::thresholds::ControllerSnapshot;
use crate::types::TradeRequest;
use crate::whales::WalletPerformance;

const WHALE_STATS_FILE: &str = "whale_stats.json";
const THRESHOLDS_FILE: &str = "thresholds.json";

/// Full decision record for one evaluated market candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub timestamp: i64,
    pub market_id: String,
    pub market_question: String,
    pub category: String,
    // Signal
    pub direction: f64,
    pub confidence: f64,
    pub whale_count: usize,
    pub ci_low: f64,
    pub ci_high: f64,
    // Probabilities
    pub p_model: f64,
    pub p_market: f64,
    pub edge: f64,
    // Chosen side and payoff
    pub side: String,
    pub entry_price: f64,
    pub payout_if_win: f64,
    pub cost_if_lose: f64,
    // Costs and EV
    pub ev_gross: f64,
    pub fees_est: f64,
    pub slippage_est: f64,
    pub ev_net: f64,
    pub ev_per_bankroll: f64,
    // Sizing
    pub kelly_fraction: f64,
    pub size_usd: f64,
    pub bankroll: f64,
    // Decision
    pub final_decision: String,
    /// Pipe-separated rejection reasons, empty when the candidate passed
    pub rejection_reasons: String,
}

impl CandidateRecord {
    pub fn from_evaluation(signal: &AggregatedSignal, opp: &TradeOpportunity) -> Self {
        let reasons: Vec<String> = opp
            .rejection_reasons
            .iter()
            .map(|r| r.to_string())
            .collect();
        Self {
            timestamp: opp.ts.timestamp_millis(),
            market_id: opp.market_id.clone(),
            market_question: opp.market_question.clone(),
            category: signal.category.to_string(),
            direction: signal.direction,
            confidence: opp.confidence,
            whale_count: signal.whale_count,
            ci_low: signal.lower_ci,
            ci_high: signal.upper_ci,
            p_model: opp.p_model,
            p_market: opp.p_market,
            edge: opp.edge(),
            side: opp.side.to_string(),
            entry_price: opp.entry_price,
            payout_if_win: opp.payout_if_win,
            cost_if_lose: opp.cost_if_lose,
            ev_gross: opp.ev_gross,
            fees_est: opp.fees_est,
            slippage_est: opp.slippage_est,
            ev_net: opp.ev_net,
            ev_per_bankroll: opp.ev_per_bankroll(),
            kelly_fraction: opp.kelly_fraction,
            size_usd: opp.suggested_size,
            bankroll: opp.bankroll,
            final_decision: if opp.passes { "TRADE" } else { "REJECT" }.to_string(),
            rejection_reasons: reasons.join("|"),
        }
    }
}

/// Executed trade record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeLogRecord {
    pub timestamp: i64,
    pub trade_id: String,
    pub market_id: String,
    pub side: String,
    pub size: f64,
    pub price: f64,
    pub confidence: f64,
    pub ev_net: f64,
}

impl TradeLogRecord {
    pub fn from_request(request: &TradeRequest, confidence: f64, ev_net: f64) -> Self {
        Self {
            timestamp: request.ts.timestamp_millis(),
            trade_id: request.id.clone(),
            market_id: request.market_id.clone(),
            side: request.side.to_string(),
            size: request.size,
            price: request.price,
            confidence,
            ev_net,
        }
    }
}

/// Count of rejections per reason over a candidate log
#[derive(Debug, Clone, Default)]
pub struct RejectionBreakdown {
    pub total_candidates: u64,
    pub trades: u64,
    pub rejects: u64,
    pub by_reason: HashMap<String, u64>,
}

/// JSON state store for cross-session state
pub struct StateStore {
    data_dir: PathBuf,
}

impl StateStore {
    pub fn new(data_dir: &str) -> Result<Self> {
        let data_dir = PathBuf::from(data_dir);
        fs::create_dir_all(&data_dir).context("Failed to create data directory")?;
        Ok(Self { data_dir })
    }

    /// Load persisted whale statistics; empty map on missing/corrupt file
    pub fn load_wallet_stats(&self) -> HashMap<String, WalletPerformance> {
        let path = self.data_dir.join(WHALE_STATS_FILE);
        if !path.exists() {
            return HashMap::new();
        }
        match fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|s| serde_json::from_str(&s).map_err(anyhow::Error::from))
        {
            Ok(stats) => {
                let stats: HashMap<String, WalletPerformance> = stats;
                info!(wallets = stats.len(), "loaded whale stats");
                stats
            }
            Err(e) => {
                warn!("Failed to load whale stats, starting fresh: {e:#}");
                HashMap::new()
            }
        }
    }

    pub fn save_wallet_stats(&self, stats: &HashMap<String, WalletPerformance>) -> Result<()> {
        let path = self.data_dir.join(WHALE_STATS_FILE);
        let json = serde_json::to_string_pretty(stats)?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Load persisted controller state; None on missing/corrupt file
    pub fn load_controller(&self) -> Option<ControllerSnapshot> {
        let path = self.data_dir.join(THRESHOLDS_FILE);
        if !path.exists() {
            return None;
        }
        match fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|s| serde_json::from_str(&s).map_err(anyhow::Error::from))
        {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!("Failed to load threshold state, starting fresh: {e:#}");
                None
            }
        }
    }

    pub fn save_controller(&self, snapshot: &ControllerSnapshot) -> Result<()> {
        let path = self.data_dir.join(THRESHOLDS_FILE);
        let json = serde_json::to_string_pretty(snapshot)?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

/// CSV diagnostic logger: candidates and executed trades, dated files
pub struct CsvLogger {
    candidates_dir: PathBuf,
    candidate_writer: Arc<AsyncRwLock<csv::Writer<std::fs::File>>>,
    trade_writer: Arc<AsyncRwLock<csv::Writer<std::fs::File>>>,
}

impl CsvLogger {
    pub fn new(data_dir: &str) -> Result<Self> {
        let data_dir = PathBuf::from(data_dir);
        let candidates_dir = data_dir.join("candidates");
        let trades_dir = data_dir.join("trades");
        fs::create_dir_all(&candidates_dir)?;
        fs::create_dir_all(&trades_dir)?;

        let today = Utc::now().format("%Y-%m-%d");
        let candidate_writer =
            Self::create_writer(&candidates_dir, &format!("candidates_{}.csv", today))?;
        let trade_writer = Self::create_writer(&trades_dir, &format!("trades_{}.csv", today))?;

        Ok(Self {
            candidates_dir,
            candidate_writer: Arc::new(AsyncRwLock::new(candidate_writer)),
            trade_writer: Arc::new(AsyncRwLock::new(trade_writer)),
        })
    }

    fn create_writer(dir: &Path, filename: &str) -> Result<csv::Writer<std::fs::File>> {
        let path = dir.join(filename);
        let file_has_data =
            path.exists() && fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context("Failed to open CSV file")?;

        let writer = WriterBuilder::new()
            .has_headers(!file_has_data)
            .from_writer(file);

        Ok(writer)
    }

    /// Log one evaluated candidate, trade or not
    pub async fn save_candidate(&self, record: CandidateRecord) -> Result<()> {
        let mut writer = self.candidate_writer.write().await;
        writer
            .serialize(&record)
            .context("Failed to write candidate record")?;
        writer.flush().context("Failed to flush candidate writer")?;
        Ok(())
    }

    /// Log one executed trade
    pub async fn save_trade(&self, record: TradeLogRecord) -> Result<()> {
        let mut writer = self.trade_writer.write().await;
        writer
            .serialize(&record)
            .context("Failed to write trade record")?;
        writer.flush().context("Failed to flush trade writer")?;
        Ok(())
    }

    /// Rejection breakdown over today's candidate log
    pub fn rejection_breakdown(&self) -> Result<RejectionBreakdown> {
        let today = Utc::now().format("%Y-%m-%d");
        let path = self
            .candidates_dir
            .join(format!("candidates_{}.csv", today));

        let mut breakdown = RejectionBreakdown::default();
        if !path.exists() {
            return Ok(breakdown);
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .from_path(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;

        for row in reader.deserialize::<CandidateRecord>() {
            let record = match row {
                Ok(r) => r,
                Err(e) => {
                    warn!("Skipping malformed candidate row: {e}");
                    continue;
                }
            };
            breakdown.total_candidates += 1;
            if record.final_decision == "TRADE" {
                breakdown.trades += 1;
            } else {
                breakdown.rejects += 1;
                for reason in record.rejection_reasons.split('|') {
                    if !reason.is_empty() {
                        *breakdown.by_reason.entry(reason.to_string()).or_insert(0) += 1;
                    }
                }
            }
        }
        Ok(breakdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MarketCategory;

    fn make_perf(id: &str, wins: u64) -> WalletPerformance {
        let mut perf = WalletPerformance::new(id);
        for _ in 0..wins {
            perf.record_outcome(true, MarketCategory::Crypto15Min);
        }
        perf
    }

    #[test]
    fn test_wallet_stats_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().to_str().unwrap()).unwrap();

        let mut stats = HashMap::new();
        stats.insert("0xaaa".to_string(), make_perf("0xaaa", 3));
        store.save_wallet_stats(&stats).unwrap();

        let loaded = store.load_wallet_stats();
        assert_eq!(loaded.len(), 1);
        let perf = &loaded["0xaaa"];
        assert_eq!(perf.wins, 3);
        assert_eq!(perf.recent_outcomes.len(), 3);
    }

    #[test]
    fn test_corrupt_state_degrades_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().to_str().unwrap()).unwrap();

        fs::write(dir.path().join(WHALE_STATS_FILE), "{not json").unwrap();
        fs::write(dir.path().join(THRESHOLDS_FILE), "also not json").unwrap();

        assert!(store.load_wallet_stats().is_empty());
        assert!(store.load_controller().is_none());
    }

    #[test]
    fn test_missing_state_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().to_str().unwrap()).unwrap();
        assert!(store.load_wallet_stats().is_empty());
        assert!(store.load_controller().is_none());
    }

    #[tokio::test]
    async fn test_candidate_log_and_breakdown() {
        let dir = tempfile::tempdir().unwrap();
        let logger = CsvLogger::new(dir.path().to_str().unwrap()).unwrap();

        let now = Utc::now();
        let mut record = CandidateRecord {
            timestamp: now.timestamp_millis(),
            market_id: "cond-1".to_string(),
            market_question: "BTC Up or Down".to_string(),
            category: "crypto_15min".to_string(),
            direction: 0.4,
            confidence: 0.7,
            whale_count: 3,
            ci_low: 0.1,
            ci_high: 0.7,
            p_model: 0.65,
            p_market: 0.55,
            edge: 0.10,
            side: "BUY_YES".to_string(),
            entry_price: 0.55,
            payout_if_win: 0.45,
            cost_if_lose: 0.55,
            ev_gross: 0.125,
            fees_est: 1.5,
            slippage_est: 0.75,
            ev_net: 5.25,
            ev_per_bankroll: 0.00525,
            kelly_fraction: 0.25,
            size_usd: 50.0,
            bankroll: 1000.0,
            final_decision: "TRADE".to_string(),
            rejection_reasons: String::new(),
        };
        logger.save_candidate(record.clone()).await.unwrap();

        record.final_decision = "REJECT".to_string();
        record.rejection_reasons = "EV_NET_NEGATIVE|LOW_LIQUIDITY".to_string();
        logger.save_candidate(record.clone()).await.unwrap();
        logger.save_candidate(record).await.unwrap();

        let breakdown = logger.rejection_breakdown().unwrap();
        assert_eq!(breakdown.total_candidates, 3);
        assert_eq!(breakdown.trades, 1);
        assert_eq!(breakdown.rejects, 2);
        assert_eq!(breakdown.by_reason["EV_NET_NEGATIVE"], 2);
        assert_eq!(breakdown.by_reason["LOW_LIQUIDITY"], 2);
    }

    #[test]
    fn test_controller_snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().to_str().unwrap()).unwrap();

        let snapshot = ControllerSnapshot {
            state: Default::default(),
            session: crate::thresholds::TradingSession::new("2026-01-15".to_string()),
            kill_switch_active: true,
            kill_switch_reason: Some("Daily loss limit exceeded (-12.0%)".to_string()),
        };
        store.save_controller(&snapshot).unwrap();

        let loaded = store.load_controller().unwrap();
        assert!(loaded.kill_switch_active);
        assert_eq!(loaded.session.date, "2026-01-15");
    }
}
