//! Order execution collaborators
//!
//! The engine hands a single accepted [`TradeRequest`] per cycle to an
//! executor. Real CLOB order placement lives outside this crate; bundled
//! here are the dry-run executor (log only) and a paper executor that
//! simulates fills against a virtual balance so the full decision loop can
//! run end-to-end without touching an exchange.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::info;

use crate::types::{TradeRequest, TradeSide};

/// Outcome of submitting a trade request
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub request_id: String,
    pub filled: bool,
    pub fill_price: f64,
}

/// Order submission seam between the decision core and the exchange
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    async fn execute(&mut self, request: &TradeRequest) -> Result<ExecutionReport>;

    /// Settle an open position for a resolved market. Executors that do not
    /// track positions report nothing.
    fn settle(&mut self, _market_id: &str, _yes_won: bool) -> Option<SettledTrade> {
        None
    }

    /// Executor-tracked bankroll, when it has one
    fn bankroll(&self) -> Option<f64> {
        None
    }
}

/// Logs accepted requests without filling anything
#[derive(Debug, Default)]
pub struct DryRunExecutor;

#[async_trait]
impl OrderExecutor for DryRunExecutor {
    async fn execute(&mut self, request: &TradeRequest) -> Result<ExecutionReport> {
        info!(
            market = %request.market_id,
            side = %request.side,
            size = request.size,
            price = request.price,
            "DRY RUN - order not placed"
        );
        Ok(ExecutionReport {
            request_id: request.id.clone(),
            filled: false,
            fill_price: request.price,
        })
    }
}

/// A simulated open position
#[derive(Debug, Clone)]
pub struct PaperPosition {
    pub market_id: String,
    pub side: TradeSide,
    /// Stake in USD
    pub size: f64,
    pub entry_price: f64,
}

/// A resolved simulated trade
#[derive(Debug, Clone)]
pub struct SettledTrade {
    pub market_id: String,
    pub side: TradeSide,
    pub size: f64,
    pub pnl: f64,
    pub won: bool,
}

/// Fills every request at its limit price against a virtual balance
#[derive(Debug)]
pub struct PaperExecutor {
    balance: f64,
    positions: HashMap<String, PaperPosition>,
}

impl PaperExecutor {
    pub fn new(starting_balance: f64) -> Self {
        Self {
            balance: starting_balance,
            positions: HashMap::new(),
        }
    }

    /// Free balance (stakes in open positions are locked)
    pub fn balance(&self) -> f64 {
        self.balance
    }

    /// Free balance plus locked stakes
    pub fn equity(&self) -> f64 {
        self.balance + self.positions.values().map(|p| p.size).sum::<f64>()
    }

    pub fn open_positions(&self) -> usize {
        self.positions.len()
    }

    pub fn has_position(&self, market_id: &str) -> bool {
        self.positions.contains_key(market_id)
    }

    /// Resolve a market: `yes_won` is the official outcome. Returns the
    /// settled trade when a position existed.
    pub fn resolve(&mut self, market_id: &str, yes_won: bool) -> Option<SettledTrade> {
        let position = self.positions.remove(market_id)?;
        let won = match position.side {
            TradeSide::BuyYes => yes_won,
            TradeSide::BuyNo => !yes_won,
        };

        // Binary token payoff: size/price contracts each worth $1 on a win
        let pnl = if won {
            let contracts = position.size / position.entry_price;
            self.balance += contracts;
            contracts - position.size
        } else {
            -position.size
        };

        info!(
            market = %market_id,
            side = %position.side,
            pnl,
            won,
            "paper position settled"
        );
        Some(SettledTrade {
            market_id: market_id.to_string(),
            side: position.side,
            size: position.size,
            pnl,
            won,
        })
    }
}

#[async_trait]
impl OrderExecutor for PaperExecutor {
    fn settle(&mut self, market_id: &str, yes_won: bool) -> Option<SettledTrade> {
        self.resolve(market_id, yes_won)
    }

    fn bankroll(&self) -> Option<f64> {
        Some(self.equity())
    }

    async fn execute(&mut self, request: &TradeRequest) -> Result<ExecutionReport> {
        if request.size > self.balance || request.price <= 0.0 {
            info!(
                market = %request.market_id,
                size = request.size,
                balance = self.balance,
                "paper fill rejected (insufficient balance)"
            );
            return Ok(ExecutionReport {
                request_id: request.id.clone(),
                filled: false,
                fill_price: request.price,
            });
        }

        self.balance -= request.size;
        self.positions.insert(
            request.market_id.clone(),
            PaperPosition {
                market_id: request.market_id.clone(),
                side: request.side,
                size: request.size,
                entry_price: request.price,
            },
        );

        info!(
            market = %request.market_id,
            side = %request.side,
            size = request.size,
            price = request.price,
            balance = self.balance,
            "paper fill"
        );
        Ok(ExecutionReport {
            request_id: request.id.clone(),
            filled: true,
            fill_price: request.price,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn make_request(market: &str, side: TradeSide, size: f64, price: f64) -> TradeRequest {
        TradeRequest {
            id: format!("req-{market}"),
            market_id: market.to_string(),
            side,
            size,
            price,
            ts: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_paper_fill_locks_stake() {
        let mut exec = PaperExecutor::new(1000.0);
        let report = exec
            .execute(&make_request("cond-1", TradeSide::BuyYes, 50.0, 0.55))
            .await
            .unwrap();
        assert!(report.filled);
        assert!((exec.balance() - 950.0).abs() < 1e-9);
        assert!((exec.equity() - 1000.0).abs() < 1e-9);
        assert!(exec.has_position("cond-1"));
    }

    #[tokio::test]
    async fn test_paper_win_pays_out() {
        let mut exec = PaperExecutor::new(1000.0);
        exec.execute(&make_request("cond-1", TradeSide::BuyYes, 55.0, 0.55))
            .await
            .unwrap();
        let settled = exec.resolve("cond-1", true).expect("settled");
        assert!(settled.won);
        // 100 contracts at $1 against a $55 stake
        assert!((settled.pnl - 45.0).abs() < 1e-9);
        assert!((exec.balance() - 1045.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_paper_loss_burns_stake() {
        let mut exec = PaperExecutor::new(1000.0);
        exec.execute(&make_request("cond-1", TradeSide::BuyNo, 40.0, 0.40))
            .await
            .unwrap();
        let settled = exec.resolve("cond-1", true).expect("settled");
        assert!(!settled.won);
        assert!((settled.pnl + 40.0).abs() < 1e-9);
        assert!((exec.balance() - 960.0).abs() < 1e-9);
        assert!(!exec.has_position("cond-1"));
    }

    #[tokio::test]
    async fn test_insufficient_balance_rejected() {
        let mut exec = PaperExecutor::new(10.0);
        let report = exec
            .execute(&make_request("cond-1", TradeSide::BuyYes, 50.0, 0.55))
            .await
            .unwrap();
        assert!(!report.filled);
        assert!((exec.balance() - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_dry_run_never_fills() {
        let mut exec = DryRunExecutor;
        let report = exec
            .execute(&make_request("cond-1", TradeSide::BuyYes, 50.0, 0.55))
            .await
            .unwrap();
        assert!(!report.filled);
    }
}
