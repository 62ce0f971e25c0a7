//! Data-ingestion collaborators
//!
//! The decision core consumes three external streams, each behind a trait so
//! tests and replay tooling can substitute fixtures:
//! - whale trade observations grouped by market
//! - market quotes (prices, liquidity, spread)
//! - price momentum per coin
//!
//! The bundled implementations are thin single-attempt REST clients; a
//! failed fetch is logged by the caller and the cycle degrades to whatever
//! data is available.

pub mod polymarket;
pub mod prices;

pub use polymarket::{GammaMarketFeed, PolymarketTradeFeed};
pub use prices::PriceMomentumFeed;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;

use crate::types::{Coin, MarketQuote, MomentumObservation, SignalObservation};

/// Errors from the ingestion collaborators
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// Supplies whale trade observations, grouped by market id
#[async_trait]
pub trait ObservationSource: Send + Sync {
    async fn collect(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<HashMap<String, Vec<SignalObservation>>, FeedError>;
}

/// Supplies current quotes for tradable markets
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn quotes(&mut self) -> Result<Vec<MarketQuote>, FeedError>;
}

/// Supplies a momentum observation per coin
#[async_trait]
pub trait MomentumSource: Send + Sync {
    async fn momentum(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<HashMap<Coin, MomentumObservation>, FeedError>;
}
