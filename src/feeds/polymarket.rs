//! Polymarket REST collaborators
//!
//! Two read-only clients:
//! - Data API `/trades` for recent whale activity
//! - Gamma API `/markets` for active crypto up/down market quotes
//!
//! Both are single-attempt fetches; callers treat an error as "no data this
//! cycle".

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use super::{FeedError, ObservationSource, QuoteSource};
use crate::types::{Coin, MarketCategory, MarketQuote, SignalObservation};

const CRYPTO_KEYWORDS: [&str; 8] = [
    "btc", "bitcoin", "eth", "ethereum", "sol", "solana", "xrp", "ripple",
];

/// Signed directional magnitude for a trade: buy-yes and sell-no are
/// bullish, buy-no and sell-yes are bearish; magnitude is contract size.
pub fn trade_direction(side: &str, outcome: &str, size: f64) -> f64 {
    let base = if side.eq_ignore_ascii_case("BUY") {
        1.0
    } else {
        -1.0
    };
    let flip = matches!(outcome.to_uppercase().as_str(), "NO" | "DOWN");
    if flip {
        -base * size
    } else {
        base * size
    }
}

/// One trade row from the Data API
#[derive(Debug, Deserialize)]
struct DataApiTrade {
    #[serde(rename = "proxyWallet", default)]
    proxy_wallet: String,
    #[serde(rename = "conditionId", default)]
    condition_id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    outcome: String,
    #[serde(default)]
    side: String,
    #[serde(default)]
    size: f64,
    #[serde(default)]
    price: f64,
    #[serde(default)]
    timestamp: i64,
}

/// Data API client collecting whale trade observations
pub struct PolymarketTradeFeed {
    client: Client,
    base_url: String,
    lookback_hours: i64,
    min_trade_usd: f64,
    fetch_limit: usize,
}

impl PolymarketTradeFeed {
    pub fn new(base_url: &str, lookback_hours: i64, min_trade_usd: f64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            lookback_hours,
            min_trade_usd,
            fetch_limit: 500,
        }
    }

    fn parse_trade(&self, item: DataApiTrade, now: DateTime<Utc>) -> Option<SignalObservation> {
        if item.proxy_wallet.is_empty() || item.condition_id.is_empty() {
            return None;
        }

        let question = item.title.to_lowercase();
        if !CRYPTO_KEYWORDS.iter().any(|k| question.contains(k)) {
            return None;
        }

        let usd_value = item.size * item.price;
        if usd_value < self.min_trade_usd {
            return None;
        }

        let timestamp = Utc.timestamp_opt(item.timestamp, 0).single()?;
        let age_hours = (now - timestamp).num_seconds() as f64 / 3600.0;
        if age_hours < 0.0 || age_hours > self.lookback_hours as f64 {
            return None;
        }

        Some(SignalObservation {
            wallet_id: item.proxy_wallet.to_lowercase(),
            market_id: item.condition_id,
            category: MarketCategory::detect(&item.title),
            market_question: item.title,
            direction: trade_direction(&item.side, &item.outcome, item.size),
            usd_value,
            timestamp,
        })
    }
}

#[async_trait]
impl ObservationSource for PolymarketTradeFeed {
    async fn collect(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<HashMap<String, Vec<SignalObservation>>, FeedError> {
        let url = format!("{}/trades", self.base_url);
        let items: Vec<DataApiTrade> = self
            .client
            .get(&url)
            .query(&[("limit", self.fetch_limit)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut by_market: HashMap<String, Vec<SignalObservation>> = HashMap::new();
        let mut kept = 0usize;
        for item in items {
            if let Some(obs) = self.parse_trade(item, now) {
                by_market.entry(obs.market_id.clone()).or_default().push(obs);
                kept += 1;
            }
        }

        info!(markets = by_market.len(), observations = kept, "collected whale trades");
        Ok(by_market)
    }
}

/// One market row from the Gamma API
#[derive(Debug, Deserialize)]
struct GammaMarket {
    #[serde(rename = "conditionId", default)]
    condition_id: String,
    #[serde(default)]
    question: String,
    /// JSON-encoded array of outcome prices, e.g. "[\"0.55\", \"0.45\"]"
    #[serde(rename = "outcomePrices", default)]
    outcome_prices: Option<String>,
    #[serde(rename = "liquidityNum", default)]
    liquidity_num: Option<f64>,
    #[serde(rename = "bestBid", default)]
    best_bid: Option<f64>,
    #[serde(rename = "bestAsk", default)]
    best_ask: Option<f64>,
    #[serde(default)]
    active: bool,
    #[serde(default)]
    closed: bool,
}

/// Gamma API client discovering active crypto up/down markets
pub struct GammaMarketFeed {
    client: Client,
    base_url: String,
}

impl GammaMarketFeed {
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn parse_market(market: GammaMarket) -> Option<MarketQuote> {
        if !market.active || market.closed || market.condition_id.is_empty() {
            return None;
        }
        // Only short-horizon crypto markets
        if MarketCategory::detect(&market.question) != MarketCategory::Crypto15Min {
            return None;
        }

        let prices: Vec<f64> = serde_json::from_str::<Vec<String>>(
            market.outcome_prices.as_deref().unwrap_or("[]"),
        )
        .ok()?
        .iter()
        .filter_map(|p| p.parse::<f64>().ok())
        .collect();
        if prices.len() < 2 {
            return None;
        }

        let spread = match (market.best_bid, market.best_ask) {
            (Some(bid), Some(ask)) if ask > bid => ask - bid,
            _ => 0.02,
        };

        let coin = market
            .question
            .split_whitespace()
            .find_map(Coin::from_str);

        Some(MarketQuote {
            market_id: market.condition_id,
            coin,
            yes_price: prices[0],
            no_price: prices[1],
            liquidity: market.liquidity_num.unwrap_or(0.0),
            spread,
            market_question: market.question,
        })
    }
}

#[async_trait]
impl QuoteSource for GammaMarketFeed {
    async fn quotes(&mut self) -> Result<Vec<MarketQuote>, FeedError> {
        let url = format!("{}/markets", self.base_url);
        let markets: Vec<GammaMarket> = self
            .client
            .get(&url)
            .query(&[
                ("active", "true"),
                ("closed", "false"),
                ("limit", "500"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let quotes: Vec<MarketQuote> = markets
            .into_iter()
            .filter_map(Self::parse_market)
            .collect();
        debug!(markets = quotes.len(), "fetched crypto market quotes");
        Ok(quotes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trade_direction_signs() {
        assert_eq!(trade_direction("BUY", "Yes", 100.0), 100.0);
        assert_eq!(trade_direction("SELL", "Yes", 100.0), -100.0);
        assert_eq!(trade_direction("BUY", "No", 100.0), -100.0);
        assert_eq!(trade_direction("SELL", "No", 100.0), 100.0);
        assert_eq!(trade_direction("BUY", "Up", 50.0), 50.0);
        assert_eq!(trade_direction("buy", "Down", 50.0), -50.0);
    }

    #[test]
    fn test_parse_trade_filters() {
        let feed = PolymarketTradeFeed::new("https://example.com", 24, 100.0);
        let now = Utc.timestamp_opt(1_750_000_000, 0).single().unwrap();

        // Non-crypto market is skipped
        let politics = DataApiTrade {
            proxy_wallet: "0xAAA".to_string(),
            condition_id: "cond-1".to_string(),
            title: "Presidential election winner".to_string(),
            outcome: "Yes".to_string(),
            side: "BUY".to_string(),
            size: 1000.0,
            price: 0.5,
            timestamp: now.timestamp() - 600,
        };
        assert!(feed.parse_trade(politics, now).is_none());

        // Small trade is skipped
        let small = DataApiTrade {
            proxy_wallet: "0xAAA".to_string(),
            condition_id: "cond-2".to_string(),
            title: "Bitcoin Up or Down - 15 min".to_string(),
            outcome: "Up".to_string(),
            side: "BUY".to_string(),
            size: 10.0,
            price: 0.5,
            timestamp: now.timestamp() - 600,
        };
        assert!(feed.parse_trade(small, now).is_none());

        // Fresh crypto trade survives with a lowercased wallet
        let good = DataApiTrade {
            proxy_wallet: "0xAbC".to_string(),
            condition_id: "cond-3".to_string(),
            title: "Bitcoin Up or Down - 15 min".to_string(),
            outcome: "Down".to_string(),
            side: "BUY".to_string(),
            size: 500.0,
            price: 0.5,
            timestamp: now.timestamp() - 600,
        };
        let obs = feed.parse_trade(good, now).expect("observation");
        assert_eq!(obs.wallet_id, "0xabc");
        assert!(obs.direction < 0.0);
        assert_eq!(obs.category, MarketCategory::Crypto15Min);
    }

    #[test]
    fn test_parse_market_quote() {
        let market = GammaMarket {
            condition_id: "cond-1".to_string(),
            question: "BTC Up or Down - 7:30PM ET (15 min)".to_string(),
            outcome_prices: Some("[\"0.55\", \"0.45\"]".to_string()),
            liquidity_num: Some(5000.0),
            best_bid: Some(0.54),
            best_ask: Some(0.56),
            active: true,
            closed: false,
        };
        let quote = GammaMarketFeed::parse_market(market).expect("quote");
        assert_eq!(quote.coin, Some(Coin::BTC));
        assert!((quote.yes_price - 0.55).abs() < 1e-9);
        assert!((quote.spread - 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_parse_market_rejects_closed_and_noncrypto() {
        let closed = GammaMarket {
            condition_id: "cond-1".to_string(),
            question: "BTC Up or Down - 15 min".to_string(),
            outcome_prices: Some("[\"0.5\", \"0.5\"]".to_string()),
            liquidity_num: None,
            best_bid: None,
            best_ask: None,
            active: true,
            closed: true,
        };
        assert!(GammaMarketFeed::parse_market(closed).is_none());

        let politics = GammaMarket {
            condition_id: "cond-2".to_string(),
            question: "Election winner 2026".to_string(),
            outcome_prices: Some("[\"0.5\", \"0.5\"]".to_string()),
            liquidity_num: None,
            best_bid: None,
            best_ask: None,
            active: true,
            closed: false,
        };
        assert!(GammaMarketFeed::parse_market(politics).is_none());
    }
}
