//! Core types used throughout WhaleBot
//!
//! Defines common data structures for whale observations, market quotes,
//! momentum readings and trade requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported trading coins (15-minute up/down markets)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Coin {
    BTC,
    ETH,
    SOL,
    XRP,
}

impl Default for Coin {
    fn default() -> Self {
        Coin::BTC
    }
}

impl Coin {
    /// CoinGecko coin id used by the price feed
    pub fn gecko_id(&self) -> &'static str {
        match self {
            Coin::BTC => "bitcoin",
            Coin::ETH => "ethereum",
            Coin::SOL => "solana",
            Coin::XRP => "ripple",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "BTC" | "BITCOIN" => Some(Coin::BTC),
            "ETH" | "ETHEREUM" => Some(Coin::ETH),
            "SOL" | "SOLANA" => Some(Coin::SOL),
            "XRP" | "RIPPLE" => Some(Coin::XRP),
            _ => None,
        }
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Coin::BTC => write!(f, "BTC"),
            Coin::ETH => write!(f, "ETH"),
            Coin::SOL => write!(f, "SOL"),
            Coin::XRP => write!(f, "XRP"),
        }
    }
}

/// Market category for per-category accuracy tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketCategory {
    Crypto15Min,
    CryptoDaily,
    Politics,
    Sports,
    Other,
}

impl Default for MarketCategory {
    fn default() -> Self {
        MarketCategory::Other
    }
}

impl MarketCategory {
    /// All categories, in a stable order
    pub const ALL: [MarketCategory; 5] = [
        MarketCategory::Crypto15Min,
        MarketCategory::CryptoDaily,
        MarketCategory::Politics,
        MarketCategory::Sports,
        MarketCategory::Other,
    ];

    /// Classify a market question by keyword
    pub fn detect(question: &str) -> Self {
        let q = question.to_lowercase();

        let is_crypto = ["btc", "eth", "sol", "xrp", "bitcoin", "ethereum"]
            .iter()
            .any(|k| q.contains(k));
        if is_crypto {
            if ["15", "minute", "min", "hour"].iter().any(|k| q.contains(k)) {
                return MarketCategory::Crypto15Min;
            }
            return MarketCategory::CryptoDaily;
        }

        if ["election", "president", "congress", "senate"]
            .iter()
            .any(|k| q.contains(k))
        {
            return MarketCategory::Politics;
        }

        if ["nfl", "nba", "mlb", "game", "match", "score"]
            .iter()
            .any(|k| q.contains(k))
        {
            return MarketCategory::Sports;
        }

        MarketCategory::Other
    }
}

impl fmt::Display for MarketCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketCategory::Crypto15Min => write!(f, "crypto_15min"),
            MarketCategory::CryptoDaily => write!(f, "crypto_daily"),
            MarketCategory::Politics => write!(f, "politics"),
            MarketCategory::Sports => write!(f, "sports"),
            MarketCategory::Other => write!(f, "other"),
        }
    }
}

/// Which token of a binary market to buy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    BuyYes,
    BuyNo,
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSide::BuyYes => write!(f, "BUY_YES"),
            TradeSide::BuyNo => write!(f, "BUY_NO"),
        }
    }
}

/// A single directional observation derived from one whale trade.
///
/// `direction` is a signed magnitude: the sign encodes bullish/bearish
/// (buy-yes / sell-no is positive), the magnitude encodes size in contracts.
/// It is deliberately NOT unit-normalized so bigger trades carry more weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalObservation {
    /// Wallet address (lowercase)
    pub wallet_id: String,
    /// Market identifier (condition id)
    pub market_id: String,
    /// Market question text
    pub market_question: String,
    /// Category of the market
    pub category: MarketCategory,
    /// Signed directional magnitude
    pub direction: f64,
    /// Trade value in USD
    pub usd_value: f64,
    /// When the trade happened
    pub timestamp: DateTime<Utc>,
}

/// Momentum observation for one coin from the price feed
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MomentumObservation {
    /// Direction in [-1, 1]: positive = price moving up
    pub signal: f64,
    /// How informative the move is, in [0, 1] (a 2% move over the lookback
    /// saturates to 1.0)
    pub strength: f64,
}

impl Default for MomentumObservation {
    fn default() -> Self {
        // Absent momentum: pure prior
        Self {
            signal: 0.0,
            strength: 0.0,
        }
    }
}

/// Market quote snapshot from the orderbook collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketQuote {
    /// Market identifier (condition id)
    pub market_id: String,
    /// Market question text
    pub market_question: String,
    /// Coin this market is about, if a crypto market
    pub coin: Option<Coin>,
    /// YES token price (= market-implied probability), 0-1
    pub yes_price: f64,
    /// NO token price, 0-1
    pub no_price: f64,
    /// Available liquidity in USD
    pub liquidity: f64,
    /// Bid-ask spread (absolute, in probability units)
    pub spread: f64,
}

/// Official outcome of a resolved market, reported by the market-data
/// collaborator once settlement is known
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketResolution {
    /// Market identifier (condition id)
    pub market_id: String,
    /// True when the YES/UP outcome won
    pub yes_won: bool,
}

/// Accepted trade request forwarded to the order executor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRequest {
    /// Unique request id
    pub id: String,
    /// Market identifier
    pub market_id: String,
    /// Which token to buy
    pub side: TradeSide,
    /// Size in USD
    pub size: f64,
    /// Limit price (token price, 0-1)
    pub price: f64,
    /// When the request was created
    pub ts: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_detection() {
        assert_eq!(
            MarketCategory::detect("Bitcoin Up or Down - 7:30PM ET (15 min)"),
            MarketCategory::Crypto15Min
        );
        assert_eq!(
            MarketCategory::detect("Will ETH close above $4000 today?"),
            MarketCategory::CryptoDaily
        );
        assert_eq!(
            MarketCategory::detect("Who wins the presidential election?"),
            MarketCategory::Politics
        );
        assert_eq!(
            MarketCategory::detect("NBA finals game 7 winner"),
            MarketCategory::Sports
        );
        assert_eq!(
            MarketCategory::detect("Will it rain in London?"),
            MarketCategory::Other
        );
    }

    #[test]
    fn test_coin_parse() {
        assert_eq!(Coin::from_str("btc"), Some(Coin::BTC));
        assert_eq!(Coin::from_str("ripple"), Some(Coin::XRP));
        assert_eq!(Coin::from_str("doge"), None);
    }
}
