//! Crypto price momentum feed
//!
//! Polls CoinGecko spot prices and keeps a short rolling history per coin
//! so each cycle can read a momentum observation: signed direction scaled
//! so a 2% move over the lookback saturates both signal and strength.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use std::collections::{HashMap, VecDeque};
use std::time::Duration as StdDuration;
use tracing::debug;

use super::{FeedError, MomentumSource};
use crate::types::{Coin, MomentumObservation};

/// A 2% move over the lookback is treated as maximal momentum
const FULL_MOMENTUM_MOVE_PCT: f64 = 2.0;

/// How much history to retain per coin
const HISTORY_RETENTION_SECS: i64 = 15 * 60;

#[derive(Debug, Clone, Copy)]
struct PricePoint {
    price: f64,
    timestamp: DateTime<Utc>,
}

/// Rolling price history with momentum derivation
#[derive(Debug, Default)]
pub struct PriceHistory {
    points: VecDeque<PricePoint>,
}

impl PriceHistory {
    pub fn push(&mut self, price: f64, timestamp: DateTime<Utc>) {
        self.points.push_back(PricePoint { price, timestamp });
        let cutoff = timestamp - Duration::seconds(HISTORY_RETENTION_SECS);
        while let Some(front) = self.points.front() {
            if front.timestamp < cutoff {
                self.points.pop_front();
            } else {
                break;
            }
        }
    }

    /// Price closest to `lookback_secs` ago, within a 10s tolerance
    fn price_at(&self, now: DateTime<Utc>, lookback_secs: i64) -> Option<f64> {
        let target = now - Duration::seconds(lookback_secs);
        let mut closest: Option<(i64, f64)> = None;
        for point in &self.points {
            let diff = (point.timestamp - target).num_seconds().abs();
            if closest.map_or(true, |(best, _)| diff < best) {
                closest = Some((diff, point.price));
            }
        }
        match closest {
            Some((diff, price)) if diff <= 10 => Some(price),
            _ => None,
        }
    }

    /// Momentum over the lookback; None without enough history
    pub fn momentum(&self, now: DateTime<Utc>, lookback_secs: i64) -> Option<MomentumObservation> {
        let current = self.points.back()?.price;
        let past = self.price_at(now, lookback_secs)?;
        if past <= 0.0 {
            return None;
        }

        let change_pct = (current - past) / past * 100.0;
        let signal = (change_pct / FULL_MOMENTUM_MOVE_PCT).clamp(-1.0, 1.0);
        let strength = (change_pct.abs() / FULL_MOMENTUM_MOVE_PCT).min(1.0);

        Some(MomentumObservation { signal, strength })
    }
}

/// CoinGecko-backed momentum source
pub struct PriceMomentumFeed {
    client: Client,
    base_url: String,
    coins: Vec<Coin>,
    lookback_secs: i64,
    history: HashMap<Coin, PriceHistory>,
}

impl PriceMomentumFeed {
    pub fn new(base_url: &str, coins: Vec<Coin>, lookback_secs: i64) -> Self {
        let client = Client::builder()
            .timeout(StdDuration::from_secs(15))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            coins,
            lookback_secs,
            history: HashMap::new(),
        }
    }

    async fn poll_prices(&mut self, now: DateTime<Utc>) -> Result<(), FeedError> {
        let ids: Vec<&str> = self.coins.iter().map(|c| c.gecko_id()).collect();
        let url = format!("{}/simple/price", self.base_url);

        let response: HashMap<String, HashMap<String, f64>> = self
            .client
            .get(&url)
            .query(&[("ids", ids.join(",")), ("vs_currencies", "usd".to_string())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut any = false;
        for coin in &self.coins {
            if let Some(price) = response
                .get(coin.gecko_id())
                .and_then(|m| m.get("usd"))
                .copied()
            {
                self.history.entry(*coin).or_default().push(price, now);
                any = true;
            }
        }
        if !self.coins.is_empty() && !any {
            return Err(FeedError::Malformed(
                "price response contained none of the requested coins".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl MomentumSource for PriceMomentumFeed {
    async fn momentum(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<HashMap<Coin, MomentumObservation>, FeedError> {
        self.poll_prices(now).await?;

        let mut out = HashMap::new();
        for coin in &self.coins {
            if let Some(history) = self.history.get(coin) {
                if let Some(m) = history.momentum(now, self.lookback_secs) {
                    debug!(coin = %coin, signal = m.signal, strength = m.strength, "momentum");
                    out.insert(*coin, m);
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_momentum_requires_history() {
        let history = PriceHistory::default();
        assert!(history.momentum(fixed_now(), 60).is_none());

        let mut one_point = PriceHistory::default();
        one_point.push(50_000.0, fixed_now());
        // No sample near the lookback target
        assert!(one_point.momentum(fixed_now(), 60).is_none());
    }

    #[test]
    fn test_upward_move_yields_positive_signal() {
        let now = fixed_now();
        let mut history = PriceHistory::default();
        history.push(50_000.0, now - Duration::seconds(60));
        history.push(50_500.0, now);

        // +1% over 60s: half of the 2% saturation point
        let m = history.momentum(now, 60).expect("momentum");
        assert!((m.signal - 0.5).abs() < 1e-9);
        assert!((m.strength - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_large_move_saturates() {
        let now = fixed_now();
        let mut history = PriceHistory::default();
        history.push(50_000.0, now - Duration::seconds(60));
        history.push(47_000.0, now);

        let m = history.momentum(now, 60).expect("momentum");
        assert_eq!(m.signal, -1.0);
        assert_eq!(m.strength, 1.0);
    }

    #[test]
    fn test_old_points_trimmed() {
        let now = fixed_now();
        let mut history = PriceHistory::default();
        history.push(50_000.0, now - Duration::seconds(HISTORY_RETENTION_SECS + 100));
        history.push(51_000.0, now);
        assert_eq!(history.points.len(), 1);
    }
}
