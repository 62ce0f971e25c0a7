//! WhaleBot entrypoint
//!
//! Polling loop: collect whale trades, market quotes and momentum, then run
//! one decision cycle. Feed failures degrade to empty data for the cycle;
//! a failed cycle is logged and retried on the next tick.

use anyhow::Result;
use chrono::Utc;
use std::collections::HashMap;
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use whalebot::config::AppConfig;
use whalebot::engine::{CycleInputs, TradingEngine};
use whalebot::feeds::{
    GammaMarketFeed, MomentumSource, ObservationSource, PolymarketTradeFeed, PriceMomentumFeed,
    QuoteSource,
};
use whalebot::types::Coin;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("whalebot=info")),
        )
        .init();

    let config = AppConfig::load()?;
    info!("starting whalebot: {}", config.digest());

    let coins: Vec<Coin> = config
        .bot
        .coins
        .iter()
        .filter_map(|s| Coin::from_str(s))
        .collect();

    let mut trade_feed = PolymarketTradeFeed::new(
        &config.feeds.data_api_url,
        config.whales.lookback_hours,
        config.feeds.min_trade_usd,
    );
    let mut market_feed = GammaMarketFeed::new(&config.feeds.gamma_url);
    let mut price_feed = PriceMomentumFeed::new(
        &config.feeds.gecko_url,
        coins,
        config.feeds.momentum_lookback_secs,
    );

    let mut engine = TradingEngine::from_config(&config, Utc::now())?;

    let mut ticker = interval(Duration::from_secs(config.bot.cycle_interval_secs));
    let mut cycles: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }

        let now = Utc::now();

        let observations = match trade_feed.collect(now).await {
            Ok(obs) => obs,
            Err(e) => {
                warn!("trade collection failed, skipping whale data this cycle: {e}");
                HashMap::new()
            }
        };
        let quotes = match market_feed.quotes().await {
            Ok(q) => q,
            Err(e) => {
                warn!("market discovery failed, no quotes this cycle: {e}");
                Vec::new()
            }
        };
        let momentum = match price_feed.momentum(now).await {
            Ok(m) => m,
            Err(e) => {
                warn!("price feed failed, momentum neutral this cycle: {e}");
                HashMap::new()
            }
        };

        let inputs = CycleInputs {
            observations,
            quotes,
            momentum,
            resolutions: Vec::new(),
            bankroll: config.bot.starting_bankroll,
        };

        if let Err(e) = engine.run_cycle(inputs, now).await {
            error!("cycle failed, retrying next tick: {e:#}");
        }

        cycles += 1;
        if cycles % 20 == 0 {
            if let Some(logger) = engine.logger() {
                match logger.rejection_breakdown() {
                    Ok(breakdown) => info!(
                        candidates = breakdown.total_candidates,
                        trades = breakdown.trades,
                        rejects = breakdown.rejects,
                        reasons = ?breakdown.by_reason,
                        "rejection breakdown"
                    ),
                    Err(e) => warn!("rejection report failed: {e}"),
                }
            }
        }
    }

    Ok(())
}
