//! Configuration management for WhaleBot
//!
//! Loads from config files + environment variables via .env

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub bot: BotConfig,
    pub whales: WhalesConfig,
    pub signals: SignalsConfig,
    pub ev: EvConfig,
    pub thresholds: ThresholdsConfig,
    pub feeds: FeedsConfig,
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Bot version tag for logging and CSV
    pub tag: String,
    /// Coins to trade
    pub coins: Vec<String>,
    /// Seconds between trading cycles
    pub cycle_interval_secs: u64,
    /// Dry run mode (no simulated fills, log only)
    pub dry_run: bool,
    /// Starting bankroll in USD
    pub starting_bankroll: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhalesConfig {
    /// Wallet addresses to track
    pub tracked: Vec<String>,
    /// Capital score assumed for wallets without a known PnL entry (USD)
    pub default_capital_usd: f64,
    /// Lookback window for trade collection and lead-lag series (hours)
    pub lookback_hours: i64,
    /// Enable the pairwise causality scorer (falls back to zero scores when off)
    pub leadlag_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignalsConfig {
    /// Half-life for observation time decay (hours)
    pub decay_half_life_hours: f64,
    /// Enable the trajectory forecaster
    pub forecast_enabled: bool,
    /// Minimum observations before a forecast is attempted
    pub forecast_min_observations: usize,
    /// How far ahead to forecast (hours)
    pub forecast_horizon_hours: f64,
    /// Lead score above which a wallet counts toward the lead sub-signal
    pub lead_signal_threshold: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EvConfig {
    /// Base platform fee estimate (fraction of size)
    pub base_fee_pct: f64,
    /// Base slippage estimate (fraction of size)
    pub base_slippage_pct: f64,
    /// Never bet more than this Kelly fraction
    pub max_kelly_fraction: f64,
    /// Hard cap on position size as fraction of bankroll
    pub max_position_pct: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdsConfig {
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

#[derive(Debug, Clone, Deserialize)]
pub struct FeedsConfig {
    /// Polymarket gamma API endpoint (market discovery)
    pub gamma_url: String,
    /// Polymarket data API endpoint (whale trades)
    pub data_api_url: String,
    /// CoinGecko API endpoint (momentum price feed)
    pub gecko_url: String,
    /// Momentum comparison lookback in seconds
    pub momentum_lookback_secs: i64,
    /// Minimum trade size worth ingesting (USD)
    pub min_trade_usd: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// Data directory for state files and CSV logs
    pub data_dir: String,
    /// Enable CSV candidate/trade logging
    pub csv_enabled: bool,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .set_default("bot.tag", env!("CARGO_PKG_VERSION"))?
            .set_default("bot.coins", vec!["BTC", "ETH", "SOL", "XRP"])?
            .set_default("bot.cycle_interval_secs", 30)?
            .set_default("bot.dry_run", true)?
            .set_default("bot.starting_bankroll", 1000.0)?
            // Whale tracking defaults
            .set_default(
                "whales.tracked",
                vec![
                    "0x9d84ce0306f8551e02efef1680475fc0f1dc1344",
                    "0xd218e474776403a330142299f7796e8ba32eb5c9",
                    "0x006cc834cc092684f1b56626e23bedb3835c16ea",
                    "0xe74a4446efd66a4de690962938f550d8921e40ee",
                    "0x492442eab586f242b53bda933fd5de859c8a3782",
                    "0x63ce342161250d705dc0b16df89036c8e5f9ba9a",
                ],
            )?
            .set_default("whales.default_capital_usd", 100_000.0)?
            .set_default("whales.lookback_hours", 24)?
            .set_default("whales.leadlag_enabled", true)?
            // Signal aggregation defaults
            .set_default("signals.decay_half_life_hours", 6.0)?
            .set_default("signals.forecast_enabled", true)?
            .set_default("signals.forecast_min_observations", 10)?
            .set_default("signals.forecast_horizon_hours", 1.0)?
            .set_default("signals.lead_signal_threshold", 0.5)?
            // EV gate defaults
            .set_default("ev.base_fee_pct", 0.02)?
            .set_default("ev.base_slippage_pct", 0.01)?
            .set_default("ev.max_kelly_fraction", 0.25)?
            .set_default("ev.max_position_pct", 0.05)?
            // Threshold controller defaults
            .set_default("thresholds.base_min_ev_frac", 0.001)?
            .set_default("thresholds.base_min_confidence", 0.25)?
            .set_default("thresholds.target_trades_per_day", 15)?
            .set_default("thresholds.max_trades_per_day", 25)?
            .set_default("thresholds.max_daily_loss_pct", 0.10)?
            // Feed defaults
            .set_default("feeds.gamma_url", "https://gamma-api.polymarket.com")?
            .set_default("feeds.data_api_url", "https://data-api.polymarket.com")?
            .set_default("feeds.gecko_url", "https://api.coingecko.com/api/v3")?
            .set_default("feeds.momentum_lookback_secs", 60)?
            .set_default("feeds.min_trade_usd", 100.0)?
            // Persistence defaults
            .set_default("persistence.data_dir", "./data")?
            .set_default("persistence.csv_enabled", true)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (WHALEBOT_*)
            .add_source(Environment::with_prefix("WHALEBOT").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(app_config)
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        format!(
            "bot={} coins={:?} whales={} dry_run={} half_life={}h target_trades={}",
            self.bot.tag,
            self.bot.coins,
            self.whales.tracked.len(),
            self.bot.dry_run,
            self.signals.decay_half_life_hours,
            self.thresholds.target_trades_per_day,
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
