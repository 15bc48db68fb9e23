//! Configuration management for the oracle updater
//!
//! Loads from YAML files + environment variables via .env

mod types;

pub use types::*;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

use crate::chain::Address;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub bot: BotConfig,
    pub oracle: OracleConfig,
    pub chain: ChainConfig,
    pub wallet: WalletConfig,
    pub quotes: QuotesConfig,
    pub schedule: ScheduleConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Version tag for logging
    pub tag: String,
    /// Build and log the update but never send it
    pub dry_run: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    /// Oracle contract address (raw or user-friendly)
    pub contract_address: String,
    /// Get-method returning the price state tuple
    pub get_method: String,
    /// Opcode of the price update message
    pub op_code: u32,
    /// Fixed-point multiplier of the contract price
    pub scale_factor: u32,
    /// Flags byte appended to every update
    pub flags: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// toncenter-compatible API v2 base URL
    pub api_url: String,
    /// Optional API key (X-API-Key header)
    pub api_key: Option<String>,
    /// HTTP request timeout in milliseconds
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    /// Price admin wallet address
    pub address: String,
    /// Amount attached to every update, nano-TON
    pub transfer_amount_nano: u64,
    /// Minimum balance required to submit, nano-TON
    pub min_balance_nano: u64,
    /// Return funds if the contract rejects the update
    pub bounce: bool,
    /// Maximum wait for inclusion in seconds
    pub submit_timeout_secs: u64,
    /// External signer program; without one the wallet is watch-only
    pub signer_command: Option<String>,
    /// Arguments passed to the signer program
    pub signer_args: Vec<String>,
    /// Seqno polling period while waiting for inclusion, milliseconds
    pub seqno_poll_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuotesConfig {
    pub binance_enabled: bool,
    pub binance_url: String,
    pub okx_enabled: bool,
    pub okx_url: String,
    /// Per-source timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Minimum usable quotes required to update
    pub min_sources: usize,
    /// Outlier threshold in percent from the median (0 = disabled)
    pub max_deviation_pct: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Interval between cycles in seconds
    pub interval_secs: u64,
    /// Run a cycle immediately at startup
    pub run_on_start: bool,
    /// Run one cycle and exit
    pub run_once: bool,
    /// Tick on multiples of the interval since the Unix epoch (midnight UTC for daily)
    pub align_to_interval: bool,
    /// Deadline for a whole cycle in seconds
    pub cycle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let builder = Self::with_defaults(Config::builder())?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (TONORACLE__*)
            .add_source(
                Environment::with_prefix("TONORACLE")
                    .prefix_separator("__")
                    .separator("__"),
            );

        Self::from_builder(builder)
    }

    /// Defaults only; used by tests and as the base of `load`
    pub fn defaults() -> Result<Self> {
        Self::from_builder(Self::with_defaults(Config::builder())?)
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self> {
        let config = builder.build().context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(app_config)
    }

    fn with_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(builder
            // Bot defaults
            .set_default("bot.tag", env!("CARGO_PKG_VERSION"))?
            .set_default("bot.dry_run", true)?
            // Oracle defaults
            .set_default(
                "oracle.contract_address",
                "EQB_C3Jt6Dvgv5hp2B0Beg39BxMPzh9A0aqooq117iSQn3XE",
            )?
            .set_default("oracle.get_method", "get_price_info")?
            .set_default("oracle.op_code", 1002)?
            .set_default("oracle.scale_factor", 100)?
            .set_default("oracle.flags", 0)?
            // Chain defaults (testnet)
            .set_default("chain.api_url", "https://testnet.toncenter.com/api/v2")?
            .set_default("chain.request_timeout_ms", 15_000)?
            // Wallet defaults
            .set_default("wallet.address", "")?
            .set_default("wallet.transfer_amount_nano", 10_000_000)?
            .set_default("wallet.min_balance_nano", 30_000_000)?
            .set_default("wallet.bounce", true)?
            .set_default("wallet.submit_timeout_secs", 90)?
            .set_default("wallet.signer_args", Vec::<String>::new())?
            .set_default("wallet.seqno_poll_ms", 2_000)?
            // Quote defaults
            .set_default("quotes.binance_enabled", true)?
            .set_default(
                "quotes.binance_url",
                crate::oracle::sources::BINANCE_AVG_PRICE_URL,
            )?
            .set_default("quotes.okx_enabled", true)?
            .set_default("quotes.okx_url", crate::oracle::sources::OKX_MARK_PRICE_URL)?
            .set_default("quotes.request_timeout_ms", 5_000)?
            .set_default("quotes.min_sources", 1)?
            .set_default("quotes.max_deviation_pct", "0")?
            // Schedule defaults (daily, as the midnight cron did)
            .set_default("schedule.interval_secs", 86_400)?
            .set_default("schedule.run_on_start", true)?
            .set_default("schedule.run_once", false)?
            .set_default("schedule.align_to_interval", true)?
            .set_default("schedule.cycle_timeout_secs", 180)?
            // Logging defaults
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?)
    }

    pub fn contract_address(&self) -> Result<Address> {
        self.oracle
            .contract_address
            .parse()
            .with_context(|| format!("Invalid oracle.contract_address '{}'", self.oracle.contract_address))
    }

    pub fn wallet_address(&self) -> Result<Address> {
        if self.wallet.address.trim().is_empty() {
            bail!("wallet.address is not set (TONORACLE__WALLET__ADDRESS)");
        }
        self.wallet
            .address
            .parse()
            .with_context(|| format!("Invalid wallet.address '{}'", self.wallet.address))
    }

    pub fn max_deviation_pct(&self) -> Option<Decimal> {
        Some(self.quotes.max_deviation_pct).filter(|d| *d > Decimal::ZERO)
    }

    pub fn signer_command(&self) -> Option<&str> {
        self.wallet
            .signer_command
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.schedule.cycle_timeout_secs)
    }

    /// Check values that deserialize fine but make no sense
    pub fn validate(&self) -> Result<()> {
        self.contract_address()?;
        self.wallet_address()?;

        if !self.quotes.binance_enabled && !self.quotes.okx_enabled {
            bail!("At least one quote source must be enabled");
        }
        if self.quotes.min_sources == 0 {
            bail!("quotes.min_sources must be at least 1");
        }
        let enabled = [self.quotes.binance_enabled, self.quotes.okx_enabled]
            .iter()
            .filter(|e| **e)
            .count();
        if self.quotes.min_sources > enabled {
            bail!(
                "quotes.min_sources ({}) exceeds the {} enabled source(s)",
                self.quotes.min_sources,
                enabled
            );
        }
        if self.quotes.max_deviation_pct < Decimal::ZERO {
            bail!("quotes.max_deviation_pct cannot be negative");
        }
        if self.oracle.scale_factor == 0 {
            bail!("oracle.scale_factor must be positive");
        }
        if self.wallet.min_balance_nano < self.wallet.transfer_amount_nano {
            bail!(
                "wallet.min_balance_nano ({}) must cover transfer_amount_nano ({})",
                self.wallet.min_balance_nano,
                self.wallet.transfer_amount_nano
            );
        }
        if self.schedule.interval_secs == 0 {
            bail!("schedule.interval_secs must be positive");
        }
        if self.wallet.submit_timeout_secs >= self.schedule.cycle_timeout_secs {
            bail!(
                "wallet.submit_timeout_secs ({}) must be below schedule.cycle_timeout_secs ({})",
                self.wallet.submit_timeout_secs,
                self.schedule.cycle_timeout_secs
            );
        }
        if !self.bot.dry_run && self.signer_command().is_none() {
            bail!("bot.dry_run is off but wallet.signer_command is not set");
        }

        Ok(())
    }

    /// Generate a digest of the config (without secrets) for logging
    pub fn digest(&self) -> String {
        format!(
            "tag={} dry_run={} contract={} api={} sources=[{}{}] min_sources={} min_balance={} interval={}s",
            self.bot.tag,
            self.bot.dry_run,
            self.oracle.contract_address,
            self.chain.api_url,
            if self.quotes.binance_enabled { "binance " } else { "" },
            if self.quotes.okx_enabled { "okx" } else { "" },
            self.quotes.min_sources,
            self.wallet.min_balance_nano,
            self.schedule.interval_secs
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
