//! Configuration types and re-exports

pub use super::{
    AppConfig, BotConfig, ChainConfig, LoggingConfig, OracleConfig, QuotesConfig, ScheduleConfig,
    WalletConfig,
};
