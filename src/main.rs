//! tonoracle - periodic TON price-oracle updater
//!
//! Usage: cargo run --bin tonoracle
//!
//! Wakes up every `schedule.interval_secs` (aligned to 00:00 UTC for the daily
//! default), runs one update cycle and logs the report. With
//! `schedule.run_once` it runs a single cycle and exits non-zero if that cycle
//! failed.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tonoracle::chain::{ChainClient, ChainStateReader, TonCenterClient};
use tonoracle::config::AppConfig;
use tonoracle::schedule::until_next_boundary;
use tonoracle::oracle::sources::{BinanceClient, OkxClient, QuoteSource};
use tonoracle::oracle::{PriceAggregator, QuoteCollector};
use tonoracle::updater::{
    CycleOutcome, CycleReport, CycleSettings, RandomQueryIds, TransactionSubmitter,
    UpdateOrchestrator, UpdatePayloadBuilder,
};
use tonoracle::wallet::{CommandSigner, SigningWallet, Wallet, WatchOnlyWallet};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_logging(&config);

    info!("🚀 Starting tonoracle {}", config.bot.tag);
    info!("📋 Config: {}", config.digest());

    config.validate().context("Invalid configuration")?;

    let orchestrator = build_orchestrator(&config)?;

    if config.schedule.run_once {
        let report = orchestrator.run_update_cycle().await;
        log_report(&report);
        if report.outcome.is_failure() {
            anyhow::bail!("Update cycle failed: {:?}", report.outcome.kind());
        }
        return Ok(());
    }

    if config.schedule.run_on_start {
        let report = orchestrator.run_update_cycle().await;
        log_report(&report);
    }

    let period = Duration::from_secs(config.schedule.interval_secs);
    let delay = if config.schedule.align_to_interval {
        until_next_boundary(chrono::Utc::now(), period)
    } else {
        period
    };
    let mut ticker = interval_at(Instant::now() + delay, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        interval_secs = config.schedule.interval_secs,
        next_in_secs = delay.as_secs(),
        "⏰ Scheduler running"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = orchestrator.run_update_cycle().await;
                log_report(&report);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("🛑 Shutdown signal received");
                break;
            }
        }
    }

    info!("👋 tonoracle stopped");
    Ok(())
}

fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn build_orchestrator(config: &AppConfig) -> Result<UpdateOrchestrator> {
    let contract = config.contract_address()?;
    let wallet_address = config.wallet_address()?;

    let chain: Arc<dyn ChainClient> = Arc::new(TonCenterClient::new(
        &config.chain.api_url,
        config.chain.api_key.as_deref(),
        Duration::from_millis(config.chain.request_timeout_ms),
    )?);

    let http = reqwest::Client::builder()
        .timeout(Duration::from_millis(config.quotes.request_timeout_ms))
        .build()
        .context("Failed to build quote HTTP client")?;

    let mut sources: Vec<Box<dyn QuoteSource>> = Vec::new();
    if config.quotes.binance_enabled {
        sources.push(Box::new(BinanceClient::new(
            http.clone(),
            config.quotes.binance_url.clone(),
        )));
    }
    if config.quotes.okx_enabled {
        sources.push(Box::new(OkxClient::new(http, config.quotes.okx_url.clone())));
    }

    let collector = QuoteCollector::new(
        sources,
        Duration::from_millis(config.quotes.request_timeout_ms),
    );
    info!(sources = ?collector.source_kinds(), "📡 Quote sources ready");

    let aggregator = PriceAggregator::new(
        config.oracle.scale_factor,
        config.quotes.min_sources,
        config.max_deviation_pct(),
    );

    let reader = ChainStateReader::new(chain.clone(), config.oracle.get_method.clone());
    let payload = UpdatePayloadBuilder::new(
        config.oracle.op_code,
        config.oracle.flags,
        Arc::new(RandomQueryIds),
    );
    let submitter = TransactionSubmitter::new(
        chain.clone(),
        Duration::from_secs(config.wallet.submit_timeout_secs),
        config.wallet.bounce,
    );
    let wallet: Arc<dyn Wallet> = match config.signer_command() {
        Some(program) => {
            info!(signer = %program, "🔏 Using external signer");
            let signer = CommandSigner::new(program, config.wallet.signer_args.clone());
            Arc::new(SigningWallet::new(
                wallet_address,
                chain,
                Arc::new(signer),
                Duration::from_millis(config.wallet.seqno_poll_ms),
            ))
        }
        None => {
            info!("👀 No signer configured, wallet is watch-only");
            Arc::new(WatchOnlyWallet::new(wallet_address, chain))
        }
    };

    let settings = CycleSettings {
        contract,
        transfer_amount_nano: config.wallet.transfer_amount_nano,
        min_balance_nano: config.wallet.min_balance_nano,
        dry_run: config.bot.dry_run,
        cycle_timeout: config.cycle_timeout(),
    };

    Ok(UpdateOrchestrator::new(
        reader, collector, aggregator, payload, submitter, wallet, settings,
    ))
}

fn log_report(report: &CycleReport) {
    let elapsed_ms = (report.finished_at - report.started_at).num_milliseconds();
    let path = report
        .path
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(" → ");

    for failure in &report.quote_failures {
        warn!(cycle = %report.cycle_id, error = %failure, "Quote source failed");
    }

    match &report.outcome {
        CycleOutcome::Confirmed(c) => info!(
            cycle = %report.cycle_id,
            price = c.price,
            tx_hash = %c.tx_hash,
            block = %c.block,
            balance_left = c.new_balance,
            elapsed_ms,
            path = %path,
            "📊 Cycle confirmed"
        ),
        CycleOutcome::Skipped(reason) => info!(
            cycle = %report.cycle_id,
            reason = ?reason,
            elapsed_ms,
            path = %path,
            "📊 Cycle skipped"
        ),
        CycleOutcome::Failed(f) => error!(
            cycle = %report.cycle_id,
            kind = %f.error.kind(),
            error = %f.error,
            balance = ?f.balance,
            elapsed_ms,
            path = %path,
            "📊 Cycle failed"
        ),
    }
}
