//! Update orchestrator - one oracle update cycle, start to finish
//!
//! `Idle → ReadingState → CollectingQuotes → Aggregating → Gating →
//! Submitting → Confirmed | Skipped | Failed`
//!
//! Cycles are serialized: a second call waits until the running cycle has
//! reached a terminal state. Nothing is retried; the scheduler decides.

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use super::balance::BalanceGuard;
use super::payload::UpdatePayloadBuilder;
use super::submitter::TransactionSubmitter;
use crate::chain::{Address, ChainHead, ChainStateReader};
use crate::error::{CycleError, ErrorKind};
use crate::oracle::{PriceAggregator, QuoteCollector};
use crate::types::{AggregatedPrice, OnChainPriceState, UpdateMessage};
use crate::wallet::{SendMode, Wallet};

/// Bound on the balance read after the cycle deadline has already passed
const CANCELLED_BALANCE_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    ReadingState,
    CollectingQuotes,
    Aggregating,
    Gating,
    Submitting,
    Confirmed,
    Skipped,
    Failed,
}

impl CycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CycleState::Confirmed | CycleState::Skipped | CycleState::Failed
        )
    }
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CycleState::Idle => "IDLE",
            CycleState::ReadingState => "READING_STATE",
            CycleState::CollectingQuotes => "COLLECTING_QUOTES",
            CycleState::Aggregating => "AGGREGATING",
            CycleState::Gating => "GATING",
            CycleState::Submitting => "SUBMITTING",
            CycleState::Confirmed => "CONFIRMED",
            CycleState::Skipped => "SKIPPED",
            CycleState::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

/// Why a cycle ended without submitting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    LowBalance { balance: u64, threshold: u64 },
    /// Message built and logged, not sent
    DryRun { balance: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub tx_hash: String,
    pub block: ChainHead,
    pub new_balance: u64,
    pub price: u32,
    pub query_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleFailure {
    pub error: CycleError,
    /// Wallet balance re-queried after a failed submission
    pub balance: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Confirmed(Confirmation),
    Skipped(SkipReason),
    Failed(CycleFailure),
}

impl CycleOutcome {
    pub fn terminal_state(&self) -> CycleState {
        match self {
            CycleOutcome::Confirmed(_) => CycleState::Confirmed,
            CycleOutcome::Skipped(_) => CycleState::Skipped,
            CycleOutcome::Failed(_) => CycleState::Failed,
        }
    }

    /// Error kind attached to a skipped or failed cycle
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            CycleOutcome::Confirmed(_) => None,
            CycleOutcome::Skipped(SkipReason::LowBalance { .. }) => Some(ErrorKind::LowBalance),
            CycleOutcome::Skipped(SkipReason::DryRun { .. }) => None,
            CycleOutcome::Failed(f) => Some(f.error.kind()),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, CycleOutcome::Failed(_))
    }
}

/// Everything observed during one cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// States visited, `Idle` first, terminal state last
    pub path: Vec<CycleState>,
    pub outcome: CycleOutcome,
    pub state: Option<OnChainPriceState>,
    pub aggregate: Option<AggregatedPrice>,
    pub message: Option<UpdateMessage>,
    /// Base64 BOC of the encoded message body
    pub body_boc: Option<String>,
    /// Per-source soft failures
    pub quote_failures: Vec<CycleError>,
}

/// Static parameters of every cycle
#[derive(Debug, Clone)]
pub struct CycleSettings {
    pub contract: Address,
    pub transfer_amount_nano: u64,
    pub min_balance_nano: u64,
    pub dry_run: bool,
    /// Deadline applied by `run_update_cycle`
    pub cycle_timeout: Duration,
}

struct CycleRun {
    cycle_id: Uuid,
    started_at: DateTime<Utc>,
    path: Vec<CycleState>,
    state: Option<OnChainPriceState>,
    aggregate: Option<AggregatedPrice>,
    message: Option<UpdateMessage>,
    body_boc: Option<String>,
    quote_failures: Vec<CycleError>,
}

impl CycleRun {
    fn new() -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            started_at: Utc::now(),
            path: vec![CycleState::Idle],
            state: None,
            aggregate: None,
            message: None,
            body_boc: None,
            quote_failures: Vec::new(),
        }
    }

    fn enter(&mut self, next: CycleState) {
        let from = self.path.last().copied().unwrap_or(CycleState::Idle);
        tracing::debug!(from = %from, to = %next, "Cycle transition");
        self.path.push(next);
    }

    fn fail(self, error: CycleError) -> CycleReport {
        self.finish(CycleOutcome::Failed(CycleFailure {
            error,
            balance: None,
        }))
    }

    fn finish(mut self, outcome: CycleOutcome) -> CycleReport {
        self.enter(outcome.terminal_state());

        match &outcome {
            CycleOutcome::Confirmed(c) => tracing::info!(
                price = c.price,
                tx_hash = %c.tx_hash,
                balance_left = c.new_balance,
                "🎉 Oracle price updated"
            ),
            CycleOutcome::Skipped(SkipReason::LowBalance { balance, threshold }) => {
                tracing::warn!(balance, threshold, "⚠️ Not enough balance, update skipped")
            }
            CycleOutcome::Skipped(SkipReason::DryRun { balance }) => {
                tracing::info!(balance, "Dry run, update not sent")
            }
            CycleOutcome::Failed(f) => tracing::error!(
                kind = %f.error.kind(),
                error = %f.error,
                balance = ?f.balance,
                "❌ Update cycle failed"
            ),
        }

        CycleReport {
            cycle_id: self.cycle_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            path: self.path,
            outcome,
            state: self.state,
            aggregate: self.aggregate,
            message: self.message,
            body_boc: self.body_boc,
            quote_failures: self.quote_failures,
        }
    }
}

/// Run `fut` unless `deadline` passes first
async fn with_deadline<T, F>(deadline: Instant, fut: F) -> Result<T, CycleError>
where
    F: Future<Output = Result<T, CycleError>>,
{
    match tokio::time::timeout_at(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(CycleError::Cancelled),
    }
}

pub struct UpdateOrchestrator {
    reader: ChainStateReader,
    collector: QuoteCollector,
    aggregator: PriceAggregator,
    payload: UpdatePayloadBuilder,
    guard: BalanceGuard,
    submitter: TransactionSubmitter,
    wallet: Arc<dyn Wallet>,
    settings: CycleSettings,
    cycle_lock: Mutex<()>,
}

impl UpdateOrchestrator {
    pub fn new(
        reader: ChainStateReader,
        collector: QuoteCollector,
        aggregator: PriceAggregator,
        payload: UpdatePayloadBuilder,
        submitter: TransactionSubmitter,
        wallet: Arc<dyn Wallet>,
        settings: CycleSettings,
    ) -> Self {
        Self {
            reader,
            collector,
            aggregator,
            payload,
            guard: BalanceGuard::new(settings.min_balance_nano),
            submitter,
            wallet,
            settings,
            cycle_lock: Mutex::new(()),
        }
    }

    /// Run one cycle bounded by the configured cycle timeout
    pub async fn run_update_cycle(&self) -> CycleReport {
        let deadline = Instant::now() + self.settings.cycle_timeout;
        self.run_update_cycle_until(deadline).await
    }

    /// Run one cycle; any network step still pending at `deadline` fails it with `Cancelled`
    pub async fn run_update_cycle_until(&self, deadline: Instant) -> CycleReport {
        let _running = self.cycle_lock.lock().await;
        let run = CycleRun::new();
        let span = tracing::info_span!("cycle", id = %run.cycle_id);
        self.execute(run, deadline).instrument(span).await
    }

    async fn execute(&self, mut run: CycleRun, deadline: Instant) -> CycleReport {
        tracing::info!(contract = %self.settings.contract, "🔄 Starting oracle update cycle");

        run.enter(CycleState::ReadingState);
        let head = match with_deadline(deadline, self.reader.chain_head()).await {
            Ok(head) => head,
            Err(e) => return run.fail(e),
        };
        match with_deadline(deadline, self.reader.read_state(&head, &self.settings.contract)).await
        {
            Ok(state) => run.state = Some(state),
            Err(e) => return run.fail(e),
        }

        run.enter(CycleState::CollectingQuotes);
        let collection = match with_deadline(deadline, async {
            Ok::<_, CycleError>(self.collector.collect().await)
        })
        .await
        {
            Ok(collection) => collection,
            Err(e) => return run.fail(e),
        };
        run.quote_failures = collection.failures;

        run.enter(CycleState::Aggregating);
        let aggregate = match self.aggregator.aggregate(&collection.quotes) {
            Ok(aggregate) => aggregate,
            Err(e) => return run.fail(e),
        };
        run.aggregate = Some(aggregate.clone());

        let message = match self.payload.build(&aggregate, Utc::now()) {
            Ok(message) => message,
            Err(e) => return run.fail(e),
        };
        run.message = Some(message);

        let body_boc = match message.to_cell() {
            Ok(cell) => general_purpose::STANDARD.encode(cell.to_boc()),
            Err(e) => return run.fail(CycleError::PayloadEncoding(e.to_string())),
        };
        run.body_boc = Some(body_boc.clone());

        run.enter(CycleState::Gating);
        let balance = match with_deadline(deadline, async {
            self.wallet
                .balance(&head)
                .await
                .map_err(|e| CycleError::BalanceQueryFailed(e.to_string()))
        })
        .await
        {
            Ok(balance) => balance,
            Err(e) => return run.fail(e),
        };
        tracing::info!(wallet = %self.wallet.address(), balance, "Price admin wallet balance");

        if let Err(CycleError::LowBalance { balance, threshold }) = self.guard.check(balance) {
            return run.finish(CycleOutcome::Skipped(SkipReason::LowBalance {
                balance,
                threshold,
            }));
        }

        if self.settings.dry_run {
            tracing::info!(
                price = message.new_price,
                query_id = message.query_id,
                body = %body_boc,
                "🧪 Dry run: update message built"
            );
            return run.finish(CycleOutcome::Skipped(SkipReason::DryRun { balance }));
        }

        run.enter(CycleState::Submitting);
        let submission = self.submitter.submit_and_confirm(
            self.wallet.as_ref(),
            &self.settings.contract,
            &message,
            self.settings.transfer_amount_nano,
            SendMode::PAY_FEES_SEPARATELY,
        );
        match tokio::time::timeout_at(deadline, submission).await {
            Ok(Ok(receipt)) => run.finish(CycleOutcome::Confirmed(Confirmation {
                tx_hash: receipt.tx_hash,
                block: receipt.block,
                new_balance: receipt.new_balance,
                price: message.new_price,
                query_id: message.query_id,
            })),
            Ok(Err(failure)) => run.finish(CycleOutcome::Failed(CycleFailure {
                error: failure.error,
                balance: failure.balance,
            })),
            Err(_) => {
                let balance = self.balance_after_cancel().await;
                run.finish(CycleOutcome::Failed(CycleFailure {
                    error: CycleError::Cancelled,
                    balance,
                }))
            }
        }
    }

    /// Best-effort balance read after a submission was cut off by the deadline
    async fn balance_after_cancel(&self) -> Option<u64> {
        let query = async {
            let head = self.reader.chain_head().await.ok()?;
            self.wallet.balance(&head).await.ok()
        };
        tokio::time::timeout(CANCELLED_BALANCE_GRACE, query)
            .await
            .ok()
            .flatten()
    }
}
