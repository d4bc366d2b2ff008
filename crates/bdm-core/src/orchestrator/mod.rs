//! Batch orchestration: walks pages downward from the cursor in batches, runs each
//! batch's pages concurrently, and checkpoints the ledger after every batch.
//!
//! Ordering per batch:
//! 1. stop checks (cancellation, page budget, storage admission)
//! 2. discovery and the retry cycle for every page in the batch, concurrently
//! 3. cursor update and one ledger commit
//!
//! Pages whose discovery failed in an earlier run are retried first, once per run.

mod batch;
mod page;
mod summary;

pub use batch::{next_cursor, resolve_start_page, select_batch};
pub use summary::{RunSummary, StopReason};

use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};

use crate::collab::{DownloadAgent, PageSource};
use crate::config::BdmConfig;
use crate::control::RunControl;
use crate::dedup::DuplicatePolicy;
use crate::error::RunError;
use crate::ledger::{Ledger, LedgerStore};
use crate::retry::{PageOutcome, RetryCoordinator, RetryPolicy};
use crate::storage::{Admission, Quarantine, StorageGuard};
use crate::validator::{AssetValidator, ValidationPolicy};
use page::{process_page, PageContext, PageResult};

/// Parameters of one run. CLI flags land here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Overrides the saved cursor.
    pub start_page: Option<u32>,
    /// Stop after this many pages (None = until the lower bound).
    pub max_pages: Option<usize>,
    pub batch_size: usize,
    pub max_attempts: u32,
    pub storage_cap_bytes: Option<u64>,
    pub dry_run: bool,
}

impl RunOptions {
    pub fn from_config(cfg: &BdmConfig) -> Self {
        Self {
            start_page: None,
            max_pages: None,
            batch_size: cfg.batch.batch_pages,
            max_attempts: cfg.batch.max_attempts,
            storage_cap_bytes: cfg.storage_cap_bytes,
            dry_run: false,
        }
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from_config(&BdmConfig::default())
    }
}

/// Run-independent knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub min_page: u32,
    pub default_start_page: u32,
    pub duplicate_policy: DuplicatePolicy,
    /// Max concurrent discovery / agent calls.
    pub concurrency: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            min_page: 1,
            default_start_page: 1000,
            duplicate_policy: DuplicatePolicy::SkipCompleted,
            concurrency: 8,
        }
    }
}

pub struct BatchOrchestrator {
    source: Arc<dyn PageSource>,
    agent: Arc<dyn DownloadAgent>,
    validator: Arc<AssetValidator>,
    guard: Arc<StorageGuard>,
    quarantine: Quarantine,
    ledger: Arc<Mutex<LedgerStore>>,
    control: RunControl,
    policy: RetryPolicy,
    settings: Settings,
}

impl BatchOrchestrator {
    pub fn new(
        source: Arc<dyn PageSource>,
        agent: Arc<dyn DownloadAgent>,
        ledger: LedgerStore,
        guard: StorageGuard,
        quarantine: Quarantine,
    ) -> Self {
        Self {
            source,
            agent,
            validator: Arc::new(AssetValidator::default()),
            guard: Arc::new(guard),
            quarantine,
            ledger: Arc::new(Mutex::new(ledger)),
            control: RunControl::new(),
            policy: RetryPolicy::default(),
            settings: Settings::default(),
        }
    }

    /// Wire everything that comes from config: validator thresholds, wait windows,
    /// storage guard, quarantine dir and settings.
    pub fn from_config(
        cfg: &BdmConfig,
        source: Arc<dyn PageSource>,
        agent: Arc<dyn DownloadAgent>,
        ledger: LedgerStore,
    ) -> Self {
        let quarantine_dir = cfg.quarantine_dir();
        let guard = StorageGuard::new(
            &cfg.download_root,
            Duration::from_secs(cfg.storage_refresh_secs),
        )
        .excluding(&quarantine_dir)
        .with_min_free_bytes(cfg.min_free_bytes);
        Self::new(source, agent, ledger, guard, Quarantine::new(quarantine_dir))
            .with_validator(AssetValidator::new(ValidationPolicy::from(&cfg.validation)))
            .with_policy(RetryPolicy::from(&cfg.batch))
            .with_settings(Settings {
                min_page: cfg.min_page,
                default_start_page: cfg.default_start_page,
                duplicate_policy: cfg.duplicate_policy,
                concurrency: cfg.batch.concurrency,
            })
    }

    pub fn with_validator(mut self, validator: AssetValidator) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_control(mut self, control: RunControl) -> Self {
        self.control = control;
        self
    }

    pub fn control(&self) -> &RunControl {
        &self.control
    }

    /// Copy of the ledger as it stands now.
    pub async fn ledger_snapshot(&self) -> Ledger {
        self.ledger.lock().await.ledger().clone()
    }

    pub async fn run(&self, opts: &RunOptions) -> Result<RunSummary, RunError> {
        if opts.batch_size == 0 {
            return Err(RunError::Misconfigured("batch size must be at least 1".into()));
        }
        if opts.max_attempts == 0 {
            return Err(RunError::Misconfigured("max attempts must be at least 1".into()));
        }
        let min_page = self.settings.min_page.max(1);

        // Dry runs account against a private copy so the real store is never written.
        let ledger = if opts.dry_run {
            let copy = self.ledger_snapshot().await;
            Arc::new(Mutex::new(LedgerStore::in_memory(copy)))
        } else {
            Arc::clone(&self.ledger)
        };

        let (reconciled, saved_cursor, deferred) = {
            let mut store = ledger.lock().await;
            let mut copy = store.ledger().clone();
            let validator = Arc::clone(&self.validator);
            let (copy, report) = tokio::task::spawn_blocking(move || {
                let report = copy.reconcile(&validator);
                (copy, report)
            })
            .await?;
            if !report.removed.is_empty() {
                *store.ledger_mut() = copy;
                store.commit().await?;
            }
            let l = store.ledger();
            let deferred: VecDeque<u32> = l
                .deferred_pages
                .iter()
                .rev()
                .copied()
                .filter(|p| !l.is_permanently_failed(*p))
                .collect();
            (report.removed.len(), l.cursor_page, deferred)
        };

        let highest = if opts.start_page.is_none() && saved_cursor.is_none() {
            match self.source.highest_page().await {
                Ok(h) => h,
                Err(e) => {
                    tracing::warn!("could not ask source for its highest page: {}", e);
                    None
                }
            }
        } else {
            None
        };
        let start = resolve_start_page(
            opts.start_page,
            saved_cursor,
            highest,
            self.settings.default_start_page,
        );

        let limiter = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));
        let coordinator = RetryCoordinator::new(
            RetryPolicy {
                max_attempts: opts.max_attempts,
                ..self.policy
            },
            Arc::clone(&self.validator),
            Arc::clone(&self.agent),
            Arc::clone(&ledger),
            self.quarantine.clone(),
            Arc::clone(&limiter),
            self.control.token(),
        )
        .with_dry_run(opts.dry_run);
        let ctx = PageContext {
            source: &self.source,
            coordinator: &coordinator,
            ledger: &ledger,
            limiter: &limiter,
            duplicate_policy: self.settings.duplicate_policy,
            claimed: Default::default(),
        };

        tracing::info!(
            start,
            min_page,
            batch_size = opts.batch_size,
            max_attempts = opts.max_attempts,
            deferred = deferred.len(),
            dry_run = opts.dry_run,
            "run starting"
        );

        let mut summary = RunSummary::new(start, opts.dry_run);
        summary.reconciled_removed = reconciled;
        let mut cursor = start;
        let mut deferred = deferred;
        let mut pages_taken = 0usize;

        let stop = loop {
            if self.control.is_stopped() {
                break StopReason::Cancelled;
            }
            let budget = match opts.max_pages {
                Some(max) if pages_taken >= max => break StopReason::MaxPages,
                Some(max) => (max - pages_taken).min(opts.batch_size),
                None => opts.batch_size,
            };
            let guard = Arc::clone(&self.guard);
            let cap = opts.storage_cap_bytes;
            match tokio::task::spawn_blocking(move || guard.admission(cap)).await? {
                Admission::Allowed { used } => {
                    tracing::debug!(used, cap = ?opts.storage_cap_bytes, "storage admits more work")
                }
                Admission::CapReached { used, cap } => {
                    tracing::info!(used, cap, "storage cap reached, not admitting new pages");
                    break StopReason::StorageCap;
                }
                Admission::LowSpace { free, floor } => {
                    tracing::info!(free, floor, "free space below floor, not admitting new pages");
                    break StopReason::LowDiskSpace;
                }
            }

            let catch_up = !deferred.is_empty();
            let pages: Vec<u32> = if catch_up {
                let n = budget.min(deferred.len());
                deferred.drain(..n).collect()
            } else {
                let ledger_now = ledger.lock().await;
                select_batch(cursor, min_page, budget, ledger_now.ledger())
            };
            if pages.is_empty() {
                break StopReason::LowerBound;
            }
            pages_taken += pages.len();
            tracing::info!(pages = ?pages, catch_up, "batch starting");
            ctx.start_batch();

            let results: Vec<PageResult> = stream::iter(pages.iter().copied())
                .map(|p| process_page(&ctx, p))
                .buffer_unordered(pages.len())
                .try_collect()
                .await?;

            let mut interrupted = Vec::new();
            for result in results {
                match result {
                    PageResult::Deferred(p) => summary.pages_deferred.push(p),
                    PageResult::Ran {
                        discovered,
                        skipped,
                        report,
                    } => {
                        summary.items_discovered += discovered;
                        summary.items_skipped_duplicate += skipped;
                        summary.items_completed += report.completed.len();
                        summary.items_failed += report.failed.len();
                        summary.items_pending += report.pending.len();
                        summary.enqueue_errors += report.enqueue_errors;
                        summary.failed_item_ids.extend(report.failed.iter().cloned());
                        match report.outcome {
                            PageOutcome::Settled => {
                                summary.pages_processed += 1;
                                if !report.failed.is_empty() {
                                    summary.pages_escalated.push(report.page);
                                }
                            }
                            PageOutcome::Interrupted => {
                                summary.pages_interrupted.push(report.page);
                                interrupted.push(report.page);
                            }
                        }
                    }
                }
            }

            {
                let mut store = ledger.lock().await;
                if catch_up {
                    for p in &interrupted {
                        store.ledger_mut().defer_page(*p);
                    }
                } else if let Some(next) = next_cursor(&pages, &interrupted) {
                    cursor = next;
                    store.ledger_mut().update_cursor(next);
                }
                store.commit().await?;
            }
            self.guard.invalidate();
            tracing::info!(cursor, "batch committed");
        };

        summary.pages_deferred.sort_unstable_by(|a, b| b.cmp(a));
        summary.pages_interrupted.sort_unstable_by(|a, b| b.cmp(a));
        summary.pages_escalated.sort_unstable_by(|a, b| b.cmp(a));
        summary.final_cursor = ledger.lock().await.ledger().cursor_page;
        summary.stop_reason = stop;
        tracing::info!(
            stop_reason = %stop,
            pages = summary.pages_processed,
            completed = summary.items_completed,
            failed = summary.items_failed,
            "run finished"
        );
        Ok(summary)
    }
}
