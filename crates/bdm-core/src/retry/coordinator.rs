//! Drives the enqueue, wait, validate, retry cycle for the items of one page.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;

use super::policy::{ItemEvent, ItemState, RetryPolicy};
use super::wait::{wait_window, WaitOutcome};
use crate::collab::{write_inline_metadata, DownloadAgent};
use crate::error::{EnqueueError, RunError};
use crate::item::{AssetKind, ItemDescriptor};
use crate::ledger::LedgerStore;
use crate::storage::Quarantine;
use crate::validator::{AssetValidator, Validation, ValidationIoError};

type Checked = (ItemDescriptor, Result<Validation, ValidationIoError>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// Every item completed or was escalated.
    Settled,
    /// Cancelled between rounds; attempt records were kept and the page must be redone.
    Interrupted,
}

#[derive(Debug, Clone)]
pub struct PageReport {
    pub page: u32,
    pub outcome: PageOutcome,
    pub completed: Vec<String>,
    /// Items quarantined after exhausting their attempts.
    pub failed: Vec<String>,
    /// Dry runs only: items that would have been enqueued.
    pub pending: Vec<String>,
    pub enqueue_errors: usize,
    pub rounds: u32,
}

impl PageReport {
    fn new(page: u32) -> Self {
        Self {
            page,
            outcome: PageOutcome::Settled,
            completed: Vec::new(),
            failed: Vec::new(),
            pending: Vec::new(),
            enqueue_errors: 0,
            rounds: 0,
        }
    }
}

struct Tracked {
    item: ItemDescriptor,
    state: ItemState,
    /// Asset file names still to fetch.
    missing_files: Vec<String>,
    missing_kinds: Vec<AssetKind>,
}

impl Tracked {
    fn new(item: ItemDescriptor) -> Self {
        let mut t = Self {
            item,
            state: ItemState::Enqueued,
            missing_files: Vec::new(),
            missing_kinds: Vec::new(),
        };
        t.assume_all_missing();
        t
    }

    fn assume_all_missing(&mut self) {
        self.missing_files = self.item.assets.iter().map(|a| a.filename.clone()).collect();
        let mut kinds: Vec<AssetKind> = self.item.assets.iter().map(|a| a.kind).collect();
        kinds.sort();
        kinds.dedup();
        self.missing_kinds = kinds;
    }

    fn take_validation(&mut self, v: &Validation) {
        self.missing_files = self
            .item
            .assets
            .iter()
            .filter(|a| v.is_missing_file(&a.filename))
            .map(|a| a.filename.clone())
            .collect();
        self.missing_kinds = v.missing.clone();
    }

    fn advance(&mut self, event: ItemEvent, policy: &RetryPolicy) {
        match self.state.on(event, policy) {
            Some(next) => self.state = next,
            None => tracing::debug!(item = %self.item.id, state = ?self.state, ?event, "ignored transition"),
        }
    }
}

/// Per-page retry driver. Ledger writes go through the shared store, one commit
/// per validation round.
pub struct RetryCoordinator {
    policy: RetryPolicy,
    validator: Arc<AssetValidator>,
    agent: Arc<dyn DownloadAgent>,
    ledger: Arc<Mutex<LedgerStore>>,
    quarantine: Quarantine,
    limiter: Arc<Semaphore>,
    cancel: CancellationToken,
    dry_run: bool,
}

impl RetryCoordinator {
    pub fn new(
        policy: RetryPolicy,
        validator: Arc<AssetValidator>,
        agent: Arc<dyn DownloadAgent>,
        ledger: Arc<Mutex<LedgerStore>>,
        quarantine: Quarantine,
        limiter: Arc<Semaphore>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            policy,
            validator,
            agent,
            ledger,
            quarantine,
            limiter,
            cancel,
            dry_run: false,
        }
    }

    /// Validate only: no agent calls, inline writes, waits or quarantine moves.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        if dry_run {
            self.policy = self.policy.without_waits();
        }
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `items` (all from `page`) until each is completed or escalated, or until
    /// cancellation is observed between rounds.
    pub async fn run_page(
        &self,
        page: u32,
        items: Vec<ItemDescriptor>,
    ) -> Result<PageReport, RunError> {
        let mut report = PageReport::new(page);

        // Folders that already validate need no transfer and cost no attempt.
        let mut tracked = Vec::with_capacity(items.len());
        let mut done = Vec::new();
        for (item, verdict) in self.validate_off_thread(items).await? {
            match verdict {
                Ok(v) if v.complete => done.push(item),
                Ok(v) => {
                    let mut t = Tracked::new(item);
                    t.take_validation(&v);
                    tracked.push(t);
                }
                Err(e) => {
                    tracing::warn!(page, item = %item.id, "pre-check failed: {}", e);
                    tracked.push(Tracked::new(item));
                }
            }
        }

        let spent: Vec<ItemDescriptor> = {
            let mut store = self.ledger.lock().await;
            for item in &done {
                store.ledger_mut().mark_completed(
                    &item.id,
                    page,
                    &item.target_folder,
                    item.required_assets(),
                );
                report.completed.push(item.id.clone());
            }
            if !done.is_empty() {
                store.commit().await?;
                tracing::debug!(page, items = done.len(), "already complete on disk");
            }

            // A run that stopped between the last failed round and the quarantine
            // leaves records at the ceiling. Those items get no further cycle.
            let max = self.policy.max_attempts;
            let (spent, live): (Vec<Tracked>, Vec<Tracked>) = tracked
                .into_iter()
                .partition(|t| store.ledger().attempts_for(&t.item.id) >= max);
            tracked = live;
            spent.into_iter().map(|t| t.item).collect()
        };

        if self.dry_run {
            report.failed = spent.into_iter().map(|item| item.id).collect();
            report.pending = tracked.into_iter().map(|t| t.item.id).collect();
            return Ok(report);
        }

        if !spent.is_empty() {
            for item in &spent {
                tracing::warn!(page, item = %item.id, "attempt budget already spent, not re-enqueuing");
            }
            self.settle_exhausted(page, spent, &mut report).await?;
        }

        let mut round = 0u32;
        while tracked.iter().any(|t| !t.state.is_terminal()) {
            if self.cancel.is_cancelled() {
                report.outcome = PageOutcome::Interrupted;
                break;
            }

            report.enqueue_errors += self.enqueue_round(page, &mut tracked).await;

            let window = self.policy.wait_for_round(round);
            let (this, live) = (self, &tracked);
            let outcome = wait_window(window, self.policy.poll_interval, &self.cancel, move || {
                this.all_ready(live)
            })
            .await;
            if outcome == WaitOutcome::Cancelled {
                tracing::info!(page, round, "wait cancelled, page left for the next run");
                report.outcome = PageOutcome::Interrupted;
                break;
            }

            self.validate_round(page, &mut tracked, &mut report).await?;
            round += 1;
        }
        report.rounds = round;

        if report.outcome == PageOutcome::Settled && !report.failed.is_empty() {
            let mut store = self.ledger.lock().await;
            let dropped = store.ledger_mut().escalate_to_permanent(page);
            store.commit().await?;
            tracing::warn!(
                page,
                failed = report.failed.len(),
                dropped,
                "page escalated to permanently failed"
            );
        }
        Ok(report)
    }

    /// Validate on the blocking pool; results come back in input order.
    async fn validate_off_thread(
        &self,
        items: Vec<ItemDescriptor>,
    ) -> Result<Vec<Checked>, RunError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let validator = Arc::clone(&self.validator);
        let checked = tokio::task::spawn_blocking(move || {
            items
                .into_iter()
                .map(|item| {
                    let verdict = validator.validate_item(&item);
                    (item, verdict)
                })
                .collect::<Vec<Checked>>()
        })
        .await?;
        Ok(checked)
    }

    async fn all_ready(&self, tracked: &[Tracked]) -> bool {
        let live: Vec<ItemDescriptor> = tracked
            .iter()
            .filter(|t| !t.state.is_terminal())
            .map(|t| t.item.clone())
            .collect();
        match self.validate_off_thread(live).await {
            Ok(checked) => checked
                .iter()
                .all(|(_, verdict)| matches!(verdict, Ok(v) if v.complete)),
            Err(e) => {
                tracing::warn!("readiness check failed: {}", e);
                false
            }
        }
    }

    /// Hand every missing asset of every live item to the agent. Returns the
    /// number of enqueue failures.
    async fn enqueue_round(&self, page: u32, tracked: &mut [Tracked]) -> usize {
        let mut jobs = Vec::new();
        let mut inline = Vec::new();
        for t in tracked.iter_mut().filter(|t| !t.state.is_terminal()) {
            if t.state == ItemState::RetryPending {
                t.advance(ItemEvent::Reenqueued, &self.policy);
            }
            for asset in t
                .item
                .assets
                .iter()
                .filter(|a| t.missing_files.contains(&a.filename))
            {
                match &asset.url {
                    Some(url) => jobs.push((
                        t.item.id.clone(),
                        url.clone(),
                        t.item.target_folder.clone(),
                        asset.filename.clone(),
                    )),
                    None => inline.push((t.item.clone(), asset.filename.clone())),
                }
            }
        }
        if !inline.is_empty() {
            let written = tokio::task::spawn_blocking(move || {
                for (item, filename) in inline {
                    if let Err(e) = write_inline_metadata(&item, &filename) {
                        tracing::warn!(page, item = %item.id, "inline metadata write failed: {}", e);
                    }
                }
            })
            .await;
            if let Err(e) = written {
                tracing::warn!(page, "inline metadata task failed: {}", e);
            }
        }
        if jobs.is_empty() {
            return 0;
        }

        let width = jobs.len();
        let results: Vec<Result<(), EnqueueError>> = stream::iter(jobs)
            .map(|(id, url, folder, filename)| {
                let agent = Arc::clone(&self.agent);
                let limiter = Arc::clone(&self.limiter);
                async move {
                    let _permit = limiter.acquire_owned().await.ok();
                    let res = agent.enqueue(&url, &folder, &filename).await;
                    match &res {
                        Ok(()) => tracing::debug!(page, item = %id, file = %filename, "enqueued"),
                        Err(e) => tracing::warn!(page, item = %id, file = %filename, "enqueue failed: {}", e),
                    }
                    res
                }
            })
            .buffer_unordered(width)
            .collect()
            .await;

        let failures = results.iter().filter(|r| r.is_err()).count();
        if failures < results.len() {
            let _permit = self.limiter.acquire().await.ok();
            if let Err(e) = self.agent.start_or_resume().await {
                tracing::warn!(page, "agent start failed: {}", e);
            }
        }
        failures
    }

    async fn validate_round(
        &self,
        page: u32,
        tracked: &mut [Tracked],
        report: &mut PageReport,
    ) -> Result<(), RunError> {
        let live: Vec<usize> = (0..tracked.len())
            .filter(|&i| !tracked[i].state.is_terminal())
            .collect();
        let items = live.iter().map(|&i| tracked[i].item.clone()).collect();
        let verdicts = self.validate_off_thread(items).await?;

        let mut exhausted = Vec::new();
        {
            let mut store = self.ledger.lock().await;
            for (idx, (_, verdict)) in live.into_iter().zip(verdicts) {
                let t = &mut tracked[idx];
                t.advance(ItemEvent::WaitOver, &self.policy);
                match verdict {
                    Ok(v) if v.complete => {
                        store.ledger_mut().mark_completed(
                            &t.item.id,
                            page,
                            &t.item.target_folder,
                            t.item.required_assets(),
                        );
                        t.advance(ItemEvent::Valid, &self.policy);
                        report.completed.push(t.item.id.clone());
                        tracing::info!(page, item = %t.item.id, "item complete");
                        continue;
                    }
                    Ok(v) => t.take_validation(&v),
                    Err(e) => {
                        tracing::warn!(page, item = %t.item.id, "validation I/O error: {}", e);
                        t.assume_all_missing();
                    }
                }
                let attempts = store.ledger_mut().record_failure(
                    &t.item.id,
                    page,
                    &t.item.target_folder,
                    &t.missing_kinds,
                    self.policy.max_attempts,
                );
                t.advance(ItemEvent::Invalid { attempts }, &self.policy);
                tracing::info!(
                    page,
                    item = %t.item.id,
                    attempt = attempts,
                    missing = ?t.missing_kinds,
                    "item incomplete"
                );
                if t.state == ItemState::PermanentlyFailed {
                    exhausted.push(t.item.clone());
                }
            }
            store.commit().await?;
        }
        if exhausted.is_empty() {
            return Ok(());
        }
        self.settle_exhausted(page, exhausted, report).await
    }

    /// Quarantine the folders of `items` on the blocking pool, then move the items
    /// from the retry pool into the failure log.
    async fn settle_exhausted(
        &self,
        page: u32,
        items: Vec<ItemDescriptor>,
        report: &mut PageReport,
    ) -> Result<(), RunError> {
        let quarantine = self.quarantine.clone();
        let moves = tokio::task::spawn_blocking(move || {
            items
                .into_iter()
                .map(|item| {
                    let moved = match quarantine.move_in(&item.target_folder) {
                        Ok(to) => (to, None),
                        Err(e) => {
                            tracing::error!(page, item = %item.id, "quarantine move failed: {}", e);
                            (None, Some(e.to_string()))
                        }
                    };
                    (item.id, moved)
                })
                .collect::<Vec<_>>()
        })
        .await?;

        let mut store = self.ledger.lock().await;
        for (id, (to, err)) in moves {
            store.ledger_mut().record_permanent_failure(&id, to, err);
            tracing::warn!(page, item = %id, "item permanently failed");
            report.failed.push(id);
        }
        store.commit().await?;
        Ok(())
    }
}
