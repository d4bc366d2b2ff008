//! One page: discover, filter, then hand the items to the retry coordinator.

use std::collections::HashSet;
use std::sync::{Arc, Mutex as SyncMutex, PoisonError};
use tokio::sync::{Mutex, Semaphore};

use crate::collab::PageSource;
use crate::dedup::{filter_items, DuplicatePolicy};
use crate::error::RunError;
use crate::ledger::LedgerStore;
use crate::retry::{PageReport, RetryCoordinator};

pub(crate) enum PageResult {
    /// Discovery failed; the page is deferred to the next run.
    Deferred(u32),
    Ran {
        discovered: usize,
        skipped: usize,
        report: PageReport,
    },
}

/// Per-run wiring shared by every page of the run.
pub(crate) struct PageContext<'a> {
    pub source: &'a Arc<dyn PageSource>,
    pub coordinator: &'a RetryCoordinator,
    pub ledger: &'a Arc<Mutex<LedgerStore>>,
    pub limiter: &'a Arc<Semaphore>,
    pub duplicate_policy: DuplicatePolicy,
    /// Item ids taken by a page of the current batch. Attempt records are keyed
    /// by id alone, so an id listed on two pages is only run by the first.
    pub claimed: SyncMutex<HashSet<String>>,
}

impl PageContext<'_> {
    pub fn start_batch(&self) {
        self.claimed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

pub(crate) async fn process_page(ctx: &PageContext<'_>, page: u32) -> Result<PageResult, RunError> {
    let discovered = {
        let _permit = ctx.limiter.acquire().await.ok();
        ctx.source.discover(page).await
    };
    let items = match discovered {
        Ok(items) => items,
        Err(e) => {
            tracing::warn!(page, "discovery failed, deferring: {}", e);
            ctx.ledger.lock().await.ledger_mut().defer_page(page);
            return Ok(PageResult::Deferred(page));
        }
    };

    let total = items.len();
    let items: Vec<_> = items
        .into_iter()
        .filter(|item| match item.check() {
            Ok(()) => true,
            Err(reason) => {
                tracing::warn!(page, "dropping item: {}", reason);
                false
            }
        })
        .collect();

    let (items, skipped) = {
        let mut store = ctx.ledger.lock().await;
        store.ledger_mut().clear_deferred(page);
        let (items, mut skipped) = filter_items(ctx.duplicate_policy, store.ledger(), items);
        let mut claimed = ctx.claimed.lock().unwrap_or_else(PoisonError::into_inner);
        let (items, taken): (Vec<_>, Vec<_>) = items
            .into_iter()
            .partition(|item| claimed.insert(item.id.clone()));
        for item in taken {
            tracing::debug!(page, item = %item.id, "already claimed in this batch, skipping");
            skipped.push(item.id);
        }
        (items, skipped)
    };
    tracing::info!(
        page,
        discovered = total,
        queued = items.len(),
        duplicates = skipped.len(),
        "page discovered"
    );

    let report = ctx.coordinator.run_page(page, items).await?;
    Ok(PageResult::Ran {
        discovered: total,
        skipped: skipped.len(),
        report,
    })
}
