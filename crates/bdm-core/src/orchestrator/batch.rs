//! Page selection and cursor arithmetic.

use crate::ledger::Ledger;

/// Up to `size` pages descending from `cursor`, skipping permanently failed pages
/// and stopping below `min_page`.
pub fn select_batch(cursor: u32, min_page: u32, size: usize, ledger: &Ledger) -> Vec<u32> {
    if cursor < min_page || size == 0 {
        return Vec::new();
    }
    (min_page..=cursor)
        .rev()
        .filter(|p| !ledger.is_permanently_failed(*p))
        .take(size)
        .collect()
}

/// Cursor after a batch: just below the lowest page, unless a page was
/// interrupted, in which case the highest interrupted page is redone next.
pub fn next_cursor(batch: &[u32], interrupted: &[u32]) -> Option<u32> {
    if let Some(&p) = interrupted.iter().max() {
        return Some(p);
    }
    batch.iter().min().map(|p| p.saturating_sub(1))
}

/// Explicit start, then the saved cursor, then the source's highest page, then the default.
pub fn resolve_start_page(
    explicit: Option<u32>,
    cursor: Option<u32>,
    highest: Option<u32>,
    default_start: u32,
) -> u32 {
    explicit.or(cursor).or(highest).unwrap_or(default_start)
}
