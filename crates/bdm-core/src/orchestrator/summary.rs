use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The cursor fell below the lowest page.
    LowerBound,
    StorageCap,
    /// Free space on the volume fell below the configured floor.
    LowDiskSpace,
    Cancelled,
    MaxPages,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StopReason::LowerBound => "lower_bound",
            StopReason::StorageCap => "storage_cap",
            StopReason::LowDiskSpace => "low_disk_space",
            StopReason::Cancelled => "cancelled",
            StopReason::MaxPages => "max_pages",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured end-of-run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub start_page: u32,
    pub final_cursor: Option<u32>,
    pub pages_processed: usize,
    pub pages_deferred: Vec<u32>,
    pub pages_interrupted: Vec<u32>,
    pub pages_escalated: Vec<u32>,
    pub items_discovered: usize,
    pub items_completed: usize,
    pub items_failed: usize,
    pub items_skipped_duplicate: usize,
    /// Dry runs: items that would have been handed to the agent.
    pub items_pending: usize,
    pub enqueue_errors: usize,
    pub reconciled_removed: usize,
    pub failed_item_ids: Vec<String>,
    pub stop_reason: StopReason,
    pub dry_run: bool,
}

impl RunSummary {
    pub(crate) fn new(start_page: u32, dry_run: bool) -> Self {
        Self {
            start_page,
            final_cursor: None,
            pages_processed: 0,
            pages_deferred: Vec::new(),
            pages_interrupted: Vec::new(),
            pages_escalated: Vec::new(),
            items_discovered: 0,
            items_completed: 0,
            items_failed: 0,
            items_skipped_duplicate: 0,
            items_pending: 0,
            enqueue_errors: 0,
            reconciled_removed: 0,
            failed_item_ids: Vec::new(),
            stop_reason: StopReason::LowerBound,
            dry_run,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "stopped: {}{}",
            self.stop_reason,
            if self.dry_run { " (dry run)" } else { "" }
        )?;
        writeln!(f, "  start page:        {}", self.start_page)?;
        match self.final_cursor {
            Some(c) => writeln!(f, "  next page:         {}", c)?,
            None => writeln!(f, "  next page:         -")?,
        }
        writeln!(f, "  pages processed:   {}", self.pages_processed)?;
        writeln!(f, "  items discovered:  {}", self.items_discovered)?;
        writeln!(f, "  items completed:   {}", self.items_completed)?;
        writeln!(f, "  items failed:      {}", self.items_failed)?;
        if self.items_skipped_duplicate > 0 {
            writeln!(f, "  duplicates:        {}", self.items_skipped_duplicate)?;
        }
        if self.dry_run {
            writeln!(f, "  would enqueue:     {}", self.items_pending)?;
        }
        if !self.pages_deferred.is_empty() {
            writeln!(f, "  deferred pages:    {:?}", self.pages_deferred)?;
        }
        if !self.pages_interrupted.is_empty() {
            writeln!(f, "  interrupted pages: {:?}", self.pages_interrupted)?;
        }
        for id in &self.failed_item_ids {
            writeln!(f, "  failed: {}", id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_reason_serializes_snake_case() {
        let s = serde_json::to_string(&StopReason::StorageCap).unwrap();
        assert_eq!(s, "\"storage_cap\"");
        assert_eq!(StopReason::LowerBound.to_string(), "lower_bound");
    }

    #[test]
    fn summary_json_carries_stop_reason() {
        let mut s = RunSummary::new(5, false);
        s.stop_reason = StopReason::Cancelled;
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["stop_reason"], "cancelled");
        assert_eq!(v["start_page"], 5);
    }
}
