//! Item-level retry: attempt budget, bounded waits, and the per-page cycle.

mod coordinator;
mod policy;
mod wait;


pub use coordinator::{PageOutcome, PageReport, RetryCoordinator};
pub use policy::{ItemEvent, ItemState, RetryPolicy};
pub use wait::{wait_window, WaitOutcome};
