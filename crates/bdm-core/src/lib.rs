//! Batch download orchestration: discovers items page by page, hands their assets to
//! an external download agent, verifies results on disk and keeps a crash-safe
//! progress ledger.

pub mod collab;
pub mod config;
pub mod control;
pub mod dedup;
pub mod error;
pub mod item;
pub mod ledger;
pub mod logging;
pub mod orchestrator;
pub mod retry;
pub mod storage;
pub mod validator;

pub use error::{DiscoveryError, EnqueueError, LedgerIoError, RunError};
pub use orchestrator::{BatchOrchestrator, RunOptions, RunSummary, StopReason};
