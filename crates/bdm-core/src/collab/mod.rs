//! Collaborators the orchestrator drives but does not implement: page discovery
//! and the download agent. Both are trait objects so runs can be wired to real
//! tools or to in-process fakes.

mod command_agent;
mod manifest;
mod metadata;

pub use command_agent::CommandAgent;
pub use manifest::{manifest_file_name, ManifestSource};
pub use metadata::write_inline_metadata;

use async_trait::async_trait;
use std::path::Path;

use crate::error::{DiscoveryError, EnqueueError};
use crate::item::ItemDescriptor;

/// Turns a page number into the items listed on it.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Items on `page`. Failures are transient; the page is revisited on a later run.
    async fn discover(&self, page: u32) -> Result<Vec<ItemDescriptor>, DiscoveryError>;

    /// Highest page the source knows about, used as a start page when nothing else is set.
    async fn highest_page(&self) -> Result<Option<u32>, DiscoveryError> {
        Ok(None)
    }
}

/// Queue-based external downloader. Completion is never reported back; it is
/// inferred from the filesystem by the validator.
#[async_trait]
pub trait DownloadAgent: Send + Sync {
    async fn enqueue(&self, url: &str, dest: &Path, filename: &str) -> Result<(), EnqueueError>;

    async fn start_or_resume(&self) -> Result<(), EnqueueError>;
}

/// Stand-in when no agent program is configured. Every call fails with
/// `NotConfigured`; only useful for dry runs, which never call the agent.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredAgent;

#[async_trait]
impl DownloadAgent for UnconfiguredAgent {
    async fn enqueue(&self, _url: &str, _dest: &Path, _filename: &str) -> Result<(), EnqueueError> {
        Err(EnqueueError::NotConfigured)
    }

    async fn start_or_resume(&self) -> Result<(), EnqueueError> {
        Err(EnqueueError::NotConfigured)
    }
}
