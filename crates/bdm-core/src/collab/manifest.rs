//! Page source backed by per-page manifest files written by an external scraper.
//!
//! `page_<n>.json` holds either a bare array of items or `{"items": [...]}`.

use async_trait::async_trait;
use serde::Deserialize;
use std::io;
use std::path::{Path, PathBuf};

use super::PageSource;
use crate::error::DiscoveryError;
use crate::item::{AssetSpec, ItemDescriptor};

pub fn manifest_file_name(page: u32) -> String {
    format!("page_{}.json", page)
}

fn page_from_file_name(name: &str) -> Option<u32> {
    name.strip_prefix("page_")?.strip_suffix(".json")?.parse().ok()
}

#[derive(Debug, Deserialize)]
struct ManifestItem {
    id: String,
    assets: Vec<AssetSpec>,
    #[serde(default)]
    target_folder: Option<PathBuf>,
    #[serde(default)]
    metadata: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Manifest {
    Items(Vec<ManifestItem>),
    Wrapped { items: Vec<ManifestItem> },
}

#[derive(Debug, Clone)]
pub struct ManifestSource {
    dir: PathBuf,
    download_root: PathBuf,
}

impl ManifestSource {
    pub fn new(dir: impl Into<PathBuf>, download_root: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            download_root: download_root.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Absent target folders become `<root>/page_<n>/<id>`; relative ones are
    /// taken relative to the root.
    fn resolve_folder(&self, page: u32, item: &ManifestItem) -> PathBuf {
        match &item.target_folder {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => self.download_root.join(p),
            None => self
                .download_root
                .join(format!("page_{}", page))
                .join(item.id.replace(['/', '\\'], "_")),
        }
    }
}

#[async_trait]
impl PageSource for ManifestSource {
    async fn discover(&self, page: u32) -> Result<Vec<ItemDescriptor>, DiscoveryError> {
        let path = self.dir.join(manifest_file_name(page));
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(DiscoveryError::Unavailable {
                    page,
                    reason: format!("no manifest at {}", path.display()),
                })
            }
            Err(source) => return Err(DiscoveryError::Io { page, source }),
        };
        let manifest: Manifest =
            serde_json::from_slice(&bytes).map_err(|e| DiscoveryError::Parse {
                page,
                reason: e.to_string(),
            })?;
        let raw = match manifest {
            Manifest::Items(items) | Manifest::Wrapped { items } => items,
        };

        let mut items = Vec::with_capacity(raw.len());
        for entry in raw {
            let descriptor = ItemDescriptor {
                target_folder: self.resolve_folder(page, &entry),
                id: entry.id,
                page,
                assets: entry.assets,
                metadata: entry.metadata,
            };
            match descriptor.check() {
                Ok(()) => items.push(descriptor),
                Err(reason) => tracing::warn!(page, "skipping manifest entry: {}", reason),
            }
        }
        tracing::debug!(page, items = items.len(), "manifest loaded");
        Ok(items)
    }

    async fn highest_page(&self) -> Result<Option<u32>, DiscoveryError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(DiscoveryError::Io { page: 0, source }),
        };
        let mut highest = None;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| DiscoveryError::Io { page: 0, source })?
        {
            if let Some(n) = entry.file_name().to_str().and_then(page_from_file_name) {
                highest = highest.max(Some(n));
            }
        }
        Ok(highest)
    }
}
