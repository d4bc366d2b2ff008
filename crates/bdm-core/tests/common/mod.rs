//! Shared fixtures for orchestrator integration tests: a scripted page source and
//! an agent that "downloads" by writing files into the target folder.

#![allow(dead_code)]

pub mod fakes;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bdm_core::collab::{DownloadAgent, PageSource};
use bdm_core::item::{AssetKind, AssetSpec, ItemDescriptor};
use bdm_core::ledger::LedgerStore;
use bdm_core::orchestrator::BatchOrchestrator;
use bdm_core::retry::RetryPolicy;
use bdm_core::storage::{Quarantine, StorageGuard};

/// Item with a primary and a metadata asset, both fetched by URL.
pub fn item(root: &Path, page: u32, id: &str) -> ItemDescriptor {
    ItemDescriptor {
        id: id.to_string(),
        page,
        assets: vec![
            AssetSpec {
                kind: AssetKind::Primary,
                url: Some(format!("https://cdn.example/{id}.mp4")),
                filename: format!("{id}.mp4"),
            },
            AssetSpec {
                kind: AssetKind::Metadata,
                url: Some(format!("https://cdn.example/{id}.json")),
                filename: format!("{id}.json"),
            },
        ],
        target_folder: root.join(format!("page_{page}")).join(id),
        metadata: serde_json::Value::Null,
    }
}

/// Bytes that pass validation for the file's kind (by extension).
pub fn valid_bytes(filename: &str) -> Vec<u8> {
    if filename.ends_with(".mp4") {
        let mut v = b"\x00\x00\x00\x18ftypisom".to_vec();
        v.resize(4096, 3);
        v
    } else if filename.ends_with(".json") {
        br#"{"id": "fixture"}"#.to_vec()
    } else {
        let mut v = b"\x89PNG\r\n\x1a\n".to_vec();
        v.resize(256, 4);
        v
    }
}

pub fn quick_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_wait: Duration::from_millis(30),
        retry_wait: Duration::from_millis(30),
        poll_interval: Duration::from_millis(5),
    }
}

pub struct Layout {
    pub _tmp: tempfile::TempDir,
    pub root: PathBuf,
    pub quarantine: PathBuf,
    pub ledger_path: PathBuf,
}

pub fn layout() -> Layout {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("downloads");
    let quarantine = tmp.path().join("downloads.quarantine");
    let ledger_path = tmp.path().join("state").join("progress.json");
    std::fs::create_dir_all(&root).unwrap();
    Layout {
        root,
        quarantine,
        ledger_path,
        _tmp: tmp,
    }
}

pub fn orchestrator(
    layout: &Layout,
    source: Arc<dyn PageSource>,
    agent: Arc<dyn DownloadAgent>,
    max_attempts: u32,
) -> BatchOrchestrator {
    let store = LedgerStore::open(&layout.ledger_path).unwrap();
    let guard = StorageGuard::new(&layout.root, Duration::from_secs(3600));
    BatchOrchestrator::new(source, agent, store, guard, Quarantine::new(&layout.quarantine))
        .with_policy(quick_policy(max_attempts))
}
