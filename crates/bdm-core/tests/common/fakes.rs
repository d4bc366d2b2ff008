use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use bdm_core::collab::{DownloadAgent, PageSource};
use bdm_core::error::{DiscoveryError, EnqueueError};
use bdm_core::item::ItemDescriptor;

use super::valid_bytes;

/// Serves fixed item lists per page; pages in `failing` return a discovery error.
#[derive(Default)]
pub struct ScriptedSource {
    pages: HashMap<u32, Vec<ItemDescriptor>>,
    failing: Mutex<HashSet<u32>>,
    highest: Option<u32>,
    calls: Mutex<Vec<u32>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: u32, items: Vec<ItemDescriptor>) -> Self {
        self.pages.insert(page, items);
        self
    }

    pub fn failing(self, page: u32) -> Self {
        self.failing.lock().unwrap().insert(page);
        self
    }

    pub fn highest(mut self, page: u32) -> Self {
        self.highest = Some(page);
        self
    }

    pub fn recover(&self, page: u32) {
        self.failing.lock().unwrap().remove(&page);
    }

    pub fn calls(&self) -> Vec<u32> {
        self.calls.lock().unwrap().clone()
    }

    pub fn sorted_calls(&self) -> Vec<u32> {
        let mut c = self.calls();
        c.sort_unstable_by(|a, b| b.cmp(a));
        c
    }
}

#[async_trait]
impl PageSource for ScriptedSource {
    async fn discover(&self, page: u32) -> Result<Vec<ItemDescriptor>, DiscoveryError> {
        self.calls.lock().unwrap().push(page);
        if self.failing.lock().unwrap().contains(&page) {
            return Err(DiscoveryError::Unavailable {
                page,
                reason: "listing timed out".to_string(),
            });
        }
        Ok(self.pages.get(&page).cloned().unwrap_or_default())
    }

    async fn highest_page(&self) -> Result<Option<u32>, DiscoveryError> {
        Ok(self.highest)
    }
}

type Rule = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Writes a valid file for every enqueued asset the rule accepts.
pub struct FileAgent {
    rule: Rule,
    enqueued: Mutex<Vec<String>>,
    starts: Mutex<usize>,
}

impl FileAgent {
    pub fn new(rule: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            rule: Box::new(rule),
            enqueued: Mutex::new(Vec::new()),
            starts: Mutex::new(0),
        }
    }

    pub fn writes_everything() -> Self {
        Self::new(|_| true)
    }

    pub fn writes_nothing() -> Self {
        Self::new(|_| false)
    }

    pub fn enqueued(&self) -> Vec<String> {
        self.enqueued.lock().unwrap().clone()
    }

    pub fn starts(&self) -> usize {
        *self.starts.lock().unwrap()
    }
}

#[async_trait]
impl DownloadAgent for FileAgent {
    async fn enqueue(&self, _url: &str, dest: &Path, filename: &str) -> Result<(), EnqueueError> {
        self.enqueued.lock().unwrap().push(filename.to_string());
        std::fs::create_dir_all(dest).map_err(|source| EnqueueError::Prepare {
            path: dest.to_path_buf(),
            source,
        })?;
        if (self.rule)(filename) {
            std::fs::write(dest.join(filename), valid_bytes(filename)).unwrap();
        }
        Ok(())
    }

    async fn start_or_resume(&self) -> Result<(), EnqueueError> {
        *self.starts.lock().unwrap() += 1;
        Ok(())
    }
}
