use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::dedup::DuplicatePolicy;

/// Batch and retry parameters (`[batch]` section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Pages taken per batch, descending from the cursor.
    pub batch_pages: usize,
    /// Validation cycles per item before it is quarantined.
    pub max_attempts: u32,
    /// Wait after the first enqueue, before the first validation (seconds).
    pub initial_wait_secs: f64,
    /// Wait after re-enqueuing missing assets (seconds).
    pub retry_wait_secs: f64,
    /// Poll interval inside a wait window (seconds).
    pub poll_interval_secs: f64,
    /// Max concurrent discovery / agent calls across a batch.
    pub concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_pages: 3,
            max_attempts: 3,
            initial_wait_secs: 240.0,
            retry_wait_secs: 120.0,
            poll_interval_secs: 10.0,
            concurrency: 8,
        }
    }
}

/// Required-file policy thresholds (`[validation]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub min_primary_bytes: u64,
    /// At least one of these must appear near the start of the primary file.
    pub primary_markers: Vec<String>,
    /// How many leading bytes are searched for a marker.
    pub marker_window: usize,
    pub min_preview_bytes: u64,
    pub check_preview_format: bool,
    pub required_metadata_fields: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_primary_bytes: 1024,
            primary_markers: vec!["ftyp".to_string()],
            marker_window: 32,
            min_preview_bytes: 100,
            check_preview_format: true,
            required_metadata_fields: Vec::new(),
        }
    }
}

/// External download agent invocation (`[agent]` section).
///
/// Argument templates may contain `{url}`, `{folder}` and `{filename}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent executable. Required unless running with `--dry-run`.
    pub program: Option<String>,
    pub enqueue_args: Vec<String>,
    pub start_args: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            program: None,
            enqueue_args: ["/d", "{url}", "/p", "{folder}", "/f", "{filename}", "/a", "/n"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            start_args: vec!["/s".to_string()],
            timeout_secs: 30,
        }
    }
}

/// Global configuration loaded from `~/.config/bdm/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BdmConfig {
    /// Managed download root; item folders live below it.
    pub download_root: PathBuf,
    /// Where permanently failed item folders are moved (default: `<root>.quarantine`).
    #[serde(default)]
    pub quarantine_dir: Option<PathBuf>,
    /// Ledger file (default: `~/.local/state/bdm/progress.json`).
    #[serde(default)]
    pub ledger_path: Option<PathBuf>,
    /// Directory of per-page manifests consumed by `bdm run`.
    #[serde(default)]
    pub manifest_dir: Option<PathBuf>,
    /// Stop admitting pages once the managed root holds this many bytes (None = no cap).
    #[serde(default)]
    pub storage_cap_bytes: Option<u64>,
    /// Stop admitting pages when free space on the volume drops below this.
    #[serde(default)]
    pub min_free_bytes: Option<u64>,
    /// How long a computed usage total is reused before re-walking the root.
    #[serde(default = "default_storage_refresh_secs")]
    pub storage_refresh_secs: u64,
    /// Lowest page number; the run stops once the cursor drops below it.
    #[serde(default = "default_min_page")]
    pub min_page: u32,
    /// Start page when neither the ledger nor the source provides one.
    #[serde(default = "default_start_page")]
    pub default_start_page: u32,
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

fn default_storage_refresh_secs() -> u64 {
    30
}

fn default_min_page() -> u32 {
    1
}

fn default_start_page() -> u32 {
    1000
}

impl Default for BdmConfig {
    fn default() -> Self {
        Self {
            download_root: PathBuf::from("downloads"),
            quarantine_dir: None,
            ledger_path: None,
            manifest_dir: None,
            storage_cap_bytes: None,
            min_free_bytes: None,
            storage_refresh_secs: default_storage_refresh_secs(),
            min_page: default_min_page(),
            default_start_page: default_start_page(),
            duplicate_policy: DuplicatePolicy::default(),
            batch: BatchConfig::default(),
            validation: ValidationConfig::default(),
            agent: AgentConfig::default(),
        }
    }
}

impl BdmConfig {
    /// Quarantine directory: configured, or a sibling of the download root.
    pub fn quarantine_dir(&self) -> PathBuf {
        match &self.quarantine_dir {
            Some(p) => p.clone(),
            None => default_quarantine_dir(&self.download_root),
        }
    }

    /// Ledger path: configured, or the XDG state default.
    pub fn ledger_path(&self) -> Result<PathBuf> {
        match &self.ledger_path {
            Some(p) => Ok(p.clone()),
            None => crate::ledger::default_path(),
        }
    }
}

/// `<root>.quarantine` next to the root, so moves stay on the same volume.
pub fn default_quarantine_dir(root: &Path) -> PathBuf {
    let mut name = root
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "downloads".into());
    name.push(".quarantine");
    root.with_file_name(name)
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("bdm")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<BdmConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = BdmConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: BdmConfig = toml::from_str(&data)?;
    Ok(cfg)
}
