//! Work items produced by page discovery.
//!
//! An item is immutable once discovered. Only its outcome is persisted (as a
//! completed entry or an attempt record in the ledger); the descriptor itself
//! lives for one orchestration pass.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Kind of file an item requires on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    /// The main payload (e.g. the video file).
    Primary,
    /// Structured metadata (JSON).
    Metadata,
    /// A preview image / thumbnail.
    Preview,
}

impl AssetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AssetKind::Primary => "primary",
            AssetKind::Metadata => "metadata",
            AssetKind::Preview => "preview",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One asset as declared by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSpec {
    pub kind: AssetKind,
    /// Remote location. `None` means the asset is produced locally
    /// (a metadata asset written from the item's metadata blob).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// File name inside the item's target folder.
    pub filename: String,
}

impl AssetSpec {
    pub fn required(&self) -> RequiredAsset {
        RequiredAsset {
            kind: self.kind,
            filename: self.filename.clone(),
        }
    }
}

/// What the validator needs to know about an asset: its kind and where it lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredAsset {
    pub kind: AssetKind,
    pub filename: String,
}

/// A discovered unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDescriptor {
    pub id: String,
    pub page: u32,
    pub assets: Vec<AssetSpec>,
    pub target_folder: PathBuf,
    /// Opaque per-item fields from discovery. Not interpreted by the core,
    /// except that it is written out for URL-less metadata assets.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

impl ItemDescriptor {
    /// Required-asset policy for this item (every declared asset is required).
    pub fn required_assets(&self) -> Vec<RequiredAsset> {
        self.assets.iter().map(AssetSpec::required).collect()
    }

    /// Assets fetched through the download agent.
    pub fn remote_assets(&self) -> impl Iterator<Item = (&AssetSpec, &str)> {
        self.assets
            .iter()
            .filter_map(|a| a.url.as_deref().map(|u| (a, u)))
    }

    /// Assets the core writes itself.
    pub fn inline_assets(&self) -> impl Iterator<Item = &AssetSpec> {
        self.assets.iter().filter(|a| a.url.is_none())
    }

    /// Checks the descriptor is usable: non-empty id, at least one asset, plain
    /// file names (no path separators), and parseable http(s) URLs.
    pub fn check(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("empty item id".to_string());
        }
        if self.assets.is_empty() {
            return Err(format!("item {} declares no assets", self.id));
        }
        for asset in &self.assets {
            let name = asset.filename.as_str();
            if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
                return Err(format!("item {}: bad filename {:?}", self.id, name));
            }
            match asset.url.as_deref() {
                Some(u) => {
                    let parsed = url::Url::parse(u)
                        .map_err(|e| format!("item {}: bad url {:?}: {}", self.id, u, e))?;
                    if !matches!(parsed.scheme(), "http" | "https") {
                        return Err(format!("item {}: unsupported scheme in {:?}", self.id, u));
                    }
                }
                None if asset.kind != AssetKind::Metadata => {
                    return Err(format!(
                        "item {}: {} asset has no url",
                        self.id, asset.kind
                    ));
                }
                None => {}
            }
        }
        Ok(())
    }
}
