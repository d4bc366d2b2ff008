//! Asset validation: decides whether an item folder is complete.
//!
//! A folder is complete when every required asset is present, non-empty, and
//! passes the sanity check for its kind (size floor and format marker for the
//! primary payload, image signature for previews, well-formed JSON with the
//! required fields for metadata). Validation is read-only. Absence is reported
//! in `missing`; only I/O failures other than absence surface as errors.

mod checks;
mod error;

use std::path::Path;

use crate::config::ValidationConfig;
use crate::item::{AssetKind, ItemDescriptor, RequiredAsset};

pub use checks::AssetDefect;
pub use error::ValidationIoError;

/// Thresholds and markers used by the per-kind checks.
#[derive(Debug, Clone)]
pub struct ValidationPolicy {
    pub min_primary_bytes: u64,
    /// Byte strings of which at least one must appear in the first
    /// `marker_window` bytes of the primary asset. Empty disables the check.
    pub primary_markers: Vec<Vec<u8>>,
    pub marker_window: usize,
    pub min_preview_bytes: u64,
    pub check_preview_format: bool,
    /// Top-level keys the metadata JSON object must carry with non-empty values.
    pub required_metadata_fields: Vec<String>,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            min_primary_bytes: 1024,
            primary_markers: vec![b"ftyp".to_vec()],
            marker_window: 32,
            min_preview_bytes: 100,
            check_preview_format: true,
            required_metadata_fields: Vec::new(),
        }
    }
}

impl From<&ValidationConfig> for ValidationPolicy {
    fn from(cfg: &ValidationConfig) -> Self {
        Self {
            min_primary_bytes: cfg.min_primary_bytes,
            primary_markers: cfg
                .primary_markers
                .iter()
                .map(|m| m.as_bytes().to_vec())
                .collect(),
            marker_window: cfg.marker_window.max(1),
            min_preview_bytes: cfg.min_preview_bytes,
            check_preview_format: cfg.check_preview_format,
            required_metadata_fields: cfg.required_metadata_fields.clone(),
        }
    }
}

/// One asset that failed its check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetProblem {
    pub kind: AssetKind,
    pub filename: String,
    pub defect: AssetDefect,
}

/// Result of validating one folder.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Validation {
    pub complete: bool,
    /// Kinds that are absent or failed their check (each kind listed once).
    pub missing: Vec<AssetKind>,
    pub problems: Vec<AssetProblem>,
}

impl Validation {
    fn from_problems(problems: Vec<AssetProblem>) -> Self {
        let mut missing: Vec<AssetKind> = problems.iter().map(|p| p.kind).collect();
        missing.sort();
        missing.dedup();
        Validation {
            complete: problems.is_empty(),
            missing,
            problems,
        }
    }

    /// True if the asset with this file name failed.
    pub fn is_missing_file(&self, filename: &str) -> bool {
        self.problems.iter().any(|p| p.filename == filename)
    }
}

/// Checks item folders against the required-file policy.
#[derive(Debug, Clone, Default)]
pub struct AssetValidator {
    policy: ValidationPolicy,
}

impl AssetValidator {
    pub fn new(policy: ValidationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    /// Validate `folder` against the given required assets.
    pub fn validate(
        &self,
        folder: &Path,
        assets: &[RequiredAsset],
    ) -> Result<Validation, ValidationIoError> {
        match std::fs::metadata(folder) {
            Ok(m) if m.is_dir() => {}
            Ok(_) => {
                return Err(ValidationIoError::NotADirectory {
                    path: folder.to_path_buf(),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let problems = assets
                    .iter()
                    .map(|a| AssetProblem {
                        kind: a.kind,
                        filename: a.filename.clone(),
                        defect: AssetDefect::Absent,
                    })
                    .collect();
                return Ok(Validation::from_problems(problems));
            }
            Err(source) => {
                return Err(ValidationIoError::Io {
                    path: folder.to_path_buf(),
                    source,
                })
            }
        }

        let mut problems = Vec::new();
        for asset in assets {
            let path = folder.join(&asset.filename);
            if let Some(defect) = checks::check_asset(&self.policy, asset.kind, &path)? {
                problems.push(AssetProblem {
                    kind: asset.kind,
                    filename: asset.filename.clone(),
                    defect,
                });
            }
        }
        Ok(Validation::from_problems(problems))
    }

    /// Validate an item's target folder against its declared assets.
    pub fn validate_item(&self, item: &ItemDescriptor) -> Result<Validation, ValidationIoError> {
        self.validate(&item.target_folder, &item.required_assets())
    }
}

#[cfg(test)]
mod tests;
