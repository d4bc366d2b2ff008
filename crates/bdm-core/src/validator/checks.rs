//! Per-kind sanity checks.

use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use crate::item::AssetKind;

use super::error::ValidationIoError;
use super::ValidationPolicy;

/// Why an asset does not count as present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetDefect {
    Absent,
    Empty,
    TooSmall { size: u64, min: u64 },
    NoFormatMarker,
    MalformedMetadata(String),
    MissingField(String),
}

impl fmt::Display for AssetDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetDefect::Absent => write!(f, "absent"),
            AssetDefect::Empty => write!(f, "empty"),
            AssetDefect::TooSmall { size, min } => {
                write!(f, "too small ({} bytes, need {})", size, min)
            }
            AssetDefect::NoFormatMarker => write!(f, "no recognizable format marker"),
            AssetDefect::MalformedMetadata(e) => write!(f, "malformed metadata: {}", e),
            AssetDefect::MissingField(name) => write!(f, "metadata field {:?} missing or empty", name),
        }
    }
}

/// Signatures accepted for preview images.
const IMAGE_SIGNATURES: &[&[u8]] = &[
    b"\xFF\xD8\xFF",        // JPEG
    b"\x89PNG\r\n\x1a\n",   // PNG
    b"GIF87a",
    b"GIF89a",
    b"RIFF",                // WEBP container; checked further below
];

fn io_err(path: &Path, source: std::io::Error) -> ValidationIoError {
    ValidationIoError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Returns `Ok(None)` if the asset passes, `Ok(Some(defect))` if it is absent
/// or fails its check.
pub(super) fn check_asset(
    policy: &ValidationPolicy,
    kind: AssetKind,
    path: &Path,
) -> Result<Option<AssetDefect>, ValidationIoError> {
    let meta = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Some(AssetDefect::Absent)),
        Err(e) => return Err(io_err(path, e)),
    };
    if !meta.is_file() {
        return Ok(Some(AssetDefect::Absent));
    }
    let size = meta.len();
    if size == 0 {
        return Ok(Some(AssetDefect::Empty));
    }

    match kind {
        AssetKind::Primary => check_primary(policy, path, size),
        AssetKind::Preview => check_preview(policy, path, size),
        AssetKind::Metadata => check_metadata(policy, path),
    }
}

fn read_head(path: &Path, n: usize) -> Result<Option<Vec<u8>>, ValidationIoError> {
    let mut f = match File::open(path) {
        Ok(f) => f,
        // Removed between stat and open: treat as absent.
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_err(path, e)),
    };
    let mut buf = Vec::with_capacity(n);
    f.by_ref()
        .take(n as u64)
        .read_to_end(&mut buf)
        .map_err(|e| io_err(path, e))?;
    Ok(Some(buf))
}

fn check_primary(
    policy: &ValidationPolicy,
    path: &Path,
    size: u64,
) -> Result<Option<AssetDefect>, ValidationIoError> {
    if size < policy.min_primary_bytes {
        return Ok(Some(AssetDefect::TooSmall {
            size,
            min: policy.min_primary_bytes,
        }));
    }
    if policy.primary_markers.is_empty() {
        return Ok(None);
    }
    let Some(head) = read_head(path, policy.marker_window)? else {
        return Ok(Some(AssetDefect::Absent));
    };
    let found = policy
        .primary_markers
        .iter()
        .filter(|m| !m.is_empty())
        .any(|m| head.windows(m.len()).any(|w| w == m.as_slice()));
    if found {
        Ok(None)
    } else {
        Ok(Some(AssetDefect::NoFormatMarker))
    }
}

fn check_preview(
    policy: &ValidationPolicy,
    path: &Path,
    size: u64,
) -> Result<Option<AssetDefect>, ValidationIoError> {
    if size < policy.min_preview_bytes {
        return Ok(Some(AssetDefect::TooSmall {
            size,
            min: policy.min_preview_bytes,
        }));
    }
    if !policy.check_preview_format {
        return Ok(None);
    }
    let Some(head) = read_head(path, 12)? else {
        return Ok(Some(AssetDefect::Absent));
    };
    let is_image = IMAGE_SIGNATURES.iter().any(|sig| head.starts_with(sig))
        && (!head.starts_with(b"RIFF") || head.get(8..12) == Some(b"WEBP".as_slice()));
    if is_image {
        Ok(None)
    } else {
        Ok(Some(AssetDefect::NoFormatMarker))
    }
}

fn check_metadata(
    policy: &ValidationPolicy,
    path: &Path,
) -> Result<Option<AssetDefect>, ValidationIoError> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Some(AssetDefect::Absent)),
        Err(e) => return Err(io_err(path, e)),
    };
    let value: serde_json::Value = match serde_json::from_slice(&bytes) {
        Ok(v) => v,
        Err(e) => return Ok(Some(AssetDefect::MalformedMetadata(e.to_string()))),
    };
    let Some(obj) = value.as_object() else {
        return Ok(Some(AssetDefect::MalformedMetadata(
            "top-level value is not an object".to_string(),
        )));
    };
    for field in &policy.required_metadata_fields {
        let present = match obj.get(field) {
            None | Some(serde_json::Value::Null) => false,
            Some(serde_json::Value::String(s)) => !s.trim().is_empty(),
            Some(serde_json::Value::Array(a)) => !a.is_empty(),
            Some(_) => true,
        };
        if !present {
            return Ok(Some(AssetDefect::MissingField(field.clone())));
        }
    }
    Ok(None)
}
