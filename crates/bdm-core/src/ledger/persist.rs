//! Load/save the ledger as JSON under the XDG state dir.
//!
//! Saves go through a temp file in the target directory followed by a rename, so a
//! reader sees either the previous document or the new one.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::types::Ledger;
use super::unix_timestamp;
use crate::error::LedgerIoError;

/// Default ledger path: `~/.local/state/bdm/progress.json`.
pub fn default_path() -> anyhow::Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("bdm")?;
    Ok(xdg_dirs.get_state_home().join("progress.json"))
}

/// Read the ledger at `path`.
///
/// A missing file yields defaults. An unparsable file is renamed to
/// `<name>.corrupt-<ts>` and defaults are returned. Other read errors are returned,
/// since defaulting would later overwrite a ledger we simply could not read.
pub fn load(path: &Path) -> Result<Ledger, LedgerIoError> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no ledger yet, starting empty");
            return Ok(Ledger::default());
        }
        Err(source) => {
            return Err(LedgerIoError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    match serde_json::from_slice::<Ledger>(&bytes) {
        Ok(ledger) => Ok(ledger),
        Err(e) => {
            let aside = set_aside(path);
            tracing::warn!(
                path = %path.display(),
                moved_to = ?aside,
                "ledger is corrupt ({}), starting from defaults",
                e
            );
            Ok(Ledger::default())
        }
    }
}

fn set_aside(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_string_lossy().into_owned();
    let target = path.with_file_name(format!("{}.corrupt-{}", name, unix_timestamp()));
    match fs::rename(path, &target) {
        Ok(()) => Some(target),
        Err(e) => {
            tracing::warn!(path = %path.display(), "could not move corrupt ledger aside: {}", e);
            None
        }
    }
}

/// Atomically replace the ledger at `path`.
pub fn save(ledger: &Ledger, path: &Path) -> Result<(), LedgerIoError> {
    let json = serde_json::to_vec_pretty(ledger).map_err(LedgerIoError::Serialize)?;
    write_atomic(&json, path)
}

/// Temp file next to `path`, fsync, then rename over it.
pub(crate) fn write_atomic(json: &[u8], path: &Path) -> Result<(), LedgerIoError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let write_err = |source: io::Error| LedgerIoError::Write {
        path: path.to_path_buf(),
        source,
    };

    fs::create_dir_all(&dir).map_err(write_err)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(write_err)?;
    tmp.write_all(json).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}
