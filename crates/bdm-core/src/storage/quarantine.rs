//! Non-destructive removal of permanently failed item folders.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::ledger::unix_timestamp;

/// Destination for folders of items that exhausted their attempts.
///
/// Moves are plain renames, so the quarantine directory must live on the same
/// volume as the managed root (the default `<root>.quarantine` sibling does).
#[derive(Debug, Clone)]
pub struct Quarantine {
    dir: PathBuf,
}

impl Quarantine {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Move `folder` to `<dir>/<name>-<unix_ts>` (with `-<n>` on collision).
    /// Returns `Ok(None)` when there is no folder to move.
    pub fn move_in(&self, folder: &Path) -> io::Result<Option<PathBuf>> {
        if !folder.exists() {
            return Ok(None);
        }
        fs::create_dir_all(&self.dir)?;
        let name = folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "item".to_string());
        let target = self.free_name(&format!("{}-{}", name, unix_timestamp()));
        fs::rename(folder, &target)?;
        tracing::info!(from = %folder.display(), to = %target.display(), "folder quarantined");
        Ok(Some(target))
    }

    fn free_name(&self, base: &str) -> PathBuf {
        let first = self.dir.join(base);
        if !first.exists() {
            return first;
        }
        (1u32..)
            .map(|n| self.dir.join(format!("{}-{}", base, n)))
            .find(|p| !p.exists())
            .unwrap_or(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moves_folder_with_contents() {
        let dir = tempfile::tempdir().unwrap();
        let item = dir.path().join("root/p3/item42");
        fs::create_dir_all(&item).unwrap();
        fs::write(item.join("part.mp4"), b"partial").unwrap();

        let q = Quarantine::new(dir.path().join("root.quarantine"));
        let moved = q.move_in(&item).unwrap().unwrap();

        assert!(!item.exists());
        assert!(moved.starts_with(q.dir()));
        assert!(moved
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("item42-"));
        assert_eq!(fs::read(moved.join("part.mp4")).unwrap(), b"partial");
    }

    #[test]
    fn absent_folder_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let q = Quarantine::new(dir.path().join("q"));
        assert_eq!(q.move_in(&dir.path().join("gone")).unwrap(), None);
    }

    #[test]
    fn same_name_twice_does_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let q = Quarantine::new(dir.path().join("q"));
        let a = dir.path().join("a/item");
        let b = dir.path().join("b/item");
        fs::create_dir_all(&a).unwrap();
        fs::create_dir_all(&b).unwrap();
        let first = q.move_in(&a).unwrap().unwrap();
        let second = q.move_in(&b).unwrap().unwrap();
        assert_ne!(first, second);
        assert!(first.exists() && second.exists());
    }
}
