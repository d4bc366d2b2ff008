//! Aggregate on-disk usage of the managed root, with a cached total so a large
//! tree is not re-walked on every admission check.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use walkdir::WalkDir;

/// Result of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed { used: u64 },
    CapReached { used: u64, cap: u64 },
    LowSpace { free: u64, floor: u64 },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed { .. })
    }
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    bytes: u64,
    taken: Instant,
}

#[derive(Debug)]
pub struct StorageGuard {
    root: PathBuf,
    exclude: Vec<PathBuf>,
    refresh_interval: Duration,
    min_free_bytes: Option<u64>,
    cache: Mutex<Option<Sample>>,
}

impl StorageGuard {
    pub fn new(root: impl Into<PathBuf>, refresh_interval: Duration) -> Self {
        Self {
            root: root.into(),
            exclude: Vec::new(),
            refresh_interval,
            min_free_bytes: None,
            cache: Mutex::new(None),
        }
    }

    /// Skip `path` (and everything below it) when walking the root.
    pub fn excluding(mut self, path: impl Into<PathBuf>) -> Self {
        self.exclude.push(path.into());
        self
    }

    pub fn with_min_free_bytes(mut self, floor: Option<u64>) -> Self {
        self.min_free_bytes = floor;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Bytes used under the root, from cache if the last walk is recent enough.
    pub fn usage(&self) -> u64 {
        if let Ok(cache) = self.cache.lock() {
            if let Some(s) = *cache {
                if s.taken.elapsed() < self.refresh_interval {
                    return s.bytes;
                }
            }
        }
        self.refresh()
    }

    /// Re-walk the root and replace the cached total.
    pub fn refresh(&self) -> u64 {
        let bytes = walk_usage(&self.root, &self.exclude);
        if let Ok(mut cache) = self.cache.lock() {
            *cache = Some(Sample {
                bytes,
                taken: Instant::now(),
            });
        }
        tracing::trace!(root = %self.root.display(), bytes, "storage usage refreshed");
        bytes
    }

    /// Forget the cached total so the next `usage` walks again.
    pub fn invalidate(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            *cache = None;
        }
    }

    /// True while usage is below `cap` (and free space is above the floor, if set).
    pub fn admit_more(&self, cap: Option<u64>) -> bool {
        self.admission(cap).is_allowed()
    }

    pub fn admission(&self, cap: Option<u64>) -> Admission {
        let used = self.usage();
        if let Some(cap) = cap {
            if used >= cap {
                return Admission::CapReached { used, cap };
            }
        }
        if let Some(floor) = self.min_free_bytes {
            match available_space(&self.root) {
                Ok(Some(free)) if free < floor => return Admission::LowSpace { free, floor },
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(root = %self.root.display(), "free space check failed: {}", e)
                }
            }
        }
        Admission::Allowed { used }
    }
}

fn walk_usage(root: &Path, exclude: &[PathBuf]) -> u64 {
    let mut total = 0u64;
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !exclude.iter().any(|x| e.path() == x.as_path()));
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                // Files vanish and appear while the agent is writing; a root that
                // does not exist yet simply holds nothing.
                if e.depth() > 0 || e.io_error().map(|io| io.kind()) != Some(io::ErrorKind::NotFound) {
                    tracing::debug!("skipping unreadable entry during usage walk: {}", e);
                }
                continue;
            }
        };
        if entry.file_type().is_file() {
            if let Ok(meta) = entry.metadata() {
                total = total.saturating_add(meta.len());
            }
        }
    }
    total
}

/// Bytes available to unprivileged users on the volume holding `path`.
///
/// Walks up to the nearest existing ancestor so a not-yet-created root still
/// reports its volume. Returns `Ok(None)` on platforms without statvfs.
pub fn available_space(path: &Path) -> io::Result<Option<u64>> {
    let probe = path
        .ancestors()
        .find(|p| p.exists())
        .unwrap_or_else(|| Path::new("."));
    statvfs_available(probe)
}

#[cfg(unix)]
fn statvfs_available(path: &Path) -> io::Result<Option<u64>> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    // SAFETY: c_path is a valid NUL-terminated string, stat is zeroed before the call
    // and only read after statvfs reports success.
    unsafe {
        let mut stat: libc::statvfs = std::mem::zeroed();
        if libc::statvfs(c_path.as_ptr(), &mut stat) != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Some((stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64)))
    }
}

#[cfg(not(unix))]
fn statvfs_available(_path: &Path) -> io::Result<Option<u64>> {
    Ok(None)
}
