//! Tracing setup for the `bdm` binary.
//!
//! Runs log to `~/.local/state/bdm/bdm.log` so long unattended batches leave a trail;
//! when the state dir is unusable the CLI falls back to stderr.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Filter directive for a `-v` count. `RUST_LOG` overrides it.
///
/// Target directives match by prefix, so `bdm` covers `bdm_core` too.
pub fn default_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info,bdm=debug",
        1 => "info,bdm=trace",
        _ => "debug,bdm=trace",
    }
}

fn env_filter(verbosity: u8) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)))
}

/// Default log file: `~/.local/state/bdm/bdm.log`.
pub fn default_log_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("bdm")?;
    Ok(xdg_dirs.get_state_home().join("bdm.log"))
}

/// Per-event handle on the shared log file. A failed clone degrades to stderr
/// rather than dropping the line.
enum LogSink {
    File(File),
    Stderr(io::Stderr),
}

impl Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            LogSink::File(f) => f.write(buf),
            LogSink::Stderr(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            LogSink::File(f) => f.flush(),
            LogSink::Stderr(s) => s.flush(),
        }
    }
}

struct AppendLog(File);

impl<'a> MakeWriter<'a> for AppendLog {
    type Writer = LogSink;

    fn make_writer(&'a self) -> Self::Writer {
        match self.0.try_clone() {
            Ok(f) => LogSink::File(f),
            Err(_) => LogSink::Stderr(io::stderr()),
        }
    }
}

/// Install a subscriber appending to `path`. Returns Err if the file cannot be
/// opened or a subscriber is already installed.
pub fn init_file_logging(path: &Path, verbosity: u8) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("create log dir: {}", dir.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file: {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbosity))
        .with_writer(AppendLog(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("install subscriber: {}", e))?;

    tracing::debug!(path = %path.display(), "file logging initialized");
    Ok(())
}

/// Log to the default state file, falling back to stderr. Never fails.
pub fn init_logging(verbosity: u8) {
    let attempt = default_log_path().and_then(|p| init_file_logging(&p, verbosity));
    if let Err(e) = attempt {
        init_logging_stderr(verbosity);
        tracing::warn!("file logging unavailable ({:#}); logging to stderr", e);
    }
}

pub fn init_logging_stderr(verbosity: u8) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbosity))
        .with_writer(io::stderr)
        .with_ansi(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_raises_crate_level() {
        assert_eq!(default_filter(0), "info,bdm=debug");
        assert_eq!(default_filter(1), "info,bdm=trace");
        assert_eq!(default_filter(5), "debug,bdm=trace");
        for v in [0, 1, 5] {
            assert!(default_filter(v).parse::<EnvFilter>().is_ok());
        }
    }

    #[test]
    fn default_log_path_is_under_bdm_state() {
        if let Ok(p) = default_log_path() {
            assert_eq!(p.file_name().and_then(|n| n.to_str()), Some("bdm.log"));
        }
    }
}
