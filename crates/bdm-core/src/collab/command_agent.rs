//! Download agent driven through an external queue-style command line tool.
//!
//! Each enqueue runs the configured program once with the argument template filled
//! in; the tool is expected to add the transfer to its own queue and return.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::DownloadAgent;
use crate::config::AgentConfig;
use crate::error::EnqueueError;

const STDERR_LIMIT: usize = 512;

#[derive(Debug, Clone)]
pub struct CommandAgent {
    program: String,
    enqueue_args: Vec<String>,
    start_args: Vec<String>,
    timeout: Duration,
}

impl CommandAgent {
    pub fn new(
        program: impl Into<String>,
        enqueue_args: Vec<String>,
        start_args: Vec<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            enqueue_args,
            start_args,
            timeout,
        }
    }

    /// Build from config; errors when no program is set.
    pub fn from_config(cfg: &AgentConfig) -> Result<Self, EnqueueError> {
        let program = cfg.program.clone().ok_or(EnqueueError::NotConfigured)?;
        Ok(Self::new(
            program,
            cfg.enqueue_args.clone(),
            cfg.start_args.clone(),
            Duration::from_secs(cfg.timeout_secs.max(1)),
        ))
    }

    fn fill(template: &[String], url: &str, folder: &Path, filename: &str) -> Vec<String> {
        let folder = folder.to_string_lossy();
        template
            .iter()
            .map(|a| {
                a.replace("{url}", url)
                    .replace("{folder}", &folder)
                    .replace("{filename}", filename)
            })
            .collect()
    }

    async fn invoke(&self, args: &[String]) -> Result<(), EnqueueError> {
        let child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();
        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| EnqueueError::Timeout(self.timeout))?
            .map_err(EnqueueError::Spawn)?;
        if output.status.success() {
            return Ok(());
        }
        let mut stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stderr.len() > STDERR_LIMIT {
            let mut cut = STDERR_LIMIT;
            while !stderr.is_char_boundary(cut) {
                cut -= 1;
            }
            stderr.truncate(cut);
        }
        Err(EnqueueError::Exit {
            code: output.status.code(),
            stderr,
        })
    }
}

#[async_trait]
impl DownloadAgent for CommandAgent {
    async fn enqueue(&self, url: &str, dest: &Path, filename: &str) -> Result<(), EnqueueError> {
        tokio::fs::create_dir_all(dest)
            .await
            .map_err(|source| EnqueueError::Prepare {
                path: dest.to_path_buf(),
                source,
            })?;
        let args = Self::fill(&self.enqueue_args, url, dest, filename);
        tracing::trace!(program = %self.program, ?args, "enqueue");
        self.invoke(&args).await
    }

    async fn start_or_resume(&self) -> Result<(), EnqueueError> {
        if self.start_args.is_empty() {
            return Ok(());
        }
        self.invoke(&self.start_args).await
    }
}
