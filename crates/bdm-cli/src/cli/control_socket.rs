//! Control socket: server (during `bdm run`) and client (for `bdm stop`).
//! Protocol: one line per command; only "stop" is understood.

use anyhow::Result;
use bdm_core::control::RunControl;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

/// Spawns a task that listens on `path` and requests a stop on each "stop" line.
/// Other lines are logged and ignored.
pub fn spawn_control_listener(
    control: RunControl,
    path: impl AsRef<Path>,
) -> Result<tokio::task::JoinHandle<()>> {
    let path = path.as_ref().to_path_buf();
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path)?;
    tracing::debug!(path = %path.display(), "control socket listening");

    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let control = control.clone();
                    tokio::spawn(async move {
                        let mut lines = BufReader::new(stream).lines();
                        while let Ok(Some(line)) = lines.next_line().await {
                            match line.trim() {
                                "stop" => control.request_stop("control socket"),
                                "" => {}
                                other => tracing::debug!("control socket: unknown command {:?}", other),
                            }
                        }
                    });
                }
                Err(e) => tracing::debug!("control socket accept: {}", e),
            }
        }
    });
    Ok(handle)
}

/// Sends "stop\n". Returns false when no run is listening.
pub async fn send_stop(socket_path: &Path) -> Result<bool> {
    if !socket_path.exists() {
        return Ok(false);
    }
    let mut stream = match UnixStream::connect(socket_path).await {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    stream.write_all(b"stop\n").await?;
    stream.shutdown().await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn stop_line_cancels_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("control.sock");
        let control = RunControl::new();
        let handle = spawn_control_listener(control.clone(), &path).unwrap();

        assert!(send_stop(&path).await.unwrap());
        for _ in 0..100 {
            if control.is_stopped() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(control.is_stopped());
        assert_eq!(control.stop_reason().as_deref(), Some("control socket"));
        handle.abort();
    }

    #[tokio::test]
    async fn no_socket_means_no_run() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!send_stop(&dir.path().join("absent.sock")).await.unwrap());
    }
}
