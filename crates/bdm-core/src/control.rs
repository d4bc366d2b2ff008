//! Run control: a cancellation handle shared between the orchestrator and whatever
//! asks it to stop (Ctrl-C, `bdm stop` over the control socket).
//!
//! Cancellation is cooperative. The orchestrator checks the token before each batch
//! and every wait window listens on it, so a stop lands within one poll interval.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Default)]
pub struct RunControl {
    token: CancellationToken,
    reason: Arc<Mutex<Option<String>>>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token handed to waits and loops.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Request a stop. The first reason wins; later calls only re-cancel.
    pub fn request_stop(&self, reason: impl Into<String>) {
        if let Ok(mut slot) = self.reason.lock() {
            if slot.is_none() {
                *slot = Some(reason.into());
            }
        }
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn stop_reason(&self) -> Option<String> {
        self.reason.lock().ok().and_then(|r| r.clone())
    }
}

/// Default path for the control socket (same XDG state dir as the ledger).
pub fn default_control_socket_path() -> std::io::Result<PathBuf> {
    let dir = xdg::BaseDirectories::with_prefix("bdm")?.get_state_home();
    Ok(dir.join("control.sock"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_stop_reason_is_kept() {
        let ctl = RunControl::new();
        assert!(!ctl.is_stopped());
        ctl.request_stop("ctrl-c");
        ctl.request_stop("socket");
        assert!(ctl.is_stopped());
        assert!(ctl.token().is_cancelled());
        assert_eq!(ctl.stop_reason().as_deref(), Some("ctrl-c"));
    }

    #[test]
    fn clones_share_state() {
        let ctl = RunControl::new();
        let other = ctl.clone();
        other.request_stop("stop");
        assert!(ctl.is_stopped());
    }
}
