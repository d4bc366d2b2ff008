//! `bdm stop` – ask an active `bdm run` to stop.

use anyhow::Result;
use bdm_core::control::default_control_socket_path;

use crate::cli::control_socket;

pub async fn run_stop() -> Result<()> {
    let path = default_control_socket_path()?;
    if control_socket::send_stop(&path).await? {
        println!("Stop requested; the run ends after its current round.");
    } else {
        println!("No active run.");
    }
    Ok(())
}
