//! Real implementations of the four external collaborator ports, each
//! shelling out to an external program under a per-call timeout.

mod frr;
mod mariadb;
mod nftables;
mod systemd;

pub use frr::FrrRouteAdvertiser;
pub use mariadb::MariadbConnector;
pub use nftables::NftFirewallConnector;
pub use systemd::SystemdServiceConnector;

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::error::{Error, Result};

/// Runs `program args...`, waiting at most `timeout` for it to exit, and
/// maps a nonzero exit code or timeout into the given error constructor.
pub(crate) async fn run(
    program: &str,
    args: &[&str],
    timeout: Duration,
    on_error: impl Fn(String) -> Error,
) -> Result<String> {
    let mut command = Command::new(program);
    command.args(args).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

    let child = command.spawn().map_err(|error| on_error(error.to_string()))?;
    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| Error::Timeout(format!("{program} {}", args.join(" "))))?
        .map_err(|error| on_error(error.to_string()))?;

    if !output.status.success() {
        return Err(on_error(format!(
            "{program} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
