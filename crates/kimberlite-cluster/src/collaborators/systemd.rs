//! [`ServiceConnector`] backed by `systemctl`.

use std::time::Duration;

use crate::collaborators::run;
use crate::error::{Error, Result};
use crate::ports::{HealthResult, ServiceConnector};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Drives a systemd unit through `systemctl`.
pub struct SystemdServiceConnector;

impl SystemdServiceConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemdServiceConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceConnector for SystemdServiceConnector {
    async fn start_service(&mut self, name: &str) -> Result<()> {
        run("systemctl", &["start", name], COMMAND_TIMEOUT, Error::Service).await?;
        Ok(())
    }

    async fn stop_service(&mut self, name: &str) -> Result<()> {
        run("systemctl", &["stop", name], COMMAND_TIMEOUT, Error::Service).await?;
        Ok(())
    }

    async fn kill_service(&mut self, name: &str) -> Result<()> {
        run(
            "systemctl",
            &["kill", "--signal=SIGKILL", name],
            COMMAND_TIMEOUT,
            Error::Service,
        )
        .await?;
        Ok(())
    }

    async fn check_service_status(&mut self, name: &str) -> Result<HealthResult> {
        // `systemctl is-active` exits nonzero for anything but "active", so
        // treat that as the health signal directly instead of erroring.
        let mut command = tokio::process::Command::new("systemctl");
        command.args(["is-active", name]);
        command.stdin(std::process::Stdio::null());
        command.stdout(std::process::Stdio::piped());
        command.stderr(std::process::Stdio::piped());

        let child = command.spawn().map_err(|error| Error::Service(error.to_string()))?;
        let output = tokio::time::timeout(COMMAND_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| Error::Timeout(format!("systemctl is-active {name}")))?
            .map_err(|error| Error::Service(error.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim() == "active" {
            Ok(HealthResult::Ok)
        } else {
            Ok(HealthResult::NotOk)
        }
    }
}
