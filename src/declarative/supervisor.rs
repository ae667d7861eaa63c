// SPDX-FileCopyrightText: Copyright © 2020-2026 bloud developers
//
// SPDX-License-Identifier: MPL-2.0

//! Thin wrapper around the user-scoped process supervisor (`systemctl
//! --user`). Every operation here is expected to be idempotent: calling
//! `stop_service` on an already-stopped unit, or `daemon_reload`/
//! `restart_target` when nothing changed, must succeed quietly.

use tokio::process::Command;

use super::Error;

const SYSTEMCTL: &str = "systemctl";

#[derive(Debug, Clone)]
pub struct Supervisor {
    binary: String,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self {
            binary: SYSTEMCTL.to_string(),
        }
    }
}

impl Supervisor {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    /// Stops `podman-<app>.service` without a full rebuild. Used by the
    /// uninstall path to tear a container down before regeneration.
    pub async fn stop_service(&self, app: &str) -> Result<(), Error> {
        self.run(&["--user", "stop", &format!("podman-{app}.service")]).await
    }

    pub async fn daemon_reload(&self) -> Result<(), Error> {
        self.run(&["--user", "daemon-reload"]).await
    }

    pub async fn restart_target(&self, target: &str) -> Result<(), Error> {
        self.run(&["--user", "restart", target]).await
    }

    async fn run(&self, args: &[&str]) -> Result<(), Error> {
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(Error::Spawn)?;

        if !output.status.success() {
            return Err(Error::Subprocess {
                message: format!("{} {} failed", self.binary, args.join(" ")),
                output: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(())
    }
}
