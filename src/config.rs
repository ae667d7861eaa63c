// SPDX-FileCopyrightText: Copyright © 2020-2026 bloud developers
//
// SPDX-License-Identifier: MPL-2.0

//! Runtime settings, read once at startup from environment variables,
//! falling back to `DATA_DIR/secrets.json` for secret-bearing values, and
//! finally to a documented development default if both are absent. A
//! single flat struct rather than a layered config merge (see DESIGN.md):
//! this agent has one process, one host, and no multi-file override
//! hierarchy to reconcile.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DATA_DIR: &str = "/var/lib/bloud";
const DEFAULT_APPS_DIR: &str = "/etc/bloud/apps";

#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub data_dir: PathBuf,
    pub apps_dir: PathBuf,
    pub flake_path: String,
    pub flake_target: String,
    pub sso_base_url: Option<String>,
    pub authentik_token: Option<String>,
    pub database_url: String,
    pub nixos_output_path: PathBuf,
    pub routing_output_path: PathBuf,
}

/// The subset of `secrets.json` this agent reads. Generation of the file
/// is someone else's job; this agent only ever reads it.
#[derive(Debug, Default, Deserialize)]
struct Secrets {
    #[serde(default)]
    authentik_token: Option<String>,
    #[serde(default)]
    authentik_url: Option<String>,
    #[serde(default)]
    database_url: Option<String>,
}

impl Settings {
    /// Loads settings from the process environment, falling back to
    /// `<data_dir>/secrets.json` for anything secret-bearing that the
    /// environment doesn't set, and finally to an in-memory-SQLite,
    /// SSO-disabled development default.
    pub async fn load() -> Result<Self, Error> {
        let data_dir = env_path("BLOUD_DATA_DIR").unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        let apps_dir = env_path("BLOUD_APPS_DIR").unwrap_or_else(|| PathBuf::from(DEFAULT_APPS_DIR));

        let secrets = load_secrets(&data_dir).await?;

        let sso_base_url = std::env::var("BLOUD_SSO_BASE_URL")
            .ok()
            .or_else(|| std::env::var("BLOUD_SSO_AUTHENTIK_URL").ok())
            .or(secrets.authentik_url);

        let authentik_token = std::env::var("BLOUD_AUTHENTIK_TOKEN").ok().or(secrets.authentik_token);

        let database_url = std::env::var("DATABASE_URL").ok().or(secrets.database_url).unwrap_or_else(|| "sqlite::memory:".to_string());

        Ok(Self {
            port: std::env::var("BLOUD_PORT").ok().and_then(|value| value.parse().ok()).unwrap_or(DEFAULT_PORT),
            nixos_output_path: data_dir.join("system-fragment.nix"),
            routing_output_path: data_dir.join("routing-fragment.toml"),
            flake_path: std::env::var("BLOUD_FLAKE_PATH").unwrap_or_else(|_| "/etc/bloud/flake".to_string()),
            flake_target: std::env::var("BLOUD_FLAKE_TARGET").unwrap_or_else(|_| "appliance".to_string()),
            sso_base_url,
            authentik_token,
            database_url,
            data_dir,
            apps_dir,
        })
    }

    pub fn identity_provider_configured(&self) -> bool {
        self.sso_base_url.is_some() && self.authentik_token.is_some()
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var(name).ok().map(PathBuf::from)
}

async fn load_secrets(data_dir: &Path) -> Result<Secrets, Error> {
    let path = data_dir.join("secrets.json");
    match tokio::fs::read_to_string(&path).await {
        Ok(contents) => serde_json::from_str(&contents).map_err(|source| Error::ParseSecrets(path, source)),
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(Secrets::default()),
        Err(source) => Err(Error::ReadSecrets(path, source)),
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read {0:?}")]
    ReadSecrets(PathBuf, #[source] std::io::Error),

    #[error("failed to parse {0:?}")]
    ParseSecrets(PathBuf, #[source] serde_json::Error),
}
