// SPDX-FileCopyrightText: Copyright © 2020-2026 bloud developers
//
// SPDX-License-Identifier: MPL-2.0

//! A handful of configurators shipped with the agent itself, covering the
//! common bootstrapping shapes a catalog app needs. App-specific logic
//! beyond these lives in the catalog entry's own plugin, out of scope
//! here.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use tokio::fs;
use tokio_util::sync::CancellationToken;

use super::{AppContext, Configurator, Error};

static CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .expect("build reqwest client")
});

/// No hooks at all, relies entirely on the default health-check. Used for
/// apps that need no bootstrapping beyond being started.
pub struct Noop;

#[async_trait]
impl Configurator for Noop {
    fn name(&self) -> &str {
        "noop"
    }
}

/// Ensures the app's data directory exists before the container starts.
/// Most container images expect their bind-mounted data directory to
/// already be present; some fail outright if it's missing.
pub struct EnsureDataDir;

#[async_trait]
impl Configurator for EnsureDataDir {
    fn name(&self) -> &str {
        "ensure-data-dir"
    }

    async fn pre_start(&self, ctx: &AppContext, _cancel: &CancellationToken) -> Result<(), Error> {
        fs::create_dir_all(&ctx.data_path).await?;
        Ok(())
    }
}

/// A *arr-style app (Radarr, Sonarr, ...): post-start reads its API key
/// out of the on-disk config it writes on first boot, then registers the
/// wired download client against its own admin API.
pub struct ArrStack {
    pub config_file: String,
}

#[async_trait]
impl Configurator for ArrStack {
    fn name(&self) -> &str {
        "arr-stack"
    }

    async fn pre_start(&self, ctx: &AppContext, _cancel: &CancellationToken) -> Result<(), Error> {
        fs::create_dir_all(&ctx.data_path).await?;
        Ok(())
    }

    async fn post_start(&self, ctx: &AppContext, _cancel: &CancellationToken) -> Result<(), Error> {
        let Some(download_clients) = ctx.integrations.get("downloadClient") else {
            return Ok(());
        };
        let Some(client_name) = download_clients.first() else {
            return Ok(());
        };

        let config_path = ctx.data_path.join(&self.config_file);
        let contents = fs::read_to_string(&config_path).await?;
        let api_key = extract_api_key(&contents).ok_or_else(|| Error::RemoteStatus {
            app: ctx.name.to_string(),
            status: 0,
            body: format!("no ApiKey found in {}", config_path.display()),
        })?;

        let response = CLIENT
            .post(format!("{}/api/v3/downloadclient", ctx.base_url()))
            .header("X-Api-Key", api_key)
            .json(&serde_json::json!({
                "name": client_name.as_str(),
                "enable": true,
            }))
            .send()
            .await
            .map_err(|source| Error::Remote {
                app: ctx.name.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(Error::RemoteStatus {
                app: ctx.name.to_string(),
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        Ok(())
    }
}

fn extract_api_key(config_xml: &str) -> Option<&str> {
    let start = config_xml.find("<ApiKey>")? + "<ApiKey>".len();
    let end = config_xml[start..].find("</ApiKey>")? + start;
    Some(&config_xml[start..end])
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn extract_api_key_reads_between_tags() {
        let xml = "<Config>\n  <ApiKey>abc123</ApiKey>\n</Config>";
        assert_eq!(extract_api_key(xml), Some("abc123"));
    }

    #[test]
    fn extract_api_key_is_none_when_tag_missing() {
        assert_eq!(extract_api_key("<Config></Config>"), None);
    }
}
