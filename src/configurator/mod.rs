// SPDX-FileCopyrightText: Copyright © 2020-2026 bloud developers
//
// SPDX-License-Identifier: MPL-2.0

//! C8: per-app pre-start / health-check / post-start hooks.

pub mod builtin;
pub mod default_health;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::catalog::AppName;
use crate::store::IntegrationConfig;

/// Everything a configurator needs to talk to the app it is bootstrapping.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub name: AppName,
    pub port: u16,
    pub data_path: PathBuf,
    pub data_root: PathBuf,
    pub integrations: IntegrationConfig,
    pub health_check_path: String,
    pub health_check_interval: Duration,
    pub health_check_timeout: Duration,
}

impl AppContext {
    pub fn base_url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }
}

/// A configurator bootstraps one app: it may write config files, wait for
/// the app to come up, then call the app's own admin API. All three hooks
/// must be idempotent — `pre_start` in particular may run again after a
/// crash mid-install.
#[async_trait]
pub trait Configurator: Send + Sync {
    fn name(&self) -> &str;

    async fn pre_start(&self, ctx: &AppContext, cancel: &CancellationToken) -> Result<(), Error> {
        let _ = (ctx, cancel);
        Ok(())
    }

    /// Blocks until the app reports healthy, or returns [`Error::Timeout`]
    /// or [`Error::Cancelled`]. The default implementation polls the
    /// catalog-declared health-check path.
    async fn health_check(&self, ctx: &AppContext, cancel: &CancellationToken) -> Result<(), Error> {
        default_health::probe(ctx, cancel).await
    }

    async fn post_start(&self, ctx: &AppContext, cancel: &CancellationToken) -> Result<(), Error> {
        let _ = (ctx, cancel);
        Ok(())
    }
}

/// Keyed registry of configurators. An app without a registered
/// configurator still gets the default health-check; `pre_start` and
/// `post_start` are simply skipped for it.
#[derive(Default)]
pub struct Registry {
    configurators: HashMap<AppName, Box<dyn Configurator>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: AppName, configurator: Box<dyn Configurator>) {
        self.configurators.insert(name, configurator);
    }

    pub fn get(&self, name: &AppName) -> Option<&dyn Configurator> {
        self.configurators.get(name).map(AsRef::as_ref)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("configurator request to {app} failed")]
    Remote {
        app: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("configurator remote call to {app} returned {status}")]
    RemoteStatus { app: String, status: u16, body: String },

    #[error("health check for {app} timed out after {elapsed:?}")]
    Timeout { app: String, elapsed: Duration },

    #[error("operation for {app} cancelled")]
    Cancelled { app: String },

    #[error("configurator io error")]
    Io(#[from] std::io::Error),

    #[error("configurator serialization error")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod test {
    use super::*;

    struct Silent;

    #[async_trait]
    impl Configurator for Silent {
        fn name(&self) -> &str {
            "silent"
        }
    }

    fn context() -> AppContext {
        AppContext {
            name: AppName::from("radarr"),
            port: 0,
            data_path: PathBuf::from("/data/radarr"),
            data_root: PathBuf::from("/data"),
            integrations: IntegrationConfig::new(),
            health_check_path: "/ping".to_string(),
            health_check_interval: Duration::from_millis(1),
            health_check_timeout: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn default_pre_start_and_post_start_are_no_ops() {
        let configurator = Silent;
        let ctx = context();
        let cancel = CancellationToken::new();
        assert!(configurator.pre_start(&ctx, &cancel).await.is_ok());
        assert!(configurator.post_start(&ctx, &cancel).await.is_ok());
    }

    #[test]
    fn registry_returns_none_for_unregistered_app() {
        let registry = Registry::new();
        assert!(registry.get(&AppName::from("unregistered")).is_none());
    }

    #[test]
    fn registry_returns_registered_configurator() {
        let mut registry = Registry::new();
        registry.register(AppName::from("radarr"), Box::new(Silent));
        assert_eq!(registry.get(&AppName::from("radarr")).unwrap().name(), "silent");
    }
}
