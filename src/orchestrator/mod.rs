// SPDX-FileCopyrightText: Copyright © 2020-2026 bloud developers
//
// SPDX-License-Identifier: MPL-2.0

//! C9: drives the install/uninstall phase state machines, wiring C3–C8
//! together and serializing mutations through the shared rebuild lock.

pub mod install;
pub mod uninstall;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use crate::catalog::{AppDefinition, AppGraph, AppName};
use crate::configurator::{AppContext, Registry};
use crate::declarative::Applier;
use crate::identity::IdentityClient;
use crate::store::{InstalledApp, Store};

/// A named phase of either state machine. Install and uninstall share the
/// same event shape so the HTTP layer can fan both out identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Plan,
    Record,
    ConfigurePreApply,
    Rebuild,
    Wait,
    ConfigurePostApply,
    RewireDependents,
    SsoWiring,
    Commit,
    Mark,
    SsoCleanup,
    StopContainer,
    DeleteRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseEvent {
    pub app: AppName,
    pub phase: Phase,
    pub message: String,
}

pub type EventSink = UnboundedSender<PhaseEvent>;

fn emit(events: &EventSink, app: &AppName, phase: Phase, message: impl Into<String>) {
    let _ = events.send(PhaseEvent {
        app: app.clone(),
        phase,
        message: message.into(),
    });
}

/// Wires C3 through C8 together. Holds no catalog state of its own — every
/// entry point takes the current catalog as an argument and rebuilds the
/// graph against the store's live installed set, per §3's ownership rule
/// that the graph belongs to whichever scope is planning.
pub struct Orchestrator {
    pub(crate) store: Arc<Store>,
    pub(crate) applier: Arc<Applier>,
    pub(crate) configurators: Arc<Registry>,
    pub(crate) identity: Option<Arc<IdentityClient>>,
    pub(crate) declarative_output_path: PathBuf,
    pub(crate) routing_output_path: PathBuf,
}

impl Orchestrator {
    pub fn new(
        store: Arc<Store>,
        applier: Arc<Applier>,
        configurators: Arc<Registry>,
        identity: Option<Arc<IdentityClient>>,
        declarative_output_path: PathBuf,
        routing_output_path: PathBuf,
    ) -> Self {
        Self {
            store,
            applier,
            configurators,
            identity,
            declarative_output_path,
            routing_output_path,
        }
    }

    pub(crate) async fn build_graph(&self, catalog: BTreeMap<AppName, AppDefinition>) -> Result<AppGraph, Error> {
        let installed = self.store.get_installed_names().await?;
        let mut graph = AppGraph::build(catalog);
        graph.set_installed(installed);
        Ok(graph)
    }

    pub(crate) async fn rebuild_fragments_and_apply(
        &self,
        catalog: &BTreeMap<AppName, AppDefinition>,
        app: &AppName,
        events: &EventSink,
        cancel: &tokio_util::sync::CancellationToken,
        lock: &tokio::sync::Mutex<()>,
    ) -> Result<crate::declarative::ApplyOutcome, Error> {
        let _guard = lock.lock().await;

        let installed_apps = self.store.get_all().await?;

        crate::declarative::generator::write(&self.declarative_output_path, &installed_apps)
            .await
            .map_err(Error::Declarative)?;

        let routable: Vec<crate::routing::RoutableApp<'_>> = installed_apps
            .iter()
            .map(|installed| {
                let definition = catalog.get(&installed.name);
                crate::routing::RoutableApp {
                    installed,
                    routing: definition.and_then(|definition| definition.routing.as_ref()),
                    sso_strategy: definition.map(|definition| definition.sso.strategy).unwrap_or_default(),
                }
            })
            .collect();
        let identity_provider_enabled = match &self.identity {
            Some(identity) => identity.is_available().await,
            None => false,
        };
        let fragment = crate::routing::render(&routable, identity_provider_enabled);
        crate::routing::write_fragment(&self.routing_output_path, &fragment)
            .await
            .map_err(Error::Routing)?;

        let (sink, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let forward_app = app.clone();
        let forward_events = events.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                emit(&forward_events, &forward_app, Phase::Rebuild, format!("{:?}: {}", event.stream, event.line));
            }
        });

        let outcome = self.applier.apply_locked(sink, cancel.clone()).await;
        let _ = forwarder.await;

        Ok(outcome)
    }

    pub(crate) fn build_context(&self, definition: &AppDefinition, installed: &InstalledApp) -> AppContext {
        let health_check = definition.health_check.clone().unwrap_or_default();
        AppContext {
            name: installed.name.clone(),
            port: installed.port,
            data_path: PathBuf::from("/var/lib/bloud/apps").join(installed.name.as_str()),
            data_root: PathBuf::from("/var/lib/bloud/apps"),
            integrations: installed.integration_config.clone(),
            health_check_path: health_check.path,
            health_check_interval: health_check.interval,
            health_check_timeout: health_check.timeout,
        }
    }

    /// Drives `request.app` through the full install phase sequence.
    /// Serialized against every other install, uninstall, and direct
    /// rebuild via the applier's shared rebuild lock.
    pub async fn install(
        &self,
        catalog: &BTreeMap<AppName, AppDefinition>,
        request: install::InstallRequest,
        events: EventSink,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<(), Error> {
        let lock = self.applier.rebuild_lock();
        install::install(self, catalog, request, events, cancel, lock).await
    }

    /// Drives `app` through the full uninstall phase sequence. Returns
    /// [`Error::Blocked`] without touching any state if the remove plan
    /// reports blockers.
    pub async fn uninstall(
        &self,
        catalog: &BTreeMap<AppName, AppDefinition>,
        app: &AppName,
        events: EventSink,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<(), Error> {
        let lock = self.applier.rebuild_lock();
        uninstall::uninstall(self, catalog, app, events, cancel, lock).await
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("app not found: {0}")]
    NotFound(AppName),

    #[error("validation: {0}")]
    Validation(String),

    #[error("remove blocked: {0:?}")]
    Blocked(Vec<String>),

    #[error("app store error")]
    Store(#[from] crate::store::Error),

    #[error("planner error")]
    Planner(#[from] crate::planner::Error),

    #[error("configurator error")]
    Configurator(#[from] crate::configurator::Error),

    #[error("identity provider error")]
    Identity(#[from] crate::identity::Error),

    #[error("declarative generator error")]
    Declarative(#[source] crate::declarative::Error),

    #[error("routing generator error")]
    Routing(#[source] crate::routing::Error),

    #[error("rebuild failed: {0}")]
    RebuildFailed(String),
}
