// SPDX-FileCopyrightText: Copyright © 2020-2026 bloud developers
//
// SPDX-License-Identifier: MPL-2.0

//! The internal HTTP API consumed by the web tier. Mechanical plumbing
//! around the core: the REST shape, session store, and streaming event feed
//! are all external collaborators, so this module is a thin `axum` router
//! translating requests into calls against
//! [`crate::orchestrator::Orchestrator`], [`crate::planner`], and
//! [`crate::store::Store`].

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::catalog::{AppDefinition, AppGraph, AppName};
use crate::orchestrator::install::{InstallRequest, UserChoices};
use crate::orchestrator::{Orchestrator, PhaseEvent};
use crate::planner;
use crate::store::Store;
use crate::AgentError;

/// Shared state threaded through every handler. The catalog is cached in
/// memory behind a `RwLock` and refreshed by [`AppState::reload_catalog`];
/// handlers never touch the filesystem directly.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub store: Arc<Store>,
    pub catalog: Arc<RwLock<BTreeMap<AppName, AppDefinition>>>,
}

impl AppState {
    pub async fn reload_catalog(&self, apps_dir: &std::path::Path) -> Result<(), crate::catalog::loader::Error> {
        let fresh = crate::catalog::loader::load_from_dir(apps_dir).await?;
        *self.catalog.write().await = fresh;
        Ok(())
    }

    async fn graph(&self) -> Result<AppGraph, crate::store::Error> {
        let catalog = self.catalog.read().await.clone();
        let installed = self.store.get_installed_names().await?;
        let mut graph = AppGraph::build(catalog);
        graph.set_installed(installed);
        Ok(graph)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/catalog", get(list_catalog))
        .route("/api/apps", get(list_installed))
        .route("/api/apps/:name/plan/install", get(plan_install))
        .route("/api/apps/:name/plan/remove", get(plan_remove))
        .route("/api/apps/:name/install", post(install))
        .route("/api/apps/:name", axum::routing::delete(uninstall))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    blockers: Option<Vec<String>>,
}

type ApiResult<T> = Result<Json<T>, (axum::http::StatusCode, Json<ErrorBody>)>;

/// Maps the crate's boundary error type to a status code and JSON body.
/// `Conflict` carries its blockers through to the client; every other
/// variant collapses to a plain message at the status its kind implies.
fn api_error(error: impl Into<AgentError>) -> (axum::http::StatusCode, Json<ErrorBody>) {
    let error = error.into();
    let status = match &error {
        AgentError::Validation(_) => axum::http::StatusCode::BAD_REQUEST,
        AgentError::NotFound(_) => axum::http::StatusCode::NOT_FOUND,
        AgentError::Conflict { .. } => axum::http::StatusCode::CONFLICT,
        _ => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
    };
    let blockers = match &error {
        AgentError::Conflict { blockers } => Some(blockers.clone()),
        _ => None,
    };
    (status, Json(ErrorBody { error: error.to_string(), blockers }))
}

async fn list_catalog(State(state): State<AppState>) -> Json<Vec<AppDefinition>> {
    Json(state.catalog.read().await.values().cloned().collect())
}

async fn list_installed(State(state): State<AppState>) -> ApiResult<Vec<crate::store::InstalledApp>> {
    state.store.get_all().await.map(Json).map_err(api_error)
}

async fn plan_install(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<planner::InstallPlan> {
    let graph = state.graph().await.map_err(api_error)?;
    planner::plan_install(&graph, &AppName::from(name)).map(Json).map_err(api_error)
}

async fn plan_remove(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<planner::RemovePlan> {
    let graph = state.graph().await.map_err(api_error)?;
    planner::plan_remove(&graph, &AppName::from(name)).map(Json).map_err(api_error)
}

#[derive(Debug, Deserialize)]
struct InstallBody {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    port: u16,
    #[serde(default)]
    choices: UserChoices,
}

#[derive(Debug, Serialize)]
struct OperationOutcome {
    success: bool,
    events: Vec<PhaseEventBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    blockers: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct PhaseEventBody {
    phase: String,
    message: String,
}

impl From<PhaseEvent> for PhaseEventBody {
    fn from(event: PhaseEvent) -> Self {
        Self {
            phase: format!("{:?}", event.phase),
            message: event.message,
        }
    }
}

/// Runs `spawn_operation` to completion, draining every phase event it
/// emits on `sink` into a single JSON payload that ends with an explicit
/// success flag. Streaming operations are expected to terminate with an
/// explicit completion event carrying that flag; real server-sent-event
/// fan-out to a browser is the web tier's concern, not this agent's.
async fn run_and_collect<F, Fut>(spawn_operation: F) -> OperationOutcome
where
    F: FnOnce(tokio::sync::mpsc::UnboundedSender<PhaseEvent>) -> Fut,
    Fut: std::future::Future<Output = Result<(), crate::orchestrator::Error>> + Send + 'static,
{
    let (sink, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let handle = tokio::spawn(spawn_operation(sink));

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(PhaseEventBody::from(event));
    }

    let result = handle
        .await
        .unwrap_or_else(|_| Err(crate::orchestrator::Error::Validation("operation task panicked".to_string())));

    match result.map_err(AgentError::from) {
        Ok(()) => OperationOutcome {
            success: true,
            events,
            error: None,
            blockers: None,
        },
        Err(AgentError::Conflict { blockers }) => OperationOutcome {
            success: false,
            events,
            error: Some("remove blocked".to_string()),
            blockers: Some(blockers),
        },
        Err(source) => OperationOutcome {
            success: false,
            events,
            error: Some(source.to_string()),
            blockers: None,
        },
    }
}

async fn install(State(state): State<AppState>, Path(name): Path<String>, Json(body): Json<InstallBody>) -> Json<OperationOutcome> {
    let catalog = state.catalog.read().await.clone();
    let request = InstallRequest {
        app: AppName::from(name),
        display_name: body.display_name,
        port: body.port,
        choices: body.choices,
    };
    let orchestrator = state.orchestrator.clone();

    let outcome = run_and_collect(move |sink| async move { orchestrator.install(&catalog, request, sink, CancellationToken::new()).await }).await;

    Json(outcome)
}

async fn uninstall(State(state): State<AppState>, Path(name): Path<String>) -> Json<OperationOutcome> {
    let catalog = state.catalog.read().await.clone();
    let name = AppName::from(name);
    let orchestrator = state.orchestrator.clone();

    let outcome = run_and_collect(move |sink| async move { orchestrator.uninstall(&catalog, &name, sink, CancellationToken::new()).await }).await;

    Json(outcome)
}
