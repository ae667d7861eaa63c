// SPDX-FileCopyrightText: Copyright © 2020-2026 bloud developers
//
// SPDX-License-Identifier: MPL-2.0

//! The install phase sequence: `planned -> configuring -> declarative-apply
//! -> lifecycle-hooks -> running`.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::catalog::{AppDefinition, AppName};
use crate::planner;
use crate::store::{AppStatus, IntegrationConfig, InstallOptions};

use super::{emit, EventSink, Orchestrator, Phase};

/// A single resolved choice: the user's answer to one of the plan's
/// `choices` entries. Single-valued slots carry exactly one app; `multi`
/// slots may carry several.
pub type UserChoices = BTreeMap<String, Vec<AppName>>;

#[derive(Debug, Clone)]
pub struct InstallRequest {
    pub app: AppName,
    pub display_name: Option<String>,
    pub port: u16,
    pub choices: UserChoices,
}

/// Drives a single app through the full install phase sequence. Returns
/// once the app is `running`, or as soon as a phase fails — the app is
/// left in whatever status that phase set; there is no automatic rollback.
pub async fn install(
    orchestrator: &Orchestrator,
    catalog: &BTreeMap<AppName, AppDefinition>,
    request: InstallRequest,
    events: EventSink,
    cancel: CancellationToken,
    rebuild_lock: Arc<tokio::sync::Mutex<()>>,
) -> Result<(), super::Error> {
    let app = request.app.clone();

    let definition = catalog.get(&app).ok_or_else(|| super::Error::NotFound(app.clone()))?;

    // --- 1. Plan ---
    emit(&events, &app, Phase::Plan, "computing install plan");
    let graph = orchestrator.build_graph(catalog.clone()).await?;
    let plan = planner::plan_install(&graph, &app)?;

    let integration_config = resolve_integration_config(&plan, &request.choices)?;

    // --- 2. Record ---
    emit(&events, &app, Phase::Record, "recording install");
    let display_name = request.display_name.clone().unwrap_or_else(|| definition.display_name.clone());
    orchestrator
        .store
        .install(
            &app,
            &display_name,
            &definition.version,
            integration_config.clone(),
            InstallOptions {
                port: request.port,
                is_system: definition.is_system,
            },
        )
        .await?;
    info!("{app}: recorded as installing");

    let installed = orchestrator
        .store
        .get_by_name(&app)
        .await?
        .ok_or_else(|| super::Error::NotFound(app.clone()))?;
    let ctx = orchestrator.build_context(definition, &installed);

    // --- 3. Configure (pre-apply) ---
    emit(&events, &app, Phase::ConfigurePreApply, "running pre-start hook");
    if let Some(configurator) = orchestrator.configurators.get(&app) {
        if let Err(source) = configurator.pre_start(&ctx, &cancel).await {
            error!("{app}: pre_start failed: {source}");
            mark_error(orchestrator, &app).await;
            return Err(super::Error::Configurator(source));
        }
    }

    // --- 4. Rebuild ---
    emit(&events, &app, Phase::Rebuild, "regenerating configuration and applying");
    let outcome = orchestrator
        .rebuild_fragments_and_apply(catalog, &app, &events, &cancel, &rebuild_lock)
        .await?;
    if !outcome.success {
        let message = outcome.error_message.clone().unwrap_or_else(|| "rebuild failed".to_string());
        error!("{app}: rebuild failed: {message}");
        mark_error(orchestrator, &app).await;
        return Err(super::Error::RebuildFailed(message));
    }

    // --- 5. Wait ---
    emit(&events, &app, Phase::Wait, "waiting for health check");
    orchestrator.store.update_status(&app, AppStatus::Starting).await?;
    let health_result = match orchestrator.configurators.get(&app) {
        Some(configurator) => configurator.health_check(&ctx, &cancel).await,
        None => crate::configurator::default_health::probe(&ctx, &cancel).await,
    };
    if let Err(source) = health_result {
        error!("{app}: health check failed: {source}");
        mark_error(orchestrator, &app).await;
        return Err(super::Error::Configurator(source));
    }

    // --- 6. Configure (post-apply) ---
    emit(&events, &app, Phase::ConfigurePostApply, "running post-start hook");
    if let Some(configurator) = orchestrator.configurators.get(&app) {
        if let Err(source) = configurator.post_start(&ctx, &cancel).await {
            // The container is healthy and left running; only the
            // app-side wiring failed. Abort without rolling back.
            error!("{app}: post_start failed, leaving container running: {source}");
            mark_error(orchestrator, &app).await;
            return Err(super::Error::Configurator(source));
        }
    }

    // --- 7. Rewire dependents ---
    emit(&events, &app, Phase::RewireDependents, "rewiring dependents");
    for dependent in &plan.dependents {
        if let Err(source) = rewire_dependent_to_include(orchestrator, catalog, &dependent.target, &dependent.integration_slot, &app, &cancel).await {
            // Best-effort: the new app is already running; a dependent
            // failing to notice it is not fatal to this install.
            warn!("{app}: failed to rewire dependent {}: {source}", dependent.target);
        }
    }

    // --- 8. SSO wiring ---
    if definition.sso.strategy == crate::catalog::SsoStrategy::ForwardAuth {
        if let Some(identity) = &orchestrator.identity {
            emit(&events, &app, Phase::SsoWiring, "wiring forward-auth provider");
            if identity.is_available().await {
                if let Err(source) = identity.add_provider_to_embedded_outpost(&display_name).await {
                    // Spec's resolved open question: an unavailable or
                    // misbehaving identity provider at install time means
                    // the app installs silently without SSO middleware,
                    // not a failed install.
                    warn!("{app}: failed to wire forward-auth provider into outpost: {source}");
                }
            } else {
                info!("{app}: identity provider unavailable, installing without SSO wiring");
            }
        }
    }

    // --- 9. Commit ---
    orchestrator.store.update_status(&app, AppStatus::Running).await?;
    emit(&events, &app, Phase::Commit, "running");
    info!("{app}: install complete");

    Ok(())
}

/// Merges the plan's `auto_config` with the caller's answers to its
/// `choices` into a single resolved [`IntegrationConfig`] for the app
/// being installed. A required choice left unanswered aborts the install
/// before anything is recorded.
fn resolve_integration_config(plan: &planner::InstallPlan, user_choices: &UserChoices) -> Result<IntegrationConfig, super::Error> {
    let mut config = IntegrationConfig::new();

    for auto in &plan.auto_config {
        config.entry(auto.integration_slot.clone()).or_default().push(auto.source.clone());
    }

    for choice in &plan.choices {
        match user_choices.get(&choice.integration_slot) {
            Some(selected) if !selected.is_empty() => {
                config.insert(choice.integration_slot.clone(), selected.clone());
            }
            _ if choice.required => {
                return Err(super::Error::Validation(format!(
                    "missing required choice for integration slot {}",
                    choice.integration_slot
                )));
            }
            _ => {
                // Optional slot, user declined: leave unconfigured.
            }
        }
    }

    Ok(config)
}

/// Adds `source` into `target`'s integration config for `slot`, then
/// re-runs `target`'s post_start so it picks up the new relationship.
async fn rewire_dependent_to_include(
    orchestrator: &Orchestrator,
    catalog: &BTreeMap<AppName, AppDefinition>,
    target: &AppName,
    slot: &str,
    source: &AppName,
    cancel: &CancellationToken,
) -> Result<(), super::Error> {
    let Some(installed) = orchestrator.store.get_by_name(target).await? else {
        return Ok(());
    };
    let Some(definition) = catalog.get(target) else {
        return Ok(());
    };

    let mut config = installed.integration_config.clone();
    let entry = config.entry(slot.to_string()).or_default();
    if !entry.contains(source) {
        entry.push(source.clone());
    }
    orchestrator.store.update_integration_config(target, config.clone()).await?;

    if let Some(configurator) = orchestrator.configurators.get(target) {
        let mut refreshed = installed;
        refreshed.integration_config = config;
        let ctx = orchestrator.build_context(definition, &refreshed);
        configurator.post_start(&ctx, cancel).await?;
    }

    Ok(())
}

async fn mark_error(orchestrator: &Orchestrator, app: &AppName) {
    let _ = orchestrator.store.update_status(app, AppStatus::Error).await;
}
