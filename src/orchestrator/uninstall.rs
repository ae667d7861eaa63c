// SPDX-FileCopyrightText: Copyright © 2020-2026 bloud developers
//
// SPDX-License-Identifier: MPL-2.0

//! The uninstall phase sequence, the reverse of install.rs.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::catalog::{AppDefinition, AppName};
use crate::planner;
use crate::store::AppStatus;

use super::{emit, EventSink, Orchestrator, Phase};

/// Drives a single app through the uninstall phase sequence. If the plan
/// reports blockers, nothing else runs and the blockers are returned.
pub async fn uninstall(
    orchestrator: &Orchestrator,
    catalog: &BTreeMap<AppName, AppDefinition>,
    app: &AppName,
    events: EventSink,
    cancel: CancellationToken,
    rebuild_lock: Arc<tokio::sync::Mutex<()>>,
) -> Result<(), super::Error> {
    // --- 1. Plan ---
    emit(&events, app, Phase::Plan, "computing remove plan");
    let graph = orchestrator.build_graph(catalog.clone()).await?;
    let plan = planner::plan_remove(&graph, app)?;
    if !plan.can_remove {
        return Err(super::Error::Blocked(plan.blockers));
    }

    let Some(installed) = orchestrator.store.get_by_name(app).await? else {
        return Err(super::Error::NotFound(app.clone()));
    };
    let definition = catalog.get(app);

    // --- 2. Mark ---
    emit(&events, app, Phase::Mark, "marking uninstalling");
    orchestrator.store.update_status(app, AppStatus::Uninstalling).await?;

    // --- 3. SSO cleanup ---
    if let (Some(identity), Some(definition)) = (&orchestrator.identity, definition) {
        emit(&events, app, Phase::SsoCleanup, "cleaning up SSO registration");
        if let Err(source) = identity.delete_app_sso(app.as_str(), &installed.display_name, definition.sso.strategy).await {
            warn!("{app}: SSO cleanup failed, continuing: {source}");
        }
    }

    // --- 4. Stop container ---
    emit(&events, app, Phase::StopContainer, "stopping container");
    if let Err(source) = orchestrator.applier.stop_service(app.as_str()).await {
        warn!("{app}: failed to stop service, continuing: {source}");
    }

    // --- 5. Rewire dependents ---
    emit(&events, app, Phase::RewireDependents, "rewiring dependents");
    for dependent in graph.find_dependents(app) {
        if let Err(source) =
            unwire_dependent(orchestrator, catalog, &graph, &dependent.dependent_app, &dependent.integration_slot, app, &cancel).await
        {
            warn!("{app}: failed to rewire dependent {}: {source}", dependent.dependent_app);
        }
    }

    // --- 6. Delete record ---
    emit(&events, app, Phase::DeleteRecord, "deleting record");
    orchestrator.store.uninstall(app).await?;
    info!("{app}: uninstalled");

    // --- 7. Rebuild ---
    emit(&events, app, Phase::Rebuild, "regenerating configuration and applying");
    match orchestrator.rebuild_fragments_and_apply(catalog, app, &events, &cancel, &rebuild_lock).await {
        Ok(outcome) if !outcome.success => {
            error!(
                "{app}: post-uninstall rebuild failed, record already removed: {}",
                outcome.error_message.unwrap_or_default()
            );
        }
        Err(source) => {
            error!("{app}: post-uninstall rebuild errored, record already removed: {source}");
        }
        Ok(_) => {}
    }

    Ok(())
}

/// Removes `removed` from `target`'s `slot`, substituting the first
/// remaining installed compatible if one exists rather than leaving the
/// slot empty.
async fn unwire_dependent(
    orchestrator: &Orchestrator,
    catalog: &BTreeMap<AppName, AppDefinition>,
    graph: &crate::catalog::AppGraph,
    target: &AppName,
    slot: &str,
    removed: &AppName,
    cancel: &CancellationToken,
) -> Result<(), super::Error> {
    let Some(installed) = orchestrator.store.get_by_name(target).await? else {
        return Ok(());
    };
    let Some(definition) = catalog.get(target) else {
        return Ok(());
    };

    let mut config = installed.integration_config.clone();
    if let Some(values) = config.get_mut(slot) {
        values.retain(|value| value != removed);

        if values.is_empty() {
            let (installed_compatibles, _) = graph.get_compatible_apps(target, slot);
            match installed_compatibles.into_iter().find(|candidate| candidate != removed) {
                Some(alternative) => *values = vec![alternative],
                None => {
                    config.remove(slot);
                }
            }
        }
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
