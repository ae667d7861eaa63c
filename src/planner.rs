// SPDX-FileCopyrightText: Copyright © 2020-2026 bloud developers
//
// SPDX-License-Identifier: MPL-2.0

//! C3: computes install and remove plans against the app graph.

use serde::Serialize;
use thiserror::Error;

use crate::catalog::{AppGraph, AppName};

/// A single slot that still needs a user choice to resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Choice {
    pub integration_slot: String,
    pub required: bool,
    pub installed_options: Vec<AppName>,
    pub available_options: Vec<AppName>,
    pub recommended: Option<AppName>,
}

/// A slot that will be wired up without prompting the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AutoConfig {
    pub target: AppName,
    pub source: AppName,
    pub integration_slot: String,
}

/// An already-installed app that will be rewired to include the newly
/// installed app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependentRewire {
    pub target: AppName,
    pub source: AppName,
    pub integration_slot: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallPlan {
    pub app: AppName,
    pub can_install: bool,
    pub choices: Vec<Choice>,
    pub auto_config: Vec<AutoConfig>,
    pub dependents: Vec<DependentRewire>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovePlan {
    pub app: AppName,
    pub can_remove: bool,
    pub blockers: Vec<String>,
    pub will_unconfigure: Vec<AppName>,
}

/// Computes the install plan for `name` against the current state of
/// `graph`. Pure function of `graph`: calling it twice in a row without a
/// graph mutation in between yields identical plans.
pub fn plan_install(graph: &AppGraph, name: &AppName) -> Result<InstallPlan, Error> {
    let definition = graph.get(name).ok_or_else(|| Error::UnknownApp(name.clone()))?;

    let mut choices = Vec::new();
    let mut auto_config = Vec::new();

    for (slot_name, slot) in &definition.integrations {
        let (installed, available) = graph.get_compatible_apps(name, slot_name);

        match (installed.len(), slot.required, slot.multi) {
            (0, true, _) => {
                let recommended = graph
                    .default_compatible(name, slot_name)
                    .or_else(|| available.first().cloned());
                choices.push(Choice {
                    integration_slot: slot_name.clone(),
                    required: true,
                    installed_options: installed,
                    available_options: available,
                    recommended,
                });
            }
            (0, false, _) => {
                // Nothing installed, slot optional: skip silently.
            }
            (1, _, _) => {
                auto_config.push(AutoConfig {
                    target: name.clone(),
                    source: installed[0].clone(),
                    integration_slot: slot_name.clone(),
                });
            }
            (_, _, true) => {
                for source in installed {
                    auto_config.push(AutoConfig {
                        target: name.clone(),
                        source,
                        integration_slot: slot_name.clone(),
                    });
                }
            }
            (_, _, false) => {
                let recommended = graph
                    .default_compatible(name, slot_name)
                    .or_else(|| installed.first().cloned());
                choices.push(Choice {
                    integration_slot: slot_name.clone(),
                    required: slot.required,
                    installed_options: installed,
                    available_options: available,
                    recommended,
                });
            }
        }
    }

    let dependents = graph
        .find_all_referencing(name)
        .into_iter()
        .filter(|dependent| graph.is_installed(&dependent.dependent_app))
        .map(|dependent| DependentRewire {
            target: dependent.dependent_app.clone(),
            source: name.clone(),
            integration_slot: dependent.integration_slot.clone(),
        })
        .collect();

    Ok(InstallPlan {
        app: name.clone(),
        // The UI is expected to resolve choices by prompting; a missing
        // required integration becomes a choice, never a blocker.
        can_install: true,
        choices,
        auto_config,
        dependents,
    })
}

/// Computes the remove plan for `name`: every installed dependent, whether
/// an alternative exists for it, and the resulting blockers/rewires.
pub fn plan_remove(graph: &AppGraph, name: &AppName) -> Result<RemovePlan, Error> {
    if graph.get(name).is_none() {
        return Err(Error::UnknownApp(name.clone()));
    }

    let mut blockers = Vec::new();
    let mut will_unconfigure = Vec::new();

    for dependent in graph.find_dependents(name) {
        let Some(dependent_def) = graph.get(&dependent.dependent_app) else {
            continue;
        };
        let Some(slot) = dependent_def.integrations.get(&dependent.integration_slot) else {
            continue;
        };

        let (installed, _available) = graph.get_compatible_apps(&dependent.dependent_app, &dependent.integration_slot);
        let has_alternative = installed.iter().any(|candidate| candidate != name);

        if slot.required && !has_alternative {
            blockers.push(format!(
                "{} requires a {}",
                dependent.dependent_app, dependent.integration_slot
            ));
        } else {
            will_unconfigure.push(dependent.dependent_app.clone());
        }
    }

    Ok(RemovePlan {
        app: name.clone(),
        can_remove: blockers.is_empty(),
        blockers,
        will_unconfigure,
    })
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown app: {0}")]
    UnknownApp(AppName),
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;

    use super::*;
    use crate::catalog::model::{AppDefinition, CompatibleApp, IntegrationSlot};

    fn app(name: &str, integrations: Vec<(&str, IntegrationSlot)>) -> AppDefinition {
        AppDefinition {
            name: AppName::from(name),
            display_name: name.to_string(),
            description: "d".into(),
            category: "media".into(),
            version: "1.0".into(),
            port: 8080,
            is_system: false,
            routing: None,
            sso: Default::default(),
            integrations: integrations.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            health_check: None,
        }
    }

    fn slot(required: bool, multi: bool, compatible: &[(&str, bool)]) -> IntegrationSlot {
        IntegrationSlot {
            required,
            multi,
            compatible: compatible
                .iter()
                .map(|(name, default)| CompatibleApp {
                    app: AppName::from(*name),
                    default: *default,
                    category: None,
                })
                .collect(),
        }
    }

    #[test]
    fn auto_wire_single_installed_compatible() {
        let mut catalog = BTreeMap::new();
        catalog.insert(AppName::from("qbittorrent"), app("qbittorrent", vec![]));
        catalog.insert(AppName::from("deluge"), app("deluge", vec![]));
        catalog.insert(
            AppName::from("radarr"),
            app(
                "radarr",
                vec![(
                    "downloadClient",
                    slot(true, false, &[("qbittorrent", true), ("deluge", false)]),
                )],
            ),
        );
        let mut graph = AppGraph::build(catalog);
        graph.set_installed([AppName::from("qbittorrent")]);

        let plan = plan_install(&graph, &AppName::from("radarr")).unwrap();
        assert!(plan.choices.is_empty());
        assert_eq!(plan.auto_config.len(), 1);
        assert_eq!(plan.auto_config[0].source, AppName::from("qbittorrent"));
        assert!(plan.dependents.is_empty());
    }

    /// Scenario 2: forced choice when multiple compatibles installed and
    /// the slot does not accept multiple providers.
    #[test]
    fn forced_choice_when_multiple_installed_and_not_multi() {
        let mut catalog = BTreeMap::new();
        catalog.insert(AppName::from("qbittorrent"), app("qbittorrent", vec![]));
        catalog.insert(AppName::from("deluge"), app("deluge", vec![]));
        catalog.insert(
            AppName::from("radarr"),
            app(
                "radarr",
                vec![(
                    "downloadClient",
                    slot(true, false, &[("qbittorrent", true), ("deluge", false)]),
                )],
            ),
        );
        let mut graph = AppGraph::build(catalog);
        graph.set_installed([AppName::from("qbittorrent"), AppName::from("deluge")]);

        let plan = plan_install(&graph, &AppName::from("radarr")).unwrap();
        assert_eq!(plan.choices.len(), 1);
        let choice = &plan.choices[0];
        assert_eq!(choice.installed_options.len(), 2);
        assert!(choice.available_options.is_empty());
        assert_eq!(choice.recommended, Some(AppName::from("qbittorrent")));
    }

    /// Scenario 3: dependent rewire via a multi slot.
    #[test]
    fn dependent_rewire_recorded_for_installed_referencing_apps() {
        let mut catalog = BTreeMap::new();
        catalog.insert(AppName::from("qbittorrent"), app("qbittorrent", vec![]));
        catalog.insert(AppName::from("jellyfin"), app("jellyfin", vec![]));
        catalog.insert(
            AppName::from("sonarr"),
            app(
                "sonarr",
                vec![("downloadClient", slot(true, false, &[("qbittorrent", true)]))],
            ),
        );
        catalog.insert(
            AppName::from("jellyseerr"),
            app(
                "jellyseerr",
                vec![(
                    "pvr",
                    slot(false, true, &[("radarr", false), ("sonarr", false)]),
                )],
            ),
        );
        catalog.insert(
            AppName::from("radarr"),
            app(
                "radarr",
                vec![("downloadClient", slot(true, false, &[("qbittorrent", true)]))],
            ),
        );
        let mut graph = AppGraph::build(catalog);
        graph.set_installed([
            AppName::from("qbittorrent"),
            AppName::from("jellyfin"),
            AppName::from("radarr"),
            AppName::from("jellyseerr"),
        ]);

        let plan = plan_install(&graph, &AppName::from("sonarr")).unwrap();
        assert_eq!(plan.auto_config.len(), 1);
        assert_eq!(plan.auto_config[0].source, AppName::from("qbittorrent"));
        assert_eq!(plan.dependents.len(), 1);
        assert_eq!(plan.dependents[0].target, AppName::from("jellyseerr"));
        assert_eq!(plan.dependents[0].integration_slot, "pvr");
    }

    /// Scenario 4: blocked remove, no alternative for a required slot.
    #[test]
    fn blocked_remove_without_alternative() {
        let mut catalog = BTreeMap::new();
        catalog.insert(AppName::from("qbittorrent"), app("qbittorrent", vec![]));
        catalog.insert(
            AppName::from("radarr"),
            app(
                "radarr",
                vec![("downloadClient", slot(true, false, &[("qbittorrent", true)]))],
            ),
        );
        let mut graph = AppGraph::build(catalog);
        graph.set_installed([AppName::from("qbittorrent"), AppName::from("radarr")]);

        let plan = plan_remove(&graph, &AppName::from("qbittorrent")).unwrap();
        assert!(!plan.can_remove);
        assert_eq!(plan.blockers, vec!["radarr requires a downloadClient".to_string()]);
    }

    /// Scenario 5: remove with an alternative available.
    #[test]
    fn remove_with_alternative_unconfigures_instead_of_blocking() {
        let mut catalog = BTreeMap::new();
        catalog.insert(AppName::from("qbittorrent"), app("qbittorrent", vec![]));
        catalog.insert(AppName::from("deluge"), app("deluge", vec![]));
        catalog.insert(
            AppName::from("radarr"),
            app(
                "radarr",
                vec![(
                    "downloadClient",
                    slot(true, false, &[("qbittorrent", true), ("deluge", false)]),
                )],
            ),
        );
        let mut graph = AppGraph::build(catalog);
        graph.set_installed([
            AppName::from("qbittorrent"),
            AppName::from("deluge"),
            AppName::from("radarr"),
        ]);

        let plan = plan_remove(&graph, &AppName::from("qbittorrent")).unwrap();
        assert!(plan.can_remove);
        assert_eq!(plan.will_unconfigure, vec![AppName::from("radarr")]);
    }

    #[test]
    fn remove_with_no_dependents_is_unconditionally_allowed() {
        let mut catalog = BTreeMap::new();
        catalog.insert(AppName::from("qbittorrent"), app("qbittorrent", vec![]));
        let mut graph = AppGraph::build(catalog);
        graph.set_installed([AppName::from("qbittorrent")]);

        let plan = plan_remove(&graph, &AppName::from("qbittorrent")).unwrap();
        assert!(plan.can_remove);
        assert!(plan.blockers.is_empty());
        assert!(plan.will_unconfigure.is_empty());
    }

    #[test]
    fn required_slot_with_zero_compatibles_surfaces_empty_choice() {
        let mut catalog = BTreeMap::new();
        catalog.insert(
            AppName::from("radarr"),
            app("radarr", vec![("downloadClient", slot(true, false, &[]))]),
        );
        let graph = AppGraph::build(catalog);

        let plan = plan_install(&graph, &AppName::from("radarr")).unwrap();
        assert_eq!(plan.choices.len(), 1);
        assert!(plan.choices[0].installed_options.is_empty());
        assert!(plan.choices[0].available_options.is_empty());
    }

    #[test]
    fn plan_install_is_deterministic() {
        let mut catalog = BTreeMap::new();
        catalog.insert(AppName::from("qbittorrent"), app("qbittorrent", vec![]));
        catalog.insert(
            AppName::from("radarr"),
            app(
                "radarr",
                vec![("downloadClient", slot(true, false, &[("qbittorrent", true)]))],
            ),
        );
        let mut graph = AppGraph::build(catalog);
        graph.set_installed([AppName::from("qbittorrent")]);

        let first = plan_install(&graph, &AppName::from("radarr")).unwrap();
        let second = plan_install(&graph, &AppName::from("radarr")).unwrap();
        assert_eq!(first, second);
    }
}
