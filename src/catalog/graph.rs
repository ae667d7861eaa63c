// SPDX-FileCopyrightText: Copyright © 2020-2026 bloud developers
//
// SPDX-License-Identifier: MPL-2.0

//! Derived index over the catalog: forward lookup by name, and a reverse
//! index of "who depends on me, and through which slot". Rebuilt whenever
//! the catalog or the installed set changes; cheap enough that nothing
//! incremental is needed.

use std::collections::{BTreeMap, HashMap, HashSet};

use super::model::{AppDefinition, AppName};

/// A back-pointer recorded for every compatible-app reference the catalog
/// declares: "dependent_app lists this app as compatible for slot".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependent {
    pub dependent_app: AppName,
    pub integration_slot: String,
}

#[derive(Debug, Clone, Default)]
pub struct AppGraph {
    definitions: BTreeMap<AppName, AppDefinition>,
    /// app -> list of apps that declare it as compatible, and through which slot
    reverse: HashMap<AppName, Vec<Dependent>>,
    installed: HashSet<AppName>,
}

impl AppGraph {
    /// Builds the graph (forward + reverse index) from a full catalog.
    pub fn build(definitions: BTreeMap<AppName, AppDefinition>) -> Self {
        let mut reverse: HashMap<AppName, Vec<Dependent>> = HashMap::new();

        for definition in definitions.values() {
            for (slot_name, slot) in &definition.integrations {
                for compatible in &slot.compatible {
                    reverse.entry(compatible.app.clone()).or_default().push(Dependent {
                        dependent_app: definition.name.clone(),
                        integration_slot: slot_name.clone(),
                    });
                }
            }
        }

        Self {
            definitions,
            reverse,
            installed: HashSet::new(),
        }
    }

    /// Atomically replaces the installed set.
    pub fn set_installed(&mut self, installed: impl IntoIterator<Item = AppName>) {
        self.installed = installed.into_iter().collect();
    }

    pub fn get(&self, name: &AppName) -> Option<&AppDefinition> {
        self.definitions.get(name)
    }

    pub fn is_installed(&self, name: &AppName) -> bool {
        self.installed.contains(name)
    }

    pub fn installed_names(&self) -> impl Iterator<Item = &AppName> {
        self.installed.iter()
    }

    pub fn definitions(&self) -> impl Iterator<Item = &AppDefinition> {
        self.definitions.values()
    }

    /// Every installed app that declares `name` as a compatible for one of
    /// its integration slots.
    pub fn find_dependents(&self, name: &AppName) -> Vec<&Dependent> {
        self.reverse
            .get(name)
            .into_iter()
            .flatten()
            .filter(|dependent| self.installed.contains(&dependent.dependent_app))
            .collect()
    }

    /// Every app (installed or not) that declares `name` as a compatible
    /// for one of its integration slots, regardless of whether it is
    /// installed. Used by the planner when computing `dependents` for a
    /// plan, where installed-ness of the dependent itself is what matters,
    /// not of the target.
    pub fn find_all_referencing(&self, name: &AppName) -> Vec<&Dependent> {
        self.reverse.get(name).into_iter().flatten().collect()
    }

    /// Splits the compatible list for `(app, slot)` into installed and
    /// not-installed, preserving catalog declaration order.
    pub fn get_compatible_apps(&self, app: &AppName, slot: &str) -> (Vec<AppName>, Vec<AppName>) {
        let Some(definition) = self.definitions.get(app) else {
            return (Vec::new(), Vec::new());
        };
        let Some(slot_def) = definition.integrations.get(slot) else {
            return (Vec::new(), Vec::new());
        };

        let mut installed = Vec::new();
        let mut available = Vec::new();
        for compatible in &slot_def.compatible {
            if self.installed.contains(&compatible.app) {
                installed.push(compatible.app.clone());
            } else {
                available.push(compatible.app.clone());
            }
        }

        (installed, available)
    }

    /// The `default`-flagged compatible for a slot, if any.
    pub fn default_compatible(&self, app: &AppName, slot: &str) -> Option<AppName> {
        self.definitions
            .get(app)?
            .integrations
            .get(slot)?
            .compatible
            .iter()
            .find(|c| c.default)
            .map(|c| c.app.clone())
    }
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;

    use super::*;
    use crate::catalog::model::{CompatibleApp, IntegrationSlot};

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

    fn sample_catalog() -> BTreeMap<AppName, AppDefinition> {
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
        catalog
    }

    #[test]
    fn reverse_index_finds_dependents() {
        let mut graph = AppGraph::build(sample_catalog());
        graph.set_installed([AppName::from("qbittorrent"), AppName::from("radarr")]);

        let dependents = graph.find_dependents(&AppName::from("qbittorrent"));
        assert_eq!(dependents.len(), 1);
        assert_eq!(dependents[0].dependent_app, AppName::from("radarr"));
        assert_eq!(dependents[0].integration_slot, "downloadClient");
    }

    #[test]
    fn compatible_apps_split_by_installed_state_preserves_order() {
        let mut graph = AppGraph::build(sample_catalog());
        graph.set_installed([AppName::from("deluge")]);

        let (installed, available) = graph.get_compatible_apps(&AppName::from("radarr"), "downloadClient");
        assert_eq!(installed, vec![AppName::from("deluge")]);
        assert_eq!(available, vec![AppName::from("qbittorrent")]);
    }

    #[test]
    fn dangling_compatible_reference_is_tolerated() {
        let mut catalog = BTreeMap::new();
        catalog.insert(
            AppName::from("radarr"),
            app(
                "radarr",
                vec![("downloadClient", slot(true, false, &[("not-in-catalog", true)]))],
            ),
        );
        let graph = AppGraph::build(catalog);
        let (installed, available) = graph.get_compatible_apps(&AppName::from("radarr"), "downloadClient");
        assert!(installed.is_empty());
        assert_eq!(available, vec![AppName::from("not-in-catalog")]);
    }
}
