// SPDX-FileCopyrightText: Copyright © 2020-2026 bloud developers
//
// SPDX-License-Identifier: MPL-2.0

//! Renders the declarative system-configuration fragment from the
//! installed set. The sibling `applier` module feeds this fragment to the
//! external configuration tool.

use std::path::Path;

use crate::routing;
use crate::store::InstalledApp;

use super::Error;

/// Emits one enabled-app entry per installed app, sorted by name so the
/// fragment is stable across regenerations with the same installed set.
pub fn render(apps: &[InstalledApp]) -> String {
    let mut names: Vec<&str> = apps.iter().map(|app| app.name.as_str()).collect();
    names.sort_unstable();

    let mut out = String::from("# generated by bloudd, do not edit by hand\n");
    out.push_str("{\n  bloud.apps.enable = [\n");
    for name in names {
        out.push_str("    \"");
        out.push_str(name);
        out.push_str("\"\n");
    }
    out.push_str("  ];\n}\n");
    out
}

pub async fn write(path: impl AsRef<Path>, apps: &[InstalledApp]) -> Result<(), Error> {
    let fragment = render(apps);
    routing::write_fragment(path, &fragment).await.map_err(Error::Write)
}

#[cfg(test)]
mod test {
    use chrono::Utc;

    use super::*;
    use crate::catalog::AppName;
    use crate::store::{AppStatus, IntegrationConfig};

    fn installed(name: &str) -> InstalledApp {
        InstalledApp {
            name: AppName::from(name),
            display_name: name.to_string(),
            version: "1.0".into(),
            status: AppStatus::Running,
            port: 8080,
            is_system: false,
            integration_config: IntegrationConfig::new(),
            installed_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn enabled_apps_are_sorted_by_name() {
        let apps = vec![installed("zeta"), installed("alpha")];
        let fragment = render(&apps);
        assert!(fragment.find("\"alpha\"").unwrap() < fragment.find("\"zeta\"").unwrap());
    }

    #[test]
    fn empty_installed_set_renders_an_empty_list() {
        let fragment = render(&[]);
        assert!(fragment.contains("bloud.apps.enable = [\n  ];"));
    }
}
