// SPDX-FileCopyrightText: Copyright © 2020-2026 bloud developers
//
// SPDX-License-Identifier: MPL-2.0

//! Renders a routing fragment for a small installed set and checks it
//! survives a real atomic write/read round trip.

use bloud_agent::catalog::{AppName, Routing, SsoStrategy};
use bloud_agent::routing::{render, write_fragment, RoutableApp};
use bloud_agent::store::{AppStatus, InstalledApp};
use chrono::Utc;
use tempfile::tempdir;

fn installed(name: &str, port: u16) -> InstalledApp {
    InstalledApp {
        name: AppName::from(name),
        display_name: name.to_string(),
        version: "1.0".to_string(),
        status: AppStatus::Running,
        port,
        is_system: false,
        integration_config: Default::default(),
        installed_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[tokio::test]
async fn rendered_fragment_excludes_system_and_unroutable_apps() {
    let radarr = installed("radarr", 7878);
    let system_app = installed("identity-provider", 9000);
    let mut unroutable = installed("headless-worker", 0);
    unroutable.is_system = false;

    let mut system_app_marked = system_app;
    system_app_marked.is_system = true;

    let routing = Routing::default();
    let apps = [
        RoutableApp {
            installed: &radarr,
            routing: Some(&routing),
            sso_strategy: SsoStrategy::None,
        },
        RoutableApp {
            installed: &system_app_marked,
            routing: None,
            sso_strategy: SsoStrategy::None,
        },
        RoutableApp {
            installed: &unroutable,
            routing: None,
            sso_strategy: SsoStrategy::None,
        },
    ];

    let fragment = render(&apps, false);
    assert!(fragment.contains("radarr"));
    assert!(!fragment.contains("identity-provider"));
    assert!(!fragment.contains("headless-worker"));

    let dir = tempdir().unwrap();
    let path = dir.path().join("routing-fragment.toml");
    write_fragment(&path, &fragment).await.unwrap();

    let written = tokio::fs::read_to_string(&path).await.unwrap();
    assert_eq!(written, fragment);
}

#[tokio::test]
async fn empty_installed_set_renders_a_placeholder_comment() {
    let fragment = render(&[], false);
    assert_eq!(fragment, "# no routable apps installed\n");
}
