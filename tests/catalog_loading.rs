// SPDX-FileCopyrightText: Copyright © 2020-2026 bloud developers
//
// SPDX-License-Identifier: MPL-2.0

//! Loads a small catalog from disk, builds the app graph against an
//! installed set, and checks the planner sees what the filesystem has.

use bloud_agent::catalog::{loader, AppGraph, AppName};
use bloud_agent::planner;
use tempfile::tempdir;
use tokio::fs;

const QBITTORRENT_YAML: &str = r#"
name: qbittorrent
display_name: qBittorrent
description: A BitTorrent client
category: download
version: "4.6.0"
port: 8090
"#;

const RADARR_YAML: &str = r#"
name: radarr
display_name: Radarr
description: Movie collection manager
category: media
version: "5.2.0"
port: 7878
integrations:
  downloadClient:
    required: true
    compatible:
      - app: qbittorrent
        default: true
"#;

async fn write_app(apps_dir: &std::path::Path, name: &str, yaml: &str) {
    let dir = apps_dir.join(name);
    fs::create_dir_all(&dir).await.unwrap();
    fs::write(dir.join("metadata.yaml"), yaml).await.unwrap();
}

#[tokio::test]
async fn loaded_catalog_feeds_a_working_install_plan() {
    let apps_dir = tempdir().unwrap();
    write_app(apps_dir.path(), "qbittorrent", QBITTORRENT_YAML).await;
    write_app(apps_dir.path(), "radarr", RADARR_YAML).await;

    let catalog = loader::load_from_dir(apps_dir.path()).await.unwrap();
    assert_eq!(catalog.len(), 2);

    let mut graph = AppGraph::build(catalog);
    graph.set_installed([AppName::from("qbittorrent")]);

    let plan = planner::plan_install(&graph, &AppName::from("radarr")).unwrap();
    assert!(plan.choices.is_empty(), "single installed compatible should auto-wire");
    assert_eq!(plan.auto_config.len(), 1);
    assert_eq!(plan.auto_config[0].source, AppName::from("qbittorrent"));
}

#[tokio::test]
async fn directory_without_metadata_yaml_is_skipped_not_failed() {
    let apps_dir = tempdir().unwrap();
    write_app(apps_dir.path(), "radarr", RADARR_YAML).await;
    fs::create_dir_all(apps_dir.path().join("scaffolding-only")).await.unwrap();

    let catalog = loader::load_from_dir(apps_dir.path()).await.unwrap();
    assert_eq!(catalog.len(), 1);
    assert!(catalog.contains_key(&AppName::from("radarr")));
}

#[tokio::test]
async fn mirror_round_trips_through_sqlite() {
    let apps_dir = tempdir().unwrap();
    write_app(apps_dir.path(), "radarr", RADARR_YAML).await;
    let catalog = loader::load_from_dir(apps_dir.path()).await.unwrap();

    let pool = sqlx::sqlite::SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    loader::refresh_mirror(&pool, &catalog).await.unwrap();
    let mirrored = loader::load_from_mirror(&pool).await.unwrap();

    assert_eq!(mirrored.len(), catalog.len());
    assert_eq!(mirrored.get(&AppName::from("radarr")).unwrap().display_name, "Radarr");
}
