// SPDX-FileCopyrightText: Copyright © 2020-2026 bloud developers
//
// SPDX-License-Identifier: MPL-2.0

//! Loads app definitions from `APPS_DIR/<name>/metadata.yaml` and mirrors
//! them into a persistent cache so the agent can serve the catalog without
//! rereading the filesystem on every request.

use std::collections::BTreeMap;
use std::path::Path;

use sqlx::sqlite::SqlitePool;
use thiserror::Error;
use tokio::fs;

use super::model::AppName;
use crate::catalog::AppDefinition;

const METADATA_FILE: &str = "metadata.yaml";

/// Walks `apps_dir`, parsing every `<name>/metadata.yaml` it finds.
/// Subdirectories missing the file are silently skipped (the directory may
/// hold scaffolding). Any parse or validation failure aborts the entire
/// load with a descriptive error.
pub async fn load_from_dir(apps_dir: impl AsRef<Path>) -> Result<BTreeMap<AppName, AppDefinition>, Error> {
    let apps_dir = apps_dir.as_ref();

    let mut read_dir = fs::read_dir(apps_dir)
        .await
        .map_err(|source| Error::ReadDir(apps_dir.to_path_buf(), source))?;

    let mut catalog = BTreeMap::new();

    while let Some(entry) = read_dir
        .next_entry()
        .await
        .map_err(|source| Error::ReadDir(apps_dir.to_path_buf(), source))?
    {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let metadata_path = path.join(METADATA_FILE);
        if !metadata_path.exists() {
            continue;
        }

        let contents = fs::read_to_string(&metadata_path)
            .await
            .map_err(|source| Error::ReadFile(metadata_path.clone(), source))?;

        let definition: AppDefinition = serde_yaml::from_str(&contents)
            .map_err(|source| Error::Parse(metadata_path.clone(), source))?;

        definition
            .validate()
            .map_err(|message| Error::Validation(metadata_path.clone(), message))?;

        if let Some(previous) = catalog.insert(definition.name.clone(), definition) {
            return Err(Error::DuplicateName(previous.name));
        }
    }

    Ok(catalog)
}

/// Transactionally refreshes the YAML mirror in the persistent store: clear
/// then insert, so a crash mid-refresh never leaves a mixed snapshot
/// visible to a concurrent reader.
pub async fn refresh_mirror(pool: &SqlitePool, catalog: &BTreeMap<AppName, AppDefinition>) -> Result<(), Error> {
    let mut tx = pool.begin().await.map_err(Error::Database)?;

    sqlx::query("DELETE FROM catalog_mirror")
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

    for definition in catalog.values() {
        let blob = serde_yaml::to_string(definition).map_err(|source| Error::Serialize(definition.name.clone(), source))?;

        sqlx::query("INSERT INTO catalog_mirror (name, yaml) VALUES (?, ?)")
            .bind(definition.name.as_str())
            .bind(blob)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
    }

    tx.commit().await.map_err(Error::Database)?;

    Ok(())
}

/// Loads the catalog mirror back out of the persistent store, without
/// touching the filesystem. Used when the agent restarts and wants to serve
/// the catalog before (or without) a filesystem rescan.
pub async fn load_from_mirror(pool: &SqlitePool) -> Result<BTreeMap<AppName, AppDefinition>, Error> {
    let rows: Vec<(String, String)> = sqlx::query_as("SELECT name, yaml FROM catalog_mirror")
        .fetch_all(pool)
        .await
        .map_err(Error::Database)?;

    let mut catalog = BTreeMap::new();
    for (name, yaml) in rows {
        let definition: AppDefinition = serde_yaml::from_str(&yaml)
            .map_err(|source| Error::ParseMirror(AppName::from(name.clone()), source))?;
        catalog.insert(AppName::from(name), definition);
    }

    Ok(catalog)
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read apps directory {0:?}")]
    ReadDir(std::path::PathBuf, #[source] std::io::Error),

    #[error("failed to read {0:?}")]
    ReadFile(std::path::PathBuf, #[source] std::io::Error),

    #[error("failed to parse {0:?}")]
    Parse(std::path::PathBuf, #[source] serde_yaml::Error),

    #[error("failed to parse mirrored entry {0}")]
    ParseMirror(AppName, #[source] serde_yaml::Error),

    #[error("failed to serialize catalog entry {0}")]
    Serialize(AppName, #[source] serde_yaml::Error),

    #[error("invalid catalog entry {0:?}: {1}")]
    Validation(std::path::PathBuf, String),

    #[error("duplicate app name in catalog: {0}")]
    DuplicateName(AppName),

    #[error("catalog mirror database error")]
    Database(#[source] sqlx::Error),
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;

    use sqlx::sqlite::SqlitePoolOptions;
    use tempfile::tempdir;

    use super::*;

    async fn write_app(dir: &Path, name: &str, yaml: &str) {
        let app_dir = dir.join(name);
        fs::create_dir_all(&app_dir).await.unwrap();
        fs::write(app_dir.join(METADATA_FILE), yaml).await.unwrap();
    }

    #[tokio::test]
    async fn skips_directories_without_metadata() {
        let dir = tempdir().unwrap();
        write_app(
            dir.path(),
            "radarr",
            "name: radarr\ndisplay_name: Radarr\ndescription: PVR\ncategory: media\nversion: \"1.0\"\n",
        )
        .await;
        fs::create_dir_all(dir.path().join("scaffolding")).await.unwrap();

        let catalog = load_from_dir(dir.path()).await.unwrap();
        assert_eq!(catalog.len(), 1);
        assert!(catalog.contains_key(&AppName::from("radarr")));
    }

    #[tokio::test]
    async fn aborts_load_on_invalid_entry() {
        let dir = tempdir().unwrap();
        write_app(
            dir.path(),
            "broken",
            "name: broken\ndisplay_name: \"\"\ndescription: x\ncategory: x\nversion: \"1.0\"\n",
        )
        .await;

        let result = load_from_dir(dir.path()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn mirror_refresh_is_transactional_clear_then_insert() {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE catalog_mirror (name TEXT PRIMARY KEY, yaml TEXT NOT NULL)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let mut catalog: BTreeMap<AppName, AppDefinition> = BTreeMap::new();
        let dir = tempdir().unwrap();
        write_app(
            dir.path(),
            "radarr",
            "name: radarr\ndisplay_name: Radarr\ndescription: PVR\ncategory: media\nversion: \"1.0\"\n",
        )
        .await;
        catalog.extend(load_from_dir(dir.path()).await.unwrap());

        refresh_mirror(&pool, &catalog).await.unwrap();
        let reloaded = load_from_mirror(&pool).await.unwrap();
        assert_eq!(reloaded.len(), 1);

        catalog.clear();
        refresh_mirror(&pool, &catalog).await.unwrap();
        let reloaded = load_from_mirror(&pool).await.unwrap();
        assert!(reloaded.is_empty());
    }
}
