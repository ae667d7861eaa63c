// SPDX-FileCopyrightText: Copyright © 2020-2026 bloud developers
//
// SPDX-License-Identifier: MPL-2.0

//! C4: the durable record of installed apps. The sole writer of the
//! installed-apps table; every other component reads through it.

use std::collections::BTreeMap;
use std::sync::Arc;

use bitflags::bitflags;
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;
use thiserror::Error;

use crate::catalog::AppName;

bitflags! {
    /// Ergonomic query filter over [`AppStatus`], a bitflag set for
    /// narrowing a listing query without a bespoke enum-of-enums. Purely a
    /// read-side convenience; it has no bearing on the status transitions
    /// in §4.9.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StatusFilter: u8 {
        const RUNNING     = 0b0000_0001;
        const STARTING    = 0b0000_0010;
        const INSTALLING  = 0b0000_0100;
        const STOPPED     = 0b0000_1000;
        const UNINSTALLING = 0b0001_0000;
        const ERROR       = 0b0010_0000;

        /// Any status a row can transiently sit in mid-operation.
        const TRANSIENT = Self::INSTALLING.bits() | Self::STARTING.bits() | Self::UNINSTALLING.bits();
    }
}

impl StatusFilter {
    fn matches(self, status: AppStatus) -> bool {
        let flag = match status {
            AppStatus::Running => Self::RUNNING,
            AppStatus::Starting => Self::STARTING,
            AppStatus::Installing => Self::INSTALLING,
            AppStatus::Stopped => Self::STOPPED,
            AppStatus::Uninstalling => Self::UNINSTALLING,
            AppStatus::Error => Self::ERROR,
        };
        self.contains(flag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AppStatus {
    Installing,
    Starting,
    Running,
    Stopped,
    Uninstalling,
    Error,
}

impl AppStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Installing => "installing",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Uninstalling => "uninstalling",
            Self::Error => "error",
        }
    }

    fn parse(value: &str) -> Result<Self, Error> {
        match value {
            "installing" => Ok(Self::Installing),
            "starting" => Ok(Self::Starting),
            "running" => Ok(Self::Running),
            "stopped" => Ok(Self::Stopped),
            "uninstalling" => Ok(Self::Uninstalling),
            "error" => Ok(Self::Error),
            other => Err(Error::UnknownStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for AppStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map from integration slot name to the app(s) wired into it. A
/// single-valued slot holds exactly one entry; a `multi` slot may hold
/// several, in the order they were wired.
pub type IntegrationConfig = BTreeMap<String, Vec<AppName>>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstalledApp {
    pub name: AppName,
    pub display_name: String,
    pub version: String,
    pub status: AppStatus,
    pub port: u16,
    pub is_system: bool,
    pub integration_config: IntegrationConfig,
    pub installed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied by the caller when installing an app, beyond what the
/// catalog definition already pins down.
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    pub port: u16,
    pub is_system: bool,
}

/// What changed, passed to the registered change callback.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeKind {
    Installed,
    StatusChanged(AppStatus),
    IntegrationConfigChanged,
    Uninstalled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub app: AppName,
    pub kind: ChangeKind,
}

pub type ChangeCallback = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

/// Durable, concurrent map of installed apps, backed by a single SQLite
/// table. Reads and writes both go through the shared pool; sqlite
/// serializes writers itself, so no additional in-process locking is
/// needed beyond what `sqlx::SqlitePool` already provides.
pub struct Store {
    pool: SqlitePool,
    on_change: OnceCell<ChangeCallback>,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            on_change: OnceCell::new(),
        }
    }

    /// Registers the orchestrator's change callback. May only be called
    /// once; a second call is a programming error and is rejected.
    pub fn set_change_callback(&self, callback: ChangeCallback) -> Result<(), Error> {
        self.on_change.set(callback).map_err(|_| Error::ChangeCallbackAlreadySet)
    }

    fn notify(&self, event: ChangeEvent) {
        if let Some(callback) = self.on_change.get() {
            callback(event);
        }
    }

    pub async fn get_all(&self) -> Result<Vec<InstalledApp>, Error> {
        let rows: Vec<Row> = sqlx::query_as("SELECT * FROM installed_apps ORDER BY name").fetch_all(&self.pool).await?;
        rows.into_iter().map(Row::into_installed_app).collect()
    }

    pub async fn get_by_name(&self, name: &AppName) -> Result<Option<InstalledApp>, Error> {
        let row: Option<Row> = sqlx::query_as("SELECT * FROM installed_apps WHERE name = ?")
            .bind(name.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Row::into_installed_app).transpose()
    }

    /// Lists installed apps whose status matches any bit in `filter`.
    pub async fn get_by_status(&self, filter: StatusFilter) -> Result<Vec<InstalledApp>, Error> {
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .filter(|app| filter.matches(app.status))
            .collect())
    }

    pub async fn get_installed_names(&self) -> Result<Vec<AppName>, Error> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM installed_apps").fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(name,)| AppName::from(name)).collect())
    }

    pub async fn is_installed(&self, name: &AppName) -> Result<bool, Error> {
        Ok(self.get_by_name(name).await?.is_some())
    }

    /// Upserts the installed record, resetting `status` to `installing`.
    pub async fn install(
        &self,
        name: &AppName,
        display_name: &str,
        version: &str,
        integration_config: IntegrationConfig,
        opts: InstallOptions,
    ) -> Result<InstalledApp, Error> {
        let now = Utc::now();
        let config_json = serde_json::to_string(&integration_config).map_err(Error::SerializeIntegrationConfig)?;

        sqlx::query(
            "
            INSERT INTO installed_apps
                (name, display_name, version, status, port, is_system, integration_config, installed_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                display_name = excluded.display_name,
                version = excluded.version,
                status = excluded.status,
                port = excluded.port,
                is_system = excluded.is_system,
                integration_config = excluded.integration_config,
                updated_at = excluded.updated_at
            ",
        )
        .bind(name.as_str())
        .bind(display_name)
        .bind(version)
        .bind(AppStatus::Installing.as_str())
        .bind(opts.port)
        .bind(opts.is_system)
        .bind(config_json)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.notify(ChangeEvent {
            app: name.clone(),
            kind: ChangeKind::Installed,
        });

        self.get_by_name(name).await?.ok_or_else(|| Error::NotFound(name.clone()))
    }

    pub async fn update_status(&self, name: &AppName, status: AppStatus) -> Result<(), Error> {
        let result = sqlx::query("UPDATE installed_apps SET status = ?, updated_at = ? WHERE name = ?")
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(name.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(name.clone()));
        }

        self.notify(ChangeEvent {
            app: name.clone(),
            kind: ChangeKind::StatusChanged(status),
        });

        Ok(())
    }

    /// Marks an infrastructure app as `running`, inserting it if absent,
    /// without disturbing a user-facing install flow. Idempotent: calling
    /// this repeatedly for the same app is a no-op once it is running.
    pub async fn ensure_system_app(&self, name: &AppName, display_name: &str, version: &str, port: u16) -> Result<(), Error> {
        let now = Utc::now();
        sqlx::query(
            "
            INSERT INTO installed_apps
                (name, display_name, version, status, port, is_system, integration_config, installed_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 1, '{}', ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                status = excluded.status,
                updated_at = excluded.updated_at
            ",
        )
        .bind(name.as_str())
        .bind(display_name)
        .bind(version)
        .bind(AppStatus::Running.as_str())
        .bind(port)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn update_integration_config(&self, name: &AppName, integration_config: IntegrationConfig) -> Result<(), Error> {
        let config_json = serde_json::to_string(&integration_config).map_err(Error::SerializeIntegrationConfig)?;

        let result = sqlx::query("UPDATE installed_apps SET integration_config = ?, updated_at = ? WHERE name = ?")
            .bind(config_json)
            .bind(Utc::now())
            .bind(name.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(name.clone()));
        }

        self.notify(ChangeEvent {
            app: name.clone(),
            kind: ChangeKind::IntegrationConfigChanged,
        });

        Ok(())
    }

    pub async fn uninstall(&self, name: &AppName) -> Result<(), Error> {
        let result = sqlx::query("DELETE FROM installed_apps WHERE name = ?")
            .bind(name.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(name.clone()));
        }

        self.notify(ChangeEvent {
            app: name.clone(),
            kind: ChangeKind::Uninstalled,
        });

        Ok(())
    }
}

#[derive(Debug, FromRow)]
struct Row {
    name: String,
    display_name: String,
    version: String,
    status: String,
    port: i64,
    is_system: bool,
    integration_config: String,
    installed_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Row {
    fn into_installed_app(self) -> Result<InstalledApp, Error> {
        let integration_config: IntegrationConfig =
            serde_json::from_str(&self.integration_config).map_err(Error::DeserializeIntegrationConfig)?;

        Ok(InstalledApp {
            name: AppName::from(self.name),
            display_name: self.display_name,
            version: self.version,
            status: AppStatus::parse(&self.status)?,
            port: self.port as u16,
            is_system: self.is_system,
            integration_config,
            installed_at: self.installed_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("app store database error")]
    Sqlx(#[from] sqlx::Error),

    #[error("app not found: {0}")]
    NotFound(AppName),

    #[error("unknown app status: {0}")]
    UnknownStatus(String),

    #[error("failed to serialize integration config")]
    SerializeIntegrationConfig(#[source] serde_json::Error),

    #[error("failed to deserialize integration config")]
    DeserializeIntegrationConfig(#[source] serde_json::Error),

    #[error("change callback already registered")]
    ChangeCallbackAlreadySet,
}
