// SPDX-FileCopyrightText: Copyright © 2020-2026 bloud developers
//
// SPDX-License-Identifier: MPL-2.0

//! Types making up a single app definition, as parsed from `metadata.yaml`.

use std::collections::BTreeMap;
use std::time::Duration;

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Unique, kebab-case identifier of an app in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppName(pub String);

impl AppName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AppName {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for AppName {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A single app definition, immutable at runtime once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppDefinition {
    pub name: AppName,
    pub display_name: String,
    pub description: String,
    pub category: String,
    pub version: String,

    /// TCP port inside the app's container. Zero means "not routable".
    #[serde(default)]
    pub port: u16,

    #[serde(default)]
    pub is_system: bool,

    #[serde(default)]
    pub routing: Option<Routing>,

    #[serde(default)]
    pub sso: Sso,

    /// Integration slot name -> slot definition.
    #[serde(default)]
    pub integrations: BTreeMap<String, IntegrationSlot>,

    #[serde(default)]
    pub health_check: Option<HealthCheck>,
}

impl AppDefinition {
    /// Validates the mandatory string fields. A catalog entry with any of
    /// these empty cannot be loaded.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.as_str().trim().is_empty() {
            return Err("name must not be empty".into());
        }
        if self.display_name.trim().is_empty() {
            return Err(format!("{}: display_name must not be empty", self.name));
        }
        if self.description.trim().is_empty() {
            return Err(format!("{}: description must not be empty", self.name));
        }
        if self.category.trim().is_empty() {
            return Err(format!("{}: category must not be empty", self.name));
        }

        let defaults = self
            .integrations
            .values()
            .filter(|slot| slot.compatible.iter().filter(|c| c.default).count() > 1)
            .count();
        if defaults > 0 {
            return Err(format!(
                "{}: at most one compatible entry per integration slot may be marked default",
                self.name
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Routing {
    #[serde(default = "default_true")]
    pub strip_prefix: bool,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub absolute_paths: Vec<AbsolutePathRoute>,
}

fn default_true() -> bool {
    true
}

impl Default for Routing {
    fn default() -> Self {
        Self {
            strip_prefix: true,
            headers: BTreeMap::new(),
            absolute_paths: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbsolutePathRoute {
    pub rule: String,
    pub priority: i32,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SsoStrategy {
    None,
    NativeOidc,
    ForwardAuth,
}

impl Default for SsoStrategy {
    fn default() -> Self {
        Self::None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sso {
    #[serde(default)]
    pub strategy: SsoStrategy,
    #[serde(default)]
    pub callback_path: String,
    #[serde(default)]
    pub env_mapping: BTreeMap<String, String>,
}

/// A typed dependency slot: "this app needs a download client", etc.
///
/// Every slot answers the same three questions (required?, multi?, who's
/// compatible?) — modeled uniformly rather than with per-slot subclasses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrationSlot {
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub multi: bool,
    #[serde(default)]
    pub compatible: Vec<CompatibleApp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompatibleApp {
    pub app: AppName,
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub path: String,
    #[serde(with = "humantime_seconds", default = "default_interval")]
    pub interval: Duration,
    #[serde(with = "humantime_seconds", default = "default_timeout")]
    pub timeout: Duration,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            interval: default_interval(),
            timeout: default_timeout(),
        }
    }
}

fn default_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_timeout() -> Duration {
    Duration::from_secs(60)
}

/// (De)serializes a [`Duration`] as a plain integer number of seconds, since
/// `metadata.yaml` authors write `timeout: 60`, not an ISO8601 duration.
mod humantime_seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
