// SPDX-FileCopyrightText: Copyright © 2020-2026 bloud developers
//
// SPDX-License-Identifier: MPL-2.0

//! `bloud-agent`: the host agent for a single-node self-hosted application
//! appliance. Owns the authoritative record of installed apps, drives the
//! declarative system configuration that runs them, orchestrates per-app
//! lifecycle hooks, and wires up reverse-proxy routing and single sign-on.
//!
//! The library never initializes logging itself — only `src/main.rs` does
//! — so it stays embeddable in tests without clobbering a test harness's
//! own `env_logger` setup.

pub mod catalog;
pub mod config;
pub mod configurator;
pub mod declarative;
pub mod error;
pub mod http;
pub mod identity;
pub mod orchestrator;
pub mod planner;
pub mod routing;
pub mod store;

pub use error::AgentError;
