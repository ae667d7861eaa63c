// SPDX-FileCopyrightText: Copyright © 2020-2026 bloud developers
//
// SPDX-License-Identifier: MPL-2.0

//! Crate-wide error taxonomy.
//!
//! Each subsystem (catalog, planner, store, routing, declarative, identity,
//! configurator, orchestrator) defines its own narrow `Error` enum and
//! converts into [`AgentError`] at the boundary where it is surfaced to a
//! caller, so the kind of failure (validation, not-found, conflict,
//! subprocess, remote, timeout, io) is never lost climbing the stack.

use thiserror::Error;

use crate::catalog;
use crate::configurator;
use crate::declarative;
use crate::identity;
use crate::orchestrator;
use crate::planner;
use crate::routing;
use crate::store;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {blockers:?}")]
    Conflict { blockers: Vec<String> },

    #[error("subprocess failed: {message}")]
    Subprocess { message: String, output: String },

    #[error("remote error ({status}): {body}")]
    Remote { status: u16, body: String },

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("io error")]
    Io(#[from] std::io::Error),

    #[error("catalog error")]
    Catalog(#[from] catalog::Error),

    #[error("planner error")]
    Planner(#[from] planner::Error),

    #[error("app store error")]
    Store(#[from] store::Error),

    #[error("routing generator error")]
    Routing(#[from] routing::Error),

    #[error("declarative applier error")]
    Declarative(#[from] declarative::Error),

    #[error("identity provider error")]
    Identity(#[from] identity::Error),

    #[error("configurator error")]
    Configurator(#[from] configurator::Error),

    #[error("orchestrator error")]
    Orchestrator(#[source] orchestrator::Error),
}

impl From<orchestrator::Error> for AgentError {
    /// A blocked removal is a conflict the caller can act on (clear the
    /// blockers and retry); every other orchestrator failure collapses to
    /// the generic wrapped variant.
    fn from(error: orchestrator::Error) -> Self {
        match error {
            orchestrator::Error::Blocked(blockers) => Self::Conflict { blockers },
            orchestrator::Error::NotFound(name) => Self::NotFound(name.to_string()),
            orchestrator::Error::Validation(message) => Self::Validation(message),
            other => Self::Orchestrator(other),
        }
    }
}

impl AgentError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }

    pub fn conflict(blockers: Vec<String>) -> Self {
        Self::Conflict { blockers }
    }
}
