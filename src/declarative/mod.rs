// SPDX-FileCopyrightText: Copyright © 2020-2026 bloud developers
//
// SPDX-License-Identifier: MPL-2.0

//! C6: renders the declarative system fragment, invokes the external
//! applier, streams its output, and reconciles the process supervisor.

pub mod applier;
pub mod generator;
pub mod supervisor;

pub use applier::{Applier, ApplierConfig, ApplyOutcome, EventSink, RebuildEvent, Stream};
pub use supervisor::Supervisor;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to write declarative fragment")]
    Write(#[source] crate::routing::Error),

    #[error("failed to spawn supervisor command")]
    Spawn(#[source] std::io::Error),

    #[error("supervisor command failed: {message}")]
    Subprocess { message: String, output: String },
}
