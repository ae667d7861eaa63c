// SPDX-FileCopyrightText: Copyright © 2020-2026 bloud developers
//
// SPDX-License-Identifier: MPL-2.0

//! Command-line surface for `bloudd`. One binary, one long-running action
//! (`serve`), plus a couple of read-only subcommands useful for diagnosing
//! a catalog without starting the agent.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "bloudd", about = "Host agent for the bloud self-hosted application appliance")]
pub struct Command {
    #[command(subcommand)]
    pub action: Option<Action>,
}

#[derive(Debug, Subcommand)]
pub enum Action {
    /// Run the reconcile loop and HTTP API. The default when no subcommand is given.
    Serve,
    /// Load and validate every metadata.yaml under a catalog directory, then exit.
    CheckCatalog {
        /// Defaults to the configured apps directory if omitted.
        #[arg(long)]
        apps_dir: Option<PathBuf>,
    },
    /// Print the agent version and exit.
    Version,
}
