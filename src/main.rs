// SPDX-FileCopyrightText: Copyright © 2020-2026 bloud developers
//
// SPDX-License-Identifier: MPL-2.0

use std::path::PathBuf;
use std::sync::Arc;

use bloud_agent::catalog::loader;
use bloud_agent::config::Settings;
use bloud_agent::configurator::{builtin, Configurator, Registry};
use bloud_agent::declarative::{Applier, ApplierConfig, Supervisor};
use bloud_agent::http::{self, AppState};
use bloud_agent::identity::IdentityClient;
use bloud_agent::orchestrator::Orchestrator;
use bloud_agent::store::Store;
use clap::Parser;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::sync::RwLock;

mod cli;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let command = cli::Command::parse();

    match command.action.unwrap_or(cli::Action::Serve) {
        cli::Action::Version => {
            println!("bloudd {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        cli::Action::CheckCatalog { apps_dir } => check_catalog(apps_dir).await,
        cli::Action::Serve => serve().await,
    }
}

/// Loads and validates a catalog directory without touching the app store
/// or starting anything, so a broken `metadata.yaml` can be caught before
/// it reaches a running agent.
async fn check_catalog(apps_dir: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::load().await?;
    let apps_dir = apps_dir.unwrap_or(settings.apps_dir);

    let catalog = loader::load_from_dir(&apps_dir).await?;
    println!("{} app definitions loaded from {}", catalog.len(), apps_dir.display());
    for name in catalog.keys() {
        println!("  {name}");
    }

    Ok(())
}

async fn serve() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::load().await?;

    let pool = SqlitePoolOptions::new().connect(&settings.database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let catalog = loader::load_from_dir(&settings.apps_dir).await?;
    loader::refresh_mirror(&pool, &catalog).await?;
    log::info!("loaded {} app definitions from {}", catalog.len(), settings.apps_dir.display());

    let store = Arc::new(Store::new(pool));
    store
        .set_change_callback(Arc::new(|event| {
            log::info!("store change: {} {:?}", event.app, event.kind);
        }))
        .expect("change callback registered exactly once at startup");

    let applier = Arc::new(Applier::new(
        ApplierConfig {
            binary: "nixos-rebuild".to_string(),
            flake_path: settings.flake_path.clone(),
            flake_target: settings.flake_target.clone(),
        },
        Supervisor::default(),
    ));

    let mut registry = Registry::new();
    for name in catalog.keys() {
        registry.register(name.clone(), builtin_configurator_for(name.as_str()));
    }
    let configurators = Arc::new(registry);

    let identity = if settings.identity_provider_configured() {
        log::info!("identity provider configured at {:?}", settings.sso_base_url);
        Some(Arc::new(IdentityClient::new(
            settings.sso_base_url.clone().expect("checked by identity_provider_configured"),
            settings.authentik_token.clone().expect("checked by identity_provider_configured"),
        )))
    } else {
        log::warn!("no identity provider configured, apps install without single sign-on");
        None
    };

    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        applier,
        configurators,
        identity,
        settings.nixos_output_path.clone(),
        settings.routing_output_path.clone(),
    ));

    let state = AppState {
        orchestrator,
        store,
        catalog: Arc::new(RwLock::new(catalog)),
    };

    let router = http::router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", settings.port)).await?;
    log::info!("bloudd listening on port {}", settings.port);
    axum::serve(listener, router).await?;

    Ok(())
}

/// Picks the built-in configurator for a catalog app by name. Apps without
/// a more specific match still get [`builtin::EnsureDataDir`] so their
/// bind-mounted data directory exists before the container starts.
fn builtin_configurator_for(name: &str) -> Box<dyn Configurator> {
    match name {
        "radarr" | "sonarr" | "lidarr" | "prowlarr" | "readarr" => Box::new(builtin::ArrStack {
            config_file: "config.xml".to_string(),
        }),
        _ => Box::new(builtin::EnsureDataDir),
    }
}
