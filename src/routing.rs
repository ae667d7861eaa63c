// SPDX-FileCopyrightText: Copyright © 2020-2026 bloud developers
//
// SPDX-License-Identifier: MPL-2.0

//! C5: renders the reverse-proxy routing fragment from the installed set.

use std::fmt::Write as _;
use std::path::Path;

use thiserror::Error;
use tokio::fs;

use crate::catalog::SsoStrategy;
use crate::store::InstalledApp;

/// Context an app needs beyond its [`InstalledApp`] record to be routed:
/// the routing block and SSO strategy live on the catalog definition, not
/// the installed record.
pub struct RoutableApp<'a> {
    pub installed: &'a InstalledApp,
    pub routing: Option<&'a crate::catalog::Routing>,
    pub sso_strategy: SsoStrategy,
}

/// Renders the routing fragment for `apps`. `identity_provider_enabled`
/// gates whether forward-auth middleware is attached.
pub fn render(apps: &[RoutableApp<'_>], identity_provider_enabled: bool) -> String {
    let mut routable: Vec<&RoutableApp<'_>> = apps
        .iter()
        .filter(|app| !app.installed.is_system && app.installed.port > 0)
        .collect();
    routable.sort_by(|a, b| a.installed.name.as_str().cmp(b.installed.name.as_str()));

    if routable.is_empty() {
        return "# no routable apps installed\n".to_string();
    }

    let mut out = String::new();
    for app in routable {
        render_app(&mut out, app, identity_provider_enabled);
    }
    out
}

fn render_app(out: &mut String, app: &RoutableApp<'_>, identity_provider_enabled: bool) {
    let name = app.installed.name.as_str();
    let port = app.installed.port;
    let routing = app.routing.cloned().unwrap_or_default();

    let headers_middleware_name = format!("{name}-headers");
    let forward_auth_middleware_name = format!("{name}-forward-auth");
    let custom_cross_origin_embedder_policy = routing
        .headers
        .keys()
        .any(|key| key.eq_ignore_ascii_case("Cross-Origin-Embedder-Policy"));
    let forward_auth = app.sso_strategy == SsoStrategy::ForwardAuth && identity_provider_enabled;

    let mut middlewares = Vec::new();
    if routing.strip_prefix {
        middlewares.push(format!("strip-prefix/{name}"));
    }
    middlewares.push("iframe-headers".to_string());
    if !routing.headers.is_empty() {
        middlewares.push(headers_middleware_name.clone());
    }
    if !custom_cross_origin_embedder_policy {
        middlewares.push("embed-isolation".to_string());
    }
    if forward_auth {
        middlewares.push(forward_auth_middleware_name.clone());
    }

    if !routing.headers.is_empty() {
        let _ = writeln!(out, "[middlewares.{headers_middleware_name}.headers.customResponseHeaders]");
        for (key, value) in &routing.headers {
            let _ = writeln!(out, "{key} = {value:?}");
        }
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "[routers.{name}]");
    let _ = writeln!(out, "rule = \"PathPrefix(`/embed/{name}`)\"");
    let _ = writeln!(out, "service = \"{name}\"");
    let _ = writeln!(out, "middlewares = {:?}", middlewares);
    let _ = writeln!(out, "[services.{name}.loadBalancer.servers]");
    let _ = writeln!(out, "url = \"http://localhost:{port}\"");
    let _ = writeln!(out);

    for (index, absolute) in routing.absolute_paths.iter().enumerate() {
        let router_name = format!("{name}-absolute-{index}");
        let mut abs_middlewares = Vec::new();

        if !absolute.headers.is_empty() {
            // This route overrides the app's own response headers: give it
            // its own middleware rather than sharing the app-level one.
            let own_headers_middleware = format!("{router_name}-headers");
            let _ = writeln!(out, "[middlewares.{own_headers_middleware}.headers.customResponseHeaders]");
            for (key, value) in &absolute.headers {
                let _ = writeln!(out, "{key} = {value:?}");
            }
            let _ = writeln!(out);
            abs_middlewares.push(own_headers_middleware);
        } else if !routing.headers.is_empty() {
            abs_middlewares.push(headers_middleware_name.clone());
        }
        if forward_auth {
            abs_middlewares.push(forward_auth_middleware_name.clone());
        }

        let _ = writeln!(out, "[routers.{router_name}]");
        let _ = writeln!(out, "rule = {:?}", absolute.rule);
        let _ = writeln!(out, "priority = {}", absolute.priority);
        let _ = writeln!(out, "service = \"{name}\"");
        let _ = writeln!(out, "middlewares = {:?}", abs_middlewares);
        let _ = writeln!(out);
    }
}

/// Writes `fragment` atomically to `path`: write to a sibling temp file,
/// then rename over the target so a concurrent reader never observes a
/// partially-written fragment.
pub async fn write_fragment(path: impl AsRef<Path>, fragment: &str) -> Result<(), Error> {
    let path = path.as_ref();
    let temp_path = path.with_extension("tmp");

    fs::write(&temp_path, fragment)
        .await
        .map_err(|source| Error::Write(temp_path.clone(), source))?;
    fs::rename(&temp_path, path)
        .await
        .map_err(|source| Error::Write(path.to_path_buf(), source))?;

    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to write routing fragment at {0:?}")]
    Write(std::path::PathBuf, #[source] std::io::Error),
}
