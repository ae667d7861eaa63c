// SPDX-FileCopyrightText: Copyright © 2020-2026 bloud developers
//
// SPDX-License-Identifier: MPL-2.0

//! C7: idempotent CRUD against the companion identity provider. Every
//! delete treats 404 as success; this client never surfaces "it was
//! already gone" as an error.

use std::time::Duration;

use once_cell::sync::Lazy;
use serde::Deserialize;
use thiserror::Error;

use crate::catalog::SsoStrategy;

static CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::ClientBuilder::new()
        .timeout(Duration::from_secs(30))
        .build()
        .expect("build reqwest client")
});

/// Whether the most recent idempotent delete actually removed something
/// or found nothing to remove. Surfaced for logging, never treated as a
/// failure by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Deleted,
    AlreadyAbsent,
}

#[derive(Debug, Clone)]
pub struct IdentityClient {
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Named {
    pk: serde_json::Value,
    name: String,
}

#[derive(Debug, Deserialize)]
struct Slugged {
    pk: serde_json::Value,
    slug: String,
}

#[derive(Debug, Deserialize)]
struct Outpost {
    pk: serde_json::Value,
    #[serde(default)]
    providers: Vec<serde_json::Value>,
}

/// Renders a JSON pk value as a URL path segment. Authentik pks are either
/// UUID strings or integers; `Value`'s own `Display` wraps strings in
/// literal quote characters, which would build a malformed URL, so string
/// pks are unwrapped to their inner `&str` first.
fn pk_path_segment(pk: &serde_json::Value) -> String {
    match pk.as_str() {
        Some(value) => value.to_string(),
        None => pk.to_string(),
    }
}

impl IdentityClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.bearer_auth(&self.token)
    }

    /// Probes a lightweight endpoint to decide whether to emit SSO wiring
    /// at all.
    pub async fn is_available(&self) -> bool {
        let request = self.authed(CLIENT.get(self.url("/api/v3/root/config/")));
        matches!(request.send().await, Ok(response) if response.status().is_success())
    }

    pub async fn delete_application(&self, slug: &str) -> Result<Outcome, Error> {
        let list: ListResponse<Slugged> = self
            .authed(CLIENT.get(self.url("/api/v3/core/applications/")))
            .query(&[("slug", slug)])
            .send()
            .await
            .map_err(Error::Http)?
            .error_for_status()
            .map_err(Error::Http)?
            .json()
            .await
            .map_err(Error::Http)?;

        let Some(application) = list.results.into_iter().find(|entry| entry.slug == slug) else {
            return Ok(Outcome::AlreadyAbsent);
        };

        self.delete_by_pk("/api/v3/core/applications/", &application.pk).await
    }

    pub async fn delete_oauth2_provider(&self, name: &str) -> Result<Outcome, Error> {
        self.delete_provider_by_name("/api/v3/providers/oauth2/", name).await
    }

    pub async fn delete_proxy_provider(&self, name: &str) -> Result<Outcome, Error> {
        self.delete_provider_by_name("/api/v3/providers/proxy/", name).await
    }

    async fn delete_provider_by_name(&self, list_path: &str, name: &str) -> Result<Outcome, Error> {
        let list: ListResponse<Named> = self
            .authed(CLIENT.get(self.url(list_path)))
            .query(&[("name", name)])
            .send()
            .await
            .map_err(Error::Http)?
            .error_for_status()
            .map_err(Error::Http)?
            .json()
            .await
            .map_err(Error::Http)?;

        let Some(provider) = list.results.into_iter().find(|entry| entry.name == name) else {
            return Ok(Outcome::AlreadyAbsent);
        };

        self.delete_by_pk(list_path, &provider.pk).await
    }

    async fn delete_by_pk(&self, list_path: &str, pk: &serde_json::Value) -> Result<Outcome, Error> {
        let response = self
            .authed(CLIENT.delete(self.url(&format!("{list_path}{}/", pk_path_segment(pk)))))
            .send()
            .await
            .map_err(Error::Http)?;

        match response.status() {
            status if status.is_success() => Ok(Outcome::Deleted),
            reqwest::StatusCode::NOT_FOUND => Ok(Outcome::AlreadyAbsent),
            status => Err(Error::Remote {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    /// The single entry point called by uninstall: deletes the top-level
    /// application, then the provider matching the app's SSO strategy. A
    /// strategy of `none` (or anything unrecognized) is a no-op.
    pub async fn delete_app_sso(&self, name: &str, display_name: &str, strategy: SsoStrategy) -> Result<(), Error> {
        self.delete_application(name).await?;

        match strategy {
            SsoStrategy::NativeOidc => {
                self.delete_oauth2_provider(display_name).await?;
            }
            SsoStrategy::ForwardAuth => {
                self.delete_proxy_provider(display_name).await?;
            }
            SsoStrategy::None => {}
        }

        Ok(())
    }

    /// Wires a freshly-created proxy provider into the embedded outpost,
    /// used when a `forward-auth` app is installed. Appends the provider
    /// id if it is not already present; calling this twice with the same
    /// provider is a no-op the second time.
    pub async fn add_provider_to_embedded_outpost(&self, provider_name: &str) -> Result<(), Error> {
        let providers: ListResponse<Named> = self
            .authed(CLIENT.get(self.url("/api/v3/providers/proxy/")))
            .query(&[("name", provider_name)])
            .send()
            .await
            .map_err(Error::Http)?
            .error_for_status()
            .map_err(Error::Http)?
            .json()
            .await
            .map_err(Error::Http)?;

        let Some(provider) = providers.results.into_iter().find(|entry| entry.name == provider_name) else {
            return Err(Error::NotFound(format!("proxy provider {provider_name}")));
        };

        let outposts: ListResponse<Outpost> = self
            .authed(CLIENT.get(self.url("/api/v3/outposts/instances/")))
            .query(&[("name", "embedded")])
            .send()
            .await
            .map_err(Error::Http)?
            .error_for_status()
            .map_err(Error::Http)?
            .json()
            .await
            .map_err(Error::Http)?;

        let Some(outpost) = outposts.results.into_iter().next() else {
            return Err(Error::NotFound("embedded outpost".to_string()));
        };

        let mut provider_ids = outpost.providers;
        if !provider_ids.contains(&provider.pk) {
            provider_ids.push(provider.pk);
        }

        let response = self
            .authed(CLIENT.patch(self.url(&format!("/api/v3/outposts/instances/{}/", pk_path_segment(&outpost.pk)))))
            .json(&serde_json::json!({ "providers": provider_ids }))
            .send()
            .await
            .map_err(Error::Http)?;

        if !response.status().is_success() {
            return Err(Error::Remote {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("identity provider request failed")]
    Http(#[source] reqwest::Error),

    #[error("identity provider returned {status}")]
    Remote { status: u16, body: String },

    #[error("identity provider resource not found: {0}")]
    NotFound(String),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn url_joins_base_and_path_without_doubling_the_slash() {
        let client = IdentityClient::new("https://sso.example.com/", "token");
        assert_eq!(client.url("/api/v3/root/config/"), "https://sso.example.com/api/v3/root/config/");
    }

    #[test]
    fn pk_path_segment_unwraps_string_pks_without_literal_quotes() {
        let pk = serde_json::Value::String("3fa85f64-5717-4562-b3fc-2c963f66afa6".to_string());
        assert_eq!(pk_path_segment(&pk), "3fa85f64-5717-4562-b3fc-2c963f66afa6");
    }

    #[test]
    fn pk_path_segment_renders_numeric_pks_plainly() {
        let pk = serde_json::Value::Number(42.into());
        assert_eq!(pk_path_segment(&pk), "42");
    }
}
