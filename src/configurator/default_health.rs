// SPDX-FileCopyrightText: Copyright © 2020-2026 bloud developers
//
// SPDX-License-Identifier: MPL-2.0

//! Default health-check probe: poll the catalog-declared path until it
//! answers 2xx or the deadline passes.

use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use tokio_util::sync::CancellationToken;

use super::{AppContext, Error};

static CLIENT: Lazy<reqwest::Client> = Lazy::new(|| reqwest::Client::builder().build().expect("build reqwest client"));

/// Polls the catalog-declared health-check path until it answers 2xx, the
/// deadline passes, or `cancel` fires — cancelling abandons the polling
/// loop immediately rather than waiting out the remaining timeout.
pub async fn probe(ctx: &AppContext, cancel: &CancellationToken) -> Result<(), Error> {
    let url = format!("{}{}", ctx.base_url(), ctx.health_check_path);
    let deadline = Instant::now() + ctx.health_check_timeout;

    loop {
        if let Ok(response) = CLIENT.get(&url).send().await {
            if response.status().is_success() {
                return Ok(());
            }
        }

        if Instant::now() >= deadline {
            return Err(Error::Timeout {
                app: ctx.name.to_string(),
                elapsed: ctx.health_check_timeout,
            });
        }

        tokio::select! {
            _ = tokio::time::sleep(poll_interval(ctx, deadline)) => {}
            _ = cancel.cancelled() => {
                return Err(Error::Cancelled { app: ctx.name.to_string() });
            }
        }
    }
}

fn poll_interval(ctx: &AppContext, deadline: Instant) -> Duration {
    let remaining = deadline.saturating_duration_since(Instant::now());
    ctx.health_check_interval.min(remaining)
}

#[cfg(test)]
mod test {
    use std::path::PathBuf;

    use crate::catalog::AppName;
    use crate::store::IntegrationConfig;

    use super::*;

    fn context(port: u16, timeout: Duration) -> AppContext {
        AppContext {
            name: AppName::from("radarr"),
            port,
            data_path: PathBuf::from("/data/radarr"),
            data_root: PathBuf::from("/data"),
            integrations: IntegrationConfig::new(),
            health_check_path: "/ping".to_string(),
            health_check_interval: Duration::from_millis(5),
            health_check_timeout: timeout,
        }
    }

    #[tokio::test]
    async fn unreachable_endpoint_times_out() {
        // Port 1 is reserved and will refuse the connection immediately on
        // any normal host, keeping this test fast and offline.
        let ctx = context(1, Duration::from_millis(20));
        let result = probe(&ctx, &CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::Timeout { .. })));
    }

    #[tokio::test]
    async fn cancellation_abandons_the_polling_loop() {
        let ctx = context(1, Duration::from_secs(60));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = probe(&ctx, &cancel).await;
        assert!(matches!(result, Err(Error::Cancelled { .. })));
    }
}
