//! Tracing subscriber install for the gateway binary.

use std::sync::OnceLock;

use anyhow::Result;
use tracing_subscriber::layer::Layer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: OnceLock<()> = OnceLock::new();

/// Installs a fmt subscriber once per process. Logs are JSON unless
/// `LOG_FORMAT=text`; level filtering follows `RUST_LOG` (default `info`).
pub fn install(service_name: &str) -> Result<()> {
    if INIT.get().is_some() {
        return Ok(());
    }

    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| !v.eq_ignore_ascii_case("text"))
        .unwrap_or(true);
    let fmt_layer = if json_logs {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .ok();
    tracing::info!(service = service_name, "telemetry installed");

    INIT.set(()).ok();
    Ok(())
}
