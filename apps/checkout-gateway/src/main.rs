use anyhow::Result;
use axum::serve;
use tokio::net::TcpListener;
use tracing::info;

use acp_gateway::config::GatewayConfig;
use acp_gateway::http::build_router;
use acp_gateway::{bootstrap, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::install("checkout-gateway")?;

    let config = GatewayConfig::from_env()?;
    let state = bootstrap(config.clone()).await?;
    let router = build_router(state);
    let listener = TcpListener::bind(config.addr).await?;
    info!("checkout-gateway listening on {}", config.addr);

    serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    Ok(())
}
