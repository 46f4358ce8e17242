//! Gateway relay
//!
//! Public edge that forwards requests to the conversation service.

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::trace::TraceLayer;

use bedrock_relay::config::GatewayConfig;
use bedrock_relay::gateway::{self, GatewayRelay};
use bedrock_relay::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = GatewayConfig::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let relay = Arc::new(GatewayRelay::new(&config)?);
    tracing::info!(upstream = %relay.upstream_url(), "Gateway relay configured");

    let app = gateway::router(relay, config.function_arn).layer(TraceLayer::new_for_http());

    tracing::info!("Gateway relay running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
