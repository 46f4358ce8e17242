//! Conversation service
//!
//! Accepts `{prompt, invoked_function_arn, conversation_history}` and answers
//! with the model's reply and the extended history.

use std::net::SocketAddr;
use std::sync::Arc;

use bedrock_relay::config::Config;
use bedrock_relay::core::ChatEngine;
use bedrock_relay::providers::{BedrockConnector, ClientSlot};
use bedrock_relay::{app, init_tracing, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    if config.tunnel_token.is_some() {
        tracing::info!("Tunnel token configured; expose port {} through the tunnel", config.port);
    } else {
        tracing::warn!("NGROK_TOKEN is not set; serving on the local address only");
    }

    let connector = Arc::new(BedrockConnector);
    let clients = match config.bedrock_region.as_deref() {
        Some(region) => ClientSlot::pinned(connector, region).await,
        None => ClientSlot::lazy(connector),
    };

    let chat_engine = Arc::new(ChatEngine::new(config.model_id.clone(), clients));
    tracing::info!(model_id = %chat_engine.model_id(), "Chat engine ready");

    let state = AppState {
        config,
        chat_engine,
    };

    tracing::info!("Bedrock relay running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
