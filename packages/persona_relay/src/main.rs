use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use persona_relay::config::{self, FileConfig};
use persona_relay::{AppState, build_router};
use responses_stream::{ResponsesClient, Upstream};

#[derive(Parser)]
#[command(name = "persona-relay")]
#[command(about = "Stream LLM responses to WebSocket clients as one or more personas")]
struct Cli {
    /// Host to bind to (overrides [server].host)
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Port for the web server (overrides [server].port)
    #[arg(short, long)]
    port: Option<u16>,

    /// Config file
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_directive = if cli.debug {
        "persona_relay=debug,responses_stream=debug,tower_http=debug,info"
    } else {
        "persona_relay=info,responses_stream=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let mut fc: FileConfig = config::load_config(&cli.config)
        .extract()
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    if let Some(host) = cli.host {
        fc.server.host = host;
    }
    if let Some(port) = cli.port {
        fc.server.port = port;
    }

    let api_key = match fc.upstream.api_key() {
        Some(key) => key.to_string(),
        None => {
            warn!("No API key configured (OPENAI_API_KEY or [upstream].api_key)");
            String::new()
        }
    };

    let mut client = ResponsesClient::new(api_key)
        .with_model(fc.upstream.model.clone())
        .with_base_url(fc.upstream.base_url.clone());
    if let Some(timeout) = fc.upstream.request_timeout() {
        client = client
            .with_timeout(timeout)
            .context("Failed to build upstream HTTP client")?;
    }
    let upstream: Arc<dyn Upstream> = Arc::new(client);

    let pacing = fc.pacing.policy();
    info!(
        "Upstream: model={} base_url={} timeout={:?}",
        upstream.model(),
        fc.upstream.base_url,
        fc.upstream.request_timeout()
    );
    info!("Persona pacing: {:?} every {:?}", pacing.unit, pacing.delay);

    let limits = fc.websocket.limits();
    info!(
        "Per-connection limits: {} outbound frames, {} pending messages, {} byte messages",
        limits.send_channel_capacity,
        limits.inbound_queue_capacity,
        limits.max_message_bytes
    );

    let state = AppState::new(upstream, pacing, limits);
    let registry = state.registry.clone();
    let app = build_router(state);

    let addr = fc.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let actual_addr = listener.local_addr()?;

    info!("Persona Relay listening on http://{}", actual_addr);
    info!("  GET  /ws           - streaming WebSocket");
    info!("  POST /chat         - single persona");
    info!("  POST /multi        - several personas");
    info!("  POST /openai-chat  - raw model call");

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    info!(
        "Shutdown complete ({} connections open at exit)",
        registry.len().await
    );
    Ok(())
}
