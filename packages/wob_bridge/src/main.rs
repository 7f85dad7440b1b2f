use anyhow::{Context, Result};
use axum::{
    Router,
    routing::{get, post},
};
use clap::{Parser, Subcommand};
use slot_session::{Bridge, JsonFileStore, MemoryStore, MemoryTable, StateStore, store::keys};
use std::path::PathBuf;
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::CorsLayer;
use tower_http::trace::MakeSpan;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use uuid::Uuid;

mod config;
mod handlers;
mod metrics;
#[cfg(test)]
mod test_helpers;
mod transport;
mod ws;

use crate::config::{ServerConfig, WobConfig, read_file_config};
use crate::metrics::ServerMetrics;
use crate::transport::WsTransport;
use crate::ws::MediaHostLink;

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

#[derive(Parser)]
#[command(name = "wob")]
#[command(about = "WebSocket bridge from phones to a slot-indexed sensor table")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Custom data directory (defaults to ~/.wob)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge server in the foreground
    Serve(ServeArgs),
}

#[derive(Parser, Default)]
struct ServeArgs {
    /// Port for the web server (overrides config, 0 = auto-select)
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to (overrides config)
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub bridge: Arc<Bridge>,
    /// Outbound queues of connected phones
    pub transport: Arc<WsTransport>,
    /// Attached media host, if any
    pub media: Arc<MediaHostLink>,
    pub config: Arc<WobConfig>,
    pub metrics: Arc<ServerMetrics>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = WobConfig::new(cli.data_dir.clone())?;

    match cli.command {
        None => run_server(ServeArgs::default(), config).await,
        Some(Commands::Serve(args)) => run_server(args, config).await,
    }
}

pub(crate) fn build_router(state: AppState) -> Router {
    Router::new()
        // Phones
        .route("/", get(handlers::client_websocket_handler))
        .route("/api/url", get(handlers::get_url))
        // Media host
        .route("/api/media", get(handlers::media_websocket_handler))
        // Downstream view
        .route("/api/slots", get(handlers::list_slots))
        .route("/api/slots/{slot}", get(handlers::get_slot))
        // Configuration
        .route("/api/config/reload", post(handlers::reload_config_handler))
        .route("/api/admin/reinit", post(handlers::reinit_handler))
        // Health endpoints
        .route("/health", get(handlers::health_handler))
        .route("/health/live", get(handlers::health_live_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn run_server(args: ServeArgs, config: WobConfig) -> Result<()> {
    // Setup logging
    let default_directive = if args.debug {
        "wob=debug,slot_session=debug,tower_http=debug,info"
    } else {
        "wob=info,slot_session=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    info!("Starting wob bridge");

    let fc = read_file_config(&config.data_dir)?;
    let server_config = ServerConfig::resolve(&fc.server, args.host, args.port);
    info!(
        "Bridge config: max_clients={}, sample_rate={}, persist={}",
        fc.bridge.max_clients, fc.bridge.sample_rate, fc.store.persist
    );

    // Durable session state
    let store: Arc<dyn StateStore> = if fc.store.persist {
        let path = config.session_store_path();
        Arc::new(
            JsonFileStore::open(&path)
                .with_context(|| format!("Failed to open session state {}", path.display()))?,
        )
    } else {
        Arc::new(MemoryStore::new())
    };

    let metrics = Arc::new(ServerMetrics::new());
    let transport = Arc::new(WsTransport::new(
        server_config.send_channel_capacity,
        metrics.clone(),
    ));
    let media = Arc::new(MediaHostLink::new(
        server_config.send_channel_capacity,
        metrics.clone(),
    ));

    let bridge = Arc::new(
        Bridge::new(
            fc.bridge,
            store.clone(),
            Arc::new(MemoryTable::new()),
            transport.clone(),
            media.clone(),
        )
        .context("Failed to open session core")?,
    );

    // Sockets from a previous run are gone; free their slots before anyone connects
    let stale = bridge.release_all().await;
    if stale > 0 {
        info!("Released {} sessions left over from a previous run", stale);
    }
    bridge
        .device()
        .sink()
        .clear()
        .context("Failed to initialize device tables")?;

    let app_state = AppState {
        bridge,
        transport,
        media,
        config: Arc::new(config),
        metrics,
    };
    let app = build_router(app_state);

    let addr = format!("{}:{}", server_config.host, server_config.port)
        .parse::<SocketAddr>()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                server_config.host, server_config.port
            )
        })?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let actual_addr = listener.local_addr()?;

    let url = server_config.discovery_url(actual_addr.port());
    if let Err(e) = store.put(keys::URL, &url) {
        warn!("Failed to store discovery URL: {}", e);
    }

    info!("wob listening on http://{}", actual_addr);
    info!("");
    info!("Phones connect to: {}", url);
    info!("Endpoints:");
    info!("  GET  /                   - Phone WebSocket");
    info!("  GET  /api/media          - Media host WebSocket");
    info!("  GET  /api/slots          - Sensor rows");
    info!("  GET  /api/slots/:slot    - Sensor and touch rows for one slot");
    info!("  POST /api/config/reload  - Push config.toml to connected phones");
    info!("  POST /api/admin/reinit   - Rebuild the session core");

    // Create shutdown signal handler
    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal, cleaning up...");
    };

    // Run server with graceful shutdown
    let server_result = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error");

    info!("Shutdown complete");
    server_result
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_router_wires_endpoints() {
        let (state, _tmp) = crate::test_helpers::test_app_state(2).await;
        state.bridge.on_open("a").await;
        let app = build_router(state);

        for uri in ["/health", "/health/live", "/metrics", "/api/slots", "/api/slots/1"] {
            let resp = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK, "{}", uri);
        }

        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/config/reload")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn test_cli_parses_serve() {
        let cli = Cli::try_parse_from(["wob", "--data-dir", "/tmp/w", "serve", "-p", "8080", "--debug"])
            .unwrap();
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/w")));
        let Some(Commands::Serve(args)) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.port, Some(8080));
        assert!(args.debug);
        assert!(args.host.is_none());
    }
}
