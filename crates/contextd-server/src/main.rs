mod api;
mod cli;
mod error;
mod state;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use contextd_bus::EventBus;
use contextd_domain::Config;
use contextd_fold::{Compressor, FoldEngine, NullCollaborator, Suggester};
use contextd_store::Store;
use contextd_watcher::WatcherService;

use cli::{Cli, Command};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            let config = Config::load_or_default(&cli.config)
                .with_context(|| format!("loading config from {}", cli.config.display()))?;
            run_server(config).await
        }
        Some(Command::Config) => {
            let config = Config::load_or_default(&cli.config)?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Some(Command::Version) => {
            println!("contextd {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,contextd_server=debug")),
        )
        .json()
        .init();
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    tracing::info!("contextd starting");

    // ── Store ─────────────────────────────────────────────────────────
    let store = Arc::new(Store::open(&config).context("opening store")?);
    tracing::info!(db_path = %config.store.db_path.display(), vector_capable = store.vector_capable(), "store ready");

    // ── Event bus ─────────────────────────────────────────────────────
    let bus = Arc::new(EventBus::new(config.bus.subscriber_queue_depth, config.bus.keepalive_secs));
    tracing::info!(queue_depth = config.bus.subscriber_queue_depth, "event bus ready");

    // ── Watcher ───────────────────────────────────────────────────────
    let mut watcher = WatcherService::new(store.clone(), bus.clone(), config.clone());
    watcher.initial_sync().context("initial watcher sync")?;
    let watcher_status = watcher.shared_status();
    tracing::info!(sources = config.watcher.sources.len(), "watcher ready, initial sync complete");

    tokio::task::spawn_blocking(move || {
        if let Err(e) = watcher.run_blocking() {
            tracing::error!(error = %e, "watcher loop exited");
        }
    });

    // ── Fold engine + no-LLM-configured collaborators ───────────────
    let fold = Arc::new(FoldEngine::new(&config));
    tracing::info!(provider = ?fold.active_provider(), "fold engine ready");
    let compressor: Arc<dyn Compressor> = Arc::new(NullCollaborator);
    let suggester: Arc<dyn Suggester> = Arc::new(NullCollaborator);

    // ── App state ─────────────────────────────────────────────────────
    let state = AppState {
        config: Arc::new(config.clone()),
        store: store.clone(),
        bus: bus.clone(),
        watcher_status,
        metrics: Arc::new(parking_lot::RwLock::new(None)),
        fold,
        compressor,
        suggester,
        embedder: None,
    };

    // ── Periodic keepalive ────────────────────────────────────────────
    {
        let bus = bus.clone();
        let interval = bus.keepalive_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                bus.broadcast_keepalive();
            }
        });
    }
    tracing::info!(interval_secs = config.bus.keepalive_secs, "keepalive task started");

    // ── Periodic metrics snapshot ─────────────────────────────────────
    {
        let store = store.clone();
        let bus = bus.clone();
        let metrics = state.metrics.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tokio::time::Duration::from_secs(30));
            loop {
                ticker.tick().await;
                match store.metrics_snapshot() {
                    Ok(snapshot) => {
                        *metrics.write() = Some(snapshot.clone());
                        bus.broadcast_metrics(snapshot);
                    }
                    Err(e) => tracing::warn!(error = %e, "metrics snapshot failed"),
                }
            }
        });
    }
    tracing::info!("metrics snapshot task started (30s tick)");

    // ── Periodic MCP-health poll ──────────────────────────────────────
    // The MCP tool harness's own dispatch is out of scope for this sidecar
    // (spec.md §1); this just reports that no harness has been wired in,
    // so dashboards subscribed to `mcp:status` get a defined value instead
    // of silence.
    {
        let bus = bus.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tokio::time::Duration::from_secs(30));
            loop {
                ticker.tick().await;
                bus.broadcast_mcp_status(contextd_domain::McpStatusSnapshot::unreachable());
            }
        });
    }
    tracing::info!("mcp-health poll task started (30s tick)");

    // ── Router ────────────────────────────────────────────────────────
    let cors_layer = build_cors_layer(state.config.server.cors_permissive);
    let app = api::router().layer(cors_layer).with_state(state.clone());

    let addr = &state.config.server.bind_addr;
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("binding to {addr}"))?;
    tracing::info!(%addr, "contextd listening");

    axum::serve(listener, app).await.context("axum server error")?;
    Ok(())
}

fn build_cors_layer(permissive: bool) -> CorsLayer {
    if permissive {
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any)
    } else {
        CorsLayer::new()
    }
}
