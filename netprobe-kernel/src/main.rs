/**
 * NETPROBE KERNEL - Point d'entrée du serveur
 *
 * RÔLE : bootstrap config, logs, store, rate limiter, dispatcher puis HTTP.
 * Le rate limiter est construit une seule fois ici et injecté dans le dispatcher.
 */

use anyhow::{Context, Result};
use netprobe_kernel::config::load_config;
use netprobe_kernel::dispatcher::Dispatcher;
use netprobe_kernel::execution::ProcessInvoker;
use netprobe_kernel::http::{self, AppState};
use netprobe_kernel::rate_limit::RateLimiter;
use netprobe_kernel::recorder::ResultRecorder;
use netprobe_kernel::store::JsonFileStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // .env optionnel
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("netprobe_kernel=info")),
        )
        .init();

    let cfg = load_config().await;

    let store = JsonFileStore::open(&cfg.storage.data_dir)
        .with_context(|| format!("failed to open result store at {:?}", cfg.storage.data_dir))?;
    let recorder = ResultRecorder::new(Arc::new(store));

    let limiter = Arc::new(RateLimiter::from_config(&cfg.rate_limit));
    limiter.spawn_sweeper(cfg.rate_limit.sweep_interval());
    info!(
        window_seconds = cfg.rate_limit.window_seconds,
        max_requests = cfg.rate_limit.max_requests,
        max_clients = cfg.rate_limit.max_clients,
        "rate limiter ready"
    );

    let dispatcher = Dispatcher::new(limiter, Arc::new(ProcessInvoker), recorder, cfg.tools.clone());
    let app = http::build_router(AppState { dispatcher: Arc::new(dispatcher) });

    let addr: SocketAddr = cfg
        .listen
        .parse()
        .with_context(|| format!("invalid listen address {:?}", cfg.listen))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on http://{addr}");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("HTTP server stopped")?;
    Ok(())
}
