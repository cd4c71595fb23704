use axum::{Router, routing::get};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{Level, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use danmu_gateway::{
    AppState, Args, Config,
    handlers::router,
    logs::{LogBuffer, LogBufferLayer},
    metrics::metrics_handler,
    cache::cache_sweeper,
    rate_limit::history_sweeper,
    source::HttpSource,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // parse cli arguments / env
    let args = Args::parse();
    let config = Config::from(&args);

    // stdout plus the in-memory tail behind /api/logs
    let logs = Arc::new(LogBuffer::new(config.log_buffer));
    tracing_subscriber::registry()
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .with(fmt::layer().with_target(false))
        .with(LogBufferLayer::new(Arc::clone(&logs)))
        .init();

    let client = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()?;
    let source = Arc::new(HttpSource::new(client, &config.upstream_url));
    let sweep_interval = config.sweep_interval;

    // creating shared state
    let state = Arc::new(AppState::new(config, source, logs));

    // spawn the background sweepers
    tokio::spawn(history_sweeper(Arc::clone(&state.limiter), sweep_interval));
    tokio::spawn(cache_sweeper(Arc::clone(&state.cache), sweep_interval));

    if args.metrics_port != 0 {
        let metrics_addr = SocketAddr::from(([0, 0, 0, 0], args.metrics_port));
        let metrics_app = Router::new().route("/metrics", get(metrics_handler));
        let metrics_listener = tokio::net::TcpListener::bind(metrics_addr).await?;
        info!("Metrics on http://{}/metrics", metrics_addr);
        tokio::spawn(async move {
            if let Err(e) = axum::serve(metrics_listener, metrics_app).await {
                warn!("metrics listener stopped: {}", e);
            }
        });
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Gateway running on http://{}", addr);
    info!("Forwarding to danmu source at {}", state.config.upstream_url);
    info!("Comment cache TTL: {} seconds", state.config.cache_ttl.as_secs());
    if state.config.rate_limit_enabled() {
        info!(
            "Rate limit: {} comment fetches per 60 seconds per client",
            state.config.rate_limit
        );
    } else {
        info!("Rate limit disabled");
    }

    let app = router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
