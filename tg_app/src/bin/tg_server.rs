use std::net::SocketAddr;
use std::sync::Arc;

use tg_app::cli;
use tg_app::config_loader;
use tg_app::shutdown_handler;
use tg_app::tracing_setup;
use tg_http::HttpOptions;
use tg_http::SharedLimiter;
use tg_ratelimit::ClientRegistry;
use tg_ratelimit::Sweeper;
use tokio::net::TcpListener;
use tracing::Level;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let config_path = cli::config_path(cli::DEFAULT_CONFIG_PATH);
    let config = config_loader::load_server_config(&config_path)?;
    let _guard = tracing_setup::init(&config.logging, Level::INFO)?;

    info!(
        capacity = config.rate_limit.capacity,
        window_ms = config.rate_limit.window_ms,
        idle_ttl_ms = config.rate_limit.idle_ttl().as_millis() as u64,
        hpp_mode = ?config.hpp.mode,
        "Starting tollgate with config from {config_path}"
    );

    let registry = Arc::new(ClientRegistry::from_config(&config.rate_limit)?);
    let sweeper = Sweeper::spawn(Arc::clone(&registry), config.rate_limit.sweep_interval())?;

    let shutdown = shutdown_handler::setup()?;

    let limiter: SharedLimiter = registry;
    let app = tg_http::router(limiter, HttpOptions::new(config.request_timeout(), config.hpp.clone()));

    let listener = TcpListener::bind(config.bind_addr).await?;
    info!("Server running on http://{}", config.bind_addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_handler::wait(shutdown))
        .await?;

    sweeper.stop().await;
    info!("Server stopped");

    Ok(())
}
