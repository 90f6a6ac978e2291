//! services/api/src/bin/api.rs

use api_lib::{
    adapters::DbAdapter,
    config::Config,
    error::ApiError,
    security::{Argon2Hasher, JwtKeys},
    web::{
        build_router, cors_layer,
        rate_limit::{RateLimiter, SWEEP_EVERY},
        serve, AppState,
    },
};
use roma_core::{ServiceConfig, Services};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_filter))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .min_connections(config.db_min_connections)
        .max_lifetime(config.db_max_lifetime)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Wire Services ---
    let jwt = Arc::new(JwtKeys::new(
        &config.jwt_secret,
        config.access_ttl,
        config.refresh_ttl,
    ));
    let services = Services::new(
        db_adapter.clone(),
        Arc::new(Argon2Hasher),
        jwt.clone(),
        ServiceConfig {
            default_tz: config.default_tz,
            invite_ttl: config.invite_ttl,
        },
    );

    // --- 4. Build the Shared AppState ---
    let shutdown = CancellationToken::new();
    let limiter = Arc::new(RateLimiter::new(
        config.rate_limit_rps,
        config.rate_limit_burst,
    ));
    let sweeper = limiter.spawn_sweeper(SWEEP_EVERY, shutdown.clone());
    let app_state = Arc::new(AppState {
        services,
        jwt,
        probe: db_adapter,
        limiter,
    });
    let app = build_router(app_state, cors_layer(&config.cors_origins));

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    let server = serve(
        listener,
        app,
        config.header_read_timeout,
        shutdown.clone(),
    );
    let mut server_task = tokio::spawn(async move { server.await });

    tokio::select! {
        joined = &mut server_task => {
            joined.map_err(|e| ApiError::Internal(format!("server task failed: {e}")))??;
        }
        _ = shutdown_signal() => {
            shutdown.cancel();
            match tokio::time::timeout(config.shutdown_grace, &mut server_task).await {
                Ok(joined) => {
                    joined.map_err(|e| ApiError::Internal(format!("server task failed: {e}")))??;
                }
                Err(_) => {
                    warn!(grace_secs = config.shutdown_grace.as_secs(), "drain timed out, aborting open connections");
                    server_task.abort();
                }
            }
        }
    }

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        warn!(error = %e, "rate limiter sweeper ended abnormally");
    }
    info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("received SIGINT, shutting down"),
                    _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler, waiting for SIGINT only");
                ctrl_c.await.ok();
                info!("received SIGINT, shutting down");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("received SIGINT, shutting down");
    }
}
