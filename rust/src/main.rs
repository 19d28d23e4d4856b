use postboard::backends::PostgresBackend;
use postboard::{
    handle_shutdown_signal, initiate_scheduled_tasks, run_migrations, Config, ServerState,
};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("[STARTUP] Postboard starting up...");

    let config = match Config::initialize() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "[STARTUP] Bad configuration! Terminating server.");
            return;
        }
    };

    let backend = match PostgresBackend::connect(&config) {
        Ok(backend) => backend,
        Err(err) => {
            tracing::error!(error = %err, "[STARTUP] Couldn't create DB pool! Terminating server.");
            return;
        }
    };

    if config.disable_migrations {
        tracing::warn!("[STARTUP] Skipping SQL migrations!");
    } else {
        match run_migrations(&backend).await {
            Ok(report) => {
                let applied_migrations = report.applied_migrations();

                if applied_migrations.is_empty() {
                    tracing::info!("[STARTUP] No SQL migrations applied!");
                } else {
                    let readable_migrations = applied_migrations
                        .iter()
                        .map(|migration| migration.name())
                        .collect::<Vec<&str>>()
                        .join(",");

                    tracing::info!("[STARTUP] SQL migrations applied: {readable_migrations}");
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "[STARTUP] Migrations failed to run! Terminating server.");
                return;
            }
        }
    }

    let bind_address = config.bind_address;

    let state = ServerState::initialize(config, backend).await;
    tracing::info!("[STARTUP] ServerState initialized");

    let app = postboard::router(state.clone());
    tracing::info!("[STARTUP] Created main router");

    let listener = match tokio::net::TcpListener::bind(bind_address).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, %bind_address, "[STARTUP] Couldn't bind! Terminating server.");
            return;
        }
    };

    if let Err(err) = initiate_scheduled_tasks(state).await {
        tracing::error!(error = %err, "[STARTUP] Scheduled tasks failed to start! Terminating server.");
        return;
    }
    tracing::info!("[STARTUP] Scheduled tasks initialized");

    tracing::info!(%bind_address, "[STARTUP] Serving posts!");
    if let Err(err) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(handle_shutdown_signal())
    .await
    {
        tracing::error!(error = %err, "[SHUTDOWN] Server stopped with an error");
    }
}
