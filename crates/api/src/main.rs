//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use api::{AppState, create_app};
use event_bus::{InMemoryEventLog, LogEventBus, PostgresEventLog};
use saga::{Choreography, Collaborators};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let (json, text) = match config.log_format {
        LogFormat::Json => (Some(tracing_subscriber::fmt::layer().json()), None),
        LogFormat::Text => (None, Some(tracing_subscriber::fmt::layer())),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(text)
        .init();
}

/// Opens the event log named by `DATABASE_URL`, or an in-memory one.
async fn start_bus(config: &Config) -> LogEventBus {
    match &config.database_url {
        Some(url) => {
            let log = PostgresEventLog::connect(url)
                .await
                .expect("failed to connect to the event log database");
            log.run_migrations()
                .await
                .expect("failed to run event log migrations");
            tracing::info!("using PostgreSQL event log");
            LogEventBus::start(log, config.bus())
        }
        None => {
            tracing::info!("using in-memory event log");
            LogEventBus::start(InMemoryEventLog::new(), config.bus())
        }
    }
}

#[tokio::main]
async fn main() {
    // 1. Configuration and tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");
    api::routes::metrics::describe();

    // 3. Event bus and the services subscribed to it
    let bus = start_bus(&config).await;
    let collaborators = Collaborators::simulated(
        config.seed_restaurants,
        config.seed_partners,
        config.gateway(),
    );
    let saga = Choreography::start(bus, collaborators, config.saga())
        .await
        .expect("failed to subscribe consumer groups");

    // 4. Build the application
    let app = create_app(Arc::new(AppState::new(saga)), metrics_handle);

    // 5. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}
