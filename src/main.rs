use std::net::SocketAddr;
use std::sync::Arc;

use tutoring_chat::{
    build_router,
    config::Config,
    db,
    store::{InMemoryMessageStore, MessageStore, PgMessageStore},
    tutoring_client::HttpTutoringClient,
    AppState,
};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(config.json_logs).expect("Failed to initialize logging");
    tracing::info!(
        "Configuration - Database: {}, Tutoring service: {}, Base path: {:?}, Dependency timeout: {}ms",
        if config.database_url.is_some() { "✅" } else { "❌ (in-memory)" },
        config.tutoring_service_url,
        config.base_path,
        config.dependency_timeout.as_millis()
    );

    let store: Arc<dyn MessageStore> = match &config.database_url {
        Some(url) => {
            let pool = db::create_pool(url, config.database_max_connections)
                .await
                .expect("Failed to create database pool.");
            Arc::new(PgMessageStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set. Messages are kept in memory and lost on restart.");
            Arc::new(InMemoryMessageStore::new())
        }
    };

    let directory = HttpTutoringClient::new(&config.tutoring_service_url, config.dependency_timeout)
        .expect("Failed to build tutoring service client");

    let bind_addr = config.bind_addr;
    let shared_state = Arc::new(AppState::new(config, store, Arc::new(directory)));
    let app = build_router(shared_state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .expect("Failed to bind listener");
    tracing::info!("listening on {}", bind_addr);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, closing connections");
}

// Pretty logs for development, JSON when LOG_FORMAT=json
fn init_logging(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug,tutoring_chat=trace,sqlx=info,reqwest=info,hyper=info,tower=info".to_string()
        } else {
            "info,tutoring_chat=info,sqlx=warn,reqwest=warn,hyper=warn,tower=warn".to_string()
        }
    });

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    let fmt_layer = if json {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_thread_ids(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    tracing_subscriber::registry().with(env_filter).with(fmt_layer).init();

    tracing::info!("💬 Tutoring chat starting up...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Build mode: {}", if cfg!(debug_assertions) { "development" } else { "production" });
    tracing::info!("Log level: {}", log_level);

    Ok(())
}
