use quizforge::state::{AppState, Config};
use quizforge::{build_router, db};
use std::env;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .init();

    let database_url = db::resolve_database_url();
    let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned());
    let secret_key = env::var("QUIZFORGE_SECRET_KEY")
        .expect("QUIZFORGE_SECRET_KEY must be set to sign and verify presenter tokens");
    let base_url = env::var("QUIZFORGE_BASE_URL").unwrap_or_else(|_| format!("http://{bind_addr}"));
    let registration_enabled = env::var("REGISTRATION_ENABLED")
        .map(|v| v != "false" && v != "0")
        .unwrap_or(true);
    let allowed_origins: Vec<String> = env::var("ALLOWED_ORIGINS")
        .map(|v| v.split(',').map(|s| s.trim().to_owned()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();
    let host_lan_ip = env::var("HOST_LAN_IP").ok();

    info!("connecting to database...");
    let pool = db::create_pool(&database_url).await;
    db::run_migrations(&pool).await;
    info!("migrations applied");

    let config = Config {
        secret_key: Arc::new(secret_key),
        base_url: Arc::new(base_url),
        registration_enabled,
        allowed_origins: Arc::new(allowed_origins),
        host_lan_ip: Arc::new(host_lan_ip),
    };
    let state = AppState::new(pool, config);
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind");
    info!(addr = %bind_addr, "quizforge listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
    info!("quizforge shut down gracefully");
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
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
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
