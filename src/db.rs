//! Pool construction and migration runner.
//!
//! The engine treats its database as a swappable external collaborator
//! (spec §1): `sqlx::Any` lets the same query layer run unmodified against
//! either Postgres or SQLite, selected purely by `DATABASE_URL`'s scheme.

use sqlx::any::{install_default_drivers, AnyPoolOptions};
use sqlx::AnyPool;
use std::path::Path;

const DEFAULT_SQLITE_PATH: &str = "./data/quizforge.db";

/// Resolves `DATABASE_URL`, falling back to a local SQLite file and
/// creating its parent directory if needed.
pub fn resolve_database_url() -> String {
    match std::env::var("DATABASE_URL") {
        Ok(url) if !url.is_empty() => url,
        _ => {
            if let Some(parent) = Path::new(DEFAULT_SQLITE_PATH).parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            format!("sqlite://{DEFAULT_SQLITE_PATH}?mode=rwc")
        }
    }
}

pub async fn create_pool(database_url: &str) -> AnyPool {
    install_default_drivers();
    AnyPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .expect("failed to connect to database")
}

pub async fn run_migrations(pool: &AnyPool) {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .expect("failed to run database migrations")
}
