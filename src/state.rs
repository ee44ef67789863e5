use crate::error::EngineError;
use crate::session_actor::{self, SessionHandle};
use crate::{models::SessionStatus, repo};
use sqlx::AnyPool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub type SessionRegistry = Arc<RwLock<HashMap<String, SessionHandle>>>;

#[derive(Clone)]
pub struct Config {
    pub secret_key: Arc<String>,
    pub base_url: Arc<String>,
    pub registration_enabled: bool,
    pub allowed_origins: Arc<Vec<String>>,
    pub host_lan_ip: Arc<Option<String>>,
}

#[derive(Clone)]
pub struct AppState {
    pub pool: AnyPool,
    pub sessions: SessionRegistry,
    pub config: Config,
}

impl AppState {
    pub fn new(pool: AnyPool, config: Config) -> Self {
        Self {
            pool,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Returns the running actor for a session, spawning one from
    /// persisted state if this process hasn't seen it yet (e.g. after a
    /// restart, or on a fresh WS connection for a session created by an
    /// earlier request).
    pub async fn get_or_spawn_session(&self, session_id: &str) -> Result<SessionHandle, EngineError> {
        {
            let sessions = self.sessions.read().await;
            if let Some(handle) = sessions.get(session_id) {
                return Ok(handle.clone());
            }
        }

        let session = repo::get_session(&self.pool, session_id)
            .await?
            .ok_or_else(|| EngineError::NotFound("session not found".to_owned()))?;
        let quiz = repo::get_quiz_with_questions(&self.pool, &session.quiz_id)
            .await?
            .ok_or_else(|| EngineError::NotFound("quiz not found".to_owned()))?;

        let mut sessions = self.sessions.write().await;
        if let Some(handle) = sessions.get(session_id) {
            return Ok(handle.clone());
        }
        let handle = session_actor::spawn(self.pool.clone(), session, quiz);
        sessions.insert(session_id.to_owned(), handle.clone());
        Ok(handle)
    }

    pub async fn forget_if_finished(&self, session_id: &str, status: SessionStatus) {
        if status == SessionStatus::Finished {
            self.sessions.write().await.remove(session_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::any::{install_default_drivers, AnyPoolOptions};

    async fn make_pool() -> AnyPool {
        install_default_drivers();
        // A single connection keeps every query on the same in-memory
        // database; sqlite::memory: otherwise hands out a fresh empty
        // database per connection.
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite pool");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("migrations should apply to a fresh in-memory database");
        pool
    }

    #[tokio::test]
    async fn get_or_spawn_session_returns_not_found_for_unknown_session() {
        let pool = make_pool().await;
        let state = AppState::new(
            pool,
            Config {
                secret_key: Arc::new("secret".to_owned()),
                base_url: Arc::new("http://localhost:8080".to_owned()),
                registration_enabled: true,
                allowed_origins: Arc::new(Vec::new()),
                host_lan_ip: Arc::new(None),
            },
        );
        let result = state.get_or_spawn_session("missing").await;
        assert!(matches!(result, Err(EngineError::NotFound(_))));
    }
}
