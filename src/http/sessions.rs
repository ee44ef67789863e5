use crate::error::EngineError;
use crate::http::{require_owner, require_presenter};
use crate::models::{Session, SessionStatus};
use crate::repo;
use crate::session_actor::{build_leaderboard_from, SessionCommand, SessionSnapshot};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use rand::Rng;
use serde::Deserialize;
use tokio::sync::oneshot;
use uuid::Uuid;

const JOIN_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const JOIN_CODE_LEN: usize = 6;

fn generate_join_code() -> String {
    let mut rng = rand::thread_rng();
    (0..JOIN_CODE_LEN)
        .map(|_| JOIN_CODE_ALPHABET[rng.gen_range(0..JOIN_CODE_ALPHABET.len())] as char)
        .collect()
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub quiz_id: String,
}

pub async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let presenter_id = require_presenter(&headers, &state.config.secret_key)?;
    let quiz = repo::get_quiz_with_questions(&state.pool, &body.quiz_id)
        .await?
        .ok_or_else(|| EngineError::NotFound("quiz not found".to_owned()))?;
    require_owner(&quiz.owner_id, &presenter_id)?;
    if quiz.questions.is_empty() {
        return Err(EngineError::Validation("quiz has no questions".to_owned()));
    }

    let id = Uuid::new_v4().to_string();
    let created_at = chrono::Utc::now().to_rfc3339();

    let mut join_code = generate_join_code();
    let mut collisions = 0;
    while repo::get_session_by_join_code(&state.pool, &join_code).await?.is_some() {
        collisions += 1;
        if collisions > 3 {
            return Err(EngineError::Internal(
                "could not generate a unique session code".to_owned(),
            ));
        }
        join_code = generate_join_code();
    }

    repo::create_session(&state.pool, &id, &quiz.id, &presenter_id, &join_code, &created_at).await?;
    let session = repo::get_session(&state.pool, &id)
        .await?
        .ok_or_else(|| EngineError::NotFound("session vanished after creation".to_owned()))?;

    Ok((StatusCode::CREATED, Json(session_json(&session))))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    let session = repo::get_session(&state.pool, &session_id)
        .await?
        .ok_or_else(|| EngineError::NotFound("session not found".to_owned()))?;
    Ok(Json(session_json(&session)))
}

pub async fn list_sessions(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, EngineError> {
    let presenter_id = require_presenter(&headers, &state.config.secret_key)?;
    let sessions = repo::list_sessions_by_owner(&state.pool, &presenter_id).await?;
    Ok(Json(
        sessions.iter().map(session_json).collect::<Vec<_>>(),
    ))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, EngineError> {
    let presenter_id = require_presenter(&headers, &state.config.secret_key)?;
    let session = repo::get_session(&state.pool, &session_id)
        .await?
        .ok_or_else(|| EngineError::NotFound("session not found".to_owned()))?;
    require_owner(&session.owner_id, &presenter_id)?;

    repo::delete_session(&state.pool, &session_id).await?;
    state.forget_if_finished(&session_id, SessionStatus::Finished).await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn leaderboard(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, EngineError> {
    let presenter_id = require_presenter(&headers, &state.config.secret_key)?;
    let session = repo::get_session(&state.pool, &session_id)
        .await?
        .ok_or_else(|| EngineError::NotFound("session not found".to_owned()))?;
    require_owner(&session.owner_id, &presenter_id)?;

    let participants = repo::list_participants(&state.pool, &session_id).await?;
    Ok(Json(build_leaderboard_from(&participants)))
}

pub async fn get_session_by_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    let code = code.trim().to_uppercase();
    let session = repo::get_session_by_join_code(&state.pool, &code)
        .await?
        .ok_or_else(|| EngineError::NotFound("no session with that join code".to_owned()))?;
    let quiz_title = repo::get_quiz_title(&state.pool, &session.quiz_id)
        .await?
        .ok_or_else(|| EngineError::NotFound("quiz not found".to_owned()))?;
    let participant_count = repo::count_participants(&state.pool, &session.id).await?;

    Ok(Json(serde_json::json!({
        "code": session.join_code,
        "status": session.status.as_str(),
        "quiz_title": quiz_title,
        "current_question_idx": session.current_question_idx,
        "participant_count": participant_count,
    })))
}

pub async fn finish_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, EngineError> {
    let presenter_id = require_presenter(&headers, &state.config.secret_key)?;
    let session = repo::get_session(&state.pool, &session_id)
        .await?
        .ok_or_else(|| EngineError::NotFound("session not found".to_owned()))?;
    require_owner(&session.owner_id, &presenter_id)?;

    let handle = state.get_or_spawn_session(&session_id).await?;
    let (reply_tx, reply_rx) = oneshot::channel();
    handle
        .send(SessionCommand::ForceFinish { reply: reply_tx })
        .await
        .map_err(|_| EngineError::NotFound("session actor is gone".to_owned()))?;
    reply_rx
        .await
        .map_err(|_| EngineError::NotFound("session actor dropped the reply".to_owned()))??;

    state.forget_if_finished(&session_id, SessionStatus::Finished).await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    let handle = state.get_or_spawn_session(&session_id).await?;
    let (reply_tx, reply_rx) = oneshot::channel();
    handle
        .send(SessionCommand::Snapshot { reply: reply_tx })
        .await
        .map_err(|_| EngineError::NotFound("session actor is gone".to_owned()))?;
    let snapshot: SessionSnapshot = reply_rx
        .await
        .map_err(|_| EngineError::NotFound("session actor dropped the reply".to_owned()))?;

    Ok(Json(serde_json::json!({
        "status": snapshot.status.as_str(),
        "current_question_idx": snapshot.current_question_idx,
        "total_questions": snapshot.total_questions,
        "online_participants": snapshot.online_participants,
    })))
}

pub(crate) fn session_json(session: &Session) -> serde_json::Value {
    serde_json::json!({
        "id": session.id,
        "quiz_id": session.quiz_id,
        "owner_id": session.owner_id,
        "join_code": session.join_code,
        "status": session.status.as_str(),
        "current_question_idx": session.current_question_idx,
        "created_at": session.created_at,
    })
}
