use crate::error::EngineError;
use crate::repo;
use crate::session_actor::SessionCommand;
use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use tokio::sync::oneshot;

const NICKNAME_MIN: usize = 1;
const NICKNAME_MAX: usize = 50;

#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    pub code: String,
    pub nickname: String,
}

fn validate_nickname(nickname: &str) -> Result<(), EngineError> {
    let len = nickname.chars().count();
    if !(NICKNAME_MIN..=NICKNAME_MAX).contains(&len) {
        return Err(EngineError::Validation(format!(
            "nickname must be between {NICKNAME_MIN} and {NICKNAME_MAX} characters"
        )));
    }
    let allowed = nickname
        .chars()
        .all(|c| c.is_alphanumeric() || c.is_whitespace() || matches!(c, '_' | '-' | '.'));
    if !allowed {
        return Err(EngineError::Validation(
            "nickname may only contain letters, numbers, spaces, '_', '-', and '.'".to_owned(),
        ));
    }
    Ok(())
}

/// Implements the Join Controller algorithm end to end: the actual lookup,
/// uniqueness check, and insert-or-rejoin all happen inside the session
/// actor so concurrent joins against the same session are serialized
/// through its mailbox rather than racing each other's read-then-insert.
pub async fn join_session(
    State(state): State<AppState>,
    Json(body): Json<JoinRequest>,
) -> Result<impl IntoResponse, EngineError> {
    validate_nickname(&body.nickname)?;
    let code = body.code.trim().to_uppercase();

    let session = repo::get_session_by_join_code(&state.pool, &code)
        .await?
        .ok_or_else(|| EngineError::NotFound("no session with that join code".to_owned()))?;

    let handle = state.get_or_spawn_session(&session.id).await?;
    let (reply_tx, reply_rx) = oneshot::channel();
    handle
        .send(SessionCommand::JoinParticipant {
            nickname: body.nickname.clone(),
            reply: reply_tx,
        })
        .await
        .map_err(|_| EngineError::NotFound("session actor is gone".to_owned()))?;
    let outcome = reply_rx
        .await
        .map_err(|_| EngineError::NotFound("session actor dropped the reply".to_owned()))??;

    let status = if outcome.rejoined {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((
        status,
        Json(serde_json::json!({
            "participant_id": outcome.participant_id,
            "session_id": session.id,
            "nickname": body.nickname,
            "token": outcome.token,
        })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_nickname_accepts_letters_spaces_and_punctuation() {
        assert!(validate_nickname("Anna P.-J").is_ok());
    }

    #[test]
    fn validate_nickname_rejects_empty() {
        assert!(validate_nickname("").is_err());
    }

    #[test]
    fn validate_nickname_rejects_disallowed_characters() {
        assert!(validate_nickname("<script>").is_err());
    }

    #[test]
    fn validate_nickname_rejects_over_length() {
        let nickname = "a".repeat(51);
        assert!(validate_nickname(&nickname).is_err());
    }
}
