//! `GET /api/sessions/{id}/analytics` — per-question and per-participant
//! aggregates, plus the easiest/hardest question by correct-rate. Supplements
//! the distilled spec surface using the shape implied by the Python
//! reference's session routes.

use crate::error::EngineError;
use crate::http::{require_owner, require_presenter};
use crate::repo;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;

pub async fn session_analytics(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, EngineError> {
    let presenter_id = require_presenter(&headers, &state.config.secret_key)?;
    let session = repo::get_session(&state.pool, &session_id)
        .await?
        .ok_or_else(|| EngineError::NotFound("session not found".to_owned()))?;
    require_owner(&session.owner_id, &presenter_id)?;

    let quiz = repo::get_quiz_with_questions(&state.pool, &session.quiz_id)
        .await?
        .ok_or_else(|| EngineError::NotFound("quiz not found".to_owned()))?;
    let participants = repo::list_participants(&state.pool, &session_id).await?;
    let responses = repo::responses_for_session(&state.pool, &session_id).await?;

    let mut question_stats = Vec::with_capacity(quiz.questions.len());
    let mut correct_rates: Vec<(String, i64, f64)> = Vec::new();
    for question in &quiz.questions {
        let for_question: Vec<_> = responses.iter().filter(|r| r.question_id == question.id).collect();
        let total_responses = for_question.len() as i64;
        let correct_count = for_question.iter().filter(|r| r.is_correct).count() as i64;
        let average_response_time = if total_responses > 0 {
            for_question.iter().map(|r| r.response_time_ms).sum::<i64>() as f64 / total_responses as f64
        } else {
            0.0
        };
        let correct_rate = if total_responses > 0 {
            correct_count as f64 / total_responses as f64
        } else {
            0.0
        };
        correct_rates.push((question.id.clone(), question.order, correct_rate));
        question_stats.push(serde_json::json!({
            "question_id": question.id,
            "order": question.order,
            "total_responses": total_responses,
            "correct_count": correct_count,
            "average_response_time_ms": average_response_time,
        }));
    }

    let easiest = correct_rates
        .iter()
        .max_by(|a, b| a.2.partial_cmp(&b.2).unwrap().then(b.1.cmp(&a.1)))
        .map(|(id, _, _)| id.clone());
    let hardest = correct_rates
        .iter()
        .min_by(|a, b| a.2.partial_cmp(&b.2).unwrap().then(a.1.cmp(&b.1)))
        .map(|(id, _, _)| id.clone());

    let participant_stats: Vec<_> = participants
        .iter()
        .map(|p| {
            let answered: Vec<_> = responses.iter().filter(|r| r.participant_id == p.id).collect();
            serde_json::json!({
                "participant_id": p.id,
                "nickname": p.nickname,
                "score": p.score,
                "answered_count": answered.len(),
                "correct_count": answered.iter().filter(|r| r.is_correct).count(),
            })
        })
        .collect();

    Ok(Json(serde_json::json!({
        "session_id": session_id,
        "questions": question_stats,
        "participants": participant_stats,
        "easiest_question_id": easiest,
        "hardest_question_id": hardest,
    })))
}
