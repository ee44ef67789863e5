//! `GET /api/sessions/{id}/export`
//!
//! One row per participant, in descending score order, with a `Qn:
//! Answer/Correct?/Time(s)/Points` column group per question (spec §6.3).
//! Grounded on the teacher crate's own `export.rs` for RFC 4180 quoting;
//! extended with an apostrophe prefix on any field that would otherwise
//! be interpreted as a spreadsheet formula, since this data is
//! participant-controlled nickname and answer text opened directly in
//! spreadsheet software.

use crate::error::EngineError;
use crate::http::require_presenter;
use crate::repo;
use crate::session_actor::build_leaderboard_from;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

pub async fn export_csv(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, EngineError> {
    let presenter_id = require_presenter(&headers, &state.config.secret_key)?;
    let session = repo::get_session(&state.pool, &session_id)
        .await?
        .ok_or_else(|| EngineError::NotFound("session not found".to_owned()))?;
    crate::http::require_owner(&session.owner_id, &presenter_id)?;

    let quiz = repo::get_quiz_with_questions(&state.pool, &session.quiz_id)
        .await?
        .ok_or_else(|| EngineError::NotFound("quiz not found".to_owned()))?;
    let participants = repo::list_participants(&state.pool, &session_id).await?;
    let responses = repo::responses_for_session(&state.pool, &session_id).await?;
    let leaderboard = build_leaderboard_from(&participants);

    let mut header_row = vec!["Rank".to_owned(), "Nickname".to_owned(), "Total Score".to_owned()];
    for (i, _) in quiz.questions.iter().enumerate() {
        let n = i + 1;
        header_row.push(format!("Q{n}: Answer"));
        header_row.push(format!("Q{n}: Correct?"));
        header_row.push(format!("Q{n}: Time(s)"));
        header_row.push(format!("Q{n}: Points"));
    }
    let mut buf = header_row.iter().map(|h| csv_field(h)).collect::<Vec<_>>().join(",");
    buf.push('\n');

    for entry in &leaderboard {
        let mut row = vec![
            csv_field(&entry.rank.to_string()),
            csv_field(&entry.nickname),
            csv_field(&entry.score.to_string()),
        ];
        for question in &quiz.questions {
            let response = responses
                .iter()
                .find(|r| r.participant_id == entry.participant_id && r.question_id == question.id);
            match response {
                Some(r) => {
                    let answer_text = r
                        .answer_id
                        .as_deref()
                        .and_then(|aid| question.answers.iter().find(|a| a.id == aid))
                        .map(|a| a.text.as_str())
                        .unwrap_or("No answer");
                    row.push(csv_field(answer_text));
                    row.push(csv_field(&r.is_correct.to_string()));
                    row.push(csv_field(&format!("{:.1}", r.response_time_ms as f64 / 1000.0)));
                    row.push(csv_field(&r.points_awarded.to_string()));
                }
                None => {
                    row.push(csv_field("No answer"));
                    row.push(csv_field("false"));
                    row.push(csv_field(""));
                    row.push(csv_field("0"));
                }
            }
        }
        buf.push_str(&row.join(","));
        buf.push('\n');
    }

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/csv; charset=utf-8")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"session-{session_id}.csv\""),
        )
        .body(Body::from(buf))
        .expect("static header values are always valid"))
}

/// RFC 4180 quoting plus formula-injection defusal: a leading `=`, `+`,
/// `-`, `@`, tab, or CR is prefixed with an apostrophe so spreadsheet
/// software renders it as text instead of evaluating it.
fn csv_field(s: &str) -> String {
    let defused = if s
        .chars()
        .next()
        .is_some_and(|c| matches!(c, '=' | '+' | '-' | '@' | '\t' | '\r'))
    {
        format!("'{s}")
    } else {
        s.to_owned()
    };

    if defused.contains(',') || defused.contains('"') || defused.contains('\n') || defused.contains('\r') {
        let escaped = defused.replace('"', "\"\"");
        format!("\"{escaped}\"")
    } else {
        defused
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_field_passes_through_plain_text() {
        assert_eq!(csv_field("Paris"), "Paris");
    }

    #[test]
    fn csv_field_quotes_fields_with_commas() {
        assert_eq!(csv_field("a,b"), "\"a,b\"");
    }

    #[test]
    fn csv_field_doubles_embedded_quotes() {
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn csv_field_defuses_leading_equals_sign() {
        assert_eq!(csv_field("=SUM(A1:A9)"), "'=SUM(A1:A9)");
    }

    #[test]
    fn csv_field_defuses_leading_at_sign() {
        assert_eq!(csv_field("@cmd"), "'@cmd");
    }

    #[test]
    fn csv_field_leaves_interior_equals_sign_alone() {
        assert_eq!(csv_field("a=b"), "a=b");
    }
}
