//! Storage layer. All queries use the non-macro `sqlx::query` form with
//! `?` placeholders, the form `sqlx::Any` normalizes per-backend, so the
//! same call sites run against either SQLite or Postgres (see `db.rs`).

use crate::models::{Answer, Participant, Question, Quiz, ResponseRecord, Session, SessionStatus};
use sqlx::{AnyPool, Row};

pub async fn get_quiz_with_questions(pool: &AnyPool, quiz_id: &str) -> Result<Option<Quiz>, sqlx::Error> {
    let quiz_row = sqlx::query("SELECT id, owner_id, title FROM quizzes WHERE id = ?")
        .bind(quiz_id)
        .fetch_optional(pool)
        .await?;
    let Some(quiz_row) = quiz_row else {
        return Ok(None);
    };

    let question_rows = sqlx::query(
        "SELECT id, quiz_id, text, order_idx, time_limit, image_url \
         FROM questions WHERE quiz_id = ? ORDER BY order_idx ASC",
    )
    .bind(quiz_id)
    .fetch_all(pool)
    .await?;

    let mut questions = Vec::with_capacity(question_rows.len());
    for q in question_rows {
        let question_id: String = q.get("id");
        let answer_rows = sqlx::query(
            "SELECT id, question_id, text, order_idx, is_correct \
             FROM answers WHERE question_id = ? ORDER BY order_idx ASC",
        )
        .bind(&question_id)
        .fetch_all(pool)
        .await?;
        let answers = answer_rows
            .into_iter()
            .map(|a| Answer {
                id: a.get("id"),
                question_id: a.get("question_id"),
                text: a.get("text"),
                order: a.get("order_idx"),
                is_correct: a.get::<i64, _>("is_correct") != 0,
            })
            .collect();
        questions.push(Question {
            id: question_id,
            quiz_id: q.get("quiz_id"),
            text: q.get("text"),
            order: q.get("order_idx"),
            time_limit: q.get("time_limit"),
            image_url: q.get("image_url"),
            answers,
        });
    }

    Ok(Some(Quiz {
        id: quiz_row.get("id"),
        owner_id: quiz_row.get("owner_id"),
        title: quiz_row.get("title"),
        questions,
    }))
}

fn session_from_row(row: &sqlx::any::AnyRow) -> Session {
    Session {
        id: row.get("id"),
        quiz_id: row.get("quiz_id"),
        owner_id: row.get("owner_id"),
        join_code: row.get("join_code"),
        status: SessionStatus::parse(&row.get::<String, _>("status")).unwrap_or(SessionStatus::Lobby),
        current_question_idx: row.get("current_question_idx"),
        created_at: row.get("created_at"),
    }
}

pub async fn create_session(
    pool: &AnyPool,
    id: &str,
    quiz_id: &str,
    owner_id: &str,
    join_code: &str,
    created_at: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO sessions (id, quiz_id, owner_id, join_code, status, current_question_idx, created_at) \
         VALUES (?, ?, ?, ?, 'lobby', -1, ?)",
    )
    .bind(id)
    .bind(quiz_id)
    .bind(owner_id)
    .bind(join_code)
    .bind(created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_session(pool: &AnyPool, session_id: &str) -> Result<Option<Session>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT id, quiz_id, owner_id, join_code, status, current_question_idx, created_at \
         FROM sessions WHERE id = ?",
    )
    .bind(session_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| session_from_row(&r)))
}

pub async fn get_session_by_join_code(
    pool: &AnyPool,
    join_code: &str,
) -> Result<Option<Session>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT id, quiz_id, owner_id, join_code, status, current_question_idx, created_at \
         FROM sessions WHERE join_code = ?",
    )
    .bind(join_code)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| session_from_row(&r)))
}

pub async fn list_sessions_by_owner(pool: &AnyPool, owner_id: &str) -> Result<Vec<Session>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id, quiz_id, owner_id, join_code, status, current_question_idx, created_at \
         FROM sessions WHERE owner_id = ? ORDER BY created_at DESC",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(session_from_row).collect())
}

pub async fn delete_session(pool: &AnyPool, session_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM participant_responses WHERE session_id = ?")
        .bind(session_id)
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM participants WHERE session_id = ?")
        .bind(session_id)
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM sessions WHERE id = ?")
        .bind(session_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_quiz_title(pool: &AnyPool, quiz_id: &str) -> Result<Option<String>, sqlx::Error> {
    let row = sqlx::query("SELECT title FROM quizzes WHERE id = ?")
        .bind(quiz_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| r.get("title")))
}

pub async fn count_participants(pool: &AnyPool, session_id: &str) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM participants WHERE session_id = ?")
        .bind(session_id)
        .fetch_one(pool)
        .await?;
    Ok(row.get("n"))
}

pub async fn update_session_progress(
    pool: &AnyPool,
    session_id: &str,
    status: SessionStatus,
    current_question_idx: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE sessions SET status = ?, current_question_idx = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(current_question_idx)
        .bind(session_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn create_participant(
    pool: &AnyPool,
    id: &str,
    session_id: &str,
    nickname: &str,
    token_hash: &str,
    joined_at: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO participants (id, session_id, nickname, token_hash, score, joined_at) \
         VALUES (?, ?, ?, ?, 0, ?)",
    )
    .bind(id)
    .bind(session_id)
    .bind(nickname)
    .bind(token_hash)
    .bind(joined_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_participant_by_session_and_nickname(
    pool: &AnyPool,
    session_id: &str,
    nickname: &str,
) -> Result<Option<Participant>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT id, session_id, nickname, score, joined_at \
         FROM participants WHERE session_id = ? AND nickname = ?",
    )
    .bind(session_id)
    .bind(nickname)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| Participant {
        id: r.get("id"),
        session_id: r.get("session_id"),
        nickname: r.get("nickname"),
        score: r.get("score"),
        joined_at: r.get("joined_at"),
    }))
}

pub async fn update_participant_token_hash(
    pool: &AnyPool,
    participant_id: &str,
    token_hash: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE participants SET token_hash = ? WHERE id = ?")
        .bind(token_hash)
        .bind(participant_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_participant_by_token_hash(
    pool: &AnyPool,
    participant_id: &str,
    token_hash: &str,
) -> Result<Option<Participant>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT id, session_id, nickname, score, joined_at \
         FROM participants WHERE id = ? AND token_hash = ?",
    )
    .bind(participant_id)
    .bind(token_hash)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| Participant {
        id: r.get("id"),
        session_id: r.get("session_id"),
        nickname: r.get("nickname"),
        score: r.get("score"),
        joined_at: r.get("joined_at"),
    }))
}

pub async fn list_participants(pool: &AnyPool, session_id: &str) -> Result<Vec<Participant>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id, session_id, nickname, score, joined_at \
         FROM participants WHERE session_id = ? ORDER BY joined_at ASC",
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|r| Participant {
            id: r.get("id"),
            session_id: r.get("session_id"),
            nickname: r.get("nickname"),
            score: r.get("score"),
            joined_at: r.get("joined_at"),
        })
        .collect())
}

pub async fn add_to_score(pool: &AnyPool, participant_id: &str, delta: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE participants SET score = score + ? WHERE id = ?")
        .bind(delta)
        .bind(participant_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn record_response(
    pool: &AnyPool,
    id: &str,
    session_id: &str,
    participant_id: &str,
    question_id: &str,
    answer_id: Option<&str>,
    is_correct: bool,
    response_time_ms: i64,
    points_awarded: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO participant_responses \
         (id, session_id, participant_id, question_id, answer_id, is_correct, response_time_ms, points_awarded) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(session_id)
    .bind(participant_id)
    .bind(question_id)
    .bind(answer_id)
    .bind(is_correct)
    .bind(response_time_ms)
    .bind(points_awarded)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn has_responded(
    pool: &AnyPool,
    participant_id: &str,
    question_id: &str,
) -> Result<bool, sqlx::Error> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS n FROM participant_responses WHERE participant_id = ? AND question_id = ?",
    )
    .bind(participant_id)
    .bind(question_id)
    .fetch_one(pool)
    .await?;
    Ok(row.get::<i64, _>("n") > 0)
}

pub async fn responses_for_question(
    pool: &AnyPool,
    question_id: &str,
) -> Result<Vec<ResponseRecord>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id, session_id, participant_id, question_id, answer_id, is_correct, \
                response_time_ms, points_awarded \
         FROM participant_responses WHERE question_id = ?",
    )
    .bind(question_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(response_from_row).collect())
}

pub async fn responses_for_session(
    pool: &AnyPool,
    session_id: &str,
) -> Result<Vec<ResponseRecord>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id, session_id, participant_id, question_id, answer_id, is_correct, \
                response_time_ms, points_awarded \
         FROM participant_responses WHERE session_id = ?",
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(response_from_row).collect())
}

fn response_from_row(r: sqlx::any::AnyRow) -> ResponseRecord {
    ResponseRecord {
        id: r.get("id"),
        session_id: r.get("session_id"),
        participant_id: r.get("participant_id"),
        question_id: r.get("question_id"),
        answer_id: r.get("answer_id"),
        is_correct: r.get::<i64, _>("is_correct") != 0,
        response_time_ms: r.get("response_time_ms"),
        points_awarded: r.get("points_awarded"),
    }
}
