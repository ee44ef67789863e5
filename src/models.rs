//! Domain types shared between the repository layer, the session actor,
//! and the HTTP handlers.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Lobby,
    Active,
    Revealing,
    Finished,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Lobby => "lobby",
            SessionStatus::Active => "active",
            SessionStatus::Revealing => "revealing",
            SessionStatus::Finished => "finished",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "lobby" => Some(SessionStatus::Lobby),
            "active" => Some(SessionStatus::Active),
            "revealing" => Some(SessionStatus::Revealing),
            "finished" => Some(SessionStatus::Finished),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub id: String,
    pub question_id: String,
    pub text: String,
    pub order: i64,
    pub is_correct: bool,
}

#[derive(Debug, Clone)]
pub struct Question {
    pub id: String,
    pub quiz_id: String,
    pub text: String,
    pub order: i64,
    pub time_limit: i64,
    pub image_url: Option<String>,
    pub answers: Vec<Answer>,
}

#[derive(Debug, Clone)]
pub struct Quiz {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub quiz_id: String,
    pub owner_id: String,
    pub join_code: String,
    pub status: SessionStatus,
    pub current_question_idx: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Participant {
    pub id: String,
    pub session_id: String,
    pub nickname: String,
    pub score: i64,
    pub joined_at: String,
}

#[derive(Debug, Clone)]
pub struct ResponseRecord {
    pub id: String,
    pub session_id: String,
    pub participant_id: String,
    pub question_id: String,
    pub answer_id: Option<String>,
    pub is_correct: bool,
    pub response_time_ms: i64,
    pub points_awarded: i64,
}
