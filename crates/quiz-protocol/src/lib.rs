// quiz-protocol: wire types shared between the session engine and its
// clients (presenter dashboard, participant app).
//
// Inbound client->server messages use a top-level `type` field for
// discriminated deserialization; outbound server->client messages use the
// same convention so both sides can be matched on a single tag.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Shared sub-types
// ---------------------------------------------------------------------------

/// One answer choice as shown to a participant before reveal.
///
/// `is_correct` is only ever populated on a revealing payload — see
/// `AnswerChoice::for_question` call sites in the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerChoice {
    pub id: String,
    pub text: String,
    pub order: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
}

/// Leaderboard row. Rank is 1-based; ties are broken by `participant_id`
/// ascending so the ordering is deterministic across repeated snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub participant_id: String,
    pub nickname: String,
    pub score: i64,
    pub rank: i64,
}

/// Per-question aggregate shown at reveal time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionStats {
    pub total_responses: i64,
    pub correct_count: i64,
}

/// One participant's outcome for the revealed question. Absent responses
/// are represented explicitly rather than omitted, so clients can render a
/// complete roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerResult {
    pub participant_id: String,
    pub nickname: String,
    pub is_correct: bool,
    pub answer_id: Option<String>,
    pub points_awarded: i64,
}

// ---------------------------------------------------------------------------
// Inbound: Client -> Server
// ---------------------------------------------------------------------------

/// The first message any stream must send, within the auth timeout.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthPresenter {
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthParticipant {
    pub participant_id: String,
    pub token: String,
}

/// Presenter control commands, carried over an authenticated stream.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PresenterCommand {
    StartGame,
    NextQuestion,
    RevealAnswer,
    EndGame,
}

/// The one message type a participant stream may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParticipantCommand {
    SubmitAnswer {
        answer_id: String,
        /// Accepted for schema compatibility with older clients; the
        /// server always recomputes this from its own monotonic clock and
        /// ignores whatever value (if any) is sent here.
        #[serde(default)]
        #[allow(dead_code)]
        response_time: Option<f64>,
    },
}

// ---------------------------------------------------------------------------
// Outbound: Server -> Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    AuthOk,
    GameStarted {
        total_questions: i64,
    },
    NewQuestion {
        question_idx: i64,
        total_questions: i64,
        question_id: String,
        text: String,
        order: i64,
        time_limit: i64,
        image_url: Option<String>,
        answers: Vec<AnswerChoice>,
    },
    AnswerRevealed {
        question_idx: i64,
        question_id: String,
        text: String,
        order: i64,
        time_limit: i64,
        image_url: Option<String>,
        answers: Vec<AnswerChoice>,
        stats: QuestionStats,
        leaderboard: Vec<LeaderboardEntry>,
        player_results: Vec<PlayerResult>,
    },
    GameEnded {
        leaderboard: Vec<LeaderboardEntry>,
    },
    ParticipantJoined {
        participant_id: String,
        nickname: String,
        participant_count: i64,
    },
    ParticipantConnected {
        participant_id: String,
        nickname: String,
        online_count: i64,
    },
    ParticipantDisconnected {
        participant_id: String,
        online_count: i64,
    },
    AnswerSubmitted {
        is_correct: bool,
        points_awarded: i64,
        total_score: i64,
    },
    AnswerReceived {
        answered_count: i64,
        total_participants: i64,
        participant_id: String,
    },
    Error {
        message: String,
    },
}

/// Frozen WebSocket close codes (see engine spec §4.5 / §7).
pub mod close_codes {
    pub const BAD_AUTH: u16 = 4001;
    pub const FORBIDDEN: u16 = 4003;
    pub const NOT_FOUND: u16 = 4004;
    pub const AUTH_TIMEOUT: u16 = 4008;
}

/// Frozen HTTP error envelope used by all non-2xx JSON responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpErrorEnvelope {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_choice_omits_is_correct_when_absent() {
        let choice = AnswerChoice {
            id: "a1".to_owned(),
            text: "Paris".to_owned(),
            order: 0,
            is_correct: None,
        };
        let json = serde_json::to_value(&choice).unwrap();
        assert!(json.get("is_correct").is_none());
    }

    #[test]
    fn answer_choice_includes_is_correct_when_present() {
        let choice = AnswerChoice {
            id: "a1".to_owned(),
            text: "Paris".to_owned(),
            order: 0,
            is_correct: Some(true),
        };
        let json = serde_json::to_value(&choice).unwrap();
        assert_eq!(json["is_correct"], serde_json::json!(true));
    }

    #[test]
    fn presenter_command_tags_round_trip() {
        let json = r#"{"type":"start_game"}"#;
        let cmd: PresenterCommand = serde_json::from_str(json).unwrap();
        assert!(matches!(cmd, PresenterCommand::StartGame));
    }

    #[test]
    fn participant_submit_answer_ignores_client_response_time() {
        let json = r#"{"type":"submit_answer","answer_id":"a1","response_time":999}"#;
        let cmd: ParticipantCommand = serde_json::from_str(json).unwrap();
        match cmd {
            ParticipantCommand::SubmitAnswer { answer_id, .. } => {
                assert_eq!(answer_id, "a1");
            }
        }
    }

    #[test]
    fn server_message_new_question_never_serializes_is_correct() {
        let msg = ServerMessage::NewQuestion {
            question_idx: 0,
            total_questions: 2,
            question_id: "q1".to_owned(),
            text: "2+2?".to_owned(),
            order: 0,
            time_limit: 30,
            image_url: None,
            answers: vec![AnswerChoice {
                id: "a1".to_owned(),
                text: "4".to_owned(),
                order: 0,
                is_correct: None,
            }],
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("is_correct"));
    }
}
