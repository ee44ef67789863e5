//! The per-session actor: a single task owns everything mutable about one
//! live quiz session, driven by a command mailbox. The actor itself is the
//! mutual-exclusion primitive — there is no lock to reason about across
//! `.await` points, matching the redesign direction in the engine design
//! notes. Fan-out to each subscriber goes through that subscriber's own
//! outbound mailbox, so one slow or dead client can't block the actor or
//! reorder another client's messages.

use crate::auth::{generate_participant_token, hash_token};
use crate::error::EngineError;
use crate::models::{Quiz, Session, SessionStatus};
use crate::repo;
use quiz_protocol::{AnswerChoice, LeaderboardEntry, PlayerResult, QuestionStats, ServerMessage};
use sqlx::AnyPool;
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};
use uuid::Uuid;

pub type SessionHandle = mpsc::Sender<SessionCommand>;

#[derive(Debug, Clone)]
pub enum SubscriberRole {
    Presenter,
    Participant {
        participant_id: String,
        nickname: String,
    },
}

pub struct SubscribeRequest {
    pub role: SubscriberRole,
    pub outbound: mpsc::Sender<ServerMessage>,
    pub reply: oneshot::Sender<Result<Uuid, EngineError>>,
}

pub enum SessionCommand {
    Subscribe(SubscribeRequest),
    Unsubscribe {
        subscriber_id: Uuid,
    },
    StartGame {
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    NextQuestion {
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    RevealAnswer {
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    EndGame {
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    ForceFinish {
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    SubmitAnswer {
        participant_id: String,
        answer_id: String,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    JoinParticipant {
        nickname: String,
        reply: oneshot::Sender<Result<JoinOutcome, EngineError>>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
}

/// Result of routing a join through the session actor (spec §4.4) — the
/// actor is the serialization point for joins against the same session, so
/// two concurrent joins with the same nickname can't both observe "free".
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub participant_id: String,
    pub token: String,
    pub rejoined: bool,
}

#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub current_question_idx: i64,
    pub total_questions: i64,
    pub online_participants: i64,
}

struct Subscriber {
    role: SubscriberRole,
    outbound: mpsc::Sender<ServerMessage>,
}

struct Actor {
    pool: AnyPool,
    session: Session,
    quiz: Quiz,
    subscribers: HashMap<Uuid, Subscriber>,
    question_started_at: Option<Instant>,
}

/// Scoring formula: full marks decay linearly to zero as the response
/// approaches the time limit; an incorrect answer always scores zero. Must
/// be computed in floating point and truncated toward zero, not rounded —
/// `ratio=0.625` at `tl=8` gives `812.5`, which awards 812, not 813.
pub fn score_answer(is_correct: bool, response_time_ms: i64, time_limit_secs: i64) -> i64 {
    if !is_correct || time_limit_secs <= 0 {
        return 0;
    }
    let response_time_secs = response_time_ms as f64 / 1000.0;
    let time_ratio = (1.0 - response_time_secs / time_limit_secs as f64).max(0.0);
    (500.0 + 500.0 * time_ratio).floor() as i64
}

pub fn spawn(pool: AnyPool, session: Session, quiz: Quiz) -> SessionHandle {
    let (tx, mut rx) = mpsc::channel::<SessionCommand>(256);
    let session_id = session.id.clone();
    let mut actor = Actor {
        pool,
        session,
        quiz,
        subscribers: HashMap::new(),
        question_started_at: None,
    };
    tokio::spawn(async move {
        while let Some(cmd) = rx.recv().await {
            actor.handle(cmd).await;
        }
        info!(session_id = %session_id, "session actor shut down");
    });
    tx
}

impl Actor {
    async fn handle(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Subscribe(req) => self.on_subscribe(req).await,
            SessionCommand::Unsubscribe { subscriber_id } => self.on_unsubscribe(subscriber_id).await,
            SessionCommand::StartGame { reply } => {
                let _ = reply.send(self.on_start_game().await);
            }
            SessionCommand::NextQuestion { reply } => {
                let _ = reply.send(self.on_next_question().await);
            }
            SessionCommand::RevealAnswer { reply } => {
                let _ = reply.send(self.on_reveal_answer().await);
            }
            SessionCommand::EndGame { reply } => {
                let _ = reply.send(self.on_end_game().await);
            }
            SessionCommand::ForceFinish { reply } => {
                let _ = reply.send(self.on_end_game().await);
            }
            SessionCommand::SubmitAnswer {
                participant_id,
                answer_id,
                reply,
            } => {
                let _ = reply.send(self.on_submit_answer(participant_id, answer_id).await);
            }
            SessionCommand::JoinParticipant { nickname, reply } => {
                let _ = reply.send(self.on_join_participant(nickname).await);
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.session.status,
            current_question_idx: self.session.current_question_idx,
            total_questions: self.quiz.questions.len() as i64,
            online_participants: self
                .subscribers
                .values()
                .filter(|s| matches!(s.role, SubscriberRole::Participant { .. }))
                .count() as i64,
        }
    }

    async fn on_subscribe(&mut self, req: SubscribeRequest) {
        let subscriber_id = Uuid::new_v4();
        let online_count = self
            .subscribers
            .values()
            .filter(|s| matches!(s.role, SubscriberRole::Participant { .. }))
            .count() as i64
            + if matches!(req.role, SubscriberRole::Participant { .. }) {
                1
            } else {
                0
            };

        if let SubscriberRole::Participant {
            participant_id,
            nickname,
        } = &req.role
        {
            self.broadcast_presenter(ServerMessage::ParticipantConnected {
                participant_id: participant_id.clone(),
                nickname: nickname.clone(),
                online_count,
            });
        }

        self.send_late_join_sync(&req.role, &req.outbound).await;

        self.subscribers.insert(
            subscriber_id,
            Subscriber {
                role: req.role,
                outbound: req.outbound,
            },
        );
        let _ = req.reply.send(Ok(subscriber_id));
    }

    async fn on_unsubscribe(&mut self, subscriber_id: Uuid) {
        if let Some(sub) = self.subscribers.remove(&subscriber_id) {
            if let SubscriberRole::Participant { participant_id, .. } = sub.role {
                let online_count = self
                    .subscribers
                    .values()
                    .filter(|s| matches!(s.role, SubscriberRole::Participant { .. }))
                    .count() as i64;
                self.broadcast_presenter(ServerMessage::ParticipantDisconnected {
                    participant_id,
                    online_count,
                });
            }
        }
    }

    async fn send_late_join_sync(&self, role: &SubscriberRole, outbound: &mpsc::Sender<ServerMessage>) {
        match self.session.status {
            SessionStatus::Lobby => {}
            SessionStatus::Active | SessionStatus::Revealing => {
                if let Some(question) = self.current_question() {
                    let msg = self.new_question_message(question);
                    let _ = outbound.send(msg).await;
                    if self.session.status == SessionStatus::Revealing {
                        if let Ok(reveal) = self.build_reveal_message(question).await {
                            let _ = outbound.send(reveal).await;
                        }
                    }
                }
            }
            SessionStatus::Finished => {
                if let Ok(leaderboard) = self.build_leaderboard().await {
                    let _ = outbound.send(ServerMessage::GameEnded { leaderboard }).await;
                }
            }
        }
        let _ = role;
    }

    fn current_question(&self) -> Option<&crate::models::Question> {
        let idx = self.session.current_question_idx;
        if idx < 0 {
            return None;
        }
        self.quiz.questions.get(idx as usize)
    }

    fn new_question_message(&self, question: &crate::models::Question) -> ServerMessage {
        let mut answers: Vec<AnswerChoice> = question
            .answers
            .iter()
            .map(|a| AnswerChoice {
                id: a.id.clone(),
                text: a.text.clone(),
                order: a.order,
                is_correct: None,
            })
            .collect();
        answers.sort_by_key(|a| a.order);
        ServerMessage::NewQuestion {
            question_idx: self.session.current_question_idx,
            total_questions: self.quiz.questions.len() as i64,
            question_id: question.id.clone(),
            text: question.text.clone(),
            order: question.order,
            time_limit: question.time_limit,
            image_url: question.image_url.clone(),
            answers,
        }
    }

    async fn on_start_game(&mut self) -> Result<(), EngineError> {
        if self.session.status != SessionStatus::Lobby {
            return Err(EngineError::Conflict("session is not in lobby".to_owned()));
        }
        if self.quiz.questions.is_empty() {
            return Err(EngineError::Validation("quiz has no questions".to_owned()));
        }
        self.session.status = SessionStatus::Active;
        self.session.current_question_idx = 0;
        self.question_started_at = Some(Instant::now());
        repo::update_session_progress(&self.pool, &self.session.id, self.session.status, 0).await?;

        let total = self.quiz.questions.len() as i64;
        self.broadcast_all(ServerMessage::GameStarted {
            total_questions: total,
        });
        let question = self.quiz.questions[0].clone();
        self.broadcast_all(self.new_question_message(&question));
        Ok(())
    }

    async fn on_next_question(&mut self) -> Result<(), EngineError> {
        if !matches!(self.session.status, SessionStatus::Active | SessionStatus::Revealing) {
            return Err(EngineError::Conflict("session is not active".to_owned()));
        }
        let next_idx = self.session.current_question_idx + 1;
        if next_idx as usize >= self.quiz.questions.len() {
            return Err(EngineError::Conflict(
                "no more questions; end the game instead".to_owned(),
            ));
        }
        self.session.current_question_idx = next_idx;
        self.session.status = SessionStatus::Active;
        self.question_started_at = Some(Instant::now());
        repo::update_session_progress(&self.pool, &self.session.id, self.session.status, next_idx)
            .await?;
        let question = self.quiz.questions[next_idx as usize].clone();
        self.broadcast_all(self.new_question_message(&question));
        Ok(())
    }

    async fn on_reveal_answer(&mut self) -> Result<(), EngineError> {
        if !matches!(self.session.status, SessionStatus::Active | SessionStatus::Revealing) {
            return Err(EngineError::Conflict("session is not active".to_owned()));
        }
        let question = self
            .current_question()
            .ok_or_else(|| EngineError::Conflict("no current question".to_owned()))?
            .clone();
        self.session.status = SessionStatus::Revealing;
        repo::update_session_progress(
            &self.pool,
            &self.session.id,
            self.session.status,
            self.session.current_question_idx,
        )
        .await?;
        let msg = self.build_reveal_message(&question).await?;
        self.broadcast_all(msg);
        Ok(())
    }

    async fn build_reveal_message(
        &self,
        question: &crate::models::Question,
    ) -> Result<ServerMessage, EngineError> {
        let responses = repo::responses_for_question(&self.pool, &question.id).await?;
        let participants = repo::list_participants(&self.pool, &self.session.id).await?;

        let total_responses = responses.len() as i64;
        let correct_count = responses.iter().filter(|r| r.is_correct).count() as i64;

        let mut answers: Vec<AnswerChoice> = question
            .answers
            .iter()
            .map(|a| AnswerChoice {
                id: a.id.clone(),
                text: a.text.clone(),
                order: a.order,
                is_correct: Some(a.is_correct),
            })
            .collect();
        answers.sort_by_key(|a| a.order);

        let mut player_results = Vec::with_capacity(participants.len());
        for p in &participants {
            if let Some(r) = responses.iter().find(|r| r.participant_id == p.id) {
                player_results.push(PlayerResult {
                    participant_id: p.id.clone(),
                    nickname: p.nickname.clone(),
                    is_correct: r.is_correct,
                    answer_id: r.answer_id.clone(),
                    points_awarded: r.points_awarded,
                });
            } else {
                player_results.push(PlayerResult {
                    participant_id: p.id.clone(),
                    nickname: p.nickname.clone(),
                    is_correct: false,
                    answer_id: None,
                    points_awarded: 0,
                });
            }
        }

        let leaderboard = build_leaderboard_from(&participants);

        Ok(ServerMessage::AnswerRevealed {
            question_idx: self.session.current_question_idx,
            question_id: question.id.clone(),
            text: question.text.clone(),
            order: question.order,
            time_limit: question.time_limit,
            image_url: question.image_url.clone(),
            answers,
            stats: QuestionStats {
                total_responses,
                correct_count,
            },
            leaderboard,
            player_results,
        })
    }

    async fn build_leaderboard(&self) -> Result<Vec<LeaderboardEntry>, EngineError> {
        let participants = repo::list_participants(&self.pool, &self.session.id).await?;
        Ok(build_leaderboard_from(&participants))
    }

    async fn on_end_game(&mut self) -> Result<(), EngineError> {
        if self.session.status == SessionStatus::Finished {
            return Err(EngineError::Conflict("session already finished".to_owned()));
        }
        self.session.status = SessionStatus::Finished;
        repo::update_session_progress(
            &self.pool,
            &self.session.id,
            self.session.status,
            self.session.current_question_idx,
        )
        .await?;
        let leaderboard = self.build_leaderboard().await?;
        self.broadcast_all(ServerMessage::GameEnded { leaderboard });
        Ok(())
    }

    async fn on_submit_answer(
        &mut self,
        participant_id: String,
        answer_id: String,
    ) -> Result<(), EngineError> {
        if self.session.status != SessionStatus::Active {
            return Err(EngineError::Conflict(
                "no question is currently open for answers".to_owned(),
            ));
        }
        let question = self
            .current_question()
            .ok_or_else(|| EngineError::Conflict("no current question".to_owned()))?
            .clone();

        if !question.answers.iter().any(|a| a.id == answer_id) {
            return Err(EngineError::Validation(
                "answer does not belong to the current question".to_owned(),
            ));
        }

        if repo::has_responded(&self.pool, &participant_id, &question.id).await? {
            // Silent drop per the late-submission rule: the client already
            // has its own submitted confirmation, nothing more to send.
            return Ok(());
        }

        let started_at = self.question_started_at.unwrap_or_else(Instant::now);
        let raw_response_time_ms = started_at.elapsed().as_millis() as i64;
        let max_response_time_ms = question.time_limit.max(0) * 1000;
        let response_time_ms = raw_response_time_ms.clamp(0, max_response_time_ms);
        let is_correct = question
            .answers
            .iter()
            .find(|a| a.id == answer_id)
            .map(|a| a.is_correct)
            .unwrap_or(false);
        let points = score_answer(is_correct, response_time_ms, question.time_limit);

        match repo::record_response(
            &self.pool,
            &Uuid::new_v4().to_string(),
            &self.session.id,
            &participant_id,
            &question.id,
            Some(&answer_id),
            is_correct,
            response_time_ms,
            points,
        )
        .await
        {
            Ok(()) => {}
            Err(e) if e.as_database_error().map(|d| d.is_unique_violation()).unwrap_or(false) => {
                // Already answered this question; the participant already has
                // their own confirmation from the first submission.
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
        if points > 0 {
            repo::add_to_score(&self.pool, &participant_id, points).await?;
        }

        let total_score = repo::list_participants(&self.pool, &self.session.id)
            .await?
            .into_iter()
            .find(|p| p.id == participant_id)
            .map(|p| p.score)
            .unwrap_or(0);

        if let Some(sub) = self.find_participant_subscriber(&participant_id) {
            let _ = sub
                .send(ServerMessage::AnswerSubmitted {
                    is_correct,
                    points_awarded: points,
                    total_score,
                })
                .await;
        }

        let answered_count = repo::responses_for_question(&self.pool, &question.id)
            .await?
            .len() as i64;
        let total_participants = repo::list_participants(&self.pool, &self.session.id)
            .await?
            .len() as i64;
        self.broadcast_presenter(ServerMessage::AnswerReceived {
            answered_count,
            total_participants,
            participant_id,
        });

        Ok(())
    }

    /// Join Controller: routed through the actor mailbox so two concurrent
    /// joins with the same nickname against the same session are serialized
    /// by the actor instead of racing each other's read-then-insert.
    async fn on_join_participant(&mut self, nickname: String) -> Result<JoinOutcome, EngineError> {
        if self.session.status == SessionStatus::Finished {
            return Err(EngineError::Conflict(
                "session has finished and is no longer accepting joins".to_owned(),
            ));
        }

        if let Some(existing) =
            repo::get_participant_by_session_and_nickname(&self.pool, &self.session.id, &nickname).await?
        {
            return match self.session.status {
                SessionStatus::Active | SessionStatus::Revealing => {
                    let raw_token = generate_participant_token();
                    let token_hash = hash_token(&raw_token);
                    repo::update_participant_token_hash(&self.pool, &existing.id, &token_hash).await?;
                    Ok(JoinOutcome {
                        participant_id: existing.id,
                        token: raw_token,
                        rejoined: true,
                    })
                }
                _ => Err(EngineError::Conflict(
                    "that nickname is already taken in this session".to_owned(),
                )),
            };
        }

        if matches!(self.session.status, SessionStatus::Active | SessionStatus::Revealing) {
            return Err(EngineError::Conflict(
                "session has already started and is no longer accepting joins".to_owned(),
            ));
        }

        let participant_id = Uuid::new_v4().to_string();
        let raw_token = generate_participant_token();
        let token_hash = hash_token(&raw_token);
        let joined_at = chrono::Utc::now().to_rfc3339();
        match repo::create_participant(
            &self.pool,
            &participant_id,
            &self.session.id,
            &nickname,
            &token_hash,
            &joined_at,
        )
        .await
        {
            Ok(()) => {}
            Err(e) if e.as_database_error().map(|d| d.is_unique_violation()).unwrap_or(false) => {
                return Err(EngineError::Conflict(
                    "that nickname is already taken in this session".to_owned(),
                ));
            }
            Err(e) => return Err(e.into()),
        }

        let participant_count = repo::count_participants(&self.pool, &self.session.id).await?;
        self.broadcast_presenter(ServerMessage::ParticipantJoined {
            participant_id: participant_id.clone(),
            nickname,
            participant_count,
        });

        Ok(JoinOutcome {
            participant_id,
            token: raw_token,
            rejoined: false,
        })
    }

    fn find_participant_subscriber(&self, participant_id: &str) -> Option<&mpsc::Sender<ServerMessage>> {
        self.subscribers.values().find_map(|s| match &s.role {
            SubscriberRole::Participant { participant_id: pid, .. } if pid == participant_id => {
                Some(&s.outbound)
            }
            _ => None,
        })
    }

    fn broadcast_all(&self, msg: ServerMessage) {
        for sub in self.subscribers.values() {
            let tx = sub.outbound.clone();
            let msg = msg.clone();
            tokio::spawn(async move {
                let _ = tx.send(msg).await;
            });
        }
    }

    fn broadcast_presenter(&self, msg: ServerMessage) {
        for sub in self.subscribers.values() {
            if matches!(sub.role, SubscriberRole::Presenter) {
                let tx = sub.outbound.clone();
                let msg = msg.clone();
                tokio::spawn(async move {
                    let _ = tx.send(msg).await;
                });
                return;
            }
        }
        warn!("no presenter subscribed to receive progress update");
    }
}

pub(crate) fn build_leaderboard_from(participants: &[crate::models::Participant]) -> Vec<LeaderboardEntry> {
    let mut ordered: Vec<_> = participants.to_vec();
    ordered.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    ordered
        .into_iter()
        .enumerate()
        .map(|(i, p)| LeaderboardEntry {
            participant_id: p.id,
            nickname: p.nickname,
            score: p.score,
            rank: i as i64 + 1,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_answer_awards_zero_for_incorrect() {
        assert_eq!(score_answer(false, 1_000, 30), 0);
    }

    #[test]
    fn score_answer_awards_full_marks_for_instant_correct_answer() {
        assert_eq!(score_answer(true, 0, 30), 1000);
    }

    #[test]
    fn score_answer_decays_toward_half_marks_near_the_time_limit() {
        let points = score_answer(true, 30_000, 30);
        assert_eq!(points, 500);
    }

    #[test]
    fn score_answer_never_goes_negative_past_the_limit() {
        let points = score_answer(true, 60_000, 30);
        assert_eq!(points, 500);
    }

    #[test]
    fn score_answer_truncates_instead_of_rounding() {
        // ratio = 0.625, 500 + 500*0.625 = 812.5 -> floors to 812, not 813.
        let points = score_answer(true, 3_000, 8);
        assert_eq!(points, 812);
    }

    #[test]
    fn leaderboard_breaks_ties_by_participant_id() {
        let participants = vec![
            crate::models::Participant {
                id: "b".to_owned(),
                session_id: "s".to_owned(),
                nickname: "Bob".to_owned(),
                score: 100,
                joined_at: "t".to_owned(),
            },
            crate::models::Participant {
                id: "a".to_owned(),
                session_id: "s".to_owned(),
                nickname: "Alice".to_owned(),
                score: 100,
                joined_at: "t".to_owned(),
            },
        ];
        let board = build_leaderboard_from(&participants);
        assert_eq!(board[0].participant_id, "a");
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[1].participant_id, "b");
        assert_eq!(board[1].rank, 2);
    }

    #[test]
    fn leaderboard_orders_by_score_descending() {
        let participants = vec![
            crate::models::Participant {
                id: "a".to_owned(),
                session_id: "s".to_owned(),
                nickname: "Alice".to_owned(),
                score: 50,
                joined_at: "t".to_owned(),
            },
            crate::models::Participant {
                id: "b".to_owned(),
                session_id: "s".to_owned(),
                nickname: "Bob".to_owned(),
                score: 900,
                joined_at: "t".to_owned(),
            },
        ];
        let board = build_leaderboard_from(&participants);
        assert_eq!(board[0].participant_id, "b");
        assert_eq!(board[1].participant_id, "a");
    }
}
