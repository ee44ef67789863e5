//! Stream authentication & dispatch: a single path (`/ws/session/{id}`)
//! serves both presenter and participant connections. Every socket must
//! send its auth frame within `AUTH_TIMEOUT` or is closed with
//! `AUTH_TIMEOUT` (4008); which protocol subset applies is decided by
//! which auth frame shape arrives — `{participant_id, token}` for a
//! participant, `{token}` alone for a presenter. Read half dispatches
//! commands into the session actor, write half drains a private outbound
//! mailbox.

use crate::auth::{hash_token, verify_presenter_token};
use crate::repo;
use crate::session_actor::{SessionCommand, SubscribeRequest, SubscriberRole};
use crate::state::AppState;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use quiz_protocol::{close_codes, AuthParticipant, AuthPresenter, ParticipantCommand, PresenterCommand, ServerMessage};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

const AUTH_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_WS_MESSAGE_BYTES: usize = 4096;
// A hard backstop well above the spec-mandated cap: `axum` would otherwise
// kill the connection outright on an oversized frame before our own check
// gets a chance to reply with an `error` message and keep the stream open.
const WS_HARD_SIZE_LIMIT: usize = 65_536;
const OUTBOUND_MAILBOX_CAPACITY: usize = 64;

pub async fn ws_session(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    ws.max_message_size(WS_HARD_SIZE_LIMIT)
        .on_upgrade(move |socket| handle_session_socket(socket, state, session_id))
}

async fn close_with(socket: &mut WebSocket, code: u16, reason: &str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.to_owned().into(),
        })))
        .await;
}

async fn recv_auth_frame(socket: &mut WebSocket) -> Option<String> {
    match tokio::time::timeout(AUTH_TIMEOUT, socket.recv()).await {
        Ok(Some(Ok(Message::Text(text)))) => Some(text.to_string()),
        _ => None,
    }
}

async fn handle_session_socket(mut socket: WebSocket, state: AppState, session_id: String) {
    let Some(text) = recv_auth_frame(&mut socket).await else {
        close_with(&mut socket, close_codes::AUTH_TIMEOUT, "auth frame not received in time").await;
        return;
    };

    // A participant frame always carries `participant_id`; a presenter
    // frame carries only `token`. Try the more specific shape first so a
    // presenter frame (missing `participant_id`) correctly falls through.
    if let Ok(auth) = serde_json::from_str::<AuthParticipant>(&text) {
        run_participant_socket(socket, state, session_id, auth).await;
        return;
    }
    if let Ok(auth) = serde_json::from_str::<AuthPresenter>(&text) {
        run_presenter_socket(socket, state, session_id, auth).await;
        return;
    }
    close_with(&mut socket, close_codes::BAD_AUTH, "unrecognized auth frame").await;
}

async fn run_presenter_socket(mut socket: WebSocket, state: AppState, session_id: String, auth: AuthPresenter) {
    let Some(claims) = verify_presenter_token(&auth.token, state.config.secret_key.as_str()) else {
        close_with(&mut socket, close_codes::BAD_AUTH, "invalid or expired token").await;
        return;
    };

    let session = match repo::get_session(&state.pool, &session_id).await {
        Ok(Some(s)) => s,
        Ok(None) => {
            close_with(&mut socket, close_codes::NOT_FOUND, "session not found").await;
            return;
        }
        Err(e) => {
            warn!(error = %e, "database error during presenter auth");
            close_with(&mut socket, close_codes::NOT_FOUND, "session lookup failed").await;
            return;
        }
    };
    if session.owner_id != claims.sub {
        close_with(&mut socket, close_codes::FORBIDDEN, "not the session owner").await;
        return;
    }

    let handle = match state.get_or_spawn_session(&session_id).await {
        Ok(h) => h,
        Err(_) => {
            close_with(&mut socket, close_codes::NOT_FOUND, "session could not be started").await;
            return;
        }
    };

    let (sink, mut stream) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_MAILBOX_CAPACITY);
    let writer = tokio::spawn(run_writer(sink, outbound_rx));

    let (reply_tx, reply_rx) = oneshot::channel();
    let _ = handle
        .send(SessionCommand::Subscribe(SubscribeRequest {
            role: SubscriberRole::Presenter,
            outbound: outbound_tx.clone(),
            reply: reply_tx,
        }))
        .await;
    let subscriber_id = match reply_rx.await {
        Ok(Ok(id)) => id,
        _ => {
            writer.abort();
            return;
        }
    };
    let _ = outbound_tx.send(ServerMessage::AuthOk).await;

    info!(session_id = %session_id, presenter_id = %claims.sub, "presenter connected");

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if text.len() > MAX_WS_MESSAGE_BYTES {
                    let _ = outbound_tx
                        .send(ServerMessage::Error {
                            message: "Message too large".to_owned(),
                        })
                        .await;
                    continue;
                }
                let cmd: Result<PresenterCommand, _> = serde_json::from_str(&text);
                match cmd {
                    Ok(cmd) => dispatch_presenter_command(&handle, cmd, &outbound_tx).await,
                    Err(e) => {
                        let _ = outbound_tx
                            .send(ServerMessage::Error {
                                message: format!("invalid message: {e}"),
                            })
                            .await;
                    }
                }
            }
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    let _ = handle.send(SessionCommand::Unsubscribe { subscriber_id }).await;
    writer.abort();
    info!(session_id = %session_id, presenter_id = %claims.sub, "presenter disconnected");
}

async fn dispatch_presenter_command(
    handle: &mpsc::Sender<SessionCommand>,
    cmd: PresenterCommand,
    outbound: &mpsc::Sender<ServerMessage>,
) {
    let (reply_tx, reply_rx) = oneshot::channel();
    let sent = match cmd {
        PresenterCommand::StartGame => handle.send(SessionCommand::StartGame { reply: reply_tx }).await,
        PresenterCommand::NextQuestion => {
            handle.send(SessionCommand::NextQuestion { reply: reply_tx }).await
        }
        PresenterCommand::RevealAnswer => {
            handle.send(SessionCommand::RevealAnswer { reply: reply_tx }).await
        }
        PresenterCommand::EndGame => handle.send(SessionCommand::EndGame { reply: reply_tx }).await,
    };
    if sent.is_err() {
        return;
    }
    if let Ok(Err(err)) = reply_rx.await {
        let _ = outbound
            .send(ServerMessage::Error {
                message: err.to_string(),
            })
            .await;
    }
}

async fn run_participant_socket(
    mut socket: WebSocket,
    state: AppState,
    session_id: String,
    auth: AuthParticipant,
) {
    let token_hash = hash_token(&auth.token);
    let participant = match repo::get_participant_by_token_hash(&state.pool, &auth.participant_id, &token_hash)
        .await
    {
        Ok(Some(p)) => p,
        Ok(None) => {
            close_with(&mut socket, close_codes::BAD_AUTH, "invalid participant token").await;
            return;
        }
        Err(e) => {
            warn!(error = %e, "database error during participant auth");
            close_with(&mut socket, close_codes::BAD_AUTH, "participant lookup failed").await;
            return;
        }
    };
    if participant.session_id != session_id {
        close_with(&mut socket, close_codes::FORBIDDEN, "token is not valid for this session").await;
        return;
    }

    let handle = match state.get_or_spawn_session(&session_id).await {
        Ok(h) => h,
        Err(_) => {
            close_with(&mut socket, close_codes::NOT_FOUND, "session not found").await;
            return;
        }
    };

    let (sink, mut stream) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_MAILBOX_CAPACITY);
    let writer = tokio::spawn(run_writer(sink, outbound_rx));

    let (reply_tx, reply_rx) = oneshot::channel();
    let _ = handle
        .send(SessionCommand::Subscribe(SubscribeRequest {
            role: SubscriberRole::Participant {
                participant_id: participant.id.clone(),
                nickname: participant.nickname.clone(),
            },
            outbound: outbound_tx.clone(),
            reply: reply_tx,
        }))
        .await;
    let subscriber_id = match reply_rx.await {
        Ok(Ok(id)) => id,
        _ => {
            writer.abort();
            return;
        }
    };
    let _ = outbound_tx.send(ServerMessage::AuthOk).await;

    info!(session_id = %session_id, participant_id = %participant.id, "participant connected");

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if text.len() > MAX_WS_MESSAGE_BYTES {
                    let _ = outbound_tx
                        .send(ServerMessage::Error {
                            message: "Message too large".to_owned(),
                        })
                        .await;
                    continue;
                }
                let cmd: Result<ParticipantCommand, _> = serde_json::from_str(&text);
                match cmd {
                    Ok(ParticipantCommand::SubmitAnswer { answer_id, .. }) => {
                        let (reply_tx, reply_rx) = oneshot::channel();
                        if handle
                            .send(SessionCommand::SubmitAnswer {
                                participant_id: participant.id.clone(),
                                answer_id,
                                reply: reply_tx,
                            })
                            .await
                            .is_err()
                        {
                            break;
                        }
                        if let Ok(Err(err)) = reply_rx.await {
                            let _ = outbound_tx
                                .send(ServerMessage::Error {
                                    message: err.to_string(),
                                })
                                .await;
                        }
                    }
                    Err(e) => {
                        let _ = outbound_tx
                            .send(ServerMessage::Error {
                                message: format!("invalid message: {e}"),
                            })
                            .await;
                    }
                }
            }
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    let _ = handle.send(SessionCommand::Unsubscribe { subscriber_id }).await;
    writer.abort();
    info!(session_id = %session_id, participant_id = %participant.id, "participant disconnected");
}

async fn run_writer(
    mut sink: futures_util::stream::SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<ServerMessage>,
) {
    while let Some(msg) = outbound_rx.recv().await {
        let Ok(json) = serde_json::to_string(&msg) else {
            continue;
        };
        if sink.send(Message::Text(json.into())).await.is_err() {
            break;
        }
    }
}
