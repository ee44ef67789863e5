//! End-to-end tests for the unified `/ws/session/{id}` stream: a presenter
//! and a participant authenticate over the same path (spec §6.2), the
//! presenter drives the game forward, and the participant answers.
//! Grounded on the teacher's own `tokio_tungstenite::connect_async`
//! in-process server pattern (`services/receiver/tests/ws_connect_auth.rs`).

use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{encode, EncodingKey, Header};
use quizforge::state::{AppState, Config};
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::any::{install_default_drivers, AnyPoolOptions};
use sqlx::AnyPool;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

const SECRET: &str = "ws-test-secret";

#[derive(Serialize)]
struct PresenterClaims {
    sub: String,
    exp: usize,
}

fn presenter_token(sub: &str) -> String {
    encode(
        &Header::default(),
        &PresenterClaims {
            sub: sub.to_owned(),
            exp: 9_999_999_999,
        },
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

async fn make_server() -> (SocketAddr, AnyPool) {
    install_default_drivers();
    let pool = AnyPoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    let config = Config {
        secret_key: Arc::new(SECRET.to_owned()),
        base_url: Arc::new("http://localhost:8080".to_owned()),
        registration_enabled: true,
        allowed_origins: Arc::new(Vec::new()),
        host_lan_ip: Arc::new(None),
    };
    let state = AppState::new(pool.clone(), config);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, quizforge::build_router(state)).await.unwrap();
    });
    (addr, pool)
}

async fn seed_quiz(pool: &AnyPool, owner_id: &str) -> (String, String, String) {
    let quiz_id = "quiz-1".to_owned();
    sqlx::query("INSERT INTO quizzes (id, owner_id, title) VALUES (?, ?, 'Capitals')")
        .bind(&quiz_id)
        .bind(owner_id)
        .execute(pool)
        .await
        .unwrap();
    let question_id = "q-1".to_owned();
    sqlx::query(
        "INSERT INTO questions (id, quiz_id, text, order_idx, time_limit, image_url) \
         VALUES (?, ?, 'Capital of France?', 0, 30, NULL)",
    )
    .bind(&question_id)
    .bind(&quiz_id)
    .execute(pool)
    .await
    .unwrap();
    let correct_id = "a-correct".to_owned();
    sqlx::query("INSERT INTO answers (id, question_id, text, order_idx, is_correct) VALUES (?, ?, 'Paris', 0, 1)")
        .bind(&correct_id)
        .bind(&question_id)
        .execute(pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO answers (id, question_id, text, order_idx, is_correct) VALUES ('a-wrong', ?, 'Rome', 1, 0)")
        .bind(&question_id)
        .execute(pool)
        .await
        .unwrap();
    (quiz_id, question_id, correct_id)
}

async fn create_session(client: &reqwest::Client, addr: SocketAddr, token: &str, quiz_id: &str) -> Value {
    client
        .post(format!("http://{addr}/api/sessions"))
        .bearer_auth(token)
        .json(&json!({ "quiz_id": quiz_id }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

async fn join(client: &reqwest::Client, addr: SocketAddr, code: &str, nickname: &str) -> Value {
    client
        .post(format!("http://{addr}/api/sessions/join"))
        .json(&json!({ "code": code, "nickname": nickname }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

async fn recv_json(socket: &mut tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>) -> Value {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match socket.next().await.unwrap().unwrap() {
                Message::Text(text) => return serde_json::from_str(&text).unwrap(),
                _ => continue,
            }
        }
    })
    .await
    .expect("server should respond within the timeout")
}

#[tokio::test]
async fn presenter_runs_a_full_game_and_the_participant_scores() {
    let (addr, pool) = make_server().await;
    let (quiz_id, _question_id, correct_id) = seed_quiz(&pool, "owner-1").await;
    let presenter_jwt = presenter_token("owner-1");
    let client = reqwest::Client::new();

    let session = create_session(&client, addr, &presenter_jwt, &quiz_id).await;
    let session_id = session["id"].as_str().unwrap().to_owned();
    let code = session["join_code"].as_str().unwrap().to_owned();

    let joined = join(&client, addr, &code, "Ada").await;
    let participant_id = joined["participant_id"].as_str().unwrap().to_owned();
    let participant_token = joined["token"].as_str().unwrap().to_owned();

    let ws_url = format!("ws://{addr}/ws/session/{session_id}");

    let (mut presenter_ws, _) = tokio_tungstenite::connect_async(&ws_url).await.unwrap();
    presenter_ws
        .send(Message::Text(json!({ "token": presenter_jwt }).to_string().into()))
        .await
        .unwrap();
    assert_eq!(recv_json(&mut presenter_ws).await["type"], "auth_ok");

    let (mut participant_ws, _) = tokio_tungstenite::connect_async(&ws_url).await.unwrap();
    participant_ws
        .send(Message::Text(
            json!({ "participant_id": participant_id, "token": participant_token })
                .to_string()
                .into(),
        ))
        .await
        .unwrap();
    assert_eq!(recv_json(&mut participant_ws).await["type"], "auth_ok");

    // the presenter is notified that a participant connected
    assert_eq!(recv_json(&mut presenter_ws).await["type"], "participant_connected");

    presenter_ws
        .send(Message::Text(json!({ "type": "start_game" }).to_string().into()))
        .await
        .unwrap();
    assert_eq!(recv_json(&mut presenter_ws).await["type"], "game_started");
    assert_eq!(recv_json(&mut presenter_ws).await["type"], "new_question");
    assert_eq!(recv_json(&mut participant_ws).await["type"], "new_question");

    participant_ws
        .send(
            Message::Text(
                json!({ "type": "submit_answer", "answer_id": correct_id })
                    .to_string()
                    .into(),
            ),
        )
        .await
        .unwrap();
    let submitted = recv_json(&mut participant_ws).await;
    assert_eq!(submitted["type"], "answer_submitted");
    assert_eq!(submitted["is_correct"], true);
    assert!(submitted["points_awarded"].as_i64().unwrap() > 0);

    assert_eq!(recv_json(&mut presenter_ws).await["type"], "answer_received");

    presenter_ws
        .send(Message::Text(json!({ "type": "reveal_answer" }).to_string().into()))
        .await
        .unwrap();
    let revealed = recv_json(&mut presenter_ws).await;
    assert_eq!(revealed["type"], "answer_revealed");
    assert_eq!(revealed["leaderboard"][0]["nickname"], "Ada");
    let participant_revealed = recv_json(&mut participant_ws).await;
    assert_eq!(participant_revealed["type"], "answer_revealed");

    presenter_ws
        .send(Message::Text(json!({ "type": "end_game" }).to_string().into()))
        .await
        .unwrap();
    let ended = recv_json(&mut presenter_ws).await;
    assert_eq!(ended["type"], "game_ended");
    assert!(ended["leaderboard"][0]["score"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn a_stale_presenter_token_is_rejected_with_the_bad_auth_close_code() {
    let (addr, pool) = make_server().await;
    let (quiz_id, ..) = seed_quiz(&pool, "owner-1").await;
    let presenter_jwt = presenter_token("owner-1");
    let client = reqwest::Client::new();
    let session = create_session(&client, addr, &presenter_jwt, &quiz_id).await;
    let session_id = session["id"].as_str().unwrap();

    let ws_url = format!("ws://{addr}/ws/session/{session_id}");
    let (mut ws, _) = tokio_tungstenite::connect_async(&ws_url).await.unwrap();
    ws.send(Message::Text(json!({ "token": "garbage-not-a-jwt" }).to_string().into()))
        .await
        .unwrap();

    let close = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match close {
        Message::Close(Some(frame)) => assert_eq!(frame.code, tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode::Library(4001)),
        other => panic!("expected a close frame, got {other:?}"),
    }
}

#[tokio::test]
async fn a_participant_token_scoped_to_another_session_is_forbidden() {
    let (addr, pool) = make_server().await;
    let (quiz_id, ..) = seed_quiz(&pool, "owner-1").await;
    let presenter_jwt = presenter_token("owner-1");
    let client = reqwest::Client::new();

    let session_a = create_session(&client, addr, &presenter_jwt, &quiz_id).await;
    let session_b = create_session(&client, addr, &presenter_jwt, &quiz_id).await;
    let code_a = session_a["join_code"].as_str().unwrap();
    let session_b_id = session_b["id"].as_str().unwrap();

    let joined = join(&client, addr, code_a, "Ada").await;
    let participant_id = joined["participant_id"].as_str().unwrap();
    let participant_token = joined["token"].as_str().unwrap();

    let ws_url = format!("ws://{addr}/ws/session/{session_b_id}");
    let (mut ws, _) = tokio_tungstenite::connect_async(&ws_url).await.unwrap();
    ws.send(Message::Text(
        json!({ "participant_id": participant_id, "token": participant_token })
            .to_string()
            .into(),
    ))
    .await
    .unwrap();

    let close = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match close {
        Message::Close(Some(frame)) => assert_eq!(frame.code, tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode::Library(4003)),
        other => panic!("expected a close frame, got {other:?}"),
    }
}
