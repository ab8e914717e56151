//! Integration tests for the HTTP surface.
//!
//! Requests go through the full router with a scripted completion transport,
//! so the retry loop, the orchestrator and the SQLite stores all run for real.

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use medisage_core::{APOLOGY, AttemptError, CompletionTransport};
use medisage_server::{
    config::{CompletionConfig, Config},
    routes,
    state::AppState,
};
use medisage_types::{CompletionRequest, CompletionResponse};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;

type Reply = Result<CompletionResponse, AttemptError>;

/// Plays back canned replies in order; rejects once the script runs out.
struct ScriptedTransport {
    script: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedTransport {
    fn new(script: Vec<Reply>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionTransport for ScriptedTransport {
    async fn send(&self, request: &CompletionRequest) -> Reply {
        self.requests.lock().unwrap().push(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AttemptError::Fatal("script exhausted".to_string())))
    }
}

fn reply(text: &str) -> Reply {
    Ok(serde_json::from_value(json!({
        "choices": [{"message": {"role": "assistant", "content": text}}]
    }))
    .unwrap())
}

fn unavailable() -> Reply {
    Err(AttemptError::Retryable("HTTP 503: Service Unavailable".to_string()))
}

struct TestApp {
    router: Router,
    transport: Arc<ScriptedTransport>,
    _tmp: TempDir,
}

fn create_test_app(script: Vec<Reply>) -> TestApp {
    let tmp = TempDir::new().unwrap();
    let config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        db_path: tmp.path().join("test.db"),
        completion: CompletionConfig {
            base_delay_ms: 1,
            max_delay_ms: 5,
            deadline_secs: 5,
            ..CompletionConfig::default()
        },
        ..Config::default()
    };

    let transport = Arc::new(ScriptedTransport::new(script));
    let state = Arc::new(AppState::with_transport(config, transport.clone()).unwrap());

    TestApp {
        router: routes::router(state),
        transport,
        _tmp: tmp,
    }
}

impl TestApp {
    async fn call(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }
}

#[tokio::test]
async fn test_chat_turn_round_trip() {
    let app = create_test_app(vec![reply("Stay hydrated.")]);

    let (status, body) = app
        .call(
            "POST",
            "/api/chat",
            Some(json!({"chatId": "c1", "userId": "u1", "message": "Any advice?"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["chatId"], "c1");
    assert_eq!(body["response"], "Stay hydrated.");

    let (status, body) = app.call("GET", "/api/chat/c1?ownerId=u1", None).await;
    assert_eq!(status, StatusCode::OK);
    let turns = body["chat"]["turns"].as_array().unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0]["role"], "user");
    assert_eq!(turns[1]["content"], "Stay hydrated.");
}

#[tokio::test]
async fn test_provider_recovers_after_four_failures() {
    let app = create_test_app(vec![
        unavailable(),
        unavailable(),
        unavailable(),
        unavailable(),
        reply("Back online."),
    ]);

    let (_, body) = app
        .call("POST", "/api/chat", Some(json!({"message": "hello"})))
        .await;
    assert_eq!(body["success"], true);
    assert_eq!(body["response"], "Back online.");
    assert_eq!(app.transport.calls(), 5);
}

#[tokio::test]
async fn test_failed_completion_stores_apology() {
    let app = create_test_app(vec![unavailable(); 5]);

    let (status, body) = app
        .call(
            "POST",
            "/api/chat",
            Some(json!({"chatId": "c1", "message": "Is this serious?"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["response"], APOLOGY);

    let (_, body) = app.call("GET", "/api/chat/c1", None).await;
    let turns = body["chat"]["turns"].as_array().unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0]["content"], "Is this serious?");
    assert_eq!(turns[1]["content"], APOLOGY);
}

#[tokio::test]
async fn test_empty_message_is_rejected() {
    let app = create_test_app(vec![]);

    let (status, body) = app
        .call("POST", "/api/chat", Some(json!({"chatId": "c1", "message": "   "})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());
    assert_eq!(app.transport.calls(), 0);

    let (status, _) = app.call("GET", "/api/chat/c1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_attachment_only_message_reaches_provider() {
    let app = create_test_app(vec![reply("I see an ECG trace.")]);

    let (_, body) = app
        .call(
            "POST",
            "/api/chat",
            Some(json!({
                "message": "",
                "attachments": [{"url": "https://files.example/ecg.png", "type": "image"}]
            })),
        )
        .await;
    assert_eq!(body["success"], true);

    let requests = app.transport.requests.lock().unwrap();
    let user = requests[0].messages.last().unwrap();
    let content = serde_json::to_value(&user.content).unwrap();
    assert_eq!(content[0]["type"], "image_url");
    assert_eq!(content[0]["image_url"]["url"], "https://files.example/ecg.png");
}

#[tokio::test]
async fn test_chat_history_lists_owner_sessions() {
    let app = create_test_app(vec![reply("a"), reply("b"), reply("c")]);

    for (chat, owner) in [("c1", "u1"), ("c2", "u1"), ("c3", "u2")] {
        app.call(
            "POST",
            "/api/chat",
            Some(json!({"chatId": chat, "userId": owner, "message": format!("question {}", chat)})),
        )
        .await;
    }

    let (status, body) = app.call("GET", "/api/chat-history?ownerId=u1", None).await;
    assert_eq!(status, StatusCode::OK);
    let chats = body["chats"].as_array().unwrap();
    assert_eq!(chats.len(), 2);
    assert_eq!(chats[0]["id"], "c2");
    assert_eq!(chats[0]["title"], "question c2");
    assert_eq!(chats[0]["messageCount"], 1);

    let (_, body) = app
        .call("GET", "/api/chat-history?ownerId=u1&limit=1", None)
        .await;
    assert_eq!(body["chats"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_session_ownership() {
    let app = create_test_app(vec![reply("ok")]);
    app.call(
        "POST",
        "/api/chat",
        Some(json!({"chatId": "c1", "userId": "u1", "message": "private"})),
    )
    .await;

    let (status, body) = app.call("GET", "/api/chat/c1?ownerId=u2", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);

    let (status, _) = app.call("GET", "/api/chat/missing?ownerId=u1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.call("DELETE", "/api/chat/c1?ownerId=u2", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.call("DELETE", "/api/chat/c1?ownerId=u1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, _) = app.call("GET", "/api/chat/c1?ownerId=u1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_append_turns_upserts() {
    let app = create_test_app(vec![]);
    let batch = |q: &str, a: &str| {
        json!({
            "ownerId": "u1",
            "turns": [
                {"role": "user", "content": q},
                {"role": "assistant", "content": a}
            ]
        })
    };

    let (status, body) = app
        .call("POST", "/api/chat/c9/turns", Some(batch("q1", "a1")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chat"]["ownerId"], "u1");

    let (_, body) = app
        .call("POST", "/api/chat/c9/turns", Some(batch("q2", "a2")))
        .await;
    let contents: Vec<&str> = body["chat"]["turns"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents, vec!["q1", "a1", "q2", "a2"]);
    assert_eq!(app.transport.calls(), 0);
}

#[tokio::test]
async fn test_assessment_submission_and_lookup() {
    let app = create_test_app(vec![]);

    let (status, body) = app
        .call(
            "POST",
            "/api/assessments",
            Some(json!({
                "testVariant": "heart-test-1",
                "ownerId": "u1",
                "form": {
                    "age": 65, "cp": 3, "trestbps": 150, "chol": 250, "fbs": "1",
                    "restecg": "2", "thalach": 100, "exang": "1", "oldpeak": 3.0, "ca": "3"
                }
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["score"], 20);
    assert_eq!(body["riskLabel"], "High");

    let test_id = body["testId"].as_str().unwrap().to_string();
    let (status, body) = app
        .call("GET", &format!("/api/assessments/{}", test_id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["test"]["testVariant"], "heart-test-1");
    assert_eq!(body["test"]["inputForm"]["age"], 65);

    let (_, body) = app.call("GET", "/api/assessments?ownerId=u1", None).await;
    assert_eq!(body["tests"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unsupported_variant_is_rejected() {
    let app = create_test_app(vec![]);

    let (status, body) = app
        .call(
            "POST",
            "/api/assessments",
            Some(json!({"testVariant": "lung-test", "form": {}})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = app.call("GET", "/api/assessments/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call(
            "GET",
            "/api/assessments/00000000-0000-4000-8000-000000000000",
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_bodies_use_envelope() {
    let app = create_test_app(vec![]);

    let (status, body) = app
        .call("POST", "/api/assessments", Some(json!({"form": {}})))
        .await;
    assert!(status.is_client_error());
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("testVariant"));

    let (status, body) = app
        .call("POST", "/api/chat/c1/turns", Some(json!({"turns": "nope"})))
        .await;
    assert!(status.is_client_error());
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());

    let (status, _) = app.call("GET", "/api/chat/c1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unreadable_body_and_query_use_envelope() {
    let app = create_test_app(vec![]);

    let request = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], false);

    let (status, body) = app
        .call("GET", "/api/chat-history?ownerId=u1&limit=many", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(app.transport.calls(), 0);
}

#[tokio::test]
async fn test_health() {
    let app = create_test_app(vec![]);
    let (status, body) = app.call("GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
