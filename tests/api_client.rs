mod common;

use axum::extract::Query;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use common::{chunked_body, client, spawn_backend, stalled_body};
use futures::StreamExt;
use linguaecho_lib::api::{AuthApi, ConversationApi};
use linguaecho_lib::auth::{AuthStore, Identity};
use linguaecho_lib::constants::{Language, Scenario, TOKEN_KEY};
use linguaecho_lib::error::ApiError;
use linguaecho_lib::models::{ChatEvent, ChatRequest, ChatTurn, ReportRequest, Role};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

fn chat_request() -> ChatRequest {
    ChatRequest {
        session_id: Uuid::new_v4(),
        language: Language::English,
        scenario: Scenario::Hotel,
        message: "I have a reservation".to_string(),
        history: vec![ChatTurn {
            role: Role::Assistant,
            content: "Welcome!".to_string(),
        }],
    }
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

#[tokio::test]
async fn streamed_reply_survives_chunk_splits_and_bad_lines() {
    let seen: Arc<Mutex<Option<(Option<String>, Value)>>> = Arc::default();
    let captured = seen.clone();
    let router = Router::new().route(
        "/api/chat/stream",
        post(move |headers: HeaderMap, Json(body): Json<Value>| async move {
            *captured.lock().unwrap() = Some((bearer(&headers), body));
            chunked_body(&[
                "data: {\"type\":\"chunk\",\"content\":\"Hel\"}\n\nda",
                "ta: {\"type\":\"chunk\",\"content\":\"lo\"}\n",
                "data: {bad json\n",
                ": keep-alive\n",
                "data: {\"type\":\"done\",\"session_id\":\"s-1\"}\n",
            ])
        }),
    );
    let base_url = spawn_backend(router).await;
    let test = client(&base_url);
    test.credentials.store("tok-1").await;

    let request = chat_request();
    let events: Vec<ChatEvent> = test
        .api
        .send_message_streamed(&request)
        .await
        .unwrap()
        .map(|event| event.unwrap())
        .collect()
        .await;

    assert_eq!(
        events,
        vec![
            ChatEvent::Chunk {
                content: "Hel".to_string()
            },
            ChatEvent::Chunk {
                content: "lo".to_string()
            },
            ChatEvent::Done {
                session_id: Some("s-1".to_string())
            },
        ]
    );

    let (auth_header, body) = seen.lock().unwrap().clone().unwrap();
    assert_eq!(auth_header.as_deref(), Some("Bearer tok-1"));
    assert_eq!(body["session_id"], json!(request.session_id.to_string()));
    assert_eq!(body["language"], json!("english"));
    assert_eq!(body["scenario"], json!("hotel"));
    assert_eq!(body["history"][0]["role"], json!("assistant"));
}

#[tokio::test]
async fn stream_rejection_reports_status_and_body() {
    let router = Router::new().route(
        "/api/chat/stream",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model offline") }),
    );
    let test = client(&spawn_backend(router).await);

    let err = match test.api.send_message_streamed(&chat_request()).await {
        Ok(_) => panic!("expected the stream to be refused"),
        Err(e) => e,
    };
    assert!(matches!(err, ApiError::Status { status: 500, .. }));
    assert_eq!(
        err.to_string(),
        "HTTP error! status: 500, message: model offline"
    );
}

#[tokio::test]
async fn stream_unauthorized_clears_credential() {
    let router = Router::new().route(
        "/api/chat/stream",
        post(|| async { (StatusCode::UNAUTHORIZED, "{\"detail\":\"expired\"}") }),
    );
    let test = client(&spawn_backend(router).await);
    test.credentials.store("expired").await;

    assert!(test.api.send_message_streamed(&chat_request()).await.is_err());
    assert_eq!(test.credentials.current(), None);
    assert_eq!(test.cache.get_raw(TOKEN_KEY).await, None);
}

#[tokio::test]
async fn cancelling_ends_the_stream_quietly() {
    let router = Router::new().route(
        "/api/chat/stream",
        post(|| async { stalled_body("data: {\"type\":\"chunk\",\"content\":\"partial\"}\n") }),
    );
    let test = client(&spawn_backend(router).await);

    let mut events = test.api.send_message_streamed(&chat_request()).await.unwrap();
    let first = events.next().await.unwrap().unwrap();
    assert_eq!(
        first,
        ChatEvent::Chunk {
            content: "partial".to_string()
        }
    );

    test.api.cancel_stream();
    let next = tokio::time::timeout(Duration::from_secs(5), events.next())
        .await
        .expect("cancel should end the stream promptly");
    assert!(next.is_none());
}

#[tokio::test]
async fn one_shot_chat_and_report_round_trip() {
    let router = Router::new()
        .route(
            "/api/chat",
            post(|Json(body): Json<Value>| async move {
                Json(json!({ "reply": "Certainly", "session_id": body["session_id"] }))
            }),
        )
        .route(
            "/api/report/generate",
            post(|Json(body): Json<Value>| async move {
                let turns = body["conversation"].as_array().map(Vec::len).unwrap_or(0);
                Json(json!({
                    "report": {
                        "overview": { "language": "english", "scenario": "hotel", "turns": turns, "word_count": 7 },
                        "grammar_errors": [
                            { "error": "I has", "correction": "I have", "explanation": "Subject-verb agreement" }
                        ],
                        "positive_feedback": ["Polite tone"]
                    }
                }))
            }),
        );
    let test = client(&spawn_backend(router).await);

    let request = chat_request();
    let reply = test.api.send_message(&request).await.unwrap();
    assert_eq!(reply.reply, "Certainly");
    assert_eq!(reply.session_id, request.session_id.to_string());

    let report = test
        .api
        .generate_report(&ReportRequest {
            session_id: request.session_id,
            language: request.language,
            scenario: request.scenario,
            conversation: request.history.clone(),
        })
        .await
        .unwrap();
    assert_eq!(report.overview.turns, 1);
    assert_eq!(report.grammar_errors[0].correction, "I have");
    assert_eq!(report.grammar_errors[0].error_type, None);
    assert!(report.vocabulary_issues.is_empty());
    assert_eq!(report.positive_feedback, vec!["Polite tone".to_string()]);
}

#[tokio::test]
async fn server_detail_becomes_the_error_message() {
    let router = Router::new()
        .route(
            "/api/auth/register",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "detail": "Email already registered" })),
                )
            }),
        )
        .route(
            "/api/auth/login",
            post(|| async {
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({ "detail": [{ "msg": "field required" }] })),
                )
            }),
        );
    let test = client(&spawn_backend(router).await);

    let err = test.api.register("a@b.c", "pw").await.unwrap_err();
    assert_eq!(err.status(), Some(400));
    assert_eq!(err.detail(), Some("Email already registered"));
    assert_eq!(err.to_string(), "Email already registered");

    // Non-string details fall back to the operation's message
    let err = test.api.login("a@b.c", "pw").await.unwrap_err();
    assert_eq!(err.detail(), None);
    assert_eq!(err.to_string(), "Login failed");
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let test = client("http://127.0.0.1:9");
    let err = test.api.get_current_user().await.unwrap_err();
    assert!(matches!(err, ApiError::Transport { .. }));
    assert_eq!(err.to_string(), "Failed to fetch user");
    assert_eq!(err.status(), None);
}

#[tokio::test]
async fn health_failures_are_normalised() {
    let healthy = Router::new().route(
        "/health",
        get(|| async { Json(json!({ "status": "healthy", "version": "1.0" })) }),
    );
    let test = client(&spawn_backend(healthy).await);
    let health = test.api.check_health().await.unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.extra["version"], json!("1.0"));

    let failing = Router::new().route(
        "/health",
        get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down") }),
    );
    let test = client(&spawn_backend(failing).await);
    let err = test.api.check_health().await.unwrap_err();
    assert!(matches!(err, ApiError::HealthCheck));
    assert_eq!(err.to_string(), "API health check failed");
}

#[tokio::test]
async fn conversation_listing_asks_for_fifty() {
    let router = Router::new()
        .route(
            "/api/conversations",
            get(|Query(query): Query<HashMap<String, String>>| async move {
                if query.get("limit").map(String::as_str) != Some("50") {
                    return StatusCode::BAD_REQUEST.into_response();
                }
                Json(json!([{
                    "id": "db-1",
                    "session_id": "s-1",
                    "language": "japanese",
                    "scenario": "restaurant",
                    "messages": null,
                    "created_at": "2024-05-01T10:00:00Z"
                }]))
                .into_response()
            }),
        )
        .route(
            "/api/conversations/:id",
            delete(|| async { StatusCode::NO_CONTENT }),
        );
    let test = client(&spawn_backend(router).await);

    let records = test.api.list_conversations(50).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id.as_deref(), Some("db-1"));
    assert_eq!(records[0].messages, None);

    test.api.delete_conversation("db-1").await.unwrap();
}

#[tokio::test]
async fn any_unauthorized_response_revokes_authentication() {
    let router = Router::new()
        .route(
            "/api/auth/login",
            post(|| async { Json(json!({ "access_token": "tok-9", "token_type": "bearer" })) }),
        )
        .route(
            "/api/auth/me",
            get(|headers: HeaderMap| async move {
                if bearer(&headers).as_deref() == Some("Bearer tok-9") {
                    Json(json!({ "id": "u-1", "email": "learner@example.com" })).into_response()
                } else {
                    StatusCode::UNAUTHORIZED.into_response()
                }
            }),
        )
        .route(
            "/api/conversations",
            get(|| async {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "detail": "Token expired" })),
                )
                    .into_response()
            }),
        );
    let test = client(&spawn_backend(router).await);
    let api = Arc::new(test.api);
    let auth_api: Arc<dyn AuthApi> = api.clone();
    let mut auth = AuthStore::new(auth_api, test.credentials.clone());

    auth.login("learner@example.com", "secret").await.unwrap();
    assert_eq!(auth.identity(), Identity::Authenticated);
    assert_eq!(test.cache.get_raw(TOKEN_KEY).await.as_deref(), Some("tok-9"));

    let err = api.list_conversations(50).await.unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(err.to_string(), "Token expired");

    assert!(!auth.is_authenticated());
    assert_eq!(auth.identity(), Identity::Anonymous);
    assert_eq!(test.cache.get_raw(TOKEN_KEY).await, None);
}
