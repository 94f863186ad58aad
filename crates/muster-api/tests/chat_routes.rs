//! Router tests: real handlers, real SQLite (temp dir), no network.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use muster_api::access::{AccessPolicy, OpenAccess, ProjectRoster};
use muster_api::{AppState, AppStateInner, router};
use muster_db::Database;
use muster_presence::TypingRegistry;
use muster_types::api::Claims;

const SECRET: &str = "test-secret";

struct TestApp {
    router: Router,
    state: AppState,
    _tmp: TempDir,
}

fn test_app_with(access: Box<dyn AccessPolicy>, typing_ttl: Duration) -> TestApp {
    let tmp = TempDir::new().unwrap();
    let db = Database::open(&tmp.path().join("muster.db")).unwrap();
    let state: AppState = Arc::new(AppStateInner {
        db,
        typing: TypingRegistry::new(),
        access,
        jwt_secret: SECRET.into(),
        typing_ttl,
    });
    TestApp {
        router: router(state.clone()),
        state,
        _tmp: tmp,
    }
}

fn test_app() -> TestApp {
    test_app_with(Box::new(OpenAccess), Duration::from_secs(5))
}

fn token_for(user: Uuid) -> String {
    let claims = Claims {
        sub: user,
        exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

async fn call(
    app: &TestApp,
    method: Method,
    uri: &str,
    user: Option<Uuid>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token_for(user)));
    }
    let req = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let resp = app.router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn open_chat(app: &TestApp, project: Uuid, user: Uuid) -> (String, u64) {
    let (status, body) = call(app, Method::GET, &format!("/projects/{project}/chat"), Some(user), None).await;
    assert_eq!(status, StatusCode::OK);
    (
        body["chat"]["id"].as_str().unwrap().to_owned(),
        body["unread_count"].as_u64().unwrap(),
    )
}

async fn unread(app: &TestApp, chat: &str, user: Uuid) -> u64 {
    let (status, body) = call(app, Method::GET, &format!("/chats/{chat}/unread"), Some(user), None).await;
    assert_eq!(status, StatusCode::OK);
    body["unread_count"].as_u64().unwrap()
}

#[tokio::test]
async fn test_health_needs_no_token() {
    let app = test_app();
    let resp = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_rejects_missing_and_bad_tokens() {
    let app = test_app();
    let uri = format!("/projects/{}/chat", Uuid::new_v4());

    let (status, _) = call(&app, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .uri(&uri)
        .header(header::AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let resp = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_hello_again_scenario() {
    let app = test_app();
    let project = Uuid::new_v4();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    let (chat, a_unread) = open_chat(&app, project, alice).await;
    let (chat_b, b_unread) = open_chat(&app, project, bob).await;
    assert_eq!(chat, chat_b);
    assert_eq!((a_unread, b_unread), (0, 0));

    let (status, msg) = call(&app, Method::POST, &format!("/chats/{chat}/messages"), Some(alice), Some(json!({ "text": "hello" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(msg["id"], 1);
    assert_eq!(unread(&app, &chat, bob).await, 1);

    let (status, read) = call(&app, Method::POST, &format!("/chats/{chat}/read"), Some(bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(read["unread_count"], 0);
    assert_eq!(read["last_read_message_id"], 1);
    assert_eq!(unread(&app, &chat, bob).await, 0);

    let (_, msg) = call(&app, Method::POST, &format!("/chats/{chat}/messages"), Some(alice), Some(json!({ "text": "again" }))).await;
    assert_eq!(msg["id"], 2);
    assert_eq!(unread(&app, &chat, bob).await, 1);
    assert_eq!(unread(&app, &chat, alice).await, 0);
}

#[tokio::test]
async fn test_concurrent_get_chat_creates_one() {
    let app = test_app();
    let project = Uuid::new_v4();
    let (a, b) = tokio::join!(
        open_chat(&app, project, Uuid::new_v4()),
        open_chat(&app, project, Uuid::new_v4()),
    );
    assert_eq!(a.0, b.0);
}

#[tokio::test]
async fn test_list_messages_window_and_delivery() {
    let app = test_app();
    let project = Uuid::new_v4();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let (chat, _) = open_chat(&app, project, alice).await;

    for i in 1..=5 {
        call(&app, Method::POST, &format!("/chats/{chat}/messages"), Some(alice), Some(json!({ "text": format!("m{i}") }))).await;
    }

    let (status, page) = call(&app, Method::GET, &format!("/chats/{chat}/messages?offset=1&limit=2"), Some(alice), None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<i64> = page.as_array().unwrap().iter().map(|m| m["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![3, 4]);
    assert_eq!(page[0]["delivered"], false);

    let (_, page) = call(&app, Method::GET, &format!("/chats/{chat}/messages"), Some(bob), None).await;
    assert_eq!(page.as_array().unwrap().len(), 5);
    assert!(page.as_array().unwrap().iter().all(|m| m["delivered"] == true));

    let (_, page) = call(&app, Method::GET, &format!("/chats/{chat}/messages?since=3"), Some(alice), None).await;
    let ids: Vec<i64> = page.as_array().unwrap().iter().map(|m| m["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![4, 5]);
    assert_eq!(page[0]["delivered"], true);
}

#[tokio::test]
async fn test_delivery_limited_to_fetched_window() {
    let app = test_app();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let (chat, _) = open_chat(&app, Uuid::new_v4(), alice).await;

    for i in 1..=3 {
        call(&app, Method::POST, &format!("/chats/{chat}/messages"), Some(alice), Some(json!({ "text": format!("m{i}") }))).await;
    }

    let (_, page) = call(&app, Method::GET, &format!("/chats/{chat}/messages?offset=0&limit=1"), Some(bob), None).await;
    assert_eq!(page[0]["id"], 3);
    assert_eq!(page[0]["delivered"], true);

    let (_, page) = call(&app, Method::GET, &format!("/chats/{chat}/messages"), Some(alice), None).await;
    let flags: Vec<bool> = page.as_array().unwrap().iter().map(|m| m["delivered"].as_bool().unwrap()).collect();
    assert_eq!(flags, vec![false, false, true]);
}

#[tokio::test]
async fn test_send_validation() {
    let app = test_app();
    let user = Uuid::new_v4();
    let (chat, _) = open_chat(&app, Uuid::new_v4(), user).await;
    let uri = format!("/chats/{chat}/messages");

    let (status, _) = call(&app, Method::POST, &uri, Some(user), Some(json!({ "text": "   " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, msg) = call(
        &app,
        Method::POST,
        &uri,
        Some(user),
        Some(json!({ "media": { "kind": "image", "reference": "reports/7.jpg" } })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(msg["media"]["kind"], "image");
    assert_eq!(msg["text"], Value::Null);

    let (status, _) = call(&app, Method::POST, &format!("/chats/{}/messages", Uuid::new_v4()), Some(user), Some(json!({ "text": "hi" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_pins_over_http() {
    let app = test_app();
    let user = Uuid::new_v4();
    let (chat, _) = open_chat(&app, Uuid::new_v4(), user).await;
    call(&app, Method::POST, &format!("/chats/{chat}/messages"), Some(user), Some(json!({ "text": "Bring gloves" }))).await;

    for _ in 0..2 {
        let (status, _) = call(&app, Method::PUT, &format!("/chats/{chat}/pins/1"), Some(user), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
    let (_, pinned) = call(&app, Method::GET, &format!("/chats/{chat}/pins"), Some(user), None).await;
    assert_eq!(pinned.as_array().unwrap().len(), 1);
    assert_eq!(pinned[0]["message_id"], 1);
    assert_eq!(pinned[0]["message"]["text"], "Bring gloves");

    let (status, _) = call(&app, Method::PUT, &format!("/chats/{chat}/pins/99"), Some(user), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app, Method::DELETE, &format!("/chats/{chat}/pins/99"), Some(user), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, Method::DELETE, &format!("/chats/{chat}/pins/1"), Some(user), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, pinned) = call(&app, Method::GET, &format!("/chats/{chat}/pins"), Some(user), None).await;
    assert!(pinned.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_typing_over_http_expires() {
    let app = test_app_with(Box::new(OpenAccess), Duration::from_millis(100));
    let user = Uuid::new_v4();
    let (chat, _) = open_chat(&app, Uuid::new_v4(), user).await;
    let uri = format!("/chats/{chat}/typing");

    let (status, _) = call(&app, Method::PUT, &uri, Some(user), Some(json!({ "typing_type": "typing" }))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, active) = call(&app, Method::GET, &uri, Some(user), None).await;
    assert_eq!(active.as_array().unwrap().len(), 1);
    assert_eq!(active[0]["user_id"], user.to_string());
    assert_eq!(active[0]["typing_type"], "typing");

    tokio::time::sleep(Duration::from_millis(200)).await;
    let (_, active) = call(&app, Method::GET, &uri, Some(user), None).await;
    assert!(active.as_array().unwrap().is_empty());

    let (status, _) = call(&app, Method::PUT, &uri, Some(user), Some(json!({ "typing_type": "dancing" }))).await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn test_roster_policy() {
    let app = test_app_with(Box::new(ProjectRoster), Duration::from_secs(5));
    let project = Uuid::new_v4();
    let organizer = Uuid::new_v4();
    let outsider = Uuid::new_v4();
    app.state.db.add_project_member(project, organizer).unwrap();

    let (chat, _) = open_chat(&app, project, organizer).await;

    let (status, _) = call(&app, Method::GET, &format!("/projects/{project}/chat"), Some(outsider), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&app, Method::POST, &format!("/chats/{chat}/messages"), Some(outsider), Some(json!({ "text": "let me in" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    app.state.db.add_project_member(project, outsider).unwrap();
    let (status, _) = call(&app, Method::POST, &format!("/chats/{chat}/messages"), Some(outsider), Some(json!({ "text": "thanks" }))).await;
    assert_eq!(status, StatusCode::CREATED);
}
