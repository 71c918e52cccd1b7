//! End-to-end tests against the assembled router: shared-key gate,
//! document/redocument/delete scenario, scanner session protocol.

use std::sync::Arc;

use atlas_api::rate_limit::RateLimiter;
use atlas_api::roles::StaticRoleProvider;
use atlas_api::sessions::SessionManager;
use atlas_api::{AppState, AppStateInner, router};
use atlas_db::catalog::Catalog;
use atlas_db::{Database, queries};
use atlas_sync::coordinator::{RetryPolicy, SyncCoordinator};
use atlas_sync::{DisplaySurface, SyncError};
use atlas_types::models::{Deployment, Room};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde_json::{Value, json};
use tower::util::ServiceExt;

const KEY: &str = "test-key";
const THROTTLE_WORDING: &str = "Invalid session or rate limit exceeded. Please try again later.";

struct NullSurface;

impl DisplaySurface for NullSurface {
    fn render<'a>(
        &'a self,
        _deployment: &'a Deployment,
        _room: &'a Room,
    ) -> BoxFuture<'a, Result<i64, SyncError>> {
        async move { Ok(1) }.boxed()
    }

    fn remove<'a>(
        &'a self,
        _deployment: &'a Deployment,
        _message_id: i64,
    ) -> BoxFuture<'a, Result<(), SyncError>> {
        async move { Ok(()) }.boxed()
    }
}

fn app() -> (tempfile::TempDir, Router, AppState) {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(Database::open(&dir.path().join("atlas.db")).unwrap());
    let catalog = Catalog::new(Arc::clone(&db));
    let sync = SyncCoordinator::new(
        Arc::clone(&db),
        Arc::new(NullSurface),
        None,
        RetryPolicy::default(),
    );
    let roles = StaticRoleProvider::from_json(
        r#"{"users": [{"user_id": 42, "research_level": 3,
            "username": "franktorio", "display_name": "Franktorio"}]}"#,
    )
    .unwrap();
    let state: AppState = Arc::new(AppStateInner {
        catalog,
        sync,
        sessions: SessionManager::new(Arc::clone(&db)),
        limiter: RateLimiter::new(),
        roles: Arc::new(roles),
        api_key: KEY.to_string(),
        scanner_version: "1.4.2".to_string(),
    });
    (dir, router(state.clone()), state)
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    key: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = key {
        builder = builder.header("x-api-key", key);
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn document_payload(name: &str) -> Value {
    json!({
        "room_name": name,
        "room_type": "balancer",
        "image_urls": (0..4).map(|i| format!("https://img.example/{i}.png")).collect::<Vec<_>>(),
        "description": "A compact 4-to-4 balancer design",
        "documented_by": 42,
    })
}

async fn open_session(app: &Router) -> (String, String) {
    let (status, body) = send(
        app,
        "POST",
        "/scanner/request_session",
        None,
        Some(json!({"scanner_version": "1.4.2"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    (
        body["session_id"].as_str().unwrap().to_string(),
        body["password"].as_str().unwrap().to_string(),
    )
}

#[tokio::test]
async fn liveness_needs_no_key() {
    let (_dir, app, _state) = app();
    let (status, body) = send(&app, "GET", "/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn missing_or_wrong_key_gets_the_uniform_body() {
    let (_dir, app, _state) = app();

    for key in [None, Some("wrong-key")] {
        let (status, body) = send(
            &app,
            "POST",
            "/document_room",
            key,
            Some(document_payload("Compact Belt Balancer")),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Unauthorized");
        assert_eq!(body["code"], "UNAUTHORIZED");
    }

    let (status, body) = send(&app, "GET", "/bug_reports", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");
}

#[tokio::test]
async fn document_redocument_delete_scenario() {
    let (_dir, app, _state) = app();

    let (status, _) = send(
        &app,
        "POST",
        "/document_room",
        Some(KEY),
        Some(document_payload("Compact Belt Balancer")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (session_id, password) = open_session(&app).await;
    let roominfo = json!({
        "room_name": "compact belt balancer",
        "session_id": session_id,
        "password": password,
    });

    let (status, body) = send(&app, "POST", "/scanner/get_roominfo", None, Some(roominfo.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["room"]["name"], "Compact Belt Balancer");
    assert_eq!(body["room"]["revision"], 1);

    let (status, _) = send(
        &app,
        "POST",
        "/redocument_room",
        Some(KEY),
        Some(json!({
            "room_name": "Compact Belt Balancer",
            "room_type": "balancer",
            "image_urls": (0..5).map(|i| format!("https://img.example/v2/{i}.png")).collect::<Vec<_>>(),
            "description": "Reworked with express belts",
            "documented_by": 42,
            "edited_by": 43,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, "POST", "/scanner/get_roominfo", None, Some(roominfo.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["room"]["revision"], 2);
    assert_eq!(body["room"]["description"], "Reworked with express belts");
    let images: Vec<String> = body["room"]["image_urls"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert_eq!(images.len(), 5);
    assert!(images.iter().all(|u| u.contains("/v2/")), "old image references must be gone");

    let (status, _) = send(
        &app,
        "DELETE",
        "/deletedoc",
        Some(KEY),
        Some(json!({"room_name": "Compact Belt Balancer"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, "POST", "/scanner/get_roominfo", None, Some(roominfo)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn duplicate_document_and_rename_conflicts() {
    let (_dir, app, _state) = app();

    send(&app, "POST", "/document_room", Some(KEY), Some(document_payload("Alpha"))).await;
    send(&app, "POST", "/document_room", Some(KEY), Some(document_payload("Beta"))).await;

    let (status, body) = send(
        &app,
        "POST",
        "/document_room",
        Some(KEY),
        Some(document_payload("alpha")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");

    let (status, body) = send(
        &app,
        "POST",
        "/rename_room",
        Some(KEY),
        Some(json!({"old_name": "Alpha", "new_name": "beta", "edited_by": 42})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
}

#[tokio::test]
async fn scanner_session_lifecycle() {
    let (_dir, app, _state) = app();
    let (session_id, password) = open_session(&app).await;

    // Wrong password: Unauthorized, no hint whether the id exists.
    let (status, body) = send(
        &app,
        "POST",
        "/scanner/get_roominfo",
        None,
        Some(json!({
            "room_name": "Anything",
            "session_id": session_id,
            "password": "wrong",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    // Correct credential, unknown room: a structured NotFound.
    let (status, body) = send(
        &app,
        "POST",
        "/scanner/get_roominfo",
        None,
        Some(json!({
            "room_name": "Uncharted Vault",
            "session_id": session_id,
            "password": password,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    // Encounters may reference rooms nobody documented yet.
    let (status, _) = send(
        &app,
        "POST",
        "/scanner/room_encountered",
        None,
        Some(json!({
            "session_id": session_id,
            "password": password,
            "room_name": "Uncharted Vault",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        "POST",
        "/scanner/end_session",
        None,
        Some(json!({"session_id": session_id, "password": password})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Same credentials after end: SessionInvalid, worded exactly like a
    // rate-limit rejection.
    let (status, body) = send(
        &app,
        "POST",
        "/scanner/room_encountered",
        None,
        Some(json!({
            "session_id": session_id,
            "password": password,
            "room_name": "Uncharted Vault",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "SESSION_INVALID");
    assert_eq!(body["error"], THROTTLE_WORDING);
}

#[tokio::test]
async fn limiter_rejects_with_distinct_code_and_no_side_effect() {
    let (_dir, app, state) = app();
    let (session_id, password) = open_session(&app).await;
    let session_uuid: uuid::Uuid = session_id.parse().unwrap();

    // Exhaust the window out-of-band; the 61st HTTP request must bounce.
    for _ in 0..60 {
        state.limiter.check(session_uuid).unwrap();
    }

    let (status, body) = send(
        &app,
        "POST",
        "/scanner/room_encountered",
        None,
        Some(json!({
            "session_id": session_id,
            "password": password,
            "room_name": "Throttled Hall",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "RATE_LIMITED");
    assert_eq!(body["error"], THROTTLE_WORDING);

    // Limiter rejection happened before any side effect.
    let db = state.catalog.database();
    let row = queries::get_session(&db, &session_id).unwrap().unwrap();
    assert_eq!(row.encounter_count, 0);
}

#[tokio::test]
async fn bug_report_flow() {
    let (_dir, app, _state) = app();
    send(&app, "POST", "/document_room", Some(KEY), Some(document_payload("Buggy Hall"))).await;

    let (status, body) = send(
        &app,
        "POST",
        "/report_bug",
        Some(KEY),
        Some(json!({
            "room_name": "Buggy Hall",
            "description": "too short",
            "reported_by": 42,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");

    let (status, body) = send(
        &app,
        "POST",
        "/report_bug",
        Some(KEY),
        Some(json!({
            "room_name": "buggy hall",
            "description": "The third image shows a different room than the blueprint describes.",
            "reported_by": 42,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let report_id = body["report_id"].as_i64().unwrap();

    let (status, body) = send(&app, "GET", "/bug_reports?room_name=Buggy%20Hall", Some(KEY), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reports"].as_array().unwrap().len(), 1);

    let (status, _) = send(
        &app,
        "POST",
        "/resolve_report",
        Some(KEY),
        Some(json!({"report_id": report_id, "resolved_by": 43})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, "GET", "/bug_reports?room_name=Buggy%20Hall", Some(KEY), None).await;
    assert!(body["reports"].as_array().unwrap().is_empty());

    let (_, body) = send(
        &app,
        "GET",
        "/bug_reports?room_name=Buggy%20Hall&include_resolved=true",
        Some(KEY),
        None,
    )
    .await;
    assert_eq!(body["reports"][0]["status"], "resolved");
}

#[tokio::test]
async fn partial_mutations_merge_tags_and_set_type() {
    let (_dir, app, state) = app();
    send(&app, "POST", "/document_room", Some(KEY), Some(document_payload("Sorter"))).await;

    let (status, _) = send(
        &app,
        "POST",
        "/set_tags",
        Some(KEY),
        Some(json!({"room_name": "Sorter", "tags": ["compact", "fast"], "edited_by": 42})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        "POST",
        "/set_tags",
        Some(KEY),
        Some(json!({"room_name": "Sorter", "tags": ["fast", "cheap"], "edited_by": 42})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        "POST",
        "/set_roomtype",
        Some(KEY),
        Some(json!({"room_name": "Sorter", "room_type": "logistics", "edited_by": 42})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let room = state.catalog.get("Sorter").await.unwrap().unwrap();
    assert_eq!(room.tags, vec!["compact", "fast", "cheap"]);
    assert_eq!(room.room_type.as_str(), "logistics");
    assert_eq!(room.revision, 4);
}

#[tokio::test]
async fn role_and_profile_lookups() {
    let (_dir, app, _state) = app();

    let (status, body) = send(&app, "GET", "/get_researcher_role?user_id=42", Some(KEY), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["research_level"], 3);

    let (status, body) = send(&app, "GET", "/get_researcher_role?user_id=7", Some(KEY), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["research_level"], 0);

    let (status, _) = send(&app, "GET", "/get_user_profile?user_id=42", Some(KEY), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, "GET", "/get_user_profile?user_id=7", Some(KEY), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn image_lists_are_truncated_to_ten_and_floored_at_four() {
    let (_dir, app, state) = app();

    let mut payload = document_payload("Gallery");
    payload["image_urls"] = json!(
        (0..12).map(|i| format!("https://img.example/{i}.png")).collect::<Vec<_>>()
    );
    let (status, _) = send(&app, "POST", "/document_room", Some(KEY), Some(payload)).await;
    assert_eq!(status, StatusCode::CREATED);

    let room = state.catalog.get("Gallery").await.unwrap().unwrap();
    assert_eq!(room.image_urls.len(), 10);

    let mut payload = document_payload("Sparse");
    payload["image_urls"] = json!(["https://img.example/only.png"]);
    let (status, body) = send(&app, "POST", "/document_room", Some(KEY), Some(payload)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
}
