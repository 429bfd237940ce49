use super::*;
use axum::{
    body::{self, Body},
    http::Request,
};
use chrono::{Duration, Utc};
use serde_json::json;
use shared::domain::UiState;
use tower::ServiceExt;

struct TestApp {
    app: Router,
    alice: i64,
    bob: i64,
    mallory: i64,
    date: i64,
}

async fn test_app() -> TestApp {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let alice = storage.create_user("alice", "Alice").await.expect("alice");
    let bob = storage.create_user("bob", "Bob").await.expect("bob");
    let mallory = storage.create_user("mallory", "Mallory").await.expect("mallory");
    let match_id = storage.create_match(alice, bob).await.expect("match");
    let date = storage.create_date_instance(match_id).await.expect("date");

    let app = build_router(Arc::new(AppState {
        scheduling: SchedulingContext::new(storage),
        max_body_bytes: 1024,
    }));
    TestApp {
        app,
        alice: alice.0,
        bob: bob.0,
        mallory: mallory.0,
        date: date.0,
    }
}

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

fn post_action(date: i64, user: i64, body: serde_json::Value) -> Request<Body> {
    Request::post(format!("/dates/{date}/actions?user_id={user}"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

#[tokio::test]
async fn healthz_reports_ok_when_storage_is_ready() {
    let t = test_app().await;
    let request = Request::get("/healthz").body(Body::empty()).expect("request");
    let response = t.app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn ui_state_route_renders_the_callers_view() {
    let t = test_app().await;
    let request = Request::get(format!("/dates/{}/ui-state?user_id={}", t.date, t.bob))
        .body(Body::empty())
        .expect("request");
    let response = t.app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let view: serde_json::Value = body_json(response).await;
    assert_eq!(view["ui_state"], "syncing_availability");
    assert_eq!(view["my_role"], "receiver");
    assert_eq!(view["partner_info"]["display_name"], "Alice");
    assert_eq!(view["elements"][0]["type"], "status_line");
}

#[tokio::test]
async fn callers_must_identify_as_participants() {
    let t = test_app().await;

    let missing = Request::get(format!("/dates/{}/ui-state", t.date))
        .body(Body::empty())
        .expect("request");
    let response = t.app.clone().oneshot(missing).await.expect("response");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let err: ApiError = body_json(response).await;
    assert_eq!(err.code, ErrorCode::Authorization);

    let unknown = Request::get(format!("/dates/{}/ui-state?user_id=9999", t.date))
        .body(Body::empty())
        .expect("request");
    let response = t.app.clone().oneshot(unknown).await.expect("response");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let outsider = Request::get(format!("/dates/{}/ui-state?user_id={}", t.date, t.mallory))
        .body(Body::empty())
        .expect("request");
    let response = t.app.oneshot(outsider).await.expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let err: ApiError = body_json(response).await;
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn non_numeric_user_id_is_a_json_validation_error() {
    let t = test_app().await;

    let read = Request::get(format!("/dates/{}/ui-state?user_id=alice", t.date))
        .body(Body::empty())
        .expect("request");
    let response = t.app.clone().oneshot(read).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let err: ApiError = body_json(response).await;
    assert_eq!(err.code, ErrorCode::Validation);
    assert!(err.message.contains("query string"), "{}", err.message);

    let write = Request::post(format!("/dates/{}/actions?user_id=alice", t.date))
        .header("content-type", "application/json")
        .body(Body::from(json!({"action": "cancel"}).to_string()))
        .expect("request");
    let response = t.app.oneshot(write).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let err: ApiError = body_json(response).await;
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn actions_apply_and_guard_failures_stay_200() {
    let t = test_app().await;
    let starts_at = Utc::now() + Duration::days(2);

    let response = t
        .app
        .clone()
        .oneshot(post_action(
            t.date,
            t.bob,
            json!({"action": "suggest_times", "payload": {"slots": [{"starts_at": starts_at}]}}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let applied: ActionResponse = body_json(response).await;
    assert!(applied.success, "{applied:?}");
    assert_eq!(applied.ui_state, Some(UiState::AwaitingTimeConfirmation));

    let response = t
        .app
        .oneshot(post_action(
            t.date,
            t.alice,
            json!({"action": "teleport"}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let blocked: ActionResponse = body_json(response).await;
    assert!(!blocked.success);
    assert_eq!(blocked.error_code, Some(ErrorCode::StateGuard));
}

#[tokio::test]
async fn malformed_bodies_are_validation_errors() {
    let t = test_app().await;

    let response = t
        .app
        .clone()
        .oneshot(post_action(
            t.date,
            t.bob,
            json!({"action": "suggest_times", "payload": {"slots": 3}}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let err: ApiError = body_json(response).await;
    assert_eq!(err.code, ErrorCode::Validation);

    let not_json = Request::post(format!("/dates/{}/actions?user_id={}", t.date, t.bob))
        .header("content-type", "application/json")
        .body(Body::from("{"))
        .expect("request");
    let response = t.app.oneshot(not_json).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let err: ApiError = body_json(response).await;
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn oversized_bodies_are_refused() {
    let t = test_app().await;
    let reason = "x".repeat(4096);
    let response = t
        .app
        .oneshot(post_action(
            t.date,
            t.alice,
            json!({"action": "cancel", "payload": {"reason": reason}}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[test]
fn internal_errors_are_masked_with_a_correlation_id() {
    let (status, Json(body)) = error_response(ApiError::new(
        ErrorCode::Internal,
        "database is locked",
    ));
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body.message, "internal server error");
    let correlation_id = body.correlation_id.expect("correlation id");
    assert!(Uuid::parse_str(&correlation_id).is_ok());
}

#[test]
fn error_codes_map_to_http_statuses() {
    assert_eq!(status_for(ErrorCode::Validation), StatusCode::BAD_REQUEST);
    assert_eq!(status_for(ErrorCode::Authorization), StatusCode::FORBIDDEN);
    assert_eq!(status_for(ErrorCode::StateGuard), StatusCode::CONFLICT);
    assert_eq!(status_for(ErrorCode::NotFound), StatusCode::NOT_FOUND);
    assert_eq!(status_for(ErrorCode::External), StatusCode::BAD_GATEWAY);

    let (status, Json(body)) = error_response(ApiError::new(ErrorCode::StateGuard, "nope"));
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body.message, "nope");
    assert!(body.correlation_id.is_none());
}
