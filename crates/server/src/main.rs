use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        DefaultBodyLimit, Path, Query, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use scheduling::{execute_action, get_ui_state, SchedulingContext};
use serde::Deserialize;
use shared::{
    domain::{DateInstanceId, UserId},
    error::{ApiError, ErrorCode},
    protocol::{ActionRequest, ActionResponse, UiStateResponse},
};
use storage::{SqliteWingsLedger, Storage};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod app_state;
mod config;

use app_state::AppState;
use config::{load_settings, prepare_database_url};

type HttpError = (StatusCode, Json<ApiError>);

#[derive(Debug, Deserialize)]
struct UserQuery {
    user_id: Option<i64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    let ledger = Arc::new(SqliteWingsLedger {
        attend_date_bonus: settings.attend_date_bonus,
    });

    let state = AppState {
        scheduling: SchedulingContext::with_ledger(storage, ledger),
        max_body_bytes: settings.max_body_bytes,
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = state.max_body_bytes;
    Router::new()
        .route("/healthz", get(healthz))
        .route("/dates/:date_instance_id/ui-state", get(http_ui_state))
        .route("/dates/:date_instance_id/actions", post(http_execute_action))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, HttpError> {
    state
        .scheduling
        .storage
        .health_check()
        .await
        .map_err(|e| error_response(ApiError::new(ErrorCode::Internal, format!("{e:#}"))))?;
    Ok("ok")
}

async fn http_ui_state(
    State(state): State<Arc<AppState>>,
    Path(date_instance_id): Path<i64>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> Result<Json<UiStateResponse>, HttpError> {
    let user_id = caller(query)?;
    get_ui_state(&state.scheduling, DateInstanceId(date_instance_id), user_id)
        .await
        .map(Json)
        .map_err(error_response)
}

/// Business failures come back as 200 with `success: false`.
async fn http_execute_action(
    State(state): State<Arc<AppState>>,
    Path(date_instance_id): Path<i64>,
    query: Result<Query<UserQuery>, QueryRejection>,
    body: Result<Json<ActionRequest>, JsonRejection>,
) -> Result<Json<ActionResponse>, HttpError> {
    let user_id = caller(query)?;
    let Json(request) =
        body.map_err(|rejection| rejected(rejection.status(), rejection.body_text()))?;
    execute_action(
        &state.scheduling,
        DateInstanceId(date_instance_id),
        user_id,
        request,
    )
    .await
    .map(Json)
    .map_err(error_response)
}

fn caller(query: Result<Query<UserQuery>, QueryRejection>) -> Result<UserId, HttpError> {
    let Query(q) =
        query.map_err(|rejection| rejected(rejection.status(), rejection.body_text()))?;
    q.user_id.map(UserId).ok_or_else(|| {
        error_response(ApiError::new(
            ErrorCode::Authorization,
            "user_id query parameter is required",
        ))
    })
}

/// Extractor rejections keep axum's status but speak the `ApiError` shape.
fn rejected(status: StatusCode, message: String) -> HttpError {
    (status, Json(ApiError::new(ErrorCode::Validation, message)))
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Authorization => StatusCode::FORBIDDEN,
        ErrorCode::StateGuard => StatusCode::CONFLICT,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorCode::External => StatusCode::BAD_GATEWAY,
    }
}

/// Internal details stay in the log; the client gets a correlation id to quote.
fn error_response(err: ApiError) -> HttpError {
    let status = status_for(err.code);
    if err.code != ErrorCode::Internal {
        return (status, Json(err));
    }

    let correlation_id = Uuid::new_v4().to_string();
    error!(%correlation_id, error = %err.message, "request failed");
    (
        status,
        Json(
            ApiError::new(ErrorCode::Internal, "internal server error")
                .with_correlation_id(correlation_id),
        ),
    )
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
