//! Scheduling state engine: derives the UI state of a date instance, guards the
//! actions taken on it, routes them to the tier executors and renders the
//! caller's view.

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use shared::{
    domain::{DateInstanceId, UiState, UserId},
    error::{ApiError, ErrorCode},
    protocol::UiStateResponse,
};
use storage::{FlowError, SqliteWingsLedger, Storage, WingsLedger};

pub mod actions;
pub mod guards;
pub mod response;
mod router;
pub mod state;

pub use actions::{Action, Command, Tier};
pub use guards::{available_actions, check_guard, validate_action, GuardError};
pub use response::build_ui_state;
pub use router::execute_action;
pub use state::derive_state;

#[derive(Clone)]
pub struct SchedulingContext {
    pub storage: Storage,
    pub ledger: Arc<dyn WingsLedger>,
}

impl SchedulingContext {
    pub fn new(storage: Storage) -> Self {
        Self::with_ledger(storage, Arc::new(SqliteWingsLedger::default()))
    }

    pub fn with_ledger(storage: Storage, ledger: Arc<dyn WingsLedger>) -> Self {
        Self { storage, ledger }
    }
}

/// Read-only view of a date for one participant. Takes no lock and writes nothing.
pub async fn get_ui_state(
    ctx: &SchedulingContext,
    date_instance_id: DateInstanceId,
    caller_id: UserId,
) -> Result<UiStateResponse, ApiError> {
    ensure_known_user(ctx, caller_id).await?;
    let snapshot = ctx
        .storage
        .snapshot(date_instance_id, caller_id)
        .await
        .map_err(flow_failure)?;
    let view = build_ui_state(&snapshot, Utc::now());
    if view.ui_state == UiState::Inconsistent {
        warn!(%date_instance_id, version = snapshot.instance.version, "date instance is inconsistent");
    }
    Ok(view)
}

async fn ensure_known_user(ctx: &SchedulingContext, user_id: UserId) -> Result<(), ApiError> {
    if ctx.storage.user_exists(user_id).await.map_err(internal)? {
        Ok(())
    } else {
        Err(ApiError::new(ErrorCode::Authorization, "unknown user"))
    }
}

fn flow_failure(err: FlowError) -> ApiError {
    match err {
        FlowError::NotFound(_) => ApiError::new(ErrorCode::NotFound, err.to_string()),
        FlowError::Rejected(message) => ApiError::new(ErrorCode::Validation, message),
        FlowError::Corrupt(_) | FlowError::Database(_) => internal(err),
    }
}

/// Keeps the whole context chain; the server logs it and masks it from clients.
fn internal(err: impl Into<anyhow::Error>) -> ApiError {
    ApiError::new(ErrorCode::Internal, format!("{:#}", err.into()))
}

#[cfg(test)]
#[path = "tests/fixtures.rs"]
mod fixtures;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_keep_their_context_chain() {
        let err = anyhow::anyhow!("database is locked").context("crediting attendance bonus");
        let api = internal(err);
        assert_eq!(api.code, ErrorCode::Internal);
        assert_eq!(api.message, "crediting attendance bonus: database is locked");
    }

    #[test]
    fn storage_failures_map_to_error_codes() {
        let missing = flow_failure(FlowError::NotFound("date instance 7".into()));
        assert_eq!(missing.code, ErrorCode::NotFound);

        let rejected = flow_failure(FlowError::rejected("slot is in the past"));
        assert_eq!(rejected.code, ErrorCode::Validation);
        assert_eq!(rejected.message, "slot is in the past");

        let corrupt = flow_failure(FlowError::Corrupt("unknown booking status 'x'".into()));
        assert_eq!(corrupt.code, ErrorCode::Internal);
    }
}
