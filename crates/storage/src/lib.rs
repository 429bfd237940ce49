use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite, Transaction,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};
use thiserror::Error;

use shared::domain::{
    DateInstance, DateInstanceId, DateInstanceSnapshot, DateTypeCore, MatchId, ParticipantRole,
    UnknownVariant, UserId, VenueRef,
};

mod feedback_flow;
mod ledger;
mod logistics_flow;
mod modification_flow;
mod snapshot;
mod time_flow;
mod venue_flow;
mod venue_suggestion_flow;

pub use feedback_flow::{
    DidMeetParams, DidMeetResult, FeedbackFlow, SkipFeedbackParams, SubmitFeedbackParams,
    SubmitFeedbackResult,
};
pub use ledger::{CreditKind, SqliteWingsLedger, WingsCredit, WingsLedger};
pub use logistics_flow::{
    ArrivedParams, ConfirmAttendanceParams, ConfirmAttendanceResult, LogisticsFlow,
    RunningLateParams,
};
pub use modification_flow::{CancelParams, ChangeVenueParams, ModificationFlow, RescheduleParams};
pub use snapshot::{fetch_snapshot, load_instance, lock_date_instance};
pub use time_flow::{
    ConfirmTimeParams, ConfirmTimeResult, RejectTimesParams, SetDateTypeParams, SlotInput,
    SuggestTimesParams, SuggestTimesResult, TimeFlow, WithdrawTimesParams,
};
pub use venue_flow::{
    ConfirmBookingParams, ReportBookingFailedParams, RetryBookingParams, SelectVenueParams,
    SelectVenueResult, VenueFlow,
};
pub use venue_suggestion_flow::{
    AcceptVenueParams, DeclineVenueParams, SuggestVenueParams, VenueSuggestionFlow,
    WithdrawVenueParams,
};

/// Failure of a snapshot read or a tier executor.
///
/// `Rejected` and `NotFound` are business outcomes the caller reports back to the
/// user. `Corrupt` and `Database` are infrastructure failures.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("{0}")]
    Rejected(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl FlowError {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }
}

impl From<UnknownVariant> for FlowError {
    fn from(value: UnknownVariant) -> Self {
        Self::Corrupt(value.to_string())
    }
}

/// Who is acting on which instance, and at what instant. Passed to every executor.
#[derive(Debug, Clone, Copy)]
pub struct FlowContext {
    pub date_instance_id: DateInstanceId,
    pub caller_id: UserId,
    pub role: ParticipantRole,
    pub now: DateTime<Utc>,
}

/// Result of executors whose only output is a confirmation line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowOutcome {
    pub message: String,
}

impl FlowOutcome {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        // Every in-memory connection is its own database.
        let max_connections = if sqlite_path(database_url).is_none() { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .context("failed to begin transaction")
    }

    /// Read-only snapshot outside any transaction.
    pub async fn snapshot(
        &self,
        date_instance_id: DateInstanceId,
        caller_id: UserId,
    ) -> Result<DateInstanceSnapshot, FlowError> {
        let mut conn = self.pool.acquire().await?;
        fetch_snapshot(&mut conn, date_instance_id, caller_id).await
    }

    pub async fn date_instance(&self, date_instance_id: DateInstanceId) -> Result<DateInstance, FlowError> {
        let mut conn = self.pool.acquire().await?;
        load_instance(&mut conn, date_instance_id).await
    }

    pub async fn user_exists(&self, user_id: UserId) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM users WHERE id = ?")
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    pub async fn create_user(&self, username: &str, display_name: &str) -> Result<UserId> {
        let rec = sqlx::query(
            "INSERT INTO users (username, display_name) VALUES (?, ?)
             ON CONFLICT(username) DO UPDATE SET display_name=excluded.display_name
             RETURNING id",
        )
        .bind(username)
        .bind(display_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(UserId(rec.get::<i64, _>(0)))
    }

    pub async fn create_match(&self, initiator_id: UserId, receiver_id: UserId) -> Result<MatchId> {
        let rec = sqlx::query(
            "INSERT INTO matches (initiator_id, receiver_id, created_at) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(initiator_id.0)
        .bind(receiver_id.0)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(MatchId(rec.get::<i64, _>(0)))
    }

    /// Opens the scheduling lifecycle for a mutual match. Roles are copied from the
    /// match and never change afterwards.
    pub async fn create_date_instance(&self, match_id: MatchId) -> Result<DateInstanceId> {
        let now = Utc::now();
        let rec = sqlx::query(
            "INSERT INTO date_instances (match_id, initiator_id, receiver_id, status, created_at, updated_at)
             SELECT id, initiator_id, receiver_id, 'scheduling', ?, ? FROM matches WHERE id = ?
             RETURNING id",
        )
        .bind(now)
        .bind(now)
        .bind(match_id.0)
        .fetch_optional(&self.pool)
        .await?
        .with_context(|| format!("match {match_id} not found"))?;
        Ok(DateInstanceId(rec.get::<i64, _>(0)))
    }

    pub async fn upsert_venue(&self, venue: &VenueRef) -> Result<()> {
        sqlx::query(
            "INSERT INTO venues (id, name, address, date_type) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET name=excluded.name, address=excluded.address, date_type=excluded.date_type",
        )
        .bind(&venue.venue_id.0)
        .bind(&venue.name)
        .bind(venue.address.as_deref())
        .bind(venue.date_type.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn wings_balance(&self, user_id: UserId) -> Result<i64> {
        let balance: i64 =
            sqlx::query_scalar("SELECT COALESCE(SUM(amount), 0) FROM wings_ledger WHERE user_id = ?")
                .bind(user_id.0)
                .fetch_one(&self.pool)
                .await?;
        Ok(balance)
    }

    pub async fn ledger_entry_count(&self, user_id: UserId, kind: CreditKind) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM wings_ledger WHERE user_id = ? AND kind = ?")
                .bind(user_id.0)
                .bind(kind.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    /// Overwrites scheduling columns directly. Used to stage instances in tests and
    /// for operator repair; bypasses the engine.
    pub async fn force_schedule(
        &self,
        date_instance_id: DateInstanceId,
        scheduled_time: DateTime<Utc>,
        date_type: DateTypeCore,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE date_instances
             SET scheduled_time = ?, duration_minutes = COALESCE(duration_minutes, 90), date_type = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(scheduled_time)
        .bind(date_type.as_str())
        .bind(Utc::now())
        .bind(date_instance_id.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn force_decision_window(
        &self,
        date_instance_id: DateInstanceId,
        decision_window_end: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query("UPDATE date_instances SET decision_window_end = ? WHERE id = ?")
            .bind(decision_window_end)
            .bind(date_instance_id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

/// Column names that hold one participant's half of the per-user fields.
pub(crate) struct RoleColumns {
    pub confirmed_at: &'static str,
    pub feedback_status: &'static str,
    pub decision: &'static str,
    pub did_meet: &'static str,
    pub feedback_text: &'static str,
}

pub(crate) fn role_columns(role: ParticipantRole) -> RoleColumns {
    match role {
        ParticipantRole::Initiator => RoleColumns {
            confirmed_at: "initiator_confirmed_at",
            feedback_status: "initiator_feedback_status",
            decision: "initiator_decision",
            did_meet: "initiator_did_meet",
            feedback_text: "initiator_feedback_text",
        },
        ParticipantRole::Receiver => RoleColumns {
            confirmed_at: "receiver_confirmed_at",
            feedback_status: "receiver_feedback_status",
            decision: "receiver_decision",
            did_meet: "receiver_did_meet",
            feedback_text: "receiver_feedback_text",
        },
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
