use chrono::Duration;
use sqlx::SqliteConnection;

use shared::domain::LogisticsEventKind;

use crate::{role_columns, snapshot::load_instance, FlowContext, FlowError, FlowOutcome};

const MAX_LATE_MINUTES: i64 = 120;
const ACTIVE_WINDOW_AFTER_START_HOURS: i64 = 2;
const FEEDBACK_WINDOW_HOURS: i64 = 72;

#[derive(Debug, Clone)]
pub struct ConfirmAttendanceParams {
    pub ctx: FlowContext,
}

#[derive(Debug, Clone)]
pub struct ConfirmAttendanceResult {
    pub both_confirmed: bool,
}

#[derive(Debug, Clone)]
pub struct RunningLateParams {
    pub ctx: FlowContext,
    pub minutes: i64,
}

#[derive(Debug, Clone)]
pub struct ArrivedParams {
    pub ctx: FlowContext,
}

/// Attendance confirmation and day-of signals.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogisticsFlow;

impl LogisticsFlow {
    pub async fn confirm_attendance(
        &self,
        conn: &mut SqliteConnection,
        params: ConfirmAttendanceParams,
    ) -> Result<ConfirmAttendanceResult, FlowError> {
        let ctx = params.ctx;
        let instance = load_instance(conn, ctx.date_instance_id).await?;
        if instance.confirmed_at(ctx.role).is_some() {
            return Err(FlowError::rejected("you have already confirmed attendance"));
        }
        let Some(scheduled_time) = instance.scheduled_time else {
            return Err(FlowError::rejected("no time has been confirmed"));
        };

        let columns = role_columns(ctx.role);
        sqlx::query(&format!(
            "UPDATE date_instances SET {} = ?, updated_at = ? WHERE id = ?",
            columns.confirmed_at
        ))
        .bind(ctx.now)
        .bind(ctx.now)
        .bind(ctx.date_instance_id.0)
        .execute(&mut *conn)
        .await?;

        let both_confirmed = instance.confirmed_at(ctx.role.partner()).is_some();
        if both_confirmed {
            let feedback_deadline = scheduled_time
                + Duration::hours(ACTIVE_WINDOW_AFTER_START_HOURS)
                + Duration::hours(FEEDBACK_WINDOW_HOURS);
            sqlx::query(
                "UPDATE date_instances SET status = 'scheduled', decision_window_end = ? WHERE id = ?",
            )
            .bind(feedback_deadline)
            .bind(ctx.date_instance_id.0)
            .execute(&mut *conn)
            .await?;
        }

        Ok(ConfirmAttendanceResult { both_confirmed })
    }

    pub async fn running_late(
        &self,
        conn: &mut SqliteConnection,
        params: RunningLateParams,
    ) -> Result<FlowOutcome, FlowError> {
        if !(1..=MAX_LATE_MINUTES).contains(&params.minutes) {
            return Err(FlowError::rejected(format!(
                "running late must be between 1 and {MAX_LATE_MINUTES} minutes"
            )));
        }
        record_event(
            conn,
            params.ctx,
            LogisticsEventKind::RunningLate,
            Some(params.minutes),
        )
        .await?;
        Ok(FlowOutcome::new(format!(
            "partner told you are {} minutes late",
            params.minutes
        )))
    }

    pub async fn arrived(
        &self,
        conn: &mut SqliteConnection,
        params: ArrivedParams,
    ) -> Result<FlowOutcome, FlowError> {
        let ctx = params.ctx;
        let already: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM logistics_events
             WHERE date_instance_id = ? AND user_id = ? AND kind = 'arrived'",
        )
        .bind(ctx.date_instance_id.0)
        .bind(ctx.caller_id.0)
        .fetch_one(&mut *conn)
        .await?;
        if already > 0 {
            return Err(FlowError::rejected("arrival already recorded"));
        }

        record_event(conn, ctx, LogisticsEventKind::Arrived, None).await?;
        Ok(FlowOutcome::new("partner told you have arrived"))
    }
}

async fn record_event(
    conn: &mut SqliteConnection,
    ctx: FlowContext,
    kind: LogisticsEventKind,
    minutes: Option<i64>,
) -> Result<(), FlowError> {
    sqlx::query(
        "INSERT INTO logistics_events (date_instance_id, user_id, kind, minutes, created_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(ctx.date_instance_id.0)
    .bind(ctx.caller_id.0)
    .bind(kind.as_str())
    .bind(minutes)
    .bind(ctx.now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
