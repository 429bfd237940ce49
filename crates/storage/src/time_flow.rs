use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqliteConnection};
use tracing::debug;

use shared::domain::{DateTypeCore, ProposalId, ProposalStatus};

use crate::{snapshot::load_instance, FlowContext, FlowError, FlowOutcome};

pub const MAX_SLOTS: usize = 5;
pub const DEFAULT_DURATION_MINUTES: i64 = 90;
const MIN_DURATION_MINUTES: i64 = 30;
const MAX_DURATION_MINUTES: i64 = 240;
const PROPOSAL_WINDOW_HOURS: i64 = 24;
const VENUE_WINDOW_HOURS: i64 = 48;

#[derive(Debug, Clone)]
pub struct SlotInput {
    pub starts_at: DateTime<Utc>,
    pub duration_minutes: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct SuggestTimesParams {
    pub ctx: FlowContext,
    pub slots: Vec<SlotInput>,
}

#[derive(Debug, Clone)]
pub struct SuggestTimesResult {
    pub proposal_ids: Vec<ProposalId>,
    pub decision_window_end: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct WithdrawTimesParams {
    pub ctx: FlowContext,
}

#[derive(Debug, Clone)]
pub struct ConfirmTimeParams {
    pub ctx: FlowContext,
    pub proposal_id: ProposalId,
}

#[derive(Debug, Clone)]
pub struct ConfirmTimeResult {
    pub scheduled_time: DateTime<Utc>,
    pub duration_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct RejectTimesParams {
    pub ctx: FlowContext,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SetDateTypeParams {
    pub ctx: FlowContext,
    pub date_type: DateTypeCore,
}

/// Time proposal, confirmation and rejection, plus the date type choice.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimeFlow;

impl TimeFlow {
    pub async fn suggest_times(
        &self,
        conn: &mut SqliteConnection,
        params: SuggestTimesParams,
    ) -> Result<SuggestTimesResult, FlowError> {
        let ctx = params.ctx;
        if params.slots.is_empty() || params.slots.len() > MAX_SLOTS {
            return Err(FlowError::rejected(format!(
                "suggest between 1 and {MAX_SLOTS} time slots"
            )));
        }
        for slot in &params.slots {
            if slot.starts_at <= ctx.now {
                return Err(FlowError::rejected("time slots must be in the future"));
            }
            let duration = slot.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES);
            if !(MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&duration) {
                return Err(FlowError::rejected(format!(
                    "duration must be between {MIN_DURATION_MINUTES} and {MAX_DURATION_MINUTES} minutes"
                )));
            }
        }

        let instance = load_instance(conn, ctx.date_instance_id).await?;
        if instance.scheduled_time.is_some() {
            return Err(FlowError::rejected("a time has already been confirmed"));
        }
        let pending: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM time_proposals WHERE date_instance_id = ? AND status = 'pending'",
        )
        .bind(ctx.date_instance_id.0)
        .fetch_one(&mut *conn)
        .await?;
        if pending > 0 {
            return Err(FlowError::rejected(
                "time slots are already awaiting confirmation",
            ));
        }

        let mut proposal_ids = Vec::with_capacity(params.slots.len());
        for slot in &params.slots {
            let row = sqlx::query(
                "INSERT INTO time_proposals (date_instance_id, proposed_by, starts_at, duration_minutes, status, created_at)
                 VALUES (?, ?, ?, ?, 'pending', ?)
                 RETURNING id",
            )
            .bind(ctx.date_instance_id.0)
            .bind(ctx.caller_id.0)
            .bind(slot.starts_at)
            .bind(slot.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES))
            .bind(ctx.now)
            .fetch_one(&mut *conn)
            .await?;
            proposal_ids.push(ProposalId(row.try_get(0)?));
        }

        let decision_window_end = ctx.now + Duration::hours(PROPOSAL_WINDOW_HOURS);
        sqlx::query("UPDATE date_instances SET decision_window_end = ?, updated_at = ? WHERE id = ?")
            .bind(decision_window_end)
            .bind(ctx.now)
            .bind(ctx.date_instance_id.0)
            .execute(&mut *conn)
            .await?;

        debug!(date_instance_id = %ctx.date_instance_id, slots = proposal_ids.len(), "time slots suggested");
        Ok(SuggestTimesResult {
            proposal_ids,
            decision_window_end,
        })
    }

    pub async fn withdraw_times(
        &self,
        conn: &mut SqliteConnection,
        params: WithdrawTimesParams,
    ) -> Result<FlowOutcome, FlowError> {
        let ctx = params.ctx;
        let withdrawn = sqlx::query(
            "UPDATE time_proposals SET status = 'withdrawn'
             WHERE date_instance_id = ? AND proposed_by = ? AND status = 'pending'",
        )
        .bind(ctx.date_instance_id.0)
        .bind(ctx.caller_id.0)
        .execute(&mut *conn)
        .await?
        .rows_affected();
        if withdrawn == 0 {
            return Err(FlowError::rejected("no pending time slots to withdraw"));
        }

        clear_window(conn, ctx).await?;
        Ok(FlowOutcome::new(format!("withdrew {withdrawn} time slot(s)")))
    }

    pub async fn confirm_time(
        &self,
        conn: &mut SqliteConnection,
        params: ConfirmTimeParams,
    ) -> Result<ConfirmTimeResult, FlowError> {
        let ctx = params.ctx;
        let instance = load_instance(conn, ctx.date_instance_id).await?;
        if instance.scheduled_time.is_some() {
            return Err(FlowError::rejected("time already confirmed"));
        }

        let row = sqlx::query(
            "SELECT starts_at, duration_minutes, status FROM time_proposals
             WHERE id = ? AND date_instance_id = ?",
        )
        .bind(params.proposal_id.0)
        .bind(ctx.date_instance_id.0)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| FlowError::NotFound(format!("time proposal {}", params.proposal_id)))?;
        let starts_at: DateTime<Utc> = row.try_get("starts_at")?;
        let duration_minutes: i64 = row.try_get("duration_minutes")?;
        let status: ProposalStatus = row.try_get::<String, _>("status")?.parse()?;

        if status != ProposalStatus::Pending {
            return Err(FlowError::rejected("time proposal is no longer pending"));
        }
        if starts_at <= ctx.now {
            return Err(FlowError::rejected("time slot has already passed"));
        }

        sqlx::query("UPDATE time_proposals SET status = 'accepted' WHERE id = ?")
            .bind(params.proposal_id.0)
            .execute(&mut *conn)
            .await?;
        sqlx::query(
            "UPDATE time_proposals SET status = 'rejected'
             WHERE date_instance_id = ? AND status = 'pending'",
        )
        .bind(ctx.date_instance_id.0)
        .execute(&mut *conn)
        .await?;
        sqlx::query(
            "UPDATE date_instances
             SET scheduled_time = ?, duration_minutes = ?, decision_window_end = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(starts_at)
        .bind(duration_minutes)
        .bind(ctx.now + Duration::hours(VENUE_WINDOW_HOURS))
        .bind(ctx.now)
        .bind(ctx.date_instance_id.0)
        .execute(&mut *conn)
        .await?;

        Ok(ConfirmTimeResult {
            scheduled_time: starts_at,
            duration_minutes,
        })
    }

    pub async fn reject_times(
        &self,
        conn: &mut SqliteConnection,
        params: RejectTimesParams,
    ) -> Result<FlowOutcome, FlowError> {
        let ctx = params.ctx;
        let rejected = sqlx::query(
            "UPDATE time_proposals SET status = 'rejected'
             WHERE date_instance_id = ? AND status = 'pending'",
        )
        .bind(ctx.date_instance_id.0)
        .execute(&mut *conn)
        .await?
        .rows_affected();
        if rejected == 0 {
            return Err(FlowError::rejected("no pending time slots to reject"));
        }

        clear_window(conn, ctx).await?;
        debug!(
            date_instance_id = %ctx.date_instance_id,
            reason = params.reason.as_deref().unwrap_or(""),
            "time slots rejected"
        );
        Ok(FlowOutcome::new("time slots rejected"))
    }

    pub async fn set_date_type(
        &self,
        conn: &mut SqliteConnection,
        params: SetDateTypeParams,
    ) -> Result<FlowOutcome, FlowError> {
        let ctx = params.ctx;
        let instance = load_instance(conn, ctx.date_instance_id).await?;
        if instance.venue.is_some() {
            return Err(FlowError::rejected(
                "date type is locked once a venue is chosen",
            ));
        }

        sqlx::query("UPDATE date_instances SET date_type = ?, updated_at = ? WHERE id = ?")
            .bind(params.date_type.as_str())
            .bind(ctx.now)
            .bind(ctx.date_instance_id.0)
            .execute(&mut *conn)
            .await?;
        Ok(FlowOutcome::new(format!(
            "date type set to {}",
            params.date_type
        )))
    }
}

pub(crate) async fn clear_window(
    conn: &mut SqliteConnection,
    ctx: FlowContext,
) -> Result<(), FlowError> {
    sqlx::query("UPDATE date_instances SET decision_window_end = NULL, updated_at = ? WHERE id = ?")
        .bind(ctx.now)
        .bind(ctx.date_instance_id.0)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
