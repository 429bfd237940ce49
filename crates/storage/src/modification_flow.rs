use sqlx::SqliteConnection;
use tracing::info;

use shared::domain::DateStatus;

use crate::{snapshot::load_instance, FlowContext, FlowError, FlowOutcome};

#[derive(Debug, Clone)]
pub struct RescheduleParams {
    pub ctx: FlowContext,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChangeVenueParams {
    pub ctx: FlowContext,
}

#[derive(Debug, Clone)]
pub struct CancelParams {
    pub ctx: FlowContext,
    pub reason: Option<String>,
}

/// Rewinds or ends an in-flight date.
#[derive(Debug, Default, Clone, Copy)]
pub struct ModificationFlow;

impl ModificationFlow {
    /// Back to availability syncing. The date type survives; everything downstream
    /// of the time choice is cleared.
    pub async fn reschedule(
        &self,
        conn: &mut SqliteConnection,
        params: RescheduleParams,
    ) -> Result<FlowOutcome, FlowError> {
        let ctx = params.ctx;
        let instance = load_instance(conn, ctx.date_instance_id).await?;
        if instance.scheduled_time.is_none() {
            return Err(FlowError::rejected("there is no confirmed time to reschedule"));
        }

        sqlx::query(
            "UPDATE time_proposals SET status = 'withdrawn'
             WHERE date_instance_id = ? AND status IN ('pending', 'accepted')",
        )
        .bind(ctx.date_instance_id.0)
        .execute(&mut *conn)
        .await?;
        sqlx::query(
            "UPDATE date_instances
             SET status = 'scheduling', scheduled_time = NULL, duration_minutes = NULL,
                 venue_id = NULL, venue_proposal_status = NULL, booking_status = NULL,
                 booking_reference = NULL, initiator_confirmed_at = NULL,
                 receiver_confirmed_at = NULL, decision_window_end = NULL, updated_at = ?
             WHERE id = ?",
        )
        .bind(ctx.now)
        .bind(ctx.date_instance_id.0)
        .execute(&mut *conn)
        .await?;

        info!(
            date_instance_id = %ctx.date_instance_id,
            role = %ctx.role,
            reason = params.reason.as_deref().unwrap_or(""),
            "date rescheduled"
        );
        Ok(FlowOutcome::new("date moved back to picking a time"))
    }

    pub async fn change_venue(
        &self,
        conn: &mut SqliteConnection,
        params: ChangeVenueParams,
    ) -> Result<FlowOutcome, FlowError> {
        let ctx = params.ctx;
        let instance = load_instance(conn, ctx.date_instance_id).await?;
        if instance.venue.is_none() {
            return Err(FlowError::rejected("there is no venue to change"));
        }

        sqlx::query(
            "UPDATE date_instances
             SET status = 'scheduling', venue_id = NULL, venue_proposal_status = NULL,
                 booking_status = NULL, booking_reference = NULL,
                 initiator_confirmed_at = NULL, receiver_confirmed_at = NULL,
                 decision_window_end = NULL, updated_at = ?
             WHERE id = ?",
        )
        .bind(ctx.now)
        .bind(ctx.date_instance_id.0)
        .execute(&mut *conn)
        .await?;

        Ok(FlowOutcome::new("venue cleared, pick a new one"))
    }

    pub async fn cancel(
        &self,
        conn: &mut SqliteConnection,
        params: CancelParams,
    ) -> Result<FlowOutcome, FlowError> {
        let ctx = params.ctx;
        let instance = load_instance(conn, ctx.date_instance_id).await?;
        if matches!(instance.status, DateStatus::Cancelled | DateStatus::Completed) {
            return Err(FlowError::rejected(format!(
                "date is already {}",
                instance.status
            )));
        }

        sqlx::query(
            "UPDATE date_instances
             SET status = 'cancelled', decision_window_end = NULL, updated_at = ?
             WHERE id = ?",
        )
        .bind(ctx.now)
        .bind(ctx.date_instance_id.0)
        .execute(&mut *conn)
        .await?;

        info!(
            date_instance_id = %ctx.date_instance_id,
            role = %ctx.role,
            reason = params.reason.as_deref().unwrap_or(""),
            "date cancelled"
        );
        Ok(FlowOutcome::new("date cancelled"))
    }
}
