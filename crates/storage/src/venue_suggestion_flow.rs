use chrono::Duration;
use sqlx::SqliteConnection;
use tracing::debug;

use shared::domain::{VenueId, VenueProposalStatus};

use crate::{
    snapshot::{load_instance, load_venue},
    venue_flow::ensure_venue_fits,
    FlowContext, FlowError, FlowOutcome,
};

const RESPONSE_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone)]
pub struct SuggestVenueParams {
    pub ctx: FlowContext,
    pub venue_id: VenueId,
}

#[derive(Debug, Clone)]
pub struct AcceptVenueParams {
    pub ctx: FlowContext,
}

#[derive(Debug, Clone)]
pub struct DeclineVenueParams {
    pub ctx: FlowContext,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WithdrawVenueParams {
    pub ctx: FlowContext,
}

/// Initiator suggests a venue; the receiver accepts or declines it.
#[derive(Debug, Default, Clone, Copy)]
pub struct VenueSuggestionFlow;

impl VenueSuggestionFlow {
    pub async fn suggest_venue(
        &self,
        conn: &mut SqliteConnection,
        params: SuggestVenueParams,
    ) -> Result<FlowOutcome, FlowError> {
        let ctx = params.ctx;
        let instance = load_instance(conn, ctx.date_instance_id).await?;
        let venue = load_venue(conn, &params.venue_id).await?;
        ensure_venue_fits(&instance, &venue)?;

        sqlx::query(
            "UPDATE date_instances
             SET venue_id = ?, date_type = ?, venue_proposal_status = 'proposed',
                 booking_status = NULL, decision_window_end = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&venue.venue_id.0)
        .bind(venue.date_type.as_str())
        .bind(ctx.now + Duration::hours(RESPONSE_WINDOW_HOURS))
        .bind(ctx.now)
        .bind(ctx.date_instance_id.0)
        .execute(&mut *conn)
        .await?;

        Ok(FlowOutcome::new(format!("suggested {}", venue.name)))
    }

    pub async fn accept_venue(
        &self,
        conn: &mut SqliteConnection,
        params: AcceptVenueParams,
    ) -> Result<FlowOutcome, FlowError> {
        let ctx = params.ctx;
        ensure_proposed(conn, ctx).await?;

        sqlx::query(
            "UPDATE date_instances
             SET venue_proposal_status = 'accepted', booking_status = 'pending',
                 decision_window_end = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(ctx.now + Duration::hours(RESPONSE_WINDOW_HOURS))
        .bind(ctx.now)
        .bind(ctx.date_instance_id.0)
        .execute(&mut *conn)
        .await?;

        Ok(FlowOutcome::new("venue accepted"))
    }

    pub async fn decline_venue(
        &self,
        conn: &mut SqliteConnection,
        params: DeclineVenueParams,
    ) -> Result<FlowOutcome, FlowError> {
        let ctx = params.ctx;
        ensure_proposed(conn, ctx).await?;
        detach_venue(conn, ctx, Some(VenueProposalStatus::Declined)).await?;
        debug!(
            date_instance_id = %ctx.date_instance_id,
            reason = params.reason.as_deref().unwrap_or(""),
            "venue suggestion declined"
        );
        Ok(FlowOutcome::new("venue declined"))
    }

    pub async fn withdraw_venue(
        &self,
        conn: &mut SqliteConnection,
        params: WithdrawVenueParams,
    ) -> Result<FlowOutcome, FlowError> {
        let ctx = params.ctx;
        ensure_proposed(conn, ctx).await?;
        detach_venue(conn, ctx, None).await?;
        Ok(FlowOutcome::new("venue suggestion withdrawn"))
    }
}

async fn ensure_proposed(conn: &mut SqliteConnection, ctx: FlowContext) -> Result<(), FlowError> {
    let instance = load_instance(conn, ctx.date_instance_id).await?;
    if instance.venue.is_none()
        || instance.venue_proposal_status != Some(VenueProposalStatus::Proposed)
    {
        return Err(FlowError::rejected("no venue suggestion is awaiting a response"));
    }
    Ok(())
}

async fn detach_venue(
    conn: &mut SqliteConnection,
    ctx: FlowContext,
    proposal_status: Option<VenueProposalStatus>,
) -> Result<(), FlowError> {
    sqlx::query(
        "UPDATE date_instances
         SET venue_id = NULL, venue_proposal_status = ?, booking_status = NULL,
             decision_window_end = NULL, updated_at = ?
         WHERE id = ?",
    )
    .bind(proposal_status.map(|status| status.as_str()))
    .bind(ctx.now)
    .bind(ctx.date_instance_id.0)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
