use chrono::{DateTime, Duration, Utc};
use sqlx::SqliteConnection;
use tracing::warn;

use shared::domain::{BookingStatus, DateInstance, VenueId, VenueRef};

use crate::{
    snapshot::{load_instance, load_venue},
    FlowContext, FlowError, FlowOutcome,
};

const BOOKING_WINDOW_HOURS: i64 = 24;
const CONFIRM_LEAD_HOURS: i64 = 2;

#[derive(Debug, Clone)]
pub struct SelectVenueParams {
    pub ctx: FlowContext,
    pub venue_id: VenueId,
}

#[derive(Debug, Clone)]
pub struct SelectVenueResult {
    pub venue: VenueRef,
}

#[derive(Debug, Clone)]
pub struct ConfirmBookingParams {
    pub ctx: FlowContext,
    pub reference: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReportBookingFailedParams {
    pub ctx: FlowContext,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RetryBookingParams {
    pub ctx: FlowContext,
}

/// Choosing a catalog venue directly and tracking its reservation.
#[derive(Debug, Default, Clone, Copy)]
pub struct VenueFlow;

impl VenueFlow {
    pub async fn select_venue(
        &self,
        conn: &mut SqliteConnection,
        params: SelectVenueParams,
    ) -> Result<SelectVenueResult, FlowError> {
        let ctx = params.ctx;
        let instance = load_instance(conn, ctx.date_instance_id).await?;
        let venue = load_venue(conn, &params.venue_id).await?;
        ensure_venue_fits(&instance, &venue)?;

        sqlx::query(
            "UPDATE date_instances
             SET venue_id = ?, date_type = ?, venue_proposal_status = 'accepted',
                 booking_status = 'pending', booking_reference = NULL,
                 decision_window_end = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&venue.venue_id.0)
        .bind(venue.date_type.as_str())
        .bind(ctx.now + Duration::hours(BOOKING_WINDOW_HOURS))
        .bind(ctx.now)
        .bind(ctx.date_instance_id.0)
        .execute(&mut *conn)
        .await?;

        Ok(SelectVenueResult { venue })
    }

    pub async fn confirm_booking(
        &self,
        conn: &mut SqliteConnection,
        params: ConfirmBookingParams,
    ) -> Result<FlowOutcome, FlowError> {
        let ctx = params.ctx;
        let instance = load_instance(conn, ctx.date_instance_id).await?;
        if !matches!(instance.booking_status, None | Some(BookingStatus::Pending)) {
            return Err(FlowError::rejected("booking is not pending"));
        }
        let Some(scheduled_time) = instance.scheduled_time else {
            return Err(FlowError::rejected("no time has been confirmed"));
        };

        sqlx::query(
            "UPDATE date_instances
             SET booking_status = 'booked', booking_reference = ?, decision_window_end = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(params.reference.as_deref())
        .bind(confirmation_deadline(scheduled_time, ctx.now))
        .bind(ctx.now)
        .bind(ctx.date_instance_id.0)
        .execute(&mut *conn)
        .await?;

        Ok(FlowOutcome::new("booking confirmed"))
    }

    pub async fn report_booking_failed(
        &self,
        conn: &mut SqliteConnection,
        params: ReportBookingFailedParams,
    ) -> Result<FlowOutcome, FlowError> {
        let ctx = params.ctx;
        let instance = load_instance(conn, ctx.date_instance_id).await?;
        if !matches!(instance.booking_status, None | Some(BookingStatus::Pending)) {
            return Err(FlowError::rejected("booking is not pending"));
        }

        sqlx::query(
            "UPDATE date_instances
             SET booking_status = 'failed', decision_window_end = NULL, updated_at = ?
             WHERE id = ?",
        )
        .bind(ctx.now)
        .bind(ctx.date_instance_id.0)
        .execute(&mut *conn)
        .await?;

        warn!(
            date_instance_id = %ctx.date_instance_id,
            reason = params.reason.as_deref().unwrap_or("unspecified"),
            "venue booking failed"
        );
        Ok(FlowOutcome::new("booking marked as failed"))
    }

    pub async fn retry_booking(
        &self,
        conn: &mut SqliteConnection,
        params: RetryBookingParams,
    ) -> Result<FlowOutcome, FlowError> {
        let ctx = params.ctx;
        let instance = load_instance(conn, ctx.date_instance_id).await?;
        if instance.booking_status != Some(BookingStatus::Failed) {
            return Err(FlowError::rejected("only a failed booking can be retried"));
        }

        sqlx::query(
            "UPDATE date_instances
             SET booking_status = 'pending', decision_window_end = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(ctx.now + Duration::hours(BOOKING_WINDOW_HOURS))
        .bind(ctx.now)
        .bind(ctx.date_instance_id.0)
        .execute(&mut *conn)
        .await?;

        Ok(FlowOutcome::new("booking retry started"))
    }
}

/// Shared by direct selection and suggestions: a venue needs a confirmed time,
/// no venue already attached, and must match the date type when one is set.
pub(crate) fn ensure_venue_fits(instance: &DateInstance, venue: &VenueRef) -> Result<(), FlowError> {
    if instance.scheduled_time.is_none() {
        return Err(FlowError::rejected("confirm a time before choosing a venue"));
    }
    if instance.venue.is_some() {
        return Err(FlowError::rejected("a venue has already been chosen"));
    }
    if let Some(date_type) = instance.date_type {
        if date_type != venue.date_type {
            return Err(FlowError::rejected(format!(
                "venue is for {} dates, this date is {date_type}",
                venue.date_type
            )));
        }
    }
    Ok(())
}

/// Attendance should be confirmed two hours ahead; bookings made closer than
/// that get until the start time.
fn confirmation_deadline(scheduled_time: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let lead = scheduled_time - Duration::hours(CONFIRM_LEAD_HOURS);
    if lead > now {
        lead
    } else {
        scheduled_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirmation_deadline_leaves_lead_time_when_possible() {
        let now = Utc::now();
        let scheduled = now + Duration::hours(10);
        assert_eq!(
            confirmation_deadline(scheduled, now),
            scheduled - Duration::hours(2)
        );
    }

    #[test]
    fn confirmation_deadline_falls_back_to_start_time() {
        let now = Utc::now();
        let scheduled = now + Duration::minutes(45);
        assert_eq!(confirmation_deadline(scheduled, now), scheduled);
    }
}
