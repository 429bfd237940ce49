use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use shared::domain::{
    DateInstance, DateInstanceId, DateInstanceSnapshot, DateTypeCore, LogisticsEvent,
    MatchId, ParticipantFeedback, PartnerInfo, ProposalId, TimeProposal, UserId, VenueId,
    VenueRef,
};

use crate::FlowError;

const INSTANCE_COLUMNS: &str = "
    d.id, d.match_id, d.initiator_id, d.receiver_id, d.status, d.scheduled_time,
    d.duration_minutes, d.date_type, d.venue_id, d.venue_proposal_status, d.booking_status,
    d.booking_reference, d.initiator_confirmed_at, d.receiver_confirmed_at,
    d.initiator_feedback_status, d.initiator_decision, d.initiator_did_meet, d.initiator_feedback_text,
    d.receiver_feedback_status, d.receiver_decision, d.receiver_did_meet, d.receiver_feedback_text,
    d.decision_window_end, d.version, d.created_at, d.updated_at,
    v.name AS venue_name, v.address AS venue_address, v.date_type AS venue_date_type";

/// Takes the write lock on the instance row for the rest of the transaction.
///
/// SQLite has no `SELECT ... FOR UPDATE`; the first write in a transaction acquires
/// the database's reserved lock, so concurrent executors serialize here until the
/// holder commits or rolls back. Returns false when the row does not exist.
pub async fn lock_date_instance(
    conn: &mut SqliteConnection,
    date_instance_id: DateInstanceId,
) -> Result<bool, FlowError> {
    let result = sqlx::query("UPDATE date_instances SET version = version + 1 WHERE id = ?")
        .bind(date_instance_id.0)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn load_instance(
    conn: &mut SqliteConnection,
    date_instance_id: DateInstanceId,
) -> Result<DateInstance, FlowError> {
    let query = format!(
        "SELECT {INSTANCE_COLUMNS}
         FROM date_instances d
         LEFT JOIN venues v ON v.id = d.venue_id
         WHERE d.id = ?"
    );
    let row = sqlx::query(&query)
        .bind(date_instance_id.0)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| FlowError::NotFound(format!("date instance {date_instance_id}")))?;
    instance_from_row(&row)
}

/// Loads everything the engine needs for one caller. Callers who are not one of
/// the two participants get `NotFound`, the same as for a missing instance.
pub async fn fetch_snapshot(
    conn: &mut SqliteConnection,
    date_instance_id: DateInstanceId,
    caller_id: UserId,
) -> Result<DateInstanceSnapshot, FlowError> {
    let instance = load_instance(conn, date_instance_id).await?;
    let my_role = instance
        .role_of(caller_id)
        .ok_or_else(|| FlowError::NotFound(format!("date instance {date_instance_id}")))?;
    let partner_id = instance.user_for(my_role.partner());

    let partner_row = sqlx::query("SELECT display_name FROM users WHERE id = ?")
        .bind(partner_id.0)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| FlowError::Corrupt(format!("partner user {partner_id} missing")))?;
    let partner = PartnerInfo {
        user_id: partner_id,
        display_name: partner_row.try_get("display_name")?,
    };

    let proposals = sqlx::query(
        "SELECT id, proposed_by, starts_at, duration_minutes, status
         FROM time_proposals
         WHERE date_instance_id = ?
         ORDER BY starts_at ASC, id ASC",
    )
    .bind(date_instance_id.0)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|row| -> Result<TimeProposal, FlowError> {
        Ok(TimeProposal {
            proposal_id: ProposalId(row.try_get("id")?),
            proposed_by: UserId(row.try_get("proposed_by")?),
            starts_at: row.try_get("starts_at")?,
            duration_minutes: row.try_get("duration_minutes")?,
            status: row.try_get::<String, _>("status")?.parse()?,
        })
    })
    .collect::<Result<Vec<_>, FlowError>>()?;

    let venue_options = match instance.date_type {
        Some(date_type) => venues_for_type(conn, date_type).await?,
        None => Vec::new(),
    };

    let logistics = sqlx::query(
        "SELECT user_id, kind, minutes, created_at
         FROM logistics_events
         WHERE date_instance_id = ?
         ORDER BY id ASC",
    )
    .bind(date_instance_id.0)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|row| -> Result<LogisticsEvent, FlowError> {
        Ok(LogisticsEvent {
            user_id: UserId(row.try_get("user_id")?),
            kind: row.try_get::<String, _>("kind")?.parse()?,
            minutes: row.try_get("minutes")?,
            created_at: row.try_get("created_at")?,
        })
    })
    .collect::<Result<Vec<_>, FlowError>>()?;

    Ok(DateInstanceSnapshot {
        instance,
        caller_id,
        my_role,
        partner,
        proposals,
        venue_options,
        logistics,
    })
}

pub(crate) async fn load_venue(
    conn: &mut SqliteConnection,
    venue_id: &VenueId,
) -> Result<VenueRef, FlowError> {
    let row = sqlx::query("SELECT id, name, address, date_type FROM venues WHERE id = ?")
        .bind(&venue_id.0)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| FlowError::NotFound(format!("venue {venue_id}")))?;
    venue_from_row(&row)
}

async fn venues_for_type(
    conn: &mut SqliteConnection,
    date_type: DateTypeCore,
) -> Result<Vec<VenueRef>, FlowError> {
    let rows = sqlx::query(
        "SELECT id, name, address, date_type FROM venues WHERE date_type = ? ORDER BY name ASC",
    )
    .bind(date_type.as_str())
    .fetch_all(&mut *conn)
    .await?;
    rows.iter().map(venue_from_row).collect()
}

fn venue_from_row(row: &SqliteRow) -> Result<VenueRef, FlowError> {
    Ok(VenueRef {
        venue_id: VenueId(row.try_get("id")?),
        name: row.try_get("name")?,
        address: row.try_get("address")?,
        date_type: row.try_get::<String, _>("date_type")?.parse()?,
    })
}

fn instance_from_row(row: &SqliteRow) -> Result<DateInstance, FlowError> {
    let venue = match row.try_get::<Option<String>, _>("venue_id")? {
        Some(venue_id) => Some(VenueRef {
            venue_id: VenueId(venue_id),
            name: row.try_get("venue_name")?,
            address: row.try_get("venue_address")?,
            date_type: row.try_get::<String, _>("venue_date_type")?.parse()?,
        }),
        None => None,
    };

    Ok(DateInstance {
        id: DateInstanceId(row.try_get("id")?),
        match_id: MatchId(row.try_get("match_id")?),
        initiator_id: UserId(row.try_get("initiator_id")?),
        receiver_id: UserId(row.try_get("receiver_id")?),
        status: row.try_get::<String, _>("status")?.parse()?,
        scheduled_time: row.try_get::<Option<DateTime<Utc>>, _>("scheduled_time")?,
        duration_minutes: row.try_get("duration_minutes")?,
        date_type: parse_optional(row, "date_type")?,
        venue,
        venue_proposal_status: parse_optional(row, "venue_proposal_status")?,
        booking_status: parse_optional(row, "booking_status")?,
        booking_reference: row.try_get("booking_reference")?,
        initiator_confirmed_at: row.try_get("initiator_confirmed_at")?,
        receiver_confirmed_at: row.try_get("receiver_confirmed_at")?,
        initiator_feedback: ParticipantFeedback {
            status: row.try_get::<String, _>("initiator_feedback_status")?.parse()?,
            decision: parse_optional(row, "initiator_decision")?,
            did_meet: parse_optional(row, "initiator_did_meet")?,
            text: row.try_get("initiator_feedback_text")?,
        },
        receiver_feedback: ParticipantFeedback {
            status: row.try_get::<String, _>("receiver_feedback_status")?.parse()?,
            decision: parse_optional(row, "receiver_decision")?,
            did_meet: parse_optional(row, "receiver_did_meet")?,
            text: row.try_get("receiver_feedback_text")?,
        },
        decision_window_end: row.try_get("decision_window_end")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn parse_optional<T>(row: &SqliteRow, column: &str) -> Result<Option<T>, FlowError>
where
    T: std::str::FromStr<Err = shared::domain::UnknownVariant>,
{
    row.try_get::<Option<String>, _>(column)?
        .map(|raw| raw.parse::<T>().map_err(FlowError::from))
        .transpose()
}
