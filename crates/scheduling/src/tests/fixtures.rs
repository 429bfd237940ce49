use chrono::{DateTime, Utc};
use shared::domain::{
    DateInstance, DateInstanceId, DateInstanceSnapshot, DateStatus, MatchId, ParticipantFeedback,
    ParticipantRole, PartnerInfo, UserId,
};

pub const ALICE: UserId = UserId(1);
pub const BOB: UserId = UserId(2);

/// A freshly created instance seen by `role`: alice initiates, bob receives.
pub fn snapshot(role: ParticipantRole, now: DateTime<Utc>) -> DateInstanceSnapshot {
    let instance = DateInstance {
        id: DateInstanceId(7),
        match_id: MatchId(3),
        initiator_id: ALICE,
        receiver_id: BOB,
        status: DateStatus::Scheduling,
        scheduled_time: None,
        duration_minutes: None,
        date_type: None,
        venue: None,
        venue_proposal_status: None,
        booking_status: None,
        booking_reference: None,
        initiator_confirmed_at: None,
        receiver_confirmed_at: None,
        initiator_feedback: ParticipantFeedback::default(),
        receiver_feedback: ParticipantFeedback::default(),
        decision_window_end: None,
        version: 0,
        created_at: now,
        updated_at: now,
    };
    let (caller_id, partner) = match role {
        ParticipantRole::Initiator => (
            ALICE,
            PartnerInfo {
                user_id: BOB,
                display_name: "Bob".into(),
            },
        ),
        ParticipantRole::Receiver => (
            BOB,
            PartnerInfo {
                user_id: ALICE,
                display_name: "Alice".into(),
            },
        ),
    };
    DateInstanceSnapshot {
        instance,
        caller_id,
        my_role: role,
        partner,
        proposals: Vec::new(),
        venue_options: Vec::new(),
        logistics: Vec::new(),
    }
}
