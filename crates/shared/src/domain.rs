use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(MatchId);
id_newtype!(DateInstanceId);
id_newtype!(ProposalId);

/// Venue identifiers come from the venue catalog and are opaque strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VenueId(pub String);

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error returned when a persisted or wire string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! string_enum {
    ($name:ident, $kind:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

string_enum!(ParticipantRole, "participant role" {
    Initiator => "initiator",
    Receiver => "receiver",
});

string_enum!(DateStatus, "date status" {
    Scheduling => "scheduling",
    Scheduled => "scheduled",
    Completed => "completed",
    Cancelled => "cancelled",
});

string_enum!(DateTypeCore, "date type" {
    Coffee => "coffee",
    Drinks => "drinks",
    Dinner => "dinner",
    Activity => "activity",
    Walk => "walk",
});

string_enum!(VenueProposalStatus, "venue proposal status" {
    Proposed => "proposed",
    Accepted => "accepted",
    Declined => "declined",
});

string_enum!(BookingStatus, "booking status" {
    Pending => "pending",
    Booked => "booked",
    Failed => "failed",
});

string_enum!(ProposalStatus, "proposal status" {
    Pending => "pending",
    Accepted => "accepted",
    Rejected => "rejected",
    Withdrawn => "withdrawn",
});

string_enum!(FeedbackStatus, "feedback status" {
    Pending => "pending",
    Submitted => "submitted",
    Skipped => "skipped",
});

string_enum!(FeedbackDecision, "feedback decision" {
    Again => "again",
    Pass => "pass",
});

string_enum!(DidMeet, "did meet" {
    Yes => "yes",
    No => "no",
});

string_enum!(LogisticsEventKind, "logistics event" {
    RunningLate => "running_late",
    Arrived => "arrived",
});

// Derived from a snapshot on every request; never persisted.
string_enum!(UiState, "ui state" {
    SyncingAvailability => "syncing_availability",
    AwaitingTimeConfirmation => "awaiting_time_confirmation",
    SelectingVenue => "selecting_venue",
    VenueProposedToReceiver => "venue_proposed_to_receiver",
    AwaitingBooking => "awaiting_booking",
    AwaitingConfirmation => "awaiting_confirmation",
    DateScheduled => "date_scheduled",
    LogisticsPanel => "logistics_panel",
    AwaitingFeedback => "awaiting_feedback",
    Completed => "completed",
    Cancelled => "cancelled",
    Expired => "expired",
    BookingFailed => "booking_failed",
    Inconsistent => "inconsistent",
});

impl UiState {
    /// Human-facing name, used when no status line is mapped for a state.
    pub fn display_name(self) -> &'static str {
        match self {
            UiState::SyncingAvailability => "Syncing Availability",
            UiState::AwaitingTimeConfirmation => "Awaiting Time Confirmation",
            UiState::SelectingVenue => "Selecting Venue",
            UiState::VenueProposedToReceiver => "Venue Proposed",
            UiState::AwaitingBooking => "Awaiting Booking",
            UiState::AwaitingConfirmation => "Awaiting Confirmation",
            UiState::DateScheduled => "Date Scheduled",
            UiState::LogisticsPanel => "Logistics",
            UiState::AwaitingFeedback => "Awaiting Feedback",
            UiState::Completed => "Completed",
            UiState::Cancelled => "Cancelled",
            UiState::Expired => "Expired",
            UiState::BookingFailed => "Booking Failed",
            UiState::Inconsistent => "Inconsistent",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UiState::Completed | UiState::Cancelled | UiState::Expired | UiState::Inconsistent
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueRef {
    pub venue_id: VenueId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub date_type: DateTypeCore,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantFeedback {
    pub status: FeedbackStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<FeedbackDecision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub did_meet: Option<DidMeet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Default for ParticipantFeedback {
    fn default() -> Self {
        Self {
            status: FeedbackStatus::Pending,
            decision: None,
            did_meet: None,
            text: None,
        }
    }
}

/// The persisted aggregate the scheduling engine operates on.
///
/// `initiator_id` and `receiver_id` are fixed at creation and never reassigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateInstance {
    pub id: DateInstanceId,
    pub match_id: MatchId,
    pub initiator_id: UserId,
    pub receiver_id: UserId,
    pub status: DateStatus,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
    pub date_type: Option<DateTypeCore>,
    pub venue: Option<VenueRef>,
    pub venue_proposal_status: Option<VenueProposalStatus>,
    pub booking_status: Option<BookingStatus>,
    pub booking_reference: Option<String>,
    pub initiator_confirmed_at: Option<DateTime<Utc>>,
    pub receiver_confirmed_at: Option<DateTime<Utc>>,
    pub initiator_feedback: ParticipantFeedback,
    pub receiver_feedback: ParticipantFeedback,
    pub decision_window_end: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DateInstance {
    pub fn role_of(&self, user_id: UserId) -> Option<ParticipantRole> {
        if user_id == self.initiator_id {
            Some(ParticipantRole::Initiator)
        } else if user_id == self.receiver_id {
            Some(ParticipantRole::Receiver)
        } else {
            None
        }
    }

    pub fn user_for(&self, role: ParticipantRole) -> UserId {
        match role {
            ParticipantRole::Initiator => self.initiator_id,
            ParticipantRole::Receiver => self.receiver_id,
        }
    }

    pub fn confirmed_at(&self, role: ParticipantRole) -> Option<DateTime<Utc>> {
        match role {
            ParticipantRole::Initiator => self.initiator_confirmed_at,
            ParticipantRole::Receiver => self.receiver_confirmed_at,
        }
    }

    pub fn feedback(&self, role: ParticipantRole) -> &ParticipantFeedback {
        match role {
            ParticipantRole::Initiator => &self.initiator_feedback,
            ParticipantRole::Receiver => &self.receiver_feedback,
        }
    }
}

impl ParticipantRole {
    pub fn partner(self) -> ParticipantRole {
        match self {
            ParticipantRole::Initiator => ParticipantRole::Receiver,
            ParticipantRole::Receiver => ParticipantRole::Initiator,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeProposal {
    pub proposal_id: ProposalId,
    pub proposed_by: UserId,
    pub starts_at: DateTime<Utc>,
    pub duration_minutes: i64,
    pub status: ProposalStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogisticsEvent {
    pub user_id: UserId,
    pub kind: LogisticsEventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minutes: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerInfo {
    pub user_id: UserId,
    pub display_name: String,
}

/// Everything the engine needs to derive state and render a response for one caller.
#[derive(Debug, Clone)]
pub struct DateInstanceSnapshot {
    pub instance: DateInstance,
    pub caller_id: UserId,
    pub my_role: ParticipantRole,
    pub partner: PartnerInfo,
    pub proposals: Vec<TimeProposal>,
    pub venue_options: Vec<VenueRef>,
    pub logistics: Vec<LogisticsEvent>,
}

impl DateInstanceSnapshot {
    pub fn has_pending_proposals(&self) -> bool {
        self.proposals
            .iter()
            .any(|p| p.status == ProposalStatus::Pending)
    }

    /// True when proposals were made and every one of them ended up rejected.
    pub fn all_proposals_rejected(&self) -> bool {
        !self.proposals.is_empty()
            && self
                .proposals
                .iter()
                .all(|p| p.status == ProposalStatus::Rejected)
    }
}
