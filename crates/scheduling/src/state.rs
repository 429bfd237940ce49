//! Derivation of the single UI state a date instance is in.
//!
//! The snapshot is reduced to [`StateFacts`], then matched against an ordered
//! decision table. The first matching row wins and the final row matches
//! everything, so derivation is total.

use chrono::{DateTime, Duration, Utc};

use shared::domain::{
    BookingStatus, DateInstanceSnapshot, DateStatus, UiState, VenueProposalStatus,
};

const ACTIVE_BEFORE_START_MINUTES: i64 = 30;
const ACTIVE_AFTER_START_HOURS: i64 = 2;

/// Where `now` falls relative to the active window
/// `[scheduled - 30min, scheduled + 2h)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPosition {
    NoTime,
    Before,
    Active,
    After,
}

impl WindowPosition {
    pub fn of(scheduled_time: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        let Some(start) = scheduled_time else {
            return WindowPosition::NoTime;
        };
        let opens = start - Duration::minutes(ACTIVE_BEFORE_START_MINUTES);
        let closes = start + Duration::hours(ACTIVE_AFTER_START_HOURS);
        if now < opens {
            WindowPosition::Before
        } else if now < closes {
            WindowPosition::Active
        } else {
            WindowPosition::After
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateFacts {
    pub status: DateStatus,
    pub time_set: bool,
    pub pending_proposals: bool,
    pub venue_attached: bool,
    pub date_type_set: bool,
    pub venue_proposal: Option<VenueProposalStatus>,
    pub booking: Option<BookingStatus>,
    pub both_confirmed: bool,
    pub window: WindowPosition,
}

impl StateFacts {
    pub fn from_snapshot(snapshot: &DateInstanceSnapshot, now: DateTime<Utc>) -> Self {
        let instance = &snapshot.instance;
        Self {
            status: instance.status,
            time_set: instance.scheduled_time.is_some(),
            pending_proposals: snapshot.has_pending_proposals(),
            venue_attached: instance.venue.is_some(),
            date_type_set: instance.date_type.is_some(),
            venue_proposal: instance.venue_proposal_status,
            booking: instance.booking_status,
            both_confirmed: instance.initiator_confirmed_at.is_some()
                && instance.receiver_confirmed_at.is_some(),
            window: WindowPosition::of(instance.scheduled_time, now),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Cond<T> {
    Any,
    Is(T),
    Not(T),
}

impl<T: PartialEq> Cond<T> {
    fn matches(&self, value: &T) -> bool {
        match self {
            Cond::Any => true,
            Cond::Is(expected) => value == expected,
            Cond::Not(excluded) => value != excluded,
        }
    }
}

struct Rule {
    status: Cond<DateStatus>,
    time_set: Cond<bool>,
    pending_proposals: Cond<bool>,
    venue_attached: Cond<bool>,
    date_type_set: Cond<bool>,
    venue_proposal: Cond<Option<VenueProposalStatus>>,
    booking: Cond<Option<BookingStatus>>,
    both_confirmed: Cond<bool>,
    window: Cond<WindowPosition>,
    state: UiState,
}

impl Rule {
    fn matches(&self, facts: &StateFacts) -> bool {
        self.status.matches(&facts.status)
            && self.time_set.matches(&facts.time_set)
            && self.pending_proposals.matches(&facts.pending_proposals)
            && self.venue_attached.matches(&facts.venue_attached)
            && self.date_type_set.matches(&facts.date_type_set)
            && self.venue_proposal.matches(&facts.venue_proposal)
            && self.booking.matches(&facts.booking)
            && self.both_confirmed.matches(&facts.both_confirmed)
            && self.window.matches(&facts.window)
    }
}

const OTHERWISE: Rule = Rule {
    status: Cond::Any,
    time_set: Cond::Any,
    pending_proposals: Cond::Any,
    venue_attached: Cond::Any,
    date_type_set: Cond::Any,
    venue_proposal: Cond::Any,
    booking: Cond::Any,
    both_confirmed: Cond::Any,
    window: Cond::Any,
    state: UiState::Inconsistent,
};

// Row order is precedence: terminal and failed first, then corruption checks,
// then the post-confirmation phases, then the scheduling steps in order.
static RULES: &[Rule] = &[
    Rule {
        status: Cond::Is(DateStatus::Cancelled),
        state: UiState::Cancelled,
        ..OTHERWISE
    },
    Rule {
        booking: Cond::Is(Some(BookingStatus::Failed)),
        state: UiState::BookingFailed,
        ..OTHERWISE
    },
    Rule {
        status: Cond::Is(DateStatus::Completed),
        state: UiState::Completed,
        ..OTHERWISE
    },
    Rule {
        venue_attached: Cond::Is(true),
        date_type_set: Cond::Is(false),
        ..OTHERWISE
    },
    Rule {
        venue_attached: Cond::Is(true),
        time_set: Cond::Is(false),
        ..OTHERWISE
    },
    Rule {
        status: Cond::Is(DateStatus::Scheduled),
        both_confirmed: Cond::Is(false),
        ..OTHERWISE
    },
    Rule {
        status: Cond::Is(DateStatus::Scheduling),
        both_confirmed: Cond::Is(true),
        ..OTHERWISE
    },
    Rule {
        time_set: Cond::Is(true),
        both_confirmed: Cond::Is(true),
        window: Cond::Is(WindowPosition::After),
        state: UiState::AwaitingFeedback,
        ..OTHERWISE
    },
    Rule {
        time_set: Cond::Is(true),
        both_confirmed: Cond::Is(true),
        window: Cond::Is(WindowPosition::Active),
        state: UiState::LogisticsPanel,
        ..OTHERWISE
    },
    Rule {
        time_set: Cond::Is(true),
        both_confirmed: Cond::Is(true),
        window: Cond::Is(WindowPosition::Before),
        state: UiState::DateScheduled,
        ..OTHERWISE
    },
    Rule {
        time_set: Cond::Is(true),
        window: Cond::Is(WindowPosition::After),
        state: UiState::Expired,
        ..OTHERWISE
    },
    Rule {
        time_set: Cond::Is(false),
        pending_proposals: Cond::Is(true),
        state: UiState::AwaitingTimeConfirmation,
        ..OTHERWISE
    },
    Rule {
        time_set: Cond::Is(false),
        state: UiState::SyncingAvailability,
        ..OTHERWISE
    },
    Rule {
        venue_attached: Cond::Is(false),
        state: UiState::SelectingVenue,
        ..OTHERWISE
    },
    Rule {
        venue_proposal: Cond::Is(Some(VenueProposalStatus::Proposed)),
        state: UiState::VenueProposedToReceiver,
        ..OTHERWISE
    },
    Rule {
        venue_proposal: Cond::Is(Some(VenueProposalStatus::Accepted)),
        booking: Cond::Not(Some(BookingStatus::Booked)),
        state: UiState::AwaitingBooking,
        ..OTHERWISE
    },
    Rule {
        venue_proposal: Cond::Is(Some(VenueProposalStatus::Accepted)),
        booking: Cond::Is(Some(BookingStatus::Booked)),
        state: UiState::AwaitingConfirmation,
        ..OTHERWISE
    },
    OTHERWISE,
];

pub fn derive_from_facts(facts: &StateFacts) -> UiState {
    RULES
        .iter()
        .find(|rule| rule.matches(facts))
        .map_or(UiState::Inconsistent, |rule| rule.state)
}

/// Total and deterministic: the same snapshot and instant always give the same state.
pub fn derive_state(snapshot: &DateInstanceSnapshot, now: DateTime<Utc>) -> UiState {
    derive_from_facts(&StateFacts::from_snapshot(snapshot, now))
}

#[cfg(test)]
#[path = "tests/state_tests.rs"]
mod tests;
