use chrono::{DateTime, Utc};

use shared::{
    domain::{DateInstanceSnapshot, ParticipantRole, ProposalStatus, UiState},
    protocol::{
        AvailableAction, ButtonStyle, StatusLine, Timer, TimerStyle, UiElement, UiStateResponse,
    },
};

use crate::{guards::available_actions, state::derive_state};

pub const URGENT_BELOW_SECONDS: i64 = 3600;

/// States whose decision window is shown as a countdown.
pub const TIMER_STATES: &[UiState] = &[
    UiState::AwaitingTimeConfirmation,
    UiState::VenueProposedToReceiver,
    UiState::AwaitingBooking,
    UiState::AwaitingConfirmation,
    UiState::AwaitingFeedback,
];

static ACTION_LABELS: &[(&str, &str, ButtonStyle)] = &[
    ("suggest_times", "Suggest times", ButtonStyle::Primary),
    ("withdraw_times", "Withdraw times", ButtonStyle::Secondary),
    ("confirm_time", "Confirm time", ButtonStyle::Primary),
    ("reject_times", "None of these work", ButtonStyle::Destructive),
    ("set_date_type", "Change date type", ButtonStyle::Secondary),
    ("select_venue", "Choose this venue", ButtonStyle::Primary),
    ("confirm_booking", "Booking confirmed", ButtonStyle::Primary),
    ("report_booking_failed", "Couldn't book", ButtonStyle::Destructive),
    ("retry_booking", "Try booking again", ButtonStyle::Primary),
    ("suggest_venue", "Suggest venue", ButtonStyle::Secondary),
    ("accept_venue", "Accept venue", ButtonStyle::Primary),
    ("decline_venue", "Decline venue", ButtonStyle::Destructive),
    ("withdraw_venue", "Withdraw suggestion", ButtonStyle::Secondary),
    ("reschedule", "Reschedule", ButtonStyle::Secondary),
    ("change_venue", "Change venue", ButtonStyle::Secondary),
    ("cancel", "Cancel date", ButtonStyle::Destructive),
    ("confirm_attendance", "I'll be there", ButtonStyle::Primary),
    ("running_late", "Running late", ButtonStyle::Secondary),
    ("arrived", "I'm here", ButtonStyle::Primary),
    ("did_meet", "Did you meet?", ButtonStyle::Primary),
    ("submit_feedback", "Send feedback", ButtonStyle::Primary),
    ("skip_feedback", "Skip", ButtonStyle::Secondary),
    ("expand_panel", "Show details", ButtonStyle::Secondary),
    ("collapse_panel", "Hide details", ButtonStyle::Secondary),
    ("dismiss_sheet", "Close", ButtonStyle::Secondary),
];

struct StatusTemplate {
    state: UiState,
    /// `None` applies to both roles.
    role: Option<ParticipantRole>,
    title: &'static str,
    subtitle: Option<&'static str>,
    icon: &'static str,
}

const fn status(
    state: UiState,
    role: Option<ParticipantRole>,
    title: &'static str,
    subtitle: Option<&'static str>,
    icon: &'static str,
) -> StatusTemplate {
    StatusTemplate {
        state,
        role,
        title,
        subtitle,
        icon,
    }
}

const INITIATOR: Option<ParticipantRole> = Some(ParticipantRole::Initiator);
const RECEIVER: Option<ParticipantRole> = Some(ParticipantRole::Receiver);

static STATUS_LINES: &[StatusTemplate] = &[
    status(
        UiState::SyncingAvailability,
        RECEIVER,
        "Pick times that work for you",
        Some("{partner} is waiting for your availability"),
        "calendar",
    ),
    status(
        UiState::SyncingAvailability,
        INITIATOR,
        "Waiting for {partner}'s availability",
        None,
        "hourglass",
    ),
    status(
        UiState::AwaitingTimeConfirmation,
        INITIATOR,
        "{partner} suggested times",
        Some("Pick one to lock it in"),
        "calendar",
    ),
    status(
        UiState::AwaitingTimeConfirmation,
        RECEIVER,
        "Times sent to {partner}",
        Some("Waiting for a confirmation"),
        "hourglass",
    ),
    status(
        UiState::SelectingVenue,
        INITIATOR,
        "Choose a venue",
        Some("Your date with {partner} has a time"),
        "map",
    ),
    status(
        UiState::SelectingVenue,
        RECEIVER,
        "{partner} is choosing a venue",
        None,
        "map",
    ),
    status(
        UiState::VenueProposedToReceiver,
        RECEIVER,
        "{partner} suggested a venue",
        Some("Accept it or ask for another"),
        "map",
    ),
    status(
        UiState::VenueProposedToReceiver,
        INITIATOR,
        "Venue suggested to {partner}",
        Some("Waiting for a response"),
        "hourglass",
    ),
    status(
        UiState::AwaitingBooking,
        INITIATOR,
        "Book the venue",
        Some("Let {partner} know once it is reserved"),
        "ticket",
    ),
    status(
        UiState::AwaitingBooking,
        RECEIVER,
        "{partner} is booking the venue",
        None,
        "ticket",
    ),
    status(
        UiState::AwaitingConfirmation,
        None,
        "Confirm you'll be there",
        Some("{partner} will see your confirmation"),
        "check",
    ),
    status(
        UiState::DateScheduled,
        None,
        "Your date with {partner} is on",
        None,
        "heart",
    ),
    status(
        UiState::LogisticsPanel,
        None,
        "It's almost time",
        Some("Let {partner} know how you're doing"),
        "pin",
    ),
    status(
        UiState::AwaitingFeedback,
        None,
        "How did it go with {partner}?",
        None,
        "star",
    ),
    status(UiState::Completed, None, "Date completed", None, "check"),
    status(UiState::Cancelled, None, "Date cancelled", None, "x"),
    status(
        UiState::Expired,
        None,
        "This date expired",
        Some("The time passed before you and {partner} both confirmed"),
        "clock",
    ),
    status(
        UiState::BookingFailed,
        INITIATOR,
        "Booking failed",
        Some("Retry, pick another venue or reschedule"),
        "alert",
    ),
    status(
        UiState::BookingFailed,
        RECEIVER,
        "{partner} couldn't book the venue",
        None,
        "alert",
    ),
];

/// Label for an action code; unmapped codes render as themselves.
pub fn action_label(code: &str) -> String {
    ACTION_LABELS
        .iter()
        .find(|(known, _, _)| *known == code)
        .map_or_else(|| code.to_string(), |(_, label, _)| (*label).to_string())
}

pub fn action_style(code: &str) -> ButtonStyle {
    ACTION_LABELS
        .iter()
        .find(|(known, _, _)| *known == code)
        .map_or(ButtonStyle::Secondary, |(_, _, style)| *style)
}

pub fn action_views(state: UiState, role: ParticipantRole) -> Vec<AvailableAction> {
    available_actions(state, role)
        .into_iter()
        .map(|action| AvailableAction {
            action: action.as_str().to_string(),
            label: action_label(action.as_str()),
            style: action_style(action.as_str()),
        })
        .collect()
}

/// Role-specific row first, then the row shared by both roles.
pub fn status_line(state: UiState, role: ParticipantRole, partner_name: &str) -> StatusLine {
    let template = STATUS_LINES
        .iter()
        .find(|row| row.state == state && row.role == Some(role))
        .or_else(|| {
            STATUS_LINES
                .iter()
                .find(|row| row.state == state && row.role.is_none())
        });
    match template {
        Some(row) => StatusLine {
            title: row.title.replace("{partner}", partner_name),
            subtitle: row
                .subtitle
                .map(|subtitle| subtitle.replace("{partner}", partner_name)),
            icon: row.icon.to_string(),
        },
        None => StatusLine {
            title: state.display_name().to_string(),
            subtitle: None,
            icon: "info".to_string(),
        },
    }
}

pub fn hint(state: UiState, role: ParticipantRole) -> &'static str {
    use ParticipantRole::{Initiator, Receiver};

    match (state, role) {
        (UiState::SyncingAvailability, Receiver) => "Suggest up to five times that suit you.",
        (UiState::SyncingAvailability, Initiator) => "Your match is sharing their availability.",
        (UiState::AwaitingTimeConfirmation, Initiator) => "Confirm one of the suggested times.",
        (UiState::AwaitingTimeConfirmation, Receiver) => "Your times are waiting for a confirmation.",
        (UiState::SelectingVenue, Initiator) => "Pick a venue or suggest one.",
        (UiState::SelectingVenue, Receiver) => "A venue is being chosen.",
        (UiState::VenueProposedToReceiver, Receiver) => "Accept or decline the suggested venue.",
        (UiState::VenueProposedToReceiver, Initiator) => "Your venue suggestion is awaiting a reply.",
        (UiState::AwaitingBooking, Initiator) => "Reserve the venue and confirm the booking.",
        (UiState::AwaitingBooking, Receiver) => "The venue is being booked.",
        (UiState::AwaitingConfirmation, _) => "Confirm your attendance.",
        (UiState::DateScheduled, _) => "Everything is set.",
        (UiState::LogisticsPanel, _) => "Share updates as you head to your date.",
        (UiState::AwaitingFeedback, _) => "Tell us how the date went.",
        (UiState::Completed, _) => "This date is complete.",
        (UiState::Cancelled, _) => "This date was cancelled.",
        (UiState::Expired, _) => "This date passed without being confirmed.",
        (UiState::BookingFailed, Initiator) => "Retry the booking or change plans.",
        (UiState::BookingFailed, Receiver) => "The booking fell through.",
        (UiState::Inconsistent, _) => "Something is off with this date. Support has been notified.",
    }
}

pub fn build_timer(ends_at: DateTime<Utc>, now: DateTime<Utc>) -> Timer {
    let remaining_seconds = (ends_at - now).num_seconds();
    Timer {
        ends_at,
        remaining_seconds,
        expired: remaining_seconds <= 0,
        style: if remaining_seconds < URGENT_BELOW_SECONDS {
            TimerStyle::Urgent
        } else {
            TimerStyle::Normal
        },
    }
}

fn panel(snapshot: &DateInstanceSnapshot, state: UiState) -> Option<UiElement> {
    let instance = &snapshot.instance;
    let role = snapshot.my_role;
    let element = match state {
        UiState::SyncingAvailability | UiState::AwaitingTimeConfirmation => UiElement::TimeSlots {
            slots: snapshot
                .proposals
                .iter()
                .filter(|proposal| proposal.status == ProposalStatus::Pending)
                .cloned()
                .collect(),
            editable: role == ParticipantRole::Receiver,
        },
        UiState::SelectingVenue => UiElement::VenueOptions {
            venues: snapshot.venue_options.clone(),
            date_type: instance.date_type,
        },
        UiState::VenueProposedToReceiver => UiElement::VenueOptions {
            venues: instance.venue.iter().cloned().collect(),
            date_type: instance.date_type,
        },
        UiState::AwaitingBooking | UiState::BookingFailed => UiElement::BookingStatus {
            venue: instance.venue.clone(),
            status: instance.booking_status,
            reference: instance.booking_reference.clone(),
        },
        UiState::AwaitingConfirmation | UiState::DateScheduled => UiElement::Confirmation {
            me_confirmed: instance.confirmed_at(role).is_some(),
            partner_confirmed: instance.confirmed_at(role.partner()).is_some(),
        },
        UiState::LogisticsPanel => UiElement::LogisticsPanel {
            events: snapshot.logistics.clone(),
            venue: instance.venue.clone(),
        },
        UiState::AwaitingFeedback => {
            let mine = instance.feedback(role);
            UiElement::FeedbackForm {
                my_status: mine.status,
                did_meet_answered: mine.did_meet.is_some(),
            }
        }
        UiState::Completed | UiState::Cancelled | UiState::Expired | UiState::Inconsistent => {
            return None
        }
    };
    Some(element)
}

/// Renders the caller's view of a snapshot. Pure: no storage access.
pub fn build_ui_state(snapshot: &DateInstanceSnapshot, now: DateTime<Utc>) -> UiStateResponse {
    let state = derive_state(snapshot, now);
    let role = snapshot.my_role;
    let instance = &snapshot.instance;
    let status_line = status_line(state, role, &snapshot.partner.display_name);

    let mut elements = vec![UiElement::StatusLine {
        status: status_line.clone(),
    }];
    elements.extend(panel(snapshot, state));

    let timer = instance
        .decision_window_end
        .filter(|_| TIMER_STATES.contains(&state))
        .map(|ends_at| build_timer(ends_at, now));

    UiStateResponse {
        date_instance_id: instance.id,
        ui_state: state,
        ui_state_code: state.as_str().to_string(),
        hint: hint(state, role).to_string(),
        my_role: role,
        partner_info: snapshot.partner.clone(),
        elements,
        available_actions: action_views(state, role),
        status_line,
        timer,
        scheduled_time: instance.scheduled_time,
        duration_minutes: instance.duration_minutes,
        date_type: instance.date_type,
        venue: instance.venue.clone(),
    }
}

#[cfg(test)]
#[path = "tests/response_tests.rs"]
mod tests;
