use thiserror::Error;

use shared::domain::{ParticipantRole, UiState};

use crate::actions::{Action, UnknownAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowedRole {
    Initiator,
    Receiver,
    Both,
}

impl AllowedRole {
    pub fn permits(self, role: ParticipantRole) -> bool {
        match self {
            AllowedRole::Initiator => role == ParticipantRole::Initiator,
            AllowedRole::Receiver => role == ParticipantRole::Receiver,
            AllowedRole::Both => true,
        }
    }
}

/// The states an action may be taken from, and by whom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionGuard {
    pub from_states: &'static [UiState],
    pub allowed_role: AllowedRole,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    #[error(transparent)]
    UnknownAction(#[from] UnknownAction),
    #[error("{action} is not available while the date is {state}")]
    WrongState { action: Action, state: UiState },
    #[error("only the {required} can {action}")]
    WrongRole {
        action: Action,
        required: ParticipantRole,
    },
}

const TIME_CONFIRMATION: &[UiState] = &[UiState::AwaitingTimeConfirmation];

const BEFORE_VENUE: &[UiState] = &[
    UiState::SyncingAvailability,
    UiState::AwaitingTimeConfirmation,
    UiState::SelectingVenue,
];

const VENUE_LOCKED_IN: &[UiState] = &[
    UiState::AwaitingBooking,
    UiState::AwaitingConfirmation,
    UiState::DateScheduled,
    UiState::BookingFailed,
];

const CANCELLABLE: &[UiState] = &[
    UiState::SyncingAvailability,
    UiState::AwaitingTimeConfirmation,
    UiState::SelectingVenue,
    UiState::VenueProposedToReceiver,
    UiState::AwaitingBooking,
    UiState::AwaitingConfirmation,
    UiState::DateScheduled,
    UiState::LogisticsPanel,
    UiState::BookingFailed,
];

const PANELS: &[UiState] = &[
    UiState::AwaitingConfirmation,
    UiState::DateScheduled,
    UiState::LogisticsPanel,
];

const fn guard(from_states: &'static [UiState], allowed_role: AllowedRole) -> ActionGuard {
    ActionGuard {
        from_states,
        allowed_role,
    }
}

/// Guard row for an action. Exhaustive, so a new action does not compile without one.
pub fn guard_for(action: Action) -> ActionGuard {
    use AllowedRole::{Both, Initiator, Receiver};

    match action {
        Action::SuggestTimes => guard(&[UiState::SyncingAvailability], Receiver),
        Action::WithdrawTimes => guard(TIME_CONFIRMATION, Receiver),
        Action::ConfirmTime => guard(TIME_CONFIRMATION, Initiator),
        Action::RejectTimes => guard(TIME_CONFIRMATION, Initiator),
        Action::SetDateType => guard(BEFORE_VENUE, Both),
        Action::SelectVenue => guard(&[UiState::SelectingVenue], Initiator),
        Action::ConfirmBooking => guard(&[UiState::AwaitingBooking], Initiator),
        Action::ReportBookingFailed => guard(&[UiState::AwaitingBooking], Initiator),
        Action::RetryBooking => guard(&[UiState::BookingFailed], Initiator),
        Action::SuggestVenue => guard(&[UiState::SelectingVenue], Initiator),
        Action::AcceptVenue => guard(&[UiState::VenueProposedToReceiver], Receiver),
        Action::DeclineVenue => guard(&[UiState::VenueProposedToReceiver], Receiver),
        Action::WithdrawVenue => guard(&[UiState::VenueProposedToReceiver], Initiator),
        Action::Reschedule => guard(VENUE_LOCKED_IN, Both),
        Action::ChangeVenue => guard(VENUE_LOCKED_IN, Initiator),
        Action::Cancel => guard(CANCELLABLE, Both),
        Action::ConfirmAttendance => guard(&[UiState::AwaitingConfirmation], Both),
        Action::RunningLate => guard(&[UiState::LogisticsPanel], Both),
        Action::Arrived => guard(&[UiState::LogisticsPanel], Both),
        Action::DidMeet => guard(&[UiState::AwaitingFeedback], Both),
        Action::SubmitFeedback => guard(&[UiState::AwaitingFeedback], Both),
        Action::SkipFeedback => guard(&[UiState::AwaitingFeedback], Both),
        Action::ExpandPanel => guard(PANELS, Both),
        Action::CollapsePanel => guard(PANELS, Both),
        Action::DismissSheet => guard(UiState::ALL, Both),
    }
}

pub fn check_guard(action: Action, state: UiState, role: ParticipantRole) -> Result<(), GuardError> {
    let guard = guard_for(action);
    if !guard.from_states.contains(&state) {
        return Err(GuardError::WrongState { action, state });
    }
    if !guard.allowed_role.permits(role) {
        return Err(GuardError::WrongRole {
            action,
            required: role.partner(),
        });
    }
    Ok(())
}

/// Parses an action code and checks it against the guard table.
pub fn validate_action(code: &str, state: UiState, role: ParticipantRole) -> Result<Action, GuardError> {
    let action: Action = code.parse()?;
    check_guard(action, state, role)?;
    Ok(action)
}

/// Actions that pass the guard for `(state, role)`, in declaration order.
pub fn available_actions(state: UiState, role: ParticipantRole) -> Vec<Action> {
    Action::ALL
        .iter()
        .copied()
        .filter(|action| check_guard(*action, state, role).is_ok())
        .collect()
}

#[cfg(test)]
#[path = "tests/guards_tests.rs"]
mod tests;
