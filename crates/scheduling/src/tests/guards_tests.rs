use super::*;

const ROLES: [ParticipantRole; 2] = [ParticipantRole::Initiator, ParticipantRole::Receiver];

#[test]
fn only_the_initiator_confirms_a_time() {
    assert_eq!(
        validate_action(
            "confirm_time",
            UiState::AwaitingTimeConfirmation,
            ParticipantRole::Initiator
        ),
        Ok(Action::ConfirmTime)
    );
    let err = validate_action(
        "confirm_time",
        UiState::AwaitingTimeConfirmation,
        ParticipantRole::Receiver,
    )
    .expect_err("receiver");
    assert_eq!(
        err,
        GuardError::WrongRole {
            action: Action::ConfirmTime,
            required: ParticipantRole::Initiator,
        }
    );
    assert_eq!(err.to_string(), "only the initiator can confirm_time");
}

#[test]
fn unknown_codes_fail_in_every_state() {
    for &state in UiState::ALL {
        for role in ROLES {
            let err = validate_action("teleport", state, role).expect_err("unknown");
            assert!(matches!(err, GuardError::UnknownAction(_)));
        }
    }
}

#[test]
fn every_combination_is_decided_by_the_table() {
    for &action in Action::ALL {
        let guard = guard_for(action);
        assert!(!guard.from_states.is_empty(), "{action} has no states");
        for &state in UiState::ALL {
            for role in ROLES {
                let expected = guard.from_states.contains(&state) && guard.allowed_role.permits(role);
                let result = validate_action(action.as_str(), state, role);
                assert_eq!(result.is_ok(), expected, "{action} in {state} as {role}");
                if let Err(err) = result {
                    assert!(matches!(
                        err,
                        GuardError::WrongState { .. } | GuardError::WrongRole { .. }
                    ));
                }
            }
        }
    }
}

#[test]
fn available_actions_agree_with_the_validator() {
    for &state in UiState::ALL {
        for role in ROLES {
            let available = available_actions(state, role);
            for &action in Action::ALL {
                assert_eq!(
                    available.contains(&action),
                    check_guard(action, state, role).is_ok(),
                    "{action} in {state} as {role}"
                );
            }
        }
    }
}

#[test]
fn wrong_state_is_reported_before_wrong_role() {
    let err = check_guard(
        Action::AcceptVenue,
        UiState::SelectingVenue,
        ParticipantRole::Initiator,
    )
    .expect_err("wrong state");
    assert_eq!(
        err,
        GuardError::WrongState {
            action: Action::AcceptVenue,
            state: UiState::SelectingVenue,
        }
    );
}

#[test]
fn terminal_states_only_allow_dismissing() {
    for state in [
        UiState::Completed,
        UiState::Cancelled,
        UiState::Expired,
        UiState::Inconsistent,
    ] {
        for role in ROLES {
            assert_eq!(available_actions(state, role), vec![Action::DismissSheet]);
        }
    }
}

#[test]
fn cancel_is_closed_once_feedback_is_due() {
    assert!(check_guard(Action::Cancel, UiState::LogisticsPanel, ParticipantRole::Receiver).is_ok());
    assert!(check_guard(Action::Cancel, UiState::AwaitingFeedback, ParticipantRole::Receiver).is_err());
}

#[test]
fn roles_split_the_time_flow() {
    assert_eq!(
        available_actions(UiState::SyncingAvailability, ParticipantRole::Receiver),
        vec![Action::SuggestTimes, Action::SetDateType, Action::Cancel, Action::DismissSheet]
    );
    assert_eq!(
        available_actions(UiState::SyncingAvailability, ParticipantRole::Initiator),
        vec![Action::SetDateType, Action::Cancel, Action::DismissSheet]
    );
    assert_eq!(
        available_actions(UiState::AwaitingTimeConfirmation, ParticipantRole::Initiator),
        vec![
            Action::ConfirmTime,
            Action::RejectTimes,
            Action::SetDateType,
            Action::Cancel,
            Action::DismissSheet
        ]
    );
}
