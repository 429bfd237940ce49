use chrono::{Duration, Utc};
use scheduling::{execute_action, get_ui_state, SchedulingContext};
use serde_json::json;
use shared::{
    domain::{
        DateInstanceId, DateTypeCore, ParticipantRole, UiState, UserId, VenueId, VenueRef,
    },
    error::ErrorCode,
    protocol::{ActionRequest, ActionResponse, TimerStyle, UiElement},
};
use storage::{
    ConfirmAttendanceParams, CreditKind, FlowContext, LogisticsFlow, Storage,
};

struct Date {
    ctx: SchedulingContext,
    alice: UserId,
    bob: UserId,
    id: DateInstanceId,
}

async fn setup() -> Date {
    setup_at("sqlite::memory:").await
}

async fn setup_at(database_url: &str) -> Date {
    let storage = Storage::new(database_url).await.expect("db");
    let alice = storage.create_user("alice", "Alice").await.expect("alice");
    let bob = storage.create_user("bob", "Bob").await.expect("bob");
    let match_id = storage.create_match(alice, bob).await.expect("match");
    let id = storage.create_date_instance(match_id).await.expect("date");
    for (venue_id, name, date_type) in [
        ("v1", "Corner Coffee", DateTypeCore::Coffee),
        ("v2", "Bean There", DateTypeCore::Coffee),
        ("v3", "Night Owl Bar", DateTypeCore::Drinks),
    ] {
        storage
            .upsert_venue(&VenueRef {
                venue_id: VenueId(venue_id.into()),
                name: name.into(),
                address: None,
                date_type,
            })
            .await
            .expect("venue");
    }
    Date {
        ctx: SchedulingContext::new(storage),
        alice,
        bob,
        id,
    }
}

impl Date {
    async fn act(&self, user: UserId, action: &str, payload: serde_json::Value) -> ActionResponse {
        execute_action(&self.ctx, self.id, user, ActionRequest::new(action, payload))
            .await
            .expect("action")
    }

    async fn state_for(&self, user: UserId) -> UiState {
        get_ui_state(&self.ctx, self.id, user)
            .await
            .expect("ui state")
            .ui_state
    }

    async fn version(&self) -> i64 {
        self.ctx
            .storage
            .date_instance(self.id)
            .await
            .expect("instance")
            .version
    }

    async fn first_pending_proposal(&self) -> i64 {
        let snapshot = self
            .ctx
            .storage
            .snapshot(self.id, self.alice)
            .await
            .expect("snapshot");
        snapshot.proposals[0].proposal_id.0
    }

    async fn suggest_times(&self) {
        let starts_at = Utc::now() + Duration::days(3);
        let response = self
            .act(
                self.bob,
                "suggest_times",
                json!({"slots": [
                    {"starts_at": starts_at},
                    {"starts_at": starts_at + Duration::days(1), "duration_minutes": 60}
                ]}),
            )
            .await;
        assert!(response.success, "{response:?}");
    }

    async fn reach_selecting_venue(&self) {
        self.suggest_times().await;
        let proposal_id = self.first_pending_proposal().await;
        let response = self
            .act(self.alice, "confirm_time", json!({"proposal_id": proposal_id}))
            .await;
        assert!(response.success, "{response:?}");
    }

    /// Both participants confirmed, with the date already two hours and more behind us.
    async fn reach_awaiting_feedback(&self) {
        let storage = &self.ctx.storage;
        storage
            .force_schedule(self.id, Utc::now() + Duration::days(1), DateTypeCore::Coffee)
            .await
            .expect("schedule");
        let mut tx = storage.begin().await.expect("tx");
        for (user, role) in [
            (self.alice, ParticipantRole::Initiator),
            (self.bob, ParticipantRole::Receiver),
        ] {
            LogisticsFlow
                .confirm_attendance(
                    &mut tx,
                    ConfirmAttendanceParams {
                        ctx: FlowContext {
                            date_instance_id: self.id,
                            caller_id: user,
                            role,
                            now: Utc::now(),
                        },
                    },
                )
                .await
                .expect("confirm");
        }
        tx.commit().await.expect("commit");
        storage
            .force_schedule(self.id, Utc::now() - Duration::hours(3), DateTypeCore::Coffee)
            .await
            .expect("move into the past");
    }
}

#[tokio::test]
async fn a_date_goes_from_availability_to_scheduled() {
    let date = setup().await;
    assert_eq!(date.state_for(date.bob).await, UiState::SyncingAvailability);

    date.suggest_times().await;
    assert_eq!(
        date.state_for(date.alice).await,
        UiState::AwaitingTimeConfirmation
    );
    let view = get_ui_state(&date.ctx, date.id, date.alice).await.expect("view");
    match &view.elements[1] {
        UiElement::TimeSlots { slots, editable } => {
            assert_eq!(slots.len(), 2);
            assert!(!editable);
        }
        other => panic!("unexpected element {other:?}"),
    }
    assert!(view.timer.is_some());

    let proposal_id = date.first_pending_proposal().await;
    let blocked = date
        .act(date.bob, "confirm_time", json!({"proposal_id": proposal_id}))
        .await;
    assert!(!blocked.success);
    assert_eq!(blocked.error_code, Some(ErrorCode::StateGuard));

    let confirmed = date
        .act(date.alice, "confirm_time", json!({"proposal_id": proposal_id}))
        .await;
    assert!(confirmed.success);
    assert_eq!(confirmed.ui_state, Some(UiState::SelectingVenue));

    let selected = date
        .act(date.alice, "select_venue", json!({"venue_id": "v1"}))
        .await;
    assert!(selected.success, "{selected:?}");
    assert_eq!(selected.ui_state, Some(UiState::AwaitingBooking));
    assert_eq!(selected.message.as_deref(), Some("Corner Coffee selected"));

    let booked = date
        .act(date.alice, "confirm_booking", json!({"reference": "R-42"}))
        .await;
    assert_eq!(booked.ui_state, Some(UiState::AwaitingConfirmation));

    let first = date.act(date.bob, "confirm_attendance", json!({})).await;
    assert_eq!(first.ui_state, Some(UiState::AwaitingConfirmation));
    let second = date.act(date.alice, "confirm_attendance", json!({})).await;
    assert_eq!(second.ui_state, Some(UiState::DateScheduled));

    let view = get_ui_state(&date.ctx, date.id, date.bob).await.expect("view");
    assert_eq!(view.ui_state, UiState::DateScheduled);
    assert_eq!(view.date_type, Some(DateTypeCore::Coffee));
    assert!(view.timer.is_none());
    assert_eq!(view.partner_info.display_name, "Alice");
}

#[tokio::test]
async fn unknown_action_is_a_guard_failure() {
    let date = setup().await;
    let response = date.act(date.alice, "teleport", json!({})).await;
    assert!(!response.success);
    assert_eq!(response.action, "teleport");
    assert_eq!(response.error_code, Some(ErrorCode::StateGuard));
    assert_eq!(response.error.as_deref(), Some("unknown action 'teleport'"));
}

#[tokio::test]
async fn outsiders_and_unknown_users_are_turned_away() {
    let date = setup().await;
    let mallory = date
        .ctx
        .storage
        .create_user("mallory", "Mallory")
        .await
        .expect("user");

    let err = execute_action(
        &date.ctx,
        date.id,
        mallory,
        ActionRequest::new("teleport", json!({})),
    )
    .await
    .expect_err("outsider");
    assert_eq!(err.code, ErrorCode::NotFound);

    let err = get_ui_state(&date.ctx, date.id, mallory)
        .await
        .expect_err("outsider");
    assert_eq!(err.code, ErrorCode::NotFound);

    let err = get_ui_state(&date.ctx, date.id, UserId(404))
        .await
        .expect_err("unknown user");
    assert_eq!(err.code, ErrorCode::Authorization);

    let err = execute_action(
        &date.ctx,
        DateInstanceId(999),
        date.alice,
        ActionRequest::new("cancel", json!({})),
    )
    .await
    .expect_err("missing date");
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn did_meet_credits_the_bonus_once() {
    let date = setup().await;
    date.reach_awaiting_feedback().await;
    assert_eq!(date.state_for(date.alice).await, UiState::AwaitingFeedback);

    let first = date.act(date.alice, "did_meet", json!({"did_meet": "yes"})).await;
    let second = date.act(date.alice, "did_meet", json!({"did_meet": "yes"})).await;
    assert!(first.success, "{first:?}");
    assert!(second.success, "{second:?}");

    let storage = &date.ctx.storage;
    assert_eq!(
        storage
            .ledger_entry_count(date.alice, CreditKind::AttendDate)
            .await
            .expect("count"),
        1
    );
    assert_eq!(storage.wings_balance(date.alice).await.expect("balance"), 10);

    let no = date.act(date.bob, "did_meet", json!({"did_meet": "no"})).await;
    assert!(no.success);
    assert_eq!(storage.wings_balance(date.bob).await.expect("balance"), 0);
}

#[tokio::test]
async fn feedback_from_both_completes_the_date() {
    let date = setup().await;
    date.reach_awaiting_feedback().await;

    let sent = date
        .act(
            date.alice,
            "submit_feedback",
            json!({"decision": "again", "text": "great time"}),
        )
        .await;
    assert_eq!(sent.ui_state, Some(UiState::AwaitingFeedback));

    let again = date
        .act(date.alice, "submit_feedback", json!({"decision": "pass"}))
        .await;
    assert!(!again.success);
    assert_eq!(again.error_code, Some(ErrorCode::Validation));

    let skipped = date.act(date.bob, "skip_feedback", json!({})).await;
    assert_eq!(skipped.ui_state, Some(UiState::Completed));

    let dismiss_only: Vec<_> = skipped
        .available_actions
        .iter()
        .map(|action| action.action.as_str())
        .collect();
    assert_eq!(dismiss_only, ["dismiss_sheet"]);
}

#[tokio::test]
async fn past_decision_window_shows_an_expired_timer() {
    let date = setup().await;
    date.suggest_times().await;
    date.ctx
        .storage
        .force_decision_window(date.id, Some(Utc::now() - Duration::minutes(1)))
        .await
        .expect("window");

    let view = get_ui_state(&date.ctx, date.id, date.alice).await.expect("view");
    assert_eq!(view.ui_state, UiState::AwaitingTimeConfirmation);
    let timer = view.timer.expect("timer");
    assert!(timer.expired);
    assert_eq!(timer.style, TimerStyle::Urgent);
}

#[tokio::test]
async fn reads_and_failed_actions_leave_the_instance_untouched() {
    let date = setup().await;
    assert_eq!(date.version().await, 0);

    get_ui_state(&date.ctx, date.id, date.alice).await.expect("view");
    assert_eq!(date.version().await, 0);

    let guarded = date.act(date.alice, "suggest_times", json!({"slots": []})).await;
    assert_eq!(guarded.error_code, Some(ErrorCode::StateGuard));
    assert_eq!(date.version().await, 0);

    let rejected = date
        .act(
            date.bob,
            "suggest_times",
            json!({"slots": [{"starts_at": Utc::now() - Duration::hours(1)}]}),
        )
        .await;
    assert!(!rejected.success);
    assert_eq!(rejected.error_code, Some(ErrorCode::Validation));
    assert_eq!(date.version().await, 0);

    let err = execute_action(
        &date.ctx,
        date.id,
        date.bob,
        ActionRequest::new("suggest_times", json!({"slots": "soon"})),
    )
    .await
    .expect_err("bad payload");
    assert_eq!(err.code, ErrorCode::Validation);
    assert_eq!(date.version().await, 0);

    let dismissed = date.act(date.alice, "dismiss_sheet", serde_json::Value::Null).await;
    assert!(dismissed.success);
    assert_eq!(dismissed.navigate_to.as_deref(), Some("home"));
    assert_eq!(date.version().await, 0);

    date.suggest_times().await;
    assert_eq!(date.version().await, 1);
}

#[tokio::test]
async fn panel_actions_only_navigate_where_panels_exist() {
    let date = setup().await;
    let blocked = date.act(date.alice, "expand_panel", json!({})).await;
    assert_eq!(blocked.error_code, Some(ErrorCode::StateGuard));

    date.reach_selecting_venue().await;
    date.act(date.alice, "select_venue", json!({"venue_id": "v1"}))
        .await;
    date.act(date.alice, "confirm_booking", json!({})).await;

    let expanded = date
        .act(date.bob, "expand_panel", json!({"panel": "map"}))
        .await;
    assert!(expanded.success);
    assert_eq!(expanded.navigate_to.as_deref(), Some("map"));
    assert_eq!(expanded.ui_state, Some(UiState::AwaitingConfirmation));
}

#[tokio::test]
async fn a_committed_cancel_blocks_the_partner() {
    let date = setup().await;
    let cancelled = date
        .act(date.alice, "cancel", json!({"reason": "changed my mind"}))
        .await;
    assert_eq!(cancelled.ui_state, Some(UiState::Cancelled));

    let late = date
        .act(
            date.bob,
            "suggest_times",
            json!({"slots": [{"starts_at": Utc::now() + Duration::days(1)}]}),
        )
        .await;
    assert!(!late.success);
    assert_eq!(late.error_code, Some(ErrorCode::StateGuard));
    assert_eq!(
        late.error.as_deref(),
        Some("suggest_times is not available while the date is cancelled")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_confirmations_let_exactly_one_through() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("race.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));
    let date = setup_at(&database_url).await;
    date.suggest_times().await;
    let snapshot = date
        .ctx
        .storage
        .snapshot(date.id, date.alice)
        .await
        .expect("snapshot");
    let proposals: Vec<i64> = snapshot.proposals.iter().map(|p| p.proposal_id.0).collect();
    let version_before = date.version().await;

    let mut handles = Vec::new();
    for attempt in 0..8 {
        let ctx = date.ctx.clone();
        let (id, alice) = (date.id, date.alice);
        let proposal_id = proposals[attempt % proposals.len()];
        handles.push(tokio::spawn(async move {
            execute_action(
                &ctx,
                id,
                alice,
                ActionRequest::new("confirm_time", json!({"proposal_id": proposal_id})),
            )
            .await
        }));
    }

    let mut applied = 0;
    for handle in handles {
        let response = handle.await.expect("task").expect("no hard error");
        if response.success {
            applied += 1;
        } else {
            assert_eq!(response.error_code, Some(ErrorCode::StateGuard), "{response:?}");
            assert_eq!(
                response.error.as_deref(),
                Some("confirm_time is not available while the date is selecting_venue")
            );
        }
    }
    assert_eq!(applied, 1);
    assert_eq!(date.version().await, version_before + 1);
    assert_eq!(date.state_for(date.bob).await, UiState::SelectingVenue);
}

#[tokio::test]
async fn venue_suggestions_can_be_declined_and_accepted() {
    let date = setup().await;
    date.reach_selecting_venue().await;

    let suggested = date
        .act(date.alice, "suggest_venue", json!({"venue_id": "v3"}))
        .await;
    assert_eq!(suggested.ui_state, Some(UiState::VenueProposedToReceiver));

    let declined = date
        .act(date.bob, "decline_venue", json!({"reason": "not a drinker"}))
        .await;
    assert_eq!(declined.ui_state, Some(UiState::SelectingVenue));

    let type_set = date
        .act(date.bob, "set_date_type", json!({"date_type": "coffee"}))
        .await;
    assert!(type_set.success);

    let mismatched = date
        .act(date.alice, "suggest_venue", json!({"venue_id": "v3"}))
        .await;
    assert!(!mismatched.success);
    assert_eq!(mismatched.error_code, Some(ErrorCode::Validation));

    date.act(date.alice, "suggest_venue", json!({"venue_id": "v2"}))
        .await;
    let accepted = date.act(date.bob, "accept_venue", json!({})).await;
    assert_eq!(accepted.ui_state, Some(UiState::AwaitingBooking));
}

#[tokio::test]
async fn failed_booking_can_be_retried_or_rescheduled() {
    let date = setup().await;
    date.reach_selecting_venue().await;
    date.act(date.alice, "select_venue", json!({"venue_id": "v1"}))
        .await;

    let failed = date
        .act(date.alice, "report_booking_failed", json!({"reason": "fully booked"}))
        .await;
    assert_eq!(failed.ui_state, Some(UiState::BookingFailed));

    let retried = date.act(date.alice, "retry_booking", json!({})).await;
    assert_eq!(retried.ui_state, Some(UiState::AwaitingBooking));

    let changed = date.act(date.alice, "change_venue", json!({})).await;
    assert_eq!(changed.ui_state, Some(UiState::SelectingVenue));

    date.act(date.alice, "select_venue", json!({"venue_id": "v2"}))
        .await;
    let rescheduled = date
        .act(date.bob, "reschedule", json!({"reason": "work trip"}))
        .await;
    assert_eq!(rescheduled.ui_state, Some(UiState::SyncingAvailability));

    let instance = date.ctx.storage.date_instance(date.id).await.expect("instance");
    assert!(instance.scheduled_time.is_none());
    assert!(instance.venue.is_none());
    assert_eq!(instance.date_type, Some(DateTypeCore::Coffee));
}
