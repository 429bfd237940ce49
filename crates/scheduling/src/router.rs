use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::{debug, info};

use shared::{
    domain::{DateInstanceId, DidMeet, ProposalId, UserId, VenueId},
    error::{ApiError, ErrorCode},
    protocol::{ActionRequest, ActionResponse},
};
use storage::{
    fetch_snapshot, lock_date_instance, AcceptVenueParams, ArrivedParams, CancelParams,
    ChangeVenueParams, ConfirmAttendanceParams, ConfirmBookingParams, ConfirmTimeParams,
    CreditKind, DeclineVenueParams, DidMeetParams, FeedbackFlow, FlowContext, FlowError,
    LogisticsFlow, ModificationFlow, RejectTimesParams, ReportBookingFailedParams,
    RescheduleParams, RetryBookingParams, RunningLateParams, SelectVenueParams,
    SetDateTypeParams, SkipFeedbackParams, SlotInput, SubmitFeedbackParams, SuggestTimesParams,
    SuggestVenueParams, TimeFlow, VenueFlow, VenueSuggestionFlow, WingsCredit,
    WithdrawTimesParams, WithdrawVenueParams,
};

use crate::{
    actions::{Action, Command, DidMeetPayload},
    ensure_known_user, flow_failure,
    guards::{check_guard, GuardError},
    internal,
    response::action_views,
    state::derive_state,
    SchedulingContext,
};

/// Validates and applies one action.
///
/// Business failures (guard, executor rejection) come back as
/// `Ok(ActionResponse { success: false, .. })` with the transaction rolled back.
/// `Err` is reserved for bad payloads, unknown callers, missing instances and
/// infrastructure failures.
pub async fn execute_action(
    ctx: &SchedulingContext,
    date_instance_id: DateInstanceId,
    caller_id: UserId,
    request: ActionRequest,
) -> Result<ActionResponse, ApiError> {
    ensure_known_user(ctx, caller_id).await?;
    let now = Utc::now();

    let action = match request.action.parse::<Action>() {
        Ok(action) => action,
        Err(unknown) => {
            // Outsiders get not_found before learning anything about the code.
            ctx.storage
                .snapshot(date_instance_id, caller_id)
                .await
                .map_err(flow_failure)?;
            let err = GuardError::from(unknown);
            debug!(%date_instance_id, %caller_id, error = %err, "unknown action submitted");
            return Ok(ActionResponse::failed(
                request.action,
                ErrorCode::StateGuard,
                err.to_string(),
            ));
        }
    };

    if action.is_ui_only() {
        return navigate(ctx, date_instance_id, caller_id, action, &request.payload, now).await;
    }

    // Dropping `tx` on any early return rolls back, including the version bump.
    let mut tx = ctx.storage.begin().await.map_err(internal)?;
    if !lock_date_instance(&mut tx, date_instance_id)
        .await
        .map_err(flow_failure)?
    {
        return Err(ApiError::new(
            ErrorCode::NotFound,
            format!("date instance {date_instance_id} not found"),
        ));
    }
    let snapshot = fetch_snapshot(&mut tx, date_instance_id, caller_id)
        .await
        .map_err(flow_failure)?;
    let role = snapshot.my_role;
    let state = derive_state(&snapshot, now);

    if let Err(err) = check_guard(action, state, role) {
        debug!(%date_instance_id, %action, %state, %role, "action blocked by guard");
        return Ok(ActionResponse::failed(
            action.as_str(),
            ErrorCode::StateGuard,
            err.to_string(),
        ));
    }

    let command = Command::decode(action, &request.payload)
        .map_err(|err| ApiError::new(ErrorCode::Validation, err.to_string()))?;
    let credit_due = matches!(
        command,
        Command::DidMeet(DidMeetPayload {
            did_meet: DidMeet::Yes
        })
    );
    let flow = FlowContext {
        date_instance_id,
        caller_id,
        role,
        now,
    };

    let message = match dispatch(&mut tx, flow, command).await {
        Ok(message) => message,
        Err(FlowError::Rejected(reason)) => {
            debug!(%date_instance_id, %action, tier = %action.tier(), %reason, "action rejected");
            return Ok(ActionResponse::failed(
                action.as_str(),
                ErrorCode::Validation,
                reason,
            ));
        }
        Err(err @ FlowError::NotFound(_)) => {
            return Ok(ActionResponse::failed(
                action.as_str(),
                ErrorCode::NotFound,
                err.to_string(),
            ));
        }
        Err(err) => return Err(internal(err)),
    };

    if credit_due {
        let credit = WingsCredit {
            user_id: caller_id,
            ref_id: date_instance_id.to_string(),
            kind: CreditKind::AttendDate,
        };
        let credited = ctx
            .ledger
            .credit_action(&mut tx, &credit)
            .await
            .map_err(internal)?;
        if credited {
            info!(%date_instance_id, user_id = %caller_id, "attendance bonus credited");
        }
    }

    let after = fetch_snapshot(&mut tx, date_instance_id, caller_id)
        .await
        .map_err(flow_failure)?;
    let next_state = derive_state(&after, now);
    tx.commit().await.map_err(internal)?;

    info!(
        %date_instance_id,
        %action,
        tier = %action.tier(),
        from = %state,
        to = %next_state,
        "action applied"
    );
    let mut response = ActionResponse::ok(action.as_str(), message);
    response.ui_state = Some(next_state);
    response.available_actions = action_views(next_state, role);
    Ok(response)
}

/// UI-only actions: validated against a plain read, nothing is written.
async fn navigate(
    ctx: &SchedulingContext,
    date_instance_id: DateInstanceId,
    caller_id: UserId,
    action: Action,
    payload: &serde_json::Value,
    now: DateTime<Utc>,
) -> Result<ActionResponse, ApiError> {
    let snapshot = ctx
        .storage
        .snapshot(date_instance_id, caller_id)
        .await
        .map_err(flow_failure)?;
    let role = snapshot.my_role;
    let state = derive_state(&snapshot, now);
    if let Err(err) = check_guard(action, state, role) {
        return Ok(ActionResponse::failed(
            action.as_str(),
            ErrorCode::StateGuard,
            err.to_string(),
        ));
    }

    let command = Command::decode(action, payload)
        .map_err(|err| ApiError::new(ErrorCode::Validation, err.to_string()))?;
    let target = match command {
        Command::ExpandPanel(panel) => panel.panel.unwrap_or_else(|| "details".to_string()),
        Command::CollapsePanel(_) => "summary".to_string(),
        Command::DismissSheet => "home".to_string(),
        _ => state.as_str().to_string(),
    };

    let mut response = ActionResponse::ok(action.as_str(), format!("navigating to {target}"));
    response.navigate_to = Some(target);
    response.ui_state = Some(state);
    response.available_actions = action_views(state, role);
    Ok(response)
}

/// Runs exactly one tier executor on the open transaction and returns its
/// confirmation line.
async fn dispatch(
    conn: &mut SqliteConnection,
    ctx: FlowContext,
    command: Command,
) -> Result<String, FlowError> {
    let message = match command {
        Command::SuggestTimes(payload) => {
            let slots = payload
                .slots
                .into_iter()
                .map(|slot| SlotInput {
                    starts_at: slot.starts_at,
                    duration_minutes: slot.duration_minutes,
                })
                .collect();
            let result = TimeFlow
                .suggest_times(conn, SuggestTimesParams { ctx, slots })
                .await?;
            format!("suggested {} time slot(s)", result.proposal_ids.len())
        }
        Command::WithdrawTimes => {
            TimeFlow
                .withdraw_times(conn, WithdrawTimesParams { ctx })
                .await?
                .message
        }
        Command::ConfirmTime(payload) => {
            let result = TimeFlow
                .confirm_time(
                    conn,
                    ConfirmTimeParams {
                        ctx,
                        proposal_id: ProposalId(payload.proposal_id),
                    },
                )
                .await?;
            format!(
                "time confirmed for {}",
                result.scheduled_time.format("%Y-%m-%d %H:%M UTC")
            )
        }
        Command::RejectTimes(payload) => {
            TimeFlow
                .reject_times(
                    conn,
                    RejectTimesParams {
                        ctx,
                        reason: payload.reason,
                    },
                )
                .await?
                .message
        }
        Command::SetDateType(payload) => {
            TimeFlow
                .set_date_type(
                    conn,
                    SetDateTypeParams {
                        ctx,
                        date_type: payload.date_type,
                    },
                )
                .await?
                .message
        }
        Command::SelectVenue(payload) => {
            let result = VenueFlow
                .select_venue(
                    conn,
                    SelectVenueParams {
                        ctx,
                        venue_id: VenueId(payload.venue_id),
                    },
                )
                .await?;
            format!("{} selected", result.venue.name)
        }
        Command::ConfirmBooking(payload) => {
            VenueFlow
                .confirm_booking(
                    conn,
                    ConfirmBookingParams {
                        ctx,
                        reference: payload.reference,
                    },
                )
                .await?
                .message
        }
        Command::ReportBookingFailed(payload) => {
            VenueFlow
                .report_booking_failed(
                    conn,
                    ReportBookingFailedParams {
                        ctx,
                        reason: payload.reason,
                    },
                )
                .await?
                .message
        }
        Command::RetryBooking => {
            VenueFlow
                .retry_booking(conn, RetryBookingParams { ctx })
                .await?
                .message
        }
        Command::SuggestVenue(payload) => {
            VenueSuggestionFlow
                .suggest_venue(
                    conn,
                    SuggestVenueParams {
                        ctx,
                        venue_id: VenueId(payload.venue_id),
                    },
                )
                .await?
                .message
        }
        Command::AcceptVenue => {
            VenueSuggestionFlow
                .accept_venue(conn, AcceptVenueParams { ctx })
                .await?
                .message
        }
        Command::DeclineVenue(payload) => {
            VenueSuggestionFlow
                .decline_venue(
                    conn,
                    DeclineVenueParams {
                        ctx,
                        reason: payload.reason,
                    },
                )
                .await?
                .message
        }
        Command::WithdrawVenue => {
            VenueSuggestionFlow
                .withdraw_venue(conn, WithdrawVenueParams { ctx })
                .await?
                .message
        }
        Command::Reschedule(payload) => {
            ModificationFlow
                .reschedule(
                    conn,
                    RescheduleParams {
                        ctx,
                        reason: payload.reason,
                    },
                )
                .await?
                .message
        }
        Command::ChangeVenue => {
            ModificationFlow
                .change_venue(conn, ChangeVenueParams { ctx })
                .await?
                .message
        }
        Command::Cancel(payload) => {
            ModificationFlow
                .cancel(
                    conn,
                    CancelParams {
                        ctx,
                        reason: payload.reason,
                    },
                )
                .await?
                .message
        }
        Command::ConfirmAttendance => {
            let result = LogisticsFlow
                .confirm_attendance(conn, ConfirmAttendanceParams { ctx })
                .await?;
            if result.both_confirmed {
                "attendance confirmed, you're both in".to_string()
            } else {
                "attendance confirmed".to_string()
            }
        }
        Command::RunningLate(payload) => {
            LogisticsFlow
                .running_late(
                    conn,
                    RunningLateParams {
                        ctx,
                        minutes: payload.minutes,
                    },
                )
                .await?
                .message
        }
        Command::Arrived => {
            LogisticsFlow
                .arrived(conn, ArrivedParams { ctx })
                .await?
                .message
        }
        Command::DidMeet(payload) => {
            let result = FeedbackFlow
                .did_meet(
                    conn,
                    DidMeetParams {
                        ctx,
                        did_meet: payload.did_meet,
                    },
                )
                .await?;
            format!("answer recorded: {}", result.did_meet)
        }
        Command::SubmitFeedback(payload) => {
            let result = FeedbackFlow
                .submit_feedback(
                    conn,
                    SubmitFeedbackParams {
                        ctx,
                        decision: payload.decision,
                        text: payload.text,
                    },
                )
                .await?;
            if result.completed {
                "feedback sent, date completed".to_string()
            } else {
                "feedback sent".to_string()
            }
        }
        Command::SkipFeedback => {
            FeedbackFlow
                .skip_feedback(conn, SkipFeedbackParams { ctx })
                .await?
                .message
        }
        Command::ExpandPanel(_) | Command::CollapsePanel(_) | Command::DismissSheet => {
            return Err(FlowError::rejected("panel actions do not change the date"));
        }
    };
    Ok(message)
}
