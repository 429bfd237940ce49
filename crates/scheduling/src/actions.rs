use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize};
use thiserror::Error;

use shared::domain::{DateTypeCore, DidMeet, FeedbackDecision};

/// Which executor owns an action. `UiOnly` actions never touch storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Time,
    Venue,
    VenueSuggestion,
    Modification,
    Logistics,
    Feedback,
    UiOnly,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Time => "time",
            Tier::Venue => "venue",
            Tier::VenueSuggestion => "venue_suggestion",
            Tier::Modification => "modification",
            Tier::Logistics => "logistics",
            Tier::Feedback => "feedback",
            Tier::UiOnly => "ui_only",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! actions {
    ($($variant:ident => $code:literal, $tier:ident;)+) => {
        /// Every action a participant can submit.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Action {
            $($variant),+
        }

        impl Action {
            pub const ALL: &'static [Action] = &[$(Action::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(Action::$variant => $code),+
                }
            }

            pub fn tier(self) -> Tier {
                match self {
                    $(Action::$variant => Tier::$tier),+
                }
            }
        }

        impl FromStr for Action {
            type Err = UnknownAction;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($code => Ok(Action::$variant),)+
                    other => Err(UnknownAction(other.to_string())),
                }
            }
        }
    };
}

actions! {
    SuggestTimes => "suggest_times", Time;
    WithdrawTimes => "withdraw_times", Time;
    ConfirmTime => "confirm_time", Time;
    RejectTimes => "reject_times", Time;
    SetDateType => "set_date_type", Time;
    SelectVenue => "select_venue", Venue;
    ConfirmBooking => "confirm_booking", Venue;
    ReportBookingFailed => "report_booking_failed", Venue;
    RetryBooking => "retry_booking", Venue;
    SuggestVenue => "suggest_venue", VenueSuggestion;
    AcceptVenue => "accept_venue", VenueSuggestion;
    DeclineVenue => "decline_venue", VenueSuggestion;
    WithdrawVenue => "withdraw_venue", VenueSuggestion;
    Reschedule => "reschedule", Modification;
    ChangeVenue => "change_venue", Modification;
    Cancel => "cancel", Modification;
    ConfirmAttendance => "confirm_attendance", Logistics;
    RunningLate => "running_late", Logistics;
    Arrived => "arrived", Logistics;
    DidMeet => "did_meet", Feedback;
    SubmitFeedback => "submit_feedback", Feedback;
    SkipFeedback => "skip_feedback", Feedback;
    ExpandPanel => "expand_panel", UiOnly;
    CollapsePanel => "collapse_panel", UiOnly;
    DismissSheet => "dismiss_sheet", UiOnly;
}

impl Action {
    pub fn is_ui_only(self) -> bool {
        self.tier() == Tier::UiOnly
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown action '{0}'")]
pub struct UnknownAction(pub String);

#[derive(Debug, Clone, Error)]
#[error("invalid payload for {action}: {message}")]
pub struct PayloadError {
    pub action: Action,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotPayload {
    pub starts_at: DateTime<Utc>,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SuggestTimesPayload {
    pub slots: Vec<SlotPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmTimePayload {
    pub proposal_id: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReasonPayload {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetDateTypePayload {
    pub date_type: DateTypeCore,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VenuePayload {
    pub venue_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfirmBookingPayload {
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunningLatePayload {
    pub minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DidMeetPayload {
    pub did_meet: DidMeet,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitFeedbackPayload {
    pub decision: FeedbackDecision,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PanelPayload {
    #[serde(default)]
    pub panel: Option<String>,
}

/// An action together with its decoded payload.
#[derive(Debug, Clone)]
pub enum Command {
    SuggestTimes(SuggestTimesPayload),
    WithdrawTimes,
    ConfirmTime(ConfirmTimePayload),
    RejectTimes(ReasonPayload),
    SetDateType(SetDateTypePayload),
    SelectVenue(VenuePayload),
    ConfirmBooking(ConfirmBookingPayload),
    ReportBookingFailed(ReasonPayload),
    RetryBooking,
    SuggestVenue(VenuePayload),
    AcceptVenue,
    DeclineVenue(ReasonPayload),
    WithdrawVenue,
    Reschedule(ReasonPayload),
    ChangeVenue,
    Cancel(ReasonPayload),
    ConfirmAttendance,
    RunningLate(RunningLatePayload),
    Arrived,
    DidMeet(DidMeetPayload),
    SubmitFeedback(SubmitFeedbackPayload),
    SkipFeedback,
    ExpandPanel(PanelPayload),
    CollapsePanel(PanelPayload),
    DismissSheet,
}

impl Command {
    /// Decodes `payload` into the shape `action` expects. A JSON `null` payload is
    /// treated as an empty object so payload-free actions need no body.
    pub fn decode(action: Action, payload: &serde_json::Value) -> Result<Self, PayloadError> {
        let command = match action {
            Action::SuggestTimes => Command::SuggestTimes(decode(action, payload)?),
            Action::WithdrawTimes => Command::WithdrawTimes,
            Action::ConfirmTime => Command::ConfirmTime(decode(action, payload)?),
            Action::RejectTimes => Command::RejectTimes(decode(action, payload)?),
            Action::SetDateType => Command::SetDateType(decode(action, payload)?),
            Action::SelectVenue => Command::SelectVenue(decode_venue(action, payload)?),
            Action::ConfirmBooking => Command::ConfirmBooking(decode(action, payload)?),
            Action::ReportBookingFailed => Command::ReportBookingFailed(decode(action, payload)?),
            Action::RetryBooking => Command::RetryBooking,
            Action::SuggestVenue => Command::SuggestVenue(decode_venue(action, payload)?),
            Action::AcceptVenue => Command::AcceptVenue,
            Action::DeclineVenue => Command::DeclineVenue(decode(action, payload)?),
            Action::WithdrawVenue => Command::WithdrawVenue,
            Action::Reschedule => Command::Reschedule(decode(action, payload)?),
            Action::ChangeVenue => Command::ChangeVenue,
            Action::Cancel => Command::Cancel(decode(action, payload)?),
            Action::ConfirmAttendance => Command::ConfirmAttendance,
            Action::RunningLate => Command::RunningLate(decode(action, payload)?),
            Action::Arrived => Command::Arrived,
            Action::DidMeet => Command::DidMeet(decode(action, payload)?),
            Action::SubmitFeedback => Command::SubmitFeedback(decode(action, payload)?),
            Action::SkipFeedback => Command::SkipFeedback,
            Action::ExpandPanel => Command::ExpandPanel(decode(action, payload)?),
            Action::CollapsePanel => Command::CollapsePanel(decode(action, payload)?),
            Action::DismissSheet => Command::DismissSheet,
        };
        Ok(command)
    }
}

fn decode<T: DeserializeOwned>(action: Action, payload: &serde_json::Value) -> Result<T, PayloadError> {
    let value = if payload.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        payload.clone()
    };
    serde_json::from_value(value).map_err(|err| PayloadError {
        action,
        message: err.to_string(),
    })
}

fn decode_venue(action: Action, payload: &serde_json::Value) -> Result<VenuePayload, PayloadError> {
    let venue: VenuePayload = decode(action, payload)?;
    if venue.venue_id.trim().is_empty() {
        return Err(PayloadError {
            action,
            message: "venue_id must not be empty".to_string(),
        });
    }
    Ok(venue)
}
