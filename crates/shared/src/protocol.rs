use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{
        BookingStatus, DateInstanceId, DateTypeCore, FeedbackStatus, LogisticsEvent,
        ParticipantRole, PartnerInfo, TimeProposal, UiState, VenueRef,
    },
    error::ErrorCode,
};

/// Body of an action submission. `payload` is decoded per action by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub action: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl ActionRequest {
    pub fn new(action: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            action: action.into(),
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigate_to: Option<String>,
    /// State derived from the post-mutation snapshot, present on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_state: Option<UiState>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub available_actions: Vec<AvailableAction>,
}

impl ActionResponse {
    pub fn ok(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            action: action.into(),
            message: Some(message.into()),
            error: None,
            error_code: None,
            navigate_to: None,
            ui_state: None,
            available_actions: Vec::new(),
        }
    }

    pub fn failed(action: impl Into<String>, code: ErrorCode, error: impl Into<String>) -> Self {
        Self {
            success: false,
            action: action.into(),
            message: None,
            error: Some(error.into()),
            error_code: Some(code),
            navigate_to: None,
            ui_state: None,
            available_actions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    Primary,
    Destructive,
    Secondary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableAction {
    pub action: String,
    pub label: String,
    pub style: ButtonStyle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusLine {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    pub icon: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerStyle {
    Normal,
    Urgent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timer {
    pub ends_at: DateTime<Utc>,
    pub remaining_seconds: i64,
    pub expired: bool,
    pub style: TimerStyle,
}

/// One renderable block of the date screen. The status line always comes first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiElement {
    StatusLine {
        status: StatusLine,
    },
    TimeSlots {
        slots: Vec<TimeProposal>,
        editable: bool,
    },
    VenueOptions {
        venues: Vec<VenueRef>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        date_type: Option<DateTypeCore>,
    },
    BookingStatus {
        venue: Option<VenueRef>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<BookingStatus>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reference: Option<String>,
    },
    Confirmation {
        me_confirmed: bool,
        partner_confirmed: bool,
    },
    LogisticsPanel {
        events: Vec<LogisticsEvent>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        venue: Option<VenueRef>,
    },
    FeedbackForm {
        my_status: FeedbackStatus,
        did_meet_answered: bool,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiStateResponse {
    pub date_instance_id: DateInstanceId,
    pub ui_state: UiState,
    pub ui_state_code: String,
    pub hint: String,
    pub my_role: ParticipantRole,
    pub partner_info: PartnerInfo,
    pub elements: Vec<UiElement>,
    pub available_actions: Vec<AvailableAction>,
    pub status_line: StatusLine,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer: Option<Timer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_type: Option<DateTypeCore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<VenueRef>,
}
