use sqlx::SqliteConnection;

use shared::domain::{DidMeet, FeedbackDecision, FeedbackStatus};

use crate::{role_columns, snapshot::load_instance, FlowContext, FlowError, FlowOutcome};

pub const MAX_FEEDBACK_CHARS: usize = 1000;

#[derive(Debug, Clone)]
pub struct DidMeetParams {
    pub ctx: FlowContext,
    pub did_meet: DidMeet,
}

#[derive(Debug, Clone)]
pub struct DidMeetResult {
    pub did_meet: DidMeet,
    /// True when this call changed the stored answer.
    pub changed: bool,
}

#[derive(Debug, Clone)]
pub struct SubmitFeedbackParams {
    pub ctx: FlowContext,
    pub decision: FeedbackDecision,
    pub text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SubmitFeedbackResult {
    pub completed: bool,
}

#[derive(Debug, Clone)]
pub struct SkipFeedbackParams {
    pub ctx: FlowContext,
}

/// Post-date answers. The date completes once both participants have either
/// submitted or skipped feedback.
#[derive(Debug, Default, Clone, Copy)]
pub struct FeedbackFlow;

impl FeedbackFlow {
    /// Repeat-safe: answering again overwrites the previous answer.
    pub async fn did_meet(
        &self,
        conn: &mut SqliteConnection,
        params: DidMeetParams,
    ) -> Result<DidMeetResult, FlowError> {
        let ctx = params.ctx;
        let instance = load_instance(conn, ctx.date_instance_id).await?;
        let previous = instance.feedback(ctx.role).did_meet;

        let columns = role_columns(ctx.role);
        sqlx::query(&format!(
            "UPDATE date_instances SET {} = ?, updated_at = ? WHERE id = ?",
            columns.did_meet
        ))
        .bind(params.did_meet.as_str())
        .bind(ctx.now)
        .bind(ctx.date_instance_id.0)
        .execute(&mut *conn)
        .await?;

        Ok(DidMeetResult {
            did_meet: params.did_meet,
            changed: previous != Some(params.did_meet),
        })
    }

    pub async fn submit_feedback(
        &self,
        conn: &mut SqliteConnection,
        params: SubmitFeedbackParams,
    ) -> Result<SubmitFeedbackResult, FlowError> {
        let ctx = params.ctx;
        let text = params
            .text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty());
        if text.is_some_and(|text| text.chars().count() > MAX_FEEDBACK_CHARS) {
            return Err(FlowError::rejected(format!(
                "feedback must be at most {MAX_FEEDBACK_CHARS} characters"
            )));
        }

        let instance = load_instance(conn, ctx.date_instance_id).await?;
        if instance.feedback(ctx.role).status != FeedbackStatus::Pending {
            return Err(FlowError::rejected("feedback already recorded"));
        }

        let columns = role_columns(ctx.role);
        sqlx::query(&format!(
            "UPDATE date_instances SET {} = 'submitted', {} = ?, {} = ?, updated_at = ? WHERE id = ?",
            columns.feedback_status, columns.decision, columns.feedback_text
        ))
        .bind(params.decision.as_str())
        .bind(text)
        .bind(ctx.now)
        .bind(ctx.date_instance_id.0)
        .execute(&mut *conn)
        .await?;

        let completed = complete_if_both_answered(conn, ctx).await?;
        Ok(SubmitFeedbackResult { completed })
    }

    pub async fn skip_feedback(
        &self,
        conn: &mut SqliteConnection,
        params: SkipFeedbackParams,
    ) -> Result<FlowOutcome, FlowError> {
        let ctx = params.ctx;
        let instance = load_instance(conn, ctx.date_instance_id).await?;
        if instance.feedback(ctx.role).status != FeedbackStatus::Pending {
            return Err(FlowError::rejected("feedback already recorded"));
        }

        let columns = role_columns(ctx.role);
        sqlx::query(&format!(
            "UPDATE date_instances SET {} = 'skipped', updated_at = ? WHERE id = ?",
            columns.feedback_status
        ))
        .bind(ctx.now)
        .bind(ctx.date_instance_id.0)
        .execute(&mut *conn)
        .await?;

        if complete_if_both_answered(conn, ctx).await? {
            Ok(FlowOutcome::new("feedback skipped, date completed"))
        } else {
            Ok(FlowOutcome::new("feedback skipped"))
        }
    }
}

async fn complete_if_both_answered(
    conn: &mut SqliteConnection,
    ctx: FlowContext,
) -> Result<bool, FlowError> {
    let instance = load_instance(conn, ctx.date_instance_id).await?;
    let both_answered = instance.initiator_feedback.status != FeedbackStatus::Pending
        && instance.receiver_feedback.status != FeedbackStatus::Pending;
    if !both_answered {
        return Ok(false);
    }

    sqlx::query(
        "UPDATE date_instances SET status = 'completed', decision_window_end = NULL, updated_at = ? WHERE id = ?",
    )
    .bind(ctx.now)
    .bind(ctx.date_instance_id.0)
    .execute(&mut *conn)
    .await?;
    Ok(true)
}
