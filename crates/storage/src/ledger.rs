use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqliteConnection;

use shared::domain::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditKind {
    AttendDate,
}

impl CreditKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CreditKind::AttendDate => "attend-date",
        }
    }
}

#[derive(Debug, Clone)]
pub struct WingsCredit {
    pub user_id: UserId,
    /// Idempotency key together with `user_id` and `kind`.
    pub ref_id: String,
    pub kind: CreditKind,
}

/// The economy ledger as seen by the scheduling engine: one idempotent credit call,
/// executed on the caller's transaction.
#[async_trait]
pub trait WingsLedger: Send + Sync {
    /// Returns true when the credit was newly recorded, false when it already existed.
    async fn credit_action(&self, conn: &mut SqliteConnection, credit: &WingsCredit) -> Result<bool>;
}

#[derive(Debug, Clone)]
pub struct SqliteWingsLedger {
    pub attend_date_bonus: i64,
}

impl Default for SqliteWingsLedger {
    fn default() -> Self {
        Self {
            attend_date_bonus: 10,
        }
    }
}

impl SqliteWingsLedger {
    fn amount_for(&self, kind: CreditKind) -> i64 {
        match kind {
            CreditKind::AttendDate => self.attend_date_bonus,
        }
    }
}

#[async_trait]
impl WingsLedger for SqliteWingsLedger {
    async fn credit_action(&self, conn: &mut SqliteConnection, credit: &WingsCredit) -> Result<bool> {
        let inserted = sqlx::query(
            "INSERT INTO wings_ledger (user_id, kind, ref_id, amount, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(user_id, kind, ref_id) DO NOTHING",
        )
        .bind(credit.user_id.0)
        .bind(credit.kind.as_str())
        .bind(&credit.ref_id)
        .bind(self.amount_for(credit.kind))
        .bind(Utc::now())
        .execute(&mut *conn)
        .await
        .with_context(|| {
            format!(
                "failed to credit {} for user {}",
                credit.kind.as_str(),
                credit.user_id
            )
        })?
        .rows_affected();
        Ok(inserted == 1)
    }
}
