//! Credit ledger data models.
//!
//! Every balance mutation made by the generation core writes one
//! [`CreditLedgerEntry`] in the same transaction as the balance change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction of a balance mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditDirection {
    /// Balance increased (refund)
    Credit,
    /// Balance decreased (charge)
    Debit,
}

impl CreditDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
        }
    }

    /// Parse from the persisted form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "credit" => Some(Self::Credit),
            "debit" => Some(Self::Debit),
            _ => None,
        }
    }
}

/// Append-only audit record of one balance mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditLedgerEntry {
    pub user_id: i64,

    /// Absolute amount moved
    pub amount: u32,

    /// Balance after the mutation
    pub balance_after: i64,

    pub direction: CreditDirection,

    /// Source model tag, e.g. `mid-journey`
    pub model: String,

    pub remark: String,

    pub created_at: DateTime<Utc>,
}

impl CreditLedgerEntry {
    pub fn new(
        user_id: i64,
        amount: u32,
        balance_after: i64,
        direction: CreditDirection,
        model: impl Into<String>,
        remark: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            amount,
            balance_after,
            direction,
            model: model.into(),
            remark: remark.into(),
            created_at: Utc::now(),
        }
    }

    /// Balance before the mutation.
    pub fn balance_before(&self) -> i64 {
        match self.direction {
            CreditDirection::Credit => self.balance_after - i64::from(self.amount),
            CreditDirection::Debit => self.balance_after + i64::from(self.amount),
        }
    }
}
