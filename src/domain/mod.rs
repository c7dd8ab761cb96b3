use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod allocation;
pub mod balance;
pub mod validation;

pub use allocation::{allocate, Allocation, PartnerSpend};
pub use balance::{balance_of, balances, Balances, Overflow};

/// A single entry in the points ledger
///
/// Transactions are immutable once stored. This is also the persisted shape of a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Partner that earned or spent the points
    pub partner: String,
    /// Difference in points
    ///
    /// A positive number is a credit (points earned). A negative number is a debit (points spent).
    pub points: i64,
    /// When the points were earned or spent
    pub time: DateTime<Utc>,
}

impl Transaction {
    pub fn new(partner: impl Into<String>, points: i64, time: DateTime<Utc>) -> Self {
        Self {
            partner: partner.into(),
            points,
            time,
        }
    }

    pub fn is_credit(&self) -> bool {
        self.points > 0
    }

    pub fn is_debit(&self) -> bool {
        self.points < 0
    }
}

/// Candidate transaction as received from a caller, before validation
///
/// Every field is optional and `points` is kept as a raw JSON value, so that missing or malformed
/// fields surface as validation errors instead of decoding errors.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

impl TransactionInput {
    pub fn new(partner: &str, points: i64, time: &str) -> Self {
        Self {
            partner: Some(partner.to_string()),
            points: Some(points.into()),
            time: Some(time.to_string()),
        }
    }
}
