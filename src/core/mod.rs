pub mod pipeline;
pub mod source;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::ScoreError;

/// Layout of every transaction timestamp (local time, second precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Separator used when flag labels are flattened into a single reason string.
pub const REASON_SEPARATOR: &str = ", ";

/// An unscored transaction as produced by a feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Local time formatted with [`TIMESTAMP_FORMAT`].
    pub timestamp: String,
    pub user_id: String,
    pub amount: f64,
    pub currency: String,
    pub description: String,
    /// Where the user is registered.
    pub user_location: String,
    /// Where the transaction took place.
    pub transaction_location: String,
}

impl Transaction {
    /// Parse the timestamp and check the fields scoring depends on.
    pub fn validate(&self) -> Result<NaiveDateTime, ScoreError> {
        if self.user_id.is_empty() {
            return Err(ScoreError::MissingField("user_id"));
        }
        if self.currency.is_empty() {
            return Err(ScoreError::MissingField("currency"));
        }
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(ScoreError::InvalidAmount(self.amount));
        }
        NaiveDateTime::parse_from_str(&self.timestamp, TIMESTAMP_FORMAT).map_err(|source| {
            ScoreError::Timestamp {
                value: self.timestamp.clone(),
                source,
            }
        })
    }
}

/// A transaction after one pass through the scoring engine.
///
/// Flagged status is derived from `flags`; it is never stored on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredTx {
    #[serde(flatten)]
    pub tx: Transaction,
    /// Triggered labels, in catalog order.
    pub flags: Vec<String>,
    pub anomaly_score: u32,
}

impl ScoredTx {
    pub fn is_flagged(&self) -> bool {
        !self.flags.is_empty()
    }

    /// Labels joined for display and storage, `None` when nothing fired.
    pub fn flag_reason(&self) -> Option<String> {
        if self.flags.is_empty() {
            None
        } else {
            Some(self.flags.join(REASON_SEPARATOR))
        }
    }

    pub fn is_high_risk(&self, threshold: u32) -> bool {
        self.anomaly_score >= threshold
    }
}

/// Split a stored reason string back into its labels.
pub fn split_reason(reason: Option<&str>) -> Vec<String> {
    match reason {
        Some(r) if !r.is_empty() => r.split(REASON_SEPARATOR).map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
pub(crate) fn make_test_tx() -> Transaction {
    Transaction {
        timestamp: "2024-03-01 14:00:00".to_string(),
        user_id: "user123".to_string(),
        amount: 50.0,
        currency: "USD".to_string(),
        description: "Payment to GoodCorp from user123".to_string(),
        user_location: "New York".to_string(),
        transaction_location: "New York".to_string(),
    }
}
