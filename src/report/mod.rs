//! Read-only statistics over stored alerts.

use std::collections::HashMap;
use std::io::Write;

use chrono::{Local, NaiveDate};
use serde::Serialize;

use crate::core::ScoredTx;
use crate::db::{SharedDatabase, TransactionRecord};

/// Headline numbers for the alert view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagStats {
    pub total_flagged: usize,
    /// Transactions scoring at or above the high-risk threshold.
    pub high_risk_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

impl FlagStats {
    /// Compute over an in-memory set. Unflagged entries are ignored.
    pub fn compute<'a>(txs: impl IntoIterator<Item = &'a ScoredTx>, high_risk_threshold: u32) -> Self {
        let mut stats = FlagStats {
            total_flagged: 0,
            high_risk_count: 0,
            last_updated: None,
        };
        for tx in txs.into_iter().filter(|t| t.is_flagged()) {
            stats.total_flagged += 1;
            if tx.is_high_risk(high_risk_threshold) {
                stats.high_risk_count += 1;
            }
        }
        stats
    }

    /// Live snapshot straight from the store, stamped with the local time.
    pub fn snapshot(db: &SharedDatabase, high_risk_threshold: u32) -> Result<Self, rusqlite::Error> {
        Ok(FlagStats {
            total_flagged: db.flagged_count()?,
            high_risk_count: db.count_at_least(high_risk_threshold)?,
            last_updated: Some(Local::now().format("%H:%M:%S").to_string()),
        })
    }
}

/// Count of each label across all transactions, most frequent first (ties by label).
pub fn flag_distribution<'a>(txs: impl IntoIterator<Item = &'a ScoredTx>) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for tx in txs {
        for flag in &tx.flags {
            *counts.entry(flag.as_str()).or_default() += 1;
        }
    }
    let mut dist: Vec<(String, usize)> = counts.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
    dist.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    dist
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

/// Equal-width histogram of anomaly scores over the observed range.
///
/// The last bin includes its upper edge. A range of one value is widened by 0.5 each side.
pub fn score_histogram<'a>(txs: impl IntoIterator<Item = &'a ScoredTx>, bins: usize) -> Vec<HistogramBin> {
    let scores: Vec<f64> = txs.into_iter().map(|t| t.anomaly_score as f64).collect();
    if bins == 0 || scores.is_empty() {
        return Vec::new();
    }
    let mut lo = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let mut hi = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }
    let width = (hi - lo) / bins as f64;
    let mut hist: Vec<HistogramBin> = (0..bins)
        .map(|i| HistogramBin {
            lower: lo + width * i as f64,
            upper: if i + 1 == bins { hi } else { lo + width * (i + 1) as f64 },
            count: 0,
        })
        .collect();
    for s in scores {
        let idx = (((s - lo) / width) as usize).min(bins - 1);
        hist[idx].count += 1;
    }
    hist
}

pub fn default_export_name(date: NaiveDate) -> String {
    format!("compliance_report_{}.csv", date.format("%Y%m%d"))
}

/// Write records as CSV with a header row.
pub fn write_csv<W: Write>(records: &[TransactionRecord], writer: W) -> Result<(), csv::Error> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record([
        "id",
        "timestamp",
        "user_id",
        "amount",
        "currency",
        "description",
        "user_location",
        "transaction_location",
        "is_flagged",
        "flag_reason",
        "anomaly_score",
    ])?;
    for r in records {
        let tx = &r.scored.tx;
        out.write_record([
            r.id.to_string(),
            tx.timestamp.clone(),
            tx.user_id.clone(),
            tx.amount.to_string(),
            tx.currency.clone(),
            tx.description.clone(),
            tx.user_location.clone(),
            tx.transaction_location.clone(),
            (r.scored.is_flagged() as i32).to_string(),
            r.scored.flag_reason().unwrap_or_default(),
            r.scored.anomaly_score.to_string(),
        ])?;
    }
    out.flush()?;
    Ok(())
}
