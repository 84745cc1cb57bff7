//! Synthetic transaction feed.

use chrono::{Duration, Local, NaiveDateTime};
use rand::Rng;
use rand::seq::SliceRandom;

use super::{TIMESTAMP_FORMAT, Transaction};
use crate::config::{SourceConfig, WatchlistConfig};

/// Produces unscored transactions from the configured users, locations and counterparties.
///
/// Sanctioned entities are deliberately part of the counterparty pool so the screening
/// rules have something to find.
pub struct TransactionSource {
    users: Vec<(String, String)>,
    transaction_locations: Vec<String>,
    counterparties: Vec<String>,
    currency: String,
    min_amount: f64,
    max_amount: f64,
    max_backdate_minutes: i64,
    batch_min: usize,
    batch_max: usize,
}

impl TransactionSource {
    pub fn new(source: &SourceConfig, watchlists: &WatchlistConfig) -> Self {
        let counterparties = watchlists
            .sanctioned_entities
            .iter()
            .chain(source.counterparties.iter())
            .cloned()
            .collect();
        Self {
            users: source
                .users
                .iter()
                .map(|(u, l)| (u.clone(), l.clone()))
                .collect(),
            transaction_locations: source.transaction_locations.clone(),
            counterparties,
            currency: source.currency.clone(),
            min_amount: source.min_amount,
            max_amount: source.max_amount,
            max_backdate_minutes: source.max_backdate_minutes.max(0),
            batch_min: source.batch_min,
            batch_max: source.batch_max.max(source.batch_min),
        }
    }

    /// One transaction stamped relative to `now`.
    pub fn next_at<R: Rng + ?Sized>(&self, now: NaiveDateTime, rng: &mut R) -> Option<Transaction> {
        let (user_id, user_location) = self.users.choose(rng)?;
        let transaction_location = self.transaction_locations.choose(rng)?;
        let counterparty = self
            .counterparties
            .choose(rng)
            .map(String::as_str)
            .unwrap_or("Unknown Merchant");

        let backdate = rng.gen_range(0..=self.max_backdate_minutes);
        let timestamp = (now - Duration::minutes(backdate))
            .format(TIMESTAMP_FORMAT)
            .to_string();
        let amount = if self.max_amount > self.min_amount {
            rng.gen_range(self.min_amount..=self.max_amount)
        } else {
            self.min_amount
        };

        Some(Transaction {
            timestamp,
            user_id: user_id.clone(),
            amount: (amount * 100.0).round() / 100.0,
            currency: self.currency.clone(),
            description: format!("Payment to {counterparty} from {user_id}"),
            user_location: user_location.clone(),
            transaction_location: transaction_location.clone(),
        })
    }

    /// A batch of `batch_min..=batch_max` transactions stamped against local time.
    pub fn next_batch<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<Transaction> {
        let now = Local::now().naive_local();
        let count = rng.gen_range(self.batch_min..=self.batch_max);
        (0..count).filter_map(|_| self.next_at(now, rng)).collect()
    }
}
