use std::num::NonZeroU32;

use chrono::NaiveTime;
use rand::Rng;

use crate::config::{ScreeningConfig, WatchlistConfig};
use crate::core::Transaction;
use crate::error::ConfigError;

pub const UNUSUAL_HOURS: &str = "Unusual Hours";
pub const GEOLOCATION_MISMATCH: &str = "Geolocation Mismatch";
pub const SANCTIONED_ENTITY: &str = "Sanctioned Entity";
pub const HIGH_AMOUNT: &str = "High Amount";
pub const HIGH_VELOCITY: &str = "High Velocity";
pub const RISKY_GEOLOCATION: &str = "Risky Geolocation";

/// The predicate a rule applies. Checks never mutate the transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum Check {
    /// Time of day inside `[start, end]`, inclusive. Wraps past midnight when `start > end`.
    UnusualHours { start: NaiveTime, end: NaiveTime },
    /// Registered location differs from where the transaction happened.
    GeolocationMismatch,
    /// Description contains one of the literals (case-sensitive substring).
    SanctionedEntity { entities: Vec<String> },
    /// Amount strictly above the threshold.
    HighAmount { threshold: f64 },
    /// Independent draw; stands in for a velocity signal a single record cannot show.
    HighVelocity { probability: f64 },
    /// Transaction location is one of the listed locations.
    RiskyGeolocation { locations: Vec<String> },
}

impl Check {
    pub fn evaluate<R: Rng + ?Sized>(&self, tx: &Transaction, time: NaiveTime, rng: &mut R) -> bool {
        match self {
            Check::UnusualHours { start, end } => {
                if start <= end {
                    time >= *start && time <= *end
                } else {
                    time >= *start || time <= *end
                }
            }
            Check::GeolocationMismatch => tx.user_location != tx.transaction_location,
            Check::SanctionedEntity { entities } => {
                entities.iter().any(|e| tx.description.contains(e.as_str()))
            }
            Check::HighAmount { threshold } => tx.amount > *threshold,
            Check::HighVelocity { probability } => rng.r#gen::<f64>() < *probability,
            Check::RiskyGeolocation { locations } => {
                locations.iter().any(|l| *l == tx.transaction_location)
            }
        }
    }
}

/// A labelled check worth a fixed, positive number of points.
///
/// A firing rule always raises the score, so a transaction is flagged exactly when its
/// score is above zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub label: String,
    pub points: NonZeroU32,
    pub check: Check,
}

impl Rule {
    pub fn new(label: impl Into<String>, points: u32, check: Check) -> Result<Self, ConfigError> {
        let label = label.into();
        let Some(points) = NonZeroU32::new(points) else {
            return Err(ConfigError::ZeroPoints { label });
        };
        Ok(Self { label, points, check })
    }
}

/// Ordered set of independent rules. Order fixes the order of reported flags.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleCatalog {
    rules: Vec<Rule>,
}

impl RuleCatalog {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Build the standard six-rule catalog from startup configuration.
    pub fn from_config(
        screening: &ScreeningConfig,
        watchlists: &WatchlistConfig,
    ) -> Result<Self, ConfigError> {
        let (start, end) = screening.unusual_hours()?;
        Ok(Self::new(vec![
            Rule::new(UNUSUAL_HOURS, 25, Check::UnusualHours { start, end })?,
            Rule::new(GEOLOCATION_MISMATCH, 40, Check::GeolocationMismatch)?,
            Rule::new(
                SANCTIONED_ENTITY,
                100,
                Check::SanctionedEntity {
                    entities: watchlists.sanctioned_entities.clone(),
                },
            )?,
            Rule::new(
                HIGH_AMOUNT,
                30,
                Check::HighAmount {
                    threshold: screening.high_amount,
                },
            )?,
            Rule::new(
                HIGH_VELOCITY,
                50,
                Check::HighVelocity {
                    probability: screening.velocity_probability,
                },
            )?,
            Rule::new(
                RISKY_GEOLOCATION,
                60,
                Check::RiskyGeolocation {
                    locations: watchlists.high_risk_locations.clone(),
                },
            )?,
        ]))
    }

    /// Append a rule after the existing ones.
    #[cfg(test)]
    pub fn push(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Catalog position of a label.
    #[cfg(test)]
    pub fn position(&self, label: &str) -> Option<usize> {
        self.rules.iter().position(|r| r.label == label)
    }
}

#[cfg(test)]
pub(crate) fn default_catalog() -> RuleCatalog {
    RuleCatalog::from_config(&ScreeningConfig::default(), &WatchlistConfig::default()).unwrap()
}
