pub mod rules;
pub mod score;

use rand::Rng;

use crate::core::{ScoredTx, Transaction};
use crate::error::ScoreError;
use rules::RuleCatalog;
use score::Tally;

/// The scoring engine runs every rule in the catalog and sums the points of those that fire.
pub struct ScoringEngine {
    catalog: RuleCatalog,
}

impl ScoringEngine {
    pub fn new(catalog: RuleCatalog) -> Self {
        Self { catalog }
    }

    #[cfg(test)]
    pub fn catalog(&self) -> &RuleCatalog {
        &self.catalog
    }

    /// Evaluate all rules in catalog order.
    ///
    /// Every rule sees the same input regardless of what fired before it. `rng` is only
    /// consumed by probabilistic checks. A malformed transaction is an error, never a zero score.
    pub fn evaluate<R: Rng + ?Sized>(
        &self,
        tx: &Transaction,
        rng: &mut R,
    ) -> Result<(Vec<String>, u32), ScoreError> {
        let time = tx.validate()?.time();
        let mut tally = Tally::new();
        for rule in self.catalog.iter() {
            if rule.check.evaluate(tx, time, rng) {
                tally.record(&rule.label, rule.points.get());
            }
        }
        Ok(tally.into_parts())
    }

    /// Score a transaction into its persisted form.
    pub fn score<R: Rng + ?Sized>(&self, tx: Transaction, rng: &mut R) -> Result<ScoredTx, ScoreError> {
        let (flags, anomaly_score) = self.evaluate(&tx, rng)?;
        Ok(ScoredTx {
            tx,
            flags,
            anomaly_score,
        })
    }
}
