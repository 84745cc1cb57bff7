use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::core::Transaction;
use crate::db::{SharedDatabase, TransactionRecord};
use crate::signals::ScoringEngine;

/// Messages from pipeline to downstream consumers.
#[derive(Debug, Clone)]
pub enum PipelineOutput {
    /// Scored and stored.
    Stored(TransactionRecord),
    /// Rejected before scoring completed; nothing was stored.
    Rejected { timestamp: String, reason: String },
}

/// Counters reported when the feed closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    pub scored: u64,
    pub flagged: u64,
    pub rejected: u64,
    pub store_failures: u64,
}

/// Run the pipeline: receive transactions, score each to completion, store it, forward it.
///
/// Transactions are handled strictly one at a time. A record is written only once fully
/// scored, in a single insert.
pub async fn run_pipeline<R: Rng + Send>(
    mut rx: mpsc::UnboundedReceiver<Transaction>,
    out: mpsc::UnboundedSender<PipelineOutput>,
    engine: ScoringEngine,
    db: SharedDatabase,
    mut rng: R,
) -> PipelineSummary {
    let mut summary = PipelineSummary::default();

    info!("Pipeline started, waiting for transactions...");

    while let Some(tx) = rx.recv().await {
        let timestamp = tx.timestamp.clone();
        let scored = match engine.score(tx, &mut rng) {
            Ok(scored) => scored,
            Err(e) => {
                warn!("Rejected transaction at {timestamp:?}: {e}");
                summary.rejected += 1;
                let _ = out.send(PipelineOutput::Rejected {
                    timestamp,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        summary.scored += 1;

        let id = match db.store(&scored) {
            Ok(id) => id,
            Err(e) => {
                error!("Failed to store scored transaction: {e}");
                summary.store_failures += 1;
                continue;
            }
        };

        if scored.is_flagged() {
            summary.flagged += 1;
            debug!(
                id,
                score = scored.anomaly_score,
                reason = %scored.flag_reason().unwrap_or_default(),
                "Transaction flagged"
            );
        }

        if out.send(PipelineOutput::Stored(TransactionRecord { id, scored })).is_err() {
            debug!("Output channel closed, continuing without consumers");
        }

        if summary.scored % 100 == 0 {
            info!("Pipeline processed {} txs, {} flagged", summary.scored, summary.flagged);
        }
    }

    info!(
        "Pipeline shutting down after {} txs ({} flagged, {} rejected)",
        summary.scored, summary.flagged, summary.rejected
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::make_test_tx;
    use crate::signals::rules::default_catalog;
    use rand::rngs::mock::StepRng;

    #[tokio::test]
    async fn scores_stores_and_forwards() {
        let db = SharedDatabase::open_in_memory().unwrap();
        let (tx_in, rx_in) = mpsc::unbounded_channel();
        let (tx_out, mut rx_out) = mpsc::unbounded_channel();

        let mut clean = make_test_tx();
        clean.amount = 10.0;
        let mut big = make_test_tx();
        big.amount = 15_000.0;
        let mut broken = make_test_tx();
        broken.timestamp = "yesterday".into();

        tx_in.send(clean).unwrap();
        tx_in.send(big).unwrap();
        tx_in.send(broken).unwrap();
        drop(tx_in);

        let summary = run_pipeline(
            rx_in,
            tx_out,
            ScoringEngine::new(default_catalog()),
            db.clone(),
            StepRng::new(u64::MAX, 0),
        )
        .await;

        assert_eq!(
            summary,
            PipelineSummary {
                scored: 2,
                flagged: 1,
                rejected: 1,
                store_failures: 0,
            }
        );
        assert_eq!(db.total_count().unwrap(), 2);
        assert_eq!(db.flagged_count().unwrap(), 1);

        let mut outputs = Vec::new();
        while let Some(o) = rx_out.recv().await {
            outputs.push(o);
        }
        assert_eq!(outputs.len(), 3);
        match &outputs[1] {
            PipelineOutput::Stored(record) => {
                assert_eq!(record.scored.flags, vec!["High Amount"]);
                assert_eq!(record.scored.anomaly_score, 30);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(&outputs[2], PipelineOutput::Rejected { timestamp, .. } if timestamp == "yesterday"));
    }

    #[tokio::test]
    async fn keeps_running_without_consumer() {
        let db = SharedDatabase::open_in_memory().unwrap();
        let (tx_in, rx_in) = mpsc::unbounded_channel();
        let (tx_out, rx_out) = mpsc::unbounded_channel();
        drop(rx_out);

        tx_in.send(make_test_tx()).unwrap();
        tx_in.send(make_test_tx()).unwrap();
        drop(tx_in);

        let summary = run_pipeline(
            rx_in,
            tx_out,
            ScoringEngine::new(default_catalog()),
            db.clone(),
            StepRng::new(u64::MAX, 0),
        )
        .await;
        assert_eq!(summary.scored, 2);
        assert_eq!(db.total_count().unwrap(), 2);
    }
}
