mod assistant;
mod config;
mod core;
mod db;
mod error;
mod masking;
mod report;
mod signals;

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::assistant::gemini::GeminiClient;
use crate::assistant::{AssistantError, NO_DATA_REPLY, QueryRoute};
use crate::config::Config;
use crate::core::Transaction;
use crate::core::pipeline::{PipelineOutput, run_pipeline};
use crate::core::source::TransactionSource;
use crate::db::SharedDatabase;
use crate::masking::MaskingCodec;
use crate::report::FlagStats;
use crate::signals::ScoringEngine;
use crate::signals::rules::RuleCatalog;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("txsentinel=info".parse()?))
        .init();

    info!("TxSentinel starting...");

    // Load configuration
    let config_path = std::env::var("TXSENTINEL_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = Config::load(&config_path)?;
    config.validate().context("invalid configuration")?;
    info!("Config: {:?}", config.screening);

    // Both tables are fixed for the life of the process
    let catalog = RuleCatalog::from_config(&config.screening, &config.watchlists)?;
    info!("Rule catalog loaded with {} rules", catalog.len());
    let codec = MaskingCodec::new(
        &config.watchlists.sanctioned_entities,
        &config.watchlists.high_risk_locations,
    )
    .context("masking table is inconsistent")?;

    // Open transaction store
    let db_path = Path::new(&config.database.path);
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }
    let db = SharedDatabase::open(db_path).context("failed to open transaction store")?;
    if config.database.reset_on_start {
        db.reset()?;
        info!("Transaction store reset at {}", config.database.path);
    } else {
        info!("Transaction store opened at {}", config.database.path);
    }

    let mut rng = match config.source.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let engine_rng = StdRng::seed_from_u64(rng.r#gen());

    // Feed -> Pipeline channel
    let (feed_tx, feed_rx) = mpsc::unbounded_channel();
    // Pipeline -> alert log channel
    let (out_tx, out_rx) = mpsc::unbounded_channel();

    let pipeline = tokio::spawn(run_pipeline(
        feed_rx,
        out_tx,
        ScoringEngine::new(catalog),
        db.clone(),
        engine_rng,
    ));
    let alerts = tokio::spawn(log_alerts(out_rx, config.screening.high_risk_threshold));

    let source = TransactionSource::new(&config.source, &config.watchlists);
    run_feed(&source, feed_tx, &mut rng, &config).await;

    let summary = pipeline.await.context("pipeline task failed")?;
    alerts.await.context("alert task failed")?;
    info!(
        "Feed finished: {} scored, {} flagged, {} rejected, {} store failures",
        summary.scored, summary.flagged, summary.rejected, summary.store_failures
    );

    let flagged = db.all_flagged()?;
    let scored: Vec<_> = flagged.iter().map(|r| &r.scored).collect();
    let stats = FlagStats::compute(scored.iter().copied(), config.screening.high_risk_threshold);
    info!("Stats: {}", serde_json::to_string(&stats)?);
    for (label, count) in report::flag_distribution(scored.iter().copied()) {
        info!("  {label}: {count}");
    }

    if let Some(ref path) = config.report.export_csv {
        let path = if path.is_empty() {
            report::default_export_name(chrono::Local::now().date_naive())
        } else {
            path.clone()
        };
        let file = std::fs::File::create(&path).with_context(|| format!("failed to create {path}"))?;
        report::write_csv(&flagged, file)?;
        info!("Exported {} flagged transactions to {path}", flagged.len());
    }

    if let Some(ref query) = config.assistant.query {
        match answer_query(&config, &db, &codec, query).await {
            Ok(answer) => println!("{answer}"),
            Err(e) => warn!("Query failed: {e}"),
        }
    }

    Ok(())
}

/// Push synthetic batches into the pipeline until the configured count or Ctrl-C.
async fn run_feed(
    source: &TransactionSource,
    feed_tx: mpsc::UnboundedSender<Transaction>,
    rng: &mut StdRng,
    config: &Config,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(config.source.interval_seconds.max(1)));
    let mut produced: u64 = 0;
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping feed");
                break;
            }
        }
        for tx in source.next_batch(rng) {
            if feed_tx.send(tx).is_err() {
                warn!("Pipeline closed, stopping feed");
                return;
            }
        }
        produced += 1;
        if config.source.batches > 0 && produced >= config.source.batches {
            break;
        }
    }
}

async fn log_alerts(mut rx: mpsc::UnboundedReceiver<PipelineOutput>, high_risk_threshold: u32) {
    while let Some(output) = rx.recv().await {
        match output {
            PipelineOutput::Stored(record) if record.scored.is_high_risk(high_risk_threshold) => {
                warn!(
                    id = record.id,
                    user = %record.scored.tx.user_id,
                    score = record.scored.anomaly_score,
                    "High-risk alert: {}",
                    record.scored.flag_reason().unwrap_or_default()
                );
            }
            PipelineOutput::Stored(record) if record.scored.is_flagged() => {
                info!(
                    id = record.id,
                    score = record.scored.anomaly_score,
                    "Alert: {}",
                    record.scored.flag_reason().unwrap_or_default()
                );
            }
            PipelineOutput::Stored(_) => {}
            PipelineOutput::Rejected { timestamp, reason } => {
                warn!("Dropped transaction stamped {timestamp:?}: {reason}");
            }
        }
    }
}

/// Answer a question locally for report requests, otherwise through the masked assistant.
async fn answer_query(
    config: &Config,
    db: &SharedDatabase,
    codec: &MaskingCodec,
    query: &str,
) -> anyhow::Result<String> {
    let recent = db.recent_flagged(config.report.recent_limit)?;

    if QueryRoute::classify(query) == QueryRoute::Report {
        if recent.is_empty() {
            return Ok(NO_DATA_REPLY.to_string());
        }
        let scored: Vec<_> = recent.iter().map(|r| &r.scored).collect();
        let summary = serde_json::json!({
            "stats": FlagStats::snapshot(db, config.screening.high_risk_threshold)?,
            "flagReasons": report::flag_distribution(scored.iter().copied()),
            "scoreHistogram": report::score_histogram(scored.iter().copied(), config.report.histogram_bins),
        });
        return Ok(serde_json::to_string_pretty(&summary)?);
    }

    let api_key = config.api_key().ok_or(AssistantError::NotConfigured)?;
    let client = GeminiClient::new(&config.assistant, api_key)?;
    let answer = assistant::ask_assistant(&client, codec, &recent, query).await?;
    Ok(answer)
}
