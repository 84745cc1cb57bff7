use chrono::NaiveTime;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::ConfigError;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub screening: ScreeningConfig,
    pub watchlists: WatchlistConfig,
    pub source: SourceConfig,
    pub database: DatabaseConfig,
    pub assistant: AssistantConfig,
    pub report: ReportConfig,
}

/// Thresholds used by the rule catalog.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScreeningConfig {
    pub unusual_hours_start: String,
    pub unusual_hours_end: String,
    pub high_amount: f64,
    pub velocity_probability: f64,
    pub high_risk_threshold: u32,
}

/// Sensitive literal sets shared by the rule catalog and the masking codec.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WatchlistConfig {
    pub sanctioned_entities: Vec<String>,
    pub high_risk_locations: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SourceConfig {
    /// user id -> registered location
    pub users: BTreeMap<String, String>,
    pub transaction_locations: Vec<String>,
    /// Benign counterparties mixed in with sanctioned entities.
    pub counterparties: Vec<String>,
    pub currency: String,
    pub min_amount: f64,
    pub max_amount: f64,
    pub max_backdate_minutes: i64,
    pub batch_min: usize,
    pub batch_max: usize,
    pub interval_seconds: u64,
    /// Number of batches to produce; 0 runs until interrupted.
    pub batches: u64,
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub reset_on_start: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AssistantConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
    /// Question answered once after the feed stops.
    pub query: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ReportConfig {
    pub recent_limit: usize,
    pub histogram_bins: usize,
    pub export_csv: Option<String>,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            unusual_hours_start: "01:00:00".into(),
            unusual_hours_end: "05:00:00".into(),
            high_amount: 10_000.0,
            velocity_probability: 0.05,
            high_risk_threshold: 90,
        }
    }
}

impl Default for WatchlistConfig {
    fn default() -> Self {
        Self {
            sanctioned_entities: vec![
                "Monitored Entity Alpha".into(),
                "High-Risk Corp Beta".into(),
                "Watchlist Inc. Gamma".into(),
                "Global Oversight Ltd.".into(),
            ],
            high_risk_locations: vec!["Moscow".into(), "Cayman Islands".into()],
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        let users = [
            ("user123", "New York"),
            ("user456", "London"),
            ("user789", "Tokyo"),
        ]
        .into_iter()
        .map(|(u, l)| (u.to_string(), l.to_string()))
        .collect();
        Self {
            users,
            transaction_locations: ["New York", "London", "Tokyo", "Moscow", "Beijing", "Cayman Islands"]
                .into_iter()
                .map(String::from)
                .collect(),
            counterparties: vec!["GoodCorp".into(), "Service XYZ".into(), "OnlineStore".into()],
            currency: "USD".into(),
            min_amount: 5.0,
            max_amount: 20_000.0,
            max_backdate_minutes: 60,
            batch_min: 1,
            batch_max: 4,
            interval_seconds: 5,
            batches: 12,
            seed: None,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/transactions.db".into(),
            reset_on_start: true,
        }
    }
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com".into(),
            model: "gemini-2.5-flash".into(),
            api_key: None,
            timeout_seconds: 60,
            query: None,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            recent_limit: 100,
            histogram_bins: 20,
            export_csv: None,
        }
    }
}

impl ScreeningConfig {
    pub fn unusual_hours(&self) -> Result<(NaiveTime, NaiveTime), ConfigError> {
        let parse = |field: &'static str, value: &str| {
            NaiveTime::parse_from_str(value, "%H:%M:%S").map_err(|_| ConfigError::TimeOfDay {
                field,
                value: value.to_string(),
            })
        };
        Ok((
            parse("unusual_hours_start", &self.unusual_hours_start)?,
            parse("unusual_hours_end", &self.unusual_hours_end)?,
        ))
    }
}

impl Config {
    /// Load config from a TOML file. Falls back to defaults only if the file doesn't exist;
    /// an unreadable or malformed file is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        tracing::info!("Config loaded from {}", path.display());
        Ok(config)
    }

    /// Reject settings the engine or the feed cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.screening;
        if !(0.0..=1.0).contains(&s.velocity_probability) {
            return Err(ConfigError::VelocityProbability(s.velocity_probability));
        }
        if !(s.high_amount >= 0.0) {
            return Err(ConfigError::HighAmount(s.high_amount));
        }
        s.unusual_hours()?;

        let src = &self.source;
        if !(src.min_amount >= 0.0 && src.min_amount <= src.max_amount) {
            return Err(ConfigError::AmountRange {
                min: src.min_amount,
                max: src.max_amount,
            });
        }
        if src.batch_min > src.batch_max {
            return Err(ConfigError::BatchRange {
                min: src.batch_min,
                max: src.batch_max,
            });
        }
        if src.users.is_empty() || src.transaction_locations.is_empty() {
            return Err(ConfigError::EmptySource);
        }
        Ok(())
    }

    /// API key from the config file, or the `TXSENTINEL_API_KEY` environment variable.
    pub fn api_key(&self) -> Option<String> {
        self.assistant
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("TXSENTINEL_API_KEY").ok().filter(|k| !k.is_empty()))
    }
}
