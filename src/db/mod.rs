pub mod schema;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::core::{ScoredTx, Transaction, split_reason};

/// A persisted transaction row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: i64,
    #[serde(flatten)]
    pub scored: ScoredTx,
}

pub struct Database {
    conn: Connection,
}

/// Thread-safe wrapper around Database.
#[derive(Clone)]
pub struct SharedDatabase {
    inner: Arc<Mutex<Database>>,
}

impl SharedDatabase {
    pub fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        Ok(Self::wrap(Database::open(path)?))
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        Ok(Self::wrap(Database::open_in_memory()?))
    }

    fn wrap(db: Database) -> Self {
        Self {
            inner: Arc::new(Mutex::new(db)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Database> {
        // Writes are single statements, so a poisoned lock holds no partial row.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Persist one fully scored transaction. Returns the row id.
    pub fn store(&self, scored: &ScoredTx) -> Result<i64, rusqlite::Error> {
        self.lock().store(scored)
    }

    /// Most recent flagged transactions, newest first.
    pub fn recent_flagged(&self, limit: usize) -> Result<Vec<TransactionRecord>, rusqlite::Error> {
        self.lock().recent_flagged(limit)
    }

    /// Every flagged transaction, newest first.
    pub fn all_flagged(&self) -> Result<Vec<TransactionRecord>, rusqlite::Error> {
        self.lock().all_flagged()
    }

    pub fn flagged_count(&self) -> Result<usize, rusqlite::Error> {
        self.lock().flagged_count()
    }

    /// Count of transactions scoring at least `min_score`.
    pub fn count_at_least(&self, min_score: u32) -> Result<usize, rusqlite::Error> {
        self.lock().count_at_least(min_score)
    }

    #[cfg(test)]
    pub fn total_count(&self) -> Result<usize, rusqlite::Error> {
        self.lock().total_count()
    }

    /// Wipe all stored transactions.
    pub fn reset(&self) -> Result<(), rusqlite::Error> {
        self.lock().reset()
    }
}

const SELECT_COLUMNS: &str = "SELECT id, timestamp, user_id, amount, currency, description, user_location, \
     transaction_location, flag_reason, anomaly_score FROM transactions";

impl Database {
    pub fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        schema::migrate(&conn)?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        schema::migrate(&conn)?;
        Ok(Self { conn })
    }

    pub fn store(&self, scored: &ScoredTx) -> Result<i64, rusqlite::Error> {
        let tx = &scored.tx;
        self.conn.execute(
            "INSERT INTO transactions (timestamp, user_id, amount, currency, description, user_location,
                transaction_location, is_flagged, flag_reason, anomaly_score)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![
                tx.timestamp,
                tx.user_id,
                tx.amount,
                tx.currency,
                tx.description,
                tx.user_location,
                tx.transaction_location,
                scored.is_flagged() as i32,
                scored.flag_reason(),
                scored.anomaly_score,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<TransactionRecord> {
        let reason: Option<String> = row.get(8)?;
        Ok(TransactionRecord {
            id: row.get(0)?,
            scored: ScoredTx {
                tx: Transaction {
                    timestamp: row.get(1)?,
                    user_id: row.get(2)?,
                    amount: row.get(3)?,
                    currency: row.get(4)?,
                    description: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                    user_location: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
                    transaction_location: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
                },
                flags: split_reason(reason.as_deref()),
                anomaly_score: row.get(9)?,
            },
        })
    }

    pub fn recent_flagged(&self, limit: usize) -> Result<Vec<TransactionRecord>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_COLUMNS} WHERE is_flagged = 1 ORDER BY timestamp DESC, id DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(rusqlite::params![limit as i64], Self::row_to_record)?;
        rows.collect()
    }

    pub fn all_flagged(&self) -> Result<Vec<TransactionRecord>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_COLUMNS} WHERE is_flagged = 1 ORDER BY timestamp DESC, id DESC"
        ))?;
        let rows = stmt.query_map([], Self::row_to_record)?;
        rows.collect()
    }

    pub fn flagged_count(&self) -> Result<usize, rusqlite::Error> {
        self.conn
            .query_row("SELECT COUNT(*) FROM transactions WHERE is_flagged = 1", [], |row| {
                row.get::<_, i64>(0).map(|c| c as usize)
            })
    }

    pub fn count_at_least(&self, min_score: u32) -> Result<usize, rusqlite::Error> {
        self.conn.query_row(
            "SELECT COUNT(*) FROM transactions WHERE anomaly_score >= ?1",
            rusqlite::params![min_score],
            |row| row.get::<_, i64>(0).map(|c| c as usize),
        )
    }

    #[cfg(test)]
    pub fn total_count(&self) -> Result<usize, rusqlite::Error> {
        self.conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| {
            row.get::<_, i64>(0).map(|c| c as usize)
        })
    }

    pub fn reset(&self) -> Result<(), rusqlite::Error> {
        schema::reset(&self.conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::make_test_tx;

    fn scored(timestamp: &str, flags: &[&str], score: u32) -> ScoredTx {
        let mut tx = make_test_tx();
        tx.timestamp = timestamp.to_string();
        ScoredTx {
            tx,
            flags: flags.iter().map(|f| f.to_string()).collect(),
            anomaly_score: score,
        }
    }

    #[test]
    fn store_and_read_back() {
        let db = SharedDatabase::open_in_memory().unwrap();
        let original = scored("2024-03-01 03:00:00", &["Unusual Hours", "Geolocation Mismatch"], 65);
        let id = db.store(&original).unwrap();
        let records = db.all_flagged().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, id);
        assert_eq!(records[0].scored, original);
    }

    #[test]
    fn unflagged_rows_are_not_alerts() {
        let db = SharedDatabase::open_in_memory().unwrap();
        db.store(&scored("2024-03-01 10:00:00", &[], 0)).unwrap();
        db.store(&scored("2024-03-01 11:00:00", &["High Amount"], 30)).unwrap();
        assert_eq!(db.total_count().unwrap(), 2);
        assert_eq!(db.flagged_count().unwrap(), 1);
        assert_eq!(db.all_flagged().unwrap().len(), 1);
    }

    #[test]
    fn recent_flagged_newest_first_with_limit() {
        let db = SharedDatabase::open_in_memory().unwrap();
        db.store(&scored("2024-03-01 10:00:00", &["High Amount"], 30)).unwrap();
        db.store(&scored("2024-03-01 12:00:00", &["High Amount"], 30)).unwrap();
        db.store(&scored("2024-03-01 11:00:00", &["High Amount"], 30)).unwrap();
        let recent = db.recent_flagged(2).unwrap();
        let stamps: Vec<&str> = recent.iter().map(|r| r.scored.tx.timestamp.as_str()).collect();
        assert_eq!(stamps, vec!["2024-03-01 12:00:00", "2024-03-01 11:00:00"]);
    }

    #[test]
    fn high_risk_count_inclusive() {
        let db = SharedDatabase::open_in_memory().unwrap();
        db.store(&scored("2024-03-01 10:00:00", &["Sanctioned Entity"], 100)).unwrap();
        db.store(&scored("2024-03-01 10:00:01", &["Risky Geolocation", "High Amount"], 90)).unwrap();
        db.store(&scored("2024-03-01 10:00:02", &["Risky Geolocation"], 60)).unwrap();
        assert_eq!(db.count_at_least(90).unwrap(), 2);
    }

    #[test]
    fn reset_empties_store() {
        let db = SharedDatabase::open_in_memory().unwrap();
        db.store(&scored("2024-03-01 10:00:00", &["High Amount"], 30)).unwrap();
        db.reset().unwrap();
        assert_eq!(db.total_count().unwrap(), 0);
        db.store(&scored("2024-03-01 10:00:00", &["High Amount"], 30)).unwrap();
        assert_eq!(db.flagged_count().unwrap(), 1);
    }

    #[test]
    fn file_backed_database() {
        let path = std::env::temp_dir().join(format!("txsentinel_test_{}.db", std::process::id()));
        let _ = std::fs::remove_file(&path);
        {
            let db = SharedDatabase::open(&path).unwrap();
            db.store(&scored("2024-03-01 10:00:00", &["High Amount"], 30)).unwrap();
        }
        let db = SharedDatabase::open(&path).unwrap();
        assert_eq!(db.flagged_count().unwrap(), 1);
        drop(db);
        let _ = std::fs::remove_file(&path);
    }
}
