use rusqlite::Connection;

pub fn migrate(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS transactions (
            id                   INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp            TEXT NOT NULL,
            user_id              TEXT NOT NULL,
            amount               REAL NOT NULL,
            currency             TEXT NOT NULL,
            description          TEXT,
            user_location        TEXT,
            transaction_location TEXT,
            is_flagged           INTEGER NOT NULL DEFAULT 0,
            flag_reason          TEXT,
            anomaly_score        INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_transactions_flagged ON transactions(is_flagged, timestamp DESC);
        CREATE INDEX IF NOT EXISTS idx_transactions_score ON transactions(anomaly_score DESC);
        ",
    )?;
    Ok(())
}

/// Drop everything and recreate an empty schema.
pub fn reset(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch("DROP TABLE IF EXISTS transactions;")?;
    migrate(conn)
}
