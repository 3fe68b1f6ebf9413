//! Table definitions.
//!
//! Tables are created idempotently on open; there is no migration step.

use rusqlite::Connection;
use tracing::debug;

const CREATE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS weather (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    temperature REAL,
    humidity REAL,
    pressure REAL,
    description TEXT,
    wind_speed REAL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_weather_created_at ON weather (created_at);

CREATE TABLE IF NOT EXISTS exchange (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    base_currency TEXT NOT NULL,
    target_currency TEXT NOT NULL,
    rate REAL NOT NULL CHECK (rate > 0),
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_exchange_pair_created_at
    ON exchange (base_currency, target_currency, created_at);

CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    message TEXT NOT NULL,
    mode TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    topic TEXT NOT NULL,
    message TEXT,
    direction TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_logs_topic_created_at ON logs (topic, created_at);
";

/// Create all tables and indexes if they do not exist yet.
pub fn create_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(CREATE_TABLES)?;
    debug!("Schema ready (weather, exchange, messages, logs)");
    Ok(())
}

/// Whether `table` exists in the database.
pub fn has_table(conn: &Connection, table: &str) -> bool {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |_| Ok(()),
    )
    .is_ok()
}
