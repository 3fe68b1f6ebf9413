//! Persistence gateway.
//!
//! One SQLite connection behind a mutex: every insert and read is serialized,
//! and each insert is its own atomic statement. Timestamps are stored as
//! RFC 3339 UTC strings with millisecond precision so that lexical order is
//! chronological order.

use crate::error::StoreResult;
use crate::schema;
use chrono::{DateTime, SecondsFormat, Utc};
use ledlink_core::{
    CurrencyCode, Direction, DisplayMessage, DisplayMode, ExchangeRecord, TrafficLogEntry,
    WeatherRecord,
};
use parking_lot::Mutex;
use rusqlite::types::{ToSql, Type};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

/// A persisted row together with its generated identifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stored<T> {
    pub id: i64,
    #[serde(flatten)]
    pub record: T,
}

/// Pagination for history reads (newest first).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Page {
    pub fn new(limit: u32, offset: u32) -> Self {
        Self { limit, offset }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
        }
    }
}

/// Optional currency pair filter for exchange reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeFilter {
    pub base: Option<CurrencyCode>,
    pub target: Option<CurrencyCode>,
}

impl ExchangeFilter {
    pub fn pair(base: CurrencyCode, target: CurrencyCode) -> Self {
        Self {
            base: Some(base),
            target: Some(target),
        }
    }
}

/// Logical tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Weather,
    Exchange,
    Messages,
    Logs,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Weather => "weather",
            Self::Exchange => "exchange",
            Self::Messages => "messages",
            Self::Logs => "logs",
        }
    }
}

/// Mean rate for one pair over a trailing window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateAverage {
    pub count: i64,
    pub avg_rate: Option<f64>,
}

fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn decode_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn decode_with<T, E>(idx: usize, result: Result<T, E>) -> rusqlite::Result<T>
where
    E: std::error::Error + Send + Sync + 'static,
{
    result.map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn weather_row(row: &Row<'_>) -> rusqlite::Result<Stored<WeatherRecord>> {
    Ok(Stored {
        id: row.get(0)?,
        record: WeatherRecord {
            latitude: row.get(1)?,
            longitude: row.get(2)?,
            temperature: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
            humidity: row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
            pressure: row.get::<_, Option<f64>>(5)?.unwrap_or(0.0),
            description: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
            wind_speed: row.get::<_, Option<f64>>(7)?.unwrap_or(0.0),
            observed_at: decode_ts(row, 8)?,
        },
    })
}

fn exchange_row(row: &Row<'_>) -> rusqlite::Result<Stored<ExchangeRecord>> {
    let base: String = row.get(1)?;
    let target: String = row.get(2)?;
    let base = decode_with(1, base.parse::<CurrencyCode>())?;
    let target = decode_with(2, target.parse::<CurrencyCode>())?;
    let record = decode_with(3, ExchangeRecord::new(base, target, row.get(3)?, decode_ts(row, 4)?))?;
    Ok(Stored {
        id: row.get(0)?,
        record,
    })
}

fn message_row(row: &Row<'_>) -> rusqlite::Result<Stored<DisplayMessage>> {
    let mode = row
        .get::<_, Option<String>>(2)?
        .map(|m| decode_with(2, m.parse::<DisplayMode>()))
        .transpose()?;
    Ok(Stored {
        id: row.get(0)?,
        record: DisplayMessage {
            message: row.get(1)?,
            mode,
            at: decode_ts(row, 3)?,
        },
    })
}

fn log_row(row: &Row<'_>) -> rusqlite::Result<Stored<TrafficLogEntry>> {
    let direction: String = row.get(3)?;
    Ok(Stored {
        id: row.get(0)?,
        record: TrafficLogEntry {
            topic: row.get(1)?,
            payload: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            direction: decode_with(3, direction.parse::<Direction>())?,
            at: decode_ts(row, 4)?,
        },
    })
}

const WEATHER_COLUMNS: &str =
    "id, latitude, longitude, temperature, humidity, pressure, description, wind_speed, created_at";
const EXCHANGE_COLUMNS: &str = "id, base_currency, target_currency, rate, created_at";
const MESSAGE_COLUMNS: &str = "id, message, mode, created_at";
const LOG_COLUMNS: &str = "id, topic, message, direction, created_at";

/// SQLite-backed persistence gateway.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database file and ensure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let journal: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        info!(path = %path.display(), journal = %journal, "Opened SQLite database");
        Self::from_connection(conn)
    }

    /// In-memory database (tests, dry runs).
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        schema::create_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ── Inserts ──────────────────────────────────────────────────────────

    pub fn insert_weather(&self, record: &WeatherRecord) -> StoreResult<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO weather (latitude, longitude, temperature, humidity, pressure, description, wind_speed, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.latitude,
                record.longitude,
                record.temperature,
                record.humidity,
                record.pressure,
                record.description,
                record.wind_speed,
                encode_ts(record.observed_at),
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!(id, "Saved weather record");
        Ok(id)
    }

    pub fn insert_exchange(&self, record: &ExchangeRecord) -> StoreResult<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO exchange (base_currency, target_currency, rate, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.base_currency().as_str(),
                record.target_currency().as_str(),
                record.rate(),
                encode_ts(record.observed_at()),
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!(id, pair = %format!("{}/{}", record.base_currency(), record.target_currency()), "Saved exchange record");
        Ok(id)
    }

    pub fn insert_message(&self, message: &DisplayMessage) -> StoreResult<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO messages (message, mode, created_at) VALUES (?1, ?2, ?3)",
            params![
                message.message,
                message.mode.map(|m| m.as_str()),
                encode_ts(message.at),
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!(id, "Saved display message");
        Ok(id)
    }

    pub fn insert_log(&self, entry: &TrafficLogEntry) -> StoreResult<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO logs (topic, message, direction, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.topic,
                entry.payload,
                entry.direction.as_str(),
                encode_ts(entry.at),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    // ── Latest ───────────────────────────────────────────────────────────

    pub fn latest_weather(&self) -> StoreResult<Option<Stored<WeatherRecord>>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {WEATHER_COLUMNS} FROM weather ORDER BY created_at DESC, id DESC LIMIT 1"
        );
        Ok(conn.query_row(&sql, [], weather_row).optional()?)
    }

    pub fn latest_exchange(
        &self,
        filter: &ExchangeFilter,
    ) -> StoreResult<Option<Stored<ExchangeRecord>>> {
        let conn = self.conn.lock();
        let (where_sql, params_vec) = exchange_where(filter);
        let sql = format!(
            "SELECT {EXCHANGE_COLUMNS} FROM exchange{where_sql} ORDER BY created_at DESC, id DESC LIMIT 1"
        );
        Ok(conn
            .query_row(&sql, params_from_iter(params_vec.iter()), exchange_row)
            .optional()?)
    }

    pub fn latest_message(&self) -> StoreResult<Option<Stored<DisplayMessage>>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages ORDER BY created_at DESC, id DESC LIMIT 1"
        );
        Ok(conn.query_row(&sql, [], message_row).optional()?)
    }

    // ── History ──────────────────────────────────────────────────────────

    pub fn weather_history(&self, page: Page) -> StoreResult<Vec<Stored<WeatherRecord>>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {WEATHER_COLUMNS} FROM weather ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![page.limit, page.offset], weather_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn exchange_history(
        &self,
        page: Page,
        filter: &ExchangeFilter,
    ) -> StoreResult<Vec<Stored<ExchangeRecord>>> {
        let conn = self.conn.lock();
        let (where_sql, mut params_vec) = exchange_where(filter);
        params_vec.push(Box::new(page.limit));
        params_vec.push(Box::new(page.offset));
        let sql = format!(
            "SELECT {EXCHANGE_COLUMNS} FROM exchange{where_sql} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params_vec.iter()), exchange_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn message_history(&self, page: Page) -> StoreResult<Vec<Stored<DisplayMessage>>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![page.limit, page.offset], message_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Traffic log, optionally restricted to one topic.
    pub fn log_history(
        &self,
        page: Page,
        topic: Option<&str>,
    ) -> StoreResult<Vec<Stored<TrafficLogEntry>>> {
        let conn = self.conn.lock();
        let mut params_vec: Vec<Box<dyn ToSql>> = Vec::new();
        let mut where_sql = String::new();
        if let Some(topic) = topic {
            where_sql.push_str(" WHERE topic = ?");
            params_vec.push(Box::new(topic.to_string()));
        }
        params_vec.push(Box::new(page.limit));
        params_vec.push(Box::new(page.offset));

        let sql = format!(
            "SELECT {LOG_COLUMNS} FROM logs{where_sql} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params_vec.iter()), log_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ── Aggregates ───────────────────────────────────────────────────────

    pub fn count(&self, table: Table) -> StoreResult<i64> {
        let conn = self.conn.lock();
        let sql = format!("SELECT COUNT(*) FROM {}", table.name());
        Ok(conn.query_row(&sql, [], |row| row.get(0))?)
    }

    pub fn count_logs(&self, topic: &str) -> StoreResult<i64> {
        let conn = self.conn.lock();
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM logs WHERE topic = ?1",
            [topic],
            |row| row.get(0),
        )?)
    }

    /// Average rate for a pair over the trailing `minutes`.
    pub fn exchange_average(
        &self,
        minutes: u32,
        base: &CurrencyCode,
        target: &CurrencyCode,
    ) -> StoreResult<RateAverage> {
        let cutoff = Utc::now() - chrono::Duration::minutes(i64::from(minutes));
        let conn = self.conn.lock();
        let average = conn.query_row(
            "SELECT COUNT(*), AVG(rate) FROM exchange
             WHERE created_at >= ?1 AND base_currency = ?2 AND target_currency = ?3",
            params![encode_ts(cutoff), base.as_str(), target.as_str()],
            |row| {
                Ok(RateAverage {
                    count: row.get(0)?,
                    avg_rate: row.get(1)?,
                })
            },
        )?;
        Ok(average)
    }
}

fn exchange_where(filter: &ExchangeFilter) -> (String, Vec<Box<dyn ToSql>>) {
    let mut clauses: Vec<&str> = Vec::new();
    let mut params_vec: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(base) = &filter.base {
        clauses.push("base_currency = ?");
        params_vec.push(Box::new(base.as_str().to_string()));
    }
    if let Some(target) = &filter.target {
        clauses.push("target_currency = ?");
        params_vec.push(Box::new(target.as_str().to_string()));
    }

    if clauses.is_empty() {
        (String::new(), params_vec)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), params_vec)
    }
}
