//! SQLite-backed audit log.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection};

use super::{AuditError, AuditFilter, AuditRecord, AuditStore};

const RECORD_COLUMNS: &str = "id, timestamp, event_type, order_id, user_id, data";

/// Append-only audit log in the `audit_events` table.
///
/// Safe to open on the same file as the order store.
pub struct SqliteAuditStore {
    conn: Mutex<Connection>,
}

impl SqliteAuditStore {
    pub fn new(path: &Path) -> Result<Self, AuditError> {
        Self::with_connection(Connection::open(path).map_err(AuditError::database)?)
    }

    pub fn in_memory() -> Result<Self, AuditError> {
        Self::with_connection(Connection::open_in_memory().map_err(AuditError::database)?)
    }

    fn with_connection(conn: Connection) -> Result<Self, AuditError> {
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(AuditError::database)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS audit_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_type TEXT NOT NULL,
                order_id TEXT,
                user_id TEXT,
                data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_audit_events_order_id ON audit_events(order_id, timestamp);
            CREATE INDEX IF NOT EXISTS idx_audit_events_event_type ON audit_events(event_type, timestamp);
            "#,
        )
        .map_err(AuditError::database)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, AuditError> {
        self.conn
            .lock()
            .map_err(|_| AuditError::database("connection mutex poisoned"))
    }
}

/// `WHERE` clause and its bound values for a filter.
fn filter_sql(filter: &AuditFilter) -> (String, Vec<Value>) {
    let text = |s: &String| Value::Text(s.clone());
    let candidates = [
        ("order_id = ?", filter.order_id.as_ref().map(text)),
        ("event_type = ?", filter.event_type.as_ref().map(text)),
        ("user_id = ?", filter.user_id.as_ref().map(text)),
        ("timestamp >= ?", filter.from.map(|t| Value::Text(timestamp(t)))),
        ("timestamp <= ?", filter.to.map(|t| Value::Text(timestamp(t)))),
    ];

    let (clauses, values): (Vec<&str>, Vec<Value>) = candidates
        .into_iter()
        .filter_map(|(clause, value)| value.map(|v| (clause, v)))
        .unzip();

    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!("WHERE {}", clauses.join(" AND ")), values)
    }
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<AuditRecord> {
    let raw_timestamp: String = row.get(1)?;
    let raw_data: String = row.get(5)?;
    Ok(AuditRecord {
        id: row.get(0)?,
        timestamp: DateTime::parse_from_rfc3339(&raw_timestamp)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_error(1, Box::new(e)))?,
        event_type: row.get(2)?,
        order_id: row.get(3)?,
        user_id: row.get(4)?,
        data: serde_json::from_str(&raw_data).map_err(|e| conversion_error(5, Box::new(e)))?,
    })
}

impl AuditStore for SqliteAuditStore {
    fn insert(&self, record: &AuditRecord) -> Result<i64, AuditError> {
        let data = serde_json::to_string(&record.data)
            .map_err(|e| AuditError::Serialization(e.to_string()))?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO audit_events (timestamp, event_type, order_id, user_id, data) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                timestamp(record.timestamp),
                record.event_type,
                record.order_id,
                record.user_id,
                data,
            ],
        )
        .map_err(AuditError::database)?;

        Ok(conn.last_insert_rowid())
    }

    fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, AuditError> {
        let (where_sql, mut values) = filter_sql(filter);
        values.push(Value::Integer(filter.limit));
        values.push(Value::Integer(filter.offset));

        let sql = format!(
            "SELECT {} FROM audit_events {} ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?",
            RECORD_COLUMNS, where_sql
        );

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql).map_err(AuditError::database)?;
        let records = stmt
            .query_map(params_from_iter(values), row_to_record)
            .map_err(AuditError::database)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(AuditError::database)?;
        Ok(records)
    }

    fn count(&self, filter: &AuditFilter) -> Result<i64, AuditError> {
        let (where_sql, values) = filter_sql(filter);
        let sql = format!("SELECT COUNT(*) FROM audit_events {}", where_sql);

        let conn = self.conn()?;
        conn.query_row(&sql, params_from_iter(values), |row| row.get(0))
            .map_err(AuditError::database)
    }
}

/// Fixed-width RFC 3339 so lexical order matches time order.
fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(
    idx: usize,
    err: Box<dyn std::error::Error + Send + Sync + 'static>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err)
}
