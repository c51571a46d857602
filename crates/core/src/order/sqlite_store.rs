//! SQLite-backed order store and rating ledger.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;

use super::{
    Order, OrderCategory, OrderDraft, OrderError, OrderFilter, OrderState, OrderStore, Rating,
    RatingAggregate, RatingId, RatingLedger,
};

const ORDER_COLUMNS: &str = "o.id, o.title, o.description, o.category, o.payment_amount, \
     o.requirements, o.created_by, o.created_at, o.state, o.version, o.updated_at, \
     (SELECT COUNT(*) FROM ratings r WHERE r.order_id = o.id), \
     (SELECT COALESCE(SUM(r.rating), 0) FROM ratings r WHERE r.order_id = o.id)";

/// SQLite-backed store for orders and their ratings.
///
/// Orders and ratings live in the same database so a rating append and the
/// order write it causes commit in one transaction.
pub struct SqliteOrderStore {
    conn: Mutex<Connection>,
}

impl SqliteOrderStore {
    /// Create a new store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, OrderError> {
        let conn = Connection::open(path).map_err(OrderError::database)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, OrderError> {
        let conn = Connection::open_in_memory().map_err(OrderError::database)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), OrderError> {
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(OrderError::database)?;

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                category TEXT NOT NULL,
                payment_amount TEXT NOT NULL,
                requirements TEXT NOT NULL,
                created_by TEXT NOT NULL,
                created_at TEXT NOT NULL,
                state TEXT NOT NULL,
                version INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_orders_created_at ON orders(created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_orders_created_by ON orders(created_by);
            CREATE INDEX IF NOT EXISTS idx_orders_category ON orders(category);

            CREATE TABLE IF NOT EXISTS ratings (
                id TEXT PRIMARY KEY,
                order_id TEXT NOT NULL REFERENCES orders(id),
                rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
                comment TEXT,
                rated_by TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (order_id, rated_by)
            );

            CREATE INDEX IF NOT EXISTS idx_ratings_order_id ON ratings(order_id);
            "#,
        )
        .map_err(OrderError::database)?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, OrderError> {
        self.conn
            .lock()
            .map_err(|_| OrderError::Database("connection mutex poisoned".to_string()))
    }

    fn build_where_clause(filter: &OrderFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push("json_extract(o.state, '$.status') = ?");
            params.push(Box::new(status.as_str()));
        }

        if let Some(category) = filter.category {
            conditions.push("o.category = ?");
            params.push(Box::new(category.as_str()));
        }

        if let Some(ref created_by) = filter.created_by {
            conditions.push("o.created_by = ?");
            params.push(Box::new(created_by.clone()));
        }

        if let Some(ref claimed_by) = filter.claimed_by {
            conditions.push("json_extract(o.state, '$.assignment.claimed_by') = ?");
            params.push(Box::new(claimed_by.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_order(row: &rusqlite::Row) -> rusqlite::Result<Order> {
        let category: String = row.get(3)?;
        let payment_amount: String = row.get(4)?;
        let requirements: String = row.get(5)?;
        let created_at: String = row.get(7)?;
        let state: String = row.get(8)?;
        let version: i64 = row.get(9)?;
        let updated_at: String = row.get(10)?;
        let rating_count: u32 = row.get(11)?;
        let rating_total: u32 = row.get(12)?;

        Ok(Order {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            category: OrderCategory::from_str(&category)
                .map_err(|e| conversion_error(3, e.into()))?,
            payment_amount: Decimal::from_str(&payment_amount)
                .map_err(|e| conversion_error(4, Box::new(e)))?,
            requirements: parse_json(5, &requirements)?,
            created_by: row.get(6)?,
            created_at: parse_timestamp(7, &created_at)?,
            state: parse_json::<OrderState>(8, &state)?,
            ratings: RatingAggregate::new(rating_count, rating_total),
            version: version as u64,
            updated_at: parse_timestamp(10, &updated_at)?,
        })
    }

    fn row_to_rating(row: &rusqlite::Row) -> rusqlite::Result<Rating> {
        let created_at: String = row.get(5)?;
        Ok(Rating {
            id: row.get(0)?,
            order_id: row.get(1)?,
            rating: row.get(2)?,
            comment: row.get(3)?,
            rated_by: row.get(4)?,
            created_at: parse_timestamp(5, &created_at)?,
        })
    }

    fn fetch(conn: &Connection, id: &str) -> Result<Option<Order>, OrderError> {
        let sql = format!("SELECT {} FROM orders o WHERE o.id = ?", ORDER_COLUMNS);
        match conn.query_row(&sql, params![id], Self::row_to_order) {
            Ok(order) => Ok(Some(order)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(OrderError::database(e)),
        }
    }

    /// Version-guarded state write. Returns the number of rows touched.
    fn write_state(
        conn: &Connection,
        order: &Order,
        expected_version: u64,
    ) -> Result<usize, OrderError> {
        let state_json = serde_json::to_string(&order.state).map_err(OrderError::database)?;
        conn.execute(
            "UPDATE orders SET state = ?, version = ?, updated_at = ? WHERE id = ? AND version = ?",
            params![
                state_json,
                (expected_version + 1) as i64,
                timestamp(Utc::now()),
                order.id,
                expected_version as i64,
            ],
        )
        .map_err(OrderError::database)
    }

    /// Explain why a version-guarded write touched no rows.
    fn missing_or_conflict(conn: &Connection, id: &str) -> OrderError {
        let exists = conn
            .query_row("SELECT 1 FROM orders WHERE id = ?", params![id], |_| Ok(()))
            .is_ok();
        if exists {
            OrderError::Conflict(id.to_string())
        } else {
            OrderError::NotFound(id.to_string())
        }
    }
}

impl OrderStore for SqliteOrderStore {
    fn create(&self, draft: OrderDraft) -> Result<Order, OrderError> {
        let conn = self.conn()?;

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let state = OrderState::Open;

        let state_json = serde_json::to_string(&state).map_err(OrderError::database)?;
        let requirements_json =
            serde_json::to_string(&draft.requirements).map_err(OrderError::database)?;

        conn.execute(
            "INSERT INTO orders (id, title, description, category, payment_amount, requirements, created_by, created_at, state, version, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?)",
            params![
                id,
                draft.title,
                draft.description,
                draft.category.as_str(),
                draft.payment_amount.to_string(),
                requirements_json,
                draft.created_by,
                timestamp(now),
                state_json,
                timestamp(now),
            ],
        )
        .map_err(OrderError::database)?;

        Ok(Order {
            id,
            title: draft.title,
            description: draft.description,
            category: draft.category,
            payment_amount: draft.payment_amount,
            requirements: draft.requirements,
            created_by: draft.created_by,
            created_at: now,
            state,
            ratings: RatingAggregate::default(),
            version: 1,
            updated_at: now,
        })
    }

    fn get(&self, id: &str) -> Result<Option<Order>, OrderError> {
        let conn = self.conn()?;
        Self::fetch(&conn, id)
    }

    fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, OrderError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!(
            "SELECT {} FROM orders o {} ORDER BY o.created_at DESC, o.rowid DESC LIMIT ? OFFSET ?",
            ORDER_COLUMNS, where_clause
        );

        let mut stmt = conn.prepare(&sql).map_err(OrderError::database)?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));

        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_order)
            .map_err(OrderError::database)?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(OrderError::database)
    }

    fn count(&self, filter: &OrderFilter) -> Result<i64, OrderError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM orders o {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(OrderError::database)
    }

    fn put(&self, order: &Order, expected_version: u64) -> Result<Order, OrderError> {
        let conn = self.conn()?;

        // Creation-time fields are immutable, only the lifecycle state is rewritten.
        if Self::write_state(&conn, order, expected_version)? == 0 {
            return Err(Self::missing_or_conflict(&conn, &order.id));
        }

        Self::fetch(&conn, &order.id)?.ok_or_else(|| OrderError::NotFound(order.id.clone()))
    }
}

impl RatingLedger for SqliteOrderStore {
    fn append(
        &self,
        rating: &Rating,
        order: &Order,
        expected_version: u64,
    ) -> Result<RatingId, OrderError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(OrderError::database)?;

        if Self::write_state(&tx, order, expected_version)? == 0 {
            return Err(Self::missing_or_conflict(&tx, &order.id));
        }

        let inserted = tx.execute(
            "INSERT INTO ratings (id, order_id, rating, comment, rated_by, created_at) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                rating.id,
                rating.order_id,
                rating.rating,
                rating.comment,
                rating.rated_by,
                timestamp(rating.created_at),
            ],
        );

        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation
                    && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                return Err(OrderError::Validation(format!(
                    "{} has already rated order {}",
                    rating.rated_by, rating.order_id
                )));
            }
            Err(e) => return Err(OrderError::database(e)),
        }

        tx.commit().map_err(OrderError::database)?;
        Ok(rating.id.clone())
    }

    fn list_for(&self, order_id: &str) -> Result<Vec<Rating>, OrderError> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(
                "SELECT id, order_id, rating, comment, rated_by, created_at FROM ratings WHERE order_id = ? ORDER BY created_at DESC, rowid DESC",
            )
            .map_err(OrderError::database)?;

        let rows = stmt
            .query_map(params![order_id], Self::row_to_rating)
            .map_err(OrderError::database)?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(OrderError::database)
    }

    fn aggregate_for(&self, order_id: &str) -> Result<RatingAggregate, OrderError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(rating), 0) FROM ratings WHERE order_id = ?",
            params![order_id],
            |row| Ok(RatingAggregate::new(row.get(0)?, row.get(1)?)),
        )
        .map_err(OrderError::database)
    }

    fn has_rated(&self, order_id: &str, rated_by: &str) -> Result<bool, OrderError> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM ratings WHERE order_id = ? AND rated_by = ?",
                params![order_id, rated_by],
                |row| row.get(0),
            )
            .map_err(OrderError::database)?;
        Ok(count > 0)
    }
}

/// Fixed-width RFC 3339 so lexical order matches time order.
fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, Box::new(e)))
}

fn parse_json<T: DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw).map_err(|e| conversion_error(idx, Box::new(e)))
}

fn conversion_error(
    idx: usize,
    err: Box<dyn std::error::Error + Send + Sync + 'static>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err)
}
