//! SQLite-backed contract metadata store.
//!
//! The connection is opened read-only where possible and always runs
//! with `PRAGMA query_only`. Each query executes inside a deferred
//! transaction that is rolled back, and statements SQLite does not
//! classify as read-only are refused before they step. A query whose
//! caller stops waiting (timeout or cancellation) is interrupted so the
//! connection is released for the next call.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, InterruptHandle, OpenFlags, TransactionBehavior};
use serde_json::Value;
use tracing::debug;

use super::{RelationalStore, Row};
use crate::error::StoreError;

/// How long a query waits on a locked database file.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Read-only relational store over a SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    interrupt: Arc<InterruptHandle>,
}

impl SqliteStore {
    /// Opens an existing database file read-only.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| StoreError::Connection(format!("{}: {e}", path.display())))?;
        Self::from_connection(conn)
    }

    /// Wraps an existing connection, switching it to query-only mode.
    pub fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA query_only = ON;")?;
        let interrupt = Arc::new(conn.get_interrupt_handle());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            interrupt,
        })
    }

    fn with_connection<T, F>(conn: &Mutex<Connection>, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError>,
    {
        let mut guard = conn
            .lock()
            .map_err(|_| StoreError::Connection("connection lock poisoned".to_string()))?;
        f(&mut guard)
    }
}

/// Where a query is relative to the connection it runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueryState {
    Waiting,
    Running,
    Finished,
    Abandoned,
}

/// Interrupts the query if its future is dropped while it still runs.
///
/// The state lock is held across `interrupt()`, and the worker only
/// leaves `Running` while it still owns the connection, so the interrupt
/// can never land on a later caller's statement.
struct InterruptOnDrop {
    state: Arc<Mutex<QueryState>>,
    interrupt: Arc<InterruptHandle>,
}

impl Drop for InterruptOnDrop {
    fn drop(&mut self) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        match *state {
            QueryState::Waiting => *state = QueryState::Abandoned,
            QueryState::Running => {
                self.interrupt.interrupt();
                debug!("interrupted abandoned query");
            }
            QueryState::Finished | QueryState::Abandoned => {}
        }
    }
}

fn advance(state: &Mutex<QueryState>, from: QueryState, to: QueryState) -> bool {
    state.lock().is_ok_and(|mut current| {
        let matches = *current == from;
        if matches {
            *current = to;
        }
        matches
    })
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl RelationalStore for SqliteStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn execute_read_only_query(
        &self,
        sql: &str,
        row_cap: usize,
    ) -> Result<Vec<Row>, StoreError> {
        let conn = Arc::clone(&self.conn);
        let sql = sql.to_string();
        let state = Arc::new(Mutex::new(QueryState::Waiting));
        let _guard = InterruptOnDrop {
            state: Arc::clone(&state),
            interrupt: Arc::clone(&self.interrupt),
        };
        tokio::task::spawn_blocking(move || {
            Self::with_connection(&conn, |c| {
                if !advance(&state, QueryState::Waiting, QueryState::Running) {
                    return Err(StoreError::Query(
                        "query abandoned before it started".to_string(),
                    ));
                }
                let result = run_read_only(c, &sql, row_cap);
                advance(&state, QueryState::Running, QueryState::Finished);
                result
            })
        })
        .await
        .map_err(|e| StoreError::Query(format!("query task failed: {e}")))?
    }

    async fn describe_schema(&self) -> Result<String, StoreError> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || Self::with_connection(&conn, |c| read_schema(c)))
            .await
            .map_err(|e| StoreError::Query(format!("schema task failed: {e}")))?
    }
}

fn run_read_only(conn: &mut Connection, sql: &str, row_cap: usize) -> Result<Vec<Row>, StoreError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
    let rows = {
        let mut stmt = tx.prepare(sql)?;
        if !stmt.readonly() {
            return Err(StoreError::NotReadOnly);
        }
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let mut cursor = stmt.query([])?;
        let mut out = Vec::new();
        while out.len() < row_cap {
            let Some(row) = cursor.next()? else {
                break;
            };
            let mut record = Row::new();
            for (i, name) in columns.iter().enumerate() {
                record.insert(name.clone(), to_json(row.get_ref(i)?));
            }
            out.push(record);
        }
        out
    };
    tx.rollback()?;
    Ok(rows)
}

fn read_schema(conn: &mut Connection) -> Result<String, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT name, sql FROM sqlite_master \
         WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' AND sql IS NOT NULL \
         ORDER BY name",
    )?;
    let entries = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut schema = String::new();
    for entry in entries {
        let (name, ddl) = entry?;
        schema.push_str("-- ");
        schema.push_str(&name);
        schema.push('\n');
        schema.push_str(ddl.trim());
        schema.push_str(";\n\n");
    }
    Ok(schema)
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(format!("<blob: {} bytes>", b.len())),
    }
}
