//! Query execution engine.
//!
//! Runs a validated [`QuerySpec`] on a leased connection:
//! - Row limits are enforced while streaming (only `limit + 1` rows are pulled)
//! - Every statement runs under the configured timeout, and the database is
//!   made to stop working on it once the timeout passes
//! - The connection is released on every exit path
//!
//! # Architecture
//!
//! The executor uses database-specific implementations organized in submodules
//! (`mysql`, `postgres`, `sqlite`). Each one streams rows from its concrete
//! connection type and hands them to the shared shaping code.

use crate::db::pool::{ConnectionHandle, ConnectionManager, PooledConnection};
use crate::db::types::RowToScalars;
use crate::error::{GatewayError, GatewayResult};
use crate::models::{QuerySpec, RowSet};
use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use sqlx::{Column, Executor, Statement};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Something that turns a validated query into rows.
///
/// The gateway depends on this seam rather than on [`QueryExecutor`] directly.
pub trait QueryRunner: Send + Sync {
    fn run<'a>(&'a self, spec: &'a QuerySpec) -> BoxFuture<'a, GatewayResult<RowSet>>;
}

/// Executes validated queries against the managed database.
pub struct QueryExecutor {
    manager: Arc<ConnectionManager>,
    query_timeout: Duration,
}

impl QueryExecutor {
    pub fn new(manager: Arc<ConnectionManager>, query_timeout: Duration) -> Self {
        Self {
            manager,
            query_timeout,
        }
    }

    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    /// Execute `spec` and return at most `spec.limit` rows.
    pub async fn execute(&self, spec: &QuerySpec) -> GatewayResult<RowSet> {
        let start = Instant::now();
        debug!(
            limit = spec.limit(),
            limit_imposed = spec.limit_imposed(),
            timeout_secs = self.query_timeout.as_secs(),
            "Executing query"
        );

        let mut handle = self.manager.acquire().await?;
        let result = self.run_on(&mut handle, spec).await;

        if let Err(e) = &result {
            handle.note_failure(e);
        }
        self.manager.release(handle).await;

        match &result {
            Ok(rows) => {
                if rows.truncated {
                    warn!(limit = spec.limit(), "Query result truncated");
                }
                debug!(
                    rows = rows.row_count(),
                    truncated = rows.truncated,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Query completed"
                );
            }
            Err(e) => debug!(
                error_kind = %e.kind(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Query failed"
            ),
        }
        result
    }

    async fn run_on(
        &self,
        handle: &mut ConnectionHandle,
        spec: &QuerySpec,
    ) -> GatewayResult<RowSet> {
        match handle.connection()? {
            PooledConnection::MySql(c) => mysql::fetch(&mut **c, spec, self.query_timeout).await,
            PooledConnection::Postgres(c) => {
                postgres::fetch(&mut **c, spec, self.query_timeout).await
            }
            PooledConnection::SQLite(c) => sqlite::fetch(&mut **c, spec, self.query_timeout).await,
        }
    }
}

impl QueryRunner for QueryExecutor {
    fn run<'a>(&'a self, spec: &'a QuerySpec) -> BoxFuture<'a, GatewayResult<RowSet>> {
        Box::pin(self.execute(spec))
    }
}

// =============================================================================
// Common Helper Functions
// =============================================================================

fn collect_rows<R>(results: Vec<Result<R, sqlx::Error>>) -> GatewayResult<Vec<R>> {
    let mut rows = Vec::with_capacity(results.len());
    for result in results {
        rows.push(result.map_err(GatewayError::from)?);
    }
    Ok(rows)
}

fn shape_rows<R: RowToScalars>(rows: &[R], limit: u32) -> RowSet {
    let columns = rows
        .first()
        .map(RowToScalars::column_names)
        .unwrap_or_default();
    let values = rows
        .iter()
        .take(limit as usize + 1)
        .map(RowToScalars::to_scalars)
        .collect();
    RowSet::bounded(columns, values, limit)
}

fn column_names<C: Column>(columns: &[C]) -> Vec<String> {
    columns.iter().map(|c| c.name().to_string()).collect()
}

fn timeout_error(operation: &str, limit: Duration) -> GatewayError {
    GatewayError::timeout(operation, limit.as_secs())
}

/// A failure raised after the deadline is the server (or the SQLite progress
/// handler) cancelling the statement.
fn past_deadline(err: GatewayError, deadline: Instant, limit: Duration) -> GatewayError {
    if Instant::now() >= deadline {
        timeout_error("query execution", limit)
    } else {
        err
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Each module below streams rows from its own connection type. The bodies are
// deliberately parallel so that differences between engines stand out.

mod mysql {
    use super::*;
    use sqlx::MySqlConnection;

    pub async fn fetch(
        conn: &mut MySqlConnection,
        spec: &QuerySpec,
        query_timeout: Duration,
    ) -> GatewayResult<RowSet> {
        let deadline = Instant::now() + query_timeout;
        let rows_future = sqlx::query(spec.text())
            .fetch(&mut *conn)
            .take(spec.fetch_limit())
            .collect::<Vec<_>>();

        let rows = match timeout(query_timeout, rows_future).await {
            Ok(results) => {
                collect_rows(results).map_err(|e| past_deadline(e, deadline, query_timeout))?
            }
            Err(_) => return Err(timeout_error("query execution", query_timeout)),
        };
        if !rows.is_empty() {
            return Ok(shape_rows(&rows, spec.limit()));
        }

        match timeout(query_timeout, conn.prepare(spec.text())).await {
            Ok(Ok(statement)) => Ok(RowSet::empty(column_names(statement.columns()))),
            Ok(Err(e)) => Err(past_deadline(e.into(), deadline, query_timeout)),
            Err(_) => Err(timeout_error("statement description", query_timeout)),
        }
    }
}

mod postgres {
    use super::*;
    use sqlx::PgConnection;

    pub async fn fetch(
        conn: &mut PgConnection,
        spec: &QuerySpec,
        query_timeout: Duration,
    ) -> GatewayResult<RowSet> {
        let deadline = Instant::now() + query_timeout;
        let rows_future = sqlx::query(spec.text())
            .fetch(&mut *conn)
            .take(spec.fetch_limit())
            .collect::<Vec<_>>();

        let rows = match timeout(query_timeout, rows_future).await {
            Ok(results) => {
                collect_rows(results).map_err(|e| past_deadline(e, deadline, query_timeout))?
            }
            Err(_) => return Err(timeout_error("query execution", query_timeout)),
        };
        if !rows.is_empty() {
            return Ok(shape_rows(&rows, spec.limit()));
        }

        match timeout(query_timeout, conn.prepare(spec.text())).await {
            Ok(Ok(statement)) => Ok(RowSet::empty(column_names(statement.columns()))),
            Ok(Err(e)) => Err(past_deadline(e.into(), deadline, query_timeout)),
            Err(_) => Err(timeout_error("statement description", query_timeout)),
        }
    }
}

mod sqlite {
    use super::*;
    use sqlx::SqliteConnection;

    /// VM instructions between deadline checks.
    const PROGRESS_INTERVAL: i32 = 1_000;

    /// The worker thread keeps stepping a statement after its future is
    /// dropped, so a progress handler interrupts it at the deadline.
    pub async fn fetch(
        conn: &mut SqliteConnection,
        spec: &QuerySpec,
        query_timeout: Duration,
    ) -> GatewayResult<RowSet> {
        let deadline = Instant::now() + query_timeout;
        conn.lock_handle()
            .await?
            .set_progress_handler(PROGRESS_INTERVAL, move || Instant::now() < deadline);

        let result = fetch_rows(conn, spec, query_timeout)
            .await
            .map_err(|e| past_deadline(e, deadline, query_timeout));

        // A timed-out session is discarded with the handler still armed.
        if !matches!(result, Err(GatewayError::Timeout { .. })) {
            conn.lock_handle().await?.remove_progress_handler();
        }
        result
    }

    async fn fetch_rows(
        conn: &mut SqliteConnection,
        spec: &QuerySpec,
        query_timeout: Duration,
    ) -> GatewayResult<RowSet> {
        let deadline = Instant::now() + query_timeout;
        let rows_future = sqlx::query(spec.text())
            .fetch(&mut *conn)
            .take(spec.fetch_limit())
            .collect::<Vec<_>>();

        let rows = match timeout(query_timeout, rows_future).await {
            Ok(results) => {
                collect_rows(results).map_err(|e| past_deadline(e, deadline, query_timeout))?
            }
            Err(_) => return Err(timeout_error("query execution", query_timeout)),
        };
        if !rows.is_empty() {
            return Ok(shape_rows(&rows, spec.limit()));
        }

        match timeout(query_timeout, conn.prepare(spec.text())).await {
            Ok(Ok(statement)) => Ok(RowSet::empty(column_names(statement.columns()))),
            Ok(Err(e)) => Err(past_deadline(e.into(), deadline, query_timeout)),
            Err(_) => Err(timeout_error("statement description", query_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatabaseConfig, RetryPolicy};
    use crate::error::ErrorKind;
    use crate::models::ScalarValue;
    use sqlx::{Connection, SqliteConnection};

    /// Counts to ten billion; never finishes within a test timeout.
    const RUNAWAY: &str = "SELECT COUNT(*) FROM (WITH RECURSIVE n(i) AS \
        (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < 10000000000) SELECT i FROM n)";

    fn spec(text: &str, limit: u32) -> QuerySpec {
        QuerySpec::unchecked(text, limit)
    }

    fn executor() -> (tempfile::TempPath, QueryExecutor) {
        let path = tempfile::NamedTempFile::new().unwrap().into_temp_path();
        let config = DatabaseConfig::parse(&format!("sqlite:{}", path.display())).unwrap();
        let manager = ConnectionManager::new(
            config,
            Duration::from_secs(2),
            RetryPolicy::new(1, Duration::from_millis(1)),
        );
        (
            path,
            QueryExecutor::new(Arc::new(manager), Duration::from_secs(5)),
        )
    }

    #[tokio::test]
    async fn test_execute_scalar_select() {
        let (_path, executor) = executor();
        let rows = executor
            .execute(&spec("SELECT 1 AS ONE, 'x' AS NAME, NULL AS MISSING", 10))
            .await
            .unwrap();
        assert_eq!(rows.columns, vec!["ONE", "NAME", "MISSING"]);
        assert_eq!(
            rows.rows,
            vec![vec![
                ScalarValue::Integer(1),
                ScalarValue::Text("x".into()),
                ScalarValue::Null
            ]]
        );
        assert!(!rows.truncated);
    }

    #[tokio::test]
    async fn test_execute_truncates_with_probe_row() {
        let (_path, executor) = executor();
        let sql = "WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < 20) \
                   SELECT i FROM n";
        let rows = executor.execute(&spec(sql, 5)).await.unwrap();
        assert_eq!(rows.row_count(), 5);
        assert!(rows.truncated);
        assert_eq!(rows.rows[4][0], ScalarValue::Integer(5));
    }

    #[tokio::test]
    async fn test_empty_result_keeps_column_names() {
        let (_path, executor) = executor();
        let rows = executor
            .execute(&spec("SELECT 1 AS A, 2 AS B WHERE 1 = 0", 10))
            .await
            .unwrap();
        assert!(rows.rows.is_empty());
        assert_eq!(rows.columns, vec!["A", "B"]);
        assert!(!rows.truncated);
    }

    #[tokio::test]
    async fn test_database_error_is_classified() {
        let (_path, executor) = executor();
        let err = executor
            .execute(&spec("SELECT * FROM NO_SUCH_TABLE", 10))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DatabaseError);
        // The session survives the fault and serves the next query.
        assert!(executor.execute(&spec("SELECT 1", 1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_sqlite_timeout_interrupts_statement() {
        let mut conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        let started = Instant::now();
        let err = sqlite::fetch(&mut conn, &spec(RUNAWAY, 1), Duration::from_millis(300))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(started.elapsed() < Duration::from_secs(2));

        // The worker thread only takes the lock once the abandoned statement
        // has stopped stepping.
        let mut locked = timeout(Duration::from_secs(2), conn.lock_handle())
            .await
            .expect("statement still running after timeout")
            .unwrap();
        locked.remove_progress_handler();
        drop(locked);

        let rows = sqlite::fetch(&mut conn, &spec("SELECT 1 AS ONE", 1), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(rows.rows, vec![vec![ScalarValue::Integer(1)]]);
    }

    #[tokio::test]
    async fn test_sqlite_deadline_is_cleared_after_success() {
        let mut conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        sqlite::fetch(&mut conn, &spec("SELECT 1", 1), Duration::from_millis(50))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Statements outside the executor must not inherit the expired deadline.
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM (WITH RECURSIVE n(i) AS \
             (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < 100000) SELECT i FROM n)",
        )
        .fetch_one(&mut conn)
        .await
        .unwrap();
        assert_eq!(count, 100000);
    }

    #[test]
    fn test_failure_after_deadline_is_timeout() {
        let limit = Duration::from_millis(10);
        let passed = Instant::now() - Duration::from_millis(1);
        let err = past_deadline(GatewayError::database("interrupted", None), passed, limit);
        assert_eq!(err.kind(), ErrorKind::Timeout);

        let pending = Instant::now() + Duration::from_secs(60);
        let err = past_deadline(GatewayError::database("no such table", None), pending, limit);
        assert_eq!(err.kind(), ErrorKind::DatabaseError);
    }
}
