//! The relational driver interface consumed by the mapping pipelines.
//!
//! - [`Connection`] - prepare and execute parameterized statements
//! - [`PreparedStatement`] - a compiled statement reporting its parameter count and types
//! - [`BatchResult`] - per-row outcome of a batched execution
//!
//! All operations integrate with asupersync's structured concurrency via `Cx` context
//! for proper cancellation and timeout handling. Transaction demarcation is
//! left to the caller: pipelines run in whatever state the connection is in.

use crate::error::Result;
use crate::row::Row;
use crate::types::SqlType;
use crate::value::Value;
use asupersync::{Cx, Outcome};
use std::future::Future;

/// A prepared statement.
///
/// Drivers report how many parameters the statement expects and, when they
/// know it, the SQL type of every parameter position. The write pipeline
/// checks the count before executing and uses the types to pick column
/// representations (for instance an integer for a boolean member).
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    /// Unique identifier for this prepared statement (driver-specific)
    id: u64,
    /// The original SQL text
    sql: String,
    /// Number of expected parameters
    param_count: usize,
    /// Target SQL type per parameter position (if available)
    param_types: Option<Vec<SqlType>>,
}

impl PreparedStatement {
    /// Create a new prepared statement.
    ///
    /// This is typically called by the driver, not by users directly.
    #[must_use]
    pub fn new(id: u64, sql: String, param_count: usize) -> Self {
        Self {
            id,
            sql,
            param_count,
            param_types: None,
        }
    }

    /// Create a prepared statement with per-position parameter types.
    #[must_use]
    pub fn with_param_types(id: u64, sql: String, param_types: Vec<SqlType>) -> Self {
        Self {
            id,
            sql,
            param_count: param_types.len(),
            param_types: Some(param_types),
        }
    }

    /// Get the statement ID.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Get the original SQL text.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Get the expected number of parameters.
    #[must_use]
    pub const fn param_count(&self) -> usize {
        self.param_count
    }

    /// Get the target type of a 0-based parameter position, if reported.
    #[must_use]
    pub fn param_type(&self, index: usize) -> Option<&SqlType> {
        self.param_types.as_ref().and_then(|types| types.get(index))
    }

    /// Fail with [`Error::ParamCount`](crate::Error::ParamCount) when fewer
    /// parameters are supplied than the statement expects.
    #[allow(clippy::result_large_err)]
    pub fn check_params(&self, params: &[Value]) -> Result<()> {
        if params.len() < self.param_count {
            return Err(crate::Error::ParamCount {
                sql: self.sql.clone(),
                expected: self.param_count,
                actual: params.len(),
            });
        }
        Ok(())
    }
}

/// Outcome of executing one statement for many parameter rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResult {
    /// Rows affected, one entry per parameter row
    pub affected: Vec<u64>,
    /// Generated keys, one per parameter row, when the driver can report them
    pub generated_keys: Option<Vec<Value>>,
}

/// A database connection capable of executing mapped statements.
///
/// All operations are async and take a `Cx` context for cancellation/timeout support.
/// Implementations must be `Send + Sync` for use across async boundaries.
///
/// # Example
///
/// ```rust,ignore
/// let stmt = conn.prepare(&cx, "SELECT id, name FROM hero WHERE id = ?").await?;
/// let rows = conn.query_prepared(&cx, &stmt, &[Value::BigInt(1)]).await?;
/// ```
pub trait Connection: Send + Sync {
    /// Execute a query and return all rows.
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, crate::Error>> + Send;

    /// Execute a statement (INSERT, UPDATE, DELETE) and return rows affected.
    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, crate::Error>> + Send;

    /// Prepare a statement, reporting its parameter count and types.
    fn prepare(
        &self,
        cx: &Cx,
        sql: &str,
    ) -> impl Future<Output = Outcome<PreparedStatement, crate::Error>> + Send;

    /// Execute a prepared statement and return all rows.
    fn query_prepared(
        &self,
        cx: &Cx,
        stmt: &PreparedStatement,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, crate::Error>> + Send;

    /// Execute a prepared statement (INSERT, UPDATE, DELETE) and return rows affected.
    fn execute_prepared(
        &self,
        cx: &Cx,
        stmt: &PreparedStatement,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, crate::Error>> + Send;

    /// Execute a prepared INSERT and return the key generated by the store, if any.
    fn insert_prepared(
        &self,
        cx: &Cx,
        stmt: &PreparedStatement,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Value>, crate::Error>> + Send;

    /// Execute a prepared statement once per parameter row as a single batch.
    fn execute_batch(
        &self,
        cx: &Cx,
        stmt: &PreparedStatement,
        rows: &[Vec<Value>],
    ) -> impl Future<Output = Outcome<BatchResult, crate::Error>> + Send;

    /// Check if the connection is still valid by sending a ping.
    fn ping(&self, cx: &Cx) -> impl Future<Output = Outcome<(), crate::Error>> + Send;

    /// Check if the connection is still valid (alias for ping that returns bool).
    fn is_valid(&self, cx: &Cx) -> impl Future<Output = bool> + Send {
        async {
            match self.ping(cx).await {
                Outcome::Ok(()) => true,
                Outcome::Err(_) | Outcome::Cancelled(_) | Outcome::Panicked(_) => false,
            }
        }
    }

    /// Close the connection gracefully.
    fn close(self, cx: &Cx) -> impl Future<Output = Result<()>> + Send;
}
