//! In-memory driver shared by the integration tests.

#![allow(dead_code)]

use relmap::{BatchResult, Connection, Cx, Error, Outcome, PreparedStatement, Row, SqlType, Value};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub struct MockState {
    /// SQL of every prepared statement, in order
    pub prepared: Vec<String>,
    /// Every single-row execution: SQL and bound parameters
    pub executed: Vec<(String, Vec<Value>)>,
    /// Every batch execution: SQL and parameter rows
    pub batches: Vec<(String, Vec<Vec<Value>>)>,
    /// Rows served to every query
    pub rows: Vec<Row>,
    /// Keys handed out by successive `insert_prepared` calls
    pub generated_keys: VecDeque<Value>,
    /// Keys reported by the next batch
    pub batch_keys: Option<Vec<Value>>,
    /// Parameter types reported for statements whose SQL contains the pattern
    pub param_types: Vec<(String, Vec<SqlType>)>,
    /// Extra parameters every prepared statement claims to expect
    pub extra_params: usize,
    next_id: u64,
}

impl MockState {
    pub fn executed_sql(&self) -> Vec<&str> {
        self.executed.iter().map(|(sql, _)| sql.as_str()).collect()
    }
}

#[derive(Debug, Clone)]
pub struct MockConnection {
    pub state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    pub fn with_rows(rows: Vec<Row>) -> Self {
        let conn = Self::new();
        conn.state.lock().expect("lock poisoned").rows = rows;
        conn
    }

    pub fn with_generated_keys(keys: impl IntoIterator<Item = Value>) -> Self {
        let conn = Self::new();
        conn.state.lock().expect("lock poisoned").generated_keys = keys.into_iter().collect();
        conn
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("lock poisoned")
    }

    fn record(&self, sql: &str, params: &[Value]) {
        self.state().executed.push((sql.to_string(), params.to_vec()));
    }
}

fn placeholder_count(sql: &str) -> usize {
    sql.matches('?').count() + sql.matches('$').count()
}

impl Connection for MockConnection {
    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        self.record(sql, params);
        let rows = self.state().rows.clone();
        async move { Outcome::Ok(rows) }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        self.record(sql, params);
        async { Outcome::Ok(1) }
    }

    fn prepare(
        &self,
        _cx: &Cx,
        sql: &str,
    ) -> impl Future<Output = Outcome<PreparedStatement, Error>> + Send {
        let stmt = {
            let mut state = self.state();
            state.next_id += 1;
            state.prepared.push(sql.to_string());
            let id = state.next_id;
            let types = state
                .param_types
                .iter()
                .find(|(pattern, _)| sql.contains(pattern.as_str()))
                .map(|(_, types)| types.clone());
            match types {
                Some(types) => PreparedStatement::with_param_types(id, sql.to_string(), types),
                None => PreparedStatement::new(
                    id,
                    sql.to_string(),
                    placeholder_count(sql) + state.extra_params,
                ),
            }
        };
        async move { Outcome::Ok(stmt) }
    }

    fn query_prepared(
        &self,
        _cx: &Cx,
        stmt: &PreparedStatement,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        self.record(stmt.sql(), params);
        let rows = self.state().rows.clone();
        async move { Outcome::Ok(rows) }
    }

    fn execute_prepared(
        &self,
        _cx: &Cx,
        stmt: &PreparedStatement,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        self.record(stmt.sql(), params);
        async { Outcome::Ok(1) }
    }

    fn insert_prepared(
        &self,
        _cx: &Cx,
        stmt: &PreparedStatement,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Value>, Error>> + Send {
        self.record(stmt.sql(), params);
        let key = self.state().generated_keys.pop_front();
        async move { Outcome::Ok(key) }
    }

    fn execute_batch(
        &self,
        _cx: &Cx,
        stmt: &PreparedStatement,
        rows: &[Vec<Value>],
    ) -> impl Future<Output = Outcome<BatchResult, Error>> + Send {
        let result = {
            let mut state = self.state();
            state.batches.push((stmt.sql().to_string(), rows.to_vec()));
            BatchResult {
                affected: vec![1; rows.len()],
                generated_keys: state.batch_keys.take(),
            }
        };
        async move { Outcome::Ok(result) }
    }

    fn ping(&self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        async { Outcome::Ok(()) }
    }

    fn close(self, _cx: &Cx) -> impl Future<Output = relmap::Result<()>> + Send {
        async { Ok(()) }
    }
}

pub fn unwrap_outcome<T: std::fmt::Debug>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        other => std::panic::panic_any(format!("unexpected outcome: {other:?}")),
    }
}

pub fn expect_err<T: std::fmt::Debug>(outcome: Outcome<T, Error>) -> Error {
    match outcome {
        Outcome::Err(e) => e,
        other => std::panic::panic_any(format!("expected an error, got: {other:?}")),
    }
}

pub fn row(labels: &[&str], values: Vec<Value>) -> Row {
    Row::new(labels.iter().map(|l| (*l).to_string()).collect(), values)
}
