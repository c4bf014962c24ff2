//! Statement-execution collaborator
//!
//! A [`Session`] is the connection to the store. The mapper never builds
//! query text for it by hand: it passes compiled [`CqlStatement`]s, which
//! carry both the rendered CQL and the structure behind it.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;
use stratamap_core::{Error, Record, Result, Value};
use stratamap_cql::CqlStatement;

/// One result row, keyed by column name
pub type Row = Record;

/// Rows returned by one statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    rows: Vec<Row>,
}

impl ResultSet {
    /// Wrap rows
    pub fn new(rows: Vec<Row>) -> Self {
        ResultSet { rows }
    }

    /// No rows
    pub fn empty() -> Self {
        ResultSet::default()
    }

    /// Borrow the rows
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Take the rows
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no rows came back
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value of a `COUNT(*)` select
    pub fn count(&self) -> Option<u64> {
        self.rows
            .first()
            .and_then(|row| row.get("count"))
            .and_then(Value::as_int)
            .map(|n| n.max(0) as u64)
    }
}

/// Handle to a statement prepared by the store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreparedStatement {
    /// Store-assigned id
    pub id: u64,
    /// Query text it was prepared from
    pub query: String,
}

/// Connection to the store
pub trait Session: Send + Sync {
    /// Execute one statement as plain text with its values
    fn execute(&self, statement: &CqlStatement) -> Result<ResultSet>;

    /// Prepare a parameterized statement for repeated execution
    fn prepare(&self, statement: &CqlStatement) -> Result<PreparedStatement>;

    /// Execute a prepared statement with bound `values`
    fn execute_prepared(&self, prepared: &PreparedStatement, values: &[Value]) -> Result<ResultSet>;

    /// Apply `statements` as one atomic batch, or fail after `timeout`
    fn execute_batch(&self, statements: &[CqlStatement], timeout: Duration) -> Result<()>;
}

/// Result of a statement running on another thread
#[derive(Debug)]
pub struct PendingResult {
    receiver: Receiver<Result<ResultSet>>,
}

impl PendingResult {
    pub(crate) fn new(receiver: Receiver<Result<ResultSet>>) -> Self {
        PendingResult { receiver }
    }

    /// Block until the statement finishes
    pub fn wait(self) -> Result<ResultSet> {
        self.receiver
            .recv()
            .map_err(|_| Error::store("statement worker exited without a result"))?
    }

    /// Block for at most `timeout`
    pub fn wait_timeout(self, timeout: Duration) -> Result<ResultSet> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(Error::Timeout {
                millis: timeout.as_millis() as u64,
            }),
            Err(RecvTimeoutError::Disconnected) => {
                Err(Error::store("statement worker exited without a result"))
            }
        }
    }
}
