//! Statement compiler
//!
//! Pure compilation from schema, data and (for update/delete) prior data to
//! ordered statement sequences. Nothing here talks to a store; every
//! compilation failure is returned before a single statement exists.
//!
//! Ordering contract for writes:
//!
//! - **insert**: static insert, then per passing index its wide insert and
//!   (time-bucketed strategies only) a shard-index insert
//! - **update**: stale wide-row deletes, static insert of the changed
//!   fields, wide (+ shard-index) inserts for the merged values, and last
//!   the reconciliation-log insert when any index key moved
//! - **delete**: static delete, then one wide delete per index the last
//!   known values pass

mod log;
mod read;
mod schema;
mod write;

use crate::statement::{CqlStatement, Operation};
use std::time::Duration;
use stratamap_core::{TimeId, Timestamp, Value};

/// Compiles object operations into statements for one keyspace
#[derive(Debug, Clone)]
pub struct CqlGenerator {
    keyspace: String,
    consistency_horizon: Duration,
}

impl CqlGenerator {
    /// Generator for `keyspace`; log entries become eligible for
    /// reconciliation once older than `consistency_horizon`
    pub fn new(keyspace: impl Into<String>, consistency_horizon: Duration) -> Self {
        CqlGenerator {
            keyspace: keyspace.into(),
            consistency_horizon,
        }
    }

    /// Keyspace name
    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    /// Consistency horizon
    pub fn consistency_horizon(&self) -> Duration {
        self.consistency_horizon
    }

    /// Smallest log id that is not yet eligible for reconciliation at `now`
    pub fn time_id_at_end_of_consistency_horizon(&self, now: Timestamp) -> TimeId {
        TimeId::start_of(now.saturating_sub(self.consistency_horizon))
    }

    fn statement(&self, operation: Operation, values: Vec<Value>) -> CqlStatement {
        CqlStatement::new(self.keyspace.clone(), operation, values)
    }
}
