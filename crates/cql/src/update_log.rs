//! Reconciliation-log entries
//!
//! The log table `__index_updates` is partitioned by
//! `(statictablename, instanceid)` and clustered by a time-ordered `id`, so a
//! partition holds every pending snapshot for one object instance. Each
//! column's `indexvalues` is a JSON object of the indexed fields' values
//! before an update.

use stratamap_core::{Record, TimeId, Timestamp};

/// Partition key of the reconciliation log
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexUpdateRowKey {
    /// Object type (static table name)
    pub object_type: String,
    /// Primary key of the updated instance, in text form
    pub instance_id: String,
}

impl IndexUpdateRowKey {
    /// Key for one object instance
    pub fn new(object_type: impl Into<String>, instance_id: impl Into<String>) -> Self {
        IndexUpdateRowKey {
            object_type: object_type.into(),
            instance_id: instance_id.into(),
        }
    }
}

/// All pending snapshots for one object instance
#[derive(Debug, Clone, PartialEq)]
pub struct IndexUpdateRow {
    /// Partition key
    pub key: IndexUpdateRowKey,
    /// Prior indexed-value snapshots, most recent first
    pub snapshots: Vec<Record>,
    /// Log column id of each snapshot
    pub ids: Vec<TimeId>,
    /// Time of the most recent update (the newest log id)
    pub most_recent_update: Timestamp,
}
