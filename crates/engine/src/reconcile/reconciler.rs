//! Stale wide-row cleanup
//!
//! An update that moves an object to a new index key deletes the old wide row
//! right away, but on an eventually consistent store that delete can lose to
//! a late replica. The reconciler revisits every logged prior key once it is
//! older than the consistency horizon and deletes it again, qualified by the
//! time of the most recent update so that rows written afterwards survive.

use super::queue::IndexUpdateQueue;
use crate::background::{BackgroundScheduler, BackpressureError};
use crate::executor::CqlExecutor;
use crate::rows::map_row;
use parking_lot::RwLock;
use std::sync::Arc;
use stratamap_core::{Error, KeyspaceDefinition, ObjectDefinition, Record, Result, Timestamp, Value};
use stratamap_cql::{CqlGenerator, IndexUpdateRow};
use tracing::{debug, info, warn};

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Log partitions visited
    pub partitions: usize,
    /// Wide-row deletes issued
    pub deleted_rows: usize,
    /// Log entries removed
    pub acked_entries: usize,
}

/// Drains the reconciliation log
pub struct IndexReconciler {
    executor: CqlExecutor,
    generator: CqlGenerator,
    keyspace: Arc<RwLock<KeyspaceDefinition>>,
    queue: Arc<dyn IndexUpdateQueue>,
    batch_size: usize,
}

impl IndexReconciler {
    /// Reconciler for the object types of `keyspace`. Scheduled passes
    /// visit at most `batch_size` partitions (0 = no cap).
    pub fn new(
        executor: CqlExecutor,
        generator: CqlGenerator,
        keyspace: Arc<RwLock<KeyspaceDefinition>>,
        queue: Arc<dyn IndexUpdateQueue>,
        batch_size: usize,
    ) -> Self {
        IndexReconciler {
            executor,
            generator,
            keyspace,
            queue,
            batch_size,
        }
    }

    /// Reconcile one log partition: delete every logged wide row the object
    /// no longer occupies, then ack the entries. Returns the deletes issued.
    pub fn process(&self, row: &IndexUpdateRow) -> Result<usize> {
        if row.ids.is_empty() {
            return Ok(0);
        }
        let definition = match self.keyspace.read().definition(&row.key.object_type) {
            Ok(definition) => definition.clone(),
            Err(Error::UnknownObjectType { .. }) => {
                warn!(target: "stratamap::reconcile", object_type = %row.key.object_type, "Dropping log entries of an unknown object type");
                self.queue.ack(row)?;
                return Ok(0);
            }
            Err(e) => return Err(e),
        };
        let key = definition.coerce_key(Value::String(row.key.instance_id.clone()))?;
        let current = self.current_object(&definition, &key)?;
        // end of the newest entry's millisecond
        let timestamp = row.most_recent_update.as_millis() * 1_000 + 999;

        let mut deleted = 0;
        for index in definition.indexes() {
            let current_values = current
                .as_ref()
                .filter(|c| index.passes_all_filters(c) && index.has_complete_key(c))
                .map(|c| index.index_values(c));
            let mut visited: Vec<Vec<Value>> = Vec::new();
            for snapshot in &row.snapshots {
                let snapshot = match definition.coerce_record(snapshot.clone()) {
                    Ok(snapshot) => snapshot,
                    Err(e) => {
                        warn!(target: "stratamap::reconcile", object_type = %row.key.object_type, error = %e, "Skipping unreadable snapshot");
                        continue;
                    }
                };
                if !index.has_complete_key(&snapshot) {
                    continue;
                }
                let values = index.index_values(&snapshot);
                if current_values.as_ref() == Some(&values) || visited.contains(&values) {
                    continue;
                }
                let statement = self
                    .generator
                    .make_delete_obsolete_index_row(&definition, index, &key, &snapshot, timestamp)?;
                self.executor.execute_unprepared(&statement)?;
                visited.push(values);
                deleted += 1;
            }
        }
        self.queue.ack(row)?;
        debug!(
            target: "stratamap::reconcile",
            object_type = %row.key.object_type,
            instance = %row.key.instance_id,
            entries = row.ids.len(),
            deleted,
            "Reconciled log partition"
        );
        Ok(deleted)
    }

    /// Drain every entry eligible at `now`
    pub fn run_once_at(&self, now: Timestamp) -> Result<ReconcileSummary> {
        self.walk(now, 0)
    }

    /// Drain every entry eligible now
    pub fn run_once(&self) -> Result<ReconcileSummary> {
        self.run_once_at(Timestamp::now())
    }

    /// Queue one capped pass on `scheduler`
    pub fn spawn(self: &Arc<Self>, scheduler: &BackgroundScheduler) -> std::result::Result<(), BackpressureError> {
        let reconciler = Arc::clone(self);
        scheduler.submit("reconcile-index-updates", move || {
            let summary = reconciler.walk(Timestamp::now(), reconciler.batch_size)?;
            if summary.partitions > 0 {
                info!(
                    target: "stratamap::reconcile",
                    partitions = summary.partitions,
                    deleted = summary.deleted_rows,
                    "Reconciliation pass finished"
                );
            }
            Ok(())
        })
    }

    fn walk(&self, now: Timestamp, cap: usize) -> Result<ReconcileSummary> {
        let mut summary = ReconcileSummary::default();
        let mut after = None;
        while cap == 0 || summary.partitions < cap {
            let Some(row) = self.queue.poll_next(after.as_ref(), now)? else {
                break;
            };
            summary.deleted_rows += self.process(&row)?;
            summary.acked_entries += row.ids.len();
            summary.partitions += 1;
            after = Some(row.key);
        }
        Ok(summary)
    }

    fn current_object(&self, definition: &ObjectDefinition, key: &Value) -> Result<Option<Record>> {
        for statement in self.generator.make_get(definition, key) {
            if let Some(row) = self.executor.execute(&statement)?.into_rows().into_iter().next() {
                return Ok(Some(map_row(definition, row)));
            }
        }
        Ok(None)
    }
}

impl std::fmt::Debug for IndexReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexReconciler")
            .field("keyspace", &self.generator.keyspace())
            .field("batch_size", &self.batch_size)
            .finish()
    }
}
