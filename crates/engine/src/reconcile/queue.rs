//! Work queue over the reconciliation log

use crate::executor::CqlExecutor;
use crate::session::Row;
use stratamap_core::{Error, Record, Result, TimeId, Timestamp, Value};
use stratamap_cql::{CqlGenerator, IndexUpdateRow, IndexUpdateRowKey};
use tracing::{debug, warn};

/// Source of pending reconciliation work.
///
/// `poll_next` walks log partitions in a stable order; passing the previous
/// partition key resumes after it. Only entries older than the consistency
/// horizon at `now` are handed out.
pub trait IndexUpdateQueue: Send + Sync {
    /// Next eligible partition after `after` (or the first one)
    fn poll_next(&self, after: Option<&IndexUpdateRowKey>, now: Timestamp) -> Result<Option<IndexUpdateRow>>;

    /// Remove every entry of `row` from the queue
    fn ack(&self, row: &IndexUpdateRow) -> Result<()>;
}

/// Queue backed by the `__index_updates` table
#[derive(Debug, Clone)]
pub struct TableIndexUpdateQueue {
    executor: CqlExecutor,
    generator: CqlGenerator,
}

impl TableIndexUpdateQueue {
    /// Queue reading through `executor`
    pub fn new(executor: CqlExecutor, generator: CqlGenerator) -> Self {
        TableIndexUpdateQueue { executor, generator }
    }

    fn load_row(&self, key: IndexUpdateRowKey, now: Timestamp) -> Result<IndexUpdateRow> {
        let horizon = self.generator.time_id_at_end_of_consistency_horizon(now);
        let rows = self
            .executor
            .execute(&self.generator.make_get_row_index_update(&key))?
            .into_rows();
        let mut snapshots = Vec::with_capacity(rows.len());
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(id) = row.get("id").and_then(Value::as_uuid).and_then(TimeId::from_uuid) else {
                warn!(target: "stratamap::reconcile", object_type = %key.object_type, "Log entry without a time id");
                continue;
            };
            if id >= horizon {
                continue;
            }
            snapshots.push(parse_snapshot(&row)?);
            ids.push(id);
        }
        let most_recent_update = ids.first().map(TimeId::timestamp).unwrap_or_default();
        Ok(IndexUpdateRow {
            key,
            snapshots,
            ids,
            most_recent_update,
        })
    }
}

impl IndexUpdateQueue for TableIndexUpdateQueue {
    fn poll_next(&self, after: Option<&IndexUpdateRowKey>, now: Timestamp) -> Result<Option<IndexUpdateRow>> {
        let statement = match after {
            Some(key) => self.generator.make_get_next_eligible_index_update(key, now),
            None => self.generator.make_get_first_eligible_index_update(now),
        };
        let result = self.executor.execute(&statement)?;
        let Some(first) = result.rows().first() else {
            return Ok(None);
        };
        let key = row_key(first)?;
        debug!(target: "stratamap::reconcile", object_type = %key.object_type, instance = %key.instance_id, "Eligible log partition");
        self.load_row(key, now).map(Some)
    }

    fn ack(&self, row: &IndexUpdateRow) -> Result<()> {
        for id in &row.ids {
            self.executor
                .execute(&self.generator.make_delete_obsolete_update_index_column(&row.key, *id))?;
        }
        Ok(())
    }
}

fn text_column<'a>(row: &'a Row, column: &str) -> Result<&'a str> {
    row.get(column)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::store(format!("log row without {}", column)))
}

fn row_key(row: &Row) -> Result<IndexUpdateRowKey> {
    Ok(IndexUpdateRowKey::new(
        text_column(row, "statictablename")?,
        text_column(row, "instanceid")?,
    ))
}

fn parse_snapshot(row: &Row) -> Result<Record> {
    let encoded = text_column(row, "indexvalues")?;
    let parsed: serde_json::Map<String, serde_json::Value> = serde_json::from_str(encoded)?;
    Ok(parsed.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use std::sync::Arc;
    use std::time::Duration;
    use stratamap_core::{Field, FieldType, Index, ObjectDefinition, ShardingStrategy};

    fn definition() -> ObjectDefinition {
        ObjectDefinition::new("places")
            .with_field(Field::new("region", FieldType::Varchar))
            .with_index(Index::new("region", ShardingStrategy::None))
    }

    fn setup() -> (CqlGenerator, TableIndexUpdateQueue) {
        let store = Arc::new(MemoryStore::new());
        let executor = CqlExecutor::new(store, false, true);
        let generator = CqlGenerator::new("rq", Duration::from_secs(1));
        executor
            .execute(&generator.make_index_update_table_create())
            .unwrap();
        (generator.clone(), TableIndexUpdateQueue::new(executor, generator))
    }

    fn log_update(queue: &TableIndexUpdateQueue, generator: &CqlGenerator, key: i64, region: &str) {
        let mut old = Record::new();
        old.insert("region".to_string(), Value::from(region));
        let statement = generator
            .make_index_update_insert(&definition(), &Value::Int(key), &old)
            .unwrap();
        queue.executor.execute(&statement).unwrap();
        // distinct log ids per millisecond
        std::thread::sleep(Duration::from_millis(2));
    }

    #[test]
    fn test_empty_queue() {
        let (_generator, queue) = setup();
        assert!(queue.poll_next(None, Timestamp::now()).unwrap().is_none());
    }

    #[test]
    fn test_entries_inside_horizon_are_not_eligible() {
        let (generator, queue) = setup();
        log_update(&queue, &generator, 7, "east");
        assert!(queue.poll_next(None, Timestamp::now()).unwrap().is_none());
    }

    #[test]
    fn test_poll_walks_partitions_and_ack_empties_them() {
        let (generator, queue) = setup();
        log_update(&queue, &generator, 7, "east");
        log_update(&queue, &generator, 7, "north");
        log_update(&queue, &generator, 8, "south");
        let later = Timestamp::now().saturating_add(Duration::from_secs(60));

        let first = queue.poll_next(None, later).unwrap().unwrap();
        let second = queue.poll_next(Some(&first.key), later).unwrap().unwrap();
        assert!(queue.poll_next(Some(&second.key), later).unwrap().is_none());

        let seven = if first.key.instance_id == "7" { &first } else { &second };
        assert_eq!(seven.snapshots.len(), 2);
        assert_eq!(seven.snapshots[0]["region"], Value::from("north"));
        assert_eq!(seven.most_recent_update, seven.ids[0].timestamp());

        queue.ack(&first).unwrap();
        queue.ack(&second).unwrap();
        assert!(queue.poll_next(None, later).unwrap().is_none());
    }
}
