//! Reconciliation-log and keyspace-definition statements

use super::write::{indexed_fields, wide_row_key};
use super::CqlGenerator;
use crate::format::literal;
use crate::naming::{wide_table_name, INDEX_UPDATES_TABLE, KEYSPACE_DEFINITIONS_TABLE};
use crate::statement::{Comparison, CqlStatement, Operation, Predicate, Selection};
use crate::update_log::IndexUpdateRowKey;
use stratamap_core::{
    Index, KeyspaceDefinition, ObjectDefinition, Record, Result, SortOrder, TimeId, Timestamp,
    Value, ID_FIELD,
};

const LOG_PARTITION: [&str; 2] = ["statictablename", "instanceid"];

fn log_partition() -> Vec<String> {
    LOG_PARTITION.iter().map(|c| c.to_string()).collect()
}

impl CqlGenerator {
    /// Log entry recording the indexed values of `old` for instance `key`
    pub fn make_index_update_insert(
        &self,
        definition: &ObjectDefinition,
        key: &Value,
        old: &Record,
    ) -> Result<CqlStatement> {
        let snapshot: serde_json::Map<String, serde_json::Value> = indexed_fields(definition)
            .into_iter()
            .map(|f| {
                let value = old.get(f).map(Value::to_json).unwrap_or(serde_json::Value::Null);
                (f.to_string(), value)
            })
            .collect();
        let encoded = serde_json::to_string(&snapshot)?;
        Ok(self.statement(
            Operation::Insert {
                table: INDEX_UPDATES_TABLE.to_string(),
                columns: vec![
                    "id".to_string(),
                    "statictablename".to_string(),
                    "instanceid".to_string(),
                    "indexvalues".to_string(),
                ],
                ttl: None,
            },
            vec![
                Value::from(TimeId::now()),
                Value::String(definition.name().to_string()),
                Value::String(key.to_string()),
                Value::String(encoded),
            ],
        ))
    }

    /// First log partition holding an entry older than the consistency
    /// horizon at `now`
    pub fn make_get_first_eligible_index_update(&self, now: Timestamp) -> CqlStatement {
        self.statement(
            Operation::Select {
                table: INDEX_UPDATES_TABLE.to_string(),
                selection: Selection::Columns(log_partition()),
                predicates: vec![Predicate::column(ID_FIELD, Comparison::Lt)],
                order: None,
                limit: Some(1),
                allow_filtering: true,
            },
            vec![Value::from(self.time_id_at_end_of_consistency_horizon(now))],
        )
    }

    /// Next eligible log partition in token order after `after`
    pub fn make_get_next_eligible_index_update(
        &self,
        after: &IndexUpdateRowKey,
        now: Timestamp,
    ) -> CqlStatement {
        self.statement(
            Operation::Select {
                table: INDEX_UPDATES_TABLE.to_string(),
                selection: Selection::Columns(log_partition()),
                predicates: vec![
                    Predicate::token(log_partition(), Comparison::Gt),
                    Predicate::column(ID_FIELD, Comparison::Lt),
                ],
                order: None,
                limit: Some(1),
                allow_filtering: true,
            },
            vec![
                Value::String(after.object_type.clone()),
                Value::String(after.instance_id.clone()),
                Value::from(self.time_id_at_end_of_consistency_horizon(now)),
            ],
        )
    }

    /// Every entry of one log partition, newest first
    pub fn make_get_row_index_update(&self, key: &IndexUpdateRowKey) -> CqlStatement {
        self.statement(
            Operation::Select {
                table: INDEX_UPDATES_TABLE.to_string(),
                selection: Selection::All,
                predicates: LOG_PARTITION.iter().map(|c| Predicate::eq(*c)).collect(),
                order: Some((ID_FIELD.to_string(), SortOrder::Descending)),
                limit: None,
                allow_filtering: false,
            },
            vec![
                Value::String(key.object_type.clone()),
                Value::String(key.instance_id.clone()),
            ],
        )
    }

    /// Remove one processed log entry
    pub fn make_delete_obsolete_update_index_column(
        &self,
        key: &IndexUpdateRowKey,
        id: TimeId,
    ) -> CqlStatement {
        let mut predicates: Vec<Predicate> = LOG_PARTITION.iter().map(|c| Predicate::eq(*c)).collect();
        predicates.push(Predicate::eq(ID_FIELD));
        self.statement(
            Operation::Delete {
                table: INDEX_UPDATES_TABLE.to_string(),
                predicates,
                timestamp: None,
            },
            vec![
                Value::String(key.object_type.clone()),
                Value::String(key.instance_id.clone()),
                Value::from(id),
            ],
        )
    }

    /// Delete the wide row `snapshot` addressed under `index`, but only
    /// writes no newer than `timestamp_micros`.
    ///
    /// The timestamp clause cannot be bound, so values are inlined and the
    /// statement runs unprepared.
    pub fn make_delete_obsolete_index_row(
        &self,
        definition: &ObjectDefinition,
        index: &Index,
        key: &Value,
        snapshot: &Record,
        timestamp_micros: u64,
    ) -> Result<CqlStatement> {
        let (predicates, values) = wide_row_key(index, key, snapshot)?;
        let mut literals = vec![
            literal(Some(definition.primary_key_type()), key),
            literal(None, &values[1]),
        ];
        literals.extend(
            index
                .composite_key()
                .iter()
                .zip(&values[2..])
                .map(|(f, v)| literal(definition.field(f).map(|d| d.field_type), v)),
        );
        Ok(self
            .statement(
                Operation::Delete {
                    table: wide_table_name(definition, index),
                    predicates,
                    timestamp: Some(timestamp_micros),
                },
                values,
            )
            .with_literals(literals))
    }

    /// Append a version of the keyspace definition
    pub fn make_insert_keyspace_definition(&self, keyspace: &KeyspaceDefinition) -> Result<CqlStatement> {
        Ok(self.statement(
            Operation::Insert {
                table: KEYSPACE_DEFINITIONS_TABLE.to_string(),
                columns: vec!["name".to_string(), "id".to_string(), "def".to_string()],
                ttl: None,
            },
            vec![
                Value::String(keyspace.name.clone()),
                Value::from(TimeId::now()),
                Value::String(keyspace.to_json()?),
            ],
        ))
    }

    /// Newest stored version of the keyspace definition `name`
    pub fn make_get_keyspace_definition(&self, name: &str) -> CqlStatement {
        self.statement(
            Operation::Select {
                table: KEYSPACE_DEFINITIONS_TABLE.to_string(),
                selection: Selection::All,
                predicates: vec![Predicate::eq("name")],
                order: Some((ID_FIELD.to_string(), SortOrder::Descending)),
                limit: Some(1),
                allow_filtering: false,
            },
            vec![Value::String(name.to_string())],
        )
    }
}
