//! Insert, update and delete compilation

use super::CqlGenerator;
use crate::iterator::StatementIterator;
use crate::naming::{static_table_name, wide_table_name, SHARD_INDEX_TABLE};
use crate::statement::{CqlStatement, Operation, Predicate};
use std::collections::BTreeSet;
use stratamap_core::{Error, Index, ObjectDefinition, Record, Result, Value, ID_FIELD};
use tracing::debug;

impl CqlGenerator {
    /// Compile an insert of `data` under primary key `key`.
    ///
    /// Emits the static insert, then for every index whose filters accept
    /// `data` a wide insert, followed by a shard-index insert when the index
    /// is time-bucketed. An index key with a missing field fails the whole
    /// insert unless the object type allows null key inserts, in which case
    /// that index is skipped.
    pub fn make_insert(
        &self,
        definition: &ObjectDefinition,
        key: &Value,
        data: &Record,
        ttl: Option<u32>,
    ) -> Result<StatementIterator> {
        definition.validate_required(data)?;
        let mut statements = vec![self.static_insert(definition, key, data, ttl)];
        for index in definition.indexes() {
            if !index.passes_all_filters(data) {
                continue;
            }
            if let Some(field) = index.missing_key_field(data) {
                if definition.allow_null_primary_key_inserts() {
                    debug!(target: "stratamap::cql", index = index.name(), field, "Skipping index with null key field");
                    continue;
                }
                return Err(Error::missing_index_field(definition.name(), index.name(), field));
            }
            self.push_index_insert(&mut statements, definition, index, key, data, ttl)?;
        }
        Ok(StatementIterator::bounded(statements))
    }

    /// Compile an update of `key` from `old` by applying `changes`.
    ///
    /// Stale wide rows are deleted before anything is inserted. The static
    /// insert carries only the supplied fields. Wide rows are rewritten from
    /// the merged values, and a reconciliation-log entry holding the prior
    /// indexed values closes the sequence when any index key moved.
    pub fn make_update(
        &self,
        definition: &ObjectDefinition,
        key: &Value,
        old: &Record,
        changes: &Record,
        ttl: Option<u32>,
    ) -> Result<StatementIterator> {
        let mut merged = old.clone();
        merged.extend(changes.iter().map(|(k, v)| (k.clone(), v.clone())));

        let mut statements = Vec::new();
        let mut index_changed = false;
        for index in definition.indexes() {
            let old_passes = index.passes_all_filters(old) && index.has_complete_key(old);
            let new_passes = index.passes_all_filters(&merged) && index.has_complete_key(&merged);
            let key_moved = index.index_values(old) != index.index_values(&merged);
            if old_passes && (key_moved || !new_passes) {
                statements.push(self.wide_delete(definition, index, key, old)?);
                index_changed = true;
            } else if old_passes != new_passes || key_moved {
                index_changed = true;
            }
        }

        statements.push(self.static_insert(definition, key, changes, ttl));
        for index in definition.indexes() {
            if index.passes_all_filters(&merged) && index.has_complete_key(&merged) {
                self.push_index_insert(&mut statements, definition, index, key, &merged, ttl)?;
            }
        }
        if index_changed {
            statements.push(self.make_index_update_insert(definition, key, old)?);
        }
        Ok(StatementIterator::bounded(statements))
    }

    /// Compile a delete of `key`: the static row, then the wide row of every
    /// index `last_known` was indexed under
    pub fn make_delete(
        &self,
        definition: &ObjectDefinition,
        key: &Value,
        last_known: &Record,
    ) -> Result<StatementIterator> {
        let mut statements = vec![self.statement(
            Operation::Delete {
                table: static_table_name(definition).to_string(),
                predicates: vec![Predicate::eq(ID_FIELD)],
                timestamp: None,
            },
            vec![key.clone()],
        )];
        for index in definition.indexes() {
            if index.passes_all_filters(last_known) && index.has_complete_key(last_known) {
                statements.push(self.wide_delete(definition, index, key, last_known)?);
            }
        }
        Ok(StatementIterator::bounded(statements))
    }

    fn push_index_insert(
        &self,
        statements: &mut Vec<CqlStatement>,
        definition: &ObjectDefinition,
        index: &Index,
        key: &Value,
        data: &Record,
        ttl: Option<u32>,
    ) -> Result<()> {
        let shard = index.shard_id_for(key)?;
        debug!(target: "stratamap::cql", index = index.name(), shard, "Index insert");
        statements.push(self.wide_insert(definition, index, key, shard, data, ttl));
        if index.sharding().is_time_bucketed() {
            statements.push(self.shard_index_insert(definition, index, shard, data));
        }
        Ok(())
    }

    fn static_insert(
        &self,
        definition: &ObjectDefinition,
        key: &Value,
        data: &Record,
        ttl: Option<u32>,
    ) -> CqlStatement {
        let (mut columns, mut values) = (vec![ID_FIELD.to_string()], vec![key.clone()]);
        for (name, value) in declared(definition, data) {
            columns.push(name.clone());
            values.push(value.clone());
        }
        self.statement(
            Operation::Insert {
                table: static_table_name(definition).to_string(),
                columns,
                ttl,
            },
            values,
        )
    }

    fn wide_insert(
        &self,
        definition: &ObjectDefinition,
        index: &Index,
        key: &Value,
        shard: i64,
        data: &Record,
        ttl: Option<u32>,
    ) -> CqlStatement {
        let mut columns = vec![ID_FIELD.to_string(), "shardid".to_string()];
        let mut values = vec![key.clone(), Value::Int(shard)];
        for (name, value) in declared(definition, data) {
            columns.push(name.clone());
            values.push(value.clone());
        }
        self.statement(
            Operation::Insert {
                table: wide_table_name(definition, index),
                columns,
                ttl,
            },
            values,
        )
    }

    fn shard_index_insert(
        &self,
        definition: &ObjectDefinition,
        index: &Index,
        shard: i64,
        data: &Record,
    ) -> CqlStatement {
        let encoded = index.encode_index_values(data);
        self.statement(
            Operation::Insert {
                table: SHARD_INDEX_TABLE.to_string(),
                columns: ["tablename", "indexvalues", "shardid", "targetrowkey"]
                    .iter()
                    .map(|c| c.to_string())
                    .collect(),
                ttl: None,
            },
            vec![
                Value::String(wide_table_name(definition, index)),
                Value::String(encoded.clone()),
                Value::Int(shard),
                Value::String(format!("{}:{}", shard, encoded)),
            ],
        )
    }

    pub(super) fn wide_delete(
        &self,
        definition: &ObjectDefinition,
        index: &Index,
        key: &Value,
        data: &Record,
    ) -> Result<CqlStatement> {
        let (predicates, values) = wide_row_key(index, key, data)?;
        Ok(self.statement(
            Operation::Delete {
                table: wide_table_name(definition, index),
                predicates,
                timestamp: None,
            },
            values,
        ))
    }
}

/// Predicates and values addressing one wide row: `id`, `shardid`, then the
/// composite key fields
pub(super) fn wide_row_key(
    index: &Index,
    key: &Value,
    data: &Record,
) -> Result<(Vec<Predicate>, Vec<Value>)> {
    let mut predicates = vec![Predicate::eq(ID_FIELD), Predicate::eq("shardid")];
    let mut values = vec![key.clone(), Value::Int(index.shard_id_for(key)?)];
    for (field, value) in index.composite_key().iter().zip(index.index_values(data)) {
        predicates.push(Predicate::eq(field.clone()));
        values.push(value);
    }
    Ok((predicates, values))
}

/// Every field named by any index, in name order
pub(super) fn indexed_fields(definition: &ObjectDefinition) -> BTreeSet<&str> {
    definition
        .indexes()
        .iter()
        .flat_map(|i| i.composite_key().iter().map(String::as_str))
        .collect()
}

fn declared<'a>(
    definition: &'a ObjectDefinition,
    data: &'a Record,
) -> impl Iterator<Item = (&'a String, &'a Value)> + 'a {
    data.iter()
        .filter(move |(name, _)| name.as_str() != ID_FIELD && definition.field(name).is_some())
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::naming::INDEX_UPDATES_TABLE;
    use std::time::Duration;
    use stratamap_core::{Field, FieldType, ShardingStrategy};

    fn generator() -> CqlGenerator {
        CqlGenerator::new(KEYSPACE, Duration::from_secs(60))
    }

    fn tables(it: StatementIterator) -> Vec<String> {
        it.map(|s| s.table().to_string()).collect()
    }

    fn kinds(it: &StatementIterator) -> Vec<&'static str> {
        it.materialized_list()
            .unwrap()
            .iter()
            .map(|s| match s.operation {
                Operation::Insert { .. } => "insert",
                Operation::Delete { .. } => "delete",
                _ => "other",
            })
            .collect()
    }

    #[test]
    fn test_insert_emits_static_wide_and_shard_index() {
        let def = testtype();
        let it = generator()
            .make_insert(&def, &april_key(), &test_object(), None)
            .unwrap();
        assert!(it.is_bounded());
        // static + 2 monthly indexes with shard index rows + 1 unsharded;
        // the filtered index rejects filtered = 1
        assert_eq!(it.len(), 6);
        let instance_type = wide_table_name(&def, def.index("instance:type").unwrap());
        assert_eq!(
            tables(it),
            vec![
                "testtype".to_string(),
                instance_type,
                SHARD_INDEX_TABLE.to_string(),
                wide_table_name(&def, def.index("foreignid:instance:type").unwrap()),
                SHARD_INDEX_TABLE.to_string(),
                wide_table_name(&def, def.index("foreignid").unwrap()),
            ]
        );
    }

    #[test]
    fn test_shard_index_row_values() {
        let def = testtype();
        let it = generator()
            .make_insert(&def, &april_key(), &test_object(), None)
            .unwrap();
        let shard_row = &it.materialized_list().unwrap()[2];
        assert_eq!(
            shard_row.values,
            vec![
                Value::String(wide_table_name(&def, def.index("instance:type").unwrap())),
                Value::from("222222:5"),
                Value::Int(160),
                Value::from("160:222222:5"),
            ]
        );
    }

    #[test]
    fn test_wide_insert_carries_shard_and_every_field() {
        let def = testtype();
        let it = generator()
            .make_insert(&def, &april_key(), &test_object(), Some(30))
            .unwrap();
        let wide = &it.materialized_list().unwrap()[1];
        match &wide.operation {
            Operation::Insert { columns, ttl, .. } => {
                assert_eq!(columns[..2], ["id".to_string(), "shardid".to_string()]);
                assert_eq!(columns.len(), 2 + test_object().len());
                assert_eq!(*ttl, Some(30));
            }
            other => panic!("expected insert, got {:?}", other),
        }
        assert_eq!(wide.values[1], Value::Int(160));
    }

    #[test]
    fn test_filter_admits_index_when_satisfied() {
        let def = testtype();
        let mut data = test_object();
        data.insert("filtered".to_string(), Value::Int(0));
        let it = generator().make_insert(&def, &april_key(), &data, None).unwrap();
        assert_eq!(it.len(), 8);
    }

    #[test]
    fn test_insert_missing_required_field() {
        let mut data = test_object();
        data.remove("data1");
        let err = generator()
            .make_insert(&testtype(), &april_key(), &data, None)
            .unwrap_err();
        assert!(matches!(err, Error::MissingRequiredField { ref field, .. } if field == "data1"));
    }

    #[test]
    fn test_insert_missing_index_field() {
        let mut data = test_object();
        data.remove("type");
        let err = generator()
            .make_insert(&testtype(), &april_key(), &data, None)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::MissingIndexField { ref index, ref field, .. }
                if index == "instance:type" && field == "type"
        ));
    }

    #[test]
    fn test_null_key_inserts_skip_incomplete_indexes() {
        let def = testtype().with_null_primary_key_inserts(true);
        let mut data = test_object();
        data.remove("type");
        let it = generator().make_insert(&def, &april_key(), &data, None).unwrap();
        // static + foreignid only
        assert_eq!(it.len(), 2);
    }

    #[test]
    fn test_time_bucketed_index_rejects_untimed_key() {
        let def = testtype().with_field(Field::new("id", FieldType::Bigint));
        let err = generator()
            .make_insert(&def, &Value::Int(7), &test_object(), None)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidShardKey { .. }));
    }

    #[test]
    fn test_delete_ordering() {
        let def = testtype();
        let it = generator()
            .make_delete(&def, &april_key(), &test_object())
            .unwrap();
        assert_eq!(kinds(&it), vec!["delete"; 4]);
        let statements = it.materialized_list().unwrap();
        assert_eq!(statements[0].table(), "testtype");
        assert_eq!(
            statements[1].query(),
            format!(
                "DELETE FROM \"testspace\".\"{}\" WHERE id = ? AND shardid = ? AND instance = ? AND type = ?;",
                wide_table_name(&def, def.index("instance:type").unwrap())
            )
        );
        assert_eq!(
            statements[1].values[1..],
            [Value::Int(160), Value::Int(222222), Value::Int(5)]
        );
    }

    #[test]
    fn test_update_without_index_change() {
        let def = testtype();
        let mut changes = Record::new();
        changes.insert("data2".to_string(), Value::from("changed"));
        let it = generator()
            .make_update(&def, &april_key(), &test_object(), &changes, None)
            .unwrap();
        assert_eq!(kinds(&it), vec!["insert"; 6]);
        let statements = it.materialized_list().unwrap();
        assert!(statements.iter().all(|s| s.table() != INDEX_UPDATES_TABLE));
        match &statements[0].operation {
            Operation::Insert { columns, .. } => {
                assert_eq!(columns, &vec!["id".to_string(), "data2".to_string()])
            }
            other => panic!("expected insert, got {:?}", other),
        }
    }

    #[test]
    fn test_update_moving_index_key() {
        let def = ObjectDefinition::new("places")
            .with_field(Field::new("name", FieldType::Text))
            .with_field(Field::new("region", FieldType::Varchar))
            .with_index(Index::new("region", ShardingStrategy::monthly()));
        let index = def.index("region").unwrap();
        let mut old = Record::new();
        old.insert("name".to_string(), Value::from("depot"));
        old.insert("region".to_string(), Value::from("east"));
        let mut changes = Record::new();
        changes.insert("region".to_string(), Value::from("west"));

        let it = generator()
            .make_update(&def, &april_key(), &old, &changes, None)
            .unwrap();
        let statements = it.materialized_list().unwrap();
        let wide = wide_table_name(&def, index);
        let order: Vec<&str> = statements.iter().map(|s| s.table()).collect();
        assert_eq!(
            order,
            vec![wide.as_str(), "places", wide.as_str(), SHARD_INDEX_TABLE, INDEX_UPDATES_TABLE]
        );
        assert!(matches!(statements[0].operation, Operation::Delete { .. }));
        assert_eq!(statements[0].values[2], Value::from("east"));
        assert_eq!(statements[2].values.last(), Some(&Value::from("west")));

        let log = &statements[4];
        let snapshot: serde_json::Value =
            serde_json::from_str(log.values[3].as_str().unwrap()).unwrap();
        assert_eq!(snapshot, serde_json::json!({ "region": "east" }));
    }

    #[test]
    fn test_update_leaving_filtered_index() {
        let def = testtype();
        let mut old = test_object();
        old.insert("filtered".to_string(), Value::Int(0));
        let mut changes = Record::new();
        changes.insert("filtered".to_string(), Value::Int(1));
        let it = generator()
            .make_update(&def, &april_key(), &old, &changes, None)
            .unwrap();
        let statements = it.materialized_list().unwrap();
        let deletes = statements
            .iter()
            .filter(|s| matches!(s.operation, Operation::Delete { .. }))
            .count();
        assert_eq!(deletes, 1);
        assert_eq!(
            statements[0].table(),
            wide_table_name(&def, def.index("instance").unwrap())
        );
        assert_eq!(statements.last().unwrap().table(), INDEX_UPDATES_TABLE);
    }

    #[test]
    fn test_indexed_fields_union() {
        let binding = testtype();
        let fields: Vec<&str> = indexed_fields(&binding).into_iter().collect();
        assert_eq!(fields, vec!["foreignid", "instance", "type"]);
    }
}
