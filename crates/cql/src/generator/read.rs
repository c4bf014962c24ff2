//! Select compilation

use super::CqlGenerator;
use crate::iterator::StatementIterator;
use crate::lookup::ShardIdLookup;
use crate::naming::{static_table_name, wide_table_name, SHARD_INDEX_TABLE};
use crate::statement::{Comparison, CqlStatement, Operation, Predicate, Selection};
use stratamap_core::{
    Criteria, Error, FieldType, Index, ObjectDefinition, Record, Result, ShardingStrategy,
    SortOrder, TimeId, Timestamp, Value, ID_FIELD, NONE_SHARD_ID,
};
use tracing::debug;

impl CqlGenerator {
    /// Fetch one object from its static table
    pub fn make_get(&self, definition: &ObjectDefinition, key: &Value) -> StatementIterator {
        StatementIterator::bounded(vec![self.statement(
            Operation::Select {
                table: static_table_name(definition).to_string(),
                selection: Selection::All,
                predicates: vec![Predicate::eq(ID_FIELD)],
                order: None,
                limit: None,
                allow_filtering: false,
            },
            vec![key.clone()],
        )])
    }

    /// Read every row of the static table
    pub fn make_table_scan(&self, definition: &ObjectDefinition) -> StatementIterator {
        StatementIterator::bounded(vec![self.statement(
            Operation::Select {
                table: static_table_name(definition).to_string(),
                selection: Selection::All,
                predicates: Vec::new(),
                order: None,
                limit: None,
                allow_filtering: false,
            },
            Vec::new(),
        )])
    }

    /// Compile an index query.
    ///
    /// The criteria keys must form the index's composite key exactly, unless
    /// `allow_filtering` is set, in which case they must cover it and the
    /// surplus keys are returned as client-side filters. A query confined to
    /// one shard compiles to a single bounded select; anything wider becomes
    /// a shard scan. With `count` the store counts rows instead of
    /// returning them, provided no client filters apply.
    ///
    /// Without a window start, a time-bucketed index asks `lookup` for the
    /// shards that hold the key, or scans every shard since the epoch when
    /// there is no lookup.
    pub fn make_list(
        &self,
        definition: &ObjectDefinition,
        criteria: &Criteria,
        count: bool,
        lookup: Option<&dyn ShardIdLookup>,
    ) -> Result<StatementIterator> {
        let index = definition.index(&criteria.index)?;
        let keys = coerce_keys(definition, &criteria.keys)?;
        let (index_keys, client_filters) = if criteria.allow_filtering {
            if !index.has_complete_key(&keys) {
                return Err(Error::unsatisfiable_index_keys(definition.name(), index.name()));
            }
            let (index_keys, extra): (Record, Record) = keys
                .into_iter()
                .partition(|(field, _)| index.composite_key().contains(field));
            (index_keys, (!extra.is_empty()).then_some(extra))
        } else {
            if !index.validate_index_keys(&keys) {
                return Err(Error::unsatisfiable_index_keys(definition.name(), index.name()));
            }
            (keys, None)
        };

        let end = criteria.end.unwrap_or_else(Timestamp::now);
        if let Some(start) = criteria.start {
            if start > end {
                return Err(Error::InvalidShardRange {
                    start_millis: start.as_millis() as i64,
                    end_millis: end.as_millis() as i64,
                });
            }
        }
        let shards = match (index.sharding(), criteria.start) {
            (ShardingStrategy::None, _) => vec![NONE_SHARD_ID],
            (sharding, Some(start)) => sharding.shard_range(start, end)?.ids(criteria.ordering),
            (sharding, None) => match lookup {
                Some(lookup) => lookup.list_shard_ids(
                    definition,
                    index,
                    &index_keys,
                    criteria.ordering,
                    None,
                    end,
                )?,
                None => sharding
                    .shard_range(Timestamp::EPOCH, end)?
                    .ids(criteria.ordering),
            },
        };

        let mut predicates = vec![Predicate::eq("shardid")];
        let mut values = Vec::new();
        for (field, value) in index.composite_key().iter().zip(index.index_values(&index_keys)) {
            predicates.push(Predicate::eq(field.clone()));
            values.push(value);
        }
        if definition.primary_key_type() == FieldType::Timeuuid {
            if let Some(start) = criteria.start {
                predicates.push(Predicate::column(ID_FIELD, Comparison::Ge));
                values.push(Value::from(TimeId::start_of(start)));
            }
            predicates.push(Predicate::column(ID_FIELD, Comparison::Le));
            values.push(Value::from(TimeId::end_of(end)));
        }

        let server_count = count && client_filters.is_none();
        let template = self.statement(
            Operation::Select {
                table: wide_table_name(definition, index),
                selection: if server_count { Selection::Count } else { Selection::All },
                predicates,
                order: (!server_count).then(|| (ID_FIELD.to_string(), criteria.ordering)),
                limit: (criteria.limit > 0 && client_filters.is_none()).then_some(criteria.limit),
                allow_filtering: criteria.allow_filtering,
            },
            values,
        );
        debug!(target: "stratamap::cql", index = index.name(), shards = shards.len(), count, "Compiled list");

        let iterator = match shards.as_slice() {
            [shard] => {
                let mut statement = template;
                statement.values.insert(0, Value::Int(*shard));
                StatementIterator::bounded(vec![statement])
            }
            _ => StatementIterator::scan(template, shards, criteria.limit),
        };
        Ok(iterator.with_client_filters(client_filters))
    }

    /// Shards recorded in the shard index for `index_values`, in `ordering`,
    /// bounded by the shards of `start` (when given) and `end`
    pub fn make_get_shard_index_list(
        &self,
        definition: &ObjectDefinition,
        index: &Index,
        index_values: &Record,
        ordering: SortOrder,
        start: Option<Timestamp>,
        end: Timestamp,
    ) -> Result<CqlStatement> {
        let mut predicates = vec![Predicate::eq("tablename"), Predicate::eq("indexvalues")];
        let mut values = vec![
            Value::String(wide_table_name(definition, index)),
            Value::String(index.encode_index_values(index_values)),
        ];
        if let Some(start) = start {
            predicates.push(Predicate::column("shardid", Comparison::Ge));
            values.push(Value::Int(index.sharding().shard_for_time(start)?));
        }
        predicates.push(Predicate::column("shardid", Comparison::Le));
        values.push(Value::Int(index.sharding().shard_for_time(end)?));
        Ok(self.statement(
            Operation::Select {
                table: SHARD_INDEX_TABLE.to_string(),
                selection: Selection::Columns(vec!["shardid".to_string()]),
                predicates,
                order: Some(("shardid".to_string(), ordering)),
                limit: None,
                allow_filtering: false,
            },
            values,
        ))
    }
}

fn coerce_keys(definition: &ObjectDefinition, keys: &Record) -> Result<Record> {
    keys.iter()
        .map(|(name, value)| {
            let coerced = match definition.field(name) {
                Some(field) => field.coerce(value.clone())?,
                None => value.clone(),
            };
            Ok((name.clone(), coerced))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use std::cell::RefCell;
    use std::time::Duration;

    fn generator() -> CqlGenerator {
        CqlGenerator::new(KEYSPACE, Duration::from_secs(1))
    }

    fn jan(year: i32) -> Timestamp {
        use chrono::{TimeZone, Utc};
        let millis = Utc
            .with_ymd_and_hms(year, 1, 15, 0, 0, 0)
            .single()
            .unwrap()
            .timestamp_millis();
        Timestamp::from_millis(millis as u64)
    }

    fn instance_type() -> Criteria {
        Criteria::new("instance:type")
            .key("instance", 222222i64)
            .key("type", 5i64)
    }

    fn limit_of(statement: &CqlStatement) -> Option<u64> {
        match &statement.operation {
            Operation::Select { limit, .. } => *limit,
            _ => None,
        }
    }

    #[test]
    fn test_get_by_key() {
        let it = generator().make_get(&testtype(), &april_key());
        let statements = it.materialized_list().unwrap();
        assert_eq!(statements[0].query(), "SELECT * FROM \"testspace\".\"testtype\" WHERE id = ?;");
        assert_eq!(statements[0].values, vec![april_key()]);
    }

    #[test]
    fn test_list_single_shard_is_bounded() {
        let def = testtype();
        let at = Timestamp::from_millis(APRIL_2013_MS);
        let criteria = instance_type()
            .start(at.saturating_sub(Duration::from_secs(1)))
            .end(at.saturating_add(Duration::from_secs(1)));
        let it = generator().make_list(&def, &criteria, false, None).unwrap();
        assert!(it.is_bounded());
        let statement = &it.materialized_list().unwrap()[0];
        assert_eq!(
            statement.query(),
            format!(
                "SELECT * FROM \"testspace\".\"{}\" WHERE shardid = ? AND instance = ? AND type = ? AND id >= ? AND id <= ? ORDER BY id DESC;",
                wide_table_name(&def, def.index("instance:type").unwrap())
            )
        );
        assert_eq!(statement.values[..3], [Value::Int(160), Value::Int(222222), Value::Int(5)]);
    }

    #[test]
    fn test_list_across_a_year_scans_thirteen_shards() {
        let criteria = instance_type().start(jan(2011)).end(jan(2012)).limit(10);
        let mut it = generator().make_list(&testtype(), &criteria, false, None).unwrap();
        assert!(!it.is_bounded());
        assert_eq!(it.len(), 13);

        assert!(it.has_next(0));
        let first = it.next().unwrap();
        assert_eq!(first.values[0], Value::Int(145));
        assert_eq!(limit_of(&first), Some(10));

        assert!(it.has_next(5));
        let second = it.next().unwrap();
        assert_eq!(second.values[0], Value::Int(144));
        assert_eq!(limit_of(&second), Some(5));

        assert!(!it.has_next(10));
    }

    #[test]
    fn test_list_ascending_starts_at_oldest_shard() {
        let criteria = instance_type()
            .start(jan(2011))
            .end(jan(2012))
            .ordering(SortOrder::Ascending);
        let mut it = generator().make_list(&testtype(), &criteria, false, None).unwrap();
        assert_eq!(it.next().unwrap().values[0], Value::Int(133));
    }

    #[test]
    fn test_list_unsharded_index() {
        let criteria = Criteria::new("foreignid").key("foreignid", 777i64);
        let it = generator().make_list(&testtype(), &criteria, false, None).unwrap();
        assert!(it.is_bounded());
        assert_eq!(it.materialized_list().unwrap()[0].values[0], Value::Int(NONE_SHARD_ID));
    }

    #[test]
    fn test_list_rejects_incomplete_keys() {
        let criteria = Criteria::new("instance:type").key("instance", 222222i64);
        let err = generator().make_list(&testtype(), &criteria, false, None).unwrap_err();
        assert!(matches!(err, Error::UnsatisfiableIndexKeys { .. }));
    }

    #[test]
    fn test_list_rejects_surplus_keys_without_filtering() {
        let criteria = instance_type().key("foreignid", 777i64);
        let err = generator().make_list(&testtype(), &criteria, false, None).unwrap_err();
        assert!(matches!(err, Error::UnsatisfiableIndexKeys { .. }));
    }

    #[test]
    fn test_list_unknown_index() {
        let err = generator()
            .make_list(&testtype(), &Criteria::new("nope"), false, None)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownIndex { .. }));
    }

    #[test]
    fn test_list_reversed_window() {
        let criteria = instance_type().start(jan(2012)).end(jan(2011));
        let err = generator().make_list(&testtype(), &criteria, false, None).unwrap_err();
        assert!(matches!(err, Error::InvalidShardRange { .. }));
    }

    #[test]
    fn test_allow_filtering_splits_client_filters() {
        let criteria = instance_type()
            .key("data1", "This is data one")
            .start(jan(2013))
            .end(jan(2013))
            .limit(3)
            .allow_filtering(true);
        let it = generator().make_list(&testtype(), &criteria, true, None).unwrap();
        let filters = it.client_filters().unwrap();
        assert_eq!(filters.len(), 1);
        assert_eq!(filters["data1"], Value::from("This is data one"));
        let statement = &it.materialized_list().unwrap()[0];
        let query = statement.query();
        // rows come back for client-side filtering, unlimited
        assert!(query.starts_with("SELECT * FROM"));
        assert!(query.ends_with("ORDER BY id DESC ALLOW FILTERING;"));
        assert_eq!(limit_of(statement), None);
    }

    #[test]
    fn test_count_selects_count() {
        let criteria = Criteria::new("foreignid").key("foreignid", 777i64).limit(4);
        let it = generator().make_list(&testtype(), &criteria, true, None).unwrap();
        assert!(it.materialized_list().unwrap()[0]
            .query()
            .starts_with("SELECT COUNT(*) FROM"));
        assert!(it.materialized_list().unwrap()[0].query().ends_with("LIMIT 4;"));
    }

    struct FixedShards {
        seen: RefCell<Option<String>>,
    }

    impl ShardIdLookup for FixedShards {
        fn list_shard_ids(
            &self,
            definition: &ObjectDefinition,
            index: &Index,
            index_values: &Record,
            _ordering: SortOrder,
            start: Option<Timestamp>,
            _end: Timestamp,
        ) -> Result<Vec<i64>> {
            assert!(start.is_none());
            *self.seen.borrow_mut() = Some(format!(
                "{}/{}",
                definition.name(),
                index.encode_index_values(index_values)
            ));
            Ok(vec![160, 150])
        }
    }

    #[test]
    fn test_open_start_consults_shard_lookup() {
        let lookup = FixedShards {
            seen: RefCell::new(None),
        };
        let it = generator()
            .make_list(&testtype(), &instance_type(), false, Some(&lookup))
            .unwrap();
        assert_eq!(it.len(), 2);
        assert_eq!(lookup.seen.borrow().as_deref(), Some("testtype/222222:5"));
        let shards: Vec<Value> = it.map(|s| s.values[0].clone()).collect();
        assert_eq!(shards, vec![Value::Int(160), Value::Int(150)]);
    }

    #[test]
    fn test_open_start_without_lookup_scans_from_epoch() {
        let criteria = instance_type().end(jan(2000));
        let it = generator().make_list(&testtype(), &criteria, false, None).unwrap();
        // January 1970 through January 2000
        assert_eq!(it.len(), 30 * 12 + 1);
    }

    #[test]
    fn test_shard_index_list() {
        let def = testtype();
        let index = def.index("instance:type").unwrap();
        let mut values = Record::new();
        values.insert("instance".to_string(), Value::Int(222222));
        values.insert("type".to_string(), Value::Int(5));
        let stmt = generator()
            .make_get_shard_index_list(&def, index, &values, SortOrder::Descending, Some(jan(2011)), jan(2012))
            .unwrap();
        assert_eq!(
            stmt.query(),
            "SELECT shardid FROM \"testspace\".\"__shardindex\" WHERE tablename = ? AND indexvalues = ? AND shardid >= ? AND shardid <= ? ORDER BY shardid DESC;"
        );
        assert_eq!(stmt.values[1..], [Value::from("222222:5"), Value::Int(133), Value::Int(145)]);
    }
}
