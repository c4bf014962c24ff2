//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::Arc;
pub use stratamap::*;

pub const KS: &str = "scenarios";

/// `notes` carries one required text field and a monthly `region` index.
/// `tickets` has a bigint key and an unsharded index on `(queue, state)`.
pub const SCHEMA: &str = r#"{
    "name": "scenarios",
    "definitions": [
        {
            "name": "notes",
            "fields": [
                {"name": "body", "type": "text", "required": true},
                {"name": "region", "type": "varchar"}
            ],
            "indexes": [
                {"key": "region", "sharding": {"type": "time_bucketed", "width": "monthly"}}
            ]
        },
        {
            "name": "tickets",
            "fields": [
                {"name": "id", "type": "bigint"},
                {"name": "queue", "type": "varchar"},
                {"name": "state", "type": "varchar"},
                {"name": "priority", "type": "int"}
            ],
            "indexes": [
                {"key": "queue:state", "sharding": {"type": "none"}}
            ]
        }
    ]
}"#;

pub struct TestMapper {
    pub store: Arc<MemoryStore>,
    pub mapper: ObjectMapper,
}

impl TestMapper {
    pub fn new() -> Self {
        Self::with_config(MapperConfig::default())
    }

    pub fn with_config(config: MapperConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let keyspace = KeyspaceDefinition::from_json(SCHEMA).unwrap();
        let mapper = ObjectMapper::new(store.clone(), keyspace, config).unwrap();
        mapper.build_keyspace(false).unwrap();
        TestMapper { store, mapper }
    }

    /// Rows currently stored in the wide table of `index`
    pub fn wide_rows(&self, object_type: &str, index: &str) -> Vec<Record> {
        let definition = self.mapper.definition(object_type).unwrap();
        let table = stratamap_cql::wide_table_name(&definition, definition.index(index).unwrap());
        self.store.rows(KS, &table).unwrap()
    }

    pub fn log_rows(&self) -> Vec<Record> {
        self.store.rows(KS, stratamap_cql::INDEX_UPDATES_TABLE).unwrap()
    }
}

pub fn record(pairs: &[(&str, Value)]) -> Record {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

pub fn note(body: &str, region: &str) -> Record {
    record(&[("body", Value::from(body)), ("region", Value::from(region))])
}
