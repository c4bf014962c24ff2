//! Test modules for the executor crate.


use crate::ObjectMapper;
use std::sync::Arc;
use stratamap_core::{KeyspaceDefinition, Record, Value};
use stratamap_engine::{MapperConfig, MemoryStore};

/// Keyspace used across the executor tests
pub(crate) const KEYSPACE_JSON: &str = r#"{
    "name": "mapper_tests",
    "definitions": [
        {
            "name": "places",
            "fields": [
                {"name": "name", "type": "text", "required": true},
                {"name": "region", "type": "varchar"},
                {"name": "kind", "type": "varchar"},
                {"name": "visits", "type": "bigint"}
            ],
            "indexes": [
                {"key": "region", "sharding": {"type": "time_bucketed", "width": "monthly"}},
                {"key": "kind:region", "sharding": {"type": "none"}}
            ]
        },
        {
            "name": "accounts",
            "fields": [
                {"name": "id", "type": "bigint"},
                {"name": "owner", "type": "varchar"}
            ],
            "indexes": [
                {"key": "owner", "sharding": {"type": "none"}}
            ]
        }
    ]
}"#;

pub(crate) fn keyspace() -> KeyspaceDefinition {
    KeyspaceDefinition::from_json(KEYSPACE_JSON).unwrap()
}

/// Mapper over a fresh in-memory store with every table built
pub(crate) fn create_test_mapper(config: MapperConfig) -> (Arc<MemoryStore>, ObjectMapper) {
    let store = Arc::new(MemoryStore::new());
    let mapper = ObjectMapper::new(store.clone(), keyspace(), config).unwrap();
    mapper.build_keyspace(false).unwrap();
    (store, mapper)
}

pub(crate) fn record(pairs: &[(&str, Value)]) -> Record {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

pub(crate) fn place(name: &str, region: &str, kind: &str) -> Record {
    record(&[
        ("name", Value::from(name)),
        ("region", Value::from(region)),
        ("kind", Value::from(kind)),
    ])
}
