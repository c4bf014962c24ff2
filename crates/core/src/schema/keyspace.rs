//! Keyspace definitions: the full schema an object mapper serves

use super::definition::ObjectDefinition;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_replication_class() -> String {
    "SimpleStrategy".to_string()
}

fn default_replication_factors() -> BTreeMap<String, u32> {
    let mut factors = BTreeMap::new();
    factors.insert("replication_factor".to_string(), 1);
    factors
}

fn default_consistency_level() -> String {
    "ONE".to_string()
}

/// Named set of object definitions plus keyspace-level settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyspaceDefinition {
    /// Keyspace name
    pub name: String,
    /// Replication strategy class
    #[serde(default = "default_replication_class")]
    pub replication_class: String,
    /// Replication factors (per data center, or `replication_factor`)
    #[serde(default = "default_replication_factors")]
    pub replication_factors: BTreeMap<String, u32>,
    /// Consistency level name used for statements
    #[serde(default = "default_consistency_level")]
    pub consistency_level: String,
    /// Object definitions in declaration order
    #[serde(default)]
    pub definitions: Vec<ObjectDefinition>,
}

impl KeyspaceDefinition {
    /// Empty keyspace with default settings
    pub fn new(name: impl Into<String>) -> Self {
        KeyspaceDefinition {
            name: name.into(),
            replication_class: default_replication_class(),
            replication_factors: default_replication_factors(),
            consistency_level: default_consistency_level(),
            definitions: Vec::new(),
        }
    }

    /// Add an object definition, replacing one of the same name
    pub fn with_definition(mut self, definition: ObjectDefinition) -> Self {
        match self
            .definitions
            .iter_mut()
            .find(|d| d.name() == definition.name())
        {
            Some(existing) => *existing = definition,
            None => self.definitions.push(definition),
        }
        self
    }

    /// Definition by object type name
    pub fn definition(&self, object_type: &str) -> Result<&ObjectDefinition> {
        self.definitions
            .iter()
            .find(|d| d.name() == object_type)
            .ok_or_else(|| Error::unknown_object_type(object_type))
    }

    /// Mutable definition by object type name (migration only)
    pub fn definition_mut(&mut self, object_type: &str) -> Result<&mut ObjectDefinition> {
        self.definitions
            .iter_mut()
            .find(|d| d.name() == object_type)
            .ok_or_else(|| Error::unknown_object_type(object_type))
    }

    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to JSON; custom closure filters are omitted
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;
    use crate::sharding::ShardingStrategy;

    const FIXTURE: &str = r#"{
        "name": "testspace",
        "consistency_level": "QUORUM",
        "definitions": [
            {
                "name": "testtype",
                "fields": [
                    {"name": "data1", "type": "varchar", "required": true},
                    {"name": "foreignid", "type": "bigint"},
                    {"name": "instance", "type": "bigint"},
                    {"name": "type", "type": "int"}
                ],
                "indexes": [
                    {"key": "foreignid", "sharding": {"type": "none"}},
                    {"key": "instance:type", "sharding": {"type": "time_bucketed", "width": "monthly"}}
                ]
            }
        ]
    }"#;

    #[test]
    fn test_from_json_fixture() {
        let ks = KeyspaceDefinition::from_json(FIXTURE).unwrap();
        assert_eq!(ks.name, "testspace");
        assert_eq!(ks.consistency_level, "QUORUM");
        assert_eq!(ks.replication_class, "SimpleStrategy");
        let def = ks.definition("testtype").unwrap();
        assert_eq!(def.fields().len(), 4);
        assert_eq!(def.field("type").unwrap().field_type, FieldType::Int);
        assert_eq!(
            def.index("instance:type").unwrap().sharding(),
            ShardingStrategy::monthly()
        );
    }

    #[test]
    fn test_json_round_trip() {
        let ks = KeyspaceDefinition::from_json(FIXTURE).unwrap();
        let back = KeyspaceDefinition::from_json(&ks.to_json().unwrap()).unwrap();
        assert_eq!(back, ks);
    }

    #[test]
    fn test_unknown_object_type() {
        let ks = KeyspaceDefinition::new("ks");
        assert!(matches!(
            ks.definition("nope"),
            Err(Error::UnknownObjectType { .. })
        ));
    }

    #[test]
    fn test_malformed_json_is_serialization_error() {
        assert!(matches!(
            KeyspaceDefinition::from_json("{"),
            Err(Error::Serialization(_))
        ));
    }
}
