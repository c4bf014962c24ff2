//! Object definitions

use super::field::{Field, FieldType};
use super::index::Index;
use crate::error::{Error, Result};
use crate::value::{Record, Value};
use serde::{Deserialize, Serialize};

/// Name of the primary key column
pub const ID_FIELD: &str = "id";

/// Schema of one object type: its fields, indexes and insert policy
///
/// The primary key is the `id` column. It is a time-ordered id unless the
/// definition declares an `id` field of another type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDefinition {
    name: String,
    #[serde(default)]
    fields: Vec<Field>,
    #[serde(default)]
    indexes: Vec<Index>,
    #[serde(default)]
    allow_null_primary_key_inserts: bool,
}

impl ObjectDefinition {
    /// Empty definition
    pub fn new(name: impl Into<String>) -> Self {
        ObjectDefinition {
            name: name.into(),
            fields: Vec::new(),
            indexes: Vec::new(),
            allow_null_primary_key_inserts: false,
        }
    }

    /// Add a field; a field of the same name is replaced in place
    pub fn with_field(mut self, field: Field) -> Self {
        match self.fields.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
        self
    }

    /// Add an index
    pub fn with_index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    /// Accept inserts that lack an index's key fields, skipping that index
    pub fn with_null_primary_key_inserts(mut self, allow: bool) -> Self {
        self.allow_null_primary_key_inserts = allow;
        self
    }

    /// Object (static table) name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared fields in declaration order
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Declared fields other than the primary key
    pub fn data_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.name != ID_FIELD)
    }

    /// Field by name
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Indexes in declaration order
    pub fn indexes(&self) -> &[Index] {
        &self.indexes
    }

    /// Index by name
    pub fn index(&self, name: &str) -> Result<&Index> {
        self.indexes
            .iter()
            .find(|i| i.name() == name)
            .ok_or_else(|| Error::unknown_index(&self.name, name))
    }

    /// Whether an insert may skip indexes whose key fields are missing
    pub fn allow_null_primary_key_inserts(&self) -> bool {
        self.allow_null_primary_key_inserts
    }

    /// Fields every insert must supply
    pub fn required_fields(&self) -> impl Iterator<Item = &Field> {
        self.data_fields().filter(|f| f.required)
    }

    /// Type of the `id` column
    pub fn primary_key_type(&self) -> FieldType {
        self.field(ID_FIELD)
            .map(|f| f.field_type)
            .unwrap_or(FieldType::Timeuuid)
    }

    /// Fail with the first required field absent from `data`
    pub fn validate_required(&self, data: &Record) -> Result<()> {
        match self.required_fields().find(|f| !data.contains_key(&f.name)) {
            Some(missing) => Err(Error::missing_required_field(&self.name, &missing.name)),
            None => Ok(()),
        }
    }

    /// Coerce declared fields to their types, dropping undeclared ones
    pub fn coerce_record(&self, data: Record) -> Result<Record> {
        let mut out = Record::new();
        for (name, value) in data {
            if let Some(field) = self.field(&name) {
                out.insert(name, field.coerce(value)?);
            }
        }
        Ok(out)
    }

    /// Coerce a primary key to the `id` column type
    pub fn coerce_key(&self, key: Value) -> Result<Value> {
        match self.field(ID_FIELD) {
            Some(field) => field.coerce(key),
            None => Field::new(ID_FIELD, FieldType::Timeuuid).coerce(key),
        }
    }

    // =========================================================================
    // Migration
    // =========================================================================

    /// Replace the index set (migration only)
    pub fn set_indexes(&mut self, indexes: Vec<Index>) {
        self.indexes = indexes;
    }

    /// Change the null-key insert policy (migration only)
    pub fn set_allow_null_primary_key_inserts(&mut self, allow: bool) {
        self.allow_null_primary_key_inserts = allow;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sharding::ShardingStrategy;
    use crate::time::TimeId;

    fn testtype() -> ObjectDefinition {
        ObjectDefinition::new("testtype")
            .with_field(Field::new("filtered", FieldType::Int))
            .with_field(Field::new("data1", FieldType::Varchar).required())
            .with_field(Field::new("instance", FieldType::Bigint))
            .with_field(Field::new("type", FieldType::Int))
            .with_index(Index::new("instance:type", ShardingStrategy::monthly()))
    }

    #[test]
    fn test_required_fields() {
        let def = testtype();
        let required: Vec<_> = def.required_fields().map(|f| f.name.as_str()).collect();
        assert_eq!(required, vec!["data1"]);

        let err = def.validate_required(&Record::new()).unwrap_err();
        assert_eq!(err, Error::missing_required_field("testtype", "data1"));
    }

    #[test]
    fn test_unknown_index() {
        let err = testtype().index("nope").unwrap_err();
        assert!(matches!(err, Error::UnknownIndex { .. }));
    }

    #[test]
    fn test_primary_key_type() {
        assert_eq!(testtype().primary_key_type(), FieldType::Timeuuid);
        let def = testtype().with_field(Field::new("id", FieldType::Varchar));
        assert_eq!(def.primary_key_type(), FieldType::Varchar);
        assert_eq!(def.data_fields().count(), 4);
    }

    #[test]
    fn test_coerce_record_drops_undeclared() {
        let mut data = Record::new();
        data.insert("instance".to_string(), Value::from("222222"));
        data.insert("bogus".to_string(), Value::from("x"));
        let out = testtype().coerce_record(data).unwrap();
        assert_eq!(out.get("instance"), Some(&Value::Int(222222)));
        assert!(!out.contains_key("bogus"));
    }

    #[test]
    fn test_coerce_key() {
        let id = TimeId::now();
        let key = testtype().coerce_key(Value::from(id.to_string())).unwrap();
        assert_eq!(key, Value::from(id));
    }
}
