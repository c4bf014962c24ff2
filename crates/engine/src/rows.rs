//! Row mapping

use crate::session::Row;
use stratamap_core::{ObjectDefinition, Record, ID_FIELD};

/// Map a static or wide row onto the object shape: `id` plus the declared
/// fields present in the row. Storage columns such as `shardid` are dropped.
pub fn map_row(definition: &ObjectDefinition, mut row: Row) -> Record {
    let mut object = Record::new();
    if let Some(id) = row.remove(ID_FIELD) {
        object.insert(ID_FIELD.to_string(), id);
    }
    for field in definition.data_fields() {
        if let Some(value) = row.remove(&field.name) {
            object.insert(field.name.clone(), value);
        }
    }
    object
}

/// Whether `object` carries every client filter value
pub fn matches_filters(object: &Record, filters: &Record) -> bool {
    filters.iter().all(|(field, expected)| {
        object
            .get(field)
            .map(|actual| actual == expected)
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use stratamap_core::{Field, FieldType, Value};

    fn definition() -> ObjectDefinition {
        ObjectDefinition::new("places")
            .with_field(Field::new("name", FieldType::Text))
            .with_field(Field::new("region", FieldType::Varchar))
    }

    #[test]
    fn test_map_row_drops_storage_columns() {
        let mut row = Row::new();
        row.insert("id".to_string(), Value::Int(1));
        row.insert("shardid".to_string(), Value::Int(160));
        row.insert("region".to_string(), Value::from("east"));
        let object = map_row(&definition(), row);
        assert_eq!(object.len(), 2);
        assert_eq!(object["region"], Value::from("east"));
        assert!(!object.contains_key("shardid"));
    }

    #[test]
    fn test_matches_filters() {
        let mut object = Record::new();
        object.insert("region".to_string(), Value::from("east"));
        let mut filters = Record::new();
        filters.insert("region".to_string(), Value::from("east"));
        assert!(matches_filters(&object, &filters));
        filters.insert("name".to_string(), Value::from("depot"));
        assert!(!matches_filters(&object, &filters));
    }

    proptest! {
        #[test]
        fn prop_object_matches_any_subset_of_itself(
            pairs in prop::collection::btree_map("[a-z]{1,6}", any::<i64>(), 0..8),
            keep in any::<u8>(),
        ) {
            let object: Record = pairs
                .iter()
                .map(|(k, v)| (k.clone(), Value::Int(*v)))
                .collect();
            let filters: Record = object
                .iter()
                .enumerate()
                .filter(|(i, _)| keep & (1 << (i % 8)) != 0)
                .map(|(_, (k, v))| (k.clone(), v.clone()))
                .collect();
            prop_assert!(matches_filters(&object, &filters));
        }
    }
}
