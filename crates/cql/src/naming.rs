//! Physical table names

use stratamap_core::{Index, ObjectDefinition};
use xxhash_rust::xxh3::xxh3_128;

/// Shard-index table: which shards hold rows for a wide-table index key
pub const SHARD_INDEX_TABLE: &str = "__shardindex";

/// Reconciliation log
pub const INDEX_UPDATES_TABLE: &str = "__index_updates";

/// Persisted keyspace definitions
pub const KEYSPACE_DEFINITIONS_TABLE: &str = "__keyspace_definitions";

/// Characters of the object name kept in a wide-table name
pub const WIDE_NAME_OBJECT_LEN: usize = 8;

/// Characters of the index name kept in a wide-table name
pub const WIDE_NAME_INDEX_LEN: usize = 8;

/// Upper bound on wide-table name length
pub const MAX_TABLE_NAME_LEN: usize = 48;

/// Static table name: the object name
pub fn static_table_name(definition: &ObjectDefinition) -> &str {
    definition.name()
}

/// Wide table name for `index`.
///
/// Up to 8 characters of the object name, up to 8 identifier characters of
/// the index name, then 32 hex digits of a 128-bit hash of the composite key
/// string. Separators in the index name are dropped.
pub fn wide_table_name(definition: &ObjectDefinition, index: &Index) -> String {
    let object: String = definition.name().chars().take(WIDE_NAME_OBJECT_LEN).collect();
    let index_segment: String = index
        .name()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .take(WIDE_NAME_INDEX_LEN)
        .collect();
    format!("{}{}{:032x}", object, index_segment, xxh3_128(index.key().as_bytes()))
}
