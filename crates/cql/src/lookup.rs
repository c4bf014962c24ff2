//! Shard discovery collaborator

use stratamap_core::{Index, ObjectDefinition, Record, Result, SortOrder, Timestamp};

/// Lists the shards that actually hold rows for an index key.
///
/// The compiler consults it when a list query on a time-bucketed index has
/// no window start, instead of scanning every shard since the epoch. The
/// object mapper implements it over the shard-index table.
pub trait ShardIdLookup {
    /// Shard ids for `index_values` on `index`, in `ordering`, limited to
    /// shards between `start` (when given) and `end`.
    fn list_shard_ids(
        &self,
        definition: &ObjectDefinition,
        index: &Index,
        index_values: &Record,
        ordering: SortOrder,
        start: Option<Timestamp>,
        end: Timestamp,
    ) -> Result<Vec<i64>>;
}
