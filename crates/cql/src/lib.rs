//! Statement compilation for stratamap
//!
//! Turns object definitions, data and criteria into ordered statements
//! against the denormalized physical layout:
//! - one static table per object type, keyed by `id`
//! - one wide table per index, partitioned by `(shardid, <index fields>)`
//!   and clustered by `id`
//! - the shared `__shardindex`, `__index_updates` and
//!   `__keyspace_definitions` bookkeeping tables
//!
//! Nothing in this crate performs I/O. Statements are handed to an
//! execution layer through [`StatementIterator`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod format;
pub mod generator;
pub mod iterator;
pub mod lookup;
pub mod naming;
pub mod statement;
pub mod update_log;

pub use generator::CqlGenerator;
pub use iterator::{BoundedStatements, ShardScan, StatementIterator};
pub use lookup::ShardIdLookup;
pub use naming::{
    static_table_name, wide_table_name, INDEX_UPDATES_TABLE, KEYSPACE_DEFINITIONS_TABLE,
    SHARD_INDEX_TABLE,
};
pub use statement::{
    ColumnDef, Compaction, Comparison, CqlStatement, Operation, Predicate, Selection, TableSchema,
    Target,
};
pub use update_log::{IndexUpdateRow, IndexUpdateRowKey};
