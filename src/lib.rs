//! stratamap - secondary-index object mapper for wide-column stores
//!
//! Objects are described by a [`KeyspaceDefinition`] and stored one row per
//! object, with one wide table per secondary index. Time-bucketed indexes
//! spread their rows across shards so a window query touches only the
//! shards it overlaps.
//!
//! # Quick Start
//!
//! ```ignore
//! use stratamap::{Criteria, MapperConfig, MemoryStore, ObjectMapper, KeyspaceDefinition};
//!
//! let keyspace = KeyspaceDefinition::from_json(SCHEMA)?;
//! let mapper = ObjectMapper::new(Arc::new(MemoryStore::new()), keyspace, MapperConfig::default())?;
//! mapper.build_keyspace(false)?;
//!
//! let id = mapper.insert("places", place)?;
//! let east = mapper.list("places", &Criteria::new("region").key("region", "east"))?;
//! ```
//!
//! # Architecture
//!
//! Applications talk to [`ObjectMapper`]. Statement compilation lives in
//! `stratamap-cql`, execution and reconciliation in `stratamap-engine`.
//! Anything implementing [`Session`] can stand in for the store.

pub use stratamap_executor::*;

pub use stratamap_core::{
    BucketWidth, Field, FieldType, Index, IndexFilter, ObjectDefinition, ShardingStrategy, TimeId,
};
pub use stratamap_cql::{Compaction, CqlGenerator, CqlStatement, ShardIdLookup, StatementIterator};
pub use stratamap_engine::{
    BackgroundScheduler, IndexReconciler, MapperConfig, MemoryStore, ReconcileSummary,
    ReconcilerConfig, Session, CONFIG_FILE_NAME,
};
