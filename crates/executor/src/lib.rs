//! # stratamap executor
//!
//! The application-facing API: [`ObjectMapper`] stores schema-described
//! objects in a wide-column store and keeps their secondary indexes in sync.
//!
//! ## Quick Start
//!
//! ```text
//! use stratamap_executor::{Criteria, ObjectMapper};
//!
//! let mapper = ObjectMapper::new(session, keyspace, MapperConfig::default())?;
//! mapper.build_keyspace(false)?;
//!
//! let id = mapper.insert("places", place)?;
//! let east = mapper.list("places", &Criteria::new("region").key("region", "east"))?;
//! ```
//!
//! ## Layout
//!
//! | Table | Holds |
//! |-------|-------|
//! | `<object>` | One row per object, keyed by `id` |
//! | `<object prefix><hash>` | One wide table per index, partitioned by shard and key |
//! | `__shardindex` | Shards holding rows for each time-bucketed index key |
//! | `__index_updates` | Prior index keys awaiting reconciliation |

#![warn(missing_docs)]

mod mapper;
mod migration;
mod visitor;

#[cfg(test)]
mod tests;

pub use mapper::ObjectMapper;
pub use migration::{AdditiveMigrator, KeyspaceMigrator};
pub use visitor::ObjectVisitor;

pub use stratamap_core::{Criteria, Error, KeyspaceDefinition, Record, Result, SortOrder, Timestamp, Value};
