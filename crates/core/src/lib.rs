//! Core types for stratamap
//!
//! This crate defines the foundational types used throughout the system:
//! - Value / Record: dynamically typed field values and field-name keyed rows
//! - Timestamp / TimeId: time handling and time-ordered unique identifiers
//! - Schema: object definitions, fields, composite indexes and their filters
//! - Sharding: mapping time-ordered keys and time windows to shard ids
//! - Criteria: list-by-index query description
//! - Error: closed error enumeration shared by every layer

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod criteria;
pub mod error;
pub mod schema;
pub mod sharding;
pub mod time;
pub mod value;

pub use criteria::{Criteria, SortOrder};
pub use error::{Error, Result};
pub use schema::{
    Field, FieldType, FilterFn, Index, IndexFilter, KeyspaceDefinition, ObjectDefinition, ID_FIELD,
    KEY_SEPARATOR,
};
pub use sharding::{BucketWidth, ShardRange, ShardingStrategy, NONE_SHARD_ID};
pub use time::{TimeId, Timestamp};
pub use value::{Record, Value};
