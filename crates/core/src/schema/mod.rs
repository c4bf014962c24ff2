//! Schema model
//!
//! - [`KeyspaceDefinition`]: every object type a mapper serves
//! - [`ObjectDefinition`]: one object type (static table plus wide tables)
//! - [`Field`] / [`FieldType`]: typed columns
//! - [`Index`] / [`IndexFilter`]: composite secondary indexes and their gates
//!
//! Definitions are loaded once and read-only afterwards; only a migration
//! changes an object's index set or null-key policy.

mod definition;
mod field;
mod filter;
mod index;
mod keyspace;

pub use definition::{ObjectDefinition, ID_FIELD};
pub use field::{Field, FieldType};
pub use filter::{FilterFn, IndexFilter};
pub use index::{Index, KEY_SEPARATOR};
pub use keyspace::KeyspaceDefinition;
