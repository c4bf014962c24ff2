//! Prepared-statement cache
//!
//! One cache per keyspace-definition lifetime, owned by the executor and
//! cleared whenever the keyspace is rebuilt.

use crate::session::PreparedStatement;
use dashmap::DashMap;
use stratamap_core::Result;

/// Prepared statements keyed by query text
#[derive(Debug, Default)]
pub struct StatementCache {
    prepared: DashMap<String, PreparedStatement>,
}

impl StatementCache {
    /// Empty cache
    pub fn new() -> Self {
        StatementCache::default()
    }

    /// Cached statement for `query`, preparing it on a miss.
    ///
    /// Two threads missing at once may both prepare; the last insert wins
    /// and both handles stay valid.
    pub fn get_or_prepare<F>(&self, query: &str, prepare: F) -> Result<PreparedStatement>
    where
        F: FnOnce() -> Result<PreparedStatement>,
    {
        if let Some(hit) = self.prepared.get(query) {
            return Ok(hit.value().clone());
        }
        let prepared = prepare()?;
        self.prepared.insert(query.to_string(), prepared.clone());
        Ok(prepared)
    }

    /// Number of cached statements
    pub fn len(&self) -> usize {
        self.prepared.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.prepared.is_empty()
    }

    /// Drop every cached statement
    pub fn clear(&self) {
        self.prepared.clear();
    }
}
