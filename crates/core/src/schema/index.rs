//! Composite secondary indexes

use super::filter::IndexFilter;
use crate::error::Result;
use crate::sharding::ShardingStrategy;
use crate::value::{Record, Value};
use serde::{Deserialize, Serialize};

/// Separator between fields in a key spec and between encoded key values
pub const KEY_SEPARATOR: char = ':';

const ESCAPE: char = '\\';

/// A composite secondary index
///
/// The key spec `"foreignid:instance:type"` declares an ordered composite
/// key; the order defines the physical wide table's partition key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "IndexSpec", into = "IndexSpec")]
pub struct Index {
    name: String,
    key: String,
    composite_key: Vec<String>,
    filters: Vec<IndexFilter>,
    sharding: ShardingStrategy,
}

#[derive(Serialize, Deserialize)]
struct IndexSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    key: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    filters: Vec<IndexFilter>,
    #[serde(default)]
    sharding: ShardingStrategy,
}

impl From<IndexSpec> for Index {
    fn from(spec: IndexSpec) -> Self {
        let mut index = Index::new(&spec.key, spec.sharding);
        if let Some(name) = spec.name {
            index.name = name;
        }
        index.filters = spec.filters;
        index
    }
}

impl From<Index> for IndexSpec {
    fn from(index: Index) -> Self {
        IndexSpec {
            name: (index.name != index.key).then_some(index.name),
            key: index.key,
            filters: index
                .filters
                .into_iter()
                .filter(|f| !matches!(f, IndexFilter::Custom { .. }))
                .collect(),
            sharding: index.sharding,
        }
    }
}

impl Index {
    /// Index named after its key spec.
    ///
    /// Whitespace around separators is ignored: `"a : b"` equals `"a:b"`.
    pub fn new(key: &str, sharding: ShardingStrategy) -> Self {
        let composite_key: Vec<String> = key
            .split(KEY_SEPARATOR)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let key = composite_key.join(":");
        Index {
            name: key.clone(),
            key,
            composite_key,
            filters: Vec::new(),
            sharding,
        }
    }

    /// Override the index name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add a filter
    pub fn with_filter(mut self, filter: IndexFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Index name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Normalized key spec
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Ordered composite key fields
    pub fn composite_key(&self) -> &[String] {
        &self.composite_key
    }

    /// Filters gating this index
    pub fn filters(&self) -> &[IndexFilter] {
        &self.filters
    }

    /// Sharding strategy
    pub fn sharding(&self) -> ShardingStrategy {
        self.sharding
    }

    /// Whether every filter accepts `data`
    pub fn passes_all_filters(&self, data: &Record) -> bool {
        self.filters.iter().all(|f| f.is_included(data))
    }

    /// Whether `keys` can form this index's composite key.
    ///
    /// A key set of a different size is rejected before any field lookup.
    pub fn validate_index_keys(&self, keys: &Record) -> bool {
        if keys.len() != self.composite_key.len() {
            return false;
        }
        self.has_complete_key(keys)
    }

    /// Whether every composite field is present and non-null in `data`
    pub fn has_complete_key(&self, data: &Record) -> bool {
        self.missing_key_field(data).is_none()
    }

    /// First composite field absent or null in `data`
    pub fn missing_key_field(&self, data: &Record) -> Option<&str> {
        self.composite_key
            .iter()
            .find(|f| data.get(*f).map(Value::is_null).unwrap_or(true))
            .map(String::as_str)
    }

    /// Key values in composite order; absent fields yield `Null`
    pub fn index_values(&self, data: &Record) -> Vec<Value> {
        self.composite_key
            .iter()
            .map(|f| data.get(f).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// The key fields of `data` and their values
    pub fn key_and_values(&self, data: &Record) -> Record {
        self.composite_key
            .iter()
            .filter_map(|f| data.get(f).map(|v| (f.clone(), v.clone())))
            .collect()
    }

    /// Key values joined with `:`, as stored in the shard index.
    /// A `:` or `\` inside a value is escaped with `\` so distinct value
    /// tuples never share an encoding.
    pub fn encode_index_values(&self, data: &Record) -> String {
        let mut encoded = String::new();
        for (i, value) in self.index_values(data).iter().enumerate() {
            if i > 0 {
                encoded.push(KEY_SEPARATOR);
            }
            for c in value.to_string().chars() {
                if c == KEY_SEPARATOR || c == ESCAPE {
                    encoded.push(ESCAPE);
                }
                encoded.push(c);
            }
        }
        encoded
    }

    /// Shard id for a primary key under this index's strategy
    pub fn shard_id_for(&self, key: &Value) -> Result<i64> {
        self.sharding.shard_key_for(key)
    }
}
