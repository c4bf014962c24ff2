//! List-by-index query description
//!
//! ```
//! use stratamap_core::{Criteria, SortOrder, Timestamp};
//!
//! let criteria = Criteria::new("region")
//!     .key("region", "east")
//!     .start(Timestamp::from_millis(1_000))
//!     .ordering(SortOrder::Ascending)
//!     .limit(10);
//! assert_eq!(criteria.limit, 10);
//! ```

use crate::time::Timestamp;
use crate::value::{Record, Value};
use serde::{Deserialize, Serialize};

/// Traversal order over primary keys (and shards)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Oldest first
    Ascending,
    /// Newest first
    #[default]
    Descending,
}

impl SortOrder {
    /// CQL keyword
    pub fn as_cql(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        }
    }
}

/// Query against one index of one object type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criteria {
    /// Index name
    pub index: String,
    /// Equality predicates keyed by field name
    #[serde(default)]
    pub keys: Record,
    /// Inclusive window start; open when absent
    #[serde(default)]
    pub start: Option<Timestamp>,
    /// Inclusive window end; open (now) when absent
    #[serde(default)]
    pub end: Option<Timestamp>,
    /// Result ordering
    #[serde(default)]
    pub ordering: SortOrder,
    /// Maximum number of results; 0 means unlimited
    #[serde(default)]
    pub limit: u64,
    /// Permit predicates on fields beyond the index key, checked client side
    #[serde(default)]
    pub allow_filtering: bool,
}

impl Criteria {
    /// Criteria for `index` with no predicates
    pub fn new(index: impl Into<String>) -> Self {
        Criteria {
            index: index.into(),
            keys: Record::new(),
            start: None,
            end: None,
            ordering: SortOrder::Descending,
            limit: 0,
            allow_filtering: false,
        }
    }

    /// Add an equality predicate
    pub fn key(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keys.insert(field.into(), value.into());
        self
    }

    /// Set the window start
    pub fn start(mut self, at: Timestamp) -> Self {
        self.start = Some(at);
        self
    }

    /// Set the window end
    pub fn end(mut self, at: Timestamp) -> Self {
        self.end = Some(at);
        self
    }

    /// Set the ordering
    pub fn ordering(mut self, ordering: SortOrder) -> Self {
        self.ordering = ordering;
        self
    }

    /// Set the limit
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Enable or disable client-side filtering of extra predicates
    pub fn allow_filtering(mut self, allow: bool) -> Self {
        self.allow_filtering = allow;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = Criteria::new("region");
        assert_eq!(c.ordering, SortOrder::Descending);
        assert_eq!(c.limit, 0);
        assert!(!c.allow_filtering);
        assert!(c.start.is_none() && c.end.is_none());
    }

    #[test]
    fn test_criteria_from_json() {
        let c: Criteria = serde_json::from_str(
            r#"{"index":"foreignid","keys":{"foreignid":{"Int":777}},"ordering":"ascending","limit":5}"#,
        )
        .unwrap();
        assert_eq!(c.keys.get("foreignid"), Some(&Value::Int(777)));
        assert_eq!(c.ordering, SortOrder::Ascending);
        assert_eq!(c.limit, 5);
    }

    #[test]
    fn test_sort_order_cql() {
        assert_eq!(SortOrder::Ascending.as_cql(), "ASC");
        assert_eq!(SortOrder::Descending.as_cql(), "DESC");
    }
}
