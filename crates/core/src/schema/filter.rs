//! Index filters
//!
//! A filter decides whether a write touches an index at all. Declarative
//! filters round-trip through keyspace-definition JSON; custom filters wrap a
//! closure and exist only in code.

use crate::value::Record;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Predicate over a candidate object's field values
pub type FilterFn = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

/// Gate deciding whether a write is indexed
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IndexFilter {
    /// Field equals a JSON value
    Equals {
        /// Field to inspect
        field: String,
        /// Expected value in its JSON form
        value: serde_json::Value,
    },
    /// Field is present and not null
    NotNull {
        /// Field to inspect
        field: String,
    },
    /// Field is present and truthy
    Truthy {
        /// Field to inspect
        field: String,
    },
    /// Closure supplied in code; cannot be serialized
    #[serde(skip)]
    Custom {
        /// Name used for equality and debug output
        name: String,
        /// The predicate
        predicate: FilterFn,
    },
}

impl IndexFilter {
    /// Custom closure filter
    pub fn custom<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        IndexFilter::Custom {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Whether `data` passes this filter
    pub fn is_included(&self, data: &Record) -> bool {
        match self {
            IndexFilter::Equals { field, value } => data
                .get(field)
                .map(|v| &v.to_json() == value)
                .unwrap_or(false),
            IndexFilter::NotNull { field } => data.get(field).map(|v| !v.is_null()).unwrap_or(false),
            IndexFilter::Truthy { field } => data.get(field).map(|v| v.is_truthy()).unwrap_or(false),
            IndexFilter::Custom { predicate, .. } => predicate(data),
        }
    }
}

impl fmt::Debug for IndexFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexFilter::Equals { field, value } => write!(f, "Equals({} = {})", field, value),
            IndexFilter::NotNull { field } => write!(f, "NotNull({})", field),
            IndexFilter::Truthy { field } => write!(f, "Truthy({})", field),
            IndexFilter::Custom { name, .. } => write!(f, "Custom({})", name),
        }
    }
}

impl PartialEq for IndexFilter {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                IndexFilter::Equals { field: a, value: va },
                IndexFilter::Equals { field: b, value: vb },
            ) => a == b && va == vb,
            (IndexFilter::NotNull { field: a }, IndexFilter::NotNull { field: b }) => a == b,
            (IndexFilter::Truthy { field: a }, IndexFilter::Truthy { field: b }) => a == b,
            (IndexFilter::Custom { name: a, .. }, IndexFilter::Custom { name: b, .. }) => a == b,
            _ => false,
        }
    }
}
