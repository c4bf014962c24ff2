//! Error types for stratamap
//!
//! Every failure in the system is one variant of [`Error`]. Compilation
//! failures (unknown index, unsatisfiable key set, missing fields, reversed
//! time windows) are raised before any statement reaches the store. Execution
//! failures surface after some statements may already have been applied.
//!
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use thiserror::Error;

/// Result type alias for stratamap operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds for stratamap
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// No object definition with this name exists in the keyspace
    #[error("unknown object type: {object_type}")]
    UnknownObjectType {
        /// Requested object type
        object_type: String,
    },

    /// The object definition has no index with this name
    #[error("could not find index {index} on object type {object_type}")]
    UnknownIndex {
        /// Object type queried
        object_type: String,
        /// Requested index name
        index: String,
    },

    /// The supplied key set cannot form the index's composite key
    #[error("cannot query index {index} on object type {object_type} with the provided index values")]
    UnsatisfiableIndexKeys {
        /// Object type queried
        object_type: String,
        /// Index that was targeted
        index: String,
    },

    /// An insert did not supply a required field
    #[error("invalid insert on {object_type}: missing required field {field}")]
    MissingRequiredField {
        /// Object type written
        object_type: String,
        /// First missing field in declaration order
        field: String,
    },

    /// A write that passes an index's filters lacks one of its key fields
    #[error("invalid write on {object_type}: index {index} is missing key field {field}")]
    MissingIndexField {
        /// Object type written
        object_type: String,
        /// Index whose key is incomplete
        index: String,
        /// First missing key field
        field: String,
    },

    /// A sharding strategy was asked for a reversed time range
    #[error("invalid shard range: start {start_millis} is after end {end_millis}")]
    InvalidShardRange {
        /// Range start in milliseconds since epoch
        start_millis: i64,
        /// Range end in milliseconds since epoch
        end_millis: i64,
    },

    /// A time-bucketed strategy was given a key with no time component
    #[error("cannot derive a shard key: {reason}")]
    InvalidShardKey {
        /// Why the key could not be sharded
        reason: String,
    },

    /// A value does not fit the declared field type
    #[error("invalid value for field {field}: expected {expected}, got {actual}")]
    InvalidValue {
        /// Field name
        field: String,
        /// Declared CQL type
        expected: String,
        /// Description of the supplied value
        actual: String,
    },

    /// A logical call needed more statements than the configured ceiling
    #[error("query attempted to execute more than {limit} statements")]
    FanOutExceeded {
        /// Statement ceiling in force
        limit: usize,
    },

    /// The store reported that a table already exists
    #[error("table already exists: {table}")]
    TableExists {
        /// Table name
        table: String,
    },

    /// The store rejected a statement as invalid
    #[error("invalid query: {reason}")]
    InvalidQuery {
        /// Store-provided reason
        reason: String,
    },

    /// A statement or batch did not complete in time
    #[error("execution timed out after {millis}ms")]
    Timeout {
        /// Timeout that elapsed
        millis: u64,
    },

    /// Any other failure reported by the store
    #[error("store error: {reason}")]
    Store {
        /// Store-provided reason
        reason: String,
    },

    /// Encoding or decoding failure
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// The migration collaborator failed
    #[error("migration failed: {0}")]
    Migration(String),
}

impl Error {
    /// Unknown object type
    pub fn unknown_object_type(object_type: impl Into<String>) -> Self {
        Error::UnknownObjectType {
            object_type: object_type.into(),
        }
    }

    /// Unknown index on an object type
    pub fn unknown_index(object_type: impl Into<String>, index: impl Into<String>) -> Self {
        Error::UnknownIndex {
            object_type: object_type.into(),
            index: index.into(),
        }
    }

    /// Key set does not satisfy the index's composite key
    pub fn unsatisfiable_index_keys(
        object_type: impl Into<String>,
        index: impl Into<String>,
    ) -> Self {
        Error::UnsatisfiableIndexKeys {
            object_type: object_type.into(),
            index: index.into(),
        }
    }

    /// Insert is missing a required field
    pub fn missing_required_field(object_type: impl Into<String>, field: impl Into<String>) -> Self {
        Error::MissingRequiredField {
            object_type: object_type.into(),
            field: field.into(),
        }
    }

    /// Write is missing a key field of an index it must populate
    pub fn missing_index_field(
        object_type: impl Into<String>,
        index: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Error::MissingIndexField {
            object_type: object_type.into(),
            index: index.into(),
            field: field.into(),
        }
    }

    /// Value does not fit a field's declared type
    pub fn invalid_value(
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Error::InvalidValue {
            field: field.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Store failure with a free-form reason
    pub fn store(reason: impl Into<String>) -> Self {
        Error::Store {
            reason: reason.into(),
        }
    }

    /// True for failures raised while compiling statements, before any
    /// statement is sent to the store.
    pub fn is_compilation_error(&self) -> bool {
        matches!(
            self,
            Error::UnknownObjectType { .. }
                | Error::UnknownIndex { .. }
                | Error::UnsatisfiableIndexKeys { .. }
                | Error::MissingRequiredField { .. }
                | Error::MissingIndexField { .. }
                | Error::InvalidShardRange { .. }
                | Error::InvalidShardKey { .. }
                | Error::InvalidValue { .. }
        )
    }

    /// True for store errors that idempotent administrative operations
    /// (create, drop, truncate) treat as informational.
    pub fn is_advisory(&self) -> bool {
        matches!(self, Error::TableExists { .. } | Error::InvalidQuery { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}
