//! Statement execution for stratamap
//!
//! This crate runs what the compiler produces:
//! - Session: the statement-execution collaborator a store driver implements
//! - CqlExecutor: prepared-statement cache and statement logging over a session
//! - ExecutionCoordinator: concurrent, batched or sequential execution with a
//!   per-call statement ceiling, plus result mapping
//! - MemoryStore: an in-process session used by tests and examples
//! - Reconciliation: draining the index update log, inline or in background
//! - MapperConfig: settings loaded from `stratamap.toml`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod background;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod executor;
pub mod memory;
pub mod reconcile;
pub mod rows;
pub mod session;

pub use background::{BackgroundScheduler, BackpressureError, SchedulerStats};
pub use cache::StatementCache;
pub use config::{MapperConfig, ReconcilerConfig, CONFIG_FILE_NAME};
pub use coordinator::{ExecutionCoordinator, ExecutionSettings};
pub use executor::CqlExecutor;
pub use memory::MemoryStore;
pub use reconcile::{IndexReconciler, IndexUpdateQueue, ReconcileSummary, TableIndexUpdateQueue};
pub use rows::{map_row, matches_filters};
pub use session::{PendingResult, PreparedStatement, ResultSet, Row, Session};
