//! Index reconciliation
//!
//! Updates that move an object between index keys append the prior indexed
//! values to the `__index_updates` log. Once an entry is older than the
//! consistency horizon, the reconciler deletes whatever wide rows the logged
//! keys still address and removes the entry.
//!
//! - [`IndexUpdateQueue`]: poll/ack over pending log partitions
//! - [`TableIndexUpdateQueue`]: the queue over the log table itself
//! - [`IndexReconciler`]: processes partitions, inline or on a
//!   [`BackgroundScheduler`](crate::background::BackgroundScheduler)

mod queue;
mod reconciler;

pub use queue::{IndexUpdateQueue, TableIndexUpdateQueue};
pub use reconciler::{IndexReconciler, ReconcileSummary};
