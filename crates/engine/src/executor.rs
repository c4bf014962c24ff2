//! Statement executor
//!
//! Wraps a [`Session`] with the prepared-statement cache and statement
//! logging. Preparable statements go through the cache; anything else,
//! including statements with inlined literals, runs as plain text.

use crate::cache::StatementCache;
use crate::session::{PendingResult, ResultSet, Session};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use stratamap_core::{Error, Result};
use stratamap_cql::CqlStatement;
use tracing::debug;

/// Executes compiled statements against a session
#[derive(Clone)]
pub struct CqlExecutor {
    session: Arc<dyn Session>,
    cache: Arc<StatementCache>,
    log_cql: bool,
    cache_bounded_queries: bool,
}

impl CqlExecutor {
    /// Executor over `session`
    pub fn new(session: Arc<dyn Session>, log_cql: bool, cache_bounded_queries: bool) -> Self {
        CqlExecutor {
            session,
            cache: Arc::new(StatementCache::new()),
            log_cql,
            cache_bounded_queries,
        }
    }

    /// The prepared-statement cache
    pub fn cache(&self) -> &StatementCache {
        &self.cache
    }

    /// Forget every prepared statement
    pub fn clear_statement_cache(&self) {
        self.cache.clear();
    }

    /// Execute one statement, preparing it first when it is preparable and
    /// caching is enabled
    pub fn execute(&self, statement: &CqlStatement) -> Result<ResultSet> {
        self.log(statement);
        if self.cache_bounded_queries && statement.is_preparable() {
            let prepared = self
                .cache
                .get_or_prepare(&statement.query(), || self.session.prepare(statement))?;
            self.session.execute_prepared(&prepared, &statement.values)
        } else {
            self.session.execute(statement)
        }
    }

    /// Prepare `statement` into the cache without running it. Statements
    /// that cannot be prepared are skipped.
    pub fn prepare(&self, statement: &CqlStatement) -> Result<()> {
        if statement.is_preparable() {
            self.cache
                .get_or_prepare(&statement.query(), || self.session.prepare(statement))?;
        }
        Ok(())
    }

    /// Execute one statement as plain text, bypassing the cache
    pub fn execute_unprepared(&self, statement: &CqlStatement) -> Result<ResultSet> {
        self.log(statement);
        self.session.execute(statement)
    }

    /// Execute `statements` in order on a separate thread. The pending
    /// result carries the last statement's rows, or the first failure.
    pub fn execute_async(&self, statements: Vec<CqlStatement>) -> Result<PendingResult> {
        let (sender, receiver) = mpsc::channel();
        let executor = self.clone();
        std::thread::Builder::new()
            .name("stratamap-exec".to_string())
            .spawn(move || {
                let mut outcome = Ok(ResultSet::default());
                for statement in &statements {
                    outcome = executor.execute(statement);
                    if outcome.is_err() {
                        break;
                    }
                }
                // receiver may have given up waiting
                let _ = sender.send(outcome);
            })
            .map_err(|e| Error::store(format!("failed to spawn statement worker: {}", e)))?;
        Ok(PendingResult::new(receiver))
    }

    /// Submit `statements` as one atomic batch
    pub fn execute_batch(&self, statements: &[CqlStatement], timeout: Duration) -> Result<()> {
        if self.log_cql {
            debug!(target: "stratamap::cql", statements = statements.len(), "Executing batch");
        }
        for statement in statements {
            self.log(statement);
        }
        self.session.execute_batch(statements, timeout)
    }

    fn log(&self, statement: &CqlStatement) {
        if self.log_cql {
            debug!(target: "stratamap::cql", query = %statement, values = ?statement.values, "Executing");
        }
    }
}

impl std::fmt::Debug for CqlExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CqlExecutor")
            .field("cached_statements", &self.cache.len())
            .field("log_cql", &self.log_cql)
            .field("cache_bounded_queries", &self.cache_bounded_queries)
            .finish()
    }
}
