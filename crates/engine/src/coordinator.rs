//! Execution coordinator
//!
//! Decides how compiled statement iterators reach the store:
//!
//! - all iterators bounded, async enabled: one asynchronous worker per
//!   iterator, all awaited before returning; or, with batching enabled and
//!   every statement preparable, a single atomic batch
//! - any iterator unbounded (or async disabled): strictly sequential
//!
//! Every logical call is held to a statement ceiling. The bounded lists of a
//! call are counted together before anything runs; shard scans draw on the
//! same budget as they advance.

use crate::config::MapperConfig;
use crate::executor::CqlExecutor;
use crate::rows::{map_row, matches_filters};
use crate::session::{PendingResult, ResultSet};
use std::time::{Duration, Instant};
use stratamap_core::{Error, ObjectDefinition, Record, Result};
use stratamap_cql::{CqlStatement, Operation, StatementIterator};
use tracing::debug;

/// Execution policy
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionSettings {
    /// Run bounded iterators concurrently
    pub execute_async: bool,
    /// Merge preparable bounded iterators into one batch
    pub use_batching: bool,
    /// Timeout of one batch
    pub batch_timeout: Duration,
    /// Statements one logical call may execute
    pub statement_ceiling: usize,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        ExecutionSettings::from(&MapperConfig::default())
    }
}

impl From<&MapperConfig> for ExecutionSettings {
    fn from(config: &MapperConfig) -> Self {
        ExecutionSettings {
            execute_async: config.execute_async,
            use_batching: config.use_batching,
            batch_timeout: config.batch_timeout(),
            statement_ceiling: config.statement_ceiling,
        }
    }
}

/// Runs statement iterators under the execution policy
#[derive(Debug, Clone)]
pub struct ExecutionCoordinator {
    executor: CqlExecutor,
    settings: ExecutionSettings,
}

impl ExecutionCoordinator {
    /// Coordinator over `executor`
    pub fn new(executor: CqlExecutor, settings: ExecutionSettings) -> Self {
        ExecutionCoordinator { executor, settings }
    }

    /// The underlying executor
    pub fn executor(&self) -> &CqlExecutor {
        &self.executor
    }

    /// Execution policy
    pub fn settings(&self) -> &ExecutionSettings {
        &self.settings
    }

    /// Statement ceiling per logical call
    pub fn statement_ceiling(&self) -> usize {
        self.settings.statement_ceiling
    }

    /// Execute one iterator, discarding results
    pub fn execute(&self, iterator: StatementIterator) -> Result<()> {
        self.execute_statements(vec![iterator])
    }

    /// Execute several iterators as one logical call, discarding results.
    /// The call as a whole is held to the statement ceiling.
    pub fn execute_statements(&self, iterators: Vec<StatementIterator>) -> Result<()> {
        let ceiling = self.settings.statement_ceiling;
        let bounded_total: usize = iterators
            .iter()
            .filter(|it| it.is_bounded())
            .map(StatementIterator::len)
            .sum();
        if bounded_total > ceiling {
            debug!(target: "stratamap::exec", statements = bounded_total, ceiling, "Fan-out ceiling exceeded");
            return Err(Error::FanOutExceeded { limit: ceiling });
        }
        let all_bounded = iterators.iter().all(StatementIterator::is_bounded);
        let started = Instant::now();
        if all_bounded && self.settings.execute_async {
            if self.settings.use_batching && iterators.iter().all(batchable) {
                let statements: Vec<CqlStatement> = iterators.into_iter().flatten().collect();
                debug!(target: "stratamap::exec", statements = statements.len(), "Executing batch");
                self.executor
                    .execute_batch(&statements, self.settings.batch_timeout)?;
            } else {
                self.execute_concurrently(iterators)?;
            }
            debug!(target: "stratamap::exec", elapsed_us = started.elapsed().as_micros() as u64, "Async execution finished");
        } else {
            let mut executed = 0;
            for iterator in iterators {
                self.execute_sequentially(iterator, &mut executed)?;
            }
            debug!(target: "stratamap::exec", elapsed_us = started.elapsed().as_micros() as u64, "Sync execution finished");
        }
        Ok(())
    }

    /// Execute a select iterator, mapping rows onto `definition` until
    /// `limit` objects (0 = unlimited) have been collected
    pub fn map_results(
        &self,
        mut iterator: StatementIterator,
        definition: &ObjectDefinition,
        limit: u64,
    ) -> Result<Vec<Record>> {
        let filters = iterator.client_filters().cloned();
        let mut results = Vec::new();
        let mut executed = 0;
        while iterator.has_next(results.len() as u64) {
            let Some(statement) = iterator.next() else {
                break;
            };
            let result_set = self.run_counted(&statement, iterator.is_bounded(), &mut executed)?;
            for row in result_set.into_rows() {
                let object = map_row(definition, row);
                if filters.as_ref().map_or(true, |f| matches_filters(&object, f)) {
                    results.push(object);
                }
            }
            if limit > 0 && results.len() as u64 >= limit {
                debug!(target: "stratamap::exec", results = results.len(), "Limit reached");
                break;
            }
        }
        if limit > 0 {
            results.truncate(limit as usize);
        }
        Ok(results)
    }

    /// Execute a count iterator, summing server counts or, when client
    /// filters apply, counting matching rows. Capped at `limit` (0 = none).
    pub fn map_count(
        &self,
        mut iterator: StatementIterator,
        definition: &ObjectDefinition,
        limit: u64,
    ) -> Result<u64> {
        let filters = iterator.client_filters().cloned();
        let mut total = 0u64;
        let mut executed = 0;
        while iterator.has_next(total) {
            let Some(statement) = iterator.next() else {
                break;
            };
            let result_set = self.run_counted(&statement, iterator.is_bounded(), &mut executed)?;
            total += match &filters {
                None => result_set.count().unwrap_or(0),
                Some(filters) => result_set
                    .into_rows()
                    .into_iter()
                    .map(|row| map_row(definition, row))
                    .filter(|object| matches_filters(object, filters))
                    .count() as u64,
            };
            if limit > 0 && total >= limit {
                return Ok(limit);
            }
        }
        Ok(total)
    }

    fn run_counted(&self, statement: &CqlStatement, bounded: bool, executed: &mut usize) -> Result<ResultSet> {
        if *executed >= self.settings.statement_ceiling {
            return Err(Error::FanOutExceeded {
                limit: self.settings.statement_ceiling,
            });
        }
        *executed += 1;
        if bounded {
            self.executor.execute(statement)
        } else {
            self.executor.execute_unprepared(statement)
        }
    }

    fn execute_sequentially(&self, mut iterator: StatementIterator, executed: &mut usize) -> Result<()> {
        let bounded = iterator.is_bounded();
        while iterator.has_next(0) {
            let Some(statement) = iterator.next() else {
                break;
            };
            self.run_counted(&statement, bounded, executed)?;
        }
        Ok(())
    }

    /// Every worker is awaited, even after one fails, so nothing is still
    /// writing when the call returns
    fn execute_concurrently(&self, iterators: Vec<StatementIterator>) -> Result<()> {
        let mut first_error = None;
        let mut pending: Vec<PendingResult> = Vec::with_capacity(iterators.len());
        for iterator in iterators {
            match self.executor.execute_async(iterator.collect()) {
                Ok(worker) => pending.push(worker),
                Err(e) => {
                    first_error.get_or_insert(e);
                    break;
                }
            }
        }
        for worker in pending {
            if let Err(e) = worker.wait() {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Preparable writes only; selects and schema changes never join a batch
fn batchable(iterator: &StatementIterator) -> bool {
    iterator.all_preparable()
        && iterator.materialized_list().map_or(false, |statements| {
            statements
                .iter()
                .all(|s| matches!(s.operation, Operation::Insert { .. } | Operation::Delete { .. }))
        })
}
