//! Statement iterators
//!
//! Compiled work comes in two shapes:
//!
//! - **Bounded**: a fully materialized list. Every element is independent, so
//!   the coordinator may run them in any order or concurrently. Used for
//!   create/insert/update/delete and for selects confined to one shard.
//! - **Unbounded**: a shard scan that builds each per-shard select lazily.
//!   Callers report how many results are already satisfied through
//!   [`StatementIterator::has_next`]; the next statement only asks for the
//!   remainder, and no statement is produced once the limit is met. Because
//!   each step depends on the previous results, a scan runs sequentially.

use crate::statement::{CqlStatement, Operation};
use stratamap_core::{Record, Value};

/// Precomputed statement list
#[derive(Debug, Clone, Default)]
pub struct BoundedStatements {
    statements: Vec<CqlStatement>,
    position: usize,
    client_filters: Option<Record>,
}

impl BoundedStatements {
    /// Wrap a statement list
    pub fn new(statements: Vec<CqlStatement>) -> Self {
        BoundedStatements {
            statements,
            position: 0,
            client_filters: None,
        }
    }
}

/// Lazily generated per-shard selects
#[derive(Debug, Clone)]
pub struct ShardScan {
    template: CqlStatement,
    shards: Vec<i64>,
    position: usize,
    limit: u64,
    satisfied: u64,
    client_filters: Option<Record>,
}

impl ShardScan {
    /// Scan `shards` (already in traversal order) with `template`.
    ///
    /// The template is a select whose first predicate is `shardid = ?`; its
    /// values omit the shard id, which is bound per step. A `limit` of 0
    /// means unlimited.
    pub fn new(template: CqlStatement, shards: Vec<i64>, limit: u64) -> Self {
        ShardScan {
            template,
            shards,
            position: 0,
            limit,
            satisfied: 0,
            client_filters: None,
        }
    }

    /// Shard ids in traversal order
    pub fn shards(&self) -> &[i64] {
        &self.shards
    }

    fn remaining_limit(&self) -> Option<u64> {
        (self.limit > 0).then(|| self.limit.saturating_sub(self.satisfied))
    }

    fn statement_for(&self, shard: i64) -> CqlStatement {
        let mut statement = self.template.clone();
        statement.values.insert(0, Value::Int(shard));
        // rows destined for client-side filtering are fetched unlimited
        if let Operation::Select { limit, .. } = &mut statement.operation {
            *limit = match self.client_filters {
                Some(_) => None,
                None => self.remaining_limit(),
            };
        }
        statement
    }
}

/// Bounded list or unbounded shard scan
#[derive(Debug, Clone)]
pub enum StatementIterator {
    /// Precomputed, independently executable statements
    Bounded(BoundedStatements),
    /// Sequential shard scan with dynamic limit
    Unbounded(ShardScan),
}

impl StatementIterator {
    /// Bounded iterator over `statements`
    pub fn bounded(statements: Vec<CqlStatement>) -> Self {
        StatementIterator::Bounded(BoundedStatements::new(statements))
    }

    /// Unbounded shard scan
    pub fn scan(template: CqlStatement, shards: Vec<i64>, limit: u64) -> Self {
        StatementIterator::Unbounded(ShardScan::new(template, shards, limit))
    }

    /// Attach client-side equality filters
    pub fn with_client_filters(mut self, filters: Option<Record>) -> Self {
        match &mut self {
            StatementIterator::Bounded(b) => b.client_filters = filters,
            StatementIterator::Unbounded(s) => s.client_filters = filters,
        }
        self
    }

    /// Whether another statement is needed given `satisfied` results so far.
    ///
    /// For a scan the hint is recorded and shrinks the next statement's
    /// limit; the scan ends once the hint reaches the limit.
    pub fn has_next(&mut self, satisfied: u64) -> bool {
        match self {
            StatementIterator::Bounded(b) => b.position < b.statements.len(),
            StatementIterator::Unbounded(s) => {
                s.satisfied = satisfied;
                if s.limit > 0 && satisfied >= s.limit {
                    return false;
                }
                s.position < s.shards.len()
            }
        }
    }

    /// Total number of statements this iterator can produce
    pub fn len(&self) -> usize {
        match self {
            StatementIterator::Bounded(b) => b.statements.len(),
            StatementIterator::Unbounded(s) => s.shards.len(),
        }
    }

    /// Whether the iterator produces nothing
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the statement list is precomputed
    pub fn is_bounded(&self) -> bool {
        matches!(self, StatementIterator::Bounded(_))
    }

    /// Equality filters the store could not apply
    pub fn client_filters(&self) -> Option<&Record> {
        match self {
            StatementIterator::Bounded(b) => b.client_filters.as_ref(),
            StatementIterator::Unbounded(s) => s.client_filters.as_ref(),
        }
    }

    /// The full statement list, when precomputed
    pub fn materialized_list(&self) -> Option<&[CqlStatement]> {
        match self {
            StatementIterator::Bounded(b) => Some(&b.statements),
            StatementIterator::Unbounded(_) => None,
        }
    }

    /// Whether every statement is bounded and preparable, so the list may be
    /// submitted as one atomic batch
    pub fn all_preparable(&self) -> bool {
        match self {
            StatementIterator::Bounded(b) => b.statements.iter().all(CqlStatement::is_preparable),
            StatementIterator::Unbounded(_) => false,
        }
    }
}

impl Iterator for StatementIterator {
    type Item = CqlStatement;

    fn next(&mut self) -> Option<CqlStatement> {
        match self {
            StatementIterator::Bounded(b) => {
                let statement = b.statements.get(b.position).cloned()?;
                b.position += 1;
                Some(statement)
            }
            StatementIterator::Unbounded(s) => {
                let shard = *s.shards.get(s.position)?;
                s.position += 1;
                Some(s.statement_for(shard))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::{Predicate, Selection};
    use stratamap_core::SortOrder;

    fn template(limit: Option<u64>) -> CqlStatement {
        CqlStatement::new(
            "ks",
            Operation::Select {
                table: "t".to_string(),
                selection: Selection::All,
                predicates: vec![Predicate::eq("shardid"), Predicate::eq("region")],
                order: Some(("id".to_string(), SortOrder::Ascending)),
                limit,
                allow_filtering: false,
            },
            vec![Value::from("east")],
        )
    }

    fn limit_of(statement: &CqlStatement) -> Option<u64> {
        match &statement.operation {
            Operation::Select { limit, .. } => *limit,
            _ => None,
        }
    }

    #[test]
    fn test_scan_binds_shard_first() {
        let mut it = StatementIterator::scan(template(Some(10)), vec![133, 134, 135], 10);
        assert!(!it.is_bounded());
        assert_eq!(it.len(), 3);
        let first = it.next().unwrap();
        assert_eq!(first.values, vec![Value::Int(133), Value::from("east")]);
        assert_eq!(limit_of(&first), Some(10));
    }

    #[test]
    fn test_scan_dynamic_limit() {
        let mut it = StatementIterator::scan(template(Some(10)), vec![133, 134, 135], 10);
        it.next();
        it.next();
        assert!(it.has_next(5));
        let third = it.next().unwrap();
        assert_eq!(third.values[0], Value::Int(135));
        assert_eq!(limit_of(&third), Some(5));
        assert!(!it.has_next(10));
    }

    #[test]
    fn test_scan_stops_when_limit_met() {
        let mut it = StatementIterator::scan(template(Some(2)), vec![1, 2, 3], 2);
        assert!(it.has_next(0));
        it.next();
        assert!(!it.has_next(2));
    }

    #[test]
    fn test_unlimited_scan_runs_every_shard() {
        let mut it = StatementIterator::scan(template(None), vec![5, 4, 3], 0);
        let mut shards = Vec::new();
        while it.has_next(1_000) {
            let s = it.next().unwrap();
            assert_eq!(limit_of(&s), None);
            shards.push(s.values[0].clone());
        }
        assert_eq!(shards, vec![Value::Int(5), Value::Int(4), Value::Int(3)]);
    }

    #[test]
    fn test_bounded_materialized_list() {
        let statements = vec![template(Some(1)), template(Some(2))];
        let mut it = StatementIterator::bounded(statements.clone());
        assert!(it.is_bounded());
        assert_eq!(it.materialized_list().unwrap(), &statements[..]);
        assert!(it.all_preparable());
        assert_eq!(it.by_ref().count(), 2);
        assert!(!it.has_next(0));
    }

    #[test]
    fn test_scan_is_never_batchable() {
        let it = StatementIterator::scan(template(None), vec![1], 0);
        assert!(!it.all_preparable());
        assert!(it.materialized_list().is_none());
    }
}
