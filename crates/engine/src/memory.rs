//! In-memory store
//!
//! A [`Session`] that interprets compiled statements directly instead of
//! parsing CQL text. It honors the parts of the store's semantics the mapper
//! relies on:
//!
//! - inserts are upserts keyed by the full primary key; a null value removes
//!   the column
//! - every write records a strictly increasing write time in microseconds,
//!   and `DELETE ... USING TIMESTAMP t` only removes rows written at or
//!   before `t`
//! - selects support equality and range predicates, `token(...)` comparisons
//!   (ordered lexicographically on the partition key), `ORDER BY`, `LIMIT`
//!   and `COUNT(*)`; rows come back in primary-key order otherwise
//! - batches apply all of their statements or none
//!
//! Row TTLs are accepted and ignored. Compaction settings are recorded per
//! table but change nothing.

use crate::session::{PreparedStatement, ResultSet, Row, Session};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::Duration;
use stratamap_core::{Error, Record, Result, SortOrder, Timestamp, Value};
use stratamap_cql::{
    Compaction, Comparison, CqlStatement, Operation, Predicate, Selection, TableSchema, Target,
};

#[derive(Debug, Clone)]
struct StoredRow {
    columns: Record,
    write_micros: u64,
}

#[derive(Debug, Clone)]
struct Table {
    schema: TableSchema,
    rows: Vec<StoredRow>,
    compaction: Option<Compaction>,
}

impl Table {
    fn primary_key(&self) -> impl Iterator<Item = &String> {
        self.schema
            .partition_key
            .iter()
            .chain(self.schema.clustering_key.iter())
    }

    fn key_of(&self, columns: &Record) -> Vec<Value> {
        self.primary_key()
            .map(|c| columns.get(c).cloned().unwrap_or(Value::Null))
            .collect()
    }

    fn has_column(&self, name: &str) -> bool {
        self.schema.columns.iter().any(|c| c.name == name)
    }
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, Table>,
    last_write_micros: u64,
}

impl State {
    fn next_write_micros(&mut self) -> u64 {
        let now = Timestamp::now().as_micros();
        self.last_write_micros = now.max(self.last_write_micros + 1);
        self.last_write_micros
    }
}

/// Store held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    prepared: Mutex<HashMap<u64, CqlStatement>>,
    next_prepared_id: AtomicU64,
    journal: Mutex<Vec<String>>,
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Query text of every statement executed so far, in order
    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().clone()
    }

    /// Forget the journal
    pub fn clear_journal(&self) {
        self.journal.lock().clear();
    }

    /// Number of statements prepared so far
    pub fn prepared_count(&self) -> usize {
        self.prepared.lock().len()
    }

    /// Names of existing tables in `keyspace`, sorted
    pub fn table_names(&self, keyspace: &str) -> Vec<String> {
        let prefix = format!("{}.", keyspace);
        let mut names: Vec<String> = self
            .state
            .lock()
            .tables
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
            .collect();
        names.sort();
        names
    }

    /// Every row of a table in primary-key order, or `None` if it does not
    /// exist
    pub fn rows(&self, keyspace: &str, table: &str) -> Option<Vec<Row>> {
        let state = self.state.lock();
        let table = state.tables.get(&table_key(keyspace, table))?;
        let mut rows: Vec<&StoredRow> = table.rows.iter().collect();
        rows.sort_by(|a, b| compare_tuples(&table.key_of(&a.columns), &table.key_of(&b.columns)));
        Some(rows.into_iter().map(|r| r.columns.clone()).collect())
    }

    /// Compaction last set on a table
    pub fn compaction(&self, keyspace: &str, table: &str) -> Option<Compaction> {
        self.state
            .lock()
            .tables
            .get(&table_key(keyspace, table))?
            .compaction
            .clone()
    }

    fn apply(&self, state: &mut State, keyspace: &str, operation: &Operation, values: &[Value]) -> Result<ResultSet> {
        let key = table_key(keyspace, operation.table());
        match operation {
            Operation::CreateTable(schema) => {
                if state.tables.contains_key(&key) {
                    return Err(Error::TableExists {
                        table: schema.table.clone(),
                    });
                }
                state.tables.insert(
                    key,
                    Table {
                        schema: schema.clone(),
                        rows: Vec::new(),
                        compaction: None,
                    },
                );
                Ok(ResultSet::empty())
            }
            Operation::AlterAddColumn { table, column } => {
                let existing = table_mut(state, &key, table)?;
                if existing.has_column(&column.name) {
                    return Err(invalid(format!("column {} already exists in {}", column.name, table)));
                }
                existing.schema.columns.push(column.clone());
                Ok(ResultSet::empty())
            }
            Operation::AlterCompaction { table, compaction } => {
                table_mut(state, &key, table)?.compaction = Some(compaction.clone());
                Ok(ResultSet::empty())
            }
            Operation::DropTable { table } => {
                state
                    .tables
                    .remove(&key)
                    .ok_or_else(|| invalid(format!("unconfigured table {}", table)))?;
                Ok(ResultSet::empty())
            }
            Operation::TruncateTable { table } => {
                table_mut(state, &key, table)?.rows.clear();
                Ok(ResultSet::empty())
            }
            Operation::Insert { table, columns, .. } => {
                if columns.len() != values.len() {
                    return Err(invalid(format!(
                        "{} columns but {} values for {}",
                        columns.len(),
                        values.len(),
                        table
                    )));
                }
                let write_micros = state.next_write_micros();
                let target = table_mut(state, &key, table)?;
                if let Some(unknown) = columns.iter().find(|c| !target.has_column(c)) {
                    return Err(invalid(format!("undefined column {} in {}", unknown, table)));
                }
                let written: Record = columns.iter().cloned().zip(values.iter().cloned()).collect();
                let row_key = target.key_of(&written);
                if row_key.iter().any(Value::is_null) {
                    return Err(invalid(format!("missing primary key value for {}", table)));
                }
                let position = target
                    .rows
                    .iter()
                    .position(|r| compare_tuples(&target.key_of(&r.columns), &row_key) == Ordering::Equal);
                let row = match position {
                    Some(i) => &mut target.rows[i],
                    None => {
                        target.rows.push(StoredRow {
                            columns: Record::new(),
                            write_micros,
                        });
                        let last = target.rows.len() - 1;
                        &mut target.rows[last]
                    }
                };
                for (column, value) in written {
                    if value.is_null() {
                        row.columns.remove(&column);
                    } else {
                        row.columns.insert(column, value);
                    }
                }
                row.write_micros = write_micros;
                Ok(ResultSet::empty())
            }
            Operation::Select {
                table,
                selection,
                predicates,
                order,
                limit,
                ..
            } => {
                let source: &Table = table_mut(state, &key, table)?;
                let bound = bind(predicates, values)?;
                let mut matches: Vec<&StoredRow> = source
                    .rows
                    .iter()
                    .filter(|r| bound.iter().all(|b| b.matches(&r.columns)))
                    .collect();
                matches.sort_by(|a, b| {
                    let by_key = compare_tuples(&source.key_of(&a.columns), &source.key_of(&b.columns));
                    match order {
                        Some((column, direction)) => {
                            let ordered = compare_values(
                                a.columns.get(column).unwrap_or(&Value::Null),
                                b.columns.get(column).unwrap_or(&Value::Null),
                            );
                            let ordered = match direction {
                                SortOrder::Ascending => ordered,
                                SortOrder::Descending => ordered.reverse(),
                            };
                            ordered.then(by_key)
                        }
                        None => by_key,
                    }
                });
                if let Some(limit) = limit {
                    matches.truncate(*limit as usize);
                }
                let rows = match selection {
                    Selection::Count => {
                        let mut row = Row::new();
                        row.insert("count".to_string(), Value::Int(matches.len() as i64));
                        vec![row]
                    }
                    Selection::All => matches.into_iter().map(|r| r.columns.clone()).collect(),
                    Selection::Columns(columns) => matches
                        .into_iter()
                        .map(|r| {
                            columns
                                .iter()
                                .filter_map(|c| r.columns.get(c).map(|v| (c.clone(), v.clone())))
                                .collect()
                        })
                        .collect(),
                };
                Ok(ResultSet::new(rows))
            }
            Operation::Delete {
                table,
                predicates,
                timestamp,
            } => {
                let bound = bind(predicates, values)?;
                let target = table_mut(state, &key, table)?;
                target.rows.retain(|r| {
                    let addressed = bound.iter().all(|b| b.matches(&r.columns));
                    let old_enough = timestamp.map(|t| r.write_micros <= t).unwrap_or(true);
                    !(addressed && old_enough)
                });
                Ok(ResultSet::empty())
            }
        }
    }
}

impl Session for MemoryStore {
    fn execute(&self, statement: &CqlStatement) -> Result<ResultSet> {
        self.journal.lock().push(statement.query());
        let mut state = self.state.lock();
        self.apply(&mut state, &statement.keyspace, &statement.operation, &statement.values)
    }

    fn prepare(&self, statement: &CqlStatement) -> Result<PreparedStatement> {
        if !statement.is_preparable() {
            return Err(invalid(format!("cannot prepare {}", statement.query())));
        }
        let id = self.next_prepared_id.fetch_add(1, AtomicOrdering::Relaxed);
        let mut template = statement.clone();
        template.values.clear();
        self.prepared.lock().insert(id, template);
        Ok(PreparedStatement {
            id,
            query: statement.query(),
        })
    }

    fn execute_prepared(&self, prepared: &PreparedStatement, values: &[Value]) -> Result<ResultSet> {
        let template = self
            .prepared
            .lock()
            .get(&prepared.id)
            .cloned()
            .ok_or_else(|| invalid(format!("unknown prepared statement {}", prepared.id)))?;
        self.journal.lock().push(prepared.query.clone());
        let mut state = self.state.lock();
        self.apply(&mut state, &template.keyspace, &template.operation, values)
    }

    fn execute_batch(&self, statements: &[CqlStatement], _timeout: Duration) -> Result<()> {
        if let Some(other) = statements
            .iter()
            .find(|s| !matches!(s.operation, Operation::Insert { .. } | Operation::Delete { .. }))
        {
            return Err(invalid(format!("only inserts and deletes may be batched: {}", other)));
        }
        let mut state = self.state.lock();
        let snapshot = state.tables.clone();
        for statement in statements {
            self.journal.lock().push(statement.query());
            if let Err(e) = self.apply(&mut state, &statement.keyspace, &statement.operation, &statement.values) {
                state.tables = snapshot;
                return Err(e);
            }
        }
        Ok(())
    }
}

fn table_key(keyspace: &str, table: &str) -> String {
    format!("{}.{}", keyspace, table)
}

fn table_mut<'a>(state: &'a mut State, key: &str, table: &str) -> Result<&'a mut Table> {
    state
        .tables
        .get_mut(key)
        .ok_or_else(|| invalid(format!("unconfigured table {}", table)))
}

fn invalid(reason: String) -> Error {
    Error::InvalidQuery { reason }
}

struct BoundPredicate<'a> {
    predicate: &'a Predicate,
    values: &'a [Value],
}

impl BoundPredicate<'_> {
    fn matches(&self, columns: &Record) -> bool {
        let ordering = match &self.predicate.target {
            Target::Column(column) => match columns.get(column) {
                Some(value) => value.compare(&self.values[0]),
                None => None,
            },
            Target::Token(token_columns) => {
                let row: Vec<Value> = token_columns
                    .iter()
                    .map(|c| columns.get(c).cloned().unwrap_or(Value::Null))
                    .collect();
                Some(compare_tuples(&row, self.values))
            }
        };
        match (ordering, self.predicate.comparison) {
            (Some(o), Comparison::Eq) => o == Ordering::Equal,
            (Some(o), Comparison::Lt) => o == Ordering::Less,
            (Some(o), Comparison::Le) => o != Ordering::Greater,
            (Some(o), Comparison::Gt) => o == Ordering::Greater,
            (Some(o), Comparison::Ge) => o != Ordering::Less,
            (None, _) => false,
        }
    }
}

fn bind<'a>(predicates: &'a [Predicate], values: &'a [Value]) -> Result<Vec<BoundPredicate<'a>>> {
    let needed: usize = predicates.iter().map(Predicate::arity).sum();
    if needed != values.len() {
        return Err(invalid(format!(
            "{} bound values for {} placeholders",
            values.len(),
            needed
        )));
    }
    let mut offset = 0;
    Ok(predicates
        .iter()
        .map(|predicate| {
            let arity = predicate.arity();
            let bound = BoundPredicate {
                predicate,
                values: &values[offset..offset + arity],
            };
            offset += arity;
            bound
        })
        .collect())
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Int(_) | Value::Float(_) => 2,
        Value::String(_) => 3,
        Value::Bytes(_) => 4,
        Value::Timestamp(_) => 5,
        Value::Uuid(_) => 6,
    }
}

/// Total order over values: same-kind values by their natural order, then
/// by kind
fn compare_values(a: &Value, b: &Value) -> Ordering {
    a.compare(b).unwrap_or_else(|| rank(a).cmp(&rank(b)))
}

fn compare_tuples(a: &[Value], b: &[Value]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| compare_values(x, y))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or_else(|| a.len().cmp(&b.len()))
}
