//! Statement model
//!
//! A [`CqlStatement`] is a structured statement (an [`Operation`]) plus its
//! positional bound values. [`CqlStatement::query`] renders the CQL text the
//! store receives; the structure stays available to stores that interpret
//! statements directly, such as the in-memory store used in tests.
//!
//! Bound values line up with placeholders in render order: insert columns,
//! then predicates (a token predicate binds one value per column).

use crate::format::literal;
use std::collections::BTreeMap;
use std::fmt;
use stratamap_core::{FieldType, SortOrder, Value};

/// Comparison operator of a predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    /// `=`
    Eq,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl Comparison {
    /// Operator text
    pub fn as_str(&self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
        }
    }
}

/// Left-hand side of a predicate
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// A single column
    Column(String),
    /// `token(...)` over partition-key columns
    Token(Vec<String>),
}

/// One `WHERE` clause term
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Predicate {
    /// Column or token
    pub target: Target,
    /// Operator
    pub comparison: Comparison,
}

impl Predicate {
    /// `column = ?`
    pub fn eq(column: impl Into<String>) -> Self {
        Predicate::column(column, Comparison::Eq)
    }

    /// `column <op> ?`
    pub fn column(column: impl Into<String>, comparison: Comparison) -> Self {
        Predicate {
            target: Target::Column(column.into()),
            comparison,
        }
    }

    /// `token(columns) <op> token(?, ...)`
    pub fn token(columns: Vec<String>, comparison: Comparison) -> Self {
        Predicate {
            target: Target::Token(columns),
            comparison,
        }
    }

    /// Number of bound values this predicate consumes
    pub fn arity(&self) -> usize {
        match &self.target {
            Target::Column(_) => 1,
            Target::Token(columns) => columns.len(),
        }
    }
}

/// Projection of a select
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selection {
    /// `*`
    All,
    /// Named columns
    Columns(Vec<String>),
    /// `COUNT(*)`
    Count,
}

/// Column in a table definition
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnDef {
    /// Column name
    pub name: String,
    /// CQL type name
    pub cql_type: String,
}

impl ColumnDef {
    /// Column with a CQL type
    pub fn new(name: impl Into<String>, cql_type: impl Into<String>) -> Self {
        ColumnDef {
            name: name.into(),
            cql_type: cql_type.into(),
        }
    }
}

/// Table definition
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableSchema {
    /// Table name
    pub table: String,
    /// Columns in declaration order
    pub columns: Vec<ColumnDef>,
    /// Partition key columns
    pub partition_key: Vec<String>,
    /// Clustering columns
    pub clustering_key: Vec<String>,
}

/// Table compaction settings
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Compaction {
    /// Strategy class, e.g. `LeveledCompactionStrategy`
    pub class: String,
    /// Strategy options, rendered in key order after `class`
    pub options: BTreeMap<String, String>,
}

impl Compaction {
    /// Strategy with options
    pub fn new(class: impl Into<String>, options: BTreeMap<String, String>) -> Self {
        Compaction {
            class: class.into(),
            options,
        }
    }

    /// `{'class': '...', 'key': 'value', ...}`
    pub fn map_literal(&self) -> String {
        let entries: Vec<String> = std::iter::once(("class", self.class.as_str()))
            .chain(self.options.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .map(|(k, v)| format!("{}: {}", text(k), text(v)))
            .collect();
        format!("{{{}}}", entries.join(", "))
    }
}

fn text(s: &str) -> String {
    literal(Some(FieldType::Varchar), &Value::from(s))
}

/// What a statement does
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// `CREATE TABLE`
    CreateTable(TableSchema),
    /// `ALTER TABLE ... ADD`
    AlterAddColumn {
        /// Table name
        table: String,
        /// New column
        column: ColumnDef,
    },
    /// `ALTER TABLE ... WITH compaction`
    AlterCompaction {
        /// Table name
        table: String,
        /// New settings
        compaction: Compaction,
    },
    /// `DROP TABLE`
    DropTable {
        /// Table name
        table: String,
    },
    /// `TRUNCATE`
    TruncateTable {
        /// Table name
        table: String,
    },
    /// `INSERT` (an upsert)
    Insert {
        /// Table name
        table: String,
        /// Columns written, one bound value each
        columns: Vec<String>,
        /// Row time-to-live in seconds
        ttl: Option<u32>,
    },
    /// `SELECT`
    Select {
        /// Table name
        table: String,
        /// Projection
        selection: Selection,
        /// `WHERE` terms, joined with `AND`
        predicates: Vec<Predicate>,
        /// `ORDER BY column direction`
        order: Option<(String, SortOrder)>,
        /// `LIMIT`
        limit: Option<u64>,
        /// `ALLOW FILTERING`
        allow_filtering: bool,
    },
    /// `DELETE`
    Delete {
        /// Table name
        table: String,
        /// `WHERE` terms, joined with `AND`
        predicates: Vec<Predicate>,
        /// `USING TIMESTAMP` in microseconds
        timestamp: Option<u64>,
    },
}

impl Operation {
    /// Table the operation targets
    pub fn table(&self) -> &str {
        match self {
            Operation::CreateTable(schema) => &schema.table,
            Operation::AlterAddColumn { table, .. }
            | Operation::AlterCompaction { table, .. }
            | Operation::DropTable { table }
            | Operation::TruncateTable { table }
            | Operation::Insert { table, .. }
            | Operation::Select { table, .. }
            | Operation::Delete { table, .. } => table,
        }
    }

    /// Whether the operation reads or writes rows (as opposed to schema)
    pub fn is_data(&self) -> bool {
        matches!(
            self,
            Operation::Insert { .. } | Operation::Select { .. } | Operation::Delete { .. }
        )
    }
}

/// A statement bound for a keyspace
#[derive(Debug, Clone, PartialEq)]
pub struct CqlStatement {
    /// Keyspace name
    pub keyspace: String,
    /// The structured statement
    pub operation: Operation,
    /// Positional bound values
    pub values: Vec<Value>,
    /// Inlined literal for each placeholder, for clauses the store cannot
    /// prepare. Such statements are executed as plain text.
    pub literals: Option<Vec<String>>,
}

impl CqlStatement {
    /// Statement with bound values
    pub fn new(keyspace: impl Into<String>, operation: Operation, values: Vec<Value>) -> Self {
        CqlStatement {
            keyspace: keyspace.into(),
            operation,
            values,
            literals: None,
        }
    }

    /// Render with `literals` in place of placeholders
    pub fn with_literals(mut self, literals: Vec<String>) -> Self {
        self.literals = Some(literals);
        self
    }

    /// Table the statement targets
    pub fn table(&self) -> &str {
        self.operation.table()
    }

    /// Whether the statement can be prepared and bound
    pub fn is_preparable(&self) -> bool {
        self.literals.is_none() && self.operation.is_data()
    }

    /// Rendered CQL text
    pub fn query(&self) -> String {
        let mut binder = Binder {
            literals: self.literals.as_deref(),
            position: 0,
        };
        let table = format!("\"{}\".\"{}\"", self.keyspace, self.operation.table());
        match &self.operation {
            Operation::CreateTable(schema) => {
                let columns: Vec<String> = schema
                    .columns
                    .iter()
                    .map(|c| format!("{} {}", c.name, c.cql_type))
                    .collect();
                format!(
                    "CREATE TABLE {} ({}, PRIMARY KEY ({}));",
                    table,
                    columns.join(", "),
                    primary_key_clause(schema)
                )
            }
            Operation::AlterAddColumn { column, .. } => {
                format!("ALTER TABLE {} ADD {} {};", table, column.name, column.cql_type)
            }
            Operation::AlterCompaction { compaction, .. } => {
                format!("ALTER TABLE {} WITH compaction = {};", table, compaction.map_literal())
            }
            Operation::DropTable { .. } => format!("DROP TABLE {};", table),
            Operation::TruncateTable { .. } => format!("TRUNCATE {};", table),
            Operation::Insert { columns, ttl, .. } => {
                let placeholders: Vec<String> = columns.iter().map(|_| binder.next()).collect();
                let mut query = format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    table,
                    columns.join(", "),
                    placeholders.join(", ")
                );
                if let Some(ttl) = ttl {
                    query.push_str(&format!(" USING TTL {}", ttl));
                }
                query.push(';');
                query
            }
            Operation::Select {
                selection,
                predicates,
                order,
                limit,
                allow_filtering,
                ..
            } => {
                let projection = match selection {
                    Selection::All => "*".to_string(),
                    Selection::Columns(columns) => columns.join(", "),
                    Selection::Count => "COUNT(*)".to_string(),
                };
                let mut query = format!("SELECT {} FROM {}", projection, table);
                push_where(&mut query, predicates, &mut binder);
                if let Some((column, direction)) = order {
                    query.push_str(&format!(" ORDER BY {} {}", column, direction.as_cql()));
                }
                if let Some(limit) = limit {
                    query.push_str(&format!(" LIMIT {}", limit));
                }
                if *allow_filtering {
                    query.push_str(" ALLOW FILTERING");
                }
                query.push(';');
                query
            }
            Operation::Delete {
                predicates,
                timestamp,
                ..
            } => {
                let mut query = format!("DELETE FROM {}", table);
                if let Some(ts) = timestamp {
                    query.push_str(&format!(" USING TIMESTAMP {}", ts));
                }
                push_where(&mut query, predicates, &mut binder);
                query.push(';');
                query
            }
        }
    }
}

impl fmt::Display for CqlStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.query())
    }
}

struct Binder<'a> {
    literals: Option<&'a [String]>,
    position: usize,
}

impl Binder<'_> {
    fn next(&mut self) -> String {
        let rendered = self
            .literals
            .and_then(|l| l.get(self.position))
            .cloned()
            .unwrap_or_else(|| "?".to_string());
        self.position += 1;
        rendered
    }
}

fn push_where(query: &mut String, predicates: &[Predicate], binder: &mut Binder<'_>) {
    if predicates.is_empty() {
        return;
    }
    let terms: Vec<String> = predicates
        .iter()
        .map(|p| match &p.target {
            Target::Column(column) => format!("{} {} {}", column, p.comparison.as_str(), binder.next()),
            Target::Token(columns) => {
                let params: Vec<String> = columns.iter().map(|_| binder.next()).collect();
                format!(
                    "token({}) {} token({})",
                    columns.join(", "),
                    p.comparison.as_str(),
                    params.join(", ")
                )
            }
        })
        .collect();
    query.push_str(" WHERE ");
    query.push_str(&terms.join(" AND "));
}

fn primary_key_clause(schema: &TableSchema) -> String {
    let partition = if schema.partition_key.len() == 1 {
        schema.partition_key[0].clone()
    } else {
        format!("({})", schema.partition_key.join(", "))
    };
    if schema.clustering_key.is_empty() {
        partition
    } else {
        format!("{}, {}", partition, schema.clustering_key.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_wide_create() {
        let stmt = CqlStatement::new(
            "testspace",
            Operation::CreateTable(TableSchema {
                table: "wide".to_string(),
                columns: vec![
                    ColumnDef::new("id", "timeuuid"),
                    ColumnDef::new("shardid", "bigint"),
                    ColumnDef::new("region", "varchar"),
                ],
                partition_key: vec!["shardid".to_string(), "region".to_string()],
                clustering_key: vec!["id".to_string()],
            }),
            vec![],
        );
        assert_eq!(
            stmt.query(),
            "CREATE TABLE \"testspace\".\"wide\" (id timeuuid, shardid bigint, region varchar, PRIMARY KEY ((shardid, region), id));"
        );
        assert!(!stmt.is_preparable());
    }

    #[test]
    fn test_render_compaction() {
        let mut options = BTreeMap::new();
        options.insert("sstable_size_in_mb".to_string(), "160".to_string());
        options.insert("note".to_string(), "ops's".to_string());
        let stmt = CqlStatement::new(
            "testspace",
            Operation::AlterCompaction {
                table: "testtype".to_string(),
                compaction: Compaction::new("LeveledCompactionStrategy", options),
            },
            vec![],
        );
        assert_eq!(
            stmt.query(),
            "ALTER TABLE \"testspace\".\"testtype\" WITH compaction = {'class': 'LeveledCompactionStrategy', 'note': 'ops''s', 'sstable_size_in_mb': '160'};"
        );
        assert_eq!(stmt.table(), "testtype");
        assert!(!stmt.is_preparable());
    }

    #[test]
    fn test_render_insert_with_ttl() {
        let stmt = CqlStatement::new(
            "testspace",
            Operation::Insert {
                table: "testtype".to_string(),
                columns: vec!["id".to_string(), "data1".to_string()],
                ttl: Some(20),
            },
            vec![Value::Int(1), Value::from("x")],
        );
        assert_eq!(
            stmt.query(),
            "INSERT INTO \"testspace\".\"testtype\" (id, data1) VALUES (?, ?) USING TTL 20;"
        );
        assert!(stmt.is_preparable());
    }

    #[test]
    fn test_render_select() {
        let stmt = CqlStatement::new(
            "ks",
            Operation::Select {
                table: "t".to_string(),
                selection: Selection::All,
                predicates: vec![
                    Predicate::eq("shardid"),
                    Predicate::eq("region"),
                    Predicate::column("id", Comparison::Ge),
                    Predicate::column("id", Comparison::Le),
                ],
                order: Some(("id".to_string(), SortOrder::Descending)),
                limit: Some(10),
                allow_filtering: true,
            },
            vec![],
        );
        assert_eq!(
            stmt.query(),
            "SELECT * FROM \"ks\".\"t\" WHERE shardid = ? AND region = ? AND id >= ? AND id <= ? ORDER BY id DESC LIMIT 10 ALLOW FILTERING;"
        );
    }

    #[test]
    fn test_render_token_predicate() {
        let stmt = CqlStatement::new(
            "ks",
            Operation::Select {
                table: "__index_updates".to_string(),
                selection: Selection::Columns(vec!["statictablename".into(), "instanceid".into()]),
                predicates: vec![Predicate::token(
                    vec!["statictablename".into(), "instanceid".into()],
                    Comparison::Gt,
                )],
                order: None,
                limit: Some(1),
                allow_filtering: false,
            },
            vec![],
        );
        assert_eq!(
            stmt.query(),
            "SELECT statictablename, instanceid FROM \"ks\".\"__index_updates\" WHERE token(statictablename, instanceid) > token(?, ?) LIMIT 1;"
        );
    }

    #[test]
    fn test_render_inlined_delete() {
        let stmt = CqlStatement::new(
            "ks",
            Operation::Delete {
                table: "t".to_string(),
                predicates: vec![Predicate::eq("id"), Predicate::eq("region")],
                timestamp: Some(1_000),
            },
            vec![Value::Int(1), Value::from("east")],
        )
        .with_literals(vec!["1".to_string(), "'east'".to_string()]);
        assert_eq!(
            stmt.query(),
            "DELETE FROM \"ks\".\"t\" USING TIMESTAMP 1000 WHERE id = 1 AND region = 'east';"
        );
        assert!(!stmt.is_preparable());
    }
}
