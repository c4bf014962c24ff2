//! Table create, drop, truncate and alter statements

use super::CqlGenerator;
use crate::iterator::StatementIterator;
use crate::naming::{
    static_table_name, wide_table_name, INDEX_UPDATES_TABLE, KEYSPACE_DEFINITIONS_TABLE,
    SHARD_INDEX_TABLE,
};
use crate::statement::{ColumnDef, Compaction, CqlStatement, Operation, TableSchema};
use stratamap_core::{Field, Index, ObjectDefinition, ID_FIELD};

fn columns(defs: &[(&str, &str)]) -> Vec<ColumnDef> {
    defs.iter().map(|(n, t)| ColumnDef::new(*n, *t)).collect()
}

fn keys(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

impl CqlGenerator {
    /// Static table: `id` plus every declared field, keyed by `id`
    pub fn make_static_table_create(&self, definition: &ObjectDefinition) -> CqlStatement {
        let mut cols = vec![ColumnDef::new(ID_FIELD, definition.primary_key_type().cql_name())];
        cols.extend(
            definition
                .data_fields()
                .map(|f| ColumnDef::new(&f.name, f.field_type.cql_name())),
        );
        self.create(TableSchema {
            table: static_table_name(definition).to_string(),
            columns: cols,
            partition_key: keys(&[ID_FIELD]),
            clustering_key: Vec::new(),
        })
    }

    /// Wide table: partition key `(shardid, <composite fields>)`, clustered by `id`
    pub fn make_wide_table_create(&self, definition: &ObjectDefinition, index: &Index) -> CqlStatement {
        let mut cols = vec![
            ColumnDef::new(ID_FIELD, definition.primary_key_type().cql_name()),
            ColumnDef::new("shardid", "bigint"),
        ];
        cols.extend(
            definition
                .data_fields()
                .map(|f| ColumnDef::new(&f.name, f.field_type.cql_name())),
        );
        let mut partition_key = keys(&["shardid"]);
        partition_key.extend(index.composite_key().iter().cloned());
        self.create(TableSchema {
            table: wide_table_name(definition, index),
            columns: cols,
            partition_key,
            clustering_key: keys(&[ID_FIELD]),
        })
    }

    /// Static table, then one wide table per index
    pub fn make_create(&self, definition: &ObjectDefinition) -> StatementIterator {
        let mut statements = vec![self.make_static_table_create(definition)];
        statements.extend(
            definition
                .indexes()
                .iter()
                .map(|i| self.make_wide_table_create(definition, i)),
        );
        StatementIterator::bounded(statements)
    }

    /// Drop statements aligned one-to-one with [`CqlGenerator::make_create`]
    pub fn make_drop(&self, definition: &ObjectDefinition) -> StatementIterator {
        StatementIterator::bounded(
            self.object_tables(definition)
                .into_iter()
                .map(|table| self.statement(Operation::DropTable { table }, Vec::new()))
                .collect(),
        )
    }

    /// Truncate the static table and every wide table
    pub fn make_truncate(&self, definition: &ObjectDefinition) -> StatementIterator {
        StatementIterator::bounded(
            self.object_tables(definition)
                .into_iter()
                .map(|table| self.statement(Operation::TruncateTable { table }, Vec::new()))
                .collect(),
        )
    }

    /// Add a column to the static table and every wide table
    pub fn make_alter_add_column(&self, definition: &ObjectDefinition, field: &Field) -> StatementIterator {
        StatementIterator::bounded(
            self.object_tables(definition)
                .into_iter()
                .map(|table| {
                    self.statement(
                        Operation::AlterAddColumn {
                            table,
                            column: ColumnDef::new(&field.name, field.field_type.cql_name()),
                        },
                        Vec::new(),
                    )
                })
                .collect(),
        )
    }

    /// Set compaction on the static table and every wide table
    pub fn make_compaction(&self, definition: &ObjectDefinition, compaction: &Compaction) -> StatementIterator {
        StatementIterator::bounded(
            self.object_tables(definition)
                .into_iter()
                .map(|table| {
                    self.statement(
                        Operation::AlterCompaction {
                            table,
                            compaction: compaction.clone(),
                        },
                        Vec::new(),
                    )
                })
                .collect(),
        )
    }

    /// Shard-index table, keyed by `(tablename, indexvalues)` and clustered by shard
    pub fn make_shard_index_table_create(&self) -> CqlStatement {
        self.create(TableSchema {
            table: SHARD_INDEX_TABLE.to_string(),
            columns: columns(&[
                ("tablename", "varchar"),
                ("indexvalues", "varchar"),
                ("shardid", "bigint"),
                ("targetrowkey", "varchar"),
            ]),
            partition_key: keys(&["tablename", "indexvalues"]),
            clustering_key: keys(&["shardid", "targetrowkey"]),
        })
    }

    /// Drop the shard-index table
    pub fn make_shard_index_table_drop(&self) -> CqlStatement {
        self.drop(SHARD_INDEX_TABLE)
    }

    /// Truncate the shard-index table
    pub fn make_shard_index_table_truncate(&self) -> CqlStatement {
        self.truncate(SHARD_INDEX_TABLE)
    }

    /// Reconciliation log, one partition per object instance
    pub fn make_index_update_table_create(&self) -> CqlStatement {
        self.create(TableSchema {
            table: INDEX_UPDATES_TABLE.to_string(),
            columns: columns(&[
                ("id", "timeuuid"),
                ("statictablename", "varchar"),
                ("instanceid", "varchar"),
                ("indexvalues", "varchar"),
            ]),
            partition_key: keys(&["statictablename", "instanceid"]),
            clustering_key: keys(&["id"]),
        })
    }

    /// Drop the reconciliation log
    pub fn make_index_update_table_drop(&self) -> CqlStatement {
        self.drop(INDEX_UPDATES_TABLE)
    }

    /// Truncate the reconciliation log
    pub fn make_index_update_table_truncate(&self) -> CqlStatement {
        self.truncate(INDEX_UPDATES_TABLE)
    }

    /// Keyspace-definition history, newest version last in each partition
    pub fn make_keyspace_definitions_table_create(&self) -> CqlStatement {
        self.create(TableSchema {
            table: KEYSPACE_DEFINITIONS_TABLE.to_string(),
            columns: columns(&[("name", "varchar"), ("id", "timeuuid"), ("def", "varchar")]),
            partition_key: keys(&["name"]),
            clustering_key: keys(&["id"]),
        })
    }

    fn object_tables(&self, definition: &ObjectDefinition) -> Vec<String> {
        let mut tables = vec![static_table_name(definition).to_string()];
        tables.extend(
            definition
                .indexes()
                .iter()
                .map(|i| wide_table_name(definition, i)),
        );
        tables
    }

    fn create(&self, schema: TableSchema) -> CqlStatement {
        self.statement(Operation::CreateTable(schema), Vec::new())
    }

    fn drop(&self, table: &str) -> CqlStatement {
        self.statement(
            Operation::DropTable {
                table: table.to_string(),
            },
            Vec::new(),
        )
    }

    fn truncate(&self, table: &str) -> CqlStatement {
        self.statement(
            Operation::TruncateTable {
                table: table.to_string(),
            },
            Vec::new(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use std::time::Duration;
    use stratamap_core::FieldType;

    fn generator() -> CqlGenerator {
        CqlGenerator::new(KEYSPACE, Duration::from_secs(1))
    }

    #[test]
    fn test_static_table_create() {
        let stmt = generator().make_static_table_create(&testtype());
        assert_eq!(
            stmt.query(),
            "CREATE TABLE \"testspace\".\"testtype\" (id timeuuid, filtered int, data1 varchar, data2 varchar, data3 varchar, instance bigint, type int, foreignid bigint, PRIMARY KEY (id));"
        );
    }

    #[test]
    fn test_wide_table_create_partition_key_order() {
        let def = testtype();
        let index = def.index("foreignid:instance:type").unwrap();
        let stmt = generator().make_wide_table_create(&def, index);
        let query = stmt.query();
        assert!(query.starts_with(&format!(
            "CREATE TABLE \"testspace\".\"{}\" (id timeuuid, shardid bigint, filtered int",
            wide_table_name(&def, index)
        )));
        assert!(query.ends_with("PRIMARY KEY ((shardid, foreignid, instance, type), id));"));
    }

    #[test]
    fn test_create_emits_static_then_each_index() {
        let def = testtype();
        let it = generator().make_create(&def);
        assert!(it.is_bounded());
        assert_eq!(it.len(), 1 + def.indexes().len());
        let tables: Vec<String> = it.map(|s| s.table().to_string()).collect();
        assert_eq!(tables[0], "testtype");
        assert_eq!(tables[1], wide_table_name(&def, &def.indexes()[0]));
    }

    #[test]
    fn test_drop_aligns_with_create() {
        let def = testtype();
        let g = generator();
        let creates: Vec<String> = g.make_create(&def).map(|s| s.table().to_string()).collect();
        let drops: Vec<String> = g.make_drop(&def).map(|s| s.table().to_string()).collect();
        assert_eq!(creates, drops);
    }

    #[test]
    fn test_alter_add_column_touches_every_table() {
        let def = testtype();
        let it = generator().make_alter_add_column(&def, &Field::new("data4", FieldType::Text));
        assert_eq!(it.len(), 5);
        let first = it.materialized_list().unwrap()[0].query();
        assert_eq!(first, "ALTER TABLE \"testspace\".\"testtype\" ADD data4 text;");
    }

    #[test]
    fn test_compaction_touches_every_object_table() {
        let def = testtype();
        let g = generator();
        let compaction = Compaction::new("SizeTieredCompactionStrategy", Default::default());
        let it = g.make_compaction(&def, &compaction);
        assert!(it.is_bounded());
        let statements: Vec<CqlStatement> = it.collect();
        let tables: Vec<String> = statements.iter().map(|s| s.table().to_string()).collect();
        let drops: Vec<String> = g.make_drop(&def).map(|s| s.table().to_string()).collect();
        assert_eq!(tables, drops);
        assert_eq!(
            statements[0].query(),
            "ALTER TABLE \"testspace\".\"testtype\" WITH compaction = {'class': 'SizeTieredCompactionStrategy'};"
        );
    }

    #[test]
    fn test_bookkeeping_tables() {
        let g = generator();
        assert_eq!(
            g.make_shard_index_table_create().query(),
            "CREATE TABLE \"testspace\".\"__shardindex\" (tablename varchar, indexvalues varchar, shardid bigint, targetrowkey varchar, PRIMARY KEY ((tablename, indexvalues), shardid, targetrowkey));"
        );
        assert_eq!(
            g.make_index_update_table_create().query(),
            "CREATE TABLE \"testspace\".\"__index_updates\" (id timeuuid, statictablename varchar, instanceid varchar, indexvalues varchar, PRIMARY KEY ((statictablename, instanceid), id));"
        );
        assert_eq!(g.make_shard_index_table_truncate().query(), "TRUNCATE \"testspace\".\"__shardindex\";");
        assert_eq!(g.make_index_update_table_drop().query(), "DROP TABLE \"testspace\".\"__index_updates\";");
    }
}
