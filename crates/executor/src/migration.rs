//! Schema migrations
//!
//! A [`KeyspaceMigrator`] diffs two keyspace versions into the statements
//! that bring the stored tables from one to the other. The mapper ships an
//! additive migrator; anything destructive is left to the operator.

use std::collections::BTreeSet;
use stratamap_core::{Error, KeyspaceDefinition, ObjectDefinition, Result};
use stratamap_cql::{CqlGenerator, CqlStatement};

/// Computes migration statements between two keyspace versions
pub trait KeyspaceMigrator {
    /// Statements migrating `old` to `new`, in execution order
    fn migration_statements(
        &self,
        generator: &CqlGenerator,
        old: &KeyspaceDefinition,
        new: &KeyspaceDefinition,
    ) -> Result<Vec<CqlStatement>>;
}

/// Migrator that only adds: new object types, new fields and new indexes.
///
/// Removing a type, field or index, or changing a field's type, fails with
/// [`Error::Migration`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AdditiveMigrator;

impl KeyspaceMigrator for AdditiveMigrator {
    fn migration_statements(
        &self,
        generator: &CqlGenerator,
        old: &KeyspaceDefinition,
        new: &KeyspaceDefinition,
    ) -> Result<Vec<CqlStatement>> {
        if let Some(dropped) = old
            .definitions
            .iter()
            .find(|d| new.definition(d.name()).is_err())
        {
            return Err(Error::Migration(format!(
                "object type {} cannot be removed",
                dropped.name()
            )));
        }
        let mut statements = Vec::new();
        for definition in &new.definitions {
            match old.definition(definition.name()) {
                Ok(previous) => statements.extend(diff_definition(generator, previous, definition)?),
                Err(_) => statements.extend(generator.make_create(definition)),
            }
        }
        Ok(statements)
    }
}

fn diff_definition(
    generator: &CqlGenerator,
    old: &ObjectDefinition,
    new: &ObjectDefinition,
) -> Result<Vec<CqlStatement>> {
    let mut statements = Vec::new();
    for field in old.fields() {
        match new.field(&field.name) {
            None => {
                return Err(Error::Migration(format!(
                    "field {}.{} cannot be removed",
                    old.name(),
                    field.name
                )))
            }
            Some(updated) if updated.field_type != field.field_type => {
                return Err(Error::Migration(format!(
                    "field {}.{} cannot change type from {} to {}",
                    old.name(),
                    field.name,
                    field.field_type,
                    updated.field_type
                )))
            }
            Some(_) => {}
        }
    }
    let old_indexes: BTreeSet<&str> = old.indexes().iter().map(|i| i.name()).collect();
    let new_indexes: BTreeSet<&str> = new.indexes().iter().map(|i| i.name()).collect();
    if let Some(removed) = old_indexes.difference(&new_indexes).next() {
        return Err(Error::Migration(format!(
            "index {} on {} cannot be removed",
            removed,
            old.name()
        )));
    }

    // existing tables gain the new columns; new wide tables are created whole
    for field in new.fields().iter().filter(|f| old.field(&f.name).is_none()) {
        statements.extend(generator.make_alter_add_column(old, field));
    }
    for index in new.indexes().iter().filter(|i| !old_indexes.contains(i.name())) {
        statements.push(generator.make_wide_table_create(new, index));
    }
    Ok(statements)
}
