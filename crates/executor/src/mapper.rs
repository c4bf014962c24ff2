//! The object mapper.
//!
//! [`ObjectMapper`] is the application entry point. Every operation looks up
//! the object definition, compiles through the [`CqlGenerator`] and hands the
//! resulting statement iterators to the [`ExecutionCoordinator`].
//!
//! # Example
//!
//! ```ignore
//! use stratamap_executor::ObjectMapper;
//!
//! let mapper = ObjectMapper::new(session, keyspace, MapperConfig::default())?;
//! mapper.build_keyspace(false)?;
//!
//! let id = mapper.insert("places", record)?;
//! let east = mapper.list("places", &Criteria::new("region").key("region", "east"))?;
//! ```

use crate::migration::{AdditiveMigrator, KeyspaceMigrator};
use crate::visitor::ObjectVisitor;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use stratamap_core::{
    Criteria, Error, FieldType, Index, KeyspaceDefinition, ObjectDefinition, Record, Result, SortOrder,
    TimeId, Timestamp, Value, ID_FIELD,
};
use stratamap_cql::{Compaction, CqlGenerator, CqlStatement, ShardIdLookup, StatementIterator};
use stratamap_engine::{
    map_row, CqlExecutor, ExecutionCoordinator, ExecutionSettings, IndexReconciler, MapperConfig, Session,
    TableIndexUpdateQueue,
};
use tracing::{debug, info, warn};

/// Maps schema-described objects onto static and wide tables
pub struct ObjectMapper {
    config: MapperConfig,
    generator: CqlGenerator,
    coordinator: ExecutionCoordinator,
    keyspace: Arc<RwLock<KeyspaceDefinition>>,
}

impl ObjectMapper {
    /// Mapper over `session` for `keyspace`
    pub fn new(session: Arc<dyn Session>, keyspace: KeyspaceDefinition, config: MapperConfig) -> Result<Self> {
        config.validate()?;
        let executor = CqlExecutor::new(session, config.log_cql, config.cache_bounded_queries);
        let generator = CqlGenerator::new(keyspace.name.clone(), config.consistency_horizon());
        let coordinator = ExecutionCoordinator::new(executor, ExecutionSettings::from(&config));
        Ok(ObjectMapper {
            config,
            generator,
            coordinator,
            keyspace: Arc::new(RwLock::new(keyspace)),
        })
    }

    /// Mapper configured from a `stratamap.toml` file, written with defaults
    /// if it does not exist
    pub fn with_config_file(
        session: Arc<dyn Session>,
        keyspace: KeyspaceDefinition,
        path: impl AsRef<Path>,
    ) -> Result<Self> {
        ObjectMapper::new(session, keyspace, MapperConfig::load(path.as_ref())?)
    }

    /// Active configuration
    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    /// Statement compiler
    pub fn generator(&self) -> &CqlGenerator {
        &self.generator
    }

    /// Execution coordinator
    pub fn coordinator(&self) -> &ExecutionCoordinator {
        &self.coordinator
    }

    fn executor(&self) -> &CqlExecutor {
        self.coordinator.executor()
    }

    // =========================================================================
    // Keyspace
    // =========================================================================

    /// Snapshot of the keyspace definition
    pub fn keyspace_definition(&self) -> KeyspaceDefinition {
        self.keyspace.read().clone()
    }

    /// Definition of `object_type`
    pub fn definition(&self, object_type: &str) -> Result<ObjectDefinition> {
        self.keyspace.read().definition(object_type).cloned()
    }

    /// Replace the keyspace definition. The keyspace name is fixed for the
    /// life of the mapper.
    pub fn set_keyspace_definition(&self, keyspace: KeyspaceDefinition) -> Result<()> {
        let mut current = self.keyspace.write();
        if keyspace.name != current.name {
            return Err(Error::Config(format!(
                "mapper is bound to keyspace {}, not {}",
                current.name, keyspace.name
            )));
        }
        *current = keyspace;
        self.executor().clear_statement_cache();
        Ok(())
    }

    /// Create every object table plus the shard index and the update log.
    /// With `force_rebuild` the existing tables are dropped first. Tables
    /// that already exist, or are already gone, are not errors.
    pub fn build_keyspace(&self, force_rebuild: bool) -> Result<()> {
        let keyspace = self.keyspace_definition();
        if force_rebuild {
            for definition in &keyspace.definitions {
                self.run_admin(self.generator.make_drop(definition))?;
            }
            self.run_admin([
                self.generator.make_shard_index_table_drop(),
                self.generator.make_index_update_table_drop(),
            ])?;
            self.executor().clear_statement_cache();
        }
        for definition in &keyspace.definitions {
            self.run_admin(self.generator.make_create(definition))?;
        }
        self.run_admin([
            self.generator.make_shard_index_table_create(),
            self.generator.make_index_update_table_create(),
        ])?;
        info!(
            target: "stratamap::mapper",
            keyspace = %keyspace.name,
            object_types = keyspace.definitions.len(),
            force_rebuild,
            "Keyspace built"
        );
        Ok(())
    }

    /// Empty every table of the keyspace
    pub fn truncate_tables(&self) -> Result<()> {
        let keyspace = self.keyspace_definition();
        for definition in &keyspace.definitions {
            self.run_admin(self.generator.make_truncate(definition))?;
        }
        self.run_admin([
            self.generator.make_shard_index_table_truncate(),
            self.generator.make_index_update_table_truncate(),
        ])
    }

    /// Set the compaction strategy of every static and wide table
    pub fn set_compaction(&self, strategy: &str, options: BTreeMap<String, String>) -> Result<()> {
        let compaction = Compaction::new(strategy, options);
        let keyspace = self.keyspace_definition();
        let iterators = keyspace
            .definitions
            .iter()
            .map(|definition| self.generator.make_compaction(definition, &compaction))
            .collect();
        self.coordinator.execute_statements(iterators)?;
        info!(target: "stratamap::mapper", strategy, "Compaction set");
        Ok(())
    }

    /// Prepare every object type's insert statements ahead of the first
    /// write. Wide rows whose index filters reject zero values are skipped.
    pub fn pre_prepare_insert_statements(&self) -> Result<()> {
        let keyspace = self.keyspace_definition();
        for definition in &keyspace.definitions {
            let template: Record = definition
                .data_fields()
                .map(|f| (f.name.clone(), f.field_type.empty_value()))
                .collect();
            let key = definition.primary_key_type().empty_value();
            for statement in self.generator.make_insert(definition, &key, &template, None)? {
                self.executor().prepare(&statement)?;
            }
        }
        debug!(
            target: "stratamap::mapper",
            prepared = self.executor().cache().len(),
            "Insert statements prepared"
        );
        Ok(())
    }

    /// Create the table holding persisted keyspace definitions
    pub fn create_keyspace_definition_table(&self) -> Result<()> {
        self.run_admin([self.generator.make_keyspace_definitions_table_create()])
    }

    /// Persist `keyspace` as the newest version of its definition
    pub fn insert_keyspace_definition(&self, keyspace: &KeyspaceDefinition) -> Result<()> {
        let statement = self.generator.make_insert_keyspace_definition(keyspace)?;
        self.executor().execute(&statement)?;
        Ok(())
    }

    /// Newest persisted definition of keyspace `name`, if any
    pub fn hydrate_keyspace_definition(&self, name: &str) -> Result<Option<KeyspaceDefinition>> {
        let result = self
            .executor()
            .execute(&self.generator.make_get_keyspace_definition(name))?;
        let Some(row) = result.rows().first() else {
            return Ok(None);
        };
        match row.get("def").and_then(Value::as_str) {
            Some(json) => KeyspaceDefinition::from_json(json).map(Some),
            None => {
                warn!(target: "stratamap::mapper", keyspace = name, "Persisted keyspace definition has no body");
                Ok(None)
            }
        }
    }

    /// Migrate stored tables from `old` to `new` with the additive migrator.
    /// Returns the statements, executing them when `execute` is set.
    pub fn run_migration(
        &self,
        old: &KeyspaceDefinition,
        new: &KeyspaceDefinition,
        execute: bool,
    ) -> Result<Vec<CqlStatement>> {
        self.run_migration_with(&AdditiveMigrator, old, new, execute)
    }

    /// Migrate with a caller-supplied migrator
    pub fn run_migration_with(
        &self,
        migrator: &dyn KeyspaceMigrator,
        old: &KeyspaceDefinition,
        new: &KeyspaceDefinition,
        execute: bool,
    ) -> Result<Vec<CqlStatement>> {
        let statements = migrator.migration_statements(&self.generator, old, new)?;
        if execute {
            for statement in &statements {
                self.executor()
                    .execute(statement)
                    .map_err(|e| Error::Migration(format!("{}: {}", statement, e)))?;
            }
            self.executor().clear_statement_cache();
        }
        debug!(target: "stratamap::mapper", statements = statements.len(), execute, "Migration compiled");
        Ok(statements)
    }

    /// Statements one logical call may execute before failing with a
    /// fan-out error
    pub fn reasonable_statement_limit(&self) -> usize {
        self.coordinator.statement_ceiling()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Insert an object. The `id` in `data` is used when present, otherwise a
    /// new time id is generated. Returns the key.
    pub fn insert(&self, object_type: &str, data: Record) -> Result<Value> {
        self.insert_with_ttl(object_type, data, None)
    }

    /// Insert whose static and wide rows expire after `ttl` seconds
    pub fn insert_with_ttl(&self, object_type: &str, data: Record, ttl: Option<u32>) -> Result<Value> {
        let definition = self.definition(object_type)?;
        let (key, iterator) = self.compile_insert(&definition, data, None, ttl)?;
        self.coordinator.execute(iterator)?;
        Ok(key)
    }

    /// Insert with a time id generated for `at`
    pub fn insert_at(&self, object_type: &str, at: Timestamp, data: Record) -> Result<Value> {
        let definition = self.definition(object_type)?;
        let key_type = definition.primary_key_type();
        if key_type != FieldType::Timeuuid {
            return Err(Error::invalid_value(ID_FIELD, "timeuuid", key_type.cql_name()));
        }
        let (key, iterator) = self.compile_insert(&definition, data, Some(Value::from(TimeId::at(at))), None)?;
        self.coordinator.execute(iterator)?;
        Ok(key)
    }

    /// Insert objects of several types together. Every object compiles
    /// before anything executes; each counts as its own operation against
    /// the statement ceiling. Returns the keys in input order.
    pub fn insert_batch_mixed(&self, objects: Vec<(String, Record)>) -> Result<Vec<Value>> {
        let mut keys = Vec::with_capacity(objects.len());
        let mut iterators = Vec::with_capacity(objects.len());
        for (object_type, data) in objects {
            let definition = self.definition(&object_type)?;
            let (key, iterator) = self.compile_insert(&definition, data, None, None)?;
            keys.push(key);
            iterators.push(iterator);
        }
        debug!(target: "stratamap::mapper", objects = keys.len(), "Insert batch mixed");
        self.coordinator.execute_statements(iterators)?;
        Ok(keys)
    }

    /// Apply `changes` to the object stored under `key`
    pub fn update(&self, object_type: &str, key: Value, changes: Record) -> Result<Value> {
        let definition = self.definition(object_type)?;
        let key = definition.coerce_key(key)?;
        let mut changes = changes;
        changes.remove(ID_FIELD);
        let changes = definition.coerce_record(changes)?;
        let old = self.stored(&definition, &key)?;
        let iterator = self.generator.make_update(&definition, &key, &old, &changes, None)?;
        self.coordinator.execute(iterator)?;
        Ok(key)
    }

    /// Delete the object stored under `key` and its wide rows
    pub fn delete(&self, object_type: &str, key: Value) -> Result<()> {
        let definition = self.definition(object_type)?;
        let key = definition.coerce_key(key)?;
        let last_known = self.stored(&definition, &key)?;
        let iterator = self.generator.make_delete(&definition, &key, &last_known)?;
        self.coordinator.execute(iterator)
    }

    fn compile_insert(
        &self,
        definition: &ObjectDefinition,
        mut data: Record,
        key: Option<Value>,
        ttl: Option<u32>,
    ) -> Result<(Value, StatementIterator)> {
        let supplied = data.remove(ID_FIELD).filter(|v| !v.is_null());
        let key = match key.or(supplied) {
            Some(key) => definition.coerce_key(key)?,
            None => Value::from(TimeId::now()),
        };
        let data = definition.coerce_record(data)?;
        let iterator = self.generator.make_insert(definition, &key, &data, ttl)?;
        Ok((key, iterator))
    }

    /// Stored field values of `key`, without the id; empty when absent
    fn stored(&self, definition: &ObjectDefinition, key: &Value) -> Result<Record> {
        let mut object = self.fetch(definition, key)?.unwrap_or_default();
        object.remove(ID_FIELD);
        Ok(object)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// The object stored under `key`
    pub fn get_by_key(&self, object_type: &str, key: Value) -> Result<Option<Record>> {
        let definition = self.definition(object_type)?;
        let key = definition.coerce_key(key)?;
        self.fetch(&definition, &key)
    }

    /// Objects matching `criteria`, in the requested order
    pub fn list(&self, object_type: &str, criteria: &Criteria) -> Result<Vec<Record>> {
        let definition = self.definition(object_type)?;
        let iterator = self.generator.make_list(&definition, criteria, false, Some(self as &dyn ShardIdLookup))?;
        self.coordinator.map_results(iterator, &definition, criteria.limit)
    }

    /// Number of objects matching `criteria`, capped at its limit
    pub fn count(&self, object_type: &str, criteria: &Criteria) -> Result<u64> {
        let definition = self.definition(object_type)?;
        let iterator = self.generator.make_list(&definition, criteria, true, Some(self as &dyn ShardIdLookup))?;
        self.coordinator.map_count(iterator, &definition, criteria.limit)
    }

    /// Pass every stored object of `object_type` that the visitor includes
    /// to the visitor. Returns the number visited.
    pub fn visit_objects(&self, object_type: &str, visitor: &mut dyn ObjectVisitor) -> Result<usize> {
        let definition = self.definition(object_type)?;
        let mut visited = 0;
        for statement in self.generator.make_table_scan(&definition) {
            for row in self.executor().execute(&statement)?.into_rows() {
                let object = map_row(&definition, row);
                if visitor.should_include(&object) {
                    visitor.visit(object);
                    visited += 1;
                }
            }
        }
        Ok(visited)
    }

    fn fetch(&self, definition: &ObjectDefinition, key: &Value) -> Result<Option<Record>> {
        let iterator = self.generator.make_get(definition, key);
        Ok(self
            .coordinator
            .map_results(iterator, definition, 1)?
            .into_iter()
            .next())
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Reconciler draining this keyspace's update log. It shares the
    /// mapper's executor and sees later keyspace definition changes.
    pub fn reconciler(&self) -> IndexReconciler {
        let queue = TableIndexUpdateQueue::new(self.executor().clone(), self.generator.clone());
        IndexReconciler::new(
            self.executor().clone(),
            self.generator.clone(),
            Arc::clone(&self.keyspace),
            Arc::new(queue),
            self.config.reconciler.batch_size,
        )
    }

    fn run_admin(&self, statements: impl IntoIterator<Item = CqlStatement>) -> Result<()> {
        for statement in statements {
            match self.executor().execute(&statement) {
                Ok(_) => {}
                Err(e) if e.is_advisory() => {
                    debug!(target: "stratamap::mapper", query = %statement, error = %e, "Ignoring advisory error");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl ShardIdLookup for ObjectMapper {
    fn list_shard_ids(
        &self,
        definition: &ObjectDefinition,
        index: &Index,
        index_values: &Record,
        ordering: SortOrder,
        start: Option<Timestamp>,
        end: Timestamp,
    ) -> Result<Vec<i64>> {
        let statement = self
            .generator
            .make_get_shard_index_list(definition, index, index_values, ordering, start, end)?;
        let mut shards: Vec<i64> = self
            .executor()
            .execute(&statement)?
            .into_rows()
            .iter()
            .filter_map(|row| row.get("shardid").and_then(Value::as_int))
            .collect();
        shards.dedup();
        Ok(shards)
    }
}

impl std::fmt::Debug for ObjectMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectMapper")
            .field("keyspace", &self.generator.keyspace())
            .field("config", &self.config)
            .finish()
    }
}
