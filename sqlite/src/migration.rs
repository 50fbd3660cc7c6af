//! Fingerprint-driven schema migration.
//!
//! Runs once per [`Database`](crate::Database) open, before any query is
//! possible. The declared schema is hashed; when the stored hash matches,
//! nothing happens. When it differs, each declared entity is reconciled
//! against the physical store: tables and columns are renamed along their
//! declared histories, missing columns are added, indexes are dropped and
//! recreated until they converge on the declaration, and tables or columns
//! that left the declaration are removed.
//!
//! All DDL of one run executes inside a single write transaction; a failing
//! step rolls everything back and leaves the previous schema intact.
//! Introspection pragmas run read-only before that transaction opens.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use shapedb_core::{Field, FieldType, Shape, ShapeRegistry};
use tracing::{debug, info, warn};

use crate::descriptor::{DatabaseSchema, SchemaDescriptor};
use crate::engine::{ColumnInfo, Engine, IndexInfo, ScalarValue, Tx};
use crate::error::{Result, StoreError};

pub(crate) const CONFIG_TABLE: &str = "_Config";
const SCHEMA_HASH_KEY: &str = "schemaHash";
const TABLE_NAMES_KEY: &str = "tableNames";

/// Which branch a migration run took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MigrationOutcome {
    /// No schema was stored; all tables were created fresh.
    Created,
    /// Stored and declared fingerprints matched; no DDL ran.
    #[default]
    NoOp,
    /// Fingerprints differed; reconciliation steps ran.
    Migrated,
}

/// What a migration run did, step by step.
///
/// The counters let callers assert schema stability directly: opening the
/// same declaration twice must yield [`is_noop`](MigrationReport::is_noop)
/// on the second run, with every counter zero.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MigrationReport {
    /// Branch taken by this run.
    pub outcome: MigrationOutcome,
    /// Tables created from scratch.
    pub tables_created: usize,
    /// Tables renamed along their declared history.
    pub tables_renamed: usize,
    /// Previously-declared tables dropped.
    pub tables_dropped: usize,
    /// Columns added for newly declared fields.
    pub columns_added: usize,
    /// Columns renamed along their declared history.
    pub columns_renamed: usize,
    /// Undeclared columns dropped.
    pub columns_dropped: usize,
    /// Undeclared columns nulled out where DROP COLUMN is unavailable.
    pub columns_cleared: usize,
    /// Indexes created.
    pub indexes_created: usize,
    /// Indexes dropped (stale, or recreated with different uniqueness).
    pub indexes_dropped: usize,
}

impl MigrationReport {
    /// Whether the run left the store untouched.
    pub fn is_noop(&self) -> bool {
        matches!(self.outcome, MigrationOutcome::NoOp)
    }
}

struct StoredConfig {
    schema_hash: i64,
    table_names: Vec<String>,
}

struct SourcePlan {
    name: String,
    columns: Vec<ColumnInfo>,
    indexes: Vec<IndexInfo>,
}

struct TablePlan<'p> {
    shape: &'p Shape,
    descriptor: &'p SchemaDescriptor,
    source: Option<SourcePlan>,
}

/// One migration run over a declared schema.
pub(crate) struct Migrator<'a> {
    engine: &'a Engine,
    registry: &'a ShapeRegistry,
    schema: &'a DatabaseSchema,
    fingerprint: i64,
    drop_column_supported: bool,
}

impl<'a> Migrator<'a> {
    pub(crate) fn new(
        engine: &'a Engine,
        registry: &'a ShapeRegistry,
        schema: &'a DatabaseSchema,
        fingerprint: i64,
    ) -> Self {
        Self {
            engine,
            registry,
            schema,
            fingerprint,
            drop_column_supported: rusqlite::version_number() >= 3_035_000,
        }
    }

    #[cfg(test)]
    fn with_drop_column_support(mut self, supported: bool) -> Self {
        self.drop_column_supported = supported;
        self
    }

    /// Ensures the config table, compares fingerprints, and runs whichever
    /// branch applies.
    pub(crate) fn run(&self) -> Result<MigrationReport> {
        self.ensure_config_table()?;
        match self.stored_config()? {
            None => self.create_from_scratch(),
            Some(config) if config.schema_hash == self.fingerprint => {
                debug!(fingerprint = self.fingerprint, "Schema fingerprint unchanged");
                Ok(MigrationReport::default())
            }
            Some(config) => self.migrate(&config),
        }
    }

    fn ensure_config_table(&self) -> Result<()> {
        self.engine.write(|tx| {
            tx.execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {CONFIG_TABLE} (key PRIMARY KEY NOT NULL, value NOT NULL)"
                ),
                &[],
            )
            .map(|_| ())
        })
    }

    fn stored_config(&self) -> Result<Option<StoredConfig>> {
        let rows = self
            .engine
            .read(|tx| tx.query(&format!("SELECT key, value FROM {CONFIG_TABLE}"), &[]))?;

        let mut schema_hash = None;
        let mut table_names = Vec::new();
        for row in &rows {
            match row.get("key").and_then(Value::as_str) {
                Some(SCHEMA_HASH_KEY) => schema_hash = row.get("value").and_then(Value::as_i64),
                Some(TABLE_NAMES_KEY) => {
                    if let Some(csv) = row.get("value").and_then(Value::as_str) {
                        table_names = csv
                            .split(',')
                            .filter(|name| !name.is_empty())
                            .map(String::from)
                            .collect();
                    }
                }
                _ => {}
            }
        }
        Ok(schema_hash.map(|schema_hash| StoredConfig {
            schema_hash,
            table_names,
        }))
    }

    fn write_config(&self, tx: &Tx<'_>) -> Result<()> {
        tx.execute(
            &format!("REPLACE INTO {CONFIG_TABLE} (key, value) VALUES (?, ?)"),
            &[
                ScalarValue::Text(SCHEMA_HASH_KEY.to_string()),
                ScalarValue::Integer(self.fingerprint),
            ],
        )?;
        tx.execute(
            &format!("REPLACE INTO {CONFIG_TABLE} (key, value) VALUES (?, ?)"),
            &[
                ScalarValue::Text(TABLE_NAMES_KEY.to_string()),
                ScalarValue::Text(self.schema.names().join(",")),
            ],
        )?;
        Ok(())
    }

    fn shape(&self, name: &str) -> Result<&'a Shape> {
        self.registry
            .get(name)
            .ok_or_else(|| StoreError::UnknownTable(name.to_string()))
    }

    fn create_from_scratch(&self) -> Result<MigrationReport> {
        let mut report = MigrationReport {
            outcome: MigrationOutcome::Created,
            ..MigrationReport::default()
        };
        self.engine.write(|tx| {
            for (name, descriptor) in self.schema.iter() {
                let shape = self.shape(name)?;
                self.create_table(tx, shape, descriptor, &mut report)?;
            }
            self.write_config(tx)
        })?;
        info!(
            tables = report.tables_created,
            indexes = report.indexes_created,
            "Created schema"
        );
        Ok(report)
    }

    fn migrate(&self, config: &StoredConfig) -> Result<MigrationReport> {
        let mut report = MigrationReport {
            outcome: MigrationOutcome::Migrated,
            ..MigrationReport::default()
        };

        let live: BTreeSet<String> = self.engine.user_tables()?.into_iter().collect();
        let declared: BTreeSet<&str> = self.schema.names().into_iter().collect();

        // Resolve every entity's physical source table before any DDL runs.
        // A history candidate counts only while it is live, not itself a
        // declared table, and not already claimed by an earlier entity.
        let mut sources: Vec<Option<String>> = Vec::new();
        let mut claimed: BTreeSet<String> = BTreeSet::new();
        for (name, descriptor) in self.schema.iter() {
            if live.contains(name) {
                claimed.insert(name.to_string());
                sources.push(Some(name.to_string()));
                continue;
            }
            let candidates: Vec<String> = descriptor
                .table_names_history
                .iter()
                .filter(|prior| {
                    live.contains(prior.as_str())
                        && !declared.contains(prior.as_str())
                        && !claimed.contains(prior.as_str())
                })
                .cloned()
                .collect();
            match candidates.as_slice() {
                [] => sources.push(None),
                [single] => {
                    claimed.insert(single.clone());
                    sources.push(Some(single.clone()));
                }
                _ => {
                    return Err(StoreError::MigrationAmbiguity {
                        entity: name.to_string(),
                        candidates,
                    });
                }
            }
        }

        let source_names: Vec<&str> = sources.iter().flatten().map(String::as_str).collect();
        let mut all_columns = self.engine.table_columns(&source_names)?;
        let mut all_indexes = self.engine.table_indexes(&source_names)?;

        let mut plans: Vec<TablePlan<'_>> = Vec::with_capacity(sources.len());
        let mut cursor = 0;
        for ((name, descriptor), source) in self.schema.iter().zip(&sources) {
            let shape = self.shape(name)?;
            let source = source.as_ref().map(|table| {
                let plan = SourcePlan {
                    name: table.clone(),
                    columns: std::mem::take(&mut all_columns[cursor]),
                    indexes: std::mem::take(&mut all_indexes[cursor]),
                };
                cursor += 1;
                plan
            });
            plans.push(TablePlan {
                shape,
                descriptor,
                source,
            });
        }

        self.engine.write(|tx| {
            for plan in &plans {
                match &plan.source {
                    None => self.create_table(tx, plan.shape, plan.descriptor, &mut report)?,
                    Some(source) => {
                        self.migrate_table(tx, plan.shape, plan.descriptor, source, &mut report)?
                    }
                }
            }

            // Tables the previous declaration tracked that nothing declares
            // or claims anymore.
            for old in &config.table_names {
                if declared.contains(old.as_str())
                    || claimed.contains(old.as_str())
                    || !live.contains(old.as_str())
                {
                    continue;
                }
                tx.execute(&format!("DROP TABLE {old}"), &[])?;
                report.tables_dropped += 1;
            }

            self.write_config(tx)
        })?;

        info!(
            tables_created = report.tables_created,
            tables_renamed = report.tables_renamed,
            tables_dropped = report.tables_dropped,
            columns_added = report.columns_added,
            columns_renamed = report.columns_renamed,
            columns_dropped = report.columns_dropped,
            indexes_created = report.indexes_created,
            indexes_dropped = report.indexes_dropped,
            "Migrated schema"
        );
        Ok(report)
    }

    fn create_table(
        &self,
        tx: &Tx<'_>,
        shape: &Shape,
        descriptor: &SchemaDescriptor,
        report: &mut MigrationReport,
    ) -> Result<()> {
        let defs: Vec<String> = shape.persisted_fields().map(column_def).collect();
        tx.execute(
            &format!("CREATE TABLE {} ({})", shape.name, defs.join(", ")),
            &[],
        )?;
        report.tables_created += 1;
        debug!(table = shape.name.as_str(), "Created table");
        self.reconcile_indexes(tx, shape, descriptor, &[], report)
    }

    fn migrate_table(
        &self,
        tx: &Tx<'_>,
        shape: &Shape,
        descriptor: &SchemaDescriptor,
        source: &SourcePlan,
        report: &mut MigrationReport,
    ) -> Result<()> {
        let table = shape.name.as_str();
        if source.name != table {
            tx.execute(
                &format!("ALTER TABLE {} RENAME TO {table}", source.name),
                &[],
            )?;
            report.tables_renamed += 1;
            info!(from = source.name.as_str(), to = table, "Renamed table");
        }

        let mut physical: Vec<String> = source.columns.iter().map(|c| c.name.clone()).collect();

        for field in shape.persisted_fields() {
            if physical.iter().any(|column| column == &field.name) {
                continue;
            }
            let candidates: Vec<String> = descriptor
                .column_names_history
                .get(&field.name)
                .into_iter()
                .flatten()
                .filter(|prior| physical.iter().any(|column| column == *prior))
                .cloned()
                .collect();
            match candidates.as_slice() {
                [prior] => {
                    tx.execute(
                        &format!("ALTER TABLE {table} RENAME COLUMN {prior} TO {}", field.name),
                        &[],
                    )?;
                    if let Some(slot) = physical
                        .iter_mut()
                        .find(|column| column.as_str() == prior.as_str())
                    {
                        *slot = field.name.clone();
                    }
                    report.columns_renamed += 1;
                }
                [] => {
                    // Adding a required or primary column to a live table
                    // cannot be satisfied for existing rows.
                    if field.flags.required || field.flags.primary {
                        return Err(StoreError::SchemaViolation {
                            table: table.to_string(),
                            column: field.name.clone(),
                        });
                    }
                    tx.execute(
                        &format!("ALTER TABLE {table} ADD COLUMN {}", field.name),
                        &[],
                    )?;
                    physical.push(field.name.clone());
                    report.columns_added += 1;
                }
                _ => {
                    return Err(StoreError::MigrationAmbiguity {
                        entity: format!("{table}.{}", field.name),
                        candidates,
                    });
                }
            }
        }

        self.reconcile_indexes(tx, shape, descriptor, &source.indexes, report)?;

        let declared_columns: BTreeSet<&str> =
            shape.persisted_fields().map(|f| f.name.as_str()).collect();
        for column in &physical {
            if declared_columns.contains(column.as_str()) {
                continue;
            }
            if self.drop_column_supported {
                tx.execute(&format!("ALTER TABLE {table} DROP COLUMN {column}"), &[])?;
                report.columns_dropped += 1;
            } else if source
                .columns
                .iter()
                .any(|info| info.name == *column && info.not_null)
            {
                // A NOT NULL constraint blocks the null-out, so the stale
                // values stay in place.
                warn!(
                    table,
                    column = column.as_str(),
                    "DROP COLUMN unavailable and column is NOT NULL, keeping values"
                );
            } else {
                // Lossy fallback: the column body is removed even though
                // the column itself has to stay.
                warn!(
                    table,
                    column = column.as_str(),
                    "DROP COLUMN unavailable, clearing values instead"
                );
                tx.execute(&format!("UPDATE {table} SET {column} = NULL"), &[])?;
                report.columns_cleared += 1;
            }
        }
        Ok(())
    }

    fn reconcile_indexes(
        &self,
        tx: &Tx<'_>,
        shape: &Shape,
        descriptor: &SchemaDescriptor,
        existing: &[IndexInfo],
        report: &mut MigrationReport,
    ) -> Result<()> {
        let table = shape.name.as_str();
        let (unique, regular) = descriptor.effective_groups(shape);

        let mut wanted: BTreeMap<String, bool> = BTreeMap::new();
        for group in &unique {
            wanted.insert(group.index_name(table), true);
        }
        for group in &regular {
            wanted.insert(group.index_name(table), false);
        }

        // An existing user index survives only under its canonical name with
        // the declared uniqueness. Everything else goes, including indexes
        // whose column list changed (the name changes with it).
        let mut healthy: BTreeSet<String> = BTreeSet::new();
        for index in existing {
            if index.origin != "c" {
                continue;
            }
            if wanted.get(&index.name) == Some(&index.unique) {
                healthy.insert(index.name.clone());
            } else {
                tx.execute(&format!("DROP INDEX {}", index.name), &[])?;
                report.indexes_dropped += 1;
            }
        }

        for (group, is_unique) in unique
            .iter()
            .map(|group| (group, true))
            .chain(regular.iter().map(|group| (group, false)))
        {
            let name = group.index_name(table);
            if healthy.contains(&name) {
                continue;
            }
            let keyword = if is_unique { "UNIQUE " } else { "" };
            tx.execute(
                &format!(
                    "CREATE {keyword}INDEX IF NOT EXISTS {name} ON {table} ({})",
                    group.render()
                ),
                &[],
            )?;
            report.indexes_created += 1;
        }
        Ok(())
    }
}

fn column_def(field: &Field) -> String {
    let mut def = field.name.clone();
    if field.flags.primary {
        // A Number primary becomes the rowid alias.
        if field.ty == FieldType::Number {
            def.push_str(" INTEGER");
        }
        def.push_str(" PRIMARY KEY");
    }
    if field.flags.required {
        def.push_str(" NOT NULL");
    }
    def
}
