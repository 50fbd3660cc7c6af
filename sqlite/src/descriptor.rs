//! Per-entity migration hints.
//!
//! A [`SchemaDescriptor`] carries what a [`Shape`](shapedb_core::Shape)
//! alone cannot express: multi-column unique/index groups, prior column and
//! table names for rename-aware migration. A [`DatabaseSchema`] pairs each
//! declared entity name with its descriptor and is the input to database
//! setup, alongside the shape registry.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use shapedb_core::Shape;

/// One column reference inside an index group, with an optional ordering
/// modifier.
///
/// # Examples
///
/// ```
/// use shapedb_sqlite::IndexColumn;
///
/// let plain: IndexColumn = "city".into();
/// assert_eq!(plain.render(), "city");
///
/// let newest_first = IndexColumn::desc("created");
/// assert_eq!(newest_first.render(), "created DESC");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexColumn {
    /// Column name.
    pub name: String,
    /// DESC ordering within the index.
    pub descending: bool,
}

impl IndexColumn {
    /// Ascending column reference.
    pub fn asc(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            descending: false,
        }
    }

    /// Descending column reference.
    pub fn desc(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            descending: true,
        }
    }

    /// The column as it appears in CREATE INDEX.
    pub fn render(&self) -> String {
        if self.descending {
            format!("{} DESC", self.name)
        } else {
            self.name.clone()
        }
    }
}

impl From<&str> for IndexColumn {
    fn from(name: &str) -> Self {
        IndexColumn::asc(name)
    }
}

impl From<String> for IndexColumn {
    fn from(name: String) -> Self {
        IndexColumn::asc(name)
    }
}

/// An ordered list of columns covered by one index.
///
/// The canonical index name is derived from the entity name plus the column
/// list, so the same group always reconciles to the same physical index.
///
/// # Examples
///
/// ```
/// use shapedb_sqlite::ColumnGroup;
///
/// let group = ColumnGroup::new(["city", "name"]);
/// assert_eq!(group.index_name("profile"), "idx_profile_city_name");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnGroup {
    /// Columns in index order.
    pub columns: Vec<IndexColumn>,
}

impl ColumnGroup {
    /// Builds a group from anything convertible to column references.
    pub fn new<I, C>(columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<IndexColumn>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Single-column group.
    pub fn single(column: impl Into<IndexColumn>) -> Self {
        Self {
            columns: vec![column.into()],
        }
    }

    /// Column names in order, without modifiers.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Canonical physical index name for this group on the given table.
    pub fn index_name(&self, table: &str) -> String {
        format!("idx_{table}_{}", self.column_names().join("_"))
    }

    /// The column list as it appears in CREATE INDEX.
    pub fn render(&self) -> String {
        self.columns
            .iter()
            .map(IndexColumn::render)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Migration hints for one entity.
///
/// All parts are optional; an empty descriptor declares a table with no
/// extra indexes and no rename history.
///
/// # Examples
///
/// ```
/// use shapedb_sqlite::{ColumnGroup, SchemaDescriptor};
///
/// let descriptor = SchemaDescriptor::new()
///     .with_unique(ColumnGroup::new(["word"]))
///     .with_index(ColumnGroup::new(["number", "boolean"]))
///     .with_column_history("word", ["term"])
///     .with_table_history(["vocabulary"]);
///
/// assert_eq!(descriptor.unique.len(), 1);
/// assert_eq!(descriptor.column_names_history["word"], vec!["term"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    /// Unique index groups.
    pub unique: Vec<ColumnGroup>,
    /// Non-unique index groups.
    pub index: Vec<ColumnGroup>,
    /// Field name → prior names, newest first.
    pub column_names_history: BTreeMap<String, Vec<String>>,
    /// Prior table names, newest first.
    pub table_names_history: Vec<String>,
}

impl SchemaDescriptor {
    /// Empty descriptor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a unique index group.
    pub fn with_unique(mut self, group: ColumnGroup) -> Self {
        self.unique.push(group);
        self
    }

    /// Adds a non-unique index group.
    pub fn with_index(mut self, group: ColumnGroup) -> Self {
        self.index.push(group);
        self
    }

    /// Records prior names of a field.
    pub fn with_column_history<I, S>(mut self, field: impl Into<String>, prior: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.column_names_history
            .insert(field.into(), prior.into_iter().map(Into::into).collect());
        self
    }

    /// Records prior names of the table itself.
    pub fn with_table_history<I, S>(mut self, prior: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.table_names_history = prior.into_iter().map(Into::into).collect();
        self
    }

    /// The full unique and non-unique index groups for a shape.
    ///
    /// Field-level `unique`/`indexed` flags fold in as single-column groups.
    /// Groups are deduplicated by column list; a unique group wins over a
    /// non-unique group with the same columns. The primary field is skipped
    /// since its constraint already covers it.
    pub fn effective_groups(&self, shape: &Shape) -> (Vec<ColumnGroup>, Vec<ColumnGroup>) {
        let mut unique = self.unique.clone();
        let mut index = self.index.clone();

        for field in shape.persisted_fields() {
            if field.flags.primary {
                continue;
            }
            if field.flags.unique {
                unique.push(ColumnGroup::single(field.name.as_str()));
            } else if field.flags.indexed {
                index.push(ColumnGroup::single(field.name.as_str()));
            }
        }

        dedupe(&mut unique);
        dedupe(&mut index);
        let unique_keys: HashSet<String> = unique.iter().map(group_key).collect();
        index.retain(|group| !unique_keys.contains(&group_key(group)));
        (unique, index)
    }
}

fn group_key(group: &ColumnGroup) -> String {
    group.column_names().join("\u{1f}")
}

fn dedupe(groups: &mut Vec<ColumnGroup>) {
    let mut seen = HashSet::new();
    groups.retain(|group| seen.insert(group_key(group)));
}

/// The entities a database maps, in declaration order.
///
/// Pairs each entity name with its [`SchemaDescriptor`]. The entity name
/// must match a shape in the registry handed to setup.
///
/// # Examples
///
/// ```
/// use shapedb_sqlite::{DatabaseSchema, SchemaDescriptor};
///
/// let schema = DatabaseSchema::new()
///     .with_entity("profile", SchemaDescriptor::new())
///     .with_entity("entry", SchemaDescriptor::new());
///
/// assert_eq!(schema.names(), vec!["profile", "entry"]);
/// assert!(schema.get("entry").is_some());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSchema {
    /// Declared entities with their descriptors.
    pub entities: Vec<(String, SchemaDescriptor)>,
}

impl DatabaseSchema {
    /// Empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares an entity.
    pub fn with_entity(mut self, name: impl Into<String>, descriptor: SchemaDescriptor) -> Self {
        self.entities.push((name.into(), descriptor));
        self
    }

    /// Finds a descriptor by entity name.
    pub fn get(&self, name: &str) -> Option<&SchemaDescriptor> {
        self.entities
            .iter()
            .find(|(entity, _)| entity == name)
            .map(|(_, descriptor)| descriptor)
    }

    /// Declared entity names in order.
    pub fn names(&self) -> Vec<&str> {
        self.entities
            .iter()
            .map(|(entity, _)| entity.as_str())
            .collect()
    }

    /// Iterates declared entities in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SchemaDescriptor)> {
        self.entities
            .iter()
            .map(|(entity, descriptor)| (entity.as_str(), descriptor))
    }
}
