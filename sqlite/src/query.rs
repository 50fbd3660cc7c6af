//! Typed query builders over a single table.
//!
//! Builders are staged: a [`Select`] starts [`Fresh`], becomes [`Filtered`]
//! once a predicate group exists, and [`Ordered`] once a sort key is set.
//! Each transition consumes `self`, so the compiler rules out malformed
//! call orders (an `or` with no preceding `filter`, a filter added after
//! ordering) instead of leaving them to runtime checks.
//!
//! All builders validate against the table's shape when they run, compile
//! to `?`-parameterized SQL, and execute through the owning [`Engine`].
//! Nothing touches the store until the terminal `fetch()`/`run()` call.

use std::marker::PhantomData;

use serde_json::Value;
use shapedb_core::{Field, FieldType, Shape};

use crate::codec;
use crate::engine::{Engine, Row, ScalarValue};
use crate::error::{Result, StoreError};
use crate::predicate::{Predicate, WhereClause, persisted_field};

/// Stage marker: no predicate applied yet.
pub struct Fresh;

/// Stage marker: at least one predicate group present.
pub struct Filtered;

/// Stage marker: sort order chosen; only further sort keys and limits may
/// follow.
pub struct Ordered;

/// One ORDER BY key.
///
/// Plain column names convert to ascending keys, so `.order_by("number")`
/// and `.order_by(SortKey::asc("number"))` are the same query.
///
/// # Examples
///
/// ```
/// use shapedb_sqlite::SortKey;
///
/// let newest_first = SortKey::desc("dateUpdated");
/// let sparse_last = SortKey::asc("dateSynced").nulls_last();
/// let _ = (newest_first, sparse_last);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    column: String,
    descending: bool,
    nulls: Option<Nulls>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Nulls {
    First,
    Last,
}

impl SortKey {
    /// Ascending order on `column`.
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
            nulls: None,
        }
    }

    /// Descending order on `column`.
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
            nulls: None,
        }
    }

    /// Sorts NULL values before everything else.
    pub fn nulls_first(mut self) -> Self {
        self.nulls = Some(Nulls::First);
        self
    }

    /// Sorts NULL values after everything else.
    pub fn nulls_last(mut self) -> Self {
        self.nulls = Some(Nulls::Last);
        self
    }

    fn render(&self, shape: &Shape) -> Result<String> {
        persisted_field(shape, &self.column)?;
        let mut sql = self.column.clone();
        if self.descending {
            sql.push_str(" DESC");
        }
        match self.nulls {
            Some(Nulls::First) => sql.push_str(" NULLS FIRST"),
            Some(Nulls::Last) => sql.push_str(" NULLS LAST"),
            None => {}
        }
        Ok(sql)
    }
}

impl From<&str> for SortKey {
    fn from(column: &str) -> Self {
        SortKey::asc(column)
    }
}

impl From<String> for SortKey {
    fn from(column: String) -> Self {
        SortKey::asc(column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AggFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Total,
    GroupConcat,
}

impl AggFunc {
    fn sql(self) -> &'static str {
        match self {
            AggFunc::Count => "COUNT",
            AggFunc::Sum => "SUM",
            AggFunc::Avg => "AVG",
            AggFunc::Min => "MIN",
            AggFunc::Max => "MAX",
            AggFunc::Total => "TOTAL",
            AggFunc::GroupConcat => "GROUP_CONCAT",
        }
    }
}

/// One aggregate expression.
///
/// The result row of an [`Aggregate`] query is keyed by each expression's
/// [`render`](Agg::render) text, so `Agg::count_all()` produces the key
/// `"COUNT(*)"`.
///
/// # Examples
///
/// ```
/// use shapedb_sqlite::Agg;
///
/// assert_eq!(Agg::count_all().render(), "COUNT(*)");
/// assert_eq!(Agg::avg("number").render(), "AVG(number)");
/// assert_eq!(Agg::count("word").distinct().render(), "COUNT(DISTINCT word)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agg {
    func: AggFunc,
    column: Option<String>,
    distinct: bool,
    separator: Option<String>,
}

impl Agg {
    fn on(func: AggFunc, column: impl Into<String>) -> Self {
        Self {
            func,
            column: Some(column.into()),
            distinct: false,
            separator: None,
        }
    }

    /// `COUNT(*)` — counts rows.
    pub fn count_all() -> Self {
        Self {
            func: AggFunc::Count,
            column: None,
            distinct: false,
            separator: None,
        }
    }

    /// `COUNT(column)` — counts non-null values.
    pub fn count(column: impl Into<String>) -> Self {
        Self::on(AggFunc::Count, column)
    }

    /// `SUM(column)`
    pub fn sum(column: impl Into<String>) -> Self {
        Self::on(AggFunc::Sum, column)
    }

    /// `AVG(column)`
    pub fn avg(column: impl Into<String>) -> Self {
        Self::on(AggFunc::Avg, column)
    }

    /// `MIN(column)`
    pub fn min(column: impl Into<String>) -> Self {
        Self::on(AggFunc::Min, column)
    }

    /// `MAX(column)`
    pub fn max(column: impl Into<String>) -> Self {
        Self::on(AggFunc::Max, column)
    }

    /// `TOTAL(column)` — like SUM but yields 0.0 instead of NULL on no rows.
    pub fn total(column: impl Into<String>) -> Self {
        Self::on(AggFunc::Total, column)
    }

    /// `GROUP_CONCAT(column)` with the engine's default `,` separator.
    pub fn group_concat(column: impl Into<String>) -> Self {
        Self::on(AggFunc::GroupConcat, column)
    }

    /// `GROUP_CONCAT(column, separator)`.
    ///
    /// The separator is rendered as a quoted SQL literal inside the
    /// expression. SQL has no `GROUP_CONCAT(DISTINCT column, separator)`
    /// form, so combining this with [`distinct`](Agg::distinct) fails
    /// validation at fetch time.
    pub fn group_concat_sep(column: impl Into<String>, separator: impl Into<String>) -> Self {
        let mut agg = Self::on(AggFunc::GroupConcat, column);
        agg.separator = Some(separator.into());
        agg
    }

    /// Adds `DISTINCT` inside the call. Ignored for `COUNT(*)`.
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// The SQL text of this expression, which is also its key in the
    /// result row.
    pub fn render(&self) -> String {
        let func = self.func.sql();
        let Some(column) = &self.column else {
            return format!("{func}(*)");
        };
        let distinct = if self.distinct { "DISTINCT " } else { "" };
        match &self.separator {
            Some(sep) => {
                let literal = sep.replace('\'', "''");
                format!("{func}({distinct}{column}, '{literal}')")
            }
            None => format!("{func}({distinct}{column})"),
        }
    }

    fn check(&self, shape: &Shape) -> Result<()> {
        if self.distinct && self.separator.is_some() {
            return Err(StoreError::Validation(
                "GROUP_CONCAT takes DISTINCT or a separator, not both".to_string(),
            ));
        }
        if let Some(column) = &self.column {
            persisted_field(shape, column)?;
        }
        Ok(())
    }
}

struct Limit {
    count: u64,
    offset: u64,
}

/// Staged SELECT builder. Created by `Table::select`.
///
/// # Examples
///
/// ```no_run
/// use shapedb_core::ShapeRegistry;
/// use shapedb_sqlite::{Database, DatabaseSchema, Predicate, Result, SortKey};
///
/// fn demo() -> Result<()> {
///     let (db, _report) = Database::open_in_memory(ShapeRegistry::new(), DatabaseSchema::new())?;
///     let rows = db
///         .table("entry")?
///         .select(["id", "word"])
///         .filter(Predicate::eq("boolean", false))
///         .and(Predicate::between("number", 3, 8))
///         .order_by(SortKey::asc("number"))
///         .fetch()?;
///     println!("{} rows", rows.len());
///     Ok(())
/// }
/// ```
#[must_use = "a select does nothing until fetch() runs it"]
pub struct Select<'t, S = Fresh> {
    engine: &'t Engine,
    table: &'t str,
    shape: &'t Shape,
    columns: Vec<String>,
    clause: WhereClause,
    order: Vec<SortKey>,
    limit: Option<Limit>,
    pending: Option<StoreError>,
    _stage: PhantomData<S>,
}

impl<'t, S> Select<'t, S> {
    fn stage<T>(self) -> Select<'t, T> {
        Select {
            engine: self.engine,
            table: self.table,
            shape: self.shape,
            columns: self.columns,
            clause: self.clause,
            order: self.order,
            limit: self.limit,
            pending: self.pending,
            _stage: PhantomData,
        }
    }

    /// Sets the sort order. Further `order_by` calls append secondary keys.
    pub fn order_by(mut self, key: impl Into<SortKey>) -> Select<'t, Ordered> {
        self.order.push(key.into());
        self.stage()
    }

    /// Returns at most `count` rows.
    pub fn limit(mut self, count: u64) -> Self {
        self.limit = Some(Limit { count, offset: 0 });
        self
    }

    /// Returns at most `count` rows, skipping the first `offset`.
    pub fn limit_offset(mut self, count: u64, offset: u64) -> Self {
        self.limit = Some(Limit { count, offset });
        self
    }

    /// Compiles and runs the query, decoding each row per the shape:
    /// boolean columns come back as `bool`, structured columns pass
    /// through the codec, everything else is returned as stored.
    pub fn fetch(self) -> Result<Vec<Row>> {
        if let Some(err) = self.pending {
            return Err(err);
        }
        let columns = resolve_columns(self.shape, &self.columns)?;
        let compiled = self.clause.compile(self.shape)?;

        let mut sql = format!("SELECT {} FROM {}", columns.join(", "), self.table);
        sql.push_str(&compiled.sql);
        if !self.order.is_empty() {
            let keys = self
                .order
                .iter()
                .map(|key| key.render(self.shape))
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&keys.join(", "));
        }
        if let Some(limit) = &self.limit {
            sql.push_str(&format!(" LIMIT {}", limit.count));
            if limit.offset > 0 {
                sql.push_str(&format!(" OFFSET {}", limit.offset));
            }
        }

        let rows = self.engine.read(|tx| tx.query(&sql, &compiled.args))?;
        rows.into_iter()
            .map(|row| decode_row(self.shape, row))
            .collect()
    }
}

impl<'t> Select<'t, Fresh> {
    pub(crate) fn new(
        engine: &'t Engine,
        table: &'t str,
        shape: &'t Shape,
        columns: Vec<String>,
    ) -> Self {
        Self {
            engine,
            table,
            shape,
            columns,
            clause: WhereClause::new(),
            order: Vec::new(),
            limit: None,
            pending: None,
            _stage: PhantomData,
        }
    }

    /// Starts the first predicate group.
    pub fn filter(mut self, predicate: Predicate) -> Select<'t, Filtered> {
        self.clause.start_group(predicate);
        self.stage()
    }

    /// Equality on every present key of `partial`, all AND-joined.
    ///
    /// A JSON null compares with SQL equality and so never matches; use
    /// [`Predicate::is_null`] for null checks.
    pub fn match_fields(mut self, partial: &Row) -> Select<'t, Filtered> {
        for (key, value) in partial {
            match ScalarValue::from_json(value) {
                Ok(scalar) => self.clause.start_group(Predicate::eq(key.clone(), scalar)),
                Err(err) => {
                    self.pending.get_or_insert(err);
                }
            }
        }
        self.stage()
    }

    /// Prefix search: `text` is split on whitespace, and every token must
    /// match `LIKE 'token%'` on at least one of the listed columns.
    pub fn search<I, C>(mut self, text: &str, columns: I) -> Select<'t, Filtered>
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        for token in text.split_whitespace() {
            let mut remaining = columns.iter();
            if let Some(first) = remaining.next() {
                self.clause
                    .start_group(Predicate::like(first.clone(), format!("{token}%")));
                for column in remaining {
                    self.clause
                        .extend_group(Predicate::like(column.clone(), format!("{token}%")));
                }
            }
        }
        self.stage()
    }
}

impl<'t> Select<'t, Filtered> {
    /// Starts a new AND-joined predicate group.
    pub fn and(mut self, predicate: Predicate) -> Self {
        self.clause.start_group(predicate);
        self
    }

    /// Appends an OR-alternative to the current group.
    pub fn or(mut self, predicate: Predicate) -> Self {
        self.clause.extend_group(predicate);
        self
    }
}

/// Staged aggregate builder. Created by `Table::aggregate`.
///
/// `fetch()` returns a single row keyed by each expression's rendered SQL
/// text, with raw engine values (no shape decoding).
#[must_use = "an aggregate does nothing until fetch() runs it"]
pub struct Aggregate<'t, S = Fresh> {
    engine: &'t Engine,
    table: &'t str,
    shape: &'t Shape,
    aggs: Vec<Agg>,
    clause: WhereClause,
    _stage: PhantomData<S>,
}

impl<'t, S> Aggregate<'t, S> {
    fn stage<T>(self) -> Aggregate<'t, T> {
        Aggregate {
            engine: self.engine,
            table: self.table,
            shape: self.shape,
            aggs: self.aggs,
            clause: self.clause,
            _stage: PhantomData,
        }
    }

    /// Compiles and runs the aggregation, returning its single result row.
    pub fn fetch(self) -> Result<Row> {
        if self.aggs.is_empty() {
            return Err(StoreError::Validation(format!(
                "aggregate on '{}' has no expressions",
                self.table
            )));
        }
        for agg in &self.aggs {
            agg.check(self.shape)?;
        }
        let exprs: Vec<String> = self.aggs.iter().map(Agg::render).collect();
        let compiled = self.clause.compile(self.shape)?;
        let sql = format!(
            "SELECT {} FROM {}{}",
            exprs.join(", "),
            self.table,
            compiled.sql
        );
        let rows = self.engine.read(|tx| tx.query(&sql, &compiled.args))?;
        Ok(rows.into_iter().next().unwrap_or_default())
    }
}

impl<'t> Aggregate<'t, Fresh> {
    pub(crate) fn new(
        engine: &'t Engine,
        table: &'t str,
        shape: &'t Shape,
        aggs: Vec<Agg>,
    ) -> Self {
        Self {
            engine,
            table,
            shape,
            aggs,
            clause: WhereClause::new(),
            _stage: PhantomData,
        }
    }

    /// Starts the first predicate group.
    pub fn filter(mut self, predicate: Predicate) -> Aggregate<'t, Filtered> {
        self.clause.start_group(predicate);
        self.stage()
    }
}

impl<'t> Aggregate<'t, Filtered> {
    /// Starts a new AND-joined predicate group.
    pub fn and(mut self, predicate: Predicate) -> Self {
        self.clause.start_group(predicate);
        self
    }

    /// Appends an OR-alternative to the current group.
    pub fn or(mut self, predicate: Predicate) -> Self {
        self.clause.extend_group(predicate);
        self
    }
}

/// Multi-row upsert builder. Created by `Table::insert`.
#[must_use = "an insert does nothing until run() executes it"]
pub struct Insert<'t> {
    engine: &'t Engine,
    table: &'t str,
    shape: &'t Shape,
    objects: Vec<Row>,
}

impl<'t> Insert<'t> {
    pub(crate) fn new(
        engine: &'t Engine,
        table: &'t str,
        shape: &'t Shape,
        objects: Vec<Row>,
    ) -> Self {
        Self {
            engine,
            table,
            shape,
            objects,
        }
    }

    /// Validates every object, then writes them all in a single
    /// `INSERT OR REPLACE` statement.
    ///
    /// Each object is projected onto the shape's persisted columns in
    /// declaration order; keys outside the shape are ignored. A required
    /// field that is absent or null fails validation before anything is
    /// written, except a Number primary key, which may stay absent so the
    /// store assigns the rowid. An empty object list is a no-op.
    ///
    /// Returns the number of rows written.
    pub fn run(self) -> Result<usize> {
        if self.objects.is_empty() {
            return Ok(0);
        }
        let fields: Vec<&Field> = self.shape.persisted_fields().collect();

        let mut args = Vec::with_capacity(self.objects.len() * fields.len());
        for object in &self.objects {
            for field in &fields {
                args.push(insert_value(self.shape, field, object.get(&field.name))?);
            }
        }

        let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        let row = format!("({})", vec!["?"; fields.len()].join(", "));
        let values = vec![row; self.objects.len()].join(", ");
        let sql = format!(
            "INSERT OR REPLACE INTO {} ({}) VALUES {}",
            self.table,
            names.join(", "),
            values
        );
        self.engine.write(|tx| tx.execute(&sql, &args))
    }
}

/// Staged UPDATE builder over a partial entity. Created by `Table::update`.
///
/// Running it [`Fresh`] updates every row; add predicates to narrow the
/// target set.
#[must_use = "an update does nothing until run() executes it"]
pub struct Update<'t, S = Fresh> {
    engine: &'t Engine,
    table: &'t str,
    shape: &'t Shape,
    changes: Row,
    clause: WhereClause,
    _stage: PhantomData<S>,
}

impl<'t, S> Update<'t, S> {
    fn stage<T>(self) -> Update<'t, T> {
        Update {
            engine: self.engine,
            table: self.table,
            shape: self.shape,
            changes: self.changes,
            clause: self.clause,
            _stage: PhantomData,
        }
    }

    /// Compiles and runs the update; returns the affected row count.
    ///
    /// Setting a required field to null fails validation before the write.
    pub fn run(self) -> Result<usize> {
        let (set, mut args) = render_set(self.shape, &self.changes)?;
        let compiled = self.clause.compile(self.shape)?;
        args.extend(compiled.args);
        let sql = format!("UPDATE {} SET {}{}", self.table, set, compiled.sql);
        self.engine.write(|tx| tx.execute(&sql, &args))
    }
}

impl<'t> Update<'t, Fresh> {
    pub(crate) fn new(engine: &'t Engine, table: &'t str, shape: &'t Shape, changes: Row) -> Self {
        Self {
            engine,
            table,
            shape,
            changes,
            clause: WhereClause::new(),
            _stage: PhantomData,
        }
    }

    /// Starts the first predicate group.
    pub fn filter(mut self, predicate: Predicate) -> Update<'t, Filtered> {
        self.clause.start_group(predicate);
        self.stage()
    }
}

impl<'t> Update<'t, Filtered> {
    /// Starts a new AND-joined predicate group.
    pub fn and(mut self, predicate: Predicate) -> Self {
        self.clause.start_group(predicate);
        self
    }

    /// Appends an OR-alternative to the current group.
    pub fn or(mut self, predicate: Predicate) -> Self {
        self.clause.extend_group(predicate);
        self
    }
}

/// Per-object update keyed by primary key. Created by
/// `Table::update_multiple`.
#[must_use = "an update does nothing until run() executes it"]
pub struct UpdateMultiple<'t> {
    engine: &'t Engine,
    table: &'t str,
    shape: &'t Shape,
    objects: Vec<Row>,
}

impl<'t> UpdateMultiple<'t> {
    pub(crate) fn new(
        engine: &'t Engine,
        table: &'t str,
        shape: &'t Shape,
        objects: Vec<Row>,
    ) -> Self {
        Self {
            engine,
            table,
            shape,
            objects,
        }
    }

    /// Runs one `UPDATE … WHERE pk = ?` per object, all inside a single
    /// write transaction; any validation or engine error rolls the whole
    /// batch back.
    ///
    /// Every object must carry a non-null primary key plus at least one
    /// other field. Returns the total affected row count.
    pub fn run(self) -> Result<usize> {
        if self.objects.is_empty() {
            return Ok(0);
        }
        let pk = self.shape.primary_field().ok_or_else(|| {
            StoreError::Validation(format!(
                "shape '{}' has no primary field to update by",
                self.shape.name
            ))
        })?;

        let mut updates = Vec::with_capacity(self.objects.len());
        for object in &self.objects {
            let pk_value = object
                .get(&pk.name)
                .filter(|value| !value.is_null())
                .ok_or_else(|| {
                    StoreError::Validation(format!(
                        "object for '{}' is missing primary key '{}'",
                        self.shape.name, pk.name
                    ))
                })?;
            let mut changes = object.clone();
            changes.remove(&pk.name);
            let (set, mut args) = render_set(self.shape, &changes)?;
            args.push(bind_value(pk, pk_value)?);
            updates.push((
                format!("UPDATE {} SET {} WHERE {} = ?", self.table, set, pk.name),
                args,
            ));
        }

        self.engine.write(|tx| {
            let mut total = 0;
            for (sql, args) in &updates {
                total += tx.execute(sql, args)?;
            }
            Ok(total)
        })
    }
}

/// Staged DELETE builder. Created by `Table::delete`.
///
/// Running it [`Fresh`] deletes every row.
#[must_use = "a delete does nothing until run() executes it"]
pub struct Delete<'t, S = Fresh> {
    engine: &'t Engine,
    table: &'t str,
    shape: &'t Shape,
    clause: WhereClause,
    _stage: PhantomData<S>,
}

impl<'t, S> Delete<'t, S> {
    fn stage<T>(self) -> Delete<'t, T> {
        Delete {
            engine: self.engine,
            table: self.table,
            shape: self.shape,
            clause: self.clause,
            _stage: PhantomData,
        }
    }

    /// Compiles and runs the delete; returns the affected row count.
    pub fn run(self) -> Result<usize> {
        let compiled = self.clause.compile(self.shape)?;
        let sql = format!("DELETE FROM {}{}", self.table, compiled.sql);
        self.engine.write(|tx| tx.execute(&sql, &compiled.args))
    }
}

impl<'t> Delete<'t, Fresh> {
    pub(crate) fn new(engine: &'t Engine, table: &'t str, shape: &'t Shape) -> Self {
        Self {
            engine,
            table,
            shape,
            clause: WhereClause::new(),
            _stage: PhantomData,
        }
    }

    /// Starts the first predicate group.
    pub fn filter(mut self, predicate: Predicate) -> Delete<'t, Filtered> {
        self.clause.start_group(predicate);
        self.stage()
    }
}

impl<'t> Delete<'t, Filtered> {
    /// Starts a new AND-joined predicate group.
    pub fn and(mut self, predicate: Predicate) -> Self {
        self.clause.start_group(predicate);
        self
    }

    /// Appends an OR-alternative to the current group.
    pub fn or(mut self, predicate: Predicate) -> Self {
        self.clause.extend_group(predicate);
        self
    }
}

fn resolve_columns(shape: &Shape, requested: &[String]) -> Result<Vec<String>> {
    if requested.is_empty() {
        return Ok(shape.persisted_fields().map(|f| f.name.clone()).collect());
    }
    for name in requested {
        persisted_field(shape, name)?;
    }
    Ok(requested.to_vec())
}

fn decode_row(shape: &Shape, mut row: Row) -> Result<Row> {
    for (key, value) in row.iter_mut() {
        let Some(field) = shape.field(key) else {
            continue;
        };
        match &field.ty {
            FieldType::Boolean => {
                if let Some(i) = value.as_i64() {
                    *value = Value::Bool(i != 0);
                }
            }
            ty if ty.is_structured() => {
                if let Value::String(text) = value {
                    let decoded = codec::decode_field(ty, text)?;
                    *value = decoded;
                }
            }
            _ => {}
        }
    }
    Ok(row)
}

fn insert_value(shape: &Shape, field: &Field, value: Option<&Value>) -> Result<ScalarValue> {
    match value {
        None | Some(Value::Null) => {
            let rowid_primary = field.flags.primary && field.ty == FieldType::Number;
            if field.flags.required && !rowid_primary {
                return Err(StoreError::Validation(format!(
                    "required field '{}' of '{}' is missing",
                    field.name, shape.name
                )));
            }
            Ok(ScalarValue::Null)
        }
        Some(value) => bind_value(field, value),
    }
}

fn bind_value(field: &Field, value: &Value) -> Result<ScalarValue> {
    if field.ty.is_structured() {
        Ok(ScalarValue::Text(codec::encode_field(&field.ty, value)?))
    } else {
        ScalarValue::from_json(value)
    }
}

fn render_set(shape: &Shape, changes: &Row) -> Result<(String, Vec<ScalarValue>)> {
    if changes.is_empty() {
        return Err(StoreError::Validation(format!(
            "update on '{}' has no fields to set",
            shape.name
        )));
    }
    let mut pairs = Vec::with_capacity(changes.len());
    let mut args = Vec::with_capacity(changes.len());
    for (key, value) in changes {
        let field = persisted_field(shape, key)?;
        if value.is_null() {
            if field.flags.required {
                return Err(StoreError::Validation(format!(
                    "required field '{key}' of '{}' cannot be set to null",
                    shape.name
                )));
            }
            args.push(ScalarValue::Null);
        } else {
            args.push(bind_value(field, value)?);
        }
        pairs.push(format!("{key} = ?"));
    }
    Ok((pairs.join(", "), args))
}
