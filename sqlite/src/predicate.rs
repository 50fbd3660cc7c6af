//! Predicate algebra shared by the query builders.
//!
//! A WHERE clause is a list of OR-groups joined by AND, a flat disjunctive
//! normal form with AND at the top. Builders start a new group per
//! `filter`/`and` call and append to the current group per `or` call; this
//! module compiles the group list into parameterized SQL.
//!
//! Two invariants matter here. Arguments are bound in the exact
//! left-to-right, group-then-member order the predicates were declared, so
//! placeholder positions always line up. And every predicate is checked
//! against the shape's declared column types before any SQL reaches the
//! engine: text columns admit comparison, LIKE, IN, and BETWEEN; numeric
//! columns admit comparison, IN, and BETWEEN; boolean columns admit
//! equality only; any column admits IS [NOT] NULL.

use shapedb_core::{Field, FieldType, Shape};

use crate::engine::ScalarValue;
use crate::error::{Result, StoreError};

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `>`
    Gt,
    /// `<`
    Lt,
    /// `>=`
    Ge,
    /// `<=`
    Le,
}

impl Cmp {
    fn sql(self) -> &'static str {
        match self {
            Cmp::Eq => "=",
            Cmp::Ne => "<>",
            Cmp::Gt => ">",
            Cmp::Lt => "<",
            Cmp::Ge => ">=",
            Cmp::Le => "<=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum PredicateKind {
    Compare { op: Cmp, value: ScalarValue },
    CompareColumn { op: Cmp, other: String },
    Between { low: ScalarValue, high: ScalarValue, negated: bool },
    In { values: Vec<ScalarValue>, negated: bool },
    Like { pattern: String, negated: bool },
    Null { negated: bool },
}

/// One condition on a column.
///
/// Built via the typed constructors and handed to a builder's
/// `filter`/`and`/`or` methods. Column existence and operator admission are
/// checked when the owning query compiles, against the table's shape.
///
/// # Examples
///
/// ```
/// use shapedb_sqlite::{Cmp, Predicate};
///
/// let recent = Predicate::between("number", 3, 8);
/// let named = Predicate::is_in("word", ["Hare", "Krishna"]);
/// let unsynced = Predicate::column("dateSynced", Cmp::Lt, "dateUpdated");
/// let _ = (recent, named, unsynced);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    column: String,
    kind: PredicateKind,
}

impl Predicate {
    fn compare(column: impl Into<String>, op: Cmp, value: impl Into<ScalarValue>) -> Self {
        Self {
            column: column.into(),
            kind: PredicateKind::Compare {
                op,
                value: value.into(),
            },
        }
    }

    /// `column = value`
    pub fn eq(column: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self::compare(column, Cmp::Eq, value)
    }

    /// `column <> value`
    pub fn ne(column: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self::compare(column, Cmp::Ne, value)
    }

    /// `column > value`
    pub fn gt(column: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self::compare(column, Cmp::Gt, value)
    }

    /// `column < value`
    pub fn lt(column: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self::compare(column, Cmp::Lt, value)
    }

    /// `column >= value`
    pub fn ge(column: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self::compare(column, Cmp::Ge, value)
    }

    /// `column <= value`
    pub fn le(column: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self::compare(column, Cmp::Le, value)
    }

    /// Compares two columns of the same declared type, e.g. rows whose
    /// `dateSynced` is older than their `dateUpdated`. Binds no argument.
    pub fn column(column: impl Into<String>, op: Cmp, other: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            kind: PredicateKind::CompareColumn {
                op,
                other: other.into(),
            },
        }
    }

    /// `column BETWEEN low AND high`
    pub fn between(
        column: impl Into<String>,
        low: impl Into<ScalarValue>,
        high: impl Into<ScalarValue>,
    ) -> Self {
        Self {
            column: column.into(),
            kind: PredicateKind::Between {
                low: low.into(),
                high: high.into(),
                negated: false,
            },
        }
    }

    /// `column NOT BETWEEN low AND high`
    pub fn not_between(
        column: impl Into<String>,
        low: impl Into<ScalarValue>,
        high: impl Into<ScalarValue>,
    ) -> Self {
        Self {
            column: column.into(),
            kind: PredicateKind::Between {
                low: low.into(),
                high: high.into(),
                negated: true,
            },
        }
    }

    /// `column IN (values…)` — the list must not be empty.
    pub fn is_in<I, V>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ScalarValue>,
    {
        Self {
            column: column.into(),
            kind: PredicateKind::In {
                values: values.into_iter().map(Into::into).collect(),
                negated: false,
            },
        }
    }

    /// `column NOT IN (values…)` — the list must not be empty.
    pub fn not_in<I, V>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ScalarValue>,
    {
        Self {
            column: column.into(),
            kind: PredicateKind::In {
                values: values.into_iter().map(Into::into).collect(),
                negated: true,
            },
        }
    }

    /// `column LIKE pattern`
    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            kind: PredicateKind::Like {
                pattern: pattern.into(),
                negated: false,
            },
        }
    }

    /// `column NOT LIKE pattern`
    pub fn not_like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            kind: PredicateKind::Like {
                pattern: pattern.into(),
                negated: true,
            },
        }
    }

    /// `column IS NULL`
    pub fn is_null(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            kind: PredicateKind::Null { negated: false },
        }
    }

    /// `column IS NOT NULL`
    pub fn is_not_null(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            kind: PredicateKind::Null { negated: true },
        }
    }

    fn render(&self, shape: &Shape, args: &mut Vec<ScalarValue>) -> Result<String> {
        let field = persisted_field(shape, &self.column)?;
        self.check_admissible(field)?;

        match &self.kind {
            PredicateKind::Compare { op, value } => {
                args.push(value.clone());
                Ok(format!("{} {} ?", self.column, op.sql()))
            }
            PredicateKind::CompareColumn { op, other } => {
                let other_field = persisted_field(shape, other)?;
                if other_field.ty != field.ty {
                    return Err(StoreError::TypeMismatch {
                        column: other.clone(),
                        operation: format!("{} {} {}", self.column, op.sql(), other),
                    });
                }
                Ok(format!("{} {} {}", self.column, op.sql(), other))
            }
            PredicateKind::Between { low, high, negated } => {
                args.push(low.clone());
                args.push(high.clone());
                Ok(format!(
                    "{} {}BETWEEN ? AND ?",
                    self.column,
                    negation(*negated)
                ))
            }
            PredicateKind::In { values, negated } => {
                if values.is_empty() {
                    return Err(StoreError::Validation(format!(
                        "IN list for column '{}' cannot be empty",
                        self.column
                    )));
                }
                let placeholders = vec!["?"; values.len()].join(", ");
                args.extend(values.iter().cloned());
                Ok(format!(
                    "{} {}IN ({placeholders})",
                    self.column,
                    negation(*negated)
                ))
            }
            PredicateKind::Like { pattern, negated } => {
                args.push(ScalarValue::Text(pattern.clone()));
                Ok(format!("{} {}LIKE ?", self.column, negation(*negated)))
            }
            PredicateKind::Null { negated } => {
                Ok(format!("{} IS {}NULL", self.column, negation(*negated)))
            }
        }
    }

    fn check_admissible(&self, field: &Field) -> Result<()> {
        let ok = match &self.kind {
            PredicateKind::Null { .. } => true,
            PredicateKind::Compare { op, .. } | PredicateKind::CompareColumn { op, .. } => {
                match field.ty {
                    FieldType::Text | FieldType::Number => true,
                    FieldType::Boolean => *op == Cmp::Eq,
                    _ => false,
                }
            }
            PredicateKind::Between { .. } | PredicateKind::In { .. } => {
                matches!(field.ty, FieldType::Text | FieldType::Number)
            }
            PredicateKind::Like { .. } => matches!(field.ty, FieldType::Text),
        };

        if ok {
            Ok(())
        } else {
            Err(StoreError::TypeMismatch {
                column: self.column.clone(),
                operation: self.operation_name(),
            })
        }
    }

    fn operation_name(&self) -> String {
        match &self.kind {
            PredicateKind::Compare { op, .. } | PredicateKind::CompareColumn { op, .. } => {
                op.sql().to_string()
            }
            PredicateKind::Between { negated, .. } => format!("{}BETWEEN", negation(*negated)),
            PredicateKind::In { negated, .. } => format!("{}IN", negation(*negated)),
            PredicateKind::Like { negated, .. } => format!("{}LIKE", negation(*negated)),
            PredicateKind::Null { negated } => format!("IS {}NULL", negation(*negated)),
        }
    }
}

fn negation(negated: bool) -> &'static str {
    if negated { "NOT " } else { "" }
}

pub(crate) fn persisted_field<'a>(shape: &'a Shape, column: &str) -> Result<&'a Field> {
    shape
        .field(column)
        .filter(|f| f.is_persisted())
        .ok_or_else(|| StoreError::UnknownColumn {
            table: shape.name.clone(),
            column: column.to_string(),
        })
}

/// A list of OR-groups, AND-joined.
#[derive(Debug, Clone, Default)]
pub(crate) struct WhereClause {
    groups: Vec<Vec<Predicate>>,
}

/// Compiled clause text plus its bound arguments, in declaration order.
#[derive(Debug, Clone)]
pub(crate) struct CompiledClause {
    pub(crate) sql: String,
    pub(crate) args: Vec<ScalarValue>,
}

impl WhereClause {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Starts a new AND-group with one predicate.
    pub(crate) fn start_group(&mut self, predicate: Predicate) {
        self.groups.push(vec![predicate]);
    }

    /// Appends a predicate to the current group.
    pub(crate) fn extend_group(&mut self, predicate: Predicate) {
        match self.groups.last_mut() {
            Some(group) => group.push(predicate),
            None => self.groups.push(vec![predicate]),
        }
    }

    /// Compiles to `" WHERE …"` (or an empty string when no predicates) with
    /// arguments flattened in declaration order.
    pub(crate) fn compile(&self, shape: &Shape) -> Result<CompiledClause> {
        let mut args = Vec::new();
        let mut groups_sql = Vec::with_capacity(self.groups.len());

        for group in &self.groups {
            let mut parts = Vec::with_capacity(group.len());
            for predicate in group {
                parts.push(predicate.render(shape, &mut args)?);
            }
            let joined = parts.join(" OR ");
            groups_sql.push(if group.len() > 1 {
                format!("({joined})")
            } else {
                joined
            });
        }

        let sql = if groups_sql.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", groups_sql.join(" AND "))
        };
        Ok(CompiledClause { sql, args })
    }
}
