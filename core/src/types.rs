//! Shape type definitions for entity modeling.
//!
//! This module defines the declarative data model used to describe persisted
//! entities. The types are plain data designed for serialization with
//! [`serde`]. Storage backends consume them to derive physical schemas, so
//! field enumeration is a pure function over these structs rather than any
//! kind of runtime introspection.

use serde::{Deserialize, Serialize};

/// Declared type of a shape field.
///
/// The three scalar variants map directly onto storage-native column types.
/// `Shape`, `List`, and `Map` are *structured* types: their values are
/// serialized through a versioned codec and stored as text, then decoded
/// again on fetch.
///
/// # Examples
///
/// ```
/// use shapedb_core::FieldType;
///
/// let tags = FieldType::List(Box::new(FieldType::Text));
/// assert!(tags.is_structured());
/// assert!(!FieldType::Number.is_structured());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    /// UTF-8 string value.
    Text,
    /// Numeric value (integer or real).
    Number,
    /// Boolean value (stored as 0/1).
    Boolean,
    /// A nested entity of the named shape.
    Shape(String),
    /// An ordered list of the given element type.
    List(Box<FieldType>),
    /// A string-keyed map whose values are entities of the named shape.
    Map(String),
}

impl FieldType {
    /// Returns `true` for nested shape, list, and map types. Structured
    /// values pass through the codec rather than binding natively.
    pub fn is_structured(&self) -> bool {
        matches!(
            self,
            FieldType::Shape(_) | FieldType::List(_) | FieldType::Map(_)
        )
    }

    /// Returns `true` for `Text`, `Number`, and `Boolean`.
    pub fn is_scalar(&self) -> bool {
        !self.is_structured()
    }
}

/// Modifier flags on a [`Field`].
///
/// Invariants (enforced by [`validate_shape`](crate::validate_shape), not by
/// construction): a shape has at most one `primary` field; `primary` implies
/// `required` and `unique`; a `primary` field cannot be `transient`.
///
/// `transient` fields never reach storage at all. `local` fields are
/// persisted but excluded from any remote-facing projection; storage
/// backends treat them like ordinary persisted fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FieldFlags {
    /// Value must be present on insert/update.
    pub required: bool,
    /// Primary key of the owning shape.
    pub primary: bool,
    /// Covered by a single-column non-unique index.
    pub indexed: bool,
    /// Covered by a single-column unique index.
    pub unique: bool,
    /// Never persisted.
    pub transient: bool,
    /// Persisted, but excluded from remote-facing projections.
    pub local: bool,
}

/// A single named field of a [`Shape`].
///
/// Use the constructors [`new`](Field::new), [`required`](Field::required),
/// and [`primary`](Field::primary), then chain modifiers such as
/// [`indexed`](Field::indexed) or [`transient`](Field::transient).
///
/// # Examples
///
/// ```
/// use shapedb_core::{Field, FieldType};
///
/// let id = Field::primary("id", FieldType::Number);
/// assert!(id.flags.primary);
/// assert!(id.flags.required);
///
/// let city = Field::new("city", FieldType::Text).indexed();
/// assert!(city.flags.indexed);
/// assert!(!city.flags.required);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Column name in storage.
    pub name: String,
    /// Declared value type.
    pub ty: FieldType,
    /// Modifier flags.
    pub flags: FieldFlags,
}

impl Field {
    /// Creates an optional field.
    ///
    /// # Examples
    ///
    /// ```
    /// use shapedb_core::{Field, FieldType};
    ///
    /// let field = Field::new("nickname", FieldType::Text);
    /// assert!(!field.flags.required);
    /// ```
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            flags: FieldFlags::default(),
        }
    }

    /// Creates a required field.
    ///
    /// # Examples
    ///
    /// ```
    /// use shapedb_core::{Field, FieldType};
    ///
    /// let field = Field::required("word", FieldType::Text);
    /// assert!(field.flags.required);
    /// assert!(!field.flags.primary);
    /// ```
    pub fn required(name: impl Into<String>, ty: FieldType) -> Self {
        let mut field = Self::new(name, ty);
        field.flags.required = true;
        field
    }

    /// Creates a primary-key field.
    ///
    /// Primary implies required and unique, so all three flags are set.
    ///
    /// # Examples
    ///
    /// ```
    /// use shapedb_core::{Field, FieldType};
    ///
    /// let id = Field::primary("id", FieldType::Number);
    /// assert!(id.flags.primary && id.flags.required && id.flags.unique);
    /// ```
    pub fn primary(name: impl Into<String>, ty: FieldType) -> Self {
        let mut field = Self::new(name, ty);
        field.flags.primary = true;
        field.flags.required = true;
        field.flags.unique = true;
        field
    }

    /// Marks the field as covered by a single-column index.
    pub fn indexed(mut self) -> Self {
        self.flags.indexed = true;
        self
    }

    /// Marks the field as covered by a single-column unique index.
    pub fn unique(mut self) -> Self {
        self.flags.unique = true;
        self
    }

    /// Marks the field as never persisted.
    pub fn transient(mut self) -> Self {
        self.flags.transient = true;
        self
    }

    /// Marks the field as local-only (persisted, not remoted).
    pub fn local(mut self) -> Self {
        self.flags.local = true;
        self
    }

    /// Whether this field maps to a storage column.
    pub fn is_persisted(&self) -> bool {
        !self.flags.transient
    }
}

/// A named entity schema: an ordered list of fields.
///
/// Field declaration order is irrelevant for correctness but determines
/// generated column order when a table is first created.
///
/// # Examples
///
/// ```
/// use shapedb_core::{Field, FieldType, Shape};
///
/// let shape = Shape::new("profile")
///     .with_field(Field::primary("id", FieldType::Number))
///     .with_field(Field::required("name", FieldType::Text))
///     .with_field(Field::new("draft", FieldType::Text).transient());
///
/// assert_eq!(shape.name, "profile");
/// assert_eq!(shape.primary_field().unwrap().name, "id");
/// assert_eq!(shape.persisted_fields().count(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    /// Entity (and table) name.
    pub name: String,
    /// Fields in declaration order.
    pub fields: Vec<Field>,
}

impl Shape {
    /// Creates an empty shape with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Adds a field.
    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Finds a field by name.
    ///
    /// # Examples
    ///
    /// ```
    /// use shapedb_core::{Field, FieldType, Shape};
    ///
    /// let shape = Shape::new("entry").with_field(Field::required("text", FieldType::Text));
    /// assert!(shape.field("text").is_some());
    /// assert!(shape.field("missing").is_none());
    /// ```
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Iterates the fields that map to storage columns, in declaration order.
    pub fn persisted_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.is_persisted())
    }

    /// Returns the primary-key field, if one is declared.
    pub fn primary_field(&self) -> Option<&Field> {
        self.fields.iter().find(|f| f.flags.primary)
    }
}
