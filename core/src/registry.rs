use serde::{Deserialize, Serialize};

use crate::Shape;

/// The set of shapes an application declares at startup.
///
/// A registry groups [`Shape`] values and preserves registration order,
/// which storage backends use for deterministic table iteration. Lookup is
/// by shape name; a database setup call selects the subset of registered
/// shapes it actually maps to tables.
///
/// # Examples
///
/// ```
/// use shapedb_core::*;
///
/// let registry = ShapeRegistry::new()
///     .with_shape(
///         Shape::new("profile")
///             .with_field(Field::primary("id", FieldType::Number))
///             .with_field(Field::required("name", FieldType::Text)),
///     )
///     .with_shape(
///         Shape::new("entry")
///             .with_field(Field::primary("id", FieldType::Number)),
///     );
///
/// assert_eq!(registry.len(), 2);
/// assert!(registry.get("profile").is_some());
/// assert_eq!(registry.names(), vec!["profile", "entry"]);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShapeRegistry {
    /// Registered shapes in declaration order.
    pub shapes: Vec<Shape>,
}

impl ShapeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a shape.
    ///
    /// Duplicate names are not rejected here; run
    /// [`validate_registry`](crate::validate_registry) before handing the
    /// registry to a storage backend.
    pub fn with_shape(mut self, shape: Shape) -> Self {
        self.shapes.push(shape);
        self
    }

    /// Finds a shape by name.
    pub fn get(&self, name: &str) -> Option<&Shape> {
        self.shapes.iter().find(|s| s.name == name)
    }

    /// Returns all shape names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.shapes.iter().map(|s| s.name.as_str()).collect()
    }

    /// Returns the number of registered shapes.
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    /// Returns `true` if no shapes are registered.
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Iterates shapes in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Shape> {
        self.shapes.iter()
    }
}
