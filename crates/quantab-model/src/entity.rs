//! Entity types, instances and value combinations

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// A dimension along which survey answers can vary (brand, product, ...)
///
/// Entity types are immutable once a field or variable references them;
/// creation goes through the entity repository (get-or-create).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityType {
    /// Unique identifier (case-insensitive, used in expressions)
    pub identifier: String,
    /// Singular display name ("Brand")
    pub singular_name: String,
    /// Plural display name ("Brands")
    pub plural_name: String,
}

impl EntityType {
    /// Create a new entity type
    pub fn new(
        identifier: impl Into<String>,
        singular_name: impl Into<String>,
        plural_name: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            singular_name: singular_name.into(),
            plural_name: plural_name.into(),
        }
    }

    /// The case-folded lookup key for this type
    pub fn key(&self) -> String {
        self.identifier.to_ascii_lowercase()
    }
}

/// One concrete value of an entity type ("Coca-Cola" under brand)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityInstance {
    /// Stable integer id, unique within the owning entity type
    pub id: i64,
    /// Identifier (stable machine name)
    pub identifier: String,
    /// Display name
    pub name: String,
}

impl EntityInstance {
    /// Create a new entity instance
    pub fn new(id: i64, identifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            identifier: identifier.into(),
            name: name.into(),
        }
    }
}

/// A chosen instance of one entity type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityValue {
    /// Entity type identifier
    pub entity_type: String,
    /// Chosen instance id
    pub instance_id: i64,
}

impl EntityValue {
    /// Create a new entity value
    pub fn new(entity_type: impl Into<String>, instance_id: i64) -> Self {
        Self {
            entity_type: entity_type.into(),
            instance_id,
        }
    }
}

impl fmt::Display for EntityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.entity_type, self.instance_id)
    }
}

/// The specific instance chosen per entity type for one evaluation
///
/// Ordered, with at most one value per entity type. Almost all combinations
/// carry zero, one or two entries, hence the inline capacity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityValueCombination {
    values: SmallVec<[EntityValue; 2]>,
}

impl EntityValueCombination {
    /// Create an empty combination (no dimension bound)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a combination from a list of values; later bindings of the
    /// same type replace earlier ones
    pub fn from_values(values: impl IntoIterator<Item = EntityValue>) -> Self {
        let mut combination = Self::default();
        for value in values {
            combination.bind(value.entity_type, value.instance_id);
        }
        combination
    }

    /// Bind an entity type to an instance id, replacing any previous binding
    pub fn bind(&mut self, entity_type: impl Into<String>, instance_id: i64) {
        let entity_type = entity_type.into();
        let key = entity_type.to_ascii_lowercase();
        if let Some(existing) = self
            .values
            .iter_mut()
            .find(|v| v.entity_type.eq_ignore_ascii_case(&key))
        {
            existing.instance_id = instance_id;
        } else {
            self.values.push(EntityValue::new(entity_type, instance_id));
        }
    }

    /// Builder-style `bind`
    pub fn with(mut self, entity_type: impl Into<String>, instance_id: i64) -> Self {
        self.bind(entity_type, instance_id);
        self
    }

    /// The instance id bound for an entity type, if any
    pub fn value_for(&self, entity_type: &str) -> Option<i64> {
        self.values
            .iter()
            .find(|v| v.entity_type.eq_ignore_ascii_case(entity_type))
            .map(|v| v.instance_id)
    }

    /// Whether the combination binds the given entity type
    pub fn binds(&self, entity_type: &str) -> bool {
        self.value_for(entity_type).is_some()
    }

    /// Iterate the bound values in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &EntityValue> {
        self.values.iter()
    }

    /// Number of bound entity types
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no entity type is bound
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<EntityValue> for EntityValueCombination {
    fn from_iter<I: IntoIterator<Item = EntityValue>>(iter: I) -> Self {
        Self::from_values(iter)
    }
}

impl fmt::Display for EntityValueCombination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{value}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_bind_is_unique_per_type() {
        let mut combination = EntityValueCombination::empty();
        combination.bind("brand", 1);
        combination.bind("occasion", 7);
        combination.bind("Brand", 3);

        assert_eq!(combination.len(), 2);
        assert_eq!(combination.value_for("brand"), Some(3));
        assert_eq!(combination.value_for("occasion"), Some(7));
        assert_eq!(combination.value_for("product"), None);
    }

    #[test]
    fn test_from_values_keeps_last_binding() {
        let combination = EntityValueCombination::from_values([
            EntityValue::new("brand", 1),
            EntityValue::new("brand", 2),
        ]);
        assert_eq!(combination.len(), 1);
        assert_eq!(combination.value_for("brand"), Some(2));
    }
}
