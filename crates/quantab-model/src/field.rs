//! Response field descriptors

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Whether a field records one answer or several per coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChoiceKind {
    /// Exactly one raw answer per entity-value coordinate
    Single,
    /// Any number of raw answers per coordinate
    Multi,
}

/// Descriptor of a raw survey field
///
/// A field is a raw, importable answer column, optionally associated with
/// one or two entity types (the dimensions its answers are recorded under).
/// Descriptors are immutable after the first compiled reference; the
/// load-order index is resolved lazily and then cached.
#[derive(Debug, Serialize, Deserialize)]
pub struct ResponseFieldDescriptor {
    /// Field name (unique, case-insensitive)
    pub name: String,
    /// Ordered entity-type combination (0, 1 or 2 type identifiers)
    pub entity_types: SmallVec<[String; 2]>,
    /// Single-choice vs multi-choice
    pub choice: ChoiceKind,
    /// Scale factor per subset id, applied by the aggregation layer
    pub scale_factors: HashMap<i64, f64>,
    /// Lazily cached load-order index
    #[serde(skip)]
    load_order: OnceLock<u32>,
}

impl ResponseFieldDescriptor {
    /// Create a descriptor with no associated entity types
    pub fn new(name: impl Into<String>, choice: ChoiceKind) -> Self {
        Self {
            name: name.into(),
            entity_types: SmallVec::new(),
            choice,
            scale_factors: HashMap::new(),
            load_order: OnceLock::new(),
        }
    }

    /// Builder-style: associate an entity type (at most two)
    pub fn with_entity_type(mut self, entity_type: impl Into<String>) -> Self {
        debug_assert!(self.entity_types.len() < 2, "fields carry at most two types");
        self.entity_types.push(entity_type.into());
        self
    }

    /// Builder-style: set a subset scale factor
    pub fn with_scale_factor(mut self, subset_id: i64, factor: f64) -> Self {
        self.scale_factors.insert(subset_id, factor);
        self
    }

    /// The case-folded lookup key for this field
    pub fn key(&self) -> String {
        self.name.to_ascii_lowercase()
    }

    /// Whether the field is single-choice
    pub fn is_single_choice(&self) -> bool {
        self.choice == ChoiceKind::Single
    }

    /// Whether the field carries the given entity type
    pub fn has_entity_type(&self, entity_type: &str) -> bool {
        self.entity_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(entity_type))
    }

    /// The entity type whose instances form the field's answer domain
    ///
    /// For a choice field associated with entity types, answers are instance
    /// ids of the last associated type; free numeric fields have no domain.
    pub fn answer_entity_type(&self) -> Option<&str> {
        self.entity_types.last().map(String::as_str)
    }

    /// The load-order index, resolving it at most once
    pub fn load_order(&self, resolve: impl FnOnce() -> u32) -> u32 {
        *self.load_order.get_or_init(resolve)
    }
}

impl Clone for ResponseFieldDescriptor {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            entity_types: self.entity_types.clone(),
            choice: self.choice,
            scale_factors: self.scale_factors.clone(),
            load_order: self.load_order.clone(),
        }
    }
}
