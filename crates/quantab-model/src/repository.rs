//! Collaborator traits and their in-memory implementations
//!
//! The engine consumes the field catalog and the entity repository through
//! these traits; the surrounding application backs them with its own
//! persistence. The in-memory implementations are used by the engine's
//! tests and by callers that load everything up front.

use crate::{EntityInstance, EntityType, ResponseFieldDescriptor};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Lookup of response field descriptors by name
pub trait FieldCatalog: Send + Sync {
    /// The descriptor for a field name (case-insensitive), if known
    fn field(&self, name: &str) -> Option<Arc<ResponseFieldDescriptor>>;

    /// Whether the catalog knows a field by this name
    fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }
}

/// Entity type and instance storage
///
/// Mutation is serialized inside the implementation; `allocate_instance_id`
/// must hand out fresh ids atomically even under concurrent callers.
pub trait EntityRepository: Send + Sync {
    /// Get an entity type, creating it when absent
    fn get_or_create_type(
        &self,
        identifier: &str,
        singular_name: &str,
        plural_name: &str,
    ) -> EntityType;

    /// Look up an entity type by identifier (case-insensitive)
    fn entity_type(&self, identifier: &str) -> Option<EntityType>;

    /// All instances of an entity type, in insertion order
    fn instances_of(&self, type_identifier: &str) -> Vec<EntityInstance>;

    /// Look up an instance by id
    fn instance(&self, type_identifier: &str, id: i64) -> Option<EntityInstance>;

    /// Whether an instance id exists on an entity type
    fn instance_exists(&self, type_identifier: &str, id: i64) -> bool {
        self.instance(type_identifier, id).is_some()
    }

    /// Insert or update an instance on an entity type
    fn upsert_instance(&self, type_identifier: &str, instance: EntityInstance);

    /// Remove an instance; returns whether it existed
    fn remove_instance(&self, type_identifier: &str, id: i64) -> bool;

    /// Allocate a fresh, never-used instance id on an entity type
    fn allocate_instance_id(&self, type_identifier: &str) -> i64;
}

/// In-memory field catalog
///
/// Assigns load-order indexes in insertion order.
#[derive(Default)]
pub struct InMemoryFieldCatalog {
    fields: RwLock<IndexMap<String, Arc<ResponseFieldDescriptor>>>,
}

impl InMemoryFieldCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a descriptor, keyed case-insensitively by its name
    pub fn insert(&self, descriptor: ResponseFieldDescriptor) -> Arc<ResponseFieldDescriptor> {
        let mut fields = self.fields.write();
        let order = fields.len() as u32;
        descriptor.load_order(|| order);
        let descriptor = Arc::new(descriptor);
        fields.insert(descriptor.key(), Arc::clone(&descriptor));
        descriptor
    }
}

impl FieldCatalog for InMemoryFieldCatalog {
    fn field(&self, name: &str) -> Option<Arc<ResponseFieldDescriptor>> {
        self.fields.read().get(&name.to_ascii_lowercase()).cloned()
    }
}

struct TypeEntry {
    entity_type: EntityType,
    instances: IndexMap<i64, EntityInstance>,
    /// Next id handed out by `allocate_instance_id`; never decreases, so
    /// removed ids are not reused
    next_id: i64,
}

impl TypeEntry {
    fn new(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            instances: IndexMap::new(),
            next_id: 1,
        }
    }

    fn observe_id(&mut self, id: i64) {
        if id >= self.next_id {
            self.next_id = id + 1;
        }
    }
}

/// In-memory entity repository
///
/// A single `RwLock` guards the map: readers (instance lookups during
/// evaluation) share the read side, while type creation, instance upserts
/// and id allocation serialize on the write side.
#[derive(Default)]
pub struct InMemoryEntityRepository {
    types: RwLock<HashMap<String, TypeEntry>>,
}

impl InMemoryEntityRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }
}

impl EntityRepository for InMemoryEntityRepository {
    fn get_or_create_type(
        &self,
        identifier: &str,
        singular_name: &str,
        plural_name: &str,
    ) -> EntityType {
        let key = identifier.to_ascii_lowercase();
        let mut types = self.types.write();
        types
            .entry(key)
            .or_insert_with(|| {
                TypeEntry::new(EntityType::new(identifier, singular_name, plural_name))
            })
            .entity_type
            .clone()
    }

    fn entity_type(&self, identifier: &str) -> Option<EntityType> {
        self.types
            .read()
            .get(&identifier.to_ascii_lowercase())
            .map(|entry| entry.entity_type.clone())
    }

    fn instances_of(&self, type_identifier: &str) -> Vec<EntityInstance> {
        self.types
            .read()
            .get(&type_identifier.to_ascii_lowercase())
            .map(|entry| entry.instances.values().cloned().collect())
            .unwrap_or_default()
    }

    fn instance(&self, type_identifier: &str, id: i64) -> Option<EntityInstance> {
        self.types
            .read()
            .get(&type_identifier.to_ascii_lowercase())
            .and_then(|entry| entry.instances.get(&id).cloned())
    }

    fn upsert_instance(&self, type_identifier: &str, instance: EntityInstance) {
        let key = type_identifier.to_ascii_lowercase();
        let mut types = self.types.write();
        let entry = types
            .entry(key)
            .or_insert_with(|| TypeEntry::new(EntityType::new(type_identifier, "", "")));
        entry.observe_id(instance.id);
        entry.instances.insert(instance.id, instance);
    }

    fn remove_instance(&self, type_identifier: &str, id: i64) -> bool {
        self.types
            .write()
            .get_mut(&type_identifier.to_ascii_lowercase())
            .is_some_and(|entry| entry.instances.shift_remove(&id).is_some())
    }

    fn allocate_instance_id(&self, type_identifier: &str) -> i64 {
        let key = type_identifier.to_ascii_lowercase();
        let mut types = self.types.write();
        let entry = types
            .entry(key)
            .or_insert_with(|| TypeEntry::new(EntityType::new(type_identifier, "", "")));
        let id = entry.next_id;
        entry.next_id += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChoiceKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_catalog_case_insensitive() {
        let catalog = InMemoryFieldCatalog::new();
        catalog.insert(ResponseFieldDescriptor::new("Q1", ChoiceKind::Single));
        assert!(catalog.contains("q1"));
        assert_eq!(catalog.field("Q1").unwrap().load_order(|| 99), 0);
    }

    #[test]
    fn test_get_or_create_type_is_idempotent() {
        let repo = InMemoryEntityRepository::new();
        let a = repo.get_or_create_type("brand", "Brand", "Brands");
        let b = repo.get_or_create_type("Brand", "ignored", "ignored");
        assert_eq!(a, b);
    }

    #[test]
    fn test_allocation_never_reuses_ids() {
        let repo = InMemoryEntityRepository::new();
        repo.upsert_instance("brand", EntityInstance::new(5, "coke", "Coke"));
        let id = repo.allocate_instance_id("brand");
        assert_eq!(id, 6);
        repo.remove_instance("brand", 5);
        assert_eq!(repo.allocate_instance_id("brand"), 7);
    }

    #[test]
    fn test_instance_roundtrip() {
        let repo = InMemoryEntityRepository::new();
        repo.upsert_instance("brand", EntityInstance::new(1, "coke", "Coke"));
        assert!(repo.instance_exists("brand", 1));
        assert!(repo.remove_instance("brand", 1));
        assert!(!repo.instance_exists("brand", 1));
        assert!(!repo.remove_instance("brand", 1));
    }
}
