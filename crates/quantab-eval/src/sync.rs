//! Entity-instance synchronization for grouped variables
//!
//! Declaring or updating a grouped variable keeps the target entity type's
//! instance set aligned with the group list: every group gets an instance
//! under its id (name refreshed), and instances whose id no longer appears
//! among the groups are removed. Runs before the compiled variable is
//! published, so evaluators never see a group without its instance.

use quantab_model::{EntityInstance, EntityRepository, VariableGrouping};
use std::collections::HashSet;

pub(crate) fn synchronize_group_instances(
    entities: &dyn EntityRepository,
    to_entity_type: &str,
    variable_name: &str,
    groups: &[VariableGrouping],
) {
    entities.get_or_create_type(to_entity_type, variable_name, variable_name);

    let existing: Vec<i64> = entities
        .instances_of(to_entity_type)
        .iter()
        .map(|instance| instance.id)
        .collect();
    let wanted: HashSet<i64> = groups.iter().map(|group| group.instance_id).collect();

    for group in groups {
        entities.upsert_instance(
            to_entity_type,
            EntityInstance::new(group.instance_id, &group.name, &group.name),
        );
    }

    for id in existing {
        if !wanted.contains(&id) {
            log::debug!("removing stale instance {id} from entity type '{to_entity_type}'");
            entities.remove_instance(to_entity_type, id);
        }
    }
}
