//! Pure diff between an entity's active assignments and a desired set

use skillgate_common::types::{Assignment, EntityId, HierarchyNode, NodeId, ProficiencyLevel};
use std::collections::{BTreeMap, HashMap};

use super::models::{
    DesiredAssignment, PlannedCreate, PlannedSupersede, PlannedUpdate, SyncConflict, SyncPlan,
};
use super::SyncError;

/// Collapse the desired rows into one level per node
///
/// Repeating a node with the same level is harmless; repeating it with two
/// different levels is ambiguous and rejected.
pub fn desired_levels(
    desired: &[DesiredAssignment],
) -> Result<BTreeMap<NodeId, ProficiencyLevel>, SyncError> {
    let mut levels = BTreeMap::new();
    for row in desired {
        match levels.insert(row.node_id.clone(), row.proficiency_level) {
            Some(previous) if previous != row.proficiency_level => {
                return Err(SyncError::Malformed(format!(
                    "node {} is listed with levels {} and {}",
                    row.node_id,
                    previous.ordinal(),
                    row.proficiency_level.ordinal()
                )));
            },
            _ => {},
        }
    }
    Ok(levels)
}

/// Compute the disjoint create/update/supersede sets
///
/// `nodes` must contain every node named in `desired` that exists. Desired
/// rows naming an unknown node, or creating/changing an assignment on a
/// disabled node, are reported in `rejected` instead of being planned.
pub fn plan_sync(
    entity_id: &EntityId,
    desired: &[DesiredAssignment],
    current: &[Assignment],
    nodes: &HashMap<NodeId, HierarchyNode>,
) -> Result<SyncPlan, SyncError> {
    let desired = desired_levels(desired)?;
    let current: BTreeMap<&NodeId, &Assignment> =
        current.iter().map(|a| (&a.node_id, a)).collect();

    let mut plan = SyncPlan {
        entity_id: entity_id.clone(),
        to_create: Vec::new(),
        to_update: Vec::new(),
        to_supersede: Vec::new(),
        rejected: Vec::new(),
    };

    for (node_id, &level) in &desired {
        let existing = current.get(node_id).copied();
        if existing.is_some_and(|a| a.proficiency_level == level) {
            continue;
        }

        if let Some(conflict) = SyncConflict::unusable_node(node_id, nodes.get(node_id)) {
            plan.rejected.push(conflict);
            continue;
        }

        match existing {
            Some(assignment) => plan.to_update.push(PlannedUpdate {
                node_id: node_id.clone(),
                from: assignment.proficiency_level,
                to: level,
                expected_version: assignment.version,
            }),
            None => plan.to_create.push(PlannedCreate {
                node_id: node_id.clone(),
                proficiency_level: level,
            }),
        }
    }

    for (node_id, assignment) in &current {
        if !desired.contains_key(*node_id) {
            plan.to_supersede.push(PlannedSupersede {
                node_id: (*node_id).clone(),
                proficiency_level: assignment.proficiency_level,
                expected_version: assignment.version,
            });
        }
    }

    Ok(plan)
}
