//! Hierarchy structure rules
//!
//! Node levels are derived, never supplied: a root sits at level 0 and every
//! child sits one below its parent, down to level 5. Both store backends use
//! these helpers so the rules hold regardless of where nodes live.

use skillgate_common::types::{HierarchyNode, NodeId, MAX_HIERARCHY_DEPTH, MAX_NODE_LEVEL};
use skillgate_common::SkillgateError;
use std::collections::HashSet;

/// Level of a new node placed under `parent` (`None` for a root)
pub fn level_for_child(parent: Option<&HierarchyNode>) -> Result<u8, SkillgateError> {
    match parent {
        None => Ok(0),
        Some(parent) if parent.level >= MAX_NODE_LEVEL => Err(SkillgateError::DepthExceeded(
            format!(
                "node {} is at level {}; children would exceed {} levels",
                parent.id, parent.level, MAX_HIERARCHY_DEPTH
            ),
        )),
        Some(parent) => Ok(parent.level + 1),
    }
}

/// Walk the parent chain from `start` to a root
///
/// Returns the chain length (1 for a root). Fails on a cycle or when the chain
/// is longer than the hierarchy allows. A parent missing from `lookup` ends the
/// walk, since dangling references are the store's concern.
pub fn validate_chain<'a, F>(start: &'a HierarchyNode, lookup: F) -> Result<usize, SkillgateError>
where
    F: Fn(&NodeId) -> Option<&'a HierarchyNode>,
{
    let mut seen: HashSet<&NodeId> = HashSet::new();
    let mut current = Some(start);
    let mut depth = 0usize;

    while let Some(node) = current {
        if !seen.insert(&node.id) {
            return Err(SkillgateError::Cycle(node.id.to_string()));
        }
        depth += 1;
        if depth > MAX_HIERARCHY_DEPTH {
            return Err(SkillgateError::DepthExceeded(format!(
                "chain from {} is longer than {} levels",
                start.id, MAX_HIERARCHY_DEPTH
            )));
        }
        current = node.parent_id.as_ref().and_then(&lookup);
    }

    Ok(depth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn node(id: &str, parent: Option<&str>, level: u8) -> HierarchyNode {
        HierarchyNode {
            id: NodeId::parse(id).unwrap(),
            parent_id: parent.map(|p| NodeId::parse(p).unwrap()),
            level,
            attributes: Default::default(),
            disabled: false,
        }
    }

    fn index(nodes: &[HierarchyNode]) -> HashMap<NodeId, HierarchyNode> {
        nodes.iter().map(|n| (n.id.clone(), n.clone())).collect()
    }

    #[test]
    fn test_levels_follow_parent() {
        assert_eq!(level_for_child(None).unwrap(), 0);
        assert_eq!(level_for_child(Some(&node("a", None, 0))).unwrap(), 1);
        assert_eq!(level_for_child(Some(&node("e", Some("d"), 4))).unwrap(), 5);
        assert!(matches!(
            level_for_child(Some(&node("f", Some("e"), 5))),
            Err(SkillgateError::DepthExceeded(_))
        ));
    }

    #[test]
    fn test_chain_of_six_is_valid() {
        let ids = ["l0", "l1", "l2", "l3", "l4", "l5"];
        let nodes: Vec<_> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| node(id, i.checked_sub(1).map(|p| ids[p]), i as u8))
            .collect();
        let by_id = index(&nodes);

        let depth = validate_chain(&by_id[&NodeId::parse("l5").unwrap()], |id| by_id.get(id)).unwrap();
        assert_eq!(depth, 6);
    }

    #[test]
    fn test_chain_of_seven_is_rejected() {
        let ids = ["l0", "l1", "l2", "l3", "l4", "l5", "l6"];
        let nodes: Vec<_> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| node(id, i.checked_sub(1).map(|p| ids[p]), 0))
            .collect();
        let by_id = index(&nodes);

        let result = validate_chain(&by_id[&NodeId::parse("l6").unwrap()], |id| by_id.get(id));
        assert!(matches!(result, Err(SkillgateError::DepthExceeded(_))));
    }

    #[test]
    fn test_cycle_is_detected() {
        let nodes = vec![node("a", Some("b"), 1), node("b", Some("a"), 1)];
        let by_id = index(&nodes);

        let result = validate_chain(&by_id[&NodeId::parse("a").unwrap()], |id| by_id.get(id));
        assert!(matches!(result, Err(SkillgateError::Cycle(_))));
    }
}
