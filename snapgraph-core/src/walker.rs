/*!
Deterministic traversal of the node hierarchy.

The walk is pre-order and depth-first, visiting children in their stored order,
so two walks of an unchanged hierarchy always produce the same lists and a
template instance is always seen before any component below it.
*/

use crate::hierarchy::{ComponentId, Hierarchy, NodeId};
use crate::templates::TemplateRegistry;

/// What a walk found, in visiting order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkResult {
    /// Nodes that are instances of some template
    pub template_instances: Vec<NodeId>,
    /// Persistable components on any visited node
    pub components: Vec<ComponentId>,
}

impl WalkResult {
    pub fn is_empty(&self) -> bool {
        self.template_instances.is_empty() && self.components.is_empty()
    }
}

/// Walk every root of the live hierarchy, in root order.
pub fn walk(hierarchy: &Hierarchy) -> WalkResult {
    let mut result = WalkResult::default();
    for root in hierarchy.roots() {
        visit(hierarchy, *root, &mut result);
    }
    result
}

/// Walk the subtree starting at `start`. Works on prototypes as well.
pub fn walk_from(hierarchy: &Hierarchy, start: NodeId) -> WalkResult {
    let mut result = WalkResult::default();
    visit(hierarchy, start, &mut result);
    result
}

/// Walk the prototype of every registered template.
///
/// Used ahead of time to discover which persistable types a load may have to
/// construct; contributes nothing to a save.
pub fn walk_templates(hierarchy: &Hierarchy, templates: &TemplateRegistry) -> Vec<(String, WalkResult)> {
    templates
        .templates()
        .iter()
        .map(|template| (template.name.clone(), walk_from(hierarchy, template.prototype)))
        .collect()
}

fn visit(hierarchy: &Hierarchy, start: NodeId, result: &mut WalkResult) {
    let mut stack = vec![start];
    while let Some(node) = stack.pop() {
        if !hierarchy.is_alive(node) {
            continue;
        }
        if hierarchy.template_of(node).is_some() {
            result.template_instances.push(node);
        }
        result.components.extend(
            hierarchy
                .components(node)
                .into_iter()
                .filter(|component| hierarchy.is_persistable(*component)),
        );
        stack.extend(hierarchy.children(node).iter().rev().copied());
    }
}
