/*!
Reference resolution between live objects and their snapshot addresses.

A [`Resolver`] lives for exactly one save or one load. It keeps two address
spaces in step:

- **Indices**: dense integers handed out by [`Resolver::register`] in
  registration order. `null` registrations consume an index too, so a save and
  the matching load always agree on numbering.
- **Paths**: strings built from the hierarchy, e.g. `Player/Enemy/` for a node
  or `Player/Health` for a component. When an ancestor already owns an index the
  prefix above it collapses into an `@<index>` marker, e.g. `@2/Weapon/Blade`.

Encoding prefers an index and falls back to a path. Decoding never fails hard:
anything that cannot be resolved becomes `None`, is logged and counted.
*/

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::container::Reference;
use crate::hierarchy::{Hierarchy, NodeId, ObjectRef};
use crate::{Result, SnapshotError};

/// Separator between path segments.
pub const PATH_SEPARATOR: char = '/';
/// Prefix of a segment that refers to a registered index.
pub const INDEX_MARKER: char = '@';
/// Final segment selecting the node that owns the components.
pub const NODE_SEGMENT: &str = "Node";

/// Per-operation identity tables.
#[derive(Debug, Default)]
pub struct Resolver {
    objects: Vec<Option<ObjectRef>>,
    indices: HashMap<ObjectRef, u32>,
    roots: HashMap<String, NodeId>,
    unresolved: usize,
}

impl Resolver {
    /// An empty resolver, as used by a save.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty resolver whose root table reflects the current hierarchy, as
    /// used by a load.
    pub fn for_load(hierarchy: &Hierarchy) -> Self {
        let mut resolver = Self::new();
        resolver.rebuild_roots(hierarchy);
        resolver
    }

    /// Refill the root-name table from the current top-level nodes.
    ///
    /// The first root with a given name wins.
    pub fn rebuild_roots(&mut self, hierarchy: &Hierarchy) {
        self.roots.clear();
        for root in hierarchy.roots() {
            if let Some(name) = hierarchy.name(*root) {
                self.roots.entry(name.to_string()).or_insert(*root);
            }
        }
    }

    /// Assign the next index to `object`. `None` still consumes an index.
    ///
    /// Must run before the object's own body is written or read so that self
    /// and forward references inside the body already see the index.
    pub fn register(&mut self, object: Option<ObjectRef>) -> u32 {
        let index = self.objects.len() as u32;
        self.objects.push(object);
        if let Some(object) = object {
            self.indices.entry(object).or_insert(index);
        }
        index
    }

    /// Number of registered slots, `null` placeholders included.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// References that could not be resolved so far.
    pub fn unresolved_references(&self) -> usize {
        self.unresolved
    }

    pub fn resolve_to_index(&self, object: ObjectRef) -> Option<u32> {
        self.indices.get(&object).copied()
    }

    /// Build the hierarchy path of a node or component.
    ///
    /// Returns `None` for destroyed nodes, prototypes, nodes whose names
    /// contain the separator and roots whose names read as an index marker.
    pub fn resolve_to_path(&self, hierarchy: &Hierarchy, object: ObjectRef) -> Option<String> {
        let (node, last) = match object {
            ObjectRef::Node(node) => (node, ""),
            ObjectRef::Component(component) => (component.node(), hierarchy.component_type(component)?),
        };
        if !hierarchy.is_alive(node) || hierarchy.is_prototype(node) {
            return None;
        }

        let mut segments: Vec<&str> = Vec::new();
        let mut anchor = None;
        let mut current = Some(node);
        while let Some(id) = current {
            if let Some(index) = self.resolve_to_index(ObjectRef::Node(id)) {
                anchor = Some(index);
                break;
            }
            let name = hierarchy.name(id)?;
            if name.contains(PATH_SEPARATOR) {
                debug!(node = ?id, name, "node name contains the path separator");
                return None;
            }
            segments.push(name);
            current = hierarchy.parent(id);
        }
        if anchor.is_none() {
            if let Some(root) = segments.last().filter(|root| parse_index_marker(root).is_some()) {
                debug!(name = *root, "root name reads as an index marker");
                return None;
            }
        }

        let mut path = match anchor {
            Some(index) => format!("{INDEX_MARKER}{index}{PATH_SEPARATOR}"),
            None => String::new(),
        };
        for segment in segments.iter().rev() {
            path.push_str(segment);
            path.push(PATH_SEPARATOR);
        }
        path.push_str(last);
        Some(path)
    }

    /// Look up a registered index. `Ok(None)` is a registered `null`.
    pub fn resolve_from_index(&self, index: u32) -> Result<Option<ObjectRef>> {
        self.objects
            .get(index as usize)
            .copied()
            .ok_or(SnapshotError::IndexOutOfRange {
                index,
                len: self.objects.len(),
            })
    }

    /// Resolve a path built by [`Resolver::resolve_to_path`] against the live hierarchy.
    pub fn resolve_from_path(&mut self, hierarchy: &Hierarchy, path: &str) -> Option<ObjectRef> {
        let (node, last) = self.locate_node(hierarchy, path)?;
        let found = match last {
            "" | NODE_SEGMENT => Some(ObjectRef::Node(node)),
            type_name => hierarchy
                .find_component_by_type(node, type_name)
                .map(ObjectRef::Component),
        };
        if found.is_none() {
            self.miss(path, "no component of that type on the node");
        }
        found
    }

    /// Resolve everything but the final segment of a path: the node an
    /// address lives on, plus the final segment itself.
    pub fn resolve_path_owner<'p>(
        &mut self,
        hierarchy: &Hierarchy,
        path: &'p str,
    ) -> Option<(NodeId, &'p str)> {
        self.locate_node(hierarchy, path)
    }

    /// Encode a reference for writing: index when registered, path otherwise.
    pub fn encode_reference(&self, hierarchy: &Hierarchy, target: Option<ObjectRef>) -> Reference {
        let Some(target) = target else {
            return Reference::Null;
        };
        if let Some(index) = self.resolve_to_index(target) {
            return Reference::Index(index);
        }
        match self.resolve_to_path(hierarchy, target) {
            Some(path) => Reference::Path(path),
            None => {
                warn!(target = ?target, "reference target is not addressable, writing null");
                Reference::Null
            }
        }
    }

    /// Decode a reference read from the stream.
    pub fn decode_reference(&mut self, hierarchy: &Hierarchy, reference: &Reference) -> Option<ObjectRef> {
        match reference {
            Reference::Null => None,
            Reference::Index(index) => match self.resolve_from_index(*index) {
                Ok(Some(object)) => Some(object),
                Ok(None) => {
                    self.unresolved += 1;
                    warn!(index, "reference points at a skipped entry");
                    None
                }
                Err(e) => {
                    self.unresolved += 1;
                    warn!(index, error = %e, "reference index cannot be resolved");
                    None
                }
            },
            Reference::Path(path) => self.resolve_from_path(hierarchy, path),
        }
    }

    fn locate_node<'p>(&mut self, hierarchy: &Hierarchy, path: &'p str) -> Option<(NodeId, &'p str)> {
        let Some((head, rest)) = path.split_once(PATH_SEPARATOR) else {
            self.miss(path, "path has no final segment");
            return None;
        };
        let (middle, last) = match rest.rsplit_once(PATH_SEPARATOR) {
            Some((middle, last)) => (Some(middle), last),
            None => (None, rest),
        };

        let Some(mut node) = self.locate_start(hierarchy, head) else {
            self.miss(path, "start of path not found");
            return None;
        };
        for segment in middle.into_iter().flat_map(|middle| middle.split(PATH_SEPARATOR)) {
            match hierarchy.find_child(node, segment) {
                Some(child) => node = child,
                None => {
                    self.miss(path, "child not found");
                    return None;
                }
            }
        }
        Some((node, last))
    }

    fn locate_start(&self, hierarchy: &Hierarchy, head: &str) -> Option<NodeId> {
        let node = match parse_index_marker(head) {
            Some(index) => self.resolve_from_index(index).ok().flatten()?.node(),
            None => *self.roots.get(head)?,
        };
        hierarchy.is_alive(node).then_some(node)
    }

    fn miss(&mut self, path: &str, reason: &str) {
        self.unresolved += 1;
        warn!(path, reason, "reference path cannot be resolved");
    }
}

fn parse_index_marker(segment: &str) -> Option<u32> {
    segment
        .strip_prefix(INDEX_MARKER)
        .and_then(|digits| digits.parse::<u32>().ok())
}
