/*!
The live node hierarchy.

Nodes live in an arena and are addressed by [`NodeId`]. A node has a name, an
ordered list of children, at most one parent and any number of attached
components. Identity is the arena slot, never the name: siblings may share a
name.

Prototypes (the bodies of templates) live in the same arena but are detached:
they never appear among the roots and cannot be parents of live nodes.

Slots of destroyed nodes are reused. Every slot carries a generation that is
bumped on destroy, so a handle to a destroyed node never aliases the node that
later takes over its slot.
*/

use crate::component::Component;
use crate::{Result, SnapshotError};

/// Arena handle of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub fn index(self) -> usize {
        self.index as usize
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

/// Handle of a component slot on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId {
    node: NodeId,
    slot: u32,
}

impl ComponentId {
    /// The node the component is attached to.
    pub fn node(self) -> NodeId {
        self.node
    }
}

/// Anything a reference can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectRef {
    Node(NodeId),
    Component(ComponentId),
}

impl ObjectRef {
    /// The node itself, or the node a component is attached to.
    pub fn node(self) -> NodeId {
        match self {
            ObjectRef::Node(node) => node,
            ObjectRef::Component(component) => component.node(),
        }
    }
}

impl From<NodeId> for ObjectRef {
    fn from(node: NodeId) -> Self {
        ObjectRef::Node(node)
    }
}

impl From<ComponentId> for ObjectRef {
    fn from(component: ComponentId) -> Self {
        ObjectRef::Component(component)
    }
}

struct ComponentSlot {
    type_name: &'static str,
    persistable: bool,
    // Empty only while the codec is decoding the body.
    body: Option<Box<dyn Component>>,
    loaded: bool,
}

impl ComponentSlot {
    fn new(body: Box<dyn Component>) -> Self {
        Self {
            type_name: body.type_name(),
            persistable: body.as_persistable().is_some(),
            body: Some(body),
            loaded: false,
        }
    }

    fn duplicate(&self) -> Option<Self> {
        self.body
            .as_ref()
            .map(|body| Self::new(body.clone_component()))
    }
}

struct NodeData {
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    components: Vec<ComponentSlot>,
    template: Option<String>,
    prototype: bool,
}

struct NodeSlot {
    generation: u32,
    data: Option<NodeData>,
}

/// Arena-backed tree of nodes and their components.
#[derive(Default)]
pub struct Hierarchy {
    nodes: Vec<NodeSlot>,
    free: Vec<u32>,
    roots: Vec<NodeId>,
}

impl Hierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new top-level node.
    pub fn create_root<S: Into<String>>(&mut self, name: S) -> Result<NodeId> {
        self.push_node(name.into(), None, false)
    }

    /// Create a new node as the last child of `parent`.
    ///
    /// Children of a prototype are prototypes themselves.
    pub fn create_child<S: Into<String>>(&mut self, parent: NodeId, name: S) -> Result<NodeId> {
        let prototype = self
            .node(parent)
            .map(|data| data.prototype)
            .ok_or_else(|| dead_node(parent))?;
        self.push_node(name.into(), Some(parent), prototype)
    }

    /// Create a detached prototype root, the body of a template.
    pub fn create_prototype<S: Into<String>>(&mut self, name: S) -> Result<NodeId> {
        self.push_node(name.into(), None, true)
    }

    /// Attach a boxed component to `node`.
    pub fn add_component(
        &mut self,
        node: NodeId,
        component: Box<dyn Component>,
    ) -> Result<ComponentId> {
        let data = self.node_mut(node).ok_or_else(|| dead_node(node))?;
        let slot = u32::try_from(data.components.len())
            .map_err(|_| SnapshotError::validation(format!("node {node:?} has too many components")))?;
        data.components.push(ComponentSlot::new(component));
        Ok(ComponentId { node, slot })
    }

    /// Attach a component to `node`.
    pub fn attach<T: Component>(&mut self, node: NodeId, component: T) -> Result<ComponentId> {
        self.add_component(node, Box::new(component))
    }

    pub fn is_alive(&self, node: NodeId) -> bool {
        self.node(node).is_some()
    }

    pub fn is_prototype(&self, node: NodeId) -> bool {
        self.node(node).map(|data| data.prototype).unwrap_or(false)
    }

    pub fn name(&self, node: NodeId) -> Option<&str> {
        self.node(node).map(|data| data.name.as_str())
    }

    pub fn set_name<S: Into<String>>(&mut self, node: NodeId, name: S) -> Result<()> {
        let data = self.node_mut(node).ok_or_else(|| dead_node(node))?;
        data.name = name.into();
        Ok(())
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).and_then(|data| data.parent)
    }

    /// Children in their stored order. Empty for a destroyed node.
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.node(node)
            .map(|data| data.children.as_slice())
            .unwrap_or(&[])
    }

    /// Live top-level nodes in creation order. Prototypes are never roots.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Name of the template `node` was spawned from, if it is a template instance.
    pub fn template_of(&self, node: NodeId) -> Option<&str> {
        self.node(node).and_then(|data| data.template.as_deref())
    }

    /// Number of live nodes, prototypes included.
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    pub fn find_root(&self, name: &str) -> Option<NodeId> {
        self.roots
            .iter()
            .copied()
            .find(|root| self.name(*root) == Some(name))
    }

    /// First child of `node` with the given name.
    pub fn find_child(&self, node: NodeId, name: &str) -> Option<NodeId> {
        self.children(node)
            .iter()
            .copied()
            .find(|child| self.name(*child) == Some(name))
    }

    /// Look up a node by a `/`-separated chain of names starting at a root.
    pub fn find_path(&self, path: &str) -> Option<NodeId> {
        let mut segments = path.split('/');
        let mut current = self.find_root(segments.next()?)?;
        for segment in segments {
            current = self.find_child(current, segment)?;
        }
        Some(current)
    }

    /// Arena slots allocated so far, live or free.
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    /// Component handles of `node` in attachment order.
    pub fn components(&self, node: NodeId) -> Vec<ComponentId> {
        self.node(node)
            .map(|data| {
                (0..data.components.len())
                    .filter_map(|slot| u32::try_from(slot).ok())
                    .map(|slot| ComponentId { node, slot })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn component_type(&self, id: ComponentId) -> Option<&'static str> {
        self.slot(id).map(|slot| slot.type_name)
    }

    pub fn is_persistable(&self, id: ComponentId) -> bool {
        self.slot(id).map(|slot| slot.persistable).unwrap_or(false)
    }

    /// Whether the component has been populated by a load.
    pub fn is_loaded(&self, id: ComponentId) -> bool {
        self.slot(id).map(|slot| slot.loaded).unwrap_or(false)
    }

    pub fn component(&self, id: ComponentId) -> Option<&dyn Component> {
        self.slot(id).and_then(|slot| slot.body.as_deref())
    }

    pub fn component_mut(&mut self, id: ComponentId) -> Option<&mut (dyn Component + 'static)> {
        self.slot_mut(id).and_then(|slot| slot.body.as_deref_mut())
    }

    /// Typed access to a component.
    pub fn get<T: Component>(&self, id: ComponentId) -> Option<&T> {
        self.component(id)
            .and_then(|body| body.as_any().downcast_ref::<T>())
    }

    pub fn get_mut<T: Component>(&mut self, id: ComponentId) -> Option<&mut T> {
        self.component_mut(id)
            .and_then(|body| body.as_any_mut().downcast_mut::<T>())
    }

    /// First component of type `T` on `node`.
    pub fn find_component<T: Component>(&self, node: NodeId) -> Option<ComponentId> {
        self.components(node)
            .into_iter()
            .find(|id| self.get::<T>(*id).is_some())
    }

    /// First component on `node` reporting the given runtime type name.
    pub fn find_component_by_type(&self, node: NodeId, type_name: &str) -> Option<ComponentId> {
        let data = self.node(node)?;
        data.components
            .iter()
            .position(|slot| slot.type_name == type_name)
            .and_then(|slot| u32::try_from(slot).ok())
            .map(|slot| ComponentId { node, slot })
    }

    /// Spawn a copy of `prototype` under `parent` (or as a root) and mark it as
    /// an instance of `template`.
    ///
    /// The copy is deep: every descendant and every component is cloned. Only the
    /// new root carries the template mark.
    pub fn instantiate(
        &mut self,
        prototype: NodeId,
        template: &str,
        parent: Option<NodeId>,
    ) -> Result<NodeId> {
        if !self.is_prototype(prototype) {
            return Err(SnapshotError::validation(format!(
                "template '{template}' does not refer to a prototype"
            )));
        }
        if let Some(parent) = parent {
            if !self.is_alive(parent) || self.is_prototype(parent) {
                return Err(SnapshotError::validation(format!(
                    "cannot spawn '{template}' under node {parent:?}"
                )));
            }
        }

        let root = self.clone_subtree(prototype, parent)?;
        if let Some(data) = self.node_mut(root) {
            data.template = Some(template.to_string());
        }
        Ok(root)
    }

    /// Remove `node` and its whole subtree. Returns the number of nodes removed.
    pub fn destroy(&mut self, node: NodeId) -> usize {
        let Some(parent) = self.node(node).map(|data| data.parent) else {
            return 0;
        };
        match parent {
            Some(parent) => {
                if let Some(data) = self.node_mut(parent) {
                    data.children.retain(|child| *child != node);
                }
            }
            None => self.roots.retain(|root| *root != node),
        }

        let mut removed = 0;
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            let Some(slot) = self
                .nodes
                .get_mut(current.index())
                .filter(|slot| slot.generation == current.generation)
            else {
                continue;
            };
            if let Some(data) = slot.data.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(current.index);
                stack.extend(data.children);
                removed += 1;
            }
        }
        removed
    }

    pub(crate) fn take_body(&mut self, id: ComponentId) -> Option<Box<dyn Component>> {
        self.slot_mut(id).and_then(|slot| slot.body.take())
    }

    pub(crate) fn restore_body(&mut self, id: ComponentId, body: Box<dyn Component>) {
        if let Some(slot) = self.slot_mut(id) {
            slot.body = Some(body);
        }
    }

    pub(crate) fn set_loaded(&mut self, id: ComponentId) {
        if let Some(slot) = self.slot_mut(id) {
            slot.loaded = true;
        }
    }

    fn push_node(&mut self, name: String, parent: Option<NodeId>, prototype: bool) -> Result<NodeId> {
        let data = NodeData {
            name,
            parent,
            children: Vec::new(),
            components: Vec::new(),
            template: None,
            prototype,
        };
        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.nodes[index as usize];
                slot.data = Some(data);
                NodeId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = u32::try_from(self.nodes.len())
                    .map_err(|_| SnapshotError::validation("node arena is full"))?;
                self.nodes.push(NodeSlot {
                    generation: 0,
                    data: Some(data),
                });
                NodeId {
                    index,
                    generation: 0,
                }
            }
        };
        if let Some(parent) = parent {
            if let Some(data) = self.node_mut(parent) {
                data.children.push(id);
            }
        } else if !prototype {
            self.roots.push(id);
        }
        Ok(id)
    }

    fn clone_subtree(&mut self, source: NodeId, parent: Option<NodeId>) -> Result<NodeId> {
        let data = self.node(source).ok_or_else(|| dead_node(source))?;
        let name = data.name.clone();
        let children = data.children.clone();
        let components: Vec<ComponentSlot> = data
            .components
            .iter()
            .filter_map(ComponentSlot::duplicate)
            .collect();

        let id = self.push_node(name, parent, false)?;
        if let Some(data) = self.node_mut(id) {
            data.components = components;
        }
        for child in children {
            self.clone_subtree(child, Some(id))?;
        }
        Ok(id)
    }

    fn node(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes
            .get(id.index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.data.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        self.nodes
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.data.as_mut())
    }

    fn slot(&self, id: ComponentId) -> Option<&ComponentSlot> {
        self.node(id.node)
            .and_then(|data| data.components.get(id.slot as usize))
    }

    fn slot_mut(&mut self, id: ComponentId) -> Option<&mut ComponentSlot> {
        self.node_mut(id.node)
            .and_then(|data| data.components.get_mut(id.slot as usize))
    }
}

impl std::fmt::Debug for Hierarchy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hierarchy")
            .field("nodes", &self.node_count())
            .field("roots", &self.roots)
            .finish()
    }
}

fn dead_node(node: NodeId) -> SnapshotError {
    SnapshotError::validation(format!("node {node:?} does not exist"))
}
