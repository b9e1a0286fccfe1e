/*!
Registry of named templates.

The registry is the caller-maintained list of templates a snapshot may spawn.
It maps a template name to the prototype node that instances are copied from.
*/

use std::collections::HashSet;

use tracing::warn;

use crate::hierarchy::{Hierarchy, NodeId};

/// A named prototype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub name: String,
    pub prototype: NodeId,
}

/// Ordered list of templates, unique by name after [`TemplateRegistry::validate`].
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: Vec<Template>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a template. Duplicates are tolerated until the next validation.
    pub fn add<S: Into<String>>(&mut self, name: S, prototype: NodeId) {
        self.templates.push(Template {
            name: name.into(),
            prototype,
        });
    }

    /// Remove every template with the given name. Returns whether any was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.templates.len();
        self.templates.retain(|template| template.name != name);
        self.templates.len() != before
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup_by_name(name).is_some()
    }

    /// Prototype registered under `name`, first registration wins.
    pub fn lookup_by_name(&self, name: &str) -> Option<NodeId> {
        self.templates
            .iter()
            .find(|template| template.name == name)
            .map(|template| template.prototype)
    }

    /// Drop duplicate names and entries that are not live prototypes.
    ///
    /// Keeps the first occurrence of each name. Returns how many entries were
    /// removed.
    pub fn validate(&mut self, hierarchy: &Hierarchy) -> usize {
        let before = self.templates.len();
        let mut seen = HashSet::new();
        self.templates.retain(|template| {
            if !hierarchy.is_prototype(template.prototype) {
                warn!(template = %template.name, "template does not refer to a prototype, removing it");
                return false;
            }
            if !seen.insert(template.name.clone()) {
                warn!(template = %template.name, "duplicate template name, removing it");
                return false;
            }
            true
        });
        before - self.templates.len()
    }
}
