/*!
Component traits and the runtime type registry.

A [`Component`] is any piece of state attached to a node. Components that also
implement [`Persistable`] are picked up by the graph walker and written into the
"components" section; everything else is invisible to snapshots.

Concrete component types usually get their [`Component`] impl from one of the
two macros in this module:

```rust
use snapgraph_core::{persistable_component, FieldReader, FieldSet, FieldWriter, Persistable};

#[derive(Clone, Default)]
struct Health {
    value: i32,
}

impl FieldSet for Health {
    fn write_fields(&self, w: &mut FieldWriter<'_>) -> snapgraph_core::Result<()> {
        w.value("value", &self.value)
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) -> snapgraph_core::Result<()> {
        r.value_into("value", &mut self.value)
    }
}

impl Persistable for Health {}
persistable_component!(Health, "Health");
```
*/

use std::any::Any;
use std::collections::BTreeMap;

use crate::fields::FieldSet;

/// State attached to a node.
pub trait Component: Any {
    /// Stable runtime type name, used in paths and entry tags.
    fn type_name(&self) -> &'static str;

    /// Deep copy used when a prototype is instantiated.
    fn clone_component(&self) -> Box<dyn Component>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Returns the persistable view of this component, if it has one.
    fn as_persistable(&self) -> Option<&dyn Persistable> {
        None
    }

    fn as_persistable_mut(&mut self) -> Option<&mut dyn Persistable> {
        None
    }
}

/// A component whose fields are written into snapshots.
///
/// The hooks bracket the body: `before_save` runs right before the fields are
/// written, `after_load` right after they have all been read back. Hooks must
/// not change the structure of the hierarchy.
pub trait Persistable: FieldSet {
    fn before_save(&mut self) {}

    fn after_load(&mut self) {}
}

/// Implements [`Component`] for a `Clone` type that also implements [`Persistable`].
#[macro_export]
macro_rules! persistable_component {
    ($ty:ty, $name:expr) => {
        impl $crate::Component for $ty {
            fn type_name(&self) -> &'static str {
                $name
            }

            fn clone_component(&self) -> ::std::boxed::Box<dyn $crate::Component> {
                ::std::boxed::Box::new(::std::clone::Clone::clone(self))
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }

            fn as_persistable(&self) -> ::std::option::Option<&dyn $crate::Persistable> {
                ::std::option::Option::Some(self)
            }

            fn as_persistable_mut(
                &mut self,
            ) -> ::std::option::Option<&mut dyn $crate::Persistable> {
                ::std::option::Option::Some(self)
            }
        }
    };
}

/// Implements [`Component`] for a `Clone` type that never takes part in snapshots.
#[macro_export]
macro_rules! plain_component {
    ($ty:ty, $name:expr) => {
        impl $crate::Component for $ty {
            fn type_name(&self) -> &'static str {
                $name
            }

            fn clone_component(&self) -> ::std::boxed::Box<dyn $crate::Component> {
                ::std::boxed::Box::new(::std::clone::Clone::clone(self))
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }
        }
    };
}

type Factory = fn() -> Box<dyn Component>;

fn construct<T: Component + Default>() -> Box<dyn Component> {
    Box::new(T::default())
}

/// Maps stable type names to constructors for polymorphic reconstruction.
///
/// A load can only re-create a component that is missing from its node when the
/// component's type was registered here beforehand.
#[derive(Default, Clone)]
pub struct TypeRegistry {
    factories: BTreeMap<&'static str, Factory>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under the name its instances report from [`Component::type_name`].
    ///
    /// Returns the registered name. Registering the same name twice keeps the
    /// most recent constructor.
    pub fn register<T: Component + Default>(&mut self) -> &'static str {
        let name = T::default().type_name();
        self.factories.insert(name, construct::<T>);
        name
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Build a default instance of the named type.
    pub fn create(&self, type_name: &str) -> Option<Box<dyn Component>> {
        self.factories.get(type_name).map(|factory| factory())
    }

    pub fn type_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{FieldReader, FieldWriter};

    #[derive(Clone, Default)]
    struct Marker;
    crate::plain_component!(Marker, "Marker");

    #[derive(Clone, Default)]
    struct Score {
        points: u32,
    }

    impl FieldSet for Score {
        fn write_fields(&self, w: &mut FieldWriter<'_>) -> crate::Result<()> {
            w.value("points", &self.points)
        }

        fn read_fields(&mut self, r: &mut FieldReader<'_>) -> crate::Result<()> {
            r.value_into("points", &mut self.points)
        }
    }

    impl Persistable for Score {}
    crate::persistable_component!(Score, "Score");

    #[test]
    fn test_plain_component_is_not_persistable() {
        let marker = Marker;
        assert_eq!(marker.type_name(), "Marker");
        assert!(marker.as_persistable().is_none());
    }

    #[test]
    fn test_persistable_component_exposes_fields() {
        let mut score = Score { points: 3 };
        assert!(score.as_persistable().is_some());
        assert!(score.as_persistable_mut().is_some());

        let copy = score.clone_component();
        let copy = copy.as_any().downcast_ref::<Score>().unwrap();
        assert_eq!(copy.points, 3);
    }

    #[test]
    fn test_registry_creates_registered_types() {
        let mut registry = TypeRegistry::new();
        assert!(registry.is_empty());

        assert_eq!(registry.register::<Score>(), "Score");
        registry.register::<Marker>();

        assert!(registry.contains("Score"));
        assert!(!registry.contains("Health"));
        assert_eq!(registry.type_names().collect::<Vec<_>>(), vec!["Marker", "Score"]);

        let created = registry.create("Score").unwrap();
        assert_eq!(created.type_name(), "Score");
        assert!(registry.create("Health").is_none());
    }
}
