//! Component trait and storage for per-instance state

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

/// Trait for state components installed on instances
///
/// Fragments do not declare fields; their initializers install components on
/// the instance under construction instead. A component is any piece of state
/// a fragment family wants to share across its behaviors - an event registry,
/// a deferred's lifecycle record, a counter. One component instance per type.
pub trait Component: Any + Send + Sync {
    /// Get the component as Any for downcasting
    fn as_any(&self) -> &dyn Any;

    /// Get the component as mutable Any for downcasting
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Get the name of this component type
    fn type_name(&self) -> &'static str;
}

/// Storage for components installed on an instance
///
/// Components are stored by their `TypeId` and there is at most one instance
/// of each type. Installing a component of an already-present type replaces
/// the previous one, mirroring how a later initializer in the constituent
/// sequence overwrites the field assignments of an earlier one.
#[derive(Default)]
pub struct ComponentStorage {
    components: HashMap<TypeId, Box<dyn Component>>,
}

impl ComponentStorage {
    /// Create a new empty component storage
    pub fn new() -> Self {
        Self {
            components: HashMap::new(),
        }
    }

    /// Install a component, replacing any previous component of the same type
    pub fn insert<T: Component + 'static>(&mut self, component: T) -> Option<Box<dyn Component>> {
        self.components.insert(TypeId::of::<T>(), Box::new(component))
    }

    /// Get a component by type
    pub fn get<T: Component + 'static>(&self) -> Option<&T> {
        self.components
            .get(&TypeId::of::<T>())
            .and_then(|c| c.as_any().downcast_ref::<T>())
    }

    /// Get a component by type for mutation
    pub fn get_mut<T: Component + 'static>(&mut self) -> Option<&mut T> {
        self.components
            .get_mut(&TypeId::of::<T>())
            .and_then(|c| c.as_any_mut().downcast_mut::<T>())
    }

    /// Remove a component by type (returns the component)
    pub fn remove<T: Component + 'static>(&mut self) -> Option<Box<dyn Component>> {
        self.components.remove(&TypeId::of::<T>())
    }

    /// Check if a component type exists
    pub fn has<T: Component + 'static>(&self) -> bool {
        self.components.contains_key(&TypeId::of::<T>())
    }

    /// Get the number of components
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl fmt::Debug for ComponentStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let component_names: Vec<&str> = self.components.values().map(|c| c.type_name()).collect();
        f.debug_struct("ComponentStorage")
            .field("components", &component_names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Counter(u32);

    impl Component for Counter {
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
        fn type_name(&self) -> &'static str {
            "Counter"
        }
    }

    #[derive(Debug, PartialEq)]
    struct Label(String);

    impl Component for Label {
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
        fn type_name(&self) -> &'static str {
            "Label"
        }
    }

    #[test]
    fn insert_and_get() {
        let mut storage = ComponentStorage::new();
        assert!(storage.is_empty());

        storage.insert(Counter(1));
        storage.insert(Label("a".to_string()));
        assert_eq!(storage.len(), 2);

        assert_eq!(storage.get::<Counter>(), Some(&Counter(1)));
        assert_eq!(storage.get::<Label>(), Some(&Label("a".to_string())));
    }

    #[test]
    fn insert_replaces_same_type() {
        let mut storage = ComponentStorage::new();
        storage.insert(Counter(1));
        let previous = storage.insert(Counter(2));

        assert!(previous.is_some());
        assert_eq!(storage.len(), 1);
        assert_eq!(storage.get::<Counter>(), Some(&Counter(2)));
    }

    #[test]
    fn get_mut_mutates_in_place() {
        let mut storage = ComponentStorage::new();
        storage.insert(Counter(0));

        if let Some(counter) = storage.get_mut::<Counter>() {
            counter.0 += 41;
        }

        assert_eq!(storage.get::<Counter>(), Some(&Counter(41)));
    }

    #[test]
    fn remove_component() {
        let mut storage = ComponentStorage::new();
        storage.insert(Counter(7));
        assert!(storage.has::<Counter>());

        let removed = storage.remove::<Counter>();
        assert!(removed.is_some());
        assert!(!storage.has::<Counter>());
        assert!(storage.remove::<Counter>().is_none());
    }

    #[test]
    fn debug_lists_component_names() {
        let mut storage = ComponentStorage::new();
        storage.insert(Counter(1));

        let debug = format!("{storage:?}");
        assert!(debug.contains("ComponentStorage"));
        assert!(debug.contains("Counter"));
    }
}
