//! Composite types: ordered fragment merging, extension, and membership
//!
//! [`CompositeType::define`] builds a new type from an ordered list of
//! constituents without a single-parent inheritance model. All merging
//! happens once, at definition time: the initializer sequence is flattened
//! in argument order and the behavior tables are merged with last-wins
//! precedence. Construction then replays the flattened initializer sequence
//! against a fresh [`Instance`].
//!
//! Membership testing is transitive and precomputed. Every definition stores
//! the closure of all constituent identities, so [`Instance::is_instance`]
//! is a set lookup regardless of how deep or diamond-shaped the composition
//! graph is. Because types are immutable values built bottom-up, a cyclic
//! composition cannot be expressed and the closure computation always
//! terminates.

use crate::component::{Component, ComponentStorage};
use crate::errors::{AmalgamError, AmalgamResult};
use crate::fragment::{Behavior, Fragment, Initializer, Options, Payload};
use crate::identifiers::FragmentId;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

/// Types that carry a composition identity and can be tested for membership
pub trait Composable {
    /// The identity recorded in composition lineages
    fn member_id(&self) -> FragmentId;
}

impl Composable for Fragment {
    fn member_id(&self) -> FragmentId {
        self.id()
    }
}

impl Composable for CompositeType {
    fn member_id(&self) -> FragmentId {
        self.id()
    }
}

/// An input to [`CompositeType::define`]: a fragment or a previously built type
#[derive(Clone, Debug)]
pub enum Constituent {
    /// A plain fragment
    Fragment(Fragment),
    /// A previously defined composite type, contributing its merged
    /// behaviors and flattened initializers as one unit
    Composite(CompositeType),
}

impl From<Fragment> for Constituent {
    fn from(fragment: Fragment) -> Self {
        Constituent::Fragment(fragment)
    }
}

impl From<&Fragment> for Constituent {
    fn from(fragment: &Fragment) -> Self {
        Constituent::Fragment(fragment.clone())
    }
}

impl From<CompositeType> for Constituent {
    fn from(composite: CompositeType) -> Self {
        Constituent::Composite(composite)
    }
}

impl From<&CompositeType> for Constituent {
    fn from(composite: &CompositeType) -> Self {
        Constituent::Composite(composite.clone())
    }
}

struct CompositeInner {
    id: FragmentId,
    initializers: Vec<Initializer>,
    behaviors: IndexMap<String, Behavior>,
    lineage: HashSet<FragmentId>,
}

/// A type built by merging an ordered sequence of constituents
///
/// Cheap to clone; all clones share one identity and one merged behavior
/// table.
#[derive(Clone)]
pub struct CompositeType {
    inner: Arc<CompositeInner>,
}

impl CompositeType {
    /// Define a new composite type from an ordered list of constituents
    ///
    /// Zero constituents yields a usable empty composite. When several
    /// constituents define the same behavior name, the last one in the
    /// sequence wins. Definition itself never fails.
    pub fn define(constituents: impl IntoIterator<Item = Constituent>) -> Self {
        let id = FragmentId::new();
        let mut initializers = Vec::new();
        let mut behaviors: IndexMap<String, Behavior> = IndexMap::new();
        let mut lineage = HashSet::new();
        lineage.insert(id);

        for constituent in constituents {
            match constituent {
                Constituent::Fragment(fragment) => {
                    if let Some(initializer) = fragment.initializer() {
                        initializers.push(initializer.clone());
                    }
                    for (name, behavior) in fragment.behaviors() {
                        behaviors.insert(name.clone(), behavior.clone());
                    }
                    lineage.insert(fragment.id());
                }
                Constituent::Composite(composite) => {
                    initializers.extend(composite.inner.initializers.iter().cloned());
                    for (name, behavior) in &composite.inner.behaviors {
                        behaviors.insert(name.clone(), behavior.clone());
                    }
                    lineage.extend(composite.inner.lineage.iter().copied());
                }
            }
        }

        tracing::debug!(
            composite = %id,
            initializers = initializers.len(),
            behaviors = behaviors.len(),
            lineage = lineage.len(),
            "defined composite type"
        );

        Self {
            inner: Arc::new(CompositeInner {
                id,
                initializers,
                behaviors,
                lineage,
            }),
        }
    }

    /// Extend this type with further constituents
    ///
    /// Equivalent to `define([self, ...constituents])`: the base's merged
    /// behaviors are inherited as one unit, then overridden by the new
    /// constituents in order.
    pub fn extend(&self, constituents: impl IntoIterator<Item = Constituent>) -> Self {
        Self::define(std::iter::once(self.into()).chain(constituents))
    }

    /// This type's identity
    pub fn id(&self) -> FragmentId {
        self.inner.id
    }

    /// Whether the given identity participated in this type's definition,
    /// directly or transitively (the type's own identity counts)
    pub fn includes(&self, id: FragmentId) -> bool {
        self.inner.lineage.contains(&id)
    }

    /// Names of the merged behaviors, in merge order
    pub fn behavior_names(&self) -> impl Iterator<Item = &str> {
        self.inner.behaviors.keys().map(String::as_str)
    }

    /// Construct an instance of this type
    ///
    /// Every constituent's initializer runs in sequence against the same
    /// instance, each receiving the same options value.
    pub fn construct(&self, options: Options) -> Instance {
        let instance = Instance::new(self.clone());
        for initializer in &self.inner.initializers {
            initializer(&instance, &options);
        }
        instance
    }

    fn behavior(&self, name: &str) -> Option<&Behavior> {
        self.inner.behaviors.get(name)
    }
}

impl std::fmt::Debug for CompositeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeType")
            .field("id", &self.inner.id)
            .field("behaviors", &self.inner.behaviors.keys().collect::<Vec<_>>())
            .field("lineage", &self.inner.lineage.len())
            .finish()
    }
}

struct InstanceInner {
    ty: CompositeType,
    components: Mutex<ComponentStorage>,
}

/// An instance of a composite type
///
/// Instances are cheap-clone handles to shared state, so several views (a
/// deferred and its promises, for example) can observe one underlying
/// object. Per-instance state lives in a [`ComponentStorage`] installed by
/// the constituents' initializers.
#[derive(Clone)]
pub struct Instance {
    inner: Arc<InstanceInner>,
}

impl Instance {
    fn new(ty: CompositeType) -> Self {
        Self {
            inner: Arc::new(InstanceInner {
                ty,
                components: Mutex::new(ComponentStorage::new()),
            }),
        }
    }

    /// The composite type this instance was constructed from
    pub fn composite_type(&self) -> &CompositeType {
        &self.inner.ty
    }

    /// Transitive membership test
    ///
    /// True iff the candidate is this instance's own type, one of the direct
    /// constituents used to define it, or a constituent of a constituent at
    /// any depth.
    pub fn is_instance<C: Composable>(&self, candidate: &C) -> bool {
        self.inner.ty.includes(candidate.member_id())
    }

    /// Whether this instance shares state with another handle
    pub fn same_object(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Invoke a merged behavior by name
    ///
    /// Invoking a behavior no constituent defined is a capability-not-present
    /// condition surfaced to the caller.
    pub fn call(&self, name: &str, args: &[Payload]) -> AmalgamResult<Payload> {
        match self.inner.ty.behavior(name) {
            Some(behavior) => behavior(self, args),
            None => Err(AmalgamError::missing_behavior(name)),
        }
    }

    /// Whether the instance's type merged a behavior with this name
    pub fn has_behavior(&self, name: &str) -> bool {
        self.inner.ty.behavior(name).is_some()
    }

    /// Install a component, replacing any previous component of the same type
    pub fn install<T: Component + 'static>(&self, component: T) {
        self.lock_components().insert(component);
    }

    /// Whether a component of the given type is installed
    pub fn has_component<T: Component + 'static>(&self) -> bool {
        self.lock_components().has::<T>()
    }

    /// Read a component
    ///
    /// The component lock is held for the duration of `f`; `f` must not
    /// re-enter this instance's components.
    pub fn with_component<T: Component + 'static, R>(
        &self,
        f: impl FnOnce(&T) -> R,
    ) -> AmalgamResult<R> {
        let guard = self.lock_components();
        guard
            .get::<T>()
            .map(f)
            .ok_or_else(|| AmalgamError::missing_component(std::any::type_name::<T>()))
    }

    /// Mutate a component
    ///
    /// Same locking contract as [`with_component`](Instance::with_component).
    pub fn with_component_mut<T: Component + 'static, R>(
        &self,
        f: impl FnOnce(&mut T) -> R,
    ) -> AmalgamResult<R> {
        let mut guard = self.lock_components();
        guard
            .get_mut::<T>()
            .map(f)
            .ok_or_else(|| AmalgamError::missing_component(std::any::type_name::<T>()))
    }

    fn lock_components(&self) -> std::sync::MutexGuard<'_, ComponentStorage> {
        self.inner
            .components
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("type", &self.inner.ty.id())
            .field("components", &*self.lock_components())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::payload;
    use std::any::Any;

    #[derive(Debug, Default)]
    struct Trace(Vec<String>);

    impl Component for Trace {
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
        fn type_name(&self) -> &'static str {
            "Trace"
        }
    }

    fn tracing_fragment(tag: &'static str) -> Fragment {
        Fragment::new(move |instance, _| {
            if !instance.has_component::<Trace>() {
                instance.install(Trace::default());
            }
            let _ = instance.with_component_mut::<Trace, _>(|trace| {
                trace.0.push(tag.to_string());
            });
        })
    }

    #[test]
    fn zero_fragment_composite_is_usable() {
        let empty = CompositeType::define([]);
        let instance = empty.construct(Options::new());

        assert!(instance.is_instance(&empty));
        assert!(!instance.has_behavior("anything"));
        assert!(matches!(
            instance.call("anything", &[]),
            Err(AmalgamError::MissingBehavior { .. })
        ));
    }

    #[test]
    fn initializers_run_in_argument_order() {
        let ty = CompositeType::define([
            tracing_fragment("a").into(),
            tracing_fragment("b").into(),
            tracing_fragment("c").into(),
        ]);
        let instance = ty.construct(Options::new());

        let order = instance
            .with_component::<Trace, _>(|trace| trace.0.clone())
            .unwrap();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn all_initializers_see_the_same_options() {
        let read = |instance: &Instance, options: &Options| {
            let value = options
                .get("x")
                .and_then(|p| p.downcast_ref::<u32>())
                .copied()
                .unwrap_or(0);
            if !instance.has_component::<Trace>() {
                instance.install(Trace::default());
            }
            let _ = instance.with_component_mut::<Trace, _>(|trace| {
                trace.0.push(value.to_string());
            });
        };
        let ty = CompositeType::define([
            Fragment::new(read).into(),
            Fragment::new(read).into(),
        ]);

        let instance = ty.construct(Options::new().entry("x", payload(7u32)));
        let seen = instance
            .with_component::<Trace, _>(|trace| trace.0.clone())
            .unwrap();
        assert_eq!(seen, vec!["7", "7"]);
    }

    #[test]
    fn last_constituent_wins_behavior_conflicts() {
        let speak = |word: &'static str| {
            Fragment::builder()
                .behavior("speak", move |_, _| Ok(payload(word.to_string())))
                .build()
        };
        let ty = CompositeType::define([
            speak("a").into(),
            speak("b").into(),
            speak("c").into(),
        ]);

        let instance = ty.construct(Options::new());
        let word = instance.call("speak", &[]).unwrap();
        assert_eq!(word.downcast_ref::<String>().map(String::as_str), Some("c"));
    }

    #[test]
    fn non_colliding_behaviors_are_all_present() {
        let named = |name: &'static str| {
            Fragment::builder()
                .behavior(name, move |_, _| Ok(payload(name)))
                .build()
        };
        let ty = CompositeType::define([
            named("walk").into(),
            named("swim").into(),
            named("fly").into(),
        ]);

        let instance = ty.construct(Options::new());
        assert!(instance.has_behavior("walk"));
        assert!(instance.has_behavior("swim"));
        assert!(instance.has_behavior("fly"));
    }

    #[test]
    fn extend_overrides_base_behaviors() {
        let base = CompositeType::define([Fragment::builder()
            .behavior("speak", |_, _| Ok(payload("base")))
            .build()
            .into()]);
        let derived = base.extend([Fragment::builder()
            .behavior("speak", |_, _| Ok(payload("derived")))
            .build()
            .into()]);

        let instance = derived.construct(Options::new());
        let word = instance.call("speak", &[]).unwrap();
        assert_eq!(word.downcast_ref::<&str>(), Some(&"derived"));
    }

    #[test]
    fn membership_is_transitive_through_extension() {
        let a = Fragment::builder().build();
        let b = Fragment::builder().build();
        let c = Fragment::builder().build();
        let base = CompositeType::define([(&a).into(), (&b).into()]);
        let derived = base.extend([(&c).into()]);

        let instance = derived.construct(Options::new());
        assert!(instance.is_instance(&derived));
        assert!(instance.is_instance(&base));
        assert!(instance.is_instance(&a));
        assert!(instance.is_instance(&b));
        assert!(instance.is_instance(&c));

        let unrelated = Fragment::builder().build();
        let unrelated_ty = CompositeType::define([]);
        assert!(!instance.is_instance(&unrelated));
        assert!(!instance.is_instance(&unrelated_ty));
    }

    #[test]
    fn membership_handles_diamond_graphs() {
        let shared = Fragment::builder().build();
        let left = CompositeType::define([(&shared).into()]);
        let right = CompositeType::define([(&shared).into()]);
        let joined = CompositeType::define([(&left).into(), (&right).into()]);

        let instance = joined.construct(Options::new());
        assert!(instance.is_instance(&shared));
        assert!(instance.is_instance(&left));
        assert!(instance.is_instance(&right));
        assert!(instance.is_instance(&joined));
    }

    #[test]
    fn instance_handles_share_state() {
        let ty = CompositeType::define([tracing_fragment("x").into()]);
        let instance = ty.construct(Options::new());
        let view = instance.clone();

        assert!(instance.same_object(&view));
        let _ = view.with_component_mut::<Trace, _>(|trace| trace.0.push("y".to_string()));

        let seen = instance
            .with_component::<Trace, _>(|trace| trace.0.clone())
            .unwrap();
        assert_eq!(seen, vec!["x", "y"]);
    }
}
