//! Fragments: reusable initializer + named-behavior bundles
//!
//! A [`Fragment`] is the unit of composition. It pairs one initializer,
//! applied to a new instance during construction, with an ordered table of
//! named behaviors. Fragments are immutable once built; the same fragment
//! value can participate in any number of composite type definitions and
//! keeps a single identity across all of them.

use crate::composite::Instance;
use crate::errors::AmalgamResult;
use crate::identifiers::FragmentId;
use crate::scheduler::SchedulerHandle;
use indexmap::IndexMap;
use std::any::Any;
use std::sync::Arc;

/// A dynamically typed value carried through behaviors and deferreds
///
/// Payloads are shared handles, so the exact value given to a producer is
/// the value every observer receives - identity is preserved, nothing is
/// copied or re-encoded along the way.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Wrap a value as a [`Payload`]
pub fn payload<T: Send + Sync + 'static>(value: T) -> Payload {
    Arc::new(value)
}

/// An initializer applied to a new instance with the construction options
pub type Initializer = Arc<dyn Fn(&Instance, &Options) + Send + Sync>;

/// A named behavior callable on any instance whose type merged it in
pub type Behavior = Arc<dyn Fn(&Instance, &[Payload]) -> AmalgamResult<Payload> + Send + Sync>;

/// Options passed to every initializer during construction
///
/// All constituents of a composite type receive the same options value.
/// Options carry an optional scheduler handle (consumed by fragments that
/// dispatch asynchronous work) and arbitrary named payload entries.
#[derive(Clone, Default)]
pub struct Options {
    scheduler: Option<SchedulerHandle>,
    entries: IndexMap<String, Payload>,
}

impl Options {
    /// Create empty options
    pub fn new() -> Self {
        Self::default()
    }

    /// Create options carrying a scheduler handle
    pub fn with_scheduler(scheduler: SchedulerHandle) -> Self {
        Self {
            scheduler: Some(scheduler),
            entries: IndexMap::new(),
        }
    }

    /// Add a named entry
    pub fn entry(mut self, key: impl Into<String>, value: Payload) -> Self {
        self.entries.insert(key.into(), value);
        self
    }

    /// Get a named entry
    pub fn get(&self, key: &str) -> Option<&Payload> {
        self.entries.get(key)
    }

    /// The scheduler handle, if one was injected
    pub fn scheduler(&self) -> Option<&SchedulerHandle> {
        self.scheduler.as_ref()
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("scheduler", &self.scheduler.is_some())
            .field("entries", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

struct FragmentInner {
    id: FragmentId,
    initializer: Option<Initializer>,
    behaviors: IndexMap<String, Behavior>,
}

/// A reusable initializer + named-behavior bundle usable as a composition input
///
/// Cheap to clone; all clones share one identity.
#[derive(Clone)]
pub struct Fragment {
    inner: Arc<FragmentInner>,
}

impl Fragment {
    /// Create a fragment with only an initializer and no behaviors
    pub fn new(initializer: impl Fn(&Instance, &Options) + Send + Sync + 'static) -> Self {
        Self::builder().initializer(initializer).build()
    }

    /// Start building a fragment
    pub fn builder() -> FragmentBuilder {
        FragmentBuilder {
            initializer: None,
            behaviors: IndexMap::new(),
        }
    }

    /// This fragment's identity
    pub fn id(&self) -> FragmentId {
        self.inner.id
    }

    pub(crate) fn initializer(&self) -> Option<&Initializer> {
        self.inner.initializer.as_ref()
    }

    pub(crate) fn behaviors(&self) -> &IndexMap<String, Behavior> {
        &self.inner.behaviors
    }
}

impl std::fmt::Debug for Fragment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fragment")
            .field("id", &self.inner.id)
            .field("behaviors", &self.inner.behaviors.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`Fragment`]
pub struct FragmentBuilder {
    initializer: Option<Initializer>,
    behaviors: IndexMap<String, Behavior>,
}

impl FragmentBuilder {
    /// Set the initializer
    pub fn initializer(mut self, f: impl Fn(&Instance, &Options) + Send + Sync + 'static) -> Self {
        self.initializer = Some(Arc::new(f));
        self
    }

    /// Add a named behavior
    pub fn behavior(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&Instance, &[Payload]) -> AmalgamResult<Payload> + Send + Sync + 'static,
    ) -> Self {
        self.behaviors.insert(name.into(), Arc::new(f));
        self
    }

    /// Finalize the fragment; it is immutable from here on
    pub fn build(self) -> Fragment {
        Fragment {
            inner: Arc::new(FragmentInner {
                id: FragmentId::new(),
                initializer: self.initializer,
                behaviors: self.behaviors,
            }),
        }
    }
}
