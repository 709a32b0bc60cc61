//! Asynchronous publish/subscribe mixin for composite types
//!
//! The event mixin is a single [`Fragment`] whose initializer installs an
//! [`EventRegistry`] component. Any composite type that lists
//! [`event_fragment`] among its constituents gains the four operations of
//! the [`Evented`] trait: `on`, `off`, `trigger` and its alias `fire`.
//!
//! Subscription and removal are synchronous; listener execution never is.
//! `trigger` submits one task per registered listener to the instance's
//! scheduler, in registration order, and returns before any of them run.
//! Ordering between listeners of *different* trigger calls is whatever FIFO
//! interleaving their submission produced.

use crate::component::Component;
use crate::composite::Instance;
use crate::errors::AmalgamResult;
use crate::fragment::Fragment;
use crate::scheduler::{default_scheduler, SchedulerHandle};
use indexmap::IndexMap;
use std::any::Any;
use std::sync::{Arc, OnceLock};

/// Opaque context value a listener is associated with
///
/// Context is identity, not data: it exists so subscriptions can be removed
/// by the context they were registered under. Listeners receive their
/// context back when dispatched.
pub type Context = Arc<dyn Any + Send + Sync>;

/// A subscriber callback
pub type Listener = Arc<dyn Fn(Context) + Send + Sync>;

/// Wrap a closure as a [`Listener`]
pub fn listener(f: impl Fn(Context) + Send + Sync + 'static) -> Listener {
    Arc::new(f)
}

/// The fixed sentinel context used when a subscription supplies none
pub fn sentinel_context() -> Context {
    static SENTINEL: OnceLock<Context> = OnceLock::new();
    SENTINEL.get_or_init(|| Arc::new(())).clone()
}

#[derive(Clone)]
struct Entry {
    listener: Listener,
    context: Context,
}

/// Per-instance mapping from event name to registered subscribers
///
/// Insertion order is preserved; an absent event name is equivalent to an
/// empty sequence.
pub struct EventRegistry {
    scheduler: SchedulerHandle,
    events: IndexMap<String, Vec<Entry>>,
}

impl EventRegistry {
    /// Create a registry dispatching through the given scheduler
    pub fn new(scheduler: SchedulerHandle) -> Self {
        Self {
            scheduler,
            events: IndexMap::new(),
        }
    }

    /// The scheduler this registry dispatches through
    pub fn scheduler(&self) -> SchedulerHandle {
        self.scheduler.clone()
    }

    /// Number of subscribers currently registered for an event
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.events.get(event).map_or(0, Vec::len)
    }

    fn subscribe(&mut self, event: &str, listener: Listener, context: Context) {
        self.events
            .entry(event.to_string())
            .or_default()
            .push(Entry { listener, context });
    }

    // Four-way removal policy. Note the deliberate asymmetry in the full
    // form: an entry is removed when its listener OR its context matches.
    fn unsubscribe(
        &mut self,
        event: Option<&str>,
        listener: Option<&Listener>,
        context: Option<&Context>,
    ) {
        match (event, listener, context) {
            (None, _, _) => {
                self.events.clear();
            }
            (Some(event), None, _) => {
                if let Some(entries) = self.events.get_mut(event) {
                    entries.clear();
                }
            }
            (Some(event), Some(listener), None) => {
                if let Some(entries) = self.events.get_mut(event) {
                    entries.retain(|entry| !Arc::ptr_eq(&entry.listener, listener));
                }
            }
            (Some(event), Some(listener), Some(context)) => {
                if let Some(entries) = self.events.get_mut(event) {
                    entries.retain(|entry| {
                        !Arc::ptr_eq(&entry.listener, listener)
                            && !Arc::ptr_eq(&entry.context, context)
                    });
                }
            }
        }
    }

    fn entries(&self, event: &str) -> Vec<Entry> {
        self.events.get(event).cloned().unwrap_or_default()
    }
}

impl Component for EventRegistry {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    fn type_name(&self) -> &'static str {
        "EventRegistry"
    }
}

/// The event mixin fragment
///
/// A single shared fragment value, so membership tests against it hold for
/// every composite type that mixed it in. Its initializer takes the
/// scheduler from the construction options, falling back to the process
/// default.
pub fn event_fragment() -> Fragment {
    static FRAGMENT: OnceLock<Fragment> = OnceLock::new();
    FRAGMENT
        .get_or_init(|| {
            Fragment::new(|instance, options| {
                let scheduler = options
                    .scheduler()
                    .cloned()
                    .unwrap_or_else(default_scheduler);
                instance.install(EventRegistry::new(scheduler));
            })
        })
        .clone()
}

/// Subscribe/unsubscribe/publish operations for instances carrying an
/// [`EventRegistry`]
///
/// Every operation errors only when the registry component is absent, i.e.
/// the instance's type never mixed in [`event_fragment`].
pub trait Evented {
    /// Append a subscriber for the named event
    ///
    /// A missing context defaults to the shared sentinel. Returns self for
    /// chaining.
    fn on(&self, event: &str, listener: Listener, context: Option<Context>)
        -> AmalgamResult<&Self>;

    /// Remove subscribers according to the four-way policy
    ///
    /// No arguments clears the whole registry; an event alone clears that
    /// event; event plus listener removes entries with that listener; event
    /// plus listener plus context removes entries whose listener or context
    /// matches.
    fn off(
        &self,
        event: Option<&str>,
        listener: Option<&Listener>,
        context: Option<&Context>,
    ) -> AmalgamResult<&Self>;

    /// Schedule every subscriber of the named event for asynchronous
    /// execution, in registration order
    fn trigger(&self, event: &str) -> AmalgamResult<&Self>;

    /// Alias for [`trigger`](Evented::trigger)
    fn fire(&self, event: &str) -> AmalgamResult<&Self> {
        self.trigger(event)
    }
}

impl Evented for Instance {
    fn on(
        &self,
        event: &str,
        listener: Listener,
        context: Option<Context>,
    ) -> AmalgamResult<&Self> {
        let context = context.unwrap_or_else(sentinel_context);
        self.with_component_mut::<EventRegistry, _>(|registry| {
            registry.subscribe(event, listener, context);
        })?;
        Ok(self)
    }

    fn off(
        &self,
        event: Option<&str>,
        listener: Option<&Listener>,
        context: Option<&Context>,
    ) -> AmalgamResult<&Self> {
        self.with_component_mut::<EventRegistry, _>(|registry| {
            registry.unsubscribe(event, listener, context);
        })?;
        Ok(self)
    }

    fn trigger(&self, event: &str) -> AmalgamResult<&Self> {
        // Snapshot under the lock, dispatch after releasing it: a listener
        // scheduled here may itself subscribe or trigger on this instance.
        let (scheduler, entries) = self.with_component::<EventRegistry, _>(|registry| {
            (registry.scheduler(), registry.entries(event))
        })?;

        tracing::trace!(event, subscribers = entries.len(), "trigger");
        for entry in entries {
            let Entry { listener, context } = entry;
            scheduler.schedule(Box::new(move || listener(context)));
        }
        Ok(self)
    }
}
