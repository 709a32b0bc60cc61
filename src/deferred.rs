//! Deferred values, promises, and fan-in promise collections
//!
//! A [`Deferred`] represents a value that arrives later. It is built through
//! the composition engine: its composite type mixes the event fragment with
//! a lifecycle fragment, so every deferred instance is also an evented
//! instance and `is_instance` holds against both constituents.
//!
//! Lifecycle: `Pending -> Resolved` or `Pending -> Failed`, both terminal.
//! Resolution delivers the value to each registered callback exactly once,
//! asynchronously, through the instance's scheduler; observers registered
//! after the transition get the stored value replayed. Attempting a second
//! transition is silently ignored - idempotence by silence is the policy,
//! not an error.
//!
//! A [`Promise`] is the read-only view handed to consumers: it can observe
//! but never force resolution. A [`PromiseCollection`] aggregates named
//! child promises into one deferred that resolves when every child has
//! resolved and fails as soon as any child fails.

use crate::component::Component;
use crate::composite::{CompositeType, Instance};
use crate::errors::AmalgamResult;
use crate::events::{event_fragment, Evented, EventRegistry};
use crate::fragment::{payload, Fragment, Options, Payload};
use crate::scheduler::SchedulerHandle;
use indexmap::IndexMap;
use std::any::Any;
use std::sync::{Arc, OnceLock};

/// An observer invoked with the resolved value or failure error
pub type ValueCallback = Arc<dyn Fn(Payload) + Send + Sync>;

/// Wrap a closure as a [`ValueCallback`]
pub fn value_callback(f: impl Fn(Payload) + Send + Sync + 'static) -> ValueCallback {
    Arc::new(f)
}

/// The aggregate a [`PromiseCollection`] resolves with: key to child value,
/// in child registration order
pub type AggregateValues = IndexMap<String, Payload>;

#[derive(Default)]
struct DeferredState {
    resolved: bool,
    failed: bool,
    completed: bool,
    value: Option<Payload>,
    callbacks: Vec<ValueCallback>,
    errbacks: Vec<ValueCallback>,
}

impl Component for DeferredState {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    fn type_name(&self) -> &'static str {
        "DeferredState"
    }
}

/// The lifecycle fragment mixed into every deferred type
fn deferred_fragment() -> Fragment {
    static FRAGMENT: OnceLock<Fragment> = OnceLock::new();
    FRAGMENT
        .get_or_init(|| {
            Fragment::new(|instance, _| {
                instance.install(DeferredState::default());
            })
        })
        .clone()
}

/// The composite type backing [`Deferred`]: event mixin + lifecycle fragment
pub fn deferred_type() -> CompositeType {
    static TYPE: OnceLock<CompositeType> = OnceLock::new();
    TYPE.get_or_init(|| {
        CompositeType::define([event_fragment().into(), deferred_fragment().into()])
    })
    .clone()
}

// Shared mechanics for everything holding a deferred instance. The promise
// views reuse these rather than holding a Deferred, so the restricted
// surface never grows a resolve/fail by accident.
mod state {
    use super::*;

    pub(super) fn scheduler(instance: &Instance) -> AmalgamResult<SchedulerHandle> {
        instance.with_component::<EventRegistry, _>(EventRegistry::scheduler)
    }

    pub(super) fn resolve(instance: &Instance, value: Payload) -> AmalgamResult<()> {
        let pending = instance.with_component_mut::<DeferredState, _>(|state| {
            if state.completed {
                return None;
            }
            state.resolved = true;
            state.completed = true;
            state.value = Some(value.clone());
            Some(std::mem::take(&mut state.callbacks))
        })?;

        let Some(callbacks) = pending else {
            tracing::trace!("resolve on completed deferred ignored");
            return Ok(());
        };

        let scheduler = scheduler(instance)?;
        for callback in callbacks {
            let value = value.clone();
            scheduler.schedule(Box::new(move || callback(value)));
        }

        instance.trigger("success")?.trigger("done")?.trigger("complete")?;
        Ok(())
    }

    pub(super) fn fail(instance: &Instance, error: Payload) -> AmalgamResult<()> {
        let pending = instance.with_component_mut::<DeferredState, _>(|state| {
            if state.completed {
                return None;
            }
            state.failed = true;
            state.completed = true;
            state.value = Some(error.clone());
            Some(std::mem::take(&mut state.errbacks))
        })?;

        let Some(errbacks) = pending else {
            tracing::trace!("fail on completed deferred ignored");
            return Ok(());
        };

        let scheduler = scheduler(instance)?;
        for errback in errbacks {
            let error = error.clone();
            scheduler.schedule(Box::new(move || errback(error)));
        }

        instance
            .trigger("fail")?
            .trigger("failure")?
            .trigger("error")?
            .trigger("complete")?;
        Ok(())
    }

    pub(super) fn register_callback(instance: &Instance, f: ValueCallback) -> AmalgamResult<()> {
        let replay = instance.with_component_mut::<DeferredState, _>(|state| {
            if state.resolved {
                state.value.clone()
            } else {
                state.callbacks.push(f.clone());
                None
            }
        })?;
        if let Some(value) = replay {
            scheduler(instance)?.schedule(Box::new(move || f(value)));
        }
        Ok(())
    }

    pub(super) fn register_errback(instance: &Instance, f: ValueCallback) -> AmalgamResult<()> {
        let replay = instance.with_component_mut::<DeferredState, _>(|state| {
            if state.failed {
                state.value.clone()
            } else {
                state.errbacks.push(f.clone());
                None
            }
        })?;
        if let Some(error) = replay {
            scheduler(instance)?.schedule(Box::new(move || f(error)));
        }
        Ok(())
    }

    pub(super) fn is_resolved(instance: &Instance) -> bool {
        instance
            .with_component::<DeferredState, _>(|state| state.resolved)
            .unwrap_or(false)
    }

    pub(super) fn is_failed(instance: &Instance) -> bool {
        instance
            .with_component::<DeferredState, _>(|state| state.failed)
            .unwrap_or(false)
    }

    pub(super) fn is_completed(instance: &Instance) -> bool {
        instance
            .with_component::<DeferredState, _>(|state| state.completed)
            .unwrap_or(false)
    }

    pub(super) fn value(instance: &Instance) -> Option<Payload> {
        instance
            .with_component::<DeferredState, _>(|state| state.value.clone())
            .unwrap_or(None)
    }

    pub(super) fn log_err(operation: &'static str, result: AmalgamResult<()>) {
        if let Err(error) = result {
            tracing::error!(%error, operation, "deferred operation failed");
        }
    }
}

/// A mutable, single-assignment future value with two terminal outcomes
#[derive(Clone)]
pub struct Deferred {
    instance: Instance,
}

impl Deferred {
    /// Create a deferred using the process-default scheduler
    pub fn new() -> Self {
        Self::with_options(Options::default())
    }

    /// Create a deferred dispatching through the given scheduler
    pub fn with_scheduler(scheduler: SchedulerHandle) -> Self {
        Self::with_options(Options::with_scheduler(scheduler))
    }

    /// Create a deferred with explicit construction options
    pub fn with_options(options: Options) -> Self {
        Self {
            instance: deferred_type().construct(options),
        }
    }

    pub(crate) fn from_instance(instance: Instance) -> Self {
        Self { instance }
    }

    /// The underlying composite instance
    ///
    /// Exposes the event operations (`on`/`off`/`trigger`) and membership
    /// tests; the lifecycle state itself is only reachable through the
    /// deferred's own methods.
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Transition to resolved and schedule every registered callback with
    /// the value, then publish `success`, `done`, and `complete` events
    ///
    /// Silently ignored once the deferred is terminal.
    pub fn resolve(&self, value: Payload) -> &Self {
        state::log_err("resolve", state::resolve(&self.instance, value));
        self
    }

    /// Transition to failed and schedule every registered errback with the
    /// error, then publish `fail`, `failure`, `error`, and `complete` events
    ///
    /// Silently ignored once the deferred is terminal.
    pub fn fail(&self, error: Payload) -> &Self {
        state::log_err("fail", state::fail(&self.instance, error));
        self
    }

    /// Register a success observer; replays immediately (asynchronously) if
    /// already resolved
    pub fn callback(&self, f: ValueCallback) -> &Self {
        state::log_err("callback", state::register_callback(&self.instance, f));
        self
    }

    /// Alias for [`callback`](Deferred::callback)
    pub fn done(&self, f: ValueCallback) -> &Self {
        self.callback(f)
    }

    /// Register a failure observer; replays immediately (asynchronously) if
    /// already failed
    pub fn errback(&self, f: ValueCallback) -> &Self {
        state::log_err("errback", state::register_errback(&self.instance, f));
        self
    }

    /// Alias for [`errback`](Deferred::errback)
    pub fn failure(&self, f: ValueCallback) -> &Self {
        self.errback(f)
    }

    /// Alias for [`errback`](Deferred::errback)
    pub fn error(&self, f: ValueCallback) -> &Self {
        self.errback(f)
    }

    /// Whether the deferred has resolved
    pub fn resolved(&self) -> bool {
        state::is_resolved(&self.instance)
    }

    /// Whether the deferred has failed
    pub fn failed(&self) -> bool {
        state::is_failed(&self.instance)
    }

    /// Whether the deferred has reached either terminal state
    pub fn completed(&self) -> bool {
        state::is_completed(&self.instance)
    }

    /// The resolved value or failure error, if terminal
    pub fn value(&self) -> Option<Payload> {
        state::value(&self.instance)
    }

    /// A read-only view bound to this deferred
    pub fn promise(&self) -> Promise {
        Promise {
            instance: self.instance.clone(),
        }
    }
}

impl Default for Deferred {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Deferred {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred")
            .field("resolved", &self.resolved())
            .field("failed", &self.failed())
            .field("completed", &self.completed())
            .finish()
    }
}

/// A read-only observation view over a deferred
///
/// Holds a reference to its deferred without owning its lifetime; the
/// deferred may be resolved by code that never handed out a promise. By
/// construction there is no way to resolve or fail through this view.
#[derive(Clone)]
pub struct Promise {
    instance: Instance,
}

impl Promise {
    /// Register a success observer
    pub fn callback(&self, f: ValueCallback) -> &Self {
        state::log_err("callback", state::register_callback(&self.instance, f));
        self
    }

    /// Alias for [`callback`](Promise::callback)
    pub fn done(&self, f: ValueCallback) -> &Self {
        self.callback(f)
    }

    /// Register a failure observer
    pub fn errback(&self, f: ValueCallback) -> &Self {
        state::log_err("errback", state::register_errback(&self.instance, f));
        self
    }

    /// Alias for [`errback`](Promise::errback)
    pub fn failure(&self, f: ValueCallback) -> &Self {
        self.errback(f)
    }

    /// Alias for [`errback`](Promise::errback)
    pub fn error(&self, f: ValueCallback) -> &Self {
        self.errback(f)
    }

    /// Whether the underlying deferred has resolved
    pub fn resolved(&self) -> bool {
        state::is_resolved(&self.instance)
    }

    /// Whether the underlying deferred has failed
    pub fn failed(&self) -> bool {
        state::is_failed(&self.instance)
    }

    /// Whether the underlying deferred is terminal
    pub fn completed(&self) -> bool {
        state::is_completed(&self.instance)
    }

    /// The resolved value or failure error, if terminal
    pub fn value(&self) -> Option<Payload> {
        state::value(&self.instance)
    }
}

impl std::fmt::Debug for Promise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Promise")
            .field("resolved", &self.resolved())
            .field("failed", &self.failed())
            .field("completed", &self.completed())
            .finish()
    }
}

#[derive(Default)]
struct CollectionState {
    children: IndexMap<String, Promise>,
    total: usize,
    resolved: usize,
}

impl Component for CollectionState {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    fn type_name(&self) -> &'static str {
        "CollectionState"
    }
}

fn collection_fragment() -> Fragment {
    static FRAGMENT: OnceLock<Fragment> = OnceLock::new();
    FRAGMENT
        .get_or_init(|| {
            Fragment::new(|instance, _| {
                instance.install(CollectionState::default());
            })
        })
        .clone()
}

/// The composite type backing [`PromiseCollection`]: the deferred type
/// extended with the aggregation fragment
pub fn collection_type() -> CompositeType {
    static TYPE: OnceLock<CompositeType> = OnceLock::new();
    TYPE.get_or_init(|| deferred_type().extend([collection_fragment().into()]))
        .clone()
}

fn add_child(instance: &Instance, key: String, child: Promise) {
    let recorded = instance.with_component_mut::<CollectionState, _>(|state| {
        state.children.insert(key.clone(), child.clone());
        state.total += 1;
    });
    if let Err(error) = recorded {
        tracing::error!(%error, key = %key, "promise collection add failed");
        return;
    }

    let on_success = instance.clone();
    child.callback(value_callback(move |_| {
        // The child's own value is read back through value() at aggregation
        // time; each child only reaches this handler once resolved.
        let aggregate = on_success.with_component_mut::<CollectionState, _>(|state| {
            state.resolved += 1;
            if state.resolved >= state.total {
                let mut values = AggregateValues::new();
                for (key, promise) in &state.children {
                    if let Some(value) = promise.value() {
                        values.insert(key.clone(), value);
                    }
                }
                Some(values)
            } else {
                None
            }
        });
        if let Ok(Some(values)) = aggregate {
            state::log_err("resolve", state::resolve(&on_success, payload(values)));
        }
    }));

    let on_failure = instance.clone();
    child.errback(value_callback(move |error| {
        state::log_err("fail", state::fail(&on_failure, error));
    }));
}

/// An aggregate deferred over named child promises
///
/// Resolves with an [`AggregateValues`] map once every child has resolved;
/// fails with the first child's error as soon as any child fails. Children
/// may be added before or after others resolve, but additions after the
/// collection itself completed cannot affect the terminal outcome. A
/// collection with no children never auto-resolves; it stays pending until
/// resolved externally. A collection must not be given its own promise.
#[derive(Clone)]
pub struct PromiseCollection {
    deferred: Deferred,
}

impl PromiseCollection {
    /// Create an empty collection using the process-default scheduler
    pub fn new() -> Self {
        Self::with_options(Options::default())
    }

    /// Create an empty collection dispatching through the given scheduler
    pub fn with_scheduler(scheduler: SchedulerHandle) -> Self {
        Self::with_options(Options::with_scheduler(scheduler))
    }

    /// Create an empty collection with explicit construction options
    pub fn with_options(options: Options) -> Self {
        Self {
            deferred: Deferred::from_instance(collection_type().construct(options)),
        }
    }

    /// Create a collection seeded with named child promises
    pub fn from_promises(promises: impl IntoIterator<Item = (String, Promise)>) -> Self {
        let collection = Self::new();
        for (key, promise) in promises {
            collection.add(key, promise);
        }
        collection
    }

    /// Record a child promise under a key and subscribe to its outcome
    pub fn add(&self, key: impl Into<String>, child: Promise) -> &Self {
        add_child(&self.deferred.instance, key.into(), child);
        self
    }

    /// Resolve the aggregate directly (required for zero-child collections)
    pub fn resolve(&self, value: Payload) -> &Self {
        self.deferred.resolve(value);
        self
    }

    /// Fail the aggregate directly
    pub fn fail(&self, error: Payload) -> &Self {
        self.deferred.fail(error);
        self
    }

    /// Register a success observer for the aggregate value
    pub fn callback(&self, f: ValueCallback) -> &Self {
        self.deferred.callback(f);
        self
    }

    /// Register a failure observer
    pub fn errback(&self, f: ValueCallback) -> &Self {
        self.deferred.errback(f);
        self
    }

    /// Whether the aggregate has resolved
    pub fn resolved(&self) -> bool {
        self.deferred.resolved()
    }

    /// Whether the aggregate has failed
    pub fn failed(&self) -> bool {
        self.deferred.failed()
    }

    /// Whether the aggregate is terminal
    pub fn completed(&self) -> bool {
        self.deferred.completed()
    }

    /// The aggregate value or first error, if terminal
    pub fn value(&self) -> Option<Payload> {
        self.deferred.value()
    }

    /// The underlying composite instance
    pub fn instance(&self) -> &Instance {
        self.deferred.instance()
    }

    /// A restricted view that can still extend membership
    pub fn promise(&self) -> CollectionPromise {
        CollectionPromise {
            promise: self.deferred.promise(),
            instance: self.deferred.instance.clone(),
        }
    }
}

impl Default for PromiseCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PromiseCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromiseCollection")
            .field("resolved", &self.resolved())
            .field("failed", &self.failed())
            .finish()
    }
}

/// The promise view over a [`PromiseCollection`]
///
/// Identical to [`Promise`] except that it additionally exposes
/// [`add`](CollectionPromise::add), letting holders extend membership
/// through the restricted interface.
#[derive(Clone)]
pub struct CollectionPromise {
    promise: Promise,
    instance: Instance,
}

impl CollectionPromise {
    /// Record a child promise under a key
    pub fn add(&self, key: impl Into<String>, child: Promise) -> &Self {
        add_child(&self.instance, key.into(), child);
        self
    }

    /// Register a success observer for the aggregate value
    pub fn callback(&self, f: ValueCallback) -> &Self {
        self.promise.callback(f);
        self
    }

    /// Alias for [`callback`](CollectionPromise::callback)
    pub fn done(&self, f: ValueCallback) -> &Self {
        self.callback(f)
    }

    /// Register a failure observer
    pub fn errback(&self, f: ValueCallback) -> &Self {
        self.promise.errback(f);
        self
    }

    /// Alias for [`errback`](CollectionPromise::errback)
    pub fn failure(&self, f: ValueCallback) -> &Self {
        self.errback(f)
    }

    /// Alias for [`errback`](CollectionPromise::errback)
    pub fn error(&self, f: ValueCallback) -> &Self {
        self.errback(f)
    }

    /// Whether the aggregate has resolved
    pub fn resolved(&self) -> bool {
        self.promise.resolved()
    }

    /// Whether the aggregate has failed
    pub fn failed(&self) -> bool {
        self.promise.failed()
    }

    /// Whether the aggregate is terminal
    pub fn completed(&self) -> bool {
        self.promise.completed()
    }

    /// The aggregate value or first error, if terminal
    pub fn value(&self) -> Option<Payload> {
        self.promise.value()
    }
}
