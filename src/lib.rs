//! # Amalgam
//!
//! Composable object primitives: mixin-style composition, asynchronous
//! events, and deferred values, without a single-parent inheritance model.
//!
//! Three layers, each built on the one before it:
//! - **Composition engine** ([`CompositeType`], [`Fragment`], [`Instance`]):
//!   builds a type from an ordered list of behavior fragments, merged once
//!   at definition time with last-wins precedence, and supports a
//!   transitive runtime membership test.
//! - **Event mixin** ([`event_fragment`], [`Evented`]): gives any composite
//!   type subscribe/unsubscribe/publish operations whose callbacks are
//!   always delivered asynchronously through a [`Scheduler`].
//! - **Deferred values** ([`Deferred`], [`Promise`], [`PromiseCollection`]):
//!   a future value with two terminal outcomes, read-only promise views,
//!   and fail-fast fan-in aggregation over named child promises.
//!
//! ## Design Principles
//!
//! 1. **Merge at definition time**: behavior tables are flattened when a
//!    type is defined, not looked up dynamically per call
//! 2. **Precomputed lineage**: membership tests are set lookups over a
//!    closure computed once, so diamond-shaped graphs cost nothing extra
//! 3. **Nothing runs synchronously**: every callback, event listener, and
//!    resolution observer is dispatched through the scheduler, even when
//!    the condition it waits on already holds
//! 4. **Terminal states are terminal**: re-resolving a completed deferred
//!    is silently ignored, by policy
//! 5. **Injected scheduling**: the scheduler is an explicit construction
//!    option, so tests drain a deterministic queue instead of sleeping
//!
//! ## Example
//!
//! ```
//! use amalgam::{Deferred, TaskQueue, payload, value_callback};
//!
//! let queue = TaskQueue::shared();
//! let deferred = Deferred::with_scheduler(queue.clone());
//!
//! deferred.callback(value_callback(|value| {
//!     assert_eq!(value.downcast_ref::<u32>(), Some(&5));
//! }));
//! deferred.resolve(payload(5u32));
//!
//! // Nothing has run yet; delivery is always asynchronous.
//! queue.run_until_idle();
//! ```

#![warn(missing_docs)]

mod component;
mod composite;
mod deferred;
mod errors;
mod events;
mod fragment;
mod identifiers;
mod scheduler;

// Re-export core types
pub use component::{Component, ComponentStorage};
pub use composite::{Composable, CompositeType, Constituent, Instance};
pub use deferred::{
    collection_type, deferred_type, value_callback, AggregateValues, CollectionPromise, Deferred,
    Promise, PromiseCollection, ValueCallback,
};
pub use errors::{AmalgamError, AmalgamResult};
pub use events::{
    event_fragment, listener, sentinel_context, Context, EventRegistry, Evented, Listener,
};
pub use fragment::{payload, Behavior, Fragment, FragmentBuilder, Initializer, Options, Payload};
pub use identifiers::FragmentId;
pub use scheduler::{
    default_queue, default_scheduler, Scheduler, SchedulerHandle, Task, TaskQueue, TokioScheduler,
};
