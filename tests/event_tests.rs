//! Event mixin behavior: asynchronous delivery, unsubscription, and FIFO
//! interleaving across producers.

use amalgam::{
    event_fragment, listener, CompositeType, Evented, Instance, Options, TaskQueue,
};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use test_case::test_case;

fn evented(queue: &Arc<TaskQueue>) -> Instance {
    CompositeType::define([event_fragment().into()])
        .construct(Options::with_scheduler(queue.clone()))
}

#[test]
fn subscribers_fire_once_per_trigger_and_stop_after_off() {
    let queue = TaskQueue::shared();
    let instance = evented(&queue);
    let count = Arc::new(AtomicUsize::new(0));

    let count_clone = count.clone();
    let f = listener(move |_| {
        count_clone.fetch_add(1, Ordering::SeqCst);
    });

    instance.on("ping", f.clone(), None).unwrap();
    instance.trigger("ping").unwrap();
    queue.run_until_idle();
    assert_eq!(count.load(Ordering::SeqCst), 1);

    instance.trigger("ping").unwrap();
    queue.run_until_idle();
    assert_eq!(count.load(Ordering::SeqCst), 2);

    instance.off(Some("ping"), Some(&f), None).unwrap();
    instance.trigger("ping").unwrap();
    queue.run_until_idle();
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[test_case(0)]
#[test_case(1)]
#[test_case(4)]
fn trigger_schedules_exactly_one_task_per_subscriber(subscribers: usize) {
    let queue = TaskQueue::shared();
    let instance = evented(&queue);

    for _ in 0..subscribers {
        instance.on("ping", listener(|_| {}), None).unwrap();
    }
    instance.trigger("ping").unwrap();

    assert_eq!(queue.pending(), subscribers);
    assert_eq!(queue.run_until_idle(), subscribers);
}

#[test]
fn delivery_is_never_synchronous_even_when_already_subscribed() {
    let queue = TaskQueue::shared();
    let instance = evented(&queue);
    let fired = Arc::new(AtomicUsize::new(0));

    let fired_clone = fired.clone();
    instance
        .on(
            "ready",
            listener(move |_| {
                fired_clone.fetch_add(1, Ordering::SeqCst);
            }),
            None,
        )
        .unwrap()
        .fire("ready")
        .unwrap();

    // Same turn: nothing has run.
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    queue.run_until_idle();
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn interleaving_across_instances_follows_submission_order() {
    let queue = TaskQueue::shared();
    let first = evented(&queue);
    let second = evented(&queue);
    let order = Arc::new(Mutex::new(Vec::new()));

    for (instance, tag) in [(&first, "first"), (&second, "second")] {
        let order = order.clone();
        instance
            .on("go", listener(move |_| order.lock().unwrap().push(tag)), None)
            .unwrap();
    }

    // Submission order, not source position, decides relative order.
    second.trigger("go").unwrap();
    first.trigger("go").unwrap();
    queue.run_until_idle();

    assert_eq!(*order.lock().unwrap(), vec!["second", "first"]);
}

#[test]
fn off_for_one_event_leaves_other_events_alone() {
    let queue = TaskQueue::shared();
    let instance = evented(&queue);
    let count = Arc::new(AtomicUsize::new(0));

    let count_clone = count.clone();
    instance
        .on(
            "keep",
            listener(move |_| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }),
            None,
        )
        .unwrap();
    instance.on("drop", listener(|_| {}), None).unwrap();

    instance.off(Some("drop"), None, None).unwrap();
    instance.trigger("keep").unwrap().trigger("drop").unwrap();
    queue.run_until_idle();

    assert_eq!(count.load(Ordering::SeqCst), 1);
}
