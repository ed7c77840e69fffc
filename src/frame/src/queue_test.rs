//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
use lazy_static::lazy_static;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::Queue;

lazy_static! {
    // The queue table is process-wide, so tests touching it run one at a
    // time to keep slot occupancy predictable.
    static ref TEST_LOCK: Mutex<()> = Mutex::new(());
}

fn lock() -> MutexGuard<'static, ()> {
    TEST_LOCK.lock()
}

#[test]
fn distinct_ids() {
    let _guard = lock();
    let q1 = Queue::new();
    let q2 = Queue::new();
    assert_ne!(q1.id(), q2.id());
}

#[test]
fn slot_reuse_resets_counters() {
    let _guard = lock();
    let id = {
        let q = Queue::new();
        q.did_submit_command(42);
        q.did_complete_command(42);
        q.id()
    };
    // The lowest free bit is handed out first, so the disposed slot comes
    // straight back.
    let q = Queue::new();
    assert_eq!(q.id(), id);
    assert_eq!(q.last_submitted_command(), 0);
    assert_eq!(q.last_completed_command(), 0);
}

#[test]
fn counters_are_monotonic() {
    let _guard = lock();
    let q = Queue::new();
    q.did_submit_command(1);
    q.did_submit_command(2);
    q.did_complete_command(1);
    q.did_complete_command(2);
    assert_eq!(q.last_submitted_command(), 2);
    assert_eq!(q.last_completed_command(), 2);
    assert!(q.last_submitted_command() >= q.last_completed_command());
    assert!(q.last_submission_time() > 0);
    assert!(q.last_completion_time() >= q.last_submission_time());
}

#[test]
#[should_panic(expected = "monotonic")]
fn completion_regression_panics() {
    let _guard = lock();
    let q = Queue::new();
    q.did_submit_command(5);
    q.did_complete_command(5);
    q.did_complete_command(3);
}

#[test]
fn exhaustion_panics() {
    let _guard = lock();
    let queues: Vec<_> = (0..nagare_base::MAX_QUEUES).map(|_| Queue::new()).collect();
    assert!(std::panic::catch_unwind(Queue::new).is_err());
    drop(queues);
}

#[test]
fn wait_for_command_completion_blocks() {
    let _guard = lock();
    let q = Arc::new(Queue::new());
    q.did_submit_command(1);

    let waiter = {
        let q = Arc::clone(&q);
        thread::spawn(move || {
            q.wait_for_command_completion(1);
            q.last_completed_command()
        })
    };

    thread::sleep(Duration::from_millis(50));
    q.did_complete_command(1);
    assert_eq!(waiter.join().unwrap(), 1);
}

#[test]
fn wait_for_completed_command_does_not_block() {
    let _guard = lock();
    let q = Queue::new();
    q.did_submit_command(7);
    q.did_complete_command(7);
    q.wait_for_command_completion(3);
    q.wait_for_command_completion(7);
}
