//! Admission ordering tests for the priority scheduler

use crate::scheduler::PriorityScheduler;

const NO_CANDIDATES: &[String] = &[];

#[test]
fn lower_priority_value_is_admitted_first() {
    let scheduler = PriorityScheduler::new();

    // Insert the less urgent entry first; ordering must not depend on
    // insertion order.
    scheduler.add_request("later", 5, "gpt-4");
    scheduler.add_request("urgent", 1, "gpt-4");

    assert!(!scheduler.poll("later", "gpt-4", NO_CANDIDATES));
    assert!(scheduler.poll("urgent", "gpt-4", NO_CANDIDATES));
    assert!(scheduler.poll("later", "gpt-4", NO_CANDIDATES));
}

#[test]
fn equal_priority_is_fifo() {
    let scheduler = PriorityScheduler::new();
    scheduler.add_request("first", 3, "gpt-4");
    scheduler.add_request("second", 3, "gpt-4");
    scheduler.add_request("third", 3, "gpt-4");

    assert!(!scheduler.poll("second", "gpt-4", NO_CANDIDATES));
    assert!(scheduler.poll("first", "gpt-4", NO_CANDIDATES));
    assert!(scheduler.poll("second", "gpt-4", NO_CANDIDATES));
    assert!(scheduler.poll("third", "gpt-4", NO_CANDIDATES));
}

#[test]
fn model_groups_are_independent() {
    let scheduler = PriorityScheduler::new();
    scheduler.add_request("a", 0, "gpt-4");
    scheduler.add_request("b", 9, "claude");

    // b is the worst priority overall but head of its own queue.
    assert!(scheduler.poll("b", "claude", NO_CANDIDATES));
    assert!(scheduler.poll("a", "gpt-4", NO_CANDIDATES));
}

#[test]
fn peek_is_non_destructive() {
    let scheduler = PriorityScheduler::new();
    scheduler.add_request("only", 0, "gpt-4");

    assert!(scheduler.peek("only", "gpt-4", NO_CANDIDATES));
    assert!(scheduler.peek("only", "gpt-4", NO_CANDIDATES));
    assert_eq!(scheduler.queue_len("gpt-4"), 1);

    assert!(scheduler.poll("only", "gpt-4", NO_CANDIDATES));
    assert_eq!(scheduler.queue_len("gpt-4"), 0);
    assert!(!scheduler.peek("only", "gpt-4", NO_CANDIDATES));
}

#[test]
fn failed_poll_leaves_queue_untouched() {
    let scheduler = PriorityScheduler::new();
    scheduler.add_request("head", 0, "gpt-4");
    scheduler.add_request("tail", 1, "gpt-4");

    assert!(!scheduler.poll("tail", "gpt-4", NO_CANDIDATES));
    assert_eq!(scheduler.queue_len("gpt-4"), 2);
}

#[test]
fn abandoned_entry_unblocks_the_queue() {
    let scheduler = PriorityScheduler::new();
    scheduler.add_request("head", 0, "gpt-4");
    scheduler.add_request("tail", 1, "gpt-4");

    assert!(scheduler.abandon("head", "gpt-4"));
    assert!(!scheduler.abandon("head", "gpt-4"));
    assert!(scheduler.poll("tail", "gpt-4", NO_CANDIDATES));
}

#[test]
fn candidate_list_is_advisory_only() {
    let scheduler = PriorityScheduler::new();
    scheduler.add_request("only", 0, "gpt-4");

    // An empty candidate list signals an outage but never blocks admission.
    assert!(scheduler.peek("only", "gpt-4", NO_CANDIDATES));
    let candidates = vec!["d1".to_string()];
    scheduler.add_request("next", 0, "gpt-4");
    assert!(scheduler.poll("only", "gpt-4", &candidates));
    assert!(scheduler.poll("next", "gpt-4", NO_CANDIDATES));
}

#[test]
fn unknown_request_or_group_never_admits() {
    let scheduler = PriorityScheduler::new();
    assert!(!scheduler.poll("ghost", "gpt-4", NO_CANDIDATES));
    scheduler.add_request("real", 0, "gpt-4");
    assert!(!scheduler.poll("real", "other-group", NO_CANDIDATES));
}
