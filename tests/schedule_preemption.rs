//! A promoted schedule that loses the channel to a live broadcast is
//! soft-preempted: it re-enters the queue head as INTERRUPTED and resumes
//! once the channel frees.

mod common;

use chrono::{Duration, Utc};
use pacast::controller::{Priority, TaskStatus};
use pacast::storage::SCHEDULE_COMPLETED;

#[test]
fn schedule_preempted_then_resumed() {
    let h = common::harness();
    let due = Utc::now() - Duration::seconds(1);
    common::seed_schedule_doc(&h.storage, "s1", due);
    assert!(h.controller.request(common::schedule_at("s1", due)));

    h.controller.tick();
    let current = h.controller.current().unwrap();
    assert_eq!(current.id, "s1");
    assert_eq!(current.status, TaskStatus::Playing);
    // The schedule document is marked completed at promotion time.
    assert_eq!(
        h.storage.get_schedule("s1").unwrap().unwrap().status,
        SCHEDULE_COMPLETED
    );

    // Live voice soft-preempts the schedule back to the queue head.
    assert!(h.controller.request(common::voice("v3", "dj")));
    let queue = h.controller.queue();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].id, "s1");
    assert_eq!(queue[0].status, TaskStatus::Interrupted);

    std::thread::sleep(std::time::Duration::from_millis(30));
    h.controller.stop(Some("v3"), None);
    assert!(h.controller.current().is_none());

    // Shifted forward by the interruption, but its due time is still in
    // the past, so the next tick resumes it.
    let queue = h.controller.queue();
    let requeued = &queue[0];
    assert!(requeued.scheduled_time > due);
    assert!(requeued.scheduled_time <= Utc::now());

    h.controller.tick();
    let resumed = h.controller.current().unwrap();
    assert_eq!(resumed.id, "s1");
    assert_eq!(resumed.priority, Priority::Schedule);
    assert_eq!(resumed.status, TaskStatus::Playing);
}

#[test]
fn interrupted_schedule_resumes_before_later_entries() {
    let h = common::harness();
    let now = Utc::now();
    assert!(h
        .controller
        .request(common::schedule_at("s1", now - Duration::seconds(10))));
    assert!(h
        .controller
        .request(common::schedule_at("s2", now - Duration::seconds(5))));

    h.controller.tick();
    assert_eq!(h.controller.current().unwrap().id, "s1");

    assert!(h.controller.request(common::voice("v1", "dj")));
    // s1 sits at the head again, ahead of the also-due s2.
    let ids: Vec<String> = h.controller.queue().iter().map(|t| t.id.clone()).collect();
    assert_eq!(ids, ["s1", "s2"]);

    h.controller.stop(Some("v1"), None);
    h.controller.tick();
    assert_eq!(h.controller.current().unwrap().id, "s1");
}

#[test]
fn hard_preempted_voice_is_not_requeued() {
    let h = common::harness();
    assert!(h.controller.request(common::voice("v1", "dj")));
    assert!(h.controller.request(common::emergency("e1", "admin")));
    // Voice is discarded, not parked in the schedule queue.
    assert!(h.controller.queue().is_empty());
    h.controller.stop(Some("e1"), None);
    assert!(h.controller.current().is_none());
}
