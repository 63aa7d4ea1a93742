//! Equal priority never wins the channel, with one exception: a background
//! track may replace another background track (track switch).

mod common;

#[test]
fn background_swaps_background() {
    let h = common::harness();

    assert!(h.controller.request(common::background("track-a", "system")));
    assert_eq!(h.controller.current().unwrap().id, "track-a");

    // Same tier, but the swap exception applies; A is hard-preempted.
    assert!(h.controller.request(common::background("track-b", "system")));
    assert_eq!(h.controller.current().unwrap().id, "track-b");
    assert!(h.controller.queue().is_empty());
}

#[test]
fn equal_realtime_is_denied() {
    let h = common::harness();

    assert!(h.controller.request(common::voice("v1", "dj")));
    // No swap exception outside BACKGROUND.
    assert!(!h.controller.request(common::voice("v2", "other")));
    assert!(!h.controller.request(common::text("t1", "other")));
    assert_eq!(h.controller.current().unwrap().id, "v1");
}

#[test]
fn lower_priority_is_denied() {
    let h = common::harness();

    assert!(h.controller.request(common::voice("v1", "dj")));
    assert!(!h.controller.request(common::background("bg1", "system")));
    assert_eq!(h.controller.current().unwrap().id, "v1");
}

#[test]
fn realtime_hard_preempts_background() {
    let h = common::harness();

    assert!(h.controller.request(common::background("bg1", "system")));
    assert!(h.controller.request(common::voice("v1", "dj")));
    assert_eq!(h.controller.current().unwrap().id, "v1");
    // Hard preemption: the track is gone, not queued.
    assert!(h.controller.queue().is_empty());
}
