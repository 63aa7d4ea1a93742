//! Shared fixtures for controller integration tests.
//! Each harness gets its own temp data directory; tests that assert on
//! persisted documents read them back through the same storage handle.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use tempfile::TempDir;

use pacast::controller::{PaController, Task, TaskKind, TaskPayload};
use pacast::storage::{ScheduleDoc, Storage, SCHEDULE_PENDING};

pub struct Harness {
    // Held so the data directory outlives the test body.
    pub dir: TempDir,
    pub storage: Arc<Storage>,
    pub controller: Arc<PaController>,
}

pub fn harness() -> Harness {
    let dir = TempDir::new().expect("tempdir");
    let storage = Arc::new(Storage::open(dir.path()).expect("storage"));
    let controller = Arc::new(PaController::new(storage.clone()));
    Harness {
        dir,
        storage,
        controller,
    }
}

pub fn voice(id: &str, user: &str) -> Task {
    Task::with_id(id, TaskKind::Voice, TaskPayload::for_user(user))
}

pub fn text(id: &str, user: &str) -> Task {
    Task::with_id(id, TaskKind::Text, TaskPayload::for_user(user))
}

pub fn emergency(id: &str, user: &str) -> Task {
    Task::with_id(id, TaskKind::Emergency, TaskPayload::for_user(user))
}

pub fn background(id: &str, user: &str) -> Task {
    Task::with_id(id, TaskKind::Background, TaskPayload::for_user(user))
}

pub fn schedule_at(id: &str, when: DateTime<Utc>) -> Task {
    Task::schedule(id, TaskPayload::for_user("ops"), when)
}

/// Seed a schedule document whose display date/time matches `when`, the way
/// the scheduling surface would have written it.
pub fn seed_schedule_doc(storage: &Storage, id: &str, when: DateTime<Utc>) {
    let local = when.with_timezone(&Local);
    storage
        .put_schedule(&ScheduleDoc {
            id: id.to_string(),
            message: format!("announcement {id}"),
            date: local.format("%Y-%m-%d").to_string(),
            time: local.format("%H:%M").to_string(),
            repeat: "none".to_string(),
            zones: "All Zones".to_string(),
            status: SCHEDULE_PENDING.to_string(),
            user: "ops".to_string(),
        })
        .expect("seed schedule doc");
}
