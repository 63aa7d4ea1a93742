//! # Playback Arbitration Controller
//!
//! The single authority over the PA output channel. Every actor that wants
//! the channel (live voice/text, the emergency alert, queued schedules,
//! background audio) submits a [`Task`]; the controller decides under one
//! lock whether to start it, queue it, preempt the current owner, or reject
//! it.
//!
//! ## Components
//!
//! - Arbiter ([`PaController::request`], [`PaController::stop`]) -
//!   admit/preempt decisions and the emergency latch
//! - Queue & scheduler loop ([`scheduler`], [`PaController::tick`]) -
//!   time-ordered pending schedules, promoted while the channel is idle
//! - State publisher - mirrors every transition into the `system/state`
//!   document and applies the queue-wide time shift when the channel
//!   returns to idle
//!
//! ## Arbitration rules
//!
//! Priorities are strict: a request wins the channel only with a higher
//! tier than the current owner (the background-to-background swap is the
//! single equal-priority exception). Displaced schedules are soft-preempted
//! back to the head of the queue; displaced voice/text/background tasks are
//! hard-stopped. While the emergency alert holds the channel nothing below
//! EMERGENCY is admitted.
//!
//! ## Time shift
//!
//! While a REALTIME-or-higher task owns the channel, queued schedules
//! cannot fire. When the channel next becomes idle, every queued schedule's
//! due time moves forward by the exact occupied duration, so one stolen
//! window never turns into a burst of catch-up announcements and the
//! relative spacing between schedules is preserved.

pub mod scheduler;
pub mod task;

pub use task::{Mode, Priority, Task, TaskKind, TaskPayload, TaskStatus};

use chrono::{DateTime, Local, Utc};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::logutil::escape_log;
use crate::storage::Storage;

/// Everything behind the controller lock.
struct ControllerState {
    current: Option<Task>,
    /// Pending/interrupted SCHEDULE tasks, ascending by `scheduled_time`.
    queue: Vec<Task>,
    emergency_latch: bool,
    /// Set when a REALTIME-or-higher task takes the channel; cleared after
    /// the queue shift on return to idle.
    pause_start: Option<DateTime<Utc>>,
}

/// The playback arbitration controller. Construct once at startup and share
/// behind an [`Arc`]; all public operations serialize on one internal lock.
pub struct PaController {
    state: Mutex<ControllerState>,
    storage: Arc<Storage>,
    running: AtomicBool,
}

impl PaController {
    /// Create the controller and reset the observable state document to
    /// IDLE. The reset precedes any other state publication.
    pub fn new(storage: Arc<Storage>) -> Self {
        if let Err(e) = storage.reset_state() {
            warn!("Failed to reset state document: {}", e);
        }
        info!("PA controller initialized");
        PaController {
            state: Mutex::new(ControllerState {
                current: None,
                queue: Vec::new(),
                emergency_latch: false,
                pause_start: None,
            }),
            storage,
            running: AtomicBool::new(true),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        // A poisoned lock means a panic mid-transition; the state itself is
        // still the last committed one, so recover the guard.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // --- public operations (all serialized under the controller lock) ---

    /// Admit a new task. Returns whether the task was accepted (started or,
    /// for schedules, queued). Rejections are normal returns, not errors.
    pub fn request(&self, task: Task) -> bool {
        let mut st = self.lock();
        debug!(
            "Request: {:?} {} (priority {})",
            task.kind,
            task.id,
            task.priority.value()
        );

        // Emergency is invincible to anything below it.
        if st.emergency_latch && task.priority < Priority::Emergency {
            info!("Denied {}: emergency active", task.id);
            return false;
        }

        // One id, one claim.
        if st.current.as_ref().is_some_and(|c| c.id == task.id)
            || st.queue.iter().any(|t| t.id == task.id)
        {
            info!("Denied {}: id already admitted", task.id);
            return false;
        }

        // Schedules always queue; the scheduler loop promotes them.
        if task.kind == TaskKind::Schedule {
            info!(
                "Queued schedule {} due {}",
                task.id,
                task.scheduled_time.to_rfc3339()
            );
            st.queue.push(task);
            st.queue.sort_by(|a, b| a.scheduled_time.cmp(&b.scheduled_time));
            return true;
        }

        let current_priority = st
            .current
            .as_ref()
            .map(|c| c.priority)
            .unwrap_or(Priority::Idle);
        let background_swap =
            task.priority == current_priority && task.priority == Priority::Background;

        if task.priority > current_priority || background_swap {
            self.preempt_current(&mut st);
            self.start_task(&mut st, task);
            self.assert_invariants(&st);
            true
        } else {
            info!(
                "Denied {}: busy (current priority {})",
                task.id,
                current_priority.value()
            );
            false
        }
    }

    /// Stop the currently playing task.
    ///
    /// An id that does not match the current task is silently ignored, as is
    /// an id-less stop while a voice/text broadcast is live: realtime stops
    /// must be id-qualified so a stale client cannot kill a newer session.
    pub fn stop(&self, id: Option<&str>, kind_hint: Option<TaskKind>) {
        let mut st = self.lock();
        {
            let Some(current) = st.current.as_ref() else {
                return;
            };
            let id = id.filter(|s| !s.is_empty());
            if let Some(id) = id {
                if current.id != id {
                    info!("Denied stop: id mismatch ({} vs {})", id, current.id);
                    return;
                }
            } else if matches!(current.kind, TaskKind::Voice | TaskKind::Text) {
                info!("Denied stop: missing task id for realtime task");
                return;
            }
        }

        let Some(mut stopped) = st.current.take() else {
            return;
        };
        stopped.status = TaskStatus::Completed;
        info!(
            "Stopping task {} ({:?}, hint {:?})",
            stopped.id, stopped.kind, kind_hint
        );

        if stopped.priority == Priority::Emergency {
            st.emergency_latch = false;
            if let Err(e) = self
                .storage
                .record_emergency_event("DEACTIVATED", &stopped.payload.user)
            {
                warn!("Failed to record emergency deactivation: {}", e);
            }
        }

        self.publish(None);
        self.apply_queue_shift(&mut st);
        self.assert_invariants(&st);
    }

    /// Remove a queued schedule by id. The currently playing task is never
    /// affected.
    pub fn remove(&self, id: &str) {
        let mut st = self.lock();
        let before = st.queue.len();
        st.queue.retain(|t| t.id != id);
        if st.queue.len() != before {
            info!("Removed schedule {} from queue", id);
        }
    }

    /// Snapshot of the queued schedules, in promotion order.
    pub fn queue(&self) -> Vec<Task> {
        self.lock().queue.clone()
    }

    /// Snapshot of the currently playing task, if any.
    pub fn current(&self) -> Option<Task> {
        self.lock().current.clone()
    }

    /// The user who triggered the active emergency, while the latch holds.
    /// Ownership policy (who may clear it) belongs to the embedding layer;
    /// the core only exposes the query.
    pub fn active_emergency_user(&self) -> Option<String> {
        let st = self.lock();
        if st.emergency_latch {
            st.current.as_ref().map(|c| c.payload.user.clone())
        } else {
            None
        }
    }

    /// One scheduler pass: while the channel is idle, promote the queue head
    /// if it is due. Never skips ahead past a not-yet-due head. Called by the
    /// background loop every tick; exposed so tests can drive promotion
    /// deterministically.
    pub fn tick(&self) {
        let mut st = self.lock();
        if st.current.is_some() {
            return;
        }
        let now = Utc::now();
        if !st.queue.first().is_some_and(|head| head.is_due(now)) {
            return;
        }

        let mut task = st.queue.remove(0);
        // May have been edited while queued.
        task.priority = Priority::Schedule;
        info!("Promoting schedule {}", task.id);

        if let Err(e) = self.storage.mark_schedule_completed(&task.id) {
            warn!("Failed to mark schedule {} completed: {}", task.id, e);
        }

        self.start_task(&mut st, task);
        self.assert_invariants(&st);
    }

    /// Whether the scheduler loop should keep ticking.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask the scheduler loop to exit at its next tick boundary. In-flight
    /// requests complete normally.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    // --- internal transitions (caller holds the lock) ---

    /// Displace the current owner. Schedules are soft-preempted back to the
    /// queue head; everything else is hard-stopped.
    fn preempt_current(&self, st: &mut ControllerState) {
        let Some(mut displaced) = st.current.take() else {
            return;
        };
        debug_assert!(displaced.kind != TaskKind::Emergency);

        match displaced.kind {
            TaskKind::Schedule => {
                info!("Preempting schedule {} - re-queueing at head", displaced.id);
                displaced.status = TaskStatus::Interrupted;
                // Head insertion on purpose: the next promotion must resume
                // this task before anything else, whatever its sort key.
                st.queue.insert(0, displaced);
            }
            _ => {
                info!("Preempting {:?} {} - hard stop", displaced.kind, displaced.id);
                displaced.status = TaskStatus::Completed;
            }
        }
    }

    /// Start path: latch bookkeeping, status flip, state publication.
    fn start_task(&self, st: &mut ControllerState, mut task: Task) {
        if task.priority >= Priority::Realtime && st.pause_start.is_none() {
            st.pause_start = Some(Utc::now());
            debug!("Time shift window opened");
        }
        if task.kind == TaskKind::Emergency {
            st.emergency_latch = true;
            if let Err(e) = self
                .storage
                .record_emergency_event("ACTIVATED", &task.payload.user)
            {
                warn!("Failed to record emergency activation: {}", e);
            }
        }

        task.status = TaskStatus::Playing;
        let mode = task.kind.mode();
        match task.payload.content.as_deref() {
            Some(content) => info!(
                "Starting {:?} {} (mode {}): {}",
                task.kind,
                task.id,
                mode,
                escape_log(content)
            ),
            None => info!("Starting {:?} {} (mode {})", task.kind, task.id, mode),
        }

        self.publish(Some(&task));
        st.current = Some(task);
    }

    /// Mirror a transition into the `system/state` document. Best-effort:
    /// the in-memory transition is authoritative, persistence may lag.
    fn publish(&self, active: Option<&Task>) {
        let (priority, mode) = match active {
            Some(task) => (task.priority.value(), task.kind.mode()),
            None => (0, Mode::Idle),
        };
        if let Err(e) = self.storage.set_system_state(active, priority, mode.as_str()) {
            warn!("Failed to publish state document: {}", e);
        }
    }

    /// On return to idle: move every queued schedule forward by the duration
    /// the channel was held, re-sort, and persist the rewritten display
    /// times as one atomic batch.
    fn apply_queue_shift(&self, st: &mut ControllerState) {
        let Some(pause_start) = st.pause_start.take() else {
            return;
        };
        let delta = Utc::now() - pause_start;
        info!("Applying time shift of {}ms to queue", delta.num_milliseconds());

        let mut updates = Vec::with_capacity(st.queue.len());
        for task in st.queue.iter_mut() {
            task.scheduled_time = task.scheduled_time + delta;
            let local = task.scheduled_time.with_timezone(&Local);
            updates.push((
                task.id.clone(),
                local.format("%Y-%m-%d").to_string(),
                local.format("%H:%M").to_string(),
            ));
        }
        // Relative order is preserved by the uniform shift, but the
        // head-inserted interrupted task re-enters sorted order here.
        st.queue.sort_by(|a, b| a.scheduled_time.cmp(&b.scheduled_time));

        if !updates.is_empty() {
            match self.storage.shift_schedule_times(&updates) {
                Ok(n) => debug!("Persisted shifted times for {} schedules", n),
                Err(e) => warn!("Failed to persist shifted schedule times: {}", e),
            }
        }
    }

    /// Post-transition sanity checks. Fatal in debug builds; logged as
    /// errors in production.
    fn assert_invariants(&self, st: &ControllerState) {
        if let Some(current) = &st.current {
            if current.status != TaskStatus::Playing {
                error!("Invariant violation: current task {} not PLAYING", current.id);
                debug_assert!(false, "current task must be PLAYING");
            }
            if current.priority == Priority::Idle {
                error!("Invariant violation: current task {} at IDLE priority", current.id);
                debug_assert!(false, "current task cannot have IDLE priority");
            }
        }
        let emergency_current = st
            .current
            .as_ref()
            .is_some_and(|c| c.priority == Priority::Emergency);
        if st.emergency_latch != emergency_current {
            error!("Invariant violation: emergency latch out of sync");
            debug_assert!(false, "emergency latch must mirror current task");
        }
        for task in &st.queue {
            if task.kind != TaskKind::Schedule {
                error!("Invariant violation: non-schedule task {} in queue", task.id);
                debug_assert!(false, "queue holds schedules only");
            }
        }
    }
}
