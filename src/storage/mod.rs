//! # Storage Module - Document Store
//!
//! Sled-backed document collections holding everything the control plane
//! persists: the observable system state, schedule documents, the broadcast
//! log, and the emergency status history.
//!
//! ## Collections
//!
//! ```text
//! data/
//! └── docs/            ← sled database
//!     ├── system       ← singleton state document ("state")
//!     ├── schedules    ← schedule documents keyed by id
//!     ├── logs         ← broadcast/audit log, keyed chronologically
//!     └── emergency    ← singleton emergency status document ("status")
//! ```
//!
//! All writes the controller performs through this store are idempotent by
//! document id. The queue-wide time shift uses a single [`sled::Batch`] so
//! the rewritten `date`/`time` fields land atomically.
//!
//! A `pacast.lock` file in the data directory is held with an exclusive
//! `fs2` lock for the lifetime of the store; a second process opening the
//! same directory fails fast instead of silently contending for channel
//! authority.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local, Utc};
use fs2::FileExt;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::controller::task::Task;

const TREE_SYSTEM: &str = "system";
const TREE_SCHEDULES: &str = "schedules";
const TREE_LOGS: &str = "logs";
const TREE_EMERGENCY: &str = "emergency";

const KEY_STATE: &str = "state";
const KEY_EMERGENCY_STATUS: &str = "status";

/// Schedule document status while waiting for promotion.
pub const SCHEDULE_PENDING: &str = "Pending";
/// Schedule document status after the scheduler promoted it.
pub const SCHEDULE_COMPLETED: &str = "Completed";

/// The singleton `system/state` document mirroring the controller's
/// in-memory state for external consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStateDoc {
    pub active_task: Option<serde_json::Value>,
    pub priority: i32,
    pub mode: String,
    pub timestamp: DateTime<Utc>,
}

/// A schedule document as submitted by the scheduling surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleDoc {
    pub id: String,
    pub message: String,
    /// Display date, `YYYY-MM-DD`, local timezone.
    pub date: String,
    /// Display time, `HH:MM` 24-hour, local timezone.
    pub time: String,
    pub repeat: String,
    pub zones: String,
    pub status: String,
    #[serde(default)]
    pub user: String,
}

/// One broadcast/audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub user: String,
    pub action: String,
    #[serde(rename = "type")]
    pub log_type: String,
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

/// One entry in the emergency status history (newest first).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyEvent {
    pub id: String,
    /// "ACTIVATED" or "DEACTIVATED".
    pub action: String,
    /// Display time in the local timezone.
    pub time: String,
    pub user: String,
}

/// The singleton `emergency/status` document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyStatusDoc {
    pub active: bool,
    #[serde(default)]
    pub triggered_by: Option<String>,
    #[serde(default)]
    pub history: Vec<EmergencyEvent>,
    pub timestamp: DateTime<Utc>,
}

impl Default for EmergencyStatusDoc {
    fn default() -> Self {
        EmergencyStatusDoc {
            active: false,
            triggered_by: None,
            history: Vec::new(),
            timestamp: Utc::now(),
        }
    }
}

/// Document store handle. Internally Arc-based (sled trees are cheap
/// handles); the controller shares one instance behind an `Arc`.
pub struct Storage {
    _db: sled::Db,
    system: sled::Tree,
    schedules: sled::Tree,
    logs: sled::Tree,
    emergency: sled::Tree,
    data_dir: PathBuf,
    // Held for the lifetime of the store; released on drop.
    _instance_lock: File,
}

impl Storage {
    /// Open (or create) the document store under `data_dir`.
    ///
    /// Fails if another live process holds the instance lock: the channel
    /// has a single authority.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .map_err(|e| anyhow!("Failed to create data directory {}: {}", data_dir.display(), e))?;

        let lock_path = data_dir.join("pacast.lock");
        let instance_lock = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)
            .map_err(|e| anyhow!("Failed to open lock file {}: {}", lock_path.display(), e))?;
        instance_lock.try_lock_exclusive().map_err(|_| {
            anyhow!(
                "Another pacast instance holds {} - refusing to contend for channel authority",
                lock_path.display()
            )
        })?;

        let db = sled::open(data_dir.join("docs"))
            .map_err(|e| anyhow!("Failed to open document store: {}", e))?;
        let system = db.open_tree(TREE_SYSTEM)?;
        let schedules = db.open_tree(TREE_SCHEDULES)?;
        let logs = db.open_tree(TREE_LOGS)?;
        let emergency = db.open_tree(TREE_EMERGENCY)?;

        Ok(Storage {
            _db: db,
            system,
            schedules,
            logs,
            emergency,
            data_dir,
            _instance_lock: instance_lock,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    // --- system state document ---

    /// Write the `system/state` document. `active_task` serializes to the
    /// external task shape, or null when the channel is idle.
    pub fn set_system_state(
        &self,
        active_task: Option<&Task>,
        priority: i32,
        mode: &str,
    ) -> Result<()> {
        let doc = SystemStateDoc {
            active_task: match active_task {
                Some(task) => Some(serde_json::to_value(task)?),
                None => None,
            },
            priority,
            mode: mode.to_string(),
            timestamp: Utc::now(),
        };
        self.system
            .insert(KEY_STATE, serde_json::to_vec(&doc)?)?;
        Ok(())
    }

    pub fn read_system_state(&self) -> Result<Option<SystemStateDoc>> {
        match self.system.get(KEY_STATE)? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// Unconditional reset to IDLE, written once at startup before any other
    /// state publication.
    pub fn reset_state(&self) -> Result<()> {
        self.set_system_state(None, 0, "IDLE")
    }

    // --- schedule documents ---

    pub fn put_schedule(&self, doc: &ScheduleDoc) -> Result<()> {
        self.schedules
            .insert(doc.id.as_bytes(), serde_json::to_vec(doc)?)?;
        Ok(())
    }

    pub fn get_schedule(&self, id: &str) -> Result<Option<ScheduleDoc>> {
        match self.schedules.get(id.as_bytes())? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn delete_schedule(&self, id: &str) -> Result<bool> {
        Ok(self.schedules.remove(id.as_bytes())?.is_some())
    }

    /// All schedule documents, sorted by display date then time.
    /// Lexicographic order is chronological for `YYYY-MM-DD` / `HH:MM`.
    pub fn list_schedules(&self) -> Result<Vec<ScheduleDoc>> {
        let mut docs = Vec::new();
        for item in self.schedules.iter() {
            let (_, raw) = item?;
            match serde_json::from_slice::<ScheduleDoc>(&raw) {
                Ok(doc) => docs.push(doc),
                Err(e) => warn!("Skipping unreadable schedule document: {}", e),
            }
        }
        docs.sort_by(|a, b| (&a.date, &a.time).cmp(&(&b.date, &b.time)));
        Ok(docs)
    }

    /// Mark a schedule document completed after the scheduler promoted it.
    /// Missing documents are not an error.
    pub fn mark_schedule_completed(&self, id: &str) -> Result<()> {
        if let Some(mut doc) = self.get_schedule(id)? {
            doc.status = SCHEDULE_COMPLETED.to_string();
            self.put_schedule(&doc)?;
        }
        Ok(())
    }

    /// Rewrite the display `date`/`time` of every listed schedule in one
    /// atomic batch. Ids without a backing document are skipped. Returns the
    /// number of documents actually rewritten.
    pub fn shift_schedule_times(&self, updates: &[(String, String, String)]) -> Result<usize> {
        let mut batch = sled::Batch::default();
        let mut updated = 0;
        for (id, date, time) in updates {
            match self.get_schedule(id)? {
                Some(mut doc) => {
                    doc.date = date.clone();
                    doc.time = time.clone();
                    batch.insert(id.as_bytes(), serde_json::to_vec(&doc)?);
                    updated += 1;
                }
                None => continue,
            }
        }
        if updated > 0 {
            self.schedules.apply_batch(batch)?;
        }
        Ok(updated)
    }

    // --- broadcast log ---

    /// Append a log entry. Keys are zero-padded epoch nanoseconds plus a
    /// uuid so iteration order is chronological.
    pub fn append_log(&self, user: &str, action: &str, log_type: &str, details: &str) -> Result<String> {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let entry = LogEntry {
            id: id.clone(),
            user: user.to_string(),
            action: action.to_string(),
            log_type: log_type.to_string(),
            details: details.to_string(),
            timestamp: now,
        };
        let nanos = now
            .timestamp_nanos_opt()
            .unwrap_or_else(|| now.timestamp_micros() * 1000);
        let key = format!("{:020}-{}", nanos, id);
        self.logs.insert(key.as_bytes(), serde_json::to_vec(&entry)?)?;
        Ok(id)
    }

    /// Most recent log entries, newest first.
    pub fn recent_logs(&self, limit: usize) -> Result<Vec<LogEntry>> {
        let mut entries = Vec::new();
        for item in self.logs.iter().rev().take(limit) {
            let (_, raw) = item?;
            match serde_json::from_slice::<LogEntry>(&raw) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("Skipping unreadable log entry: {}", e),
            }
        }
        Ok(entries)
    }

    /// Delete every log entry recorded for `user`. Returns the number
    /// removed.
    pub fn prune_logs_for_user(&self, user: &str) -> Result<usize> {
        let mut batch = sled::Batch::default();
        let mut pruned = 0;
        for item in self.logs.iter() {
            let (key, raw) = item?;
            if let Ok(entry) = serde_json::from_slice::<LogEntry>(&raw) {
                if entry.user == user {
                    batch.remove(key);
                    pruned += 1;
                }
            }
        }
        if pruned > 0 {
            self.logs.apply_batch(batch)?;
        }
        Ok(pruned)
    }

    // --- emergency status document ---

    pub fn read_emergency_status(&self) -> Result<EmergencyStatusDoc> {
        match self.emergency.get(KEY_EMERGENCY_STATUS)? {
            Some(raw) => Ok(serde_json::from_slice(&raw)?),
            None => Ok(EmergencyStatusDoc::default()),
        }
    }

    /// Record an ACTIVATED/DEACTIVATED event, prepending it to the history.
    pub fn record_emergency_event(&self, action: &str, user: &str) -> Result<()> {
        let mut doc = self.read_emergency_status()?;
        let now = Utc::now();
        let active = action == "ACTIVATED";
        doc.history.insert(
            0,
            EmergencyEvent {
                id: now.to_rfc3339(),
                action: action.to_string(),
                time: now.with_timezone(&Local).format("%Y-%m-%d %I:%M %p").to_string(),
                user: user.to_string(),
            },
        );
        doc.active = active;
        doc.triggered_by = if active { Some(user.to_string()) } else { None };
        doc.timestamp = now;
        self.emergency
            .insert(KEY_EMERGENCY_STATUS, serde_json::to_vec(&doc)?)?;
        Ok(())
    }

    /// Force the emergency document inactive with an empty history
    /// (operator reset path).
    pub fn reset_emergency(&self) -> Result<()> {
        let doc = EmergencyStatusDoc::default();
        self.emergency
            .insert(KEY_EMERGENCY_STATUS, serde_json::to_vec(&doc)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::task::{Task, TaskKind, TaskPayload};
    use tempfile::TempDir;

    fn open_store() -> (TempDir, Storage) {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        (dir, storage)
    }

    fn schedule_doc(id: &str, date: &str, time: &str) -> ScheduleDoc {
        ScheduleDoc {
            id: id.to_string(),
            message: format!("announcement {id}"),
            date: date.to_string(),
            time: time.to_string(),
            repeat: "none".to_string(),
            zones: "All Zones".to_string(),
            status: SCHEDULE_PENDING.to_string(),
            user: "ops".to_string(),
        }
    }

    #[test]
    fn state_doc_reset_and_read() {
        let (_dir, storage) = open_store();
        storage.reset_state().unwrap();
        let doc = storage.read_system_state().unwrap().unwrap();
        assert_eq!(doc.mode, "IDLE");
        assert_eq!(doc.priority, 0);
        assert!(doc.active_task.is_none());
    }

    #[test]
    fn state_doc_carries_task_shape() {
        let (_dir, storage) = open_store();
        let task = Task::with_id("v1", TaskKind::Voice, TaskPayload::for_user("admin"));
        storage.set_system_state(Some(&task), 30, "BROADCAST").unwrap();
        let doc = storage.read_system_state().unwrap().unwrap();
        assert_eq!(doc.mode, "BROADCAST");
        assert_eq!(doc.priority, 30);
        let active = doc.active_task.unwrap();
        assert_eq!(active["id"], "v1");
        assert_eq!(active["kind"], "voice");
    }

    #[test]
    fn schedule_crud_and_ordering() {
        let (_dir, storage) = open_store();
        storage.put_schedule(&schedule_doc("b", "2026-08-02", "09:00")).unwrap();
        storage.put_schedule(&schedule_doc("a", "2026-08-01", "22:30")).unwrap();
        storage.put_schedule(&schedule_doc("c", "2026-08-02", "08:15")).unwrap();

        let listed = storage.list_schedules().unwrap();
        let ids: Vec<&str> = listed.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["a", "c", "b"]);

        assert!(storage.delete_schedule("a").unwrap());
        assert!(!storage.delete_schedule("a").unwrap());
        assert!(storage.get_schedule("a").unwrap().is_none());
    }

    #[test]
    fn mark_completed_is_idempotent_by_id() {
        let (_dir, storage) = open_store();
        storage.put_schedule(&schedule_doc("s1", "2026-08-01", "10:00")).unwrap();
        storage.mark_schedule_completed("s1").unwrap();
        storage.mark_schedule_completed("s1").unwrap();
        storage.mark_schedule_completed("missing").unwrap();
        let doc = storage.get_schedule("s1").unwrap().unwrap();
        assert_eq!(doc.status, SCHEDULE_COMPLETED);
    }

    #[test]
    fn shift_batch_rewrites_date_time() {
        let (_dir, storage) = open_store();
        storage.put_schedule(&schedule_doc("s1", "2026-08-01", "10:00")).unwrap();
        storage.put_schedule(&schedule_doc("s2", "2026-08-01", "10:05")).unwrap();

        let updates = vec![
            ("s1".to_string(), "2026-08-01".to_string(), "10:02".to_string()),
            ("s2".to_string(), "2026-08-01".to_string(), "10:07".to_string()),
            ("ghost".to_string(), "2026-08-01".to_string(), "10:09".to_string()),
        ];
        let updated = storage.shift_schedule_times(&updates).unwrap();
        assert_eq!(updated, 2);
        assert_eq!(storage.get_schedule("s1").unwrap().unwrap().time, "10:02");
        assert_eq!(storage.get_schedule("s2").unwrap().unwrap().time, "10:07");
    }

    #[test]
    fn logs_append_recent_prune() {
        let (_dir, storage) = open_store();
        storage.append_log("admin", "Broadcast Started", "Voice", "lobby").unwrap();
        storage.append_log("tester", "Schedule Created", "Schedule", "s1").unwrap();
        storage.append_log("admin", "Broadcast Stopped", "Voice", "lobby").unwrap();

        let recent = storage.recent_logs(10).unwrap();
        assert_eq!(recent.len(), 3);
        // Newest first
        assert_eq!(recent[0].action, "Broadcast Stopped");

        let pruned = storage.prune_logs_for_user("admin").unwrap();
        assert_eq!(pruned, 2);
        let remaining = storage.recent_logs(10).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].user, "tester");
    }

    #[test]
    fn emergency_history_prepends() {
        let (_dir, storage) = open_store();
        storage.record_emergency_event("ACTIVATED", "admin").unwrap();
        storage.record_emergency_event("DEACTIVATED", "admin").unwrap();

        let doc = storage.read_emergency_status().unwrap();
        assert!(!doc.active);
        assert!(doc.triggered_by.is_none());
        assert_eq!(doc.history.len(), 2);
        assert_eq!(doc.history[0].action, "DEACTIVATED");
        assert_eq!(doc.history[1].action, "ACTIVATED");

        storage.reset_emergency().unwrap();
        let cleared = storage.read_emergency_status().unwrap();
        assert!(!cleared.active);
        assert!(cleared.history.is_empty());
    }

    #[test]
    fn second_instance_is_refused() {
        let (dir, _storage) = open_store();
        assert!(Storage::open(dir.path()).is_err());
    }
}
