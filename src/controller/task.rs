//! Task model for the playback arbitration controller.
//!
//! A [`Task`] is one claim on the PA output channel: a live voice or text
//! broadcast, the emergency alert, a queued schedule, or background audio.
//! Priorities and statuses carry wire-exact integer values because external
//! consumers (dashboards, the state document) order and render by them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Kind of playback a task represents. Determines preemption semantics:
/// schedules are soft-preempted (re-queued), everything else is hard-stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Voice,
    Text,
    Emergency,
    Schedule,
    Background,
}

impl TaskKind {
    /// Priority tier this kind is admitted at.
    pub fn default_priority(&self) -> Priority {
        match self {
            TaskKind::Voice | TaskKind::Text => Priority::Realtime,
            TaskKind::Emergency => Priority::Emergency,
            TaskKind::Schedule => Priority::Schedule,
            TaskKind::Background => Priority::Background,
        }
    }

    /// Externally visible mode label while a task of this kind is playing.
    pub fn mode(&self) -> Mode {
        match self {
            TaskKind::Voice | TaskKind::Text => Mode::Broadcast,
            TaskKind::Emergency => Mode::Emergency,
            TaskKind::Schedule => Mode::Schedule,
            TaskKind::Background => Mode::Background,
        }
    }
}

/// Priority tier. Wire values (0/10/20/30/100) are part of the external
/// contract; the gaps are intentional headroom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Idle,
    Background,
    Schedule,
    Realtime,
    Emergency,
}

impl Priority {
    pub fn value(&self) -> i32 {
        match self {
            Priority::Idle => 0,
            Priority::Background => 10,
            Priority::Schedule => 20,
            Priority::Realtime => 30,
            Priority::Emergency => 100,
        }
    }

    pub fn from_value(v: i32) -> Option<Self> {
        match v {
            0 => Some(Priority::Idle),
            10 => Some(Priority::Background),
            20 => Some(Priority::Schedule),
            30 => Some(Priority::Realtime),
            100 => Some(Priority::Emergency),
            _ => None,
        }
    }
}

impl Serialize for Priority {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.value())
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = i32::deserialize(deserializer)?;
        Priority::from_value(v)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown priority value {v}")))
    }
}

/// Lifecycle status of a task. Wire values 1-4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Pending,
    Playing,
    Interrupted,
    Completed,
}

impl TaskStatus {
    pub fn value(&self) -> i32 {
        match self {
            TaskStatus::Pending => 1,
            TaskStatus::Playing => 2,
            TaskStatus::Interrupted => 3,
            TaskStatus::Completed => 4,
        }
    }

    pub fn from_value(v: i32) -> Option<Self> {
        match v {
            1 => Some(TaskStatus::Pending),
            2 => Some(TaskStatus::Playing),
            3 => Some(TaskStatus::Interrupted),
            4 => Some(TaskStatus::Completed),
            _ => None,
        }
    }
}

impl Serialize for TaskStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.value())
    }
}

impl<'de> Deserialize<'de> for TaskStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = i32::deserialize(deserializer)?;
        TaskStatus::from_value(v)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown status value {v}")))
    }
}

/// Externally visible mode of the whole system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Idle,
    Broadcast,
    Schedule,
    Emergency,
    Background,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Idle => "IDLE",
            Mode::Broadcast => "BROADCAST",
            Mode::Schedule => "SCHEDULE",
            Mode::Emergency => "EMERGENCY",
            Mode::Background => "BACKGROUND",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attribute map carried by a task. `user` is always present; the rest is
/// whatever the submitting surface attached (zones, text content, audio refs).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPayload {
    pub user: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub zones: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TaskPayload {
    pub fn for_user(user: impl Into<String>) -> Self {
        TaskPayload {
            user: user.into(),
            ..Default::default()
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_zones(mut self, zones: Vec<String>) -> Self {
        self.zones = zones;
        self
    }
}

/// One claim on the output channel.
///
/// Serializes to the external document shape
/// `{id, kind, priority:int, payload, status:int, created_at, scheduled_time}`
/// with ISO-8601 timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub kind: TaskKind,
    pub priority: Priority,
    pub payload: TaskPayload,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub scheduled_time: DateTime<Utc>,
}

impl Task {
    /// New task with a generated id, admitted at the kind's default priority.
    /// `scheduled_time` equals `created_at` for every kind except SCHEDULE.
    pub fn new(kind: TaskKind, payload: TaskPayload) -> Self {
        Task::with_id(Uuid::new_v4().to_string(), kind, payload)
    }

    /// New task with an externally supplied id.
    pub fn with_id(id: impl Into<String>, kind: TaskKind, payload: TaskPayload) -> Self {
        let now = Utc::now();
        Task {
            id: id.into(),
            kind,
            priority: kind.default_priority(),
            payload,
            status: TaskStatus::Pending,
            created_at: now,
            scheduled_time: now,
        }
    }

    /// New SCHEDULE task due at `when`.
    pub fn schedule(id: impl Into<String>, payload: TaskPayload, when: DateTime<Utc>) -> Self {
        let mut task = Task::with_id(id, TaskKind::Schedule, payload);
        task.scheduled_time = when;
        task
    }

    /// Whether this task is due for promotion at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_time <= now
    }
}
