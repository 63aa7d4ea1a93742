//! # Pacast - PA Broadcast Control Plane
//!
//! Pacast is the control plane of a public address (PA) broadcast server.
//! Live voice and text announcements, scheduled announcements, background
//! audio, and an emergency alert all compete for one output channel; the
//! playback arbitration controller decides at every moment which task owns
//! it, preempts lower-priority work, and promotes queued schedules when the
//! channel goes idle.
//!
//! ## Features
//!
//! - **Priority Arbitration**: Strict tiers (emergency > realtime > schedule
//!   > background) with kind-specific preemption - schedules resume, live
//!   broadcasts are hard-stopped.
//! - **Emergency Latch**: While the emergency alert is live, nothing below
//!   it is admitted; the triggering user is queryable for ownership policy.
//! - **Time Shift**: Time stolen from queued schedules by higher-priority
//!   broadcasts is added back to every queued entry, preserving relative
//!   spacing instead of bursting on release.
//! - **Durable State Mirror**: Every transition is published to a document
//!   store; schedules, the broadcast log, and emergency history live there
//!   too.
//! - **Async Design**: Built with Tokio; the promotion loop runs as a
//!   background task at a 1 Hz cadence.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use pacast::controller::{scheduler, PaController, Task, TaskKind, TaskPayload};
//! use pacast::storage::Storage;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let storage = Arc::new(Storage::open("./data")?);
//!     let controller = Arc::new(PaController::new(storage));
//!     let loop_handle = scheduler::spawn_scheduler(controller.clone(), Duration::from_secs(1));
//!
//!     let task = Task::new(TaskKind::Voice, TaskPayload::for_user("admin"));
//!     let accepted = controller.request(task);
//!     assert!(accepted);
//!
//!     controller.shutdown();
//!     loop_handle.await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  PaController   │ ← arbitration, emergency latch, time shift
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │  Scheduler Loop │ ← 1 Hz promotion of due schedules
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │  Document Store │ ← state doc, schedules, logs, emergency history
//! └─────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`controller`] - the playback arbitration controller, task model, and
//!   promotion loop
//! - [`storage`] - sled-backed document collections
//! - [`config`] - configuration management
//! - [`validation`] - boundary validation for submissions
//! - [`logutil`] - log sanitization helpers

pub mod config;
pub mod controller;
pub mod logutil;
pub mod storage;
pub mod validation;
