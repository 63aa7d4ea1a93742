//! Background promotion loop.
//!
//! A single spawned task wakes at a fixed cadence (1 Hz in production) and
//! runs one [`PaController::tick`] per wake-up: while the channel is idle,
//! the due head of the schedule queue is promoted onto it. The loop takes
//! the controller lock only inside `tick` and never sleeps while holding
//! it. Flipping the controller's running flag makes the loop exit at the
//! next tick boundary.

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::PaController;

/// Spawn the promotion loop. Returns the join handle; the loop finishes
/// after [`PaController::shutdown`] is called.
pub fn spawn_scheduler(controller: Arc<PaController>, tick: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if !controller.is_running() {
                break;
            }
            controller.tick();
        }
        debug!("scheduler loop terminated");
    })
}
