//! Background reaper for inactive sessions.
//!
//! Periodically demotes stale active sessions to idle and hibernates
//! long-idle sessions, releasing their sandboxes. Thresholds live in the
//! session service config.

use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::session::SessionService;

/// Spawn the reaper loop. The handle is detached by callers that run it
/// for the life of the process.
pub fn spawn(sessions: Arc<SessionService>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            match sessions.reap_inactive().await {
                Ok((0, 0)) => {}
                Ok((idled, hibernated)) => {
                    debug!(
                        "Reaper pass: {} session(s) idled, {} hibernated",
                        idled, hibernated
                    );
                }
                Err(e) => warn!("Reaper pass failed: {:?}", e),
            }
        }
    })
}
