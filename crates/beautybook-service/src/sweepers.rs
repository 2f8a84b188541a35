//! Background workers implementing the time-driven side of C6/C8/C11: none
//! of these transitions are triggered by an incoming request, so something
//! has to poll for them. Each sweeper is a plain `tokio::spawn`ed loop over
//! the same locked engines the handlers use, matching the single-process,
//! in-memory-state-behind-a-mutex shape the rest of the service crate uses.

use chrono::Utc;
use std::time::Duration as StdDuration;
use tracing::{info, warn};

use crate::middleware::std_duration;
use crate::state::AppState;

const SWEEP_INTERVAL: StdDuration = StdDuration::from_secs(30);

/// Expires stale `Requested` reservations and marks `Confirmed` ones that
/// ran past their no-show grace window.
pub fn spawn_reservation_sweeper(state: AppState) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let expire_after = std_duration(state.config.reservation_expire_after);
            let no_show_grace = std_duration(state.config.reservation_no_show_grace);
            let mut reservations = state.reservations.lock().await;
            let changed = reservations.auto_progress(Utc::now(), expire_after, no_show_grace);
            drop(reservations);
            if !changed.is_empty() {
                info!(count = changed.len(), "reservation sweeper auto-progressed reservations");
            }
        }
    });
}

/// Writes the inverse debit for any point grant past its `expiresAt`.
pub fn spawn_points_sweeper(state: AppState) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let mut points = state.points.lock().await;
            match points.expire(Utc::now()) {
                Ok(expired) if !expired.is_empty() => {
                    info!(count = expired.len(), "points sweeper expired stale grants");
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "points sweeper failed"),
            }
        }
    });
}

/// Drains the notification queue, retrying delivery-eligible failures up to
/// the configured bound and dropping invalid tokens it encounters along the
/// way.
pub fn spawn_notification_sweeper(state: AppState) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let max_retries = state.config.notifications_max_retries;
            let mut notifications = state.notifications.lock().await;
            if notifications.pending().is_empty() {
                continue;
            }
            notifications.drain(state.push_sender.as_ref(), max_retries);
        }
    });
}

pub fn spawn_all(state: &AppState) {
    spawn_reservation_sweeper(state.clone());
    spawn_points_sweeper(state.clone());
    spawn_notification_sweeper(state.clone());
}
