//! Periodic cleanup of bookings whose checkout never completed.
//!
//! A paid booking writes its appointment before the checkout session exists.
//! If checkout creation fails, or the user never pays, the appointment would
//! otherwise stay `scheduled` forever. A checkout that completes after the
//! sweep still wins: the webhook completes the payment and reinstates the
//! booking when its slot is free.

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::errors::AppError;
use crate::models::SweepReport;
use crate::store::Store;

/// Runs one sweep over bookings older than `max_age_hours`.
pub async fn sweep_once(store: &dyn Store, max_age_hours: i64) -> Result<SweepReport, AppError> {
    let cutoff = Utc::now() - ChronoDuration::hours(max_age_hours);
    let report = store.sweep_orphaned_bookings(cutoff).await?;

    if report.appointments_cancelled > 0 || report.payments_expired > 0 {
        tracing::info!(
            "Orphan sweep cancelled {} appointments and expired {} payments",
            report.appointments_cancelled,
            report.payments_expired
        );
    } else {
        tracing::debug!("Orphan sweep found nothing to clean up");
    }
    Ok(report)
}

/// Spawns the sweep loop. Failures are logged and the loop keeps going.
pub fn spawn(store: Arc<dyn Store>, max_age_hours: i64, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(e) = sweep_once(store.as_ref(), max_age_hours).await {
                tracing::error!("Orphan sweep failed: {}", e);
            }
        }
    })
}
