//! Push-based dashboard refresh.
//!
//! Row changes arrive as Postgres notifications on
//! `learning_sessions_changed` (payload: the user id). Bursts are coalesced
//! with a trailing-edge debounce before the dashboard is recomputed and
//! published on a `watch` channel.

use std::time::Duration;

use chrono::Utc;
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio::sync::{mpsc, watch};

use crate::dashboard::Dashboard;
use crate::models::DashboardData;
use crate::store::SessionStore;

pub const CHANNEL: &str = "learning_sessions_changed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub user_id: String,
}

/// Forwards notifications for `user_id` until the receiver is dropped or the
/// listener fails.
pub async fn listen_for_changes(
    pool: &PgPool,
    user_id: String,
) -> anyhow::Result<mpsc::Receiver<ChangeEvent>> {
    let mut listener = PgListener::connect_with(pool).await?;
    listener.listen(CHANNEL).await?;
    let (tx, rx) = mpsc::channel(64);

    tokio::spawn(async move {
        loop {
            match listener.recv().await {
                Ok(notification) => {
                    if notification.payload() != user_id {
                        continue;
                    }
                    let event = ChangeEvent {
                        user_id: user_id.clone(),
                    };
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    tracing::error!(error = %err, "change listener stopped");
                    break;
                }
            }
        }
    });

    tracing::info!(channel = CHANNEL, "listening for session changes");
    Ok(rx)
}

/// Waits for the next burst of events and returns how many it held.
///
/// The burst ends once `window` passes with no new event. Returns `None`
/// when the channel closed before any event arrived.
pub async fn next_burst(rx: &mut mpsc::Receiver<ChangeEvent>, window: Duration) -> Option<usize> {
    let first = rx.recv().await?;
    tracing::trace!(user_id = %first.user_id, "change received");
    let mut count = 1;

    loop {
        match tokio::time::timeout(window, rx.recv()).await {
            Ok(Some(_)) => count += 1,
            Ok(None) | Err(_) => return Some(count),
        }
    }
}

/// Publishes a fresh dashboard after every debounced burst of changes.
/// Returns when the event channel closes or every subscriber is gone.
pub async fn run<S: SessionStore>(
    dashboard: &Dashboard<S>,
    user_id: &str,
    mut events: mpsc::Receiver<ChangeEvent>,
    window: Duration,
    updates: watch::Sender<DashboardData>,
) {
    let data = dashboard.load(user_id, Utc::now().date_naive()).await;
    if updates.send(data).is_err() {
        return;
    }

    while let Some(coalesced) = next_burst(&mut events, window).await {
        tracing::debug!(user_id, coalesced, "recomputing dashboard");
        let data = dashboard.load(user_id, Utc::now().date_naive()).await;
        if updates.send(data).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::dashboard::DashboardOptions;
    use crate::store::memory::MemoryStore;

    fn event() -> ChangeEvent {
        ChangeEvent {
            user_id: "user_1".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn burst_is_coalesced() {
        let (tx, mut rx) = mpsc::channel(16);
        tokio::spawn(async move {
            for _ in 0..3 {
                tx.send(event()).await.unwrap();
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            tokio::time::sleep(Duration::from_secs(5)).await;
            tx.send(event()).await.unwrap();
        });

        let window = Duration::from_millis(500);
        assert_eq!(next_burst(&mut rx, window).await, Some(3));
        assert_eq!(next_burst(&mut rx, window).await, Some(1));
        assert_eq!(next_burst(&mut rx, window).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_channel_flushes_pending_burst() {
        let (tx, mut rx) = mpsc::channel(16);
        tx.send(event()).await.unwrap();
        tx.send(event()).await.unwrap();
        drop(tx);
        assert_eq!(next_burst(&mut rx, Duration::from_secs(1)).await, Some(2));
        assert_eq!(next_burst(&mut rx, Duration::from_secs(1)).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn run_loads_once_per_burst() {
        let dashboard = Dashboard::new(MemoryStore::new(Vec::new()), DashboardOptions::default());
        let (tx, rx) = mpsc::channel(16);
        let (updates, mut subscriber) = watch::channel(DashboardData::loading());

        for _ in 0..4 {
            tx.send(event()).await.unwrap();
        }
        drop(tx);

        run(&dashboard, "user_1", rx, Duration::from_millis(250), updates).await;

        let latest = subscriber.borrow_and_update().clone();
        assert!(!latest.loading);
        assert!(latest.error.is_none());
        // Initial load plus one coalesced reload; each is a probe and nine metric queries.
        assert_eq!(dashboard.store().queries.load(Ordering::SeqCst), 2 * 10);
    }
}
