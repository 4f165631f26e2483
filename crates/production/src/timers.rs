//! Timer management for the production runner.
//!
//! Timers are spawned as tokio tasks that sleep and then push the matching
//! timer event into the runner's timer queue. Cancelling aborts the task.

use fastsync_core::{Event, TimerId};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

fn timer_event(id: TimerId) -> Event {
    match id {
        TimerId::TimeoutCheck => Event::TimeoutCheckTimer,
        TimerId::StatusUpdate => Event::StatusUpdateTimer,
    }
}

/// Tokio-backed timers for one state machine.
pub struct TimerManager {
    timers: HashMap<TimerId, JoinHandle<()>>,
    event_tx: mpsc::Sender<Event>,
}

impl TimerManager {
    pub fn new(event_tx: mpsc::Sender<Event>) -> Self {
        Self {
            timers: HashMap::new(),
            event_tx,
        }
    }

    /// Set a timer that fires after `duration`, replacing any pending one
    /// with the same id.
    pub fn set_timer(&mut self, id: TimerId, duration: Duration) {
        self.cancel_timer(id);

        let event_tx = self.event_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            trace!(timer = ?id, "Timer fired");
            // The runner is gone if the queue is closed.
            let _ = event_tx.send(timer_event(id)).await;
        });

        self.timers.insert(id, handle);
        debug!(timer = ?id, ?duration, "Timer set");
    }

    /// Cancel a timer. No-op if it is not pending.
    pub fn cancel_timer(&mut self, id: TimerId) {
        if let Some(handle) = self.timers.remove(&id) {
            handle.abort();
            debug!(timer = ?id, "Timer cancelled");
        }
    }

    pub fn cancel_all(&mut self) {
        for (id, handle) in self.timers.drain() {
            handle.abort();
            trace!(timer = ?id, "Timer cancelled (shutdown)");
        }
    }

    /// Number of timers set and not cancelled. Fired timers still count
    /// until they are set again or cancelled.
    pub fn active_count(&self) -> usize {
        self.timers.len()
    }
}

impl Drop for TimerManager {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timer_fires() {
        let (event_tx, mut event_rx) = mpsc::channel(10);
        let mut manager = TimerManager::new(event_tx);

        manager.set_timer(TimerId::TimeoutCheck, Duration::from_millis(10));

        let event = tokio::time::timeout(Duration::from_millis(500), event_rx.recv())
            .await
            .expect("timeout")
            .expect("channel closed");
        assert!(matches!(event, Event::TimeoutCheckTimer));
    }

    #[tokio::test]
    async fn test_timer_cancel() {
        let (event_tx, mut event_rx) = mpsc::channel(10);
        let mut manager = TimerManager::new(event_tx);

        manager.set_timer(TimerId::StatusUpdate, Duration::from_millis(20));
        assert_eq!(manager.active_count(), 1);
        manager.cancel_timer(TimerId::StatusUpdate);
        assert_eq!(manager.active_count(), 0);

        let result = tokio::time::timeout(Duration::from_millis(100), event_rx.recv()).await;
        assert!(result.is_err(), "cancelled timer should not fire");
    }

    #[tokio::test]
    async fn test_timer_replace() {
        let (event_tx, mut event_rx) = mpsc::channel(10);
        let mut manager = TimerManager::new(event_tx);

        manager.set_timer(TimerId::StatusUpdate, Duration::from_secs(60));
        manager.set_timer(TimerId::StatusUpdate, Duration::from_millis(10));
        assert_eq!(manager.active_count(), 1);

        let event = tokio::time::timeout(Duration::from_millis(500), event_rx.recv())
            .await
            .expect("timeout")
            .expect("channel closed");
        assert!(matches!(event, Event::StatusUpdateTimer));
    }
}
