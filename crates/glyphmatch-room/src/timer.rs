//! The cancellable one-shot timer every room deadline is built on.
//!
//! A timer is just a spawned task that sleeps and then pushes a message
//! back into the owner's command channel — the firing is handled as an
//! ordinary queued event, never concurrently with other room work.
//! Dropping the handle aborts the task, which ties timer lifetime to the
//! state that armed it: a disarmed or superseded timer simply never
//! fires.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Handle to an armed one-shot timer. Drop (or [`cancel`](Self::cancel))
/// to disarm.
#[derive(Debug)]
pub struct TimerHandle {
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Arms a timer that sends `msg` into `tx` after `after`.
    ///
    /// If the receiving side is gone by the time the timer fires, the
    /// send result is ignored — a timer outliving its owner is a no-op.
    pub fn arm<T: Send + 'static>(
        after: Duration,
        tx: mpsc::Sender<T>,
        msg: T,
    ) -> Self {
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(msg).await;
        });
        Self { task }
    }

    /// Disarms the timer. Equivalent to dropping the handle.
    pub fn cancel(self) {}
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
