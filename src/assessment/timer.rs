use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickControl {
    Continue,
    Stop,
}

/// Handle to a scheduled countdown. Dropping it cancels the schedule.
#[derive(Debug)]
pub struct TimerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Periodic callback scheduling on the tokio runtime.
#[derive(Debug, Clone)]
pub struct TimerDriver {
    interval: Duration,
}

impl TimerDriver {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs `callback` once per interval, first after one full interval, until
    /// it answers [`TickControl::Stop`] or the handle is cancelled.
    pub fn schedule<F, Fut>(&self, mut callback: F) -> TimerHandle
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = TickControl> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let period = self.interval;

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if callback().await == TickControl::Stop {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("countdown schedule stopped");
        });

        TimerHandle { cancel, task }
    }

    pub fn cancel(&self, handle: &TimerHandle) {
        handle.cancel();
    }
}
