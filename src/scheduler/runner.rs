//! The wakeup loop.
//!
//! A single background task that peeks the earliest queued job, sleeps
//! until its deadline, and dispatches it to the executor. The sleep is
//! interruptible by an edge-triggered wakeup signal, raised whenever the
//! queue is mutated externally, so a freshly inserted earlier deadline (or
//! the removal of the job being waited on) takes effect immediately. There
//! is no periodic polling: correctness never depends on a tick granularity.

use crate::error::{BotError, Result};
use crate::scheduler::executor::JobExecutor;
use crate::scheduler::queue::{JobQueue, ScheduleEntry};
use chrono::{DateTime, Local};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// What the loop should do next, decided under the queue lock.
enum NextAction {
    /// Queue is empty: block until a wakeup signal arrives.
    Idle,
    /// Head of the queue is due: it has been popped and must run now.
    Due(ScheduleEntry),
    /// Head of the queue is in the future: sleep until then or until
    /// signalled.
    WaitUntil(DateTime<Local>),
}

/// Single-task deadline loop driving all scheduled sends.
pub(crate) struct WakeupLoop {
    pub(crate) queue: Arc<Mutex<JobQueue>>,
    pub(crate) wakeup: Arc<Notify>,
    pub(crate) executor: Arc<JobExecutor>,
    pub(crate) stop: CancellationToken,
    pub(crate) error_backoff: Duration,
}

impl WakeupLoop {
    /// Run until stopped. One iteration at a time; an unexpected error logs,
    /// backs off for a fixed interval, and resumes; a single bad iteration
    /// must never terminate the loop.
    pub(crate) async fn run(self) {
        info!("wakeup loop started");
        loop {
            if self.stop.is_cancelled() {
                break;
            }
            match self.iterate().await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    error!("wakeup loop iteration failed: {e}");
                    tokio::select! {
                        _ = sleep(self.error_backoff) => {}
                        _ = self.stop.cancelled() => break,
                    }
                }
            }
        }
        info!("wakeup loop stopped");
    }

    /// Peek (and, when due, pop) under a single lock acquisition so a
    /// concurrent rebuild cannot slip between the check and the pop.
    fn next_action(&self) -> Result<NextAction> {
        let mut queue = self
            .queue
            .lock()
            .map_err(|_| BotError::Scheduler("job queue lock poisoned".to_owned()))?;
        let head = queue.peek_earliest().map(|(fire_at, _)| fire_at);
        match head {
            None => Ok(NextAction::Idle),
            Some(fire_at) if fire_at <= Local::now() => Ok(NextAction::Due(queue.pop_earliest()?)),
            Some(fire_at) => Ok(NextAction::WaitUntil(fire_at)),
        }
    }

    /// One loop iteration. Returns `false` when a stop was requested.
    async fn iterate(&self) -> Result<bool> {
        match self.next_action()? {
            NextAction::Idle => {
                debug!("queue empty, waiting for wakeup signal");
                tokio::select! {
                    _ = self.wakeup.notified() => Ok(true),
                    _ = self.stop.cancelled() => Ok(false),
                }
            }
            NextAction::Due(entry) => {
                debug!("job for {} is due", entry.recipient_id);
                self.executor.execute(&entry.recipient_id, entry.fire_at).await;
                // Loop immediately: other jobs may be equally overdue.
                Ok(true)
            }
            NextAction::WaitUntil(fire_at) => {
                let wait = (fire_at - Local::now()).to_std().unwrap_or(Duration::ZERO);
                tokio::select! {
                    _ = sleep(wait) => {}
                    _ = self.wakeup.notified() => {
                        debug!("wakeup signal received, re-checking queue");
                    }
                    _ = self.stop.cancelled() => return Ok(false),
                }
                Ok(true)
            }
        }
    }
}
