//! Daily send scheduling.
//!
//! Three pieces: a priority [`queue`] of pending jobs, a [`runner`] task that
//! sleeps until the earliest deadline, and an [`executor`] that performs one
//! send and renews the schedule. [`Scheduler`] ties them together behind the
//! API the command layer and the binary use.
//!
//! All fire times are process-local wall-clock times. Changing the system
//! timezone mid-flight is not supported; restart instead.

pub mod executor;
pub mod queue;
mod runner;

pub use executor::JobExecutor;
pub use queue::{JobQueue, ScheduleEntry, next_occurrence};

use crate::config::SchedulerConfig;
use crate::content::ContentProducer;
use crate::delivery::MessageSender;
use crate::error::{BotError, Result};
use crate::settings::{DailyTime, SettingsStore, DEFAULT_TRIGGER_WORD};
use chrono::{DateTime, Local};
use runner::WakeupLoop;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Handle to the scheduling subsystem.
///
/// Owns the settings store, the job queue and the background wakeup loop.
/// All mutations go through this type so the queue and the store never
/// drift apart and the loop is always signalled after a change.
pub struct Scheduler {
    settings: Arc<Mutex<SettingsStore>>,
    queue: Arc<Mutex<JobQueue>>,
    wakeup: Arc<Notify>,
    executor: Arc<JobExecutor>,
    stop: CancellationToken,
    error_backoff: Duration,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Build a scheduler around a settings store and the two collaborators.
    /// Nothing runs until [`start`](Self::start) is called.
    pub fn new(
        settings: SettingsStore,
        producer: Arc<dyn ContentProducer>,
        sender: Arc<dyn MessageSender>,
        config: &SchedulerConfig,
    ) -> Self {
        let settings = Arc::new(Mutex::new(settings));
        let queue = Arc::new(Mutex::new(JobQueue::new()));
        let executor = Arc::new(JobExecutor::new(
            Arc::clone(&settings),
            Arc::clone(&queue),
            producer,
            sender,
            Duration::from_secs(config.call_timeout_secs),
        ));
        Self {
            settings,
            queue,
            wakeup: Arc::new(Notify::new()),
            executor,
            stop: CancellationToken::new(),
            error_backoff: Duration::from_secs(config.error_backoff_secs),
            handle: Mutex::new(None),
        }
    }

    /// Rebuild the queue from the stored schedules and spawn the wakeup
    /// loop. Calling start on a running scheduler is a no-op.
    pub fn start(&self) -> Result<()> {
        let mut handle = self
            .handle
            .lock()
            .map_err(|_| BotError::Scheduler("scheduler handle lock poisoned".to_owned()))?;
        if handle.is_some() {
            warn!("scheduler already running, ignoring start");
            return Ok(());
        }

        self.rebuild_and_signal()?;
        let scheduled = self.queue_lock()?.len();
        info!("scheduler starting with {scheduled} pending jobs");

        let wakeup_loop = WakeupLoop {
            queue: Arc::clone(&self.queue),
            wakeup: Arc::clone(&self.wakeup),
            executor: Arc::clone(&self.executor),
            stop: self.stop.clone(),
            error_backoff: self.error_backoff,
        };
        *handle = Some(tokio::spawn(wakeup_loop.run()));
        Ok(())
    }

    /// Stop the wakeup loop and wait for it to finish. A job already
    /// executing runs to completion first.
    pub async fn stop(&self) {
        self.stop.cancel();
        let handle = match self.handle.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("wakeup loop task failed on shutdown: {e}");
            }
        }
        info!("scheduler stopped");
    }

    /// Set (or replace) the recipient's daily send time. Returns the next
    /// fire time.
    pub fn set_schedule(
        &self,
        recipient_id: &str,
        time: DailyTime,
    ) -> Result<DateTime<Local>> {
        {
            let mut settings = self.settings_lock()?;
            settings.set_daily_time(recipient_id, time);
            if let Err(e) = settings.save() {
                warn!("cannot persist settings: {e}");
            }
        }
        self.rebuild_and_signal()?;

        let next = self
            .queue_lock()?
            .fire_at_for(recipient_id)
            .ok_or_else(|| BotError::Scheduler(format!("no queue entry for {recipient_id}")))?;
        info!("daily send for {recipient_id} set to {time}, next at {next}");
        Ok(next)
    }

    /// Turn off the recipient's daily send. Returns the previous time, if
    /// one was set.
    pub fn clear_schedule(&self, recipient_id: &str) -> Result<Option<DailyTime>> {
        let previous = {
            let mut settings = self.settings_lock()?;
            let previous = settings.clear_daily_time(recipient_id);
            if previous.is_some() {
                if let Err(e) = settings.save() {
                    warn!("cannot persist settings: {e}");
                }
            }
            previous
        };

        if previous.is_some() {
            self.queue_lock()?.remove_recipient(recipient_id);
            self.wakeup.notify_one();
            info!("daily send for {recipient_id} turned off");
        }
        Ok(previous)
    }

    /// The recipient's configured daily time, if any.
    pub fn schedule_for(&self, recipient_id: &str) -> Result<Option<DailyTime>> {
        Ok(self.settings_lock()?.daily_time(recipient_id))
    }

    /// Next pending fire time for the recipient, if scheduled.
    pub fn next_fire(&self, recipient_id: &str) -> Result<Option<DateTime<Local>>> {
        Ok(self.queue_lock()?.fire_at_for(recipient_id))
    }

    /// The recipient's trigger word (the default when never customized).
    pub fn trigger_word(&self, recipient_id: &str) -> Result<String> {
        Ok(self
            .settings_lock()?
            .trigger_word(recipient_id)
            .unwrap_or(DEFAULT_TRIGGER_WORD)
            .to_owned())
    }

    /// Set the recipient's trigger word.
    pub fn set_trigger_word(&self, recipient_id: &str, word: &str) -> Result<()> {
        let mut settings = self.settings_lock()?;
        settings.set_trigger_word(recipient_id, word);
        if let Err(e) = settings.save() {
            warn!("cannot persist settings: {e}");
        }
        Ok(())
    }

    /// Produce and deliver immediately, bypassing the queue. The daily
    /// schedule, if any, is unaffected.
    pub async fn trigger_now(&self, recipient_id: &str) -> Result<()> {
        self.executor.send_once(recipient_id).await
    }

    fn settings_lock(&self) -> Result<MutexGuard<'_, SettingsStore>> {
        self.settings
            .lock()
            .map_err(|_| BotError::Settings("settings lock poisoned".to_owned()))
    }

    fn queue_lock(&self) -> Result<MutexGuard<'_, JobQueue>> {
        self.queue
            .lock()
            .map_err(|_| BotError::Scheduler("job queue lock poisoned".to_owned()))
    }

    /// Repopulate the queue from the settings store, then wake the loop so
    /// it re-evaluates its deadline. Never holds both locks at once.
    fn rebuild_and_signal(&self) -> Result<()> {
        let scheduled = self.settings_lock()?.scheduled();
        self.queue_lock()?.rebuild(&scheduled, Local::now());
        self.wakeup.notify_one();
        Ok(())
    }
}
