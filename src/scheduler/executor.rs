//! Execution of a due send job.
//!
//! All collaborator failures are absorbed here; nothing propagates to the
//! wakeup loop. Collaborator calls run under a hard timeout so a hung
//! content source or chat platform cannot stall the loop indefinitely.

use crate::content::ContentProducer;
use crate::delivery::MessageSender;
use crate::error::{BotError, Result};
use crate::scheduler::queue::JobQueue;
use crate::settings::SettingsStore;
use chrono::{DateTime, Local};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Runs one send job: content production, delivery, renewal.
pub struct JobExecutor {
    settings: Arc<Mutex<SettingsStore>>,
    queue: Arc<Mutex<JobQueue>>,
    producer: Arc<dyn ContentProducer>,
    sender: Arc<dyn MessageSender>,
    call_timeout: Duration,
}

impl JobExecutor {
    pub fn new(
        settings: Arc<Mutex<SettingsStore>>,
        queue: Arc<Mutex<JobQueue>>,
        producer: Arc<dyn ContentProducer>,
        sender: Arc<dyn MessageSender>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            settings,
            queue,
            producer,
            sender,
            call_timeout,
        }
    }

    /// Execute the job that was scheduled for `fire_at`.
    ///
    /// If the recipient's schedule was removed between signal and pop, the
    /// job is stale and aborts silently (no renewal). Otherwise the schedule
    /// is renewed unconditionally: a content or delivery failure must not
    /// desynchronize the daily cadence.
    pub(crate) async fn execute(&self, recipient_id: &str, fire_at: DateTime<Local>) {
        let still_scheduled = match self.settings.lock() {
            Ok(settings) => settings.daily_time(recipient_id).is_some(),
            Err(_) => {
                error!("settings lock poisoned, treating job for {recipient_id} as live");
                true
            }
        };
        if !still_scheduled {
            debug!("schedule for {recipient_id} was removed, dropping stale job");
            return;
        }

        match self.send_once(recipient_id).await {
            Ok(()) => info!("sent daily calendar to {recipient_id}"),
            Err(e @ BotError::ContentUnavailable(_)) => {
                warn!("skipping send to {recipient_id}: {e}");
            }
            Err(e) => warn!("send to {recipient_id} failed: {e}"),
        }

        let Ok(mut queue) = self.queue.lock() else {
            error!("job queue lock poisoned, cannot renew schedule for {recipient_id}");
            return;
        };
        let next = queue.reschedule_after_fire(recipient_id, fire_at, Local::now());
        info!("next send to {recipient_id} at {}", next.format("%Y-%m-%d %H:%M"));
    }

    /// Produce content and deliver it once, independent of any schedule.
    /// Also backs the `execute_now` command.
    pub async fn send_once(&self, recipient_id: &str) -> Result<()> {
        let content = match timeout(self.call_timeout, self.producer.produce()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(BotError::ContentUnavailable(format!(
                    "content production exceeded {}s",
                    self.call_timeout.as_secs()
                )));
            }
        };

        match timeout(self.call_timeout, self.sender.send(recipient_id, &content)).await {
            Ok(result) => result,
            Err(_) => Err(BotError::Delivery(format!(
                "delivery to {recipient_id} exceeded {}s",
                self.call_timeout.as_secs()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::scheduler::testing::{FlakyProducer, HangingProducer, RecordingSender};
    use crate::settings::DailyTime;
    use chrono::Duration as ChronoDuration;

    fn executor_with(
        producer: Arc<dyn ContentProducer>,
        sender: Arc<dyn MessageSender>,
        scheduled: &[&str],
    ) -> (JobExecutor, Arc<Mutex<JobQueue>>) {
        let mut store = SettingsStore::in_memory();
        for id in scheduled {
            store.set_daily_time(id, DailyTime { hour: 9, minute: 0 });
        }
        let settings = Arc::new(Mutex::new(store));
        let queue = Arc::new(Mutex::new(JobQueue::new()));
        let executor = JobExecutor::new(
            settings,
            Arc::clone(&queue),
            producer,
            sender,
            Duration::from_millis(200),
        );
        (executor, queue)
    }

    #[tokio::test]
    async fn successful_job_sends_and_renews() {
        let sender = Arc::new(RecordingSender::default());
        let (executor, queue) =
            executor_with(Arc::new(FlakyProducer::ok()), Arc::clone(&sender) as _, &["g1"]);

        let fire_at = Local::now();
        executor.execute("g1", fire_at).await;

        assert_eq!(sender.sent_to(), vec!["g1"]);
        let renewed = queue.lock().unwrap().fire_at_for("g1").unwrap();
        assert_eq!(renewed, fire_at + ChronoDuration::hours(24));
    }

    #[tokio::test]
    async fn content_failure_skips_delivery_but_still_renews() {
        let sender = Arc::new(RecordingSender::default());
        let (executor, queue) = executor_with(
            Arc::new(FlakyProducer::failing()),
            Arc::clone(&sender) as _,
            &["g1"],
        );

        let fire_at = Local::now();
        executor.execute("g1", fire_at).await;

        assert!(sender.sent_to().is_empty());
        let renewed = queue.lock().unwrap().fire_at_for("g1").unwrap();
        assert_eq!(renewed, fire_at + ChronoDuration::hours(24));
    }

    #[tokio::test]
    async fn delivery_failure_still_renews() {
        let sender = Arc::new(RecordingSender::failing());
        let (executor, queue) =
            executor_with(Arc::new(FlakyProducer::ok()), Arc::clone(&sender) as _, &["g1"]);

        executor.execute("g1", Local::now()).await;
        assert!(queue.lock().unwrap().fire_at_for("g1").is_some());
    }

    #[tokio::test]
    async fn stale_job_aborts_without_sending_or_renewing() {
        let sender = Arc::new(RecordingSender::default());
        // "g1" has no schedule in the settings store.
        let (executor, queue) =
            executor_with(Arc::new(FlakyProducer::ok()), Arc::clone(&sender) as _, &[]);

        executor.execute("g1", Local::now()).await;

        assert!(sender.sent_to().is_empty());
        assert!(queue.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn hung_producer_is_cut_off_and_schedule_still_renews() {
        let sender = Arc::new(RecordingSender::default());
        let (executor, queue) =
            executor_with(Arc::new(HangingProducer), Arc::clone(&sender) as _, &["g1"]);

        executor.execute("g1", Local::now()).await;

        assert!(sender.sent_to().is_empty());
        assert!(queue.lock().unwrap().fire_at_for("g1").is_some());
    }

    #[tokio::test]
    async fn rebuild_during_execution_leaves_a_single_entry() {
        // A settings change can rebuild the queue while the job is mid-send
        // (the queue lock is not held across collaborator calls). Renewal
        // must not leave a second entry for the recipient.
        let mut store = SettingsStore::in_memory();
        store.set_daily_time("g1", DailyTime { hour: 9, minute: 0 });
        let queue = Arc::new(Mutex::new(JobQueue::new()));
        let executor = Arc::new(JobExecutor::new(
            Arc::new(Mutex::new(store)),
            Arc::clone(&queue),
            Arc::new(FlakyProducer::slow(Duration::from_millis(200))),
            Arc::new(RecordingSender::default()),
            Duration::from_secs(1),
        ));

        let fire_at = Local::now();
        let job = tokio::spawn({
            let executor = Arc::clone(&executor);
            async move { executor.execute("g1", fire_at).await }
        });

        // Land a rebuild while the producer is still running.
        tokio::time::sleep(Duration::from_millis(50)).await;
        queue
            .lock()
            .unwrap()
            .rebuild(&[("g1".to_owned(), DailyTime { hour: 9, minute: 0 })], Local::now());

        job.await.unwrap();
        let queue = queue.lock().unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.fire_at_for("g1"), Some(fire_at + ChronoDuration::hours(24)));
    }

    #[tokio::test]
    async fn send_once_propagates_content_error() {
        let sender = Arc::new(RecordingSender::default());
        let (executor, _queue) = executor_with(
            Arc::new(FlakyProducer::failing()),
            Arc::clone(&sender) as _,
            &[],
        );

        let err = executor.send_once("g1").await.unwrap_err();
        assert!(matches!(err, BotError::ContentUnavailable(_)));
    }
}
