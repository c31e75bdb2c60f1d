//! Priority queue of pending daily send jobs.
//!
//! Holds one entry per recipient with an active schedule, ordered by fire
//! time. The queue is rebuilt wholesale from the settings store on every
//! settings change (rebuilds are rare relative to daily fires, so wholesale
//! replacement is preferred over in-place decrease-key bookkeeping).

use crate::error::{BotError, Result};
use crate::settings::DailyTime;
use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// A pending send job for one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    /// Absolute local timestamp at which the job becomes due.
    pub fire_at: DateTime<Local>,
    /// Recipient the job will deliver to.
    pub recipient_id: String,
}

impl Ord for ScheduleEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Recipient id breaks ties only to give the heap a total order;
        // relative order of equal fire times is unspecified for callers.
        self.fire_at
            .cmp(&other.fire_at)
            .then_with(|| self.recipient_id.cmp(&other.recipient_id))
    }
}

impl PartialOrd for ScheduleEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

fn occurrence_on(date: NaiveDate, time: DailyTime) -> Option<DateTime<Local>> {
    date.and_hms_opt(u32::from(time.hour), u32::from(time.minute), 0)
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
}

/// Next occurrence of `time` strictly after `now`: today if the time has not
/// yet passed, otherwise the next day on which the local time exists (DST
/// gaps skip forward).
pub fn next_occurrence(time: DailyTime, now: DateTime<Local>) -> DateTime<Local> {
    let mut date = now.date_naive();
    loop {
        if let Some(at) = occurrence_on(date, time) {
            if at > now {
                return at;
            }
        }
        date = match date.succ_opt() {
            Some(next) => next,
            // Unreachable for any realistic clock; stay safe near NaiveDate::MAX.
            None => return now + Duration::days(1),
        };
    }
}

/// Min-priority queue of `(fire_at, recipient_id)` pairs.
#[derive(Debug, Default)]
pub struct JobQueue {
    heap: BinaryHeap<Reverse<ScheduleEntry>>,
}

impl JobQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pending entries.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether the queue has no entries.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Discard all entries and repopulate from the given schedule list.
    /// Each recipient gets the next occurrence of its time strictly after
    /// `now`.
    pub fn rebuild(&mut self, scheduled: &[(String, DailyTime)], now: DateTime<Local>) {
        self.heap.clear();
        for (recipient_id, time) in scheduled {
            self.insert(ScheduleEntry {
                fire_at: next_occurrence(*time, now),
                recipient_id: recipient_id.clone(),
            });
        }
    }

    /// Insert an entry. Callers are responsible for the one-entry-per-
    /// recipient invariant (rebuild, remove, and reschedule preserve it).
    pub(crate) fn insert(&mut self, entry: ScheduleEntry) {
        self.heap.push(Reverse(entry));
    }

    /// Remove the entry for one recipient without a full rebuild. Returns
    /// whether an entry was removed.
    pub fn remove_recipient(&mut self, recipient_id: &str) -> bool {
        let before = self.heap.len();
        let kept: Vec<Reverse<ScheduleEntry>> = self
            .heap
            .drain()
            .filter(|Reverse(entry)| entry.recipient_id != recipient_id)
            .collect();
        self.heap = BinaryHeap::from(kept);
        self.heap.len() != before
    }

    /// Earliest pending entry, without removing it.
    pub fn peek_earliest(&self) -> Option<(DateTime<Local>, &str)> {
        self.heap
            .peek()
            .map(|Reverse(entry)| (entry.fire_at, entry.recipient_id.as_str()))
    }

    /// Remove and return the earliest pending entry.
    pub fn pop_earliest(&mut self) -> Result<ScheduleEntry> {
        self.heap
            .pop()
            .map(|Reverse(entry)| entry)
            .ok_or(BotError::EmptyQueue)
    }

    /// Pending fire time for one recipient, if any.
    pub fn fire_at_for(&self, recipient_id: &str) -> Option<DateTime<Local>> {
        self.heap
            .iter()
            .filter(|Reverse(entry)| entry.recipient_id == recipient_id)
            .map(|Reverse(entry)| entry.fire_at)
            .min()
    }

    /// Re-insert a recipient after its job fired: 24 hours after the
    /// original scheduled time, stepped forward in whole days until strictly
    /// after `now` so a long process pause cannot cause a duplicate same-day
    /// fire. Missed days are skipped, not caught up.
    ///
    /// Replaces any existing entry for the recipient: a settings rebuild may
    /// land while the job is executing (the lock is not held across the
    /// send) and re-insert the recipient before renewal runs.
    pub fn reschedule_after_fire(
        &mut self,
        recipient_id: &str,
        original_fire_at: DateTime<Local>,
        now: DateTime<Local>,
    ) -> DateTime<Local> {
        let mut next = original_fire_at + Duration::hours(24);
        while next <= now {
            next += Duration::hours(24);
        }
        self.remove_recipient(recipient_id);
        self.insert(ScheduleEntry {
            fire_at: next,
            recipient_id: recipient_id.to_owned(),
        });
        next
    }
}
