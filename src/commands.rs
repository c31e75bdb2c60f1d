//! Chat command layer.
//!
//! Parses plain chat messages into commands and runs them against the
//! scheduler, producing a reply string for the recipient. A message that
//! contains the recipient's trigger word behaves like `execute_now`.

use crate::error::{BotError, Result};
use crate::scheduler::Scheduler;
use crate::settings::DailyTime;
use chrono::{DateTime, Local};
use std::sync::Arc;
use tracing::info;

/// A recognized chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `set_time HH:MM`: set the daily send time.
    SetTime(DailyTime),
    /// `reset_time`: turn off the daily send.
    ResetTime,
    /// `list_time`: show the configured daily time.
    ListTime,
    /// `next_time`: show when the next send fires.
    NextTime,
    /// `set_trigger WORD`: change the trigger word.
    SetTrigger(String),
    /// `execute_now`: produce and deliver immediately.
    ExecuteNow,
}

impl Command {
    /// Parse a chat message into a command.
    ///
    /// `None` means the message is not a command at all. `Some(Err)` means
    /// it names a command but carries a bad argument; the error text is
    /// suitable as a reply.
    pub fn parse(input: &str) -> Option<Result<Self>> {
        let input = input.trim();
        let (word, rest) = match input.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (input, ""),
        };

        match word {
            "set_time" => Some(if rest.is_empty() {
                Err(BotError::InvalidTimeFormat(
                    "set_time needs a time, e.g. `set_time 09:30`".to_owned(),
                ))
            } else {
                DailyTime::parse(rest).map(Self::SetTime)
            }),
            "reset_time" => Some(Ok(Self::ResetTime)),
            "list_time" => Some(Ok(Self::ListTime)),
            "next_time" => Some(Ok(Self::NextTime)),
            "set_trigger" => Some(if rest.is_empty() {
                Err(BotError::Config(
                    "set_trigger needs a word, e.g. `set_trigger moyu`".to_owned(),
                ))
            } else {
                Ok(Self::SetTrigger(rest.to_owned()))
            }),
            "execute_now" => Some(Ok(Self::ExecuteNow)),
            _ => None,
        }
    }
}

/// Rough human-readable wait until `until`, for reply texts.
fn humanize_wait(until: DateTime<Local>, now: DateTime<Local>) -> String {
    let secs = (until - now).num_seconds().max(0);
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m")
    } else {
        format!("{secs}s")
    }
}

/// Runs commands against the scheduler on behalf of chat recipients.
pub struct CommandHandler {
    scheduler: Arc<Scheduler>,
}

impl CommandHandler {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self { scheduler }
    }

    /// Handle one incoming chat message.
    ///
    /// Returns the reply to post, or `None` when the message is neither a
    /// command nor the recipient's trigger word. Command failures come back
    /// as reply text, never as an error.
    pub async fn handle_message(&self, recipient_id: &str, text: &str) -> Option<String> {
        if let Some(parsed) = Command::parse(text) {
            let reply = match parsed {
                Ok(command) => {
                    info!("{recipient_id} issued {command:?}");
                    self.run(recipient_id, command)
                        .await
                        .unwrap_or_else(|e| e.to_string())
                }
                Err(e) => e.to_string(),
            };
            return Some(reply);
        }

        // Slash-prefixed messages are platform commands for someone else.
        if text.trim_start().starts_with('/') {
            return None;
        }
        let trigger = self.scheduler.trigger_word(recipient_id).ok()?;
        if text.contains(&trigger) {
            info!("{recipient_id} used trigger word");
            let reply = self
                .run(recipient_id, Command::ExecuteNow)
                .await
                .unwrap_or_else(|e| e.to_string());
            return Some(reply);
        }
        None
    }

    /// Run a single command and render its reply.
    pub async fn run(&self, recipient_id: &str, command: Command) -> Result<String> {
        match command {
            Command::SetTime(time) => {
                let next = self.scheduler.set_schedule(recipient_id, time)?;
                Ok(format!(
                    "Daily send set to {time}. Next send in {}.",
                    humanize_wait(next, Local::now())
                ))
            }
            Command::ResetTime => match self.scheduler.clear_schedule(recipient_id)? {
                Some(previous) => Ok(format!("Daily send at {previous} turned off.")),
                None => Ok("No daily send is configured.".to_owned()),
            },
            Command::ListTime => {
                let trigger = self.scheduler.trigger_word(recipient_id)?;
                match self.scheduler.schedule_for(recipient_id)? {
                    Some(time) => {
                        let wait = self
                            .scheduler
                            .next_fire(recipient_id)?
                            .map(|at| format!(", next send in {}", humanize_wait(at, Local::now())))
                            .unwrap_or_default();
                        Ok(format!(
                            "Daily send at {time}{wait}. Trigger word: `{trigger}`."
                        ))
                    }
                    None => Ok(format!(
                        "No daily send is configured. Trigger word: `{trigger}`."
                    )),
                }
            }
            Command::NextTime => match self.scheduler.next_fire(recipient_id)? {
                Some(at) => Ok(format!(
                    "Next send at {} (in {}).",
                    at.format("%Y-%m-%d %H:%M"),
                    humanize_wait(at, Local::now())
                )),
                None => Ok("No daily send is configured.".to_owned()),
            },
            Command::SetTrigger(word) => {
                self.scheduler.set_trigger_word(recipient_id, &word)?;
                Ok(format!("Trigger word set to `{word}`."))
            }
            Command::ExecuteNow => {
                self.scheduler.trigger_now(recipient_id).await?;
                Ok("Calendar sent.".to_owned())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::config::SchedulerConfig;
    use crate::scheduler::testing::{FlakyProducer, RecordingSender};
    use crate::settings::SettingsStore;

    fn handler_with(sender: Arc<RecordingSender>) -> CommandHandler {
        let scheduler = Scheduler::new(
            SettingsStore::in_memory(),
            Arc::new(FlakyProducer::ok()),
            sender,
            &SchedulerConfig {
                call_timeout_secs: 2,
                error_backoff_secs: 1,
            },
        );
        CommandHandler::new(Arc::new(scheduler))
    }

    #[test]
    fn parse_recognizes_all_commands() {
        assert_eq!(
            Command::parse("set_time 09:30").unwrap().unwrap(),
            Command::SetTime(DailyTime { hour: 9, minute: 30 })
        );
        assert_eq!(
            Command::parse("set_time 0930").unwrap().unwrap(),
            Command::SetTime(DailyTime { hour: 9, minute: 30 })
        );
        assert_eq!(Command::parse("reset_time").unwrap().unwrap(), Command::ResetTime);
        assert_eq!(Command::parse("list_time").unwrap().unwrap(), Command::ListTime);
        assert_eq!(Command::parse("next_time").unwrap().unwrap(), Command::NextTime);
        assert_eq!(
            Command::parse("set_trigger fish").unwrap().unwrap(),
            Command::SetTrigger("fish".to_owned())
        );
        assert_eq!(Command::parse("execute_now").unwrap().unwrap(), Command::ExecuteNow);
    }

    #[test]
    fn parse_rejects_bad_arguments_but_not_unknown_text() {
        assert!(Command::parse("set_time").unwrap().is_err());
        assert!(Command::parse("set_time 25:00").unwrap().is_err());
        assert!(Command::parse("set_trigger").unwrap().is_err());
        assert!(Command::parse("hello there").is_none());
        assert!(Command::parse("").is_none());
    }

    #[test]
    fn humanize_buckets() {
        let now = Local::now();
        assert_eq!(humanize_wait(now, now), "0s");
        assert_eq!(humanize_wait(now + chrono::Duration::seconds(45), now), "45s");
        assert_eq!(humanize_wait(now + chrono::Duration::minutes(3), now), "3m");
        assert_eq!(
            humanize_wait(now + chrono::Duration::minutes(125), now),
            "2h 5m"
        );
        assert_eq!(
            humanize_wait(now + chrono::Duration::hours(26), now),
            "1d 2h 0m"
        );
    }

    #[tokio::test]
    async fn set_and_list_round_trip() {
        let handler = handler_with(Arc::new(RecordingSender::default()));

        let reply = handler.handle_message("g1", "set_time 09:30").await.unwrap();
        assert!(reply.contains("09:30"), "{reply}");

        let reply = handler.handle_message("g1", "list_time").await.unwrap();
        assert!(reply.contains("09:30"), "{reply}");

        let reply = handler.handle_message("g1", "reset_time").await.unwrap();
        assert!(reply.contains("turned off"), "{reply}");

        let reply = handler.handle_message("g1", "list_time").await.unwrap();
        assert!(reply.contains("No daily send"), "{reply}");
    }

    #[tokio::test]
    async fn bad_time_argument_becomes_a_reply() {
        let handler = handler_with(Arc::new(RecordingSender::default()));
        let reply = handler.handle_message("g1", "set_time 99:99").await.unwrap();
        assert!(reply.contains("hour must be"), "{reply}");
    }

    #[tokio::test]
    async fn trigger_word_fires_an_immediate_send() {
        let sender = Arc::new(RecordingSender::default());
        let handler = handler_with(Arc::clone(&sender));

        assert!(handler.handle_message("g1", "unrelated chatter").await.is_none());
        assert!(handler.handle_message("g1", "/moyu slash-command").await.is_none());
        assert!(sender.sent_to().is_empty());

        let reply = handler.handle_message("g1", "time to moyu everyone").await.unwrap();
        assert!(reply.contains("sent"), "{reply}");
        assert_eq!(sender.sent_to(), vec!["g1"]);
    }

    #[tokio::test]
    async fn custom_trigger_word_replaces_the_default() {
        let sender = Arc::new(RecordingSender::default());
        let handler = handler_with(Arc::clone(&sender));

        handler.handle_message("g1", "set_trigger fish").await.unwrap();
        assert!(handler.handle_message("g1", "moyu").await.is_none());

        handler.handle_message("g1", "fish").await.unwrap();
        assert_eq!(sender.sent_to(), vec!["g1"]);
    }

    #[tokio::test]
    async fn execute_now_failure_reports_instead_of_sending() {
        let handler = handler_with(Arc::new(RecordingSender::failing()));
        let reply = handler.handle_message("g1", "execute_now").await.unwrap();
        assert!(reply.contains("recording sender set to fail"), "{reply}");
    }
}
