//! moyuren: a daily "slacking calendar" chat bot.
//!
//! Each chat recipient (group or user) can configure one daily send time.
//! At that time the bot fetches the day's calendar image, renders a caption
//! and delivers both through a webhook. Recipients manage their schedule
//! and trigger word through plain chat commands.
//!
//! The interesting part is the scheduler: a single priority queue of
//! pending sends plus one background task that sleeps until the earliest
//! deadline and is woken early whenever a schedule changes. No polling
//! tick anywhere.

pub mod commands;
pub mod config;
pub mod content;
pub mod delivery;
pub mod error;
pub mod scheduler;
pub mod settings;

pub use commands::{Command, CommandHandler};
pub use config::BotConfig;
pub use content::{CalendarContent, ContentProducer, HttpCalendarProducer};
pub use delivery::{MessageSender, WebhookSender};
pub use error::{BotError, Result};
pub use scheduler::Scheduler;
pub use settings::{DailyTime, SettingsStore, DEFAULT_TRIGGER_WORD};
