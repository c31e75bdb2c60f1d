//! Per-recipient settings store.
//!
//! Maps a recipient id (chat group or user) to its trigger word and optional
//! daily send time. Mutated by the command layer, read by the scheduler when
//! rebuilding its queue. Persisted as a JSON file; a corrupt file is backed
//! up to `<path>.bak` and replaced rather than aborting startup.

use crate::error::{BotError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{info, warn};

/// Trigger word used when a recipient has not configured one.
pub const DEFAULT_TRIGGER_WORD: &str = "moyu";

/// A wall-clock time of day, minute resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyTime {
    /// Hour of day (0-23, process-local clock).
    pub hour: u8,
    /// Minute of hour (0-59).
    pub minute: u8,
}

impl DailyTime {
    /// Create a daily time, validating ranges.
    pub fn new(hour: u8, minute: u8) -> Result<Self> {
        if hour > 23 || minute > 59 {
            return Err(BotError::InvalidTimeFormat(format!(
                "hour must be 0-23 and minute 0-59, got {hour}:{minute}"
            )));
        }
        Ok(Self { hour, minute })
    }

    /// Parse a user-supplied time string.
    ///
    /// Accepts `HH:MM` (one or two digits on either side of the colon) and
    /// the bare four-digit `HHMM` form.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();

        if let Some((h, m)) = input.split_once(':') {
            let valid = |part: &str| {
                !part.is_empty() && part.len() <= 2 && part.bytes().all(|b| b.is_ascii_digit())
            };
            if !valid(h) || !valid(m) {
                return Err(BotError::InvalidTimeFormat(format!(
                    "expected HH:MM or HHMM, got `{input}`"
                )));
            }
            let hour: u8 = h.parse().map_err(|_| {
                BotError::InvalidTimeFormat(format!("cannot parse hour in `{input}`"))
            })?;
            let minute: u8 = m.parse().map_err(|_| {
                BotError::InvalidTimeFormat(format!("cannot parse minute in `{input}`"))
            })?;
            return Self::new(hour, minute);
        }

        if input.len() == 4 && input.bytes().all(|b| b.is_ascii_digit()) {
            let hour: u8 = input[..2]
                .parse()
                .map_err(|_| BotError::InvalidTimeFormat(format!("cannot parse `{input}`")))?;
            let minute: u8 = input[2..]
                .parse()
                .map_err(|_| BotError::InvalidTimeFormat(format!("cannot parse `{input}`")))?;
            return Self::new(hour, minute);
        }

        Err(BotError::InvalidTimeFormat(format!(
            "expected HH:MM or HHMM, got `{input}`"
        )))
    }
}

impl std::fmt::Display for DailyTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

fn default_trigger_word() -> String {
    DEFAULT_TRIGGER_WORD.to_owned()
}

/// Settings for a single recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientSettings {
    /// Word that triggers an immediate send when seen in a plain message.
    /// Legacy settings files without this field get the default on load.
    #[serde(default = "default_trigger_word")]
    pub trigger_word: String,
    /// Daily send time; `None` means scheduled sending is off.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_time: Option<DailyTime>,
}

impl Default for RecipientSettings {
    fn default() -> Self {
        Self {
            trigger_word: default_trigger_word(),
            daily_time: None,
        }
    }
}

/// Recipient settings store with optional JSON file persistence.
#[derive(Debug, Default)]
pub struct SettingsStore {
    path: Option<PathBuf>,
    entries: HashMap<String, RecipientSettings>,
}

impl SettingsStore {
    /// Create a store backed by the given file.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path: Some(path),
            entries: HashMap::new(),
        }
    }

    /// Create a memory-only store (no persistence). Used by tests and by
    /// deployments that manage settings externally.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load settings from disk. A missing file leaves the store empty; a
    /// corrupt file is renamed to `<path>.bak` and the store starts empty.
    pub fn load(&mut self) {
        let Some(path) = self.path.clone() else {
            return;
        };

        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("settings file {} not found, starting empty", path.display());
                return;
            }
            Err(e) => {
                warn!("cannot read settings file {}: {e}", path.display());
                return;
            }
        };

        match serde_json::from_slice::<HashMap<String, RecipientSettings>>(&bytes) {
            Ok(entries) => {
                info!(
                    "loaded settings for {} recipients from {}",
                    entries.len(),
                    path.display()
                );
                self.entries = entries;
            }
            Err(e) => {
                let backup = path.with_extension("json.bak");
                warn!(
                    "settings file {} is corrupt ({e}), backing up to {}",
                    path.display(),
                    backup.display()
                );
                if let Err(e) = std::fs::rename(&path, &backup) {
                    warn!("cannot back up corrupt settings file: {e}");
                }
            }
        }
    }

    /// Persist settings to disk. A no-op for memory-only stores.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| BotError::Settings(format!("cannot create settings dir: {e}")))?;
        }

        let json = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| BotError::Settings(format!("cannot serialize settings: {e}")))?;
        std::fs::write(path, json)
            .map_err(|e| BotError::Settings(format!("cannot write settings: {e}")))?;
        Ok(())
    }

    /// Settings for one recipient, if any exist.
    pub fn get(&self, recipient_id: &str) -> Option<&RecipientSettings> {
        self.entries.get(recipient_id)
    }

    /// The recipient's daily send time, if set.
    pub fn daily_time(&self, recipient_id: &str) -> Option<DailyTime> {
        self.entries.get(recipient_id).and_then(|s| s.daily_time)
    }

    /// The recipient's trigger word, if the recipient is known.
    pub fn trigger_word(&self, recipient_id: &str) -> Option<&str> {
        self.entries.get(recipient_id).map(|s| s.trigger_word.as_str())
    }

    /// Set or replace the recipient's daily send time.
    pub fn set_daily_time(&mut self, recipient_id: &str, time: DailyTime) {
        self.entries
            .entry(recipient_id.to_owned())
            .or_default()
            .daily_time = Some(time);
    }

    /// Clear the recipient's daily send time, preserving the trigger word.
    /// Returns the previous setting.
    pub fn clear_daily_time(&mut self, recipient_id: &str) -> Option<DailyTime> {
        self.entries
            .get_mut(recipient_id)
            .and_then(|s| s.daily_time.take())
    }

    /// Set the recipient's trigger word.
    pub fn set_trigger_word(&mut self, recipient_id: &str, word: &str) {
        self.entries
            .entry(recipient_id.to_owned())
            .or_default()
            .trigger_word = word.to_owned();
    }

    /// All recipients with an active daily schedule.
    pub fn scheduled(&self) -> Vec<(String, DailyTime)> {
        self.entries
            .iter()
            .filter_map(|(id, s)| s.daily_time.map(|t| (id.clone(), t)))
            .collect()
    }

    /// Number of known recipients.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store has no recipients.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
