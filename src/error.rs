//! Error types for the moyuren bot.

/// Top-level error type for the daily calendar bot.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    /// Pop was attempted on an empty schedule queue. Programmer error:
    /// callers must peek before popping.
    #[error("schedule queue is empty")]
    EmptyQueue,

    /// Calendar content could not be produced (all endpoints failed,
    /// timeout, no backup image). Transient and expected.
    #[error("content unavailable: {0}")]
    ContentUnavailable(String),

    /// Message delivery failed. Transient and expected; the next daily
    /// occurrence is the retry.
    #[error("delivery error: {0}")]
    Delivery(String),

    /// User supplied a time string that is not HH:MM / HHMM or is out of
    /// range. Surfaced by the command layer, never reaches the scheduler.
    #[error("invalid time format: {0}")]
    InvalidTimeFormat(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Recipient settings load/save error.
    #[error("settings error: {0}")]
    Settings(String),

    /// Scheduler internal error (lock poisoning, loop bookkeeping).
    #[error("scheduler error: {0}")]
    Scheduler(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, BotError>;
