//! Connection-level settings applied when a [`Database`](crate::Database) opens.

use std::time::Duration;

/// How booleans are written into integer parameter slots.
///
/// Decoding is always "nonzero is true"; only the write side varies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BoolEncoding {
    /// Writes 0 for `true` and 1 for `false`.
    ///
    /// This is the historical pairing. A value written this way reads back
    /// negated, so databases shared with other tools should use `Standard`.
    #[default]
    Inverted,
    /// Writes 1 for `true` and 0 for `false`.
    Standard,
}

impl BoolEncoding {
    pub fn encode(self, value: bool) -> i64 {
        match (self, value) {
            (BoolEncoding::Inverted, true) | (BoolEncoding::Standard, false) => 0,
            (BoolEncoding::Inverted, false) | (BoolEncoding::Standard, true) => 1,
        }
    }
}

/// `PRAGMA journal_mode` to set at open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalMode {
    Delete,
    Wal,
    Memory,
}

impl JournalMode {
    pub fn as_str(self) -> &'static str {
        match self {
            JournalMode::Delete => "DELETE",
            JournalMode::Wal => "WAL",
            JournalMode::Memory => "MEMORY",
        }
    }
}

/// Options applied when a [`Database`](crate::Database) is opened.
///
/// Start from [`Default`] and override with the `with_*` builders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// How long the engine waits on a locked database before a step fails
    /// with `SQLITE_BUSY`. Busy failures are not retried past this point.
    pub busy_timeout: Duration,
    /// Capacity of the connection's prepared-statement cache, which also
    /// holds the statements reused by live queries.
    pub statement_cache_capacity: usize,
    /// Integer stored for `true` and `false` parameters.
    pub bool_encoding: BoolEncoding,
    /// `journal_mode` pragma set at open. Left untouched when `None`.
    pub journal_mode: Option<JournalMode>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(5000),
            statement_cache_capacity: 16,
            bool_encoding: BoolEncoding::default(),
            journal_mode: None,
        }
    }
}

impl DatabaseConfig {
    /// Set [`busy_timeout`](Self::busy_timeout).
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Set [`statement_cache_capacity`](Self::statement_cache_capacity).
    pub fn with_statement_cache_capacity(mut self, capacity: usize) -> Self {
        self.statement_cache_capacity = capacity;
        self
    }

    /// Set [`bool_encoding`](Self::bool_encoding).
    pub fn with_bool_encoding(mut self, encoding: BoolEncoding) -> Self {
        self.bool_encoding = encoding;
        self
    }

    /// Switch the journal to `mode` when the database opens.
    pub fn with_journal_mode(mut self, mode: JournalMode) -> Self {
        self.journal_mode = Some(mode);
        self
    }
}
