//! Единый тип ошибок публичного API.

use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;

/// Битый или обрезанный документ. Для импорта всегда фатально.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    /// Сколько байт было прочитано к моменту ошибки.
    pub byte_offset: u64,
    /// Номер строки (с 1), на которой обнаружена ошибка.
    pub line: u64,
}

impl ParseError {
    pub fn new(message: impl Into<String>, byte_offset: u64, line: u64) -> Self {
        Self {
            message: message.into(),
            byte_offset,
            line,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (line {}, byte {})",
            self.message, self.line, self.byte_offset
        )
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML write error: {0}")]
    Xml(String),

    #[error("Amount overflow while accumulating account {account}")]
    Overflow { account: String },

    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(&'static str),

    #[error("Task cancelled")]
    Cancelled,

    #[error("Worker thread panicked: {0}")]
    WorkerPanicked(String),
}

impl LedgerError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
