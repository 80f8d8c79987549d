//! Validation and driver message forwarding
//!
//! The instance holds an explicit [`MessageSink`] instead of a global
//! callback. Native validation messages are forwarded to it for as long as
//! the instance lives.

use std::fmt;

/// Severity of a forwarded driver message
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MessageSeverity {
    /// Diagnostic chatter
    Verbose,
    /// Informational message, e.g. resource details
    Info,
    /// Likely misuse or a performance concern
    Warning,
    /// Invalid usage that may cause undefined behaviour
    Error,
}

impl MessageSeverity {
    /// Log level used when forwarding to the `log` facade.
    ///
    /// Info messages go to trace; some drivers are extremely chatty at info.
    pub fn log_level(self) -> log::Level {
        match self {
            Self::Verbose | Self::Info => log::Level::Trace,
            Self::Warning => log::Level::Warn,
            Self::Error => log::Level::Error,
        }
    }
}

/// Origin of a forwarded driver message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageSource {
    /// Validation layers
    Validation,
    /// The driver implementation itself
    Implementation,
}

impl fmt::Display for MessageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "Validation"),
            Self::Implementation => write!(f, "Implementation"),
        }
    }
}

/// Receiver for native validation messages
///
/// Sinks may be called from driver threads, hence `Send + Sync`.
pub trait MessageSink: Send + Sync {
    /// Handle one message
    fn message(&self, severity: MessageSeverity, source: MessageSource, message: &str);
}

/// Sink that forwards messages to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl MessageSink for LogSink {
    fn message(&self, severity: MessageSeverity, source: MessageSource, message: &str) {
        log::log!(severity.log_level(), "[{}] {}", source, message);
    }
}
