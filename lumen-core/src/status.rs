//! Observable status text.
//!
//! Each pipeline owns one [`StatusBoard`]; whoever displays status
//! subscribes to it instead of the pipeline writing into a UI.

use std::fmt;

use tokio::sync::watch;

/// How a status line should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Idle or informational.
    Info,
    /// Streaming normally.
    Active,
    /// Degraded but running.
    Warning,
    /// Stopped because of a failure.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Active => "active",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub text: String,
    pub severity: Severity,
}

impl Status {
    pub fn new(text: impl Into<String>, severity: Severity) -> Self {
        Self {
            text: text.into(),
            severity,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.text)
    }
}

/// Publisher side of a status line.
#[derive(Debug)]
pub struct StatusBoard {
    tx: watch::Sender<Status>,
}

impl StatusBoard {
    pub fn new(text: impl Into<String>) -> Self {
        let (tx, _) = watch::channel(Status::new(text, Severity::Info));
        Self { tx }
    }

    /// Publish a new status; unchanged values do not wake subscribers.
    pub fn set(&self, text: impl Into<String>, severity: Severity) {
        let status = Status::new(text, severity);
        self.tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }

    pub fn info(&self, text: impl Into<String>) {
        self.set(text, Severity::Info);
    }

    pub fn active(&self, text: impl Into<String>) {
        self.set(text, Severity::Active);
    }

    pub fn warning(&self, text: impl Into<String>) {
        self.set(text, Severity::Warning);
    }

    pub fn error(&self, text: impl Into<String>) {
        self.set(text, Severity::Error);
    }

    pub fn current(&self) -> Status {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.tx.subscribe()
    }
}
