//! User-visible results of workflow operations.

use serde::Serialize;
use std::fmt;

use cloudbox_common::ObjectId;
use cloudbox_storage::RemoteObject;

/// How prominently a notice should be shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(label)
    }
}

/// A modal-style message: title plus body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub severity: Severity,
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, title, message)
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, title, message)
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, title, message)
    }

    fn new(severity: Severity, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Colour of the status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Success,
    Info,
    Failure,
}

/// Short status line text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub tone: Tone,
    pub text: String,
}

impl Status {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            tone: Tone::Success,
            text: text.into(),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self {
            tone: Tone::Info,
            text: text.into(),
        }
    }

    pub fn failure(text: impl Into<String>) -> Self {
        Self {
            tone: Tone::Failure,
            text: text.into(),
        }
    }
}

/// Result of one workflow operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    /// Whether the operation achieved what the user asked for.
    pub success: bool,
    pub notice: Option<Notice>,
    pub status: Option<Status>,
    /// Identifier of the object created by a successful upload.
    pub uploaded: Option<ObjectId>,
    /// Folder contents reported by a folder check.
    pub listing: Vec<RemoteObject>,
}

impl Outcome {
    pub fn succeeded() -> Self {
        Self::empty(true)
    }

    pub fn failed() -> Self {
        Self::empty(false)
    }

    fn empty(success: bool) -> Self {
        Self {
            success,
            notice: None,
            status: None,
            uploaded: None,
            listing: Vec::new(),
        }
    }

    pub fn with_notice(mut self, notice: Notice) -> Self {
        self.notice = Some(notice);
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_uploaded(mut self, id: ObjectId) -> Self {
        self.uploaded = Some(id);
        self
    }

    pub fn with_listing(mut self, listing: Vec<RemoteObject>) -> Self {
        self.listing = listing;
        self
    }

    pub fn status_text(&self) -> Option<&str> {
        self.status.as_ref().map(|s| s.text.as_str())
    }
}
