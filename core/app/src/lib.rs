//! CloudBox application layer.
//!
//! The [`UploadWorkflow`] controller owns the session state and exposes the
//! user-triggered operations: authenticate, select a file, upload it to the
//! configured folder, and verify access to that folder. Every operation
//! reports its result as an [`Outcome`] for the UI to present.

pub mod config;
pub mod error;
pub mod outcome;
pub mod picker;
pub mod session;
pub mod workflow;

pub use config::AppConfig;
pub use error::WorkflowError;
pub use outcome::{Notice, Outcome, Severity, Status, Tone};
pub use picker::{FilePicker, PresetPicker};
pub use session::SessionState;
pub use workflow::{UploadWorkflow, WorkflowSettings};
