//! Failure taxonomy of the upload workflow.

use std::path::PathBuf;
use thiserror::Error;

use cloudbox_common::Error;

use crate::outcome::{Notice, Outcome, Status};

/// Why a workflow operation did not complete.
///
/// Each variant is caught at the boundary of the operation raising it and
/// turned into an [`Outcome`]; none of them ends the program.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Loading, refreshing, obtaining or persisting the credential failed.
    #[error("Authentication failed: {0}")]
    Authentication(#[source] Error),

    /// Upload requested with no file selected.
    #[error("No file selected")]
    SelectionAbsent,

    /// The selected file is gone.
    #[error("The file '{}' does not exist.", .0.display())]
    FileNotFound(PathBuf),

    /// No usable storage client yet.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Reading the file or creating the remote object failed.
    #[error("File upload failed: {0}")]
    Upload(#[source] Error),

    /// Listing the destination folder failed.
    #[error("Failed to access the folder: {0}")]
    FolderAccess(#[source] Error),
}

impl WorkflowError {
    /// Convert into the notice and status line the user sees.
    ///
    /// `provider` names the storage service in the "not authenticated" hint.
    pub fn into_outcome(self, provider: &str) -> Outcome {
        match &self {
            WorkflowError::Authentication(_) => Outcome::failed()
                .with_notice(Notice::error("Error", self.to_string()))
                .with_status(Status::failure("Authentication failed.")),
            WorkflowError::SelectionAbsent => Outcome::failed()
                .with_notice(Notice::warning("No File", "Please select a file to upload.")),
            WorkflowError::FileNotFound(_) => Outcome::failed()
                .with_notice(Notice::error("File Not Found", self.to_string()))
                .with_status(Status::failure("File not found.")),
            WorkflowError::NotAuthenticated => Outcome::failed().with_notice(Notice::warning(
                "Not Authenticated",
                format!("Please authenticate with {} first.", provider),
            )),
            WorkflowError::Upload(_) => Outcome::failed()
                .with_notice(Notice::error("Error", self.to_string()))
                .with_status(Status::failure("File upload failed.")),
            WorkflowError::FolderAccess(_) => {
                Outcome::failed().with_notice(Notice::error("Error", self.to_string()))
            }
        }
    }
}
