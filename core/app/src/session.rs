//! Per-session workflow state.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cloudbox_storage::{StorageClient, Tokens};

use crate::error::WorkflowError;

/// State owned by the workflow controller.
///
/// Created empty; only authentication sets `credential` and `client`, only
/// file selection sets `selected_path`. Nothing here is persisted.
#[derive(Default)]
pub struct SessionState {
    credential: Option<Tokens>,
    selected_path: Option<PathBuf>,
    client: Option<Arc<dyn StorageClient>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn credential(&self) -> Option<&Tokens> {
        self.credential.as_ref()
    }

    pub fn selected_path(&self) -> Option<&Path> {
        self.selected_path.as_deref()
    }

    pub fn client(&self) -> Option<&Arc<dyn StorageClient>> {
        self.client.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.credential.is_some() && self.client.is_some()
    }

    /// Precondition of an upload: a file must have been selected.
    pub fn require_selection(&self) -> Result<&Path, WorkflowError> {
        self.selected_path().ok_or(WorkflowError::SelectionAbsent)
    }

    /// Precondition of remote operations: authentication must have succeeded.
    pub fn require_client(&self) -> Result<&Arc<dyn StorageClient>, WorkflowError> {
        match (&self.credential, &self.client) {
            (Some(_), Some(client)) => Ok(client),
            _ => Err(WorkflowError::NotAuthenticated),
        }
    }

    pub(crate) fn set_authenticated(&mut self, credential: Tokens, client: Arc<dyn StorageClient>) {
        self.credential = Some(credential);
        self.client = Some(client);
    }

    pub(crate) fn clear_authentication(&mut self) {
        self.credential = None;
        self.client = None;
    }

    pub(crate) fn set_selection(&mut self, path: Option<PathBuf>) {
        self.selected_path = path;
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("credential", &self.credential)
            .field("selected_path", &self.selected_path)
            .field("client", &self.client.as_ref().map(|c| c.name()))
            .finish()
    }
}
