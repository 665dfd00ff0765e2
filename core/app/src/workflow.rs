//! The upload workflow controller.

use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use cloudbox_common::{Error, FolderId, ObjectId, Result};
use cloudbox_storage::{
    Authorizer, Connector, Content, CredentialStore, ListQuery, NewFile, StorageClient, Tokens,
};

use crate::error::WorkflowError;
use crate::outcome::{Notice, Outcome, Status};
use crate::picker::FilePicker;
use crate::session::SessionState;

/// Fixed parameters of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowSettings {
    /// Folder all uploads target; never changes during a session.
    pub folder_id: FolderId,
    /// Reject uploads whose selected file disappeared after selection.
    pub check_file_exists: bool,
}

/// Drives authentication, file selection and upload for one user session.
///
/// Operations may be invoked in any order. Only `upload` and
/// `verify_folder_access` check preconditions, and both borrow the controller
/// immutably, so neither can alter the session.
pub struct UploadWorkflow {
    settings: WorkflowSettings,
    store: Arc<dyn CredentialStore>,
    authorizer: Arc<dyn Authorizer>,
    connector: Arc<dyn Connector>,
    state: SessionState,
}

impl UploadWorkflow {
    pub fn new(
        settings: WorkflowSettings,
        store: Arc<dyn CredentialStore>,
        authorizer: Arc<dyn Authorizer>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            settings,
            store,
            authorizer,
            connector,
            state: SessionState::new(),
        }
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Name of the storage provider, for messages.
    pub fn provider_name(&self) -> &str {
        self.connector.name()
    }

    /// Obtain a credential and build a storage client from it.
    ///
    /// On failure the session is left unauthenticated; the user has to invoke
    /// this again.
    pub async fn authenticate(&mut self) -> Outcome {
        let provider = self.provider_name().to_string();

        match self.establish_session().await {
            Ok((credential, client)) => {
                info!("Authenticated with {}", provider);
                self.state.set_authenticated(credential, client);

                Outcome::succeeded()
                    .with_notice(Notice::info(
                        "Authentication",
                        format!("{} authenticated successfully!", provider),
                    ))
                    .with_status(Status::success(format!("{} authenticated.", provider)))
            }
            Err(e) => {
                warn!("Authentication failed: {}", e);
                self.state.clear_authentication();
                WorkflowError::Authentication(e).into_outcome(&provider)
            }
        }
    }

    /// Let the user pick the file to upload.
    ///
    /// Cancelling clears any previous selection. The path is not validated here.
    pub fn select_file(&mut self, picker: &dyn FilePicker) -> Outcome {
        let picked = picker.pick_file().filter(|p| !p.as_os_str().is_empty());

        match picked {
            Some(path) => {
                let name = display_name(&path).unwrap_or_else(|| path.display().to_string());
                debug!("Selected {}", path.display());
                self.state.set_selection(Some(path));

                Outcome::succeeded().with_status(Status::info(format!("File selected: {}", name)))
            }
            None => {
                debug!("File selection cancelled");
                self.state.set_selection(None);

                Outcome::failed().with_status(Status::failure("No file selected."))
            }
        }
    }

    /// Upload the selected file into the configured folder.
    pub async fn upload(&self) -> Outcome {
        match self.try_upload().await {
            Ok(id) => {
                info!("Uploaded file, id {}", id);

                Outcome::succeeded()
                    .with_notice(Notice::info(
                        "Success",
                        format!("File uploaded successfully! File ID: {}", id),
                    ))
                    .with_status(Status::success("File uploaded successfully!"))
                    .with_uploaded(id)
            }
            Err(e) => {
                if matches!(e, WorkflowError::Upload(_)) {
                    warn!("{}", e);
                }
                e.into_outcome(self.provider_name())
            }
        }
    }

    /// List the destination folder to confirm it is reachable.
    pub async fn verify_folder_access(&self) -> Outcome {
        let client = match self.state.require_client() {
            Ok(client) => client,
            Err(e) => return e.into_outcome(self.provider_name()),
        };

        let query = ListQuery::in_parent(&self.settings.folder_id);

        match client.list_files(&query).await {
            Ok(items) if items.is_empty() => Outcome::succeeded()
                .with_notice(Notice::info("Folder Empty", "The folder is empty.")),
            Ok(items) => {
                let lines: Vec<String> = items
                    .iter()
                    .map(|item| format!("{} (ID: {})", item.name, item.id))
                    .collect();

                Outcome::succeeded()
                    .with_notice(Notice::info(
                        "Files in Folder",
                        format!("Files in folder:\n{}", lines.join("\n")),
                    ))
                    .with_listing(items)
            }
            Err(e) => {
                warn!("Folder check failed: {}", e);
                WorkflowError::FolderAccess(e).into_outcome(self.provider_name())
            }
        }
    }

    async fn establish_session(&self) -> Result<(Tokens, Arc<dyn StorageClient>)> {
        let credential = match self.store.load().await? {
            Some(tokens) if tokens.is_valid() => {
                debug!("Persisted credential is valid");
                tokens
            }
            stale => {
                let fresh = match stale {
                    Some(tokens) if tokens.can_refresh() => {
                        info!("Persisted credential expired, refreshing");
                        self.authorizer.refresh(&tokens).await?
                    }
                    _ => {
                        info!("No usable credential, starting interactive login");
                        self.authorizer.login().await?
                    }
                };
                self.store.save(&fresh).await?;
                fresh
            }
        };

        let client = self.connector.connect(&credential)?;
        Ok((credential, client))
    }

    async fn try_upload(&self) -> std::result::Result<ObjectId, WorkflowError> {
        let path = self.state.require_selection()?;

        if self.settings.check_file_exists && !file_exists(path).await {
            return Err(WorkflowError::FileNotFound(path.to_path_buf()));
        }

        let client = self.state.require_client()?;

        let name = display_name(path).ok_or_else(|| {
            WorkflowError::Upload(Error::InvalidInput(format!(
                "'{}' has no file name",
                path.display()
            )))
        })?;
        let metadata = NewFile::in_folder(name, &self.settings.folder_id);

        let content = Content::from_file(path)
            .await
            .map_err(WorkflowError::Upload)?;

        client
            .create_file(&metadata, content)
            .await
            .map_err(WorkflowError::Upload)
    }
}

/// Final path component, used as the remote object name.
fn display_name(path: &Path) -> Option<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

async fn file_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
