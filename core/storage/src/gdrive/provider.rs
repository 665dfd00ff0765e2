//! Google Drive implementation of the storage capabilities.

use async_trait::async_trait;
use std::sync::Arc;

use cloudbox_common::{Error, ObjectId, Result};

use crate::credentials::{CredentialStore, Tokens};
use crate::provider::{
    Authorizer, Connector, Content, ListQuery, NewFile, RemoteObject, StorageClient,
};

use super::auth::TokenManager;
use super::client::{DriveClient, DriveFile};

/// Display name of the provider.
pub const PROVIDER_NAME: &str = "Google Drive";

/// Google Drive storage client.
///
/// Implements the StorageClient trait on top of the Drive v3 API.
pub struct DriveStorage {
    client: DriveClient,
}

impl DriveStorage {
    pub fn new(token_manager: Arc<TokenManager>) -> Result<Self> {
        Ok(Self::with_client(DriveClient::new(token_manager)?))
    }

    /// Wrap an already configured client.
    pub fn with_client(client: DriveClient) -> Self {
        Self { client }
    }
}

fn to_remote_object(file: DriveFile) -> RemoteObject {
    RemoteObject {
        id: ObjectId::new(file.id),
        name: file.name,
    }
}

#[async_trait]
impl StorageClient for DriveStorage {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn create_file(&self, metadata: &NewFile, content: Content) -> Result<ObjectId> {
        if metadata.name.is_empty() {
            return Err(Error::InvalidInput("File name cannot be empty".to_string()));
        }

        tracing::info!(
            "Uploading {} ({} bytes) to Google Drive",
            metadata.name,
            content.size
        );

        let file = self
            .client
            .upload_resumable(metadata, content.stream, content.size)
            .await?;

        tracing::info!("Upload finished: {}", file.id);
        Ok(ObjectId::new(file.id))
    }

    async fn list_files(&self, query: &ListQuery) -> Result<Vec<RemoteObject>> {
        let files = self
            .client
            .list_folder(&query.parent, query.include_trashed)
            .await?;

        Ok(files.into_iter().map(to_remote_object).collect())
    }
}

/// Connector producing [`DriveStorage`] clients.
pub struct DriveConnector {
    authorizer: Arc<dyn Authorizer>,
    store: Option<Arc<dyn CredentialStore>>,
}

impl DriveConnector {
    /// `authorizer` renews access tokens that expire mid-session.
    pub fn new(authorizer: Arc<dyn Authorizer>) -> Self {
        Self {
            authorizer,
            store: None,
        }
    }

    /// Persist tokens refreshed mid-session to `store`.
    pub fn with_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }
}

impl Connector for DriveConnector {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn connect(&self, tokens: &Tokens) -> Result<Arc<dyn StorageClient>> {
        let mut token_manager = TokenManager::new(self.authorizer.clone(), tokens.clone());
        if let Some(store) = &self.store {
            token_manager = token_manager.with_store(store.clone());
        }

        Ok(Arc::new(DriveStorage::new(Arc::new(token_manager))?))
    }
}
