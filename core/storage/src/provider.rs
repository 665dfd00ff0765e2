//! Capability traits the upload workflow consumes.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use cloudbox_common::{Error, FolderId, ObjectId, Result};

use crate::credentials::Tokens;

/// Byte stream type for upload operations.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// Metadata for an object about to be created.
///
/// Serializes to the shape storage APIs expect: `{"name": ..., "parents": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewFile {
    pub name: String,
    pub parents: Vec<FolderId>,
}

impl NewFile {
    /// Metadata placing `name` directly inside `folder`.
    pub fn in_folder(name: impl Into<String>, folder: &FolderId) -> Self {
        Self {
            name: name.into(),
            parents: vec![folder.clone()],
        }
    }
}

/// Filter for listing remote objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    /// Only objects whose parent is this folder.
    pub parent: FolderId,
    /// Include objects sitting in the trash.
    pub include_trashed: bool,
}

impl ListQuery {
    pub fn in_parent(parent: &FolderId) -> Self {
        Self {
            parent: parent.clone(),
            include_trashed: false,
        }
    }
}

/// A remote object as reported by a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    pub id: ObjectId,
    pub name: String,
}

/// Full contents of a file to upload, as a stream plus its length.
pub struct Content {
    pub stream: ByteStream,
    pub size: u64,
}

impl Content {
    /// Open a local file for streaming.
    ///
    /// # Errors
    /// - File cannot be opened or its metadata read
    pub async fn from_file(path: &Path) -> Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();

        let stream = ReaderStream::new(file)
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(Error::from));

        Ok(Self {
            stream: Box::pin(stream),
            size,
        })
    }

    /// In-memory content.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        Self {
            stream: Box::pin(futures::stream::once(async move { Ok(data) })),
            size,
        }
    }

    /// Drain the stream into a single buffer.
    pub async fn collect(mut self) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(self.size as usize);
        while let Some(chunk) = self.stream.next().await {
            data.extend_from_slice(&chunk?);
        }
        Ok(data)
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Content").field("size", &self.size).finish()
    }
}

/// Authenticated handle onto a cloud storage account.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Human readable provider name (e.g., "Google Drive").
    fn name(&self) -> &str;

    /// Create a new object with the given metadata and contents.
    ///
    /// # Postconditions
    /// - Returns the identifier the provider assigned to the new object
    ///
    /// # Errors
    /// - Network/API errors
    /// - Authentication errors
    /// - Reading `content` failed
    async fn create_file(&self, metadata: &NewFile, content: Content) -> Result<ObjectId>;

    /// List objects matching the query.
    async fn list_files(&self, query: &ListQuery) -> Result<Vec<RemoteObject>>;
}

/// Builds a storage client bound to a credential.
pub trait Connector: Send + Sync {
    /// Human readable provider name, available before authentication.
    fn name(&self) -> &str;

    /// Construct a client that authorizes its requests with `tokens`.
    fn connect(&self, tokens: &Tokens) -> Result<Arc<dyn StorageClient>>;
}

/// Source of fresh credentials.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Renew an expired bundle using its refresh token.
    ///
    /// # Errors
    /// - Bundle has no refresh token
    /// - Refresh token was revoked or the provider rejected it
    async fn refresh(&self, tokens: &Tokens) -> Result<Tokens>;

    /// Run the interactive consent flow.
    ///
    /// Blocks until the user completes (or rejects) the flow in the browser.
    async fn login(&self) -> Result<Tokens>;
}
