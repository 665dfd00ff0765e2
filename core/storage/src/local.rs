//! Credential store backed by a JSON file on the local filesystem.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

use cloudbox_common::{Error, Result};

use crate::credentials::{CredentialStore, Tokens};

/// Credential store persisting the token bundle as JSON.
///
/// The file is read at the start of authentication and overwritten whenever
/// the bundle changes.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Create a store rooted at `path`. Nothing is touched until first use.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Location of the persisted bundle.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Option<Tokens>> {
        let data = match fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No persisted credential at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(Error::Io(e)),
        };

        let tokens: Tokens = serde_json::from_slice(&data).map_err(|e| {
            Error::Serialization(format!(
                "Corrupt credential file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        tracing::debug!("Loaded persisted credential from {}", self.path.display());
        Ok(Some(tokens))
    }

    async fn save(&self, tokens: &Tokens) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let data = serde_json::to_vec_pretty(tokens)?;
        fs::write(&self.path, data).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600)).await?;
        }

        tracing::debug!("Persisted credential to {}", self.path.display());
        Ok(())
    }
}
