//! OAuth client secrets as downloaded from the Google Cloud console.

use serde::Deserialize;
use std::fmt;
use std::path::Path;
use zeroize::{Zeroize, ZeroizeOnDrop};

use cloudbox_common::{Error, Result};

use super::auth::{GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL};

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URL.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

/// Client identifier and secret of the registered OAuth application.
#[derive(Clone, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

/// Top-level layout of `credentials.json`: one section per application type.
#[derive(Deserialize)]
struct SecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    /// Parse the JSON document Google issues for an OAuth client.
    ///
    /// Desktop ("installed") clients are preferred over web clients when a
    /// document carries both.
    ///
    /// # Errors
    /// - Malformed JSON
    /// - Neither an `installed` nor a `web` section present
    /// - Empty client ID
    pub fn from_json(json: &str) -> Result<Self> {
        let file: SecretsFile = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Invalid client secrets: {}", e)))?;

        let secrets = file.installed.or(file.web).ok_or_else(|| {
            Error::Config(
                "Client secrets must contain an 'installed' or 'web' section".to_string(),
            )
        })?;

        if secrets.client_id.is_empty() {
            return Err(Error::Config("Client secrets have an empty client_id".to_string()));
        }

        Ok(secrets)
    }

    /// Read and parse a client secrets file.
    pub async fn load(path: &Path) -> Result<Self> {
        let json = match tokio::fs::read_to_string(path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::Config(format!(
                    "Client secrets file not found at {}. Download the OAuth client JSON from the Google Cloud console.",
                    path.display()
                )));
            }
            Err(e) => return Err(Error::Io(e)),
        };

        Self::from_json(&json)
    }
}

impl fmt::Debug for ClientSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSecrets")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("auth_uri", &self.auth_uri)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}
