//! Interactive consent flow and refresh for Google accounts.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cloudbox_common::{Error, Result};

use crate::credentials::Tokens;
use crate::provider::Authorizer;

use super::auth::{AuthConfig, AuthManager};
use super::loopback::LoopbackReceiver;
use super::secrets::ClientSecrets;

/// Callback receiving the consent URL so the UI can show it.
pub type UrlAnnouncer = Arc<dyn Fn(&str) + Send + Sync>;

/// Options for the browser-based login.
#[derive(Debug, Clone)]
pub struct LoginOptions {
    /// Loopback port for the redirect; `0` picks a free one.
    pub redirect_port: u16,
    /// Launch the system browser on the consent URL.
    pub open_browser: bool,
}

impl Default for LoginOptions {
    fn default() -> Self {
        Self {
            redirect_port: 0,
            open_browser: true,
        }
    }
}

/// [`Authorizer`] for Google accounts.
///
/// The client secrets file is read lazily: only a refresh or a login needs it.
pub struct GoogleAuthorizer {
    secrets_path: PathBuf,
    options: LoginOptions,
    announcer: Option<UrlAnnouncer>,
}

impl GoogleAuthorizer {
    pub fn new(secrets_path: impl AsRef<Path>, options: LoginOptions) -> Self {
        Self {
            secrets_path: secrets_path.as_ref().to_path_buf(),
            options,
            announcer: None,
        }
    }

    /// Show the consent URL through `announcer` before waiting for the callback.
    pub fn with_announcer(mut self, announcer: UrlAnnouncer) -> Self {
        self.announcer = Some(announcer);
        self
    }

    async fn secrets(&self) -> Result<ClientSecrets> {
        ClientSecrets::load(&self.secrets_path).await
    }
}

#[async_trait]
impl Authorizer for GoogleAuthorizer {
    async fn refresh(&self, tokens: &Tokens) -> Result<Tokens> {
        let refresh_token = tokens
            .refresh_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                Error::Authentication("Credential has no refresh token".to_string())
            })?;

        let secrets = self.secrets().await?;
        let manager = AuthManager::new(AuthConfig::from_secrets(&secrets, None))?;

        tracing::info!("Refreshing persisted credential");
        manager.refresh_token(refresh_token).await
    }

    async fn login(&self) -> Result<Tokens> {
        let secrets = self.secrets().await?;
        let receiver = LoopbackReceiver::bind(self.options.redirect_port).await?;
        let manager = AuthManager::new(AuthConfig::from_secrets(
            &secrets,
            Some(receiver.redirect_url()),
        ))?;

        let request = manager.authorization_request();

        tracing::info!("Waiting for browser consent on port {}", receiver.port());

        if let Some(announce) = &self.announcer {
            announce(&request.url);
        }

        if self.options.open_browser {
            if let Err(e) = open::that(&request.url) {
                tracing::warn!("Could not open a browser: {}", e);
            }
        }

        let code = receiver.receive(&request.csrf_state).await?;
        tracing::debug!("Authorization code received");

        manager.exchange_code(&code, request.pkce_verifier).await
    }
}
