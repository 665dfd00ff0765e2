//! OAuth2 authentication and token management for Google Drive.

use chrono::{Duration, Utc};
use oauth2::basic::{BasicClient, BasicTokenResponse};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, RefreshToken, Scope, TokenResponse,
    TokenUrl,
};
use std::fmt;
use std::sync::Arc;

use cloudbox_common::{Error, Result};

use crate::credentials::{CredentialStore, Tokens};
use crate::provider::Authorizer;

use super::secrets::ClientSecrets;

/// OAuth2 authorization endpoint.
pub(crate) const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
/// OAuth2 token endpoint.
pub(crate) const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Google Drive OAuth2 scope: access limited to files created by this app.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;

type GoogleOAuthClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Configuration for OAuth2 authentication.
#[derive(Clone)]
pub struct AuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    /// Redirect URL for the consent flow. Not needed for refreshing.
    pub redirect_url: Option<String>,
}

impl AuthConfig {
    /// Build a configuration from downloaded client secrets.
    pub fn from_secrets(secrets: &ClientSecrets, redirect_url: Option<String>) -> Self {
        Self {
            client_id: secrets.client_id.clone(),
            client_secret: secrets.client_secret.clone(),
            auth_url: secrets.auth_uri.clone(),
            token_url: secrets.token_uri.clone(),
            redirect_url,
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("redirect_url", &self.redirect_url)
            .finish()
    }
}

/// A consent URL together with the values needed to complete it.
pub struct AuthorizationRequest {
    /// URL the user must visit.
    pub url: String,
    /// CSRF state that the callback must echo back.
    pub csrf_state: String,
    /// PKCE verifier to present during the code exchange.
    pub pkce_verifier: PkceCodeVerifier,
}

/// OAuth2 authentication manager for Google Drive.
pub struct AuthManager {
    client: GoogleOAuthClient,
    http: oauth2::reqwest::Client,
}

impl AuthManager {
    /// Create a new authentication manager.
    ///
    /// # Errors
    /// - Invalid endpoint or redirect URL
    /// - HTTP client construction failed
    pub fn new(config: AuthConfig) -> Result<Self> {
        let mut client = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_client_secret(ClientSecret::new(config.client_secret.clone()))
            .set_auth_uri(
                AuthUrl::new(config.auth_url.clone())
                    .map_err(|e| Error::InvalidInput(format!("Invalid auth URL: {}", e)))?,
            )
            .set_token_uri(
                TokenUrl::new(config.token_url.clone())
                    .map_err(|e| Error::InvalidInput(format!("Invalid token URL: {}", e)))?,
            );

        if let Some(redirect_url) = &config.redirect_url {
            client = client.set_redirect_uri(
                RedirectUrl::new(redirect_url.clone())
                    .map_err(|e| Error::InvalidInput(format!("Invalid redirect URL: {}", e)))?,
            );
        }

        // Token endpoint redirects are never followed.
        let http = oauth2::reqwest::ClientBuilder::new()
            .redirect(oauth2::reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, http })
    }

    /// Generate the authorization URL for the user to visit.
    ///
    /// Requests offline access so the response carries a refresh token.
    pub fn authorization_request(&self) -> AuthorizationRequest {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let (auth_url, csrf_token) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new(DRIVE_SCOPE.to_string()))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .set_pkce_challenge(pkce_challenge)
            .url();

        AuthorizationRequest {
            url: auth_url.to_string(),
            csrf_state: csrf_token.secret().clone(),
            pkce_verifier,
        }
    }

    /// Exchange an authorization code for tokens.
    ///
    /// # Preconditions
    /// - `code` comes from the callback of a request built by this manager
    ///
    /// # Errors
    /// - Invalid authorization code
    /// - Network errors
    pub async fn exchange_code(&self, code: &str, pkce_verifier: PkceCodeVerifier) -> Result<Tokens> {
        let token_result = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(pkce_verifier)
            .request_async(&self.http)
            .await
            .map_err(|e| Error::Authentication(format!("Token exchange failed: {}", e)))?;

        let tokens = tokens_from_response(&token_result, None);
        if tokens.refresh_token.is_none() {
            tracing::warn!("Token response carried no refresh token; re-consent will be needed on expiry");
        }

        Ok(tokens)
    }

    /// Refresh an access token using the refresh token.
    ///
    /// # Errors
    /// - Invalid or revoked refresh token
    /// - Network errors
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<Tokens> {
        let token_result = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| Error::Authentication(format!("Token refresh failed: {}", e)))?;

        // Refresh tokens may or may not be returned in refresh response
        Ok(tokens_from_response(&token_result, Some(refresh_token)))
    }
}

fn tokens_from_response(response: &BasicTokenResponse, previous_refresh: Option<&str>) -> Tokens {
    let access_token = response.access_token().secret().clone();

    let refresh_token = response
        .refresh_token()
        .map(|t| t.secret().clone())
        .or_else(|| previous_refresh.map(str::to_string));

    let expires_in = response
        .expires_in()
        .unwrap_or_else(|| std::time::Duration::from_secs(DEFAULT_TOKEN_LIFETIME_SECS));

    let expires_at =
        Utc::now() + Duration::from_std(expires_in).unwrap_or_else(|_| Duration::hours(1));

    Tokens::new(access_token, refresh_token, expires_at)
}

/// Token manager that automatically refreshes expired tokens.
///
/// Refreshed bundles are written back to the credential store, when one is
/// attached, so the next session starts from the newest credential.
pub struct TokenManager {
    authorizer: Arc<dyn Authorizer>,
    store: Option<Arc<dyn CredentialStore>>,
    tokens: tokio::sync::RwLock<Tokens>,
}

impl TokenManager {
    /// Create a new token manager with initial tokens.
    pub fn new(authorizer: Arc<dyn Authorizer>, tokens: Tokens) -> Self {
        Self {
            authorizer,
            store: None,
            tokens: tokio::sync::RwLock::new(tokens),
        }
    }

    /// Persist refreshed tokens to `store`.
    pub fn with_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Get a valid access token, refreshing if necessary.
    ///
    /// # Errors
    /// - Token expired and carries no refresh token
    /// - Token refresh failed
    pub async fn get_access_token(&self) -> Result<String> {
        let tokens = self.tokens.read().await;

        if !tokens.is_expired() {
            return Ok(tokens.access_token.clone());
        }

        drop(tokens);

        // Need to refresh
        let mut tokens = self.tokens.write().await;

        // Double-check after acquiring write lock
        if !tokens.is_expired() {
            return Ok(tokens.access_token.clone());
        }

        if !tokens.can_refresh() {
            return Err(Error::Authentication(
                "Access token expired and no refresh token is available".to_string(),
            ));
        }

        tracing::info!("Refreshing expired access token");

        let new_tokens = self.authorizer.refresh(&tokens).await?;

        if let Some(store) = &self.store {
            if let Err(e) = store.save(&new_tokens).await {
                tracing::warn!("Failed to persist refreshed credential: {}", e);
            }
        }

        *tokens = new_tokens;

        Ok(tokens.access_token.clone())
    }
}
