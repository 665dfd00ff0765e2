//! Credential bundle and the persisted credential store abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use cloudbox_common::Result;

/// Access tokens are treated as expired this long before their real expiry.
const EXPIRY_SKEW_MINUTES: i64 = 5;

/// OAuth2 tokens with expiration tracking.
///
/// Token strings are wiped from memory when the bundle is dropped.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Tokens {
    /// Access token for API requests.
    pub access_token: String,
    /// Refresh token for obtaining new access tokens, when the provider issued one.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// When the access token expires.
    #[zeroize(skip)]
    pub expires_at: DateTime<Utc>,
}

impl Tokens {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at,
        }
    }

    /// Check if the access token is expired or about to expire.
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now() + Duration::minutes(EXPIRY_SKEW_MINUTES)
    }

    /// A bundle is usable as is when its access token is still valid.
    pub fn is_valid(&self) -> bool {
        !self.access_token.is_empty() && !self.is_expired()
    }

    /// Whether an expired bundle can be renewed without user interaction.
    pub fn can_refresh(&self) -> bool {
        self.refresh_token
            .as_deref()
            .is_some_and(|token| !token.is_empty())
    }
}

impl fmt::Debug for Tokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tokens")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Persistent home of the credential bundle between sessions.
///
/// Implementations perform no locking; a store is owned by one process.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load the persisted bundle.
    ///
    /// # Returns
    /// - `Ok(None)` when nothing has been persisted yet
    ///
    /// # Errors
    /// - The persisted data exists but cannot be read or decoded
    async fn load(&self) -> Result<Option<Tokens>>;

    /// Persist a bundle, replacing whatever was stored before.
    async fn save(&self, tokens: &Tokens) -> Result<()>;
}
