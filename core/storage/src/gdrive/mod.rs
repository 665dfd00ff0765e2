//! Google Drive storage backend for CloudBox.
//!
//! This module provides:
//! - OAuth2 authentication with PKCE and automatic token refresh
//! - A loopback receiver for the browser-based consent flow
//! - Resumable uploads and folder listing through the Drive v3 API

pub mod auth;
pub mod client;
pub mod login;
pub mod loopback;
pub mod provider;
pub mod secrets;

pub use auth::{AuthConfig, AuthManager, AuthorizationRequest, TokenManager};
pub use client::{DriveClient, DriveFile};
pub use login::{GoogleAuthorizer, LoginOptions, UrlAnnouncer};
pub use loopback::LoopbackReceiver;
pub use provider::{DriveConnector, DriveStorage};
pub use secrets::ClientSecrets;
