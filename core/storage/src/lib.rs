//! Storage capabilities for CloudBox.
//!
//! This module provides the trait-based seams the upload workflow talks to
//! (credential store, authorizer, connector, storage client) together with a
//! Google Drive backend and in-memory implementations for tests.
//!
//! # Design Principles
//! - Provider isolation: no Drive-specific logic outside `gdrive`
//! - Async operations: all I/O operations are async
//! - Streaming support: uploads read the local file as a stream
//! - Unified error semantics: every backend reports `cloudbox_common::Error`

pub mod credentials;
pub mod gdrive;
pub mod local;
pub mod memory;
pub mod provider;

pub use credentials::{CredentialStore, Tokens};
pub use local::FileCredentialStore;
pub use memory::{MemoryConnector, MemoryCredentialStore, MemoryStorageClient};
pub use provider::{
    Authorizer, ByteStream, Connector, Content, ListQuery, NewFile, RemoteObject, StorageClient,
};
