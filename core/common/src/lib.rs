//! Common utilities and types shared across CloudBox crates.
//!
//! This module provides the error type and the small identifier types that
//! travel between the storage backend and the upload workflow.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{FolderId, ObjectId};
