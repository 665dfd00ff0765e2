//! Identifier types used throughout CloudBox.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of the remote folder every upload targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FolderId(String);

impl FolderId {
    /// Create a new FolderId from a string.
    ///
    /// # Preconditions
    /// - `id` must be non-empty after trimming
    ///
    /// # Errors
    /// - Returns error if id is empty
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(crate::Error::InvalidInput(
                "Folder ID cannot be empty".to_string(),
            ));
        }
        if trimmed.contains('\'') {
            return Err(crate::Error::InvalidInput(
                "Folder ID cannot contain quotes".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for FolderId {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::new(value)
    }
}

impl From<FolderId> for String {
    fn from(id: FolderId) -> Self {
        id.0
    }
}

impl fmt::Display for FolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier the storage provider assigned to a created object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_folder_id_creation() {
        let id = FolderId::new("1swELAYudL3yHLppgK2lu9BYwSn4HGRnv").unwrap();
        assert_eq!(id.as_str(), "1swELAYudL3yHLppgK2lu9BYwSn4HGRnv");
    }

    #[test]
    fn test_folder_id_trims_whitespace() {
        let id = FolderId::new("  abc \n").unwrap();
        assert_eq!(id.as_str(), "abc");
    }

    #[test]
    fn test_folder_id_empty_fails() {
        assert!(FolderId::new("").is_err());
        assert!(FolderId::new("   ").is_err());
    }

    #[test]
    fn test_folder_id_quote_fails() {
        assert!(FolderId::new("abc' or '1").is_err());
    }

    #[test]
    fn test_folder_id_deserialize_validates() {
        let ok: FolderId = serde_json::from_str("\"folder\"").unwrap();
        assert_eq!(ok.as_str(), "folder");
        assert!(serde_json::from_str::<FolderId>("\"\"").is_err());
    }

    #[test]
    fn test_object_id_display() {
        assert_eq!(ObjectId::new("abc123").to_string(), "abc123");
    }

    proptest! {
        #[test]
        fn prop_folder_id_never_empty(s in "\\PC*") {
            if let Ok(id) = FolderId::new(s) {
                prop_assert!(!id.as_str().is_empty());
                prop_assert_eq!(id.as_str(), id.as_str().trim());
            }
        }
    }
}
