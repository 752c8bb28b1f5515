//! Blob store trait definitions.

use crate::auth::AccessToken;
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;

/// Opaque identifier the remote store assigns to a blob on creation.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlobId(String);

impl BlobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobId({})", self.0)
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One directory listing row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobEntry {
    pub id: BlobId,
    pub name: String,
}

/// A dumb, file-oriented remote store.
///
/// The store offers no transactions and no compare-and-swap. `create` with a
/// name that already exists is allowed and yields a second blob;
/// `find_by_name` then returns the oldest one.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Resolve a blob name to its id.
    async fn find_by_name(&self, token: &AccessToken, name: &str)
    -> StorageResult<Option<BlobId>>;

    /// Fetch a blob's content.
    async fn get(&self, token: &AccessToken, id: &BlobId) -> StorageResult<Bytes>;

    /// Create a new blob and return its id.
    async fn create(&self, token: &AccessToken, name: &str, content: Bytes)
    -> StorageResult<BlobId>;

    /// Replace a blob's content.
    async fn update(&self, token: &AccessToken, id: &BlobId, content: Bytes) -> StorageResult<()>;

    /// List every blob visible to the caller.
    async fn list(&self, token: &AccessToken) -> StorageResult<Vec<BlobEntry>>;

    /// Get the name of this storage backend, used in logs.
    fn backend_name(&self) -> &'static str;

    /// Verify backend connectivity.
    ///
    /// The default implementation returns Ok(()), suitable for local backends.
    async fn health_check(&self, _token: &AccessToken) -> StorageResult<()> {
        Ok(())
    }
}

/// JSON helpers on top of [`BlobStore`].
///
/// Automatically implemented for every `BlobStore`, including `dyn BlobStore`.
#[async_trait]
pub trait BlobStoreJsonExt: BlobStore {
    /// Fetch and decode a JSON blob. `name` only labels decode errors.
    async fn get_json<T>(&self, token: &AccessToken, id: &BlobId, name: &str) -> StorageResult<T>
    where
        T: DeserializeOwned + Send,
    {
        let bytes = self.get(token, id).await?;
        serde_json::from_slice(&bytes).map_err(|source| StorageError::Decode {
            name: name.to_string(),
            source,
        })
    }

    /// Encode `value` and create a blob named `name`.
    async fn create_json<T>(
        &self,
        token: &AccessToken,
        name: &str,
        value: &T,
    ) -> StorageResult<BlobId>
    where
        T: Serialize + Sync,
    {
        let bytes = serde_json::to_vec(value).map_err(StorageError::Encode)?;
        self.create(token, name, Bytes::from(bytes)).await
    }

    /// Encode `value` and replace blob `id`.
    async fn update_json<T>(&self, token: &AccessToken, id: &BlobId, value: &T) -> StorageResult<()>
    where
        T: Serialize + Sync,
    {
        let bytes = serde_json::to_vec(value).map_err(StorageError::Encode)?;
        self.update(token, id, Bytes::from(bytes)).await
    }
}

impl<T: BlobStore + ?Sized> BlobStoreJsonExt for T {}

/// Check a blob name is a single safe path component.
pub fn validate_name(name: &str) -> StorageResult<()> {
    if name.is_empty()
        || name.len() > 255
        || name.contains(['/', '\\', '\0'])
        || name == "."
        || name.contains("..")
    {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_must_be_single_components() {
        assert!(validate_name("entries_2024-05-03.json").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("../escape").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("a\\b").is_err());
    }

    #[test]
    fn blob_id_debug_and_display() {
        let id = BlobId::new("abc");
        assert_eq!(id.to_string(), "abc");
        assert_eq!(format!("{id:?}"), "BlobId(abc)");
    }
}
