//! Local directory standing in for the remote blob store.
//!
//! Layout under the root:
//! - `blobs/<id>.json` holds the content
//! - `blobs/<id>.name` holds the blob's name
//! - `names/<name>` holds the id of the oldest blob with that name

use crate::auth::AccessToken;
use crate::error::{StorageError, StorageResult};
use crate::traits::{BlobEntry, BlobId, BlobStore, validate_name};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Directory-backed blob store.
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend, creating the directory layout.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("blobs")).await?;
        fs::create_dir_all(root.join("names")).await?;
        Ok(Self { root })
    }

    fn content_path(&self, id: &BlobId) -> StorageResult<PathBuf> {
        validate_id(id)?;
        Ok(self.root.join("blobs").join(format!("{}.json", id.as_str())))
    }

    fn name_path(&self, id: &BlobId) -> StorageResult<PathBuf> {
        validate_id(id)?;
        Ok(self.root.join("blobs").join(format!("{}.name", id.as_str())))
    }

    fn index_path(&self, name: &str) -> StorageResult<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join("names").join(name))
    }
}

/// Ids are generated here as hyphenated UUIDs; anything else could escape the root.
fn validate_id(id: &BlobId) -> StorageResult<()> {
    let s = id.as_str();
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_hexdigit() || c == '-') {
        return Err(StorageError::InvalidId(s.to_string()));
    }
    Ok(())
}

/// Write `data` next to `path` under a unique temp name and fsync it.
async fn write_temp(path: &Path, data: &[u8]) -> StorageResult<PathBuf> {
    let temp_name = format!(".tmp.{}", Uuid::new_v4());
    let temp_path = path.with_file_name(
        path.file_name()
            .map(|n| format!("{}{}", n.to_string_lossy(), temp_name))
            .unwrap_or_else(|| temp_name.clone()),
    );
    let mut file = fs::File::create(&temp_path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    Ok(temp_path)
}

/// Write to a temp file, fsync, then rename.
async fn write_atomic(path: &Path, data: &[u8]) -> StorageResult<()> {
    let temp_path = write_temp(path, data).await?;
    fs::rename(&temp_path, path).await?;
    Ok(())
}

/// Publish `data` at `path` only if nothing is there yet.
///
/// The content is complete before the link appears, so readers never see a
/// partial file. Returns `false` when `path` already existed.
async fn write_exclusive(path: &Path, data: &[u8]) -> StorageResult<bool> {
    let temp_path = write_temp(path, data).await?;
    let linked = fs::hard_link(&temp_path, path).await;
    fs::remove_file(&temp_path).await?;
    match linked {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(StorageError::Io(e)),
    }
}

fn not_found(e: std::io::Error, what: &str) -> StorageError {
    if e.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound(what.to_string())
    } else {
        StorageError::Io(e)
    }
}

#[async_trait]
impl BlobStore for FilesystemBackend {
    #[instrument(skip(self, _token), fields(backend = "filesystem"))]
    async fn find_by_name(
        &self,
        _token: &AccessToken,
        name: &str,
    ) -> StorageResult<Option<BlobId>> {
        let path = self.index_path(name)?;
        match fs::read_to_string(&path).await {
            Ok(id) => Ok(Some(BlobId::new(id.trim()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    #[instrument(skip(self, _token), fields(backend = "filesystem"))]
    async fn get(&self, _token: &AccessToken, id: &BlobId) -> StorageResult<Bytes> {
        let path = self.content_path(id)?;
        let data = fs::read(&path).await.map_err(|e| not_found(e, id.as_str()))?;
        Ok(Bytes::from(data))
    }

    #[instrument(skip(self, _token, content), fields(backend = "filesystem", size = content.len()))]
    async fn create(
        &self,
        _token: &AccessToken,
        name: &str,
        content: Bytes,
    ) -> StorageResult<BlobId> {
        let index = self.index_path(name)?;
        let id = BlobId::new(Uuid::new_v4().to_string());

        write_atomic(&self.content_path(&id)?, &content).await?;
        write_atomic(&self.name_path(&id)?, name.as_bytes()).await?;

        // The index keeps the first blob created under a name.
        if !write_exclusive(&index, id.as_str().as_bytes()).await? {
            tracing::debug!(name, id = %id, "blob name already indexed, keeping oldest");
        }

        Ok(id)
    }

    #[instrument(skip(self, _token, content), fields(backend = "filesystem", size = content.len()))]
    async fn update(&self, _token: &AccessToken, id: &BlobId, content: Bytes) -> StorageResult<()> {
        let path = self.content_path(id)?;
        if !fs::try_exists(&path).await? {
            return Err(StorageError::NotFound(id.to_string()));
        }
        write_atomic(&path, &content).await
    }

    #[instrument(skip(self, _token), fields(backend = "filesystem"))]
    async fn list(&self, _token: &AccessToken) -> StorageResult<Vec<BlobEntry>> {
        let mut results = Vec::new();
        let mut entries = fs::read_dir(self.root.join("blobs")).await?;
        while let Some(entry) = entries.next_entry().await? {
            // Ignore symlinks and directories
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("name") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let name = fs::read_to_string(&path).await?;
            results.push(BlobEntry {
                id: BlobId::new(stem),
                name,
            });
        }
        results.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(results)
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    async fn health_check(&self, _token: &AccessToken) -> StorageResult<()> {
        let meta = fs::metadata(&self.root).await?;
        if !meta.is_dir() {
            return Err(StorageError::Config(format!(
                "remote root is not a directory: {}",
                self.root.display()
            )));
        }
        Ok(())
    }
}
