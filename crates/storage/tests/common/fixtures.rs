use std::sync::Arc;
use tempfile::TempDir;
use vocasync_storage::{AccessToken, BlobStore, FilesystemBackend, MemoryBackend};

/// A backend under test plus whatever keeps it alive.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestBackend {
    pub store: Arc<dyn BlobStore>,
    _temp_dir: Option<TempDir>,
}

/// One instance of every backend, so contract tests run against each.
#[allow(dead_code)]
pub async fn all_backends() -> Vec<TestBackend> {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let fs = FilesystemBackend::new(temp_dir.path()).await.unwrap();
    vec![
        TestBackend {
            store: Arc::new(fs),
            _temp_dir: Some(temp_dir),
        },
        TestBackend {
            store: Arc::new(MemoryBackend::new()),
            _temp_dir: None,
        },
    ]
}

#[allow(dead_code)]
pub fn token() -> AccessToken {
    AccessToken::new("test-token")
}
