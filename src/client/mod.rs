//! Transport clients: the single-object requests the blob adapter is built on.
//!
//! A client knows nothing about keys, libraries or batches. It stores opaque
//! bytes under flat paths and maps its own failures onto [`StorageError`].
//!
//! [`StorageError`]: crate::error::StorageError

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StorageResult;

mod localfs;
mod memory;
mod s3;

pub use localfs::LocalFsClient;
pub use memory::InMemoryClient;
pub use s3::S3Client;

/// What `put` does when the path is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutMode {
    Overwrite,
    /// Fail with `AlreadyExists` instead of replacing the object.
    CreateOnly,
}

/// One page of a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Full paths, in lexicographic order.
    pub paths: Vec<String>,
    /// Token for the next page, `None` on the last one.
    pub next: Option<String>,
}

#[async_trait]
pub trait ObjectClient: Send + Sync {
    /// `Ok(None)` when nothing is stored at `path`.
    async fn get(&self, path: &str) -> StorageResult<Option<Bytes>>;

    /// Object writes are atomic: readers see the old or the new bytes.
    async fn put(&self, path: &str, data: Bytes, mode: PutMode) -> StorageResult<()>;

    /// Idempotent; deleting a missing path succeeds.
    async fn delete(&self, path: &str) -> StorageResult<()>;

    /// Lists objects whose path starts with `prefix` and has no `/` after it.
    async fn list_page(&self, prefix: &str, continuation: Option<String>)
        -> StorageResult<ListPage>;

    async fn exists(&self, path: &str) -> StorageResult<bool>;
}
