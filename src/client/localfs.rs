//! Directory tree acting as a blob container, one file per object.
//!
//! Each `/`-separated segment of an object path becomes one path component.
//! Segments that the filesystem would read as something else (empty, `.`,
//! `..`, hidden names) are stored with a leading `~`, and so are segments
//! that already start with `~`. Listing strips it again.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};

use super::{ListPage, ObjectClient, PutMode};
use crate::error::{StorageError, StorageResult};

const STAGING_DIR: &str = ".staging";
const ESCAPE: char = '~';

// Shared by every client of the process, several may use the same root.
static STAGED: AtomicU64 = AtomicU64::new(0);

pub struct LocalFsClient {
    root: PathBuf,
}

/// A staged write. The file is removed on drop unless it was renamed into
/// place, which also covers a put future dropped midway.
struct StagedFile {
    path: PathBuf,
    placed: bool,
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.placed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

impl LocalFsClient {
    /// Uses `root` as the container, creating it when missing.
    pub fn new<P: AsRef<Path>>(root: P) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join(STAGING_DIR))?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut path = self.root.clone();
        for segment in key.split('/') {
            path.push(file_name(segment));
        }
        path
    }

    fn dir_for(&self, dir: &str) -> PathBuf {
        if dir.is_empty() {
            self.root.clone()
        } else {
            self.path_for(dir)
        }
    }

    async fn stage(&self, data: &[u8]) -> io::Result<StagedFile> {
        let n = STAGED.fetch_add(1, Ordering::Relaxed);
        let staged = StagedFile {
            path: self
                .root
                .join(STAGING_DIR)
                .join(format!("{}-{}", std::process::id(), n)),
            placed: false,
        };
        let mut f = fs::File::create(&staged.path).await?;
        f.write_all(data).await?;
        f.sync_all().await?;
        Ok(staged)
    }
}

fn file_name(segment: &str) -> String {
    if segment.is_empty() || segment.starts_with('.') || segment.starts_with(ESCAPE) {
        format!("{}{}", ESCAPE, segment)
    } else {
        segment.to_string()
    }
}

fn object_name(file_name: &str) -> &str {
    file_name.strip_prefix(ESCAPE).unwrap_or(file_name)
}

fn map_io_error(op: &str, path: &str, err: io::Error) -> StorageError {
    error!("Local {} failed for {}: {}", op, path, err);
    match err.kind() {
        io::ErrorKind::PermissionDenied => {
            StorageError::PermissionDenied(format!("{}: {}", path, err))
        }
        io::ErrorKind::AlreadyExists => StorageError::AlreadyExists {
            path: path.to_string(),
        },
        _ => StorageError::Io(err),
    }
}

#[async_trait]
impl ObjectClient for LocalFsClient {
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        match fs::read(self.path_for(key)).await {
            Ok(buf) => Ok(Some(Bytes::from(buf))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(map_io_error("get", key, e)),
        }
    }

    async fn put(&self, key: &str, data: Bytes, mode: PutMode) -> StorageResult<()> {
        debug!("Writing file object: {}", key);
        let path = self.path_for(key);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| map_io_error("put", key, e))?;
        }

        // Objects appear in one step: staged first, then linked or renamed.
        let mut staged = self
            .stage(&data)
            .await
            .map_err(|e| map_io_error("stage", key, e))?;
        match mode {
            PutMode::Overwrite => {
                fs::rename(&staged.path, &path)
                    .await
                    .map_err(|e| map_io_error("put", key, e))?;
                staged.placed = true;
            }
            PutMode::CreateOnly => fs::hard_link(&staged.path, &path)
                .await
                .map_err(|e| map_io_error("put", key, e))?,
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(map_io_error("delete", key, e)),
        }
    }

    async fn list_page(
        &self,
        prefix: &str,
        _continuation: Option<String>,
    ) -> StorageResult<ListPage> {
        let (dir, name_prefix) = match prefix.rsplit_once('/') {
            Some((dir, name)) => (dir, name),
            None => ("", prefix),
        };

        let mut entries = match fs::read_dir(self.dir_for(dir)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ListPage::default()),
            Err(e) => return Err(map_io_error("list", prefix, e)),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let file = entry.file_name().to_string_lossy().into_owned();
            let name = object_name(&file);
            if !name.starts_with(name_prefix) {
                continue;
            }
            if dir.is_empty() {
                paths.push(name.to_string());
            } else {
                paths.push(format!("{}/{}", dir, name));
            }
        }
        paths.sort();
        Ok(ListPage { paths, next: None })
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.path_for(key);
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(map_io_error("exists", key, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_localfs_roundtrip() {
        let dir = tempdir().unwrap();
        let client = LocalFsClient::new(dir.path()).unwrap();

        client
            .put("lib/tdata/a*1", Bytes::from_static(b"one"), PutMode::CreateOnly)
            .await
            .unwrap();
        assert_eq!(client.get("lib/tdata/a*1").await.unwrap().unwrap(), "one");
        assert!(client.exists("lib/tdata/a*1").await.unwrap());
        assert!(!client.exists("lib/tdata").await.unwrap());
        assert!(client.get("lib/tdata/missing").await.unwrap().is_none());

        let err = client
            .put("lib/tdata/a*1", Bytes::from_static(b"two"), PutMode::CreateOnly)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists { .. }));

        client
            .put("lib/tdata/a*1", Bytes::from_static(b"three"), PutMode::Overwrite)
            .await
            .unwrap();
        assert_eq!(client.get("lib/tdata/a*1").await.unwrap().unwrap(), "three");

        client.delete("lib/tdata/a*1").await.unwrap();
        client.delete("lib/tdata/a*1").await.unwrap();
        assert!(!client.exists("lib/tdata/a*1").await.unwrap());
    }

    #[tokio::test]
    async fn test_localfs_listing() {
        let dir = tempdir().unwrap();
        let client = LocalFsClient::new(dir.path()).unwrap();
        for key in ["lib/vref/b", "lib/vref/a", "lib/vref/ab", "lib/vref/x/nested", "lib/tdata/a"] {
            client
                .put(key, Bytes::new(), PutMode::Overwrite)
                .await
                .unwrap();
        }

        let page = client.list_page("lib/vref/a", None).await.unwrap();
        assert_eq!(page.paths, vec!["lib/vref/a", "lib/vref/ab"]);
        assert!(page.next.is_none());

        let page = client.list_page("lib/vref/", None).await.unwrap();
        assert_eq!(page.paths, vec!["lib/vref/a", "lib/vref/ab", "lib/vref/b"]);

        let page = client.list_page("nothing/here/", None).await.unwrap();
        assert!(page.paths.is_empty());
    }

    #[tokio::test]
    async fn test_localfs_stores_dot_and_empty_names() {
        let dir = tempdir().unwrap();
        let client = LocalFsClient::new(dir.path()).unwrap();
        let names = ["", ".", "..", ".hidden", "~tilde", "plain"];
        for (i, name) in names.iter().enumerate() {
            let key = format!("lib/vref/{}", name);
            client
                .put(&key, Bytes::from(vec![i as u8]), PutMode::Overwrite)
                .await
                .unwrap();
        }
        for (i, name) in names.iter().enumerate() {
            let key = format!("lib/vref/{}", name);
            assert_eq!(client.get(&key).await.unwrap().unwrap(), vec![i as u8]);
            assert!(client.exists(&key).await.unwrap());
        }

        let page = client.list_page("lib/vref/", None).await.unwrap();
        let mut expected: Vec<String> = names.iter().map(|n| format!("lib/vref/{}", n)).collect();
        expected.sort();
        assert_eq!(page.paths, expected);

        let page = client.list_page("lib/vref/.", None).await.unwrap();
        assert_eq!(page.paths, vec!["lib/vref/.", "lib/vref/..", "lib/vref/.hidden"]);

        client.delete("lib/vref/..").await.unwrap();
        assert!(!client.exists("lib/vref/..").await.unwrap());
        assert!(client.exists("lib/vref/.").await.unwrap());
    }

    #[tokio::test]
    async fn test_localfs_leaves_no_staged_files() {
        let dir = tempdir().unwrap();
        let client = LocalFsClient::new(dir.path()).unwrap();
        client
            .put("lib/tdata/a", Bytes::from_static(b"one"), PutMode::CreateOnly)
            .await
            .unwrap();
        client
            .put("lib/vref/a", Bytes::from_static(b"one"), PutMode::Overwrite)
            .await
            .unwrap();
        assert!(client
            .put("lib/tdata/a", Bytes::from_static(b"two"), PutMode::CreateOnly)
            .await
            .is_err());
        // "lib/tdata" is a directory, the rename onto it fails
        assert!(client
            .put("lib/tdata", Bytes::from_static(b"two"), PutMode::Overwrite)
            .await
            .is_err());

        let staged = std::fs::read_dir(dir.path().join(STAGING_DIR)).unwrap().count();
        assert_eq!(staged, 0);
    }
}
