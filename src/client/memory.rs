use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tracing::debug;

use super::{ListPage, ObjectClient, PutMode};
use crate::error::{StorageError, StorageResult};

const DEFAULT_PAGE_SIZE: usize = 1000;

/// Blob store held in process memory.
///
/// Clones share the same objects, which is how one factory hands the same
/// store to several adapters. Mostly useful for tests and ephemeral
/// libraries.
#[derive(Debug, Clone)]
pub struct InMemoryClient {
    objects: Arc<RwLock<BTreeMap<String, Bytes>>>,
    page_size: usize,
}

impl Default for InMemoryClient {
    fn default() -> Self {
        Self {
            objects: Arc::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl InMemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits listing pages to `page_size` paths. Zero is treated as one.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Every stored path, in order.
    pub fn paths(&self) -> Vec<String> {
        self.objects.read().keys().cloned().collect()
    }

    /// Stores an object bypassing every check, e.g. to plant foreign data.
    pub fn insert_raw(&self, path: impl Into<String>, data: impl Into<Bytes>) {
        self.objects.write().insert(path.into(), data.into());
    }
}

#[async_trait]
impl ObjectClient for InMemoryClient {
    async fn get(&self, path: &str) -> StorageResult<Option<Bytes>> {
        Ok(self.objects.read().get(path).cloned())
    }

    async fn put(&self, path: &str, data: Bytes, mode: PutMode) -> StorageResult<()> {
        let mut objects = self.objects.write();
        if mode == PutMode::CreateOnly && objects.contains_key(path) {
            return Err(StorageError::AlreadyExists {
                path: path.to_string(),
            });
        }
        objects.insert(path.to_string(), data);
        Ok(())
    }

    async fn delete(&self, path: &str) -> StorageResult<()> {
        self.objects.write().remove(path);
        Ok(())
    }

    async fn list_page(
        &self,
        prefix: &str,
        continuation: Option<String>,
    ) -> StorageResult<ListPage> {
        debug!("Listing in-memory objects with prefix: {}", prefix);
        let objects = self.objects.read();
        let start = match continuation {
            Some(token) => Bound::Excluded(token),
            None => Bound::Included(prefix.to_string()),
        };

        let mut page = ListPage::default();
        for path in objects.range((start, Bound::Unbounded)).map(|(path, _)| path) {
            if !path.starts_with(prefix) {
                break;
            }
            if path[prefix.len()..].contains('/') {
                continue;
            }
            if page.paths.len() == self.page_size {
                page.next = page.paths.last().cloned();
                break;
            }
            page.paths.push(path.clone());
        }
        Ok(page)
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        Ok(self.objects.read().contains_key(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_modes() {
        let client = InMemoryClient::new();
        client
            .put("a/b", Bytes::from_static(b"1"), PutMode::CreateOnly)
            .await
            .unwrap();
        let err = client
            .put("a/b", Bytes::from_static(b"2"), PutMode::CreateOnly)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists { .. }));

        client
            .put("a/b", Bytes::from_static(b"3"), PutMode::Overwrite)
            .await
            .unwrap();
        assert_eq!(client.get("a/b").await.unwrap().unwrap(), "3");
        assert!(client.exists("a/b").await.unwrap());

        client.delete("a/b").await.unwrap();
        client.delete("a/b").await.unwrap();
        assert!(client.get("a/b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_listing_pages_and_skips_nested_paths() {
        let client = InMemoryClient::new().with_page_size(2);
        for path in ["p/a", "p/b", "p/c", "p/d/nested", "q/a", "o/a"] {
            client.insert_raw(path, Bytes::new());
        }

        let mut all = Vec::new();
        let mut token = None;
        let mut pages = 0;
        loop {
            let page = client.list_page("p/", token).await.unwrap();
            pages += 1;
            all.extend(page.paths);
            token = page.next;
            if token.is_none() {
                break;
            }
        }
        assert_eq!(all, vec!["p/a", "p/b", "p/c"]);
        assert_eq!(pages, 2);
    }
}
