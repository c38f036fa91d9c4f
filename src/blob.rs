//! The blob backend: [`Storage`] on top of a single-object [`ObjectClient`].
//!
//! Every key becomes one object at the path produced by [`encode_path`], and
//! every batch item becomes one request. Groups of a batch run concurrently,
//! items of a group run in order. Each request is bounded by the configured
//! timeout.
//!
//! Write contract: atom keys are write-once (a second write fails with
//! `AlreadyExists`), ref keys are overwritten.

use std::future::Future;
use std::time::Duration;

use futures::stream::{self, StreamExt, TryStreamExt};
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use crate::client::{InMemoryClient, LocalFsClient, ObjectClient, PutMode, S3Client};
use crate::composite::Composite;
use crate::config::{BlobStorageConfig, Transport};
use crate::error::{StorageError, StorageResult};
use crate::key::{KeySegmentPair, KeyType, Segment, VariantKey};
use crate::library::{LibraryPath, OpenMode};
use crate::path::{decode_path, encode_path, root_folder, symbol_prefix};
use crate::storage::{Capabilities, ReadKeyOpts, RemoveOpts, Storage, UpdateOpts};

const MAX_WORKER_THREADS: usize = 4;

pub struct BlobStorage {
    library: LibraryPath,
    mode: OpenMode,
    root_folder: String,
    client: Box<dyn ObjectClient>,
    request_timeout: Duration,
    max_concurrency: usize,
    capabilities: Capabilities,
    runtime: Runtime,
}

impl BlobStorage {
    pub const CAPABILITIES: Capabilities = Capabilities {
        supports_prefix_matching: true,
        fast_delete: true,
    };

    /// Binds `client` to `library`. The client is owned for the lifetime of
    /// the returned instance.
    pub fn with_client(
        library: LibraryPath,
        mode: OpenMode,
        config: &BlobStorageConfig,
        client: Box<dyn ObjectClient>,
    ) -> StorageResult<Self> {
        config.validate()?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.max_concurrency.min(MAX_WORKER_THREADS))
            .thread_name("segstore-io")
            .enable_all()
            .build()?;

        let root_folder = root_folder(&library);
        info!(
            "Opened blob storage for library {} under {}/{} ({} mode)",
            library, config.container_name, root_folder, mode
        );
        Ok(Self {
            library,
            mode,
            root_folder,
            client,
            request_timeout: config.request_timeout(),
            max_concurrency: config.max_concurrency,
            capabilities: Self::CAPABILITIES,
            runtime,
        })
    }

    /// Full object path of `key` inside the container.
    pub fn get_key_path(&self, key: &VariantKey) -> String {
        encode_path(&self.root_folder, key)
    }

    pub fn root_folder(&self) -> &str {
        &self.root_folder
    }

    /// Releases the client and the I/O threads without waiting for them.
    pub fn close(self) {
        info!("Closing blob storage for library {}", self.library);
        self.runtime.shutdown_background();
    }

    fn check_mode(&self, required: OpenMode, op: &str) -> StorageResult<()> {
        if self.mode.allows(required) {
            Ok(())
        } else {
            Err(StorageError::PermissionDenied(format!(
                "{} needs {} mode but library {} is open for {}",
                op, required, self.library, self.mode
            )))
        }
    }

    async fn timed<T, F>(&self, op: &str, path: &str, request: F) -> StorageResult<T>
    where
        F: Future<Output = StorageResult<T>>,
    {
        match tokio::time::timeout(self.request_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Unavailable(format!(
                "{} of {} timed out after {:?}",
                op, path, self.request_timeout
            ))),
        }
    }

    /// Runs `per_group` over every group, at most `max_concurrency` at once.
    /// The first error drops the groups still in flight.
    async fn run_groups<T, R, F, Fut>(&self, batch: Composite<T>, per_group: F) -> StorageResult<Vec<R>>
    where
        F: FnMut(Vec<T>) -> Fut,
        Fut: Future<Output = StorageResult<R>>,
    {
        stream::iter(batch.into_groups().into_iter().map(per_group))
            .buffer_unordered(self.max_concurrency)
            .try_collect()
            .await
    }

    async fn write_group(&self, group: Vec<KeySegmentPair>) -> StorageResult<()> {
        for kv in group {
            let path = self.get_key_path(&kv.key);
            let mode = if kv.key.is_ref() {
                PutMode::Overwrite
            } else {
                PutMode::CreateOnly
            };
            self.timed("write", &path, self.client.put(&path, kv.segment.into_bytes(), mode))
                .await?;
        }
        Ok(())
    }

    async fn update_group(&self, group: Vec<KeySegmentPair>, opts: UpdateOpts) -> StorageResult<()> {
        for kv in group {
            let path = self.get_key_path(&kv.key);
            if !opts.upsert && !self.timed("exists", &path, self.client.exists(&path)).await? {
                return Err(StorageError::NotFound { path });
            }
            self.timed(
                "update",
                &path,
                self.client
                    .put(&path, kv.segment.into_bytes(), PutMode::Overwrite),
            )
            .await?;
        }
        Ok(())
    }

    async fn read_group(
        &self,
        group: Vec<VariantKey>,
        opts: ReadKeyOpts,
    ) -> StorageResult<Vec<(VariantKey, Segment)>> {
        let mut found = Vec::with_capacity(group.len());
        for key in group {
            let path = self.get_key_path(&key);
            match self.timed("read", &path, self.client.get(&path)).await? {
                Some(data) => found.push((key, Segment::from(data))),
                None if opts.ignore_missing => warn!("Skipping missing key {}", path),
                None => return Err(StorageError::NotFound { path }),
            }
        }
        Ok(found)
    }

    async fn remove_group(&self, group: Vec<VariantKey>, opts: RemoveOpts) -> StorageResult<()> {
        for key in group {
            let path = self.get_key_path(&key);
            if !opts.ignore_missing && !self.timed("exists", &path, self.client.exists(&path)).await? {
                return Err(StorageError::NotFound { path });
            }
            self.timed("remove", &path, self.client.delete(&path)).await?;
        }
        Ok(())
    }
}

impl Storage for BlobStorage {
    fn library(&self) -> &LibraryPath {
        &self.library
    }

    fn open_mode(&self) -> OpenMode {
        self.mode
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn write(&self, kvs: Composite<KeySegmentPair>) -> StorageResult<()> {
        self.check_mode(OpenMode::Write, "write")?;
        if kvs.is_empty() {
            return Ok(());
        }
        debug!("Writing {} keys in {} groups", kvs.len(), kvs.group_count());
        self.runtime
            .block_on(self.run_groups(kvs, |group| self.write_group(group)))?;
        Ok(())
    }

    fn update(&self, kvs: Composite<KeySegmentPair>, opts: UpdateOpts) -> StorageResult<()> {
        self.check_mode(OpenMode::Write, "update")?;
        if kvs.is_empty() {
            return Ok(());
        }
        debug!("Updating {} keys (upsert: {})", kvs.len(), opts.upsert);
        self.runtime
            .block_on(self.run_groups(kvs, |group| self.update_group(group, opts)))?;
        Ok(())
    }

    fn read(
        &self,
        keys: Composite<VariantKey>,
        visitor: &mut dyn FnMut(VariantKey, Segment),
        opts: ReadKeyOpts,
    ) -> StorageResult<()> {
        self.check_mode(OpenMode::Read, "read")?;
        if keys.is_empty() {
            return Ok(());
        }
        debug!("Reading {} keys in {} groups", keys.len(), keys.group_count());
        let groups = self
            .runtime
            .block_on(self.run_groups(keys, |group| self.read_group(group, opts)))?;
        for (key, segment) in groups.into_iter().flatten() {
            visitor(key, segment);
        }
        Ok(())
    }

    fn remove(&self, keys: Composite<VariantKey>, opts: RemoveOpts) -> StorageResult<()> {
        self.check_mode(OpenMode::Delete, "remove")?;
        if keys.is_empty() {
            return Ok(());
        }
        debug!("Removing {} keys", keys.len());
        self.runtime
            .block_on(self.run_groups(keys, |group| self.remove_group(group, opts)))?;
        Ok(())
    }

    fn iterate_type(
        &self,
        key_type: KeyType,
        visitor: &mut dyn FnMut(VariantKey),
        prefix: &str,
    ) -> StorageResult<()> {
        self.check_mode(OpenMode::Read, "iterate_type")?;
        let list_prefix = symbol_prefix(&self.root_folder, key_type, prefix);
        debug!("Iterating {} keys under {}", key_type, list_prefix);

        self.runtime.block_on(async {
            let mut continuation = None;
            loop {
                let page = self
                    .timed(
                        "list",
                        &list_prefix,
                        self.client.list_page(&list_prefix, continuation.take()),
                    )
                    .await?;
                for path in &page.paths {
                    visitor(decode_path(&self.root_folder, path)?);
                }
                match page.next {
                    Some(token) => continuation = Some(token),
                    None => break,
                }
            }
            Ok::<(), StorageError>(())
        })
    }

    fn key_exists(&self, key: &VariantKey) -> StorageResult<bool> {
        self.check_mode(OpenMode::Read, "key_exists")?;
        let path = self.get_key_path(key);
        self.runtime
            .block_on(self.timed("exists", &path, self.client.exists(&path)))
    }
}

/// Produces [`BlobStorage`] instances from one validated configuration.
#[derive(Debug)]
pub struct BlobStorageFactory {
    config: BlobStorageConfig,
    memory: Option<InMemoryClient>,
}

impl BlobStorageFactory {
    pub fn new(config: BlobStorageConfig) -> StorageResult<Self> {
        config.validate()?;
        let memory = (config.transport == Transport::InMemory).then(InMemoryClient::new);
        Ok(Self { config, memory })
    }

    pub fn config(&self) -> &BlobStorageConfig {
        &self.config
    }

    /// The store behind the in-memory transport, if that is the one configured.
    pub fn memory_client(&self) -> Option<&InMemoryClient> {
        self.memory.as_ref()
    }

    /// Builds an independent adapter for `library`. Only client construction
    /// happens here; nothing is sent to the backend.
    pub fn create(&self, library: &LibraryPath, mode: OpenMode) -> StorageResult<BlobStorage> {
        let client: Box<dyn ObjectClient> = match &self.config.transport {
            Transport::S3 => Box::new(S3Client::new(&self.config)?),
            Transport::Local { root } => {
                Box::new(LocalFsClient::new(root.join(&self.config.container_name))?)
            }
            Transport::InMemory => Box::new(self.memory.clone().unwrap_or_default()),
        };
        BlobStorage::with_client(library.clone(), mode, &self.config, client)
    }
}
