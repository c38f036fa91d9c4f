//! The contract every physical backend implements.
//!
//! Upper layers only talk to [`Storage`]. Batches use a single error policy
//! on every backend: the first failure aborts the batch and is returned.
//! Items of other groups that already completed stay applied, items not yet
//! started are never attempted. A read visitor only sees results once the
//! whole batch was fetched, so a failed read delivers nothing.

use crate::composite::Composite;
use crate::error::StorageResult;
use crate::key::{KeySegmentPair, KeyType, Segment, VariantKey};
use crate::library::{LibraryPath, OpenMode};

/// Static feature set of a backend, fixed when the instance is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Listing can be narrowed server side by a key prefix.
    pub supports_prefix_matching: bool,
    /// Objects can be deleted directly; no tombstone layer is needed.
    pub fast_delete: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadKeyOpts {
    pub ignore_missing: bool,
}

impl ReadKeyOpts {
    pub fn ignore_missing(mut self, ignore: bool) -> Self {
        self.ignore_missing = ignore;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveOpts {
    pub ignore_missing: bool,
}

impl RemoveOpts {
    pub fn ignore_missing(mut self, ignore: bool) -> Self {
        self.ignore_missing = ignore;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOpts {
    /// Create the key when it does not exist yet.
    pub upsert: bool,
}

impl UpdateOpts {
    pub fn upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }
}

/// Backend independent key/segment store bound to one library.
///
/// Calls block until the whole batch is done. Any parallelism inside a batch
/// is the implementation's business.
pub trait Storage: Send + Sync {
    fn library(&self) -> &LibraryPath;

    fn open_mode(&self) -> OpenMode;

    fn capabilities(&self) -> Capabilities;

    fn supports_prefix_matching(&self) -> bool {
        self.capabilities().supports_prefix_matching
    }

    fn fast_delete(&self) -> bool {
        self.capabilities().fast_delete
    }

    /// Stores every pair. Requires [`OpenMode::Write`].
    ///
    /// Whether an existing object is replaced is part of each backend's
    /// documented contract.
    fn write(&self, kvs: Composite<KeySegmentPair>) -> StorageResult<()>;

    /// Replaces existing objects. Requires [`OpenMode::Write`].
    ///
    /// A missing key fails with `NotFound` unless `opts.upsert` is set.
    fn update(&self, kvs: Composite<KeySegmentPair>, opts: UpdateOpts) -> StorageResult<()>;

    /// Fetches every key and hands it to `visitor`. Requires [`OpenMode::Read`].
    ///
    /// A missing key fails with `NotFound` unless `opts.ignore_missing` is
    /// set, in which case it is skipped.
    fn read(
        &self,
        keys: Composite<VariantKey>,
        visitor: &mut dyn FnMut(VariantKey, Segment),
        opts: ReadKeyOpts,
    ) -> StorageResult<()>;

    /// Deletes every key. Requires [`OpenMode::Delete`].
    fn remove(&self, keys: Composite<VariantKey>, opts: RemoveOpts) -> StorageResult<()>;

    /// Visits every stored key of `key_type` whose symbol starts with
    /// `prefix`. Requires [`OpenMode::Read`].
    ///
    /// When [`Storage::supports_prefix_matching`] is false the prefix is
    /// ignored and the caller filters.
    fn iterate_type(
        &self,
        key_type: KeyType,
        visitor: &mut dyn FnMut(VariantKey),
        prefix: &str,
    ) -> StorageResult<()>;

    /// Existence check. A missing key is `Ok(false)`, never an error.
    fn key_exists(&self, key: &VariantKey) -> StorageResult<bool>;
}

/// Convenience wrappers over the visitor based calls.
pub trait StorageExt: Storage {
    /// Reads a single key.
    fn read_one(&self, key: VariantKey) -> StorageResult<Segment> {
        let mut found = None;
        self.read(
            Composite::single(key),
            &mut |_, segment| found = Some(segment),
            ReadKeyOpts::default(),
        )?;
        // read without ignore_missing either visits or fails
        Ok(found.unwrap_or_default())
    }

    fn list_keys(&self, key_type: KeyType, prefix: &str) -> StorageResult<Vec<VariantKey>> {
        let mut keys = Vec::new();
        self.iterate_type(key_type, &mut |key| keys.push(key), prefix)?;
        Ok(keys)
    }
}

impl<S: Storage + ?Sized> StorageExt for S {}
