//! # segstore
//!
//! Backend-agnostic storage of immutable, content-addressed key/value
//! segments.
//!
//! Upper layers program against the [`Storage`] trait. Keys ([`VariantKey`])
//! are projected onto a flat blob namespace rooted at the library path, and
//! batches ([`Composite`]) are split into one request per key by the
//! backend.
//!
//! ## Backends
//!
//! - [`BlobStorage`] - blob adapter over an [`ObjectClient`]: S3-compatible
//!   object storage, a local directory, or process memory
//!
//! ## Example
//!
//! ```rust
//! use segstore::{
//!     BlobStorageConfig, BlobStorageFactory, Composite, KeySegmentPair, KeyType, LibraryPath,
//!     OpenMode, RefKey, Segment, StorageExt, Storage, Transport,
//! };
//!
//! let config = BlobStorageConfig::new("segments").with_transport(Transport::InMemory);
//! let factory = BlobStorageFactory::new(config).unwrap();
//! let lib = LibraryPath::from_delim_path("research.daily", '.').unwrap();
//! let store = factory.create(&lib, OpenMode::Write).unwrap();
//!
//! let key = RefKey::new(KeyType::VersionRef, "AAPL");
//! store
//!     .write(Composite::single(KeySegmentPair::new(key.clone(), Segment::from(b"v1".to_vec()))))
//!     .unwrap();
//! assert_eq!(store.read_one(key.into()).unwrap().as_bytes(), b"v1");
//! ```

pub mod blob;
pub mod client;
pub mod composite;
pub mod config;
pub mod error;
pub mod key;
pub mod library;
pub mod path;
pub mod storage;

pub use blob::{BlobStorage, BlobStorageFactory};
pub use client::{InMemoryClient, LocalFsClient, ObjectClient, PutMode, S3Client};
pub use composite::Composite;
pub use config::{pack_config, pack_config_with_endpoint, BlobStorageConfig, Transport, VariantStorage};
pub use error::{ErrorKind, StorageError, StorageResult};
pub use key::{AtomKey, IndexValue, KeySegmentPair, KeyType, RefKey, Segment, VariantKey};
pub use library::{LibraryPath, OpenMode};
pub use storage::{Capabilities, ReadKeyOpts, RemoveOpts, Storage, StorageExt, UpdateOpts};
