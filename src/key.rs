//! Key model: typed, versioned identifiers and the payloads stored under them.

use std::fmt;

use bytes::Bytes;

/// Logical namespace a key lives in.
///
/// The folder code is part of the persisted blob path and must never change
/// for an existing variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyType {
    TableData,
    TableIndex,
    Version,
    VersionJournal,
    VersionRef,
    Snapshot,
    SnapshotRef,
    SymbolList,
    MultiKey,
    Log,
    LogCompacted,
    LibraryConfig,
}

impl KeyType {
    pub const ALL: [KeyType; 12] = [
        KeyType::TableData,
        KeyType::TableIndex,
        KeyType::Version,
        KeyType::VersionJournal,
        KeyType::VersionRef,
        KeyType::Snapshot,
        KeyType::SnapshotRef,
        KeyType::SymbolList,
        KeyType::MultiKey,
        KeyType::Log,
        KeyType::LogCompacted,
        KeyType::LibraryConfig,
    ];

    /// Sub-prefix this key type is stored under.
    pub fn folder(self) -> &'static str {
        match self {
            KeyType::TableData => "tdata",
            KeyType::TableIndex => "tindex",
            KeyType::Version => "ver",
            KeyType::VersionJournal => "vj",
            KeyType::VersionRef => "vref",
            KeyType::Snapshot => "snap",
            KeyType::SnapshotRef => "sref",
            KeyType::SymbolList => "sl",
            KeyType::MultiKey => "mref",
            KeyType::Log => "log",
            KeyType::LogCompacted => "logc",
            KeyType::LibraryConfig => "cref",
        }
    }

    pub fn from_folder(folder: &str) -> Option<KeyType> {
        KeyType::ALL.into_iter().find(|kt| kt.folder() == folder)
    }

    /// Whether keys of this type are normally pointer-style ref keys.
    pub fn is_ref_type(self) -> bool {
        matches!(
            self,
            KeyType::VersionRef | KeyType::SnapshotRef | KeyType::LibraryConfig
        )
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.folder())
    }
}

/// Start/end marker of the range an atom key covers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexValue {
    Timestamp(i64),
    String(String),
}

impl From<i64> for IndexValue {
    fn from(value: i64) -> Self {
        IndexValue::Timestamp(value)
    }
}

impl From<&str> for IndexValue {
    fn from(value: &str) -> Self {
        IndexValue::String(value.to_string())
    }
}

/// Content and version addressed key. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AtomKey {
    key_type: KeyType,
    symbol: String,
    version_id: u64,
    creation_ts: i64,
    content_hash: u64,
    start_index: IndexValue,
    end_index: IndexValue,
}

impl AtomKey {
    pub fn builder() -> AtomKeyBuilder {
        AtomKeyBuilder::default()
    }

    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn version_id(&self) -> u64 {
        self.version_id
    }

    pub fn creation_ts(&self) -> i64 {
        self.creation_ts
    }

    pub fn content_hash(&self) -> u64 {
        self.content_hash
    }

    pub fn start_index(&self) -> &IndexValue {
        &self.start_index
    }

    pub fn end_index(&self) -> &IndexValue {
        &self.end_index
    }
}

#[derive(Debug, Clone)]
pub struct AtomKeyBuilder {
    version_id: u64,
    creation_ts: i64,
    content_hash: u64,
    start_index: IndexValue,
    end_index: IndexValue,
}

impl Default for AtomKeyBuilder {
    fn default() -> Self {
        Self {
            version_id: 0,
            creation_ts: 0,
            content_hash: 0,
            start_index: IndexValue::Timestamp(0),
            end_index: IndexValue::Timestamp(0),
        }
    }
}

impl AtomKeyBuilder {
    pub fn version_id(mut self, version_id: u64) -> Self {
        self.version_id = version_id;
        self
    }

    pub fn creation_ts(mut self, creation_ts: i64) -> Self {
        self.creation_ts = creation_ts;
        self
    }

    pub fn content_hash(mut self, content_hash: u64) -> Self {
        self.content_hash = content_hash;
        self
    }

    pub fn start_index(mut self, start: impl Into<IndexValue>) -> Self {
        self.start_index = start.into();
        self
    }

    pub fn end_index(mut self, end: impl Into<IndexValue>) -> Self {
        self.end_index = end.into();
        self
    }

    pub fn build(self, key_type: KeyType, symbol: impl Into<String>) -> AtomKey {
        AtomKey {
            key_type,
            symbol: symbol.into(),
            version_id: self.version_id,
            creation_ts: self.creation_ts,
            content_hash: self.content_hash,
            start_index: self.start_index,
            end_index: self.end_index,
        }
    }
}

/// Named, versionless pointer key. Writing it replaces the previous object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RefKey {
    key_type: KeyType,
    symbol: String,
}

impl RefKey {
    pub fn new(key_type: KeyType, symbol: impl Into<String>) -> Self {
        Self {
            key_type,
            symbol: symbol.into(),
        }
    }

    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VariantKey {
    Atom(AtomKey),
    Ref(RefKey),
}

impl VariantKey {
    pub fn key_type(&self) -> KeyType {
        match self {
            VariantKey::Atom(k) => k.key_type(),
            VariantKey::Ref(k) => k.key_type(),
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            VariantKey::Atom(k) => k.symbol(),
            VariantKey::Ref(k) => k.symbol(),
        }
    }

    pub fn is_ref(&self) -> bool {
        matches!(self, VariantKey::Ref(_))
    }
}

impl From<AtomKey> for VariantKey {
    fn from(key: AtomKey) -> Self {
        VariantKey::Atom(key)
    }
}

impl From<RefKey> for VariantKey {
    fn from(key: RefKey) -> Self {
        VariantKey::Ref(key)
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantKey::Atom(k) => write!(
                f,
                "{}:{}@v{}#{:016x}",
                k.key_type, k.symbol, k.version_id, k.content_hash
            ),
            VariantKey::Ref(k) => write!(f, "{}:{}", k.key_type, k.symbol),
        }
    }
}

/// Opaque serialized payload. This layer never looks inside it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Segment(Bytes);

impl Segment {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(data.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Bytes> for Segment {
    fn from(data: Bytes) -> Self {
        Self(data)
    }
}

impl From<Vec<u8>> for Segment {
    fn from(data: Vec<u8>) -> Self {
        Self(Bytes::from(data))
    }
}

impl From<&'static [u8]> for Segment {
    fn from(data: &'static [u8]) -> Self {
        Self(Bytes::from_static(data))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySegmentPair {
    pub key: VariantKey,
    pub segment: Segment,
}

impl KeySegmentPair {
    pub fn new(key: impl Into<VariantKey>, segment: impl Into<Segment>) -> Self {
        Self {
            key: key.into(),
            segment: segment.into(),
        }
    }
}
