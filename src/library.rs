use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};

/// Identifies one logical library (namespace) inside a shared container.
///
/// Segments are non-empty and may contain neither `/` (which would make the
/// library alias a deeper one in the blob namespace) nor `.` (the textual
/// delimiter accepted by [`LibraryPath::from_delim_path`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawLibraryPath")]
pub struct LibraryPath {
    parts: Vec<String>,
}

#[derive(Deserialize)]
struct RawLibraryPath {
    parts: Vec<String>,
}

impl TryFrom<RawLibraryPath> for LibraryPath {
    type Error = StorageError;

    fn try_from(raw: RawLibraryPath) -> StorageResult<Self> {
        Self::new(raw.parts)
    }
}

impl LibraryPath {
    pub fn new<I, S>(parts: I) -> StorageResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let parts: Vec<String> = parts.into_iter().map(Into::into).collect();
        if parts.is_empty() {
            return Err(StorageError::Config(
                "library path needs at least one segment".to_string(),
            ));
        }
        for part in &parts {
            if part.is_empty() {
                return Err(StorageError::Config(format!(
                    "empty segment in library path {:?}",
                    parts
                )));
            }
            if part.contains('/') || part.contains('.') {
                return Err(StorageError::Config(format!(
                    "library path segment '{}' may not contain '/' or '.'",
                    part
                )));
            }
        }
        Ok(Self { parts })
    }

    /// Parses `"a.b.c"`-style paths.
    pub fn from_delim_path(path: &str, delim: char) -> StorageResult<Self> {
        Self::new(path.split(delim))
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    pub fn to_delim_path(&self, delim: char) -> String {
        let mut out = String::new();
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                out.push(delim);
            }
            out.push_str(part);
        }
        out
    }
}

impl fmt::Display for LibraryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_delim_path('.'))
    }
}

/// Cumulative permission level granted to a storage instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenMode {
    Read,
    Write,
    Delete,
}

impl OpenMode {
    /// Whether this mode grants at least `required`.
    pub fn allows(self, required: OpenMode) -> bool {
        self >= required
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OpenMode::Read => "read",
            OpenMode::Write => "write",
            OpenMode::Delete => "delete",
        };
        f.write_str(name)
    }
}
