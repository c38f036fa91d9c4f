use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};

/// Version of the [`VariantStorage`] envelope layout.
pub const ENVELOPE_VERSION: u32 = 1;

/// Storage type tag carried by envelopes produced by this crate.
pub const BLOB_STORAGE_TYPE: &str = "blob";

const ENV_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
const ENV_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";

/// Which client carries the blob requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transport {
    /// S3-compatible object storage.
    #[default]
    S3,
    /// A directory tree on the local filesystem.
    Local { root: PathBuf },
    /// Process memory, shared by every instance of one factory.
    InMemory,
}

/// Connection settings of the blob backend.
///
/// Credentials come from the explicit `credential_name`/`credential_key`
/// fields. The environment is only consulted when the caller asks for it via
/// [`BlobStorageConfig::with_env_credentials`], and never overrides explicit
/// values.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobStorageConfig {
    pub container_name: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_key: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default)]
    pub force_path_style: bool,
    #[serde(default)]
    pub transport: Transport,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_max_concurrency() -> usize {
    8
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    storage: BlobStorageConfig,
}

impl BlobStorageConfig {
    pub fn new(container_name: impl Into<String>) -> Self {
        Self {
            container_name: container_name.into(),
            region: default_region(),
            endpoint: None,
            credential_name: None,
            credential_key: None,
            request_timeout_ms: default_request_timeout_ms(),
            max_concurrency: default_max_concurrency(),
            force_path_style: false,
            transport: Transport::default(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_credentials(mut self, name: impl Into<String>, key: impl Into<String>) -> Self {
        self.credential_name = Some(name.into());
        self.credential_key = Some(key.into());
        self
    }

    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Fills unset credentials from `AWS_ACCESS_KEY_ID` and
    /// `AWS_SECRET_ACCESS_KEY`.
    pub fn with_env_credentials(self) -> Self {
        self.with_credentials_from(|name| std::env::var(name).ok())
    }

    fn with_credentials_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.credential_name.is_none() && self.credential_key.is_none() {
            if let (Some(name), Some(key)) =
                (lookup(ENV_ACCESS_KEY_ID), lookup(ENV_SECRET_ACCESS_KEY))
            {
                self.credential_name = Some(name);
                self.credential_key = Some(key);
            }
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Both credential halves, when configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.credential_name, &self.credential_key) {
            (Some(name), Some(key)) => Some((name, key)),
            _ => None,
        }
    }

    pub fn validate(&self) -> StorageResult<()> {
        if self.container_name.trim().is_empty() {
            return Err(StorageError::Config("container_name is empty".to_string()));
        }
        if self.credential_name.is_some() != self.credential_key.is_some() {
            return Err(StorageError::Config(
                "credential_name and credential_key must be set together".to_string(),
            ));
        }
        if self.transport == Transport::S3 && self.credentials().is_none() {
            return Err(StorageError::Config(
                "the s3 transport needs credential_name and credential_key".to_string(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(StorageError::Config(
                "request_timeout_ms must be positive".to_string(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(StorageError::Config(
                "max_concurrency must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Reads the `[storage]` table of a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            StorageError::Config(format!(
                "failed to read config file {:?}: {}",
                path.as_ref(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> StorageResult<Self> {
        let file: ConfigFile = toml::from_str(content)
            .map_err(|e| StorageError::Config(format!("failed to parse config: {}", e)))?;
        Ok(file.storage)
    }

    pub fn default_config() -> String {
        r#"
[storage]
container_name = "segments"
region = "us-east-1"
# endpoint = "http://127.0.0.1:9000"   # Optional custom endpoint
# credential_name = "access-key-id"     # Or call with_env_credentials / --env-credentials
# credential_key = "secret-access-key"
request_timeout_ms = 30000
max_concurrency = 8
force_path_style = false

[storage.transport]
type = "s3"        # s3, local (with root = "/path") or in_memory
"#
        .to_string()
    }
}

impl fmt::Debug for BlobStorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobStorageConfig")
            .field("container_name", &self.container_name)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("credential_name", &self.credential_name)
            .field("credential_key", &self.credential_key.as_ref().map(|_| "<redacted>"))
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("max_concurrency", &self.max_concurrency)
            .field("force_path_style", &self.force_path_style)
            .field("transport", &self.transport)
            .finish()
    }
}

/// Versioned, opaque configuration envelope persisted next to library
/// metadata. Credentials are never packed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantStorage {
    pub version: u32,
    pub storage_type: String,
    pub config: serde_json::Value,
}

impl VariantStorage {
    pub fn pack(config: &BlobStorageConfig) -> StorageResult<Self> {
        let mut config = config.clone();
        config.credential_name = None;
        config.credential_key = None;
        let config = serde_json::to_value(&config)
            .map_err(|e| StorageError::Config(format!("failed to pack config: {}", e)))?;
        Ok(Self {
            version: ENVELOPE_VERSION,
            storage_type: BLOB_STORAGE_TYPE.to_string(),
            config,
        })
    }

    pub fn unpack(&self) -> StorageResult<BlobStorageConfig> {
        if self.version != ENVELOPE_VERSION {
            return Err(StorageError::Config(format!(
                "unsupported envelope version {}",
                self.version
            )));
        }
        if self.storage_type != BLOB_STORAGE_TYPE {
            return Err(StorageError::Config(format!(
                "envelope holds '{}' storage, expected '{}'",
                self.storage_type, BLOB_STORAGE_TYPE
            )));
        }
        serde_json::from_value(self.config.clone())
            .map_err(|e| StorageError::Config(format!("failed to unpack config: {}", e)))
    }

    pub fn to_bytes(&self) -> StorageResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| StorageError::Config(format!("failed to encode envelope: {}", e)))
    }

    pub fn from_bytes(bytes: &[u8]) -> StorageResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| StorageError::Config(format!("failed to decode envelope: {}", e)))
    }
}

pub fn pack_config(container_name: &str) -> StorageResult<VariantStorage> {
    VariantStorage::pack(&BlobStorageConfig::new(container_name))
}

pub fn pack_config_with_endpoint(
    container_name: &str,
    endpoint: &str,
) -> StorageResult<VariantStorage> {
    VariantStorage::pack(&BlobStorageConfig::new(container_name).with_endpoint(endpoint))
}
