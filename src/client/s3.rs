use async_trait::async_trait;
use aws_config::{retry::RetryConfig, timeout::TimeoutConfig, BehaviorVersion, Region};
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use tracing::{debug, error};

use super::{ListPage, ObjectClient, PutMode};
use crate::config::BlobStorageConfig;
use crate::error::{StorageError, StorageResult};

/// Client for one S3-compatible bucket.
///
/// Built without touching the network or the environment: region, endpoint,
/// credentials and timeout all come from [`BlobStorageConfig`]. SDK retries
/// are disabled; retrying is left to the caller.
pub struct S3Client {
    client: Client,
    bucket: String,
}

impl S3Client {
    pub fn new(config: &BlobStorageConfig) -> StorageResult<Self> {
        let (access_key, secret_key) = config.credentials().ok_or_else(|| {
            StorageError::Config("s3 client needs credential_name and credential_key".to_string())
        })?;
        let creds = Credentials::new(access_key, secret_key, None, None, "segstore");

        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(creds)
            .retry_config(RetryConfig::disabled())
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(config.request_timeout())
                    .build(),
            )
            .force_path_style(config.force_path_style);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: config.container_name.clone(),
        })
    }
}

fn map_sdk_error<E>(op: &str, path: &str, err: SdkError<E, HttpResponse>) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let status = err.raw_response().map(|resp| resp.status().as_u16());
    error!("S3 {} failed for {}: {}", op, path, DisplayErrorContext(&err));
    match status {
        Some(401) | Some(403) => {
            StorageError::PermissionDenied(format!("S3 refused {} of {}", op, path))
        }
        Some(404) => StorageError::NotFound {
            path: path.to_string(),
        },
        Some(409) | Some(412) => StorageError::AlreadyExists {
            path: path.to_string(),
        },
        _ => StorageError::Unavailable(format!(
            "S3 {} of {}: {}",
            op,
            path,
            DisplayErrorContext(&err)
        )),
    }
}

fn is_missing<E>(err: &SdkError<E, HttpResponse>) -> bool {
    err.raw_response()
        .is_some_and(|resp| resp.status().as_u16() == 404)
}

/// A missing object is not an error for `get`.
fn get_missing(path: &str, err: SdkError<GetObjectError, HttpResponse>) -> StorageResult<Option<Bytes>> {
    if let SdkError::ServiceError(service) = &err {
        if service.err().is_no_such_key() {
            return Ok(None);
        }
    }
    if is_missing(&err) {
        return Ok(None);
    }
    Err(map_sdk_error("get", path, err))
}

/// HEAD responses carry no body, so a missing object may only show as a 404.
fn head_missing(path: &str, err: SdkError<HeadObjectError, HttpResponse>) -> StorageResult<bool> {
    if let SdkError::ServiceError(service) = &err {
        if service.err().is_not_found() {
            return Ok(false);
        }
    }
    if is_missing(&err) {
        return Ok(false);
    }
    Err(map_sdk_error("head", path, err))
}

#[async_trait]
impl ObjectClient for S3Client {
    async fn get(&self, path: &str) -> StorageResult<Option<Bytes>> {
        debug!("Getting object: {}", path);

        match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
        {
            Ok(output) => {
                let data = output.body.collect().await.map_err(|e| {
                    StorageError::Unavailable(format!("failed to read body of {}: {}", path, e))
                })?;
                Ok(Some(data.into_bytes()))
            }
            Err(err) => get_missing(path, err),
        }
    }

    async fn put(&self, path: &str, data: Bytes, mode: PutMode) -> StorageResult<()> {
        debug!("Putting object: {} ({:?}, {} bytes)", path, mode, data.len());

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .body(ByteStream::from(data));
        if mode == PutMode::CreateOnly {
            request = request.if_none_match("*");
        }

        request
            .send()
            .await
            .map_err(|e| map_sdk_error("put", path, e))?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> StorageResult<()> {
        debug!("Deleting object: {}", path);

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| map_sdk_error("delete", path, e))?;
        Ok(())
    }

    async fn list_page(
        &self,
        prefix: &str,
        continuation: Option<String>,
    ) -> StorageResult<ListPage> {
        debug!("Listing objects with prefix: {}", prefix);

        let mut request = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .delimiter("/");
        if let Some(token) = continuation {
            request = request.continuation_token(token);
        }

        let output = request
            .send()
            .await
            .map_err(|e| map_sdk_error("list", prefix, e))?;

        let paths = output
            .contents()
            .iter()
            .filter_map(|obj| obj.key().map(str::to_string))
            .collect();
        Ok(ListPage {
            paths,
            next: output.next_continuation_token().map(str::to_string),
        })
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => head_missing(path, err),
        }
    }
}
