use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::primitives::ByteStream;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// StorageError
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object upload failed: {0}")]
    Upload(String),
    #[error("object delete failed: {0}")]
    Delete(String),
}

/// StorageService
///
/// Contract for the object store holding post cover images. Handlers only see
/// this trait, so tests swap the S3 client for [`MockStorageService`].
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Creates the configured bucket if missing. Used for the local MinIO setup.
    async fn ensure_bucket_exists(&self);

    /// Stores `body` under `key` with the given MIME type.
    async fn put_object(
        &self,
        key: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<(), StorageError>;

    /// Removes the object at `key`. Deleting a missing key is not an error.
    async fn delete_object(&self, key: &str) -> Result<(), StorageError>;

    /// The URL readers use to fetch the object at `key`.
    fn public_url(&self, key: &str) -> String;
}

/// S3StorageClient
///
/// `aws-sdk-s3` backed implementation. Path-style addressing keeps it
/// compatible with MinIO and other S3 gateways.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket_name: String,
    public_base_url: String,
}

impl S3StorageClient {
    pub async fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
        public_base_url: &str,
    ) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(config),
            bucket_name: bucket.to_string(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    async fn ensure_bucket_exists(&self) {
        if let Err(e) = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
        {
            // Already-exists is reported as an error too.
            tracing::debug!("create_bucket: {:?}", e);
        }
    }

    async fn put_object(
        &self,
        key: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| StorageError::Upload(e.to_string()))?;

        tracing::debug!(key, "cover uploaded");
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Delete(e.to_string()))?;

        tracing::debug!(key, "cover deleted");
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }
}

/// sanitize_key
///
/// Removes directory navigation segments (`..`, `.`) and empty segments from a key.
fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Builds a fresh object key `uploads/<uuid>.<ext>` for a client-supplied filename.
///
/// The extension is the text after the last `.`; anything that is not short and
/// alphanumeric is replaced by `bin`.
pub fn cover_key(original_filename: &str) -> String {
    let extension = original_filename
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| {
            !ext.is_empty() && ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| "bin".to_string());

    sanitize_key(&format!("uploads/{}.{}", Uuid::new_v4(), extension))
}

/// MockStorageService
///
/// In-memory object store for tests. Stored objects can be inspected through
/// [`MockStorageService::object`].
#[derive(Default)]
pub struct MockStorageService {
    /// When true, uploads fail.
    pub should_fail: bool,
    objects: Mutex<HashMap<String, (String, Vec<u8>)>>,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Returns the `(content_type, body)` stored under `key`.
    pub fn object(&self, key: &str) -> Option<(String, Vec<u8>)> {
        self.objects
            .lock()
            .ok()
            .and_then(|objects| objects.get(key).cloned())
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|objects| objects.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_bucket_exists(&self) {}

    async fn put_object(
        &self,
        key: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<(), StorageError> {
        if self.should_fail {
            return Err(StorageError::Upload(
                "Mock Storage Error: Simulation requested".to_string(),
            ));
        }

        let mut objects = self
            .objects
            .lock()
            .map_err(|e| StorageError::Upload(e.to_string()))?;
        objects.insert(sanitize_key(key), (content_type.to_string(), body));
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        let mut objects = self
            .objects
            .lock()
            .map_err(|e| StorageError::Delete(e.to_string()))?;
        objects.remove(&sanitize_key(key));
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("http://localhost:9000/mock-bucket/{}", sanitize_key(key))
    }
}

/// StorageState
///
/// Shared handle to the object store held in the application state.
pub type StorageState = Arc<dyn StorageService>;
