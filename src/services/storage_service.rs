//! Object fetching. `ObjectStore` is the seam to remote storage; the S3
//! implementation shares one pooled client across requests. Stored objects
//! are gzip-compressed and `fetch_object` hands back the inflated payload.

use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    operation::get_object::GetObjectError,
};
use bytes::Bytes;
use flate2::read::GzDecoder;
use std::io::{self, Read};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object `{key}` not found in bucket `{bucket}`")]
    NotFound { bucket: String, key: String },
    #[error("access denied to object `{key}` in bucket `{bucket}`")]
    AccessDenied { bucket: String, key: String },
    #[error("storage request failed: {0}")]
    Transient(String),
    #[error("object payload could not be decompressed: {0}")]
    Decompress(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Remote byte store addressed by bucket and key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Return the stored bytes for `bucket/key`, exactly as stored.
    async fn fetch(&self, bucket: &str, key: &str) -> StorageResult<Bytes>;
}

/// `ObjectStore` backed by Amazon S3 (or an S3-compatible endpoint).
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client for `region`, optionally pointed at a custom endpoint.
    ///
    /// Credentials come from the default provider chain. A custom endpoint
    /// implies path-style addressing, which is what MinIO and friends expect.
    pub async fn connect(region: &str, endpoint: Option<&str>) -> Self {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(region.to_string()))
            .retry_config(aws_config::retry::RetryConfig::standard().with_max_attempts(2))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(url) = endpoint {
            builder = builder.endpoint_url(url).force_path_style(true);
        }

        Self::new(Client::from_conf(builder.build()))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn fetch(&self, bucket: &str, key: &str) -> StorageResult<Bytes> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| classify_get_error(bucket, key, err))?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|err| StorageError::Transient(format!("reading body: {err}")))?;

        Ok(body.into_bytes())
    }
}

/// Sort an S3 GetObject failure into not-found, denied or transient.
fn classify_get_error(bucket: &str, key: &str, err: SdkError<GetObjectError>) -> StorageError {
    let status = err.raw_response().map(|resp| resp.status().as_u16());
    let detail = DisplayErrorContext(&err).to_string();
    let service_err = err.into_service_error();

    if service_err.is_no_such_key()
        || service_err.code() == Some("NoSuchBucket")
        || status == Some(404)
    {
        return StorageError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        };
    }
    if service_err.code() == Some("AccessDenied") || status == Some(403) {
        return StorageError::AccessDenied {
            bucket: bucket.to_string(),
            key: key.to_string(),
        };
    }
    StorageError::Transient(detail)
}

/// Upper bound on an inflated object; larger payloads are rejected.
pub const MAX_INFLATED_BYTES: u64 = 64 * 1024 * 1024;

/// Fetch `bucket/key` from `store` and inflate it.
///
/// Inflation runs on the blocking pool so a caller's timeout keeps ticking
/// while a large payload is decompressed.
pub async fn fetch_object(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
) -> StorageResult<Vec<u8>> {
    let raw = store.fetch(bucket, key).await?;
    debug!(bucket, key, compressed_bytes = raw.len(), "fetched object");
    tokio::task::spawn_blocking(move || gunzip(&raw))
        .await
        .map_err(|err| StorageError::Decompress(format!("inflate task failed: {err}")))?
}

/// Inflate a gzip payload, capped at `MAX_INFLATED_BYTES`.
pub fn gunzip(data: &[u8]) -> StorageResult<Vec<u8>> {
    gunzip_limited(data, MAX_INFLATED_BYTES)
}

/// Inflate a gzip payload of at most `limit` bytes.
///
/// An empty payload is rejected up front; anything without a valid gzip
/// header fails in the decoder.
pub fn gunzip_limited(data: &[u8], limit: u64) -> StorageResult<Vec<u8>> {
    if data.is_empty() {
        return Err(StorageError::Decompress("empty payload".into()));
    }
    let mut decoder = GzDecoder::new(data).take(limit + 1);
    let mut output = Vec::new();
    decoder
        .read_to_end(&mut output)
        .map_err(|err: io::Error| StorageError::Decompress(err.to_string()))?;
    if output.len() as u64 > limit {
        return Err(StorageError::Decompress(format!(
            "inflated payload exceeds {limit} bytes"
        )));
    }
    Ok(output)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use aws_sdk_s3::{config::http::HttpResponse, error::ErrorMetadata, types::error::NoSuchKey};
    use aws_smithy_runtime_api::http::StatusCode;
    use aws_smithy_types::body::SdkBody;
    use flate2::{Compression, write::GzEncoder};
    use std::{
        collections::HashMap,
        io::Write,
        sync::atomic::{AtomicUsize, Ordering},
    };

    pub(crate) fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    /// In-memory store that counts how often it is hit.
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        objects: HashMap<(String, String), Bytes>,
        fetches: AtomicUsize,
    }

    impl MemoryStore {
        pub(crate) fn with_object(mut self, bucket: &str, key: &str, data: Vec<u8>) -> Self {
            self.objects
                .insert((bucket.to_string(), key.to_string()), Bytes::from(data));
            self
        }

        pub(crate) fn fetch_count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ObjectStore for MemoryStore {
        async fn fetch(&self, bucket: &str, key: &str) -> StorageResult<Bytes> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.objects
                .get(&(bucket.to_string(), key.to_string()))
                .cloned()
                .ok_or_else(|| StorageError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })
        }
    }

    #[test]
    fn gunzip_inflates_payload() {
        let compressed = gzip(b"pixels");
        assert_eq!(gunzip(&compressed).unwrap(), b"pixels");
    }

    #[test]
    fn gunzip_rejects_plain_bytes() {
        let err = gunzip(b"\x89PNG\r\n\x1a\nnot gzip").unwrap_err();
        assert!(matches!(err, StorageError::Decompress(_)));
    }

    #[test]
    fn gunzip_rejects_payloads_over_the_limit() {
        let compressed = gzip(&vec![0u8; 64 * 1024]);
        assert!(compressed.len() < 1024);

        let err = gunzip_limited(&compressed, 4096).unwrap_err();
        assert!(matches!(err, StorageError::Decompress(msg) if msg.contains("4096")));
        assert_eq!(gunzip_limited(&compressed, 64 * 1024).unwrap().len(), 64 * 1024);
    }

    fn service_error(err: GetObjectError, status: u16) -> SdkError<GetObjectError> {
        let raw = HttpResponse::new(StatusCode::try_from(status).unwrap(), SdkBody::empty());
        SdkError::service_error(err, raw)
    }

    fn generic_error(code: &str) -> GetObjectError {
        GetObjectError::generic(ErrorMetadata::builder().code(code).build())
    }

    #[test]
    fn no_such_key_and_bucket_are_not_found() {
        let err = service_error(GetObjectError::NoSuchKey(NoSuchKey::builder().build()), 404);
        assert!(matches!(
            classify_get_error("b", "k", err),
            StorageError::NotFound { bucket, key } if bucket == "b" && key == "k"
        ));

        let err = service_error(generic_error("NoSuchBucket"), 404);
        assert!(matches!(
            classify_get_error("b", "k", err),
            StorageError::NotFound { .. }
        ));
    }

    #[test]
    fn access_denied_by_code_or_status() {
        let err = service_error(generic_error("AccessDenied"), 403);
        assert!(matches!(
            classify_get_error("b", "k", err),
            StorageError::AccessDenied { .. }
        ));

        let err = service_error(generic_error("Forbidden"), 403);
        assert!(matches!(
            classify_get_error("b", "k", err),
            StorageError::AccessDenied { .. }
        ));
    }

    #[test]
    fn server_failures_are_transient() {
        let err = service_error(generic_error("InternalError"), 500);
        assert!(matches!(
            classify_get_error("b", "k", err),
            StorageError::Transient(_)
        ));
    }

    #[test]
    fn gunzip_rejects_empty_payload() {
        assert!(matches!(gunzip(&[]), Err(StorageError::Decompress(_))));
    }

    #[tokio::test]
    async fn fetch_object_inflates_stored_bytes() {
        let store = MemoryStore::default().with_object("b", "k", gzip(b"raw"));
        let data = fetch_object(&store, "b", "k").await.unwrap();
        assert_eq!(data, b"raw");
        assert_eq!(store.fetch_count(), 1);
    }

    #[tokio::test]
    async fn fetch_object_reports_missing_objects() {
        let store = MemoryStore::default();
        let err = fetch_object(&store, "nope", "k").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }
}
