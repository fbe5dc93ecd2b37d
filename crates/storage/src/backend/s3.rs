//! S3-compatible storage backend.
//!
//! Works against AWS S3 and anything that speaks its API: MinIO, Ceph RGW,
//! and Swift clusters running the `s3api` middleware.
//!
//! # Credentials
//!
//! Credentials are passed in explicitly (the binary reads them from the
//! environment). The SDK's own credential chain is not consulted.
//!
//! # ETags
//!
//! Objects are always written with a single `PutObject`, never multipart, so
//! the ETag the service reports is the plain hex MD5 of the object's bytes.
//! Files larger than the single-request limit are segmented by the engine
//! before they get here.

use crate::{
    ObjectMeta, ObjectStore,
    error::{ErrorKind, Result},
    validate_name,
};
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, http::HttpResponse, retry::RetryConfig},
    error::{DisplayErrorContext, SdkError},
    primitives::ByteStream,
    types::{BucketLocationConstraint, CreateBucketConfiguration},
};
use exn::{OptionExt, ResultExt};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Generous default for concurrent S3 requests.
const DEFAULT_CONCURRENT_REQUESTS: usize = 100;
/// The region whose buckets must be created *without* a location constraint.
const DEFAULT_REGION: &str = "us-east-1";

/// S3-compatible storage backend.
///
/// Bound to one bucket, optionally under a key prefix. Object names passed to
/// the [`ObjectStore`] methods are relative to that prefix.
///
/// # Examples
///
/// ```no_run
/// use stow_storage::backend::S3Backend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = S3Backend::new(
///     "archive",
///     "scans-2016",
///     Some("digitization".to_string()),
///     "us-east-1",
///     Some("https://objects.example.org".to_string()),
///     "access_key_id",
///     "secret_access_key",
/// )?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct S3Backend {
    name: String,
    bucket: String,
    prefix: Option<String>,
    region: String,
    /// Swapped out wholesale on [`reconnect`](ObjectStore::reconnect).
    client: RwLock<Client>,
    /// Rate limiter for concurrent S3 requests.
    rate_limiter: Arc<Semaphore>,
}

impl S3Backend {
    /// Create a new S3 storage backend.
    ///
    /// # Arguments
    /// * `name` - A name for this backend (used in display/logging)
    /// * `bucket` - Bucket name (the container)
    /// * `prefix` - Optional key prefix (acts as virtual directory)
    /// * `region` - Region name
    /// * `endpoint` - Custom endpoint URL for S3-compatible services
    /// * `key_id` - Access key ID
    /// * `key_secret` - Secret access key
    pub fn new(
        name: impl Into<String>,
        bucket: impl Into<String>,
        prefix: Option<String>,
        region: impl Into<String>,
        endpoint: Option<impl Into<String>>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Result<Self> {
        let region = region.into();
        let credentials = Credentials::new(key_id, key_secret, None, None, "stow-env");
        let mut config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(region.clone()))
            // The engine runs its own retry loop with reconnects in between;
            // keep the SDK's to a single attempt so the two don't multiply.
            .retry_config(RetryConfig::standard().with_max_attempts(1))
            // Use path-style addressing for better compatibility with
            // S3-compatible services (MinIO, Swift s3api, etc.)
            .force_path_style(true);
        if let Some(endpoint_url) = endpoint {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }
        Self::from_client(name, bucket, prefix, region, Client::from_conf(config_builder.build()))
    }

    /// Wrap an already-configured client.
    pub fn from_client(
        name: impl Into<String>,
        bucket: impl Into<String>,
        prefix: Option<String>,
        region: impl Into<String>,
        client: Client,
    ) -> Result<Self> {
        let bucket = bucket.into();
        if validate_name(&bucket).ok().as_deref() != Some(bucket.as_str()) || bucket.contains('/') {
            exn::bail!(ErrorKind::Container(bucket));
        }
        let prefix = prefix.filter(|p| !p.trim_matches('/').is_empty()).map(validate_name).transpose()?;
        Ok(Self {
            name: name.into(),
            bucket,
            prefix,
            region: region.into(),
            client: RwLock::new(client),
            rate_limiter: Arc::new(Semaphore::new(DEFAULT_CONCURRENT_REQUESTS)),
        })
    }

    /// Construct the full S3 key from an object name.
    fn full_key(&self, name: &str) -> Result<String> {
        let validated = validate_name(name)?;
        Ok(match &self.prefix {
            Some(prefix) => format!("{prefix}/{validated}"),
            None => validated,
        })
    }

    fn client(&self) -> Client {
        self.client.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Acquire a rate limiter permit before making an S3 API call.
    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        self.rate_limiter
            .clone()
            .acquire_owned()
            .await
            .or_raise(|| ErrorKind::BackendError("rate limiter closed".to_string()))
    }

    /// Sort an SDK failure into the error kind callers act on.
    fn classify<E>(err: &SdkError<E, HttpResponse>, context: &str) -> ErrorKind
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let message = format!("{context}: {}", DisplayErrorContext(err));
        match err {
            SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => ErrorKind::Network(message),
            _ => match err.raw_response().map(|response| response.status().as_u16()) {
                Some(401 | 403) => ErrorKind::Unauthorized(message),
                _ => ErrorKind::BackendError(message),
            },
        }
    }

    fn meta(name: &str, size: Option<i64>, etag: Option<&str>) -> Result<ObjectMeta> {
        let etag = etag.ok_or_raise(|| ErrorKind::BackendError(format!("no ETag returned for {name}")))?;
        let size = u64::try_from(size.unwrap_or(0)).unwrap_or(0);
        Ok(ObjectMeta::new(validate_name(name)?, size, etag))
    }
}

#[async_trait]
impl ObjectStore for S3Backend {
    fn name(&self) -> &str {
        &self.name
    }

    fn container(&self) -> &str {
        &self.bucket
    }

    #[tracing::instrument(skip(self), fields(backend = %self.name))]
    async fn reconnect(&self) -> Result<()> {
        let mut guard = self.client.write().unwrap_or_else(PoisonError::into_inner);
        let config = guard.config().clone();
        *guard = Client::from_conf(config);
        tracing::debug!("rebuilt S3 client");
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(backend = %self.name, bucket = %self.bucket))]
    async fn create_container(&self) -> Result<()> {
        let _permit = self.acquire_permit().await?;
        let mut request = self.client().create_bucket().bucket(&self.bucket);
        if self.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }
        match request.send().await {
            Ok(_) => Ok(()),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|s| s.is_bucket_already_owned_by_you() || s.is_bucket_already_exists()) =>
            {
                tracing::debug!("bucket already exists");
                Ok(())
            },
            Err(e) => {
                let kind = Self::classify(&e, "create bucket");
                Err(exn::Exn::from(e).raise(kind))
            },
        }
    }

    async fn head(&self, name: &str) -> Result<Option<ObjectMeta>> {
        let key = self.full_key(name)?;
        let _permit = self.acquire_permit().await?;
        match self.client().head_object().bucket(&self.bucket).key(&key).send().await {
            Ok(output) => Ok(Some(Self::meta(name, output.content_length(), output.e_tag())?)),
            Err(e) if e.as_service_error().is_some_and(|s| s.is_not_found()) => Ok(None),
            Err(e) => {
                let kind = Self::classify(&e, &format!("head {key}"));
                Err(exn::Exn::from(e).raise(kind))
            },
        }
    }

    async fn get(&self, name: &str) -> Result<Vec<u8>> {
        let key = self.full_key(name)?;
        let _permit = self.acquire_permit().await?;
        let output = match self.client().get_object().bucket(&self.bucket).key(&key).send().await {
            Ok(output) => output,
            Err(e) if e.as_service_error().is_some_and(|s| s.is_no_such_key()) => {
                exn::bail!(ErrorKind::NotFound(name.to_string()))
            },
            Err(e) => {
                let kind = Self::classify(&e, &format!("get {key}"));
                return Err(exn::Exn::from(e).raise(kind));
            },
        };
        let bytes = output.body.collect().await.or_raise(|| ErrorKind::Network(format!("reading body of {key}")))?;
        Ok(bytes.into_bytes().to_vec())
    }

    async fn put_file(&self, name: &str, source: &Path) -> Result<ObjectMeta> {
        let key = self.full_key(name)?;
        let size = tokio::fs::metadata(source).await.or_raise(|| ErrorKind::LocalFile(source.to_path_buf()))?.len();
        let body = ByteStream::from_path(source).await.or_raise(|| ErrorKind::LocalFile(source.to_path_buf()))?;
        let _permit = self.acquire_permit().await?;
        let size_header = i64::try_from(size).or_raise(|| ErrorKind::LocalFile(source.to_path_buf()))?;
        let output = self
            .client()
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_length(size_header)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                let kind = Self::classify(&e, &format!("put {key}"));
                exn::Exn::from(e).raise(kind)
            })?;
        Self::meta(name, Some(size_header), output.e_tag())
    }

    async fn put_bytes(&self, name: &str, data: Vec<u8>) -> Result<ObjectMeta> {
        let key = self.full_key(name)?;
        let size = i64::try_from(data.len()).unwrap_or(i64::MAX);
        let _permit = self.acquire_permit().await?;
        let output = self
            .client()
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| {
                let kind = Self::classify(&e, &format!("put {key}"));
                exn::Exn::from(e).raise(kind)
            })?;
        Self::meta(name, Some(size), output.e_tag())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let key = self.full_key(name)?;
        let _permit = self.acquire_permit().await?;
        match self.client().delete_object().bucket(&self.bucket).key(&key).send().await {
            Ok(_) => Ok(()),
            // Some S3-compatible services answer 404 instead of 204.
            Err(e) if e.raw_response().is_some_and(|r| r.status().as_u16() == 404) => Ok(()),
            Err(e) => {
                let kind = Self::classify(&e, &format!("delete {key}"));
                Err(exn::Exn::from(e).raise(kind))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::operation::{
        create_bucket::{CreateBucketError, CreateBucketOutput},
        get_object::{GetObjectError, GetObjectOutput},
        head_object::{HeadObjectError, HeadObjectOutput},
        put_object::PutObjectOutput,
    };
    use aws_sdk_s3::types::error::{BucketAlreadyOwnedByYou, NoSuchKey, NotFound};
    use aws_smithy_mocks::{mock, mock_client};

    const HELLO_MD5: &str = "5d41402abc4b2a76b9719d911017c592";

    /// A client whose only rule is never expected to fire.
    fn idle_client() -> Client {
        let rule = mock!(Client::head_object).then_output(|| HeadObjectOutput::builder().build());
        mock_client!(aws_sdk_s3, [&rule])
    }

    fn backend(client: Client, prefix: Option<&str>) -> S3Backend {
        S3Backend::from_client("s3", "bucket", prefix.map(str::to_string), DEFAULT_REGION, client).unwrap()
    }

    #[test]
    fn test_rejects_bad_bucket() {
        let client = idle_client();
        assert!(S3Backend::from_client("s3", "a/b", None, DEFAULT_REGION, client.clone()).is_err());
        assert!(S3Backend::from_client("s3", "..", None, DEFAULT_REGION, client).is_err());
    }

    #[test]
    fn test_full_key() {
        let client = idle_client();
        assert_eq!(backend(client.clone(), None).full_key("a/b.tif").unwrap(), "a/b.tif");
        assert_eq!(backend(client.clone(), Some("project")).full_key("a/b.tif").unwrap(), "project/a/b.tif");
        assert_eq!(backend(client.clone(), Some("/project/")).full_key("a/b.tif").unwrap(), "project/a/b.tif");
        assert_eq!(backend(client, Some("")).full_key("a/b.tif").unwrap(), "a/b.tif");
    }

    #[tokio::test]
    async fn test_head_found() {
        let rule = mock!(Client::head_object)
            .match_requests(|req| req.bucket() == Some("bucket") && req.key() == Some("project/a.tif"))
            .then_output(|| HeadObjectOutput::builder().content_length(5).e_tag(format!("\"{HELLO_MD5}\"")).build());
        let backend = backend(mock_client!(aws_sdk_s3, [&rule]), Some("project"));
        let meta = backend.head("a.tif").await.unwrap().unwrap();
        assert_eq!(meta, ObjectMeta::new("a.tif", 5, HELLO_MD5));
    }

    #[tokio::test]
    async fn test_head_missing() {
        let rule = mock!(Client::head_object)
            .then_error(|| HeadObjectError::NotFound(NotFound::builder().build()));
        let backend = backend(mock_client!(aws_sdk_s3, [&rule]), None);
        assert_eq!(backend.head("a.tif").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let rule = mock!(Client::get_object)
            .then_error(|| GetObjectError::NoSuchKey(NoSuchKey::builder().build()));
        let backend = backend(mock_client!(aws_sdk_s3, [&rule]), None);
        let err = backend.get("a.json").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_get() {
        let rule = mock!(Client::get_object)
            .then_output(|| GetObjectOutput::builder().body(ByteStream::from_static(b"hello")).build());
        let backend = backend(mock_client!(aws_sdk_s3, [&rule]), None);
        assert_eq!(backend.get("a.json").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_put_bytes_trims_etag() {
        let rule = mock!(Client::put_object)
            .match_requests(|req| req.key() == Some("a.txt"))
            .then_output(|| PutObjectOutput::builder().e_tag(format!("\"{HELLO_MD5}\"")).build());
        let backend = backend(mock_client!(aws_sdk_s3, [&rule]), None);
        let meta = backend.put_bytes("a.txt", b"hello".to_vec()).await.unwrap();
        assert_eq!(meta.etag, HELLO_MD5);
        assert_eq!(meta.size, 5);
    }

    #[tokio::test]
    async fn test_put_file_missing_source() {
        let backend = backend(idle_client(), None);
        let err = backend.put_file("a.txt", Path::new("/definitely/missing.tif")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::LocalFile(_)));
    }

    #[tokio::test]
    async fn test_create_container_already_owned() {
        let rule = mock!(Client::create_bucket)
            .then_error(|| CreateBucketError::BucketAlreadyOwnedByYou(BucketAlreadyOwnedByYou::builder().build()));
        let backend = backend(mock_client!(aws_sdk_s3, [&rule]), None);
        backend.create_container().await.unwrap();
    }

    #[tokio::test]
    async fn test_create_container() {
        let rule = mock!(Client::create_bucket)
            .match_requests(|req| req.bucket() == Some("bucket") && req.create_bucket_configuration().is_none())
            .then_output(|| CreateBucketOutput::builder().build());
        let backend = backend(mock_client!(aws_sdk_s3, [&rule]), None);
        backend.create_container().await.unwrap();
        assert_eq!(rule.num_calls(), 1);
    }

    #[tokio::test]
    async fn test_reconnect_keeps_configuration() {
        let rule = mock!(Client::head_object)
            .then_output(|| HeadObjectOutput::builder().content_length(5).e_tag(HELLO_MD5).build());
        let backend = backend(mock_client!(aws_sdk_s3, [&rule]), None);
        backend.reconnect().await.unwrap();
        assert!(backend.head("a.tif").await.unwrap().is_some());
    }
}
