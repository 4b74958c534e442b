/// S3-backed object store
///
/// Thin wrapper around `aws-sdk-s3` pinning the bucket at construction.
/// Credentials and region resolve through the standard AWS environment
/// chain (env vars, profile, instance metadata).

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use tracing::{debug, instrument};

use super::{ObjectMeta, ObjectStore, StorageError};

/// Object store over an S3 bucket
#[derive(Clone, Debug)]
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Store {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Builds a store from the ambient AWS configuration
    pub async fn from_env(bucket: impl Into<String>) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(aws_sdk_s3::Client::new(&config), bucket)
    }

    /// Builds a store with explicit region and endpoint overrides
    ///
    /// An endpoint override points the client at an S3-compatible service
    /// (minio, localstack). Unset options fall back to the environment chain.
    pub async fn from_settings(
        bucket: impl Into<String>,
        region: Option<String>,
        endpoint: Option<String>,
    ) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());

        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region));
        }

        let custom_endpoint = endpoint.is_some();
        if let Some(endpoint) = endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        let config = loader.load().await;

        // S3-compatible endpoints usually require path-style addressing
        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(custom_endpoint)
            .build();

        Self::new(aws_sdk_s3::Client::from_conf(s3_config), bucket)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn backend_err(e: impl std::fmt::Display) -> StorageError {
        StorageError::Backend(e.to_string())
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    #[instrument(skip(self, bytes), fields(bucket = %self.bucket))]
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let body = aws_sdk_s3::primitives::ByteStream::from(bytes);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(Self::backend_err)?;

        Ok(())
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map(|e| e.is_no_such_key()) == Some(true) {
                    StorageError::NotFound(key.to_string())
                } else {
                    Self::backend_err(e)
                }
            })?;

        let body = resp.body.collect().await.map_err(Self::backend_err)?;

        Ok(body.into_bytes().to_vec())
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(Self::backend_err)?;

        Ok(())
    }

    #[instrument(skip(self, keys), fields(bucket = %self.bucket, count = keys.len()))]
    async fn delete_many(&self, keys: &[String]) -> Result<(), StorageError> {
        if keys.is_empty() {
            return Ok(());
        }

        // DeleteObjects caps at 1000 keys per request
        for chunk in keys.chunks(1000) {
            let mut identifiers = Vec::with_capacity(chunk.len());
            for key in chunk {
                let id = ObjectIdentifier::builder()
                    .key(key)
                    .build()
                    .map_err(Self::backend_err)?;
                identifiers.push(id);
            }

            let delete = Delete::builder()
                .set_objects(Some(identifiers))
                .build()
                .map_err(Self::backend_err)?;

            self.client
                .delete_objects()
                .bucket(&self.bucket)
                .delete(delete)
                .send()
                .await
                .map_err(Self::backend_err)?;
        }

        Ok(())
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn delete_prefix(&self, prefix: &str) -> Result<u64, StorageError> {
        let objects = self.list_prefix(prefix).await?;
        let keys: Vec<String> = objects.into_iter().map(|o| o.key).collect();
        let count = keys.len() as u64;

        self.delete_many(&keys).await?;

        debug!(prefix, count, "deleted objects under prefix");

        Ok(count)
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<ObjectMeta>, StorageError> {
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let resp = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(Self::backend_err)?;

            for object in resp.contents() {
                if let Some(key) = object.key() {
                    objects.push(ObjectMeta {
                        key: key.to_string(),
                        size: object.size().unwrap_or(0),
                    });
                }
            }

            match resp.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        Ok(objects)
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn presign_get(&self, key: &str, expires_secs: u64) -> Result<String, StorageError> {
        let config = PresigningConfig::expires_in(Duration::from_secs(expires_secs))
            .map_err(Self::backend_err)?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(Self::backend_err)?;

        Ok(presigned.uri().to_string())
    }
}

// Exercised against a live bucket or localstack in integration environments;
// unit coverage goes through MemoryStore
