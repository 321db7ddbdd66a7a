use crate::file::{guess_content_type, FileHandle, FileSource};
use crate::keys;
use crate::traits::{ByteReader, Storage, StorageError, StorageResult};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::retry::{RetryConfig, RetryMode};
use aws_config::BehaviorVersion;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use bytes::Bytes;
use stowage_core::StorageKind;
use tokio::io::AsyncReadExt;

// Minimum S3 part size is 5MB except for the last part.
const MULTIPART_THRESHOLD: u64 = 5 * 1024 * 1024;
const PART_SIZE: usize = 5 * 1024 * 1024;

/// S3 storage implementation
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    key_prefix: Option<String>,
    buffer_size: usize,
    stream_prefix: Option<String>,
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// # Arguments
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    /// * `key_prefix` - Optional prefix prepended to every key inside the bucket
    /// * `buffer_size` - Streaming read buffer size in bytes
    /// * `stream_prefix` - Optional prefix for externally resolvable references
    pub async fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
        key_prefix: Option<String>,
        buffer_size: usize,
        stream_prefix: Option<String>,
    ) -> StorageResult<Self> {
        let region_provider = RegionProviderChain::first_try(aws_config::Region::new(region));

        let retry_config = RetryConfig::standard()
            .with_max_attempts(5)
            .with_retry_mode(RetryMode::Adaptive);

        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .retry_config(retry_config.clone())
            .load()
            .await;

        let client = if let Some(ref endpoint) = endpoint_url {
            // S3-compatible providers need a custom endpoint and path-style
            // addressing (MinIO, DigitalOcean Spaces, etc.)
            let mut builder = aws_sdk_s3::Config::builder()
                .endpoint_url(endpoint)
                .region(config.region().cloned())
                .retry_config(retry_config)
                .force_path_style(true);
            if let Some(provider) = config.credentials_provider().into_iter().next() {
                builder = builder.credentials_provider(provider);
            }
            Client::from_conf(builder.build())
        } else {
            Client::new(&config)
        };

        Ok(S3Storage {
            client,
            bucket,
            key_prefix,
            buffer_size,
            stream_prefix,
        })
    }

    /// Absolute object key inside the bucket.
    fn full_key(&self, key: &str) -> String {
        match self.key_prefix.as_deref() {
            Some(prefix) if !prefix.is_empty() => {
                format!("{}/{}", prefix.trim_end_matches('/'), key)
            }
            _ => key.to_string(),
        }
    }

    fn handle(&self, key: String, full_key: String, size: u64, content_type: Option<String>) -> FileHandle {
        FileHandle::new(
            key,
            size,
            content_type,
            FileSource::S3 {
                client: self.client.clone(),
                bucket: self.bucket.clone(),
                key: full_key,
            },
        )
    }

    async fn put_buffered(
        &self,
        full_key: &str,
        content_type: Option<&str>,
        mut reader: ByteReader,
        expected_size: u64,
    ) -> StorageResult<u64> {
        let mut buffer = Vec::with_capacity(expected_size as usize);
        let mut chunk = vec![0u8; self.buffer_size.max(1)];

        loop {
            let n = reader.read(&mut chunk).await.map_err(|e| {
                StorageError::ReadFailed(format!("Failed to read from source: {}", e))
            })?;
            if n == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..n]);
        }

        let size = buffer.len() as u64;
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(full_key)
            .body(ByteStream::from(Bytes::from(buffer)));
        if let Some(ct) = content_type {
            request = request.content_type(ct);
        }

        request.send().await.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %full_key,
                size_bytes = size,
                "S3 upload failed"
            );
            StorageError::WriteFailed(e.to_string())
        })?;

        Ok(size)
    }

    async fn put_multipart(
        &self,
        full_key: &str,
        content_type: Option<&str>,
        mut reader: ByteReader,
    ) -> StorageResult<u64> {
        let mut create = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(full_key);
        if let Some(ct) = content_type {
            create = create.content_type(ct);
        }

        let create_result = create.send().await.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %full_key,
                "Failed to create multipart upload"
            );
            StorageError::WriteFailed(e.to_string())
        })?;

        let upload_id = create_result
            .upload_id()
            .ok_or_else(|| StorageError::WriteFailed("No upload ID returned from S3".to_string()))?
            .to_string();

        let mut part_number = 1i32;
        let mut parts = Vec::new();
        let mut part_buffer = vec![0u8; PART_SIZE];
        let mut total_size = 0u64;

        loop {
            // Fill a full part before shipping it; the last part may be short.
            let mut bytes_in_part = 0usize;
            while bytes_in_part < PART_SIZE {
                let n = reader
                    .read(&mut part_buffer[bytes_in_part..])
                    .await
                    .map_err(|e| {
                        StorageError::ReadFailed(format!("Failed to read from source: {}", e))
                    })?;
                if n == 0 {
                    break;
                }
                bytes_in_part += n;
            }

            if bytes_in_part == 0 {
                break;
            }
            total_size += bytes_in_part as u64;

            let part_body = ByteStream::from(Bytes::from(part_buffer[..bytes_in_part].to_vec()));

            let upload_part_result = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(full_key)
                .upload_id(&upload_id)
                .part_number(part_number)
                .body(part_body)
                .send()
                .await
                .map_err(|e| {
                    tracing::error!(
                        error = %e,
                        bucket = %self.bucket,
                        key = %full_key,
                        part_number,
                        "Failed to upload part"
                    );
                    StorageError::WriteFailed(e.to_string())
                })?;

            let etag = upload_part_result
                .e_tag()
                .ok_or_else(|| {
                    StorageError::WriteFailed(format!("No ETag returned for part {}", part_number))
                })?
                .to_string();

            parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(etag)
                    .build(),
            );
            part_number += 1;

            if bytes_in_part < PART_SIZE {
                break;
            }
        }

        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(full_key)
            .upload_id(&upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %full_key,
                    "Failed to complete multipart upload"
                );
                StorageError::WriteFailed(e.to_string())
            })?;

        Ok(total_size)
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn upload(
        &self,
        file: FileHandle,
        name: &str,
        path: Option<&str>,
    ) -> StorageResult<FileHandle> {
        let key = keys::join_key(path, name);
        if !keys::validate_key(&key) {
            return Err(StorageError::InvalidKey(key));
        }
        let full_key = self.full_key(&key);
        let start = std::time::Instant::now();

        // Same-bucket source: server-side copy, then delete the source. The
        // observable result is identical to streaming copy-then-delete.
        if let FileSource::S3 {
            bucket: src_bucket,
            key: src_key,
            ..
        } = file.source()
        {
            if src_bucket == &self.bucket {
                let encoded = urlencoding::encode(src_key);
                let copy_source = format!("{}/{}", self.bucket, encoded);

                self.client
                    .copy_object()
                    .bucket(&self.bucket)
                    .copy_source(copy_source)
                    .key(&full_key)
                    .send()
                    .await
                    .map_err(|e| StorageError::WriteFailed(e.to_string()))?;

                let size = file.size();
                let content_type = file.content_type().map(str::to_string);
                file.into_source().discard().await?;

                tracing::info!(
                    bucket = %self.bucket,
                    key = %full_key,
                    size_bytes = size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 move successful"
                );

                return Ok(self.handle(key, full_key, size, content_type));
            }
        }

        let content_type = file.content_type().map(str::to_string);
        let reader = file.open().await?;

        let size = if file.size() > MULTIPART_THRESHOLD {
            self.put_multipart(&full_key, content_type.as_deref(), reader)
                .await?
        } else {
            self.put_buffered(&full_key, content_type.as_deref(), reader, file.size())
                .await?
        };

        file.into_source().discard().await?;

        tracing::info!(
            bucket = %self.bucket,
            key = %full_key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok(self.handle(key, full_key, size, content_type))
    }

    async fn get_files(&self, prefix: &str) -> StorageResult<Vec<FileHandle>> {
        // An empty prefix enumerates the whole bucket (or key-prefix scope).
        let full_prefix = self.full_key(prefix);
        let full_prefix = full_prefix.trim_matches('/');
        let list_prefix = (!full_prefix.is_empty()).then(|| format!("{}/", full_prefix));

        let mut handles = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .set_prefix(list_prefix.clone());
            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| StorageError::ReadFailed(e.to_string()))?;

            for object in response.contents() {
                let Some(full_key) = object.key() else {
                    continue;
                };
                let key = match self.key_prefix.as_deref() {
                    Some(p) => keys::strip_prefix(full_key, p).to_string(),
                    None => full_key.to_string(),
                };
                let size = object.size().unwrap_or(0).max(0) as u64;
                let content_type = guess_content_type(&key);
                handles.push(self.handle(key, full_key.to_string(), size, content_type));
            }

            match response.next_continuation_token() {
                Some(token) => continuation_token = Some(token.to_string()),
                None => break,
            }
        }

        Ok(handles)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        if !keys::validate_key(key) {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        let full_key = self.full_key(key);

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %full_key,
                    "S3 delete failed"
                );
                StorageError::DeleteFailed(e.to_string())
            })?;

        Ok(())
    }

    async fn open_read(&self, key: &str) -> StorageResult<ByteReader> {
        if !keys::validate_key(key) {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        let full_key = self.full_key(key);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .send()
            .await
            .map_err(|e| match &e {
                SdkError::ServiceError(service_err) => match service_err.err() {
                    GetObjectError::NoSuchKey(_) => StorageError::NotFound(key.to_string()),
                    _ => StorageError::ReadFailed(e.to_string()),
                },
                _ => StorageError::ReadFailed(e.to_string()),
            })?;

        Ok(Box::pin(response.body.into_async_read()))
    }

    fn kind(&self) -> StorageKind {
        StorageKind::S3
    }

    fn stream_prefix(&self) -> Option<&str> {
        self.stream_prefix.as_deref()
    }
}
