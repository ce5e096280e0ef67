//! S3 uploader on the AWS SDK.
//!
//! The engine is synchronous, so the uploader owns a small current-thread
//! tokio runtime and blocks on each SDK call. Files from
//! [`MULTIPART_THRESHOLD`] up are sent as a multipart upload, which is
//! aborted when any part fails.

use std::fmt;
use std::fs;
use std::path::Path;
use std::thread;

use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::{ByteStream, Length};
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use deid_engine::{UploadError, Uploader};
use deid_model::RemoteObject;
use tokio::runtime::{Builder, Runtime};

use crate::error::ExternalError;
use crate::retry::{RetryPolicy, retry_with_backoff};

const MIB: u64 = 1024 * 1024;

/// Files of at least this many bytes are uploaded in parts.
pub const MULTIPART_THRESHOLD: u64 = 8 * MIB;

/// Smallest part size; S3 rejects non-final parts under 5 MiB.
const MIN_PART_SIZE: u64 = 8 * MIB;

/// S3 limit on parts per upload.
const MAX_PARTS: u64 = 10_000;

/// One byte range of a multipart upload. Part numbers start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PartRange {
    number: i32,
    offset: u64,
    length: u64,
}

/// Split `size` bytes into at most [`MAX_PARTS`] parts of at least
/// [`MIN_PART_SIZE`], the last one taking the remainder.
fn plan_parts(size: u64) -> Vec<PartRange> {
    let part_size = size.div_ceil(MAX_PARTS).max(MIN_PART_SIZE);
    let mut parts = Vec::new();
    let mut offset = 0;
    let mut number = 1;
    while offset < size {
        let length = part_size.min(size - offset);
        parts.push(PartRange {
            number,
            offset,
            length,
        });
        offset += length;
        number += 1;
    }
    parts
}

pub struct S3Uploader {
    client: Client,
    runtime: Runtime,
    retry: RetryPolicy,
}

impl fmt::Debug for S3Uploader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Uploader")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl S3Uploader {
    /// Load credentials and region from the standard AWS sources, with an
    /// optional region override.
    pub fn connect(region: Option<&str>) -> Result<Self, ExternalError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ExternalError::Runtime)?;
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        let sdk_config = runtime.block_on(loader.load());
        tracing::debug!(region = ?sdk_config.region(), "S3 client configured");
        Ok(Self {
            client: Client::new(&sdk_config),
            runtime,
            retry: RetryPolicy::default(),
        })
    }

    fn put_once(&self, local: &Path, bucket: &str, key: &str) -> Result<(), String> {
        let size = fs::metadata(local)
            .map_err(|err| format!("failed to stat {}: {err}", local.display()))?
            .len();
        if size >= MULTIPART_THRESHOLD {
            return self.put_multipart(local, bucket, key, size);
        }
        self.runtime.block_on(async {
            let body = ByteStream::from_path(local)
                .await
                .map_err(|err| err.to_string())?;
            self.client
                .put_object()
                .bucket(bucket)
                .key(key)
                .body(body)
                .send()
                .await
                .map_err(|err| DisplayErrorContext(err).to_string())?;
            Ok(())
        })
    }

    fn put_multipart(
        &self,
        local: &Path,
        bucket: &str,
        key: &str,
        size: u64,
    ) -> Result<(), String> {
        self.runtime.block_on(async {
            let created = self
                .client
                .create_multipart_upload()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map_err(|err| DisplayErrorContext(err).to_string())?;
            let upload_id = created
                .upload_id()
                .ok_or_else(|| "S3 returned no multipart upload id".to_string())?;

            let result = self.send_parts(local, bucket, key, upload_id, size).await;
            if let Err(message) = &result {
                tracing::warn!(bucket, key, error = %message, "aborting multipart upload");
                let abort = self
                    .client
                    .abort_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(upload_id)
                    .send()
                    .await;
                if let Err(err) = abort {
                    tracing::warn!(
                        bucket,
                        key,
                        error = %DisplayErrorContext(err),
                        "multipart abort failed"
                    );
                }
            }
            result
        })
    }

    async fn send_parts(
        &self,
        local: &Path,
        bucket: &str,
        key: &str,
        upload_id: &str,
        size: u64,
    ) -> Result<(), String> {
        let parts = plan_parts(size);
        tracing::debug!(bucket, key, parts = parts.len(), size, "multipart upload");
        let mut completed = Vec::with_capacity(parts.len());
        for part in parts {
            let body = ByteStream::read_from()
                .path(local)
                .offset(part.offset)
                .length(Length::Exact(part.length))
                .build()
                .await
                .map_err(|err| err.to_string())?;
            let uploaded = self
                .client
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part.number)
                .body(body)
                .send()
                .await
                .map_err(|err| DisplayErrorContext(err).to_string())?;
            let e_tag = uploaded
                .e_tag()
                .ok_or_else(|| format!("S3 returned no ETag for part {}", part.number))?;
            completed.push(
                CompletedPart::builder()
                    .part_number(part.number)
                    .e_tag(e_tag)
                    .build(),
            );
        }
        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(|err| DisplayErrorContext(err).to_string())?;
        Ok(())
    }
}

impl Uploader for S3Uploader {
    fn put(&self, local: &Path, bucket: &str, key: &str) -> Result<RemoteObject, UploadError> {
        if !local.is_file() {
            return Err(UploadError::Local {
                path: local.to_path_buf(),
                message: "not a file".to_string(),
            });
        }
        tracing::info!(bucket, key, "uploading to S3");
        retry_with_backoff(
            self.retry,
            "s3 put",
            || self.put_once(local, bucket, key),
            thread::sleep,
        )
        .map_err(|(attempts, message)| UploadError::Put {
            bucket: bucket.to_string(),
            key: key.to_string(),
            attempts,
            message,
        })?;
        Ok(RemoteObject::new(bucket, key))
    }

    fn exists(&self, bucket: &str, key: &str) -> Result<bool, UploadError> {
        let result = self
            .runtime
            .block_on(self.client.head_object().bucket(bucket).key(key).send());
        match result {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(false),
            Err(err) => Err(UploadError::Lookup {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: DisplayErrorContext(err).to_string(),
            }),
        }
    }
}
