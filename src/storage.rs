// src/storage.rs

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;

use crate::error::ToolError;
use crate::models::ANONYMOUS_OWNER;

/// Shared namespace for artifacts nobody asked to keep. The bucket's
/// lifecycle rules expire it after a day.
pub const TEMP_PREFIX: &str = "temp";

#[derive(Debug, Clone)]
pub struct ArtifactMeta {
    pub owner: Option<String>,
    pub tool: String,
    pub name: String,
    pub content_type: String,
    pub temporary: bool,
}

#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub key: String,
    pub url: String,
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Uploads `bytes` and returns the key together with a fresh signed URL.
    async fn put(&self, bytes: Vec<u8>, meta: &ArtifactMeta) -> Result<StoredArtifact, ToolError>;

    async fn signed_url(&self, key: &str, expires_in: Duration) -> Result<String, ToolError>;

    /// Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), ToolError>;
}

// Replaces everything outside [A-Za-z0-9.-]
pub fn sanitize(file_name: &str) -> String {
    file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// `temp/<name>` for temporary or anonymous artifacts, otherwise
/// `<tool>/<owner>/<name>`.
pub fn artifact_key(owner: Option<&str>, tool: &str, name: &str, temporary: bool) -> String {
    let name = sanitize(name);
    match owner {
        Some(owner) if !temporary && owner != ANONYMOUS_OWNER => {
            format!("{}/{}/{}", tool, owner, name)
        }
        _ => format!("{}/{}", TEMP_PREFIX, name),
    }
}

pub fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "application/pdf" => "pdf",
        "text/plain" => "srt",
        _ => "bin",
    }
}

#[derive(Clone)]
pub struct S3ArtifactStore {
    client: S3Client,
    bucket: String,
    url_ttl: Duration,
}

impl S3ArtifactStore {
    pub fn new(client: S3Client, bucket: impl Into<String>, url_ttl: Duration) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            url_ttl,
        }
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    async fn put(&self, bytes: Vec<u8>, meta: &ArtifactMeta) -> Result<StoredArtifact, ToolError> {
        let key = artifact_key(meta.owner.as_deref(), &meta.tool, &meta.name, meta.temporary);
        let disposition = format!(
            "attachment; filename=\"{}.{}\"",
            sanitize(&meta.name),
            extension_for(&meta.content_type)
        );

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(&meta.content_type)
            .content_disposition(disposition)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| {
                log::error!("s3 put failed key={} err={}", key, e);
                ToolError::StorageWriteFailed(e.to_string())
            })?;

        let url = self
            .signed_url(&key, self.url_ttl)
            .await
            .map_err(|e| ToolError::StorageWriteFailed(e.to_string()))?;

        Ok(StoredArtifact { key, url })
    }

    async fn signed_url(&self, key: &str, expires_in: Duration) -> Result<String, ToolError> {
        let presign = PresigningConfig::expires_in(expires_in)
            .map_err(|e| ToolError::Internal(format!("presigning config: {e}")))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign)
            .await
            .map_err(|e| {
                log::error!("s3 presign failed key={} err={}", key, e);
                ToolError::Internal(e.to_string())
            })?;

        Ok(request.uri().to_string())
    }

    async fn delete(&self, key: &str) -> Result<(), ToolError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                log::error!("s3 delete failed key={} err={}", key, e);
                ToolError::Internal(e.to_string())
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_only_safe_characters() {
        assert_eq!(sanitize("My scan (1).pdf"), "My_scan__1_.pdf");
        assert_eq!(sanitize("../etc/passwd"), ".._etc_passwd");
        assert_eq!(sanitize("résumé-2024"), "r_sum_-2024");
    }

    #[test]
    fn permanent_artifacts_live_under_tool_and_owner() {
        assert_eq!(
            artifact_key(Some("user_1"), "img-to-pdf", "Holiday photos", false),
            "img-to-pdf/user_1/Holiday_photos"
        );
    }

    #[test]
    fn temporary_and_anonymous_artifacts_share_temp_namespace() {
        assert_eq!(
            artifact_key(Some("user_1"), "img-to-pdf", "scan", true),
            "temp/scan"
        );
        assert_eq!(artifact_key(None, "pdf-signing", "contract", false), "temp/contract");
        assert_eq!(
            artifact_key(Some(ANONYMOUS_OWNER), "pdf-signing", "contract", false),
            "temp/contract"
        );
    }
}
