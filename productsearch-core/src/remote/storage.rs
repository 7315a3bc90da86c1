//! Cloud Storage bucket holding reference image bytes (JSON API).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::http_client::ApiHttpClient;
use super::BlobStore;
use crate::error::Result;

#[derive(Debug, Serialize)]
struct ObjectAccessControl<'a> {
    entity: &'a str,
    role: &'a str,
}

#[derive(Debug, Deserialize)]
struct Ignored {}

/// Percent-encode a key for use as one path segment (`/` becomes `%2F`).
fn encode_object_name(key: &str) -> String {
    urlencoding::encode(key).into_owned()
}

/// Percent-encode each segment of a key, keeping `/` separators.
fn encode_object_path(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Blob store backed by a single Cloud Storage bucket.
pub struct GcsBlobStore {
    http: ApiHttpClient,
    base_url: String,
    bucket: String,
}

impl GcsBlobStore {
    pub fn new(http: ApiHttpClient, base_url: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/o/{}",
            self.base_url,
            self.bucket,
            encode_object_name(key)
        )
    }

    fn upload_url(&self) -> String {
        format!("{}/upload/storage/v1/b/{}/o", self.base_url, self.bucket)
    }
}

#[async_trait]
impl BlobStore for GcsBlobStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    #[instrument(level = "debug", skip(self, bytes), fields(bucket = %self.bucket, size = bytes.len()))]
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        self.http
            .post_bytes(
                &self.upload_url(),
                &[("uploadType", "media"), ("name", key)],
                bytes,
                content_type,
            )
            .await?;
        debug!(key, "Uploaded blob");
        Ok(())
    }

    #[instrument(level = "debug", skip(self), fields(bucket = %self.bucket))]
    async fn make_public(&self, key: &str) -> Result<()> {
        let url = format!("{}/acl", self.object_url(key));
        let acl = ObjectAccessControl {
            entity: "allUsers",
            role: "READER",
        };
        let _: Ignored = self.http.post_json(&url, &[], &acl).await?;
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            self.bucket,
            encode_object_path(key)
        )
    }

    #[instrument(level = "debug", skip(self), fields(bucket = %self.bucket))]
    async fn delete(&self, key: &str) -> Result<()> {
        self.http.delete(&self.object_url(key)).await
    }
}
