//! Product handles and their reference images.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::category::ProductCategory;
use crate::error::{ProductSearchError, Result};
use crate::lifecycle::{Lifecycle, ResourceKind};
use crate::remote::{BoundingPoly, KeyValue, ProductRecord, ReferenceImageRecord};
use crate::session::{resource_id, ProductSearch};

/// Content type used when the file extension is not a known image type.
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Parameters of a product to create.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    id: String,
    category: ProductCategory,
    display_name: Option<String>,
    description: Option<String>,
    labels: BTreeMap<String, String>,
}

impl NewProduct {
    pub fn new(id: impl Into<String>, category: ProductCategory) -> Self {
        Self {
            id: id.into(),
            category,
            display_name: None,
            description: None,
            labels: BTreeMap::new(),
        }
    }

    pub fn display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a label usable in search filters, e.g. `("type", "skirt")`.
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn labels<K, V>(mut self, labels: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.labels
            .extend(labels.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn to_record(&self) -> ProductRecord {
        ProductRecord {
            name: String::new(),
            display_name: self
                .display_name
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| self.id.clone()),
            description: self.description.clone().filter(|d| !d.is_empty()),
            product_category: self.category,
            product_labels: self
                .labels
                .iter()
                .map(|(key, value)| KeyValue {
                    key: key.clone(),
                    value: value.clone(),
                })
                .collect(),
        }
    }
}

/// Handle to a remote product.
#[derive(Debug, Clone, Serialize)]
pub struct Product {
    #[serde(skip)]
    session: ProductSearch,
    id: String,
    category: ProductCategory,
    display_name: String,
    labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(rename = "name")]
    resource_name: String,
    #[serde(skip)]
    lifecycle: Lifecycle,
}

impl Product {
    pub(crate) fn from_record(session: ProductSearch, record: ProductRecord) -> Self {
        let id = resource_id(&record.name).to_string();
        Self {
            session,
            id,
            category: record.product_category,
            display_name: record.display_name,
            labels: record
                .product_labels
                .into_iter()
                .map(|kv| (kv.key, kv.value))
                .collect(),
            description: record.description.filter(|d| !d.is_empty()),
            resource_name: record.name,
            lifecycle: Lifecycle::Active,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn category(&self) -> ProductCategory {
        self.category
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Full resource name, `projects/*/locations/*/products/{id}`.
    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    pub fn is_deleted(&self) -> bool {
        self.lifecycle.is_deleted()
    }

    pub(crate) fn ensure_active(&self) -> Result<()> {
        self.lifecycle.ensure_active(ResourceKind::Product, &self.id)
    }

    /// Delete the remote product. Fails if this handle already deleted it.
    #[instrument(level = "info", skip(self), fields(product_id = %self.id))]
    pub async fn delete(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.session
            .catalog()
            .delete_product(&self.resource_name)
            .await?;
        self.lifecycle = Lifecycle::Deleted;
        info!("Deleted product");
        Ok(())
    }

    /// Upload `path` to the bucket, publish it, and register it as a
    /// reference image of this product. Returns the reference image's
    /// resource name.
    #[instrument(level = "info", skip(self, path, bounding_polys), fields(
        product_id = %self.id,
        path = %path.as_ref().display(),
        polys = bounding_polys.len()
    ))]
    pub async fn add_reference_image(
        &self,
        path: impl AsRef<Path>,
        bounding_polys: &[BoundingPoly],
    ) -> Result<String> {
        self.ensure_active()?;
        let path = path.as_ref();

        let bytes = tokio::fs::read(path).await?;
        let token = Uuid::new_v4().to_string();
        let key = self.session.blob_key(&token);
        let blobs = self.session.blobs();

        blobs.upload(&key, bytes, content_type_for(path)).await?;
        blobs.make_public(&key).await?;
        debug!(key = %key, "Uploaded reference image blob");

        let reference = ReferenceImageRecord {
            name: String::new(),
            uri: format!("gs://{}/{}", blobs.bucket(), key),
            bounding_polys: bounding_polys.to_vec(),
        };
        let created = self
            .session
            .catalog()
            .create_reference_image(&self.resource_name, &token, &reference)
            .await?;

        info!(name = %created.name, "Registered reference image");
        Ok(created.name)
    }

    /// Resource names of every reference image of this product.
    #[instrument(level = "debug", skip(self), fields(product_id = %self.id))]
    pub async fn list_reference_images(&self) -> Result<Vec<String>> {
        self.ensure_active()?;
        let images = self
            .session
            .catalog()
            .list_reference_images(&self.resource_name)
            .await?;
        Ok(images.into_iter().map(|image| image.name).collect())
    }

    /// Public URL of the blob behind a reference image.
    ///
    /// `name` is either the bare image id or the full resource name of one
    /// of this product's reference images.
    #[instrument(level = "debug", skip(self), fields(product_id = %self.id))]
    pub async fn reference_image_url(&self, name: &str) -> Result<String> {
        self.ensure_active()?;
        let key = self.reference_blob_key(&self.reference_image_name(name)?).await?;
        Ok(self.session.blobs().public_url(&key))
    }

    /// Remove the reference image registration, then its blob.
    ///
    /// The two deletions are independent: if the blob deletion fails the
    /// registration is already gone and only the blob error is returned.
    #[instrument(level = "info", skip(self), fields(product_id = %self.id))]
    pub async fn delete_reference_image(&self, name: &str) -> Result<()> {
        self.ensure_active()?;
        let name = self.reference_image_name(name)?;
        let key = self.reference_blob_key(&name).await?;

        self.session.catalog().delete_reference_image(&name).await?;
        self.session.blobs().delete(&key).await?;

        info!(name = %name, key = %key, "Deleted reference image");
        Ok(())
    }

    /// Expand a bare image id to this product's reference image resource name.
    ///
    /// A full name must belong to this product; anything else with a `/` in
    /// it (a blob key, another product's image) is rejected before any I/O.
    fn reference_image_name(&self, name: &str) -> Result<String> {
        let prefix = format!("{}/referenceImages/", self.resource_name);
        if let Some(image_id) = name.strip_prefix(&prefix) {
            if !image_id.is_empty() && !image_id.contains('/') {
                return Ok(name.to_string());
            }
        } else if !name.is_empty() && !name.contains('/') {
            return Ok(format!("{prefix}{name}"));
        }
        Err(ProductSearchError::InvalidArgument(format!(
            "`{name}` is neither a reference image id nor a reference image of product `{}`",
            self.id
        )))
    }

    async fn reference_blob_key(&self, name: &str) -> Result<String> {
        let reference = self.session.catalog().get_reference_image(name).await?;
        blob_key_from_uri(&reference.uri).map(str::to_string)
    }
}

/// Object key of a `gs://bucket/key` URI.
pub(crate) fn blob_key_from_uri(uri: &str) -> Result<&str> {
    uri.strip_prefix("gs://")
        .and_then(|rest| rest.split_once('/'))
        .map(|(_, key)| key)
        .filter(|key| !key.is_empty())
        .ok_or_else(|| {
            ProductSearchError::InvalidResponse(format!(
                "Reference image URI is not a gs://bucket/key URI: `{uri}`"
            ))
        })
}

/// Guess an upload content type from the file extension.
fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|s| s.to_lowercase())
        .as_deref()
    {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("tif" | "tiff") => "image/tiff",
        Some("ico") => "image/x-icon",
        _ => DEFAULT_CONTENT_TYPE,
    }
}
