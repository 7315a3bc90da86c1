//! The session: configuration plus the remote collaborators every handle uses.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::config::SessionSettings;
#[cfg(feature = "http")]
use crate::config::SessionConfig;
use crate::error::{ProductSearchError, Result};
use crate::product::{NewProduct, Product};
use crate::product_set::ProductSet;
#[cfg(feature = "http")]
use crate::remote::{ApiHttpClient, GcsBlobStore, HttpConfig, VisionClient};
use crate::remote::{
    BlobStore, ImageAnnotator, InMemoryBackend, ProductCatalog, ProductSetRecord,
};
use crate::search::SearchGrouping;

/// Longest resource id the service accepts.
pub const MAX_RESOURCE_ID_LEN: usize = 128;

/// Reject ids the service would refuse, before any remote call.
pub(crate) fn validate_resource_id(kind: &str, id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(ProductSearchError::InvalidArgument(format!(
            "{kind} id must not be empty"
        )));
    }
    let len = id.chars().count();
    if len > MAX_RESOURCE_ID_LEN {
        return Err(ProductSearchError::InvalidArgument(format!(
            "{kind} id must be at most {MAX_RESOURCE_ID_LEN} characters, got {len}"
        )));
    }
    if id.contains('/') {
        return Err(ProductSearchError::InvalidArgument(format!(
            "{kind} id must not contain `/`: `{id}`"
        )));
    }
    Ok(())
}

struct SessionInner {
    settings: SessionSettings,
    location_path: String,
    catalog: Arc<dyn ProductCatalog>,
    annotator: Arc<dyn ImageAnnotator>,
    blobs: Arc<dyn BlobStore>,
}

/// Entry point for catalog operations.
///
/// Cheap to clone; every [`Product`] and [`ProductSet`] handle holds a clone
/// and reaches the remote services through it.
///
/// ```no_run
/// use productsearch_core::{NewProduct, ProductCategory, ProductSearch, SessionConfig};
///
/// # async fn example() -> productsearch_core::Result<()> {
/// let session = ProductSearch::connect(SessionConfig::from_env()?)?;
/// let product = session
///     .create_product(NewProduct::new("skirt-42", ProductCategory::Apparel).label("type", "skirt"))
///     .await?;
/// let image = product.add_reference_image("skirt.jpg", &[]).await?;
/// println!("registered {image}");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ProductSearch {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for ProductSearch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProductSearch")
            .field("location_path", &self.inner.location_path)
            .field("bucket", &self.inner.blobs.bucket())
            .field("storage_prefix", &self.inner.settings.storage_prefix)
            .field("grouping", &self.inner.settings.grouping)
            .finish()
    }
}

impl ProductSearch {
    /// Connect to the hosted Vision and Cloud Storage APIs.
    #[cfg(feature = "http")]
    #[instrument(level = "debug", skip_all, fields(
        project = %config.settings.project_id,
        location = %config.settings.location,
        bucket = %config.bucket
    ))]
    pub fn connect(config: SessionConfig) -> Result<Self> {
        config.validate()?;

        let http = ApiHttpClient::new(HttpConfig {
            access_token: config.access_token.clone(),
            timeout: config.timeout,
            // Plain HTTP endpoints are local emulators.
            https_only: config.vision_url.starts_with("https://")
                && config.storage_url.starts_with("https://"),
        })?;

        let vision = Arc::new(VisionClient::new(http.clone(), &config.vision_url));
        let blobs = Arc::new(GcsBlobStore::new(http, &config.storage_url, &config.bucket));

        info!("Product search session created");
        Ok(Self::with_backends(
            config.settings,
            vision.clone(),
            vision,
            blobs,
        ))
    }

    /// Build a session over explicit collaborators.
    pub fn with_backends(
        settings: SessionSettings,
        catalog: Arc<dyn ProductCatalog>,
        annotator: Arc<dyn ImageAnnotator>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        let location_path = format!(
            "projects/{}/locations/{}",
            settings.project_id, settings.location
        );
        Self {
            inner: Arc::new(SessionInner {
                settings,
                location_path,
                catalog,
                annotator,
                blobs,
            }),
        }
    }

    /// Build a session whose every collaborator is `backend`.
    pub fn in_memory(settings: SessionSettings, backend: Arc<InMemoryBackend>) -> Self {
        Self::with_backends(settings, backend.clone(), backend.clone(), backend)
    }

    pub fn project_id(&self) -> &str {
        &self.inner.settings.project_id
    }

    pub fn location(&self) -> &str {
        &self.inner.settings.location
    }

    /// `projects/{project}/locations/{location}`
    pub fn location_path(&self) -> &str {
        &self.inner.location_path
    }

    pub fn bucket(&self) -> &str {
        self.inner.blobs.bucket()
    }

    pub fn storage_prefix(&self) -> Option<&str> {
        self.inner.settings.storage_prefix.as_deref()
    }

    pub fn grouping(&self) -> SearchGrouping {
        self.inner.settings.grouping
    }

    pub fn product_path(&self, product_id: &str) -> String {
        format!("{}/products/{product_id}", self.inner.location_path)
    }

    pub fn product_set_path(&self, product_set_id: &str) -> String {
        format!("{}/productSets/{product_set_id}", self.inner.location_path)
    }

    /// Blob key for a reference image token, under the configured prefix.
    pub fn blob_key(&self, token: &str) -> String {
        match self.storage_prefix() {
            Some(prefix) => format!("{prefix}/{token}"),
            None => token.to_string(),
        }
    }

    pub(crate) fn catalog(&self) -> &dyn ProductCatalog {
        self.inner.catalog.as_ref()
    }

    pub(crate) fn annotator(&self) -> &dyn ImageAnnotator {
        self.inner.annotator.as_ref()
    }

    pub(crate) fn blobs(&self) -> &dyn BlobStore {
        self.inner.blobs.as_ref()
    }

    // Products

    /// Create a product. Display name defaults to the id.
    #[instrument(level = "info", skip_all, fields(product_id = %product.id()))]
    pub async fn create_product(&self, product: NewProduct) -> Result<Product> {
        validate_resource_id("product", product.id())?;

        let record = product.to_record();
        let created = self
            .catalog()
            .create_product(self.location_path(), product.id(), &record)
            .await?;

        info!(name = %created.name, "Created product");
        Ok(Product::from_record(self.clone(), created))
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn get_product(&self, product_id: &str) -> Result<Product> {
        validate_resource_id("product", product_id)?;
        let record = self
            .catalog()
            .get_product(&self.product_path(product_id))
            .await?;
        Ok(Product::from_record(self.clone(), record))
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn list_products(&self) -> Result<Vec<Product>> {
        let records = self.catalog().list_products(self.location_path()).await?;
        debug!(count = records.len(), "Listed products");
        Ok(records
            .into_iter()
            .map(|r| Product::from_record(self.clone(), r))
            .collect())
    }

    // Product sets

    /// Create a product set. Display name defaults to the id.
    #[instrument(level = "info", skip(self))]
    pub async fn create_product_set(
        &self,
        product_set_id: &str,
        display_name: Option<&str>,
    ) -> Result<ProductSet> {
        validate_resource_id("product set", product_set_id)?;

        let display_name = display_name
            .filter(|name| !name.is_empty())
            .unwrap_or(product_set_id);
        let record = ProductSetRecord {
            display_name: display_name.to_string(),
            ..Default::default()
        };
        let created = self
            .catalog()
            .create_product_set(self.location_path(), product_set_id, &record)
            .await?;

        info!(name = %created.name, "Created product set");
        Ok(ProductSet::from_record(self.clone(), created))
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn get_product_set(&self, product_set_id: &str) -> Result<ProductSet> {
        validate_resource_id("product set", product_set_id)?;
        let record = self
            .catalog()
            .get_product_set(&self.product_set_path(product_set_id))
            .await?;
        Ok(ProductSet::from_record(self.clone(), record))
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn list_product_sets(&self) -> Result<Vec<ProductSet>> {
        let records = self
            .catalog()
            .list_product_sets(self.location_path())
            .await?;
        debug!(count = records.len(), "Listed product sets");
        Ok(records
            .into_iter()
            .map(|r| ProductSet::from_record(self.clone(), r))
            .collect())
    }
}

/// Last segment of a resource name.
pub(crate) fn resource_id(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}
