//! Product set handles: membership and similarity search.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::lifecycle::{Lifecycle, ResourceKind};
use crate::product::Product;
use crate::remote::{ProductSearchParams, ProductSetRecord};
use crate::search::{shape_results, SearchQuery, SearchResults};
use crate::session::{resource_id, ProductSearch};

/// Handle to a remote product set.
#[derive(Debug, Clone, Serialize)]
pub struct ProductSet {
    #[serde(skip)]
    session: ProductSearch,
    id: String,
    display_name: String,
    #[serde(rename = "name")]
    resource_name: String,
    index_time: DateTime<Utc>,
    #[serde(skip)]
    lifecycle: Lifecycle,
}

impl ProductSet {
    pub(crate) fn from_record(session: ProductSearch, record: ProductSetRecord) -> Self {
        Self {
            session,
            id: resource_id(&record.name).to_string(),
            display_name: record.display_name,
            index_time: record.index_time.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            resource_name: record.name,
            lifecycle: Lifecycle::Active,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Full resource name, `projects/*/locations/*/productSets/{id}`.
    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    pub fn is_deleted(&self) -> bool {
        self.lifecycle.is_deleted()
    }

    /// Index time as of the last fetch of this set, without a remote call.
    pub fn cached_index_time(&self) -> DateTime<Utc> {
        self.index_time
    }

    fn ensure_active(&self) -> Result<()> {
        self.lifecycle
            .ensure_active(ResourceKind::ProductSet, &self.id)
    }

    /// Last time the service finished indexing this set.
    ///
    /// Products added after this instant do not appear in search results
    /// until the next index run. The epoch means "never indexed".
    #[instrument(level = "debug", skip(self), fields(product_set_id = %self.id))]
    pub async fn index_time(&mut self) -> Result<DateTime<Utc>> {
        self.ensure_active()?;
        let record = self
            .session
            .catalog()
            .get_product_set(&self.resource_name)
            .await?;
        if let Some(error) = record.index_error.as_ref().filter(|e| e.code != 0) {
            debug!(code = error.code, message = %error.message, "Last index run reported an error");
        }
        self.index_time = record.index_time.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        Ok(self.index_time)
    }

    /// Delete the remote set. Member products are not deleted.
    #[instrument(level = "info", skip(self), fields(product_set_id = %self.id))]
    pub async fn delete(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.session
            .catalog()
            .delete_product_set(&self.resource_name)
            .await?;
        self.lifecycle = Lifecycle::Deleted;
        info!("Deleted product set");
        Ok(())
    }

    #[instrument(level = "info", skip_all, fields(product_set_id = %self.id, product_id = %product.id()))]
    pub async fn add_product(&self, product: &Product) -> Result<()> {
        self.ensure_active()?;
        product.ensure_active()?;
        self.session
            .catalog()
            .add_product_to_product_set(&self.resource_name, product.resource_name())
            .await?;
        info!("Added product to set");
        Ok(())
    }

    #[instrument(level = "info", skip_all, fields(product_set_id = %self.id, product_id = %product.id()))]
    pub async fn remove_product(&self, product: &Product) -> Result<()> {
        self.ensure_active()?;
        product.ensure_active()?;
        self.session
            .catalog()
            .remove_product_from_product_set(&self.resource_name, product.resource_name())
            .await?;
        info!("Removed product from set");
        Ok(())
    }

    /// Current members of this set.
    #[instrument(level = "debug", skip(self), fields(product_set_id = %self.id))]
    pub async fn list_products(&self) -> Result<Vec<Product>> {
        self.ensure_active()?;
        let records = self
            .session
            .catalog()
            .list_products_in_product_set(&self.resource_name)
            .await?;
        debug!(count = records.len(), "Listed set members");
        Ok(records
            .into_iter()
            .map(|r| Product::from_record(self.session.clone(), r))
            .collect())
    }

    /// Search this set for products similar to the query image.
    ///
    /// Fails before any I/O when the handle is deleted or the query does not
    /// name exactly one image source.
    #[instrument(level = "info", skip_all, fields(
        product_set_id = %self.id,
        category = %query.category()
    ))]
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResults> {
        self.ensure_active()?;
        let source = query.image_source()?;
        let image = source.load().await?;

        let params = ProductSearchParams {
            product_set: self.resource_name.clone(),
            product_categories: vec![query.category()],
            filter: query.filter_expr().map(str::to_string),
        };
        let results = self
            .session
            .annotator()
            .product_search(&image, &params)
            .await?;

        let grouping = query
            .grouping_override()
            .unwrap_or_else(|| self.session.grouping());
        let shaped = shape_results(&self.session, results, grouping);
        info!(matches = shaped.matches().count(), "Search completed");
        Ok(shaped)
    }
}
