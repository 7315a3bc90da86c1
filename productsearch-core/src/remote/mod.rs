//! Remote collaborators.
//!
//! The product-search catalog, the image annotator and the blob store are
//! opaque services. This module defines the seams the handle types talk to:
//!
//! - [`ProductCatalog`] - products, product sets, membership, reference images
//! - [`ImageAnnotator`] - similarity search against an indexed set
//! - [`BlobStore`] - the bucket holding reference image bytes
//!
//! HTTP implementations live in `vision` and `storage` (feature `http`);
//! [`InMemoryBackend`] implements all three for tests and offline use.
//! Implementations must be thread-safe (`Send + Sync`) and must not retry:
//! every failure is returned to the caller unchanged.

#[cfg(feature = "http")]
mod http_client;
mod memory;
mod records;
#[cfg(feature = "http")]
mod storage;
#[cfg(feature = "http")]
mod vision;

#[cfg(feature = "http")]
pub use http_client::{ApiHttpClient, HttpConfig};
pub use memory::{BlobSnapshot, InMemoryBackend};
pub use records::{
    ApiStatus, BoundingPoly, GroupedResultRecord, KeyValue, NormalizedVertex, ObjectAnnotation,
    ProductRecord, ProductSearchParams, ProductSearchResults, ProductSetRecord,
    ReferenceImageRecord, SearchImage, SearchResultRecord, Vertex,
};
#[cfg(feature = "http")]
pub use storage::GcsBlobStore;
#[cfg(feature = "http")]
pub use vision::VisionClient;

use async_trait::async_trait;

use crate::error::Result;

/// Resource management calls of the product-search service.
///
/// `parent` is a location path (`projects/{p}/locations/{l}`); every other
/// name is a full resource name as returned by the service.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn create_product(
        &self,
        parent: &str,
        product_id: &str,
        product: &ProductRecord,
    ) -> Result<ProductRecord>;

    async fn get_product(&self, name: &str) -> Result<ProductRecord>;

    /// All products under `parent`, across every result page.
    async fn list_products(&self, parent: &str) -> Result<Vec<ProductRecord>>;

    async fn delete_product(&self, name: &str) -> Result<()>;

    async fn create_product_set(
        &self,
        parent: &str,
        product_set_id: &str,
        product_set: &ProductSetRecord,
    ) -> Result<ProductSetRecord>;

    async fn get_product_set(&self, name: &str) -> Result<ProductSetRecord>;

    async fn list_product_sets(&self, parent: &str) -> Result<Vec<ProductSetRecord>>;

    async fn delete_product_set(&self, name: &str) -> Result<()>;

    async fn add_product_to_product_set(&self, product_set: &str, product: &str) -> Result<()>;

    async fn remove_product_from_product_set(&self, product_set: &str, product: &str)
        -> Result<()>;

    async fn list_products_in_product_set(&self, product_set: &str) -> Result<Vec<ProductRecord>>;

    async fn create_reference_image(
        &self,
        product: &str,
        reference_image_id: &str,
        reference_image: &ReferenceImageRecord,
    ) -> Result<ReferenceImageRecord>;

    async fn get_reference_image(&self, name: &str) -> Result<ReferenceImageRecord>;

    async fn list_reference_images(&self, product: &str) -> Result<Vec<ReferenceImageRecord>>;

    async fn delete_reference_image(&self, name: &str) -> Result<()>;
}

/// Similarity search against an indexed product set.
#[async_trait]
pub trait ImageAnnotator: Send + Sync {
    async fn product_search(
        &self,
        image: &SearchImage,
        params: &ProductSearchParams,
    ) -> Result<ProductSearchResults>;
}

/// A single bucket of binary blobs addressed by key.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Name of the bucket this store writes to.
    fn bucket(&self) -> &str;

    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;

    /// Grant anonymous read access to the blob.
    async fn make_public(&self, key: &str) -> Result<()>;

    /// URL an anonymous client can fetch the blob from once it is public.
    fn public_url(&self, key: &str) -> String;

    async fn delete(&self, key: &str) -> Result<()>;
}
