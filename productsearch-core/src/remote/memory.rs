//! In-memory catalog, annotator and bucket.
//!
//! Mirrors the observable behavior of the hosted services closely enough to
//! exercise the handle types offline: resource names, not-found and
//! already-exists errors, cascading product deletion, and index freshness
//! (a product only becomes searchable in a set once the set has been indexed
//! after the product was added, see [`InMemoryBackend::mark_indexed`]).

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::{
    BlobStore, BoundingPoly, GroupedResultRecord, ImageAnnotator, ObjectAnnotation,
    ProductCatalog, ProductRecord, ProductSearchParams, ProductSearchResults, ProductSetRecord,
    ReferenceImageRecord, SearchImage, SearchResultRecord,
};
use crate::error::{ProductSearchError, Result};

/// Confidence reported for the single detected object of every search.
const DEFAULT_OBJECT_CONFIDENCE: f32 = 0.9;

#[derive(Debug, Clone)]
struct StoredBlob {
    bytes: Vec<u8>,
    content_type: String,
    public: bool,
}

#[derive(Debug, Default)]
struct State {
    products: BTreeMap<String, ProductRecord>,
    product_sets: BTreeMap<String, ProductSetRecord>,
    /// Product set name -> (product name -> time it was added).
    members: BTreeMap<String, BTreeMap<String, DateTime<Utc>>>,
    reference_images: BTreeMap<String, ReferenceImageRecord>,
    blobs: BTreeMap<String, StoredBlob>,
}

/// A blob as held by [`InMemoryBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobSnapshot {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub public: bool,
}

/// In-memory implementation of every remote collaborator.
pub struct InMemoryBackend {
    bucket: String,
    object_label: String,
    object_confidence: f32,
    state: Mutex<State>,
}

impl InMemoryBackend {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            object_label: "Object".to_string(),
            object_confidence: DEFAULT_OBJECT_CONFIDENCE,
            state: Mutex::new(State::default()),
        }
    }

    /// Label and confidence reported for the detected object in grouped results.
    pub fn with_detected_object(mut self, label: impl Into<String>, confidence: f32) -> Self {
        self.object_label = label.into();
        self.object_confidence = confidence;
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rebuild every product set's index, making current members searchable.
    pub fn mark_indexed(&self) {
        let now = Utc::now();
        let mut state = self.state();
        for set in state.product_sets.values_mut() {
            set.index_time = Some(now);
        }
        debug!(sets = state.product_sets.len(), "Indexed product sets");
    }

    pub fn blob(&self, key: &str) -> Option<BlobSnapshot> {
        self.state().blobs.get(key).map(|b| BlobSnapshot {
            bytes: b.bytes.clone(),
            content_type: b.content_type.clone(),
            public: b.public,
        })
    }

    pub fn blob_count(&self) -> usize {
        self.state().blobs.len()
    }
}

fn invalid(message: impl Into<String>) -> ProductSearchError {
    ProductSearchError::Api {
        status: 400,
        message: message.into(),
    }
}

fn already_exists(name: &str) -> ProductSearchError {
    ProductSearchError::Api {
        status: 409,
        message: format!("{name} already exists"),
    }
}

fn check_id(kind: &str, id: &str) -> Result<()> {
    if id.is_empty() || id.contains('/') || id.chars().count() > 128 {
        return Err(invalid(format!("Invalid {kind} id: `{id}`")));
    }
    Ok(())
}

/// One `key=value` or `key=(a OR b)` clause of a search filter.
#[derive(Debug, PartialEq)]
struct FilterClause {
    key: String,
    values: Vec<String>,
}

/// Parse the service's label filter syntax: clauses joined by `AND`, each
/// either `key = value` or `key = (v1 OR v2)`.
fn parse_filter(filter: &str) -> Result<Vec<FilterClause>> {
    filter
        .split(" AND ")
        .map(str::trim)
        .filter(|clause| !clause.is_empty())
        .map(|clause| {
            let (key, value) = clause
                .split_once('=')
                .ok_or_else(|| invalid(format!("Invalid filter clause: `{clause}`")))?;
            let value = value.trim();
            let value = value
                .strip_prefix('(')
                .and_then(|v| v.strip_suffix(')'))
                .unwrap_or(value);
            Ok(FilterClause {
                key: key.trim().to_string(),
                values: value.split(" OR ").map(|v| v.trim().to_string()).collect(),
            })
        })
        .collect()
}

fn matches_filter(product: &ProductRecord, clauses: &[FilterClause]) -> bool {
    clauses.iter().all(|clause| {
        product
            .product_labels
            .iter()
            .any(|label| label.key == clause.key && clause.values.contains(&label.value))
    })
}

#[async_trait]
impl ProductCatalog for InMemoryBackend {
    async fn create_product(
        &self,
        parent: &str,
        product_id: &str,
        product: &ProductRecord,
    ) -> Result<ProductRecord> {
        check_id("product", product_id)?;
        let name = format!("{parent}/products/{product_id}");
        let mut state = self.state();
        if state.products.contains_key(&name) {
            return Err(already_exists(&name));
        }
        let record = ProductRecord {
            name: name.clone(),
            ..product.clone()
        };
        state.products.insert(name, record.clone());
        Ok(record)
    }

    async fn get_product(&self, name: &str) -> Result<ProductRecord> {
        self.state()
            .products
            .get(name)
            .cloned()
            .ok_or_else(|| ProductSearchError::not_found(name))
    }

    async fn list_products(&self, parent: &str) -> Result<Vec<ProductRecord>> {
        let prefix = format!("{parent}/products/");
        Ok(self
            .state()
            .products
            .values()
            .filter(|p| p.name.starts_with(&prefix))
            .cloned()
            .collect())
    }

    async fn delete_product(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        state
            .products
            .remove(name)
            .ok_or_else(|| ProductSearchError::not_found(name))?;
        for members in state.members.values_mut() {
            members.remove(name);
        }
        let image_prefix = format!("{name}/referenceImages/");
        state
            .reference_images
            .retain(|image_name, _| !image_name.starts_with(&image_prefix));
        Ok(())
    }

    async fn create_product_set(
        &self,
        parent: &str,
        product_set_id: &str,
        product_set: &ProductSetRecord,
    ) -> Result<ProductSetRecord> {
        check_id("product set", product_set_id)?;
        let name = format!("{parent}/productSets/{product_set_id}");
        let mut state = self.state();
        if state.product_sets.contains_key(&name) {
            return Err(already_exists(&name));
        }
        let record = ProductSetRecord {
            name: name.clone(),
            display_name: product_set.display_name.clone(),
            index_time: Some(DateTime::<Utc>::UNIX_EPOCH),
            index_error: None,
        };
        state.product_sets.insert(name.clone(), record.clone());
        state.members.insert(name, BTreeMap::new());
        Ok(record)
    }

    async fn get_product_set(&self, name: &str) -> Result<ProductSetRecord> {
        self.state()
            .product_sets
            .get(name)
            .cloned()
            .ok_or_else(|| ProductSearchError::not_found(name))
    }

    async fn list_product_sets(&self, parent: &str) -> Result<Vec<ProductSetRecord>> {
        let prefix = format!("{parent}/productSets/");
        Ok(self
            .state()
            .product_sets
            .values()
            .filter(|s| s.name.starts_with(&prefix))
            .cloned()
            .collect())
    }

    async fn delete_product_set(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        state
            .product_sets
            .remove(name)
            .ok_or_else(|| ProductSearchError::not_found(name))?;
        state.members.remove(name);
        Ok(())
    }

    async fn add_product_to_product_set(&self, product_set: &str, product: &str) -> Result<()> {
        let mut state = self.state();
        if !state.products.contains_key(product) {
            return Err(ProductSearchError::not_found(product));
        }
        let members = state
            .members
            .get_mut(product_set)
            .ok_or_else(|| ProductSearchError::not_found(product_set))?;
        members
            .entry(product.to_string())
            .or_insert_with(Utc::now);
        Ok(())
    }

    async fn remove_product_from_product_set(
        &self,
        product_set: &str,
        product: &str,
    ) -> Result<()> {
        let mut state = self.state();
        let members = state
            .members
            .get_mut(product_set)
            .ok_or_else(|| ProductSearchError::not_found(product_set))?;
        members.remove(product);
        Ok(())
    }

    async fn list_products_in_product_set(&self, product_set: &str) -> Result<Vec<ProductRecord>> {
        let state = self.state();
        let members = state
            .members
            .get(product_set)
            .ok_or_else(|| ProductSearchError::not_found(product_set))?;
        Ok(members
            .keys()
            .filter_map(|name| state.products.get(name).cloned())
            .collect())
    }

    async fn create_reference_image(
        &self,
        product: &str,
        reference_image_id: &str,
        reference_image: &ReferenceImageRecord,
    ) -> Result<ReferenceImageRecord> {
        check_id("reference image", reference_image_id)?;
        if !reference_image.uri.starts_with("gs://") {
            return Err(invalid(format!(
                "Reference image URI must be a gs:// URI, got `{}`",
                reference_image.uri
            )));
        }
        let name = format!("{product}/referenceImages/{reference_image_id}");
        let mut state = self.state();
        if !state.products.contains_key(product) {
            return Err(ProductSearchError::not_found(product));
        }
        if state.reference_images.contains_key(&name) {
            return Err(already_exists(&name));
        }
        let record = ReferenceImageRecord {
            name: name.clone(),
            ..reference_image.clone()
        };
        state.reference_images.insert(name, record.clone());
        Ok(record)
    }

    async fn get_reference_image(&self, name: &str) -> Result<ReferenceImageRecord> {
        self.state()
            .reference_images
            .get(name)
            .cloned()
            .ok_or_else(|| ProductSearchError::not_found(name))
    }

    async fn list_reference_images(&self, product: &str) -> Result<Vec<ReferenceImageRecord>> {
        let state = self.state();
        if !state.products.contains_key(product) {
            return Err(ProductSearchError::not_found(product));
        }
        let prefix = format!("{product}/referenceImages/");
        Ok(state
            .reference_images
            .values()
            .filter(|r| r.name.starts_with(&prefix))
            .cloned()
            .collect())
    }

    async fn delete_reference_image(&self, name: &str) -> Result<()> {
        self.state()
            .reference_images
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ProductSearchError::not_found(name))
    }
}

#[async_trait]
impl ImageAnnotator for InMemoryBackend {
    async fn product_search(
        &self,
        image: &SearchImage,
        params: &ProductSearchParams,
    ) -> Result<ProductSearchResults> {
        if let SearchImage::Content(bytes) = image {
            if bytes.is_empty() {
                return Err(invalid("Image content is empty"));
            }
        }
        let clauses = match params.filter.as_deref() {
            Some(filter) => parse_filter(filter)?,
            None => Vec::new(),
        };

        let state = self.state();
        let set = state
            .product_sets
            .get(&params.product_set)
            .ok_or_else(|| ProductSearchError::not_found(&params.product_set))?;
        let index_time = set.index_time.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let members = state
            .members
            .get(&params.product_set)
            .ok_or_else(|| ProductSearchError::not_found(&params.product_set))?;

        let results: Vec<SearchResultRecord> = members
            .iter()
            .filter(|(_, added_at)| **added_at <= index_time)
            .filter_map(|(name, _)| state.products.get(name))
            .filter(|p| params.product_categories.contains(&p.product_category))
            .filter(|p| matches_filter(p, &clauses))
            .filter_map(|p| {
                let prefix = format!("{}/referenceImages/", p.name);
                state
                    .reference_images
                    .keys()
                    .find(|image| image.starts_with(&prefix))
                    .map(|image| (p, image))
            })
            .enumerate()
            .map(|(rank, (product, image))| SearchResultRecord {
                product: product.clone(),
                score: (1.0 - 0.1 * rank as f32).max(0.1),
                image: image.clone(),
            })
            .collect();

        let grouped = GroupedResultRecord {
            bounding_poly: BoundingPoly::normalized([(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]),
            results: results.clone(),
            object_annotations: vec![ObjectAnnotation {
                name: self.object_label.clone(),
                score: self.object_confidence,
                ..Default::default()
            }],
        };

        Ok(ProductSearchResults {
            index_time: Some(index_time),
            results,
            product_grouped_results: vec![grouped],
        })
    }
}

#[async_trait]
impl BlobStore for InMemoryBackend {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        self.state().blobs.insert(
            key.to_string(),
            StoredBlob {
                bytes,
                content_type: content_type.to_string(),
                public: false,
            },
        );
        Ok(())
    }

    async fn make_public(&self, key: &str) -> Result<()> {
        let mut state = self.state();
        let blob = state
            .blobs
            .get_mut(key)
            .ok_or_else(|| ProductSearchError::not_found(key))?;
        blob.public = true;
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("memory://{}/{}", self.bucket, key)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.state()
            .blobs
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| ProductSearchError::not_found(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::ProductCategory;
    use crate::remote::KeyValue;

    const PARENT: &str = "projects/p/locations/us-west1";

    fn product(category: ProductCategory, labels: &[(&str, &str)]) -> ProductRecord {
        ProductRecord {
            name: String::new(),
            display_name: "item".into(),
            description: None,
            product_category: category,
            product_labels: labels
                .iter()
                .map(|(k, v)| KeyValue {
                    key: k.to_string(),
                    value: v.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_parse_filter() {
        let clauses = parse_filter("color = (red OR blue) AND style=kids").unwrap();
        assert_eq!(
            clauses,
            vec![
                FilterClause {
                    key: "color".into(),
                    values: vec!["red".into(), "blue".into()],
                },
                FilterClause {
                    key: "style".into(),
                    values: vec!["kids".into()],
                },
            ]
        );
        assert!(parse_filter("color red").is_err());
    }

    #[test]
    fn test_matches_filter() {
        let p = product(ProductCategory::Apparel, &[("color", "red"), ("style", "kids")]);
        assert!(matches_filter(&p, &parse_filter("color=red").unwrap()));
        assert!(matches_filter(&p, &parse_filter("color=(blue OR red) AND style=kids").unwrap()));
        assert!(!matches_filter(&p, &parse_filter("color=blue").unwrap()));
    }

    #[tokio::test]
    async fn test_duplicate_product_is_rejected() {
        let backend = InMemoryBackend::new("bucket");
        let record = product(ProductCategory::Toys, &[]);
        backend.create_product(PARENT, "robot", &record).await.unwrap();
        let err = backend
            .create_product(PARENT, "robot", &record)
            .await
            .unwrap_err();
        assert!(matches!(err, ProductSearchError::Api { status: 409, .. }));
    }

    #[tokio::test]
    async fn test_delete_product_cascades() {
        let backend = InMemoryBackend::new("bucket");
        let p = backend
            .create_product(PARENT, "robot", &product(ProductCategory::Toys, &[]))
            .await
            .unwrap();
        let set = backend
            .create_product_set(PARENT, "toys", &ProductSetRecord::default())
            .await
            .unwrap();
        backend
            .add_product_to_product_set(&set.name, &p.name)
            .await
            .unwrap();
        backend
            .create_reference_image(
                &p.name,
                "img1",
                &ReferenceImageRecord {
                    uri: "gs://bucket/img1".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        backend.delete_product(&p.name).await.unwrap();

        assert!(backend
            .list_products_in_product_set(&set.name)
            .await
            .unwrap()
            .is_empty());
        assert!(backend
            .get_reference_image(&format!("{}/referenceImages/img1", p.name))
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_search_requires_fresh_index() {
        let backend = InMemoryBackend::new("bucket");
        let p = backend
            .create_product(PARENT, "robot", &product(ProductCategory::Toys, &[]))
            .await
            .unwrap();
        let set = backend
            .create_product_set(PARENT, "toys", &ProductSetRecord::default())
            .await
            .unwrap();
        backend
            .add_product_to_product_set(&set.name, &p.name)
            .await
            .unwrap();
        backend
            .create_reference_image(
                &p.name,
                "img1",
                &ReferenceImageRecord {
                    uri: "gs://bucket/img1".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let params = ProductSearchParams {
            product_set: set.name.clone(),
            product_categories: vec![ProductCategory::Toys],
            filter: None,
        };
        let image = SearchImage::Uri("gs://bucket/query.jpg".into());

        let before = backend.product_search(&image, &params).await.unwrap();
        assert!(before.results.is_empty());

        backend.mark_indexed();
        let after = backend.product_search(&image, &params).await.unwrap();
        assert_eq!(after.results.len(), 1);
        assert_eq!(after.results[0].product.name, p.name);
        assert!(after.results[0].image.ends_with("/referenceImages/img1"));
    }

    #[tokio::test]
    async fn test_blob_lifecycle() {
        let backend = InMemoryBackend::new("bucket");
        backend
            .upload("prefix/a", b"bytes".to_vec(), "image/jpeg")
            .await
            .unwrap();
        assert!(!backend.blob("prefix/a").unwrap().public);

        backend.make_public("prefix/a").await.unwrap();
        assert!(backend.blob("prefix/a").unwrap().public);
        assert_eq!(backend.public_url("prefix/a"), "memory://bucket/prefix/a");

        backend.delete("prefix/a").await.unwrap();
        assert!(backend.delete("prefix/a").await.unwrap_err().is_not_found());
    }
}
