//! Resource shapes exchanged with the remote collaborators.
//!
//! Field names follow the service's JSON mapping (camelCase, zero values
//! omitted), so every field that may be absent carries a serde default.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::category::ProductCategory;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    /// Full resource name, assigned by the service.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub product_category: ProductCategory,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub product_labels: Vec<KeyValue>,
}

/// Status payload used by the service for per-item failures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiStatus {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSetRecord {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    /// Output only. Epoch when the set has never been indexed.
    #[serde(default, skip_serializing)]
    pub index_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing)]
    pub index_error: Option<ApiStatus>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedVertex {
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vertex {
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
}

/// Region of an image, in pixels or normalized to `[0, 1]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingPoly {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vertices: Vec<Vertex>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub normalized_vertices: Vec<NormalizedVertex>,
}

impl BoundingPoly {
    pub fn normalized(points: impl IntoIterator<Item = (f32, f32)>) -> Self {
        Self {
            vertices: Vec::new(),
            normalized_vertices: points
                .into_iter()
                .map(|(x, y)| NormalizedVertex { x, y })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceImageRecord {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub uri: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bounding_polys: Vec<BoundingPoly>,
}

/// Image payload of a similarity search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchImage {
    /// Raw image bytes sent inline.
    Content(Vec<u8>),
    /// Publicly reachable or `gs://` URI the service fetches itself.
    Uri(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSearchParams {
    /// Full resource name of the set to search in.
    pub product_set: String,
    pub product_categories: Vec<ProductCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResultRecord {
    pub product: ProductRecord,
    #[serde(default)]
    pub score: f32,
    /// Resource name of the reference image that matched.
    #[serde(default)]
    pub image: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectAnnotation {
    #[serde(default)]
    pub mid: String,
    #[serde(default)]
    pub language_code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub score: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedResultRecord {
    #[serde(default)]
    pub bounding_poly: BoundingPoly,
    #[serde(default)]
    pub results: Vec<SearchResultRecord>,
    #[serde(default)]
    pub object_annotations: Vec<ObjectAnnotation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSearchResults {
    #[serde(default)]
    pub index_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub results: Vec<SearchResultRecord>,
    #[serde(default)]
    pub product_grouped_results: Vec<GroupedResultRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_record_omits_empty_fields() {
        let record = ProductRecord {
            name: String::new(),
            display_name: "Blue skirt".into(),
            description: None,
            product_category: ProductCategory::Apparel,
            product_labels: vec![],
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "displayName": "Blue skirt",
                "productCategory": "apparel-v2"
            })
        );
    }

    #[test]
    fn test_product_set_record_parses_index_time() {
        let record: ProductSetRecord = serde_json::from_str(
            r#"{
                "name": "projects/p/locations/us-west1/productSets/summer",
                "displayName": "summer",
                "indexTime": "2024-03-01T10:15:30.123456Z"
            }"#,
        )
        .unwrap();
        let index_time = record.index_time.unwrap();
        assert_eq!(index_time.timestamp(), 1_709_288_130);
        assert!(record.index_error.is_none());
    }

    #[test]
    fn test_grouped_results_tolerate_missing_fields() {
        let results: ProductSearchResults = serde_json::from_str(
            r#"{
                "productGroupedResults": [{
                    "boundingPoly": {"normalizedVertices": [{"x": 0.1}, {"x": 0.9, "y": 0.8}]},
                    "objectAnnotations": [{"name": "Skirt", "score": 0.87}]
                }]
            }"#,
        )
        .unwrap();
        let group = &results.product_grouped_results[0];
        assert!(group.results.is_empty());
        assert_eq!(group.bounding_poly.normalized_vertices[0].y, 0.0);
        assert_eq!(group.object_annotations[0].name, "Skirt");
    }

    #[test]
    fn test_search_params_skip_missing_filter() {
        let params = ProductSearchParams {
            product_set: "projects/p/locations/l/productSets/s".into(),
            product_categories: vec![ProductCategory::Apparel],
            filter: None,
        };
        let json = serde_json::to_value(&params).unwrap();
        assert!(json.get("filter").is_none());
        assert_eq!(json["productCategories"][0], "apparel-v2");
    }
}
