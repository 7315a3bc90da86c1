//! Cloud Vision Product Search over its REST interface.
//!
//! Catalog calls map onto `v1/projects/*/locations/*/...` resources and
//! search goes through `v1/images:annotate` with the `PRODUCT_SEARCH` feature.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::http_client::{collect_pages, ApiHttpClient};
use super::{
    ApiStatus, ImageAnnotator, ProductCatalog, ProductRecord, ProductSearchParams,
    ProductSearchResults, ProductSetRecord, ReferenceImageRecord, SearchImage,
};
use crate::error::{ProductSearchError, Result};

const PRODUCT_SEARCH_FEATURE: &str = "PRODUCT_SEARCH";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListProductsResponse {
    #[serde(default)]
    products: Vec<ProductRecord>,
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListProductSetsResponse {
    #[serde(default)]
    product_sets: Vec<ProductSetRecord>,
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListReferenceImagesResponse {
    #[serde(default)]
    reference_images: Vec<ReferenceImageRecord>,
    next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct MembershipRequest<'a> {
    product: &'a str,
}

#[derive(Debug, Deserialize)]
struct Empty {}

#[derive(Debug, Serialize)]
struct BatchAnnotateRequest<'a> {
    requests: [AnnotateImageRequest<'a>; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageRequest<'a> {
    image: ImagePayload,
    features: [Feature; 1],
    image_context: ImageContext<'a>,
}

#[derive(Debug, Default, Serialize)]
struct ImagePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<ImageSourcePayload>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageSourcePayload {
    image_uri: String,
}

#[derive(Debug, Serialize)]
struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageContext<'a> {
    product_search_params: &'a ProductSearchParams,
}

#[derive(Debug, Deserialize)]
struct BatchAnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageResponse {
    #[serde(default)]
    product_search_results: Option<ProductSearchResults>,
    #[serde(default)]
    error: Option<ApiStatus>,
}

impl From<&SearchImage> for ImagePayload {
    fn from(image: &SearchImage) -> Self {
        match image {
            SearchImage::Content(bytes) => Self {
                content: Some(BASE64.encode(bytes)),
                source: None,
            },
            SearchImage::Uri(uri) => Self {
                content: None,
                source: Some(ImageSourcePayload {
                    image_uri: uri.clone(),
                }),
            },
        }
    }
}

/// Map a `google.rpc.Code` to the HTTP status the REST surface would have used.
fn rpc_code_to_http(code: i32) -> u16 {
    match code {
        3 | 9 | 11 => 400,
        16 => 401,
        7 => 403,
        5 => 404,
        6 | 10 => 409,
        8 => 429,
        1 => 499,
        12 => 501,
        14 => 503,
        4 => 504,
        _ => 500,
    }
}

/// Vision API client implementing [`ProductCatalog`] and [`ImageAnnotator`].
pub struct VisionClient {
    http: ApiHttpClient,
    base_url: String,
}

impl VisionClient {
    pub fn new(http: ApiHttpClient, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl ProductCatalog for VisionClient {
    #[instrument(level = "debug", skip(self, product))]
    async fn create_product(
        &self,
        parent: &str,
        product_id: &str,
        product: &ProductRecord,
    ) -> Result<ProductRecord> {
        let url = self.url(&format!("{parent}/products"));
        self.http
            .post_json(&url, &[("productId", product_id)], product)
            .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_product(&self, name: &str) -> Result<ProductRecord> {
        self.http.get_json(&self.url(name), &[]).await
    }

    #[instrument(level = "debug", skip(self))]
    async fn list_products(&self, parent: &str) -> Result<Vec<ProductRecord>> {
        let url = self.url(&format!("{parent}/products"));
        collect_pages(&self.http, &url, |page: ListProductsResponse| {
            (page.products, page.next_page_token)
        })
        .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn delete_product(&self, name: &str) -> Result<()> {
        self.http.delete(&self.url(name)).await
    }

    #[instrument(level = "debug", skip(self, product_set))]
    async fn create_product_set(
        &self,
        parent: &str,
        product_set_id: &str,
        product_set: &ProductSetRecord,
    ) -> Result<ProductSetRecord> {
        let url = self.url(&format!("{parent}/productSets"));
        self.http
            .post_json(&url, &[("productSetId", product_set_id)], product_set)
            .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_product_set(&self, name: &str) -> Result<ProductSetRecord> {
        self.http.get_json(&self.url(name), &[]).await
    }

    #[instrument(level = "debug", skip(self))]
    async fn list_product_sets(&self, parent: &str) -> Result<Vec<ProductSetRecord>> {
        let url = self.url(&format!("{parent}/productSets"));
        collect_pages(&self.http, &url, |page: ListProductSetsResponse| {
            (page.product_sets, page.next_page_token)
        })
        .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn delete_product_set(&self, name: &str) -> Result<()> {
        self.http.delete(&self.url(name)).await
    }

    #[instrument(level = "debug", skip(self))]
    async fn add_product_to_product_set(&self, product_set: &str, product: &str) -> Result<()> {
        let url = self.url(&format!("{product_set}:addProduct"));
        let _: Empty = self
            .http
            .post_json(&url, &[], &MembershipRequest { product })
            .await?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn remove_product_from_product_set(
        &self,
        product_set: &str,
        product: &str,
    ) -> Result<()> {
        let url = self.url(&format!("{product_set}:removeProduct"));
        let _: Empty = self
            .http
            .post_json(&url, &[], &MembershipRequest { product })
            .await?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn list_products_in_product_set(&self, product_set: &str) -> Result<Vec<ProductRecord>> {
        let url = self.url(&format!("{product_set}/products"));
        collect_pages(&self.http, &url, |page: ListProductsResponse| {
            (page.products, page.next_page_token)
        })
        .await
    }

    #[instrument(level = "debug", skip(self, reference_image))]
    async fn create_reference_image(
        &self,
        product: &str,
        reference_image_id: &str,
        reference_image: &ReferenceImageRecord,
    ) -> Result<ReferenceImageRecord> {
        let url = self.url(&format!("{product}/referenceImages"));
        self.http
            .post_json(
                &url,
                &[("referenceImageId", reference_image_id)],
                reference_image,
            )
            .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_reference_image(&self, name: &str) -> Result<ReferenceImageRecord> {
        self.http.get_json(&self.url(name), &[]).await
    }

    #[instrument(level = "debug", skip(self))]
    async fn list_reference_images(&self, product: &str) -> Result<Vec<ReferenceImageRecord>> {
        let url = self.url(&format!("{product}/referenceImages"));
        collect_pages(&self.http, &url, |page: ListReferenceImagesResponse| {
            (page.reference_images, page.next_page_token)
        })
        .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn delete_reference_image(&self, name: &str) -> Result<()> {
        self.http.delete(&self.url(name)).await
    }
}

#[async_trait]
impl ImageAnnotator for VisionClient {
    #[instrument(level = "debug", skip(self, image), fields(product_set = %params.product_set))]
    async fn product_search(
        &self,
        image: &SearchImage,
        params: &ProductSearchParams,
    ) -> Result<ProductSearchResults> {
        let request = BatchAnnotateRequest {
            requests: [AnnotateImageRequest {
                image: ImagePayload::from(image),
                features: [Feature {
                    kind: PRODUCT_SEARCH_FEATURE,
                }],
                image_context: ImageContext {
                    product_search_params: params,
                },
            }],
        };

        let response: BatchAnnotateResponse = self
            .http
            .post_json(&self.url("images:annotate"), &[], &request)
            .await?;

        let first = response.responses.into_iter().next().ok_or_else(|| {
            ProductSearchError::InvalidResponse("images:annotate returned no responses".into())
        })?;

        if let Some(status) = first.error.filter(|s| s.code != 0) {
            return Err(ProductSearchError::Api {
                status: rpc_code_to_http(status.code),
                message: status.message,
            });
        }

        let results = first.product_search_results.unwrap_or_default();
        debug!(
            results = results.results.len(),
            groups = results.product_grouped_results.len(),
            "Product search completed"
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::category::ProductCategory;
    use crate::remote::HttpConfig;

    const LOCATION: &str = "projects/shop/locations/us-west1";

    fn client(base: &str) -> VisionClient {
        VisionClient::new(ApiHttpClient::new(HttpConfig::new("token")).unwrap(), base)
    }

    fn mock_client(server: &MockServer) -> VisionClient {
        let http = ApiHttpClient::new(HttpConfig {
            https_only: false,
            ..HttpConfig::new("token")
        })
        .unwrap();
        VisionClient::new(http, format!("{}/v1", server.uri()))
    }

    fn product_json(id: &str, category: &str) -> Value {
        json!({
            "name": format!("{LOCATION}/products/{id}"),
            "displayName": id,
            "productCategory": category
        })
    }

    fn search_params() -> ProductSearchParams {
        ProductSearchParams {
            product_set: format!("{LOCATION}/productSets/summer"),
            product_categories: vec![ProductCategory::Apparel],
            filter: None,
        }
    }

    #[test]
    fn test_url_joins_resource_names() {
        let vision = client("https://vision.googleapis.com/v1/");
        assert_eq!(
            vision.url("projects/p/locations/us-west1/products"),
            "https://vision.googleapis.com/v1/projects/p/locations/us-west1/products"
        );
        assert_eq!(
            vision.url("/images:annotate"),
            "https://vision.googleapis.com/v1/images:annotate"
        );
    }

    #[test]
    fn test_inline_image_is_base64_encoded() {
        let payload = ImagePayload::from(&SearchImage::Content(b"jpeg".to_vec()));
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json, serde_json::json!({ "content": "anBlZw==" }));
    }

    #[test]
    fn test_annotate_request_shape() {
        let params = ProductSearchParams {
            product_set: "projects/p/locations/l/productSets/summer".into(),
            product_categories: vec![ProductCategory::Apparel],
            filter: Some("style=womens".into()),
        };
        let request = BatchAnnotateRequest {
            requests: [AnnotateImageRequest {
                image: ImagePayload::from(&SearchImage::Uri("gs://b/q.jpg".into())),
                features: [Feature {
                    kind: PRODUCT_SEARCH_FEATURE,
                }],
                image_context: ImageContext {
                    product_search_params: &params,
                },
            }],
        };

        let json = serde_json::to_value(&request).unwrap();
        let inner = &json["requests"][0];
        assert_eq!(inner["image"]["source"]["imageUri"], "gs://b/q.jpg");
        assert_eq!(inner["features"][0]["type"], "PRODUCT_SEARCH");
        assert_eq!(
            inner["imageContext"]["productSearchParams"]["filter"],
            "style=womens"
        );
    }

    #[test]
    fn test_rpc_codes_map_to_http() {
        assert_eq!(rpc_code_to_http(3), 400);
        assert_eq!(rpc_code_to_http(5), 404);
        assert_eq!(rpc_code_to_http(7), 403);
        assert_eq!(rpc_code_to_http(13), 500);
    }

    #[test]
    fn test_annotate_response_with_error() {
        let response: BatchAnnotateResponse = serde_json::from_str(
            r#"{"responses": [{"error": {"code": 3, "message": "Bad image data."}}]}"#,
        )
        .unwrap();
        let first = &response.responses[0];
        assert!(first.product_search_results.is_none());
        assert_eq!(first.error.as_ref().unwrap().code, 3);
    }

    #[tokio::test]
    async fn test_create_product_sends_id_and_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/v1/{LOCATION}/products")))
            .and(query_param("productId", "skirt-1"))
            .and(header("authorization", "Bearer token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(product_json("skirt-1", "apparel-v2")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let record = ProductRecord {
            name: String::new(),
            display_name: "skirt-1".into(),
            description: None,
            product_category: ProductCategory::Apparel,
            product_labels: vec![],
        };
        let created = mock_client(&server)
            .create_product(LOCATION, "skirt-1", &record)
            .await
            .unwrap();
        assert_eq!(created.name, format!("{LOCATION}/products/skirt-1"));

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(
            body,
            json!({"displayName": "skirt-1", "productCategory": "apparel-v2"})
        );
    }

    #[tokio::test]
    async fn test_list_products_spans_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/v1/{LOCATION}/products")))
            .and(query_param_is_missing("pageToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "products": [product_json("skirt-1", "apparel-v2")],
                "nextPageToken": "p2"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/v1/{LOCATION}/products")))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "products": [product_json("lamp-1", "homegoods")]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let products = mock_client(&server).list_products(LOCATION).await.unwrap();
        let names: Vec<&str> = products.iter().map(|p| p.display_name.as_str()).collect();
        assert_eq!(names, vec!["skirt-1", "lamp-1"]);
        assert_eq!(products[1].product_category, ProductCategory::Homegoods);
    }

    #[tokio::test]
    async fn test_get_missing_product_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/v1/{LOCATION}/products/missing")))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"code": 404, "message": "Not found.", "status": "NOT_FOUND"}
            })))
            .mount(&server)
            .await;

        let err = mock_client(&server)
            .get_product(&format!("{LOCATION}/products/missing"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_create_reference_image_sends_image_id() {
        let server = MockServer::start().await;
        let product = format!("{LOCATION}/products/skirt-1");
        Mock::given(method("POST"))
            .and(path(format!("/v1/{product}/referenceImages")))
            .and(query_param("referenceImageId", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": format!("{product}/referenceImages/abc"),
                "uri": "gs://catalog-images/refs/abc"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let record = ReferenceImageRecord {
            name: String::new(),
            uri: "gs://catalog-images/refs/abc".into(),
            bounding_polys: vec![],
        };
        let created = mock_client(&server)
            .create_reference_image(&product, "abc", &record)
            .await
            .unwrap();
        assert_eq!(created.name, format!("{product}/referenceImages/abc"));
    }

    #[tokio::test]
    async fn test_annotate_item_error_becomes_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/images:annotate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "responses": [{"error": {"code": 3, "message": "Bad image data."}}]
            })))
            .mount(&server)
            .await;

        let err = mock_client(&server)
            .product_search(&SearchImage::Uri("gs://b/q.jpg".into()), &search_params())
            .await
            .unwrap_err();
        match err {
            ProductSearchError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Bad image data.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_annotate_sends_inline_image_and_parses_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/images:annotate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "responses": [{
                    "productSearchResults": {
                        "results": [{
                            "product": product_json("skirt-1", "apparel-v2"),
                            "score": 0.91,
                            "image": format!("{LOCATION}/products/skirt-1/referenceImages/abc")
                        }]
                    }
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let results = mock_client(&server)
            .product_search(&SearchImage::Content(b"jpeg".to_vec()), &search_params())
            .await
            .unwrap();
        assert_eq!(results.results.len(), 1);
        assert_eq!(results.results[0].product.display_name, "skirt-1");

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        let inner = &body["requests"][0];
        assert_eq!(inner["image"]["content"], "anBlZw==");
        assert_eq!(inner["features"][0]["type"], "PRODUCT_SEARCH");
        assert_eq!(
            inner["imageContext"]["productSearchParams"]["productSet"],
            format!("{LOCATION}/productSets/summer")
        );
    }
}
