//! Authenticated JSON-over-HTTP client shared by the Vision and Storage collaborators.
//!
//! Every call is a single attempt. Transport retries, credential refresh and
//! quota handling belong to the caller or to the service itself.

use std::time::{Duration, Instant};

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::DEFAULT_TIMEOUT_SECS;
use crate::error::{ProductSearchError, Result};

/// Longest error body kept verbatim when the service does not send a JSON envelope.
const MAX_RAW_ERROR_LEN: usize = 512;

/// Configuration for an [`ApiHttpClient`].
#[derive(Clone)]
pub struct HttpConfig {
    /// OAuth2 bearer token sent with every request.
    pub access_token: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Refuse plain-HTTP endpoints.
    pub https_only: bool,
}

impl std::fmt::Debug for HttpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConfig")
            .field("access_token", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .field("https_only", &self.https_only)
            .finish()
    }
}

impl HttpConfig {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            https_only: true,
        }
    }
}

/// Google API error envelope: `{"error": {"code": 404, "message": "..."}}`.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// Thin wrapper over [`reqwest::Client`] adding bearer auth and error decoding.
#[derive(Clone)]
pub struct ApiHttpClient {
    client: Client,
    config: HttpConfig,
}

impl ApiHttpClient {
    pub fn new(config: HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .https_only(config.https_only)
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .build()
            .map_err(|e| ProductSearchError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.config.access_token)
    }

    pub async fn get_json<R: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<R> {
        let response = self.send(self.request(Method::GET, url).query(query), url).await?;
        decode_json(response).await
    }

    pub async fn post_json<B, R>(&self, url: &str, query: &[(&str, &str)], body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let builder = self.request(Method::POST, url).query(query).json(body);
        let response = self.send(builder, url).await?;
        decode_json(response).await
    }

    pub async fn post_bytes(
        &self,
        url: &str,
        query: &[(&str, &str)],
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        let builder = self
            .request(Method::POST, url)
            .query(query)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes);
        self.send(builder, url).await?;
        Ok(())
    }

    pub async fn delete(&self, url: &str) -> Result<()> {
        self.send(self.request(Method::DELETE, url), url).await?;
        Ok(())
    }

    async fn send(&self, builder: RequestBuilder, url: &str) -> Result<Response> {
        let start = Instant::now();

        let response = builder.send().await.map_err(|e| {
            warn!(
                error = %e,
                url,
                latency_ms = start.elapsed().as_millis() as u64,
                "Request failed"
            );
            ProductSearchError::Http(e)
        })?;

        let status = response.status();
        let latency_ms = start.elapsed().as_millis() as u64;
        debug!(status = %status, url, latency_ms, "Received HTTP response");

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body);
        warn!(status = %status, url, latency_ms, message = %message, "Remote API error");
        Err(ProductSearchError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

async fn decode_json<R: DeserializeOwned>(response: Response) -> Result<R> {
    let bytes = response.bytes().await?;
    // Empty messages come back as `{}` or, from some endpoints, an empty body.
    let bytes: &[u8] = if bytes.is_empty() { b"{}" } else { &bytes };
    serde_json::from_slice(bytes).map_err(|e| {
        warn!(error = %e, "Failed to parse JSON response");
        ProductSearchError::InvalidResponse(format!("Failed to parse response: {e}"))
    })
}

/// Extract a human-readable message from an error response body.
fn error_message(body: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        return match envelope.error.status {
            Some(status) if !status.is_empty() => format!("{status}: {}", envelope.error.message),
            _ => envelope.error.message,
        };
    }

    let trimmed = body.trim();
    if trimmed.len() <= MAX_RAW_ERROR_LEN {
        trimmed.to_string()
    } else {
        let cut = (0..=MAX_RAW_ERROR_LEN)
            .rev()
            .find(|i| trimmed.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}...", &trimmed[..cut])
    }
}

/// Fetch every page of a list endpoint, following `nextPageToken`.
pub(crate) async fn collect_pages<P, T, F>(
    client: &ApiHttpClient,
    url: &str,
    mut split: F,
) -> Result<Vec<T>>
where
    P: DeserializeOwned,
    F: FnMut(P) -> (Vec<T>, Option<String>),
{
    let mut items = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let page: P = {
            let query: Vec<(&str, &str)> = match page_token.as_deref() {
                Some(token) => vec![("pageToken", token)],
                None => Vec::new(),
            };
            client.get_json(url, &query).await?
        };
        let (mut batch, next) = split(page);
        items.append(&mut batch);

        match next.filter(|t| !t.is_empty()) {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    debug!(url, count = items.len(), "Collected list results");
    Ok(items)
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn plain_http_client() -> ApiHttpClient {
        ApiHttpClient::new(HttpConfig {
            https_only: false,
            ..HttpConfig::new("token")
        })
        .unwrap()
    }

    #[test]
    fn test_error_message_from_envelope() {
        let body = r#"{"error": {"code": 404, "message": "Product not found.", "status": "NOT_FOUND"}}"#;
        assert_eq!(error_message(body), "NOT_FOUND: Product not found.");
    }

    #[test]
    fn test_error_message_without_status() {
        let body = r#"{"error": {"code": 400, "message": "Invalid product id"}}"#;
        assert_eq!(error_message(body), "Invalid product id");
    }

    #[test]
    fn test_error_message_truncates_raw_body() {
        let body = "x".repeat(2000);
        let message = error_message(&body);
        assert!(message.ends_with("..."));
        assert_eq!(message.len(), MAX_RAW_ERROR_LEN + 3);
    }

    #[test]
    fn test_config_debug_redacts_token() {
        let config = HttpConfig::new("ya29.secret-token");
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_create_client() {
        assert!(ApiHttpClient::new(HttpConfig::new("token")).is_ok());
    }

    #[tokio::test]
    async fn test_https_only_refuses_plain_http() {
        let server = MockServer::start().await;
        let client = ApiHttpClient::new(HttpConfig::new("token")).unwrap();
        let err = client
            .get_json::<Value>(&format!("{}/v1/x", server.uri()), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ProductSearchError::Http(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_error_envelope_becomes_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/projects/p/locations/l/products/missing"))
            .and(header("authorization", "Bearer token"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"code": 404, "message": "Product not found.", "status": "NOT_FOUND"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/v1/projects/p/locations/l/products/missing", server.uri());
        let err = plain_http_client()
            .get_json::<Value>(&url, &[])
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert!(err.is_remote_error());
        match err {
            ProductSearchError::Api { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "NOT_FOUND: Product not found.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_success_body_decodes_as_empty_object() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/sets/summer:addProduct"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let url = format!("{}/v1/sets/summer:addProduct", server.uri());
        let body: Value = plain_http_client()
            .post_json(&url, &[], &json!({"product": "p"}))
            .await
            .unwrap();
        assert_eq!(body, json!({}));
    }

    #[tokio::test]
    async fn test_collect_pages_follows_next_page_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/items"))
            .and(query_param_is_missing("pageToken"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"items": ["a", "b"], "next": "page-2"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/items"))
            .and(query_param("pageToken", "page-2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"items": ["c"], "next": ""})),
            )
            .expect(1)
            .mount(&server)
            .await;

        #[derive(Deserialize)]
        struct Page {
            items: Vec<String>,
            next: Option<String>,
        }

        let url = format!("{}/v1/items", server.uri());
        let items = collect_pages(&plain_http_client(), &url, |page: Page| {
            (page.items, page.next)
        })
        .await
        .unwrap();
        assert_eq!(items, vec!["a", "b", "c"]);
    }
}
