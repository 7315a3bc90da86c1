//! Session configuration.
//!
//! Handles loading configuration from environment variables with sensible defaults.

use std::time::Duration;

use crate::error::{ProductSearchError, Result};
use crate::search::{SearchGrouping, DEFAULT_MIN_CONFIDENCE};

/// Location used when none is configured.
pub const DEFAULT_LOCATION: &str = "us-west1";

/// Default Vision API endpoint.
pub const DEFAULT_VISION_URL: &str = "https://vision.googleapis.com/v1";

/// Default Cloud Storage endpoint, used for both the API and public URLs.
pub const DEFAULT_STORAGE_URL: &str = "https://storage.googleapis.com";

/// Default timeout for a single remote call.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const ENV_PROJECT_ID: &str = "PRODUCTSEARCH_PROJECT_ID";
pub const ENV_LOCATION: &str = "PRODUCTSEARCH_LOCATION";
pub const ENV_BUCKET: &str = "PRODUCTSEARCH_BUCKET";
pub const ENV_STORAGE_PREFIX: &str = "PRODUCTSEARCH_STORAGE_PREFIX";
pub const ENV_ACCESS_TOKEN: &str = "PRODUCTSEARCH_ACCESS_TOKEN";
pub const ENV_GROUPING: &str = "PRODUCTSEARCH_GROUPING";
pub const ENV_MIN_CONFIDENCE: &str = "PRODUCTSEARCH_MIN_CONFIDENCE";
pub const ENV_VISION_URL: &str = "PRODUCTSEARCH_VISION_URL";
pub const ENV_STORAGE_URL: &str = "PRODUCTSEARCH_STORAGE_URL";
pub const ENV_TIMEOUT_SECS: &str = "PRODUCTSEARCH_TIMEOUT_SECS";

/// Fallbacks shared with other Google Cloud tooling.
const ENV_GOOGLE_PROJECT: &str = "GOOGLE_CLOUD_PROJECT";
const ENV_GOOGLE_TOKEN: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

/// Settings every session needs, independent of how the remote
/// collaborators are reached.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// Cloud project id.
    pub project_id: String,
    /// Region the catalog lives in (default: us-west1).
    pub location: String,
    /// Key prefix for reference image blobs, without surrounding slashes.
    pub storage_prefix: Option<String>,
    /// How search results are shaped (default: grouped by detected object).
    pub grouping: SearchGrouping,
}

impl SessionSettings {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            location: DEFAULT_LOCATION.to_string(),
            storage_prefix: None,
            grouping: SearchGrouping::default(),
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Set the blob key prefix. Leading and trailing slashes are dropped and
    /// an empty prefix means none.
    pub fn with_storage_prefix(mut self, prefix: impl AsRef<str>) -> Self {
        self.storage_prefix = normalize_prefix(prefix.as_ref());
        self
    }

    pub fn with_grouping(mut self, grouping: SearchGrouping) -> Self {
        self.grouping = grouping;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.project_id.trim().is_empty() {
            return Err(ProductSearchError::Config("project id must not be empty".into()));
        }
        if self.location.trim().is_empty() {
            return Err(ProductSearchError::Config("location must not be empty".into()));
        }
        if let SearchGrouping::ByObject { min_confidence } = self.grouping {
            if !(0.0..=1.0).contains(&min_confidence) {
                return Err(ProductSearchError::Config(format!(
                    "minimum object confidence must be within [0, 1], got {min_confidence}"
                )));
            }
        }
        Ok(())
    }
}

fn normalize_prefix(prefix: &str) -> Option<String> {
    let trimmed = prefix.trim().trim_matches('/');
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Full configuration of an HTTP-backed session.
#[derive(Clone)]
pub struct SessionConfig {
    pub settings: SessionSettings,
    /// Bucket holding reference images.
    pub bucket: String,
    /// OAuth2 access token used as the bearer credential.
    pub access_token: String,
    /// Vision API base URL (default: production endpoint).
    pub vision_url: String,
    /// Cloud Storage base URL (default: production endpoint).
    pub storage_url: String,
    /// Timeout of a single remote call (default: 30s).
    pub timeout: Duration,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("settings", &self.settings)
            .field("bucket", &self.bucket)
            .field("access_token", &"[REDACTED]")
            .field("vision_url", &self.vision_url)
            .field("storage_url", &self.storage_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl SessionConfig {
    pub fn new(
        settings: SessionSettings,
        bucket: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            settings,
            bucket: bucket.into(),
            access_token: access_token.into(),
            vision_url: DEFAULT_VISION_URL.to_string(),
            storage_url: DEFAULT_STORAGE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Required: `PRODUCTSEARCH_PROJECT_ID` (or `GOOGLE_CLOUD_PROJECT`),
    /// `PRODUCTSEARCH_BUCKET`, `PRODUCTSEARCH_ACCESS_TOKEN` (or
    /// `GOOGLE_OAUTH_ACCESS_TOKEN`).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup, e.g. command-line
    /// values layered over the environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let project_id = get(ENV_PROJECT_ID)
            .or_else(|| get(ENV_GOOGLE_PROJECT))
            .ok_or_else(|| ProductSearchError::Config(format!("{ENV_PROJECT_ID} is not set")))?;

        let bucket = get(ENV_BUCKET)
            .ok_or_else(|| ProductSearchError::Config(format!("{ENV_BUCKET} is not set")))?;

        let access_token = get(ENV_ACCESS_TOKEN)
            .or_else(|| get(ENV_GOOGLE_TOKEN))
            .ok_or_else(|| ProductSearchError::Config(format!("{ENV_ACCESS_TOKEN} is not set")))?;

        let min_confidence = match get(ENV_MIN_CONFIDENCE) {
            Some(value) => value.trim().parse::<f32>().map_err(|e| {
                ProductSearchError::Config(format!(
                    "parsing {ENV_MIN_CONFIDENCE} value `{value}`: {e}"
                ))
            })?,
            None => DEFAULT_MIN_CONFIDENCE,
        };

        let grouping = match get(ENV_GROUPING) {
            Some(value) => value
                .parse::<SearchGrouping>()
                .map_err(|e| ProductSearchError::Config(e.to_string()))?
                .with_min_confidence(min_confidence),
            None => SearchGrouping::ByObject { min_confidence },
        };

        let timeout_secs = match get(ENV_TIMEOUT_SECS) {
            Some(value) => value.trim().parse::<u64>().map_err(|e| {
                ProductSearchError::Config(format!("parsing {ENV_TIMEOUT_SECS} value `{value}`: {e}"))
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let mut settings = SessionSettings::new(project_id).with_grouping(grouping);
        if let Some(location) = get(ENV_LOCATION) {
            settings = settings.with_location(location);
        }
        if let Some(prefix) = get(ENV_STORAGE_PREFIX) {
            settings = settings.with_storage_prefix(prefix);
        }

        let config = Self {
            settings,
            bucket,
            access_token,
            vision_url: get(ENV_VISION_URL).unwrap_or_else(|| DEFAULT_VISION_URL.to_string()),
            storage_url: get(ENV_STORAGE_URL).unwrap_or_else(|| DEFAULT_STORAGE_URL.to_string()),
            timeout: Duration::from_secs(timeout_secs),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.settings.validate()?;
        if self.bucket.trim().is_empty() {
            return Err(ProductSearchError::Config("bucket must not be empty".into()));
        }
        if self.access_token.trim().is_empty() {
            return Err(ProductSearchError::Config("access token must not be empty".into()));
        }
        if self.timeout.is_zero() {
            return Err(ProductSearchError::Config("timeout must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        (ENV_PROJECT_ID, "shop-123"),
        (ENV_BUCKET, "catalog-images"),
        (ENV_ACCESS_TOKEN, "ya29.token"),
    ];

    #[test]
    fn test_defaults() {
        let config = SessionConfig::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(config.settings.project_id, "shop-123");
        assert_eq!(config.settings.location, DEFAULT_LOCATION);
        assert_eq!(config.settings.storage_prefix, None);
        assert_eq!(
            config.settings.grouping,
            SearchGrouping::ByObject {
                min_confidence: DEFAULT_MIN_CONFIDENCE
            }
        );
        assert_eq!(config.vision_url, DEFAULT_VISION_URL);
        assert_eq!(config.storage_url, DEFAULT_STORAGE_URL);
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }

    #[test]
    fn test_missing_bucket() {
        let err = SessionConfig::from_lookup(lookup(&[
            (ENV_PROJECT_ID, "shop-123"),
            (ENV_ACCESS_TOKEN, "token"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains(ENV_BUCKET));
    }

    #[test]
    fn test_google_fallbacks() {
        let config = SessionConfig::from_lookup(lookup(&[
            (ENV_GOOGLE_PROJECT, "fallback-project"),
            (ENV_BUCKET, "b"),
            (ENV_GOOGLE_TOKEN, "token"),
        ]))
        .unwrap();
        assert_eq!(config.settings.project_id, "fallback-project");
        assert_eq!(config.access_token, "token");
    }

    #[test]
    fn test_overrides() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            (ENV_LOCATION, "europe-west1"),
            (ENV_STORAGE_PREFIX, "/reference/skirts/"),
            (ENV_GROUPING, "flat"),
            (ENV_TIMEOUT_SECS, "5"),
            (ENV_VISION_URL, "http://localhost:8080/v1"),
        ]);
        let config = SessionConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.settings.location, "europe-west1");
        assert_eq!(
            config.settings.storage_prefix.as_deref(),
            Some("reference/skirts")
        );
        assert_eq!(config.settings.grouping, SearchGrouping::Flat);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.vision_url, "http://localhost:8080/v1");
    }

    #[test]
    fn test_min_confidence_applies_to_grouped_mode() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([(ENV_GROUPING, "grouped"), (ENV_MIN_CONFIDENCE, "0.7")]);
        let config = SessionConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(
            config.settings.grouping,
            SearchGrouping::ByObject {
                min_confidence: 0.7
            }
        );
    }

    #[test]
    fn test_invalid_values() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push((ENV_MIN_CONFIDENCE, "1.5"));
        assert!(SessionConfig::from_lookup(lookup(&pairs)).is_err());

        let mut pairs = REQUIRED.to_vec();
        pairs.push((ENV_TIMEOUT_SECS, "soon"));
        assert!(SessionConfig::from_lookup(lookup(&pairs)).is_err());

        let mut pairs = REQUIRED.to_vec();
        pairs.push((ENV_GROUPING, "sideways"));
        assert!(SessionConfig::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = SessionConfig::from_lookup(lookup(&REQUIRED)).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("ya29.token"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_empty_prefix_is_none() {
        let settings = SessionSettings::new("p").with_storage_prefix("//");
        assert_eq!(settings.storage_prefix, None);
    }
}
