//! Similarity search queries and result shaping.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
use tracing::debug;

use crate::category::ProductCategory;
use crate::error::{ProductSearchError, Result};
use crate::product::Product;
use crate::remote::{NormalizedVertex, ProductSearchResults, SearchImage, SearchResultRecord};
use crate::session::ProductSearch;

/// Detected objects below this confidence are dropped from grouped results.
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;

/// How raw search results are shaped before they reach the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SearchGrouping {
    /// One ranked list for the whole image.
    Flat,
    /// One ranked list per object detected in the image. Each group is
    /// labelled with its most confident annotation and dropped when that
    /// confidence is below `min_confidence`.
    ByObject { min_confidence: f32 },
}

impl Default for SearchGrouping {
    fn default() -> Self {
        Self::ByObject {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }
}

impl SearchGrouping {
    /// Replace the confidence cutoff; no effect on [`SearchGrouping::Flat`].
    pub fn with_min_confidence(self, min_confidence: f32) -> Self {
        match self {
            Self::Flat => Self::Flat,
            Self::ByObject { .. } => Self::ByObject { min_confidence },
        }
    }
}

impl FromStr for SearchGrouping {
    type Err = ProductSearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flat" => Ok(Self::Flat),
            "grouped" | "by-object" | "by_object" => Ok(Self::default()),
            other => Err(ProductSearchError::InvalidArgument(format!(
                "Unknown search grouping `{other}` (expected `flat` or `grouped`)"
            ))),
        }
    }
}

/// Where the query image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Local file, read and sent inline.
    File(PathBuf),
    /// URI the service fetches itself (`gs://` or public `https://`).
    Uri(String),
}

impl ImageSource {
    /// Build a source from optional parts. Exactly one must be present;
    /// empty values count as absent.
    pub fn from_parts(file_path: Option<&Path>, image_uri: Option<&str>) -> Result<Self> {
        let file_path = file_path.filter(|p| !p.as_os_str().is_empty());
        let image_uri = image_uri.map(str::trim).filter(|u| !u.is_empty());

        match (file_path, image_uri) {
            (Some(path), None) => Ok(Self::File(path.to_path_buf())),
            (None, Some(uri)) => Ok(Self::Uri(uri.to_string())),
            _ => Err(ProductSearchError::InvalidArgument(
                "Must provide exactly one of a file path or an image URI".into(),
            )),
        }
    }

    pub(crate) async fn load(&self) -> Result<SearchImage> {
        match self {
            Self::File(path) => {
                let bytes = tokio::fs::read(path).await?;
                debug!(path = %path.display(), bytes = bytes.len(), "Read query image");
                Ok(SearchImage::Content(bytes))
            }
            Self::Uri(uri) => Ok(SearchImage::Uri(uri.clone())),
        }
    }
}

/// Builder for a similarity search against a [`crate::ProductSet`].
///
/// ```
/// use productsearch_core::{ProductCategory, SearchGrouping, SearchQuery};
///
/// let query = SearchQuery::new(ProductCategory::Apparel)
///     .uri("gs://my-bucket/query/skirt.jpg")
///     .filter("style=womens")
///     .grouping(SearchGrouping::Flat);
/// assert!(query.image_source().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct SearchQuery {
    category: ProductCategory,
    file_path: Option<PathBuf>,
    image_uri: Option<String>,
    filter: Option<String>,
    grouping: Option<SearchGrouping>,
}

impl SearchQuery {
    pub fn new(category: ProductCategory) -> Self {
        Self {
            category,
            file_path: None,
            image_uri: None,
            filter: None,
            grouping: None,
        }
    }

    /// Search with the bytes of a local image file.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Search with an image the service fetches by URI.
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.image_uri = Some(uri.into());
        self
    }

    /// Server-side label filter, e.g. `color=(red OR blue) AND style=kids`.
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        let filter = filter.into();
        self.filter = (!filter.trim().is_empty()).then_some(filter);
        self
    }

    /// Override the session's result grouping for this query.
    pub fn grouping(mut self, grouping: SearchGrouping) -> Self {
        self.grouping = Some(grouping);
        self
    }

    pub fn category(&self) -> ProductCategory {
        self.category
    }

    pub fn filter_expr(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    pub fn grouping_override(&self) -> Option<SearchGrouping> {
        self.grouping
    }

    /// Resolve the image source, enforcing that exactly one was given.
    pub fn image_source(&self) -> Result<ImageSource> {
        ImageSource::from_parts(self.file_path.as_deref(), self.image_uri.as_deref())
    }
}

/// One matching product.
#[derive(Debug, Clone, Serialize)]
pub struct SearchMatch {
    pub product: Product,
    /// Similarity in `[0, 1]`, higher is closer.
    pub score: f32,
    /// Resource name of the reference image that produced the match.
    pub image: String,
}

/// Matches for one object detected in the query image.
#[derive(Debug, Clone, Serialize)]
pub struct ObjectMatches {
    /// Most confident label for the object.
    pub label: String,
    /// Confidence of `label`.
    pub score: f32,
    pub bounding_poly: Vec<NormalizedVertex>,
    pub matches: Vec<SearchMatch>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "grouping", content = "results", rename_all = "snake_case")]
pub enum SearchResults {
    Flat(Vec<SearchMatch>),
    Grouped(Vec<ObjectMatches>),
}

impl SearchResults {
    /// Every match, flattened across groups.
    pub fn matches(&self) -> Box<dyn Iterator<Item = &SearchMatch> + '_> {
        match self {
            Self::Flat(matches) => Box::new(matches.iter()),
            Self::Grouped(groups) => Box::new(groups.iter().flat_map(|g| g.matches.iter())),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Flat(matches) => matches.is_empty(),
            Self::Grouped(groups) => groups.is_empty(),
        }
    }
}

fn to_match(session: &ProductSearch, record: SearchResultRecord) -> SearchMatch {
    SearchMatch {
        product: Product::from_record(session.clone(), record.product),
        score: record.score,
        image: record.image,
    }
}

/// Shape raw search results according to `grouping`.
pub(crate) fn shape_results(
    session: &ProductSearch,
    results: ProductSearchResults,
    grouping: SearchGrouping,
) -> SearchResults {
    match grouping {
        SearchGrouping::Flat => SearchResults::Flat(
            results
                .results
                .into_iter()
                .map(|r| to_match(session, r))
                .collect(),
        ),
        SearchGrouping::ByObject { min_confidence } => {
            let total = results.product_grouped_results.len();
            let groups: Vec<ObjectMatches> = results
                .product_grouped_results
                .into_iter()
                .filter_map(|group| {
                    // First annotation wins ties.
                    let label = group
                        .object_annotations
                        .into_iter()
                        .reduce(|best, a| if a.score > best.score { a } else { best })?;
                    if label.score < min_confidence {
                        return None;
                    }
                    Some(ObjectMatches {
                        label: label.name,
                        score: label.score,
                        bounding_poly: group.bounding_poly.normalized_vertices,
                        matches: group
                            .results
                            .into_iter()
                            .map(|r| to_match(session, r))
                            .collect(),
                    })
                })
                .collect();
            debug!(
                kept = groups.len(),
                dropped = total - groups.len(),
                min_confidence,
                "Grouped search results by detected object"
            );
            SearchResults::Grouped(groups)
        }
    }
}
