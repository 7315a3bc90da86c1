//! ProductSearch Core - visual product catalog search library
//!
//! This crate manages a catalog of products for image similarity search on
//! Google Cloud Vision Product Search, with reference images hosted in a
//! Cloud Storage bucket.
//!
//! # Features
//!
//! - Products with categories and filterable key/value labels
//! - Product sets with membership and index freshness
//! - Reference image upload, publication and cleanup
//! - Similarity search from a local file or an image URI, flat or grouped by detected object
//! - An in-memory backend for offline use and tests
//!
//! # Example
//!
//! ```no_run
//! use productsearch_core::{
//!     NewProduct, ProductCategory, ProductSearch, SearchQuery, SessionConfig,
//! };
//!
//! # async fn example() -> productsearch_core::Result<()> {
//! let session = ProductSearch::connect(SessionConfig::from_env()?)?;
//!
//! let product = session
//!     .create_product(NewProduct::new("skirt-42", ProductCategory::Apparel).label("type", "skirt"))
//!     .await?;
//! product.add_reference_image("skirt.jpg", &[]).await?;
//!
//! let set = session.create_product_set("summer", Some("Summer collection")).await?;
//! set.add_product(&product).await?;
//!
//! // Products become searchable once the set is next indexed
//! let results = set
//!     .search(&SearchQuery::new(ProductCategory::Apparel).file("query.jpg").filter("type=skirt"))
//!     .await?;
//! for m in results.matches() {
//!     println!("{} {:.2}", m.product.id(), m.score);
//! }
//! # Ok(())
//! # }
//! ```

pub mod category;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod product;
pub mod product_set;
pub mod remote;
pub mod search;
pub mod session;

// Re-export main types for convenience
pub use category::ProductCategory;
pub use config::{SessionConfig, SessionSettings};
pub use error::{ProductSearchError, Result};
pub use lifecycle::{Lifecycle, ResourceKind};
pub use product::{NewProduct, Product};
pub use product_set::ProductSet;
pub use remote::{
    BlobStore, BoundingPoly, ImageAnnotator, InMemoryBackend, NormalizedVertex, ProductCatalog,
};
pub use search::{
    ImageSource, ObjectMatches, SearchGrouping, SearchMatch, SearchQuery, SearchResults,
    DEFAULT_MIN_CONFIDENCE,
};
pub use session::{ProductSearch, MAX_RESOURCE_ID_LEN};
