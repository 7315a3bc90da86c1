//! Search command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use productsearch_core::{
    ImageSource, ProductCategory, ProductSearchError, SearchGrouping, SearchMatch, SearchQuery,
    SearchResults,
};
use tracing::{debug, info};

use crate::utils::print_json;
use crate::GlobalArgs;

/// Arguments of the search command.
#[derive(Debug)]
pub struct SearchRequest {
    pub set: String,
    pub category: ProductCategory,
    pub file: Option<PathBuf>,
    pub uri: Option<String>,
    pub filter: Option<String>,
    pub grouping: Option<SearchGrouping>,
    pub min_confidence: Option<f32>,
}

impl SearchRequest {
    /// Translate into a query, rejecting a bad image source before any I/O.
    fn to_query(&self) -> Result<SearchQuery> {
        let source = ImageSource::from_parts(self.file.as_deref(), self.uri.as_deref())
            .context("Invalid search image")?;

        let mut query = SearchQuery::new(self.category);
        query = match source {
            ImageSource::File(path) => query.file(path),
            ImageSource::Uri(uri) => query.uri(uri),
        };
        if let Some(filter) = &self.filter {
            query = query.filter(filter.as_str());
        }
        if let Some(min) = self.min_confidence {
            if !(0.0..=1.0).contains(&min) {
                return Err(ProductSearchError::InvalidArgument(format!(
                    "min confidence must be within [0, 1], got {min}"
                ))
                .into());
            }
        }
        let grouping = match (self.grouping, self.min_confidence) {
            (Some(grouping), Some(min)) => Some(grouping.with_min_confidence(min)),
            (Some(grouping), None) => Some(grouping),
            (None, Some(min)) => Some(SearchGrouping::default().with_min_confidence(min)),
            (None, None) => None,
        };
        if let Some(grouping) = grouping {
            query = query.grouping(grouping);
        }
        Ok(query)
    }
}

/// Execute the search command.
pub async fn execute(globals: &GlobalArgs, request: SearchRequest) -> Result<()> {
    let query = request.to_query()?;
    debug!(?query, "Built search query");

    let session = super::connect(globals)?;
    let set = session
        .get_product_set(&request.set)
        .await
        .with_context(|| format!("Failed to get product set `{}`", request.set))?;
    let results = set
        .search(&query)
        .await
        .with_context(|| format!("Search in `{}` failed", request.set))?;
    info!(product_set_id = %set.id(), "Search finished");

    if globals.json {
        return print_json(&serde_json::to_value(&results)?);
    }

    if results.is_empty() {
        println!("{}", "No matches".dimmed());
        return Ok(());
    }
    match &results {
        SearchResults::Flat(matches) => print_matches(matches, ""),
        SearchResults::Grouped(groups) => {
            for group in groups {
                println!(
                    "{} {} {}",
                    "Object:".bold(),
                    group.label,
                    format!("({:.2})", group.score).dimmed()
                );
                print_matches(&group.matches, "   ");
            }
        }
    }
    Ok(())
}

fn print_matches(matches: &[SearchMatch], indent: &str) {
    for m in matches {
        println!(
            "{indent}{} {:<32} {}",
            format!("{:.3}", m.score).green(),
            m.product.id(),
            m.product.display_name()
        );
    }
}
