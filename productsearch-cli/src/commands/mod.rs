//! Command implementations.

pub mod product;
pub mod product_set;
pub mod search;

use anyhow::{Context, Result};
use productsearch_core::config::{
    ENV_BUCKET, ENV_LOCATION, ENV_PROJECT_ID, ENV_STORAGE_PREFIX,
};
use productsearch_core::{ProductSearch, SessionConfig};
use tracing::debug;

use crate::GlobalArgs;

/// Build the session configuration, command-line values first, then the environment.
pub fn load_config(globals: &GlobalArgs) -> Result<SessionConfig> {
    let overrides = [
        (ENV_PROJECT_ID, &globals.project),
        (ENV_LOCATION, &globals.location),
        (ENV_BUCKET, &globals.bucket),
        (ENV_STORAGE_PREFIX, &globals.prefix),
    ];

    SessionConfig::from_lookup(|key| {
        overrides
            .iter()
            .find(|(name, _)| *name == key)
            .and_then(|(_, value)| (*value).clone())
            .or_else(|| std::env::var(key).ok())
    })
    .context("Failed to load configuration")
}

pub fn connect(globals: &GlobalArgs) -> Result<ProductSearch> {
    let config = load_config(globals)?;
    debug!(?config, "Loaded configuration");
    ProductSearch::connect(config).context("Failed to create session")
}
