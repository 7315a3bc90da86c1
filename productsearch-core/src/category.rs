//! Product categories understood by the search service.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProductSearchError;

/// Category of a product. Search is always scoped to one category.
///
/// The serialized form is the versioned model name the service expects.
/// Products created under the deprecated unversioned models (`homegoods`,
/// `apparel`, `toys`) deserialize into the matching current category, so a
/// catalog holding such products still lists. Any other unknown value fails
/// to parse and fails the whole list page with an invalid-response error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductCategory {
    #[serde(rename = "homegoods-v2", alias = "homegoods")]
    Homegoods,
    #[serde(rename = "apparel-v2", alias = "apparel")]
    Apparel,
    #[serde(rename = "toys-v2", alias = "toys")]
    Toys,
    #[serde(rename = "packagedgoods-v1")]
    PackagedGoods,
    #[serde(rename = "general-v1")]
    General,
}

impl ProductCategory {
    pub const ALL: [ProductCategory; 5] = [
        Self::Homegoods,
        Self::Apparel,
        Self::Toys,
        Self::PackagedGoods,
        Self::General,
    ];

    /// Versioned model name sent on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Homegoods => "homegoods-v2",
            Self::Apparel => "apparel-v2",
            Self::Toys => "toys-v2",
            Self::PackagedGoods => "packagedgoods-v1",
            Self::General => "general-v1",
        }
    }

    fn short_name(self) -> &'static str {
        match self {
            Self::Homegoods => "homegoods",
            Self::Apparel => "apparel",
            Self::Toys => "toys",
            Self::PackagedGoods => "packagedgoods",
            Self::General => "general",
        }
    }
}

impl fmt::Display for ProductCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductCategory {
    type Err = ProductSearchError;

    /// Accepts either the short name (`apparel`) or the wire name (`apparel-v2`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted || c.short_name() == wanted)
            .ok_or_else(|| {
                ProductSearchError::InvalidArgument(format!("Unknown product category: {s}"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_short_and_wire_names() {
        assert_eq!(
            "apparel".parse::<ProductCategory>().unwrap(),
            ProductCategory::Apparel
        );
        assert_eq!(
            "PackagedGoods".parse::<ProductCategory>().unwrap(),
            ProductCategory::PackagedGoods
        );
        assert_eq!(
            "homegoods-v2".parse::<ProductCategory>().unwrap(),
            ProductCategory::Homegoods
        );
    }

    #[test]
    fn test_parse_unknown_category() {
        let err = "shoes".parse::<ProductCategory>().unwrap_err();
        assert!(err.is_usage_error());
    }

    #[test]
    fn test_serde_uses_wire_names() {
        let json = serde_json::to_string(&ProductCategory::Toys).unwrap();
        assert_eq!(json, "\"toys-v2\"");

        let parsed: ProductCategory = serde_json::from_str("\"general-v1\"").unwrap();
        assert_eq!(parsed, ProductCategory::General);
    }

    #[test]
    fn test_legacy_wire_names_deserialize() {
        let parsed: ProductCategory = serde_json::from_str("\"apparel\"").unwrap();
        assert_eq!(parsed, ProductCategory::Apparel);
        let parsed: ProductCategory = serde_json::from_str("\"homegoods\"").unwrap();
        assert_eq!(parsed, ProductCategory::Homegoods);

        // Re-serialized under the current model name.
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"homegoods-v2\"");
        assert!(serde_json::from_str::<ProductCategory>("\"furniture-v1\"").is_err());
    }

    #[test]
    fn test_display_matches_wire_name() {
        for category in ProductCategory::ALL {
            assert_eq!(category.to_string(), category.as_str());
        }
    }
}
