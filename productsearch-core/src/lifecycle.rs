//! Local lifecycle state of a resource handle.
//!
//! The state only reflects what *this* handle has done. Another handle to the
//! same remote resource stays `Active` until it issues its own delete.

use std::fmt;

use crate::error::{ProductSearchError, Result};

/// Kind of remote resource a handle wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Product,
    ProductSet,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Product => write!(f, "product"),
            Self::ProductSet => write!(f, "product set"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    #[default]
    Active,
    Deleted,
}

impl Lifecycle {
    pub fn is_deleted(self) -> bool {
        self == Self::Deleted
    }

    /// Fail with [`ProductSearchError::AlreadyDeleted`] unless the handle is active.
    pub fn ensure_active(self, kind: ResourceKind, id: &str) -> Result<()> {
        match self {
            Self::Active => Ok(()),
            Self::Deleted => Err(ProductSearchError::AlreadyDeleted {
                kind,
                id: id.to_string(),
            }),
        }
    }
}
