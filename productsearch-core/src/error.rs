use thiserror::Error;

use crate::lifecycle::ResourceKind;

#[derive(Error, Debug)]
pub enum ProductSearchError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Cannot perform operation on already deleted {kind} `{id}`")]
    AlreadyDeleted { kind: ResourceKind, id: String },

    #[error("Remote API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "http")]
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ProductSearchError {
    /// Errors raised locally before any remote call was attempted.
    pub fn is_usage_error(&self) -> bool {
        matches!(self, Self::InvalidArgument(_) | Self::AlreadyDeleted { .. })
    }

    /// Errors surfaced by a remote collaborator.
    pub fn is_remote_error(&self) -> bool {
        match self {
            Self::Api { .. } | Self::InvalidResponse(_) => true,
            #[cfg(feature = "http")]
            Self::Http(_) => true,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }

    pub(crate) fn not_found(what: impl std::fmt::Display) -> Self {
        Self::Api {
            status: 404,
            message: format!("{what} not found"),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProductSearchError>;
