//! Exit codes following sysexits.h conventions.
//!
//! These codes let scripts tell a bad invocation apart from a missing file,
//! an unreachable service, or incomplete configuration.

use productsearch_core::ProductSearchError;

/// General error (catch-all).
pub const GENERAL_ERROR: i32 = 1;

/// Command line usage error (invalid arguments, deleted handle).
/// Maps to EX_USAGE from sysexits.h.
pub const USAGE_ERROR: i32 = 64;

/// Cannot open input file.
/// Maps to EX_NOINPUT from sysexits.h.
pub const INPUT_ERROR: i32 = 66;

/// Remote service failed or rejected the request.
/// Maps to EX_UNAVAILABLE from sysexits.h.
pub const REMOTE_ERROR: i32 = 69;

/// Missing or invalid configuration.
/// Maps to EX_CONFIG from sysexits.h.
pub const CONFIG_ERROR: i32 = 78;

/// Represents an exit code with its error message.
pub struct ExitCode {
    pub code: i32,
    pub message: String,
}

impl ExitCode {
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");

        // Classify by the first library or I/O error in the chain
        let code = err
            .chain()
            .find_map(|cause| {
                if let Some(e) = cause.downcast_ref::<ProductSearchError>() {
                    Some(classify(e))
                } else if cause.downcast_ref::<std::io::Error>().is_some() {
                    Some(INPUT_ERROR)
                } else {
                    None
                }
            })
            .unwrap_or(GENERAL_ERROR);

        Self { code, message }
    }
}

fn classify(err: &ProductSearchError) -> i32 {
    match err {
        ProductSearchError::Config(_) => CONFIG_ERROR,
        ProductSearchError::Io(_) => INPUT_ERROR,
        e if e.is_usage_error() => USAGE_ERROR,
        e if e.is_remote_error() => REMOTE_ERROR,
        _ => GENERAL_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Context;
    use productsearch_core::ResourceKind;

    use super::*;

    fn code_of(err: ProductSearchError) -> i32 {
        let err = Err::<(), _>(err).context("Command failed").unwrap_err();
        ExitCode::from_anyhow(&err).code
    }

    #[test]
    fn test_library_errors_are_classified_through_context() {
        assert_eq!(code_of(ProductSearchError::InvalidArgument("x".into())), USAGE_ERROR);
        assert_eq!(
            code_of(ProductSearchError::AlreadyDeleted {
                kind: ResourceKind::Product,
                id: "lamp".into()
            }),
            USAGE_ERROR
        );
        assert_eq!(code_of(ProductSearchError::Config("x".into())), CONFIG_ERROR);
        assert_eq!(
            code_of(ProductSearchError::Api {
                status: 503,
                message: "down".into()
            }),
            REMOTE_ERROR
        );
        assert_eq!(
            code_of(ProductSearchError::Io(std::io::Error::other("gone"))),
            INPUT_ERROR
        );
    }

    #[test]
    fn test_message_includes_context_chain() {
        let err = Err::<(), _>(ProductSearchError::Config("bucket must not be empty".into()))
            .context("Failed to load configuration")
            .unwrap_err();
        let exit = ExitCode::from_anyhow(&err);
        assert!(exit.message.starts_with("Failed to load configuration: "));
        assert!(exit.message.contains("bucket must not be empty"));
    }

    #[test]
    fn test_unknown_errors_are_general() {
        let err = anyhow::anyhow!("something else");
        assert_eq!(ExitCode::from_anyhow(&err).code, GENERAL_ERROR);
    }
}
