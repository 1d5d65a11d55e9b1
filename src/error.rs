//! Custom error types for mainline with improved type safety and error handling.

use thiserror::Error;

/// Main error type for mainline operations.
#[derive(Error, Debug)]
pub enum MainlineError {
    // Cli args errors
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("Invalid clone URL: {0}")]
    UrlError(#[from] url::ParseError),

    // Repository errors
    #[error("No manifest found in repository root (looked for: {0})")]
    ManifestNotFound(String),

    #[error("Tag {0} already exists: re-run with --force to overwrite it")]
    TagExists(String),

    #[error(
        "Branch '{branch}' has diverged from its remote and cannot be fast-forwarded"
    )]
    DivergedBranch { branch: String },

    #[error("Merge produced conflicts outside the manifest: {paths}")]
    UnresolvableConflict { paths: String },

    #[error("Git operation failed: {0}")]
    GitError(#[from] git2::Error),

    // Generic wrapper for other errors
    #[error(transparent)]
    Other(#[from] color_eyre::Report),
}

impl MainlineError {
    /// Create an invalid arguments error
    pub fn invalid_args(msg: impl Into<String>) -> Self {
        Self::InvalidArgs(msg.into())
    }

    /// Create an unresolvable conflict error from the conflicted paths
    pub fn unresolvable_conflict(paths: &[String]) -> Self {
        Self::UnresolvableConflict {
            paths: paths.join(", "),
        }
    }
}

// Implement From for std::io::Error - wraps in Other variant for generic I/O errors
impl From<std::io::Error> for MainlineError {
    fn from(err: std::io::Error) -> Self {
        Self::Other(color_eyre::Report::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_formats() {
        let err = MainlineError::invalid_args("missing version");
        assert_eq!(err.to_string(), "Invalid arguments: missing version");

        let err = MainlineError::TagExists("v1.2.0".into());
        assert_eq!(
            err.to_string(),
            "Tag v1.2.0 already exists: re-run with --force to overwrite it"
        );
    }

    #[test]
    fn test_error_helpers() {
        let err = MainlineError::invalid_args("bad repo");
        assert!(matches!(err, MainlineError::InvalidArgs(_)));

        let err = MainlineError::unresolvable_conflict(&[
            "src/lib.rs".to_string(),
            "README.md".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "Merge produced conflicts outside the manifest: src/lib.rs, README.md"
        );
    }

    #[test]
    fn test_from_conversions() {
        let url_err = url::Url::parse("https://");
        assert!(url_err.is_err());
        let err: MainlineError = url_err.unwrap_err().into();
        assert!(matches!(err, MainlineError::UrlError(_)));
    }
}
