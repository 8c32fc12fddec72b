//! Error handling for grove
//!
//! Two layers make up the error system:
//! 1. [`GroveError`], a strongly-typed enum for every failure the core can report
//! 2. [`ErrorContext`], a wrapper adding user-facing details and suggestions
//!
//! Library code returns `anyhow::Result` and attaches [`GroveError`] values where
//! callers need to branch on the failure kind (for example the installer telling
//! a [`GroveError::WrongVcs`] apart from a network failure). The binary converts
//! whatever reaches `main` with [`user_friendly_error`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use grove::core::{GroveError, user_friendly_error};
//!
//! let err = anyhow::Error::from(GroveError::DirtyCheckout {
//!     name: "github.com/pkg/errors".to_string(),
//! });
//! user_friendly_error(err).display();
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for grove operations.
///
/// Variants are grouped by the component that raises them: the VCS adapter,
/// the config/lock data model, version constraints, and the cache store.
#[derive(Error, Debug)]
pub enum GroveError {
    /// A VCS command exited with a non-zero status.
    #[error("{vcs} operation failed: {operation}")]
    VcsCommandError {
        /// Client that ran (git, hg, svn, bzr)
        vcs: String,
        /// Sub-command that failed (e.g. "clone", "pull", "update")
        operation: String,
        /// Error output from the client
        stderr: String,
    },

    /// The client binary for a VCS is not installed.
    #[error("{vcs} is not installed or not found in PATH")]
    VcsNotFound {
        /// Missing client name
        vcs: String,
    },

    /// Initial fetch of a repository failed.
    #[error("Failed to fetch repository: {remote}")]
    VcsGetFailed {
        /// Remote that could not be fetched
        remote: String,
        /// Client error output
        reason: String,
    },

    /// Switching a working copy to a reference failed.
    #[error("Failed to set version to '{reference}'")]
    VcsUpdateVersionFailed {
        /// Reference that could not be checked out
        reference: String,
        /// Client error output
        reason: String,
    },

    /// No VCS type could be determined for a remote.
    #[error("Unable to determine the VCS type for {remote}")]
    CannotDetectVcs {
        /// Remote URL or import path
        remote: String,
    },

    /// An existing checkout uses a different VCS than configured.
    #[error("Checkout at {path} is {found}, but {expected} was expected")]
    WrongVcs {
        /// Local working copy
        path: String,
        /// Configured or detected-from-remote type
        expected: String,
        /// Type found on disk
        found: String,
    },

    /// An existing checkout points at a different remote than configured.
    #[error("Checkout at {path} tracks {found}, but {expected} was expected")]
    WrongRemote {
        /// Local working copy
        path: String,
        /// Configured remote
        expected: String,
        /// Remote recorded in the checkout
        found: String,
    },

    /// A cached working copy has uncommitted changes.
    #[error("{name} contains uncommitted changes. Skipping update")]
    DirtyCheckout {
        /// Dependency name
        name: String,
    },

    /// No `grove.yaml` in the working directory or any parent.
    #[error("Manifest file grove.yaml not found in current directory or any parent directory")]
    ManifestNotFound,

    /// The manifest could not be parsed.
    #[error("Invalid manifest file syntax in {file}")]
    ManifestParseError {
        /// Manifest path
        file: String,
        /// Parser message
        reason: String,
    },

    /// The same import is declared twice with incompatible metadata.
    #[error("Import {name} repeated with different {reason}")]
    DuplicateImport {
        /// Root import path
        name: String,
        /// What differs between the declarations
        reason: String,
    },

    /// The lockfile could not be parsed.
    #[error("Invalid lockfile syntax in {file}")]
    LockfileParseError {
        /// Lockfile path
        file: String,
        /// Parser message
        reason: String,
    },

    /// A dev import duplicates an import with a different reference.
    #[error(
        "Import '{name}' is listed in both imports and dev imports with different versions ('{import_ref}' vs '{dev_ref}')"
    )]
    DevImportConflict {
        /// Root import path
        name: String,
        /// Reference from imports
        import_ref: String,
        /// Reference from dev imports
        dev_ref: String,
    },

    /// A reference is neither a VCS reference nor a valid semver constraint.
    #[error("Invalid version constraint: {constraint}")]
    InvalidVersionConstraint {
        /// The rejected constraint
        constraint: String,
        /// Why it was rejected
        reason: String,
    },

    /// A remote URL could not be turned into a cache key.
    #[error("Unable to generate a cache key for {url}")]
    CacheKeyError {
        /// Remote URL
        url: String,
        /// Parse failure
        reason: String,
    },

    /// Generic configuration problem.
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Anything else
    #[error("{message}")]
    Other {
        /// Message
        message: String,
    },
}

impl Clone for GroveError {
    fn clone(&self) -> Self {
        match self {
            Self::VcsCommandError {
                vcs,
                operation,
                stderr,
            } => Self::VcsCommandError {
                vcs: vcs.clone(),
                operation: operation.clone(),
                stderr: stderr.clone(),
            },
            Self::VcsNotFound {
                vcs,
            } => Self::VcsNotFound {
                vcs: vcs.clone(),
            },
            Self::VcsGetFailed {
                remote,
                reason,
            } => Self::VcsGetFailed {
                remote: remote.clone(),
                reason: reason.clone(),
            },
            Self::VcsUpdateVersionFailed {
                reference,
                reason,
            } => Self::VcsUpdateVersionFailed {
                reference: reference.clone(),
                reason: reason.clone(),
            },
            Self::CannotDetectVcs {
                remote,
            } => Self::CannotDetectVcs {
                remote: remote.clone(),
            },
            Self::WrongVcs {
                path,
                expected,
                found,
            } => Self::WrongVcs {
                path: path.clone(),
                expected: expected.clone(),
                found: found.clone(),
            },
            Self::WrongRemote {
                path,
                expected,
                found,
            } => Self::WrongRemote {
                path: path.clone(),
                expected: expected.clone(),
                found: found.clone(),
            },
            Self::DirtyCheckout {
                name,
            } => Self::DirtyCheckout {
                name: name.clone(),
            },
            Self::ManifestNotFound => Self::ManifestNotFound,
            Self::ManifestParseError {
                file,
                reason,
            } => Self::ManifestParseError {
                file: file.clone(),
                reason: reason.clone(),
            },
            Self::DuplicateImport {
                name,
                reason,
            } => Self::DuplicateImport {
                name: name.clone(),
                reason: reason.clone(),
            },
            Self::LockfileParseError {
                file,
                reason,
            } => Self::LockfileParseError {
                file: file.clone(),
                reason: reason.clone(),
            },
            Self::DevImportConflict {
                name,
                import_ref,
                dev_ref,
            } => Self::DevImportConflict {
                name: name.clone(),
                import_ref: import_ref.clone(),
                dev_ref: dev_ref.clone(),
            },
            Self::InvalidVersionConstraint {
                constraint,
                reason,
            } => Self::InvalidVersionConstraint {
                constraint: constraint.clone(),
                reason: reason.clone(),
            },
            Self::CacheKeyError {
                url,
                reason,
            } => Self::CacheKeyError {
                url: url.clone(),
                reason: reason.clone(),
            },
            Self::ConfigError {
                message,
            } => Self::ConfigError {
                message: message.clone(),
            },
            // io::Error is not Clone; keep the kind and message
            Self::IoError(e) => Self::IoError(std::io::Error::new(e.kind(), e.to_string())),
            Self::Other {
                message,
            } => Self::Other {
                message: message.clone(),
            },
        }
    }
}

impl GroveError {
    /// True for the mismatch errors that `--force` is allowed to override.
    #[must_use]
    pub const fn is_replaceable_mismatch(&self) -> bool {
        matches!(self, Self::WrongVcs { .. } | Self::WrongRemote { .. })
    }
}

/// Error plus optional details and a suggested fix, for display in the CLI.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: GroveError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Wrap an error with no suggestion or details.
    #[must_use]
    pub const fn new(error: GroveError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion (shown in green).
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add details (shown in yellow).
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr with terminal colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into an [`ErrorContext`] with suggestions where one is known.
///
/// [`GroveError`] values anywhere in the chain are recognized; IO errors get
/// generic filesystem advice; everything else keeps its full cause chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    for cause in error.chain() {
        if let Some(grove_error) = cause.downcast_ref::<GroveError>() {
            let mut ctx = create_error_context(grove_error.clone());
            if ctx.details.is_none() && error.chain().count() > 1 {
                ctx.details = Some(error.to_string());
            }
            return ctx;
        }
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                return ErrorContext::new(GroveError::Other {
                    message: format!("{error:#}"),
                })
                .with_suggestion("Check file ownership of the project and of the grove home directory");
            }
            std::io::ErrorKind::NotFound => {
                return ErrorContext::new(GroveError::Other {
                    message: format!("{error:#}"),
                })
                .with_suggestion("Check that the file or directory exists and the path is correct");
            }
            _ => {}
        }
    }

    let mut message = error.to_string();
    let chain: Vec<String> =
        error.chain().skip(1).map(std::string::ToString::to_string).collect();

    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(GroveError::Other {
        message,
    })
}

fn create_error_context(error: GroveError) -> ErrorContext {
    match &error {
        GroveError::VcsNotFound { vcs } => {
            let hint = format!("Install {vcs} with your package manager and make sure it is on PATH");
            ErrorContext::new(error).with_suggestion(hint)
        }
        GroveError::VcsCommandError { stderr, .. } => {
            let details = stderr.trim().to_string();
            ErrorContext::new(error)
                .with_details(details)
                .with_suggestion("Check the repository URL, your network connection and credentials")
        }
        GroveError::VcsGetFailed { reason, .. } => {
            let details = reason.trim().to_string();
            ErrorContext::new(error)
                .with_details(details)
                .with_suggestion("Verify the dependency's repo setting in grove.yaml")
        }
        GroveError::WrongVcs { .. } | GroveError::WrongRemote { .. } => ErrorContext::new(error)
            .with_suggestion("Re-run with --force to replace the cached copy"),
        GroveError::DirtyCheckout { .. } => ErrorContext::new(error)
            .with_suggestion("Commit, stash or discard the changes in the cached working copy, or run 'grove cache-clear'"),
        GroveError::ManifestNotFound => ErrorContext::new(error)
            .with_suggestion("Create a grove.yaml file in your project directory")
            .with_details("grove looks for grove.yaml in the current directory and parent directories"),
        GroveError::ManifestParseError { reason, .. } | GroveError::LockfileParseError { reason, .. } => {
            let details = reason.clone();
            ErrorContext::new(error)
                .with_details(details)
                .with_suggestion("Check the YAML syntax: indentation, list markers and quoting")
        }
        GroveError::DuplicateImport { .. } => ErrorContext::new(error)
            .with_suggestion("Merge the duplicate entries in grove.yaml into a single import"),
        GroveError::DevImportConflict { .. } => ErrorContext::new(error)
            .with_suggestion("Use the same version for the import and the dev import, or remove one of them"),
        GroveError::InvalidVersionConstraint { reason, .. } => {
            let details = reason.clone();
            ErrorContext::new(error)
                .with_details(details)
                .with_suggestion("Use a tag, branch, revision or a range such as '^1.2.0' or '>= 1.0, < 2.0'")
        }
        _ => ErrorContext::new(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_error_display() {
        let err = GroveError::DuplicateImport {
            name: "github.com/a/b".to_string(),
            reason: "versions '^1.0' and '^2.0'".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Import github.com/a/b repeated with different versions '^1.0' and '^2.0'"
        );
    }

    #[test]
    fn test_replaceable_mismatch() {
        let wrong = GroveError::WrongVcs {
            path: "/tmp/x".to_string(),
            expected: "git".to_string(),
            found: "hg".to_string(),
        };
        assert!(wrong.is_replaceable_mismatch());
        assert!(
            !GroveError::DirtyCheckout {
                name: "x".to_string()
            }
            .is_replaceable_mismatch()
        );
    }

    #[test]
    fn test_user_friendly_error_finds_grove_error_in_chain() {
        let result: anyhow::Result<()> =
            Err(GroveError::ManifestNotFound).context("Failed to load project");
        let ctx = user_friendly_error(result.unwrap_err());
        assert!(matches!(ctx.error, GroveError::ManifestNotFound));
        assert!(ctx.suggestion.is_some());
    }

    #[test]
    fn test_user_friendly_error_generic_chain() {
        let err = anyhow::anyhow!("inner").context("outer");
        let ctx = user_friendly_error(err);
        let rendered = ctx.to_string();
        assert!(rendered.contains("outer"));
        assert!(rendered.contains("Caused by"));
        assert!(rendered.contains("inner"));
    }

    #[test]
    fn test_clone_io_error() {
        let err = GroveError::IoError(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        let cloned = err.clone();
        assert_eq!(cloned.to_string(), err.to_string());
    }
}
