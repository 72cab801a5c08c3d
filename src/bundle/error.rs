//! Bundle error types.

use std::io;
use thiserror::Error;

/// Errors raised while reading, writing or filtering a kernel bundle.
#[derive(Debug, Error)]
pub enum BundleError {
    /// The outer compression layer or the tar framing could not be decoded.
    #[error("malformed kernel bundle: {reason}")]
    InvalidFormat { reason: String },

    /// The first frame is not the manifest.
    #[error("missing manifest data (first entry is {found:?})")]
    MissingManifest { found: String },

    /// Payload frames do not match the manifest.
    #[error("kernel bundle is corrupt: expected {expected}, found {found}")]
    Corrupt { expected: String, found: String },

    #[error("manifest JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for bundle operations.
pub type BundleResult<T> = Result<T, BundleError>;

impl BundleError {
    pub(crate) fn invalid_format(reason: impl Into<String>) -> Self {
        BundleError::InvalidFormat {
            reason: reason.into(),
        }
    }

    pub(crate) fn corrupt(expected: impl Into<String>, found: impl Into<String>) -> Self {
        BundleError::Corrupt {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Recover a bundle error carried inside an I/O error.
    ///
    /// Errors raised by the filtering producer reach the reader of a
    /// [`FilteredStream`](super::FilteredStream) as `io::Error`s.
    pub fn from_io(err: &io::Error) -> Option<&BundleError> {
        err.get_ref()?.downcast_ref::<BundleError>()
    }

    /// True for frame/manifest mismatches, including a missing manifest.
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            BundleError::Corrupt { .. } | BundleError::MissingManifest { .. }
        )
    }
}

impl From<BundleError> for io::Error {
    fn from(err: BundleError) -> Self {
        match err {
            BundleError::Io(inner) => inner,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
