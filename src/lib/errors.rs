//! Error types for BAM decoding, encoding, and merging.
//!
//! Every failure the engine reports falls into one of three categories:
//!
//! - [`BamError::Format`]: the bytes on disk (or in memory) are not a valid BAM stream
//! - [`BamError::Validation`]: a caller-constructed value violates a record or header invariant
//! - [`BamError::Index`]: a reference ID or region name cannot be resolved
//!
//! File-level entry points return [`anyhow::Result`] with path context attached; the typed
//! error can be recovered with `err.downcast_ref::<BamError>()`.

use thiserror::Error;

/// Result type alias for codec, header, and reader operations.
pub type Result<T> = std::result::Result<T, BamError>;

/// Error type for lazybam operations.
#[derive(Error, Debug)]
pub enum BamError {
    /// Malformed, truncated, or structurally incompatible binary input.
    #[error("Invalid BAM data: {0}")]
    Format(String),

    /// Semantically invalid user-constructed data.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Out-of-range reference lookup or unresolvable region.
    #[error("Index error: {0}")]
    Index(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BamError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub(crate) fn index(msg: impl Into<String>) -> Self {
        Self::Index(msg.into())
    }

    /// Returns true for [`BamError::Format`].
    #[must_use]
    pub fn is_format(&self) -> bool {
        matches!(self, Self::Format(_))
    }

    /// Returns true for [`BamError::Validation`].
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true for [`BamError::Index`].
    #[must_use]
    pub fn is_index(&self) -> bool {
        matches!(self, Self::Index(_))
    }
}

/// Map a short or corrupt read on a record or header body to a format error.
///
/// A stream that ends in the middle of a structure is truncated input, and a BGZF block that
/// fails to inflate is corrupt input; neither is an I/O fault.
pub(crate) fn truncated(context: &str) -> impl FnOnce(std::io::Error) -> BamError + '_ {
    move |e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => BamError::Format(format!("truncated {context}")),
        std::io::ErrorKind::InvalidData => BamError::Format(format!("corrupt {context}: {e}")),
        _ => BamError::Io(e),
    }
}
