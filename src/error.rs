//! Error types for the holotree library
//!
//! Every fallible operation in the crate returns [`Result`] with
//! [`HolotreeError`]. Variants map onto the failure classes callers care
//! about: missing catalogs or objects, integrity violations, lock timeouts,
//! plain I/O trouble, and malformed catalog files.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the holotree library
pub type Result<T> = std::result::Result<T, HolotreeError>;

/// Main error type for all holotree operations
#[derive(Debug, Error)]
pub enum HolotreeError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during catalog serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catalog not found in the hololib
    #[error("Catalog not found: {0}")]
    CatalogNotFound(String),

    /// Object not found in the content-addressed library
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// Digest mismatch on integrity verification
    #[error("Hash mismatch - expected: {expected}, actual: {actual}")]
    HashMismatch {
        /// Expected digest value
        expected: String,
        /// Actual computed digest value
        actual: String,
    },

    /// A loaded catalog violates structural invariants
    #[error("Invalid catalog: {0}")]
    InvalidCatalog(String),

    /// Catalog format version differs from the supported one
    #[error("Unsupported catalog format: {0} (supported: {1})")]
    CatalogFormat(u32, u32),

    /// Catalog platform tag disagrees with the runtime platform
    #[error("Platform mismatch - catalog: {catalog}, runtime: {runtime}")]
    PlatformMismatch {
        /// Platform tag recorded in the catalog
        catalog: String,
        /// Platform tag of the running process
        runtime: String,
    },

    /// Target lock not acquired within the timeout
    #[error("Lock acquisition timeout on {0:?}")]
    LockTimeout(PathBuf),

    /// A relocation target does not fit the reserved rewrite window
    #[error("Relocation {target:?} does not fit rewrite window of {window} bytes")]
    RelocationOverflow {
        /// The base path that was requested
        target: PathBuf,
        /// Window size reserved at locator time
        window: usize,
    },

    /// None of the requested catalogs could be exported
    #[error("None of given catalogs were available for export")]
    ExportEmpty,

    /// Zip container errors during export
    #[error("Archive error: {0}")]
    Archive(String),

    /// Path contains components that cannot be represented in a catalog
    #[error("Path conversion error: {0:?}")]
    PathConversion(PathBuf),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<zip::result::ZipError> for HolotreeError {
    fn from(err: zip::result::ZipError) -> Self {
        HolotreeError::Archive(err.to_string())
    }
}

impl HolotreeError {
    /// Create an invalid-catalog error with a custom message
    pub fn invalid_catalog(msg: impl Into<String>) -> Self {
        HolotreeError::InvalidCatalog(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        HolotreeError::Internal(msg.into())
    }

    /// Check if this error is recoverable by retrying later
    pub fn is_recoverable(&self) -> bool {
        matches!(self, HolotreeError::LockTimeout(_))
    }

    /// Check if this error indicates on-disk corruption
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            HolotreeError::HashMismatch { .. } | HolotreeError::InvalidCatalog(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HolotreeError::CatalogNotFound("abc123".to_string());
        assert_eq!(err.to_string(), "Catalog not found: abc123");
    }

    #[test]
    fn test_error_recoverable() {
        assert!(HolotreeError::LockTimeout(PathBuf::from("/tmp/x.lck")).is_recoverable());
        assert!(!HolotreeError::ExportEmpty.is_recoverable());
    }

    #[test]
    fn test_error_corruption() {
        assert!(HolotreeError::HashMismatch {
            expected: "abc".to_string(),
            actual: "def".to_string(),
        }
        .is_corruption());
        assert!(!HolotreeError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "test"
        ))
        .is_corruption());
    }
}
