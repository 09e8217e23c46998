use std::io;

/// Errors raised by the deduplicating store.
#[derive(Debug, thiserror::Error)]
pub enum DedupError {
    /// The upload is larger than the configured ceiling. Nothing was stored.
    #[error("payload exceeds the limit of {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    /// No file record with this id.
    #[error("file not found: {0}")]
    NotFound(i64),

    /// A fingerprint passed in by the caller is not 64 hex characters.
    #[error("invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    /// A file record references content that does not exist.
    #[error("content {0} is referenced but missing")]
    MissingContent(String),

    /// A release would bring a reference count to or below zero outside of a purge.
    #[error("reference count of content {fingerprint} is corrupt: {count}")]
    CorruptReferenceCount { fingerprint: String, count: i64 },

    /// Reading the upload stream failed.
    #[error("input read error: {0}")]
    Read(#[source] io::Error),

    /// The database rejected an operation.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Blob or spool I/O failed while persisting a payload.
    #[error("storage I/O error: {0}")]
    StorageIo(#[source] io::Error),
}

impl DedupError {
    /// `true` for errors that mean the store itself is inconsistent.
    #[must_use]
    pub fn is_consistency_fault(&self) -> bool {
        matches!(
            self,
            Self::MissingContent(_) | Self::CorruptReferenceCount { .. }
        )
    }

    /// `true` for errors caused by caller input rather than the store.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::PayloadTooLarge { .. } | Self::NotFound(_) | Self::InvalidFingerprint(_)
        )
    }
}

/// Result alias for store operations.
pub type DedupResult<T> = Result<T, DedupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consistency_faults_are_distinct_from_not_found() {
        // Arrange
        let missing = DedupError::MissingContent("ab".to_owned());
        let corrupt = DedupError::CorruptReferenceCount {
            fingerprint: "ab".to_owned(),
            count: 0,
        };
        let not_found = DedupError::NotFound(1);

        // Act & Assert
        assert!(missing.is_consistency_fault());
        assert!(corrupt.is_consistency_fault());
        assert!(!not_found.is_consistency_fault());
        assert!(not_found.is_client_error());
        assert!(!missing.is_client_error());
    }
}
