use std::path::PathBuf;
use thiserror::Error;

/// Error taxonomy for backup/restore operations.
///
/// Per-entity failures (`CollaboratorFailure`, `IoFailure`) are collected
/// into operation reports and do not abort processing. The remaining
/// variants are fatal for the operation that raised them.
#[derive(Debug, Error)]
pub enum Error {
    /// A snapshot key or archive member does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A diff was requested without enough snapshots to resolve defaults.
    #[error("at least two snapshots are required to calculate a diff when no cutoff is given")]
    InsufficientSnapshots,

    /// A tracked-path pattern references an environment variable that is
    /// not set in the current environment.
    #[error("unresolved variable `${var}` in pattern `{pattern}`")]
    UnresolvedVariable { pattern: String, var: String },

    /// An external package-manager or configuration-store command failed.
    #[error("collaborator command failed: {0}")]
    CollaboratorFailure(String),

    /// A filesystem read/write failed for a specific entry.
    #[error("I/O failure on {}: {source}", path.display())]
    IoFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The backup archive could not be read in full. Restore aborts
    /// before touching the live filesystem.
    #[error("archive unreadable: {0}")]
    ArchiveUnreadable(String),
}

impl Error {
    /// Whether this error aborts the whole operation rather than being
    /// collected into the failure summary.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::InsufficientSnapshots
                | Self::ArchiveUnreadable(_)
                | Self::UnresolvedVariable { .. }
        )
    }
}
