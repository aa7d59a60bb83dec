//! Error handling for the UpdatePulse client.
//!
//! The error system is built around a single strongly-typed enum,
//! [`UpdateError`], so that callers can match on precise failure modes:
//!
//! - **Network**: transport-level failures and timeouts - safe to retry
//!   externally, no local state was changed
//! - **Server**: the server answered but the response was unusable
//!   (non-success status, unparseable JSON, missing fields) - surfaced
//!   verbatim, never retried internally
//! - **License**: [`UpdateError::LicenseRejected`] when the server reports
//!   the key invalid
//! - **Local state**: [`UpdateError::ConfigCorrupt`],
//!   [`UpdateError::NotInstalled`], [`UpdateError::CorruptArchive`]
//! - **Pipeline**: [`UpdateError::StageFailed`] wraps any failure inside the
//!   update pipeline with the [`UpdateStage`] it occurred in
//!
//! Common standard library errors convert automatically:
//! [`std::io::Error`] → [`UpdateError::Io`].
//!
//! No operation in this crate retries internally; every failure propagates
//! to the caller with enough context to log and alert.

use std::fmt;
use thiserror::Error;

/// Convenience alias used by every fallible operation in this crate.
pub type Result<T> = std::result::Result<T, UpdateError>;

/// The main error type for UpdatePulse client operations.
///
/// Each variant represents a specific failure mode and carries the context
/// needed to report it: the operation that failed, the path involved, or
/// the reason reported by the server.
#[derive(Error, Debug)]
pub enum UpdateError {
    /// Transport-level failure talking to the update server.
    ///
    /// Covers connection errors and the bounded request timeout. The
    /// operation performed no local state change and is safe to retry
    /// externally.
    #[error("network error during {operation}: {reason}")]
    Network {
        /// The remote operation that failed (e.g., "fetch_metadata").
        operation: String,
        /// The underlying transport error, rendered as text.
        reason: String,
    },

    /// The server responded, but the response was unusable.
    ///
    /// Raised on non-success HTTP status, unparseable JSON, or a response
    /// missing required fields.
    #[error("invalid server response during {operation}: {reason}")]
    Server {
        /// The remote operation that received the bad response.
        operation: String,
        /// Why the response was rejected.
        reason: String,
    },

    /// The server rejected the license key during activation.
    ///
    /// Local state is left unchanged; the caller decides whether to
    /// surface this to a user or retry with a different key.
    #[error("license rejected by server: {reason}")]
    LicenseRejected {
        /// The server's response body, or a description of what was
        /// missing from it.
        reason: String,
    },

    /// The downloaded archive could not be extracted.
    ///
    /// The staging area is discarded; the installation is untouched.
    #[error("corrupt package archive {path}: {reason}")]
    CorruptArchive {
        /// Path of the offending archive.
        path: String,
        /// Why extraction failed.
        reason: String,
    },

    /// The persisted package record is unreadable or malformed.
    ///
    /// Fatal to all operations until resolved externally.
    #[error("package config {path} is corrupt: {reason}")]
    ConfigCorrupt {
        /// Path of the persisted record.
        path: String,
        /// Parse or read failure description.
        reason: String,
    },

    /// A license or update operation was invoked without the installed
    /// marker present (or without a license key where one is required).
    /// This is a caller logic error, not a transient condition.
    #[error("package is not installed")]
    NotInstalled,

    /// An update pipeline stage failed.
    ///
    /// Wraps the underlying error with the stage it occurred in so the
    /// caller can tell a failed download from a failed swap.
    #[error("update failed during {stage}: {source}")]
    StageFailed {
        /// The pipeline stage that failed.
        stage: UpdateStage,
        /// The underlying failure.
        #[source]
        source: Box<UpdateError>,
    },

    /// Filesystem I/O error outside the variants above.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl UpdateError {
    /// Wrap this error with the update pipeline stage it occurred in.
    #[must_use]
    pub fn at_stage(self, stage: UpdateStage) -> Self {
        Self::StageFailed {
            stage,
            source: Box::new(self),
        }
    }
}

/// Stages of the update pipeline, in execution order.
///
/// Used in [`UpdateError::StageFailed`] to report where a run failed. The
/// pipeline is linear; there is no branching back to an earlier stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStage {
    /// Querying the server for update metadata.
    CheckMetadata,
    /// Downloading the package archive.
    Download,
    /// Extracting the archive into the staging directory.
    Extract,
    /// Replacing the installation directory contents. A failure here can
    /// leave a mixed old/new tree; the engine does not roll back.
    Swap,
    /// Normalizing permissions and persisting the updated record.
    Finalize,
}

impl fmt::Display for UpdateStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CheckMetadata => "metadata check",
            Self::Download => "download",
            Self::Extract => "extraction",
            Self::Swap => "swap",
            Self::Finalize => "finalization",
        };
        f.write_str(name)
    }
}
