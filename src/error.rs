#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Typed errors shared across the grading pipeline and event intake.

use std::time::Duration;

use thiserror::Error;

/// Rejections raised while validating a grading submission, before any work
/// is performed.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The repository URL is missing or does not resolve to an `owner/repo`
    /// pair on the configured host.
    #[error("invalid or missing repository URL: {0:?}")]
    InvalidRepositoryUrl(String),
    /// The branch name is missing or blank.
    #[error("invalid or missing branch name")]
    MissingBranchName,
    /// The instructor's grading instructions are missing or blank.
    #[error("invalid or missing grading instructions")]
    MissingInstructions,
}

/// Failures while fetching and unpacking a submission archive.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// The URL did not match the `github.com/{owner}/{repo}` shape.
    #[error("repository URL does not match an owner/repo shape: {0:?}")]
    InvalidUrl(String),
    /// The downloaded archive had no single root directory to extract.
    #[error("archive for `{reference}` is empty or malformed")]
    EmptyOrMalformedArchive {
        /// The ref whose archive was requested.
        reference: String,
    },
    /// The archive exceeded the configured size cap.
    #[error("archive exceeds the {limit_bytes} byte limit")]
    ArchiveTooLarge {
        /// Maximum number of bytes the acquirer will accept.
        limit_bytes: u64,
    },
    /// The hosting API answered with a non-success status.
    #[error("archive download for `{reference}` failed with HTTP {status}")]
    HttpStatus {
        /// HTTP status code returned by the hosting API.
        status:    u16,
        /// The ref whose archive was requested.
        reference: String,
    },
    /// The download did not complete within the configured deadline.
    #[error("archive download timed out after {0:?}")]
    Timeout(Duration),
    /// Network-level failure talking to the hosting API.
    #[error("network failure during archive download: {0}")]
    Network(#[from] reqwest::Error),
    /// Filesystem failure while staging the workspace.
    #[error("workspace I/O failure: {0}")]
    Io(#[from] std::io::Error),
    /// The downloaded bytes were not a readable archive.
    #[error("could not read archive: {0}")]
    Archive(#[from] zip::result::ZipError),
}

/// Failures talking to the durable record store.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// No record store credentials were configured.
    #[error("record store is not configured; set SUPABASE_URL and SUPABASE_ANON_KEY")]
    Unconfigured,
    /// Transport-level failure reaching the store.
    #[error("record store request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The store answered with a non-success status.
    #[error("record store rejected the request: {message}")]
    Backend {
        /// Response body returned by the store.
        message: String,
    },
    /// A stored row or outgoing record could not be (de)serialized.
    #[error("could not decode record payload: {0}")]
    Decode(#[from] serde_json::Error),
    /// No record exists with the requested id.
    #[error("no review record found with id `{id}`")]
    NotFound {
        /// The id that was looked up.
        id: String,
    },
}

/// Top-level failure modes of a grading call.
///
/// Scorer and configuration failures never appear here: the quality adapter
/// downgrades them to a zero-score result so grading degrades gracefully
/// instead of aborting (see [`crate::quality`]).
#[derive(Debug, Error)]
pub enum GradeError {
    /// The submission was malformed; nothing was executed.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The submission content could not be acquired.
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),
    /// The final result could not be persisted (the dedup read path fails
    /// open and never raises this).
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Rejections raised while verifying and parsing an incoming change event.
#[derive(Debug, Error)]
pub enum EventError {
    /// No webhook secret is configured, so nothing can be verified.
    #[error("no webhook secret configured; set GITHUB_WEBHOOK_SECRET")]
    MissingSecret,
    /// The event carried no signature header.
    #[error("change event is missing a signature header")]
    MissingSignature,
    /// The signature header was not of the form `sha256=<hex>`.
    #[error("change event signature header is malformed")]
    MalformedSignature,
    /// The keyed hash over the raw payload did not match the signature.
    #[error("change event signature does not match the payload")]
    SignatureMismatch,
    /// The verified payload could not be parsed into a change event.
    #[error("change event payload is malformed: {0}")]
    MalformedPayload(#[from] serde_json::Error),
    /// Persisting the classification result failed.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
