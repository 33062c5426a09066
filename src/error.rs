// Error taxonomy for the session layer

use std::time::Duration;
use thiserror::Error;

use crate::session::Role;

/// Errors surfaced to callers of the authorized request path
#[derive(Error, Debug)]
pub enum ApiError {
    /// Transport failure, no response to classify. Not retried here.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Credential renewal failed, or a renewed credential was rejected
    /// again. The session has been torn down and the client returned to
    /// the login view.
    #[error("session reset: {0}")]
    SessionReset(#[source] RefreshError),

    /// The server recognized the credential but refused the operation.
    /// Never enters renewal.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Error payload from a domain endpoint (statuses other than 401/403)
    #[error("api error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Anything else
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Failures of a renewal episode.
/// Clone because a single renewal outcome fans out to every call waiting
/// on the shared ticket.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// No refresh credential in the store; nothing to renew with
    #[error("no refresh credential available")]
    MissingRefresh,

    /// The refresh endpoint rejected the credential
    #[error("refresh rejected: {0}")]
    Rejected(String),

    /// Transport failure during the renewal call
    #[error("renewal request failed: {0}")]
    Network(String),

    /// The renewal call exceeded its bounded timeout
    #[error("renewal timed out after {0:?}")]
    TimedOut(Duration),

    /// The new credential could not be persisted
    #[error("credential storage failed: {0}")]
    Storage(String),

    /// Renewal succeeded but the renewed credential was rejected on the
    /// retried call (e.g. revoked server-side)
    #[error("renewed access credential was rejected")]
    AccessRejected,
}

/// Failures of login and the other public authentication calls
#[derive(Error, Debug)]
pub enum AuthError {
    /// The backend rejected the identifier/secret
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Signed in successfully, but not as the expected role
    #[error("signed in as '{actual}', expected {expected}")]
    RoleMismatch { expected: Role, actual: String },

    /// The backend rejected a password-reset step
    #[error("request rejected: {0}")]
    Rejected(String),

    /// Transport failure, no response
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The session could not be persisted after a successful login
    #[error("credential storage failed: {0}")]
    Storage(String),

    /// Response body did not carry the expected fields
    #[error("malformed response from the backend")]
    MalformedResponse,
}
