//! Error taxonomy for the credential lifecycle and the Gmail resource clients.
//!
//! `AuthenticationError` is the umbrella surfaced by `Authenticator::authenticate`;
//! the lower-level variants keep their root cause attached so failures can be
//! diagnosed from the log without a stack trace.

use std::path::PathBuf;

use thiserror::Error;

/// A token record on disk could not be read or written.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to read token file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("token file {path} is malformed")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write token file {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The identity provider rejected or failed a refresh-token exchange.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// Provider-side rejection, e.g. `invalid_grant` for a revoked grant.
    #[error("identity provider rejected the refresh token: {error}")]
    Rejected { error: String },

    #[error("token refresh request failed")]
    Transport(#[source] reqwest::Error),

    #[error("token refresh response could not be decoded")]
    Decode(#[source] reqwest::Error),
}

/// The interactive consent flow failed or was abandoned.
#[derive(Debug, Error)]
pub enum ConsentError {
    #[error("consent callback timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// The user (or the provider) denied the authorization request.
    #[error("authorization was denied: {error} {description}")]
    Denied { error: String, description: String },

    #[error("consent callback state mismatch")]
    StateMismatch,

    #[error("consent callback was malformed: {reason}")]
    Callback { reason: String },

    #[error("failed to listen for the consent callback")]
    Listener(#[source] std::io::Error),

    #[error("authorization code exchange was rejected: {error}")]
    ExchangeRejected { error: String },

    #[error("authorization code exchange failed")]
    Exchange(#[source] reqwest::Error),
}

/// Umbrella error returned by `Authenticator::authenticate`.
#[derive(Debug, Error)]
pub enum AuthenticationError {
    #[error("token storage failed")]
    Storage(#[from] StorageError),

    #[error("token refresh failed")]
    Refresh(#[from] RefreshError),

    #[error("interactive consent failed")]
    Consent(#[from] ConsentError),

    /// A session handed to `service` carries no usable credential.
    #[error("session for '{user}' holds no usable credential")]
    InvalidSession { user: String },
}

/// Error from the Gmail resource clients. Every operation goes through the same
/// wrapper, so the failing operation is always named.
#[derive(Debug, Error)]
pub enum GmailError {
    #[error("gmail '{operation}' failed with status {status}: {body}")]
    Api {
        operation: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("gmail '{operation}' request failed")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("gmail '{operation}' response could not be decoded")]
    Decode {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },
}
