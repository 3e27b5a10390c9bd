use std::sync::Arc;

use crate::hits::HitError;

/// Represents a result type for operations in the Flagship SDK.
///
/// This `Result` type is a standard Rust `Result` type where the error variant is defined by the
/// SDK-specific [`Error`] enum.
pub type Result<T> = std::result::Result<T, Error>;

/// Enum representing possible errors that can occur in the Flagship SDK.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Invalid base URL configuration.
    #[error("invalid base_url configuration")]
    InvalidBaseUrl(#[source] url::ParseError),

    /// The server answered with a status code that is neither a success nor an expected
    /// not-modified response.
    #[error("unexpected http status {status} from {url}")]
    UnexpectedStatus {
        /// Status code received from the server.
        status: u16,
        /// URL that was requested.
        url: String,
    },

    /// A hit was rejected because one or more of its required fields were missing or invalid.
    #[error("hit failed validation: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join(", "))]
    InvalidHit(Vec<HitError>),

    /// The visitor landed outside of every variation bucket. This happens when the variation
    /// weights of a group sum to less than 100.
    #[error("no variation allocated for visitor {visitor_id} in variation group {variation_group_id}")]
    VisitorUnallocated {
        /// Visitor that could not be bucketed.
        visitor_id: String,
        /// Variation group that was evaluated.
        variation_group_id: String,
    },

    /// An I/O error.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),

    /// Network error.
    #[error(transparent)]
    Network(Arc<reqwest::Error>),
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Io(Arc::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Network(Arc::new(value.without_url()))
    }
}
