//! Error taxonomy of a fetch cycle.

use thiserror::Error;

/// A single weather or geocoding request that produced no data.
///
/// Callers treat this as "data unavailable" for that half of the cycle,
/// never as a fatal error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl FetchError {
    /// HTTP status, when the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            FetchError::Status { message, .. } => message,
            FetchError::Transport(message) | FetchError::Decode(message) => message,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => FetchError::Status {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => FetchError::Transport(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Decode(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Location unavailable: {0}")]
    Unavailable(String),
}

/// Why a fetch cycle ended without reaching the weather calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CycleError {
    #[error("Permission denied")]
    PermissionDenied,

    #[error("Unable to get location: {0}")]
    LocationUnavailable(String),

    #[error("Unable to find city name")]
    GeocodeUnresolved,

    #[error("Invalid format: {0}")]
    InvalidManualInput(String),

    #[error("Fetch cancelled by a newer request")]
    Cancelled,
}

impl From<LocationError> for CycleError {
    fn from(err: LocationError) -> Self {
        match err {
            LocationError::PermissionDenied => CycleError::PermissionDenied,
            LocationError::Unavailable(reason) => CycleError::LocationUnavailable(reason),
        }
    }
}
