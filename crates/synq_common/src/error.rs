//! Error types for the synq activity store.

use chrono::NaiveDateTime;
use thiserror::Error;

/// Result alias used by the drivers and the facade.
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    /// A sample referenced a device that was never registered.
    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    /// The store could not be reached or rejected the operation.
    #[error("{backend} backend unavailable: {reason}")]
    BackendUnavailable {
        backend: &'static str,
        reason: String,
    },

    /// The remote read loop received a page larger than it asked for.
    #[error("Pagination mismatch at offset {offset}: asked for {page_size} rows, got {received}")]
    PaginationExhaustionMismatch {
        offset: usize,
        page_size: usize,
        received: usize,
    },

    #[error("Invalid aggregation window: start {start} is not before end {end}")]
    InvalidWindow {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },

    #[error("Device id must not be empty")]
    InvalidDeviceId,

    /// A row returned by the store could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn unavailable(backend: &'static str, reason: impl std::fmt::Display) -> Self {
        StoreError::BackendUnavailable {
            backend,
            reason: reason.to_string(),
        }
    }

    /// Only transport failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::BackendUnavailable { .. })
    }

    /// Stable short code for logs and CLI exit reporting.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::UnknownDevice(_) => "unknown_device",
            StoreError::BackendUnavailable { .. } => "backend_unavailable",
            StoreError::PaginationExhaustionMismatch { .. } => "pagination_mismatch",
            StoreError::InvalidWindow { .. } => "invalid_window",
            StoreError::InvalidDeviceId => "invalid_device_id",
            StoreError::Decode(_) => "decode",
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::unavailable("relational", e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Decode(e.to_string())
    }
}
