//! Failure taxonomy for a scan cycle
//!
//! Only [`PersistenceError`] escapes a cycle. Everything else is scoped to a
//! single feed, item or channel and is logged and skipped by the pipeline.

use thiserror::Error;

/// A feed that could not be fetched or parsed
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("could not parse feed {url}: {reason}")]
    Parse { url: String, reason: String },
}

/// The language model reply could not be turned into a description and price
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("extraction request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("extraction service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed extraction reply: {0}")]
    Malformed(String),
}

/// A sub-estimator, or the ensemble as a whole, produced no value
#[derive(Debug, Error)]
pub enum EstimationError {
    #[error("{estimator} request failed: {source}")]
    Request {
        estimator: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{estimator} returned HTTP {status}")]
    Status { estimator: String, status: u16 },

    #[error("{estimator} returned an unusable value: {reason}")]
    InvalidResponse { estimator: String, reason: String },

    #[error("estimator {estimator} failed: {reason}")]
    Member { estimator: String, reason: String },

    #[error("every estimator failed")]
    AllFailed,
}

/// The memory file could not be read or written
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("memory file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("memory file {path} is not valid: {source}")]
    Format {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("csv export failed: {0}")]
    Csv(#[from] csv::Error),
}

/// A single notification channel rejected or failed to deliver an alert
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("{channel} request failed: {source}")]
    Request {
        channel: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{channel} returned HTTP {status}")]
    Status { channel: &'static str, status: u16 },
}

/// Errors that abort a scan cycle
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
