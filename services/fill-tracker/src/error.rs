//! Error types for the fill tracker

use thiserror::Error;

/// Tracker-specific error types
#[derive(Error, Debug)]
pub enum TrackerError {
    /// Database access failure
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP transport failure talking to a venue
    #[error("venue transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A venue answered but the payload was rejected or malformed
    #[error("venue response invalid: {context}")]
    Venue {
        /// What was being parsed and why it failed
        context: String,
    },

    /// A stored order row could not be decoded into the domain model
    #[error("stored order data invalid: {context}")]
    Decode {
        /// The offending column or value
        context: String,
    },

    /// Missing or unusable configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// I/O failure outside the database and HTTP paths
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Type alias for tracker results
pub type TrackerResult<T> = Result<T, TrackerError>;
