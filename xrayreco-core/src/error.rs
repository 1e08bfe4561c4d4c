//! Error types for xrayreco-core.

use crate::coord::LogicalCoord;
use thiserror::Error;

/// Result type alias for xrayreco operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for xrayreco operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Header metadata does not describe a constructible grid.
    #[error("invalid grid configuration: {0}")]
    InvalidGridConfiguration(String),

    /// The central pixel does not have all six neighbors (sensor edge).
    #[error("incomplete neighborhood around {center}: found {found} of 6 neighbors")]
    IncompleteNeighborhood { center: LogicalCoord, found: usize },

    /// A pixel coordinate does not lie inside the grid.
    #[error("coordinate {coord} lies outside the grid")]
    CoordinateOutOfBounds { coord: LogicalCoord },

    /// Six neighbors were reported but they do not occupy six distinct directions.
    #[error("inconsistent neighborhood around {center}: {reason}")]
    InconsistentNeighborhood { center: LogicalCoord, reason: String },

    /// A pixel maps to a channel outside the event's signal array.
    #[error("acquisition channel {channel} out of range for {channels} channels")]
    ChannelOutOfRange { channel: usize, channels: usize },

    /// The underlying event source failed mid-iteration.
    #[error("event stream read failure: {0}")]
    StreamReadFailure(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Target assembly was requested on a source without Monte Carlo truth.
    #[error("ground truth is not available for this event source")]
    GroundTruthUnavailable,

    /// The event source was read after being closed.
    #[error("event source is closed")]
    SourceClosed,

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl Error {
    /// Wraps any source error as a [`Error::StreamReadFailure`].
    pub fn stream<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::StreamReadFailure(err.into())
    }

    /// Returns true for the sensor-edge condition handled by the edge policy.
    #[must_use]
    pub fn is_incomplete_neighborhood(&self) -> bool {
        matches!(self, Self::IncompleteNeighborhood { .. })
    }
}
