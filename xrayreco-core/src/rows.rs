//! Per-event feature and target rows.

use crate::coord::PhysicalPoint;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of pixels in a canonical neighborhood (center + 6 neighbors).
pub const NEIGHBORHOOD_SIZE: usize = 7;

/// Values per feature entry: signal, x offset, y offset.
pub const FEATURE_WIDTH: usize = 3;

/// Values per target row: energy, x offset, y offset.
pub const TARGET_WIDTH: usize = 3;

/// Network input for one event, stored as parallel arrays in canonical order.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FeatureRow {
    /// Source stream index of the event.
    pub event_index: usize,
    /// Pulse heights.
    pub signals: [f64; NEIGHBORHOOD_SIZE],
    /// Pixel x positions relative to the central pixel.
    pub dx: [f64; NEIGHBORHOOD_SIZE],
    /// Pixel y positions relative to the central pixel.
    pub dy: [f64; NEIGHBORHOOD_SIZE],
}

impl FeatureRow {
    /// Returns `(signal, dx, dy)` for canonical position `i`.
    ///
    /// # Panics
    /// Panics if `i >= NEIGHBORHOOD_SIZE`.
    #[inline]
    #[must_use]
    pub fn entry(&self, i: usize) -> [f64; FEATURE_WIDTH] {
        [self.signals[i], self.dx[i], self.dy[i]]
    }

    /// Offset of canonical position `i` as a point.
    ///
    /// # Panics
    /// Panics if `i >= NEIGHBORHOOD_SIZE`.
    #[inline]
    #[must_use]
    pub fn offset(&self, i: usize) -> PhysicalPoint {
        PhysicalPoint::new(self.dx[i], self.dy[i])
    }

    /// Iterates `(signal, dx, dy)` triples in canonical order.
    pub fn entries(&self) -> impl Iterator<Item = [f64; FEATURE_WIDTH]> + '_ {
        (0..NEIGHBORHOOD_SIZE).map(|i| self.entry(i))
    }

    /// Sum of the seven signals.
    #[must_use]
    pub fn total_signal(&self) -> f64 {
        self.signals.iter().sum()
    }
}

/// Regression target for one event.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TargetRow {
    /// Source stream index of the event.
    pub event_index: usize,
    /// Deposited energy.
    pub energy: f64,
    /// Hit x relative to the central pixel.
    pub dx: f64,
    /// Hit y relative to the central pixel.
    pub dy: f64,
}

impl TargetRow {
    /// Returns `[energy, dx, dy]`.
    #[inline]
    #[must_use]
    pub fn values(&self) -> [f64; TARGET_WIDTH] {
        [self.energy, self.dx, self.dy]
    }
}
