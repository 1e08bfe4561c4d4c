//! Logical and physical pixel coordinates.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Pixel position in the hexagonal lattice (offset coordinates).
///
/// Signed so that neighbor arithmetic can step outside the grid before the
/// grid filters the result against its bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LogicalCoord {
    /// Column index.
    pub col: i32,
    /// Row index.
    pub row: i32,
}

impl LogicalCoord {
    /// Creates a new logical coordinate.
    #[inline]
    #[must_use]
    pub fn new(col: i32, row: i32) -> Self {
        Self { col, row }
    }
}

impl From<(i32, i32)> for LogicalCoord {
    #[inline]
    fn from((col, row): (i32, i32)) -> Self {
        Self::new(col, row)
    }
}

impl fmt::Display for LogicalCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.col, self.row)
    }
}

/// Position on the sensor plane in physical units (same unit as the pitch).
///
/// +x points right, +y points up.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PhysicalPoint {
    /// Horizontal position.
    pub x: f64,
    /// Vertical position.
    pub y: f64,
}

impl PhysicalPoint {
    /// The origin.
    pub const ORIGIN: Self = Self { x: 0.0, y: 0.0 };

    /// Creates a new physical point.
    #[inline]
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Returns this point expressed relative to `origin`.
    #[inline]
    #[must_use]
    pub fn offset_from(&self, origin: &Self) -> Self {
        Self {
            x: self.x - origin.x,
            y: self.y - origin.y,
        }
    }

    /// Euclidean norm of the point seen as a vector.
    #[inline]
    #[must_use]
    pub fn norm(&self) -> f64 {
        self.x.hypot(self.y)
    }
}
