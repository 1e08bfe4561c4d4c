//! Canonical neighbor ordering.
//!
//! The grid reports the neighbors of a pixel in whatever order its own
//! lookup produces. Downstream arrays need a fixed order, so each neighbor
//! is classified by the direction of its physical displacement from the
//! center and placed in compass order, clockwise from upper-right:
//!
//! ```text
//!  pointy-top              flat-top
//!     ul   ur                  u
//!   l    c    r          ul         ur
//!     dl   dr                  c
//!                        dl         dr
//!                              d
//! ```
//!
//! Pointy-top grids yield `[c, ur, r, dr, dl, l, ul]`, flat-top grids yield
//! `[c, ur, dr, d, dl, ul, u]`. Classification only uses the grid's own
//! neighbor and coordinate queries, so no layout is special-cased here.

use std::fmt;
use xrayreco_core::{Error, GridGeometry, LogicalCoord, PhysicalPoint, Result, NEIGHBORHOOD_SIZE};

/// Relative tolerance for treating a displacement as axis-aligned.
const AXIS_TOLERANCE: f64 = 1e-6;

/// Number of neighbors of an interior hexagonal pixel.
pub const NUM_NEIGHBORS: usize = NEIGHBORHOOD_SIZE - 1;

/// Compass direction of a neighbor, in canonical (clockwise) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    /// Up and to the right.
    UpperRight,
    /// Straight right (pointy-top only).
    Right,
    /// Down and to the right.
    LowerRight,
    /// Straight down (flat-top only).
    Lower,
    /// Down and to the left.
    LowerLeft,
    /// Straight left (pointy-top only).
    Left,
    /// Up and to the left.
    UpperLeft,
    /// Straight up (flat-top only).
    Upper,
}

impl Direction {
    /// All directions in canonical order.
    pub const CLOCKWISE: [Self; 8] = [
        Self::UpperRight,
        Self::Right,
        Self::LowerRight,
        Self::Lower,
        Self::LowerLeft,
        Self::Left,
        Self::UpperLeft,
        Self::Upper,
    ];

    /// Classifies a displacement; `None` for a zero or non-finite vector.
    #[must_use]
    pub fn classify(offset: PhysicalPoint) -> Option<Self> {
        let norm = offset.norm();
        if norm <= 0.0 || !norm.is_finite() {
            return None;
        }
        let tol = AXIS_TOLERANCE * norm;
        let direction = if offset.x.abs() <= tol {
            if offset.y > 0.0 {
                Self::Upper
            } else {
                Self::Lower
            }
        } else if offset.y.abs() <= tol {
            if offset.x > 0.0 {
                Self::Right
            } else {
                Self::Left
            }
        } else {
            match (offset.x > 0.0, offset.y > 0.0) {
                (true, true) => Self::UpperRight,
                (true, false) => Self::LowerRight,
                (false, false) => Self::LowerLeft,
                (false, true) => Self::UpperLeft,
            }
        };
        Some(direction)
    }

    /// Position in [`Direction::CLOCKWISE`].
    #[inline]
    #[must_use]
    pub fn rank(self) -> usize {
        self as usize
    }

    /// Unit vector pointing in this direction.
    ///
    /// Diagonal neighbors sit 60 degrees off the horizontal on pointy-top
    /// grids and 30 degrees off it on flat-top grids.
    #[must_use]
    pub fn unit_vector(self, pointy_top: bool) -> PhysicalPoint {
        let half_sqrt3 = 0.5 * 3.0_f64.sqrt();
        let (along, across) = if pointy_top { (0.5, half_sqrt3) } else { (half_sqrt3, 0.5) };
        match self {
            Self::UpperRight => PhysicalPoint::new(along, across),
            Self::Right => PhysicalPoint::new(1.0, 0.0),
            Self::LowerRight => PhysicalPoint::new(along, -across),
            Self::Lower => PhysicalPoint::new(0.0, -1.0),
            Self::LowerLeft => PhysicalPoint::new(-along, -across),
            Self::Left => PhysicalPoint::new(-1.0, 0.0),
            Self::UpperLeft => PhysicalPoint::new(-along, across),
            Self::Upper => PhysicalPoint::new(0.0, 1.0),
        }
    }

    /// Short label used in logs and column names.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::UpperRight => "ur",
            Self::Right => "r",
            Self::LowerRight => "dr",
            Self::Lower => "d",
            Self::LowerLeft => "dl",
            Self::Left => "l",
            Self::UpperLeft => "ul",
            Self::Upper => "u",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A central pixel and its six neighbors in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalNeighborhood {
    coords: [LogicalCoord; NEIGHBORHOOD_SIZE],
    directions: [Direction; NUM_NEIGHBORS],
}

impl CanonicalNeighborhood {
    /// The central pixel (index 0).
    #[must_use]
    pub fn center(&self) -> LogicalCoord {
        self.coords[0]
    }

    /// All seven coordinates, center first.
    #[must_use]
    pub fn coords(&self) -> &[LogicalCoord; NEIGHBORHOOD_SIZE] {
        &self.coords
    }

    /// The six neighbors in canonical order.
    #[must_use]
    pub fn neighbors(&self) -> &[LogicalCoord] {
        &self.coords[1..]
    }

    /// Direction of each neighbor, aligned with [`Self::neighbors`].
    #[must_use]
    pub fn directions(&self) -> &[Direction; NUM_NEIGHBORS] {
        &self.directions
    }

    /// Iterates `(direction, coordinate)` pairs for the neighbors.
    pub fn iter(&self) -> impl Iterator<Item = (Direction, LogicalCoord)> + '_ {
        self.directions.iter().copied().zip(self.neighbors().iter().copied())
    }
}

/// Resolves the canonical neighborhood of `center`.
///
/// # Errors
/// - [`Error::CoordinateOutOfBounds`] if `center` is not a pixel of the grid.
/// - [`Error::IncompleteNeighborhood`] if the grid reports other than six
///   neighbors (edge or corner pixel).
/// - [`Error::InconsistentNeighborhood`] if the six neighbors do not occupy
///   six distinct directions around the center.
pub fn resolve<G>(center: LogicalCoord, grid: &G) -> Result<CanonicalNeighborhood>
where
    G: GridGeometry + ?Sized,
{
    if !grid.contains(center) {
        return Err(Error::CoordinateOutOfBounds { coord: center });
    }
    let neighbors = grid.neighbors(center);
    if neighbors.len() != NUM_NEIGHBORS {
        return Err(Error::IncompleteNeighborhood {
            center,
            found: neighbors.len(),
        });
    }
    if neighbors.contains(&center) {
        return Err(inconsistent(center, "center listed as its own neighbor".to_string()));
    }

    let mut query = Vec::with_capacity(NEIGHBORHOOD_SIZE);
    query.push(center);
    query.extend_from_slice(&neighbors);
    let positions = grid.logical_to_physical(&query);
    if positions.len() != query.len() {
        return Err(inconsistent(
            center,
            format!("{} positions returned for {} coordinates", positions.len(), query.len()),
        ));
    }

    let origin = positions[0];
    let mut slots: [Option<LogicalCoord>; 8] = [None; 8];
    for (&coord, position) in neighbors.iter().zip(&positions[1..]) {
        let direction = Direction::classify(position.offset_from(&origin))
            .ok_or_else(|| inconsistent(center, format!("neighbor {coord} has no direction")))?;
        let slot = &mut slots[direction.rank()];
        if let Some(previous) = slot {
            return Err(inconsistent(
                center,
                format!("neighbors {previous} and {coord} both lie {direction}"),
            ));
        }
        *slot = Some(coord);
    }

    let mut coords = [center; NEIGHBORHOOD_SIZE];
    let mut directions = [Direction::UpperRight; NUM_NEIGHBORS];
    let occupied = Direction::CLOCKWISE
        .iter()
        .zip(slots)
        .filter_map(|(&direction, slot)| slot.map(|coord| (direction, coord)));
    for (i, (direction, coord)) in occupied.enumerate() {
        directions[i] = direction;
        coords[i + 1] = coord;
    }

    Ok(CanonicalNeighborhood { coords, directions })
}

fn inconsistent(center: LogicalCoord, reason: String) -> Error {
    Error::InconsistentNeighborhood { center, reason }
}
