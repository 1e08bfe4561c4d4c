//! Hexagonal grid geometry.
//!
//! [`GridGeometry`] is the contract the normalizer relies on: geometric
//! adjacency, batched logical-to-physical conversion, and the mapping from a
//! pixel to the acquisition channel that reads it out. The three queries are
//! independent; nothing downstream assumes a relation between them.
//!
//! [`HexagonalGrid`] implements the contract for the four offset layouts.
//! Internally every offset coordinate is converted to axial coordinates
//! `(q, r)`, where the six neighbors are the same unit steps for every
//! layout.
#![allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]

use crate::coord::{LogicalCoord, PhysicalPoint};
use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of readout channels of the circular (7-pixel) readout.
pub const NUM_ADC_CHANNELS: usize = 7;

/// Axial unit steps to the six neighbors.
const AXIAL_STEPS: [(i32, i32); 6] = [(1, 0), (1, -1), (0, -1), (-1, 0), (-1, 1), (0, 1)];

/// Geometry service for a pixelated sensor.
///
/// Implementations are immutable after construction and every query is a
/// pure function of the grid state.
pub trait GridGeometry: Send + Sync {
    /// Returns the in-bounds pixels adjacent to `center`.
    ///
    /// The order is unspecified; interior pixels of a hexagonal grid have
    /// exactly six neighbors.
    fn neighbors(&self, center: LogicalCoord) -> Vec<LogicalCoord>;

    /// Converts a batch of logical coordinates to physical positions.
    ///
    /// The output has the same length and order as `coords`.
    fn logical_to_physical(&self, coords: &[LogicalCoord]) -> Vec<PhysicalPoint>;

    /// Returns the acquisition channel reading out `coord`.
    fn logical_to_channel(&self, coord: LogicalCoord) -> usize;

    /// Number of acquisition channels in a raw readout.
    fn channel_count(&self) -> usize;

    /// Returns true if `coord` lies inside the grid.
    fn contains(&self, coord: LogicalCoord) -> bool;
}

/// Offset layout of a hexagonal tiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum HexagonalLayout {
    /// Pointy-top, odd rows shifted right by half a pitch.
    OddR,
    /// Pointy-top, odd rows shifted left by half a pitch.
    EvenR,
    /// Flat-top, odd columns shifted down by half a pitch.
    OddQ,
    /// Flat-top, odd columns shifted up by half a pitch.
    EvenQ,
}

impl HexagonalLayout {
    /// All supported layouts.
    pub const ALL: [Self; 4] = [Self::OddR, Self::EvenR, Self::OddQ, Self::EvenQ];

    /// Tag used in file headers.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::OddR => "ODD_R",
            Self::EvenR => "EVEN_R",
            Self::OddQ => "ODD_Q",
            Self::EvenQ => "EVEN_Q",
        }
    }

    /// Pointy-top layouts offset rows; flat-top layouts offset columns.
    #[must_use]
    pub fn is_pointy_top(&self) -> bool {
        matches!(self, Self::OddR | Self::EvenR)
    }

    /// Half-pitch shift direction of odd rows (or columns): +1 or -1.
    #[inline]
    fn shift_sign(self) -> i32 {
        match self {
            Self::OddR | Self::OddQ => 1,
            Self::EvenR | Self::EvenQ => -1,
        }
    }
}

impl fmt::Display for HexagonalLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for HexagonalLayout {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let tag = s.trim();
        Self::ALL
            .into_iter()
            .find(|layout| layout.tag().eq_ignore_ascii_case(tag))
            .ok_or_else(|| Error::InvalidGridConfiguration(format!("unknown layout tag '{tag}'")))
    }
}

/// The four scalar header fields a grid is built from.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GridHeader {
    /// Layout variant.
    pub layout: HexagonalLayout,
    /// Number of columns.
    pub num_cols: u32,
    /// Number of rows.
    pub num_rows: u32,
    /// Center-to-center distance of adjacent pixels.
    pub pitch: f64,
}

impl GridHeader {
    /// Creates a validated header.
    ///
    /// # Errors
    /// Returns [`Error::InvalidGridConfiguration`] if a field is out of range.
    pub fn new(layout: HexagonalLayout, num_cols: u32, num_rows: u32, pitch: f64) -> Result<Self> {
        let header = Self {
            layout,
            num_cols,
            num_rows,
            pitch,
        };
        header.validate()?;
        Ok(header)
    }

    /// Parses the raw header fields as stored in a simulation file.
    ///
    /// # Errors
    /// Returns [`Error::InvalidGridConfiguration`] naming the offending field.
    pub fn from_fields(layout: &str, num_cols: i64, num_rows: i64, pitch: f64) -> Result<Self> {
        let layout: HexagonalLayout = layout.parse()?;
        let num_cols = dimension("numcolumns", num_cols)?;
        let num_rows = dimension("numrows", num_rows)?;
        Self::new(layout, num_cols, num_rows, pitch)
    }

    /// Checks dimensions and pitch.
    ///
    /// # Errors
    /// Returns [`Error::InvalidGridConfiguration`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        dimension("numcolumns", i64::from(self.num_cols))?;
        dimension("numrows", i64::from(self.num_rows))?;
        if !self.pitch.is_finite() || self.pitch <= 0.0 {
            return Err(Error::InvalidGridConfiguration(format!(
                "pitch must be positive and finite, got {}",
                self.pitch
            )));
        }
        Ok(())
    }
}

impl fmt::Display for GridHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "layout: {}", self.layout)?;
        writeln!(f, "numcolumns: {}", self.num_cols)?;
        writeln!(f, "numrows: {}", self.num_rows)?;
        write!(f, "pitch: {}", self.pitch)
    }
}

fn dimension(name: &str, value: i64) -> Result<u32> {
    if value <= 0 || value > i64::from(i32::MAX) {
        return Err(Error::InvalidGridConfiguration(format!(
            "{name} must be in 1..={}, got {value}",
            i32::MAX
        )));
    }
    Ok(value as u32)
}

/// Hexagonal pixel grid centered on the physical origin.
#[derive(Debug, Clone, PartialEq)]
pub struct HexagonalGrid {
    header: GridHeader,
    secondary_pitch: f64,
    x_offset: f64,
    y_offset: f64,
}

impl HexagonalGrid {
    /// Creates a grid.
    ///
    /// # Errors
    /// Returns [`Error::InvalidGridConfiguration`] for zero dimensions or a
    /// non-positive pitch.
    pub fn new(layout: HexagonalLayout, num_cols: u32, num_rows: u32, pitch: f64) -> Result<Self> {
        Self::from_header(&GridHeader::new(layout, num_cols, num_rows, pitch)?)
    }

    /// Creates a grid from a header.
    ///
    /// # Errors
    /// Returns [`Error::InvalidGridConfiguration`] if the header is invalid.
    pub fn from_header(header: &GridHeader) -> Result<Self> {
        header.validate()?;
        let pitch = header.pitch;
        let secondary_pitch = 0.5 * 3.0_f64.sqrt() * pitch;
        let (col_step, row_step) = if header.layout.is_pointy_top() {
            (pitch, secondary_pitch)
        } else {
            (secondary_pitch, pitch)
        };
        Ok(Self {
            header: *header,
            secondary_pitch,
            x_offset: 0.5 * f64::from(header.num_cols - 1) * col_step,
            y_offset: 0.5 * f64::from(header.num_rows - 1) * row_step,
        })
    }

    /// Parses and validates the four raw header fields.
    ///
    /// # Errors
    /// Returns [`Error::InvalidGridConfiguration`] naming the offending field.
    pub fn from_header_fields(
        layout: &str,
        num_cols: i64,
        num_rows: i64,
        pitch: f64,
    ) -> Result<Self> {
        Self::from_header(&GridHeader::from_fields(layout, num_cols, num_rows, pitch)?)
    }

    /// Grid header.
    #[must_use]
    pub fn header(&self) -> &GridHeader {
        &self.header
    }

    /// Layout variant.
    #[must_use]
    pub fn layout(&self) -> HexagonalLayout {
        self.header.layout
    }

    /// Center-to-center distance of adjacent pixels.
    #[must_use]
    pub fn pitch(&self) -> f64 {
        self.header.pitch
    }

    /// Distance between adjacent rows (pointy-top) or columns (flat-top).
    #[must_use]
    pub fn secondary_pitch(&self) -> f64 {
        self.secondary_pitch
    }

    /// Converts an offset coordinate to axial `(q, r)`.
    #[must_use]
    pub fn to_axial(&self, coord: LogicalCoord) -> (i32, i32) {
        let LogicalCoord { col, row } = coord;
        match self.header.layout {
            HexagonalLayout::OddR => (col - (row - (row & 1)) / 2, row),
            HexagonalLayout::EvenR => (col - (row + (row & 1)) / 2, row),
            HexagonalLayout::OddQ => (col, row - (col - (col & 1)) / 2),
            HexagonalLayout::EvenQ => (col, row - (col + (col & 1)) / 2),
        }
    }

    /// Converts axial `(q, r)` back to an offset coordinate.
    #[must_use]
    pub fn from_axial(&self, q: i32, r: i32) -> LogicalCoord {
        match self.header.layout {
            HexagonalLayout::OddR => LogicalCoord::new(q + (r - (r & 1)) / 2, r),
            HexagonalLayout::EvenR => LogicalCoord::new(q + (r + (r & 1)) / 2, r),
            HexagonalLayout::OddQ => LogicalCoord::new(q, r + (q - (q & 1)) / 2),
            HexagonalLayout::EvenQ => LogicalCoord::new(q, r + (q + (q & 1)) / 2),
        }
    }

    /// Physical position of a single pixel center.
    #[must_use]
    pub fn pixel_to_world(&self, coord: LogicalCoord) -> PhysicalPoint {
        let pitch = self.header.pitch;
        let sign = self.header.layout.shift_sign();
        if self.header.layout.is_pointy_top() {
            let shift = f64::from(sign * (coord.row & 1));
            PhysicalPoint::new(
                pitch * (f64::from(coord.col) + 0.5 * shift) - self.x_offset,
                self.y_offset - self.secondary_pitch * f64::from(coord.row),
            )
        } else {
            let shift = f64::from(sign * (coord.col & 1));
            PhysicalPoint::new(
                self.secondary_pitch * f64::from(coord.col) - self.x_offset,
                self.y_offset - pitch * (f64::from(coord.row) + 0.5 * shift),
            )
        }
    }
}

impl GridGeometry for HexagonalGrid {
    fn neighbors(&self, center: LogicalCoord) -> Vec<LogicalCoord> {
        if !self.contains(center) {
            return Vec::new();
        }
        let (q, r) = self.to_axial(center);
        AXIAL_STEPS
            .iter()
            .filter_map(|&(dq, dr)| {
                Some(self.from_axial(q.checked_add(dq)?, r.checked_add(dr)?))
            })
            .filter(|&coord| self.contains(coord))
            .collect()
    }

    fn logical_to_physical(&self, coords: &[LogicalCoord]) -> Vec<PhysicalPoint> {
        coords.iter().map(|&coord| self.pixel_to_world(coord)).collect()
    }

    fn logical_to_channel(&self, coord: LogicalCoord) -> usize {
        // (q + 3r) mod 7 assigns distinct channels to a pixel and its six
        // neighbors: the axial steps map to +-1, +-3 and +-2.
        let (col, row) = (i64::from(coord.col), i64::from(coord.row));
        let (q, r) = match self.header.layout {
            HexagonalLayout::OddR => (col - (row - (row & 1)) / 2, row),
            HexagonalLayout::EvenR => (col - (row + (row & 1)) / 2, row),
            HexagonalLayout::OddQ => (col, row - (col - (col & 1)) / 2),
            HexagonalLayout::EvenQ => (col, row - (col + (col & 1)) / 2),
        };
        (q + 3 * r).rem_euclid(NUM_ADC_CHANNELS as i64) as usize
    }

    fn channel_count(&self) -> usize {
        NUM_ADC_CHANNELS
    }

    fn contains(&self, coord: LogicalCoord) -> bool {
        coord.col >= 0
            && coord.row >= 0
            && (coord.col as u32) < self.header.num_cols
            && (coord.row as u32) < self.header.num_rows
    }
}
