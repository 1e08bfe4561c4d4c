//! xrayreco-core: Core types for hexagonal-grid X-ray detector data.
//!
//! This crate provides the foundational abstractions for event
//! preprocessing: pixel coordinates, the grid geometry contract and its
//! hexagonal implementation, raw event records and event sources, and the
//! feature/target rows handed to downstream consumers.
//!

pub mod coord;
pub mod error;
pub mod event;
pub mod hexagon;
pub mod rows;

pub use coord::{LogicalCoord, PhysicalPoint};
pub use error::{Error, Result};
pub use event::{with_source, EventSource, GroundTruth, MemoryEventSource, RawEvent, TruthColumn};
pub use hexagon::{GridGeometry, GridHeader, HexagonalGrid, HexagonalLayout, NUM_ADC_CHANNELS};
pub use rows::{FeatureRow, TargetRow, FEATURE_WIDTH, NEIGHBORHOOD_SIZE, TARGET_WIDTH};
