//! xrayreco-algorithms: Event preprocessing for hexagonal X-ray detectors.
//!
//! This crate turns raw events into model-ready rows:
//! - **Neighbor resolution** - canonical, layout-independent ordering of the
//!   six neighbors of a pixel
//! - **Normalization** - per-event signals and physical offsets, plus
//!   regression targets relative to the central pixel
//! - **Datasets** - lazy row streams and materialized datasets with an
//!   explicit policy for sensor-edge events
//!
#![warn(missing_docs)]

mod config;
mod dataset;
pub mod neighbors;
mod normalize;

pub use config::{EdgePolicy, NormalizerConfig};
pub use dataset::{BuildSummary, Dataset, RowBuilder, RowStream, TrainingSet};
pub use neighbors::{resolve, CanonicalNeighborhood, Direction, NUM_NEIGHBORS};
pub use normalize::EventNormalizer;
