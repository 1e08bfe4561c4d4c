//! xrayreco-io: File I/O for xrayreco.
//!
//! This crate reads simulation files as event sources and writes the
//! preprocessed feature and target datasets. HDF5 support is behind the
//! `hdf5` feature; flat CSV/binary output is always available.
//!

mod error;
#[cfg(feature = "hdf5")]
pub mod hdf5;
mod writer;

pub use error::{Error, Result};
#[cfg(feature = "hdf5")]
pub use self::hdf5::{
    with_simulation_file, write_datasets_hdf5, write_simulation_file, DatasetWriteOptions,
    ReadOptions, SimulationFile,
};
pub use writer::DatasetFileWriter;
