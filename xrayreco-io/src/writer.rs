//! Flat-file writers for feature and target datasets.

use crate::Result;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use xrayreco_algorithms::Dataset;
use xrayreco_core::{FeatureRow, TargetRow, NEIGHBORHOOD_SIZE};

/// Writer for preprocessed dataset output.
///
/// Writes feature or target rows to CSV or raw little-endian binary.
pub struct DatasetFileWriter {
    writer: BufWriter<File>,
}

impl DatasetFileWriter {
    /// Creates a new file writer.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        Ok(Self { writer })
    }

    /// Writes feature rows as CSV, one event per line.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_features_csv(&mut self, features: &Dataset<FeatureRow>) -> Result<()> {
        write!(self.writer, "event")?;
        for i in 0..NEIGHBORHOOD_SIZE {
            write!(self.writer, ",signal_{i},dx_{i},dy_{i}")?;
        }
        writeln!(self.writer)?;

        for row in features {
            write!(self.writer, "{}", row.event_index)?;
            for [signal, dx, dy] in row.entries() {
                write!(self.writer, ",{signal},{dx},{dy}")?;
            }
            writeln!(self.writer)?;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Writes target rows as CSV.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_targets_csv(&mut self, targets: &Dataset<TargetRow>) -> Result<()> {
        writeln!(self.writer, "event,energy,dx,dy")?;

        for t in targets {
            writeln!(self.writer, "{},{},{},{}", t.event_index, t.energy, t.dx, t.dy)?;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Writes feature rows as binary data.
    ///
    /// Format: for each row, 21 little-endian f64 values ordered
    /// `(signal, dx, dy)` per neighborhood entry. Total: 168 bytes per row.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_features_binary(&mut self, features: &Dataset<FeatureRow>) -> Result<()> {
        for row in features {
            for value in row.entries().flatten() {
                self.writer.write_all(&value.to_le_bytes())?;
            }
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Writes target rows as binary data.
    ///
    /// Format: for each row, f64 (energy) + f64 (dx) + f64 (dy).
    /// Total: 24 bytes per row
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_targets_binary(&mut self, targets: &Dataset<TargetRow>) -> Result<()> {
        for t in targets {
            for value in t.values() {
                self.writer.write_all(&value.to_le_bytes())?;
            }
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Flushes the writer.
    ///
    /// # Errors
    /// Returns an error if flushing fails.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;
    use xrayreco_algorithms::{EventNormalizer, TrainingSet};
    use xrayreco_core::{
        GridHeader, GroundTruth, HexagonalGrid, HexagonalLayout, LogicalCoord, MemoryEventSource,
        RawEvent,
    };

    fn training_set() -> TrainingSet {
        let header = GridHeader::new(HexagonalLayout::OddR, 10, 10, 1.0).unwrap();
        let grid = HexagonalGrid::from_header(&header).unwrap();
        let center = LogicalCoord::new(5, 5);
        let position = grid.pixel_to_world(center);
        let events = vec![
            RawEvent::new(0, center, vec![10, 20, 30, 40, 50, 60, 70])
                .with_truth(GroundTruth::new(8.5, position.x + 0.25, position.y)),
            RawEvent::new(1, LogicalCoord::new(0, 0), vec![1; 7])
                .with_truth(GroundTruth::new(1.0, 0.0, 0.0)),
        ];
        let mut source = MemoryEventSource::new(header, events);
        EventNormalizer::new(&grid)
            .build_training_set(&mut source)
            .unwrap()
    }

    #[test]
    fn test_write_features_csv() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = DatasetFileWriter::create(file.path()).unwrap();
        writer.write_features_csv(&training_set().features).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("event,signal_0,dx_0,dy_0,signal_1"));
        assert!(lines[0].ends_with("signal_6,dx_6,dy_6"));
        assert!(lines[1].starts_with("0,50,0,0,30,"));
        assert_eq!(lines[1].split(',').count(), 22);
    }

    #[test]
    fn test_write_targets_csv() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = DatasetFileWriter::create(file.path()).unwrap();
        writer.write_targets_csv(&training_set().targets).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        assert!(content.contains("event,energy,dx,dy"));
        assert!(content.contains("0,8.5,0.25,0"));
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn test_write_binary() {
        let set = training_set();

        let file = NamedTempFile::new().unwrap();
        let mut writer = DatasetFileWriter::create(file.path()).unwrap();
        writer.write_features_binary(&set.features).unwrap();
        let data = std::fs::read(file.path()).unwrap();
        // 7 entries x 3 values x 8 bytes
        assert_eq!(data.len(), 168);
        let mut first = [0u8; 8];
        first.copy_from_slice(&data[..8]);
        assert_eq!(f64::from_le_bytes(first), 50.0);

        let file = NamedTempFile::new().unwrap();
        let mut writer = DatasetFileWriter::create(file.path()).unwrap();
        writer.write_targets_binary(&set.targets).unwrap();
        assert_eq!(std::fs::read(file.path()).unwrap().len(), 24);
    }
}
