//! HDF5 simulation files and dataset export.
//!
//! Simulation files carry the grid header as attributes of `/header`, the
//! detected events under `/events` and, for Monte Carlo output, the true
//! absorption point and energy under `/mc`.

use crate::{Error, Result};
use hdf5::types::{H5Type, VarLenUnicode};
use hdf5::{Dataset, File, Group, Location};
use ndarray::{s, Array2, Array3, ArrayView1};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use xrayreco_algorithms::Dataset as RowDataset;
use xrayreco_core::{
    with_source, Error as CoreError, EventSource, FeatureRow, GridGeometry, GridHeader,
    GroundTruth, HexagonalGrid, LogicalCoord, RawEvent, Result as CoreResult, TargetRow,
    TruthColumn, FEATURE_WIDTH, NEIGHBORHOOD_SIZE, NUM_ADC_CHANNELS, TARGET_WIDTH,
};

const HEADER_GROUP: &str = "header";
const EVENTS_GROUP: &str = "events";
const TRUTH_GROUP: &str = "mc";
const FEATURE_COLUMNS: [&str; FEATURE_WIDTH] = ["signal", "dx", "dy"];
const TARGET_COLUMNS: [&str; TARGET_WIDTH] = ["energy", "dx", "dy"];

/// Options for reading simulation files.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadOptions {
    /// Events read from disk per slice.
    pub chunk_events: usize,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            chunk_events: 10_000,
        }
    }
}

impl ReadOptions {
    fn validate(&self) -> Result<()> {
        if self.chunk_events == 0 {
            return Err(CoreError::ConfigError("chunk_events must be positive".into()).into());
        }
        Ok(())
    }
}

/// Options for dataset export.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DatasetWriteOptions {
    /// Deflate level, if any.
    pub compression: Option<u8>,
    /// Enable the shuffle filter.
    pub shuffle: bool,
}

struct OpenHandles {
    _file: File,
    column: Dataset,
    row: Dataset,
    pha: Dataset,
    truth: Option<TruthHandles>,
}

struct TruthHandles {
    energy: Dataset,
    absx: Dataset,
    absy: Dataset,
}

impl TruthHandles {
    fn get(&self, column: TruthColumn) -> &Dataset {
        match column {
            TruthColumn::Energy => &self.energy,
            TruthColumn::AbsX => &self.absx,
            TruthColumn::AbsY => &self.absy,
        }
    }
}

/// Event source reading a simulation file in fixed-size slices.
pub struct SimulationFile {
    path: PathBuf,
    handles: Option<OpenHandles>,
    header: GridHeader,
    num_events: usize,
    channels: usize,
    options: ReadOptions,
    cursor: usize,
    buffer: VecDeque<RawEvent>,
}

impl SimulationFile {
    /// Opens a simulation file and validates its header and dataset shapes.
    ///
    /// No event is read until the source is iterated.
    ///
    /// # Errors
    /// - [`Error::InvalidFormat`] for missing header attributes, mismatched
    ///   dataset lengths, or fewer `pha` channels than the grid reads out.
    /// - [`CoreError::InvalidGridConfiguration`] for header values that do
    ///   not describe a grid.
    pub fn open<P: AsRef<Path>>(path: P, options: ReadOptions) -> Result<Self> {
        options.validate()?;
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let header = read_header(&file)?;
        let grid = HexagonalGrid::from_header(&header)?;

        let events = file.group(EVENTS_GROUP)?;
        let column = events.dataset("column")?;
        let row = events.dataset("row")?;
        let pha = events.dataset("pha")?;

        let num_events = dataset_len(&column)?;
        expect_len(&row, "events/row", num_events)?;
        let (pha_events, channels) = match pha.shape().as_slice() {
            &[n, c] => (n, c),
            other => {
                return Err(Error::InvalidFormat(format!(
                    "events/pha must be 2-D, found shape {other:?}"
                )))
            }
        };
        if pha_events != num_events {
            return Err(Error::InvalidFormat(format!(
                "events/pha has {pha_events} rows, expected {num_events}"
            )));
        }
        if channels < grid.channel_count() {
            return Err(Error::InvalidFormat(format!(
                "events/pha has {channels} channels, the grid reads out {}",
                grid.channel_count()
            )));
        }

        let truth = read_truth_handles(&file, num_events)?;
        log::debug!(
            "opened {} ({num_events} events, {channels} channels, truth: {})",
            path.display(),
            truth.is_some()
        );

        Ok(Self {
            path,
            handles: Some(OpenHandles {
                _file: file,
                column,
                row,
                pha,
                truth,
            }),
            header,
            num_events,
            channels,
            options,
            cursor: 0,
            buffer: VecDeque::new(),
        })
    }

    /// Path of the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of events in the file.
    #[must_use]
    pub fn len(&self) -> usize {
        self.num_events
    }

    /// Returns true if the file has no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.num_events == 0
    }

    /// Acquisition channels per event.
    #[must_use]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Returns true once the file has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.handles.is_none()
    }

    /// Builds the grid described by the header.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidGridConfiguration`] if the header is invalid.
    pub fn grid(&self) -> Result<HexagonalGrid> {
        Ok(HexagonalGrid::from_header(&self.header)?)
    }

    fn open_handles(&self) -> CoreResult<&OpenHandles> {
        self.handles.as_ref().ok_or(CoreError::SourceClosed)
    }

    fn fill_buffer(&mut self) -> CoreResult<()> {
        let start = self.cursor;
        let end = (start + self.options.chunk_events).min(self.num_events);
        let handles = self.open_handles()?;

        let columns = handles
            .column
            .read_slice_1d::<i32, _>(s![start..end])
            .map_err(read_failure)?;
        let rows = handles
            .row
            .read_slice_1d::<i32, _>(s![start..end])
            .map_err(read_failure)?;
        let pha = handles
            .pha
            .read_slice_2d::<i32, _>(s![start..end, ..])
            .map_err(read_failure)?;
        let truth = match &handles.truth {
            Some(truth) => Some((
                truth.energy.read_slice_1d::<f64, _>(s![start..end]).map_err(read_failure)?,
                truth.absx.read_slice_1d::<f64, _>(s![start..end]).map_err(read_failure)?,
                truth.absy.read_slice_1d::<f64, _>(s![start..end]).map_err(read_failure)?,
            )),
            None => None,
        };

        for i in 0..end - start {
            let center = LogicalCoord::new(columns[i], rows[i]);
            let mut event = RawEvent::new(start + i, center, pha.row(i).to_vec());
            if let Some((energy, absx, absy)) = &truth {
                event = event.with_truth(GroundTruth::new(energy[i], absx[i], absy[i]));
            }
            self.buffer.push_back(event);
        }
        self.cursor = end;
        Ok(())
    }
}

impl EventSource for SimulationFile {
    fn header(&self) -> &GridHeader {
        &self.header
    }

    fn has_ground_truth(&self) -> bool {
        self.handles
            .as_ref()
            .is_some_and(|handles| handles.truth.is_some())
    }

    fn next_event(&mut self) -> CoreResult<Option<RawEvent>> {
        self.open_handles()?;
        if self.buffer.is_empty() && self.cursor < self.num_events {
            self.fill_buffer()?;
        }
        Ok(self.buffer.pop_front())
    }

    fn rewind(&mut self) -> CoreResult<()> {
        self.open_handles()?;
        self.cursor = 0;
        self.buffer.clear();
        Ok(())
    }

    fn truth_column(&mut self, column: TruthColumn) -> CoreResult<Vec<f64>> {
        let truth = self
            .open_handles()?
            .truth
            .as_ref()
            .ok_or(CoreError::GroundTruthUnavailable)?;
        truth.get(column).read_raw::<f64>().map_err(read_failure)
    }

    fn close(&mut self) -> CoreResult<()> {
        if self.handles.take().is_some() {
            self.buffer.clear();
            log::debug!("closed {}", self.path.display());
        }
        Ok(())
    }
}

/// Opens a simulation file, runs `f` on it and closes it on every exit path.
///
/// # Errors
/// Returns an error if the file cannot be opened, or the error of `f`.
pub fn with_simulation_file<P, T, F>(path: P, options: ReadOptions, f: F) -> Result<T>
where
    P: AsRef<Path>,
    F: FnOnce(&mut SimulationFile) -> CoreResult<T>,
{
    let file = SimulationFile::open(path, options)?;
    Ok(with_source(file, f)?)
}

/// Writes events in the simulation file layout.
///
/// Truth datasets are written only if every event carries truth.
///
/// # Errors
/// Returns [`Error::InvalidFormat`] if events have differing channel counts,
/// or an error if HDF5 I/O fails.
pub fn write_simulation_file<P: AsRef<Path>>(
    path: P,
    header: &GridHeader,
    events: &[RawEvent],
) -> Result<()> {
    header.validate()?;
    let channels = events.first().map_or(NUM_ADC_CHANNELS, |e| e.signals.len());
    if let Some(event) = events.iter().find(|e| e.signals.len() != channels) {
        return Err(Error::InvalidFormat(format!(
            "event {} has {} channels, expected {channels}",
            event.index,
            event.signals.len()
        )));
    }

    let file = File::create(path)?;

    let header_group = file.create_group(HEADER_GROUP)?;
    set_attr_str(&header_group, "layout", header.layout.tag())?;
    header_group
        .new_attr::<i64>()
        .create("numcolumns")?
        .write_scalar(&i64::from(header.num_cols))?;
    header_group
        .new_attr::<i64>()
        .create("numrows")?
        .write_scalar(&i64::from(header.num_rows))?;
    header_group
        .new_attr::<f64>()
        .create("pitch")?
        .write_scalar(&header.pitch)?;

    let group = file.create_group(EVENTS_GROUP)?;
    let columns: Vec<i32> = events.iter().map(|e| e.center.col).collect();
    let rows: Vec<i32> = events.iter().map(|e| e.center.row).collect();
    write_vec(&group, "column", &columns)?;
    write_vec(&group, "row", &rows)?;

    let flat: Vec<i32> = events.iter().flat_map(|e| e.signals.iter().copied()).collect();
    let pha = Array2::from_shape_vec((events.len(), channels), flat)
        .map_err(|e| Error::InvalidFormat(format!("pha shape mismatch: {e}")))?;
    let pha_ds =
        create_fixed_dataset::<i32, _>(&group, "pha", (events.len(), channels), None, false)?;
    set_dataset_units(&pha_ds, "adu")?;
    pha_ds.write(&pha)?;

    let truth: Option<Vec<GroundTruth>> = events.iter().map(|e| e.truth).collect();
    if let Some(truth) = truth.filter(|t| !t.is_empty()) {
        let mc = file.create_group(TRUTH_GROUP)?;
        for column in [TruthColumn::Energy, TruthColumn::AbsX, TruthColumn::AbsY] {
            let values: Vec<f64> = truth.iter().map(|t| column.value(t)).collect();
            write_vec(&mc, column.name(), &values)?;
        }
    }
    Ok(())
}

/// Writes feature and optional target datasets for downstream training.
///
/// Layout: `/features` `(n, 7, 3)`, `/targets` `(n, 3)`, `/event_index`
/// (source index of each row) and `/skipped` (indices excluded at the
/// sensor edge). Trailing-axis components are named by a `columns`
/// attribute.
///
/// # Errors
/// Returns [`Error::InvalidFormat`] if features and targets are not
/// index-aligned, or an error if HDF5 I/O fails.
pub fn write_datasets_hdf5<P: AsRef<Path>>(
    path: P,
    features: &RowDataset<FeatureRow>,
    targets: Option<&RowDataset<TargetRow>>,
    options: &DatasetWriteOptions,
) -> Result<()> {
    let event_index = features.event_indices();
    if let Some(targets) = targets {
        if targets.event_indices() != event_index {
            return Err(Error::InvalidFormat(
                "feature and target rows belong to different events".into(),
            ));
        }
    }

    let file = File::create(path)?;
    let n = features.len();
    let (compression, shuffle) = if n > 0 {
        (options.compression, options.shuffle)
    } else {
        (None, false)
    };

    let features_ds = create_fixed_dataset::<f64, _>(
        &file,
        "features",
        (n, NEIGHBORHOOD_SIZE, FEATURE_WIDTH),
        compression,
        shuffle,
    )?;
    set_columns_attr(&features_ds, &FEATURE_COLUMNS)?;
    let feature_array: Array3<f64> = features.to_array();
    features_ds.write(&feature_array)?;

    if let Some(targets) = targets {
        let targets_ds = create_fixed_dataset::<f64, _>(
            &file,
            "targets",
            (n, TARGET_WIDTH),
            compression,
            shuffle,
        )?;
        set_columns_attr(&targets_ds, &TARGET_COLUMNS)?;
        targets_ds.write(&targets.to_array())?;
    }

    let event_index: Vec<u64> = event_index.iter().map(|&i| i as u64).collect();
    write_vec(&file, "event_index", &event_index)?;
    let skipped: Vec<u64> = features.skipped().iter().map(|&i| i as u64).collect();
    write_vec(&file, "skipped", &skipped)?;

    log::info!(
        "wrote {n} rows ({} skipped) with{} targets",
        skipped.len(),
        if targets.is_some() { "" } else { "out" }
    );
    Ok(())
}

fn read_header(file: &File) -> Result<GridHeader> {
    let group = file
        .group(HEADER_GROUP)
        .map_err(|_| Error::InvalidFormat("missing /header group".into()))?;
    let layout = read_attr_opt_string(&group, "layout")?
        .ok_or_else(|| missing_attr("layout"))?;
    let num_cols =
        read_attr_opt::<i64>(&group, "numcolumns")?.ok_or_else(|| missing_attr("numcolumns"))?;
    let num_rows =
        read_attr_opt::<i64>(&group, "numrows")?.ok_or_else(|| missing_attr("numrows"))?;
    let pitch = read_attr_opt::<f64>(&group, "pitch")?.ok_or_else(|| missing_attr("pitch"))?;
    Ok(GridHeader::from_fields(&layout, num_cols, num_rows, pitch)?)
}

fn read_truth_handles(file: &File, num_events: usize) -> Result<Option<TruthHandles>> {
    let Ok(group) = file.group(TRUTH_GROUP) else {
        return Ok(None);
    };
    let energy = group.dataset("energy")?;
    let absx = group.dataset("absx")?;
    let absy = group.dataset("absy")?;
    expect_len(&energy, "mc/energy", num_events)?;
    expect_len(&absx, "mc/absx", num_events)?;
    expect_len(&absy, "mc/absy", num_events)?;
    Ok(Some(TruthHandles { energy, absx, absy }))
}

fn dataset_len(dataset: &Dataset) -> Result<usize> {
    match dataset.shape().as_slice() {
        &[n] => Ok(n),
        other => Err(Error::InvalidFormat(format!(
            "{} must be 1-D, found shape {other:?}",
            dataset.name()
        ))),
    }
}

fn expect_len(dataset: &Dataset, name: &str, expected: usize) -> Result<()> {
    let len = dataset_len(dataset)?;
    if len != expected {
        return Err(Error::InvalidFormat(format!(
            "{name} has {len} entries, expected {expected}"
        )));
    }
    Ok(())
}

fn missing_attr(name: &str) -> Error {
    Error::InvalidFormat(format!("missing header attribute {name}"))
}

fn read_failure(err: hdf5::Error) -> CoreError {
    CoreError::stream(err.to_string())
}

fn write_vec<T: H5Type>(group: &Group, name: &str, data: &[T]) -> Result<()> {
    let dataset = create_fixed_dataset::<T, _>(group, name, (data.len(),), None, false)?;
    dataset.write(ArrayView1::from(data))?;
    Ok(())
}

fn create_fixed_dataset<T: H5Type, S>(
    group: &Group,
    name: &str,
    shape: S,
    compression: Option<u8>,
    shuffle: bool,
) -> Result<Dataset>
where
    S: Into<hdf5::Extents>,
{
    let mut builder = group.new_dataset::<T>().shape(shape);

    if let Some(level) = compression {
        builder = builder.deflate(level);
    }

    if shuffle {
        builder = builder.shuffle();
    }

    Ok(builder.create(name)?)
}

fn set_columns_attr(location: &Location, columns: &[&str]) -> Result<()> {
    let values: Vec<VarLenUnicode> = columns
        .iter()
        .map(|column| to_var_len_unicode(column))
        .collect::<Result<Vec<_>>>()?;
    let attr = location
        .new_attr::<VarLenUnicode>()
        .shape((values.len(),))
        .create("columns")?;
    attr.write(ArrayView1::from(values.as_slice()))?;
    Ok(())
}

fn set_dataset_units(dataset: &Dataset, units: &str) -> Result<()> {
    let value = to_var_len_unicode(units)?;
    dataset
        .new_attr::<VarLenUnicode>()
        .create("units")?
        .write_scalar(&value)?;
    Ok(())
}

fn set_attr_str(group: &Group, name: &str, value: &str) -> Result<()> {
    let value = to_var_len_unicode(value)?;
    group
        .new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

fn read_attr_opt<T: H5Type + Clone>(group: &Group, name: &str) -> Result<Option<T>> {
    match group.attr(name) {
        Ok(attr) => Ok(Some(attr.read_scalar::<T>()?)),
        Err(_) => Ok(None),
    }
}

fn read_attr_opt_string(group: &Group, name: &str) -> Result<Option<String>> {
    match group.attr(name) {
        Ok(attr) => {
            let value: VarLenUnicode = attr.read_scalar()?;
            Ok(Some(value.to_string()))
        }
        Err(_) => Ok(None),
    }
}

fn to_var_len_unicode(value: &str) -> Result<VarLenUnicode> {
    VarLenUnicode::from_str(value)
        .map_err(|e| Error::InvalidFormat(format!("invalid utf-8 attribute: {e}")))
}
