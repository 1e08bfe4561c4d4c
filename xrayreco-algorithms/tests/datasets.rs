//! End-to-end dataset builds over in-memory event sources.

use approx::assert_relative_eq;
use std::cell::Cell;
use std::rc::Rc;
use xrayreco_algorithms::{EdgePolicy, EventNormalizer, NormalizerConfig};
use xrayreco_core::{
    with_source, Error, EventSource, GridHeader, GroundTruth, HexagonalGrid, HexagonalLayout,
    LogicalCoord, MemoryEventSource, RawEvent, Result, TruthColumn,
};

/// Source wrapper that records whether it was closed.
struct CloseRecorder {
    inner: MemoryEventSource,
    closed: Rc<Cell<bool>>,
}

impl CloseRecorder {
    fn new(inner: MemoryEventSource) -> (Self, Rc<Cell<bool>>) {
        let closed = Rc::new(Cell::new(false));
        let recorder = Self {
            inner,
            closed: Rc::clone(&closed),
        };
        (recorder, closed)
    }
}

impl EventSource for CloseRecorder {
    fn header(&self) -> &GridHeader {
        self.inner.header()
    }

    fn has_ground_truth(&self) -> bool {
        self.inner.has_ground_truth()
    }

    fn next_event(&mut self) -> Result<Option<RawEvent>> {
        self.inner.next_event()
    }

    fn rewind(&mut self) -> Result<()> {
        self.inner.rewind()
    }

    fn truth_column(&mut self, column: TruthColumn) -> Result<Vec<f64>> {
        self.inner.truth_column(column)
    }

    fn close(&mut self) -> Result<()> {
        self.closed.set(true);
        self.inner.close()
    }
}

fn header() -> GridHeader {
    GridHeader::new(HexagonalLayout::OddR, 10, 10, 1.0).unwrap()
}

/// Events at the given centers with truth 0.1 right of each center.
fn events_with_truth(grid: &HexagonalGrid, centers: &[(i32, i32)]) -> Vec<RawEvent> {
    centers
        .iter()
        .enumerate()
        .map(|(i, &(c, r))| {
            let center = LogicalCoord::new(c, r);
            let position = grid.pixel_to_world(center);
            let signals = (1..=7).map(|ch| ch * 10 + i32::try_from(i).unwrap()).collect();
            RawEvent::new(i, center, signals).with_truth(GroundTruth::new(
                5.9,
                position.x + 0.1,
                position.y,
            ))
        })
        .collect()
}

#[test]
fn odd_r_scenario_through_a_source() {
    let header = header();
    let grid = HexagonalGrid::from_header(&header).unwrap();
    let events = vec![RawEvent::new(0, LogicalCoord::new(5, 5), vec![10, 20, 30, 40, 50, 60, 70])];
    let mut source = MemoryEventSource::new(header, events);

    let normalizer = EventNormalizer::new(&grid);
    let dataset = normalizer.build_feature_dataset(&mut source).unwrap();

    assert_eq!(dataset.len(), 1);
    let row = &dataset.rows()[0];
    assert_eq!(row.signals, [50.0, 30.0, 60.0, 10.0, 70.0, 40.0, 20.0]);
    for i in 1..7 {
        assert_relative_eq!(row.offset(i).norm(), 1.0, epsilon = 1e-12);
    }
}

#[test]
fn skip_policy_keeps_features_and_targets_aligned() {
    let header = header();
    let grid = HexagonalGrid::from_header(&header).unwrap();
    let centers = [(5, 5), (0, 0), (3, 4), (9, 5), (6, 2), (4, 9)];
    let mut source = MemoryEventSource::new(header, events_with_truth(&grid, &centers));
    let normalizer = EventNormalizer::new(&grid);

    let features = normalizer.build_feature_dataset(&mut source).unwrap();
    let targets = normalizer.build_target_dataset(&mut source).unwrap();

    assert_eq!(features.skipped(), &[1, 3, 5]);
    assert_eq!(targets.skipped(), features.skipped());
    assert_eq!(features.event_indices(), vec![0, 2, 4]);
    assert_eq!(targets.event_indices(), features.event_indices());
    assert_eq!(features.summary().events_read, 6);

    for target in &targets {
        assert_relative_eq!(target.dx, 0.1, epsilon = 1e-12);
        assert_relative_eq!(target.dy, 0.0, epsilon = 1e-12);
        assert_relative_eq!(target.energy, 5.9);
    }
}

#[test]
fn training_set_matches_separate_builds() {
    let header = header();
    let grid = HexagonalGrid::from_header(&header).unwrap();
    let centers = [(5, 5), (0, 0), (3, 4), (7, 7)];
    let mut source = MemoryEventSource::new(header, events_with_truth(&grid, &centers));
    let normalizer = EventNormalizer::new(&grid);

    let features = normalizer.build_feature_dataset(&mut source).unwrap();
    let targets = normalizer.build_target_dataset(&mut source).unwrap();
    let training = normalizer.build_training_set(&mut source).unwrap();

    assert_eq!(training.features, features);
    assert_eq!(training.targets, targets);
    assert_eq!(training.len(), 3);
    assert_eq!(training.targets.to_array().shape(), &[3, 3]);
}

#[test]
fn abort_policy_fails_on_first_edge_event() {
    let header = header();
    let grid = HexagonalGrid::from_header(&header).unwrap();
    let mut source = MemoryEventSource::new(header, events_with_truth(&grid, &[(5, 5), (0, 0)]));
    let config = NormalizerConfig::new().with_edge_policy(EdgePolicy::Abort);
    let normalizer = EventNormalizer::with_config(&grid, config);

    let err = normalizer.build_feature_dataset(&mut source).unwrap_err();
    match err {
        Error::IncompleteNeighborhood { center, found } => {
            assert_eq!(center, LogicalCoord::new(0, 0));
            assert!(found < 6);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(normalizer.build_target_dataset(&mut source).is_err());
}

#[test]
fn targets_fail_fast_without_truth() {
    let header = header();
    let grid = HexagonalGrid::from_header(&header).unwrap();
    let events = vec![RawEvent::new(0, LogicalCoord::new(5, 5), vec![1; 7])];
    let mut source = MemoryEventSource::new(header, events);
    let normalizer = EventNormalizer::new(&grid);

    assert!(!source.has_ground_truth());
    assert!(matches!(
        normalizer.build_target_dataset(&mut source),
        Err(Error::GroundTruthUnavailable)
    ));
    assert!(matches!(
        normalizer.build_training_set(&mut source),
        Err(Error::GroundTruthUnavailable)
    ));
    assert!(matches!(
        source.truth_column(TruthColumn::Energy),
        Err(Error::GroundTruthUnavailable)
    ));

    // Features are still available.
    assert_eq!(normalizer.build_feature_dataset(&mut source).unwrap().len(), 1);
}

#[test]
fn scoped_source_is_closed_on_success_and_failure() {
    let header = header();
    let grid = HexagonalGrid::from_header(&header).unwrap();
    let events = events_with_truth(&grid, &[(5, 5), (0, 0)]);

    let skip = EventNormalizer::new(&grid);
    let (recorder, closed) = CloseRecorder::new(MemoryEventSource::new(header, events.clone()));
    let dataset = with_source(recorder, |source| skip.build_feature_dataset(source)).unwrap();
    assert_eq!(dataset.len(), 1);
    assert!(closed.get());

    let abort = EventNormalizer::with_config(
        &grid,
        NormalizerConfig::new().with_edge_policy(EdgePolicy::Abort),
    );
    let (recorder, closed) = CloseRecorder::new(MemoryEventSource::new(header, events));
    let result = with_source(recorder, |source| abort.build_feature_dataset(source));
    assert!(result.unwrap_err().is_incomplete_neighborhood());
    assert!(closed.get());
}

#[test]
fn parallel_build_matches_sequential() {
    let header = GridHeader::new(HexagonalLayout::EvenQ, 24, 24, 0.5).unwrap();
    let grid = HexagonalGrid::from_header(&header).unwrap();
    let centers: Vec<(i32, i32)> = (0..24)
        .flat_map(|c| (0..24).map(move |r| (c, r)))
        .filter(|(c, r)| (c * 7 + r * 3) % 5 == 0)
        .collect();
    let events = events_with_truth(&grid, &centers);
    let normalizer = EventNormalizer::new(&grid);

    let parallel = normalizer.build_training_set_par(&events).unwrap();
    let mut source = MemoryEventSource::new(header, events);
    let sequential = normalizer.build_training_set(&mut source).unwrap();

    assert_eq!(parallel, sequential);
    assert!(!parallel.features.skipped().is_empty());
}

#[test]
fn parallel_abort_reports_earliest_error() {
    let header = header();
    let grid = HexagonalGrid::from_header(&header).unwrap();
    let events = events_with_truth(&grid, &[(5, 5), (0, 3), (9, 9), (4, 4)]);
    let config = NormalizerConfig::new().with_edge_policy(EdgePolicy::Abort);
    let normalizer = EventNormalizer::with_config(&grid, config);

    match normalizer.build_training_set_par(&events) {
        Err(Error::IncompleteNeighborhood { center, .. }) => {
            assert_eq!(center, LogicalCoord::new(0, 3));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn center_positions_cover_every_event() {
    let header = header();
    let grid = HexagonalGrid::from_header(&header).unwrap();
    let centers = [(5, 5), (0, 0), (9, 9)];
    let events = events_with_truth(&grid, &centers);
    let mut source = MemoryEventSource::new(header, events);
    let normalizer = EventNormalizer::new(&grid);

    let positions = normalizer.center_positions(&mut source).unwrap();
    assert_eq!(positions.len(), 3);
    for (position, &(c, r)) in positions.iter().zip(&centers) {
        assert_eq!(*position, grid.pixel_to_world(LogicalCoord::new(c, r)));
    }
}

#[test]
fn center_outside_grid_fails_the_build_under_skip() {
    let header = header();
    let grid = HexagonalGrid::from_header(&header).unwrap();
    let events = events_with_truth(&grid, &[(5, 5), (40, 40), (0, 0)]);
    let normalizer = EventNormalizer::new(&grid);

    let mut source = MemoryEventSource::new(header, events.clone());
    let err = normalizer.build_feature_dataset(&mut source).unwrap_err();
    assert!(matches!(
        err,
        Error::CoordinateOutOfBounds { coord } if coord == LogicalCoord::new(40, 40)
    ));

    let mut source = MemoryEventSource::new(header, events.clone());
    assert!(matches!(
        normalizer.build_target_dataset(&mut source),
        Err(Error::CoordinateOutOfBounds { .. })
    ));

    let mut source = MemoryEventSource::new(header, events);
    assert!(matches!(
        normalizer.center_positions(&mut source),
        Err(Error::CoordinateOutOfBounds { .. })
    ));
}

#[test]
fn closed_source_cannot_be_streamed() {
    let header = header();
    let grid = HexagonalGrid::from_header(&header).unwrap();
    let mut source = MemoryEventSource::new(header, vec![]);
    source.close().unwrap();

    let normalizer = EventNormalizer::new(&grid);
    assert!(matches!(
        normalizer.feature_rows(&mut source),
        Err(Error::SourceClosed)
    ));
}
