//! Lazy row streams and materialized datasets.

use crate::neighbors::CanonicalNeighborhood;
use crate::normalize::EventNormalizer;
use ndarray::{Array2, Array3};
use xrayreco_core::{
    Error, EventSource, FeatureRow, GridGeometry, RawEvent, Result, TargetRow, FEATURE_WIDTH,
    NEIGHBORHOOD_SIZE, TARGET_WIDTH,
};

/// Builds one row from an admitted event and its neighborhood.
pub type RowBuilder<'g, G, R> =
    fn(&EventNormalizer<'g, G>, &RawEvent, &CanonicalNeighborhood) -> Result<R>;

/// Bookkeeping of one pass over an event source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    /// Events pulled from the source.
    pub events_read: usize,
    /// Indices of events excluded by the skip policy, in source order.
    pub skipped: Vec<usize>,
}

impl BuildSummary {
    /// Number of rows emitted.
    #[must_use]
    pub fn rows_emitted(&self) -> usize {
        self.events_read.saturating_sub(self.skipped.len())
    }
}

/// Lazy, finite stream of rows built from an event source.
///
/// Each call to `next` reads events until one is admitted, so at most one
/// event is held in memory. After the first error the stream is exhausted.
pub struct RowStream<'s, 'g, S: ?Sized, G: ?Sized, R> {
    source: &'s mut S,
    normalizer: EventNormalizer<'g, G>,
    build: RowBuilder<'g, G, R>,
    summary: BuildSummary,
    finished: bool,
}

impl<'s, 'g, S, G, R> RowStream<'s, 'g, S, G, R>
where
    S: EventSource + ?Sized,
    G: GridGeometry + ?Sized,
{
    pub(crate) fn new(
        source: &'s mut S,
        normalizer: EventNormalizer<'g, G>,
        build: RowBuilder<'g, G, R>,
    ) -> Self {
        Self {
            source,
            normalizer,
            build,
            summary: BuildSummary::default(),
            finished: false,
        }
    }

    /// Progress so far; complete once the stream is exhausted.
    pub fn summary(&self) -> &BuildSummary {
        &self.summary
    }

    /// Consumes the stream, returning its summary.
    pub fn into_summary(self) -> BuildSummary {
        self.summary
    }

    fn fail<T>(&mut self, err: Error) -> Option<Result<T>> {
        self.finished = true;
        Some(Err(err))
    }
}

impl<S, G, R> Iterator for RowStream<'_, '_, S, G, R>
where
    S: EventSource + ?Sized,
    G: GridGeometry + ?Sized,
{
    type Item = Result<R>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }

            let event = match self.source.next_event() {
                Ok(Some(event)) => event,
                Ok(None) => {
                    self.finished = true;
                    return None;
                }
                Err(err) => return self.fail(err),
            };
            self.summary.events_read += 1;

            match self.normalizer.admit(&event) {
                Ok(Some(hood)) => match (self.build)(&self.normalizer, &event, &hood) {
                    Ok(row) => return Some(Ok(row)),
                    Err(err) => return self.fail(err),
                },
                Ok(None) => self.summary.skipped.push(event.index),
                Err(err) => return self.fail(err),
            }
        }
    }
}

/// Rows collected from a full pass, with the pass summary.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset<R> {
    rows: Vec<R>,
    summary: BuildSummary,
}

impl<R> Dataset<R> {
    pub(crate) fn from_stream<S, G>(
        kind: &str,
        mut stream: RowStream<'_, '_, S, G, R>,
    ) -> Result<Self>
    where
        S: EventSource + ?Sized,
        G: GridGeometry + ?Sized,
    {
        let mut rows = Vec::new();
        for row in stream.by_ref() {
            rows.push(row?);
        }
        let summary = stream.into_summary();
        log_summary(kind, &summary);
        Ok(Self { rows, summary })
    }

    pub(crate) fn from_parts(
        kind: &str,
        rows: Vec<R>,
        events_read: usize,
        skipped: Vec<usize>,
    ) -> Self {
        let summary = BuildSummary { events_read, skipped };
        log_summary(kind, &summary);
        Self { rows, summary }
    }

    /// Collected rows in source order.
    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    /// Consumes the dataset, returning its rows.
    pub fn into_rows(self) -> Vec<R> {
        self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if no row was produced.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Summary of the pass that built this dataset.
    pub fn summary(&self) -> &BuildSummary {
        &self.summary
    }

    /// Indices of the skipped events.
    pub fn skipped(&self) -> &[usize] {
        &self.summary.skipped
    }

    /// Iterates the rows.
    pub fn iter(&self) -> std::slice::Iter<'_, R> {
        self.rows.iter()
    }
}

impl<'a, R> IntoIterator for &'a Dataset<R> {
    type Item = &'a R;
    type IntoIter = std::slice::Iter<'a, R>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

impl Dataset<FeatureRow> {
    /// Source event index of each row.
    pub fn event_indices(&self) -> Vec<usize> {
        self.rows.iter().map(|row| row.event_index).collect()
    }

    /// Features as an `(n, 7, 3)` array of `(signal, dx, dy)`.
    pub fn to_array(&self) -> Array3<f64> {
        Array3::from_shape_fn(
            (self.rows.len(), NEIGHBORHOOD_SIZE, FEATURE_WIDTH),
            |(i, j, k)| self.rows[i].entry(j)[k],
        )
    }
}

impl Dataset<TargetRow> {
    /// Source event index of each row.
    pub fn event_indices(&self) -> Vec<usize> {
        self.rows.iter().map(|row| row.event_index).collect()
    }

    /// Targets as an `(n, 3)` array of `(energy, dx, dy)`.
    pub fn to_array(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.rows.len(), TARGET_WIDTH), |(i, k)| {
            self.rows[i].values()[k]
        })
    }
}

/// Index-aligned features and targets from one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    /// Feature rows.
    pub features: Dataset<FeatureRow>,
    /// Target rows; row `i` belongs to the same event as feature row `i`.
    pub targets: Dataset<TargetRow>,
}

impl TrainingSet {
    pub(crate) fn from_pairs(pairs: Dataset<(FeatureRow, TargetRow)>) -> Self {
        let Dataset { rows, summary } = pairs;
        let (features, targets): (Vec<_>, Vec<_>) = rows.into_iter().unzip();
        Self {
            features: Dataset {
                rows: features,
                summary: summary.clone(),
            },
            targets: Dataset {
                rows: targets,
                summary,
            },
        }
    }

    /// Number of training examples.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Returns true if the set holds no example.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

fn log_summary(kind: &str, summary: &BuildSummary) {
    log::info!(
        "{kind} dataset: {} events read, {} rows built",
        summary.events_read,
        summary.rows_emitted()
    );
    if !summary.skipped.is_empty() {
        log::warn!(
            "{kind} dataset: skipped {} events without a full neighborhood",
            summary.skipped.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EdgePolicy, NormalizerConfig};
    use xrayreco_core::{
        GridHeader, HexagonalGrid, HexagonalLayout, LogicalCoord, MemoryEventSource,
    };

    fn setup(centers: &[(i32, i32)]) -> (HexagonalGrid, MemoryEventSource) {
        let header = GridHeader::new(HexagonalLayout::OddR, 10, 10, 1.0).unwrap();
        let grid = HexagonalGrid::from_header(&header).unwrap();
        let events = centers
            .iter()
            .map(|&(c, r)| RawEvent::new(0, LogicalCoord::new(c, r), vec![1; 7]))
            .collect();
        (grid, MemoryEventSource::new(header, events))
    }

    #[test]
    fn test_stream_is_lazy() {
        let (grid, mut source) = setup(&[(5, 5), (0, 0), (4, 4), (6, 6)]);
        let normalizer = EventNormalizer::new(&grid);
        let mut stream = normalizer.feature_rows(&mut source).unwrap();

        assert_eq!(stream.summary().events_read, 0);
        let first = stream.next().unwrap().unwrap();
        assert_eq!(first.event_index, 0);
        assert_eq!(stream.summary().events_read, 1);

        // The corner event is skipped on the way to the next row.
        let second = stream.next().unwrap().unwrap();
        assert_eq!(second.event_index, 2);
        assert_eq!(stream.summary().events_read, 3);
        assert_eq!(stream.summary().skipped, vec![1]);
    }

    #[test]
    fn test_stream_stops_after_abort() {
        let (grid, mut source) = setup(&[(5, 5), (9, 9), (4, 4)]);
        let config = NormalizerConfig::new().with_edge_policy(EdgePolicy::Abort);
        let normalizer = EventNormalizer::with_config(&grid, config);
        let mut stream = normalizer.feature_rows(&mut source).unwrap();

        assert!(stream.next().unwrap().is_ok());
        let err = stream.next().unwrap().unwrap_err();
        assert!(matches!(err, Error::IncompleteNeighborhood { found: 2 | 3, .. }));
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_stream_restarts_from_first_event() {
        let (grid, mut source) = setup(&[(5, 5), (4, 4)]);
        let normalizer = EventNormalizer::new(&grid);

        let mut stream = normalizer.feature_rows(&mut source).unwrap();
        stream.next();
        drop(stream);

        let rows: Vec<_> = normalizer
            .feature_rows(&mut source)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].event_index, 0);
    }

    #[test]
    fn test_array_shapes() {
        let (grid, mut source) = setup(&[(5, 5), (0, 0), (4, 4)]);
        let normalizer = EventNormalizer::new(&grid);
        let dataset = normalizer.build_feature_dataset(&mut source).unwrap();

        let array = dataset.to_array();
        assert_eq!(array.shape(), &[2, 7, 3]);
        assert_eq!(array[[0, 0, 0]], 1.0);
        assert_eq!(array[[1, 0, 1]], 0.0);
        assert_eq!(array[[1, 2, 1]], dataset.rows()[1].dx[2]);
        assert_eq!(dataset.event_indices(), vec![0, 2]);
        assert_eq!(dataset.summary().rows_emitted(), 2);
    }

    #[test]
    fn test_empty_source() {
        let (grid, mut source) = setup(&[]);
        let normalizer = EventNormalizer::new(&grid);
        let dataset = normalizer.build_feature_dataset(&mut source).unwrap();
        assert!(dataset.is_empty());
        assert_eq!(dataset.to_array().shape(), &[0, 7, 3]);
    }
}
