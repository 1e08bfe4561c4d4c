//! Raw detector events and the event-source contract.

use crate::coord::LogicalCoord;
use crate::error::{Error, Result};
use crate::hexagon::GridHeader;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Monte Carlo truth attached to a simulated event.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GroundTruth {
    /// Deposited energy.
    pub energy: f64,
    /// Absolute hit x position.
    pub x: f64,
    /// Absolute hit y position.
    pub y: f64,
}

impl GroundTruth {
    /// Creates a new truth record.
    #[must_use]
    pub fn new(energy: f64, x: f64, y: f64) -> Self {
        Self { energy, x, y }
    }
}

/// One digitized event of the circular readout.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RawEvent {
    /// Position of the event in its source stream.
    pub index: usize,
    /// Highest-signal pixel of the event.
    pub center: LogicalCoord,
    /// Pulse heights indexed by acquisition channel.
    pub signals: Vec<i32>,
    /// Truth information, present for simulated data only.
    pub truth: Option<GroundTruth>,
}

impl RawEvent {
    /// Creates an event without truth information.
    #[must_use]
    pub fn new(index: usize, center: LogicalCoord, signals: Vec<i32>) -> Self {
        Self {
            index,
            center,
            signals,
            truth: None,
        }
    }

    /// Attaches truth information.
    #[must_use]
    pub fn with_truth(mut self, truth: GroundTruth) -> Self {
        self.truth = Some(truth);
        self
    }
}

/// Whole-column truth quantities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TruthColumn {
    /// Deposited energy.
    Energy,
    /// Absolute hit x.
    AbsX,
    /// Absolute hit y.
    AbsY,
}

impl TruthColumn {
    /// Column name in simulation files.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Energy => "energy",
            Self::AbsX => "absx",
            Self::AbsY => "absy",
        }
    }

    /// Picks this column's value out of a truth record.
    #[must_use]
    pub fn value(&self, truth: &GroundTruth) -> f64 {
        match self {
            Self::Energy => truth.energy,
            Self::AbsX => truth.x,
            Self::AbsY => truth.y,
        }
    }
}

/// Forward-only stream of raw events with grid metadata.
///
/// Sources hold an external resource; callers release it with
/// [`EventSource::close`] (see [`with_source`] for scoped use).
pub trait EventSource {
    /// Header fields describing the grid the events were recorded on.
    fn header(&self) -> &GridHeader;

    /// Returns true if events carry Monte Carlo truth.
    fn has_ground_truth(&self) -> bool;

    /// Reads the next event, or `None` at the end of the stream.
    ///
    /// # Errors
    /// Returns [`Error::StreamReadFailure`] on I/O failure and
    /// [`Error::SourceClosed`] after [`EventSource::close`].
    fn next_event(&mut self) -> Result<Option<RawEvent>>;

    /// Restarts the stream at its first event.
    ///
    /// # Errors
    /// Returns [`Error::SourceClosed`] after [`EventSource::close`].
    fn rewind(&mut self) -> Result<()>;

    /// Reads a whole truth column, aligned by event index.
    ///
    /// # Errors
    /// Returns [`Error::GroundTruthUnavailable`] when the source has no truth.
    fn truth_column(&mut self, column: TruthColumn) -> Result<Vec<f64>>;

    /// Releases the underlying resource. Calling it again is a no-op.
    ///
    /// # Errors
    /// Returns an error if releasing the resource fails.
    fn close(&mut self) -> Result<()>;
}

/// Runs `f` on `source` and closes the source on every exit path.
///
/// An error from `f` takes precedence over an error from closing.
///
/// # Errors
/// Returns the error of `f`, or the close error if `f` succeeded.
pub fn with_source<S, T, F>(mut source: S, f: F) -> Result<T>
where
    S: EventSource,
    F: FnOnce(&mut S) -> Result<T>,
{
    let result = f(&mut source);
    let closed = source.close();
    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(close_err)) => {
            log::warn!("closing event source after failure also failed: {close_err}");
            Err(err)
        }
    }
}

/// Event source backed by a vector of events.
#[derive(Debug, Clone)]
pub struct MemoryEventSource {
    header: GridHeader,
    events: Vec<RawEvent>,
    cursor: usize,
    closed: bool,
}

impl MemoryEventSource {
    /// Creates a source over `events`, reindexing them in order.
    #[must_use]
    pub fn new(header: GridHeader, events: Vec<RawEvent>) -> Self {
        let events = events
            .into_iter()
            .enumerate()
            .map(|(index, event)| RawEvent { index, ..event })
            .collect();
        Self {
            header,
            events,
            cursor: 0,
            closed: false,
        }
    }

    /// Number of events in the source.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if the source has no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Returns true once [`EventSource::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The events, in stream order.
    #[must_use]
    pub fn events(&self) -> &[RawEvent] {
        &self.events
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::SourceClosed)
        } else {
            Ok(())
        }
    }
}

impl EventSource for MemoryEventSource {
    fn header(&self) -> &GridHeader {
        &self.header
    }

    fn has_ground_truth(&self) -> bool {
        self.events.iter().all(|event| event.truth.is_some())
    }

    fn next_event(&mut self) -> Result<Option<RawEvent>> {
        self.ensure_open()?;
        let event = self.events.get(self.cursor).cloned();
        if event.is_some() {
            self.cursor += 1;
        }
        Ok(event)
    }

    fn rewind(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.cursor = 0;
        Ok(())
    }

    fn truth_column(&mut self, column: TruthColumn) -> Result<Vec<f64>> {
        self.ensure_open()?;
        self.events
            .iter()
            .map(|event| {
                event
                    .truth
                    .as_ref()
                    .map(|truth| column.value(truth))
                    .ok_or(Error::GroundTruthUnavailable)
            })
            .collect()
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hexagon::HexagonalLayout;

    fn header() -> GridHeader {
        GridHeader::new(HexagonalLayout::OddR, 10, 10, 1.0).unwrap()
    }

    fn events() -> Vec<RawEvent> {
        vec![
            RawEvent::new(7, LogicalCoord::new(5, 5), vec![1; 7])
                .with_truth(GroundTruth::new(8.0, 0.1, 0.2)),
            RawEvent::new(7, LogicalCoord::new(3, 4), vec![2; 7])
                .with_truth(GroundTruth::new(6.0, -0.3, 0.4)),
        ]
    }

    #[test]
    fn test_memory_source_reindexes_and_iterates() {
        let mut source = MemoryEventSource::new(header(), events());
        assert_eq!(source.len(), 2);

        let first = source.next_event().unwrap().unwrap();
        let second = source.next_event().unwrap().unwrap();
        assert_eq!((first.index, second.index), (0, 1));
        assert!(source.next_event().unwrap().is_none());

        source.rewind().unwrap();
        assert_eq!(source.next_event().unwrap().unwrap().center, LogicalCoord::new(5, 5));
    }

    #[test]
    fn test_truth_columns() {
        let mut source = MemoryEventSource::new(header(), events());
        assert!(source.has_ground_truth());
        assert_eq!(source.truth_column(TruthColumn::Energy).unwrap(), vec![8.0, 6.0]);
        assert_eq!(source.truth_column(TruthColumn::AbsX).unwrap(), vec![0.1, -0.3]);
        assert_eq!(source.truth_column(TruthColumn::AbsY).unwrap(), vec![0.2, 0.4]);
        assert_eq!(TruthColumn::AbsY.name(), "absy");
    }

    #[test]
    fn test_truth_unavailable() {
        let events = vec![RawEvent::new(0, LogicalCoord::new(5, 5), vec![0; 7])];
        let mut source = MemoryEventSource::new(header(), events);
        assert!(!source.has_ground_truth());
        assert!(matches!(
            source.truth_column(TruthColumn::Energy),
            Err(Error::GroundTruthUnavailable)
        ));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut source = MemoryEventSource::new(header(), events());
        source.close().unwrap();
        source.close().unwrap();
        assert!(source.is_closed());
        assert!(matches!(source.next_event(), Err(Error::SourceClosed)));
        assert!(matches!(source.rewind(), Err(Error::SourceClosed)));
    }

    /// Records whether it was closed, through a shared flag.
    struct Tracked {
        inner: MemoryEventSource,
        closed: std::rc::Rc<std::cell::Cell<bool>>,
    }

    impl EventSource for Tracked {
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

    #[test]
    fn test_with_source_closes_on_success_and_error() {
        let flag = std::rc::Rc::new(std::cell::Cell::new(false));
        let source = Tracked {
            inner: MemoryEventSource::new(header(), events()),
            closed: flag.clone(),
        };
        let count = with_source(source, |s| {
            let mut n = 0;
            while s.next_event()?.is_some() {
                n += 1;
            }
            Ok(n)
        })
        .unwrap();
        assert_eq!(count, 2);
        assert!(flag.get());

        let flag = std::rc::Rc::new(std::cell::Cell::new(false));
        let source = Tracked {
            inner: MemoryEventSource::new(header(), events()),
            closed: flag.clone(),
        };
        let result: Result<()> = with_source(source, |_| Err(Error::GroundTruthUnavailable));
        assert!(matches!(result, Err(Error::GroundTruthUnavailable)));
        assert!(flag.get());
    }
}
