//! Per-event feature and target assembly.
//!
//! The normalizer composes three independent grid queries: the canonical
//! neighborhood (via [`resolve`]), the acquisition channel of each pixel, and
//! the batched physical conversion. Neither mapping is cached here, so a new
//! layout only needs a new [`GridGeometry`] implementation.

use crate::config::{EdgePolicy, NormalizerConfig};
use crate::dataset::{Dataset, RowStream, TrainingSet};
use crate::neighbors::{resolve, CanonicalNeighborhood};
use rayon::prelude::*;
use xrayreco_core::{
    Error, EventSource, FeatureRow, GridGeometry, PhysicalPoint, RawEvent, Result, TargetRow,
    NEIGHBORHOOD_SIZE,
};

/// Turns raw events into feature and target rows for one grid.
#[derive(Debug)]
pub struct EventNormalizer<'g, G: ?Sized> {
    grid: &'g G,
    config: NormalizerConfig,
}

impl<G: ?Sized> Clone for EventNormalizer<'_, G> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<G: ?Sized> Copy for EventNormalizer<'_, G> {}

impl<'g, G> EventNormalizer<'g, G>
where
    G: GridGeometry + ?Sized,
{
    /// Creates a normalizer with the default configuration.
    pub fn new(grid: &'g G) -> Self {
        Self::with_config(grid, NormalizerConfig::default())
    }

    /// Creates a normalizer with a custom configuration.
    pub fn with_config(grid: &'g G, config: NormalizerConfig) -> Self {
        Self { grid, config }
    }

    /// The grid this normalizer is bound to.
    pub fn grid(&self) -> &'g G {
        self.grid
    }

    /// Current configuration.
    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// Canonical neighborhood of the event's central pixel.
    ///
    /// # Errors
    /// Propagates [`resolve`] errors.
    pub fn neighborhood(&self, event: &RawEvent) -> Result<CanonicalNeighborhood> {
        resolve(event.center, self.grid)
    }

    /// Applies the edge policy: `Ok(None)` means the event is skipped.
    ///
    /// # Errors
    /// Returns every resolve error except an incomplete neighborhood under
    /// [`EdgePolicy::Skip`].
    pub fn admit(&self, event: &RawEvent) -> Result<Option<CanonicalNeighborhood>> {
        match self.neighborhood(event) {
            Ok(hood) => Ok(Some(hood)),
            Err(err)
                if err.is_incomplete_neighborhood()
                    && self.config.edge_policy == EdgePolicy::Skip =>
            {
                log::debug!("skipping event {}: {err}", event.index);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Builds the feature row of one event.
    ///
    /// # Errors
    /// - [`Error::CoordinateOutOfBounds`] if the central pixel is not in the grid.
    /// - [`Error::IncompleteNeighborhood`] for edge events, regardless of policy.
    /// - [`Error::ChannelOutOfRange`] if a pixel's channel is not in `event.signals`.
    pub fn feature_row(&self, event: &RawEvent) -> Result<FeatureRow> {
        let hood = self.neighborhood(event)?;
        self.feature_row_from(event, &hood)
    }

    /// Builds the target row of one event.
    ///
    /// # Errors
    /// - [`Error::GroundTruthUnavailable`] if the event has no truth.
    /// - [`Error::CoordinateOutOfBounds`] if the central pixel is not in the grid.
    pub fn target_row(&self, event: &RawEvent) -> Result<TargetRow> {
        let truth = event.truth.ok_or(Error::GroundTruthUnavailable)?;
        let center = self.center_position(event)?;
        Ok(TargetRow {
            event_index: event.index,
            energy: truth.energy,
            dx: truth.x - center.x,
            dy: truth.y - center.y,
        })
    }

    /// Physical position of the event's central (highest-signal) pixel.
    ///
    /// # Errors
    /// - [`Error::CoordinateOutOfBounds`] if the central pixel is not in the grid.
    /// - [`Error::InconsistentNeighborhood`] if the grid returns no position.
    pub fn center_position(&self, event: &RawEvent) -> Result<PhysicalPoint> {
        if !self.grid.contains(event.center) {
            return Err(Error::CoordinateOutOfBounds {
                coord: event.center,
            });
        }
        self.grid
            .logical_to_physical(&[event.center])
            .into_iter()
            .next()
            .ok_or_else(|| Error::InconsistentNeighborhood {
                center: event.center,
                reason: "grid returned no physical position".to_string(),
            })
    }

    /// Lazily builds feature rows for every admitted event of `source`.
    ///
    /// The source is rewound to its first event.
    ///
    /// # Errors
    /// Returns an error if the source cannot be rewound.
    pub fn feature_rows<'s, S>(
        &self,
        source: &'s mut S,
    ) -> Result<RowStream<'s, 'g, S, G, FeatureRow>>
    where
        S: EventSource + ?Sized,
    {
        source.rewind()?;
        Ok(RowStream::new(source, *self, Self::feature_row_from))
    }

    /// Lazily builds target rows for every admitted event of `source`.
    ///
    /// Edge events are admitted or skipped exactly as for feature rows, so
    /// both streams stay index-aligned.
    ///
    /// # Errors
    /// Returns [`Error::GroundTruthUnavailable`] before reading any event if
    /// the source has no truth, or an error if it cannot be rewound.
    pub fn target_rows<'s, S>(
        &self,
        source: &'s mut S,
    ) -> Result<RowStream<'s, 'g, S, G, TargetRow>>
    where
        S: EventSource + ?Sized,
    {
        if !source.has_ground_truth() {
            return Err(Error::GroundTruthUnavailable);
        }
        source.rewind()?;
        Ok(RowStream::new(source, *self, |normalizer, event, _| {
            normalizer.target_row(event)
        }))
    }

    /// Builds the full feature dataset in one pass over `source`.
    ///
    /// # Errors
    /// Returns the first read or assembly error; edge events follow the
    /// configured [`EdgePolicy`].
    pub fn build_feature_dataset<S>(&self, source: &mut S) -> Result<Dataset<FeatureRow>>
    where
        S: EventSource + ?Sized,
    {
        Dataset::from_stream("feature", self.feature_rows(source)?)
    }

    /// Builds the full target dataset in one pass over `source`.
    ///
    /// # Errors
    /// Returns [`Error::GroundTruthUnavailable`] for sources without truth,
    /// otherwise as [`Self::build_feature_dataset`].
    pub fn build_target_dataset<S>(&self, source: &mut S) -> Result<Dataset<TargetRow>>
    where
        S: EventSource + ?Sized,
    {
        Dataset::from_stream("target", self.target_rows(source)?)
    }

    /// Builds features and targets together in a single pass.
    ///
    /// # Errors
    /// As [`Self::build_target_dataset`].
    pub fn build_training_set<S>(&self, source: &mut S) -> Result<TrainingSet>
    where
        S: EventSource + ?Sized,
    {
        if !source.has_ground_truth() {
            return Err(Error::GroundTruthUnavailable);
        }
        source.rewind()?;
        let stream = RowStream::new(source, *self, Self::training_pair);
        let pairs = Dataset::from_stream("training", stream)?;
        Ok(TrainingSet::from_pairs(pairs))
    }

    /// Builds features and targets from already-loaded events in parallel.
    ///
    /// The result, including the skipped indices and the error reported
    /// under [`EdgePolicy::Abort`], matches a sequential build over the same
    /// events in the same order.
    ///
    /// # Errors
    /// Returns the error of the earliest failing event.
    pub fn build_training_set_par(&self, events: &[RawEvent]) -> Result<TrainingSet> {
        let outcomes: Vec<Result<Option<(FeatureRow, TargetRow)>>> = events
            .par_iter()
            .map(|event| match self.admit(event)? {
                Some(hood) => self.training_pair(event, &hood).map(Some),
                None => Ok(None),
            })
            .collect();

        let mut pairs = Vec::with_capacity(events.len());
        let mut skipped = Vec::new();
        for (event, outcome) in events.iter().zip(outcomes) {
            match outcome? {
                Some(pair) => pairs.push(pair),
                None => skipped.push(event.index),
            }
        }
        let pairs = Dataset::from_parts("training", pairs, events.len(), skipped);
        Ok(TrainingSet::from_pairs(pairs))
    }

    /// Physical position of every event's central pixel, in source order.
    ///
    /// Every event contributes, including edge events.
    ///
    /// # Errors
    /// Returns the first read error, or [`Error::CoordinateOutOfBounds`] for
    /// a central pixel outside the grid.
    pub fn center_positions<S>(&self, source: &mut S) -> Result<Vec<PhysicalPoint>>
    where
        S: EventSource + ?Sized,
    {
        source.rewind()?;
        let mut positions = Vec::new();
        while let Some(event) = source.next_event()? {
            positions.push(self.center_position(&event)?);
        }
        Ok(positions)
    }

    fn feature_row_from(
        &self,
        event: &RawEvent,
        hood: &CanonicalNeighborhood,
    ) -> Result<FeatureRow> {
        let coords = hood.coords();

        let mut signals = [0.0; NEIGHBORHOOD_SIZE];
        for (signal, &coord) in signals.iter_mut().zip(coords) {
            let channel = self.grid.logical_to_channel(coord);
            let raw = event.signals.get(channel).ok_or(Error::ChannelOutOfRange {
                channel,
                channels: event.signals.len(),
            })?;
            *signal = f64::from(*raw);
        }

        let positions = self.grid.logical_to_physical(coords);
        if positions.len() != NEIGHBORHOOD_SIZE {
            return Err(Error::InconsistentNeighborhood {
                center: event.center,
                reason: format!(
                    "{} positions returned for {NEIGHBORHOOD_SIZE} coordinates",
                    positions.len()
                ),
            });
        }

        // Entry 0 stays exactly (0, 0).
        let origin = positions[0];
        let mut dx = [0.0; NEIGHBORHOOD_SIZE];
        let mut dy = [0.0; NEIGHBORHOOD_SIZE];
        for (i, position) in positions.iter().enumerate().skip(1) {
            let offset = position.offset_from(&origin);
            dx[i] = offset.x;
            dy[i] = offset.y;
        }

        Ok(FeatureRow {
            event_index: event.index,
            signals,
            dx,
            dy,
        })
    }

    fn training_pair(
        &self,
        event: &RawEvent,
        hood: &CanonicalNeighborhood,
    ) -> Result<(FeatureRow, TargetRow)> {
        Ok((self.feature_row_from(event, hood)?, self.target_row(event)?))
    }
}
