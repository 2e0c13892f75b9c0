//! Aggregation of worker events into per-series buckets
//!
//! The [`Aggregator`] owns all state of one run: the [`Bucketer`] anchors, the
//! [`SeriesSet`] and the time of the first failure. Events are ingested one at
//! a time, in stream order, and every ingested event touches exactly one
//! bucket.
//!
//! # Semantics
//!
//! Only worker records, tagged `W`, are aggregated. A record with worker arity
//! but any other tag is counted in [`Counters::other_kind`] and dropped
//! without touching a bucket or an anchor.
//!
//! For an event `e` of series `s` landing in bucket `b`:
//!
//! * `WorkerStarted` increments the worker start count of `b` by 1.
//! * `TraceSent` adds `1 / W` to the send count of `b`, `W` being the bucket
//!   width in seconds, and records `e`'s send latency in `b`.
//! * Any failure (send timeout, send error, receive timeout, exit) records the
//!   run's first failure offset if none is recorded yet. It never changes a
//!   bucket metric.
//!
//! Under [`ErrorPolicy::StopOnError`] the first failure of `s` suppresses all
//! further counting for `s` until [`Aggregator::resume`] is called. The buckets
//! of suppressed events are still created so that the time axis of `s` keeps
//! advancing.
//!
//! Ingestion performs no deduplication: ingesting the same event twice counts
//! it twice.

use std::num::NonZeroU32;
use std::str::FromStr;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    Error,
    bucket::{AnchorScope, Bucketer},
    config::Config,
    event::{self, Kind, Status, WorkerEvent},
    series::SeriesSet,
};

/// What happens to a series after its first failure.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Keep counting; failures only mark the first failure offset.
    #[default]
    CountThrough,
    /// Stop counting the failing series.
    StopOnError,
}

impl FromStr for ErrorPolicy {
    type Err = crate::config::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "count_through" | "count-through" => Ok(ErrorPolicy::CountThrough),
            "stop_on_error" | "stop-on-error" => Ok(ErrorPolicy::StopOnError),
            _ => Err(crate::config::Error::UnknownVariant {
                option: "error_policy",
                value: s.to_string(),
            }),
        }
    }
}

/// Bookkeeping of what the aggregator saw.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Counters {
    /// Lines offered through [`Aggregator::ingest_line`]
    pub lines: u64,
    /// Lines without worker arity
    pub foreign: u64,
    /// Worker-arity records whose tag is not a worker tag
    pub other_kind: u64,
    /// Events that updated a bucket
    pub ingested: u64,
    /// Events of a series stopped by [`ErrorPolicy::StopOnError`]
    pub suppressed: u64,
    /// Failure events
    pub failures: u64,
}

/// Owns and updates all series of one run.
#[derive(Debug, Clone)]
pub struct Aggregator {
    bucketer: Bucketer,
    policy: ErrorPolicy,
    series: SeriesSet,
    stopped: FxHashSet<String>,
    first_error_offset: Option<f64>,
    counters: Counters,
}

impl Aggregator {
    /// Create an aggregator with `width` seconds per bucket.
    #[must_use]
    pub fn new(width: NonZeroU32, scope: AnchorScope, policy: ErrorPolicy) -> Self {
        Self {
            bucketer: Bucketer::new(width, scope),
            policy,
            series: SeriesSet::new(),
            stopped: FxHashSet::default(),
            first_error_offset: None,
            counters: Counters::default(),
        }
    }

    /// Create an aggregator from the bucketing and policy parts of `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.bucket_width_seconds, config.anchor, config.error_policy)
    }

    /// Decode and ingest one raw log line. Foreign lines are counted and
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the line has worker arity but a malformed field.
    pub fn ingest_line(&mut self, line: &str) -> Result<(), event::Error> {
        self.counters.lines += 1;
        match event::parse(line)? {
            Some(event) => self.ingest(&event),
            None => self.counters.foreign += 1,
        }
        Ok(())
    }

    /// Ingest every line of `lines`, stopping at the first malformed record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Line`] naming the 1-based line of the first malformed
    /// record.
    pub fn ingest_lines<'a, I>(&mut self, lines: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = &'a str>,
    {
        for (number, line) in lines.into_iter().enumerate() {
            self.ingest_line(line).map_err(|source| Error::Line {
                line: number + 1,
                source,
            })?;
        }
        Ok(())
    }

    /// Ingest one decoded event.
    pub fn ingest(&mut self, event: &WorkerEvent<'_>) {
        if event.kind != Kind::Worker {
            self.counters.other_kind += 1;
            return;
        }

        let index = self.bucketer.index(event.series, event.timestamp);
        let bucket = self.series.get_or_insert(event.series).bucket_mut(index);

        if self.stopped.contains(event.series) {
            self.counters.suppressed += 1;
            return;
        }

        if event.status.is_failure() {
            self.record_failure(event, index);
        } else if event.status == Status::TraceSent {
            bucket.send_count += 1.0 / f64::from(self.bucketer.width().get());
            bucket.record_latency(
                event
                    .end_send_timestamp
                    .saturating_sub(event.send_timestamp),
            );
        } else {
            bucket.worker_starts += 1;
        }
        self.counters.ingested += 1;
    }

    fn record_failure(&mut self, event: &WorkerEvent<'_>, index: u64) {
        self.counters.failures += 1;
        if self.first_error_offset.is_none() {
            self.first_error_offset = self.bucketer.run_offset(event.timestamp);
            debug!(
                series = %event.series,
                timestamp = %event.timestamp,
                status = event.status.code(),
                "First failure of the run"
            );
        }
        if self.policy == ErrorPolicy::StopOnError {
            info!(
                series = %event.series,
                bucket = index,
                status = event.status.code(),
                "Series failed, no longer counting it"
            );
            self.stopped.insert(event.series.to_owned());
        }
    }

    /// Resume counting `series` after it was stopped by a failure.
    pub fn resume(&mut self, series: &str) {
        self.stopped.remove(series);
    }

    /// Whether `series` is currently stopped.
    #[must_use]
    pub fn is_stopped(&self, series: &str) -> bool {
        self.stopped.contains(series)
    }

    /// Forget all run state, keeping configuration.
    pub fn reset(&mut self) {
        self.bucketer.reset();
        self.series.clear();
        self.stopped.clear();
        self.first_error_offset = None;
        self.counters = Counters::default();
    }

    /// The aggregated series.
    #[must_use]
    pub fn series(&self) -> &SeriesSet {
        &self.series
    }

    /// Consume the aggregator, returning its series.
    #[must_use]
    pub fn into_series(self) -> SeriesSet {
        self.series
    }

    /// Seconds between the run anchor and the first failure, if any.
    #[must_use]
    pub fn first_error_offset(&self) -> Option<f64> {
        self.first_error_offset
    }

    /// Name of the first observed series, the label of the output.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.series.first_name()
    }

    /// The bucketer, for anchor inspection.
    #[must_use]
    pub fn bucketer(&self) -> &Bucketer {
        &self.bucketer
    }

    /// Ingestion bookkeeping.
    #[must_use]
    pub fn counters(&self) -> Counters {
        self.counters
    }
}
