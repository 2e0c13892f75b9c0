//! Ceiling resampling of event time into buckets
//!
//! benchd lines are not uniformly distributed in time, so before any rate or
//! moving average can be computed every event is assigned to a fixed-width
//! bucket. Alignment rounds _up_: an event at time `t` lands in the bucket
//! ending at or after `t`, that is `ceil(t / W) * W` for bucket width `W`. The
//! first aligned time observed becomes the anchor, bucket 0. Subsequent indices
//! are `(aligned - anchor) / W`.
//!
//! # Ordering
//!
//! Callers must present the events of one series in non-decreasing time order.
//! The bucketer does not sort. An event whose aligned time precedes its anchor
//! is clamped into bucket 0 and a warning is emitted. Later events that move
//! backward without crossing the anchor simply land in an earlier bucket.

use std::num::NonZeroU32;
use std::str::FromStr;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::event::Timestamp;

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Which event anchors bucket 0.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnchorScope {
    /// Every series is anchored at its own first event.
    #[default]
    PerSeries,
    /// All series share the anchor of the first event in the run.
    Run,
}

impl FromStr for AnchorScope {
    type Err = crate::config::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "per_series" | "per-series" => Ok(AnchorScope::PerSeries),
            "run" => Ok(AnchorScope::Run),
            _ => Err(crate::config::Error::UnknownVariant {
                option: "anchor",
                value: s.to_string(),
            }),
        }
    }
}

/// Align `timestamp` up to a multiple of `width`, returning whole seconds since
/// midnight.
#[must_use]
pub fn align(timestamp: Timestamp, width: NonZeroU32) -> u64 {
    let width = u64::from(width.get());
    timestamp.as_nanos().div_ceil(width * NANOS_PER_SECOND) * width
}

/// Assigns events to bucket indices relative to an anchor.
#[derive(Debug, Clone)]
pub struct Bucketer {
    width: NonZeroU32,
    scope: AnchorScope,
    anchors: FxHashMap<String, u64>,
    run_anchor: Option<u64>,
}

impl Bucketer {
    /// Create a bucketer with `width` seconds per bucket.
    #[must_use]
    pub fn new(width: NonZeroU32, scope: AnchorScope) -> Self {
        Self {
            width,
            scope,
            anchors: FxHashMap::default(),
            run_anchor: None,
        }
    }

    /// Width of one bucket, seconds.
    #[must_use]
    pub fn width(&self) -> NonZeroU32 {
        self.width
    }

    /// Bucket index of `timestamp` within `series`.
    ///
    /// The first call for a series, or for the run when anchored per run,
    /// records the anchor.
    pub fn index(&mut self, series: &str, timestamp: Timestamp) -> u64 {
        let aligned = align(timestamp, self.width);
        let run_anchor = *self.run_anchor.get_or_insert(aligned);
        let anchor = match self.scope {
            AnchorScope::Run => run_anchor,
            AnchorScope::PerSeries => {
                if let Some(anchor) = self.anchors.get(series) {
                    *anchor
                } else {
                    self.anchors.insert(series.to_owned(), aligned);
                    aligned
                }
            }
        };

        if aligned < anchor {
            warn!(
                series = %series,
                %timestamp,
                anchor,
                aligned,
                "Event precedes the series anchor, clamping into bucket 0"
            );
            return 0;
        }
        (aligned - anchor) / u64::from(self.width.get())
    }

    /// The aligned time, in seconds since midnight, of bucket 0 for `series`.
    #[must_use]
    pub fn anchor(&self, series: &str) -> Option<u64> {
        match self.scope {
            AnchorScope::Run => self.run_anchor,
            AnchorScope::PerSeries => self.anchors.get(series).copied(),
        }
    }

    /// The aligned time of the first event in the run, regardless of scope.
    #[must_use]
    pub fn run_anchor(&self) -> Option<u64> {
        self.run_anchor
    }

    /// Seconds between the run anchor and `timestamp`. Negative when the
    /// timestamp falls before the aligned anchor within the first bucket.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn run_offset(&self, timestamp: Timestamp) -> Option<f64> {
        self.run_anchor
            .map(|anchor| timestamp.as_secs_f64() - anchor as f64)
    }

    /// Forget all anchors.
    pub fn reset(&mut self) {
        self.anchors.clear();
        self.run_anchor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn width(secs: u32) -> NonZeroU32 {
        NonZeroU32::new(secs).expect("non-zero width")
    }

    fn millis(ms: u64) -> Timestamp {
        Timestamp::from_nanos(ms * 1_000_000)
    }

    #[test]
    fn align_rounds_up() {
        assert_eq!(align(millis(0), width(1)), 0);
        assert_eq!(align(millis(1), width(1)), 1);
        assert_eq!(align(millis(1_000), width(1)), 1);
        assert_eq!(align(millis(1_001), width(1)), 2);
        assert_eq!(align(millis(29_999), width(30)), 30);
        assert_eq!(align(millis(30_000), width(30)), 30);
        assert_eq!(align(millis(30_001), width(30)), 60);
    }

    #[test]
    fn first_event_is_bucket_zero() {
        let mut bucketer = Bucketer::new(width(1), AnchorScope::PerSeries);
        assert_eq!(bucketer.index("a", millis(10_500)), 0);
        assert_eq!(bucketer.index("a", millis(11_000)), 0);
        assert_eq!(bucketer.index("a", millis(11_001)), 1);
        assert_eq!(bucketer.index("a", millis(15_000)), 4);
        assert_eq!(bucketer.anchor("a"), Some(11));
    }

    #[test]
    fn series_anchor_independently() {
        let mut bucketer = Bucketer::new(width(1), AnchorScope::PerSeries);
        assert_eq!(bucketer.index("a", millis(1_000)), 0);
        assert_eq!(bucketer.index("b", millis(5_000)), 0);
        assert_eq!(bucketer.index("a", millis(5_000)), 4);
        assert_eq!(bucketer.run_anchor(), Some(1));
    }

    #[test]
    fn run_scope_shares_anchor() {
        let mut bucketer = Bucketer::new(width(1), AnchorScope::Run);
        assert_eq!(bucketer.index("a", millis(1_000)), 0);
        assert_eq!(bucketer.index("b", millis(5_000)), 4);
        assert_eq!(bucketer.anchor("b"), Some(1));
    }

    #[test]
    fn wide_buckets_count_buckets_not_seconds() {
        let mut bucketer = Bucketer::new(width(30), AnchorScope::Run);
        assert_eq!(bucketer.index("a", millis(1_000)), 0);
        assert_eq!(bucketer.index("a", millis(30_000)), 0);
        assert_eq!(bucketer.index("a", millis(30_001)), 1);
        assert_eq!(bucketer.index("a", millis(95_000)), 3);
    }

    #[test]
    fn event_before_anchor_is_clamped() {
        let mut bucketer = Bucketer::new(width(1), AnchorScope::PerSeries);
        assert_eq!(bucketer.index("a", millis(10_000)), 0);
        assert_eq!(bucketer.index("a", millis(5_000)), 0);
    }

    #[test]
    fn run_offset_is_relative_to_aligned_anchor() {
        let mut bucketer = Bucketer::new(width(1), AnchorScope::PerSeries);
        assert_eq!(bucketer.run_offset(millis(500)), None);
        bucketer.index("a", millis(500));
        let offset = bucketer.run_offset(millis(3_250)).expect("anchored");
        approx::assert_relative_eq!(offset, 2.25);
        bucketer.reset();
        assert_eq!(bucketer.run_anchor(), None);
    }

    proptest! {
        #[test]
        fn monotonic_under_monotonic_input(
            secs in 1u32..120,
            mut times in prop::collection::vec(0u64..86_400_000_000_000, 1..64),
        ) {
            times.sort_unstable();
            let mut bucketer = Bucketer::new(width(secs), AnchorScope::PerSeries);
            let mut previous = 0;
            for t in times {
                let index = bucketer.index("s", Timestamp::from_nanos(t));
                prop_assert!(index >= previous);
                previous = index;
            }
        }

        #[test]
        fn sub_bucket_offset_is_invisible(
            secs in 1u32..120,
            anchor_nanos in 0u64..3_600_000_000_000,
            k in 0u64..1_000,
            a in 1u64..=1_000_000,
            b in 1u64..=1_000_000,
        ) {
            let width_nanos = u64::from(secs) * NANOS_PER_SECOND;
            let mut bucketer = Bucketer::new(width(secs), AnchorScope::PerSeries);
            bucketer.index("s", Timestamp::from_nanos(anchor_nanos));
            let anchor = bucketer.anchor("s").expect("anchored") * NANOS_PER_SECOND;
            // Two points inside the half-open window (anchor + kW, anchor + (k+1)W].
            let lower = anchor + k * width_nanos;
            let first = lower + (a * width_nanos) / 1_000_000;
            let second = lower + (b * width_nanos) / 1_000_000;
            prop_assume!(first > lower && second > lower);
            let i = bucketer.index("s", Timestamp::from_nanos(first));
            let j = bucketer.index("s", Timestamp::from_nanos(second));
            prop_assert_eq!(i, j);
            prop_assert_eq!(i, k + 1);
        }
    }
}
