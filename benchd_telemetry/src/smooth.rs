//! Moving averages and interpolated percentiles over bucket sequences
//!
//! Both operations work on plain slices, one value per bucket, and are used
//! after aggregation finishes.
//!
//! A simple moving average of window `N` has two edge policies:
//!
//! * [`Edge::Valid`] only emits windows that lie fully inside the input. The
//!   output has `len - N + 1` values, none when the input is shorter than the
//!   window.
//! * [`Edge::Padded`] replicates the first value `N / 2` times in front and the
//!   last value `N - 1 - N / 2` times behind, so the output is exactly as long
//!   as the input.

use std::num::NonZeroUsize;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Edge handling of [`moving_average`].
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Edge {
    /// Trim the edges, emitting only complete windows.
    #[default]
    Valid,
    /// Pad the edges with the first and last value.
    Padded,
}

impl FromStr for Edge {
    type Err = crate::config::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "valid" => Ok(Edge::Valid),
            "padded" => Ok(Edge::Padded),
            _ => Err(crate::config::Error::UnknownVariant {
                option: "edge",
                value: s.to_string(),
            }),
        }
    }
}

/// Where the output of a [`Edge::Valid`] average sits against the input.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    /// Output value `i` belongs to input position `i + N / 2`.
    #[default]
    Centered,
    /// Output value `i` belongs to input position `i`.
    Leading,
}

impl Alignment {
    /// Input position of the first output value of a window `window` average
    /// computed with `edge`.
    #[must_use]
    pub fn offset(self, window: NonZeroUsize, edge: Edge) -> usize {
        match (edge, self) {
            (Edge::Padded, _) | (Edge::Valid, Alignment::Leading) => 0,
            (Edge::Valid, Alignment::Centered) => window.get() / 2,
        }
    }
}

impl FromStr for Alignment {
    type Err = crate::config::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "centered" => Ok(Alignment::Centered),
            "leading" => Ok(Alignment::Leading),
            _ => Err(crate::config::Error::UnknownVariant {
                option: "alignment",
                value: s.to_string(),
            }),
        }
    }
}

/// Simple moving average of `values` over `window` buckets.
#[must_use]
pub fn moving_average(values: &[f64], window: NonZeroUsize, edge: Edge) -> Vec<f64> {
    match edge {
        Edge::Valid => valid_windows(values, window.get()),
        Edge::Padded => {
            let (Some(first), Some(last)) = (values.first(), values.last()) else {
                return Vec::new();
            };
            let n = window.get();
            let before = n / 2;
            let after = n - 1 - before;
            let mut padded = Vec::with_capacity(values.len() + n - 1);
            padded.extend(std::iter::repeat_n(*first, before));
            padded.extend_from_slice(values);
            padded.extend(std::iter::repeat_n(*last, after));
            valid_windows(&padded, n)
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn valid_windows(values: &[f64], n: usize) -> Vec<f64> {
    values
        .windows(n)
        .map(|w| w.iter().sum::<f64>() / n as f64)
        .collect()
}

/// Samples sorted once for repeated percentile queries.
#[derive(Debug, Clone, PartialEq)]
pub struct Sorted(Vec<f64>);

impl Sorted {
    /// Sort a copy of `samples`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(samples: &[i64]) -> Self {
        let mut sorted: Vec<f64> = samples.iter().map(|s| *s as f64).collect();
        sorted.sort_unstable_by(f64::total_cmp);
        Self(sorted)
    }

    /// The `p`-th percentile, `p` in `[0, 100]`, interpolated linearly between
    /// the two closest ranks. An empty sample set yields 0.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn percentile(&self, p: f64) -> f64 {
        let sorted = &self.0;
        match sorted.len() {
            0 => 0.0,
            1 => sorted[0],
            len => {
                let rank = (p.clamp(0.0, 100.0) / 100.0) * (len - 1) as f64;
                let lower = rank.floor() as usize;
                let upper = rank.ceil() as usize;
                let frac = rank - lower as f64;
                sorted[lower] + (sorted[upper] - sorted[lower]) * frac
            }
        }
    }
}

/// The `p`-th percentile of `samples`. See [`Sorted::percentile`].
#[must_use]
pub fn percentile(samples: &[i64], p: f64) -> f64 {
    Sorted::new(samples).percentile(p)
}
