//! Plot-ready series handed to the rendering layer
//!
//! A [`Report`] is the end product of a run: for every series the cumulative
//! active worker count, the smoothed send rate and the smoothed latency
//! percentiles, each as `(bucket, value)` points, plus the offset of the first
//! failure for annotation. Smoothed sequences are shorter than the bucket
//! sequence under [`Edge::Valid`]; their points are placed on the bucket axis
//! according to the configured [`crate::smooth::Alignment`].

use serde::Serialize;

use crate::{
    aggregator::Aggregator,
    config::Config,
    series::{Series, SeriesSet},
    smooth::{self, Edge, Sorted},
};

/// One value on the bucket axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    /// Bucket index
    pub bucket: u64,
    /// Seconds between bucket 0 and this bucket
    pub offset_seconds: u64,
    /// The value
    pub value: f64,
}

/// A smoothed latency percentile over time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencySeries {
    /// Percentile in `[0, 100]`
    pub percentile: f64,
    /// Smoothed points
    pub points: Vec<Point>,
}

/// Plot data of one series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesReport {
    /// Series name
    pub name: String,
    /// Unsmoothed send rate per bucket
    pub send_count: Vec<Point>,
    /// Running total of started workers
    pub active_workers: Vec<Point>,
    /// Smoothed send rate
    pub send_rate: Vec<Point>,
    /// Smoothed latency percentiles, one entry per configured percentile
    pub latency: Vec<LatencySeries>,
}

/// Plot data of a whole run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    /// Label of the output, the first observed series name
    pub label: Option<String>,
    /// Width of one bucket, seconds
    pub bucket_width_seconds: u32,
    /// Seconds between the run anchor and the first failure
    pub first_error_offset: Option<f64>,
    /// Series in first-observed order
    pub series: Vec<SeriesReport>,
}

struct Axis {
    indices: Vec<u64>,
    width: u64,
}

impl Axis {
    fn points<I>(&self, offset: usize, values: I) -> Vec<Point>
    where
        I: IntoIterator<Item = f64>,
    {
        self.indices
            .iter()
            .skip(offset)
            .zip(values)
            .map(|(bucket, value)| Point {
                bucket: *bucket,
                offset_seconds: bucket * self.width,
                value,
            })
            .collect()
    }
}

impl Report {
    /// Build the report of an aggregated run.
    #[must_use]
    pub fn from_aggregator(aggregator: &Aggregator, config: &Config) -> Self {
        Self::build(
            aggregator.series(),
            config,
            aggregator.first_error_offset(),
        )
    }

    /// Build the report of `series`.
    #[must_use]
    pub fn build(series: &SeriesSet, config: &Config, first_error_offset: Option<f64>) -> Self {
        Self {
            label: series.first_name().map(str::to_owned),
            bucket_width_seconds: config.bucket_width_seconds.get(),
            first_error_offset,
            series: series.iter().map(|s| series_report(s, config)).collect(),
        }
    }

    /// True when no worker event was observed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

#[allow(clippy::cast_precision_loss)]
fn series_report(series: &Series, config: &Config) -> SeriesReport {
    let axis = Axis {
        indices: series.indices(),
        width: u64::from(config.bucket_width_seconds.get()),
    };
    let window = config.window;
    let send_counts = series.send_counts();

    let send_rate = axis.points(
        config.alignment.offset(window, config.edge),
        smooth::moving_average(&send_counts, window, config.edge),
    );

    let sorted: Vec<Sorted> = series
        .buckets()
        .map(|bucket| Sorted::new(bucket.latencies()))
        .collect();
    let latency_offset = config.alignment.offset(window, Edge::Valid);
    let latency = config
        .percentiles
        .iter()
        .map(|p| {
            let raw: Vec<f64> = sorted.iter().map(|s| s.percentile(*p)).collect();
            LatencySeries {
                percentile: *p,
                points: axis.points(
                    latency_offset,
                    smooth::moving_average(&raw, window, Edge::Valid),
                ),
            }
        })
        .collect();

    SeriesReport {
        name: series.name().to_string(),
        send_count: axis.points(0, send_counts),
        active_workers: axis.points(0, series.active_workers().into_iter().map(|w| w as f64)),
        send_rate,
        latency,
    }
}
