//! Per-series bucket tables
//!
//! A [`Series`] maps bucket index to [`Bucket`]. A [`SeriesSet`] holds every
//! series of a run in the order they were first observed, which is the order
//! the rendering layer draws them in.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

/// Accumulated metrics of one time bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    index: u64,
    /// Number of workers started in this bucket
    pub worker_starts: u64,
    /// Sent traces normalized by bucket width, that is traces per second
    pub send_count: f64,
    latencies: Vec<i64>,
}

impl Bucket {
    fn new(index: u64) -> Self {
        Self {
            index,
            worker_starts: 0,
            send_count: 0.0,
            latencies: vec![0],
        }
    }

    /// Index of this bucket within its series.
    #[must_use]
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Send latencies recorded in this bucket. The first sample is always the
    /// floor sample 0.
    #[must_use]
    pub fn latencies(&self) -> &[i64] {
        &self.latencies
    }

    /// Record one send latency.
    pub fn record_latency(&mut self, latency: i64) {
        self.latencies.push(latency);
    }
}

/// The buckets of one named series, ordered by index.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    name: String,
    buckets: BTreeMap<u64, Bucket>,
}

impl Series {
    /// Create an empty series.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            buckets: BTreeMap::new(),
        }
    }

    /// The series name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The bucket at `index`, created zeroed on first touch.
    pub fn bucket_mut(&mut self, index: u64) -> &mut Bucket {
        self.buckets
            .entry(index)
            .or_insert_with(|| Bucket::new(index))
    }

    /// The bucket at `index`, if any event touched it.
    #[must_use]
    pub fn get(&self, index: u64) -> Option<&Bucket> {
        self.buckets.get(&index)
    }

    /// Whether a bucket exists at `index`.
    #[must_use]
    pub fn contains(&self, index: u64) -> bool {
        self.buckets.contains_key(&index)
    }

    /// Buckets in index order.
    pub fn buckets(&self) -> impl ExactSizeIterator<Item = &Bucket> {
        self.buckets.values()
    }

    /// Bucket indices in order.
    #[must_use]
    pub fn indices(&self) -> Vec<u64> {
        self.buckets.keys().copied().collect()
    }

    /// Send rate per bucket.
    #[must_use]
    pub fn send_counts(&self) -> Vec<f64> {
        self.buckets.values().map(|b| b.send_count).collect()
    }

    /// Running total of worker starts, one entry per bucket.
    #[must_use]
    pub fn active_workers(&self) -> Vec<u64> {
        self.buckets
            .values()
            .scan(0u64, |total, bucket| {
                *total += bucket.worker_starts;
                Some(*total)
            })
            .collect()
    }

    /// Number of buckets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// True when no bucket was touched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// All series of a run in first-observed order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesSet {
    series: Vec<Series>,
    positions: FxHashMap<String, usize>,
}

impl SeriesSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The series called `name`, created empty on first touch.
    pub fn get_or_insert(&mut self, name: &str) -> &mut Series {
        let position = if let Some(position) = self.positions.get(name) {
            *position
        } else {
            let position = self.series.len();
            self.series.push(Series::new(name));
            self.positions.insert(name.to_owned(), position);
            position
        };
        &mut self.series[position]
    }

    /// The series called `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Series> {
        self.positions.get(name).map(|position| &self.series[*position])
    }

    /// Series in first-observed order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Series> {
        self.series.iter()
    }

    /// Name of the first observed series.
    #[must_use]
    pub fn first_name(&self) -> Option<&str> {
        self.series.first().map(Series::name)
    }

    /// Number of series.
    #[must_use]
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// True when no series was observed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Remove every series.
    pub fn clear(&mut self) {
        self.series.clear();
        self.positions.clear();
    }
}

impl<'a> IntoIterator for &'a SeriesSet {
    type Item = &'a Series;
    type IntoIter = std::slice::Iter<'a, Series>;

    fn into_iter(self) -> Self::IntoIter {
        self.series.iter()
    }
}
