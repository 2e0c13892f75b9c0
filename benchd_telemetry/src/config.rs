//! Pipeline configuration
//!
//! A [`Config`] fixes how one run is bucketed, counted and smoothed. It is
//! usually built from a [`View`] preset, then overlaid with a
//! [`PartialConfig`] read from a YAML file or assembled from command line
//! flags. Fields left out of a partial keep the value underneath.

use std::num::{NonZeroU32, NonZeroUsize};

use serde::{Deserialize, Serialize};

use crate::{
    aggregator::ErrorPolicy,
    bucket::AnchorScope,
    smooth::{Alignment, Edge},
    view::View,
};

/// Errors produced by [`Config`]
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A percentile is not within `[0, 100]`
    #[error("Percentile {0} is outside of [0, 100]")]
    Percentile(f64),
    /// A textual option does not name a known variant
    #[error("Unknown {option} {value:?}")]
    UnknownVariant {
        /// The option being parsed
        option: &'static str,
        /// The offending text
        value: String,
    },
}

fn default_percentiles() -> Vec<f64> {
    vec![50.0, 95.0, 99.0]
}

/// Complete configuration of one aggregation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Width of one bucket, seconds
    pub bucket_width_seconds: NonZeroU32,
    /// Moving-average window, buckets
    pub window: NonZeroUsize,
    /// Edge policy of the send-rate average. Latency percentiles always use
    /// [`Edge::Valid`].
    pub edge: Edge,
    /// Placement of valid-window averages against the bucket axis
    pub alignment: Alignment,
    /// Counting behavior after a failure
    pub error_policy: ErrorPolicy,
    /// Which event anchors bucket 0
    pub anchor: AnchorScope,
    /// Latency percentiles to report, each in `[0, 100]`
    #[serde(default = "default_percentiles")]
    pub percentiles: Vec<f64>,
    /// Read pre-bucketed cache records instead of raw logs
    #[serde(default)]
    pub use_cache: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::for_view(View::default())
    }
}

impl Config {
    /// The preset configuration of `view`.
    #[must_use]
    pub fn for_view(view: View) -> Self {
        view.config()
    }

    /// Overlay every field set in `partial`.
    #[must_use]
    pub fn merge(mut self, partial: PartialConfig) -> Self {
        if let Some(width) = partial.bucket_width_seconds {
            self.bucket_width_seconds = width;
        }
        if let Some(window) = partial.window {
            self.window = window;
        }
        if let Some(edge) = partial.edge {
            self.edge = edge;
        }
        if let Some(alignment) = partial.alignment {
            self.alignment = alignment;
        }
        if let Some(policy) = partial.error_policy {
            self.error_policy = policy;
        }
        if let Some(anchor) = partial.anchor {
            self.anchor = anchor;
        }
        if let Some(percentiles) = partial.percentiles {
            self.percentiles = percentiles;
        }
        if let Some(use_cache) = partial.use_cache {
            self.use_cache = use_cache;
        }
        self
    }

    /// Check constraints serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns an error if a percentile is outside of `[0, 100]`.
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(p) = self
            .percentiles
            .iter()
            .find(|p| !(0.0..=100.0).contains(*p))
        {
            return Err(Error::Percentile(*p));
        }
        Ok(())
    }
}

/// A configuration overlay. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialConfig {
    /// Preset underneath the other fields
    pub view: Option<View>,
    /// See [`Config::bucket_width_seconds`]
    pub bucket_width_seconds: Option<NonZeroU32>,
    /// See [`Config::window`]
    pub window: Option<NonZeroUsize>,
    /// See [`Config::edge`]
    pub edge: Option<Edge>,
    /// See [`Config::alignment`]
    pub alignment: Option<Alignment>,
    /// See [`Config::error_policy`]
    pub error_policy: Option<ErrorPolicy>,
    /// See [`Config::anchor`]
    pub anchor: Option<AnchorScope>,
    /// See [`Config::percentiles`]
    pub percentiles: Option<Vec<f64>>,
    /// See [`Config::use_cache`]
    pub use_cache: Option<bool>,
}

impl PartialConfig {
    /// Combine two overlays, fields of `other` winning.
    #[must_use]
    pub fn overlay(self, other: PartialConfig) -> Self {
        Self {
            view: other.view.or(self.view),
            bucket_width_seconds: other.bucket_width_seconds.or(self.bucket_width_seconds),
            window: other.window.or(self.window),
            edge: other.edge.or(self.edge),
            alignment: other.alignment.or(self.alignment),
            error_policy: other.error_policy.or(self.error_policy),
            anchor: other.anchor.or(self.anchor),
            percentiles: other.percentiles.or(self.percentiles),
            use_cache: other.use_cache.or(self.use_cache),
        }
    }

    /// Resolve into a complete [`Config`], starting from the preset of
    /// `view`, or the default view.
    ///
    /// # Errors
    ///
    /// See [`Config::validate`].
    pub fn resolve(self) -> Result<Config, Error> {
        let config = Config::for_view(self.view.unwrap_or_default()).merge(self);
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_partial_resolves_to_default_view() {
        let config = PartialConfig::default().resolve().expect("valid");
        assert_eq!(config, Config::for_view(View::default()));
    }

    #[test]
    fn yaml_overlay() {
        let partial: PartialConfig = serde_yaml::from_str(
            "view: sustained_throughput\nwindow: 30\nerror_policy: count_through\n",
        )
        .expect("valid yaml");
        let config = partial.resolve().expect("valid");
        assert_eq!(config.window.get(), 30);
        assert_eq!(config.error_policy, ErrorPolicy::CountThrough);
        assert_eq!(config.anchor, AnchorScope::PerSeries);
        assert_eq!(config.alignment, Alignment::Leading);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let result: Result<PartialConfig, _> = serde_yaml::from_str("bucket_widht_seconds: 3\n");
        assert!(result.is_err());
    }

    #[test]
    fn zero_width_is_rejected() {
        let result: Result<PartialConfig, _> = serde_yaml::from_str("bucket_width_seconds: 0\n");
        assert!(result.is_err());
    }

    #[test]
    fn later_overlay_wins() {
        let file = PartialConfig {
            window: NonZeroUsize::new(5),
            use_cache: Some(true),
            ..PartialConfig::default()
        };
        let flags = PartialConfig {
            window: NonZeroUsize::new(7),
            ..PartialConfig::default()
        };
        let config = file.overlay(flags).resolve().expect("valid");
        assert_eq!(config.window.get(), 7);
        assert!(config.use_cache);
    }

    #[test]
    fn percentile_out_of_range() {
        let partial = PartialConfig {
            percentiles: Some(vec![50.0, 101.0]),
            ..PartialConfig::default()
        };
        assert_eq!(partial.resolve(), Err(Error::Percentile(101.0)));
    }

    #[test]
    fn full_config_round_trips_through_yaml() {
        let config = Config::for_view(View::SendRateLatency);
        let yaml = serde_yaml::to_string(&config).expect("serialize");
        let back: Config = serde_yaml::from_str(&yaml).expect("deserialize");
        assert_eq!(config, back);
    }
}
