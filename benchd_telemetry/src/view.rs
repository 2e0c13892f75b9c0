//! Analysis presets
//!
//! Each [`View`] names one of the standard benchd plots and the bucketing,
//! counting and smoothing it has always been drawn with.

use std::{
    fmt,
    num::{NonZeroU32, NonZeroUsize},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{
    aggregator::ErrorPolicy,
    bucket::AnchorScope,
    config::{self, Config},
    smooth::{Alignment, Edge},
};

const ONE_SECOND: NonZeroU32 = NonZeroU32::MIN;
const HALF_MINUTE: NonZeroU32 = match NonZeroU32::new(30) {
    Some(width) => width,
    None => panic!("bucket width is zero"),
};
const TEN_BUCKETS: NonZeroUsize = match NonZeroUsize::new(10) {
    Some(window) => window,
    None => panic!("window is zero"),
};
const TWENTY_BUCKETS: NonZeroUsize = match NonZeroUsize::new(20) {
    Some(window) => window,
    None => panic!("window is zero"),
};

/// A named analysis preset.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum View {
    /// Active workers against send rate, 10 bucket average.
    #[default]
    ClientsSendRate,
    /// Send rate against send latency percentiles, 20 bucket average.
    SendRateLatency,
    /// Send rate of every series until it first fails, anchored per series.
    SustainedThroughput,
    /// 30 second buckets, edge-padded so every bucket keeps a point.
    RawRate,
}

impl View {
    /// Every view, in declaration order.
    pub const ALL: [View; 4] = [
        View::ClientsSendRate,
        View::SendRateLatency,
        View::SustainedThroughput,
        View::RawRate,
    ];

    /// The snake case name of this view.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            View::ClientsSendRate => "clients_send_rate",
            View::SendRateLatency => "send_rate_latency",
            View::SustainedThroughput => "sustained_throughput",
            View::RawRate => "raw_rate",
        }
    }

    /// The preset configuration of this view.
    #[must_use]
    pub fn config(self) -> Config {
        let (width, window, edge, alignment, error_policy, anchor) = match self {
            View::ClientsSendRate => (
                ONE_SECOND,
                TEN_BUCKETS,
                Edge::Valid,
                Alignment::Centered,
                ErrorPolicy::CountThrough,
                AnchorScope::Run,
            ),
            View::SendRateLatency => (
                ONE_SECOND,
                TWENTY_BUCKETS,
                Edge::Valid,
                Alignment::Centered,
                ErrorPolicy::CountThrough,
                AnchorScope::Run,
            ),
            View::SustainedThroughput => (
                ONE_SECOND,
                TEN_BUCKETS,
                Edge::Valid,
                Alignment::Leading,
                ErrorPolicy::StopOnError,
                AnchorScope::PerSeries,
            ),
            View::RawRate => (
                HALF_MINUTE,
                NonZeroUsize::MIN,
                Edge::Padded,
                Alignment::Centered,
                ErrorPolicy::CountThrough,
                AnchorScope::Run,
            ),
        };
        Config {
            bucket_width_seconds: width,
            window,
            edge,
            alignment,
            error_policy,
            anchor,
            percentiles: vec![50.0, 95.0, 99.0],
            use_cache: false,
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for View {
    type Err = config::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.replace('-', "_");
        View::ALL
            .into_iter()
            .find(|view| view.name() == normalized)
            .ok_or_else(|| config::Error::UnknownVariant {
                option: "view",
                value: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_parse_back() {
        for view in View::ALL {
            assert_eq!(view.to_string().parse::<View>(), Ok(view));
        }
        assert_eq!("send-rate-latency".parse::<View>(), Ok(View::SendRateLatency));
        assert!("histogram".parse::<View>().is_err());
    }

    #[test]
    fn presets() {
        let raw = View::RawRate.config();
        assert_eq!(raw.bucket_width_seconds.get(), 30);
        assert_eq!(raw.window.get(), 1);
        assert_eq!(raw.edge, Edge::Padded);

        let clients = View::ClientsSendRate.config();
        assert_eq!(clients.bucket_width_seconds.get(), 1);
        assert_eq!(clients.window.get(), 10);

        let sustained = View::SustainedThroughput.config();
        assert_eq!(sustained.error_policy, ErrorPolicy::StopOnError);
        assert_eq!(sustained.anchor, AnchorScope::PerSeries);

        let latency = View::SendRateLatency.config();
        assert_eq!(latency.window.get(), 20);
        assert_eq!(latency.percentiles, vec![50.0, 95.0, 99.0]);
        for view in View::ALL {
            assert!(view.config().validate().is_ok());
        }
    }
}
