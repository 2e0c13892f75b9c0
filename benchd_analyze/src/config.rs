//! Configuration sources of a `benchtool` run
//!
//! From lowest to highest precedence: the view preset, the YAML file (or the
//! YAML held in `BENCHD_CONFIG`), command line flags, and finally the legacy
//! `BENCH_MA_WINDOW` and `BENCH_USE_CACHE` environment variables.

use std::{
    num::{NonZeroU32, NonZeroUsize},
    path::Path,
};

use benchd_telemetry::{
    Config, PartialConfig, View,
    aggregator::ErrorPolicy,
    bucket::AnchorScope,
    smooth::{Alignment, Edge},
};
use tracing::{debug, error, info};

use crate::Error;

const CONFIG_VAR: &str = "BENCHD_CONFIG";
const WINDOW_VAR: &str = "BENCH_MA_WINDOW";
const CACHE_VAR: &str = "BENCH_USE_CACHE";

/// Command line overrides of the pipeline configuration.
#[derive(clap::Args, Debug, Default, Clone)]
pub(crate) struct Overrides {
    /// analysis preset: clients_send_rate, send_rate_latency,
    /// sustained_throughput or raw_rate
    #[clap(long)]
    view: Option<View>,
    /// width of one bucket, seconds
    #[clap(long)]
    bucket_width: Option<NonZeroU32>,
    /// moving-average window, buckets
    #[clap(long)]
    window: Option<NonZeroUsize>,
    /// send-rate edge policy: valid or padded
    #[clap(long)]
    edge: Option<Edge>,
    /// placement of smoothed points: centered or leading
    #[clap(long)]
    alignment: Option<Alignment>,
    /// counting after a failure: count_through or stop_on_error
    #[clap(long)]
    error_policy: Option<ErrorPolicy>,
    /// bucket 0 of each series or of the whole run: per_series or run
    #[clap(long)]
    anchor: Option<AnchorScope>,
    /// latency percentile to report, may be repeated
    #[clap(long = "percentile")]
    percentiles: Vec<f64>,
    /// inputs are cache records rather than raw logs
    #[clap(long)]
    use_cache: bool,
}

impl Overrides {
    fn into_partial(self) -> PartialConfig {
        PartialConfig {
            view: self.view,
            bucket_width_seconds: self.bucket_width,
            window: self.window,
            edge: self.edge,
            alignment: self.alignment,
            error_policy: self.error_policy,
            anchor: self.anchor,
            percentiles: (!self.percentiles.is_empty()).then_some(self.percentiles),
            use_cache: self.use_cache.then_some(true),
        }
    }
}

fn load_contents<F>(config_path: Option<&Path>, lookup: &F) -> Result<Option<String>, Error>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(contents) = lookup(CONFIG_VAR) {
        debug!("Using config from env var '{CONFIG_VAR}'");
        return Ok(Some(contents));
    }
    let Some(path) = config_path else {
        return Ok(None);
    };
    debug!("Attempting to open configuration file at: {}", path.display());
    let contents = std::fs::read_to_string(path).map_err(|err| {
        error!("Could not read config file '{}': {err}", path.display());
        err
    })?;
    Ok(Some(contents))
}

fn env_overrides<F>(lookup: &F) -> Result<PartialConfig, Error>
where
    F: Fn(&str) -> Option<String>,
{
    let window = match lookup(WINDOW_VAR) {
        Some(value) => {
            let window = value
                .trim()
                .parse::<NonZeroUsize>()
                .map_err(|_| Error::Env {
                    var: WINDOW_VAR,
                    value: value.clone(),
                })?;
            info!("moving average window is {window}");
            Some(window)
        }
        None => None,
    };
    let use_cache = match lookup(CACHE_VAR).as_deref() {
        Some("true") => {
            info!("using cache");
            Some(true)
        }
        _ => None,
    };
    Ok(PartialConfig {
        window,
        use_cache,
        ..PartialConfig::default()
    })
}

/// Resolve the configuration of a run. `lookup` reads environment variables.
pub(crate) fn resolve<F>(
    config_path: Option<&Path>,
    overrides: Overrides,
    lookup: F,
) -> Result<Config, Error>
where
    F: Fn(&str) -> Option<String>,
{
    let file = match load_contents(config_path, &lookup)? {
        Some(contents) => serde_yaml::from_str(&contents).map_err(|err| {
            error!("Configuration validation failed: {err}");
            Error::SerdeYaml(err)
        })?,
        None => PartialConfig::default(),
    };
    let partial = file
        .overlay(overrides.into_partial())
        .overlay(env_overrides(&lookup)?);
    let config = partial.resolve().map_err(benchd_telemetry::Error::from)?;
    debug!(?config, "Resolved configuration");
    Ok(config)
}
